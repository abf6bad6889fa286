use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// Priority bucket of a task
// Values outside the three known ones can still come back from a shared table,
// they are kept verbatim and rank below everything else
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Priority {
    High,
    Medium,
    Low,
    Unknown(String),
}

impl Priority {
    // Parse a wire/database value; never fails
    pub fn parse(value: &str) -> Priority {
        match value {
            "high" => Priority::High,
            "medium" => Priority::Medium,
            "low" => Priority::Low,
            other => Priority::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Unknown(raw) => raw,
        }
    }

    // Sort weight, higher comes first in listings
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
            Priority::Unknown(_) => 0,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Priority::Unknown(_))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Priority::parse(&raw))
    }
}

// A single todo item as stored and as returned to API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    pub priority: Priority,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub order: i64,
    #[serde(deserialize_with = "utc_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "utc_timestamp")]
    pub updated_at: DateTime<Utc>,
}

// Hosted tables allow NULL descriptions
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or_default())
}

// RFC 3339 first; a `timestamp` column without zone comes back naive and is read as UTC
fn utc_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>()
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

// Fields for a task that does not exist yet; the store fills in id and timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub order: i64,
    pub completed: bool,
}

// Partial update. `None` leaves the field untouched, `Some` overwrites it,
// so `Some(String::new())` really clears a description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub order: Option<i64>,
}

impl TaskPatch {
    pub fn completed(completed: bool) -> Self {
        TaskPatch {
            completed: Some(completed),
            ..Default::default()
        }
    }

    pub fn order(order: i64) -> Self {
        TaskPatch {
            order: Some(order),
            ..Default::default()
        }
    }
}

// One entry of a drag-and-drop reorder batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderItem {
    pub id: i64,
    pub order: i64,
}

// Outcome of a reorder batch that reached the end
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReorderSummary {
    pub applied: usize,
    pub skipped: usize,
}
