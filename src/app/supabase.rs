// Hosted Postgres store reached through the Supabase REST (PostgREST) endpoint
use std::time::Duration;

use chrono::Utc;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::app::error::TaskError;
use crate::app::models::{NewTask, Task, TaskPatch};
use crate::app::storage::TaskStore;

const TABLE: &str = "todos";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub key: String,
}

// `TaskStore` over the `todos` table of a Supabase project.
// The HTTP client is built once with the project key as default headers and
// shared by every call.
pub struct SupabaseStore {
    client: Client,
    table_url: String,
}

impl SupabaseStore {
    pub fn new(config: &SupabaseConfig, timeout: Duration) -> Result<SupabaseStore, TaskError> {
        let key = HeaderValue::from_str(&config.key)
            .map_err(|e| TaskError::Backend(format!("invalid supabase key: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.key))
            .map_err(|e| TaskError::Backend(format!("invalid supabase key: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(SupabaseStore {
            client,
            table_url: table_url(&config.url),
        })
    }

    fn fetch(&self, request: RequestBuilder) -> Result<Vec<Task>, TaskError> {
        let body = checked(request.send()?)?.text()?;
        parse_rows(&body)
    }

    // Writes that should hand back the affected rows
    fn returning(&self, request: RequestBuilder) -> Result<Vec<Task>, TaskError> {
        self.fetch(request.header("Prefer", "return=representation"))
    }
}

fn table_url(project_url: &str) -> String {
    format!("{}/rest/v1/{TABLE}", project_url.trim().trim_end_matches('/'))
}

fn id_filter(id: i64) -> [(&'static str, String); 1] {
    [("id", format!("eq.{id}"))]
}

fn checked(response: Response) -> Result<Response, TaskError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(TaskError::Backend(format!("supabase returned {status}: {body}")))
}

fn parse_rows(body: &str) -> Result<Vec<Task>, TaskError> {
    serde_json::from_str(body)
        .map_err(|e| TaskError::Backend(format!("unexpected supabase payload: {e}")))
}

fn patch_body(patch: &TaskPatch) -> Value {
    let mut body = Map::new();
    if let Some(title) = &patch.title {
        body.insert("title".into(), json!(title));
    }
    if let Some(description) = &patch.description {
        body.insert("description".into(), json!(description));
    }
    if let Some(completed) = patch.completed {
        body.insert("completed".into(), json!(completed));
    }
    if let Some(priority) = &patch.priority {
        body.insert("priority".into(), json!(priority.as_str()));
    }
    if let Some(order) = patch.order {
        body.insert("order".into(), json!(order));
    }
    body.insert("updated_at".into(), json!(Utc::now()));
    Value::Object(body)
}

#[derive(Deserialize)]
struct OrderRow {
    order: Option<i64>,
}

fn parse_max_order(body: &str) -> Result<i64, TaskError> {
    let rows: Vec<OrderRow> = serde_json::from_str(body)
        .map_err(|e| TaskError::Backend(format!("unexpected supabase payload: {e}")))?;
    Ok(rows.first().and_then(|row| row.order).unwrap_or(0))
}

impl TaskStore for SupabaseStore {
    fn list_all(&self) -> Result<Vec<Task>, TaskError> {
        self.fetch(
            self.client
                .get(&self.table_url)
                .query(&[("select", "*"), ("order", "created_at.desc")]),
        )
    }

    fn get_by_id(&self, id: i64) -> Result<Task, TaskError> {
        self.fetch(
            self.client
                .get(&self.table_url)
                .query(&[("select", "*")])
                .query(&id_filter(id)),
        )?
        .into_iter()
        .next()
        .ok_or(TaskError::NotFound(id))
    }

    fn insert(&self, task: NewTask) -> Result<Task, TaskError> {
        let now = Utc::now();
        let body = json!({
            "title": task.title,
            "description": task.description,
            "completed": task.completed,
            "priority": task.priority.as_str(),
            "order": task.order,
            "created_at": now,
            "updated_at": now,
        });
        self.returning(self.client.post(&self.table_url).json(&body))?
            .into_iter()
            .next()
            .ok_or_else(|| TaskError::Backend("supabase insert returned no row".into()))
    }

    fn update(&self, id: i64, patch: &TaskPatch) -> Result<Task, TaskError> {
        self.returning(
            self.client
                .patch(&self.table_url)
                .query(&id_filter(id))
                .json(&patch_body(patch)),
        )?
        .into_iter()
        .next()
        .ok_or(TaskError::NotFound(id))
    }

    fn delete(&self, id: i64) -> Result<(), TaskError> {
        let deleted = self.returning(self.client.delete(&self.table_url).query(&id_filter(id)))?;
        if deleted.is_empty() {
            return Err(TaskError::NotFound(id));
        }
        Ok(())
    }

    fn max_order(&self) -> Result<i64, TaskError> {
        let response = self
            .client
            .get(&self.table_url)
            .query(&[
                ("select", "order"),
                ("order", "order.desc.nullslast"),
                ("limit", "1"),
            ])
            .send()?;
        let body = checked(response)?.text()?;
        parse_max_order(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::Priority;

    #[test]
    fn table_url_trims_project_url() {
        assert_eq!(
            table_url(" https://abc.supabase.co/\n"),
            "https://abc.supabase.co/rest/v1/todos"
        );
    }

    #[test]
    fn parse_rows_reads_postgrest_payload() {
        let rows = parse_rows(
            r#"[{"id": 3, "title": "会議の準備", "description": null, "completed": false,
                 "priority": "high", "order": 2,
                 "created_at": "2025-01-02T03:04:05.678901+00:00",
                 "updated_at": "2025-01-02T03:04:05.678901+00:00"}]"#,
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 3);
        assert_eq!(rows[0].description, "");
        assert_eq!(rows[0].priority, Priority::High);
    }

    #[test]
    fn parse_rows_accepts_naive_timestamps_and_null_order() {
        let rows = parse_rows(
            r#"[{"id": 4, "title": "資料作成", "description": "", "completed": false,
                 "priority": "low", "order": null,
                 "created_at": "2025-01-02T03:04:05.678901",
                 "updated_at": "2025-01-02T03:04:05.678901"}]"#,
        )
        .unwrap();

        assert_eq!(rows[0].order, 0);
        assert_eq!(
            rows[0].created_at.to_rfc3339(),
            "2025-01-02T03:04:05.678901+00:00"
        );
    }

    #[test]
    fn max_order_payloads() {
        assert_eq!(parse_max_order("[]").unwrap(), 0);
        assert_eq!(parse_max_order(r#"[{"order": 7}]"#).unwrap(), 7);
        assert_eq!(parse_max_order(r#"[{"order": null}]"#).unwrap(), 0);
        assert!(matches!(
            parse_max_order(r#"{"message": "nope"}"#),
            Err(TaskError::Backend(_))
        ));
    }

    #[test]
    fn parse_rows_rejects_error_objects() {
        let err = parse_rows(r#"{"message": "permission denied"}"#).unwrap_err();
        assert!(matches!(err, TaskError::Backend(_)));
    }

    #[test]
    fn patch_body_only_carries_present_fields() {
        let body = patch_body(&TaskPatch {
            title: Some(String::new()),
            order: Some(9),
            ..Default::default()
        });
        let object = body.as_object().unwrap();

        assert_eq!(object["title"], "");
        assert_eq!(object["order"], 9);
        assert!(object.contains_key("updated_at"));
        assert!(!object.contains_key("description"));
        assert!(!object.contains_key("completed"));
        assert!(!object.contains_key("priority"));
    }
}
