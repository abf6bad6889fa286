// Runtime configuration: which store to open and whether a remote generator exists
// Flags win over environment variables, environment over defaults
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::warn;

use crate::app::error::TaskError;
use crate::app::generator::{
    DescriptionGenerator, GeminiClient, GeminiConfig, TextCompletion, DEFAULT_ENDPOINT,
    DEFAULT_MODEL,
};
use crate::app::storage::{SqliteStore, TaskStore};
use crate::app::supabase::{SupabaseConfig, SupabaseStore};

#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// SQLite database file used when no hosted backend is configured.
    #[arg(long, env = "TODO_DATABASE", default_value = "todo.db")]
    pub database: PathBuf,

    /// Supabase project URL; together with the key selects the hosted store.
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    #[arg(long, env = "SUPABASE_KEY", hide_env_values = true)]
    pub supabase_key: Option<String>,

    /// Timeout for hosted store requests, in seconds.
    #[arg(long, env = "SUPABASE_TIMEOUT_SECS", default_value_t = 15)]
    pub supabase_timeout_secs: u64,

    /// Enables remote description generation when set.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
    pub gemini_model: String,

    #[arg(long, env = "GEMINI_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub gemini_endpoint: String,

    #[arg(long, env = "GEMINI_TIMEOUT_SECS", default_value_t = 10)]
    pub gemini_timeout_secs: u64,
}

// Where tasks live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Supabase {
        config: SupabaseConfig,
        timeout: Duration,
    },
    SqliteFile(PathBuf),
    SqliteMemory,
}

impl Backend {
    pub fn open(&self) -> Result<Arc<dyn TaskStore>, TaskError> {
        let store: Arc<dyn TaskStore> = match self {
            Backend::Supabase { config, timeout } => Arc::new(SupabaseStore::new(config, *timeout)?),
            Backend::SqliteFile(path) => Arc::new(SqliteStore::open(path)?),
            Backend::SqliteMemory => Arc::new(SqliteStore::open_in_memory()?),
        };
        Ok(store)
    }
}

// Secrets stay out of logs
impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Supabase { config, .. } => write!(f, "supabase ({})", config.url),
            Backend::SqliteFile(path) => write!(f, "sqlite file {}", path.display()),
            Backend::SqliteMemory => f.write_str("sqlite in-memory"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: Backend,
    pub gemini: Option<GeminiConfig>,
}

// Serverless hosts get an in-memory database since their filesystem is not writable
pub fn is_serverless(env: impl Fn(&str) -> Option<String>) -> bool {
    ["VERCEL", "VERCEL_ENV", "NOW_REGION"]
        .iter()
        .any(|key| env(key).is_some_and(|value| !value.is_empty()))
        || env("VERCEL_URL").is_some_and(|url| url.contains("vercel.app"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl Config {
    pub fn resolve(settings: Settings, env: impl Fn(&str) -> Option<String>) -> Config {
        let supabase_url = non_blank(settings.supabase_url);
        let supabase_key = non_blank(settings.supabase_key);

        let backend = match (supabase_url, supabase_key) {
            (Some(url), Some(key)) => Backend::Supabase {
                config: SupabaseConfig { url, key },
                timeout: Duration::from_secs(settings.supabase_timeout_secs),
            },
            (url, key) => {
                if url.is_some() || key.is_some() {
                    warn!("only one of SUPABASE_URL / SUPABASE_KEY is set, using sqlite");
                }
                if is_serverless(env) {
                    Backend::SqliteMemory
                } else {
                    Backend::SqliteFile(settings.database)
                }
            }
        };

        let gemini = non_blank(settings.gemini_api_key).map(|api_key| GeminiConfig {
            api_key,
            model: settings.gemini_model,
            endpoint: settings.gemini_endpoint,
            timeout: Duration::from_secs(settings.gemini_timeout_secs),
        });

        Config { backend, gemini }
    }

    // A client that cannot be built only costs us the remote step
    pub fn description_generator(&self) -> DescriptionGenerator {
        let remote = self.gemini.as_ref().and_then(|gemini| {
            GeminiClient::new(gemini)
                .inspect_err(|err| warn!(error = %err, "gemini client unavailable"))
                .ok()
        });
        match remote {
            Some(client) => DescriptionGenerator::new(Some(Box::new(client) as Box<dyn TextCompletion>)),
            None => DescriptionGenerator::rule_based(),
        }
    }
}
