use anyhow::{Context, Result};
use sqlx::PgPool;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::services::flow_registry::FlowRegistry;
use crate::services::gemini::GeminiService;
use crate::services::realtime::ChangeHub;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_QUESTION_COUNT: usize = 10;
pub const DEFAULT_IDLE_MINUTES: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub gemini_api_key: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub question_count: usize,
    /// Unfinished consultations idle this long are dropped from memory.
    pub flow_idle_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set in .env")?;
        let gemini_api_key =
            lookup("GEMINI_API_KEY").context("GEMINI_API_KEY must be set in .env")?;

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("BIND_ADDR is not a valid socket address")?;

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(v) => v.parse().context("DB_MAX_CONNECTIONS must be a number")?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let question_count = match lookup("CONSULTATION_QUESTION_COUNT") {
            Some(v) => v
                .parse()
                .context("CONSULTATION_QUESTION_COUNT must be a number")?,
            None => DEFAULT_QUESTION_COUNT,
        };

        let idle_minutes = match lookup("CONSULTATION_IDLE_MINUTES") {
            Some(v) => v
                .parse()
                .context("CONSULTATION_IDLE_MINUTES must be a number")?,
            None => DEFAULT_IDLE_MINUTES,
        };

        Ok(Self {
            database_url,
            gemini_api_key,
            bind_addr,
            max_connections,
            question_count: question_count.max(1),
            flow_idle_timeout: Duration::from_secs(idle_minutes * 60),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<PgPool>,
    pub gemini: Arc<GeminiService>,
    pub changes: ChangeHub,
    pub flows: Arc<FlowRegistry>,
    pub config: Arc<Config>,
}
