use std::env;
use std::time::Duration;

use anyhow::Context;
use carebridge_common::database::DatabaseSettings;
use config::{Config, Environment, File};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::domain::requests::review::{DEFAULT_BATCH_CONCURRENCY, DEFAULT_REPAIR_GRACE};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_port: String,
    pub database: DatabaseSettings,
    pub jobs: JobsSettings,
    #[serde(default)]
    pub review: ReviewSettings,
}

/// Where background jobs (serverless functions) are invoked
#[derive(Debug, Clone, Deserialize)]
pub struct JobsSettings {
    pub functions_url: String,
    pub api_key: String,
    #[serde(default = "default_job_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewSettings {
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    /// Minimum age of a link before reads complete the approval it belongs to
    #[serde(default = "default_repair_grace_seconds")]
    pub repair_grace_seconds: u64,
}

impl ReviewSettings {
    pub fn repair_grace(&self) -> Duration {
        Duration::from_secs(self.repair_grace_seconds)
    }
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            repair_grace_seconds: default_repair_grace_seconds(),
        }
    }
}

fn default_job_timeout() -> u64 {
    10
}

fn default_batch_concurrency() -> usize {
    DEFAULT_BATCH_CONCURRENCY
}

fn default_repair_grace_seconds() -> u64 {
    DEFAULT_REPAIR_GRACE.as_secs()
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        let run_mode = load_env("RUN_MODE", "development");

        let s = Config::builder()
            .add_source(File::with_name("./config/default"))
            .add_source(File::with_name(&format!("./config/{run_mode}")).required(false))
            .add_source(Environment::with_prefix("app").separator("__"))
            .build()?;

        s.try_deserialize().with_context(|| "failed to read config")
    }
}

fn load_env(key: &str, default_value: &'static str) -> String {
    env::var(key).unwrap_or_else(|_| default_value.into())
}
