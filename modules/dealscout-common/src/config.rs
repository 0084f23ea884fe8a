use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // External collaborators
    pub registry_api_key: String,
    pub enrichment_api_key: String,
    pub delivery_api_key: String,

    // Queue processor
    pub claim_limit: u32,
    pub delivery_timeout_secs: u64,

    // Outreach pacing (milliseconds between batch-scheduled sends)
    pub outreach_inter_delay_ms: i64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            registry_api_key: required_env("REGISTRY_API_KEY"),
            enrichment_api_key: required_env("ENRICHMENT_API_KEY"),
            delivery_api_key: required_env("DELIVERY_API_KEY"),
            claim_limit: env::var("CLAIM_LIMIT")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .expect("CLAIM_LIMIT must be a number"),
            delivery_timeout_secs: env::var("DELIVERY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("DELIVERY_TIMEOUT_SECS must be a number"),
            outreach_inter_delay_ms: env::var("OUTREACH_INTER_DELAY_MS")
                .unwrap_or_else(|_| "1800000".to_string())
                .parse()
                .expect("OUTREACH_INTER_DELAY_MS must be a number"),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
