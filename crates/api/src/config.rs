/// Server configuration loaded from environment variables.
///
/// Secrets have no defaults: a missing `CRON_SECRET` or
/// `INTERNAL_API_TOKEN` leaves the corresponding endpoints rejecting every
/// request.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `180`, above the provider timeout).
    pub request_timeout_secs: u64,
    /// Bearer secret of the sweep trigger.
    pub cron_secret: Option<String>,
    /// HMAC secret the dispatch and resume webhooks verify against.
    pub dispatch_signing_secret: String,
    /// Bearer token for service-to-service start/cancel calls.
    pub internal_api_token: Option<String>,
    /// Terminal runs older than this are purged (default: `30`).
    pub run_retention_days: i64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `HOST`                    | `0.0.0.0`               |
    /// | `PORT`                    | `3000`                  |
    /// | `CORS_ORIGINS`            | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`    | `180`                   |
    /// | `CRON_SECRET`             | none                    |
    /// | `DISPATCH_SIGNING_SECRET` | required                |
    /// | `INTERNAL_API_TOKEN`      | none                    |
    /// | `RUN_RETENTION_DAYS`      | `30`                    |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "180".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let dispatch_signing_secret = std::env::var("DISPATCH_SIGNING_SECRET")
            .expect("DISPATCH_SIGNING_SECRET must be set");

        let run_retention_days: i64 = std::env::var("RUN_RETENTION_DAYS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("RUN_RETENTION_DAYS must be a valid i64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            cron_secret: secret_var("CRON_SECRET"),
            dispatch_signing_secret,
            internal_api_token: secret_var("INTERNAL_API_TOKEN"),
            run_retention_days,
        }
    }
}

fn secret_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
