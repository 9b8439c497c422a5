/// Server configuration
///
/// # Environment variables
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | WORK_DIR | /var/lib/loyalty | Working directory for DB and logs |
/// | HTTP_PORT | 3000 | HTTP API port |
/// | ENVIRONMENT | development | development \| staging \| production |
/// | TX_PAGE_LIMIT | 50 | Max ledger entries per history request |
///
/// # Example
///
/// ```ignore
/// WORK_DIR=/data/loyalty HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory, holds the SQLite file and log output
    pub work_dir: String,
    /// HTTP API port
    pub http_port: u16,
    /// Runtime environment: development | staging | production
    pub environment: String,
    /// Page size cap for transaction history
    pub tx_page_limit: i64,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/loyalty".into()),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            tx_page_limit: std::env::var("TX_PAGE_LIMIT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(50),
        }
    }

    /// Path of the SQLite database file
    pub fn db_path(&self) -> String {
        format!("{}/loyalty.db", self.work_dir)
    }

    /// Directory for rolling log files
    pub fn log_dir(&self) -> String {
        format!("{}/logs", self.work_dir)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
