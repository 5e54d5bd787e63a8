use crate::db::DBConfig;
use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use time::macros::format_description;
use tracing_subscriber::{
    fmt::{format::FmtSpan, time::UtcTime},
    EnvFilter,
};
use url::Url;

#[derive(Parser, Debug, Clone, Serialize)]
#[command(author, version, about, long_about = None)]
pub struct AppConfig {
    /// Database host
    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    pub db_host: String,

    /// Database port
    #[arg(long, env = "DB_PORT", default_value = "5432")]
    pub db_port: u16,

    /// Database user
    #[arg(long, env = "DB_USER", default_value = "postgres")]
    pub db_user: String,

    /// Database password
    #[arg(long, env = "DB_PASSWORD")]
    pub db_password: String,

    /// Database name
    #[arg(long, env = "DB_NAME", default_value = "dispatch")]
    pub db_name: String,

    #[arg(long, env = "JSON_RPC_PORT", default_value = "3030")]
    pub json_rpc_port: u16,

    /// Same-decision votes required to finalize a report
    #[arg(long, env = "VOTE_THRESHOLD", default_value = "1")]
    pub vote_threshold: i64,

    /// Points granted to the reporter per verified report
    #[arg(long, env = "POINTS_PER_VERIFICATION", default_value = "5")]
    pub points_per_verification: i64,

    /// Volunteers selected per report assignment
    #[arg(long, env = "VOLUNTEERS_PER_REPORT", default_value = "5")]
    pub volunteers_per_report: usize,

    /// Daily task capacity assumed for authorities without a declared one
    #[arg(long, env = "DEFAULT_DAILY_CAPACITY", default_value = "10")]
    pub default_daily_capacity: i64,

    /// Average travel speed used for route time estimates, in km/h
    #[arg(long, env = "AVG_SPEED_KMH", default_value = "40")]
    pub avg_speed_kmh: f64,

    /// URL-signing service endpoint (optional)
    #[arg(long, env = "SIGNER_URL")]
    pub signer_url: Option<String>,

    #[arg(long, env = "SIGNER_TIMEOUT_SECS", default_value = "10")]
    pub signer_timeout_secs: u64,

    /// Lifetime of signed collection-proof URLs
    #[arg(long, env = "PROOF_URL_EXPIRY_SECS", default_value = "900")]
    pub proof_url_expiry_secs: u64,
}

impl AppConfig {
    /// Get the database configuration
    pub fn db_config(&self) -> DBConfig {
        DBConfig {
            host: self.db_host.clone(),
            port: self.db_port,
            user: self.db_user.clone(),
            password: self.db_password.clone(),
            dbname: self.db_name.clone(),
        }
    }

    /// Get the signer URL, when one is configured
    pub fn signer_url(&self) -> Result<Option<Url>, url::ParseError> {
        self.signer_url.as_deref().map(Url::parse).transpose()
    }
}

pub fn init_console_subscriber() {
    let timer = UtcTime::new(format_description!(
        "[year]-[month]-[day]T[hour repr:24]:[minute]:[second].[subsecond digits:3]Z"
    ));
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_span_events(FmtSpan::CLOSE)
        .with_timer(timer)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_level(true)
        .with_ansi(true)
        .with_writer(std::io::stdout)
        .init();
}
