use crate::application::reconciliation::Schedule;
use crate::infrastructure::http_provider::DEFAULT_TIMEOUT;
use crate::infrastructure::stripe::STRIPE_API_BASE;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration. Every option can also come from the environment.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Order fulfillment pipeline and wallet ledger", long_about = None)]
pub struct Config {
    /// Address the HTTP API listens on
    #[arg(long, env = "ORDERFLOW_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// JSON file with providers, services and opening wallets
    #[arg(long, env = "ORDERFLOW_SEED")]
    pub seed: Option<PathBuf>,

    /// Shared secret used to verify payment webhooks
    #[arg(long, env = "ORDERFLOW_WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: String,

    /// Maximum age of a signed webhook, in seconds
    #[arg(long, env = "ORDERFLOW_WEBHOOK_TOLERANCE_SECS", default_value_t = 300)]
    pub webhook_tolerance_secs: u64,

    /// Stripe secret API key
    #[arg(long, env = "ORDERFLOW_STRIPE_SECRET_KEY", default_value = "", hide_env_values = true)]
    pub stripe_secret_key: String,

    #[arg(long, env = "ORDERFLOW_STRIPE_API_BASE", default_value = STRIPE_API_BASE)]
    pub stripe_api_base: String,

    /// Hard timeout for every provider API call, in seconds
    #[arg(long, env = "ORDERFLOW_PROVIDER_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub provider_timeout_secs: u64,

    /// Seconds between status reconciliation passes
    #[arg(long, env = "ORDERFLOW_STATUS_INTERVAL_SECS", default_value_t = 60)]
    pub status_interval_secs: u64,

    /// Seconds between provider catalog refreshes
    #[arg(long, env = "ORDERFLOW_CATALOG_INTERVAL_SECS", default_value_t = 3600)]
    pub catalog_interval_secs: u64,
}

impl Config {
    pub fn webhook_tolerance(&self) -> Duration {
        Duration::from_secs(self.webhook_tolerance_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn schedule(&self) -> Schedule {
        Schedule {
            status_every: Duration::from_secs(self.status_interval_secs.max(1)),
            catalog_every: Duration::from_secs(self.catalog_interval_secs.max(1)),
        }
    }
}
