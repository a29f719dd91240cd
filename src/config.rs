use anyhow::{bail, Context};
use std::env;
use std::time::Duration;

/// Gateway credentials; their presence switches registration creation into
/// the payment-initiating variant.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub store_id: String,
    pub store_passwd: String,
    pub live: bool,
    /// Per-request timeout on gateway calls.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub mongodb_uri: Option<String>,
    pub mongodb_db: String,
    /// Externally reachable base URL of this server, used as the gateway's
    /// callback target. Required once payments are enabled.
    pub server_base_url: Option<String>,
    /// Where browsers land after a payment callback resolves.
    pub client_base_url: String,
    pub payment: Option<PaymentConfig>,
    pub clamp_reg_count_at_zero: bool,
}

impl Config {
    /// Read and validate process configuration. Fails before the server binds
    /// so a misconfigured deployment never half-starts.
    pub fn from_env() -> anyhow::Result<Self> {
        let port = match env::var("PORT") {
            Ok(raw) => raw.parse().context("PORT must be a port number")?,
            Err(_) => 3000,
        };

        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < 32 {
            bail!("JWT_SECRET must be at least 32 characters long");
        }

        let timeout_secs = match env::var("SSLCZ_TIMEOUT_SECS") {
            Ok(raw) => raw.parse().context("SSLCZ_TIMEOUT_SECS must be a number of seconds")?,
            Err(_) => 30,
        };
        let payment = match (env::var("SSLCZ_STORE_ID"), env::var("SSLCZ_STORE_PASSWD")) {
            (Ok(store_id), Ok(store_passwd)) => Some(PaymentConfig {
                store_id,
                store_passwd,
                live: env_flag("SSLCZ_LIVE"),
                timeout: Duration::from_secs(timeout_secs),
            }),
            (Err(_), Err(_)) => None,
            _ => bail!("SSLCZ_STORE_ID and SSLCZ_STORE_PASSWD must be set together"),
        };

        let server_base_url = env::var("SERVER_BASE_URL").ok().map(strip_trailing_slash);
        if payment.is_some() && server_base_url.is_none() {
            bail!("SERVER_BASE_URL must be set when payment checkout is enabled");
        }

        let client_base_url = env::var("CLIENT_BASE_URL")
            .map(strip_trailing_slash)
            .unwrap_or_else(|_| "https://pace-pulse.web.app".to_string());

        Ok(Config {
            port,
            mongodb_uri: env::var("MONGODB_URI").ok(),
            mongodb_db: env::var("MONGODB_DB").unwrap_or_else(|_| "pace-pulse".to_string()),
            server_base_url,
            client_base_url,
            payment,
            clamp_reg_count_at_zero: env_flag("CLAMP_REG_COUNT_AT_ZERO"),
        })
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        env::var(name).ok().as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}

fn strip_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
