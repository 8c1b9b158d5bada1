use std::collections::HashMap;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use rategate_application::RateLimitRule;
use rategate_core::{AppError, AppResult};
use tracing_subscriber::EnvFilter;

/// Environment variable prefix for per-token rule overrides, declared as
/// `API_KEY_<TOKEN>=LIMIT,BLOCK_SECONDS`.
const TOKEN_RULE_PREFIX: &str = "API_KEY_";

/// Runtime configuration for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Connection URL for the Redis backend.
    pub redis_url: String,
    /// Interface the gateway binds to.
    pub gateway_host: String,
    /// Port the gateway binds to.
    pub gateway_port: u16,
    /// Default rule for callers identified by network address.
    pub ip_rule: RateLimitRule,
    /// Per-credential rule overrides, keyed by API key.
    pub token_rules: HashMap<String, RateLimitRule>,
}

impl GatewayConfig {
    /// Loads configuration from the process environment.
    pub fn load() -> AppResult<Self> {
        Self::from_vars(&env::vars().collect())
    }

    fn from_vars(vars: &HashMap<String, String>) -> AppResult<Self> {
        let redis_url = trimmed(vars, "REDIS_URL")
            .map(ToOwned::to_owned)
            .ok_or_else(|| AppError::Validation("REDIS_URL is required".to_owned()))?;

        let gateway_host = trimmed(vars, "GATEWAY_HOST")
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| "0.0.0.0".to_owned());
        let gateway_port = match trimmed(vars, "GATEWAY_PORT") {
            Some(value) => value.parse::<u16>().map_err(|error| {
                AppError::Validation(format!("invalid GATEWAY_PORT: {error}"))
            })?,
            None => 8080,
        };

        let default_limit = match trimmed(vars, "DEFAULT_RATE_LIMIT_IP") {
            Some(value) => {
                let limit = value.parse::<i64>().map_err(|error| {
                    AppError::Validation(format!("invalid DEFAULT_RATE_LIMIT_IP: {error}"))
                })?;
                if limit < 1 {
                    return Err(AppError::Validation(
                        "DEFAULT_RATE_LIMIT_IP must be at least 1".to_owned(),
                    ));
                }
                limit
            }
            None => 5,
        };

        let default_block_seconds = match trimmed(vars, "DEFAULT_BLOCK_DURATION_SECONDS") {
            Some(value) => value.parse::<u64>().map_err(|error| {
                AppError::Validation(format!("invalid DEFAULT_BLOCK_DURATION_SECONDS: {error}"))
            })?,
            None => 300,
        };

        let mut token_rules = HashMap::new();
        for (name, value) in vars {
            let Some(token) = name.strip_prefix(TOKEN_RULE_PREFIX) else {
                continue;
            };
            if token.is_empty() {
                continue;
            }

            let rule = parse_token_rule(value)
                .map_err(|reason| AppError::Validation(format!("invalid {name}: {reason}")))?;
            token_rules.insert(token.to_owned(), rule);
        }

        Ok(Self {
            redis_url,
            gateway_host,
            gateway_port,
            ip_rule: RateLimitRule::new(default_limit, Duration::from_secs(default_block_seconds)),
            token_rules,
        })
    }

    /// Socket address the gateway listens on.
    pub fn socket_address(&self) -> AppResult<SocketAddr> {
        let host = IpAddr::from_str(&self.gateway_host).map_err(|error| {
            AppError::Validation(format!(
                "invalid GATEWAY_HOST '{}': {error}",
                self.gateway_host
            ))
        })?;
        Ok(SocketAddr::from((host, self.gateway_port)))
    }
}

/// Initializes the tracing subscriber from `RUST_LOG`, defaulting to info.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn trimmed<'a>(vars: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    vars.get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn parse_token_rule(value: &str) -> Result<RateLimitRule, String> {
    let mut parts = value.split(',');
    let (Some(limit), Some(block_seconds), None) = (parts.next(), parts.next(), parts.next())
    else {
        return Err("expected LIMIT,BLOCK_SECONDS".to_owned());
    };

    let limit = limit
        .trim()
        .parse::<i64>()
        .map_err(|error| format!("invalid limit: {error}"))?;
    if limit < 1 {
        return Err("limit must be at least 1".to_owned());
    }

    let block_seconds = block_seconds
        .trim()
        .parse::<u64>()
        .map_err(|error| format!("invalid block duration: {error}"))?;

    Ok(RateLimitRule::new(
        limit,
        Duration::from_secs(block_seconds),
    ))
}
