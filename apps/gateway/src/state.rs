use std::collections::HashMap;
use std::sync::Arc;

use rategate_application::{RateLimitRule, RateLimitService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Admission decision service.
    pub rate_limit_service: RateLimitService,
    /// Default rule for callers identified by network address.
    pub ip_rule: RateLimitRule,
    /// Per-credential rule overrides, keyed by API key.
    pub token_rules: Arc<HashMap<String, RateLimitRule>>,
}
