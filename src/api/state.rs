use chrono::Duration;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::services::{check_in::CheckInRules, token::TokenSigner};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
    pub tokens: TokenSigner,
    pub rules: CheckInRules,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        let tokens = TokenSigner::new(
            config.token_secret.clone(),
            Duration::seconds(config.token_ttl_secs),
        );
        let rules = CheckInRules::from_config(&config);

        Self {
            store,
            config,
            tokens,
            rules,
        }
    }
}
