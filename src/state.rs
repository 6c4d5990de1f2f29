// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use axum::extract::FromRef;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::auth::{KeyError, KeyMaterialCache, TokenValidator};
use crate::config::GatewayConfig;
use crate::filter::GatewayGate;
use crate::identity::InternalTrust;
use crate::policy::AccessPolicy;
use crate::proxy::Proxy;

/// Failures that abort process start.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("token key material unusable: {0}")]
    Key(#[from] KeyError),

    #[error("failed to build downstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to initialize logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub keys: Arc<KeyMaterialCache>,
    pub gate: Arc<GatewayGate>,
    pub proxy: Arc<Proxy>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Build the state and derive the token key eagerly, so a bad secret
    /// stops the process instead of failing requests.
    pub fn new(config: GatewayConfig) -> Result<Self, StartupError> {
        let keys = Arc::new(KeyMaterialCache::new(&config.jwt_secret));
        let key = keys.get_key()?;
        tracing::info!(key_bytes = key.len(), "Token key material ready");

        let gate = GatewayGate::new(
            TokenValidator::new(keys.clone()),
            AccessPolicy::school_platform(),
            config.internal_secret.clone(),
        );
        let proxy = Proxy::from_config(&config)?;

        Ok(Self {
            config: Arc::new(config),
            keys,
            gate: Arc::new(gate),
            proxy: Arc::new(proxy),
            started_at: Utc::now(),
        })
    }
}

impl FromRef<AppState> for Arc<GatewayGate> {
    fn from_ref(state: &AppState) -> Self {
        state.gate.clone()
    }
}

impl FromRef<AppState> for Arc<Proxy> {
    fn from_ref(state: &AppState) -> Self {
        state.proxy.clone()
    }
}

impl FromRef<AppState> for InternalTrust {
    fn from_ref(state: &AppState) -> Self {
        InternalTrust::new(state.config.internal_secret.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_config;

    #[test]
    fn short_secret_aborts_startup() {
        let mut config = test_config();
        config.jwt_secret = "c2hvcnQ=".into();
        assert!(matches!(
            AppState::new(config),
            Err(StartupError::Key(KeyError::TooShort { .. }))
        ));
    }

    #[test]
    fn valid_config_builds_state() {
        let state = AppState::new(test_config()).unwrap();
        assert!(state.keys.is_ready());
        assert_eq!(state.proxy.routes().routes().len(), test_config().routes.len());
    }
}
