// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup and validated
//! before the server binds.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `JWT_SECRET` | Token verification secret (hex or base64) | Required |
//! | `GATEWAY_INTERNAL_SECRET` | Shared secret sent as `X-Internal-Auth` | Unset |
//! | `GATEWAY_ROUTES` | `service@prefix=url[,url];...` | Platform routes |
//! | `UPSTREAM_TIMEOUT_MS` | Downstream request timeout | `30000` |
//! | `UPSTREAM_CONNECT_TIMEOUT_MS` | Downstream connect timeout | `2000` |
//! | `MAX_BODY_BYTES` | Largest inbound body forwarded | `10485760` |
//! | `TLS_CERT_PATH` | PEM certificate chain, enables TLS | Unset |
//! | `TLS_KEY_PATH` | PEM private key, enables TLS | Unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;
use url::Url;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
/// Sent downstream on every forwarded request when set. Services behind the
/// gateway reject trust headers that arrive without it.
pub const INTERNAL_SECRET_ENV: &str = "GATEWAY_INTERNAL_SECRET";
pub const ROUTES_ENV: &str = "GATEWAY_ROUTES";
pub const UPSTREAM_TIMEOUT_ENV: &str = "UPSTREAM_TIMEOUT_MS";
pub const UPSTREAM_CONNECT_TIMEOUT_ENV: &str = "UPSTREAM_CONNECT_TIMEOUT_MS";
pub const MAX_BODY_BYTES_ENV: &str = "MAX_BODY_BYTES";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Route table used when `GATEWAY_ROUTES` is unset.
pub const DEFAULT_ROUTES: &str = "auth-service@/api/v1/auth=http://auth-service:8081;\
auth-service@/api/v1/admin=http://auth-service:8081;\
student-service@/api/v1/students=http://student-service:8082;\
student-service@/api/v1/schools=http://student-service:8082;\
student-service@/api/v1/classes=http://student-service:8082;\
grade-service@/api/v1/grades=http://grade-service:8083";

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Missing required variable
    #[error("Missing required configuration: {0}")]
    MissingRequired(&'static str),

    /// Variable present but unparseable
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError { name: &'static str, reason: String },

    /// Malformed `GATEWAY_ROUTES` entry
    #[error("Invalid route `{entry}`: {reason}")]
    InvalidRoute { entry: String, reason: String },

    /// Only one of the two TLS paths is set
    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    IncompleteTls,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

/// One configured route: a path prefix served by a named service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    pub service: String,
    pub prefix: String,
    pub instances: Vec<Url>,
}

impl RouteConfig {
    /// Parse `service@prefix=url[,url]`. An empty instance list is allowed.
    pub fn parse(entry: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRoute {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        let (target, instances) = entry.split_once('=').ok_or_else(|| invalid("missing `=`"))?;
        let (service, prefix) = target.split_once('@').ok_or_else(|| invalid("missing `@`"))?;
        let (service, prefix) = (service.trim(), prefix.trim());

        if service.is_empty() {
            return Err(invalid("empty service name"));
        }
        if !prefix.starts_with('/') {
            return Err(invalid("prefix must start with `/`"));
        }

        let instances = instances
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                let url = Url::parse(s).map_err(|e| invalid(&format!("{s}: {e}")))?;
                match url.scheme() {
                    "http" | "https" => Ok(url),
                    _ => Err(invalid(&format!("{s}: scheme must be http or https"))),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            service: service.to_string(),
            prefix: prefix.to_string(),
            instances,
        })
    }

    /// Parse a `;`-separated list of routes.
    pub fn parse_list(value: &str) -> Result<Vec<Self>, ConfigError> {
        value
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse)
            .collect()
    }
}

/// TLS termination files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Raw token secret; decoded lazily by the key cache
    pub jwt_secret: String,
    pub internal_secret: Option<String>,
    pub routes: Vec<RouteConfig>,
    pub upstream_timeout: Duration,
    pub upstream_connect_timeout: Duration,
    pub max_body_bytes: usize,
    pub tls: Option<TlsPaths>,
    pub log_format: LogFormat,
}

impl GatewayConfig {
    /// Loads configuration from environment variables with validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let jwt_secret = var(JWT_SECRET_ENV).ok_or(ConfigError::MissingRequired(JWT_SECRET_ENV))?;

        let routes = match var(ROUTES_ENV) {
            Some(value) => RouteConfig::parse_list(&value)?,
            None => RouteConfig::parse_list(DEFAULT_ROUTES)?,
        };

        let tls = match (var(TLS_CERT_PATH_ENV), var(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        let config = Self {
            host: var(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_var(&var, PORT_ENV, DEFAULT_PORT)?,
            jwt_secret,
            internal_secret: var(INTERNAL_SECRET_ENV).map(|s| s.trim().to_string()),
            routes,
            upstream_timeout: Duration::from_millis(parse_var(
                &var,
                UPSTREAM_TIMEOUT_ENV,
                DEFAULT_UPSTREAM_TIMEOUT_MS,
            )?),
            upstream_connect_timeout: Duration::from_millis(parse_var(
                &var,
                UPSTREAM_CONNECT_TIMEOUT_ENV,
                DEFAULT_UPSTREAM_CONNECT_TIMEOUT_MS,
            )?),
            max_body_bytes: parse_var(&var, MAX_BODY_BYTES_ENV, DEFAULT_MAX_BODY_BYTES)?,
            tls,
            log_format: parse_var(&var, LOG_FORMAT_ENV, LogFormat::default())?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ParseError {
                name: PORT_ENV,
                reason: "port must be between 1 and 65535".to_string(),
            });
        }
        for (name, value) in [
            (UPSTREAM_TIMEOUT_ENV, self.upstream_timeout),
            (UPSTREAM_CONNECT_TIMEOUT_ENV, self.upstream_connect_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ParseError {
                    name,
                    reason: "timeout must be greater than 0".to_string(),
                });
            }
        }
        if let Some(secret) = &self.internal_secret {
            if axum::http::HeaderValue::from_str(secret).is_err() {
                return Err(ConfigError::ParseError {
                    name: INTERNAL_SECRET_ENV,
                    reason: "not a valid header value".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Socket address to bind.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::ParseError {
                name: HOST_ENV,
                reason: e.to_string(),
            })
    }
}

/// Parse a variable with a default value.
fn parse_var<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
