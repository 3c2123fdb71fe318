//! Environment-driven configuration for the civiq service.
//!
//! Every setting has a default so the service starts with no environment at all:
//! built-in permission table, empty user directory, one hour sessions.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::identity::ScopePolicy;

pub const ENV_HTTP_PORT: &str = "CIVIQ_HTTP_PORT";
pub const ENV_PERMISSIONS_FILE: &str = "CIVIQ_PERMISSIONS_FILE";
pub const ENV_USERS_FILE: &str = "CIVIQ_USERS_FILE";
pub const ENV_SESSION_TTL_SECS: &str = "CIVIQ_SESSION_TTL_SECS";
pub const ENV_GATE_REDIRECT: &str = "CIVIQ_GATE_REDIRECT";
pub const ENV_STRICT_ZERO_COMMUNE: &str = "CIVIQ_STRICT_ZERO_COMMUNE";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },
    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub http_port: u16,
    pub permissions_file: Option<PathBuf>,
    pub users_file: Option<PathBuf>,
    pub session_ttl: Duration,
    pub gate_redirect: String,
    pub scope_policy: ScopePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 7878,
            permissions_file: None,
            users_file: None,
            session_ttl: Duration::from_secs(60 * 60),
            gate_redirect: "/".to_string(),
            scope_policy: ScopePolicy::default(),
        }
    }
}

impl Config {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();
        if let Some(v) = lookup(ENV_HTTP_PORT) {
            cfg.http_port = v.trim().parse().map_err(|_| ConfigError::InvalidValue { var: ENV_HTTP_PORT, value: v.clone() })?;
        }
        if let Some(v) = lookup(ENV_PERMISSIONS_FILE) {
            cfg.permissions_file = Some(non_empty_path(ENV_PERMISSIONS_FILE, &v)?);
        }
        if let Some(v) = lookup(ENV_USERS_FILE) {
            cfg.users_file = Some(non_empty_path(ENV_USERS_FILE, &v)?);
        }
        if let Some(v) = lookup(ENV_SESSION_TTL_SECS) {
            let secs: u64 = v.trim().parse().map_err(|_| ConfigError::InvalidValue { var: ENV_SESSION_TTL_SECS, value: v.clone() })?;
            cfg.session_ttl = Duration::from_secs(secs);
        }
        if let Some(v) = lookup(ENV_GATE_REDIRECT) {
            let v = v.trim();
            if v.is_empty() { return Err(ConfigError::Empty { var: ENV_GATE_REDIRECT }); }
            cfg.gate_redirect = v.to_string();
        }
        if let Some(v) = lookup(ENV_STRICT_ZERO_COMMUNE) {
            cfg.scope_policy.strict_zero = parse_bool(ENV_STRICT_ZERO_COMMUNE, &v)?;
        }
        Ok(cfg)
    }
}

fn non_empty_path(var: &'static str, v: &str) -> Result<PathBuf, ConfigError> {
    let t = v.trim();
    if t.is_empty() { return Err(ConfigError::Empty { var }); }
    Ok(PathBuf::from(t))
}

fn parse_bool(var: &'static str, v: &str) -> Result<bool, ConfigError> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { var, value: v.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = Config::from_lookup(|_| None).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.http_port, 7878);
        assert_eq!(cfg.gate_redirect, "/");
        assert!(!cfg.scope_policy.strict_zero);
    }

    #[test]
    fn reads_every_variable() {
        let cfg = Config::from_lookup(lookup_from(&[
            (ENV_HTTP_PORT, "9000"),
            (ENV_PERMISSIONS_FILE, "/etc/civiq/permissions.json"),
            (ENV_USERS_FILE, " users.json "),
            (ENV_SESSION_TTL_SECS, "120"),
            (ENV_GATE_REDIRECT, "/connexion"),
            (ENV_STRICT_ZERO_COMMUNE, "TRUE"),
        ]))
        .unwrap();
        assert_eq!(cfg.http_port, 9000);
        assert_eq!(cfg.permissions_file, Some(PathBuf::from("/etc/civiq/permissions.json")));
        assert_eq!(cfg.users_file, Some(PathBuf::from("users.json")));
        assert_eq!(cfg.session_ttl, Duration::from_secs(120));
        assert_eq!(cfg.gate_redirect, "/connexion");
        assert!(cfg.scope_policy.strict_zero);
    }

    #[test]
    fn rejects_bad_port() {
        let err = Config::from_lookup(lookup_from(&[(ENV_HTTP_PORT, "port")])).unwrap_err();
        assert_eq!(err, ConfigError::InvalidValue { var: ENV_HTTP_PORT, value: "port".into() });
    }

    #[test]
    fn rejects_bad_bool_and_empty_redirect() {
        assert!(Config::from_lookup(lookup_from(&[(ENV_STRICT_ZERO_COMMUNE, "maybe")])).is_err());
        let err = Config::from_lookup(lookup_from(&[(ENV_GATE_REDIRECT, "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Empty { var: ENV_GATE_REDIRECT });
    }
}
