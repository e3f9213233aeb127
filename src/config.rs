use std::path::PathBuf;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_DATA_DIR: &str = "data";
const SNAPSHOT_FILE: &str = "state.json";
const MIN_SECRET_LEN: usize = 32;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("JWT_SECRET must be at least {MIN_SECRET_LEN} characters long")]
    WeakSecret,
}

/// Process configuration, read once at start-up.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind: String,
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub frontend_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env` over an arbitrary key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }
        Ok(Self {
            bind: get("LITREVIEW_BIND").unwrap_or_else(|| DEFAULT_BIND.into()),
            data_dir: get("LITREVIEW_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            database_url: get("DATABASE_URL"),
            jwt_secret,
            frontend_url: get("FRONTEND_URL"),
        })
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k: &str| m.get(k).cloned()
    }

    #[test]
    fn defaults_apply() {
        let secret = "s".repeat(32);
        let cfg = AppConfig::from_lookup(lookup(&[("JWT_SECRET", secret.as_str())])).unwrap();
        assert_eq!(cfg.bind, DEFAULT_BIND);
        assert_eq!(cfg.snapshot_path(), PathBuf::from("data/state.json"));
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn secret_is_required_and_long() {
        assert!(matches!(AppConfig::from_lookup(lookup(&[])), Err(ConfigError::Missing("JWT_SECRET"))));
        assert!(matches!(AppConfig::from_lookup(lookup(&[("JWT_SECRET", "short")])), Err(ConfigError::WeakSecret)));
    }
}
