use std::path::PathBuf;

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_MEDIA_DIR: &str = "./media";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub media_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            media_dir: PathBuf::from(DEFAULT_MEDIA_DIR),
        }
    }
}

impl Config {
    /// Reads `HOST`, `PORT` and `MEDIA_DIR`, falling back to the defaults for
    /// anything unset. Call `dotenv::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("PORT is not a valid port: {port}")))?;
        }
        if let Some(dir) = lookup("MEDIA_DIR") {
            config.media_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.media_dir, PathBuf::from("./media"));
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("HOST", "127.0.0.1"),
            ("MEDIA_DIR", "/srv/media"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.media_dir, PathBuf::from("/srv/media"));
    }

    #[test]
    fn bad_port() {
        let err = Config::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
