use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use figment::providers::{Env, Serialized};
use figment::Figment;
use jsonwebtoken::Algorithm;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub secret_key: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

const KEYS: [&str; 5] = [
    "database_url",
    "secret_key",
    "algorithm",
    "bind_addr",
    "upload_dir",
];

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

impl Config {
    /// Reads `DATABASE_URL`, `SECRET_KEY`, `ALGORITHM`, `BIND_ADDR` and
    /// `UPLOAD_DIR` from the process environment.
    ///
    /// Values are taken verbatim, so a secret such as `123456` or `true` stays
    /// a string instead of being parsed into a number or a bool.
    pub fn from_env() -> anyhow::Result<Self> {
        let raw: BTreeMap<String, String> = Env::raw()
            .only(&KEYS)
            .iter()
            .map(|(key, value)| (key.as_str().to_string(), value))
            .collect();

        let config: Config = Figment::from(Serialized::defaults(raw))
            .extract()
            .context("invalid configuration")?;

        if config.secret_key.is_empty() {
            anyhow::bail!("SECRET_KEY environment variable is required");
        }
        config.token_algorithm()?;
        Ok(config)
    }

    pub fn token_algorithm(&self) -> anyhow::Result<Algorithm> {
        let algorithm = Algorithm::from_str(&self.algorithm)
            .with_context(|| format!("unknown ALGORITHM `{}`", self.algorithm))?;
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
            other => anyhow::bail!("ALGORITHM must be HS256, HS384 or HS512, got {:?}", other),
        }
    }
}
