use batch_loader::LoaderConfig;

use crate::error::{Result, ServiceError};

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Service configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    /// Shared by the request and item loaders
    pub loader: LoaderConfig,
}

impl Config {
    /// Parse configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Parse configuration from an arbitrary variable source
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Support both DATABASE_URL and separate DB_* environment variables
        // (for compatibility with Cloud SQL socket connections)
        let database_url = match var("DATABASE_URL") {
            Some(url) => url,
            None => {
                let host = var("DB_HOST").ok_or_else(|| {
                    ServiceError::Config(
                        "DATABASE_URL or DB_HOST environment variable is required".to_string(),
                    )
                })?;
                let name = var("DB_NAME").unwrap_or_else(|| "materials".to_string());
                let user = var("DB_USER").unwrap_or_else(|| "postgres".to_string());
                let password = var("DB_PASSWORD").unwrap_or_default();

                if host.starts_with("/cloudsql/") {
                    format!(
                        "postgresql://{}:{}@localhost/{}?host={}",
                        user, password, name, host
                    )
                } else {
                    let port = var("DB_PORT").unwrap_or_else(|| "5432".to_string());
                    format!(
                        "postgresql://{}:{}@{}:{}/{}",
                        user, password, host, port, name
                    )
                }
            }
        };

        let max_connections = parse_var(&var, "DB_MAX_CONNECTIONS")?
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);

        let mut loader = LoaderConfig::default();
        if let Some(ttl_ms) = parse_var::<u64>(&var, "LOADER_TTL_MS")? {
            loader = loader.with_ttl_ms(ttl_ms);
        }
        if let Some(max) = parse_var::<usize>(&var, "LOADER_MAX_BATCH_SIZE")? {
            loader = loader.with_max_batch_size(max);
        }
        if let Some(enabled) = parse_var::<bool>(&var, "LOADER_CACHE_NEGATIVE")? {
            loader = loader.with_cache_negative_results(enabled);
        }
        loader.validate()?;

        Ok(Self {
            database_url,
            max_connections,
            loader,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>> {
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ServiceError::Config(format!("{name} has invalid value '{raw}'"))),
        None => Ok(None),
    }
}
