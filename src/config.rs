//! Configuration management for Chunkstream Server

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub chunks: ChunkConfig,
    pub download: DownloadConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on a single chunk request body
    pub max_chunk_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub enum ChunkConfig {
    Local { base_path: PathBuf },
    S3(S3Config),
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
    pub prefix: String,
}

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Delay inserted between streamed chunks, in milliseconds
    pub pacing_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                max_chunk_bytes: 64 * 1024 * 1024,
            },
            database: DatabaseConfig {
                url: "sqlite:./sessions.db".to_string(),
                max_connections: 5,
            },
            chunks: ChunkConfig::Local {
                base_path: PathBuf::from("./data"),
            },
            download: DownloadConfig { pacing_ms: 0 },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let chunks = match lookup("CHUNK_BACKEND").as_deref().unwrap_or("local") {
            "local" => ChunkConfig::Local {
                base_path: lookup("CHUNK_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./data")),
            },
            "s3" => ChunkConfig::S3(S3Config {
                endpoint: required(&lookup, "S3_ENDPOINT")?,
                bucket: required(&lookup, "S3_BUCKET")?,
                access_key: required(&lookup, "S3_ACCESS_KEY")?,
                secret_key: required(&lookup, "S3_SECRET_KEY")?,
                region: lookup("S3_REGION"),
                prefix: lookup("S3_PREFIX").unwrap_or_else(|| "uploads".to_string()),
            }),
            other => {
                return Err(ConfigError::Invalid {
                    name: "CHUNK_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parsed(&lookup, "SERVER_PORT", defaults.server.port)?,
                max_chunk_bytes: parsed(
                    &lookup,
                    "MAX_CHUNK_BYTES",
                    defaults.server.max_chunk_bytes,
                )?,
            },
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: parsed(
                    &lookup,
                    "DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                )?,
            },
            chunks,
            download: DownloadConfig {
                pacing_ms: parsed(&lookup, "DOWNLOAD_PACING_MS", defaults.download.pacing_ms)?,
            },
        })
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).ok_or(ConfigError::Missing(name))
}

fn parsed<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.database.url, "sqlite:./sessions.db");
        assert_eq!(config.download.pacing_ms, 0);
        assert!(matches!(config.chunks, ChunkConfig::Local { .. }));
    }

    #[test]
    fn test_s3_backend_requires_credentials() {
        let result = Config::from_lookup(lookup_from(&[
            ("CHUNK_BACKEND", "s3"),
            ("S3_ENDPOINT", "http://localhost:9000"),
        ]));
        assert!(matches!(result, Err(ConfigError::Missing("S3_BUCKET"))));
    }

    #[test]
    fn test_s3_backend() {
        let config = Config::from_lookup(lookup_from(&[
            ("CHUNK_BACKEND", "s3"),
            ("S3_ENDPOINT", "http://localhost:9000"),
            ("S3_BUCKET", "chunks"),
            ("S3_ACCESS_KEY", "admin"),
            ("S3_SECRET_KEY", "secret"),
        ]))
        .unwrap();

        match config.chunks {
            ChunkConfig::S3(s3) => {
                assert_eq!(s3.bucket, "chunks");
                assert_eq!(s3.prefix, "uploads");
                assert_eq!(s3.region, None);
            }
            other => panic!("unexpected backend: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_port() {
        let result = Config::from_lookup(lookup_from(&[("SERVER_PORT", "eighty")]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { name: "SERVER_PORT", .. })
        ));
    }

    #[test]
    fn test_unknown_backend() {
        let result = Config::from_lookup(lookup_from(&[("CHUNK_BACKEND", "tape")]));
        assert!(result.is_err());
    }
}
