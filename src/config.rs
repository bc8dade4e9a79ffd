use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::types::LLMProvider;

/// 10 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LLMConfig,
    pub storage: StorageConfig,
    pub retrieval: RetrievalConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub google_api_key: String,
    pub openai_api_key: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl LLMConfig {
    /// API key for the configured provider, if one is set.
    pub fn active_api_key(&self) -> Option<String> {
        let key = match self.provider {
            LLMProvider::Google => &self.google_api_key,
            LLMProvider::OpenAI => &self.openai_api_key,
        };
        if key.is_empty() {
            None
        } else {
            Some(key.clone())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub max_file_size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let provider_name = var("LLM_PROVIDER", "google");
        let provider = LLMProvider::parse(&provider_name).with_context(|| {
            format!(
                "Unknown LLM_PROVIDER '{}'. Must be google or openai.",
                provider_name
            )
        })?;
        let (default_chat_model, default_embedding_model) = match provider {
            LLMProvider::Google => ("gemini-2.0-flash", "embedding-001"),
            LLMProvider::OpenAI => ("gpt-4o-mini", "text-embedding-3-small"),
        };

        let config = Self {
            server: ServerConfig {
                port: var("PORT", "8000").parse().context("PORT must be a port number")?,
                host: var("HOST", "0.0.0.0"),
                cors_allowed_origins: var("ALLOWED_ORIGINS", "*")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").context("DATABASE_URL must be set")?,
                max_connections: var("DB_MAX_CONNECTIONS", "10")
                    .parse()
                    .context("DB_MAX_CONNECTIONS must be an integer")?,
                min_connections: var("DB_MIN_CONNECTIONS", "1")
                    .parse()
                    .context("DB_MIN_CONNECTIONS must be an integer")?,
            },
            llm: LLMConfig {
                provider,
                google_api_key: var("GOOGLE_API_KEY", ""),
                openai_api_key: var("OPENAI_API_KEY", ""),
                chat_model: var("CHAT_MODEL", default_chat_model),
                embedding_model: var("EMBEDDING_MODEL", default_embedding_model),
                temperature: var("LLM_TEMPERATURE", "0.1")
                    .parse()
                    .context("LLM_TEMPERATURE must be a number")?,
                base_url: lookup("LLM_BASE_URL").filter(|s| !s.is_empty()),
                timeout_secs: var("LLM_TIMEOUT_SECS", "60")
                    .parse()
                    .context("LLM_TIMEOUT_SECS must be an integer")?,
            },
            storage: StorageConfig {
                upload_dir: PathBuf::from(var("UPLOAD_DIR", "./uploads")),
                max_file_size: var("MAX_FILE_SIZE", &DEFAULT_MAX_FILE_SIZE.to_string())
                    .parse()
                    .context("MAX_FILE_SIZE must be a byte count")?,
            },
            retrieval: RetrievalConfig {
                chunk_size: var("CHUNK_SIZE", "1000")
                    .parse()
                    .context("CHUNK_SIZE must be an integer")?,
                chunk_overlap: var("CHUNK_OVERLAP", "200")
                    .parse()
                    .context("CHUNK_OVERLAP must be an integer")?,
                top_k: var("RETRIEVAL_TOP_K", "4")
                    .parse()
                    .context("RETRIEVAL_TOP_K must be an integer")?,
            },
            logging: LoggingConfig {
                log_dir: lookup("LOG_DIR").filter(|s| !s.is_empty()).map(PathBuf::from),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.retrieval.chunk_size == 0 {
            bail!("CHUNK_SIZE must be > 0");
        }
        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            bail!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.retrieval.chunk_overlap,
                self.retrieval.chunk_size
            );
        }
        if self.retrieval.top_k == 0 {
            bail!("RETRIEVAL_TOP_K must be >= 1");
        }
        if self.storage.max_file_size == 0 {
            bail!("MAX_FILE_SIZE must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://localhost/pdf_qa")]))
                .unwrap();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.cors_allowed_origins, vec!["*".to_string()]);
        assert_eq!(config.storage.upload_dir, PathBuf::from("./uploads"));
        assert_eq!(config.storage.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.llm.provider, LLMProvider::Google);
        assert_eq!(config.llm.chat_model, "gemini-2.0-flash");
        assert_eq!(config.llm.embedding_model, "embedding-001");
        assert!((config.llm.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.chunk_size, 1000);
        assert_eq!(config.retrieval.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 4);
        assert!(config.llm.active_api_key().is_none());
        assert!(config.logging.log_dir.is_none());
    }

    #[test]
    fn test_missing_database_url() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_openai_provider_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/pdf_qa"),
            ("LLM_PROVIDER", "openai"),
            ("OPENAI_API_KEY", "sk-test"),
        ]))
        .unwrap();

        assert_eq!(config.llm.provider, LLMProvider::OpenAI);
        assert_eq!(config.llm.chat_model, "gpt-4o-mini");
        assert_eq!(config.llm.embedding_model, "text-embedding-3-small");
        assert_eq!(config.llm.active_api_key().as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/pdf_qa"),
            ("LLM_PROVIDER", "anthropic"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("LLM_PROVIDER"));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/pdf_qa"),
            ("CHUNK_SIZE", "200"),
            ("CHUNK_OVERLAP", "200"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("CHUNK_OVERLAP"));
    }

    #[test]
    fn test_origin_list_parsing() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/pdf_qa"),
            ("ALLOWED_ORIGINS", "http://localhost:3000, http://localhost:5173,"),
        ]))
        .unwrap();
        assert_eq!(
            config.server.cors_allowed_origins,
            vec!["http://localhost:3000", "http://localhost:5173"]
        );
    }
}
