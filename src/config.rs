//! Configuration loading.
//!
//! Settings come from three layers, lowest precedence first: built-in
//! defaults, an optional TOML file, and environment variables. Secrets
//! (database password, storage keys, generation API key) are normally
//! supplied through the environment only.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8080"
//! cors_origins = ["http://localhost:3000"]
//!
//! [database]
//! query_url = "http://localhost:8093"
//! search_url = "http://localhost:8094"
//! bucket = "bpt-knowledge-center"
//! scope = "knowledge-base"
//!
//! [storage]
//! endpoint = "http://localhost:9000"
//! bucket = "bpt-docs"
//!
//! [parser]
//! url = "http://localhost:8000/api/v1/parse"
//! ```
//!
//! Missing required values are reported together and are fatal at startup.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}
fn default_max_upload_mb() -> usize {
    50
}

/// Couchbase connection settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// Query service base URL (e.g. `http://cb.local:8093`).
    #[serde(default)]
    pub query_url: Option<String>,
    /// Search service base URL (e.g. `http://cb.local:8094`).
    #[serde(default)]
    pub search_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_search_index")]
    pub search_index: String,
    #[serde(default = "default_vector_field")]
    pub vector_field: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            query_url: None,
            search_url: None,
            username: None,
            password: None,
            bucket: None,
            scope: None,
            collection: default_collection(),
            search_index: default_search_index(),
            vector_field: default_vector_field(),
        }
    }
}

fn default_collection() -> String {
    "bpt-docs".to_string()
}
fn default_search_index() -> String {
    "knowledge_vector_search".to_string()
}
fn default_vector_field() -> String {
    "chunks.vector".to_string()
}

/// S3-compatible object store settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            access_key: None,
            secret_key: None,
            bucket: None,
            region: default_region(),
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ParserConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_parser_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_parser_timeout_secs(),
        }
    }
}

fn default_parser_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_url")]
    pub url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
        }
    }
}

fn default_embedding_url() -> String {
    "http://localhost:8000/api/v1/embed".to_string()
}

/// Answer generation settings. Without an API key generation is skipped
/// and chat falls back to raw search results.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenerationConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_generation_base_url(),
            temperature: default_temperature(),
        }
    }
}

fn default_model() -> String {
    "gemini-3-flash-preview".to_string()
}
fn default_generation_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_temperature() -> f64 {
    0.2
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    #[serde(default = "default_search_limit")]
    pub num_candidates: usize,
    /// Field projection; `["*"]` requests every stored field.
    #[serde(default = "default_search_fields")]
    pub fields: Vec<String>,
    /// Read the parent document when a hit has no source metadata.
    #[serde(default = "default_true")]
    pub lookup_missing_source: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
            num_candidates: default_search_limit(),
            fields: default_search_fields(),
            lookup_missing_source: true,
        }
    }
}

fn default_search_limit() -> usize {
    knowledge_center_core::search::DEFAULT_LIMIT
}
fn default_search_fields() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_true() -> bool {
    true
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

impl Config {
    /// Copy of this config with every secret masked, for display.
    pub fn redacted(&self) -> Config {
        fn mask(value: &Option<String>) -> Option<String> {
            value.as_ref().map(|_| "***".to_string())
        }
        let mut copy = self.clone();
        copy.database.password = mask(&self.database.password);
        copy.storage.access_key = mask(&self.storage.access_key);
        copy.storage.secret_key = mask(&self.storage.secret_key);
        copy.generation.api_key = mask(&self.generation.api_key);
        copy
    }
}

/// Borrow a required setting, naming it in the error when absent.
pub fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => bail!("{} is not configured", name),
    }
}

/// Load configuration from an optional TOML file plus the process environment.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };

    apply_env(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Overlay environment variables onto `config`.
///
/// `lookup` resolves a variable name; empty values count as unset.
pub fn apply_env<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(port) = get("PORT") {
        config.server.bind = format!("0.0.0.0:{}", port.trim());
    }

    let db = &mut config.database;
    set_opt(&mut db.query_url, get("DB_QUERY_URL"));
    set_opt(&mut db.search_url, get("DB_SEARCH_URL"));
    if let Some(host) = get("DB_HOST") {
        if db.query_url.is_none() {
            db.query_url = Some(service_url(&host, CouchbaseService::Query));
        }
        if db.search_url.is_none() {
            db.search_url = Some(service_url(&host, CouchbaseService::Search));
        }
    }
    set_opt(&mut db.username, get("DB_USERNAME"));
    set_opt(&mut db.password, get("DB_PASSWORD"));
    set_opt(&mut db.bucket, get("DB_BUCKET"));
    set_opt(&mut db.scope, get("DB_SCOPE"));
    set_str(&mut db.collection, get("DB_COLLECTION"));
    set_str(&mut db.search_index, get("DB_SEARCH_INDEX"));

    let storage = &mut config.storage;
    set_opt(&mut storage.endpoint, get("STORAGE_ENDPOINT"));
    set_opt(&mut storage.access_key, get("STORAGE_ACCESS_KEY"));
    set_opt(&mut storage.secret_key, get("STORAGE_SECRET_KEY"));
    set_opt(&mut storage.bucket, get("STORAGE_BUCKET"));
    set_str(&mut storage.region, get("STORAGE_REGION"));

    set_opt(&mut config.parser.url, get("PARSER_URL"));
    set_str(&mut config.embedding.url, get("EMBEDDING_URL"));

    set_opt(
        &mut config.generation.api_key,
        get("GOOGLE_API_KEY").or_else(|| get("GEMINI_API_KEY")),
    );
}

fn set_opt(slot: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *slot = value;
    }
}

fn set_str(slot: &mut String, value: Option<String>) {
    if let Some(v) = value {
        *slot = v;
    }
}

#[derive(Debug, Clone, Copy)]
enum CouchbaseService {
    Query,
    Search,
}

/// Derive a service base URL from a `DB_HOST` connection string.
///
/// `couchbases://` and `https://` select the TLS ports. Only the first host
/// of a comma-separated seed list is used.
fn service_url(host: &str, service: CouchbaseService) -> String {
    let host = host.trim();
    let (tls, rest) = if let Some(rest) = host.strip_prefix("couchbases://") {
        (true, rest)
    } else if let Some(rest) = host.strip_prefix("https://") {
        (true, rest)
    } else if let Some(rest) = host.strip_prefix("couchbase://") {
        (false, rest)
    } else if let Some(rest) = host.strip_prefix("http://") {
        (false, rest)
    } else {
        (false, host)
    };

    let first = rest.split(',').next().unwrap_or(rest);
    let first = first.split(['/', '?']).next().unwrap_or(first);
    let hostname = first.split(':').next().unwrap_or(first);

    let port = match (service, tls) {
        (CouchbaseService::Query, false) => 8093,
        (CouchbaseService::Query, true) => 18093,
        (CouchbaseService::Search, false) => 8094,
        (CouchbaseService::Search, true) => 18094,
    };
    let scheme = if tls { "https" } else { "http" };
    format!("{}://{}:{}", scheme, hostname, port)
}

/// Check required values and numeric bounds.
pub fn validate(config: &Config) -> Result<()> {
    let checks: [(&Option<String>, &str); 11] = [
        (&config.database.query_url, "DB_QUERY_URL (or DB_HOST)"),
        (&config.database.search_url, "DB_SEARCH_URL (or DB_HOST)"),
        (&config.database.username, "DB_USERNAME"),
        (&config.database.password, "DB_PASSWORD"),
        (&config.database.bucket, "DB_BUCKET"),
        (&config.database.scope, "DB_SCOPE"),
        (&config.storage.endpoint, "STORAGE_ENDPOINT"),
        (&config.storage.access_key, "STORAGE_ACCESS_KEY"),
        (&config.storage.secret_key, "STORAGE_SECRET_KEY"),
        (&config.storage.bucket, "STORAGE_BUCKET"),
        (&config.parser.url, "PARSER_URL"),
    ];
    let missing: Vec<&str> = checks
        .iter()
        .filter(|(value, _)| value.as_deref().map_or(true, str::is_empty))
        .map(|(_, name)| *name)
        .collect();
    if !missing.is_empty() {
        bail!("missing required configuration: {}", missing.join(", "));
    }

    if config.search.limit == 0 {
        bail!("search.limit must be >= 1");
    }
    if config.search.num_candidates < config.search.limit {
        bail!("search.num_candidates must be >= search.limit");
    }
    if config.parser.timeout_secs == 0 {
        bail!("parser.timeout_secs must be > 0");
    }
    if config.server.max_upload_mb == 0 {
        bail!("server.max_upload_mb must be > 0");
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DB_HOST", "couchbase://cb.local"),
            ("DB_USERNAME", "admin"),
            ("DB_PASSWORD", "secret"),
            ("DB_BUCKET", "bpt-knowledge-center"),
            ("DB_SCOPE", "knowledge-base"),
            ("STORAGE_ENDPOINT", "http://minio:9000"),
            ("STORAGE_ACCESS_KEY", "ak"),
            ("STORAGE_SECRET_KEY", "sk"),
            ("STORAGE_BUCKET", "docs"),
            ("PARSER_URL", "http://parser:8000/api/v1/parse"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.database.collection, "bpt-docs");
        assert_eq!(config.database.search_index, "knowledge_vector_search");
        assert_eq!(config.search.limit, 3);
        assert_eq!(config.parser.timeout_secs, 60);
        assert!(!config.generation.is_enabled());
    }

    #[test]
    fn test_env_overlay_fills_required_values() {
        let mut config = Config::default();
        apply_env(&mut config, env(&full_env()));
        validate(&config).unwrap();
        assert_eq!(
            config.database.query_url.as_deref(),
            Some("http://cb.local:8093")
        );
        assert_eq!(
            config.database.search_url.as_deref(),
            Some("http://cb.local:8094")
        );
    }

    #[test]
    fn test_missing_values_reported_together() {
        let mut config = Config::default();
        apply_env(&mut config, env(&[("DB_USERNAME", "admin")]));
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("DB_PASSWORD"));
        assert!(err.contains("STORAGE_BUCKET"));
        assert!(err.contains("PARSER_URL"));
        assert!(!err.contains("DB_USERNAME,"));
    }

    #[test]
    fn test_empty_env_values_are_unset() {
        let mut config = Config::default();
        apply_env(&mut config, env(&[("PARSER_URL", "  ")]));
        assert!(config.parser.url.is_none());
    }

    #[test]
    fn test_tls_host_uses_secure_ports() {
        assert_eq!(
            service_url("couchbases://a.cloud.couchbase.com,b", CouchbaseService::Query),
            "https://a.cloud.couchbase.com:18093"
        );
        assert_eq!(
            service_url("cb.local:11210", CouchbaseService::Search),
            "http://cb.local:8094"
        );
    }

    #[test]
    fn test_explicit_urls_beat_db_host() {
        let mut config = Config::default();
        apply_env(
            &mut config,
            env(&[
                ("DB_HOST", "couchbase://cb.local"),
                ("DB_QUERY_URL", "http://query:9000"),
            ]),
        );
        assert_eq!(config.database.query_url.as_deref(), Some("http://query:9000"));
        assert_eq!(
            config.database.search_url.as_deref(),
            Some("http://cb.local:8094")
        );
    }

    #[test]
    fn test_generation_key_fallback_and_port() {
        let mut config = Config::default();
        apply_env(
            &mut config,
            env(&[("GEMINI_API_KEY", "g-key"), ("PORT", "9090")]),
        );
        assert_eq!(config.generation.api_key.as_deref(), Some("g-key"));
        assert_eq!(config.server.bind, "0.0.0.0:9090");

        let mut config = Config::default();
        apply_env(
            &mut config,
            env(&[("GEMINI_API_KEY", "g-key"), ("GOOGLE_API_KEY", "google")]),
        );
        assert_eq!(config.generation.api_key.as_deref(), Some("google"));
    }

    #[test]
    fn test_toml_file_then_env() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("kc.toml");
        std::fs::write(
            &path,
            r#"
[database]
collection = "docs"

[search]
limit = 2
num_candidates = 10
fields = ["chunks.text", "chunks.metadata.source"]
"#,
        )
        .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let mut config: Config = toml::from_str(&content).unwrap();
        apply_env(&mut config, env(&full_env()));
        validate(&config).unwrap();
        assert_eq!(config.database.collection, "docs");
        assert_eq!(config.search.limit, 2);
        assert_eq!(config.search.fields.len(), 2);
        assert!(config.search.lookup_missing_source);
    }

    #[test]
    fn test_invalid_search_bounds() {
        let mut config = Config::default();
        apply_env(&mut config, env(&full_env()));
        config.search.num_candidates = 1;
        assert!(validate(&config)
            .unwrap_err()
            .to_string()
            .contains("num_candidates"));
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let mut config = Config::default();
        apply_env(&mut config, env(&full_env()));
        let shown = config.redacted();
        assert_eq!(shown.database.password.as_deref(), Some("***"));
        assert_eq!(shown.storage.secret_key.as_deref(), Some("***"));
        assert_eq!(shown.database.username.as_deref(), Some("admin"));
    }
}
