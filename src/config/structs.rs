use serde::{Deserialize, Serialize};

pub mod prelude {
    pub use super::{Auth, Client, Config, Daemon, Discovery, DiscoveryMode, EmbedderKind};
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: Daemon,
    #[serde(default)]
    pub discovery: Discovery,
    #[serde(default)]
    pub client: Client,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Daemon {
    pub address: String,
    pub port: u16,
    pub auth: Auth,
}

impl Default for Daemon {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 3000,
            auth: Auth::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Auth {
    /// Session signing secret. Loaded once, never mutated.
    pub secret: String,
    pub audience: Option<String>,
    /// Email suffixes allowed to register agents, e.g. `@example.com`.
    pub trusted_domains: Vec<String>,
}

/// Signing secret shipped in the default config.
pub const DEFAULT_SECRET: &str = "registry_secret";

impl Default for Auth {
    fn default() -> Self {
        Self {
            secret: DEFAULT_SECRET.to_string(),
            audience: None,
            trusted_domains: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    #[default]
    Exact,
    Semantic,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    #[default]
    Hashing,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Discovery {
    pub mode: DiscoveryMode,
    pub embedder: EmbedderKind,
    pub dimensions: usize,
    pub url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub default_k: usize,
    /// Seconds per embedding request.
    pub timeout: u64,
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            mode: DiscoveryMode::Exact,
            embedder: EmbedderKind::Hashing,
            dimensions: 256,
            url: None,
            model: None,
            api_key: None,
            default_k: 3,
            timeout: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Client {
    /// Base url of the directory daemon.
    pub registry: String,
    pub attempts: u32,
    /// Seconds between poll attempts.
    pub interval: u64,
    pub timeout: u64,
    pub card_timeout: u64,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            registry: "http://localhost:3000".to_string(),
            attempts: 60,
            interval: 1,
            timeout: 30,
            card_timeout: 5,
        }
    }
}
