pub mod structs;

use crate::helpers;

use anyhow::Context;
use colored::Colorize;
use macros_rs::crashln;
use structs::prelude::*;

use std::{
    fs,
    net::IpAddr,
    path::{Path, PathBuf},
};

pub fn base_dir() -> Option<PathBuf> { home::home_dir().map(|home| home.join(".agentdir")) }

/// Read `path`, writing the defaults there first when it does not exist.
pub fn from_path(path: &Path) -> anyhow::Result<Config> {
    if !path.is_file() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }

        let contents = toml::to_string(&Config::default()).context("serializing default config")?;
        fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;
        log::info!("created config file {}", path.display());
    }

    let contents = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

/// Load `~/.agentdir/config.toml` with environment overrides applied.
pub fn read() -> Config {
    let Some(base) = base_dir() else {
        crashln!("{} Impossible to get your home directory", *helpers::FAIL);
    };

    match from_path(&base.join("config.toml")) {
        Ok(config) => config.with_env(|key| std::env::var(key).ok()),
        Err(err) => crashln!("{} Cannot read config.\n{}", *helpers::FAIL, format!("{err:#}").white()),
    }
}

impl Config {
    /// Apply overrides from an environment lookup.
    pub fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(address) = var("AGENTDIR_ADDRESS") {
            self.daemon.address = address;
        }
        if let Some(port) = var("AGENTDIR_PORT").and_then(|port| port.parse().ok()) {
            self.daemon.port = port;
        }
        if let Some(secret) = var("SESSION_SECRET") {
            self.daemon.auth.secret = secret;
        }
        if let Some(audience) = var("AGENTDIR_AUDIENCE") {
            self.daemon.auth.audience = Some(audience);
        }
        if let Some(domains) = var("TRUSTED_AGENT_DOMAINS") {
            self.daemon.auth.trusted_domains = domains.split(',').map(str::trim).filter(|d| !d.is_empty()).map(str::to_string).collect();
        }
        match var("AGENTDIR_DISCOVERY").as_deref() {
            Some("semantic") => self.discovery.mode = DiscoveryMode::Semantic,
            Some("exact") => self.discovery.mode = DiscoveryMode::Exact,
            Some(other) => log::warn!("ignoring unknown AGENTDIR_DISCOVERY '{other}'"),
            None => {}
        }
        if let Some(url) = var("AGENTDIR_EMBEDDINGS_URL") {
            self.discovery.url = Some(url);
            self.discovery.embedder = EmbedderKind::Remote;
        }
        if let Some(key) = var("AGENTDIR_EMBEDDINGS_KEY") {
            self.discovery.api_key = Some(key);
        }
        if let Some(registry) = var("AGENT_REGISTRY_URL") {
            self.client.registry = registry;
        }

        self
    }

    pub fn fmt_address(&self) -> String { format!("{}:{}", self.daemon.address, self.daemon.port) }

    pub fn rocket(&self) -> anyhow::Result<rocket::Config> {
        let address: IpAddr = self
            .daemon
            .address
            .parse()
            .with_context(|| format!("invalid daemon address '{}'", self.daemon.address))?;

        Ok(rocket::Config {
            address,
            port: self.daemon.port,
            ..rocket::Config::default()
        })
    }
}
