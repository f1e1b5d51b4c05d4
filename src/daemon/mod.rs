pub mod api;

use agentdir::{
    agent::{AgentRegistry, discovery},
    config::structs::{Auth, Config, DEFAULT_SECRET},
    gate::{AccessGate, DomainAllowlist, HmacVerifier},
    helpers,
};

use colored::Colorize;
use std::sync::Arc;

pub fn access_gate(auth: &Auth) -> AccessGate {
    AccessGate::new(Arc::new(HmacVerifier::new(&auth.secret, auth.audience.clone())), DomainAllowlist::new(&auth.trusted_domains))
}

/// Refuse to open registration while tokens can be minted with the shipped secret.
pub fn check_secret(auth: &Auth) -> anyhow::Result<()> {
    if !auth.trusted_domains.is_empty() && auth.secret == DEFAULT_SECRET {
        log::error!("auth secret is the default while trusted domains are set");
        anyhow::bail!("daemon.auth.secret must be changed from the default before trusting domains");
    }
    Ok(())
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    check_secret(&config.daemon.auth)?;

    let backend = discovery::build(&config.discovery)?;
    log::info!("discovery backend: {}", backend.name());

    if config.daemon.auth.trusted_domains.is_empty() {
        println!("{} No trusted domains configured, registration is closed", *helpers::WARN);
    }

    let registry = AgentRegistry::with_discovery(backend);
    let gate = access_gate(&config.daemon.auth);

    println!("{} Directory listening on {}", *helpers::SUCCESS, config.fmt_address().bold());
    api::start(config, registry, gate).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentdir::gate::{Claims, TokenVerifier};

    #[test]
    fn gate_follows_auth_config() {
        let auth = Auth {
            secret: "s3cret".to_string(),
            audience: None,
            trusted_domains: vec!["@trusted.com".to_string()],
        };

        let claims = Claims {
            sub: "user-1".to_string(),
            email: "user@trusted.com".to_string(),
            exp: chrono::Utc::now().timestamp() + 60,
            aud: None,
            iss: None,
        };
        let token = HmacVerifier::new("s3cret", None).issue(&claims).unwrap();
        assert!(HmacVerifier::new("s3cret", None).verify(&token).is_ok());

        let identity = access_gate(&auth).verify(&token).unwrap();
        assert_eq!(identity.email, "user@trusted.com");
    }

    #[test]
    fn default_secret_is_refused_once_domains_are_trusted() {
        let mut auth = Auth::default();
        assert!(check_secret(&auth).is_ok());

        auth.trusted_domains = vec!["@trusted.com".to_string()];
        let err = check_secret(&auth).unwrap_err();
        assert!(err.to_string().contains("daemon.auth.secret"));

        auth.secret = "s3cret".to_string();
        assert!(check_secret(&auth).is_ok());
    }
}
