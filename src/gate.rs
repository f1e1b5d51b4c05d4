//! Credential check guarding the registration path.
//!
//! A caller presents a bearer token. The token is verified by a pluggable
//! [`TokenVerifier`], then the verified email must end with one of the trusted
//! domain suffixes. Both failures read as "unauthorized" to the caller.

use crate::error::{Error, Result};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    /// Expiry, seconds since the unix epoch.
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Verified principal allowed to register agents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub email: String,
}

pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Claims>;
}

/// HS256 compact tokens signed with the process-wide session secret.
pub struct HmacVerifier {
    secret: Vec<u8>,
    audience: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

impl HmacVerifier {
    pub fn new(secret: &str, audience: Option<String>) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            audience,
        }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).map_err(|err| Error::Unauthorized(format!("invalid secret: {err}")))
    }

    /// Mint a token this verifier accepts.
    pub fn issue(&self, claims: &Claims) -> Result<String> {
        let header = Header { alg: "HS256".to_string(), typ: Some("JWT".to_string()) };
        let signing_input = format!("{}.{}", encode_section(&header)?, encode_section(claims)?);

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature}"))
    }
}

fn encode_section<T: Serialize>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value).map_err(|err| Error::Unauthorized(format!("cannot encode token: {err}")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn decode_section<T: for<'de> Deserialize<'de>>(section: &str, what: &str) -> Result<T> {
    URL_SAFE_NO_PAD
        .decode(section)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or_else(|| malformed(what))
}

fn malformed(what: &str) -> Error { Error::Unauthorized(format!("malformed token: {what}")) }

impl TokenVerifier for HmacVerifier {
    fn verify(&self, token: &str) -> Result<Claims> {
        let mut sections = token.split('.');
        let (Some(header_section), Some(payload), Some(signature), None) = (sections.next(), sections.next(), sections.next(), sections.next()) else {
            return Err(malformed("expected three sections"));
        };

        let header: Header = decode_section(header_section, "header")?;

        if header.alg != "HS256" {
            return Err(Error::Unauthorized(format!("unsupported algorithm {}", header.alg)));
        }

        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| malformed("signature"))?;
        let mut mac = self.mac()?;
        mac.update(format!("{header_section}.{payload}").as_bytes());
        mac.verify_slice(&signature).map_err(|_| Error::Unauthorized("signature mismatch".to_string()))?;

        let claims: Claims = decode_section(payload, "payload")?;

        if claims.exp <= chrono::Utc::now().timestamp() {
            return Err(Error::Unauthorized("token expired".to_string()));
        }

        if let Some(ref audience) = self.audience {
            if claims.aud.as_ref() != Some(audience) {
                return Err(Error::Unauthorized("audience mismatch".to_string()));
            }
        }

        Ok(claims)
    }
}

/// Email suffixes of principals trusted to register agents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainAllowlist(Vec<String>);

impl DomainAllowlist {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            domains
                .into_iter()
                .map(|domain| domain.as_ref().trim().to_lowercase())
                .filter(|domain| !domain.is_empty())
                .collect(),
        )
    }

    /// An empty allowlist trusts nobody.
    pub fn permits(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.0.iter().any(|domain| email.ends_with(domain.as_str()))
    }
}

#[derive(Clone)]
pub struct AccessGate {
    verifier: Arc<dyn TokenVerifier>,
    allowlist: DomainAllowlist,
}

impl AccessGate {
    pub fn new(verifier: Arc<dyn TokenVerifier>, allowlist: DomainAllowlist) -> Self { Self { verifier, allowlist } }

    pub fn verify(&self, credential: &str) -> Result<Identity> {
        let claims = self.verifier.verify(credential.trim())?;

        if !self.allowlist.permits(&claims.email) {
            return Err(Error::Forbidden(format!("untrusted domain: {}", claims.email)));
        }

        Ok(Identity {
            subject: claims.sub,
            email: claims.email,
        })
    }

    /// Verify an `Authorization: Bearer <token>` header value.
    pub fn verify_header(&self, header: Option<&str>) -> Result<Identity> {
        let header = header.ok_or_else(|| Error::Unauthorized("missing Authorization header".to_string()))?;

        match header.split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => self.verify(token),
            _ => Err(Error::Unauthorized("invalid Authorization header".to_string())),
        }
    }
}
