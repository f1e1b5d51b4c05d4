use crate::agent::types::AgentCard;
use crate::error::{Error, Result};

use reqwest::{StatusCode, Url};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use std::time::Duration;

#[derive(Deserialize)]
struct AgentList {
    agents: Vec<AgentCard>,
}

#[derive(Deserialize)]
struct Registered {
    endpoint: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// HTTP client for a running directory daemon.
pub struct RegistryClient {
    client: reqwest::Client,
    base: Url,
}

impl RegistryClient {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base).map_err(|err| Error::Invalid(format!("registry url '{base}': {err}")))?;

        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Invalid(format!("registry url '{}' cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response, subject: &str) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|err| Error::protocol_with_body(format!("unexpected registry response: {err}"), body));
        }

        let message = serde_json::from_str::<ErrorBody>(&body).map(|error| error.message).unwrap_or_else(|_| body.clone());

        Err(match status {
            StatusCode::CONFLICT => Error::Conflict(subject.to_string()),
            StatusCode::NOT_FOUND => Error::NotFound(subject.to_string()),
            StatusCode::UNAUTHORIZED => Error::Unauthorized(message),
            StatusCode::FORBIDDEN => Error::Forbidden(message),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Error::Invalid(message),
            _ => Error::protocol_with_body(format!("registry answered {status}"), body),
        })
    }

    pub async fn register(&self, card: &AgentCard, owner: Option<&str>, token: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url(&["register"])?)
            .bearer_auth(token)
            .json(&json!({ "agent": card, "owner_email": owner }))
            .send()
            .await?;

        let registered: Registered = Self::decode(response, &card.endpoint).await?;
        Ok(registered.endpoint)
    }

    pub async fn list(&self) -> Result<Vec<AgentCard>> {
        let response = self.client.get(self.url(&["agents"])?).send().await?;
        Ok(Self::decode::<AgentList>(response, "agents").await?.agents)
    }

    pub async fn get(&self, endpoint: &str) -> Result<AgentCard> {
        let response = self.client.get(self.url(&["agents", endpoint])?).send().await?;
        Self::decode(response, endpoint).await
    }

    pub async fn search(&self, query: &str, k: Option<usize>, token: Option<&str>) -> Result<Vec<AgentCard>> {
        let mut url = self.url(&["agents", "search"])?;
        url.query_pairs_mut().append_pair("q", query);
        if let Some(k) = k {
            url.query_pairs_mut().append_pair("k", &k.to_string());
        }

        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        Ok(Self::decode::<AgentList>(request.send().await?, query).await?.agents)
    }

    /// Highest ranked agent for `query`.
    pub async fn best_match(&self, query: &str, token: Option<&str>) -> Result<AgentCard> {
        self.search(query, Some(1), token)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("no agent matched '{query}'")))
    }
}
