use crate::error::{Error, Result};
use crate::helpers::normalize_url;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use utoipa::ToSchema;

pub const DEFAULT_CARD_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AgentSkill {
    #[schema(example = "weather-forecast")]
    pub id: String,
    #[schema(example = "Weather forecast")]
    pub name: String,
    #[schema(example = "Seven day forecast for any city")]
    pub description: String,
    /// Order is irrelevant; compared as a set.
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentCapabilities {
    pub a2a: bool,
    pub tool_use: bool,
    pub chat: bool,
    pub streaming: bool,
    pub push: bool,
}

impl Default for AgentCapabilities {
    fn default() -> Self {
        Self {
            a2a: true,
            tool_use: true,
            chat: true,
            streaming: false,
            push: false,
        }
    }
}

/// Self-description an agent publishes at `/.well-known/agent.json`,
/// mirrored into the directory on registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    #[schema(example = "Weather Agent")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_version")]
    #[schema(example = "1.0.0")]
    pub version: String,
    /// Where the agent accepts protocol calls.
    #[schema(example = "https://weather.example.com/a2a")]
    pub url: String,
    /// Directory key.
    #[schema(example = "https://weather.example.com")]
    pub endpoint: String,
    pub default_input_modes: Vec<String>,
    pub default_output_modes: Vec<String>,
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    /// Presentation order, preserved end-to-end.
    pub skills: Vec<AgentSkill>,
}

fn default_version() -> String { DEFAULT_CARD_VERSION.to_string() }

fn parse_http_url(field: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value).map_err(|err| Error::Invalid(format!("{field} '{value}': {err}")))?;

    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(Error::Invalid(format!("{field} '{value}' is not an http(s) url"))),
    }
}

impl AgentCard {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Invalid("name must not be empty".to_string()));
        }

        parse_http_url("url", &self.url)?;
        parse_http_url("endpoint", &self.endpoint)?;

        Ok(())
    }

    /// Directory key for this card.
    pub fn key(&self) -> String { normalize_url(&self.endpoint) }

    /// Searchable text used by the semantic index.
    pub fn document(&self) -> String {
        let tools = self.skills.iter().map(|skill| skill.name.as_str()).collect::<Vec<_>>();

        format!(
            "Agent {}: {}. Tools: {}",
            self.name,
            self.description.as_deref().unwrap_or_default(),
            tools.join(", ")
        )
    }
}

/// Directory-private wrapper around a registered card.
#[derive(Debug, Clone)]
pub(crate) struct DirectoryRecord {
    pub(crate) card: AgentCard,
    pub(crate) owner: Option<String>,
    pub(crate) registered_at: DateTime<Utc>,
}

impl DirectoryRecord {
    pub(crate) fn new(card: AgentCard, owner: Option<String>) -> Self {
        Self {
            card,
            owner,
            registered_at: Utc::now(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::card;
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_camel_case_with_defaults() {
        let card: AgentCard = serde_json::from_value(json!({
            "name": "Echo",
            "url": "http://localhost:9000/a2a",
            "endpoint": "http://localhost:9000",
            "defaultInputModes": ["text"],
            "defaultOutputModes": ["text"],
            "capabilities": {"streaming": true},
            "skills": [{"id": "echo", "name": "Echo", "description": "Repeats input"}]
        }))
        .unwrap();

        assert_eq!(card.version, "1.0.0");
        assert_eq!(card.description, None);
        assert!(card.capabilities.a2a && card.capabilities.tool_use && card.capabilities.chat);
        assert!(card.capabilities.streaming);
        assert!(!card.capabilities.push);
        assert!(card.skills[0].tags.is_empty());
    }

    #[test]
    fn serializes_capabilities_in_camel_case() {
        let value = serde_json::to_value(AgentCapabilities::default()).unwrap();
        assert_eq!(value["toolUse"], json!(true));
        assert_eq!(value["push"], json!(false));
    }

    #[test]
    fn skill_tags_compare_as_set() {
        let a: AgentSkill = serde_json::from_value(json!({"id": "s", "name": "S", "description": "d", "tags": ["x", "y"]})).unwrap();
        let b: AgentSkill = serde_json::from_value(json!({"id": "s", "name": "S", "description": "d", "tags": ["y", "x"]})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn validate_rejects_non_http_endpoints() {
        let mut bad = card("Echo", "http://localhost:9000", &[]);
        assert!(bad.validate().is_ok());

        bad.endpoint = "ftp://localhost".to_string();
        assert!(matches!(bad.validate(), Err(Error::Invalid(_))));

        bad.endpoint = "not a url".to_string();
        assert!(matches!(bad.validate(), Err(Error::Invalid(_))));

        let mut nameless = card("Echo", "http://localhost:9000", &[]);
        nameless.name = "  ".to_string();
        assert!(matches!(nameless.validate(), Err(Error::Invalid(_))));
    }

    #[test]
    fn document_lists_skill_names_in_order() {
        let card = card("Weather", "http://weather.local", &["Forecast", "Alerts"]);
        assert_eq!(card.document(), "Agent Weather: Weather agent. Tools: Forecast, Alerts");
    }

    #[test]
    fn key_ignores_trailing_slash() {
        assert_eq!(card("A", "http://a.local/", &[]).key(), card("A", "http://a.local", &[]).key());
    }
}
