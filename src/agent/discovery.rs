use super::types::AgentCard;
use crate::config::structs::{Discovery as DiscoveryConfig, DiscoveryMode, EmbedderKind};
use crate::error::{Error, Result};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::{
    collections::HashSet,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

/// Ranks catalog entries against free-text intent.
#[async_trait]
pub trait Discovery: Send + Sync {
    fn name(&self) -> &'static str;

    /// Make a newly registered card searchable. Called by the registry before
    /// the card becomes visible; an error aborts the registration.
    async fn index(&self, card: &AgentCard) -> Result<()>;

    /// Rank `catalog` against `text`, returning at most `k` directory keys best-first.
    async fn query(&self, text: &str, k: usize, catalog: &[AgentCard]) -> Result<Vec<String>>;
}

pub fn build(config: &DiscoveryConfig) -> Result<Arc<dyn Discovery>> {
    match config.mode {
        DiscoveryMode::Exact => Ok(Arc::new(ExactDiscovery)),
        DiscoveryMode::Semantic => {
            let embedder: Arc<dyn Embedder> = match config.embedder {
                EmbedderKind::Hashing => Arc::new(HashingEmbedder::new(config.dimensions)),
                EmbedderKind::Remote => Arc::new(RemoteEmbedder::from_config(config)?),
            };
            Ok(Arc::new(SemanticDiscovery::new(embedder)))
        }
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Substring and tag matching over the catalog. Needs no index.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactDiscovery;

impl ExactDiscovery {
    fn score(card: &AgentCard, terms: &[String]) -> usize {
        let mut haystack = format!("{} {}", card.name, card.description.as_deref().unwrap_or_default());
        for skill in &card.skills {
            haystack.push(' ');
            haystack.push_str(&skill.name);
            haystack.push(' ');
            haystack.push_str(&skill.description);
        }
        let haystack = haystack.to_lowercase();

        terms
            .iter()
            .filter(|term| {
                haystack.contains(term.as_str())
                    || card.skills.iter().any(|skill| skill.tags.iter().any(|tag| tag.eq_ignore_ascii_case(term)))
            })
            .count()
    }
}

#[async_trait]
impl Discovery for ExactDiscovery {
    fn name(&self) -> &'static str { "exact" }

    async fn index(&self, _card: &AgentCard) -> Result<()> { Ok(()) }

    async fn query(&self, text: &str, k: usize, catalog: &[AgentCard]) -> Result<Vec<String>> {
        let terms = terms(text);

        if terms.is_empty() {
            return Ok(catalog.iter().take(k).map(AgentCard::key).collect());
        }

        let mut scored = catalog
            .iter()
            .map(|card| (Self::score(card, &terms), card))
            .filter(|(score, _)| *score > 0)
            .collect::<Vec<_>>();

        // stable: ties keep catalog order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(k).map(|(_, card)| card.key()).collect())
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Deterministic bag-of-words embedding using feature hashing.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self { Self { dimensions: dimensions.max(1) } }

    fn fnv1a(term: &str) -> u64 {
        term.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| (hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3))
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0f32; self.dimensions];

        for term in terms(text) {
            let hash = Self::fnv1a(&term);
            let slot = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }

        Ok(vector)
    }
}

/// OpenAI-compatible `POST {url}/embeddings` backend.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

impl RemoteEmbedder {
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| Error::Index("remote embedder needs discovery.url".to_string()))?;

        let client = reqwest::Client::builder().timeout(Duration::from_secs(config.timeout)).build()?;

        Ok(Self {
            client,
            url: crate::helpers::normalize_url(&url),
            model: config.model.clone().unwrap_or_else(|| "text-embedding-3-small".to_string()),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut request = self
            .client
            .post(format!("{}/embeddings", self.url))
            .json(&json!({ "model": self.model, "input": text }));

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let body = response.json::<EmbeddingResponse>().await?;

        body.data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or_else(|| Error::Index("embedding response had no data".to_string()))
    }
}

struct IndexedDocument {
    key: String,
    document: String,
    vector: Vec<f32>,
}

/// Vector index over agent documents, ranked by cosine similarity.
pub struct SemanticDiscovery {
    embedder: Arc<dyn Embedder>,
    rows: RwLock<Vec<IndexedDocument>>,
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot = a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
    let norm = a.iter().map(|x| x * x).sum::<f32>().sqrt() * b.iter().map(|y| y * y).sum::<f32>().sqrt();
    if norm == 0.0 { 0.0 } else { dot / norm }
}

impl SemanticDiscovery {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            rows: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize { self.rows.read().unwrap_or_else(PoisonError::into_inner).len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[async_trait]
impl Discovery for SemanticDiscovery {
    fn name(&self) -> &'static str { "semantic" }

    async fn index(&self, card: &AgentCard) -> Result<()> {
        let document = card.document();
        let vector = self
            .embedder
            .embed(&document)
            .await
            .map_err(|err| Error::Index(format!("embedding '{}': {err}", card.name)))?;

        log::debug!("indexed {} as '{}'", card.key(), document);

        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        rows.retain(|row| row.key != card.key());
        rows.push(IndexedDocument { key: card.key(), document, vector });

        Ok(())
    }

    async fn query(&self, text: &str, k: usize, catalog: &[AgentCard]) -> Result<Vec<String>> {
        if catalog.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query = self
            .embedder
            .embed(text)
            .await
            .map_err(|err| Error::Index(format!("embedding query: {err}")))?;

        let visible = catalog.iter().map(AgentCard::key).collect::<HashSet<_>>();
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);

        let mut scored = rows
            .iter()
            .filter(|row| visible.contains(&row.key))
            .map(|row| (cosine(&query, &row.vector), row))
            .collect::<Vec<_>>();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .inspect(|(score, row)| log::trace!("{score:.3} {}", row.document))
            .map(|(_, row)| row.key.clone())
            .collect())
    }
}
