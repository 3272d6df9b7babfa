//! Local knowledge base.
//!
//! Relevance of an entry is the fraction of significant query terms that
//! appear among the entry's topic, keyword and content terms. A term is a
//! lowercased alphanumeric run of at least three characters.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, KnowledgeConfig, KnowledgeEntry};

const MIN_TERM_LEN: usize = 3;

#[derive(Debug, Clone)]
struct IndexedEntry {
    entry: KnowledgeEntry,
    terms: HashSet<String>,
}

/// Best entry for a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeMatch {
    pub category: String,
    pub topic: String,
    pub content: String,
    pub relevance: f64,
}

#[derive(Debug, Deserialize)]
struct Corpus {
    #[serde(default)]
    entries: Vec<KnowledgeEntry>,
}

/// In-memory corpus searched before any network source.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    entries: Vec<IndexedEntry>,
    threshold: f64,
}

impl KnowledgeBase {
    pub fn new(entries: Vec<KnowledgeEntry>, threshold: f64) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| {
                let mut terms: HashSet<String> = terms_of(&entry.topic).into_iter().collect();
                terms.extend(entry.keywords.iter().flat_map(|k| terms_of(k)));
                terms.extend(terms_of(&entry.content));
                IndexedEntry { entry, terms }
            })
            .collect();
        Self { entries, threshold }
    }

    /// Inline entries followed by the entries of `config.path`, if set.
    pub fn from_config(config: &KnowledgeConfig) -> Result<Self, ConfigError> {
        let mut entries = config.entries.clone();
        if let Some(path) = &config.path {
            entries.extend(load_corpus(Path::new(path))?);
        }
        tracing::info!(entries = entries.len(), "Knowledge base loaded");
        Ok(Self::new(entries, config.confidence_threshold))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest-relevance entry; ties go to the earliest entry.
    pub fn lookup(&self, problem: &str) -> Option<KnowledgeMatch> {
        let query = terms_of(problem);
        if query.is_empty() {
            return None;
        }

        let mut best: Option<(&IndexedEntry, usize)> = None;
        for indexed in &self.entries {
            let hits = query.iter().filter(|t| indexed.terms.contains(*t)).count();
            if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
                best = Some((indexed, hits));
            }
        }

        best.map(|(indexed, hits)| KnowledgeMatch {
            category: indexed.entry.category.clone(),
            topic: indexed.entry.topic.clone(),
            content: indexed.entry.content.clone(),
            relevance: hits as f64 / query.len() as f64,
        })
    }

    /// A match good enough to answer with.
    pub fn confident_match(&self, problem: &str) -> Option<KnowledgeMatch> {
        self.lookup(problem).filter(|m| m.relevance >= self.threshold)
    }
}

fn load_corpus(path: &Path) -> Result<Vec<KnowledgeEntry>, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        // Either a bare array or `{ "entries": [...] }`.
        serde_json::from_str::<Vec<KnowledgeEntry>>(&raw)
            .or_else(|_| serde_json::from_str::<Corpus>(&raw).map(|c| c.entries))
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))
    } else {
        toml::from_str::<Corpus>(&raw)
            .map(|c| c.entries)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))
    }
}

/// Distinct significant terms in order of first appearance.
fn terms_of(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_TERM_LEN)
        .map(str::to_lowercase)
        .filter(|w| seen.insert(w.clone()))
        .collect()
}
