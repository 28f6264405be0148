//! Deduplication of findings discovered by multiple techniques
//!
//! Techniques complete in nondeterministic order, so the merge rule must be
//! order independent: sources are unioned, confidence keeps the maximum, and
//! descriptive fields are only filled when empty, never overwritten.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A record that can be reconciled with another sighting of the same entity
pub trait Mergeable {
    /// Natural identity key (an email address, a host name)
    fn identity(&self) -> String;

    /// Fold another sighting of the same entity into this record
    fn absorb(&mut self, incoming: Self);
}

/// Union two provenance lists, preserving first-seen order
pub fn union_sources(existing: &mut Vec<String>, incoming: Vec<String>) {
    for source in incoming {
        if !existing.contains(&source) {
            existing.push(source);
        }
    }
}

/// Fill `field` from `incoming` only when currently empty
pub fn fill_empty(field: &mut String, incoming: String) {
    if field.is_empty() && !incoming.is_empty() {
        *field = incoming;
    }
}

/// Growing identity → best-known-record mapping, fed incrementally as each
/// discovery technique completes
#[derive(Debug, Default)]
pub struct MergeMap<T: Mergeable> {
    records: HashMap<String, T>,
}

impl<T: Mergeable> MergeMap<T> {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Merge one incoming record
    pub fn merge(&mut self, incoming: T) {
        let key = incoming.identity();
        match self.records.get_mut(&key) {
            Some(existing) => existing.absorb(incoming),
            None => {
                self.records.insert(key, incoming);
            }
        }
    }

    /// Merge every record from one technique's output
    pub fn merge_all<I: IntoIterator<Item = T>>(&mut self, incoming: I) {
        for record in incoming {
            self.merge(record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, identity: &str) -> Option<&T> {
        self.records.get(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.values()
    }

    /// Emit merged records sorted by identity, optionally capped. Capping
    /// truncates the emitted sequence only; it never affects what was merged.
    pub fn records(self, cap: Option<usize>) -> Vec<T> {
        let mut entries: Vec<(String, T)> = self.records.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut records: Vec<T> = entries.into_iter().map(|(_, record)| record).collect();
        if let Some(cap) = cap {
            records.truncate(cap);
        }
        records
    }
}

/// An email address discovered by one or more techniques
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailFinding {
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub department: String,
    pub sources: Vec<String>,
    pub confidence: u8,
    #[serde(default)]
    pub last_seen: String,
}

impl EmailFinding {
    pub fn new(email: &str, source: &str, confidence: u8) -> Self {
        Self {
            email: email.to_lowercase(),
            name: String::new(),
            position: String::new(),
            department: String::new(),
            sources: vec![source.to_string()],
            confidence,
            last_seen: chrono::Utc::now().format("%Y-%m-%d").to_string(),
        }
    }
}

impl Mergeable for EmailFinding {
    fn identity(&self) -> String {
        self.email.to_lowercase()
    }

    fn absorb(&mut self, incoming: Self) {
        union_sources(&mut self.sources, incoming.sources);
        self.confidence = self.confidence.max(incoming.confidence);
        fill_empty(&mut self.name, incoming.name);
        fill_empty(&mut self.position, incoming.position);
        fill_empty(&mut self.department, incoming.department);
        fill_empty(&mut self.last_seen, incoming.last_seen);
    }
}

/// A subdomain discovered by one or more techniques
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubdomainFinding {
    pub host: String,
    #[serde(default)]
    pub ips: Vec<String>,
    pub sources: Vec<String>,
    pub confidence: u8,
    #[serde(default)]
    pub resolved: bool,
}

impl SubdomainFinding {
    pub fn new(host: &str, source: &str, confidence: u8) -> Self {
        Self {
            host: host.trim_end_matches('.').to_lowercase(),
            ips: Vec::new(),
            sources: vec![source.to_string()],
            confidence,
            resolved: false,
        }
    }
}

impl Mergeable for SubdomainFinding {
    fn identity(&self) -> String {
        self.host.to_lowercase()
    }

    fn absorb(&mut self, incoming: Self) {
        union_sources(&mut self.sources, incoming.sources);
        self.confidence = self.confidence.max(incoming.confidence);
        self.resolved |= incoming.resolved;
        for ip in incoming.ips {
            if !self.ips.contains(&ip) {
                self.ips.push(ip);
            }
        }
    }
}
