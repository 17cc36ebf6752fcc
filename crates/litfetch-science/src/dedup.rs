use std::collections::HashMap;

use litfetch_core::{DedupKey, Record};

/// Rank added to the preference length for providers missing from the list.
const UNLISTED_RANK_PENALTY: usize = 10;

/// Provider preference order: lower index wins. Used both for choosing the
/// merge primary and for quota balancing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderPreference {
    order: Vec<String>,
}

impl ProviderPreference {
    pub fn new<I, S>(order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for name in order {
            let key = provider_key(name.as_ref());
            if !key.is_empty() && !normalized.contains(&key) {
                normalized.push(key);
            }
        }
        Self { order: normalized }
    }

    pub fn rank(&self, provider: &str) -> usize {
        let key = provider_key(provider);
        self.order
            .iter()
            .position(|p| *p == key)
            .unwrap_or(self.order.len() + UNLISTED_RANK_PENALTY)
    }

    /// `true` when `candidate` strictly outranks `incumbent`. Equal ranks keep
    /// the incumbent, so discovery order breaks ties.
    pub fn outranks(&self, candidate: &str, incumbent: &str) -> bool {
        self.rank(candidate) < self.rank(incumbent)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.order
    }
}

/// Lowercased, trimmed provider key. Empty names map to `unknown`.
pub fn provider_key(name: &str) -> String {
    let key = name.trim().to_lowercase();
    if key.is_empty() {
        "unknown".to_string()
    } else {
        key
    }
}

/// Combine two records describing the same work into a new one.
///
/// Every field takes `primary`'s value when non-empty and `other`'s otherwise,
/// except the abstract, which keeps the longer text (ties keep `primary`).
pub fn merge_records(primary: &Record, other: &Record) -> Record {
    fn prefer(base: &str, fallback: &str) -> String {
        if base.is_empty() { fallback } else { base }.to_string()
    }

    let abstract_text = if primary.abstract_text.chars().count() >= other.abstract_text.chars().count() {
        primary.abstract_text.clone()
    } else {
        other.abstract_text.clone()
    };

    Record {
        identifier: prefer(&primary.identifier, &other.identifier),
        title: prefer(&primary.title, &other.title),
        venue: prefer(&primary.venue, &other.venue),
        cover_date: prefer(&primary.cover_date, &other.cover_date),
        url: prefer(&primary.url, &other.url),
        abstract_text,
        authors: prefer(&primary.authors, &other.authors),
        source_provider: prefer(&primary.source_provider, &other.source_provider),
        publisher: prefer(&primary.publisher, &other.publisher),
        volume: prefer(&primary.volume, &other.volume),
        issue: prefer(&primary.issue, &other.issue),
        pages: prefer(&primary.pages, &other.pages),
        language: prefer(&primary.language, &other.language),
        keywords: prefer(&primary.keywords, &other.keywords),
        issn: prefer(&primary.issn, &other.issn),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// First record seen under its key.
    Inserted,
    /// Merged into an existing entry; `promoted` when the incoming provider
    /// took over as primary.
    Merged { promoted: bool },
}

#[derive(Debug, Clone)]
struct BucketEntry {
    record: Record,
    provider: String,
}

/// Dedup bucket for one aggregation run: `DedupKey -> (winning record,
/// provider that supplied its primary fields)`, kept in first-insertion order.
#[derive(Debug, Clone)]
pub struct MergeBucket {
    preference: ProviderPreference,
    entries: Vec<BucketEntry>,
    index: HashMap<DedupKey, usize>,
}

impl MergeBucket {
    pub fn new(preference: ProviderPreference) -> Self {
        Self {
            preference,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn insert(&mut self, record: Record, provider: &str) -> InsertOutcome {
        let provider = provider_key(provider);
        let key = record.dedup_key();

        let Some(&slot) = self.index.get(&key) else {
            self.index.insert(key, self.entries.len());
            self.entries.push(BucketEntry { record, provider });
            return InsertOutcome::Inserted;
        };

        let entry = &mut self.entries[slot];
        if self.preference.outranks(&provider, &entry.provider) {
            entry.record = merge_records(&record, &entry.record);
            entry.provider = provider;
            InsertOutcome::Merged { promoted: true }
        } else {
            entry.record = merge_records(&entry.record, &record);
            InsertOutcome::Merged { promoted: false }
        }
    }

    pub fn extend<I>(&mut self, records: I, provider: &str) -> BucketStats
    where
        I: IntoIterator<Item = Record>,
    {
        let mut stats = BucketStats::default();
        for record in records {
            match self.insert(record, provider) {
                InsertOutcome::Inserted => stats.inserted += 1,
                InsertOutcome::Merged { .. } => stats.merged += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flatten to records in insertion order, each tagged with the provider
    /// that won its key.
    pub fn into_records(self) -> Vec<Record> {
        self.entries
            .into_iter()
            .map(|entry| entry.record.with_source_provider(entry.provider))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketStats {
    pub inserted: usize,
    pub merged: usize,
}
