// src/classifier.rs
//! Keyword classifier: scans user messages against both taxonomies and keeps
//! per-entry mention counters.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::taxonomy::{Taxonomy, TaxonomyEntry, TaxonomyKind};

/// Longest example kept verbatim; longer texts are cut to 157 chars + "...".
pub const EXAMPLE_MAX_CHARS: usize = 160;
const ELLIPSIS: &str = "...";

/// Mention counter for one taxonomy entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryStat {
    pub count: u64,
    pub last_example: Option<String>,
    pub last_mention_at: Option<DateTime<Utc>>,
}

/// Classifier state. Stats are stored in the same order as the taxonomy sets.
#[derive(Debug)]
pub struct KeywordClassifier {
    taxonomy: Arc<Taxonomy>,
    concern_stats: Vec<CategoryStat>,
    condition_stats: Vec<CategoryStat>,
}

impl KeywordClassifier {
    pub fn new(taxonomy: Arc<Taxonomy>) -> Self {
        let concern_stats = vec![CategoryStat::default(); taxonomy.concerns().len()];
        let condition_stats = vec![CategoryStat::default(); taxonomy.conditions().len()];
        Self {
            taxonomy,
            concern_stats,
            condition_stats,
        }
    }

    /// Classify every message of one turn. All matches share `at` as their
    /// mention time. Returns the number of (message, entry) matches recorded.
    pub fn classify_turn<S: AsRef<str>>(&mut self, messages: &[S], at: DateTime<Utc>) -> usize {
        let mut recorded = 0;
        for message in messages {
            let text = message.as_ref().trim();
            if text.is_empty() {
                continue;
            }

            let mut matched: Vec<&str> = Vec::new();
            for kind in [TaxonomyKind::Concern, TaxonomyKind::Condition] {
                let entries = self.taxonomy.entries(kind);
                let stats = match kind {
                    TaxonomyKind::Concern => &mut self.concern_stats,
                    TaxonomyKind::Condition => &mut self.condition_stats,
                };
                for (entry, stat) in entries.iter().zip(stats.iter_mut()) {
                    if !entry.matches(text) {
                        continue;
                    }
                    stat.count = stat.count.saturating_add(1);
                    stat.last_example = Some(truncate_example(text));
                    stat.last_mention_at = Some(at);
                    matched.push(entry.id.as_str());
                }
            }

            if !matched.is_empty() {
                recorded += matched.len();
                // Never log raw text. Only hashed id + matched entries.
                debug!(
                    target: "classifier",
                    id = %anon_hash(text),
                    matched = ?matched,
                    "message matched taxonomy"
                );
            }
        }
        recorded
    }

    /// Entries of one set paired with their stats, in taxonomy order.
    pub fn stats(&self, kind: TaxonomyKind) -> impl Iterator<Item = (&TaxonomyEntry, &CategoryStat)> {
        let stats = match kind {
            TaxonomyKind::Concern => &self.concern_stats,
            TaxonomyKind::Condition => &self.condition_stats,
        };
        self.taxonomy.entries(kind).iter().zip(stats.iter())
    }

    pub fn stat(&self, kind: TaxonomyKind, id: &str) -> Option<&CategoryStat> {
        self.stats(kind)
            .find(|(entry, _)| entry.id == id)
            .map(|(_, stat)| stat)
    }
}

/// Trim, then cut to 157 chars + "..." when longer than 160 chars.
pub fn truncate_example(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= EXAMPLE_MAX_CHARS {
        return trimmed.to_string();
    }
    let keep = EXAMPLE_MAX_CHARS - ELLIPSIS.len();
    let mut out: String = trimmed.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Short, stable, non-reversible id for a message (first 6 bytes of SHA-256).
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
