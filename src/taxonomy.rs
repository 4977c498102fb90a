// src/taxonomy.rs
//! Concern/condition taxonomy: config schema (TOML), regex compilation and
//! per-entry matching.
//!
//! The built-in table lives in `config/taxonomy.toml` and is embedded at compile
//! time; `TAXONOMY_PATH` can point at a replacement file with the same schema.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::Context;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

const BUILTIN_TAXONOMY: &str = include_str!("../config/taxonomy.toml");

/// Which of the two independently enumerated sets an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxonomyKind {
    /// Symptom-level category (e.g. chest pain).
    Concern,
    /// Illness-level category (e.g. common cold).
    Condition,
}

impl fmt::Display for TaxonomyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaxonomyKind::Concern => f.write_str("concern"),
            TaxonomyKind::Condition => f.write_str("condition"),
        }
    }
}

/* ----------------------------
Config schema (from TOML)
---------------------------- */

#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomyRoot {
    #[serde(default)]
    pub concerns: Vec<EntryCfg>,
    #[serde(default)]
    pub conditions: Vec<EntryCfg>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryCfg {
    pub id: String,
    pub label: String,
    pub category: String,
    pub description: String,
    pub guidance: String,
    pub patterns: Vec<String>,
}

/* ----------------------------
Compiled structures
---------------------------- */

/// One immutable taxonomy entry with its compiled pattern set.
#[derive(Debug)]
pub struct TaxonomyEntry {
    pub id: String,
    pub label: String,
    pub category: String,
    pub description: String,
    pub guidance: String,
    patterns: Vec<Regex>,
}

impl TaxonomyEntry {
    fn compile(kind: TaxonomyKind, cfg: EntryCfg) -> anyhow::Result<Self> {
        if cfg.patterns.is_empty() {
            anyhow::bail!("{kind} `{}` has no patterns", cfg.id);
        }
        let patterns = cfg
            .patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| anyhow::anyhow!("{kind} `{}` regex error: {}", cfg.id, e))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            id: cfg.id,
            label: cfg.label,
            category: cfg.category,
            description: cfg.description,
            guidance: cfg.guidance,
            patterns,
        })
    }

    /// True if any pattern in the set matches somewhere in `text`.
    pub fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(text))
    }
}

/// Both entry sets, in declaration order.
#[derive(Debug)]
pub struct Taxonomy {
    concerns: Vec<TaxonomyEntry>,
    conditions: Vec<TaxonomyEntry>,
}

impl Taxonomy {
    /// The taxonomy embedded in the binary.
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_toml_str(BUILTIN_TAXONOMY).context("built-in taxonomy is invalid")
    }

    /// Load from an explicit path, or fall back to the built-in table.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = fs::read_to_string(p)
                    .with_context(|| format!("reading taxonomy from {}", p.display()))?;
                Self::from_toml_str(&content)
                    .with_context(|| format!("parsing taxonomy at {}", p.display()))
            }
            None => Self::builtin(),
        }
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let root: TaxonomyRoot = toml::from_str(toml_str)?;
        Ok(Self {
            concerns: compile_set(TaxonomyKind::Concern, root.concerns)?,
            conditions: compile_set(TaxonomyKind::Condition, root.conditions)?,
        })
    }

    pub fn entries(&self, kind: TaxonomyKind) -> &[TaxonomyEntry] {
        match kind {
            TaxonomyKind::Concern => &self.concerns,
            TaxonomyKind::Condition => &self.conditions,
        }
    }

    pub fn concerns(&self) -> &[TaxonomyEntry] {
        &self.concerns
    }

    pub fn conditions(&self) -> &[TaxonomyEntry] {
        &self.conditions
    }
}

fn compile_set(kind: TaxonomyKind, cfgs: Vec<EntryCfg>) -> anyhow::Result<Vec<TaxonomyEntry>> {
    let mut seen = HashSet::new();
    cfgs.into_iter()
        .map(|cfg| {
            if !seen.insert(cfg.id.clone()) {
                anyhow::bail!("duplicate {kind} id `{}`", cfg.id);
            }
            TaxonomyEntry::compile(kind, cfg)
        })
        .collect()
}
