//! Commentary catalog: the fixed per-category message lists.
//!
//! The default catalog is embedded at compile time from
//! `contrib/commentary.toml`; a user file with the same layout can replace it.
//! A catalog only exists once every category holds at least one message.
//! Duplicate lines within a category are dropped at load, so distinct
//! indices always mean distinct text.

use crate::types::{ContractError, ExpressionLabel};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

const EMBEDDED_CATALOG: &str = include_str!("../../../contrib/commentary.toml");

/// A commentary list: one per mood label plus one for age reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommentaryCategory {
    Mood(ExpressionLabel),
    Age,
}

impl CommentaryCategory {
    pub fn all() -> impl Iterator<Item = CommentaryCategory> {
        ExpressionLabel::ALL
            .into_iter()
            .map(CommentaryCategory::Mood)
            .chain(std::iter::once(CommentaryCategory::Age))
    }
}

impl fmt::Display for CommentaryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentaryCategory::Mood(label) => write!(f, "{label}"),
            CommentaryCategory::Age => f.write_str("age"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read commentary file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bad commentary TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("commentary catalog: {0}")]
    UnknownCategory(#[from] ContractError),
    #[error("commentary category '{0}' has no messages")]
    EmptyCategory(CommentaryCategory),
}

/// On-disk layout of a catalog file.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    mood: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    age: AgeSection,
}

#[derive(Debug, Default, Deserialize)]
struct AgeSection {
    #[serde(default)]
    lines: Vec<String>,
}

/// Validated message lists. Every category is non-empty and holds
/// distinct lines.
#[derive(Debug, Clone)]
pub struct CommentaryCatalog {
    mood: [Vec<String>; 7],
    age: Vec<String>,
}

impl CommentaryCatalog {
    /// The catalog shipped with the binary.
    pub fn embedded() -> Result<Self, CatalogError> {
        Self::from_toml(EMBEDDED_CATALOG)
    }

    /// Load a catalog from a TOML file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let src = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_toml(&src)?;
        tracing::info!(path = %path.display(), "loaded commentary catalog");
        Ok(catalog)
    }

    pub fn from_toml(src: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(src)?;

        let mut mood: [Vec<String>; 7] = Default::default();
        for (name, lines) in file.mood {
            let label: ExpressionLabel = name.parse()?;
            mood[label.index()] = lines;
        }

        Self::from_lists(mood, file.age.lines)
    }

    /// Build directly from lists, with the same deduplication and
    /// non-empty validation.
    pub fn from_lists(mut mood: [Vec<String>; 7], mut age: Vec<String>) -> Result<Self, CatalogError> {
        for (category, lines) in CommentaryCategory::all().zip(mood.iter_mut().chain([&mut age])) {
            let before = lines.len();
            dedup_in_order(lines);
            if lines.len() < before {
                tracing::debug!(%category, dropped = before - lines.len(), "duplicate commentary lines");
            }
        }
        let catalog = Self { mood, age };
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        match CommentaryCategory::all().find(|c| self.messages(*c).is_empty()) {
            Some(empty) => Err(CatalogError::EmptyCategory(empty)),
            None => Ok(()),
        }
    }

    pub fn messages(&self, category: CommentaryCategory) -> &[String] {
        match category {
            CommentaryCategory::Mood(label) => &self.mood[label.index()],
            CommentaryCategory::Age => &self.age,
        }
    }
}

fn dedup_in_order(lines: &mut Vec<String>) {
    let mut seen = HashSet::new();
    lines.retain(|line| seen.insert(line.clone()));
}
