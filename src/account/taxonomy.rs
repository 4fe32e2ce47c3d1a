//! Closed category taxonomy, fixed at configuration-load time.

use serde::Serialize;
use std::fmt;

use crate::error::{Result, TagspreadError};

/// A category name known to be part of a [`Taxonomy`].
///
/// Only constructed through [`Taxonomy::category`], so holding one means the
/// name passed validation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered, duplicate-free set of category names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxonomy {
    categories: Vec<Category>,
}

impl Taxonomy {
    /// Build a taxonomy, normalizing names to trimmed lowercase.
    /// Empty names, duplicates and an empty list are rejected.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut categories: Vec<Category> = Vec::new();
        for name in names {
            let normalized = name.as_ref().trim().to_lowercase();
            if normalized.is_empty() {
                return Err(TagspreadError::Config(
                    "category names must not be empty".to_string(),
                ));
            }
            if categories.iter().any(|c| c.0 == normalized) {
                return Err(TagspreadError::Config(format!(
                    "duplicate category: {}",
                    normalized
                )));
            }
            categories.push(Category(normalized));
        }

        if categories.is_empty() {
            return Err(TagspreadError::Config(
                "taxonomy must contain at least one category".to_string(),
            ));
        }

        Ok(Self { categories })
    }

    /// Look up a category by (case-insensitive) name.
    pub fn category(&self, name: &str) -> Option<Category> {
        let normalized = name.trim().to_lowercase();
        self.categories.iter().find(|c| c.0 == normalized).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.category(name).is_some()
    }

    /// Fail on the first tag that is not part of the taxonomy.
    pub fn validate_tags<S: AsRef<str>>(&self, tags: &[S]) -> Result<()> {
        for tag in tags {
            if !self.contains(tag.as_ref()) {
                return Err(TagspreadError::Config(format!(
                    "unknown category '{}' (known: {})",
                    tag.as_ref(),
                    self.names().join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Restrict to the given names, which must all be known.
    pub fn subset<I, S>(&self, names: I) -> Result<Taxonomy>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
        self.validate_tags(&names)?;
        Taxonomy::new(names)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.categories.iter().map(Category::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
