//! Category catalog
//!
//! The engine only needs two things from the catalog of problem categories:
//! whether a category key exists and which priority a new ticket in it gets.
//! Keys are either a top-level category (`internet`) or a
//! `category/subcategory` pair (`internet/no_connection`).

use super::Priority;
use crate::error::{DeskError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Lookup from category key to default priority
pub trait CategoryCatalog: Send + Sync {
    /// Priority assigned to new tickets in `category`, if it exists
    fn default_priority(&self, category: &str) -> Option<Priority>;

    /// Whether `category` is a known key
    fn contains(&self, category: &str) -> bool {
        self.default_priority(category).is_some()
    }

    /// Priority for `category`, or a validation error naming it
    fn resolve(&self, category: &str) -> Result<Priority> {
        self.default_priority(category)
            .ok_or_else(|| DeskError::validation(format!("Unknown category: {category}")))
    }
}

/// In-memory catalog, either built in or loaded from YAML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticCatalog {
    categories: BTreeMap<String, Priority>,
}

impl StaticCatalog {
    /// Catalog of the categories the desk ships with
    #[must_use]
    pub fn builtin() -> Self {
        let entries = [
            ("internet", Priority::Medium),
            ("internet/slow", Priority::Medium),
            ("internet/disconnects", Priority::Medium),
            ("internet/no_connection", Priority::High),
            ("system", Priority::Medium),
            ("system/slow", Priority::Medium),
            ("system/blue_screen", Priority::High),
            ("mobile", Priority::Medium),
            ("mobile/battery", Priority::Medium),
            ("mobile/performance", Priority::Medium),
            ("other", Priority::Medium),
            ("other/other", Priority::Medium),
        ];

        Self {
            categories: entries
                .into_iter()
                .map(|(key, priority)| (key.to_string(), priority))
                .collect(),
        }
    }

    /// Parse a catalog from YAML of the form `categories: { key: priority }`
    pub fn from_yaml(source: &str) -> Result<Self> {
        let catalog: Self = serde_yaml::from_str(source)?;
        if catalog.categories.is_empty() {
            return Err(DeskError::InvalidConfig(
                "category catalog must define at least one category".to_string(),
            ));
        }
        Ok(catalog)
    }

    /// Load a catalog file
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_yaml(&source)
    }

    /// Category keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CategoryCatalog for StaticCatalog {
    fn default_priority(&self, category: &str) -> Option<Priority> {
        self.categories.get(category.trim()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_priorities() {
        let catalog = StaticCatalog::builtin();
        assert_eq!(
            catalog.default_priority("internet/no_connection"),
            Some(Priority::High)
        );
        assert_eq!(
            catalog.default_priority("system/blue_screen"),
            Some(Priority::High)
        );
        assert_eq!(catalog.default_priority("mobile"), Some(Priority::Medium));
        assert!(catalog.contains("other/other"));
        assert!(!catalog.contains("printers"));
    }

    #[test]
    fn test_resolve_unknown_category_is_validation() {
        let err = StaticCatalog::builtin().resolve("printers").unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)));
    }

    #[test]
    fn test_yaml_catalog() {
        let catalog = StaticCatalog::from_yaml(
            "categories:\n  billing: low\n  billing/refund: critical\n",
        )
        .expect("Failed to parse catalog");
        assert_eq!(catalog.default_priority("billing"), Some(Priority::Low));
        assert_eq!(
            catalog.default_priority("billing/refund"),
            Some(Priority::Critical)
        );
        assert!(!catalog.contains("internet"));
        assert_eq!(catalog.keys().collect::<Vec<_>>(), ["billing", "billing/refund"]);
    }

    #[test]
    fn test_yaml_catalog_rejects_empty_and_bad_priority() {
        assert!(matches!(
            StaticCatalog::from_yaml("categories: {}\n"),
            Err(DeskError::InvalidConfig(_))
        ));
        assert!(StaticCatalog::from_yaml("categories:\n  billing: urgent\n").is_err());
    }
}
