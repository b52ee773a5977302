//! Service Catalog - the static universe of known services.
//!
//! Loaded once at startup from the bundled `assets/catalog.toml`. Every entry is
//! validated; one bad entry fails the whole load so no partial catalog is served.
//! Services are kept in display order: category, then identifier.

use crate::error::CatalogError;
use crate::types::{Category, Criticality, Scope, ServiceDefinition};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Catalog data format version understood by this build
pub const CATALOG_VERSION: u32 = 1;

const BUNDLED_CATALOG: &str = include_str!("../assets/catalog.toml");

const DEFAULT_IMPACT: &str = "Impact of disabling is not documented. Proceed with caution.";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    version: u32,
    #[serde(default, rename = "service")]
    services: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogEntry {
    identifier: String,
    category: Category,
    scope: Scope,
    #[serde(default)]
    criticality: Criticality,
    description: String,
    #[serde(default)]
    impact: Option<String>,
}

/// Immutable, ordered set of service definitions
#[derive(Debug, Clone)]
pub struct Catalog {
    services: Vec<ServiceDefinition>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Load the catalog compiled into the binary
    pub fn bundled() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUNDLED_CATALOG)
    }

    /// Parse and validate catalog data
    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(content)?;
        if file.version != CATALOG_VERSION {
            return Err(CatalogError::UnsupportedVersion {
                found: file.version,
                expected: CATALOG_VERSION,
            });
        }

        let definitions = file
            .services
            .into_iter()
            .map(|entry| ServiceDefinition {
                identifier: entry.identifier.trim().to_string(),
                category: entry.category,
                description: entry.description.trim().to_string(),
                impact: entry
                    .impact
                    .map(|i| i.trim().to_string())
                    .filter(|i| !i.is_empty())
                    .unwrap_or_else(|| DEFAULT_IMPACT.to_string()),
                criticality: entry.criticality,
                scope: entry.scope,
            })
            .collect();

        Self::from_definitions(definitions)
    }

    /// Build a catalog from already-constructed definitions, applying the same validation
    pub fn from_definitions(mut services: Vec<ServiceDefinition>) -> Result<Self, CatalogError> {
        if services.is_empty() {
            return Err(CatalogError::Empty);
        }

        for (index, def) in services.iter().enumerate() {
            validate_identifier(&def.identifier)
                .map_err(|reason| CatalogError::InvalidEntry { index, reason })?;
            if def.description.trim().is_empty() {
                return Err(CatalogError::InvalidEntry {
                    index,
                    reason: format!("'{}' has an empty description", def.identifier),
                });
            }
        }

        services.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });

        let mut index = HashMap::with_capacity(services.len());
        for (pos, def) in services.iter().enumerate() {
            if index.insert(def.identifier.clone(), pos).is_some() {
                return Err(CatalogError::DuplicateIdentifier(def.identifier.clone()));
            }
        }

        debug!("Catalog loaded with {} services", services.len());
        Ok(Self { services, index })
    }

    pub fn get(&self, identifier: &str) -> Option<&ServiceDefinition> {
        self.index.get(identifier).map(|&pos| &self.services[pos])
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.index.contains_key(identifier)
    }

    /// All definitions in display order
    pub fn services(&self) -> &[ServiceDefinition] {
        &self.services
    }

    pub fn in_scope(&self, scope: Scope) -> impl Iterator<Item = &ServiceDefinition> + '_ {
        self.services.iter().filter(move |d| d.scope == scope)
    }

    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &ServiceDefinition> + '_ {
        self.services.iter().filter(move |d| d.category == category)
    }

    /// Categories that have at least one service, in display order
    pub fn categories(&self) -> Vec<Category> {
        let mut categories: Vec<Category> = self.services.iter().map(|d| d.category).collect();
        categories.dedup();
        categories
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Reverse-domain launchd label: dotted, no whitespace, launchd-safe characters
fn validate_identifier(identifier: &str) -> Result<(), String> {
    if identifier.is_empty() {
        return Err("empty identifier".to_string());
    }
    if !identifier.contains('.') || identifier.starts_with('.') || identifier.ends_with('.') {
        return Err(format!("'{}' is not a reverse-domain name", identifier));
    }
    if identifier.contains("..") {
        return Err(format!("'{}' has an empty label segment", identifier));
    }
    if let Some(bad) = identifier
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
    {
        return Err(format!("'{}' contains invalid character {:?}", identifier, bad));
    }
    Ok(())
}
