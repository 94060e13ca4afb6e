//! Country catalogs of vaccination entries.
//!
//! A [`CatalogProvider`] turns a country code into a [`VaccineCatalog`] by
//! asking a [`ResourceResolver`] for `<CODE>.json`. Catalogs for the supported
//! countries are compiled into the binary; a directory on disk can override
//! or extend them.

use crate::config::CatalogConfig;
use crate::types::{Country, VaccineCatalog};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// Catalogs shipped with the crate, keyed by resource name
static BUNDLED: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("RU.json", include_str!("../catalogs/RU.json")),
        ("US.json", include_str!("../catalogs/US.json")),
    ])
});

const RESOURCE_EXTENSION: &str = ".json";

// ============================================================================
// Resource Resolvers
// ============================================================================

/// Source of raw catalog resources
pub trait ResourceResolver {
    /// Load a resource by name, `Ok(None)` if it does not exist
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Names of all resources this resolver can load
    fn names(&self) -> Result<Vec<String>>;
}

/// Catalogs compiled into the binary
#[derive(Clone, Copy, Debug, Default)]
pub struct BundledResources;

impl ResourceResolver for BundledResources {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(BUNDLED.get(name).map(|s| s.as_bytes().to_vec()))
    }

    fn names(&self) -> Result<Vec<String>> {
        Ok(BUNDLED.keys().map(|k| k.to_string()).collect())
    }
}

/// Catalogs stored as `<CODE>.json` files in a directory
#[derive(Clone, Debug)]
pub struct DirectoryResources {
    dir: PathBuf,
}

impl DirectoryResources {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ResourceResolver for DirectoryResources {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.dir.join(name);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        tracing::debug!("Read catalog resource {:?}", path);
        Ok(Some(bytes))
    }

    fn names(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(RESOURCE_EXTENSION) && entry.path().is_file() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Resolvers consulted in order; the first one that has a resource wins
#[derive(Default)]
pub struct LayeredResources {
    layers: Vec<Box<dyn ResourceResolver>>,
}

impl LayeredResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, layer: impl ResourceResolver + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }
}

impl ResourceResolver for LayeredResources {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        for layer in &self.layers {
            if let Some(bytes) = layer.load(name)? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }

    fn names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for layer in &self.layers {
            names.extend(layer.names()?);
        }
        names.sort();
        names.dedup();
        Ok(names)
    }
}

// ============================================================================
// Catalog Provider
// ============================================================================

/// Normalize a user-supplied country code for lookup
///
/// Codes are trimmed and uppercased. Only ASCII alphanumerics, `-` and `_`
/// are accepted, which keeps resource names inside their directory.
pub fn normalize_country_code(code: &str) -> Option<String> {
    let code = code.trim();
    let valid = !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| code.to_ascii_uppercase())
}

fn resource_name(normalized: &str) -> String {
    format!("{}{}", normalized, RESOURCE_EXTENSION)
}

/// Outcome of resolving a country, with any fallback made explicit
#[derive(Debug)]
pub enum CatalogResolution {
    /// The requested country's catalog
    Loaded(VaccineCatalog),
    /// The requested country failed; the fallback country's catalog is used
    Fallback {
        requested: String,
        catalog: VaccineCatalog,
        cause: Error,
    },
    /// Neither the requested country nor the fallback could be loaded
    Unavailable { requested: String, cause: Error },
}

impl CatalogResolution {
    /// The catalog to use, if any
    pub fn catalog(&self) -> Option<&VaccineCatalog> {
        match self {
            CatalogResolution::Loaded(catalog) => Some(catalog),
            CatalogResolution::Fallback { catalog, .. } => Some(catalog),
            CatalogResolution::Unavailable { .. } => None,
        }
    }
}

/// Resolves country codes to catalogs
pub struct CatalogProvider {
    resources: Box<dyn ResourceResolver>,
    fallback_country: Option<String>,
}

impl CatalogProvider {
    /// Provider over the given resources, with no fallback country
    pub fn new(resources: impl ResourceResolver + 'static) -> Self {
        Self {
            resources: Box::new(resources),
            fallback_country: None,
        }
    }

    /// Provider over the bundled catalogs, falling back to `RU`
    pub fn bundled() -> Self {
        Self::from_config(&CatalogConfig::default())
    }

    /// Provider honoring the catalog section of the configuration
    pub fn from_config(config: &CatalogConfig) -> Self {
        let provider = match &config.dir {
            Some(dir) => Self::new(
                LayeredResources::new()
                    .with_layer(DirectoryResources::new(dir))
                    .with_layer(BundledResources),
            ),
            None => Self::new(BundledResources),
        };
        provider.with_fallback(config.fallback())
    }

    pub fn with_fallback(mut self, country: Option<&str>) -> Self {
        self.fallback_country = country.and_then(normalize_country_code);
        self
    }

    pub fn fallback_country(&self) -> Option<&str> {
        self.fallback_country.as_deref()
    }

    /// Load the catalog for a country code
    ///
    /// Fails with [`Error::CatalogNotFound`] when no resource matches the
    /// normalized code, and [`Error::CatalogDecodeFailed`] when one does but
    /// cannot be read, parsed or validated.
    pub fn load_catalog(&self, country_code: &str) -> Result<VaccineCatalog> {
        let code = normalize_country_code(country_code)
            .ok_or_else(|| Error::CatalogNotFound(country_code.trim().to_string()))?;

        let decode_failed = |reason: String| Error::CatalogDecodeFailed {
            country: code.clone(),
            reason,
        };

        let bytes = self
            .resources
            .load(&resource_name(&code))
            .map_err(|e| decode_failed(e.to_string()))?
            .ok_or_else(|| Error::CatalogNotFound(code.clone()))?;

        let catalog: VaccineCatalog =
            serde_json::from_slice(&bytes).map_err(|e| decode_failed(e.to_string()))?;

        let errors = catalog.validate();
        if !errors.is_empty() {
            return Err(decode_failed(errors.join("; ")));
        }

        if !catalog.country.eq_ignore_ascii_case(&code) {
            tracing::warn!(
                "Catalog resource for {} declares country '{}'",
                code,
                catalog.country
            );
        }

        tracing::debug!(
            "Loaded catalog {} ({} mandatory, {} recommended)",
            code,
            catalog.mandatory.len(),
            catalog.recommended.len()
        );
        Ok(catalog)
    }

    /// Resolve a country, falling back to the configured default country
    ///
    /// Never fails; a fallback or a missing catalog is reported in the result
    /// and logged.
    pub fn resolve(&self, country_code: &str) -> CatalogResolution {
        let requested = normalize_country_code(country_code)
            .unwrap_or_else(|| country_code.trim().to_string());

        let cause = match self.load_catalog(country_code) {
            Ok(catalog) => return CatalogResolution::Loaded(catalog),
            Err(e) => e,
        };

        let fallback = match &self.fallback_country {
            Some(fallback) if *fallback != requested => fallback,
            _ => {
                tracing::warn!("No catalog available for {}: {}", requested, cause);
                return CatalogResolution::Unavailable { requested, cause };
            }
        };

        match self.load_catalog(fallback) {
            Ok(catalog) => {
                tracing::warn!(
                    "Catalog for {} unavailable ({}), using fallback country {}",
                    requested,
                    cause,
                    fallback
                );
                CatalogResolution::Fallback {
                    requested,
                    catalog,
                    cause,
                }
            }
            Err(fallback_err) => {
                tracing::warn!(
                    "No catalog available for {} ({}); fallback {} failed too: {}",
                    requested,
                    cause,
                    fallback,
                    fallback_err
                );
                CatalogResolution::Unavailable { requested, cause }
            }
        }
    }

    /// Countries with a loadable catalog, sorted by code
    ///
    /// Resources that fail to load are skipped with a warning.
    pub fn available_countries(&self) -> Vec<Country> {
        let names = match self.resources.names() {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!("Unable to list catalog resources: {}", e);
                return Vec::new();
            }
        };

        let mut countries: Vec<Country> = names
            .iter()
            .filter_map(|name| name.strip_suffix(RESOURCE_EXTENSION))
            .filter_map(|code| match self.load_catalog(code) {
                Ok(catalog) => Some(Country {
                    code: code.to_ascii_uppercase(),
                    name: catalog.name.unwrap_or_else(|| code.to_ascii_uppercase()),
                }),
                Err(e) => {
                    tracing::warn!("Skipping catalog {}: {}", code, e);
                    None
                }
            })
            .collect();
        countries.sort_by(|a, b| a.code.cmp(&b.code));
        countries.dedup_by(|a, b| a.code == b.code);
        countries
    }
}

impl VaccineCatalog {
    /// Validate the catalog for consistency and completeness
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.country.trim().is_empty() {
            errors.push("Catalog has empty country".to_string());
        }

        // Ids must be unique across both lists
        let mut seen = HashSet::new();
        for entry in self.mandatory.iter().chain(self.recommended.iter()) {
            if entry.id.trim().is_empty() {
                errors.push(format!("Entry '{}' has empty ID", entry.name));
                continue;
            }
            if !seen.insert(entry.id.as_str()) {
                errors.push(format!("Duplicate entry ID '{}'", entry.id));
            }
            if entry.name.trim().is_empty() {
                errors.push(format!("Entry '{}' has empty name", entry.id));
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgeOffset;
    use chrono::NaiveDate;

    fn write_catalog(dir: &std::path::Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn test_bundled_catalogs_load_and_validate() {
        let provider = CatalogProvider::bundled();
        for code in ["RU", "US"] {
            let catalog = provider.load_catalog(code).unwrap();
            assert_eq!(catalog.country, code);
            assert!(!catalog.mandatory.is_empty());
            assert!(!catalog.recommended.is_empty());
            assert!(catalog.validate().is_empty());
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let provider = CatalogProvider::bundled();
        let lower = provider.load_catalog(" ru ").unwrap();
        let upper = provider.load_catalog("RU").unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn test_unknown_country_is_not_found() {
        let provider = CatalogProvider::new(BundledResources);
        assert!(matches!(
            provider.load_catalog("ZZ"),
            Err(Error::CatalogNotFound(code)) if code == "ZZ"
        ));
        assert!(matches!(
            provider.load_catalog("../RU"),
            Err(Error::CatalogNotFound(_))
        ));
        assert!(matches!(provider.load_catalog(""), Err(Error::CatalogNotFound(_))));
    }

    #[test]
    fn test_malformed_resource_is_decode_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_catalog(temp_dir.path(), "XX.json", "{ not json");
        write_catalog(temp_dir.path(), "YY.json", r#"{"country":"YY"}"#);

        let provider = CatalogProvider::new(DirectoryResources::new(temp_dir.path()));
        assert!(matches!(
            provider.load_catalog("xx"),
            Err(Error::CatalogDecodeFailed { country, .. }) if country == "XX"
        ));
        assert!(matches!(
            provider.load_catalog("YY"),
            Err(Error::CatalogDecodeFailed { .. })
        ));
    }

    #[test]
    fn test_duplicate_ids_fail_validation() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_catalog(
            temp_dir.path(),
            "DU.json",
            r#"{"country":"DU",
                "mandatory":[{"id":"a","name":"A","ageOffset":{}}],
                "recommended":[{"id":"a","name":"A again","ageOffset":{"days":1}}]}"#,
        );

        let provider = CatalogProvider::new(DirectoryResources::new(temp_dir.path()));
        match provider.load_catalog("DU") {
            Err(Error::CatalogDecodeFailed { reason, .. }) => {
                assert!(reason.contains("Duplicate entry ID 'a'"), "{}", reason)
            }
            other => panic!("expected decode failure, got {:?}", other),
        }
    }

    #[test]
    fn test_directory_overrides_bundled() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_catalog(
            temp_dir.path(),
            "RU.json",
            concat!(
                r#"{"country":"RU","name":"Custom","#,
                r#""mandatory":[{"id":"x","name":"X","ageOffset":{"months":2}}]}"#,
            ),
        );
        write_catalog(
            temp_dir.path(),
            "DE.json",
            r#"{"country":"DE","mandatory":[]}"#,
        );

        let config = CatalogConfig {
            dir: Some(temp_dir.path().to_path_buf()),
            fallback_country: "RU".into(),
        };
        let provider = CatalogProvider::from_config(&config);

        let ru = provider.load_catalog("RU").unwrap();
        assert_eq!(ru.mandatory.len(), 1);
        assert_eq!(ru.mandatory[0].age_offset, AgeOffset::months(2));
        assert!(ru.recommended.is_empty());

        // Bundled catalogs not shadowed by the directory are still available
        assert!(provider.load_catalog("US").is_ok());

        let countries = provider.available_countries();
        let codes: Vec<&str> = countries.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["DE", "RU", "US"]);
        assert_eq!(countries[0].name, "DE");
        assert_eq!(countries[1].name, "Custom");
    }

    #[test]
    fn test_resolve_uses_flagged_fallback() {
        let provider = CatalogProvider::bundled();
        match provider.resolve("zz") {
            CatalogResolution::Fallback {
                requested,
                catalog,
                cause,
            } => {
                assert_eq!(requested, "ZZ");
                assert_eq!(catalog.country, "RU");
                assert!(matches!(cause, Error::CatalogNotFound(_)));
            }
            other => panic!("expected fallback, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_without_fallback_is_unavailable() {
        let provider = CatalogProvider::new(BundledResources);
        let resolution = provider.resolve("ZZ");
        assert!(resolution.catalog().is_none());
        assert!(matches!(
            resolution,
            CatalogResolution::Unavailable { cause: Error::CatalogNotFound(_), .. }
        ));
    }

    #[test]
    fn test_resolve_does_not_retry_failing_fallback() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_catalog(temp_dir.path(), "RU.json", "garbage");

        let provider = CatalogProvider::new(DirectoryResources::new(temp_dir.path()))
            .with_fallback(Some("ru"));
        assert!(matches!(
            provider.resolve("RU"),
            CatalogResolution::Unavailable { cause: Error::CatalogDecodeFailed { .. }, .. }
        ));
    }

    #[test]
    fn test_bundled_entries_resolve_due_dates() {
        let catalog = CatalogProvider::bundled().load_catalog("RU").unwrap();
        let birth = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        for entry in catalog.mandatory.iter().chain(catalog.recommended.iter()) {
            let due = entry.age_offset.apply(birth).unwrap();
            assert!(due >= birth, "{} due before birth", entry.id);
        }
    }
}
