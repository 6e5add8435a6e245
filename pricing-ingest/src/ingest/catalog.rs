//! Parameter catalog cache
//!
//! Active parameters and their controlled vocabularies are loaded once into an
//! immutable [`CatalogSnapshot`]. Concurrent first use is single-flighted so
//! the backing store sees exactly one load.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use log::info;
use serde::Serialize;
use tokio::sync::Mutex;

use super::types::normalize_name;

/// Active parameter row as stored in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogParameter {
    pub id: String,
    pub name: String,
    pub is_pbm_specific: bool,
}

/// An allow-listed value; `pbm_id: None` applies to every PBM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlledValue {
    pub parameter_id: String,
    pub value: String,
    pub pbm_id: Option<String>,
}

/// Where the catalog is loaded from
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// All active parameters
    async fn load_parameters(&self) -> Result<Vec<CatalogParameter>>;

    /// Controlled values of active parameters that are effective right now
    async fn load_controlled_values(&self) -> Result<Vec<ControlledValue>>;
}

/// Parameter definition as seen by validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    pub id: String,
    pub name: String,
    pub is_pbm_specific: bool,
    /// True when the parameter has no controlled values
    pub allows_free_text: bool,
}

/// Immutable view of the catalog at load time
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    /// Normalized names in load order
    order: Vec<String>,
    by_name: HashMap<String, ParameterDefinition>,
    name_by_id: HashMap<String, String>,
    /// parameter id -> pbm id (None = global) -> values in load order
    values: HashMap<String, HashMap<Option<String>, Vec<String>>>,
    value_count: usize,
}

impl CatalogSnapshot {
    pub fn build(parameters: Vec<CatalogParameter>, controlled: Vec<ControlledValue>) -> Self {
        let mut snapshot = CatalogSnapshot::default();

        for param in parameters {
            let normalized = normalize_name(&param.name);
            if !snapshot.by_name.contains_key(&normalized) {
                snapshot.order.push(normalized.clone());
            }
            snapshot.name_by_id.insert(param.id.clone(), normalized.clone());
            snapshot.by_name.insert(
                normalized,
                ParameterDefinition {
                    id: param.id,
                    name: param.name,
                    is_pbm_specific: param.is_pbm_specific,
                    allows_free_text: true,
                },
            );
        }

        for cv in controlled {
            snapshot.value_count += 1;

            if let Some(definition) = snapshot
                .name_by_id
                .get(&cv.parameter_id)
                .and_then(|name| snapshot.by_name.get_mut(name))
            {
                definition.allows_free_text = false;
            }

            let bucket = snapshot
                .values
                .entry(cv.parameter_id)
                .or_default()
                .entry(cv.pbm_id)
                .or_default();
            if !bucket.contains(&cv.value) {
                bucket.push(cv.value);
            }
        }

        snapshot
    }

    /// Look up a parameter by normalized name
    pub fn parameter(&self, normalized_name: &str) -> Option<&ParameterDefinition> {
        self.by_name.get(normalized_name)
    }

    pub fn parameter_by_id(&self, parameter_id: &str) -> Option<&ParameterDefinition> {
        self.name_by_id
            .get(parameter_id)
            .and_then(|name| self.by_name.get(name))
    }

    /// Active parameters in load order
    pub fn parameters(&self) -> impl Iterator<Item = &ParameterDefinition> {
        self.order.iter().filter_map(|name| self.by_name.get(name))
    }

    pub fn parameter_count(&self) -> usize {
        self.by_name.len()
    }

    /// Number of controlled value rows loaded
    pub fn value_count(&self) -> usize {
        self.value_count
    }

    /// Controlled values of one parameter, summed over its PBM buckets
    pub fn controlled_value_count(&self, parameter_id: &str) -> usize {
        self.values
            .get(parameter_id)
            .map(|buckets| buckets.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Free-text when unknown or without controlled values
    pub fn is_free_text_field(&self, parameter_id: &str) -> bool {
        self.parameter_by_id(parameter_id)
            .map(|p| p.allows_free_text)
            .unwrap_or(true)
    }

    /// Check the PBM-scoped bucket first, then the global one
    ///
    /// Always true for parameters without controlled values.
    pub fn is_valid_value(&self, parameter_id: &str, value: &str, pbm_id: Option<&str>) -> bool {
        let Some(buckets) = self.values.get(parameter_id) else {
            return true;
        };

        let in_bucket = |key: Option<&str>| {
            buckets
                .get(&key.map(str::to_string))
                .is_some_and(|values| values.iter().any(|v| v == value))
        };

        if let Some(pbm) = pbm_id.filter(|p| !p.is_empty()) {
            if in_bucket(Some(pbm)) {
                return true;
            }
        }

        in_bucket(None)
    }

    /// Union of global and PBM-scoped values, deduplicated, global first
    pub fn get_valid_values(&self, parameter_id: &str, pbm_id: Option<&str>) -> Vec<String> {
        let Some(buckets) = self.values.get(parameter_id) else {
            return Vec::new();
        };

        let mut result: Vec<String> = buckets.get(&None).cloned().unwrap_or_default();
        if let Some(pbm) = pbm_id.filter(|p| !p.is_empty()) {
            for value in buckets.get(&Some(pbm.to_string())).into_iter().flatten() {
                if !result.contains(value) {
                    result.push(value.clone());
                }
            }
        }
        result
    }
}

/// Lazily loaded, process-wide parameter catalog
pub struct ParameterCatalog {
    source: Arc<dyn CatalogSource>,
    snapshot: ArcSwapOption<CatalogSnapshot>,
    load_lock: Mutex<()>,
    loads: AtomicUsize,
}

impl ParameterCatalog {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self {
            source,
            snapshot: ArcSwapOption::empty(),
            load_lock: Mutex::new(()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Load the catalog if it has not been loaded yet
    ///
    /// Repeated and concurrent calls share one load.
    pub async fn initialize(&self) -> Result<Arc<CatalogSnapshot>> {
        if let Some(snapshot) = self.snapshot.load_full() {
            return Ok(snapshot);
        }

        let _guard = self.load_lock.lock().await;
        if let Some(snapshot) = self.snapshot.load_full() {
            return Ok(snapshot);
        }

        let snapshot = Arc::new(self.load().await?);
        self.snapshot.store(Some(snapshot.clone()));
        Ok(snapshot)
    }

    #[cfg(test)]
    fn is_initialized(&self) -> bool {
        self.snapshot.load().is_some()
    }

    /// How many times the source has been read
    #[cfg(test)]
    fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    async fn load(&self) -> Result<CatalogSnapshot> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        let parameters = self.source.load_parameters().await?;
        let controlled = self.source.load_controlled_values().await?;
        let snapshot = CatalogSnapshot::build(parameters, controlled);

        info!(
            "Parameter catalog initialized with {} parameters and {} valid values",
            snapshot.parameter_count(),
            snapshot.value_count()
        );

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticSource {
        parameters: Vec<CatalogParameter>,
        values: Vec<ControlledValue>,
    }

    #[async_trait]
    impl CatalogSource for StaticSource {
        async fn load_parameters(&self) -> Result<Vec<CatalogParameter>> {
            tokio::task::yield_now().await;
            Ok(self.parameters.clone())
        }

        async fn load_controlled_values(&self) -> Result<Vec<ControlledValue>> {
            Ok(self.values.clone())
        }
    }

    fn param(id: &str, name: &str, pbm: bool) -> CatalogParameter {
        CatalogParameter {
            id: id.into(),
            name: name.into(),
            is_pbm_specific: pbm,
        }
    }

    fn value(parameter_id: &str, value: &str, pbm_id: Option<&str>) -> ControlledValue {
        ControlledValue {
            parameter_id: parameter_id.into(),
            value: value.into(),
            pbm_id: pbm_id.map(str::to_string),
        }
    }

    fn source() -> StaticSource {
        StaticSource {
            parameters: vec![
                param("P1", "Pharmacy Benefits Manager", false),
                param("P2", "Network", true),
                param("P3", "Client Name", false),
            ],
            values: vec![
                value("P1", "Acme PBM", None),
                value("P1", "Zenith Rx", None),
                value("P2", "National", None),
                value("P2", "Narrow", Some("Acme PBM")),
                value("P2", "National", Some("Acme PBM")),
            ],
        }
    }

    fn snapshot() -> CatalogSnapshot {
        let src = source();
        CatalogSnapshot::build(src.parameters, src.values)
    }

    #[test]
    fn test_lookup_by_normalized_name_and_id() {
        let catalog = snapshot();
        let network = catalog.parameter("NETWORK").unwrap();
        assert_eq!(network.id, "P2");
        assert!(network.is_pbm_specific);
        assert_eq!(
            catalog.parameter_by_id("P1").unwrap().name,
            "Pharmacy Benefits Manager"
        );
        assert!(catalog.parameter("Network").is_none());
    }

    #[test]
    fn test_free_text_is_derived_from_missing_values() {
        let catalog = snapshot();
        assert!(catalog.is_free_text_field("P3"));
        assert!(!catalog.is_free_text_field("P2"));
        assert!(catalog.is_free_text_field("UNKNOWN"));
        assert!(catalog.is_valid_value("P3", "anything at all", None));
    }

    #[test]
    fn test_pbm_scope_falls_back_to_global() {
        let catalog = snapshot();
        assert!(catalog.is_valid_value("P2", "Narrow", Some("Acme PBM")));
        assert!(catalog.is_valid_value("P2", "National", Some("Zenith Rx")));
        assert!(!catalog.is_valid_value("P2", "Narrow", Some("Zenith Rx")));
        assert!(!catalog.is_valid_value("P2", "Narrow", None));
    }

    #[test]
    fn test_valid_values_are_unioned_and_deduplicated() {
        let catalog = snapshot();
        assert_eq!(
            catalog.get_valid_values("P2", Some("Acme PBM")),
            vec!["National".to_string(), "Narrow".to_string()]
        );
        assert_eq!(catalog.get_valid_values("P2", None), vec!["National".to_string()]);
        assert!(catalog.get_valid_values("P3", None).is_empty());
    }

    #[test]
    fn test_parameters_keep_load_order() {
        let catalog = snapshot();
        let names: Vec<&str> = catalog.parameters().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Pharmacy Benefits Manager", "Network", "Client Name"]);
        assert_eq!(catalog.value_count(), 5);
        assert_eq!(catalog.controlled_value_count("P2"), 3);
        assert_eq!(catalog.controlled_value_count("P3"), 0);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let catalog = ParameterCatalog::new(Arc::new(source()));
        assert!(!catalog.is_initialized());

        let first = catalog.initialize().await.unwrap();
        let second = catalog.initialize().await.unwrap();

        assert_eq!(catalog.load_count(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.parameter_count(), 3);
        assert_eq!(second.get_valid_values("P1", None).len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_use_loads_once() {
        let catalog = Arc::new(ParameterCatalog::new(Arc::new(source())));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let catalog = catalog.clone();
                tokio::spawn(async move { catalog.initialize().await.map(|_| ()) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(catalog.load_count(), 1);
    }
}
