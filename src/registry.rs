//! Process-wide registry: driver factories, the file-definition cache,
//! and call statistics.

use crate::conn::driver::DriverFactory;
use crate::protocol::CommandCode;
use crate::target::Fnr;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<Registry> = Arc::new(Registry::new());
}

/// The raw field definition table of one file, as returned by the
/// definition-read command. Interpreting the table is left to the value
/// layer; the engine only caches the bytes.
#[derive(Clone, Debug)]
pub struct FileDefinition {
    pub target: String,
    pub file_nr: Fnr,
    pub raw: Vec<u8>,
}

/// Call counts and accumulated duration for one command code.
#[derive(Clone, Copy, Debug, Default)]
pub struct CallCounter {
    pub calls: u64,
    pub elapsed: Duration,
}

/// Per-command call statistics, disabled by default.
#[derive(Debug, Default)]
pub struct CallStatistics {
    enabled: AtomicBool,
    counters: Mutex<HashMap<&'static str, CallCounter>>,
}

impl CallStatistics {
    pub fn enable(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn record(&self, command: CommandCode, elapsed: Duration) {
        if !self.is_enabled() {
            return;
        }
        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let counter = counters.entry(command.as_str()).or_default();
        counter.calls += 1;
        counter.elapsed += elapsed;
    }

    /// A copy of the current counters, keyed by command code.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<&'static str, CallCounter> {
        match self.counters.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn reset(&self) {
        if let Ok(mut counters) = self.counters.lock() {
            counters.clear();
        }
    }
}

/// Holds everything sessions look up by name: driver factories, cached
/// file definitions, statistics.
///
/// Sessions default to the process-wide instance from [`Registry::global`],
/// but an isolated instance can be injected per session.
#[derive(Default)]
pub struct Registry {
    drivers: Mutex<HashMap<String, DriverFactory>>,
    definitions: Mutex<HashMap<(String, Fnr), Arc<FileDefinition>>>,
    statistics: CallStatistics,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default registry.
    #[must_use]
    pub fn global() -> Arc<Self> {
        GLOBAL_REGISTRY.clone()
    }

    /// Registers a driver factory under `name` (the scheme used in target
    /// descriptors). A second registration under the same name replaces
    /// the first.
    pub fn register_driver(&self, name: &str, factory: DriverFactory) {
        let mut drivers = match self.drivers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if drivers.insert(name.to_lowercase(), factory).is_some() {
            debug!("driver factory {name:?} replaced");
        }
    }

    pub(crate) fn with_driver<T>(
        &self,
        name: &str,
        f: impl FnOnce(&DriverFactory) -> T,
    ) -> Option<T> {
        let drivers = match self.drivers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        drivers.get(name).map(f)
    }

    /// The cached file definition for `(target, file_nr)`, if present.
    #[must_use]
    pub fn cached_definition(&self, target: &str, file_nr: Fnr) -> Option<Arc<FileDefinition>> {
        let definitions = match self.definitions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        definitions.get(&(target.to_string(), file_nr)).cloned()
    }

    pub(crate) fn put_definition(&self, definition: FileDefinition) -> Arc<FileDefinition> {
        let key = (definition.target.clone(), definition.file_nr);
        let definition = Arc::new(definition);
        let mut definitions = match self.definitions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        definitions.insert(key, definition.clone());
        definition
    }

    /// Drops the cached definition of one file, forcing a re-read.
    pub fn invalidate_definition(&self, target: &str, file_nr: Fnr) {
        if let Ok(mut definitions) = self.definitions.lock() {
            definitions.remove(&(target.to_string(), file_nr));
        }
    }

    #[must_use]
    pub fn statistics(&self) -> &CallStatistics {
        &self.statistics
    }

    /// Drops all registered drivers, cached definitions and statistics.
    /// Intended for test teardown.
    pub fn clear(&self) {
        if let Ok(mut drivers) = self.drivers.lock() {
            drivers.clear();
        }
        if let Ok(mut definitions) = self.definitions.lock() {
            definitions.clear();
        }
        self.statistics.reset();
        self.statistics.enable(false);
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let driver_names: Vec<String> = match self.drivers.lock() {
            Ok(guard) => guard.keys().cloned().collect(),
            Err(_) => vec!["<poisoned>".to_string()],
        };
        f.debug_struct("Registry")
            .field("drivers", &driver_names)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{FileDefinition, Registry};
    use crate::protocol::CommandCode;
    use std::time::Duration;

    #[test]
    fn definition_cache_round_trip() {
        let registry = Registry::new();
        assert!(registry.cached_definition("24", 11).is_none());
        registry.put_definition(FileDefinition {
            target: "24".to_string(),
            file_nr: 11,
            raw: vec![1, 2, 3],
        });
        let hit = registry.cached_definition("24", 11).unwrap();
        assert_eq!(hit.raw, vec![1, 2, 3]);
        registry.invalidate_definition("24", 11);
        assert!(registry.cached_definition("24", 11).is_none());
    }

    #[test]
    fn statistics_only_when_enabled() {
        let registry = Registry::new();
        registry
            .statistics()
            .record(CommandCode::L1, Duration::from_millis(5));
        assert!(registry.statistics().snapshot().is_empty());

        registry.statistics().enable(true);
        registry
            .statistics()
            .record(CommandCode::L1, Duration::from_millis(5));
        registry
            .statistics()
            .record(CommandCode::L1, Duration::from_millis(3));
        let snapshot = registry.statistics().snapshot();
        assert_eq!(snapshot["L1"].calls, 2);
        assert_eq!(snapshot["L1"].elapsed, Duration::from_millis(8));
    }
}
