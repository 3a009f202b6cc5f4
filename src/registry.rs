//! In-memory catalog of flag and experiment definitions.
//!
//! The catalog is an immutable [`Catalog`] snapshot behind an `RwLock`. Registration builds a new
//! snapshot and swaps it in, so an evaluation that grabbed a snapshot keeps a consistent view
//! even if definitions are re-registered concurrently.
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::{DefinitionError, ExperimentDefinition, FlagDefinition};

/// Immutable set of registered definitions.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    flags: HashMap<String, Arc<FlagDefinition>>,
    experiments: HashMap<String, Arc<ExperimentDefinition>>,
}

impl Catalog {
    pub fn flag(&self, key: &str) -> Option<&Arc<FlagDefinition>> {
        self.flags.get(key)
    }

    pub fn experiment(&self, key: &str) -> Option<&Arc<ExperimentDefinition>> {
        self.experiments.get(key)
    }
}

/// Registry of flag and experiment definitions.
///
/// Registration is an idempotent upsert by key. It is expected at start-up but is safe to call
/// concurrently with evaluation.
#[derive(Default)]
pub struct FlagRegistry {
    catalog: RwLock<Arc<Catalog>>,
}

impl FlagRegistry {
    pub fn new() -> FlagRegistry {
        FlagRegistry::default()
    }

    /// Current catalog snapshot.
    pub fn snapshot(&self) -> Arc<Catalog> {
        // Err() is possible only if the lock is poisoned (writer panicked while holding the lock),
        // which should never happen.
        self.catalog
            .read()
            .expect("thread holding catalog lock should not panic")
            .clone()
    }

    pub fn register_flag(&self, definition: FlagDefinition) -> Result<(), DefinitionError> {
        self.register_flags([definition])
    }

    /// Register several flags at once. Either all of them are registered or, if any is malformed,
    /// none is.
    pub fn register_flags(
        &self,
        definitions: impl IntoIterator<Item = FlagDefinition>,
    ) -> Result<(), DefinitionError> {
        let definitions = validated(definitions, FlagDefinition::validate)?;
        self.update(|catalog| {
            for definition in definitions {
                log::debug!(target: "featureflags", flag_key = definition.key.as_str(); "registered flag");
                catalog
                    .flags
                    .insert(definition.key.clone(), Arc::new(definition));
            }
        });
        Ok(())
    }

    pub fn register_experiment(
        &self,
        definition: ExperimentDefinition,
    ) -> Result<(), DefinitionError> {
        self.register_experiments([definition])
    }

    /// Register several experiments at once, all or nothing.
    pub fn register_experiments(
        &self,
        definitions: impl IntoIterator<Item = ExperimentDefinition>,
    ) -> Result<(), DefinitionError> {
        let definitions = validated(definitions, ExperimentDefinition::validate)?;
        self.update(|catalog| {
            for definition in definitions {
                log::debug!(target: "featureflags", experiment_key = definition.key.as_str(); "registered experiment");
                catalog
                    .experiments
                    .insert(definition.key.clone(), Arc::new(definition));
            }
        });
        Ok(())
    }

    /// Validate and register flags and experiments in one swap.
    pub(crate) fn register_all(
        &self,
        flags: Vec<FlagDefinition>,
        experiments: Vec<ExperimentDefinition>,
    ) -> Result<(), DefinitionError> {
        let flags = validated(flags, FlagDefinition::validate)?;
        let experiments = validated(experiments, ExperimentDefinition::validate)?;
        self.update(|catalog| {
            catalog.flags.extend(
                flags
                    .into_iter()
                    .map(|flag| (flag.key.clone(), Arc::new(flag))),
            );
            catalog.experiments.extend(
                experiments
                    .into_iter()
                    .map(|experiment| (experiment.key.clone(), Arc::new(experiment))),
            );
        });
        Ok(())
    }

    pub fn get_flag(&self, key: &str) -> Option<Arc<FlagDefinition>> {
        self.snapshot().flag(key).cloned()
    }

    pub fn get_experiment(&self, key: &str) -> Option<Arc<ExperimentDefinition>> {
        self.snapshot().experiment(key).cloned()
    }

    /// All registered flags, sorted by key.
    pub fn list_flags(&self) -> Vec<Arc<FlagDefinition>> {
        let mut flags: Vec<_> = self.snapshot().flags.values().cloned().collect();
        flags.sort_by(|a, b| a.key.cmp(&b.key));
        flags
    }

    /// All registered experiments, sorted by key.
    pub fn list_experiments(&self) -> Vec<Arc<ExperimentDefinition>> {
        let mut experiments: Vec<_> = self.snapshot().experiments.values().cloned().collect();
        experiments.sort_by(|a, b| a.key.cmp(&b.key));
        experiments
    }

    /// Drop every definition.
    pub fn reset(&self) {
        self.swap(Arc::new(Catalog::default()));
    }

    fn update(&self, f: impl FnOnce(&mut Catalog)) {
        let mut slot = self
            .catalog
            .write()
            .expect("thread holding catalog lock should not panic");
        let mut catalog = Catalog::clone(&slot);
        f(&mut catalog);
        *slot = Arc::new(catalog);
    }

    fn swap(&self, catalog: Arc<Catalog>) {
        let mut slot = self
            .catalog
            .write()
            .expect("thread holding catalog lock should not panic");
        *slot = catalog;
    }
}

fn validated<T>(
    definitions: impl IntoIterator<Item = T>,
    validate: impl Fn(&T) -> Result<(), DefinitionError>,
) -> Result<Vec<T>, DefinitionError> {
    let definitions: Vec<T> = definitions.into_iter().collect();
    for definition in &definitions {
        validate(definition).inspect_err(|err| {
            log::warn!(target: "featureflags", "rejected definition: {}", err);
        })?;
    }
    Ok(definitions)
}
