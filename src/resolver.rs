use std::sync::Arc;

use chrono::Utc;

use crate::{
    assignment_store::AssignmentStore, persistence::PersistenceThread, AssignmentEvent,
    AssignmentLogger, DefinitionSet, Environment, Evaluation, EvaluationReason,
    ExperimentDefinition, FlagDefinition, FlagRegistry, FlagValue, Overrides,
    RemoteOverrideCache, ResolverConfig, Result, StringHasher, UserContext, Variant,
};

/// Evaluates flags and experiments for users.
///
/// For a key and a user context, the first applicable rule wins:
/// 1. an active remote override,
/// 2. the user's stored assignment,
/// 3. experiment bucketing, stored so the user keeps the variant,
/// 4. static flag rules (environment, roles, users, rollout, default value),
/// 5. `false` for unknown keys.
///
/// Evaluation never fails: storage errors are logged and evaluation carries on with what is in
/// memory. A `Resolver` is `Send + Sync` and is meant to be shared, e.g. in an `Arc`.
///
/// # Examples
/// ```
/// # use featureflags::{FlagDefinition, ResolverConfig, UserContext};
/// let resolver = ResolverConfig::in_memory().to_resolver()?;
/// resolver.register_flag(FlagDefinition::new("new_checkout", false).with_rollout_percentage(100))?;
///
/// assert!(resolver.is_enabled("new_checkout", &UserContext::for_user("user-1")));
/// assert!(!resolver.is_enabled("unknown", &UserContext::for_user("user-1")));
/// # Ok::<(), featureflags::Error>(())
/// ```
pub struct Resolver {
    registry: FlagRegistry,
    overrides: RemoteOverrideCache,
    assignments: AssignmentStore,
    hasher: Arc<dyn StringHasher>,
    environment: Option<Environment>,
    assignment_logger: Box<dyn AssignmentLogger + Send + Sync>,
    persistence: PersistenceThread,
}

impl Resolver {
    /// Create a new `Resolver` using the specified configuration.
    pub fn new(config: ResolverConfig) -> Result<Resolver> {
        let ResolverConfig {
            store,
            assignments_namespace,
            overrides_key,
            environment,
            hasher,
            assignment_logger,
        } = config;

        let persistence = PersistenceThread::start(store.clone())?;
        let assignments =
            AssignmentStore::new(store.clone(), persistence.persister(), assignments_namespace);
        let overrides = RemoteOverrideCache::new(store, overrides_key);

        log::debug!(target: "featureflags",
                    environment:serde = &environment,
                    overrides = overrides.snapshot().len();
                    "resolver started");

        Ok(Resolver {
            registry: FlagRegistry::new(),
            overrides,
            assignments,
            hasher,
            environment,
            assignment_logger,
            persistence,
        })
    }

    pub fn register_flag(&self, definition: FlagDefinition) -> Result<()> {
        Ok(self.registry.register_flag(definition)?)
    }

    /// Register several flags at once, all or nothing.
    pub fn register_flags(
        &self,
        definitions: impl IntoIterator<Item = FlagDefinition>,
    ) -> Result<()> {
        Ok(self.registry.register_flags(definitions)?)
    }

    pub fn register_experiment(&self, definition: ExperimentDefinition) -> Result<()> {
        Ok(self.registry.register_experiment(definition)?)
    }

    pub fn register_experiments(
        &self,
        definitions: impl IntoIterator<Item = ExperimentDefinition>,
    ) -> Result<()> {
        Ok(self.registry.register_experiments(definitions)?)
    }

    /// Register every flag and experiment of a JSON [`DefinitionSet`]. Nothing is registered if
    /// the document is malformed or any definition is invalid.
    pub fn register_json(&self, json: &str) -> Result<()> {
        let DefinitionSet { flags, experiments } = DefinitionSet::from_json(json)?;
        Ok(self.registry.register_all(flags, experiments)?)
    }

    /// Value of `key` for the user.
    pub fn evaluate(&self, key: &str, context: &UserContext) -> FlagValue {
        self.evaluate_details(key, context).value
    }

    /// Whether `key` is on for the user, i.e. its value is truthy.
    pub fn is_enabled(&self, key: &str, context: &UserContext) -> bool {
        self.evaluate(key, context).is_truthy()
    }

    /// Value of `key` for the user together with the rule that produced it.
    pub fn evaluate_details(&self, key: &str, context: &UserContext) -> Evaluation {
        let evaluation = self.resolve(key, context);

        log::trace!(target: "featureflags",
                    flag_key = key,
                    user_id:serde = &context.user_id,
                    role:serde = &context.role,
                    value:serde = &evaluation.value,
                    reason:serde = &evaluation.reason;
                    "evaluated a flag");

        evaluation
    }

    fn resolve(&self, key: &str, context: &UserContext) -> Evaluation {
        if let Some(value) = self.overrides.get(key) {
            return Evaluation::new(key, value, EvaluationReason::RemoteOverride);
        }

        let catalog = self.registry.snapshot();
        let experiment = catalog.experiment(key);

        let user_id = context.bucketing_id();
        if let Some(value) = user_id.and_then(|user_id| self.assignments.get(user_id, key)) {
            let variant = experiment.and_then(|experiment| experiment.variant_for_value(&value));
            return Evaluation::new(key, value, EvaluationReason::CachedAssignment)
                .with_variant(variant.map(|variant| variant.name.as_str()));
        }

        if let Some(experiment) = experiment {
            return self.assign(experiment, context);
        }

        if let Some(flag) = catalog.flag(key) {
            let (value, reason) = flag.eval(context, self.environment, self.hasher.as_ref());
            return Evaluation::new(key, value, reason);
        }

        Evaluation::new(key, FlagValue::Boolean(false), EvaluationReason::UnknownKey)
    }

    /// Bucket the user into an experiment variant and store the assignment.
    fn assign(&self, experiment: &ExperimentDefinition, context: &UserContext) -> Evaluation {
        let fallback = |reason| {
            let variant = experiment.fallback_variant();
            let value = variant.map_or(FlagValue::Boolean(false), |variant| variant.value.clone());
            Evaluation::new(&experiment.key, value, reason)
                .with_variant(variant.map(|variant| variant.name.as_str()))
        };

        if !experiment.is_targeted(context) {
            return fallback(EvaluationReason::ExperimentTargetingMiss);
        }
        let Some(user_id) = context.bucketing_id() else {
            return fallback(EvaluationReason::ExperimentNoUser);
        };
        // Registered experiments always have variants.
        let Some(variant) = experiment.bucket_variant(user_id, self.hasher.as_ref()) else {
            return fallback(EvaluationReason::FlagDefault);
        };

        match self
            .assignments
            .set(user_id, &experiment.key, variant.value.clone())
        {
            Ok(None) => {}
            Ok(Some(existing)) => {
                // Another evaluation assigned the user first.
                let variant = experiment.variant_for_value(&existing);
                return Evaluation::new(&experiment.key, existing, EvaluationReason::CachedAssignment)
                    .with_variant(variant.map(|variant| variant.name.as_str()));
            }
            Err(err) => {
                log::warn!(target: "featureflags",
                           experiment_key = experiment.key.as_str(),
                           user_id;
                           "failed to persist experiment assignment: {:?}", err);
            }
        }

        self.log_assignment(experiment, variant, context, user_id);

        Evaluation::new(
            &experiment.key,
            variant.value.clone(),
            EvaluationReason::ExperimentAssigned,
        )
        .with_variant(Some(variant.name.as_str()))
    }

    fn log_assignment(
        &self,
        experiment: &ExperimentDefinition,
        variant: &Variant,
        context: &UserContext,
        user_id: &str,
    ) {
        let event = AssignmentEvent {
            experiment: experiment.key.clone(),
            variant: variant.name.clone(),
            value: variant.value.clone(),
            user_id: user_id.to_owned(),
            role: context.role.clone(),
            custom_attributes: context.custom_attributes.clone(),
            timestamp: Utc::now(),
        };
        log::trace!(target: "featureflags",
                    event:serde = &event;
                    "logging assignment");
        self.assignment_logger.log_assignment(event);
    }

    /// Replace the remote overrides with `overrides` and persist them.
    ///
    /// The new overrides apply to evaluations immediately, even when persisting fails.
    pub fn sync_overrides(&self, overrides: Overrides) -> Result<()> {
        self.overrides.sync(overrides)
    }

    /// Currently active remote overrides.
    pub fn overrides(&self) -> Arc<Overrides> {
        self.overrides.snapshot()
    }

    pub fn get_flag(&self, key: &str) -> Option<Arc<FlagDefinition>> {
        self.registry.get_flag(key)
    }

    pub fn get_experiment(&self, key: &str) -> Option<Arc<ExperimentDefinition>> {
        self.registry.get_experiment(key)
    }

    /// Registered flags, sorted by key.
    pub fn list_flags(&self) -> Vec<Arc<FlagDefinition>> {
        self.registry.list_flags()
    }

    /// Registered experiments, sorted by key.
    pub fn list_experiments(&self) -> Vec<Arc<ExperimentDefinition>> {
        self.registry.list_experiments()
    }

    pub fn registry(&self) -> &FlagRegistry {
        &self.registry
    }

    pub fn assignments(&self) -> &AssignmentStore {
        &self.assignments
    }

    /// Clear registered definitions, overrides and assignments from memory.
    ///
    /// Persisted overrides and assignments are kept. Stored assignments come back on the next
    /// lookup; persisted overrides on the next restart.
    pub fn reset(&self) {
        self.registry.reset();
        self.overrides.clear();
        self.assignments.reset();
        log::debug!(target: "featureflags", "resolver reset");
    }

    /// Block until all assignments made so far have been written to the store.
    pub fn flush(&self) -> Result<()> {
        self.persistence.persister().flush()
    }

    /// Stop the resolver, waiting for pending assignment writes to finish.
    pub fn shutdown(self) -> Result<()> {
        let Resolver {
            assignments,
            persistence,
            ..
        } = self;
        // Releases the last outstanding persister so the thread can exit.
        drop(assignments);
        persistence.shutdown()
    }
}
