use std::sync::Arc;

use crate::{
    assignment_logger::NoopAssignmentLogger, AssignmentLogger, Environment, InMemoryStore,
    KeyValueStore, PolynomialHasher, Resolver, Result, StringHasher,
};

/// Configuration for [`Resolver`].
pub struct ResolverConfig {
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) assignments_namespace: String,
    pub(crate) overrides_key: String,
    pub(crate) environment: Option<Environment>,
    pub(crate) hasher: Arc<dyn StringHasher>,
    pub(crate) assignment_logger: Box<dyn AssignmentLogger + Send + Sync>,
}

impl ResolverConfig {
    /// Default prefix of the per-user assignment keys.
    pub const DEFAULT_ASSIGNMENTS_NAMESPACE: &'static str = "@feature_flags_assignments";

    /// Default key of the persisted remote overrides.
    pub const DEFAULT_OVERRIDES_KEY: &'static str = "@feature_flags_cache";

    /// Create a default configuration persisting to `store`.
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use featureflags::{InMemoryStore, ResolverConfig};
    /// ResolverConfig::new(Arc::new(InMemoryStore::new()));
    /// ```
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        ResolverConfig {
            store,
            assignments_namespace: Self::DEFAULT_ASSIGNMENTS_NAMESPACE.to_owned(),
            overrides_key: Self::DEFAULT_OVERRIDES_KEY.to_owned(),
            environment: None,
            hasher: Arc::new(PolynomialHasher),
            assignment_logger: Box::new(NoopAssignmentLogger),
        }
    }

    /// Configuration backed by a fresh [`InMemoryStore`]. Nothing survives the process.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    pub fn with_assignments_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.assignments_namespace = namespace.into();
        self
    }

    pub fn with_overrides_key(mut self, key: impl Into<String>) -> Self {
        self.overrides_key = key.into();
        self
    }

    /// Serve flags scoped to another environment with their default value.
    ///
    /// Without an environment, flag scoping is ignored.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Replace the bucketing hash. Changing it reshuffles every rollout and every user who does
    /// not have a stored assignment yet.
    pub fn with_hasher(mut self, hasher: impl StringHasher + 'static) -> Self {
        self.hasher = Arc::new(hasher);
        self
    }

    /// Set assignment logger to pass experiment assignments to your analytics pipeline.
    ///
    /// ```
    /// # use featureflags::{AssignmentEvent, ResolverConfig};
    /// let config = ResolverConfig::in_memory().with_assignment_logger(|event: AssignmentEvent| {
    ///     println!("{:?}", event);
    /// });
    /// ```
    pub fn with_assignment_logger(
        mut self,
        assignment_logger: impl AssignmentLogger + Send + Sync + 'static,
    ) -> Self {
        self.assignment_logger = Box::new(assignment_logger);
        self
    }

    /// Create a new [`Resolver`] using this configuration.
    ///
    /// Loads persisted overrides and starts the persistence thread.
    pub fn to_resolver(self) -> Result<Resolver> {
        Resolver::new(self)
    }
}
