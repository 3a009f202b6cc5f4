//! Deterministic feature flag and A/B experiment evaluation for a single application process.
//!
//! # Overview
//!
//! The crate revolves around a [`Resolver`] that answers "what value should this user get for this
//! key?". Keys name either a static [`FlagDefinition`] (default value, role and user targeting,
//! percentage rollout) or an [`ExperimentDefinition`] (weighted variants). The answer is a
//! [`FlagValue`].
//!
//! For every key and [`UserContext`], the first applicable rule wins:
//! 1. an active remote override (see [`Resolver::sync_overrides`]),
//! 2. a previously stored assignment of the user,
//! 3. experiment bucketing, after which the assignment is stored,
//! 4. static flag rules,
//! 5. `false` for unregistered keys.
//!
//! Bucketing is a pure function of `"<user_id>:<key>"` (see [`StringHasher`]), so a user gets the
//! same result on every evaluation and on every device. Experiment assignments are persisted
//! through a [`KeyValueStore`] so users keep their variant even if the experiment's split
//! changes later.
//!
//! An [`AssignmentLogger`] can be provided to forward new experiment assignments to your
//! analytics pipeline.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. Only registration, override sync and
//! persistence management return errors: evaluation itself always produces a value, falling back
//! to in-memory data and defaults when the store misbehaves.
//!
//! # Logging
//!
//! The crate uses the [`log`](https://docs.rs/log/latest/log/) crate with the `featureflags`
//! target and structured key-values. Consider integrating a `log`-compatible logger
//! implementation for better visibility into evaluation and storage faults.
//!
//! # Examples
//!
//! ```
//! use featureflags::{ExperimentDefinition, ResolverConfig, UserContext, Variant};
//!
//! let resolver = ResolverConfig::in_memory().to_resolver()?;
//! resolver.register_experiment(ExperimentDefinition::new(
//!     "layout",
//!     vec![Variant::new("A", 50, "grid"), Variant::new("B", 50, "list")],
//! ))?;
//!
//! let user = UserContext::for_user("user-1");
//! let layout = resolver.evaluate("layout", &user);
//! assert_eq!(resolver.evaluate("layout", &user), layout);
//! # Ok::<(), featureflags::Error>(())
//! ```
//!
//! A runnable example lives in `demos/simple`.

#![warn(rustdoc::missing_crate_level_docs)]

mod assignment_logger;
mod assignment_store;
mod config;
mod context;
mod definitions;
mod error;
mod eval;
mod eval_details;
mod hasher;
mod kv_store;
mod overrides;
mod persistence;
mod registry;
mod resolver;
mod value;

pub use assignment_logger::{AssignmentEvent, AssignmentLogger};
pub use assignment_store::{AssignmentStore, UserAssignments};
pub use config::ResolverConfig;
pub use context::{AttributeValue, Attributes, UserContext};
pub use definitions::{DefinitionSet, Environment, ExperimentDefinition, FlagDefinition, Variant};
pub use error::{DefinitionError, Error, Result};
pub use eval_details::{Evaluation, EvaluationReason};
pub use hasher::{Md5Hasher, PolynomialHasher, StringHasher, TOTAL_BUCKETS};
pub use kv_store::{InMemoryStore, JsonFileStore, KeyValueStore};
pub use overrides::{Overrides, RemoteOverrideCache};
pub use registry::{Catalog, FlagRegistry};
pub use resolver::Resolver;
pub use value::FlagValue;
