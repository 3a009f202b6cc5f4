use serde::{Deserialize, Serialize};

use crate::FlagValue;

/// Result of an evaluation together with the rule that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub flag_key: String,
    pub value: FlagValue,
    pub reason: EvaluationReason,
    /// Name of the experiment variant served, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Evaluation {
    pub(crate) fn new(flag_key: &str, value: FlagValue, reason: EvaluationReason) -> Evaluation {
        Evaluation {
            flag_key: flag_key.to_owned(),
            value,
            reason,
            variant: None,
        }
    }

    pub(crate) fn with_variant(mut self, variant: Option<&str>) -> Evaluation {
        self.variant = variant.map(ToOwned::to_owned);
        self
    }

    /// Truthiness of the evaluated value.
    pub fn is_enabled(&self) -> bool {
        self.value.is_truthy()
    }
}

/// Which step of the decision chain produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationReason {
    /// A remote override is active for the key.
    RemoteOverride,
    /// The user has a stored assignment for the key.
    CachedAssignment,
    /// The user was just bucketed into an experiment variant.
    ExperimentAssigned,
    /// The user is not targeted by the experiment; default variant served.
    ExperimentTargetingMiss,
    /// No user id to bucket with; default variant served.
    ExperimentNoUser,
    /// The flag is scoped to another environment; default value served.
    EnvironmentMismatch,
    /// The flag targets roles and the user's role is not one of them.
    RoleTargetingMiss,
    /// The user is explicitly targeted by the flag.
    UserTargeted,
    /// The flag targets users and this user is not one of them.
    UserTargetingMiss,
    /// The user's bucket is inside the rollout.
    RolloutEnabled,
    /// The user's bucket is outside the rollout.
    RolloutDisabled,
    /// The user's role is targeted by the flag.
    RoleTargeted,
    /// No rule applied; the flag's default value served.
    FlagDefault,
    /// Nothing is registered under the key.
    UnknownKey,
}
