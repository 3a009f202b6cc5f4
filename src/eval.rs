//! Pure evaluation of registered definitions.
//!
//! Nothing here touches storage: these functions compute what a user should get from a
//! definition, and the [`Resolver`](crate::Resolver) decides what to persist.
use crate::{
    hasher::StringHasher, Environment, EvaluationReason, ExperimentDefinition, FlagDefinition,
    FlagValue, UserContext, Variant,
};

impl FlagDefinition {
    /// Evaluate the static flag rules: environment, role targeting, user targeting, rollout.
    pub(crate) fn eval(
        &self,
        context: &UserContext,
        environment: Option<Environment>,
        hasher: &dyn StringHasher,
    ) -> (FlagValue, EvaluationReason) {
        if let (Some(active), Some(scoped)) = (environment, self.environment) {
            if active != scoped {
                return (self.default_value.clone(), EvaluationReason::EnvironmentMismatch);
            }
        }

        let target_roles = self.target_roles();
        if let Some(roles) = target_roles {
            if !context.role.as_ref().is_some_and(|role| roles.contains(role)) {
                return (self.default_value.clone(), EvaluationReason::RoleTargetingMiss);
            }
        }

        let user_id = context.bucketing_id();

        // Without a user id the user list cannot match; evaluation carries on with the
        // remaining rules.
        if let (Some(users), Some(user_id)) = (self.target_user_ids(), user_id) {
            return if users.contains(user_id) {
                (FlagValue::Boolean(true), EvaluationReason::UserTargeted)
            } else {
                (self.default_value.clone(), EvaluationReason::UserTargetingMiss)
            };
        }

        if let (Some(percentage), Some(user_id)) = (self.rollout_percentage, user_id) {
            return if hasher.bucket(user_id, &self.key) < percentage {
                (FlagValue::Boolean(true), EvaluationReason::RolloutEnabled)
            } else {
                (self.default_value.clone(), EvaluationReason::RolloutDisabled)
            };
        }

        // Role targeting passed above.
        if target_roles.is_some() {
            return (FlagValue::Boolean(true), EvaluationReason::RoleTargeted);
        }

        (self.default_value.clone(), EvaluationReason::FlagDefault)
    }
}

impl ExperimentDefinition {
    pub fn variant(&self, name: &str) -> Option<&Variant> {
        self.variants.iter().find(|variant| variant.name == name)
    }

    /// Variant served when the user is not bucketed: the default variant if set, the first one
    /// otherwise.
    pub fn fallback_variant(&self) -> Option<&Variant> {
        match &self.default_variant {
            Some(name) => self.variant(name),
            None => self.variants.first(),
        }
    }

    /// Variant serving `value`. Stored assignments only keep the value, which is unique per
    /// variant of a registered experiment.
    pub(crate) fn variant_for_value(&self, value: &FlagValue) -> Option<&Variant> {
        self.variants.iter().find(|variant| variant.value == *value)
    }

    /// Whether the context passes the experiment's role and user targeting.
    pub(crate) fn is_targeted(&self, context: &UserContext) -> bool {
        if let Some(roles) = self.target_roles() {
            if !context.role.as_ref().is_some_and(|role| roles.contains(role)) {
                return false;
            }
        }
        if let Some(users) = self.target_user_ids() {
            if !context.bucketing_id().is_some_and(|id| users.contains(id)) {
                return false;
            }
        }
        true
    }

    /// Variant for `user_id`: the first variant whose cumulative percentage exceeds the user's
    /// bucket.
    ///
    /// Buckets past the last cumulative threshold (percentages summing to less than 100) get the
    /// first variant.
    pub(crate) fn bucket_variant(
        &self,
        user_id: &str,
        hasher: &dyn StringHasher,
    ) -> Option<&Variant> {
        let bucket = hasher.bucket(user_id, &self.key);
        let mut cumulative = 0;
        self.variants
            .iter()
            .find(|variant| {
                cumulative += variant.percentage;
                bucket < cumulative
            })
            .or_else(|| self.variants.first())
    }
}
