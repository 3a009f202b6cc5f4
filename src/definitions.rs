//! Flag and experiment definitions as registered by application start-up code.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{DefinitionError, FlagValue};

/// Deployment environment a flag is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// A static feature flag.
///
/// ```
/// # use featureflags::FlagDefinition;
/// let flag = FlagDefinition::new("new_dashboard", false)
///     .with_rollout_percentage(25)
///     .with_target_roles(["veterinarian"]);
/// assert!(flag.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagDefinition {
    /// Unique identifier, stable across app versions.
    pub key: String,
    pub default_value: FlagValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Share of users, by bucket, who get `true` instead of `default_value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_percentage: Option<u32>,
    #[serde(
        default,
        rename = "targetUsers",
        alias = "targetUserIds",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_user_ids: Option<HashSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_roles: Option<HashSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl FlagDefinition {
    pub fn new(key: impl Into<String>, default_value: impl Into<FlagValue>) -> FlagDefinition {
        FlagDefinition {
            key: key.into(),
            default_value: default_value.into(),
            description: None,
            rollout_percentage: None,
            target_user_ids: None,
            target_roles: None,
            environment: None,
            metadata: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> FlagDefinition {
        self.description = Some(description.into());
        self
    }

    pub fn with_rollout_percentage(mut self, percentage: u32) -> FlagDefinition {
        self.rollout_percentage = Some(percentage);
        self
    }

    pub fn with_target_users<S: Into<String>>(
        mut self,
        users: impl IntoIterator<Item = S>,
    ) -> FlagDefinition {
        self.target_user_ids = Some(users.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_target_roles<S: Into<String>>(
        mut self,
        roles: impl IntoIterator<Item = S>,
    ) -> FlagDefinition {
        self.target_roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> FlagDefinition {
        self.environment = Some(environment);
        self
    }

    /// Check the definition for shape errors.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.key.is_empty() {
            return Err(DefinitionError::EmptyKey);
        }
        match self.rollout_percentage {
            Some(percentage) if percentage > 100 => Err(DefinitionError::RolloutOutOfRange {
                key: self.key.clone(),
                percentage,
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn target_user_ids(&self) -> Option<&HashSet<String>> {
        non_empty(&self.target_user_ids)
    }

    pub(crate) fn target_roles(&self) -> Option<&HashSet<String>> {
        non_empty(&self.target_roles)
    }
}

/// One arm of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub name: String,
    /// Share of traffic, in percent.
    pub percentage: u32,
    pub value: FlagValue,
}

impl Variant {
    pub fn new(name: impl Into<String>, percentage: u32, value: impl Into<FlagValue>) -> Variant {
        Variant {
            name: name.into(),
            percentage,
            value: value.into(),
        }
    }
}

/// An A/B test: mutually exclusive variants with traffic percentages.
///
/// Percentages need not sum to 100. Users whose bucket falls past the last cumulative threshold
/// are assigned the first variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentDefinition {
    pub key: String,
    pub variants: Vec<Variant>,
    /// Variant served when the user cannot be bucketed or is not targeted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        rename = "targetUsers",
        alias = "targetUserIds",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_user_ids: Option<HashSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_roles: Option<HashSet<String>>,
}

impl ExperimentDefinition {
    pub fn new(key: impl Into<String>, variants: Vec<Variant>) -> ExperimentDefinition {
        ExperimentDefinition {
            key: key.into(),
            variants,
            default_variant: None,
            description: None,
            target_user_ids: None,
            target_roles: None,
        }
    }

    pub fn with_default_variant(mut self, variant: impl Into<String>) -> ExperimentDefinition {
        self.default_variant = Some(variant.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> ExperimentDefinition {
        self.description = Some(description.into());
        self
    }

    pub fn with_target_users<S: Into<String>>(
        mut self,
        users: impl IntoIterator<Item = S>,
    ) -> ExperimentDefinition {
        self.target_user_ids = Some(users.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_target_roles<S: Into<String>>(
        mut self,
        roles: impl IntoIterator<Item = S>,
    ) -> ExperimentDefinition {
        self.target_roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    /// Check the definition for shape errors.
    ///
    /// Percentages summing to more than 100 are accepted (trailing variants become partially
    /// unreachable) and only logged.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.key.is_empty() {
            return Err(DefinitionError::EmptyKey);
        }
        if self.variants.is_empty() {
            return Err(DefinitionError::NoVariants {
                key: self.key.clone(),
            });
        }

        let mut names = HashSet::with_capacity(self.variants.len());
        for variant in &self.variants {
            if variant.percentage > 100 {
                return Err(DefinitionError::VariantPercentageOutOfRange {
                    key: self.key.clone(),
                    variant: variant.name.clone(),
                    percentage: variant.percentage,
                });
            }
            if !names.insert(variant.name.as_str()) {
                return Err(DefinitionError::DuplicateVariant {
                    key: self.key.clone(),
                    variant: variant.name.clone(),
                });
            }
        }
        for (i, variant) in self.variants.iter().enumerate() {
            if self.variants[..i].iter().any(|other| other.value == variant.value) {
                return Err(DefinitionError::DuplicateVariantValue {
                    key: self.key.clone(),
                    variant: variant.name.clone(),
                });
            }
        }

        if let Some(default_variant) = &self.default_variant {
            if !names.contains(default_variant.as_str()) {
                return Err(DefinitionError::UnknownDefaultVariant {
                    key: self.key.clone(),
                    variant: default_variant.clone(),
                });
            }
        }

        let total: u32 = self.variants.iter().map(|v| v.percentage).sum();
        if total > 100 {
            log::warn!(target: "featureflags",
                       experiment_key = self.key.as_str(),
                       total;
                       "variant percentages sum to more than 100");
        }

        Ok(())
    }

    pub(crate) fn target_user_ids(&self) -> Option<&HashSet<String>> {
        non_empty(&self.target_user_ids)
    }

    pub(crate) fn target_roles(&self) -> Option<&HashSet<String>> {
        non_empty(&self.target_roles)
    }
}

/// A batch of definitions, as loaded from a JSON document.
///
/// ```json
/// {
///   "flags": [{"key": "beta", "defaultValue": false, "targetUsers": ["u1"]}],
///   "experiments": [{"key": "layout", "variants": [
///     {"name": "A", "percentage": 50, "value": "grid"},
///     {"name": "B", "percentage": 50, "value": "list"}
///   ]}]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionSet {
    #[serde(default)]
    pub flags: Vec<FlagDefinition>,
    #[serde(default)]
    pub experiments: Vec<ExperimentDefinition>,
}

impl DefinitionSet {
    pub fn from_json(json: &str) -> Result<DefinitionSet, DefinitionError> {
        serde_json::from_str(json).map_err(|err| DefinitionError::Parse(err.to_string()))
    }
}

fn non_empty(set: &Option<HashSet<String>>) -> Option<&HashSet<String>> {
    set.as_ref().filter(|set| !set.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{DefinitionSet, Environment, ExperimentDefinition, FlagDefinition, Variant};
    use crate::{DefinitionError, FlagValue};

    fn two_way(key: &str) -> ExperimentDefinition {
        ExperimentDefinition::new(
            key,
            vec![Variant::new("A", 50, "grid"), Variant::new("B", 50, "list")],
        )
    }

    #[test]
    fn rejects_rollout_above_100() {
        let err = FlagDefinition::new("f", false)
            .with_rollout_percentage(101)
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            DefinitionError::RolloutOutOfRange {
                key: "f".to_owned(),
                percentage: 101
            }
        );
        assert!(FlagDefinition::new("f", false)
            .with_rollout_percentage(100)
            .validate()
            .is_ok());
    }

    #[test]
    fn rejects_empty_keys() {
        assert_eq!(
            FlagDefinition::new("", true).validate(),
            Err(DefinitionError::EmptyKey)
        );
        assert_eq!(two_way("").validate(), Err(DefinitionError::EmptyKey));
    }

    #[test]
    fn rejects_experiment_without_variants() {
        assert!(matches!(
            ExperimentDefinition::new("e", vec![]).validate(),
            Err(DefinitionError::NoVariants { .. })
        ));
    }

    #[test]
    fn rejects_bad_variants() {
        let experiment = ExperimentDefinition::new(
            "e",
            vec![Variant::new("A", 50, 1), Variant::new("A", 50, 2)],
        );
        assert!(matches!(
            experiment.validate(),
            Err(DefinitionError::DuplicateVariant { .. })
        ));

        let experiment = ExperimentDefinition::new(
            "e",
            vec![Variant::new("A", 50, "grid"), Variant::new("B", 50, "grid")],
        );
        assert_eq!(
            experiment.validate(),
            Err(DefinitionError::DuplicateVariantValue {
                key: "e".to_owned(),
                variant: "B".to_owned(),
            })
        );

        let experiment = ExperimentDefinition::new("e", vec![Variant::new("A", 150, 1)]);
        assert!(matches!(
            experiment.validate(),
            Err(DefinitionError::VariantPercentageOutOfRange { percentage: 150, .. })
        ));

        assert!(matches!(
            two_way("e").with_default_variant("C").validate(),
            Err(DefinitionError::UnknownDefaultVariant { .. })
        ));
    }

    #[test]
    fn accepts_percentages_not_summing_to_100() {
        let under = ExperimentDefinition::new(
            "e",
            vec![Variant::new("A", 10, 1), Variant::new("B", 10, 2)],
        );
        assert!(under.validate().is_ok());
        let over = ExperimentDefinition::new(
            "e",
            vec![Variant::new("A", 80, 1), Variant::new("B", 80, 2)],
        );
        assert!(over.validate().is_ok());
    }

    #[test]
    fn empty_targeting_sets_count_as_unset() {
        let flag = FlagDefinition::new("f", false).with_target_roles(Vec::<String>::new());
        assert!(flag.target_roles().is_none());
        let flag = flag.with_target_users(["u1"]);
        assert!(flag.target_user_ids().is_some());
    }

    #[test]
    fn parses_definition_set() {
        let set = DefinitionSet::from_json(
            r#"{
              "flags": [
                {"key": "beta", "defaultValue": false, "targetUsers": ["u1"]},
                {"key": "limit", "defaultValue": 10, "environment": "staging"}
              ],
              "experiments": [
                {"key": "layout", "defaultVariant": "A", "variants": [
                  {"name": "A", "percentage": 50, "value": "grid"},
                  {"name": "B", "percentage": 50, "value": {"columns": 1}}
                ]}
              ]
            }"#,
        )
        .unwrap();

        assert_eq!(set.flags.len(), 2);
        assert_eq!(
            set.flags[0],
            FlagDefinition::new("beta", false).with_target_users(["u1"])
        );
        assert_eq!(set.flags[1].default_value, FlagValue::Numeric(10.0));
        assert_eq!(set.flags[1].environment, Some(Environment::Staging));
        assert_eq!(set.experiments[0].default_variant.as_deref(), Some("A"));
        assert!(set.experiments[0].variants[1].value.is_json());
    }

    #[test]
    fn reports_parse_errors() {
        assert!(matches!(
            DefinitionSet::from_json("{\"flags\": 3}"),
            Err(DefinitionError::Parse(_))
        ));
    }
}
