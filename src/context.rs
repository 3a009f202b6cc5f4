use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Custom attributes attached to a [`UserContext`].
pub type Attributes = HashMap<String, AttributeValue>;

/// Value of a custom user attribute.
///
/// ```
/// # use featureflags::AttributeValue;
/// let string_attr: AttributeValue = "farm-12".into();
/// let number_attr: AttributeValue = 42.0.into();
/// let bool_attr: AttributeValue = true.into();
/// ```
#[derive(Debug, Serialize, Deserialize, PartialEq, PartialOrd, From, Clone)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// Who a flag is being evaluated for. Never persisted.
///
/// Without a `user_id` no deterministic bucketing (and therefore no assignment caching) is
/// possible, and evaluation falls back to static rules and defaults.
///
/// ```
/// # use featureflags::UserContext;
/// let context = UserContext::for_user("user-1").with_role("producer");
/// assert_eq!(context.user_id.as_deref(), Some("user-1"));
/// ```
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub custom_attributes: Attributes,
}

impl UserContext {
    /// An anonymous context: no user id, no role.
    pub fn anonymous() -> UserContext {
        UserContext::default()
    }

    pub fn for_user(user_id: impl Into<String>) -> UserContext {
        UserContext {
            user_id: Some(user_id.into()),
            ..UserContext::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> UserContext {
        self.role = Some(role.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> UserContext {
        self.email = Some(email.into());
        self
    }

    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> UserContext {
        self.custom_attributes.insert(name.into(), value.into());
        self
    }

    /// User id usable for bucketing. Empty ids are treated as absent.
    pub(crate) fn bucketing_id(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|id| !id.is_empty())
    }
}
