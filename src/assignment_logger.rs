use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Attributes, FlagValue};

/// Emitted once when a user is first bucketed into an experiment variant.
///
/// Replays of a stored assignment do not produce events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentEvent {
    pub experiment: String,
    pub variant: String,
    pub value: FlagValue,
    pub user_id: String,
    pub role: Option<String>,
    pub custom_attributes: Attributes,
    pub timestamp: DateTime<Utc>,
}

/// Receives assignment events, typically to forward them to an analytics pipeline.
///
/// Called synchronously on the evaluating thread, so implementations should hand the event off
/// rather than do I/O inline.
pub trait AssignmentLogger {
    fn log_assignment(&self, event: AssignmentEvent);
}

pub(crate) struct NoopAssignmentLogger;
impl AssignmentLogger for NoopAssignmentLogger {
    fn log_assignment(&self, _event: AssignmentEvent) {}
}

impl<T: Fn(AssignmentEvent)> AssignmentLogger for T {
    fn log_assignment(&self, event: AssignmentEvent) {
        self(event);
    }
}
