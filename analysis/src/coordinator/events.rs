use serde::Serialize;

use super::snapshot::AnalysisSnapshot;

/// Events broadcast from the coordinator to all subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
#[allow(clippy::large_enum_variant)]
pub enum AnalysisEvent {
    /// Full state snapshot after any visible change.
    StateChanged(AnalysisSnapshot),
    /// UCI debug log entry.
    UciMessage(UciLogEntry),
    /// Error notification.
    Error(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct UciLogEntry {
    pub direction: UciDirection,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UciDirection {
    ToEngine,
    FromEngine,
}
