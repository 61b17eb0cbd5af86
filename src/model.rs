//! Core data model.
//!
//! A spawn request names a template and a position. Once validated it becomes
//! a [`SpawnCommand`] and travels through the dispatcher as a [`WorkItem`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// World-space position. No range constraints are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Spawn requests
// ---------------------------------------------------------------------------

/// A raw request to spawn a template. Transient; never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub resource_id: String,
    pub position: Position,
}

impl SpawnRequest {
    pub fn new(resource_id: impl Into<String>, position: Position) -> Self {
        Self {
            resource_id: resource_id.into(),
            position,
        }
    }

    /// Check the request and turn it into a queueable command.
    ///
    /// The identifier must be non-empty. Anything else is left to the
    /// template lookup on the main thread.
    pub fn validate(self) -> Result<SpawnCommand> {
        if self.resource_id.is_empty() {
            return Err(Error::InvalidRequest(
                "empty resource path provided".to_string(),
            ));
        }
        Ok(SpawnCommand {
            resource_id: self.resource_id,
            position: self.position,
        })
    }
}

/// Parses `<resource or name> <x> <y> <z>`. The identifier may contain spaces;
/// the last three whitespace-separated tokens are the coordinates.
impl FromStr for SpawnRequest {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 4 {
            return Err(Error::InvalidRequest(format!(
                "expected `<resource> <x> <y> <z>`, got {line:?}"
            )));
        }

        let (id, coords) = tokens.split_at(tokens.len() - 3);
        let mut parsed = [0.0f32; 3];
        for (slot, raw) in parsed.iter_mut().zip(coords) {
            *slot = raw
                .parse()
                .map_err(|e| Error::InvalidRequest(format!("bad coordinate {raw:?}: {e}")))?;
        }

        Ok(Self::new(
            id.join(" "),
            Position::new(parsed[0], parsed[1], parsed[2]),
        ))
    }
}

/// A validated spawn request, waiting in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnCommand {
    pub resource_id: String,
    pub position: Position,
}

// ---------------------------------------------------------------------------
// Work items
// ---------------------------------------------------------------------------

/// An opaque unit of main-thread work.
pub struct Task(Box<dyn FnOnce() -> Result<()> + Send + 'static>);

impl Task {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Self(Box::new(f))
    }

    pub(crate) fn run(self) -> Result<()> {
        (self.0)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Task(..)")
    }
}

/// Something queued for the main thread.
#[derive(Debug)]
pub enum WorkItem {
    Spawn(SpawnCommand),
    Task(Task),
}

impl WorkItem {
    pub fn task<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        WorkItem::Task(Task::new(f))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WorkItem::Spawn(_) => "spawn",
            WorkItem::Task(_) => "task",
        }
    }
}

impl From<SpawnCommand> for WorkItem {
    fn from(command: SpawnCommand) -> Self {
        WorkItem::Spawn(command)
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Identity of the live execution context the host created for the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextHandle(pub Uuid);

impl ContextHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Identity of a game object produced by the instantiation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Outcomes and reports
// ---------------------------------------------------------------------------

/// What happened to one work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Spawned {
        resource_id: String,
        instance: InstanceId,
        position: Position,
    },
    Completed,
    Failed {
        kind: String,
        message: String,
    },
}

impl ItemOutcome {
    pub fn from_result(result: Result<ItemOutcome>) -> Self {
        match result {
            Ok(outcome) => outcome,
            Err(e) => ItemOutcome::Failed {
                kind: e.kind().to_string(),
                message: e.to_string(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ItemOutcome::Failed { .. })
    }
}

/// How the dispatcher accepted a work item.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Appended to the queue; runs on the next drain.
    Queued,
    /// No execution context could be created, so the item already ran on
    /// the calling thread.
    Inline(ItemOutcome),
}

/// Summary of one drain pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainReport {
    pub started_at: DateTime<Utc>,
    pub executed: usize,
    pub failed: usize,
    /// Outcomes in execution order.
    pub outcomes: Vec<ItemOutcome>,
}

impl Default for DrainReport {
    fn default() -> Self {
        Self::new()
    }
}

impl DrainReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            executed: 0,
            failed: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: ItemOutcome) {
        self.executed += 1;
        if outcome.is_failure() {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    pub fn is_empty(&self) -> bool {
        self.executed == 0
    }
}

/// Structured result of dispatcher teardown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Pending items dropped without running.
    pub discarded: usize,
    /// Context handed back to the host, if one was live.
    pub released: Option<ContextHandle>,
    /// Why releasing the context failed.
    pub failure: Option<String>,
    /// Requested from inside a running work item; applied once that item
    /// returns.
    pub deferred: bool,
}

impl CleanupReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_with_spaces_in_name() {
        let req: SpawnRequest = "Large Chest 1 -2.5 3".parse().unwrap();
        assert_eq!(req.resource_id, "Large Chest");
        assert_eq!(req.position, Position::new(1.0, -2.5, 3.0));
    }

    #[test]
    fn rejects_short_or_non_numeric_lines() {
        assert!("iscChest1 1 2".parse::<SpawnRequest>().is_err());
        assert!("iscChest1 1 two 3".parse::<SpawnRequest>().is_err());
    }

    #[test]
    fn only_the_empty_identifier_fails_validation() {
        let err = SpawnRequest::new("", Position::default())
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_request");

        let cmd = SpawnRequest::new("   ", Position::default())
            .validate()
            .unwrap();
        assert_eq!(cmd.resource_id, "   ");
    }

    #[test]
    fn non_finite_positions_are_accepted() {
        let cmd = SpawnRequest::new("a", Position::new(f32::NAN, f32::INFINITY, -0.0))
            .validate()
            .unwrap();
        assert!(cmd.position.x.is_nan());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(ItemOutcome::Completed).unwrap();
        assert_eq!(json["status"], "completed");
    }
}
