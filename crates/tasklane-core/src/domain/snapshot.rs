//! Point-in-time description of a queue's named tasks.
//!
//! The serialized shape is a compatibility surface: an ordered array of
//! `{ "name", "progress", "dependencies" }` records, progress in `0..=100`.

use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::QueueError;

/// Progress and dependency names of one named task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub name: String,
    #[serde(deserialize_with = "progress_in_range")]
    pub progress: u8,
    pub dependencies: Vec<String>,
}

/// Decoded progress must stay in `0..=100`, like the values `new` produces.
fn progress_in_range<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = u8::deserialize(deserializer)?;
    if value > 100 {
        return Err(de::Error::invalid_value(
            Unexpected::Unsigned(value.into()),
            &"a progress between 0 and 100",
        ));
    }
    Ok(value)
}

impl TaskSnapshot {
    pub fn new(name: impl Into<String>, progress: u8, dependencies: Vec<String>) -> Self {
        Self {
            name: name.into(),
            progress: progress.min(100),
            dependencies,
        }
    }
}

impl fmt::Display for TaskSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Task Name: {}", self.name)?;
        writeln!(f, "Task Progress: {}", self.progress)?;
        write!(f, "Task Dependencies: {:?}", self.dependencies)
    }
}

/// Snapshot of a whole queue, in queue insertion order.
///
/// Unnamed tasks are never part of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueSnapshot {
    entries: Vec<TaskSnapshot>,
}

impl QueueSnapshot {
    pub fn new(entries: Vec<TaskSnapshot>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[TaskSnapshot] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&TaskSnapshot> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TaskSnapshot> {
        self.entries.iter()
    }

    pub fn to_json(&self) -> Result<String, QueueError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, QueueError> {
        Ok(serde_json::from_str(s)?)
    }
}

impl IntoIterator for QueueSnapshot {
    type Item = TaskSnapshot;
    type IntoIter = std::vec::IntoIter<TaskSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueueSnapshot {
    type Item = &'a TaskSnapshot;
    type IntoIter = std::slice::Iter<'a, TaskSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
