//! Task model definitions

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime, SubsecRound, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Pattern used for `CreatedAt` / `UpdatedAt` in the task file
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Current local time at the resolution the task file stores
pub fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(3)
}

/// Task status, persisted as its integer code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [Self::Todo, Self::InProgress, Self::Done];

    pub fn code(self) -> u8 {
        match self {
            Self::Todo => 0,
            Self::InProgress => 1,
            Self::Done => 2,
        }
    }
}

impl TryFrom<u8> for TaskStatus {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Todo),
            1 => Ok(Self::InProgress),
            2 => Ok(Self::Done),
            other => Err(Error::InvalidInput(format!("Unknown task status {}", other))),
        }
    }
}

impl From<TaskStatus> for u8 {
    fn from(status: TaskStatus) -> Self {
        status.code()
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code: u8 = s
            .trim()
            .parse()
            .map_err(|_| Error::InvalidInput(format!("Invalid task status '{}'", s)))?;
        Self::try_from(code)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Todo => "To do",
            Self::InProgress => "In progress",
            Self::Done => "Done",
        };
        f.write_str(label)
    }
}

/// A persisted task record
///
/// Field order is part of the file format: `Id` always comes first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Task {
    pub id: u64,
    pub description: String,
    pub status: TaskStatus,
    #[serde(with = "timestamp")]
    pub created_at: NaiveDateTime,
    #[serde(with = "timestamp")]
    pub updated_at: NaiveDateTime,
}

/// A task as submitted by a caller, before the store assigns an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub description: String,
    pub status: TaskStatus,
}

impl NewTask {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: TaskStatus::default(),
        }
    }

    /// Set the initial status
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub(crate) fn into_task(self, id: u64, now: NaiveDateTime) -> Task {
        Task {
            id,
            description: self.description,
            status: self.status,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a task's mutable fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
}

impl TaskUpdate {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Apply the present fields and refresh `updated_at`
    ///
    /// The new stamp is always later than the previous one, even when both
    /// fall in the same millisecond.
    pub fn apply_to(self, task: &mut Task, now: NaiveDateTime) {
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        task.updated_at = now.max(task.updated_at + TimeDelta::milliseconds(1));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMatch {
    Is(TaskStatus),
    IsNot(TaskStatus),
}

/// Listing filter applied on top of a full read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<StatusMatch>,
    /// Exact description match
    pub description: Option<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        let status_ok = match self.status {
            Some(StatusMatch::Is(status)) => task.status == status,
            Some(StatusMatch::IsNot(status)) => task.status != status,
            None => true,
        };
        let description_ok = self
            .description
            .as_deref()
            .map_or(true, |d| task.description == d);
        status_ok && description_ok
    }
}

mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    // Accepts any number of fractional digits, including none.
    const PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, PARSE_FORMAT).map_err(serde::de::Error::custom)
    }
}
