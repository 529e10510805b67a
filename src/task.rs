//! Task records.
//!
//! Tasks are kept as one JSON array under the `tasks` key, next to a
//! `tasks_next_id` counter. Dates serialize as RFC 3339 strings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{has_text, seed_date, Entity, EntityId};
use crate::error::{Error, Result};
use crate::store::EntityStore;

pub const TASKS_KEY: &str = "tasks";
pub const TASKS_NEXT_ID_KEY: &str = "tasks_next_id";

/// Store of tasks
pub type TaskStore = EntityStore<Task>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum TaskState {
    #[default]
    #[serde(rename = "in queue")]
    InQueue,
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "done")]
    Done,
}

impl TaskState {
    pub const ALL: [TaskState; 3] = [TaskState::InQueue, TaskState::InProgress, TaskState::Done];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::InQueue => "in queue",
            TaskState::InProgress => "in progress",
            TaskState::Done => "done",
        }
    }

    /// State after a user is assigned: queued work starts, everything else stays.
    pub fn on_assign(self) -> TaskState {
        match self {
            TaskState::InQueue => TaskState::InProgress,
            other => other,
        }
    }

    /// State after the user is released: in-progress work goes back to the queue.
    pub fn on_unassign(self) -> TaskState {
        match self {
            TaskState::InProgress => TaskState::InQueue,
            other => other,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "in queue" | "queue" | "queued" => Ok(TaskState::InQueue),
            "in progress" | "progress" => Ok(TaskState::InProgress),
            "done" => Ok(TaskState::Done),
            _ => Err(Error::InvalidArgument(format!(
                "unknown task state '{}' (expected in-queue, in-progress or done)",
                s.trim()
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    pub created_date: DateTime<Utc>,
    pub modified_date: DateTime<Utc>,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_user_id: Option<EntityId>,
}

impl Task {
    pub fn is_assigned(&self) -> bool {
        self.assigned_user_id.is_some()
    }

    fn matches_text(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle) || self.description.to_lowercase().contains(needle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTaskRequest {
    pub name: String,
    pub description: String,
    pub state: TaskState,
}

/// Manual edit of a task. Assignment pointers are not part of an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTaskRequest {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    pub state: TaskState,
}

impl UpdateTaskRequest {
    /// Edit that keeps every field of `task`
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: task.id,
            name: task.name.clone(),
            description: task.description.clone(),
            state: task.state,
        }
    }
}

/// Name and description must both be non-empty after trimming.
pub fn validate_task(name: &str, description: &str) -> bool {
    has_text(name) && has_text(description)
}

fn task_validation_message(name: &str, description: &str) -> Option<String> {
    match (has_text(name), has_text(description)) {
        (true, true) => None,
        (false, true) => Some("task name cannot be empty".to_string()),
        (true, false) => Some("task description cannot be empty".to_string()),
        (false, false) => Some("task name and description cannot be empty".to_string()),
    }
}

impl Entity for Task {
    type Create = CreateTaskRequest;
    type Update = UpdateTaskRequest;

    const KIND: &'static str = "task";
    const COLLECTION_KEY: &'static str = TASKS_KEY;
    const NEXT_ID_KEY: &'static str = TASKS_NEXT_ID_KEY;

    fn id(&self) -> EntityId {
        self.id
    }

    fn from_create(id: EntityId, request: &CreateTaskRequest, now: DateTime<Utc>) -> Self {
        Task {
            id,
            name: request.name.trim().to_string(),
            description: request.description.trim().to_string(),
            created_date: now,
            modified_date: now,
            state: request.state,
            assigned_user_id: None,
        }
    }

    fn update_id(request: &UpdateTaskRequest) -> EntityId {
        request.id
    }

    fn apply_update(&mut self, request: &UpdateTaskRequest, now: DateTime<Utc>) {
        self.name = request.name.trim().to_string();
        self.description = request.description.trim().to_string();
        self.state = request.state;
        self.modified_date = now;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.modified_date = now;
    }

    fn check_create(request: &CreateTaskRequest) -> Option<String> {
        task_validation_message(&request.name, &request.description)
    }

    fn check_update(request: &UpdateTaskRequest) -> Option<String> {
        task_validation_message(&request.name, &request.description)
    }

    fn seed() -> Vec<Self> {
        vec![
            Task {
                id: 1,
                name: "Setup project structure".to_string(),
                description:
                    "Create the initial project structure and configure development environment"
                        .to_string(),
                created_date: seed_date(2024, 1, 15),
                modified_date: seed_date(2024, 1, 15),
                state: TaskState::Done,
                assigned_user_id: None,
            },
            Task {
                id: 2,
                name: "Implement user authentication".to_string(),
                description: "Add login and registration functionality with proper validation"
                    .to_string(),
                created_date: seed_date(2024, 1, 16),
                modified_date: seed_date(2024, 1, 18),
                state: TaskState::InProgress,
                assigned_user_id: None,
            },
            Task {
                id: 3,
                name: "Design database schema".to_string(),
                description: "Plan and implement the database structure for the application"
                    .to_string(),
                created_date: seed_date(2024, 1, 17),
                modified_date: seed_date(2024, 1, 17),
                state: TaskState::InQueue,
                assigned_user_id: None,
            },
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilters {
    pub state: Option<TaskState>,
    /// Case-insensitive match on name or description
    pub search_text: Option<String>,
    pub assigned_user_id: Option<EntityId>,
    pub unassigned: bool,
}

impl TaskFilters {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(state) = self.state {
            if task.state != state {
                return false;
            }
        }
        if let Some(search) = self.search_text.as_deref() {
            let needle = search.trim().to_lowercase();
            if !needle.is_empty() && !task.matches_text(&needle) {
                return false;
            }
        }
        if let Some(user_id) = self.assigned_user_id {
            if task.assigned_user_id != Some(user_id) {
                return false;
            }
        }
        if self.unassigned && task.is_assigned() {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatistics {
    pub total: usize,
    pub in_queue: usize,
    pub in_progress: usize,
    pub done: usize,
    pub assigned: usize,
    pub unassigned: usize,
}

impl TaskStatistics {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut stats = TaskStatistics {
            total: tasks.len(),
            ..TaskStatistics::default()
        };
        for task in tasks {
            match task.state {
                TaskState::InQueue => stats.in_queue += 1,
                TaskState::InProgress => stats.in_progress += 1,
                TaskState::Done => stats.done += 1,
            }
            if task.is_assigned() {
                stats.assigned += 1;
            } else {
                stats.unassigned += 1;
            }
        }
        stats
    }
}

/// Minimal user reference embedded in a task view
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AssignedUser {
    pub id: EntityId,
    pub name: String,
}

/// Task joined with the name of its assigned user
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskWithUser {
    #[serde(flatten)]
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_user: Option<AssignedUser>,
}

impl TaskStore {
    /// Tasks matching every set filter, in collection order.
    pub fn filter(&self, filters: &TaskFilters) -> Vec<Task> {
        self.all()
            .into_iter()
            .filter(|task| filters.matches(task))
            .collect()
    }

    pub fn statistics(&self) -> TaskStatistics {
        TaskStatistics::from_tasks(&self.all())
    }

    /// Look up a task, turning the not-found sentinel into an error.
    pub fn require(&self, id: EntityId) -> Result<Task> {
        self.get(id).ok_or(Error::NotFound {
            kind: Task::KIND,
            id,
        })
    }
}
