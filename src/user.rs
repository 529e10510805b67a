//! User records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{has_text, seed_date, Entity, EntityId};
use crate::error::{Error, Result};
use crate::store::EntityStore;
use crate::task::TaskState;

pub const USERS_KEY: &str = "users";
pub const USERS_NEXT_ID_KEY: &str = "users_next_id";

/// Store of users
pub type UserStore = EntityStore<User>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: EntityId,
    pub name: String,
    pub created_date: DateTime<Utc>,
    pub modified_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_task_id: Option<EntityId>,
}

impl User {
    pub fn has_task(&self) -> bool {
        self.assigned_task_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateUserRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateUserRequest {
    pub id: EntityId,
    pub name: String,
}

/// Name must be non-empty after trimming.
pub fn validate_user(name: &str) -> bool {
    has_text(name)
}

impl Entity for User {
    type Create = CreateUserRequest;
    type Update = UpdateUserRequest;

    const KIND: &'static str = "user";
    const COLLECTION_KEY: &'static str = USERS_KEY;
    const NEXT_ID_KEY: &'static str = USERS_NEXT_ID_KEY;

    fn id(&self) -> EntityId {
        self.id
    }

    fn from_create(id: EntityId, request: &CreateUserRequest, now: DateTime<Utc>) -> Self {
        User {
            id,
            name: request.name.trim().to_string(),
            created_date: now,
            modified_date: now,
            assigned_task_id: None,
        }
    }

    fn update_id(request: &UpdateUserRequest) -> EntityId {
        request.id
    }

    fn apply_update(&mut self, request: &UpdateUserRequest, now: DateTime<Utc>) {
        self.name = request.name.trim().to_string();
        self.modified_date = now;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.modified_date = now;
    }

    fn check_create(request: &CreateUserRequest) -> Option<String> {
        (!validate_user(&request.name)).then(|| "user name cannot be empty".to_string())
    }

    fn check_update(request: &UpdateUserRequest) -> Option<String> {
        (!validate_user(&request.name)).then(|| "user name cannot be empty".to_string())
    }

    fn delete_blocker(&self) -> Option<String> {
        self.assigned_task_id.map(|task_id| {
            format!(
                "user {} has task {} assigned; unassign it first",
                self.id, task_id
            )
        })
    }

    fn seed() -> Vec<Self> {
        [(1, "John Doe", 10), (2, "Jane Smith", 12), (3, "Bob Johnson", 14)]
            .into_iter()
            .map(|(id, name, day)| User {
                id,
                name: name.to_string(),
                created_date: seed_date(2024, 1, day),
                modified_date: seed_date(2024, 1, day),
                assigned_task_id: None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilters {
    /// Case-insensitive match on the name
    pub search_text: Option<String>,
    pub has_assigned_task: Option<bool>,
}

impl UserFilters {
    pub fn matches(&self, user: &User) -> bool {
        if let Some(search) = self.search_text.as_deref() {
            let needle = search.trim().to_lowercase();
            if !needle.is_empty() && !user.name.to_lowercase().contains(&needle) {
                return false;
            }
        }
        if let Some(has_task) = self.has_assigned_task {
            if user.has_task() != has_task {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserStatistics {
    pub total: usize,
    pub with_assigned_tasks: usize,
    pub without_assigned_tasks: usize,
}

impl UserStatistics {
    pub fn from_users(users: &[User]) -> Self {
        let with_assigned_tasks = users.iter().filter(|user| user.has_task()).count();
        UserStatistics {
            total: users.len(),
            with_assigned_tasks,
            without_assigned_tasks: users.len() - with_assigned_tasks,
        }
    }
}

/// Task summary embedded in a user view
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssignedTask {
    pub id: EntityId,
    pub name: String,
    pub state: TaskState,
    pub created_date: DateTime<Utc>,
    pub modified_date: DateTime<Utc>,
}

/// User joined with a summary of the assigned task
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserWithTask {
    pub id: EntityId,
    pub name: String,
    pub created_date: DateTime<Utc>,
    pub modified_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_task: Option<AssignedTask>,
}

impl UserStore {
    pub fn filter(&self, filters: &UserFilters) -> Vec<User> {
        self.all()
            .into_iter()
            .filter(|user| filters.matches(user))
            .collect()
    }

    /// Users without an assigned task
    pub fn available(&self) -> Vec<User> {
        self.filter(&UserFilters {
            has_assigned_task: Some(false),
            ..UserFilters::default()
        })
    }

    pub fn statistics(&self) -> UserStatistics {
        UserStatistics::from_users(&self.all())
    }

    /// Look up a user, turning the not-found sentinel into an error.
    pub fn require(&self, id: EntityId) -> Result<User> {
        self.get(id).ok_or(Error::NotFound {
            kind: User::KIND,
            id,
        })
    }
}
