//! Assignment coordination between tasks and users.
//!
//! A task points at its user through `assignedUserId` and the user points
//! back through `assignedTaskId`. Every write that touches either pointer
//! goes through [`Coordinator`], which holds one mutex for the whole paired
//! write and puts the first record back if the second write fails.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::entity::EntityId;
use crate::error::{Error, Result};
use crate::storage::lock_or_recover;
use crate::task::{
    validate_task, AssignedUser, Task, TaskState, TaskStore, TaskWithUser, UpdateTaskRequest,
};
use crate::user::{AssignedTask, User, UserStore, UserWithTask};

/// What blocks assigning a user who already holds another task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentPolicy {
    /// A user holds at most one task, whatever its state
    #[default]
    Strict,
    /// Only a held task that is in progress blocks; a queued or done held
    /// task is released first
    InProgressOnly,
}

impl AssignmentPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentPolicy::Strict => "strict",
            AssignmentPolicy::InProgressOnly => "in_progress_only",
        }
    }
}

impl fmt::Display for AssignmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an assignment was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    TaskNotFound { task_id: EntityId },
    UserNotFound { user_id: EntityId },
    TaskDone { task_id: EntityId },
    TaskAssignedElsewhere { task_id: EntityId, user_id: EntityId },
    UserBusy { user_id: EntityId, task_id: EntityId },
    UserHoldsTask { user_id: EntityId, task_id: EntityId },
}

impl Rejection {
    /// Stable snake_case name of the reason
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::TaskNotFound { .. } => "task_not_found",
            Rejection::UserNotFound { .. } => "user_not_found",
            Rejection::TaskDone { .. } => "task_done",
            Rejection::TaskAssignedElsewhere { .. } => "task_assigned_elsewhere",
            Rejection::UserBusy { .. } => "user_busy",
            Rejection::UserHoldsTask { .. } => "user_holds_task",
        }
    }

    /// Convert into the error the CLI reports.
    pub fn into_error(self) -> Error {
        match self {
            Rejection::TaskNotFound { task_id } => Error::NotFound {
                kind: "task",
                id: task_id,
            },
            Rejection::UserNotFound { user_id } => Error::NotFound {
                kind: "user",
                id: user_id,
            },
            other => Error::AssignmentRejected(other.to_string()),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TaskNotFound { task_id } => write!(f, "task {task_id} does not exist"),
            Rejection::UserNotFound { user_id } => write!(f, "user {user_id} does not exist"),
            Rejection::TaskDone { task_id } => {
                write!(f, "task {task_id} is done and cannot be assigned")
            }
            Rejection::TaskAssignedElsewhere { task_id, user_id } => {
                write!(f, "task {task_id} is already assigned to user {user_id}")
            }
            Rejection::UserBusy { user_id, task_id } => {
                write!(f, "user {user_id} is working on task {task_id}")
            }
            Rejection::UserHoldsTask { user_id, task_id } => write!(
                f,
                "user {user_id} already holds task {task_id}; unassign it first"
            ),
        }
    }
}

/// Outcome of [`Coordinator::assign`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    Assigned {
        task: Task,
        user: User,
        /// Task released from the user first (`in_progress_only` policy)
        released: Option<Task>,
    },
    /// Task and user were already paired
    Unchanged { task: Task, user: User },
    Rejected(Rejection),
}

/// Outcome of [`Coordinator::unassign`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unassignment {
    Unassigned {
        task: Task,
        /// The user whose pointer was cleared, if it still pointed back
        user: Option<User>,
    },
    /// The task had no user
    Unchanged(Task),
    TaskNotFound,
}

/// Outcome of [`Coordinator::update_task`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEdit {
    Updated(Task),
    NotFound,
    Rejected(String),
}

/// Pointer problem found by [`Coordinator::audit`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum Inconsistency {
    /// Task points at a user that does not exist
    TaskUserMissing { task_id: EntityId, user_id: EntityId },
    /// Task points at a user that does not point back
    TaskUserMismatch { task_id: EntityId, user_id: EntityId },
    /// User points at a task that does not exist
    UserTaskMissing { user_id: EntityId, task_id: EntityId },
    /// User points at a task that does not point back
    UserTaskMismatch { user_id: EntityId, task_id: EntityId },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inconsistency::TaskUserMissing { task_id, user_id } => {
                write!(f, "task {task_id} is assigned to missing user {user_id}")
            }
            Inconsistency::TaskUserMismatch { task_id, user_id } => write!(
                f,
                "task {task_id} is assigned to user {user_id}, who does not point back"
            ),
            Inconsistency::UserTaskMissing { user_id, task_id } => {
                write!(f, "user {user_id} holds missing task {task_id}")
            }
            Inconsistency::UserTaskMismatch { user_id, task_id } => write!(
                f,
                "user {user_id} holds task {task_id}, which does not point back"
            ),
        }
    }
}

pub struct Coordinator {
    tasks: Arc<TaskStore>,
    users: Arc<UserStore>,
    policy: AssignmentPolicy,
    guard: Mutex<()>,
}

impl Coordinator {
    pub fn new(tasks: Arc<TaskStore>, users: Arc<UserStore>, policy: AssignmentPolicy) -> Self {
        Self {
            tasks,
            users,
            policy,
            guard: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> AssignmentPolicy {
        self.policy
    }

    // =========================================================================
    // Assignment
    // =========================================================================

    /// Pair `task_id` with `user_id`.
    ///
    /// Rule violations come back as [`Assignment::Rejected`]; only storage
    /// failures are errors.
    pub fn assign(&self, task_id: EntityId, user_id: EntityId) -> Result<Assignment> {
        let _guard = lock_or_recover(&self.guard);

        let Some(task) = self.tasks.get(task_id) else {
            return Ok(reject(Rejection::TaskNotFound { task_id }));
        };
        let Some(mut user) = self.users.get(user_id) else {
            return Ok(reject(Rejection::UserNotFound { user_id }));
        };
        if task.state == TaskState::Done {
            return Ok(reject(Rejection::TaskDone { task_id }));
        }
        match task.assigned_user_id {
            Some(current) if current != user_id => {
                return Ok(reject(Rejection::TaskAssignedElsewhere {
                    task_id,
                    user_id: current,
                }));
            }
            Some(_) if user.assigned_task_id == Some(task_id) => {
                return Ok(Assignment::Unchanged { task, user });
            }
            _ => {}
        }

        let mut released = None;
        if let Some(held_id) = user.assigned_task_id.filter(|held| *held != task_id) {
            match self.tasks.get(held_id) {
                Some(held) if held.state == TaskState::InProgress => {
                    return Ok(reject(Rejection::UserBusy {
                        user_id,
                        task_id: held_id,
                    }));
                }
                Some(_) if self.policy == AssignmentPolicy::Strict => {
                    return Ok(reject(Rejection::UserHoldsTask {
                        user_id,
                        task_id: held_id,
                    }));
                }
                Some(_) => {
                    if let Unassignment::Unassigned { task, .. } = self.unassign_locked(held_id)? {
                        released = Some(task);
                    }
                    // the held task may not have pointed back at this user
                    if self.users.get(user_id).and_then(|u| u.assigned_task_id) == Some(held_id) {
                        self.users.modify(user_id, |u| u.assigned_task_id = None)?;
                    }
                }
                None => {
                    warn!(user_id, task_id = held_id, "user holds a missing task; overwriting");
                }
            }
            user = self.users.get(user_id).ok_or(Error::NotFound {
                kind: "user",
                id: user_id,
            })?;
        }

        let (task, user) = self.pair(task, user)?;
        debug!(task_id, user_id, state = %task.state, "assigned");
        Ok(Assignment::Assigned {
            task,
            user,
            released,
        })
    }

    /// Write both pointers, restoring the earlier records if either write fails.
    fn pair(&self, task: Task, user: User) -> Result<(Task, User)> {
        let (task_id, user_id) = (task.id, user.id);

        let assigned = match self.tasks.modify(task_id, |t| {
            t.assigned_user_id = Some(user_id);
            t.state = t.state.on_assign();
        }) {
            Ok(Some(assigned)) => assigned,
            Ok(None) => return Err(Error::NotFound { kind: "task", id: task_id }),
            Err(err) => {
                self.rollback(Some(task), None);
                return Err(err);
            }
        };

        match self.users.modify(user_id, |u| u.assigned_task_id = Some(task_id)) {
            Ok(Some(paired)) => Ok((assigned, paired)),
            Ok(None) => {
                self.rollback(Some(task), None);
                Err(Error::NotFound { kind: "user", id: user_id })
            }
            Err(err) => {
                self.rollback(Some(task), Some(user));
                Err(err)
            }
        }
    }

    fn rollback(&self, task: Option<Task>, user: Option<User>) {
        if let Some(task) = task {
            let id = task.id;
            if let Err(err) = self.tasks.restore(task) {
                error!(task_id = id, error = %err, "failed to restore task after partial write");
            }
        }
        if let Some(user) = user {
            let id = user.id;
            if let Err(err) = self.users.restore(user) {
                error!(user_id = id, error = %err, "failed to restore user after partial write");
            }
        }
    }

    /// Release the user assigned to `task_id`.
    pub fn unassign(&self, task_id: EntityId) -> Result<Unassignment> {
        let _guard = lock_or_recover(&self.guard);
        self.unassign_locked(task_id)
    }

    fn unassign_locked(&self, task_id: EntityId) -> Result<Unassignment> {
        let Some(task) = self.tasks.get(task_id) else {
            return Ok(Unassignment::TaskNotFound);
        };
        let Some(user_id) = task.assigned_user_id else {
            return Ok(Unassignment::Unchanged(task));
        };

        let released = match self.tasks.modify(task_id, |t| {
            t.assigned_user_id = None;
            t.state = t.state.on_unassign();
        }) {
            Ok(Some(released)) => released,
            Ok(None) => return Ok(Unassignment::TaskNotFound),
            Err(err) => {
                self.rollback(Some(task), None);
                return Err(err);
            }
        };

        let user = match self.users.get(user_id) {
            Some(user) if user.assigned_task_id == Some(task_id) => {
                match self.users.modify(user_id, |u| u.assigned_task_id = None) {
                    Ok(cleared) => cleared,
                    Err(err) => {
                        self.rollback(Some(task), Some(user));
                        return Err(err);
                    }
                }
            }
            Some(user) => {
                warn!(
                    task_id,
                    user_id,
                    user_task = ?user.assigned_task_id,
                    "user did not point back at task"
                );
                None
            }
            None => {
                warn!(task_id, user_id, "task was assigned to a missing user");
                None
            }
        };

        debug!(task_id, user_id, state = %released.state, "unassigned");
        Ok(Unassignment::Unassigned {
            task: released,
            user,
        })
    }

    // =========================================================================
    // Guarded edits and deletes
    // =========================================================================

    /// Edit a task's name, description or state.
    ///
    /// An assigned task cannot be moved back to the queue; unassign it first.
    pub fn update_task(&self, request: &UpdateTaskRequest) -> Result<TaskEdit> {
        let _guard = lock_or_recover(&self.guard);

        let Some(current) = self.tasks.get(request.id) else {
            return Ok(TaskEdit::NotFound);
        };
        if let Some(user_id) = current.assigned_user_id {
            if request.state == TaskState::InQueue && current.state != TaskState::InQueue {
                let reason = format!(
                    "task {} is assigned to user {user_id}; unassign it before moving it to the queue",
                    current.id
                );
                warn!(task_id = current.id, user_id, "state edit refused");
                return Ok(TaskEdit::Rejected(reason));
            }
        }

        match self.tasks.update(request)? {
            Some(task) => Ok(TaskEdit::Updated(task)),
            None => Ok(TaskEdit::NotFound),
        }
    }

    /// Unassign the task, then delete it. `Ok(false)` when it does not exist.
    pub fn delete_task(&self, task_id: EntityId) -> Result<bool> {
        let _guard = lock_or_recover(&self.guard);
        if matches!(self.unassign_locked(task_id)?, Unassignment::TaskNotFound) {
            return Ok(false);
        }
        self.tasks.delete(task_id)
    }

    /// Delete a user. Users holding a task are refused with `Ok(false)`.
    pub fn delete_user(&self, user_id: EntityId) -> Result<bool> {
        let _guard = lock_or_recover(&self.guard);
        self.users.delete(user_id)
    }

    /// Release every user's pointer, then remove all tasks.
    ///
    /// When the tasks cannot be removed the pointers are put back and
    /// `Ok(false)` is returned.
    pub fn clear_tasks(&self) -> Result<bool> {
        let _guard = lock_or_recover(&self.guard);
        let released = self.release_all_users()?;
        if self.tasks.clear()? {
            return Ok(true);
        }
        // tasks are still there; hand the pointers back
        for user in released {
            let id = user.id;
            if let Err(err) = self.users.restore(user) {
                error!(user_id = id, error = %err, "failed to restore user after refused clear");
            }
        }
        Ok(false)
    }

    /// Replace the task collection.
    ///
    /// Imported tasks arrive unassigned; existing user pointers are released.
    pub fn import_tasks(&self, mut records: Vec<Task>) -> Result<Vec<Task>> {
        if let Some(invalid) = records
            .iter()
            .find(|task| !validate_task(&task.name, &task.description))
        {
            return Err(Error::Validation(format!(
                "imported task {} needs a name and a description",
                invalid.id
            )));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = records.iter().find(|task| !seen.insert(task.id)) {
            return Err(Error::InvalidArgument(format!(
                "duplicate task id {} in import",
                duplicate.id
            )));
        }
        for task in &mut records {
            if task.assigned_user_id.take().is_some() {
                task.state = task.state.on_unassign();
            }
        }

        let _guard = lock_or_recover(&self.guard);
        self.release_all_users()?;
        self.tasks.import(records)
    }

    /// Clear every user pointer. Returns the users as they were before.
    fn release_all_users(&self) -> Result<Vec<User>> {
        let holders: Vec<User> = self.users.all().into_iter().filter(User::has_task).collect();
        for user in &holders {
            self.users.modify(user.id, |u| u.assigned_task_id = None)?;
        }
        Ok(holders)
    }

    // =========================================================================
    // Consistency checks and views
    // =========================================================================

    /// Every dangling or one-sided pointer, tasks first.
    pub fn audit(&self) -> Vec<Inconsistency> {
        let _guard = lock_or_recover(&self.guard);
        find_inconsistencies(&self.tasks.all(), &self.users.all())
    }

    /// Clear every pointer reported by [`audit`](Self::audit). Returns what was fixed.
    pub fn repair(&self) -> Result<Vec<Inconsistency>> {
        let _guard = lock_or_recover(&self.guard);
        let problems = find_inconsistencies(&self.tasks.all(), &self.users.all());
        for problem in &problems {
            match *problem {
                Inconsistency::TaskUserMissing { task_id, .. }
                | Inconsistency::TaskUserMismatch { task_id, .. } => {
                    self.tasks.modify(task_id, |t| {
                        t.assigned_user_id = None;
                        t.state = t.state.on_unassign();
                    })?;
                }
                Inconsistency::UserTaskMissing { user_id, .. }
                | Inconsistency::UserTaskMismatch { user_id, .. } => {
                    self.users.modify(user_id, |u| u.assigned_task_id = None)?;
                }
            }
            warn!(%problem, "repaired");
        }
        Ok(problems)
    }

    /// Tasks joined with the name of their user
    pub fn task_views(&self) -> Vec<TaskWithUser> {
        let users: HashMap<EntityId, User> = self
            .users
            .all()
            .into_iter()
            .map(|user| (user.id, user))
            .collect();
        self.tasks
            .all()
            .into_iter()
            .map(|task| task_view(task, &users))
            .collect()
    }

    /// Users joined with a summary of their task
    pub fn user_views(&self) -> Vec<UserWithTask> {
        let tasks: HashMap<EntityId, Task> = self
            .tasks
            .all()
            .into_iter()
            .map(|task| (task.id, task))
            .collect();
        self.users
            .all()
            .into_iter()
            .map(|user| user_view(user, &tasks))
            .collect()
    }
}

fn reject(rejection: Rejection) -> Assignment {
    warn!(reason = rejection.code(), "assignment rejected: {rejection}");
    Assignment::Rejected(rejection)
}

fn find_inconsistencies(tasks: &[Task], users: &[User]) -> Vec<Inconsistency> {
    let task_index: HashMap<EntityId, &Task> = tasks.iter().map(|task| (task.id, task)).collect();
    let user_index: HashMap<EntityId, &User> = users.iter().map(|user| (user.id, user)).collect();
    let mut problems = Vec::new();

    for task in tasks {
        let Some(user_id) = task.assigned_user_id else {
            continue;
        };
        match user_index.get(&user_id) {
            None => problems.push(Inconsistency::TaskUserMissing {
                task_id: task.id,
                user_id,
            }),
            Some(user) if user.assigned_task_id != Some(task.id) => {
                problems.push(Inconsistency::TaskUserMismatch {
                    task_id: task.id,
                    user_id,
                })
            }
            Some(_) => {}
        }
    }
    for user in users {
        let Some(task_id) = user.assigned_task_id else {
            continue;
        };
        match task_index.get(&task_id) {
            None => problems.push(Inconsistency::UserTaskMissing {
                user_id: user.id,
                task_id,
            }),
            Some(task) if task.assigned_user_id != Some(user.id) => {
                problems.push(Inconsistency::UserTaskMismatch {
                    user_id: user.id,
                    task_id,
                })
            }
            Some(_) => {}
        }
    }
    problems
}

pub(crate) fn task_view(task: Task, users: &HashMap<EntityId, User>) -> TaskWithUser {
    let assigned_user = task
        .assigned_user_id
        .and_then(|id| users.get(&id))
        .map(|user| AssignedUser {
            id: user.id,
            name: user.name.clone(),
        });
    TaskWithUser {
        task,
        assigned_user,
    }
}

pub(crate) fn user_view(user: User, tasks: &HashMap<EntityId, Task>) -> UserWithTask {
    let assigned_task = user
        .assigned_task_id
        .and_then(|id| tasks.get(&id))
        .map(|task| AssignedTask {
            id: task.id,
            name: task.name.clone(),
            state: task.state,
            created_date: task.created_date,
            modified_date: task.modified_date,
        });
    UserWithTask {
        id: user.id,
        name: user.name,
        created_date: user.created_date,
        modified_date: user.modified_date,
        assigned_task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;

    fn paired() -> (Vec<Task>, Vec<User>) {
        let mut tasks = Task::seed();
        let mut users = User::seed();
        tasks[1].assigned_user_id = Some(1);
        users[0].assigned_task_id = Some(2);
        (tasks, users)
    }

    #[test]
    fn consistent_pairs_pass_audit() {
        let (tasks, users) = paired();
        assert!(find_inconsistencies(&tasks, &users).is_empty());
    }

    #[test]
    fn audit_reports_each_side() {
        let (mut tasks, mut users) = paired();
        tasks[2].assigned_user_id = Some(9);
        users[1].assigned_task_id = Some(1);
        users.remove(0);

        let problems = find_inconsistencies(&tasks, &users);
        assert_eq!(
            problems,
            vec![
                Inconsistency::TaskUserMissing { task_id: 2, user_id: 1 },
                Inconsistency::TaskUserMissing { task_id: 3, user_id: 9 },
                Inconsistency::UserTaskMismatch { user_id: 2, task_id: 1 },
            ]
        );
    }

    #[test]
    fn rejection_maps_to_errors() {
        assert!(matches!(
            Rejection::UserNotFound { user_id: 4 }.into_error(),
            Error::NotFound { kind: "user", id: 4 }
        ));
        let err = Rejection::TaskDone { task_id: 1 }.into_error();
        assert_eq!(err.exit_code(), crate::error::exit_codes::POLICY_BLOCKED);
        assert!(err.to_string().contains("done"));
    }

    #[test]
    fn views_join_names() {
        let (tasks, users) = paired();
        let by_id: HashMap<_, _> = users.iter().cloned().map(|u| (u.id, u)).collect();
        let view = task_view(tasks[1].clone(), &by_id);
        assert_eq!(view.assigned_user.unwrap().name, "John Doe");

        let tasks_by_id: HashMap<_, _> = tasks.iter().cloned().map(|t| (t.id, t)).collect();
        let view = user_view(users[0].clone(), &tasks_by_id);
        assert_eq!(view.assigned_task.unwrap().state, TaskState::InProgress);
    }

    #[test]
    fn policy_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AssignmentPolicy::InProgressOnly).unwrap(),
            "\"in_progress_only\""
        );
        assert_eq!(AssignmentPolicy::default(), AssignmentPolicy::Strict);
    }
}
