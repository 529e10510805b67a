//! taskboard user command implementations.

use serde::Serialize;

use crate::cli::{CommandContext, Globals};
use crate::entity::EntityId;
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::output::HumanOutput;
use crate::user::{CreateUserRequest, UpdateUserRequest, UserFilters, UserWithTask};

pub struct ListOptions {
    pub search: Option<String>,
    pub with_task: bool,
    pub without_task: bool,
    pub globals: Globals,
}

#[derive(Serialize)]
struct UserListOutput {
    total: usize,
    users: Vec<UserWithTask>,
}

#[derive(Serialize)]
struct UserDeletedOutput {
    id: EntityId,
    name: String,
}

fn user_line(view: &UserWithTask) -> String {
    match view.assigned_task.as_ref() {
        Some(task) => format!(
            "{} {} (task: {} #{}, {})",
            view.id, view.name, task.name, task.id, task.state
        ),
        None => format!("{} {}", view.id, view.name),
    }
}

fn list_users(globals: &Globals, filters: UserFilters, command: &str, header: &str) -> Result<()> {
    let ctx = CommandContext::load(globals)?;
    let board = ctx.open_board()?;
    let matching: Vec<EntityId> = board
        .users()
        .filter(&filters)
        .into_iter()
        .map(|user| user.id)
        .collect();
    let users: Vec<UserWithTask> = board
        .coordinator()
        .user_views()
        .into_iter()
        .filter(|view| matching.contains(&view.id))
        .collect();
    board.close()?;

    let mut human = HumanOutput::new(header);
    human.push_summary("Total", users.len().to_string());
    for view in &users {
        human.push_detail(user_line(view));
    }

    let output = UserListOutput {
        total: users.len(),
        users,
    };
    ctx.finish(command, &output, &human)
}

pub fn run_list(options: ListOptions) -> Result<()> {
    let has_assigned_task = match (options.with_task, options.without_task) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    };
    let filters = UserFilters {
        search_text: options.search,
        has_assigned_task,
    };
    list_users(&options.globals, filters, "user list", "Users")
}

pub fn run_available(globals: Globals) -> Result<()> {
    let filters = UserFilters {
        has_assigned_task: Some(false),
        ..UserFilters::default()
    };
    list_users(&globals, filters, "user available", "Available users")
}

pub fn run_show(id: EntityId, globals: Globals) -> Result<()> {
    let ctx = CommandContext::load(&globals)?;
    let board = ctx.open_board()?;
    let view = board
        .coordinator()
        .user_views()
        .into_iter()
        .find(|view| view.id == id)
        .ok_or(Error::NotFound { kind: "user", id })?;
    board.close()?;

    let mut human = HumanOutput::new(format!("User {}: {}", view.id, view.name));
    human.push_summary(
        "Task",
        view.assigned_task
            .as_ref()
            .map(|task| format!("{} (#{}, {})", task.name, task.id, task.state))
            .unwrap_or_else(|| "-".to_string()),
    );
    human.push_summary("Created", view.created_date.to_rfc3339());
    human.push_summary("Modified", view.modified_date.to_rfc3339());

    ctx.finish("user show", &view, &human)
}

pub fn run_create(name: String, globals: Globals) -> Result<()> {
    let mut ctx = CommandContext::load(&globals)?;
    let board = ctx.open_board()?;
    let user = board.users().create(&CreateUserRequest { name })?;
    board.close()?;

    let mut human = HumanOutput::new("User created");
    if let Some(warning) = ctx.emit_event(EventKind::UserCreated, &user) {
        human.push_warning(warning);
    }
    human.push_summary("ID", user.id.to_string());
    human.push_summary("Name", user.name.clone());
    human.push_next_step(format!("taskboard task assign <task-id> {}", user.id));

    ctx.finish("user create", &user, &human)
}

pub fn run_edit(id: EntityId, name: String, globals: Globals) -> Result<()> {
    let mut ctx = CommandContext::load(&globals)?;
    let board = ctx.open_board()?;
    let user = board
        .users()
        .update(&UpdateUserRequest { id, name })?
        .ok_or(Error::NotFound { kind: "user", id })?;
    board.close()?;

    let mut human = HumanOutput::new(format!("User {id} updated"));
    if let Some(warning) = ctx.emit_event(EventKind::UserUpdated, &user) {
        human.push_warning(warning);
    }
    human.push_summary("Name", user.name.clone());

    ctx.finish("user edit", &user, &human)
}

pub fn run_delete(id: EntityId, globals: Globals) -> Result<()> {
    let mut ctx = CommandContext::load(&globals)?;
    let board = ctx.open_board()?;
    let user = board.users().require(id)?;
    if let Some(task_id) = user.assigned_task_id {
        return Err(Error::DeleteRefused(format!(
            "user {id} has task {task_id} assigned; unassign it first"
        )));
    }
    if !board.coordinator().delete_user(id)? {
        return Err(Error::OperationFailed(format!("user {id} could not be deleted")));
    }
    board.close()?;

    let output = UserDeletedOutput { id, name: user.name };
    let mut human = HumanOutput::new(format!("User {id} deleted"));
    if let Some(warning) = ctx.emit_event(EventKind::UserDeleted, &output) {
        human.push_warning(warning);
    }
    human.push_summary("Name", output.name.clone());

    ctx.finish("user delete", &output, &human)
}

pub fn run_stats(globals: Globals) -> Result<()> {
    let ctx = CommandContext::load(&globals)?;
    let board = ctx.open_board()?;
    let stats = board.users().statistics();
    board.close()?;

    let mut human = HumanOutput::new("User stats");
    human.push_summary("Total", stats.total.to_string());
    human.push_summary("With a task", stats.with_assigned_tasks.to_string());
    human.push_summary("Without a task", stats.without_assigned_tasks.to_string());

    ctx.finish("user stats", &stats, &human)
}
