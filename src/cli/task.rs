//! taskboard task command implementations.

use std::path::PathBuf;

use serde::Serialize;

use crate::assign::{Assignment, TaskEdit, Unassignment};
use crate::cli::{CommandContext, Globals};
use crate::entity::EntityId;
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::lock::write_atomic;
use crate::output::HumanOutput;
use crate::task::{
    CreateTaskRequest, Task, TaskFilters, TaskState, TaskStatistics, TaskWithUser,
    UpdateTaskRequest,
};
use crate::user::User;

pub struct ListOptions {
    pub state: Option<String>,
    pub search: Option<String>,
    pub assigned_to: Option<EntityId>,
    pub unassigned: bool,
    pub globals: Globals,
}

pub struct CreateOptions {
    pub name: String,
    pub description: String,
    pub state: Option<String>,
    pub assign_to: Option<EntityId>,
    pub globals: Globals,
}

pub struct EditOptions {
    pub id: EntityId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub state: Option<String>,
    pub globals: Globals,
}

#[derive(Serialize)]
struct TaskListOutput {
    total: usize,
    tasks: Vec<TaskWithUser>,
}

#[derive(Serialize)]
struct TaskEditedOutput {
    task: Task,
    previous_state: TaskState,
}

#[derive(Serialize)]
struct TaskDeletedOutput {
    id: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    released_user_id: Option<EntityId>,
}

#[derive(Serialize)]
struct AssignOutput {
    changed: bool,
    task: Task,
    user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    released: Option<Task>,
}

#[derive(Serialize)]
struct UnassignOutput {
    changed: bool,
    task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<User>,
}

#[derive(Serialize)]
struct ClearOutput {
    removed: usize,
}

#[derive(Serialize)]
struct ImportOutput {
    imported: usize,
    next_id: EntityId,
}

#[derive(Serialize)]
struct ExportOutput {
    total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
    tasks: Vec<Task>,
}

fn parse_state(raw: Option<&str>) -> Result<Option<TaskState>> {
    raw.map(str::parse).transpose()
}

fn task_line(view: &TaskWithUser) -> String {
    let task = &view.task;
    let mut line = format!("[{}] {} {}", task.state, task.id, task.name);
    match (view.assigned_user.as_ref(), task.assigned_user_id) {
        (Some(user), _) => line.push_str(&format!(" (user: {} #{})", user.name, user.id)),
        (None, Some(user_id)) => line.push_str(&format!(" (user: missing #{user_id})")),
        (None, None) => {}
    }
    line
}

pub fn run_list(options: ListOptions) -> Result<()> {
    let ctx = CommandContext::load(&options.globals)?;
    let board = ctx.open_board()?;
    let filters = TaskFilters {
        state: parse_state(options.state.as_deref())?,
        search_text: options.search,
        assigned_user_id: options.assigned_to,
        unassigned: options.unassigned,
    };

    let tasks: Vec<TaskWithUser> = board
        .coordinator()
        .task_views()
        .into_iter()
        .filter(|view| filters.matches(&view.task))
        .collect();
    board.close()?;

    let mut human = HumanOutput::new("Tasks");
    human.push_summary("Total", tasks.len().to_string());
    if let Some(state) = filters.state {
        human.push_summary("State", state.to_string());
    }
    for view in &tasks {
        human.push_detail(task_line(view));
    }

    let output = TaskListOutput {
        total: tasks.len(),
        tasks,
    };
    ctx.finish("task list", &output, &human)
}

pub fn run_show(id: EntityId, globals: Globals) -> Result<()> {
    let ctx = CommandContext::load(&globals)?;
    let board = ctx.open_board()?;
    let view = board
        .coordinator()
        .task_views()
        .into_iter()
        .find(|view| view.task.id == id)
        .ok_or(Error::NotFound { kind: "task", id })?;
    board.close()?;

    let task = &view.task;
    let mut human = HumanOutput::new(format!("Task {}: {}", task.id, task.name));
    human.push_summary("State", task.state.to_string());
    human.push_summary(
        "Assigned to",
        match (view.assigned_user.as_ref(), task.assigned_user_id) {
            (Some(user), _) => format!("{} (#{})", user.name, user.id),
            (None, Some(user_id)) => format!("missing user #{user_id}"),
            (None, None) => "-".to_string(),
        },
    );
    human.push_summary("Created", task.created_date.to_rfc3339());
    human.push_summary("Modified", task.modified_date.to_rfc3339());
    human.push_detail(task.description.clone());

    ctx.finish("task show", &view, &human)
}

pub fn run_create(options: CreateOptions) -> Result<()> {
    let mut ctx = CommandContext::load(&options.globals)?;
    let board = ctx.open_board()?;
    let request = CreateTaskRequest {
        name: options.name,
        description: options.description,
        state: parse_state(options.state.as_deref())?.unwrap_or_default(),
    };
    let created = board.tasks().create(&request)?;
    let outcome = match options.assign_to {
        Some(user_id) => Some(board.coordinator().assign(created.id, user_id)?),
        None => None,
    };
    board.close()?;

    let mut human = HumanOutput::new("Task created");
    if let Some(warning) = ctx.emit_event(EventKind::TaskCreated, &created) {
        human.push_warning(warning);
    }
    let assigned = match outcome {
        Some(Assignment::Assigned { task, user, .. })
        | Some(Assignment::Unchanged { task, user }) => Some(AssignOutput {
            changed: true,
            task,
            user,
            released: None,
        }),
        // the task stays in place, unassigned
        Some(Assignment::Rejected(rejection)) => return Err(rejection.into_error()),
        None => None,
    };

    let task = match assigned {
        Some(output) => {
            if let Some(warning) = ctx.emit_event(EventKind::TaskAssigned, &output) {
                human.push_warning(warning);
            }
            human.push_summary("ID", output.task.id.to_string());
            human.push_summary("Name", output.task.name.clone());
            human.push_summary("State", output.task.state.to_string());
            human.push_summary(
                "Assigned to",
                format!("{} (#{})", output.user.name, output.user.id),
            );
            output.task
        }
        None => {
            human.push_summary("ID", created.id.to_string());
            human.push_summary("Name", created.name.clone());
            human.push_summary("State", created.state.to_string());
            human.push_next_step(format!("taskboard task assign {} <user-id>", created.id));
            created
        }
    };

    ctx.finish("task create", &task, &human)
}

pub fn run_edit(options: EditOptions) -> Result<()> {
    if options.name.is_none() && options.description.is_none() && options.state.is_none() {
        return Err(Error::InvalidArgument(
            "nothing to change; pass --name, --description or --state".to_string(),
        ));
    }

    let mut ctx = CommandContext::load(&options.globals)?;
    let board = ctx.open_board()?;
    let current = board.tasks().require(options.id)?;

    let mut request = UpdateTaskRequest::from_task(&current);
    if let Some(name) = options.name {
        request.name = name;
    }
    if let Some(description) = options.description {
        request.description = description;
    }
    if let Some(state) = parse_state(options.state.as_deref())? {
        request.state = state;
    }

    let task = match board.coordinator().update_task(&request)? {
        TaskEdit::Updated(task) => task,
        TaskEdit::NotFound => {
            return Err(Error::NotFound {
                kind: "task",
                id: options.id,
            })
        }
        TaskEdit::Rejected(reason) => return Err(Error::AssignmentRejected(reason)),
    };
    board.close()?;

    let output = TaskEditedOutput {
        previous_state: current.state,
        task,
    };
    let mut human = HumanOutput::new(format!("Task {} updated", output.task.id));
    if let Some(warning) = ctx.emit_event(EventKind::TaskUpdated, &output) {
        human.push_warning(warning);
    }
    human.push_summary("Name", output.task.name.clone());
    if output.previous_state != output.task.state {
        human.push_summary(
            "State",
            format!("{} -> {}", output.previous_state, output.task.state),
        );
    } else {
        human.push_summary("State", output.task.state.to_string());
    }

    ctx.finish("task edit", &output, &human)
}

pub fn run_delete(id: EntityId, globals: Globals) -> Result<()> {
    let mut ctx = CommandContext::load(&globals)?;
    let board = ctx.open_board()?;
    let task = board.tasks().require(id)?;
    if !board.coordinator().delete_task(id)? {
        return Err(Error::OperationFailed(format!("task {id} could not be deleted")));
    }
    board.close()?;

    let output = TaskDeletedOutput {
        id,
        released_user_id: task.assigned_user_id,
    };
    let mut human = HumanOutput::new(format!("Task {id} deleted"));
    if let Some(warning) = ctx.emit_event(EventKind::TaskDeleted, &output) {
        human.push_warning(warning);
    }
    human.push_summary("Name", task.name);
    if let Some(user_id) = output.released_user_id {
        human.push_summary("Released user", user_id.to_string());
    }

    ctx.finish("task delete", &output, &human)
}

pub fn run_assign(task_id: EntityId, user_id: EntityId, globals: Globals) -> Result<()> {
    let mut ctx = CommandContext::load(&globals)?;
    let board = ctx.open_board()?;
    let outcome = board.coordinator().assign(task_id, user_id)?;
    board.close()?;

    let output = match outcome {
        Assignment::Assigned {
            task,
            user,
            released,
        } => AssignOutput {
            changed: true,
            task,
            user,
            released,
        },
        Assignment::Unchanged { task, user } => AssignOutput {
            changed: false,
            task,
            user,
            released: None,
        },
        Assignment::Rejected(rejection) => return Err(rejection.into_error()),
    };

    let mut human = HumanOutput::new(format!(
        "taskboard task assign: {} -> {}",
        output.task.id, output.user.id
    ));
    if output.changed {
        if let Some(warning) = ctx.emit_event(EventKind::TaskAssigned, &output) {
            human.push_warning(warning);
        }
    } else {
        human.push_warning(format!(
            "task {} was already assigned to {}",
            output.task.id, output.user.name
        ));
    }
    human.push_summary("Task", output.task.name.clone());
    human.push_summary("User", output.user.name.clone());
    human.push_summary("State", output.task.state.to_string());
    if let Some(released) = output.released.as_ref() {
        human.push_summary("Released", format!("task {} ({})", released.id, released.state));
    }

    ctx.finish("task assign", &output, &human)
}

pub fn run_unassign(task_id: EntityId, globals: Globals) -> Result<()> {
    let mut ctx = CommandContext::load(&globals)?;
    let board = ctx.open_board()?;
    let outcome = board.coordinator().unassign(task_id)?;
    board.close()?;

    let output = match outcome {
        Unassignment::Unassigned { task, user } => UnassignOutput {
            changed: true,
            task,
            user,
        },
        Unassignment::Unchanged(task) => UnassignOutput {
            changed: false,
            task,
            user: None,
        },
        Unassignment::TaskNotFound => {
            return Err(Error::NotFound {
                kind: "task",
                id: task_id,
            })
        }
    };

    let mut human = HumanOutput::new(format!("taskboard task unassign: {task_id}"));
    if output.changed {
        if let Some(warning) = ctx.emit_event(EventKind::TaskUnassigned, &output) {
            human.push_warning(warning);
        }
        if let Some(user) = output.user.as_ref() {
            human.push_summary("Released", format!("{} (#{})", user.name, user.id));
        }
    } else {
        human.push_warning(format!("task {task_id} had no user"));
    }
    human.push_summary("State", output.task.state.to_string());

    ctx.finish("task unassign", &output, &human)
}

pub fn run_stats(globals: Globals) -> Result<()> {
    let ctx = CommandContext::load(&globals)?;
    let board = ctx.open_board()?;
    let stats: TaskStatistics = board.tasks().statistics();
    board.close()?;

    let mut human = HumanOutput::new("Task stats");
    human.push_summary("Total", stats.total.to_string());
    human.push_summary("In queue", stats.in_queue.to_string());
    human.push_summary("In progress", stats.in_progress.to_string());
    human.push_summary("Done", stats.done.to_string());
    human.push_summary("Assigned", stats.assigned.to_string());
    human.push_summary("Unassigned", stats.unassigned.to_string());

    ctx.finish("task stats", &stats, &human)
}

pub fn run_clear(globals: Globals) -> Result<()> {
    let mut ctx = CommandContext::load(&globals)?;
    let board = ctx.open_board()?;
    let removed = board.tasks().len();
    if !board.coordinator().clear_tasks()? {
        return Err(Error::OperationFailed("tasks could not be cleared".to_string()));
    }
    board.close()?;

    let output = ClearOutput { removed };
    let mut human = HumanOutput::new("Tasks cleared");
    if let Some(warning) = ctx.emit_event(EventKind::TasksCleared, &output) {
        human.push_warning(warning);
    }
    human.push_summary("Removed", removed.to_string());

    ctx.finish("task clear", &output, &human)
}

pub fn run_import(file: PathBuf, globals: Globals) -> Result<()> {
    let mut ctx = CommandContext::load(&globals)?;
    let board = ctx.open_board()?;

    let content = std::fs::read_to_string(&file)?;
    let records: Vec<Task> = serde_json::from_str(&content).map_err(|err| {
        Error::InvalidArgument(format!("{} is not a task array: {err}", file.display()))
    })?;
    let imported = board.coordinator().import_tasks(records)?;
    let output = ImportOutput {
        imported: imported.len(),
        next_id: board.tasks().next_id(),
    };
    board.close()?;

    let mut human = HumanOutput::new("Tasks imported");
    if let Some(warning) = ctx.emit_event(EventKind::TasksImported, &output) {
        human.push_warning(warning);
    }
    human.push_summary("Imported", output.imported.to_string());
    human.push_summary("Next id", output.next_id.to_string());
    if imported.iter().any(|task| task.state == TaskState::InProgress) {
        human.push_next_step("taskboard task assign <task-id> <user-id>");
    }

    ctx.finish("task import", &output, &human)
}

pub fn run_export(path: Option<PathBuf>, globals: Globals) -> Result<()> {
    let ctx = CommandContext::load(&globals)?;
    let board = ctx.open_board()?;
    let tasks = board.tasks().all();
    board.close()?;

    let serialized = serde_json::to_string_pretty(&tasks)?;
    match path.as_ref() {
        Some(path) => write_atomic(path, serialized.as_bytes())?,
        None if !globals.json => {
            println!("{serialized}");
            return Ok(());
        }
        None => {}
    }

    let output = ExportOutput {
        total: tasks.len(),
        path,
        tasks,
    };
    let mut human = HumanOutput::new("Tasks exported");
    human.push_summary("Total", output.total.to_string());
    if let Some(path) = output.path.as_ref() {
        human.push_summary("File", path.display().to_string());
    }

    ctx.finish("task export", &output, &human)
}
