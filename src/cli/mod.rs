//! Command-line interface for taskboard
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command group is defined in its own submodule.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::board::Board;
use crate::config::Config;
use crate::error::Result;
use crate::events::{Event, EventDestination, EventKind, EventSink};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::session::Session;
use crate::storage::DataDir;

mod doctor;
mod session;
mod task;
mod user;

/// taskboard - tasks, users and who works on what
///
/// Keeps a task list and a user list on disk and pairs each user with at
/// most one task.
#[derive(Parser, Debug)]
#[command(name = "taskboard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding board data and the session
    #[arg(long, global = true, env = "TASKBOARD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Configuration file (defaults to <data-dir>/taskboard.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write JSONL events to a file, or "-" for stdout
    #[arg(long, global = true)]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a session
    Login {
        #[arg(long)]
        username: String,

        #[arg(long)]
        password: String,
    },

    /// End the session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Task management
    #[command(subcommand)]
    Task(TaskCommands),

    /// User management
    #[command(subcommand)]
    User(UserCommands),

    /// Check configuration, session and assignment consistency
    Doctor {
        /// Clear dangling or one-sided assignment pointers
        #[arg(long)]
        repair: bool,
    },
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// List tasks
    List {
        /// Only tasks in this state (in-queue, in-progress, done)
        #[arg(long)]
        state: Option<String>,

        /// Case-insensitive text in name or description
        #[arg(long)]
        search: Option<String>,

        /// Only tasks assigned to this user id
        #[arg(long, conflicts_with = "unassigned")]
        assigned_to: Option<u64>,

        /// Only tasks without a user
        #[arg(long)]
        unassigned: bool,
    },

    /// Show one task
    Show { id: u64 },

    /// Create a task
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        description: String,

        /// Initial state (defaults to in-queue)
        #[arg(long)]
        state: Option<String>,

        /// Assign the new task to this user id
        #[arg(long)]
        assign_to: Option<u64>,
    },

    /// Edit a task's name, description or state
    Edit {
        id: u64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        state: Option<String>,
    },

    /// Delete a task, releasing its user first
    Delete { id: u64 },

    /// Assign a task to a user
    Assign { task: u64, user: u64 },

    /// Release the user assigned to a task
    Unassign { task: u64 },

    /// Task counts by state and assignment
    Stats,

    /// Delete every task
    Clear,

    /// Replace all tasks with the JSON array in FILE
    Import { file: PathBuf },

    /// Print all tasks as a JSON array
    Export {
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// User subcommands
#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// List users
    List {
        /// Case-insensitive text in the name
        #[arg(long)]
        search: Option<String>,

        /// Only users holding a task
        #[arg(long, conflicts_with = "without_task")]
        with_task: bool,

        /// Only users without a task
        #[arg(long)]
        without_task: bool,
    },

    /// Users without a task
    Available,

    /// Show one user
    Show { id: u64 },

    /// Create a user
    Create {
        #[arg(long)]
        name: String,
    },

    /// Rename a user
    Edit {
        id: u64,

        #[arg(long)]
        name: String,
    },

    /// Delete a user without a task
    Delete { id: u64 },

    /// User counts by assignment
    Stats,
}

/// Flags shared by every command
#[derive(Debug, Clone)]
pub(crate) struct Globals {
    pub data_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
    pub events: Option<String>,
}

/// Resolved data directory, configuration, session and event sink
pub(crate) struct CommandContext {
    pub data_dir: DataDir,
    pub config: Config,
    pub session: Session,
    pub actor: Option<String>,
    sink: Option<EventSink>,
    output: OutputOptions,
}

impl CommandContext {
    /// Resolve everything except the board; no login required.
    pub fn load(globals: &Globals) -> Result<Self> {
        let data_dir = DataDir::resolve(globals.data_dir.clone())?;
        let config = Config::resolve(globals.config.as_deref(), &data_dir)?;
        let session = Session::open(&data_dir, &config);
        let actor = session.current_user().map(|info| info.username);

        let destination = EventDestination::parse(globals.events.as_deref());
        let sink = destination.as_ref().map(|dest| dest.open()).transpose()?;
        let events_to_stdout = matches!(destination, Some(EventDestination::Stdout));

        Ok(Self {
            data_dir,
            config,
            session,
            actor,
            sink,
            output: OutputOptions {
                json: globals.json && !events_to_stdout,
                quiet: globals.quiet || events_to_stdout,
            },
        })
    }

    /// Require a session, then open the board.
    pub fn open_board(&self) -> Result<Board> {
        self.session.require()?;
        Board::open(&self.config, &self.data_dir)
    }

    /// Emit one event; a failure becomes a warning line.
    pub fn emit_event<T: Serialize>(&mut self, kind: EventKind, data: T) -> Option<String> {
        let sink = self.sink.as_mut()?;
        let event = match Event::new(kind, self.actor.clone()).with_data(data) {
            Ok(event) => event,
            Err(err) => return Some(format!("event output failed: {err}")),
        };
        if let Err(err) = sink.emit(&event) {
            return Some(format!("event output failed: {err}"));
        }
        None
    }

    /// Print the command result.
    pub fn finish<T: Serialize>(
        &self,
        command: &str,
        data: &T,
        human: &HumanOutput,
    ) -> Result<()> {
        emit_success(self.output, command, data, Some(human))
    }
}

impl Cli {
    fn globals(&self) -> Globals {
        Globals {
            data_dir: self.data_dir.clone(),
            config: self.config.clone(),
            json: self.json,
            quiet: self.quiet,
            events: self.events.clone(),
        }
    }

    /// Name reported in output envelopes, e.g. `task assign`.
    pub fn command_name(&self) -> &'static str {
        match &self.command {
            Commands::Login { .. } => "login",
            Commands::Logout => "logout",
            Commands::Whoami => "whoami",
            Commands::Doctor { .. } => "doctor",
            Commands::Task(cmd) => match cmd {
                TaskCommands::List { .. } => "task list",
                TaskCommands::Show { .. } => "task show",
                TaskCommands::Create { .. } => "task create",
                TaskCommands::Edit { .. } => "task edit",
                TaskCommands::Delete { .. } => "task delete",
                TaskCommands::Assign { .. } => "task assign",
                TaskCommands::Unassign { .. } => "task unassign",
                TaskCommands::Stats => "task stats",
                TaskCommands::Clear => "task clear",
                TaskCommands::Import { .. } => "task import",
                TaskCommands::Export { .. } => "task export",
            },
            Commands::User(cmd) => match cmd {
                UserCommands::List { .. } => "user list",
                UserCommands::Available => "user available",
                UserCommands::Show { .. } => "user show",
                UserCommands::Create { .. } => "user create",
                UserCommands::Edit { .. } => "user edit",
                UserCommands::Delete { .. } => "user delete",
                UserCommands::Stats => "user stats",
            },
        }
    }

    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let globals = self.globals();
        match self.command {
            Commands::Login { username, password } => {
                session::run_login(session::LoginOptions {
                    username,
                    password,
                    globals,
                })
            }
            Commands::Logout => session::run_logout(globals),
            Commands::Whoami => session::run_whoami(globals),
            Commands::Doctor { repair } => doctor::run(doctor::DoctorOptions { repair, globals }),
            Commands::Task(cmd) => match cmd {
                TaskCommands::List {
                    state,
                    search,
                    assigned_to,
                    unassigned,
                } => task::run_list(task::ListOptions {
                    state,
                    search,
                    assigned_to,
                    unassigned,
                    globals,
                }),
                TaskCommands::Show { id } => task::run_show(id, globals),
                TaskCommands::Create {
                    name,
                    description,
                    state,
                    assign_to,
                } => task::run_create(task::CreateOptions {
                    name,
                    description,
                    state,
                    assign_to,
                    globals,
                }),
                TaskCommands::Edit {
                    id,
                    name,
                    description,
                    state,
                } => task::run_edit(task::EditOptions {
                    id,
                    name,
                    description,
                    state,
                    globals,
                }),
                TaskCommands::Delete { id } => task::run_delete(id, globals),
                TaskCommands::Assign { task, user } => task::run_assign(task, user, globals),
                TaskCommands::Unassign { task } => task::run_unassign(task, globals),
                TaskCommands::Stats => task::run_stats(globals),
                TaskCommands::Clear => task::run_clear(globals),
                TaskCommands::Import { file } => task::run_import(file, globals),
                TaskCommands::Export { output } => task::run_export(output, globals),
            },
            Commands::User(cmd) => match cmd {
                UserCommands::List {
                    search,
                    with_task,
                    without_task,
                } => user::run_list(user::ListOptions {
                    search,
                    with_task,
                    without_task,
                    globals,
                }),
                UserCommands::Available => user::run_available(globals),
                UserCommands::Show { id } => user::run_show(id, globals),
                UserCommands::Create { name } => user::run_create(name, globals),
                UserCommands::Edit { id, name } => user::run_edit(id, name, globals),
                UserCommands::Delete { id } => user::run_delete(id, globals),
                UserCommands::Stats => user::run_stats(globals),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "taskboard", "task", "assign", "3", "1", "--json", "--data-dir", "/tmp/tb",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/tb")));
        assert!(matches!(
            cli.command,
            Commands::Task(TaskCommands::Assign { task: 3, user: 1 })
        ));
    }

    #[test]
    fn assigned_to_conflicts_with_unassigned() {
        let parsed = Cli::try_parse_from([
            "taskboard", "task", "list", "--assigned-to", "1", "--unassigned",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn command_name_covers_nested_subcommands() {
        let cli = Cli::try_parse_from(["taskboard", "--json", "user", "available"]).expect("parse");
        assert_eq!(cli.command_name(), "user available");
        let cli = Cli::try_parse_from(["taskboard", "doctor", "--repair"]).expect("parse");
        assert_eq!(cli.command_name(), "doctor");
    }

    #[test]
    fn create_accepts_assign_to() {
        let cli = Cli::try_parse_from([
            "taskboard", "task", "create", "--name", "n", "--description", "d", "--assign-to",
            "2",
        ])
        .expect("parse");
        match cli.command {
            Commands::Task(TaskCommands::Create { assign_to, .. }) => {
                assert_eq!(assign_to, Some(2))
            }
            _ => panic!("expected task create"),
        }
    }
}
