//! taskboard doctor
//!
//! Reports where data lives, which rules are active, and any assignment
//! pointers that do not match up. `--repair` clears the offending pointers.

use std::path::PathBuf;

use serde::Serialize;

use crate::assign::{AssignmentPolicy, Inconsistency};
use crate::board::Board;
use crate::cli::{CommandContext, Globals};
use crate::error::Result;
use crate::output::HumanOutput;

pub struct DoctorOptions {
    pub repair: bool,
    pub globals: Globals,
}

#[derive(Serialize)]
struct DoctorReport {
    data_dir: PathBuf,
    config_file: PathBuf,
    config_present: bool,
    namespace: String,
    policy: AssignmentPolicy,
    authenticated: bool,
    tasks: usize,
    users: usize,
    problems: Vec<Inconsistency>,
    repaired: bool,
}

pub fn run(options: DoctorOptions) -> Result<()> {
    let ctx = CommandContext::load(&options.globals)?;
    // read-only checks run without a session
    let board = if options.repair {
        ctx.open_board()?
    } else {
        Board::open(&ctx.config, &ctx.data_dir)?
    };

    let problems = if options.repair {
        board.coordinator().repair()?
    } else {
        board.coordinator().audit()
    };

    let config_file = options
        .globals
        .config
        .clone()
        .unwrap_or_else(|| ctx.data_dir.config_file());
    let report = DoctorReport {
        data_dir: ctx.data_dir.root().to_path_buf(),
        config_present: config_file.exists(),
        config_file,
        namespace: ctx.config.storage.namespace.clone(),
        policy: board.coordinator().policy(),
        authenticated: ctx.session.is_authenticated(),
        tasks: board.tasks().len(),
        users: board.users().len(),
        problems,
        repaired: options.repair,
    };
    board.close()?;

    let header = match (report.problems.is_empty(), options.repair) {
        (true, _) => "taskboard doctor: ok".to_string(),
        (false, true) => format!("taskboard doctor: repaired {}", report.problems.len()),
        (false, false) => format!("taskboard doctor: {} problem(s)", report.problems.len()),
    };
    let mut human = HumanOutput::new(header);
    human.push_summary("data dir", report.data_dir.display().to_string());
    human.push_summary(
        "config",
        if report.config_present {
            report.config_file.display().to_string()
        } else {
            "defaults".to_string()
        },
    );
    human.push_summary("namespace", report.namespace.clone());
    human.push_summary("policy", report.policy.to_string());
    human.push_summary("tasks", report.tasks.to_string());
    human.push_summary("users", report.users.to_string());
    human.push_summary(
        "session",
        if report.authenticated { "active" } else { "none" },
    );
    for problem in &report.problems {
        if options.repair {
            human.push_detail(format!("fixed: {problem}"));
        } else {
            human.push_warning(problem.to_string());
        }
    }
    if !report.problems.is_empty() && !options.repair {
        human.push_next_step("taskboard doctor --repair");
    }

    ctx.finish("doctor", &report, &human)
}
