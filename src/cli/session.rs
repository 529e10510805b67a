//! taskboard login, logout and whoami

use serde::Serialize;

use crate::cli::{CommandContext, Globals};
use crate::error::Result;
use crate::events::EventKind;
use crate::output::HumanOutput;

/// Options for `taskboard login`
pub struct LoginOptions {
    pub username: String,
    pub password: String,
    pub globals: Globals,
}

#[derive(Serialize)]
struct WhoamiReport {
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    login_time: Option<String>,
}

#[derive(Serialize)]
struct LogoutReport {
    was_logged_in: bool,
}

pub fn run_login(options: LoginOptions) -> Result<()> {
    let mut ctx = CommandContext::load(&options.globals)?;
    let info = ctx.session.login(&options.username, &options.password)?;
    ctx.actor = Some(info.username.clone());

    let report = WhoamiReport {
        authenticated: true,
        username: Some(info.username.clone()),
        login_time: Some(info.login_time.to_rfc3339()),
    };
    let mut human = HumanOutput::new(format!("taskboard login: {}", info.username));
    if let Some(warning) = ctx.emit_event(EventKind::SessionStarted, &report) {
        human.push_warning(warning);
    }
    human.push_summary("logged in", info.login_time.to_rfc3339());
    human.push_next_step("taskboard task list");

    ctx.finish("login", &report, &human)
}

pub fn run_logout(globals: Globals) -> Result<()> {
    let mut ctx = CommandContext::load(&globals)?;
    let was_logged_in = ctx.session.logout()?;
    let report = LogoutReport { was_logged_in };

    let mut human = if was_logged_in {
        HumanOutput::new("taskboard logout: session ended")
    } else {
        HumanOutput::new("taskboard logout: no active session")
    };
    if was_logged_in {
        if let Some(warning) = ctx.emit_event(EventKind::SessionEnded, &report) {
            human.push_warning(warning);
        }
    }

    ctx.finish("logout", &report, &human)
}

pub fn run_whoami(globals: Globals) -> Result<()> {
    let ctx = CommandContext::load(&globals)?;
    let current = ctx
        .session
        .current_user()
        .filter(|_| ctx.session.is_authenticated());

    let report = WhoamiReport {
        authenticated: current.is_some(),
        username: current.as_ref().map(|info| info.username.clone()),
        login_time: current.as_ref().map(|info| info.login_time.to_rfc3339()),
    };

    let mut human = match current.as_ref() {
        Some(info) => {
            let mut human = HumanOutput::new(format!("taskboard whoami: {}", info.username));
            human.push_summary("logged in", info.login_time.to_rfc3339());
            human
        }
        None => {
            let mut human = HumanOutput::new("taskboard whoami: not logged in");
            human.push_next_step("taskboard login --username <name> --password <password>");
            human
        }
    };
    if !ctx.config.session.require_login {
        human.push_detail("login is optional (session.require_login = false)");
    }

    ctx.finish("whoami", &report, &human)
}
