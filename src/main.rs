//! `shelf`: put the running applications away and bring them back later.
//!
//! All logic lives in the library; this binary parses arguments and prints.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    reason = "command-line tool; results go to stdout, failures to stderr"
)]

use clap::{Parser, Subcommand};
use shelf_lib::control::ControlHost;
use shelf_lib::error::AppError;
use shelf_lib::filter::{exclusion_reasons, ExclusionReason};
use shelf_lib::models::{Settings, TimerOption};
use shelf_lib::orchestrator::{RestoreOutcome, SessionOrchestrator, SessionView};
use shelf_lib::session::{dedup_by_identity, ActionStatus, AppOutcome, RestoreReport, SaveOutcome};
use shelf_lib::timer::TimerNotice;
use shelf_lib::{build_orchestrator, default_db_path, logging, native_actions, open_database, settings, InitError};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Save the running applications and restore them later
#[derive(Parser, Debug)]
#[command(name = "shelf", version)]
#[command(about = "Save the running applications and restore them later", long_about = None)]
struct Args {
    /// Database file (defaults to the platform data directory)
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Hide (or quit) the running applications and remember them
    Save,
    /// Reopen the saved applications
    Restore {
        /// Restore immediately even when "wait before restore" is enabled
        #[arg(long)]
        now: bool,
    },
    /// Forget the saved session without reopening it
    Clear,
    /// Show the saved session and settings
    Status {
        /// Print the state as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the running applications and whether a save would include them
    Apps,
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
    /// Serve newline-delimited JSON requests on stdin, events on stdout
    Serve,
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print every setting
    Show,
    /// Change one setting
    Set {
        /// Setting key, e.g. `wait_before_restore`
        key: String,
        /// New value, e.g. `true` or `1 hour`
        value: String,
    },
    /// Add a bundle identifier to the ignore list
    Ignore { bundle_id: String },
    /// Remove a bundle identifier from the ignore list
    Unignore { bundle_id: String },
}

#[derive(Debug)]
enum CliError {
    Init(InitError),
    App(AppError),
    Io(io::Error),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Init(e) => write!(f, "{e}"),
            CliError::App(e) => write!(f, "{e}"),
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl From<InitError> for CliError {
    fn from(e: InitError) -> Self {
        CliError::Init(e)
    }
}

impl From<AppError> for CliError {
    fn from(e: AppError) -> Self {
        CliError::App(e)
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}

fn main() -> ExitCode {
    logging::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("shelf: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let db_path = match args.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    let db = open_database(&db_path)?;
    let actions = native_actions();

    if let Command::Apps = args.command {
        let settings = settings::SettingsStore::load(Arc::clone(&db))?.snapshot();
        return list_apps(actions.as_ref(), &settings);
    }

    let orchestrator = Arc::new(build_orchestrator(&db, actions)?);

    match args.command {
        Command::Save => print_saved(&orchestrator.save()?),
        Command::Restore { now } => restore(&orchestrator, now)?,
        Command::Clear => {
            let outcome = orchestrator.clear_session();
            if outcome.cleared {
                println!("Cleared saved session");
            } else {
                println!("No saved session");
            }
            print_warning(outcome.persistence_warning);
        }
        Command::Status { json } => {
            let view = orchestrator.view();
            if json {
                let text = serde_json::to_string_pretty(&view).map_err(io::Error::from)?;
                println!("{text}");
            } else {
                print_status(&view);
            }
        }
        Command::Settings { action } => match action.unwrap_or(SettingsAction::Show) {
            SettingsAction::Show => print_settings(&orchestrator.settings().snapshot()),
            SettingsAction::Set { key, value } => {
                print_warning(orchestrator.set_setting(&key, &value)?);
                print_settings(&orchestrator.settings().snapshot());
            }
            SettingsAction::Ignore { bundle_id } => {
                print_warning(orchestrator.add_ignored_bundle_id(&bundle_id)?);
                print_settings(&orchestrator.settings().snapshot());
            }
            SettingsAction::Unignore { bundle_id } => {
                print_warning(orchestrator.remove_ignored_bundle_id(&bundle_id)?);
                print_settings(&orchestrator.settings().snapshot());
            }
        },
        Command::Serve => {
            let host = ControlHost::new(Arc::clone(&orchestrator), Box::new(io::stdout()));
            host.run(io::stdin().lock())?;
            // A delayed restore requested over the channel still runs once
            // input closes.
            orchestrator.timer().wait();
        }
        Command::Apps => {}
    }
    Ok(())
}

fn restore(orchestrator: &SessionOrchestrator, now: bool) -> Result<(), CliError> {
    if now {
        print_restored(&orchestrator.restore_now()?);
        return Ok(());
    }

    orchestrator.set_timer_listener(Arc::new(|notice: &TimerNotice| match notice {
        TimerNotice::Fired { report } => print_restored(report),
        TimerNotice::Failed { reason } => eprintln!("shelf: scheduled restore failed: {reason}"),
        TimerNotice::Started { .. }
        | TimerNotice::Tick { .. }
        | TimerNotice::Superseded
        | TimerNotice::Cancelled => {}
    }));

    match orchestrator.restore()? {
        RestoreOutcome::Restored(report) => print_restored(&report),
        RestoreOutcome::Scheduled { delay_secs } => {
            println!("Restoring in {delay_secs}s (Ctrl-C to cancel)");
            orchestrator.timer().wait();
        }
    }
    Ok(())
}

fn list_apps(actions: &dyn shelf_lib::platform::ProcessActions, settings: &Settings) -> Result<(), CliError> {
    let apps = actions
        .list_running_applications()
        .map_err(|e| AppError::EnumerationFailed { reason: e.to_string() })?;

    for app in dedup_by_identity(apps) {
        let reasons = exclusion_reasons(&app, settings);
        let marker = if reasons.is_empty() { "+" } else { "-" };
        let front = if app.is_frontmost { " *" } else { "" };
        let note = if reasons.is_empty() {
            String::new()
        } else {
            let reasons: Vec<_> = reasons.into_iter().map(ExclusionReason::as_str).collect();
            format!("  ({})", reasons.join(", "))
        };
        println!("{marker} {}{front}  [{}]{note}", app.display_name, app.identity());
    }
    Ok(())
}

fn print_failures(outcomes: &[AppOutcome]) {
    for outcome in outcomes {
        if let ActionStatus::Failed(reason) = &outcome.status {
            println!("  ! {}: {reason}", outcome.display_name);
        }
    }
}

fn print_warning(warning: Option<String>) {
    if let Some(warning) = warning {
        eprintln!("shelf: warning: {warning}");
    }
}

fn print_saved(outcome: &SaveOutcome) {
    if outcome.snapshot.is_empty() {
        println!("Nothing to save ({} excluded)", outcome.excluded);
        return;
    }
    println!(
        "Saved {} apps ({}), {} excluded, {} failed",
        outcome.snapshot.len(),
        outcome.action.verb(),
        outcome.excluded,
        outcome.failed()
    );
    print_failures(&outcome.outcomes);
    print_warning(outcome.persistence_warning.clone());
}

fn print_restored(report: &RestoreReport) {
    println!("Reopened {} apps, {} failed", report.opened(), report.failed());
    print_failures(&report.outcomes);
    print_warning(report.persistence_warning.clone());
}

fn print_status(view: &SessionView) {
    match (&view.session_label, &view.session_date) {
        (Some(label), Some(date)) => println!("Saved session: {label} ({date})"),
        (Some(label), None) => println!("Saved session: {label}"),
        (None, _) => println!("No saved session"),
    }
    if let Some(timer) = &view.timer_label {
        println!("Restore pending: {timer}");
    }
    print_settings(&view.settings);
}

fn print_settings(settings: &Settings) {
    let timer = settings
        .selected_timer_option
        .as_deref()
        .unwrap_or("(default)");
    let known = settings
        .selected_timer_option
        .as_deref()
        .and_then(TimerOption::from_label)
        .is_some();
    let ignored: Vec<&str> = settings
        .custom_ignored_bundle_ids
        .iter()
        .map(String::as_str)
        .collect();

    println!("{} = {}", settings::KEY_IGNORE_SYSTEM_APPS, settings.ignore_system_apps);
    println!(
        "{} = {}",
        settings::KEY_QUIT_APPS_INSTEAD_OF_HIDING,
        settings.quit_apps_instead_of_hiding
    );
    println!("{} = {}", settings::KEY_WAIT_BEFORE_RESTORE, settings.wait_before_restore);
    println!(
        "{} = {timer}{}",
        settings::KEY_SELECTED_TIMER_OPTION,
        if known { "" } else { " (10 seconds)" }
    );
    println!("{} = {}", settings::KEY_LAUNCH_AT_LOGIN, settings.launch_at_login);
    println!("{} = [{}]", settings::KEY_CUSTOM_IGNORED_BUNDLE_IDS, ignored.join(", "));
}
