use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use teamcal::application::commands::{
    compute_schedule_impl, day_timeline_impl, delete_task_impl, ensure_profile_impl,
    list_tasks_impl, list_team_members_impl, open_task_session_impl, schedule_settings_impl,
    set_role_impl, set_work_hours_impl, submit_task_edit_impl, AppState, TaskEdit,
};
use teamcal::application::schedule_watch::ScheduleWatcher;
use teamcal::domain::clock::{format_hhmm, parse_date};
use teamcal::domain::models::{Task, TaskDraft, TaskFilter, TaskPatch, TaskStatus};
use teamcal::domain::schedule::{DayEvents, ScheduleAnalysis};
use teamcal::infrastructure::error::InfraError;

/// Team task scheduling with daily free-slot analysis
#[derive(Parser, Debug)]
#[command(name = "teamcal", version, about)]
struct Cli {
    /// Workspace holding config/, state/ and logs/
    #[arg(long, global = true, env = "TEAMCAL_WORKSPACE")]
    workspace: Option<PathBuf>,
    /// Acting user id
    #[arg(long = "as", global = true, env = "TEAMCAL_USER")]
    viewer: Option<String>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    verbose: bool,
    #[arg(long, short, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the workspace layout and default config files
    Init,
    /// Register the acting user (as a member on first sight) and show the profile
    Whoami {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Set a user's role (`manager` or `member`)
    Role { uid: String, role: String },
    /// List team members (managers only)
    Members,
    /// Add a task for the acting user
    Add(AddArgs),
    /// List tasks, optionally filtered
    List(ListArgs),
    /// Change fields of an existing task
    Edit(EditArgs),
    /// Delete a task
    Delete { task_id: String },
    /// Free gaps and out-of-hours tasks for one day
    Schedule(DayArgs),
    /// Tasks of one day in start order
    Timeline(DayArgs),
    /// Recompute the schedule whenever the owner's tasks change
    Watch {
        #[command(flatten)]
        day: DayArgs,
        /// Store polling interval in seconds
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },
    /// Show or change schedule settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Set the working window, e.g. `work-hours 09:30 18:00`
    WorkHours { start: String, end: String },
}

#[derive(Args, Debug)]
struct AddArgs {
    #[arg(long)]
    client: String,
    #[arg(long)]
    task: String,
    #[arg(long)]
    technology: String,
    /// YYYY-MM-DD
    #[arg(long)]
    date: String,
    /// HH:MM or hh:mm AM/PM
    #[arg(long = "in")]
    in_time: String,
    #[arg(long = "out")]
    out_time: String,
    #[arg(long)]
    round: Option<String>,
    #[arg(long)]
    feedback: Option<String>,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Whose tasks to list; defaults to the acting user
    #[arg(long)]
    owner: Option<String>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long, value_parser = TaskStatus::parse_known)]
    status: Option<TaskStatus>,
    #[arg(long)]
    technology: Option<String>,
    /// YYYY-MM
    #[arg(long)]
    month: Option<String>,
}

#[derive(Args, Debug)]
struct EditArgs {
    task_id: String,
    #[arg(long)]
    client: Option<String>,
    #[arg(long)]
    task: Option<String>,
    #[arg(long)]
    technology: Option<String>,
    #[arg(long)]
    date: Option<String>,
    #[arg(long = "in")]
    in_time: Option<String>,
    #[arg(long = "out")]
    out_time: Option<String>,
    #[arg(long, value_parser = TaskStatus::parse_known)]
    status: Option<TaskStatus>,
    #[arg(long)]
    round: Option<String>,
    #[arg(long)]
    feedback: Option<String>,
}

#[derive(Args, Debug)]
struct DayArgs {
    #[arg(long)]
    owner: Option<String>,
    /// YYYY-MM-DD, defaults to today
    #[arg(long)]
    date: Option<String>,
}

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("teamcal error: failed to start runtime: {error}");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("teamcal error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let workspace = match cli.workspace.clone() {
        Some(path) => path,
        None => std::env::current_dir().context("failed to resolve current directory")?,
    };
    let state = AppState::new(workspace.clone())
        .with_context(|| format!("failed to open workspace {}", workspace.display()))?;
    let output = Output { json: cli.json };

    match cli.command {
        Command::Init => {
            state.log_info("init", "workspace ready");
            output.text(&format!(
                "{} workspace ready at {}",
                state.app_name(),
                state.workspace_root().display()
            ));
        }
        Command::Whoami { email, name } => {
            let uid = viewer(&cli.viewer)?;
            let profile = finish(&state, "ensure_profile", ensure_profile_impl(&state, uid, email, name))?;
            output.emit(&profile, || {
                format!("{} ({}) role={}", profile.display_name(), profile.uid, profile.role.as_str())
            });
        }
        Command::Role { uid, role } => {
            let profile = finish(&state, "set_role", set_role_impl(&state, uid, role))?;
            output.emit(&profile, || format!("{} is now {}", profile.uid, profile.role.as_str()));
        }
        Command::Members => {
            let members = finish(
                &state,
                "list_team_members",
                list_team_members_impl(&state, viewer(&cli.viewer)?),
            )?;
            output.emit(&members, || {
                members
                    .iter()
                    .map(|member| format!("{}\t{}", member.uid, member.display_name()))
                    .collect::<Vec<_>>()
                    .join("\n")
            });
        }
        Command::Add(args) => {
            let draft = TaskDraft {
                client: args.client,
                task: args.task,
                technology: args.technology,
                date: args.date,
                in_time: args.in_time,
                out_time: args.out_time,
                round: args.round,
                feedback: args.feedback,
            };
            let mut session = finish(
                &state,
                "open_task_session",
                open_task_session_impl(&state, viewer(&cli.viewer)?).await,
            )?;
            let task = finish(
                &state,
                "create_task",
                submit_task_edit_impl(&state, &mut session, TaskEdit::Create(draft)),
            )?
            .context("task write returned no task")?;
            output.emit(&task, || format!("created {}", task_line(&task)));
        }
        Command::List(args) => {
            let viewer = viewer(&cli.viewer)?;
            let owner = args.owner.unwrap_or_else(|| viewer.clone());
            let filter = TaskFilter {
                search: args.search,
                status: args.status,
                technology: args.technology,
                month: args.month,
            };
            let tasks = finish(&state, "list_tasks", list_tasks_impl(&state, viewer, owner, filter))?;
            output.emit(&tasks, || {
                tasks.iter().map(task_line).collect::<Vec<_>>().join("\n")
            });
        }
        Command::Edit(args) => {
            let patch = TaskPatch {
                client: args.client,
                task: args.task,
                technology: args.technology,
                date: args.date,
                in_time: args.in_time,
                out_time: args.out_time,
                status: args.status,
                round: args.round,
                feedback: args.feedback,
            };
            let mut session = finish(
                &state,
                "open_task_session",
                open_task_session_impl(&state, viewer(&cli.viewer)?).await,
            )?;
            let edit = TaskEdit::Update {
                task_id: args.task_id,
                patch,
            };
            let task = finish(
                &state,
                "update_task",
                submit_task_edit_impl(&state, &mut session, edit),
            )?
            .context("task write returned no task")?;
            output.emit(&task, || format!("updated {}", task_line(&task)));
        }
        Command::Delete { task_id } => {
            let removed = finish(
                &state,
                "delete_task",
                delete_task_impl(&state, viewer(&cli.viewer)?, task_id.clone()),
            )?;
            output.emit(&removed, || {
                if removed {
                    format!("deleted {task_id}")
                } else {
                    format!("no task {task_id}")
                }
            });
        }
        Command::Schedule(day) => {
            let (viewer, owner) = viewer_and_owner(&cli.viewer, day.owner)?;
            let date = day.date.unwrap_or_else(today);
            let analysis = finish(
                &state,
                "compute_schedule",
                compute_schedule_impl(&state, viewer, owner, date),
            )?;
            output.emit(&analysis, || render_analysis(&analysis));
        }
        Command::Timeline(day) => {
            let (viewer, owner) = viewer_and_owner(&cli.viewer, day.owner)?;
            let date = day.date.unwrap_or_else(today);
            let timeline = finish(
                &state,
                "day_timeline",
                day_timeline_impl(&state, viewer, owner, date),
            )?;
            output.emit(&timeline, || render_timeline(&timeline));
        }
        Command::Watch { day, interval } => {
            let (viewer, owner) = viewer_and_owner(&cli.viewer, day.owner)?;
            let date = day.date.unwrap_or_else(today);
            // Runs the access check and prints the first result.
            let analysis = finish(
                &state,
                "compute_schedule",
                compute_schedule_impl(&state, viewer, owner.clone(), date.clone()),
            )?;
            let date = parse_date(&date).map_err(anyhow::Error::msg)?;
            watch(&state, &owner, date, Duration::from_secs(interval.max(1)), &output, analysis)
                .await?;
        }
        Command::Config { action } => {
            let settings = match action {
                Some(ConfigAction::WorkHours { start, end }) => {
                    finish(&state, "set_work_hours", set_work_hours_impl(&state, start, end))?
                }
                None => finish(&state, "schedule_settings", schedule_settings_impl(&state))?,
            };
            output.emit(&settings, || {
                format!(
                    "work hours {}-{}, min gap {}m, cursor policy {:?}",
                    format_hhmm(settings.work_start),
                    format_hhmm(settings.work_end),
                    settings.min_gap_minutes,
                    settings.cursor_policy
                )
            });
        }
    }

    Ok(())
}

async fn watch(
    state: &AppState,
    owner: &str,
    date: NaiveDate,
    every: Duration,
    output: &Output,
    first: ScheduleAnalysis,
) -> Result<()> {
    let settings = schedule_settings_impl(state)?;
    let feed = state.feed();
    let mut watcher = ScheduleWatcher::spawn(feed.as_ref(), owner, date, settings).await?;
    let poller = feed.spawn_polling(owner, every);
    tracing::info!(owner, %date, "watching schedule");

    output.emit(&first, || render_analysis(&first));
    while let Some(analysis) = watcher.changed().await {
        output.emit(&analysis, || render_analysis(&analysis));
    }

    poller.abort();
    Ok(())
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("TEAMCAL_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

fn finish<T>(state: &AppState, command: &str, result: Result<T, InfraError>) -> Result<T> {
    result.map_err(|error| anyhow::anyhow!(state.command_error(command, &error)))
}

fn viewer(viewer: &Option<String>) -> Result<String> {
    viewer
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .context("no acting user; pass --as <uid> or set TEAMCAL_USER")
}

fn viewer_and_owner(viewer_arg: &Option<String>, owner: Option<String>) -> Result<(String, String)> {
    let viewer = viewer(viewer_arg)?;
    let owner = owner.unwrap_or_else(|| viewer.clone());
    Ok((viewer, owner))
}

fn today() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

struct Output {
    json: bool,
}

impl Output {
    fn emit<T, F>(&self, value: &T, text: F)
    where
        T: Serialize,
        F: FnOnce() -> String,
    {
        if self.json {
            match serde_json::to_string_pretty(value) {
                Ok(json) => println!("{json}"),
                Err(error) => eprintln!("teamcal error: failed to encode output: {error}"),
            }
        } else {
            self.text(&text());
        }
    }

    fn text(&self, line: &str) {
        if !line.is_empty() {
            println!("{line}");
        }
    }
}

fn task_line(task: &Task) -> String {
    format!(
        "{}\t{} {}-{}\t{}\t{}",
        task.id,
        task.date,
        task.in_time,
        task.out_time,
        task.event_title(),
        task.status
    )
}

fn render_analysis(analysis: &ScheduleAnalysis) -> String {
    let mut lines = vec![format!("Free slots on {}", analysis.date)];
    if analysis.gaps.is_empty() {
        lines.push("  none".to_string());
    }
    for gap in &analysis.gaps {
        lines.push(format!(
            "  {} - {}  ({})",
            format_hhmm(gap.start.time()),
            format_hhmm(gap.end.time()),
            gap.duration
        ));
    }
    if !analysis.outside.is_empty() {
        lines.push("Outside working hours".to_string());
        for event in &analysis.outside {
            lines.push(format!(
                "  {} - {}  {}",
                format_hhmm(event.start.time()),
                format_hhmm(event.end.time()),
                event.title
            ));
        }
    }
    if !analysis.diagnostics.is_empty() {
        lines.push(format!("Skipped {} unreadable task(s)", analysis.diagnostics.len()));
    }
    lines.join("\n")
}

fn render_timeline(timeline: &DayEvents) -> String {
    timeline
        .events
        .iter()
        .map(|event| {
            format!(
                "{} - {}  {}",
                format_hhmm(event.start.time()),
                format_hhmm(event.end.time()),
                event.title
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
