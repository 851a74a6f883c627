use crate::application::bootstrap::bootstrap_workspace;
use crate::application::optimistic::{TaskListSession, TaskMutation};
use crate::application::schedule_watch::analyze_snapshot;
use crate::domain::clock::parse_date;
use crate::domain::models::{Task, TaskDraft, TaskFilter, TaskPatch};
use crate::domain::profile::{Role, UserProfile};
use crate::domain::schedule::{day_events, DayEvents, ScheduleAnalysis, ScheduleSettings};
use crate::infrastructure::config::{read_app_name, read_schedule_settings, save_work_hours};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::profile_repository::{ProfileRepository, SqliteProfileRepository};
use crate::infrastructure::task_feed::TaskFeedHub;
use crate::infrastructure::task_repository::{SqliteTaskRepository, TaskRepository};
use chrono::{NaiveDate, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

pub struct AppState {
    workspace_root: PathBuf,
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    app_name: String,
    feed: Arc<TaskFeedHub<SqliteTaskRepository>>,
    profiles: SqliteProfileRepository,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let app_name = read_app_name(&bootstrap.config_dir)?;
        let tasks = Arc::new(SqliteTaskRepository::new(&bootstrap.database_path));

        Ok(Self {
            workspace_root: bootstrap.workspace_root,
            config_dir: bootstrap.config_dir,
            profiles: SqliteProfileRepository::new(&bootstrap.database_path),
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            app_name,
            feed: Arc::new(TaskFeedHub::new(tasks)),
            log_guard: Mutex::new(()),
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Change feed over the task store; writers below refresh it after each mutation.
    pub fn feed(&self) -> &Arc<TaskFeedHub<SqliteTaskRepository>> {
        &self.feed
    }

    fn tasks(&self) -> &SqliteTaskRepository {
        self.feed.repository()
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn publish(&self, owner_id: &str) {
        if let Err(error) = self.feed.refresh(owner_id) {
            tracing::warn!(owner_id, %error, "task feed refresh failed after write");
        }
    }
}

pub fn ensure_profile_impl(
    state: &AppState,
    uid: String,
    email: Option<String>,
    name: Option<String>,
) -> Result<UserProfile, InfraError> {
    let profile = state.profiles.ensure(&UserProfile::first_sign_in(
        &uid,
        normalize_optional(email),
        normalize_optional(name),
    ))?;
    state.log_info(
        "ensure_profile",
        &format!("uid={} role={}", profile.uid, profile.role.as_str()),
    );
    Ok(profile)
}

pub fn set_role_impl(state: &AppState, uid: String, role: String) -> Result<UserProfile, InfraError> {
    let uid = required_id(&uid, "uid")?;
    let role = Role::parse(&role).map_err(InfraError::InvalidInput)?;
    if !state.profiles.set_role(uid, role)? {
        return Err(InfraError::NotFound(format!("profile {uid}")));
    }
    state.log_info("set_role", &format!("uid={uid} role={}", role.as_str()));
    state
        .profiles
        .get(uid)?
        .ok_or_else(|| InfraError::NotFound(format!("profile {uid}")))
}

/// Team members visible on the manager dashboard.
pub fn list_team_members_impl(state: &AppState, viewer: String) -> Result<Vec<UserProfile>, InfraError> {
    let viewer = resolve_viewer(state, &viewer)?;
    if !viewer.is_manager() {
        return Err(InfraError::Forbidden(format!(
            "{} is not a manager",
            viewer.uid
        )));
    }
    let members = state
        .profiles
        .list()?
        .into_iter()
        .filter(|profile| profile.role == Role::Member)
        .collect::<Vec<_>>();
    state.log_info(
        "list_team_members",
        &format!("viewer={} members={}", viewer.uid, members.len()),
    );
    Ok(members)
}

pub fn create_task_impl(state: &AppState, owner: String, draft: TaskDraft) -> Result<Task, InfraError> {
    let owner = required_id(&owner, "owner")?;
    draft.validate().map_err(InfraError::InvalidInput)?;

    store_new_task(state, owner, draft.into_task(next_id("tsk"), owner, Utc::now()))
}

fn store_new_task(state: &AppState, owner: &str, task: Task) -> Result<Task, InfraError> {
    state.tasks().insert(&task)?;
    state.publish(owner);

    state.log_info(
        "create_task",
        &format!("created task_id={} owner={owner}", task.id),
    );
    Ok(task)
}

/// A write issued through a [`TaskListSession`].
#[derive(Debug, Clone)]
pub enum TaskEdit {
    Create(TaskDraft),
    Update { task_id: String, patch: TaskPatch },
    Delete { task_id: String },
}

/// Opens an optimistic view over the acting user's own tasks.
pub async fn open_task_session_impl(
    state: &AppState,
    owner: String,
) -> Result<TaskListSession, InfraError> {
    let owner = required_id(&owner, "owner")?;
    TaskListSession::open(state.feed().as_ref(), owner).await
}

/// Shows `edit` in the session view, then writes it. Rejected writes are
/// rolled back out of the view. Deletions return `None`.
pub fn submit_task_edit_impl(
    state: &AppState,
    session: &mut TaskListSession,
    edit: TaskEdit,
) -> Result<Option<Task>, InfraError> {
    let owner = session.owner_id().to_string();
    match edit {
        TaskEdit::Create(draft) => {
            draft.validate().map_err(InfraError::InvalidInput)?;
            let task = draft.into_task(next_id("tsk"), &owner, Utc::now());
            let stored = task.clone();
            session
                .submit(TaskMutation::Create(task), || {
                    store_new_task(state, &owner, stored)
                })
                .map(Some)
        }
        TaskEdit::Update { task_id, patch } => {
            let mutation = TaskMutation::Update {
                task_id: task_id.clone(),
                patch: patch.clone(),
            };
            session
                .submit(mutation, || {
                    update_task_impl(state, owner.clone(), task_id, patch)
                })
                .map(Some)
        }
        TaskEdit::Delete { task_id } => {
            let mutation = TaskMutation::Delete {
                task_id: task_id.clone(),
            };
            session.submit(mutation, || {
                if delete_task_impl(state, owner.clone(), task_id.clone())? {
                    Ok(None)
                } else {
                    Err(InfraError::NotFound(format!("task {task_id}")))
                }
            })
        }
    }
}

pub fn update_task_impl(
    state: &AppState,
    owner: String,
    task_id: String,
    patch: TaskPatch,
) -> Result<Task, InfraError> {
    let owner = required_id(&owner, "owner")?;
    let task_id = required_id(&task_id, "task_id")?;
    if patch.is_empty() {
        return Err(InfraError::InvalidInput(
            "update must change at least one field".to_string(),
        ));
    }
    patch.validate().map_err(InfraError::InvalidInput)?;

    let mut task = owned_task(state, owner, task_id)?;
    task.apply_patch(&patch, Utc::now());
    if !state.tasks().update(&task)? {
        return Err(InfraError::NotFound(format!("task {task_id}")));
    }
    state.publish(owner);

    state.log_info("update_task", &format!("updated task_id={task_id}"));
    Ok(task)
}

pub fn delete_task_impl(state: &AppState, owner: String, task_id: String) -> Result<bool, InfraError> {
    let owner = required_id(&owner, "owner")?;
    let task_id = required_id(&task_id, "task_id")?;

    match state.tasks().get(task_id)? {
        None => return Ok(false),
        Some(task) if task.assigned_to != owner => {
            return Err(InfraError::Forbidden(format!(
                "task {task_id} is not assigned to {owner}"
            )));
        }
        Some(_) => {}
    }

    let removed = state.tasks().delete(task_id)?;
    if removed {
        state.publish(owner);
        state.log_info("delete_task", &format!("deleted task_id={task_id}"));
    }
    Ok(removed)
}

pub fn list_tasks_impl(
    state: &AppState,
    viewer: String,
    owner: String,
    filter: TaskFilter,
) -> Result<Vec<Task>, InfraError> {
    let owner = authorize_view(state, &viewer, &owner)?;
    filter.validate().map_err(InfraError::InvalidInput)?;
    let tasks = filter.apply(state.tasks().list_by_owner(&owner)?);
    state.log_info(
        "list_tasks",
        &format!("owner={owner} matched={}", tasks.len()),
    );
    Ok(tasks)
}

/// Free gaps and out-of-hours tasks for one owner's day.
pub fn compute_schedule_impl(
    state: &AppState,
    viewer: String,
    owner: String,
    date: String,
) -> Result<ScheduleAnalysis, InfraError> {
    let owner = authorize_view(state, &viewer, &owner)?;
    let date = parse_date_input(&date)?;
    let settings = read_schedule_settings(state.config_dir())?;
    let tasks = state.tasks().list_by_owner(&owner)?;

    let analysis = analyze_snapshot(&owner, &tasks, date, &settings)?;
    state.log_info(
        "compute_schedule",
        &format!(
            "owner={owner} date={date} gaps={} outside={} skipped={}",
            analysis.gaps.len(),
            analysis.outside.len(),
            analysis.diagnostics.len()
        ),
    );
    Ok(analysis)
}

pub fn day_timeline_impl(
    state: &AppState,
    viewer: String,
    owner: String,
    date: String,
) -> Result<DayEvents, InfraError> {
    let owner = authorize_view(state, &viewer, &owner)?;
    let date = parse_date_input(&date)?;
    let tasks = state.tasks().list_by_owner(&owner)?;
    let timeline = day_events(&tasks, date);
    state.log_info(
        "day_timeline",
        &format!("owner={owner} date={date} events={}", timeline.events.len()),
    );
    Ok(timeline)
}

pub fn schedule_settings_impl(state: &AppState) -> Result<ScheduleSettings, InfraError> {
    read_schedule_settings(state.config_dir())
}

pub fn set_work_hours_impl(
    state: &AppState,
    start: String,
    end: String,
) -> Result<ScheduleSettings, InfraError> {
    save_work_hours(state.config_dir(), &start, &end)?;
    let settings = read_schedule_settings(state.config_dir())?;
    state.log_info(
        "set_work_hours",
        &format!("work hours set to {}-{}", start.trim(), end.trim()),
    );
    Ok(settings)
}

/// Viewers are registered as members the first time they show up.
fn resolve_viewer(state: &AppState, viewer: &str) -> Result<UserProfile, InfraError> {
    let viewer = required_id(viewer, "viewer")?;
    match state.profiles.get(viewer)? {
        Some(profile) => Ok(profile),
        None => state
            .profiles
            .ensure(&UserProfile::first_sign_in(viewer, None, None)),
    }
}

fn authorize_view(state: &AppState, viewer: &str, owner: &str) -> Result<String, InfraError> {
    let owner = required_id(owner, "owner")?;
    let viewer = resolve_viewer(state, viewer)?;
    if !viewer.can_view(owner) {
        return Err(InfraError::Forbidden(format!(
            "{} may not view tasks of {owner}",
            viewer.uid
        )));
    }
    Ok(owner.to_string())
}

fn owned_task(state: &AppState, owner: &str, task_id: &str) -> Result<Task, InfraError> {
    let task = state
        .tasks()
        .get(task_id)?
        .ok_or_else(|| InfraError::NotFound(format!("task {task_id}")))?;
    if task.assigned_to != owner {
        return Err(InfraError::Forbidden(format!(
            "task {task_id} is not assigned to {owner}"
        )));
    }
    Ok(task)
}

fn required_id<'a>(value: &'a str, field_name: &str) -> Result<&'a str, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::InvalidInput(format!(
            "{field_name} must not be empty"
        )));
    }
    Ok(value)
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn parse_date_input(value: &str) -> Result<NaiveDate, InfraError> {
    parse_date(value).map_err(|_| InfraError::InvalidInput("date must be YYYY-MM-DD".to_string()))
}
