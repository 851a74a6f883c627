use crate::domain::clock::{parse_date, parse_time_of_day};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SUGGESTED_TASK_KINDS: [&str; 7] = [
    "Interview Support",
    "Assessment",
    "Training",
    "RUC",
    "JDC",
    "Mock Interview",
    "Project",
];

pub const SUGGESTED_TECHNOLOGIES: [&str; 4] = [
    "Java Full Stack",
    "QA Analyst",
    "Security Analyst",
    "iOS Developer",
];

pub const INTERVIEW_ROUNDS: [&str; 3] = ["Screening", "Technical", "Final"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    #[default]
    Scheduled,
    Done,
    NotDone,
    Rescheduled,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::Done => "Done",
            Self::NotDone => "Not Done",
            Self::Rescheduled => "Rescheduled",
            Self::Other(value) => value,
        }
    }

    /// Lenient parse used at the store boundary; unknown labels are kept verbatim.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Self::Scheduled,
            "done" => Self::Done,
            "not done" | "not_done" | "notdone" => Self::NotDone,
            "rescheduled" => Self::Rescheduled,
            _ => Self::Other(value.trim().to_string()),
        }
    }

    /// Strict parse for user input.
    pub fn parse_known(value: &str) -> Result<Self, String> {
        match Self::parse(value) {
            Self::Other(other) => Err(format!(
                "unsupported task status '{other}' (expected Scheduled, Done, Not Done or Rescheduled)"
            )),
            known => Ok(known),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for TaskStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<TaskStatus> for String {
    fn from(value: TaskStatus) -> Self {
        value.as_str().to_string()
    }
}

/// A task record after normalisation at the store boundary.
///
/// `date`, `in_time` and `out_time` stay as the raw strings the store holds;
/// only the schedule analyzer interprets them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub client: String,
    pub task: String,
    pub technology: String,
    pub date: String,
    pub in_time: String,
    pub out_time: String,
    pub status: TaskStatus,
    pub round: Option<String>,
    pub feedback: Option<String>,
    pub assigned_to: String,
    pub created_by: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn event_title(&self) -> String {
        format!("{} ({})", self.task, self.client)
    }

    pub fn apply_patch(&mut self, patch: &TaskPatch, now: DateTime<Utc>) {
        if let Some(client) = &patch.client {
            self.client = client.trim().to_string();
        }
        if let Some(task) = &patch.task {
            self.task = task.trim().to_string();
        }
        if let Some(technology) = &patch.technology {
            self.technology = technology.trim().to_string();
        }
        if let Some(date) = &patch.date {
            self.date = date.trim().to_string();
        }
        if let Some(in_time) = &patch.in_time {
            self.in_time = in_time.trim().to_string();
        }
        if let Some(out_time) = &patch.out_time {
            self.out_time = out_time.trim().to_string();
        }
        if let Some(status) = &patch.status {
            self.status = status.clone();
        }
        if let Some(round) = &patch.round {
            self.round = non_empty(round);
        }
        if let Some(feedback) = &patch.feedback {
            self.feedback = non_empty(feedback);
        }
        self.updated_at = Some(now);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskDraft {
    pub client: String,
    pub task: String,
    pub technology: String,
    pub date: String,
    pub in_time: String,
    pub out_time: String,
    pub round: Option<String>,
    pub feedback: Option<String>,
}

impl TaskDraft {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.client, "task.client")?;
        validate_non_empty(&self.task, "task.task")?;
        validate_non_empty(&self.technology, "task.technology")?;
        validate_date(&self.date, "task.date")?;
        validate_time(&self.in_time, "task.in_time")?;
        validate_time(&self.out_time, "task.out_time")?;
        Ok(())
    }

    pub fn into_task(self, id: String, owner_id: &str, now: DateTime<Utc>) -> Task {
        Task {
            id,
            client: self.client.trim().to_string(),
            task: self.task.trim().to_string(),
            technology: self.technology.trim().to_string(),
            date: self.date.trim().to_string(),
            in_time: self.in_time.trim().to_string(),
            out_time: self.out_time.trim().to_string(),
            status: TaskStatus::Scheduled,
            round: self.round.as_deref().and_then(non_empty),
            feedback: self.feedback.as_deref().and_then(non_empty),
            assigned_to: owner_id.to_string(),
            created_by: owner_id.to_string(),
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskPatch {
    pub client: Option<String>,
    pub task: Option<String>,
    pub technology: Option<String>,
    pub date: Option<String>,
    pub in_time: Option<String>,
    pub out_time: Option<String>,
    pub status: Option<TaskStatus>,
    pub round: Option<String>,
    pub feedback: Option<String>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(client) = &self.client {
            validate_non_empty(client, "task.client")?;
        }
        if let Some(task) = &self.task {
            validate_non_empty(task, "task.task")?;
        }
        if let Some(technology) = &self.technology {
            validate_non_empty(technology, "task.technology")?;
        }
        if let Some(date) = &self.date {
            validate_date(date, "task.date")?;
        }
        if let Some(in_time) = &self.in_time {
            validate_time(in_time, "task.in_time")?;
        }
        if let Some(out_time) = &self.out_time {
            validate_time(out_time, "task.out_time")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskFilter {
    pub search: Option<String>,
    pub status: Option<TaskStatus>,
    pub technology: Option<String>,
    /// `YYYY-MM`
    pub month: Option<String>,
}

impl TaskFilter {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(month) = &self.month {
            validate_date(&format!("{}-01", month.trim()), "filter.month")
                .map_err(|_| "filter.month must be YYYY-MM".to_string())?;
        }
        Ok(())
    }

    pub fn matches(&self, task: &Task) -> bool {
        let matches_search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|needle| !needle.is_empty())
            .is_none_or(|needle| {
                let needle = needle.to_lowercase();
                task.client.to_lowercase().contains(&needle)
                    || task.task.to_lowercase().contains(&needle)
            });
        let matches_status = self
            .status
            .as_ref()
            .is_none_or(|status| &task.status == status);
        let matches_technology = self
            .technology
            .as_deref()
            .is_none_or(|technology| task.technology == technology);
        let matches_month = self
            .month
            .as_deref()
            .is_none_or(|month| task.date.trim().starts_with(&format!("{}-", month.trim())));

        matches_search && matches_status && matches_technology && matches_month
    }

    /// Filters and orders tasks by date; equal dates keep their input order.
    pub fn apply(&self, tasks: Vec<Task>) -> Vec<Task> {
        let mut filtered = tasks
            .into_iter()
            .filter(|task| self.matches(task))
            .collect::<Vec<_>>();
        filtered.sort_by(|left, right| left.date.cmp(&right.date));
        filtered
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

fn validate_date(value: &str, field_name: &str) -> Result<(), String> {
    parse_date(value).map_err(|_| format!("{field_name} must be YYYY-MM-DD"))?;
    Ok(())
}

fn validate_time(value: &str, field_name: &str) -> Result<(), String> {
    parse_time_of_day(value).map_err(|_| format!("{field_name} must be HH:MM or hh:mm AM/PM"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_draft() -> TaskDraft {
        TaskDraft {
            client: "Acme Corp".to_string(),
            task: "Interview Support".to_string(),
            technology: "Java Full Stack".to_string(),
            date: "2026-03-02".to_string(),
            in_time: "11:00".to_string(),
            out_time: "12:00 PM".to_string(),
            round: Some("Technical".to_string()),
            feedback: None,
        }
    }

    fn sample_task(id: &str, date: &str, client: &str) -> Task {
        let mut draft = sample_draft();
        draft.date = date.to_string();
        draft.client = client.to_string();
        draft.into_task(id.to_string(), "member-1", fixed_time("2026-03-01T08:00:00Z"))
    }

    #[test]
    fn draft_validate_accepts_mixed_time_formats() {
        assert!(sample_draft().validate().is_ok());
    }

    #[test]
    fn draft_validate_rejects_bad_fields() {
        let mut draft = sample_draft();
        draft.client = "  ".to_string();
        assert!(draft.validate().is_err());

        let mut draft = sample_draft();
        draft.out_time = "half past".to_string();
        assert_eq!(
            draft.validate(),
            Err("task.out_time must be HH:MM or hh:mm AM/PM".to_string())
        );
    }

    #[test]
    fn draft_into_task_sets_ownership_and_status() {
        let now = fixed_time("2026-03-01T08:00:00Z");
        let task = sample_draft().into_task("tsk-1".to_string(), "member-1", now);

        assert_eq!(task.status, TaskStatus::Scheduled);
        assert_eq!(task.assigned_to, "member-1");
        assert_eq!(task.created_by, "member-1");
        assert_eq!(task.created_at, Some(now));
        assert_eq!(task.event_title(), "Interview Support (Acme Corp)");
    }

    #[test]
    fn patch_touches_only_provided_fields() {
        let mut task = sample_task("tsk-1", "2026-03-02", "Acme Corp");
        let later = fixed_time("2026-03-02T18:00:00Z");
        task.apply_patch(
            &TaskPatch {
                status: Some(TaskStatus::Done),
                feedback: Some("went well".to_string()),
                ..TaskPatch::default()
            },
            later,
        );

        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.feedback.as_deref(), Some("went well"));
        assert_eq!(task.client, "Acme Corp");
        assert_eq!(task.updated_at, Some(later));
    }

    #[test]
    fn status_parse_keeps_unknown_labels() {
        assert_eq!(TaskStatus::parse("Not Done"), TaskStatus::NotDone);
        assert_eq!(TaskStatus::parse(" done "), TaskStatus::Done);
        assert_eq!(
            TaskStatus::parse("Cancelled"),
            TaskStatus::Other("Cancelled".to_string())
        );
        assert!(TaskStatus::parse_known("Cancelled").is_err());
    }

    #[test]
    fn status_serializes_as_display_label() {
        let json = serde_json::to_string(&TaskStatus::NotDone).expect("serialize");
        assert_eq!(json, "\"Not Done\"");
        let parsed: TaskStatus = serde_json::from_str("\"Rescheduled\"").expect("deserialize");
        assert_eq!(parsed, TaskStatus::Rescheduled);
    }

    #[test]
    fn filter_matches_search_month_and_orders_by_date() {
        let tasks = vec![
            sample_task("a", "2026-03-09", "Globex"),
            sample_task("b", "2026-03-02", "Acme Corp"),
            sample_task("c", "2026-04-01", "Acme Corp"),
            sample_task("d", "2026-03-02", "Initech"),
        ];

        let filter = TaskFilter {
            month: Some("2026-03".to_string()),
            ..TaskFilter::default()
        };
        let ids = filter
            .apply(tasks.clone())
            .into_iter()
            .map(|task| task.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["b", "d", "a"]);

        let filter = TaskFilter {
            search: Some("acme".to_string()),
            ..TaskFilter::default()
        };
        let ids = filter
            .apply(tasks)
            .into_iter()
            .map(|task| task.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn filter_rejects_malformed_month() {
        let filter = TaskFilter {
            month: Some("March".to_string()),
            ..TaskFilter::default()
        };
        assert!(filter.validate().is_err());
    }
}
