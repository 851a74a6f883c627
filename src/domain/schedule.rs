use crate::domain::clock::{format_duration, format_hhmm, parse_date, parse_time_of_day};
use crate::domain::models::Task;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MIN_GAP_MINUTES: i64 = 30;

pub fn default_work_start() -> NaiveTime {
    NaiveTime::MIN + Duration::hours(10)
}

pub fn default_work_end() -> NaiveTime {
    NaiveTime::MIN + Duration::hours(19)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("working window start {start} must be before end {end}")]
    InvalidWindow { start: String, end: String },
}

/// How the scan cursor moves past an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorPolicy {
    /// Cursor only moves forward and gaps never extend past the window end.
    #[default]
    Clamped,
    /// Cursor jumps to each event's end, even backwards; gaps are not clipped.
    Literal,
}

impl CursorPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "clamped" => Some(Self::Clamped),
            "literal" => Some(Self::Literal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSettings {
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub min_gap_minutes: i64,
    pub cursor_policy: CursorPolicy,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            work_start: default_work_start(),
            work_end: default_work_end(),
            min_gap_minutes: DEFAULT_MIN_GAP_MINUTES,
            cursor_policy: CursorPolicy::default(),
        }
    }
}

impl ScheduleSettings {
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.work_start >= self.work_end {
            return Err(ScheduleError::InvalidWindow {
                start: format_hhmm(self.work_start),
                end: format_hhmm(self.work_end),
            });
        }
        Ok(())
    }
}

/// A task placed on absolute start/end instants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub duration_minutes: i64,
    pub duration: String,
}

impl Gap {
    fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let duration_minutes = (end - start).num_minutes();
        Self {
            start,
            end,
            duration_minutes,
            duration: format_duration(duration_minutes),
        }
    }
}

/// A record that could not be placed on the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDiagnostic {
    pub task_id: String,
    pub field: String,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayEvents {
    pub events: Vec<Event>,
    pub diagnostics: Vec<RecordDiagnostic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleAnalysis {
    pub date: NaiveDate,
    pub gaps: Vec<Gap>,
    pub outside: Vec<Event>,
    pub diagnostics: Vec<RecordDiagnostic>,
}

pub fn project_event(task: &Task) -> Result<Event, RecordDiagnostic> {
    let diagnostic = |field: &str, value: &str, reason: String| RecordDiagnostic {
        task_id: task.id.clone(),
        field: field.to_string(),
        value: value.to_string(),
        reason,
    };

    let date = parse_date(&task.date).map_err(|reason| diagnostic("date", &task.date, reason))?;
    let start = parse_time_of_day(&task.in_time)
        .map_err(|reason| diagnostic("in_time", &task.in_time, reason))?;
    let end = parse_time_of_day(&task.out_time)
        .map_err(|reason| diagnostic("out_time", &task.out_time, reason))?;

    let start = date.and_time(start);
    let mut end = date.and_time(end);
    // out-time earlier than in-time means the task runs past midnight
    if end < start {
        end += Duration::days(1);
    }

    Ok(Event {
        id: task.id.clone(),
        title: task.event_title(),
        start,
        end,
    })
}

/// Events starting on `date`, ascending by start; ties keep snapshot order.
///
/// Diagnostics cover every unparseable record in `tasks`, not only those of `date`,
/// since a record with a broken date cannot be attributed to any day.
pub fn day_events(tasks: &[Task], date: NaiveDate) -> DayEvents {
    let mut result = DayEvents::default();
    for task in tasks {
        match project_event(task) {
            Ok(event) if event.start.date() == date => result.events.push(event),
            Ok(_) => {}
            Err(diagnostic) => result.diagnostics.push(diagnostic),
        }
    }
    result.events.sort_by_key(|event| event.start);
    result
}

pub fn compute_schedule(
    tasks: &[Task],
    date: NaiveDate,
    settings: &ScheduleSettings,
) -> Result<ScheduleAnalysis, ScheduleError> {
    settings.validate()?;

    let DayEvents {
        events,
        diagnostics,
    } = day_events(tasks, date);
    let work_start = date.and_time(settings.work_start);
    let work_end = date.and_time(settings.work_end);
    let min_gap = settings.min_gap_minutes;

    let mut gaps = Vec::new();
    let mut outside = Vec::new();
    let mut cursor = work_start;

    let mut push_gap = |start: NaiveDateTime, end: NaiveDateTime| {
        if (end - start).num_minutes() >= min_gap {
            gaps.push(Gap::new(start, end));
        }
    };

    for event in events {
        if event.start < work_start || event.end > work_end {
            outside.push(event.clone());
        }

        match settings.cursor_policy {
            CursorPolicy::Clamped => {
                let gap_end = event.start.min(work_end);
                if gap_end > cursor {
                    push_gap(cursor, gap_end);
                }
                cursor = cursor.max(event.end);
            }
            CursorPolicy::Literal => {
                if event.start > cursor {
                    push_gap(cursor, event.start);
                }
                cursor = event.end;
            }
        }
    }

    if cursor < work_end {
        push_gap(cursor, work_end);
    }

    Ok(ScheduleAnalysis {
        date,
        gaps,
        outside,
        diagnostics,
    })
}
