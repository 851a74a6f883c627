use crate::domain::models::{Task, TaskStatus};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Stored task document. Every field is optional because the store enforces no schema;
/// `title` is the legacy name of `client`. Fields are read leniently: scalars of the
/// wrong type become their text form, anything else reads as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDocument {
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub client: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub task: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub technology: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub in_time: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub out_time: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub round: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub feedback: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub assigned_to: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_by: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<String>,
}

pub fn encode_task(task: &Task) -> TaskDocument {
    TaskDocument {
        client: Some(task.client.clone()),
        title: None,
        task: Some(task.task.clone()),
        technology: Some(task.technology.clone()),
        date: Some(task.date.clone()),
        in_time: Some(task.in_time.clone()),
        out_time: Some(task.out_time.clone()),
        status: Some(task.status.as_str().to_string()),
        round: task.round.clone(),
        feedback: task.feedback.clone(),
        assigned_to: Some(task.assigned_to.clone()),
        created_by: Some(task.created_by.clone()),
        created_at: task.created_at.map(|value| value.to_rfc3339()),
        updated_at: task.updated_at.map(|value| value.to_rfc3339()),
    }
}

/// Normalises a stored document into a [`Task`].
///
/// Only the identifier is required. Missing strings become empty, a missing status
/// reads as `Scheduled`, and timestamps that do not parse are dropped.
pub fn decode_task(id: &str, document: &TaskDocument) -> Result<Task, InfraError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(InfraError::InvalidInput(
            "task document id must not be empty".to_string(),
        ));
    }

    let client = trimmed(document.client.as_deref())
        .or_else(|| trimmed(document.title.as_deref()))
        .unwrap_or_default();

    let status = trimmed(document.status.as_deref())
        .map(|value| TaskStatus::parse(&value))
        .unwrap_or_default();

    Ok(Task {
        id: id.to_string(),
        client,
        task: text(document.task.as_deref()),
        technology: text(document.technology.as_deref()),
        date: text(document.date.as_deref()),
        in_time: text(document.in_time.as_deref()),
        out_time: text(document.out_time.as_deref()),
        status,
        round: trimmed(document.round.as_deref()),
        feedback: trimmed(document.feedback.as_deref()),
        assigned_to: text(document.assigned_to.as_deref()),
        created_by: text(document.created_by.as_deref()),
        created_at: document.created_at.as_deref().and_then(parse_timestamp),
        updated_at: document.updated_at.as_deref().and_then(parse_timestamp),
    })
}

pub fn decode_task_json(id: &str, raw: &str) -> Result<Task, InfraError> {
    let document: TaskDocument = serde_json::from_str(raw)?;
    decode_task(id, &document)
}

pub fn encode_task_json(task: &Task) -> Result<String, InfraError> {
    Ok(serde_json::to_string(&encode_task(task))?)
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(value) => Some(value),
        serde_json::Value::Number(value) => Some(value.to_string()),
        serde_json::Value::Bool(value) => Some(value.to_string()),
        serde_json::Value::Null | serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
    })
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn text(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|value| value.with_timezone(&Utc))
}
