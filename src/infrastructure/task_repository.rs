use crate::domain::models::Task;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_database;
use crate::infrastructure::task_mapper::{decode_task_json, encode_task_json};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait TaskRepository: Send + Sync {
    /// Tasks assigned to `owner_id`, ordered by date then insertion.
    fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Task>, InfraError>;
    fn get(&self, task_id: &str) -> Result<Option<Task>, InfraError>;
    fn insert(&self, task: &Task) -> Result<(), InfraError>;
    /// Returns `false` when no task with that id exists.
    fn update(&self, task: &Task) -> Result<bool, InfraError>;
    fn delete(&self, task_id: &str) -> Result<bool, InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteTaskRepository {
    db_path: PathBuf,
}

impl SqliteTaskRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_database(&self.db_path)
    }
}

impl TaskRepository for SqliteTaskRepository {
    fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Task>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, assigned_to, document FROM tasks
             WHERE assigned_to = ?1
             ORDER BY CASE WHEN json_valid(document) THEN json_extract(document, '$.date') END ASC,
                      rowid ASC",
        )?;
        let rows = statement
            .query_map(params![owner_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<(String, String, String)>, _>>()?;

        // One unreadable row must not hide the rest of the owner's tasks.
        let tasks = rows
            .into_iter()
            .filter_map(|(id, assigned_to, document)| {
                match decode_row(&id, &assigned_to, &document) {
                    Ok(task) => Some(task),
                    Err(error) => {
                        tracing::warn!(task_id = %id, owner_id, %error, "skipping unreadable task row");
                        None
                    }
                }
            })
            .collect();
        Ok(tasks)
    }

    fn get(&self, task_id: &str) -> Result<Option<Task>, InfraError> {
        let connection = self.connect()?;
        let row: Option<(String, String, String)> = connection
            .query_row(
                "SELECT id, assigned_to, document FROM tasks WHERE id = ?1",
                params![task_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        row.map(|(id, assigned_to, document)| decode_row(&id, &assigned_to, &document))
            .transpose()
    }

    fn insert(&self, task: &Task) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO tasks (id, assigned_to, document, written_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                task.id,
                task.assigned_to,
                encode_task_json(task)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn update(&self, task: &Task) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE tasks SET assigned_to = ?2, document = ?3, written_at = ?4 WHERE id = ?1",
            params![
                task.id,
                task.assigned_to,
                encode_task_json(task)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete(&self, task_id: &str) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
        Ok(changed > 0)
    }
}

// Older documents carry no owner field; the indexed column is authoritative.
fn decode_row(id: &str, assigned_to: &str, document: &str) -> Result<Task, InfraError> {
    let mut task = decode_task_json(id, document)?;
    if task.assigned_to.is_empty() {
        task.assigned_to = assigned_to.to_string();
    }
    Ok(task)
}

#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    tasks: Mutex<Vec<Task>>,
}

impl InMemoryTaskRepository {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Task>>, InfraError> {
        self.tasks
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("task store: {error}")))
    }
}

impl TaskRepository for InMemoryTaskRepository {
    fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Task>, InfraError> {
        let tasks = self.lock()?;
        let mut owned = tasks
            .iter()
            .filter(|task| task.assigned_to == owner_id)
            .cloned()
            .collect::<Vec<_>>();
        owned.sort_by(|left, right| left.date.cmp(&right.date));
        Ok(owned)
    }

    fn get(&self, task_id: &str) -> Result<Option<Task>, InfraError> {
        let tasks = self.lock()?;
        Ok(tasks.iter().find(|task| task.id == task_id).cloned())
    }

    fn insert(&self, task: &Task) -> Result<(), InfraError> {
        let mut tasks = self.lock()?;
        if tasks.iter().any(|existing| existing.id == task.id) {
            return Err(InfraError::InvalidInput(format!(
                "task {} already exists",
                task.id
            )));
        }
        tasks.push(task.clone());
        Ok(())
    }

    fn update(&self, task: &Task) -> Result<bool, InfraError> {
        let mut tasks = self.lock()?;
        let Some(existing) = tasks.iter_mut().find(|existing| existing.id == task.id) else {
            return Ok(false);
        };
        *existing = task.clone();
        Ok(true)
    }

    fn delete(&self, task_id: &str) -> Result<bool, InfraError> {
        let mut tasks = self.lock()?;
        let before = tasks.len();
        tasks.retain(|task| task.id != task_id);
        Ok(tasks.len() != before)
    }
}
