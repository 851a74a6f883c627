use crate::domain::profile::{Role, UserProfile};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_database;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait ProfileRepository: Send + Sync {
    fn get(&self, uid: &str) -> Result<Option<UserProfile>, InfraError>;
    /// Returns the stored profile, creating it as a member on first sight.
    fn ensure(&self, profile: &UserProfile) -> Result<UserProfile, InfraError>;
    fn set_role(&self, uid: &str, role: Role) -> Result<bool, InfraError>;
    fn list(&self) -> Result<Vec<UserProfile>, InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteProfileRepository {
    db_path: PathBuf,
}

impl SqliteProfileRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_database(&self.db_path)
    }
}

fn profile_from_row(
    uid: String,
    email: Option<String>,
    name: Option<String>,
    role_raw: String,
) -> Result<UserProfile, InfraError> {
    let role = Role::parse(&role_raw).map_err(|message| {
        InfraError::InvalidConfig(format!("invalid users.role for {uid}: {message}"))
    })?;
    Ok(UserProfile {
        uid,
        email,
        name,
        role,
    })
}

impl ProfileRepository for SqliteProfileRepository {
    fn get(&self, uid: &str) -> Result<Option<UserProfile>, InfraError> {
        let connection = self.connect()?;
        let row: Option<(String, Option<String>, Option<String>, String)> = connection
            .query_row(
                "SELECT uid, email, name, role FROM users WHERE uid = ?1",
                params![uid],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        row.map(|(uid, email, name, role)| profile_from_row(uid, email, name, role))
            .transpose()
    }

    fn ensure(&self, profile: &UserProfile) -> Result<UserProfile, InfraError> {
        profile.validate().map_err(InfraError::InvalidInput)?;
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO users (uid, email, name, role) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(uid) DO NOTHING",
            params![
                profile.uid,
                profile.email,
                profile.name,
                Role::Member.as_str()
            ],
        )?;
        drop(connection);
        self.get(&profile.uid)?
            .ok_or_else(|| InfraError::NotFound(format!("profile {}", profile.uid)))
    }

    fn set_role(&self, uid: &str, role: Role) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE users SET role = ?2 WHERE uid = ?1",
            params![uid, role.as_str()],
        )?;
        Ok(changed > 0)
    }

    fn list(&self) -> Result<Vec<UserProfile>, InfraError> {
        let connection = self.connect()?;
        let mut statement =
            connection.prepare("SELECT uid, email, name, role FROM users ORDER BY uid ASC")?;
        let rows = statement
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<(String, Option<String>, Option<String>, String)>, _>>()?;
        rows.into_iter()
            .map(|(uid, email, name, role)| profile_from_row(uid, email, name, role))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProfileRepository {
    profiles: Mutex<BTreeMap<String, UserProfile>>,
}

impl InMemoryProfileRepository {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, UserProfile>>, InfraError> {
        self.profiles
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("profile store: {error}")))
    }
}

impl ProfileRepository for InMemoryProfileRepository {
    fn get(&self, uid: &str) -> Result<Option<UserProfile>, InfraError> {
        Ok(self.lock()?.get(uid).cloned())
    }

    fn ensure(&self, profile: &UserProfile) -> Result<UserProfile, InfraError> {
        profile.validate().map_err(InfraError::InvalidInput)?;
        let mut profiles = self.lock()?;
        let stored = profiles
            .entry(profile.uid.clone())
            .or_insert_with(|| UserProfile {
                role: Role::Member,
                ..profile.clone()
            });
        Ok(stored.clone())
    }

    fn set_role(&self, uid: &str, role: Role) -> Result<bool, InfraError> {
        let mut profiles = self.lock()?;
        let Some(profile) = profiles.get_mut(uid) else {
            return Ok(false);
        };
        profile.role = role;
        Ok(true)
    }

    fn list(&self) -> Result<Vec<UserProfile>, InfraError> {
        Ok(self.lock()?.values().cloned().collect())
    }
}
