use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Manager,
    #[default]
    Member,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Member => "member",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manager" => Ok(Self::Manager),
            "member" => Ok(Self::Member),
            other => Err(format!("unsupported role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub uid: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Role,
}

impl UserProfile {
    /// Profile written the first time an identity is seen.
    pub fn first_sign_in(uid: &str, email: Option<String>, name: Option<String>) -> Self {
        Self {
            uid: uid.trim().to_string(),
            email,
            name,
            role: Role::Member,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.uid.trim().is_empty() {
            return Err("profile.uid must not be empty".to_string());
        }
        Ok(())
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or(self.email.as_deref())
            .unwrap_or(self.uid.as_str())
    }

    pub fn is_manager(&self) -> bool {
        self.role == Role::Manager
    }

    /// Members see only their own tasks; managers see anyone's.
    pub fn can_view(&self, owner_id: &str) -> bool {
        self.uid == owner_id || self.is_manager()
    }
}
