use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// The role of the participant that authored a [`Message`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human end-user.
    User,
    /// A specialist agent (report content, simulated dialogue turns).
    Agent,
    /// A system-level notice.
    System,
}

impl Role {
    /// Persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "agent" => Ok(Role::Agent),
            "system" => Ok(Role::System),
            other => Err(format!("unknown message role '{other}'")),
        }
    }
}

/// A single append-only message within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message.
    pub id: Uuid,
    /// The session this message belongs to.
    pub session_id: Uuid,
    /// Owner of the session.
    pub user_id: Uuid,
    /// The role of the message author.
    pub role: Role,
    /// The textual content of the message.
    pub content: String,
    /// Ordering key within the session.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Creates a new message stamped with the current time.
    pub fn new(session_id: Uuid, user_id: Uuid, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            user_id,
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Creates a new message with [`Role::User`].
    pub fn user(session_id: Uuid, user_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(session_id, user_id, Role::User, content)
    }

    /// Creates a new message with [`Role::Agent`].
    pub fn agent(session_id: Uuid, user_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(session_id, user_id, Role::Agent, content)
    }
}
