use crate::roles::{Capability, Role, role_allowed};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Username/password pair posted to the token endpoint
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Access/refresh pair returned by a successful login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Body of the token refresh call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// Response of the token refresh call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
}

/// New-account payload
#[derive(Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role_id: i64,
    pub department_id: i64,
}

impl fmt::Debug for RegistrationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("role_id", &self.role_id)
            .field("department_id", &self.department_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentRef {
    pub id: i64,
    pub name: String,
}

/// Personal details attached to a user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
}

/// Profile of the signed-in user, as returned by `GET /users/me/`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<RoleRef>,
    #[serde(default)]
    pub department: Option<DepartmentRef>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_info: Option<UserInfo>,
}

impl UserProfile {
    /// The user's role, if the backend sent one
    pub fn role(&self) -> Option<Role> {
        self.role.as_ref().map(|r| Role::from_name(&r.name))
    }

    /// Check a UI capability against the user's role
    ///
    /// A user without a role still gets the capabilities open to everyone.
    pub fn can(&self, capability: Capability) -> bool {
        self.role()
            .unwrap_or_else(|| Role::Other(String::new()))
            .can(capability)
    }

    /// Check the user's role against an allow-list; an empty list admits everyone
    pub fn has_any_role(&self, allowed: &[Role]) -> bool {
        if allowed.is_empty() {
            return true;
        }
        self.role().is_some_and(|role| role_allowed(&role, allowed))
    }
}

/// Compact user representation used in chat payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A user reference that the backend may send either expanded or as a bare id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Summary(UserSummary),
    Id(i64),
}

impl UserRef {
    pub fn id(&self) -> i64 {
        match self {
            Self::Summary(user) => user.id,
            Self::Id(id) => *id,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Summary(user) => Some(&user.username),
            Self::Id(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    #[serde(default)]
    pub conversation: Option<i64>,
    #[serde(default)]
    pub sender: Option<UserRef>,
    pub content: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    #[serde(default)]
    pub participants: Vec<UserRef>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Usernames of the other participants
    pub fn other_participants(&self, me: i64) -> Vec<String> {
        self.participants
            .iter()
            .filter(|p| p.id() != me)
            .map(|p| {
                p.username()
                    .map_or_else(|| format!("user #{}", p.id()), str::to_string)
            })
            .collect()
    }
}

/// List endpoints answer either with a bare array or a paginated envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Paginated {
        results: Vec<T>,
        #[serde(default)]
        count: Option<u64>,
    },
    Plain(Vec<T>),
}

impl<T> Listing<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Paginated { results, .. } => results,
            Self::Plain(items) => items,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    pub conversation: i64,
    pub sender_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkReadRequest {
    pub conversation_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindByUsernameRequest {
    pub username: String,
}
