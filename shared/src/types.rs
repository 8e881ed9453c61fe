use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Note stored on a log entry when the caller does not supply one.
pub const DEFAULT_LOG_NOTE: &str = "No description provided";
/// `from` value of the entry written when a lead is created.
pub const CREATION_LOG_FROM: &str = "-";

// ========== STATUS ==========
/// Stage of a lead in the sales pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Status {
    #[default]
    #[serde(rename = "New")]
    New,
    #[serde(rename = "Contacted")]
    Contacted,
    #[serde(rename = "Meeting Scheduled")]
    MeetingScheduled,
    #[serde(rename = "Quote Issued")]
    QuoteIssued,
    #[serde(rename = "Quote Revised")]
    QuoteRevised,
    #[serde(rename = "Under Negotiation")]
    UnderNegotiation,
    #[serde(rename = "Tried To Connect")]
    TriedToConnect,
    #[serde(rename = "Future Project")]
    FutureProject,
    #[serde(rename = "Forwarded")]
    Forwarded,
    #[serde(rename = "Won")]
    Won,
    #[serde(rename = "Lost")]
    Lost,
}

impl Status {
    pub const ALL: [Status; 11] = [
        Status::New,
        Status::Contacted,
        Status::MeetingScheduled,
        Status::QuoteIssued,
        Status::QuoteRevised,
        Status::UnderNegotiation,
        Status::TriedToConnect,
        Status::FutureProject,
        Status::Forwarded,
        Status::Won,
        Status::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::New => "New",
            Status::Contacted => "Contacted",
            Status::MeetingScheduled => "Meeting Scheduled",
            Status::QuoteIssued => "Quote Issued",
            Status::QuoteRevised => "Quote Revised",
            Status::UnderNegotiation => "Under Negotiation",
            Status::TriedToConnect => "Tried To Connect",
            Status::FutureProject => "Future Project",
            Status::Forwarded => "Forwarded",
            Status::Won => "Won",
            Status::Lost => "Lost",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

// ========== DISTRICT ==========
/// Administrative region a lead is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum District {
    Thiruvananthapuram,
    Kollam,
    Pathanamthitta,
    Alappuzha,
    Kottayam,
    Idukki,
    Ernakulam,
    Thrissur,
    Palakkad,
    Malappuram,
    Kozhikode,
    Wayanad,
    Kannur,
    Kasaragod,
}

impl District {
    pub const ALL: [District; 14] = [
        District::Thiruvananthapuram,
        District::Kollam,
        District::Pathanamthitta,
        District::Alappuzha,
        District::Kottayam,
        District::Idukki,
        District::Ernakulam,
        District::Thrissur,
        District::Palakkad,
        District::Malappuram,
        District::Kozhikode,
        District::Wayanad,
        District::Kannur,
        District::Kasaragod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            District::Thiruvananthapuram => "Thiruvananthapuram",
            District::Kollam => "Kollam",
            District::Pathanamthitta => "Pathanamthitta",
            District::Alappuzha => "Alappuzha",
            District::Kottayam => "Kottayam",
            District::Idukki => "Idukki",
            District::Ernakulam => "Ernakulam",
            District::Thrissur => "Thrissur",
            District::Palakkad => "Palakkad",
            District::Malappuram => "Malappuram",
            District::Kozhikode => "Kozhikode",
            District::Wayanad => "Wayanad",
            District::Kannur => "Kannur",
            District::Kasaragod => "Kasaragod",
        }
    }
}

impl fmt::Display for District {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for District {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        District::ALL
            .into_iter()
            .find(|district| district.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

// ========== ROLE ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Returned when a string names none of a closed set of values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{0}` is not a valid value")]
pub struct UnknownVariant(pub String);

// ========== LEAD ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LogEntry {
    pub from: String,
    pub to: String,
    pub note: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    #[serde(rename = "_id")]
    pub lead_id: String,
    #[serde(rename = "userId")]
    pub owner_user_id: String,
    pub business: String,
    pub contact: String,
    pub status: Status,
    pub location: String,
    pub district: District,
    /// Most recent first.
    pub logs: Vec<LogEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

#[derive(Debug, Deserialize, Default)]
pub struct CreateLeadRequest {
    pub business: Option<String>,
    pub contact: Option<String>,
    pub status: Option<String>,
    pub location: Option<String>,
    pub district: Option<String>,
}

/// Partial update; an absent field leaves the stored value untouched.
#[derive(Debug, Deserialize, Default)]
pub struct UpdateLeadRequest {
    pub business: Option<String>,
    pub contact: Option<String>,
    pub status: Option<String>,
    pub location: Option<String>,
    pub district: Option<String>,
    pub note: Option<String>,
    pub version: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AddLogRequest {
    pub from: Option<String>,
    pub to: Option<String>,
    pub note: Option<String>,
}

// ========== USER ==========
/// Stored user profile. Credentials live with the credential provider.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

#[derive(Debug, Deserialize, Default)]
pub struct CreateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// Fields returned from user creation and update.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct UserSummary {
    #[serde(rename = "_id")]
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}
