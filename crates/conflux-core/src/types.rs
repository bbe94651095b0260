use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Declares a UUIDv7 newtype id: time-sortable, useful for log correlation
/// and cheap "created before/after" comparisons without a timestamp column.
macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }
    };
}

uuid_id!(UserId);
uuid_id!(ChatId);
uuid_id!(MessageId);
uuid_id!(ThreadId);
uuid_id!(FileId);
uuid_id!(FileLinkId);
uuid_id!(FileGroupId);
uuid_id!(ConferenceId);
uuid_id!(SeriesId);

/// Random (v4, not time-sortable) opaque token for share links — deliberately
/// not time-ordered so a leaked token can't be used to guess neighboring ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareToken(pub String);

impl ShareToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string().replace('-', ""))
    }
}

impl Default for ShareToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ShareToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-chat strictly increasing message sequence number. Newtype so it can't
/// be confused with a plain row count or a timestamp at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeqNum(pub i64);

impl SeqNum {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Global account role, issued by the (external) identity system.
///
/// Distinct from `ParticipantRole`, which is scoped to a single chat — a user
/// can be a chat `admin` while holding the global `user` role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Owner,
    Moderator,
    #[default]
    User,
    Guest,
}

impl UserRole {
    pub fn is_guest(&self) -> bool {
        matches!(self, UserRole::Guest)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UserRole::Owner => "owner",
            UserRole::Moderator => "moderator",
            UserRole::User => "user",
            UserRole::Guest => "guest",
        };
        write!(f, "{s}")
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(UserRole::Owner),
            "moderator" => Ok(UserRole::Moderator),
            "user" => Ok(UserRole::User),
            "guest" => Ok(UserRole::Guest),
            other => Err(format!("unknown user role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Direct,
    Group,
    Channel,
}

impl fmt::Display for ChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChatType::Direct => "direct",
            ChatType::Group => "group",
            ChatType::Channel => "channel",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ChatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(ChatType::Direct),
            "group" => Ok(ChatType::Group),
            "channel" => Ok(ChatType::Channel),
            other => Err(format!("unknown chat type: {other}")),
        }
    }
}

/// Role of a user within one chat (not the global `UserRole`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Admin,
    Member,
    Viewer,
}

impl ParticipantRole {
    /// `admin` and `member` can write messages; `viewer` cannot.
    pub fn can_write(&self) -> bool {
        matches!(self, ParticipantRole::Admin | ParticipantRole::Member)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, ParticipantRole::Admin)
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParticipantRole::Admin => "admin",
            ParticipantRole::Member => "member",
            ParticipantRole::Viewer => "viewer",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ParticipantRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(ParticipantRole::Admin),
            "member" => Ok(ParticipantRole::Member),
            "viewer" => Ok(ParticipantRole::Viewer),
            other => Err(format!("unknown participant role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadType {
    User,
    System,
}

impl fmt::Display for ThreadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThreadType::User => "user",
            ThreadType::System => "system",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ThreadType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ThreadType::User),
            "system" => Ok(ThreadType::System),
            other => Err(format!("unknown thread type: {other}")),
        }
    }
}

/// Maximum thread nesting depth.
pub const MAX_THREAD_DEPTH: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Active,
    Deleted,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStatus::Active => "active",
            FileStatus::Deleted => "deleted",
        };
        write!(f, "{s}")
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(FileStatus::Active),
            "deleted" => Ok(FileStatus::Deleted),
            other => Err(format!("unknown file status: {other}")),
        }
    }
}

/// Result of a file access check — the supremum over group and individual
/// permission grants. Ordered so `access >= FileAccess::Read` reads naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAccess {
    None,
    Read,
    Delete,
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConferenceStatus {
    Scheduled,
    Active,
    Ended,
    Cancelled,
}

impl fmt::Display for ConferenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConferenceStatus::Scheduled => "scheduled",
            ConferenceStatus::Active => "active",
            ConferenceStatus::Ended => "ended",
            ConferenceStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ConferenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(ConferenceStatus::Scheduled),
            "active" => Ok(ConferenceStatus::Active),
            "ended" => Ok(ConferenceStatus::Ended),
            "cancelled" => Ok(ConferenceStatus::Cancelled),
            other => Err(format!("unknown conference status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConferenceEventType {
    Adhoc,
    AdhocChat,
    Scheduled,
    Recurring,
}

impl fmt::Display for ConferenceEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConferenceEventType::Adhoc => "adhoc",
            ConferenceEventType::AdhocChat => "adhoc_chat",
            ConferenceEventType::Scheduled => "scheduled",
            ConferenceEventType::Recurring => "recurring",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ConferenceEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "adhoc" => Ok(ConferenceEventType::Adhoc),
            "adhoc_chat" => Ok(ConferenceEventType::AdhocChat),
            "scheduled" => Ok(ConferenceEventType::Scheduled),
            "recurring" => Ok(ConferenceEventType::Recurring),
            other => Err(format!("unknown conference event type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConferenceParticipantStatus {
    Connecting,
    Joined,
    Left,
    Kicked,
}

impl fmt::Display for ConferenceParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConferenceParticipantStatus::Connecting => "connecting",
            ConferenceParticipantStatus::Joined => "joined",
            ConferenceParticipantStatus::Left => "left",
            ConferenceParticipantStatus::Kicked => "kicked",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ConferenceParticipantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connecting" => Ok(ConferenceParticipantStatus::Connecting),
            "joined" => Ok(ConferenceParticipantStatus::Joined),
            "left" => Ok(ConferenceParticipantStatus::Left),
            "kicked" => Ok(ConferenceParticipantStatus::Kicked),
            other => Err(format!("unknown participant status: {other}")),
        }
    }
}

/// Role within a conference (distinct from both `UserRole` and `ParticipantRole`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConferenceRole {
    Originator,
    Moderator,
    Speaker,
    Assistant,
    Participant,
}

impl fmt::Display for ConferenceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConferenceRole::Originator => "originator",
            ConferenceRole::Moderator => "moderator",
            ConferenceRole::Speaker => "speaker",
            ConferenceRole::Assistant => "assistant",
            ConferenceRole::Participant => "participant",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ConferenceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "originator" => Ok(ConferenceRole::Originator),
            "moderator" => Ok(ConferenceRole::Moderator),
            "speaker" => Ok(ConferenceRole::Speaker),
            "assistant" => Ok(ConferenceRole::Assistant),
            "participant" => Ok(ConferenceRole::Participant),
            other => Err(format!("unknown conference role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsvpStatus {
    Pending,
    Accepted,
    Declined,
}

impl fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RsvpStatus::Pending => "pending",
            RsvpStatus::Accepted => "accepted",
            RsvpStatus::Declined => "declined",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RsvpStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RsvpStatus::Pending),
            "accepted" => Ok(RsvpStatus::Accepted),
            "declined" => Ok(RsvpStatus::Declined),
            other => Err(format!("unknown rsvp status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceFrequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl fmt::Display for RecurrenceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecurrenceFrequency::Daily => "daily",
            RecurrenceFrequency::Weekly => "weekly",
            RecurrenceFrequency::Biweekly => "biweekly",
            RecurrenceFrequency::Monthly => "monthly",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RecurrenceFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(RecurrenceFrequency::Daily),
            "weekly" => Ok(RecurrenceFrequency::Weekly),
            "biweekly" => Ok(RecurrenceFrequency::Biweekly),
            "monthly" => Ok(RecurrenceFrequency::Monthly),
            other => Err(format!("unknown recurrence frequency: {other}")),
        }
    }
}

/// Per-connection identifier (random UUID, not persisted) — kept from the
/// gateway's WS layer since every chat/files/voice method still rides a
/// connection-scoped identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnId(pub String);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_roundtrips_through_display_and_fromstr() {
        let id = UserId::new();
        let s = id.to_string();
        let parsed: UserId = s.parse().expect("parse failed");
        assert_eq!(parsed, id);
    }

    #[test]
    fn participant_role_write_permission() {
        assert!(ParticipantRole::Admin.can_write());
        assert!(ParticipantRole::Member.can_write());
        assert!(!ParticipantRole::Viewer.can_write());
    }

    #[test]
    fn file_access_ordering_is_supremum_friendly() {
        assert!(FileAccess::Transfer > FileAccess::Delete);
        assert!(FileAccess::Delete > FileAccess::Read);
        assert!(FileAccess::Read > FileAccess::None);
    }

    #[test]
    fn user_role_fromstr_rejects_unknown() {
        assert!("superadmin".parse::<UserRole>().is_err());
    }

    #[test]
    fn share_token_has_no_dashes() {
        assert!(!ShareToken::new().0.contains('-'));
    }
}
