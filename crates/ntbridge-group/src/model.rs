//! Group payload types exchanged with the host.
//!
//! Only the fields the bridge itself relies on are typed; everything else the
//! host sends is kept in `extra` so nothing is lost on the way through.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Group
// =============================================================================

/// A group the logged-in account belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Group number.
    pub group_code: String,
    /// Display name.
    #[serde(default)]
    pub group_name: String,
    /// Current member count.
    #[serde(default)]
    pub member_count: u32,
    /// Member capacity.
    #[serde(default)]
    pub max_member: u32,
    /// Remaining host fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Members
// =============================================================================

/// A member's role in a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MemberRole {
    /// Regular member.
    #[default]
    Normal,
    /// Administrator.
    Admin,
    /// Owner.
    Owner,
}

impl TryFrom<u8> for MemberRole {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::Normal),
            3 => Ok(Self::Admin),
            4 => Ok(Self::Owner),
            other => Err(format!("unknown member role {other}")),
        }
    }
}

impl From<MemberRole> for u8 {
    fn from(role: MemberRole) -> Self {
        match role {
            MemberRole::Normal => 2,
            MemberRole::Admin => 3,
            MemberRole::Owner => 4,
        }
    }
}

/// A group member record.
///
/// `uid` is the host's opaque internal identifier; `uin` is the numeric
/// account number, carried as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    /// Opaque internal identifier.
    pub uid: String,
    /// Numeric account number.
    #[serde(default)]
    pub uin: String,
    /// Account nickname.
    #[serde(default)]
    pub nick: String,
    /// Group-specific card name.
    #[serde(default)]
    pub card_name: String,
    /// Role in the group.
    #[serde(default)]
    pub role: MemberRole,
    /// Remaining host fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GroupMember {
    /// Creates a member with only the identifying fields set.
    pub fn new(uid: impl Into<String>, uin: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            uin: uin.into(),
            nick: String::new(),
            card_name: String::new(),
            role: MemberRole::Normal,
            extra: Map::new(),
        }
    }
}

/// A mute instruction for one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteEntry {
    /// Member uid.
    pub uid: String,
    /// Mute duration in seconds; 0 lifts the mute.
    pub time_stamp: u32,
}

// =============================================================================
// Requests
// =============================================================================

/// Decision for a pending join/invite request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOperation {
    /// Let the requester in.
    Approve,
    /// Turn the request down.
    Reject,
}

impl RequestOperation {
    /// The host's operate-type code.
    pub fn code(self) -> u8 {
        match self {
            Self::Approve => 1,
            Self::Reject => 2,
        }
    }
}

/// The parts of a request flag (`groupCode|seq|type`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFlag {
    /// Group the request targets.
    pub group_code: String,
    /// Notify sequence number.
    pub seq: String,
    /// Notify type.
    pub kind: i64,
}

impl RequestFlag {
    /// Splits a flag into its parts; `None` if it is malformed.
    pub fn parse(flag: &str) -> Option<Self> {
        let mut parts = flag.split('|');
        let group_code = parts.next().filter(|s| !s.is_empty())?;
        let seq = parts.next().filter(|s| !s.is_empty())?;
        let kind = parts.next()?.parse().ok()?;
        Some(Self {
            group_code: group_code.to_string(),
            seq: seq.to_string(),
            kind,
        })
    }
}
