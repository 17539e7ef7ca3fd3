use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(InstitutionId);
id_newtype!(OrganizationId);
id_newtype!(UnitId);
id_newtype!(MemberId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentKind {
    Institution,
    Organization,
}

impl ParentKind {
    pub fn api_prefix(self) -> &'static str {
        match self {
            Self::Institution => "/api/institutions",
            Self::Organization => "/api/organizations",
        }
    }

    /// Query parameter used to filter list endpoints, and the field injected
    /// into create payloads.
    pub fn parent_field(self) -> &'static str {
        match self {
            Self::Institution => "institution",
            Self::Organization => "organisation",
        }
    }

    pub fn catalog(self) -> &'static [UnitType] {
        match self {
            Self::Institution => INSTITUTION_UNIT_TYPES,
            Self::Organization => ORGANIZATION_UNIT_TYPES,
        }
    }

    /// Only the institution hierarchy exposes pending/approve/reject endpoints.
    pub fn supports_moderation(self) -> bool {
        matches!(self, Self::Institution)
    }
}

impl fmt::Display for ParentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Institution => f.write_str("institution"),
            Self::Organization => f.write_str("organization"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ParentRef {
    Institution(InstitutionId),
    Organization(OrganizationId),
}

impl ParentRef {
    pub fn kind(self) -> ParentKind {
        match self {
            Self::Institution(_) => ParentKind::Institution,
            Self::Organization(_) => ParentKind::Organization,
        }
    }

    pub fn raw_id(self) -> i64 {
        match self {
            Self::Institution(id) => id.0,
            Self::Organization(id) => id.0,
        }
    }
}

impl From<InstitutionId> for ParentRef {
    fn from(value: InstitutionId) -> Self {
        Self::Institution(value)
    }
}

impl From<OrganizationId> for ParentRef {
    fn from(value: OrganizationId) -> Self {
        Self::Organization(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct UnitType {
    pub key: &'static str,
    pub label: &'static str,
    pub endpoint: &'static str,
}

impl UnitType {
    const fn new(key: &'static str, label: &'static str, endpoint: &'static str) -> Self {
        Self {
            key,
            label,
            endpoint,
        }
    }

    pub fn code_field(&self) -> &'static str {
        code_field(self.key)
    }
}

pub static INSTITUTION_UNIT_TYPES: &[UnitType] = &[
    UnitType::new("branch", "Branches", "branches"),
    UnitType::new("faculty", "Faculties", "faculties"),
    UnitType::new("department", "Departments", "departments"),
    UnitType::new("programme", "Programmes", "programmes"),
    UnitType::new("division", "Divisions", "divisions"),
    UnitType::new("office", "Offices", "offices"),
    UnitType::new("centre", "Centres", "centres"),
    UnitType::new("committee", "Committees", "committees"),
];

pub static ORGANIZATION_UNIT_TYPES: &[UnitType] = &[
    UnitType::new("branch", "Branches", "branches"),
    UnitType::new("division", "Divisions", "divisions"),
    UnitType::new("department", "Departments", "departments"),
    UnitType::new("team", "Teams", "teams"),
    UnitType::new("committee", "Committees", "committees"),
];

const CODE_FIELDS: &[(&str, &str)] = &[
    ("branch", "branch_code"),
    ("faculty", "faculty_code"),
    ("department", "department_code"),
    ("programme", "programme_code"),
    ("division", "division_code"),
];

/// Wire name of the code attribute for a unit type key.
pub fn code_field(key: &str) -> &'static str {
    CODE_FIELDS
        .iter()
        .find(|(candidate, _)| *candidate == key)
        .map(|(_, field)| *field)
        .unwrap_or("code")
}

pub fn find_unit_type(kind: ParentKind, key: &str) -> Option<&'static UnitType> {
    kind.catalog().iter().find(|unit_type| unit_type.key == key)
}

/// Resolves a unit type key against a catalog, falling back to the catalog's
/// first entry for keys that are no longer known.
pub fn resolve_unit_type(kind: ParentKind, key: &str) -> &'static UnitType {
    find_unit_type(kind, key).unwrap_or(&kind.catalog()[0])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    #[default]
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationDecision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {decision:?} a unit that is already {from:?}")]
pub struct InvalidTransition {
    pub from: ApprovalStatus,
    pub decision: ModerationDecision,
}

impl ApprovalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn apply(self, decision: ModerationDecision) -> Result<Self, InvalidTransition> {
        match (self, decision) {
            (Self::Pending, ModerationDecision::Approve) => Ok(Self::Approved),
            (Self::Pending, ModerationDecision::Reject) => Ok(Self::Rejected),
            (from, decision) => Err(InvalidTransition { from, decision }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

impl BranchAddress {
    pub fn is_empty(&self) -> bool {
        self.address.is_none()
            && self.city.is_none()
            && self.country.is_none()
            && self.postal_code.is_none()
    }
}

/// One organizational node. `code` is stored once regardless of the
/// type-specific field name used on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unit {
    pub id: UnitId,
    pub unit_type: String,
    pub name: String,
    pub code: Option<String>,
    pub description: Option<String>,
    pub approval_status: ApprovalStatus,
    pub created_by_email: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub parent: ParentRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<BranchAddress>,
}

impl Unit {
    pub fn is_pending(&self) -> bool {
        self.approval_status == ApprovalStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Admin,
    Moderator,
    #[default]
    Member,
}

impl MemberRole {
    pub const ALL: [MemberRole; 3] = [Self::Admin, Self::Moderator, Self::Member];

    /// Lenient decoding: anything outside the closed set reads as `Member`.
    pub fn from_wire(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("admin") => Self::Admin,
            Some("moderator") => Self::Moderator,
            _ => Self::Member,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Moderator => "moderator",
            Self::Member => "member",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Moderator => "Moderator",
            Self::Member => "Member",
        }
    }
}

impl std::str::FromStr for MemberRole {
    type Err = String;

    /// Strict parsing for operator input, unlike [`MemberRole::from_wire`].
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown role '{value}', expected admin, moderator or member"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_avatar: Option<String>,
    #[serde(default, deserialize_with = "lenient_role")]
    pub role: MemberRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

fn lenient_role<'de, D>(deserializer: D) -> Result<MemberRole, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(MemberRole::from_wire(raw.as_ref().and_then(|value| value.as_str())))
}
