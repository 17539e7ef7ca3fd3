//! Wire shapes exchanged with the unit and member REST collections.
//!
//! Units travel with a type-specific code field (`branch_code`,
//! `faculty_code`, ...) and a parent foreign key named after the parent kind.
//! Both are resolved here so the rest of the workspace only sees [`Unit`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{
    ApprovalStatus, BranchAddress, InstitutionId, Member, MemberRole, OrganizationId, ParentRef,
    Unit, UnitId, UnitType,
};

const BRANCH_KEY: &str = "branch";
const ADDRESS_FIELDS: [&str; 4] = ["address", "city", "country", "postal_code"];

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed {unit_type} record: {source}")]
    Unit {
        unit_type: String,
        source: serde_json::Error,
    },
    #[error("malformed member record: {0}")]
    Member(#[from] serde_json::Error),
    #[error("response body is not valid JSON: {0}")]
    Body(String),
}

/// Either a bare array or a paginated envelope exposing `results`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Bare(Vec<T>),
    Envelope { results: Vec<T> },
}

impl<T> Listing<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            Self::Bare(items) | Self::Envelope { results: items } => items,
        }
    }
}

/// Normalizes a list response body. `None` means the body was neither shape.
pub fn listing_items(body: Value) -> Option<Vec<Value>> {
    serde_json::from_value::<Listing<Value>>(body)
        .ok()
        .map(Listing::into_items)
}

#[derive(Debug, Deserialize)]
struct WireUnit {
    id: UnitId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    approval_status: Option<ApprovalStatus>,
    #[serde(default)]
    created_by_email: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// Decodes one unit record. The parent reference falls back to `requested_parent`
/// when the record does not carry a usable foreign key.
pub fn decode_unit(
    unit_type: &UnitType,
    requested_parent: ParentRef,
    record: Value,
) -> Result<Unit, DecodeError> {
    decode_unit_with_status(unit_type, requested_parent, record, ApprovalStatus::Approved)
}

/// Like [`decode_unit`], with `absent_status` applied to records that omit
/// `approval_status` (the pending collection does not always echo it).
pub fn decode_unit_with_status(
    unit_type: &UnitType,
    requested_parent: ParentRef,
    record: Value,
    absent_status: ApprovalStatus,
) -> Result<Unit, DecodeError> {
    let wire: WireUnit = serde_json::from_value(record).map_err(|source| DecodeError::Unit {
        unit_type: unit_type.key.to_string(),
        source,
    })?;

    let code = wire
        .rest
        .get(unit_type.code_field())
        .and_then(scalar_to_string);
    let parent = wire
        .rest
        .get(requested_parent.kind().parent_field())
        .and_then(foreign_key)
        .map(|id| with_raw_id(requested_parent, id))
        .unwrap_or(requested_parent);
    let address = if unit_type.key == BRANCH_KEY {
        let address = BranchAddress {
            address: wire.rest.get("address").and_then(scalar_to_string),
            city: wire.rest.get("city").and_then(scalar_to_string),
            country: wire.rest.get("country").and_then(scalar_to_string),
            postal_code: wire.rest.get("postal_code").and_then(scalar_to_string),
        };
        (!address.is_empty()).then_some(address)
    } else {
        None
    };

    Ok(Unit {
        id: wire.id,
        unit_type: unit_type.key.to_string(),
        name: wire.name,
        code,
        description: wire.description.filter(|text| !text.is_empty()),
        approval_status: wire.approval_status.unwrap_or(absent_status),
        created_by_email: wire.created_by_email,
        created_at: wire.created_at,
        parent,
        address,
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

// Foreign keys arrive either as a bare id or as a nested object.
fn foreign_key(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::Object(object) => object.get("id").and_then(Value::as_i64),
        _ => None,
    }
}

fn with_raw_id(parent: ParentRef, id: i64) -> ParentRef {
    match parent {
        ParentRef::Institution(_) => ParentRef::Institution(InstitutionId(id)),
        ParentRef::Organization(_) => ParentRef::Organization(OrganizationId(id)),
    }
}

/// Fields collected from the operator when creating a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUnit {
    pub name: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Only sent for branches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<BranchAddress>,
}

pub fn encode_new_unit(unit_type: &UnitType, parent: ParentRef, unit: &NewUnit) -> Value {
    let mut body = Map::new();
    body.insert("name".into(), Value::String(unit.name.clone()));
    if let Some(description) = unit.description.as_ref().filter(|text| !text.is_empty()) {
        body.insert("description".into(), Value::String(description.clone()));
    }
    body.insert(
        unit_type.code_field().into(),
        Value::String(unit.code.clone()),
    );
    if unit_type.key == BRANCH_KEY {
        if let Some(address) = &unit.address {
            insert_address(&mut body, address);
        }
    }
    body.insert(
        parent.kind().parent_field().into(),
        Value::from(parent.raw_id()),
    );
    Value::Object(body)
}

/// Partial update for an existing unit; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<BranchAddress>,
}

impl UnitPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.code.is_none()
            && self.description.is_none()
            && self.address.as_ref().map_or(true, BranchAddress::is_empty)
    }
}

pub fn encode_unit_patch(unit_type: &UnitType, patch: &UnitPatch) -> Value {
    let mut body = Map::new();
    if let Some(name) = &patch.name {
        body.insert("name".into(), Value::String(name.clone()));
    }
    if let Some(code) = &patch.code {
        body.insert(unit_type.code_field().into(), Value::String(code.clone()));
    }
    if let Some(description) = &patch.description {
        body.insert("description".into(), Value::String(description.clone()));
    }
    if unit_type.key == BRANCH_KEY {
        if let Some(address) = &patch.address {
            insert_address(&mut body, address);
        }
    }
    Value::Object(body)
}

fn insert_address(body: &mut Map<String, Value>, address: &BranchAddress) {
    let values = [
        &address.address,
        &address.city,
        &address.country,
        &address.postal_code,
    ];
    for (field, value) in ADDRESS_FIELDS.into_iter().zip(values) {
        if let Some(value) = value {
            body.insert(field.into(), Value::String(value.clone()));
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberTitleUpdate {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRoleUpdate {
    pub role: MemberRole,
}

/// Decodes a member collection. Bodies that are not a list decode as empty.
pub fn decode_members(body: Value) -> Result<Vec<Member>, DecodeError> {
    let Some(items) = listing_items(body) else {
        return Ok(Vec::new());
    };
    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(DecodeError::from))
        .collect()
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
