//! Typed access to the institution and organization unit collections.

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use shared::{
    domain::{
        find_unit_type, resolve_unit_type, ApprovalStatus, InstitutionId, ParentKind, ParentRef,
        Unit, UnitId, UnitType,
    },
    protocol::{
        decode_unit, decode_unit_with_status, encode_new_unit, encode_unit_patch, listing_items,
        NewUnit, RejectRequest, UnitPatch,
    },
};
use tracing::{info, warn};

use crate::{
    config::Settings,
    error::{ClientError, ClientResult},
    transport::ApiTransport,
};

/// What the caller should tell the user after a create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "unit", rename_all = "snake_case")]
pub enum CreateOutcome {
    Created(Unit),
    SubmittedForApproval(Unit),
}

impl CreateOutcome {
    fn from_unit(unit: Unit) -> Self {
        match unit.approval_status {
            ApprovalStatus::Pending => Self::SubmittedForApproval(unit),
            ApprovalStatus::Approved | ApprovalStatus::Rejected => Self::Created(unit),
        }
    }

    pub fn unit(&self) -> &Unit {
        match self {
            Self::Created(unit) | Self::SubmittedForApproval(unit) => unit,
        }
    }

    pub fn requires_moderation(&self) -> bool {
        matches!(self, Self::SubmittedForApproval(_))
    }

    pub fn message(&self) -> String {
        match self {
            Self::Created(unit) => format!("{} created successfully.", unit.name),
            Self::SubmittedForApproval(unit) => format!(
                "{} submitted for approval. It will become visible once an administrator reviews it.",
                unit.name
            ),
        }
    }
}

/// Moderation endpoints. Only the institution hierarchy offers them, so every
/// operation is addressed by institution unit type.
#[async_trait]
pub trait UnitModeration: Send + Sync {
    async fn list_pending_units(
        &self,
        institution: InstitutionId,
        unit_type: &str,
    ) -> ClientResult<Vec<Unit>>;
    async fn approve_unit(&self, unit_id: UnitId, unit_type: &str) -> ClientResult<()>;
    async fn reject_unit(&self, unit_id: UnitId, unit_type: &str, reason: &str)
        -> ClientResult<()>;
}

#[derive(Clone)]
pub struct RegistryClient {
    transport: ApiTransport,
}

impl RegistryClient {
    pub fn new(transport: ApiTransport) -> Self {
        Self { transport }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(ApiTransport::from_settings(settings))
    }

    pub async fn list_units(&self, parent: ParentRef, unit_type: &str) -> ClientResult<Vec<Unit>> {
        let unit_type = lookup(parent.kind(), unit_type);
        let body = self
            .transport
            .get_json(
                &collection_path(parent.kind(), unit_type),
                &[(parent.kind().parent_field(), parent.raw_id())],
            )
            .await?;
        Ok(decode_listing(unit_type, parent, body, ApprovalStatus::Approved))
    }

    pub async fn create_unit(
        &self,
        parent: ParentRef,
        unit_type: &str,
        unit: &NewUnit,
    ) -> ClientResult<CreateOutcome> {
        let unit_type = lookup(parent.kind(), unit_type);
        let payload = encode_new_unit(unit_type, parent, unit);
        let body = self
            .transport
            .send_json(Method::POST, &collection_path(parent.kind(), unit_type), &payload)
            .await?;
        let created = decode_unit(unit_type, parent, body)?;
        info!(
            unit_type = unit_type.key,
            unit_id = created.id.0,
            status = ?created.approval_status,
            "unit created"
        );
        Ok(CreateOutcome::from_unit(created))
    }

    pub async fn get_unit(
        &self,
        institution: InstitutionId,
        unit_type: &str,
        unit_id: UnitId,
    ) -> ClientResult<Unit> {
        let unit_type = require(ParentKind::Institution, unit_type)?;
        let body = self
            .transport
            .get_json(&member_path(unit_type, unit_id, None), &[] as &[(&str, &str)])
            .await?;
        Ok(decode_unit(unit_type, institution.into(), body)?)
    }

    pub async fn update_unit(
        &self,
        institution: InstitutionId,
        unit_type: &str,
        unit_id: UnitId,
        patch: &UnitPatch,
    ) -> ClientResult<Unit> {
        let unit_type = require(ParentKind::Institution, unit_type)?;
        let body = self
            .transport
            .send_json(
                Method::PATCH,
                &member_path(unit_type, unit_id, None),
                &encode_unit_patch(unit_type, patch),
            )
            .await?;
        Ok(decode_unit(unit_type, institution.into(), body)?)
    }

    pub async fn delete_unit(&self, unit_type: &str, unit_id: UnitId) -> ClientResult<()> {
        let unit_type = require(ParentKind::Institution, unit_type)?;
        self.transport
            .send_discarding::<Value>(Method::DELETE, &member_path(unit_type, unit_id, None), None)
            .await?;
        info!(unit_type = unit_type.key, unit_id = unit_id.0, "unit deleted");
        Ok(())
    }
}

#[async_trait]
impl UnitModeration for RegistryClient {
    async fn list_pending_units(
        &self,
        institution: InstitutionId,
        unit_type: &str,
    ) -> ClientResult<Vec<Unit>> {
        let unit_type = lookup(ParentKind::Institution, unit_type);
        let body = self
            .transport
            .get_json(
                &format!(
                    "{}pending_units/",
                    collection_path(ParentKind::Institution, unit_type)
                ),
                &[(ParentKind::Institution.parent_field(), institution.0)],
            )
            .await?;
        Ok(decode_listing(
            unit_type,
            institution.into(),
            body,
            ApprovalStatus::Pending,
        ))
    }

    async fn approve_unit(&self, unit_id: UnitId, unit_type: &str) -> ClientResult<()> {
        let unit_type = require(ParentKind::Institution, unit_type)?;
        self.transport
            .send_discarding::<Value>(
                Method::POST,
                &member_path(unit_type, unit_id, Some("approve")),
                None,
            )
            .await?;
        info!(unit_type = unit_type.key, unit_id = unit_id.0, "unit approved");
        Ok(())
    }

    async fn reject_unit(
        &self,
        unit_id: UnitId,
        unit_type: &str,
        reason: &str,
    ) -> ClientResult<()> {
        let unit_type = require(ParentKind::Institution, unit_type)?;
        self.transport
            .send_discarding(
                Method::POST,
                &member_path(unit_type, unit_id, Some("reject")),
                Some(&RejectRequest {
                    reason: reason.to_string(),
                }),
            )
            .await?;
        info!(unit_type = unit_type.key, unit_id = unit_id.0, "unit rejected");
        Ok(())
    }
}

fn lookup(kind: ParentKind, key: &str) -> &'static UnitType {
    if find_unit_type(kind, key).is_none() {
        warn!(%kind, unit_type = key, "unknown unit type, using catalog default");
    }
    resolve_unit_type(kind, key)
}

fn require(kind: ParentKind, key: &str) -> ClientResult<&'static UnitType> {
    find_unit_type(kind, key).ok_or_else(|| ClientError::UnknownUnitType {
        kind,
        unit_type: key.to_string(),
    })
}

pub(crate) fn collection_path(kind: ParentKind, unit_type: &UnitType) -> String {
    format!("{}/{}/", kind.api_prefix(), unit_type.endpoint)
}

fn member_path(unit_type: &UnitType, unit_id: UnitId, action: Option<&str>) -> String {
    let base = format!(
        "{}{}/",
        collection_path(ParentKind::Institution, unit_type),
        unit_id.0
    );
    match action {
        Some(action) => format!("{base}{action}/"),
        None => base,
    }
}

/// Records that fail to decode are skipped so one bad row does not hide the
/// rest of the type.
fn decode_listing(
    unit_type: &UnitType,
    parent: ParentRef,
    body: Value,
    absent_status: ApprovalStatus,
) -> Vec<Unit> {
    let Some(items) = listing_items(body) else {
        warn!(
            unit_type = unit_type.key,
            "list response was neither an array nor a results envelope"
        );
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(
            |item| match decode_unit_with_status(unit_type, parent, item, absent_status) {
                Ok(unit) => Some(unit),
                Err(err) => {
                    warn!(unit_type = unit_type.key, "skipping unit record: {err}");
                    None
                }
            },
        )
        .collect()
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
