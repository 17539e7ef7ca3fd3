//! Pending-unit moderation: batch load, approve/reject, local reconciliation.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use shared::domain::{
    find_unit_type, ApprovalStatus, InstitutionId, ModerationDecision, ParentKind, Unit, UnitId,
    UnitType,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::{ClientError, ClientResult},
    inflight::{Attempt, InflightSet},
    registry::UnitModeration,
};

/// The identity provider's view of the current user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Viewer {
    pub email: Option<String>,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl Viewer {
    pub fn staff(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            is_staff: true,
            is_superuser: false,
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.is_staff || self.is_superuser
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingGroup {
    pub unit_type: &'static UnitType,
    pub units: Vec<Unit>,
}

/// Pending units keyed by unit type, in catalog order. Only non-empty groups
/// are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingUnitsIndex {
    groups: Vec<PendingGroup>,
}

impl PendingUnitsIndex {
    pub fn from_groups<I>(groups: I) -> Self
    where
        I: IntoIterator<Item = (&'static UnitType, Vec<Unit>)>,
    {
        let mut groups: Vec<PendingGroup> = groups
            .into_iter()
            .filter_map(|(unit_type, units)| {
                let mut seen = std::collections::HashSet::new();
                let units: Vec<Unit> = units
                    .into_iter()
                    .filter(|unit| unit.is_pending() && seen.insert(unit.id))
                    .collect();
                (!units.is_empty()).then_some(PendingGroup { unit_type, units })
            })
            .collect();
        groups.sort_by_key(|group| catalog_position(group.unit_type));
        Self { groups }
    }

    pub fn get(&self, unit_type: &str) -> Option<&[Unit]> {
        self.group(unit_type).map(|group| group.units.as_slice())
    }

    pub fn groups(&self) -> &[PendingGroup] {
        &self.groups
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.groups.iter().map(|group| group.unit_type.key)
    }

    pub fn total(&self) -> usize {
        self.groups.iter().map(|group| group.units.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn group(&self, unit_type: &str) -> Option<&PendingGroup> {
        self.groups
            .iter()
            .find(|group| group.unit_type.key == unit_type)
    }

    fn find(&self, unit_type: &str, unit_id: UnitId) -> Option<&Unit> {
        self.get(unit_type)?.iter().find(|unit| unit.id == unit_id)
    }

    /// Removes a unit by id. Other units and other types are untouched; a group
    /// left empty is dropped.
    pub fn remove(&mut self, unit_type: &str, unit_id: UnitId) -> Option<Unit> {
        let position = self
            .groups
            .iter()
            .position(|group| group.unit_type.key == unit_type)?;
        let group = &mut self.groups[position];
        let index = group.units.iter().position(|unit| unit.id == unit_id)?;
        let removed = group.units.remove(index);
        if group.units.is_empty() {
            self.groups.remove(position);
        }
        Some(removed)
    }
}

fn catalog_position(unit_type: &UnitType) -> usize {
    ParentKind::Institution
        .catalog()
        .iter()
        .position(|candidate| candidate.key == unit_type.key)
        .unwrap_or(usize::MAX)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingLoadReport {
    pub loaded_types: Vec<&'static str>,
    pub failed_types: Vec<&'static str>,
    pub total_pending: usize,
}

/// What the approval panel should display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalPanel {
    /// The viewer may not moderate; nothing is rendered.
    Hidden,
    Loading,
    /// Every unit type failed to load.
    Failed(String),
    /// Nothing pending; nothing is rendered.
    Empty,
    Ready(PendingUnitsIndex),
}

impl ApprovalPanel {
    pub fn renders_nothing(&self) -> bool {
        matches!(self, Self::Hidden | Self::Empty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeratedUnit {
    pub unit_id: UnitId,
    pub unit_type: String,
    pub status: ApprovalStatus,
    /// The local copy, when the unit was present in the loaded index.
    pub unit: Option<Unit>,
}

#[derive(Default)]
struct WorkflowState {
    index: PendingUnitsIndex,
    loaded: bool,
    all_failed: bool,
    last_error: Option<String>,
}

pub struct ApprovalWorkflow {
    registry: Arc<dyn UnitModeration>,
    viewer: Viewer,
    inner: Mutex<WorkflowState>,
    inflight: InflightSet<(String, UnitId)>,
}

impl ApprovalWorkflow {
    pub fn new(registry: Arc<dyn UnitModeration>, viewer: Viewer) -> Self {
        Self {
            registry,
            viewer,
            inner: Mutex::new(WorkflowState::default()),
            inflight: InflightSet::default(),
        }
    }

    /// Fetches every institution unit type's pending list and replaces the
    /// index. A failing type is logged and left out; it never hides the others.
    pub async fn load_pending_across_types(&self, institution: InstitutionId) -> PendingLoadReport {
        if !self.viewer.is_privileged() {
            debug!(institution = institution.0, "viewer cannot moderate; skipping pending load");
            return PendingLoadReport::default();
        }

        let catalog = ParentKind::Institution.catalog();
        let registry = &self.registry;
        let fetches = catalog.iter().map(|unit_type| async move {
            let result = registry.list_pending_units(institution, unit_type.key).await;
            (unit_type, result)
        });

        let mut report = PendingLoadReport::default();
        let mut groups = Vec::new();
        for (unit_type, result) in join_all(fetches).await {
            match result {
                Ok(units) => {
                    report.loaded_types.push(unit_type.key);
                    groups.push((unit_type, units));
                }
                Err(err) => {
                    warn!(
                        institution = institution.0,
                        unit_type = unit_type.key,
                        "failed to load pending units: {err}"
                    );
                    report.failed_types.push(unit_type.key);
                }
            }
        }

        let index = PendingUnitsIndex::from_groups(groups);
        report.total_pending = index.total();

        let mut state = self.inner.lock().await;
        state.index = index;
        state.loaded = true;
        state.all_failed = report.loaded_types.is_empty();
        info!(
            institution = institution.0,
            pending = report.total_pending,
            failed_types = report.failed_types.len(),
            "pending units loaded"
        );
        report
    }

    pub async fn approve(
        &self,
        unit_id: UnitId,
        unit_type: &str,
    ) -> ClientResult<Attempt<ModeratedUnit>> {
        self.moderate(unit_id, unit_type, ModerationDecision::Approve, "")
            .await
    }

    /// `reason` may be empty.
    pub async fn reject(
        &self,
        unit_id: UnitId,
        unit_type: &str,
        reason: &str,
    ) -> ClientResult<Attempt<ModeratedUnit>> {
        self.moderate(unit_id, unit_type, ModerationDecision::Reject, reason)
            .await
    }

    async fn moderate(
        &self,
        unit_id: UnitId,
        unit_type: &str,
        decision: ModerationDecision,
        reason: &str,
    ) -> ClientResult<Attempt<ModeratedUnit>> {
        if find_unit_type(ParentKind::Institution, unit_type).is_none() {
            return Err(ClientError::UnknownUnitType {
                kind: ParentKind::Institution,
                unit_type: unit_type.to_string(),
            });
        }
        let Some(_ticket) = self.inflight.try_acquire((unit_type.to_string(), unit_id)) else {
            debug!(unit_type, unit_id = unit_id.0, "moderation already in flight");
            return Ok(Attempt::Suppressed);
        };

        let current = {
            let state = self.inner.lock().await;
            state
                .index
                .find(unit_type, unit_id)
                .map(|unit| unit.approval_status)
                .unwrap_or(ApprovalStatus::Pending)
        };
        let next = current.apply(decision)?;

        let result = match decision {
            ModerationDecision::Approve => self.registry.approve_unit(unit_id, unit_type).await,
            ModerationDecision::Reject => {
                self.registry.reject_unit(unit_id, unit_type, reason).await
            }
        };

        let mut state = self.inner.lock().await;
        match result {
            Ok(()) => {
                state.last_error = None;
                let unit = state.index.remove(unit_type, unit_id).map(|mut unit| {
                    unit.approval_status = next;
                    unit
                });
                Ok(Attempt::Completed(ModeratedUnit {
                    unit_id,
                    unit_type: unit_type.to_string(),
                    status: next,
                    unit,
                }))
            }
            Err(err) => {
                warn!(
                    unit_type,
                    unit_id = unit_id.0,
                    ?decision,
                    "moderation failed: {err}"
                );
                state.last_error = Some(failure_message(decision, &err));
                Err(err)
            }
        }
    }

    pub fn is_in_flight(&self, unit_id: UnitId, unit_type: &str) -> bool {
        self.inflight.contains(&(unit_type.to_string(), unit_id))
    }

    pub async fn index(&self) -> PendingUnitsIndex {
        self.inner.lock().await.index.clone()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.inner.lock().await.last_error.clone()
    }

    pub async fn panel(&self) -> ApprovalPanel {
        if !self.viewer.is_privileged() {
            return ApprovalPanel::Hidden;
        }
        let state = self.inner.lock().await;
        if !state.loaded {
            ApprovalPanel::Loading
        } else if state.all_failed {
            ApprovalPanel::Failed("Failed to load pending units.".to_string())
        } else if state.index.is_empty() {
            ApprovalPanel::Empty
        } else {
            ApprovalPanel::Ready(state.index.clone())
        }
    }
}

fn failure_message(decision: ModerationDecision, err: &ClientError) -> String {
    let verb = match decision {
        ModerationDecision::Approve => "approve",
        ModerationDecision::Reject => "reject",
    };
    format!("Failed to {verb} unit: {}", err.user_message())
}

#[cfg(test)]
#[path = "tests/approval_tests.rs"]
mod tests;
