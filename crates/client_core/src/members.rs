//! Organization roster: role/title edits and removals with local reconciliation.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use shared::{
    domain::{Member, MemberId, MemberRole, OrganizationId},
    protocol::{decode_members, MemberRoleUpdate, MemberTitleUpdate},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    config::Settings,
    error::{ClientError, ClientResult},
    inflight::{Attempt, InflightSet},
    transport::ApiTransport,
};

/// The organizations service that owns member records.
#[async_trait]
pub trait OrganizationMembers: Send + Sync {
    async fn get_members(&self, organization: OrganizationId) -> ClientResult<Vec<Member>>;
    async fn update_member_title(
        &self,
        organization: OrganizationId,
        member: MemberId,
        title: &str,
    ) -> ClientResult<()>;
    async fn update_member_role(
        &self,
        organization: OrganizationId,
        member: MemberId,
        role: MemberRole,
    ) -> ClientResult<()>;
    async fn remove_member(&self, organization: OrganizationId, member: MemberId)
        -> ClientResult<()>;
}

#[derive(Clone)]
pub struct HttpOrganizationMembers {
    transport: ApiTransport,
}

impl HttpOrganizationMembers {
    pub fn new(transport: ApiTransport) -> Self {
        Self { transport }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(ApiTransport::from_settings(settings))
    }
}

fn members_path(organization: OrganizationId) -> String {
    format!("/api/organizations/{}/members/", organization.0)
}

fn member_path(organization: OrganizationId, member: MemberId) -> String {
    format!("{}{}/", members_path(organization), member.0)
}

#[async_trait]
impl OrganizationMembers for HttpOrganizationMembers {
    async fn get_members(&self, organization: OrganizationId) -> ClientResult<Vec<Member>> {
        let body = self
            .transport
            .get_json(&members_path(organization), &[] as &[(&str, &str)])
            .await?;
        Ok(decode_members(body)?)
    }

    async fn update_member_title(
        &self,
        organization: OrganizationId,
        member: MemberId,
        title: &str,
    ) -> ClientResult<()> {
        self.transport
            .send_discarding(
                Method::PATCH,
                &member_path(organization, member),
                Some(&MemberTitleUpdate {
                    title: title.to_string(),
                }),
            )
            .await
    }

    async fn update_member_role(
        &self,
        organization: OrganizationId,
        member: MemberId,
        role: MemberRole,
    ) -> ClientResult<()> {
        self.transport
            .send_discarding(
                Method::PATCH,
                &member_path(organization, member),
                Some(&MemberRoleUpdate { role }),
            )
            .await
    }

    async fn remove_member(
        &self,
        organization: OrganizationId,
        member: MemberId,
    ) -> ClientResult<()> {
        self.transport
            .send_discarding::<Value>(Method::DELETE, &member_path(organization, member), None)
            .await
    }
}

/// Explicit user confirmation required before a member is removed.
pub trait ConfirmRemoval: Send + Sync {
    fn confirm(&self, member: &Member) -> bool;
}

impl<F> ConfirmRemoval for F
where
    F: Fn(&Member) -> bool + Send + Sync,
{
    fn confirm(&self, member: &Member) -> bool {
        self(member)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    Removed(Member),
    /// The user declined; no remote call was made.
    Cancelled,
}

pub struct MemberRoster {
    service: Arc<dyn OrganizationMembers>,
    organization: OrganizationId,
    members: Mutex<Vec<Member>>,
    inflight: InflightSet<MemberId>,
}

impl MemberRoster {
    pub fn new(service: Arc<dyn OrganizationMembers>, organization: OrganizationId) -> Self {
        Self {
            service,
            organization,
            members: Mutex::new(Vec::new()),
            inflight: InflightSet::default(),
        }
    }

    pub async fn list_members(&self) -> ClientResult<Vec<Member>> {
        let fetched = self.service.get_members(self.organization).await?;
        let mut members = self.members.lock().await;
        *members = fetched;
        debug!(
            organization = self.organization.0,
            count = members.len(),
            "members loaded"
        );
        Ok(members.clone())
    }

    pub async fn members(&self) -> Vec<Member> {
        self.members.lock().await.clone()
    }

    pub fn is_in_flight(&self, member: MemberId) -> bool {
        self.inflight.contains(&member)
    }

    pub async fn set_title(&self, member: MemberId, title: &str) -> ClientResult<Attempt<Member>> {
        self.mutate(member, MemberChange::Title(title.trim())).await
    }

    pub async fn set_role(
        &self,
        member: MemberId,
        role: MemberRole,
    ) -> ClientResult<Attempt<Member>> {
        self.mutate(member, MemberChange::Role(role)).await
    }

    /// Removes a member after `confirm` accepts. There is no undo.
    pub async fn remove_member(
        &self,
        member: MemberId,
        confirm: &dyn ConfirmRemoval,
    ) -> ClientResult<Attempt<Removal>> {
        let target = self.lookup(member).await?;
        let Some(_ticket) = self.inflight.try_acquire(member) else {
            return Ok(Attempt::Suppressed);
        };
        if !confirm.confirm(&target) {
            debug!(member = member.0, "member removal cancelled");
            return Ok(Attempt::Completed(Removal::Cancelled));
        }

        if let Err(err) = self.service.remove_member(self.organization, member).await {
            warn!(member = member.0, "member removal failed: {err}");
            return Err(err);
        }

        let mut members = self.members.lock().await;
        members.retain(|record| record.id != member);
        info!(
            organization = self.organization.0,
            member = member.0,
            "member removed"
        );
        Ok(Attempt::Completed(Removal::Removed(target)))
    }

    async fn lookup(&self, member: MemberId) -> ClientResult<Member> {
        self.members
            .lock()
            .await
            .iter()
            .find(|record| record.id == member)
            .cloned()
            .ok_or(ClientError::UnknownMember(member))
    }

    async fn mutate(
        &self,
        member: MemberId,
        change: MemberChange<'_>,
    ) -> ClientResult<Attempt<Member>> {
        let mut target = self.lookup(member).await?;
        let Some(_ticket) = self.inflight.try_acquire(member) else {
            return Ok(Attempt::Suppressed);
        };

        let result = match change {
            MemberChange::Title(title) => {
                self.service
                    .update_member_title(self.organization, member, title)
                    .await
            }
            MemberChange::Role(role) => {
                self.service
                    .update_member_role(self.organization, member, role)
                    .await
            }
        };
        if let Err(err) = result {
            warn!(member = member.0, "member update failed: {err}");
            return Err(err);
        }

        // The roster may have been reloaded while the call was out; the remote
        // change stands either way.
        let mut members = self.members.lock().await;
        let updated = match members.iter_mut().find(|record| record.id == member) {
            Some(record) => {
                change.apply(record);
                record.clone()
            }
            None => {
                debug!(member = member.0, "updated member no longer in local roster");
                change.apply(&mut target);
                target
            }
        };
        info!(
            organization = self.organization.0,
            member = member.0,
            role = updated.role.as_str(),
            "member updated"
        );
        Ok(Attempt::Completed(updated))
    }
}

#[derive(Debug, Clone, Copy)]
enum MemberChange<'a> {
    Title(&'a str),
    Role(MemberRole),
}

impl MemberChange<'_> {
    fn apply(self, record: &mut Member) {
        match self {
            Self::Title(title) => record.title = (!title.is_empty()).then(|| title.to_string()),
            Self::Role(role) => record.role = role,
        }
    }
}

#[cfg(test)]
#[path = "tests/members_tests.rs"]
mod tests;
