//! Client-side access to institution and organization units: the REST
//! registry, the pending-unit moderation workflow and organization rosters.

pub mod approval;
pub mod config;
pub mod error;
pub mod inflight;
pub mod members;
pub mod registry;
pub mod transport;
pub mod units_tab;

pub use approval::{ApprovalPanel, ApprovalWorkflow, PendingUnitsIndex, Viewer};
pub use config::{load_settings, Settings};
pub use error::{ClientError, ClientResult};
pub use inflight::Attempt;
pub use members::{
    ConfirmRemoval, HttpOrganizationMembers, MemberRoster, OrganizationMembers, Removal,
};
pub use registry::{CreateOutcome, RegistryClient, UnitModeration};
pub use transport::ApiTransport;
pub use units_tab::{load_units_by_type, UnitsByType};
