use shared::{
    domain::{InvalidTransition, MemberId, ParentKind},
    error::ApiError,
    protocol::DecodeError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Non-success response; the message is the single most specific one the
    /// body offered.
    #[error("{error}")]
    Api { status: u16, error: ApiError },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// Raised before any request for actions that must not guess the type.
    #[error("unknown {kind} unit type '{unit_type}'")]
    UnknownUnitType { kind: ParentKind, unit_type: String },
    #[error("member {0} is not part of the loaded roster")]
    UnknownMember(MemberId),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// Message suitable for a single-line notification.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { error, .. } => error.message.clone(),
            other => other.to_string(),
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
