//! Error taxonomy shared by every herald component

use thiserror::Error;

use crate::store::StoreError;

/// Broad class of an [`Error`], used by the transports to pick a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input shape; surfaced verbatim
    Validation,
    /// Caller is not allowed to do this; surfaced as a denial
    Authorization,
    /// Request conflicts with the current membership state
    StateConflict,
    /// Backing store could not be reached
    StoreUnavailable,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("only admin can create new channel")]
    NotAdmin,

    #[error("only owner can do this")]
    NotOwner,

    /// Channel absent or token mismatch; callers must not be able to tell which.
    #[error("channel not exist or token not match")]
    Unauthorized,

    #[error("can't follow the channel you owned")]
    SelfFollow,

    #[error("channel name exists")]
    AlreadyExists,

    #[error("already followed")]
    AlreadyFollowing,

    #[error("not followed")]
    NotFollowing,

    /// Only ever produced on the control surface, never on publish.
    #[error("channel ID not exists")]
    NotFound,

    #[error("service unavailable, try again later")]
    StoreUnavailable(#[source] StoreError),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotAdmin | Self::NotOwner | Self::Unauthorized | Self::SelfFollow => {
                ErrorKind::Authorization
            }
            Self::AlreadyExists | Self::AlreadyFollowing | Self::NotFollowing | Self::NotFound => {
                ErrorKind::StateConflict
            }
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists => Self::AlreadyExists,
            other => Self::StoreUnavailable(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
