//! Media relay error types

use thiserror::Error;
use webmeet_core::{RoomId, UserId};

#[derive(Debug, Error)]
pub enum SfuError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP error (status {status}): {body}")]
    Http { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Janus error (code {code}): {reason}")]
    Janus { code: i64, reason: String },

    #[error("Plugin error (code {code}): {reason}")]
    Plugin { code: i64, reason: String },

    #[error("Unexpected response to {action}: expected {expected}, got {actual}")]
    UnexpectedStatus {
        action: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Response to {0} is missing its data")]
    MissingData(&'static str),

    #[error("No media session for user {user_id} in room {room_id}")]
    NoPublisher { room_id: RoomId, user_id: UserId },
}

/// Janus "no such session" error code
pub const JANUS_ERROR_SESSION_NOT_FOUND: i64 = 458;
/// VideoRoom "room already exists" error code
pub const VIDEOROOM_ERROR_ROOM_EXISTS: i64 = 427;

impl SfuError {
    #[must_use]
    pub fn is_room_exists(&self) -> bool {
        matches!(self, Self::Plugin { code, .. } if *code == VIDEOROOM_ERROR_ROOM_EXISTS)
    }

    #[must_use]
    pub fn is_session_not_found(&self) -> bool {
        matches!(self, Self::Janus { code, .. } if *code == JANUS_ERROR_SESSION_NOT_FOUND)
    }
}

impl From<reqwest::Error> for SfuError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SfuError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<SfuError> for webmeet_core::Error {
    fn from(err: SfuError) -> Self {
        match err {
            SfuError::Timeout(msg) => Self::Timeout(msg),
            err @ SfuError::NoPublisher { .. } => Self::NotFound(err.to_string()),
            other => Self::Sfu(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SfuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let exists = SfuError::Plugin {
            code: 427,
            reason: "Room 1234 already exists".to_string(),
        };
        assert!(exists.is_room_exists());
        assert!(!exists.is_session_not_found());

        let gone = SfuError::Janus {
            code: 458,
            reason: "No such session".to_string(),
        };
        assert!(gone.is_session_not_found());
    }

    #[test]
    fn test_conversion_to_core_error() {
        let err: webmeet_core::Error = SfuError::NoPublisher {
            room_id: RoomId::from("r1"),
            user_id: UserId::from("u1"),
        }
        .into();
        assert!(matches!(err, webmeet_core::Error::NotFound(_)));

        let err: webmeet_core::Error = SfuError::Timeout("attach".to_string()).into();
        assert!(matches!(err, webmeet_core::Error::Timeout(_)));

        let err: webmeet_core::Error = SfuError::Janus {
            code: 403,
            reason: "Unauthorized request".to_string(),
        }
        .into();
        assert!(matches!(err, webmeet_core::Error::Sfu(_)));
    }
}
