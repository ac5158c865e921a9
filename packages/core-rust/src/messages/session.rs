//! Session and redirect handshake payloads.

use serde::{Deserialize, Serialize};

use super::Status;

/// Published on `auth/success` after a login is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSuccess {
    pub user_id: String,
    pub session_id: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "user".to_string()
}

/// Published on `app/ready` when a downstream unit has prepared a
/// destination for a freshly authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppReady {
    pub app_name: String,
    pub redirect_url: String,
    pub session_id: String,
}

/// Request on `session/query`: resolve a session id to its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionQuery {
    pub session_id: String,
}

/// Response on `session/info`.
///
/// `user_id` and `role` are null when `status` is [`Status::Invalid`]; the
/// wire keeps the keys present (explicit null) to match the original
/// protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub status: Status,
}

impl SessionInfo {
    /// A `status=valid` answer for a known session.
    #[must_use]
    pub fn valid(session_id: impl Into<String>, user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: Some(user_id.into()),
            role: Some(role.into()),
            status: Status::Valid,
        }
    }

    /// A `status=invalid` answer for an unknown session.
    #[must_use]
    pub fn invalid(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: None,
            role: None,
            status: Status::Invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_success_roundtrip() {
        let msg = AuthSuccess {
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            role: "admin".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: AuthSuccess = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn auth_success_role_defaults_to_user() {
        let msg: AuthSuccess =
            serde_json::from_str(r#"{"user_id": "u1", "session_id": "s1"}"#).unwrap();
        assert_eq!(msg.role, "user");
    }

    #[test]
    fn invalid_session_info_serializes_null_identity() {
        let json = serde_json::to_value(SessionInfo::invalid("s1")).unwrap();
        assert_eq!(json["status"], "invalid");
        assert!(json["user_id"].is_null());
        assert!(json["role"].is_null());
    }

    #[test]
    fn valid_session_info_carries_identity() {
        let info = SessionInfo::valid("s1", "u1", "admin");
        assert_eq!(info.user_id.as_deref(), Some("u1"));
        assert_eq!(info.status, Status::Valid);
    }

    #[test]
    fn session_info_decodes_without_identity_keys() {
        // Some producers omit the keys entirely rather than sending null.
        let info: SessionInfo =
            serde_json::from_str(r#"{"session_id": "s1", "status": "invalid"}"#).unwrap();
        assert_eq!(info.user_id, None);
        assert_eq!(info.role, None);
    }
}
