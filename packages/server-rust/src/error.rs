//! Error taxonomy for request/response interactions over the bus.

use std::time::Duration;

use partyline_core::CodecError;

/// Errors surfaced to a caller waiting on a correlated interaction.
///
/// Listener-level decode failures never reach here: the bus has no sender to
/// report back to, so receivers drop and log them. Timeouts and
/// invalid-session rejections are always surfaced to the immediate caller.
/// No retries are built in; a caller wanting retry re-invokes the whole
/// cycle with a fresh correlation id.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// No response arrived within the deadline. Distinguishable from a
    /// negative answer, which is a normal response.
    #[error("no response within {timeout:?}")]
    Timeout { timeout: Duration },

    /// The session was invalid, or the degraded poller hit its deadline
    /// before identity and data both resolved.
    #[error("session invalid or data fetch deadline passed")]
    Unauthorized,

    /// The caller's own payload could not be encoded as an envelope.
    #[error(transparent)]
    Malformed(#[from] CodecError),

    /// The response listener went away before a reply arrived.
    #[error("response listener closed before a reply arrived")]
    Disconnected,

    /// The underlying transport rejected the publish.
    #[error(transparent)]
    Bus(#[from] anyhow::Error),
}

impl RequestError {
    /// Conventional HTTP-style status code for this failure, so callers can
    /// tell "no answer" (408) from "answered negatively" (403).
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Timeout { .. } => 408,
            Self::Unauthorized => 403,
            Self::Malformed(_) => 400,
            Self::Disconnected | Self::Bus(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_maps_to_408() {
        let err = RequestError::Timeout {
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.status_code(), 408);
    }

    #[test]
    fn unauthorized_maps_to_403() {
        assert_eq!(RequestError::Unauthorized.status_code(), 403);
    }

    #[test]
    fn timeout_display_names_the_deadline() {
        let err = RequestError::Timeout {
            timeout: Duration::from_secs(1),
        };
        assert!(err.to_string().contains("1s"));
    }
}
