//! Protocol-version handshake for CLI compatibility.

use crate::error::{Error, Result};

/// The wire protocol version this SDK was built against. The CLI reports
/// its own version in every `ping` response and the two must match exactly.
pub const PROTOCOL_VERSION: i64 = 1;

/// Validate the protocol version reported by the CLI server.
///
/// Called once right after connecting, with the `protocolVersion` field of
/// the first `ping` response. A missing or different version fails the
/// start with a diagnostic instructing an upgrade.
pub(crate) fn check_protocol_version(reported: Option<i64>) -> Result<()> {
    match reported {
        Some(version) if version == PROTOCOL_VERSION => Ok(()),
        _ => Err(Error::ProtocolMismatch {
            expected: PROTOCOL_VERSION,
            actual: reported,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_version_passes() {
        assert!(check_protocol_version(Some(PROTOCOL_VERSION)).is_ok());
    }

    #[test]
    fn test_missing_version_instructs_server_upgrade() {
        let err = check_protocol_version(None).unwrap_err();
        assert!(matches!(
            &err,
            Error::ProtocolMismatch {
                expected: PROTOCOL_VERSION,
                actual: None,
            }
        ));
        let message = err.to_string();
        assert!(message.contains("does not report a protocol version"));
        assert!(message.contains("update your server"));
    }

    #[test]
    fn test_mismatched_version_instructs_upgrade() {
        let err = check_protocol_version(Some(PROTOCOL_VERSION + 1)).unwrap_err();
        match &err {
            Error::ProtocolMismatch { expected, actual } => {
                assert_eq!(*expected, PROTOCOL_VERSION);
                assert_eq!(*actual, Some(PROTOCOL_VERSION + 1));
            }
            other => panic!("expected ProtocolMismatch, got {:?}", other),
        }
        let message = err.to_string();
        assert!(message.contains("SDK protocol version mismatch"));
        assert!(message.contains("update your SDK or server"));
    }
}
