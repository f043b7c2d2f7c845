//! Two-phase status poll that follows every DFU_DNLOAD.
//!
//! ```text
//! Requested --(dfuDNBUSY, OK)--> Busy --(wait poll timeout)--> dfuDNLOAD-IDLE: Committed
//!     \                             \
//!      `--> error                    `--> ReadOnlyProtection | InvalidAddress | DeviceError
//! ```

use std::fmt;
use std::time::Duration;

use super::DfuError;
use crate::protocol::status::{DfuState, DfuStatus, StatusCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// Header and payload sent, no status seen yet.
    Requested,
    /// Device accepted the block and asked us to wait before polling again.
    Busy { poll_timeout: Duration },
    /// The write landed.
    Committed,
}

impl Handshake {
    /// Feed one status reply into the handshake.
    pub fn advance(self, status: &DfuStatus) -> Result<Self, DfuError> {
        match self {
            Handshake::Requested => {
                if status.state != DfuState::DnBusy {
                    return Err(DfuError::UnexpectedState {
                        expected: DfuState::DnBusy,
                        actual: status.state,
                    });
                }
                if status.status != StatusCode::Ok {
                    return Err(DfuError::UnexpectedStatus {
                        status: status.status,
                        state: status.state,
                    });
                }
                Ok(Handshake::Busy {
                    poll_timeout: status.poll_timeout(),
                })
            }
            Handshake::Busy { .. } | Handshake::Committed => {
                if status.state == DfuState::DnloadIdle {
                    return Ok(Handshake::Committed);
                }
                Err(match status.status {
                    StatusCode::ErrVendor => DfuError::ReadOnlyProtection,
                    StatusCode::ErrTarget => DfuError::InvalidAddress,
                    other => DfuError::DeviceError {
                        status: other,
                        state: status.state,
                    },
                })
            }
        }
    }

    /// How long to wait before the next poll, if the device asked for a wait.
    pub fn backoff(&self) -> Option<Duration> {
        match self {
            Handshake::Busy { poll_timeout } => Some(*poll_timeout),
            _ => None,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Handshake::Committed)
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handshake::Requested => write!(f, "REQUESTED"),
            Handshake::Busy { poll_timeout } => write!(f, "BUSY({}ms)", poll_timeout.as_millis()),
            Handshake::Committed => write!(f, "COMMITTED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: StatusCode, state: DfuState, poll_timeout_ms: u32) -> DfuStatus {
        DfuStatus {
            status,
            poll_timeout_ms,
            state,
            string_index: 0,
        }
    }

    #[test]
    fn test_success_path() {
        let busy = Handshake::Requested
            .advance(&status(StatusCode::Ok, DfuState::DnBusy, 25))
            .unwrap();
        assert_eq!(busy.backoff(), Some(Duration::from_millis(25)));
        assert!(!busy.is_committed());

        let done = busy
            .advance(&status(StatusCode::Ok, DfuState::DnloadIdle, 0))
            .unwrap();
        assert!(done.is_committed());
        assert_eq!(done.backoff(), None);
    }

    #[test]
    fn test_not_busy_after_request() {
        let err = Handshake::Requested
            .advance(&status(StatusCode::Ok, DfuState::DfuIdle, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            DfuError::UnexpectedState {
                expected: DfuState::DnBusy,
                actual: DfuState::DfuIdle
            }
        ));
    }

    #[test]
    fn test_busy_with_error_status() {
        let err = Handshake::Requested
            .advance(&status(StatusCode::ErrWrite, DfuState::DnBusy, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            DfuError::UnexpectedStatus {
                status: StatusCode::ErrWrite,
                ..
            }
        ));
    }

    #[test]
    fn test_error_classification_after_backoff() {
        let busy = Handshake::Busy {
            poll_timeout: Duration::ZERO,
        };
        assert!(matches!(
            busy.advance(&status(StatusCode::ErrVendor, DfuState::Error, 0)),
            Err(DfuError::ReadOnlyProtection)
        ));
        assert!(matches!(
            busy.advance(&status(StatusCode::ErrTarget, DfuState::Error, 0)),
            Err(DfuError::InvalidAddress)
        ));
        assert!(matches!(
            busy.advance(&status(StatusCode::ErrProg, DfuState::Error, 0)),
            Err(DfuError::DeviceError {
                status: StatusCode::ErrProg,
                state: DfuState::Error
            })
        ));
        // Still busy after the wait is an error too
        assert!(matches!(
            busy.advance(&status(StatusCode::Ok, DfuState::DnBusy, 0)),
            Err(DfuError::DeviceError {
                status: StatusCode::Ok,
                state: DfuState::DnBusy
            })
        ));
    }
}
