//! DFU status reply decoding.
//!
//! State and status codes follow the USB DFU 1.1 numbering; the probe only
//! uses a handful of them but reports any of them.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;
use std::time::Duration;

use super::header::HeaderError;
use crate::protocol::constants::DFU_STATUS_REPLY_SIZE;

/// Device-reported DFU state (`bState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfuState {
    AppIdle,
    AppDetach,
    DfuIdle,
    DnloadSync,
    DnBusy,
    DnloadIdle,
    ManifestSync,
    Manifest,
    ManifestWaitReset,
    UploadIdle,
    Error,
    Other(u8),
}

impl From<u8> for DfuState {
    fn from(value: u8) -> Self {
        match value {
            0 => DfuState::AppIdle,
            1 => DfuState::AppDetach,
            2 => DfuState::DfuIdle,
            3 => DfuState::DnloadSync,
            4 => DfuState::DnBusy,
            5 => DfuState::DnloadIdle,
            6 => DfuState::ManifestSync,
            7 => DfuState::Manifest,
            8 => DfuState::ManifestWaitReset,
            9 => DfuState::UploadIdle,
            10 => DfuState::Error,
            other => DfuState::Other(other),
        }
    }
}

impl From<DfuState> for u8 {
    fn from(state: DfuState) -> Self {
        match state {
            DfuState::AppIdle => 0,
            DfuState::AppDetach => 1,
            DfuState::DfuIdle => 2,
            DfuState::DnloadSync => 3,
            DfuState::DnBusy => 4,
            DfuState::DnloadIdle => 5,
            DfuState::ManifestSync => 6,
            DfuState::Manifest => 7,
            DfuState::ManifestWaitReset => 8,
            DfuState::UploadIdle => 9,
            DfuState::Error => 10,
            DfuState::Other(v) => v,
        }
    }
}

impl fmt::Display for DfuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DfuState::AppIdle => write!(f, "appIDLE"),
            DfuState::AppDetach => write!(f, "appDETACH"),
            DfuState::DfuIdle => write!(f, "dfuIDLE"),
            DfuState::DnloadSync => write!(f, "dfuDNLOAD-SYNC"),
            DfuState::DnBusy => write!(f, "dfuDNBUSY"),
            DfuState::DnloadIdle => write!(f, "dfuDNLOAD-IDLE"),
            DfuState::ManifestSync => write!(f, "dfuMANIFEST-SYNC"),
            DfuState::Manifest => write!(f, "dfuMANIFEST"),
            DfuState::ManifestWaitReset => write!(f, "dfuMANIFEST-WAIT-RESET"),
            DfuState::UploadIdle => write!(f, "dfuUPLOAD-IDLE"),
            DfuState::Error => write!(f, "dfuERROR"),
            DfuState::Other(v) => write!(f, "unknown state {}", v),
        }
    }
}

/// Device-reported outcome of the last operation (`bStatus`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    ErrTarget,
    ErrFile,
    ErrWrite,
    ErrErase,
    ErrCheckErased,
    ErrProg,
    ErrVerify,
    ErrAddress,
    ErrNotDone,
    ErrFirmware,
    ErrVendor,
    ErrUsbReset,
    ErrPowerOnReset,
    ErrUnknown,
    ErrStalledPacket,
    Other(u8),
}

impl From<u8> for StatusCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => StatusCode::Ok,
            0x01 => StatusCode::ErrTarget,
            0x02 => StatusCode::ErrFile,
            0x03 => StatusCode::ErrWrite,
            0x04 => StatusCode::ErrErase,
            0x05 => StatusCode::ErrCheckErased,
            0x06 => StatusCode::ErrProg,
            0x07 => StatusCode::ErrVerify,
            0x08 => StatusCode::ErrAddress,
            0x09 => StatusCode::ErrNotDone,
            0x0A => StatusCode::ErrFirmware,
            0x0B => StatusCode::ErrVendor,
            0x0C => StatusCode::ErrUsbReset,
            0x0D => StatusCode::ErrPowerOnReset,
            0x0E => StatusCode::ErrUnknown,
            0x0F => StatusCode::ErrStalledPacket,
            other => StatusCode::Other(other),
        }
    }
}

impl From<StatusCode> for u8 {
    fn from(code: StatusCode) -> Self {
        match code {
            StatusCode::Ok => 0x00,
            StatusCode::ErrTarget => 0x01,
            StatusCode::ErrFile => 0x02,
            StatusCode::ErrWrite => 0x03,
            StatusCode::ErrErase => 0x04,
            StatusCode::ErrCheckErased => 0x05,
            StatusCode::ErrProg => 0x06,
            StatusCode::ErrVerify => 0x07,
            StatusCode::ErrAddress => 0x08,
            StatusCode::ErrNotDone => 0x09,
            StatusCode::ErrFirmware => 0x0A,
            StatusCode::ErrVendor => 0x0B,
            StatusCode::ErrUsbReset => 0x0C,
            StatusCode::ErrPowerOnReset => 0x0D,
            StatusCode::ErrUnknown => 0x0E,
            StatusCode::ErrStalledPacket => 0x0F,
            StatusCode::Other(v) => v,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Ok => write!(f, "OK"),
            StatusCode::Other(v) => write!(f, "status 0x{:02X}", v),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Decoded GET_STATUS reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfuStatus {
    pub status: StatusCode,
    /// 24-bit backoff before the next poll, in milliseconds.
    pub poll_timeout_ms: u32,
    pub state: DfuState,
    pub string_index: u8,
}

impl DfuStatus {
    pub const SIZE: usize = DFU_STATUS_REPLY_SIZE;

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        let status = StatusCode::from(cursor.read_u8()?);
        let poll_timeout_ms = cursor.read_u24::<LittleEndian>()?;
        let state = DfuState::from(cursor.read_u8()?);
        let string_index = cursor.read_u8()?;
        Ok(Self {
            status,
            poll_timeout_ms,
            state,
            string_index,
        })
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms as u64)
    }
}

impl fmt::Display for DfuStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} (poll {}ms)",
            self.state, self.status, self.poll_timeout_ms
        )
    }
}
