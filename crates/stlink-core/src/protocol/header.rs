//! Command and request encodings for the ST-Link DFU protocol.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::protocol::constants::*;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Low 16 bits of the byte sum of `data`, as expected in `wIndex`.
pub fn checksum(data: &[u8]) -> u16 {
    data.iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(b as u32)) as u16
}

/// Zero-padded 16-byte command starting with `prefix`.
pub fn command(prefix: &[u8]) -> [u8; COMMAND_SIZE] {
    let mut buf = [0u8; COMMAND_SIZE];
    buf[..prefix.len()].copy_from_slice(prefix);
    buf
}

/// DFU GET_STATUS request; `wLength` carries the expected reply size.
pub fn status_request() -> [u8; COMMAND_SIZE] {
    let mut buf = command(&[CMD_DFU, DFU_GETSTATUS]);
    LittleEndian::write_u16(&mut buf[6..8], DFU_STATUS_REPLY_SIZE as u16);
    buf
}

/// DFU_EXIT request, which makes the probe leave the bootloader.
pub fn exit_request() -> [u8; COMMAND_SIZE] {
    command(&[CMD_DFU, DFU_EXIT])
}

/// Header announcing a DFU_DNLOAD payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadRequest {
    pub block_num: u16,
    pub checksum: u16,
    pub length: u16,
}

impl DownloadRequest {
    pub const SIZE: usize = COMMAND_SIZE;

    pub fn new(block_num: u16, payload: &[u8], length: u16) -> Self {
        Self {
            block_num,
            checksum: checksum(payload),
            length,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = command(&[CMD_DFU, DFU_DNLOAD]);
        LittleEndian::write_u16(&mut buf[2..4], self.block_num);
        LittleEndian::write_u16(&mut buf[4..6], self.checksum);
        LittleEndian::write_u16(&mut buf[6..8], self.length);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            block_num: LittleEndian::read_u16(&data[2..4]),
            checksum: LittleEndian::read_u16(&data[4..6]),
            length: LittleEndian::read_u16(&data[6..8]),
        })
    }
}

/// Vendor commands sent as block 0 downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorCommand {
    /// Point the device's write cursor at a flash address.
    SetAddress(u32),
    /// Erase the page(s) containing an address.
    ErasePages(u32),
    /// Erase one sector by index.
    EraseSector(u8),
}

impl VendorCommand {
    pub fn to_bytes(&self) -> [u8; VENDOR_COMMAND_SIZE] {
        let mut buf = [0u8; VENDOR_COMMAND_SIZE];
        match *self {
            VendorCommand::SetAddress(address) => {
                buf[0] = SET_ADDRESS_POINTER_COMMAND;
                LittleEndian::write_u32(&mut buf[1..], address);
            }
            VendorCommand::ErasePages(address) => {
                buf[0] = ERASE_PAGES_COMMAND;
                LittleEndian::write_u32(&mut buf[1..], address);
            }
            VendorCommand::EraseSector(sector) => {
                buf[0] = ERASE_SECTORS_COMMAND;
                buf[1] = sector;
            }
        }
        buf
    }
}
