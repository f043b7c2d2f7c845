//! DFU download engine.
//!
//! Every write to the probe, whether a vendor command or a firmware block,
//! goes through [`DfuEngine::download`]: header, payload, then the
//! [`Handshake`] status polls.

pub mod handshake;

use std::thread;
use thiserror::Error;
use tracing::{debug, instrument, trace};

pub use handshake::Handshake;

use crate::crypto::Cipher;
use crate::info::DeviceInfo;
use crate::protocol::constants::{FIRST_DATA_BLOCK, KEY_V3_PAYLOAD};
use crate::protocol::header::{
    DownloadRequest, HeaderError, VendorCommand, exit_request, status_request,
};
use crate::protocol::status::{DfuState, DfuStatus, StatusCode};
use crate::transport::{TransportError, UsbTransport};

#[derive(Error, Debug)]
pub enum DfuError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed reply: {0}")]
    Malformed(#[from] HeaderError),

    #[error("Unexpected DFU state: expected {expected}, got {actual}")]
    UnexpectedState { expected: DfuState, actual: DfuState },

    #[error("Unexpected DFU status {status} in state {state}")]
    UnexpectedStatus { status: StatusCode, state: DfuState },

    #[error("Read-only protection active")]
    ReadOnlyProtection,

    #[error("Invalid address error")]
    InvalidAddress,

    #[error("Download failed: {status} in state {state}")]
    DeviceError { status: StatusCode, state: DfuState },

    #[error("Block {block_num} carries firmware and needs the session key")]
    MissingFirmwareKey { block_num: u16 },

    #[error("Payload of {len} bytes does not fit the 16-bit length field")]
    PayloadTooLarge { len: usize },
}

/// Issues DFU requests over a transport, obfuscating firmware blocks with a cipher.
pub struct DfuEngine<'a, T: UsbTransport, C: Cipher> {
    transport: &'a T,
    cipher: &'a C,
}

impl<'a, T: UsbTransport, C: Cipher> DfuEngine<'a, T, C> {
    pub fn new(transport: &'a T, cipher: &'a C) -> Self {
        Self { transport, cipher }
    }

    /// Send GET_STATUS and decode the 6-byte reply.
    pub fn status(&self) -> Result<DfuStatus, DfuError> {
        self.transport.send(&status_request())?;
        let reply = self.transport.receive(DfuStatus::SIZE)?;
        let status = DfuStatus::from_bytes(&reply)?;
        trace!(status = %status, "GET_STATUS");
        Ok(status)
    }

    /// Download `payload` as block `block_num` and wait for the device to commit it.
    ///
    /// Blocks at or above [`FIRST_DATA_BLOCK`] are firmware: they are encrypted
    /// in place with the session key from `info` (preceded by an extra pass on
    /// V3 probes), so `payload` no longer holds plaintext afterwards.
    #[instrument(skip(self, payload, info), fields(len = payload.len()))]
    pub fn download(
        &self,
        payload: &mut [u8],
        block_num: u16,
        info: Option<&DeviceInfo>,
    ) -> Result<(), DfuError> {
        let length = u16::try_from(payload.len())
            .map_err(|_| DfuError::PayloadTooLarge { len: payload.len() })?;

        let request = if block_num >= FIRST_DATA_BLOCK {
            let info = info.ok_or(DfuError::MissingFirmwareKey { block_num })?;
            if info.probe_version == 3 {
                self.cipher.encrypt_in_place(KEY_V3_PAYLOAD, payload);
            }
            // The checksum covers the payload before the session key is applied
            let request = DownloadRequest::new(block_num, payload, length);
            self.cipher.encrypt_in_place(&info.firmware_key, payload);
            request
        } else {
            DownloadRequest::new(block_num, payload, length)
        };

        self.transport.send(&request.to_bytes())?;
        self.transport.send(payload)?;

        let mut phase = Handshake::Requested;
        while !phase.is_committed() {
            let status = self.status()?;
            phase = phase.advance(&status)?;
            debug!(phase = %phase, "Download handshake");
            if let Some(wait) = phase.backoff() {
                thread::sleep(wait);
            }
        }
        Ok(())
    }

    /// Send a vendor command as a block 0 download.
    pub fn vendor_command(&self, command: VendorCommand) -> Result<(), DfuError> {
        debug!(command = ?command, "Vendor command");
        let mut payload = command.to_bytes();
        self.download(&mut payload, 0, None)
    }

    /// Point the device's write cursor at `address`.
    pub fn set_address(&self, address: u32) -> Result<(), DfuError> {
        self.vendor_command(VendorCommand::SetAddress(address))
    }

    /// Leave DFU mode. The probe re-enumerates, so no reply is read.
    #[instrument(skip(self))]
    pub fn exit_dfu(&self) -> Result<(), DfuError> {
        self.transport.send(&exit_request())?;
        Ok(())
    }
}
