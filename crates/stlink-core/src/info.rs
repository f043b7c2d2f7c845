//! Probe capability discovery and session key derivation.
//!
//! Three request/response round trips are made once per session:
//!
//! - GET_VERSION (6-byte reply), whose high nibble selects the reply layout
//! - GET_VERSION_EXT (12-byte reply), only for probe generation 3 and later
//! - READ_UNIQUE_ID (20-byte reply), which yields the device id and the key material

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use tracing::{debug, info, instrument};

use crate::crypto::{Cipher, KEY_SIZE};
use crate::protocol::constants::*;
use crate::protocol::header::command;
use crate::transport::{TransportError, UsbTransport};

pub const DEVICE_ID_SIZE: usize = 12;

/// Reply layout of the version query, selected by probe generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionLayout {
    /// V1/V2: versions bit-packed into the 6-byte GET_VERSION reply.
    Packed,
    /// V3: product id in GET_VERSION, versions in the GET_VERSION_EXT reply.
    Extended,
}

impl VersionLayout {
    pub fn for_probe(probe_version: u8) -> Self {
        if probe_version < 3 {
            VersionLayout::Packed
        } else {
            VersionLayout::Extended
        }
    }

    /// Cipher key used to derive the session firmware key.
    pub fn key_seed(&self) -> &'static [u8; KEY_SIZE] {
        match self {
            VersionLayout::Packed => KEY_LEGACY,
            VersionLayout::Extended => KEY_V3,
        }
    }

    /// Default application base for this generation.
    pub fn application_base(&self) -> u32 {
        match self {
            VersionLayout::Packed => APPLICATION_BASE_LEGACY,
            VersionLayout::Extended => APPLICATION_BASE_V3,
        }
    }
}

/// Sub-component versions decoded from the version replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentVersions {
    pub jtag: u8,
    pub swim: u8,
    pub loader: u16,
}

impl ComponentVersions {
    /// Decode from the 6-byte GET_VERSION reply of a V1/V2 probe.
    pub fn from_packed(reply: &[u8]) -> Self {
        Self {
            jtag: (reply[0] & 0x0F) << 2 | (reply[1] & 0xC0) >> 6,
            swim: reply[1] & 0x3F,
            loader: LittleEndian::read_u16(&reply[4..6]),
        }
    }

    /// Decode from the 12-byte GET_VERSION_EXT reply of a V3 probe.
    pub fn from_extended(reply: &[u8]) -> Self {
        Self {
            jtag: reply[2],
            swim: reply[1],
            loader: LittleEndian::read_u16(&reply[10..12]),
        }
    }
}

/// Probe identity, resolved once per session.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub probe_version: u8,
    pub jtag_version: u8,
    pub swim_version: u8,
    pub loader_version: u16,
    /// Target MCU id, only reported by V3 probes (0 otherwise).
    pub product_id: u16,
    pub device_id: [u8; DEVICE_ID_SIZE],
    pub firmware_key: [u8; KEY_SIZE],
}

impl DeviceInfo {
    /// Query the probe and derive the session firmware key.
    #[instrument(skip_all)]
    pub fn resolve<T: UsbTransport, C: Cipher>(
        transport: &T,
        cipher: &C,
    ) -> Result<Self, TransportError> {
        transport.send(&command(&CMD_GET_VERSION))?;
        let version = transport.receive(GET_VERSION_REPLY_SIZE)?;
        debug!(reply = ?version, "GET_VERSION");

        let probe_version = version[0] >> 4;
        let layout = VersionLayout::for_probe(probe_version);

        let (versions, product_id) = match layout {
            VersionLayout::Packed => (ComponentVersions::from_packed(&version), 0),
            VersionLayout::Extended => {
                let product_id = LittleEndian::read_u16(&version[2..4]);
                transport.send(&command(&CMD_GET_VERSION_EXT))?;
                let ext = transport.receive(GET_VERSION_EXT_REPLY_SIZE)?;
                debug!(reply = ?ext, "GET_VERSION_EXT");
                (ComponentVersions::from_extended(&ext), product_id)
            }
        };

        transport.send(&command(&CMD_READ_UNIQUE_ID))?;
        let identity = transport.receive(READ_UNIQUE_ID_REPLY_SIZE)?;

        let mut device_id = [0u8; DEVICE_ID_SIZE];
        device_id.copy_from_slice(&identity[8..20]);
        let firmware_key = derive_firmware_key(cipher, layout, &identity);

        let info = Self {
            probe_version,
            jtag_version: versions.jtag,
            swim_version: versions.swim,
            loader_version: versions.loader,
            product_id,
            device_id,
            firmware_key,
        };
        info!(
            probe = info.probe_version,
            jtag = info.jtag_version,
            swim = info.swim_version,
            loader = info.loader_version,
            product_id = %format!("0x{:03X}", info.product_id),
            device_id = %info.device_id_hex(),
            "Probe identified"
        );
        Ok(info)
    }

    pub fn layout(&self) -> VersionLayout {
        VersionLayout::for_probe(self.probe_version)
    }

    pub fn device_id_hex(&self) -> String {
        self.device_id.iter().map(|b| format!("{:02X}", b)).collect()
    }
}

// The firmware key is session material; keep it out of logs.
impl fmt::Debug for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceInfo")
            .field("probe_version", &self.probe_version)
            .field("jtag_version", &self.jtag_version)
            .field("swim_version", &self.swim_version)
            .field("loader_version", &self.loader_version)
            .field("product_id", &self.product_id)
            .field("device_id", &self.device_id_hex())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ST-Link V{} (JTAG v{}, SWIM v{}, loader v{}), id {}",
            self.probe_version,
            self.jtag_version,
            self.swim_version,
            self.loader_version,
            self.device_id_hex()
        )?;
        if self.product_id != 0 {
            write!(f, ", product 0x{:03X}", self.product_id)?;
        }
        Ok(())
    }
}

/// Build the session key from a READ_UNIQUE_ID reply: bytes 0..4 followed by
/// bytes 8..20, encrypted with the generation's seed key.
pub fn derive_firmware_key<C: Cipher>(
    cipher: &C,
    layout: VersionLayout,
    identity: &[u8],
) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    key[..4].copy_from_slice(&identity[..4]);
    key[4..].copy_from_slice(&identity[8..20]);
    cipher.encrypt_in_place(layout.key_seed(), &mut key);
    key
}

/// Operating mode reported by GET_CURRENT_MODE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    Dfu,
    MassStorage,
    Debug,
    Swim,
    Bootloader,
    Unknown(u8),
}

impl From<u8> for ProbeMode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ProbeMode::Dfu,
            0x01 => ProbeMode::MassStorage,
            0x02 => ProbeMode::Debug,
            0x03 => ProbeMode::Swim,
            0x04 => ProbeMode::Bootloader,
            other => ProbeMode::Unknown(other),
        }
    }
}

impl fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeMode::Dfu => write!(f, "DFU"),
            ProbeMode::MassStorage => write!(f, "mass storage"),
            ProbeMode::Debug => write!(f, "debug"),
            ProbeMode::Swim => write!(f, "SWIM"),
            ProbeMode::Bootloader => write!(f, "bootloader"),
            ProbeMode::Unknown(v) => write!(f, "unknown mode 0x{:02X}", v),
        }
    }
}

/// Query the probe's current mode. The raw reply is `mode << 8 | sub-mode`.
#[instrument(skip_all)]
pub fn current_mode<T: UsbTransport>(transport: &T) -> Result<ProbeMode, TransportError> {
    transport.send(&command(&[CMD_GET_CURRENT_MODE]))?;
    let reply = transport.receive(GET_CURRENT_MODE_REPLY_SIZE)?;
    let raw = (reply[0] as u16) << 8 | reply[1] as u16;
    let mode = ProbeMode::from(reply[0]);
    debug!(raw = %format!("0x{:04X}", raw), mode = %mode, "Current mode");
    Ok(mode)
}
