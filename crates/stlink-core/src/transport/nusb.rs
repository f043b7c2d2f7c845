//! nusb-based USB transport implementation.

use nusb::transfer::{Bulk, In, Out};
use nusb::{Interface, MaybeFuture, list_devices};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::{
    EP_IN, EP_OUT, STLINK_PRODUCT_IDS, STLINK_VENDOR_ID, USB_TIMEOUT_MS,
};

/// nusb-based USB transport.
pub struct NusbTransport {
    interface: Interface,
    in_endpoint: u8,
    out_endpoint: u8,
    timeout: Duration,
    vid: u16,
    pid: u16,
}

impl NusbTransport {
    /// Open the first ST-Link probe found (tries all known PIDs).
    #[instrument(level = "info")]
    pub fn open() -> Result<Self, TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        for device_info in devices {
            if device_info.vendor_id() == STLINK_VENDOR_ID
                && STLINK_PRODUCT_IDS.contains(&device_info.product_id())
            {
                return Self::open_device_info(device_info);
            }
        }

        Err(TransportError::DeviceNotFound {
            vid: STLINK_VENDOR_ID,
        })
    }

    fn open_device_info(device_info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found ST-Link"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let interface =
            device
                .claim_interface(0)
                .wait()
                .map_err(|e| TransportError::ClaimInterfaceFailed {
                    interface: 0,
                    message: e.to_string(),
                })?;

        info!(
            in_ep = %format!("0x{:02X}", EP_IN),
            out_ep = %format!("0x{:02X}", EP_OUT),
            "Device opened successfully"
        );

        Ok(Self {
            interface,
            in_endpoint: EP_IN,
            out_endpoint: EP_OUT,
            timeout: Duration::from_millis(USB_TIMEOUT_MS),
            vid,
            pid,
        })
    }

    fn map_io(&self, e: std::io::Error, wrap: fn(String) -> TransportError) -> TransportError {
        match e.kind() {
            ErrorKind::TimedOut => TransportError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            },
            ErrorKind::NotConnected | ErrorKind::BrokenPipe => TransportError::Disconnected,
            _ => wrap(e.to_string()),
        }
    }
}

impl UsbTransport for NusbTransport {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let ep = self
            .interface
            .endpoint::<Bulk, Out>(self.out_endpoint)
            .map_err(|e| TransportError::EndpointUnavailable {
                address: self.out_endpoint,
                message: e.to_string(),
            })?;

        let mut writer = ep.writer(4096).with_write_timeout(self.timeout);
        writer
            .write_all(data)
            .map_err(|e| self.map_io(e, TransportError::WriteFailed))?;
        writer
            .flush()
            .map_err(|e| self.map_io(e, TransportError::WriteFailed))?;

        debug!(bytes_written = data.len(), "Write complete");
        Ok(data.len())
    }

    #[instrument(skip(self), fields(max_len))]
    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let ep = self
            .interface
            .endpoint::<Bulk, In>(self.in_endpoint)
            .map_err(|e| TransportError::EndpointUnavailable {
                address: self.in_endpoint,
                message: e.to_string(),
            })?;

        let mut reader = ep.reader(4096).with_read_timeout(self.timeout);
        let mut buf = vec![0u8; max_len];

        let n = reader
            .read(&mut buf)
            .map_err(|e| self.map_io(e, TransportError::ReadFailed))?;

        buf.truncate(n);
        debug!(bytes_read = n, "Read complete");
        Ok(buf)
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
