//! USB Transport layer abstraction.
//!
//! Defines the `UsbTransport` trait for the two bulk pipes of the probe,
//! allowing different implementations (nusb, mock, etc.).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X}")]
    DeviceNotFound { vid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint 0x{address:02X} unavailable: {message}")]
    EndpointUnavailable { address: u8, message: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Short write: expected {expected} bytes, wrote {actual}")]
    ShortWrite { expected: usize, actual: usize },

    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Abstract USB transport interface.
///
/// One implementation owns the device handle for the whole session. Callers
/// never interleave requests: every `write` is followed by its `read` (if
/// any) before the next request goes out.
pub trait UsbTransport: Send + Sync {
    /// Write raw bytes to the bulk OUT endpoint.
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read up to `max_len` raw bytes from the bulk IN endpoint.
    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError>;

    /// Write the whole buffer, treating a short transfer as an error.
    fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let written = self.write(data)?;
        if written != data.len() {
            return Err(TransportError::ShortWrite {
                expected: data.len(),
                actual: written,
            });
        }
        Ok(())
    }

    /// Read exactly `len` bytes, treating a short transfer as an error.
    fn receive(&self, len: usize) -> Result<Vec<u8>, TransportError> {
        let bytes = self.read(len)?;
        if bytes.len() != len {
            return Err(TransportError::ShortRead {
                expected: len,
                actual: bytes.len(),
            });
        }
        Ok(bytes)
    }

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}
