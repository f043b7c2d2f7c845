//! stlink-core: ST-Link probe firmware upgrade in Rust.
//!
//! This crate speaks the vendor variant of USB DFU that ST-Link V2/V2-1/V3
//! bootloaders understand, and can push a new probe firmware image.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Transport**: USB bulk pipe abstraction (nusb, mock)
//! - **Crypto**: Payload/key obfuscation behind the `Cipher` trait
//! - **Protocol**: Constants, request encodings, DFU status decoding
//! - **Info**: Probe identification and session key derivation
//! - **DFU**: Download engine and its status-poll state machine
//! - **Flash**: Sector geometry, erase commands, chunked image writing
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use stlink_core::session::{SessionConfig, StlinkSession};
//!
//! let config = SessionConfig {
//!     firmware_path: Some("stlink-v2-1.bin".to_string()),
//!     ..Default::default()
//! };
//!
//! let session = StlinkSession::new(config);
//! session.run().expect("flashing failed");
//! ```

pub mod crypto;
pub mod dfu;
pub mod events;
pub mod flash;
pub mod info;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use crypto::{Cipher, StlinkCipher};
pub use dfu::{DfuEngine, DfuError, Handshake};
pub use events::{FlashEvent, FlashObserver, FlashPhase, TracingObserver};
pub use flash::{FirmwareImage, FlashError, GeometryError, ImageFlasher, address_to_sector};
pub use info::{DeviceInfo, ProbeMode, VersionLayout};
pub use protocol::{DfuState, DfuStatus, StatusCode};
pub use session::{SessionConfig, StlinkSession};
pub use transport::{MockTransport, NusbTransport, TransportError, UsbTransport};
