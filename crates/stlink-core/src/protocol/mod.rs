//! Protocol module - ST-Link DFU protocol definitions.

pub mod constants;
pub mod header;
pub mod status;

pub use constants::*;
pub use header::{DownloadRequest, HeaderError, VendorCommand, checksum};
pub use status::{DfuState, DfuStatus, StatusCode};
