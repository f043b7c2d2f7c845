//! Event system for UI decoupling.
//!
//! Lets the CLI (or any other front end) follow a session without the core
//! printing anything itself.

use std::fmt;

/// Session phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashPhase {
    /// Opening the probe and checking its mode.
    Connecting,
    /// Querying versions and deriving the session key.
    Identify,
    /// Erasing the destination region.
    Erasing,
    /// Streaming firmware chunks.
    Writing,
    /// Leaving DFU mode.
    Exiting,
    /// All operations complete.
    Complete,
}

impl fmt::Display for FlashPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashPhase::Connecting => write!(f, "Connecting"),
            FlashPhase::Identify => write!(f, "Identify"),
            FlashPhase::Erasing => write!(f, "Erasing"),
            FlashPhase::Writing => write!(f, "Writing"),
            FlashPhase::Exiting => write!(f, "Exiting"),
            FlashPhase::Complete => write!(f, "Complete"),
        }
    }
}

/// USB packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx,
    Rx,
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Events emitted while talking to the probe.
#[derive(Debug, Clone)]
pub enum FlashEvent {
    /// Device opened.
    DeviceConnected { vid: u16, pid: u16 },
    /// Probe identified.
    DeviceIdentified { description: String },
    /// Phase changed.
    PhaseChanged { from: FlashPhase, to: FlashPhase },
    /// One sector or page erase committed.
    Erased { address: u32, sector: Option<u8> },
    /// One chunk committed.
    Progress { written: u64, total: u64 },
    /// USB packet sent/received.
    Packet {
        direction: PacketDirection,
        length: usize,
        data: Vec<u8>,
    },
    /// All operations completed successfully.
    Complete,
}

/// Observer trait for receiving session events.
pub trait FlashObserver: Send + Sync {
    fn on_event(&self, event: &FlashEvent);
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl FlashObserver for TracingObserver {
    fn on_event(&self, event: &FlashEvent) {
        match event {
            FlashEvent::DeviceConnected { vid, pid } => {
                tracing::info!(vid = %format!("{:04X}", vid), pid = %format!("{:04X}", pid), "Device connected");
            }
            FlashEvent::DeviceIdentified { description } => {
                tracing::info!("{}", description);
            }
            FlashEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            FlashEvent::Erased { address, sector } => match sector {
                Some(sector) => tracing::debug!(
                    sector,
                    address = %format!("0x{:08X}", address),
                    "Sector erased"
                ),
                None => tracing::debug!(address = %format!("0x{:08X}", address), "Page erased"),
            },
            FlashEvent::Progress { written, total } => {
                let pct = if *total > 0 { (*written * 100) / *total } else { 0 };
                tracing::debug!(written, total, progress = %format!("{}%", pct), "Progress");
            }
            FlashEvent::Packet {
                direction, length, ..
            } => {
                tracing::trace!(dir = %direction, len = length, "USB Packet");
            }
            FlashEvent::Complete => {
                tracing::info!("Operation complete");
            }
        }
    }
}
