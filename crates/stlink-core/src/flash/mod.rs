//! Flash layout, erase and image writing.

pub mod erase;
pub mod flasher;
pub mod geometry;
pub mod image;

use thiserror::Error;

use crate::dfu::DfuError;
pub use erase::{erase_pages, erase_sectors};
pub use flasher::ImageFlasher;
pub use geometry::{GeometryError, address_to_sector, sector_address, sector_range, sector_size};
pub use image::{Chunk, FirmwareImage, PAD_BYTE};

#[derive(Error, Debug)]
pub enum FlashError {
    #[error("Firmware image is empty")]
    EmptyImage,
    #[error("Firmware image of {size} bytes does not fit the address space")]
    ImageTooLarge { size: usize },
    #[error("Failed to load firmware {path}: {source}")]
    ImageLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid chunk size {chunk_size} (must be 1..=65535)")]
    InvalidChunkSize { chunk_size: usize },
    #[error("Invalid base address 0x{address:08X}")]
    InvalidBaseAddress { address: u32 },
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),
    #[error("DFU error: {0}")]
    Dfu(#[from] DfuError),
}
