//! Firmware image loading and chunking.

use std::path::Path;
use tracing::info;

use super::FlashError;
use crate::protocol::constants::FLASH_BASE;

/// Fill byte for the tail of the last chunk (erased flash).
pub const PAD_BYTE: u8 = 0xFF;

/// Raw probe firmware, flashed verbatim.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    data: Vec<u8>,
}

impl FirmwareImage {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, FlashError> {
        if data.is_empty() {
            return Err(FlashError::EmptyImage);
        }
        if u32::try_from(data.len()).is_err() {
            return Err(FlashError::ImageTooLarge { size: data.len() });
        }
        Ok(Self { data })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FlashError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| FlashError::ImageLoad {
            path: path.display().to_string(),
            source,
        })?;
        info!(path = %path.display(), size = data.len(), "Loaded firmware");
        Self::from_bytes(data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Split into `chunk_size` pieces addressed from `base`, the last padded
    /// with [`PAD_BYTE`].
    pub fn chunks(&self, base: u32, chunk_size: usize) -> Result<Chunks<'_>, FlashError> {
        if chunk_size == 0 || u16::try_from(chunk_size).is_err() {
            return Err(FlashError::InvalidChunkSize { chunk_size });
        }
        let end = base as u64 + self.data.len() as u64;
        if base < FLASH_BASE || end > u32::MAX as u64 + 1 {
            return Err(FlashError::InvalidBaseAddress { address: base });
        }
        Ok(Chunks {
            data: &self.data,
            base,
            chunk_size,
            offset: 0,
        })
    }
}

/// One padded write unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub address: u32,
    /// Image bytes carried, before padding.
    pub len: usize,
    pub data: Vec<u8>,
}

pub struct Chunks<'a> {
    data: &'a [u8],
    base: u32,
    chunk_size: usize,
    offset: usize,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.offset >= self.data.len() {
            return None;
        }
        let len = self.chunk_size.min(self.data.len() - self.offset);
        let mut data = vec![PAD_BYTE; self.chunk_size];
        data[..len].copy_from_slice(&self.data[self.offset..self.offset + len]);
        let chunk = Chunk {
            address: self.base + self.offset as u32,
            len,
            data,
        };
        self.offset += len;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.data.len() - self.offset).div_ceil(self.chunk_size);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_pad_last() {
        let image = FirmwareImage::from_bytes((0..100u8).collect()).unwrap();
        let chunks: Vec<_> = image.chunks(0x0800_4000, 64).unwrap().collect();
        assert_eq!(chunks.len(), 2);

        assert_eq!(chunks[0].address, 0x0800_4000);
        assert_eq!(chunks[0].len, 64);
        assert_eq!(chunks[0].data, (0..64u8).collect::<Vec<_>>());

        assert_eq!(chunks[1].address, 0x0800_4040);
        assert_eq!(chunks[1].len, 36);
        assert_eq!(chunks[1].data.len(), 64);
        assert_eq!(chunks[1].data[..36], (64..100u8).collect::<Vec<_>>()[..]);
        assert!(chunks[1].data[36..].iter().all(|&b| b == PAD_BYTE));
    }

    #[test]
    fn test_exact_multiple_has_no_padding_chunk() {
        let image = FirmwareImage::from_bytes(vec![0; 128]).unwrap();
        let chunks = image.chunks(0x0800_0000, 64).unwrap();
        assert_eq!(chunks.size_hint(), (2, Some(2)));
        assert!(chunks.into_iter().all(|c| c.len == 64));
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(matches!(
            FirmwareImage::from_bytes(Vec::new()),
            Err(FlashError::EmptyImage)
        ));
        let image = FirmwareImage::from_bytes(vec![0; 16]).unwrap();
        assert!(matches!(
            image.chunks(0x0800_0000, 0),
            Err(FlashError::InvalidChunkSize { chunk_size: 0 })
        ));
        assert!(matches!(
            image.chunks(0x0800_0000, 0x10000),
            Err(FlashError::InvalidChunkSize { .. })
        ));
        assert!(matches!(
            image.chunks(0x0000_1000, 64),
            Err(FlashError::InvalidBaseAddress { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = FirmwareImage::from_file("/nonexistent/stlink-firmware.bin").unwrap_err();
        assert!(matches!(err, FlashError::ImageLoad { .. }));
    }
}
