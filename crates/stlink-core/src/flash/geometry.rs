//! Flash address to erase-sector translation.
//!
//! The probe MCU has 32 base-sized slots starting at [`FLASH_BASE`], laid
//! out as four base sectors, one 4x sector, then 8x sectors:
//!
//! ```text
//! offset:  0   1s  2s  3s  4s          8s                      16s ...
//! sector:  | 0 | 1 | 2 | 3 |     4     |           5           | 6 ...
//! ```

use thiserror::Error;

use crate::protocol::constants::{
    FLASH_BASE, FLASH_SECTOR_COUNT, PRODUCT_ID_LARGE_SECTORS, SECTOR_SIZE_DEFAULT,
    SECTOR_SIZE_LARGE,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("Invalid sector address 0x{address:08X} (flash window 0x{start:08X}..0x{end:08X})")]
    OutOfRange { address: u32, start: u32, end: u32 },
    #[error("Invalid erase range: 0x{address:08X} + {size} bytes")]
    InvalidRange { address: u32, size: u32 },
}

/// Base sector size for a target product id.
pub fn sector_size(product_id: u16) -> u32 {
    if product_id == PRODUCT_ID_LARGE_SECTORS {
        SECTOR_SIZE_LARGE
    } else {
        SECTOR_SIZE_DEFAULT
    }
}

/// End (exclusive) of the sector-addressable flash window.
pub fn flash_end(product_id: u16) -> u32 {
    FLASH_BASE + FLASH_SECTOR_COUNT * sector_size(product_id)
}

/// Map `address` to the index of the sector that contains it.
pub fn address_to_sector(product_id: u16, address: u32) -> Result<u8, GeometryError> {
    let size = sector_size(product_id);
    let end = flash_end(product_id);
    if !(FLASH_BASE..end).contains(&address) {
        return Err(GeometryError::OutOfRange {
            address,
            start: FLASH_BASE,
            end,
        });
    }

    let offset = address - FLASH_BASE;
    let sector = if offset < 4 * size {
        offset / size
    } else if offset < 8 * size {
        4
    } else {
        4 + offset / (8 * size)
    };
    Ok(sector as u8)
}

/// First address of `sector`.
pub fn sector_address(product_id: u16, sector: u8) -> u32 {
    let size = sector_size(product_id);
    let offset = match u32::from(sector) {
        s @ 0..=4 => s * size,
        s => (s - 4) * 8 * size,
    };
    FLASH_BASE + offset
}

/// Inclusive sector range covering `[address, address + size)`.
pub fn sector_range(
    product_id: u16,
    address: u32,
    size: u32,
) -> Result<std::ops::RangeInclusive<u8>, GeometryError> {
    let last = size
        .checked_sub(1)
        .and_then(|len| address.checked_add(len))
        .ok_or(GeometryError::InvalidRange { address, size })?;
    let start = address_to_sector(product_id, address)?;
    let end = address_to_sector(product_id, last)?;
    if end < start {
        return Err(GeometryError::InvalidRange { address, size });
    }
    Ok(start..=end)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LARGE: u16 = 0x449;
    const SMALL: u16 = 0x413;

    #[test]
    fn test_large_sector_boundaries() {
        assert_eq!(address_to_sector(LARGE, 0x0800_0000), Ok(0));
        assert_eq!(address_to_sector(LARGE, 0x0800_3FFF), Ok(0));
        assert_eq!(address_to_sector(LARGE, 0x0800_4000), Ok(0));
        assert_eq!(address_to_sector(LARGE, 0x0800_7FFF), Ok(0));
        assert_eq!(address_to_sector(LARGE, 0x0800_8000), Ok(1));
        assert_eq!(address_to_sector(LARGE, 0x0801_8000), Ok(3));
        assert_eq!(address_to_sector(LARGE, 0x0802_0000), Ok(4));
        assert_eq!(address_to_sector(LARGE, 0x0803_FFFF), Ok(4));
        assert_eq!(address_to_sector(LARGE, 0x0804_0000), Ok(5));
        assert_eq!(address_to_sector(LARGE, 0x080F_FFFF), Ok(7));
        assert!(address_to_sector(LARGE, 0x0810_0000).is_err());
    }

    #[test]
    fn test_default_sector_boundaries() {
        assert_eq!(address_to_sector(SMALL, 0x0800_0000), Ok(0));
        assert_eq!(address_to_sector(SMALL, 0x0800_3FFF), Ok(0));
        assert_eq!(address_to_sector(SMALL, 0x0800_4000), Ok(1));
        assert_eq!(address_to_sector(SMALL, 0x0800_FFFF), Ok(3));
        assert_eq!(address_to_sector(SMALL, 0x0801_0000), Ok(4));
        assert_eq!(address_to_sector(SMALL, 0x0801_FFFF), Ok(4));
        assert_eq!(address_to_sector(SMALL, 0x0802_0000), Ok(5));
        assert_eq!(address_to_sector(SMALL, 0x0807_FFFF), Ok(7));
        assert_eq!(
            address_to_sector(SMALL, 0x0808_0000),
            Err(GeometryError::OutOfRange {
                address: 0x0808_0000,
                start: 0x0800_0000,
                end: 0x0808_0000
            })
        );
    }

    #[test]
    fn test_below_flash_rejected() {
        assert!(matches!(
            address_to_sector(SMALL, 0x07FF_FFFF),
            Err(GeometryError::OutOfRange { .. })
        ));
        assert!(address_to_sector(LARGE, 0).is_err());
    }

    #[test]
    fn test_sector_address() {
        assert_eq!(sector_address(SMALL, 0), 0x0800_0000);
        assert_eq!(sector_address(SMALL, 3), 0x0800_C000);
        assert_eq!(sector_address(SMALL, 4), 0x0801_0000);
        assert_eq!(sector_address(SMALL, 5), 0x0802_0000);
        assert_eq!(sector_address(SMALL, 7), 0x0806_0000);
        assert_eq!(sector_address(LARGE, 1), 0x0800_8000);
        assert_eq!(sector_address(LARGE, 5), 0x0804_0000);
        for sector in 0..8 {
            let address = sector_address(SMALL, sector);
            assert_eq!(address_to_sector(SMALL, address), Ok(sector));
            assert_eq!(address_to_sector(SMALL, address - 1).ok(), sector.checked_sub(1));
        }
    }

    #[test]
    fn test_sector_range() {
        assert_eq!(sector_range(SMALL, 0x0800_C000, 0x14001), Ok(3..=5));
        assert_eq!(sector_range(SMALL, 0x0800_4000, 1), Ok(1..=1));
        assert_eq!(
            sector_range(SMALL, 0x0800_4000, 0),
            Err(GeometryError::InvalidRange {
                address: 0x0800_4000,
                size: 0
            })
        );
        assert!(sector_range(SMALL, 0x0807_0000, 0x20000).is_err());
        assert!(sector_range(SMALL, u32::MAX, 2).is_err());
    }
}
