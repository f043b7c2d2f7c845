//! Page and sector erase commands.

use std::ops::RangeInclusive;
use tracing::{debug, instrument};

use super::FlashError;
use super::geometry::sector_range;
use crate::crypto::Cipher;
use crate::dfu::{DfuEngine, DfuError};
use crate::info::DeviceInfo;
use crate::protocol::header::VendorCommand;
use crate::transport::UsbTransport;

/// Erase the page containing `address` (V1/V2 bootloaders).
pub fn erase_pages<T: UsbTransport, C: Cipher>(
    engine: &DfuEngine<'_, T, C>,
    address: u32,
) -> Result<(), DfuError> {
    debug!(address = %format!("0x{:08X}", address), "Erasing page");
    engine.vendor_command(VendorCommand::ErasePages(address))
}

/// Erase every sector touched by `[address, address + size)`, lowest first.
///
/// The range is validated before any command is sent. Returns the sectors
/// erased; stops at the first failing erase.
#[instrument(skip(engine, info))]
pub fn erase_sectors<T: UsbTransport, C: Cipher>(
    engine: &DfuEngine<'_, T, C>,
    info: &DeviceInfo,
    address: u32,
    size: u32,
) -> Result<RangeInclusive<u8>, FlashError> {
    let sectors = sector_range(info.product_id, address, size)?;
    for sector in sectors.clone() {
        debug!(sector, "Erasing sector");
        engine.vendor_command(VendorCommand::EraseSector(sector))?;
    }
    Ok(sectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::testing::XorCipher;
    use crate::flash::geometry::GeometryError;
    use crate::protocol::header::DownloadRequest;
    use crate::transport::MockTransport;

    fn device_info(product_id: u16) -> DeviceInfo {
        DeviceInfo {
            probe_version: 3,
            jtag_version: 0,
            swim_version: 0,
            loader_version: 0,
            product_id,
            device_id: [0; 12],
            firmware_key: [0x5A; 16],
        }
    }

    /// Payloads of every block 0 download, in order.
    fn vendor_payloads(mock: &MockTransport) -> Vec<Vec<u8>> {
        let writes = mock.get_writes();
        writes
            .iter()
            .enumerate()
            .filter(|(_, w)| w.len() == 16 && w[..2] == [0xF3, 0x01])
            .map(|(i, _)| writes[i + 1].clone())
            .collect()
    }

    #[test]
    fn test_erase_pages_command() {
        let mock = MockTransport::new();
        mock.queue_download_ok();
        let engine = DfuEngine::new(&mock, &XorCipher);

        erase_pages(&engine, 0x0800_4400).unwrap();
        assert_eq!(
            vendor_payloads(&mock),
            vec![vec![0x41, 0x00, 0x44, 0x00, 0x08]]
        );
        let header = DownloadRequest::from_bytes(&mock.get_writes()[0]).unwrap();
        assert_eq!(header.block_num, 0);
    }

    #[test]
    fn test_erase_sectors_three_through_five() {
        let mock = MockTransport::new();
        for _ in 0..3 {
            mock.queue_download_ok();
        }
        let engine = DfuEngine::new(&mock, &XorCipher);
        let info = device_info(0x413);

        let erased = erase_sectors(&engine, &info, 0x0800_C000, 0x14001).unwrap();
        assert_eq!(erased, 3..=5);
        assert_eq!(
            vendor_payloads(&mock),
            vec![
                vec![0x42, 3, 0, 0, 0],
                vec![0x42, 4, 0, 0, 0],
                vec![0x42, 5, 0, 0, 0],
            ]
        );
    }

    #[test]
    fn test_erase_sectors_rejects_bad_range_before_io() {
        let mock = MockTransport::new();
        let engine = DfuEngine::new(&mock, &XorCipher);
        let info = device_info(0x449);

        let err = erase_sectors(&engine, &info, 0x0810_0000, 16).unwrap_err();
        assert!(matches!(
            err,
            FlashError::Geometry(GeometryError::OutOfRange { .. })
        ));
        let err = erase_sectors(&engine, &info, 0x0800_0000, 0).unwrap_err();
        assert!(matches!(
            err,
            FlashError::Geometry(GeometryError::InvalidRange { .. })
        ));
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_erase_sectors_stops_on_first_failure() {
        let mock = MockTransport::new();
        mock.queue_download_ok();
        mock.queue_status(0, 0, 4);
        mock.queue_status(0x0B, 0, 10);
        let engine = DfuEngine::new(&mock, &XorCipher);
        let info = device_info(0x413);

        let err = erase_sectors(&engine, &info, 0x0800_0000, 0xC000).unwrap_err();
        assert!(matches!(
            err,
            FlashError::Dfu(DfuError::ReadOnlyProtection)
        ));
        assert_eq!(vendor_payloads(&mock).len(), 2);
    }
}
