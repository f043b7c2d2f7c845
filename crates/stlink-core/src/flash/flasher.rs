//! Image flashing orchestration.
//!
//! V3 probes get the whole destination erased up front, sector by sector;
//! older probes erase one page per chunk. Each chunk then sets the address
//! pointer and goes down as an encrypted firmware block. A failure mid-way
//! leaves the probe partially written.

use tracing::{info, instrument};

use super::FlashError;
use super::erase::{erase_pages, erase_sectors};
use super::geometry::sector_address;
use super::image::FirmwareImage;
use crate::crypto::Cipher;
use crate::dfu::DfuEngine;
use crate::events::{FlashEvent, FlashObserver, FlashPhase};
use crate::info::{DeviceInfo, VersionLayout};
use crate::protocol::constants::FIRST_DATA_BLOCK;
use crate::transport::UsbTransport;

pub struct ImageFlasher<'a, T: UsbTransport, C: Cipher, O: FlashObserver> {
    engine: DfuEngine<'a, T, C>,
    info: &'a DeviceInfo,
    observer: &'a O,
}

impl<'a, T: UsbTransport, C: Cipher, O: FlashObserver> ImageFlasher<'a, T, C, O> {
    pub fn new(engine: DfuEngine<'a, T, C>, info: &'a DeviceInfo, observer: &'a O) -> Self {
        Self {
            engine,
            info,
            observer,
        }
    }

    /// Write `image` at `base_address` in `chunk_size` pieces.
    #[instrument(skip(self, image), fields(size = image.len(), base = %format!("0x{:08X}", base_address)))]
    pub fn flash(
        &self,
        image: &FirmwareImage,
        base_address: u32,
        chunk_size: usize,
    ) -> Result<(), FlashError> {
        let chunks = image.chunks(base_address, chunk_size)?;
        let total = image.len() as u64;
        let layout = self.info.layout();

        if layout == VersionLayout::Extended {
            self.phase(FlashPhase::Identify, FlashPhase::Erasing);
            info!("Erasing...");
            let sectors =
                erase_sectors(&self.engine, self.info, base_address, image.len() as u32)?;
            for sector in sectors {
                self.observer.on_event(&FlashEvent::Erased {
                    address: sector_address(self.info.product_id, sector),
                    sector: Some(sector),
                });
            }
            self.phase(FlashPhase::Erasing, FlashPhase::Writing);
        } else {
            self.phase(FlashPhase::Identify, FlashPhase::Writing);
        }

        let mut written = 0u64;
        for mut chunk in chunks {
            if layout == VersionLayout::Packed {
                erase_pages(&self.engine, chunk.address)?;
                self.observer.on_event(&FlashEvent::Erased {
                    address: chunk.address,
                    sector: None,
                });
            }

            self.engine.set_address(chunk.address)?;
            self.engine
                .download(&mut chunk.data, FIRST_DATA_BLOCK, Some(self.info))?;

            written += chunk.len as u64;
            self.observer
                .on_event(&FlashEvent::Progress { written, total });
        }

        info!(bytes = written, "Firmware written");
        Ok(())
    }

    fn phase(&self, from: FlashPhase, to: FlashPhase) {
        self.observer.on_event(&FlashEvent::PhaseChanged { from, to });
    }
}
