//! ST-Link session - high-level orchestrator for a firmware upgrade.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::crypto::{Cipher, StlinkCipher};
use crate::dfu::DfuEngine;
use crate::events::{FlashEvent, FlashObserver, FlashPhase, PacketDirection, TracingObserver};
use crate::flash::{FirmwareImage, ImageFlasher};
use crate::info::{DeviceInfo, ProbeMode, current_mode};
use crate::protocol::constants::DEFAULT_CHUNK_SIZE;
use crate::transport::{NusbTransport, TransportError, UsbTransport};

/// Configuration for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Path to the probe firmware image.
    pub firmware_path: Option<String>,
    /// Flash address of the first byte; defaults per probe generation.
    pub base_address: Option<u32>,
    /// Bytes per download block.
    pub chunk_size: usize,
    /// Only identify the probe.
    pub probe_only: bool,
    /// Leave DFU mode when done.
    pub exit_dfu: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            firmware_path: None,
            base_address: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            probe_only: false,
            exit_dfu: true,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Session - identifies the probe, flashes it and leaves DFU mode.
pub struct StlinkSession<O: FlashObserver> {
    config: SessionConfig,
    observer: Arc<O>,
}

impl StlinkSession<TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }
}

impl<O: FlashObserver + 'static> StlinkSession<O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(config: SessionConfig, observer: Arc<O>) -> Self {
        Self { config, observer }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run the session against the first ST-Link found on the bus.
    #[instrument(skip(self))]
    pub fn run(&self) -> Result<DeviceInfo> {
        let image = self.load_image()?;

        let transport = NusbTransport::open().context("Failed to open ST-Link")?;
        self.observer.on_event(&FlashEvent::DeviceConnected {
            vid: transport.vendor_id(),
            pid: transport.product_id(),
        });

        self.execute(&transport, &StlinkCipher, image.as_ref())
    }

    fn load_image(&self) -> Result<Option<FirmwareImage>> {
        if self.config.probe_only {
            return Ok(None);
        }
        let path = self
            .config
            .firmware_path
            .as_ref()
            .ok_or_else(|| anyhow!("No firmware image given"))?;
        Ok(Some(FirmwareImage::from_file(path)?))
    }

    /// Run the session over an already opened transport.
    pub fn execute<T: UsbTransport, C: Cipher>(
        &self,
        transport: &T,
        cipher: &C,
        image: Option<&FirmwareImage>,
    ) -> Result<DeviceInfo> {
        let transport = ObservableTransport {
            inner: transport,
            observer: &self.observer,
        };

        let mode = current_mode(&transport).context("Failed to query probe mode")?;
        if mode != ProbeMode::Dfu {
            bail!(
                "ST-Link is in {} mode, not DFU. Please unplug and plug the probe again",
                mode
            );
        }

        self.phase(FlashPhase::Connecting, FlashPhase::Identify);
        let info = DeviceInfo::resolve(&transport, cipher).context("Failed to identify probe")?;
        self.observer.on_event(&FlashEvent::DeviceIdentified {
            description: info.to_string(),
        });

        let mut last_phase = FlashPhase::Identify;

        if !self.config.probe_only {
            let image = image.ok_or_else(|| anyhow!("No firmware image given"))?;
            let base = self
                .config
                .base_address
                .unwrap_or_else(|| info.layout().application_base());
            info!(
                base = %format!("0x{:08X}", base),
                size = image.len(),
                chunk_size = self.config.chunk_size,
                "Flashing"
            );
            let flasher = ImageFlasher::new(
                DfuEngine::new(&transport, cipher),
                &info,
                self.observer.as_ref(),
            );
            flasher
                .flash(image, base, self.config.chunk_size)
                .context("Flashing failed")?;
            last_phase = FlashPhase::Writing;
        }

        if self.config.exit_dfu {
            self.phase(last_phase, FlashPhase::Exiting);
            DfuEngine::new(&transport, cipher)
                .exit_dfu()
                .context("Failed to leave DFU mode")?;
            last_phase = FlashPhase::Exiting;
        }

        self.phase(last_phase, FlashPhase::Complete);
        self.observer.on_event(&FlashEvent::Complete);
        Ok(info)
    }

    fn phase(&self, from: FlashPhase, to: FlashPhase) {
        self.observer.on_event(&FlashEvent::PhaseChanged { from, to });
    }
}

/// Transport wrapper that emits packet events.
struct ObservableTransport<'a, T: UsbTransport, O: FlashObserver> {
    inner: &'a T,
    observer: &'a Arc<O>,
}

impl<'a, T: UsbTransport, O: FlashObserver> UsbTransport for ObservableTransport<'a, T, O> {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let res = self.inner.write(data);
        if res.is_ok() {
            self.observer.on_event(&FlashEvent::Packet {
                direction: PacketDirection::Tx,
                length: data.len(),
                data: data.iter().take(32).cloned().collect(),
            });
        }
        res
    }

    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let res = self.inner.read(max_len);
        if let Ok(data) = &res
            && !data.is_empty()
        {
            self.observer.on_event(&FlashEvent::Packet {
                direction: PacketDirection::Rx,
                length: data.len(),
                data: data.iter().take(32).cloned().collect(),
            });
        }
        res
    }

    fn vendor_id(&self) -> u16 {
        self.inner.vendor_id()
    }

    fn product_id(&self) -> u16 {
        self.inner.product_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::testing::XorCipher;
    use crate::events::testing::RecordingObserver;
    use crate::protocol::header::DownloadRequest;
    use crate::transport::MockTransport;

    fn queue_identity_v2(mock: &MockTransport) {
        mock.queue_reply(&[0x00, 0x00]);
        mock.queue_reply(&[0x27, 0x47, 0, 0, 0x34, 0x12]);
        mock.queue_reply(&[0x11; 20]);
    }

    #[test]
    fn test_config_defaults_and_toml() {
        let config: SessionConfig =
            toml::from_str("firmware_path = \"fw.bin\"\nbase_address = 134348800\n").unwrap();
        assert_eq!(config.firmware_path.as_deref(), Some("fw.bin"));
        assert_eq!(config.base_address, Some(0x0802_0000));
        assert_eq!(config.chunk_size, 1024);
        assert!(config.exit_dfu);
        assert!(!config.probe_only);

        let text = toml::to_string_pretty(&config).unwrap();
        let back: SessionConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.base_address, config.base_address);
    }

    #[test]
    fn test_probe_only() {
        let mock = MockTransport::new();
        queue_identity_v2(&mock);
        let observer = Arc::new(RecordingObserver::default());
        let config = SessionConfig {
            probe_only: true,
            exit_dfu: false,
            ..Default::default()
        };
        let session = StlinkSession::with_observer(config, observer.clone());

        let info = session.execute(&mock, &XorCipher, None).unwrap();
        assert_eq!(info.probe_version, 2);
        assert_eq!(mock.pending_replies(), 0);
        // mode, version, unique id
        assert_eq!(mock.get_writes().len(), 3);
        assert!(
            observer
                .events()
                .iter()
                .any(|e| matches!(e, FlashEvent::DeviceIdentified { .. }))
        );
    }

    #[test]
    fn test_refuses_non_dfu_mode() {
        let mock = MockTransport::new();
        mock.queue_reply(&[0x02, 0x00]);
        let session = StlinkSession::with_observer(
            SessionConfig::default(),
            Arc::new(RecordingObserver::default()),
        );

        let image = FirmwareImage::from_bytes(vec![0; 16]).unwrap();
        let err = session.execute(&mock, &XorCipher, Some(&image)).unwrap_err();
        assert!(err.to_string().contains("debug mode"));
        assert_eq!(mock.get_writes().len(), 1);
    }

    #[test]
    fn test_full_flash_uses_default_base_and_exits() {
        let mock = MockTransport::new();
        queue_identity_v2(&mock);
        for _ in 0..3 {
            mock.queue_download_ok();
        }
        let observer = Arc::new(RecordingObserver::default());
        let config = SessionConfig {
            chunk_size: 64,
            ..Default::default()
        };
        let session = StlinkSession::with_observer(config, observer.clone());

        let image = FirmwareImage::from_bytes(vec![0x42; 40]).unwrap();
        session.execute(&mock, &XorCipher, Some(&image)).unwrap();
        assert_eq!(mock.pending_replies(), 0);

        let writes = mock.get_writes();
        // page erase at the V2 application base
        let erase = writes
            .iter()
            .position(|w| w.len() == 16 && w[..2] == [0xF3, 0x01])
            .unwrap();
        assert_eq!(
            DownloadRequest::from_bytes(&writes[erase]).unwrap().block_num,
            0
        );
        assert_eq!(writes[erase + 1], vec![0x41, 0x00, 0x40, 0x00, 0x08]);
        // last write leaves DFU mode
        assert_eq!(writes.last().unwrap()[..2], [0xF3, 0x07]);

        let events = observer.events();
        assert!(matches!(events.last(), Some(FlashEvent::Complete)));
        assert!(events.iter().any(|e| matches!(
            e,
            FlashEvent::Packet {
                direction: PacketDirection::Rx,
                ..
            }
        )));
    }

    #[test]
    fn test_missing_image_is_an_error() {
        let mock = MockTransport::new();
        queue_identity_v2(&mock);
        let session = StlinkSession::with_observer(
            SessionConfig::default(),
            Arc::new(RecordingObserver::default()),
        );
        assert!(session.execute(&mock, &XorCipher, None).is_err());
        assert!(session.load_image().is_err());
    }
}
