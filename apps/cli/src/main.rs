use anyhow::{Context, Result};
use clap::Parser;
use stlink_core::session::{SessionConfig, StlinkSession};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "ST-Link probe firmware upgrade tool (Pure Rust)", long_about = None)]
struct Args {
    /// Firmware image to flash
    firmware: Option<String>,

    /// Only identify the probe, do not flash
    #[arg(short, long)]
    probe: bool,

    /// Flash address of the first byte (defaults per probe generation)
    #[arg(long, value_parser = parse_address)]
    address: Option<u32>,

    /// Bytes per download block
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Stay in DFU mode when done
    #[arg(long)]
    no_exit: bool,

    /// Load settings from a TOML file (flags override it)
    #[arg(short, long)]
    config: Option<String>,

    /// Write the effective settings to a TOML file and exit
    #[arg(long)]
    save_config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_address(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", s, e))
}

fn build_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path))?,
        None => SessionConfig::default(),
    };
    if args.firmware.is_some() {
        config.firmware_path = args.firmware.clone();
    }
    if args.address.is_some() {
        config.base_address = args.address;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if args.probe {
        config.probe_only = true;
    }
    if args.no_exit {
        config.exit_dfu = false;
    }
    Ok(config)
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(&args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let config = build_config(args)?;

    if let Some(path) = &args.save_config {
        config.save_to_file(path)?;
        info!(path = %path, "Configuration saved");
        return Ok(());
    }

    info!("Starting stlink-tool (nusb backend)...");
    let info = StlinkSession::new(config).run()?;
    info!("Done: {}", info);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x08004000"), Ok(0x0800_4000));
        assert_eq!(parse_address("134234112"), Ok(0x0800_4000));
        assert!(parse_address("0xZZ").is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "stlink-tool",
            "fw.bin",
            "--address",
            "0x08020000",
            "--chunk-size",
            "2048",
            "--no-exit",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.firmware_path.as_deref(), Some("fw.bin"));
        assert_eq!(config.base_address, Some(0x0802_0000));
        assert_eq!(config.chunk_size, 2048);
        assert!(!config.exit_dfu);
        assert!(!config.probe_only);
    }
}
