//! NightCrawler Driver CLI
//!
//! Serves the NightCrawler focuser and rotator over ASCOM Alpaca. Built with
//! the `mock` feature it talks to a simulated controller instead.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serial_link::SerialPortFactory;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

use nightcrawler::{load_config, Config, ServerBuilder};

#[derive(Parser, Debug)]
#[command(name = "nightcrawler")]
#[command(about = "ASCOM Alpaca driver for the NightCrawler focuser and rotator")]
#[command(version)]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port path (overrides config file)
    #[arg(long)]
    port: Option<String>,

    /// Serial baud rate (overrides config file)
    #[arg(long)]
    baud_rate: Option<u32>,

    /// Server port (overrides config file)
    #[arg(long)]
    server_port: Option<u16>,

    /// Log level, used when RUST_LOG is not set
    #[arg(short, long, default_value = "info", value_parser = parse_log_level)]
    log_level: Level,
}

impl Args {
    fn load(&self) -> Result<Config, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => {
                debug!("Loading configuration from {:?}", path);
                load_config(path)?
            }
            None => Config::default(),
        };

        if let Some(port) = &self.port {
            config.serial.port = port.clone();
        }
        if let Some(baud_rate) = self.baud_rate {
            config.serial.baud_rate = baud_rate;
        }
        if let Some(server_port) = self.server_port {
            config.server.port = server_port;
        }
        Ok(config)
    }
}

fn parse_log_level(s: &str) -> Result<Level, String> {
    s.parse().map_err(|_| {
        format!(
            "Invalid log level '{}', expected one of trace, debug, info, warn, error",
            s
        )
    })
}

#[cfg(feature = "mock")]
fn serial_factory() -> Arc<dyn SerialPortFactory> {
    info!("Mock mode: using a simulated NightCrawler");
    Arc::new(nightcrawler::MockSerialPortFactory::default())
}

#[cfg(not(feature = "mock"))]
fn serial_factory() -> Arc<dyn SerialPortFactory> {
    Arc::new(serial_link::TokioSerialPortFactory::new())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(args.log_level).into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = args.load()?;
    info!(
        "Starting NightCrawler driver on {} at {} baud, Alpaca port {}",
        config.serial.port, config.serial.baud_rate, config.server.port
    );

    ServerBuilder::new(config)
        .with_factory(serial_factory())
        .build()
        .await?
        .start()
        .await?;

    Ok(())
}
