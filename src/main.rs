//! sliplink CLI
//!
//! Bridges a SLIP-framed serial device to UDP and keeps re-locating the device
//! whenever it disappears.
//!
//! ```bash
//! # Stock setup: listen on 0.0.0.0:8000, send to 0.0.0.0:9000, first Teensy/Arduino found
//! sliplink -v
//!
//! # Fixed device and target
//! sliplink -d /dev/ttyACM0 -t 192.168.1.20 -s 9001
//!
//! # Show what would be picked
//! sliplink list-ports
//! ```

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sliplink_lib::io::serial::{locate, SerialBackend};
use sliplink_lib::logging::{init_file_logging, stop_file_logging};
use sliplink_lib::{tlog, BridgeConfig, Supervisor};

/// SLIP serial <-> UDP bridge
#[derive(Parser, Debug)]
#[command(name = "sliplink")]
#[command(version)]
struct Args {
    /// Verbose mode. Once for throughput stats, twice for per-frame hex dumps
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (default: <config dir>/sliplink/sliplink.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UDP receive host [default: 0.0.0.0]
    #[arg(short = 'i', long)]
    receive_host: Option<String>,

    /// UDP receive port [default: 8000]
    #[arg(short = 'r', long)]
    receive_port: Option<u16>,

    /// UDP target host [default: 0.0.0.0]
    #[arg(short = 't', long)]
    target_host: Option<String>,

    /// UDP target port [default: 9000]
    #[arg(short = 's', long)]
    target_port: Option<u16>,

    /// Serial device name. When omitted the first known device is used
    #[arg(short = 'd', long)]
    serial_device: Option<String>,

    /// Serial baud rate [default: 115200]
    #[arg(short, long)]
    baud_rate: Option<u32>,

    /// Join an IPv4 multicast group on the receive socket (repeatable)
    #[arg(long = "multicast-group")]
    multicast_groups: Vec<Ipv4Addr>,

    /// Also write the log to a timestamped file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List serial ports and show which one would be bridged
    ListPorts,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = build_config(&args)?;

    if let Some(Commands::ListPorts) = args.command {
        return cmd_list_ports(&config);
    }

    if let Some(ref dir) = config.log_dir {
        let path = init_file_logging(dir)?;
        tlog!("[main] Logging to {}", path.display());
    }

    let result = run_bridge(config).await;
    stop_file_logging();
    result
}

/// Defaults < config file < command line
fn build_config(args: &Args) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    let mut config = BridgeConfig::load(args.config.as_deref())?;

    if args.verbose > 0 {
        config.verbose = args.verbose;
    }
    if let Some(ref host) = args.receive_host {
        config.receive_host = host.clone();
    }
    if let Some(port) = args.receive_port {
        config.receive_port = port;
    }
    if let Some(ref host) = args.target_host {
        config.target_host = host.clone();
    }
    if let Some(port) = args.target_port {
        config.target_port = port;
    }
    if let Some(ref device) = args.serial_device {
        config.serial_device = Some(device.clone());
    }
    if let Some(baud) = args.baud_rate {
        config.serial.baud_rate = baud;
    }
    if !args.multicast_groups.is_empty() {
        config.multicast_groups = args.multicast_groups.clone();
    }
    if let Some(ref dir) = args.log_dir {
        config.log_dir = Some(dir.clone());
    }

    config.validate()?;
    Ok(config)
}

async fn run_bridge(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    tlog!("[main] sliplink v{}", env!("CARGO_PKG_VERSION"));

    tlog!("[udp] Setting up the UDP receive socket...");
    let sockets = config.open_sockets()?;
    tlog!(
        "[udp] OK! Datagrams sent to {} will be forwarded to the serial device",
        sockets.local_addr()?
    );
    tlog!(
        "[udp] OK! Frames from the serial device will be sent to {}",
        sockets.target
    );
    tlog!("[serial] Line settings {}", config.serial.describe());

    let supervisor = Supervisor::new(
        Arc::new(config.serial_backend()),
        config.locator(),
        sockets,
        config.supervisor_config(),
    );

    let shutdown = supervisor.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tlog!("[main] Shutting down...");
            shutdown.store(true, Ordering::SeqCst);
        }
    });

    supervisor.run().await;

    let stats = supervisor.stats().snapshot();
    for line in stats.report_lines(&Default::default()) {
        tlog!("[stats] {}", line);
    }
    Ok(())
}

fn cmd_list_ports(config: &BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let ports = config.serial_backend().available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }

    let picked = locate(&ports, config.serial_device.as_deref(), &config.known_devices)
        .map(|p| p.port_name.clone());

    for port in &ports {
        let marker = if picked.as_deref() == Some(port.port_name.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:<24} {:<32} {}",
            marker,
            port.port_name,
            port.description,
            port.details()
        );
    }
    Ok(())
}
