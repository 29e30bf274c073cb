//! SPI bridge command-line driver.
//!
//! This binary drives a bridge over its socket link. It provides:
//! 1. **Serve:** Run the simulated bridge on a TCP port.
//! 2. **Memory access:** Dump or patch arbitrary bus memory.
//! 3. **Image loading:** Load an ELF executable, optionally verify it, and release the core.
//! 4. **Halt:** Hold the core in reset.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::{ArgAction, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use spibridge_core::common::{BusAddr, LINE_BYTES};
use spibridge_core::sim::{BridgeModel, LoadOptions, SocketPeer, elf};
use spibridge_core::stats::TransferStats;
use spibridge_core::transport::SocketTransport;
use spibridge_core::{BridgeError, BusMemory, Config, ImageLoader, Result};

#[derive(Parser, Debug)]
#[command(
    name = "spibridge",
    author,
    version,
    about = "Host driver for a polled SPI-to-bus bridge",
    long_about = "Read and write bus memory, load executables, and control the core through an SPI-to-bus bridge.\n\nThe link is a TCP connection to a simulated bridge; `spibridge serve` runs one locally.\n\nExamples:\n  spibridge serve --listen 127.0.0.1:7777\n  spibridge read --address 0x80000000 --size 64\n  spibridge write --address 0x80000010 --hex deadbeef\n  spibridge load firmware.elf --verify --stats"
)]
struct Cli {
    /// Bridge address to connect to (overrides the configuration file).
    #[arg(long, global = true)]
    connect: Option<String>,

    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Print transfer statistics when the command finishes.
    #[arg(long, global = true)]
    stats: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve a simulated bridge until interrupted.
    Serve {
        /// Address to listen on.
        #[arg(short, long, default_value = "127.0.0.1:7777")]
        listen: String,

        /// Status polls answered with BUSY before each command completes.
        #[arg(long, default_value_t = 0)]
        latency: u32,
    },

    /// Dump bus memory as hex.
    Read {
        /// Start address (decimal or 0x-prefixed hex).
        #[arg(short, long, value_parser = parse_u32)]
        address: u32,

        /// Number of bytes to read.
        #[arg(short, long, value_parser = parse_size)]
        size: usize,
    },

    /// Write hex bytes to bus memory.
    Write {
        /// Start address (decimal or 0x-prefixed hex).
        #[arg(short, long, value_parser = parse_u32)]
        address: u32,

        /// Bytes to write, as hex digits (whitespace and `_` ignored).
        #[arg(long)]
        hex: String,
    },

    /// Load an ELF executable and start it.
    Load {
        /// ELF file to load.
        elf: PathBuf,

        /// Read every segment back after writing it.
        #[arg(long)]
        verify: bool,

        /// Leave the core in reset after loading.
        #[arg(long)]
        no_start: bool,
    },

    /// Hold the core in reset.
    Halt,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(addr) = cli.connect {
        config.link.socket_addr = addr;
    }

    let stats = Arc::new(Mutex::new(TransferStats::default()));
    let observer = cli.stats.then(|| Arc::clone(&stats));
    match cli.command {
        Commands::Serve { listen, latency } => return cmd_serve(&listen, latency),
        Commands::Read { address, size } => {
            let mut memory = connect(&config, observer)?;
            cmd_read(&mut memory, address, size)?;
        }
        Commands::Write { address, hex } => {
            let mut memory = connect(&config, observer)?;
            cmd_write(&mut memory, address, &hex)?;
        }
        Commands::Load {
            elf,
            verify,
            no_start,
        } => {
            let mut memory = connect(&config, observer)?;
            cmd_load(&mut memory, &config, &elf, verify, no_start)?;
        }
        Commands::Halt => {
            let mut memory = connect(&config, observer)?;
            ImageLoader::new(&mut memory, config.control).halt()?;
        }
    }

    if cli.stats
        && let Ok(stats) = stats.lock()
    {
        stats.print();
    }
    Ok(())
}

/// Opens the socket link and wraps it in a memory engine.
fn connect(
    config: &Config,
    stats: Option<Arc<Mutex<TransferStats>>>,
) -> Result<BusMemory<SocketTransport>> {
    let transport = SocketTransport::connect(
        config.link.socket_addr.as_str(),
        config.link.socket_timeout(),
        config.link.max_frame,
    )?;
    let mut memory = BusMemory::from_config(transport, config);
    if let Some(stats) = stats {
        memory.client_mut().set_observer(Box::new(stats));
    }
    Ok(memory)
}

fn cmd_serve(listen: &str, latency: u32) -> Result<()> {
    let mut model = BridgeModel::new();
    model.set_latency(latency);
    let peer = SocketPeer::bind(listen)?;
    info!(addr = %peer.local_addr()?, latency, "serving simulated bridge");
    peer.serve(&mut model)
}

fn cmd_read(memory: &mut BusMemory<SocketTransport>, address: u32, size: usize) -> Result<()> {
    let data = memory.read(address, size)?;
    print!("{}", hex_dump(address, &data));
    Ok(())
}

fn cmd_write(memory: &mut BusMemory<SocketTransport>, address: u32, hex: &str) -> Result<()> {
    let data = parse_hex(hex)?;
    let report = memory.write(address, &data)?;
    info!(
        address = %BusAddr(address),
        bytes = report.bytes,
        batches = report.batches,
        rate = format!("{:.0} B/s", report.bytes_per_sec()),
        "write complete"
    );
    Ok(())
}

fn cmd_load(
    memory: &mut BusMemory<SocketTransport>,
    config: &Config,
    path: &Path,
    verify: bool,
    no_start: bool,
) -> Result<()> {
    let image = elf::load_file(path)?;
    let mut loader = ImageLoader::new(memory, config.control);
    let report = loader.load_image(&image, LoadOptions { verify })?;
    println!(
        "Loaded {} segments ({} bytes) in {:.3}s, entry {}{}",
        report.segments,
        report.bytes,
        report.elapsed.as_secs_f64(),
        BusAddr(report.entry),
        if report.verified { ", verified" } else { "" }
    );
    if !no_start {
        loader.start_execution()?;
        println!("Core released at {}", BusAddr(report.entry));
    }
    Ok(())
}

/// Formats `data` as 16 bytes per row with an ASCII column.
fn hex_dump(base: u32, data: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in data.chunks(LINE_BYTES).enumerate() {
        let addr = base.wrapping_add((row * LINE_BYTES) as u32);
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        out.push_str(&format!("{addr:08x}: {:<47}  |{ascii}|\n", hex.join(" ")));
    }
    out
}

fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b'_')
        .collect();
    let digits = digits
        .strip_prefix(b"0x")
        .unwrap_or(&digits[..])
        .to_vec();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return Err(BridgeError::config("hex data must be a non-empty, even number of digits"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| BridgeError::config(format!("invalid hex byte {:?}", String::from_utf8_lossy(pair))))
        })
        .collect()
}

fn parse_u32(text: &str) -> std::result::Result<u32, String> {
    let cleaned = text.replace('_', "");
    let parsed = match cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => cleaned.parse(),
    };
    parsed.map_err(|e| format!("invalid address {text:?}: {e}"))
}

fn parse_size(text: &str) -> std::result::Result<usize, String> {
    parse_u32(text).map(|n| n as usize)
}
