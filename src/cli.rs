//! Command-line argument parsing for rawcast

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "rawcast")]
#[command(version = "0.1.0")]
#[command(about = "Send crafted ICMP echoes over a raw channel and wait for replies", long_about = None)]
pub struct Args {
    /// Target IPv4 address
    pub target: Ipv4Addr,

    /// Interface to send through (default: first usable)
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Receive timeout in whole seconds
    #[arg(short, long, default_value_t = 2)]
    pub timeout: i64,

    /// Additional receive timeout microseconds
    #[arg(long, default_value_t = 0)]
    pub timeout_usec: i64,

    /// Number of echoes to send
    #[arg(short, long, default_value_t = 4)]
    pub count: u16,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    pub debug: bool,

    /// Log file path (default: stderr only)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
