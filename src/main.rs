//! rawcast - raw-socket transmit/receive engine demo
//!
//! Sends crafted ICMP echo requests through the engine's raw ICMP channel
//! and waits for each reply with the deadline-bounded receive loop.

mod cli;
mod config;
mod logging;
mod network;

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;

use cli::Args;
use config::SenderConfig;
use network::capability::check_raw_socket_capability;
use network::echo::IcmpEcho;
use network::sender::PacketSender;
use network::socket_kind::SocketKind;

fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_logging(args.debug, args.log_file.as_deref())?;
    tracing::info!("starting rawcast v{}", env!("CARGO_PKG_VERSION"));

    let config = SenderConfig {
        interface: args.interface.clone(),
        timeout_secs: args.timeout,
        timeout_usecs: args.timeout_usec,
    };
    let mut sender = PacketSender::from_config(&config)?;
    tracing::debug!(
        iface = sender.default_interface().name(),
        "resolved default interface"
    );

    // Open the channel up front so a privilege problem is reported once,
    // with an explanation, instead of surfacing per echo.
    if let Err(err) = sender.open_channel(SocketKind::Icmp) {
        let capability = check_raw_socket_capability();
        eprintln!("{}", capability.explanation());
        return Err(err).context("opening the raw icmp channel");
    }

    let identifier = std::process::id() as u16;
    let mut received = 0u16;
    for sequence in 0..args.count {
        let mut echo = IcmpEcho::new(args.target, identifier, sequence);
        let started = Instant::now();
        match sender.send_recv(&mut echo) {
            Some(reply) => {
                received += 1;
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                println!(
                    "{} bytes from {}: seq={} time={:.2} ms",
                    reply.serialize().len(),
                    args.target,
                    sequence,
                    elapsed_ms
                );
            }
            None => println!("no reply from {}: seq={}", args.target, sequence),
        }
    }

    println!(
        "{} sent, {} received, {:.0}% loss",
        args.count,
        received,
        f64::from(args.count - received) / f64::from(args.count.max(1)) * 100.0
    );
    Ok(())
}
