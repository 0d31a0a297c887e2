//! Data block server for the command line.
//!
//! Serves one data block until Ctrl+C, logging client events and the number
//! of connected clients.
//!
//! # Usage
//!
//! ```bash
//! # DB1 of 10240 bytes on all interfaces, port 102
//! s7-dbserver
//!
//! # DB7 of 2048 bytes on an unprivileged port, with request tracing
//! s7-dbserver --db-number 7 --db-size 2048 --bind 127.0.0.1:1102 --trace --verbose
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use log::info;
use s7_datablock::{
    AreaId, EventMask, LogHandler, Monitor, Server, ServerConfig, ShutdownSignal,
};

#[derive(Parser)]
#[command(name = "s7-dbserver")]
#[command(about = "Serve a data block to remote clients", long_about = None)]
struct Cli {
    /// Number of the data block to serve
    #[arg(long, default_value = "1")]
    db_number: u16,

    /// Size of the data block in bytes
    #[arg(long, default_value = "10240")]
    db_size: usize,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:102")]
    bind: SocketAddr,

    /// Delay between status polls, in milliseconds
    #[arg(long, default_value = "1000")]
    poll_ms: u64,

    /// Also report every read and write request as an event
    #[arg(long)]
    trace: bool,

    /// Show debug output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        let mask = if self.trace {
            EventMask::all()
        } else {
            EventMask::default()
        };
        ServerConfig::new()
            .with_bind(self.bind)
            .with_area(AreaId::db(self.db_number), self.db_size)
            .with_event_mask(mask)
            .with_poll_interval(Duration::from_millis(self.poll_ms))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // info+ on stderr; --verbose enables debug; RUST_LOG overrides
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_module_path(false)
        .format_target(false)
        .init();

    let signal = ShutdownSignal::new();
    let handler_signal = signal.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nStopping...");
        handler_signal.trigger();
    })?;

    let config = cli.server_config();
    let mut server = Server::from_config(&config)?;
    server.start(config.bind)?;
    info!("Press Ctrl+C to stop");

    Monitor::from_config(&config).run(&mut server, &signal, &mut LogHandler)?;
    info!("Server stopped");
    Ok(())
}
