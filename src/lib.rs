//! # S7 Data Block Library
//!
//! A Rust library that serves byte-addressable memory areas (data blocks) to
//! remote clients over TCP, and reads and writes typed fields in them.
//!
//! The server side hosts one or more [`MemoryArea`]s and serves byte-range
//! reads and writes from concurrent client sessions. The client side opens a
//! session and accesses bits, bytes, words and double words at byte offsets.
//! Multi-byte values are big-endian.
//!
//! ## Features
//!
//! - **Per-area locking**: reads of an area run in parallel, writes exclude
//! - **Event queue**: session and request notifications for an operator loop
//! - **Typed fields**: bit, byte, word and double word codecs
//! - **No panics**: all errors returned as `Result<T, DbError>`
//!
//! ## Quick Start
//!
//! Serve DB1 of 10240 bytes:
//!
//! ```no_run
//! use s7_datablock::{AreaId, MemoryArea, Server};
//!
//! fn main() -> s7_datablock::Result<()> {
//!     let mut server = Server::new();
//!     server.register_area(MemoryArea::new(AreaId::db(1), 10240))?;
//!     server.start_default()?;
//!
//!     loop {
//!         if let Some(event) = server.pick_event() {
//!             println!("{}", event);
//!             server.clear_events();
//!         }
//!         let status = server.status();
//!         if status.sessions > 0 {
//!             println!("{} client(s) connected", status.sessions);
//!         }
//!         std::thread::sleep(std::time::Duration::from_secs(1));
//!     }
//! }
//! ```
//!
//! Access its fields from a client:
//!
//! ```no_run
//! use s7_datablock::{AreaId, Client, ClientConfig};
//!
//! let mut client = Client::new(ClientConfig::new());
//! let state = client.connect("127.0.0.1", 0, 1);
//! assert!(state.connected, "{:?}", state.reason);
//!
//! let db1 = AreaId::db(1);
//! client.write_bit(db1, 1010, 2, true)?;
//! assert!(client.read_bit(db1, 1010, 2)?);
//! let value = client.read_dword(db1, 590)?;
//! println!("DB1.DBD590 = {}", value);
//!
//! client.disconnect();
//! # Ok::<(), s7_datablock::DbError>(())
//! ```
//!
//! ## Memory Areas
//!
//! | Kind | Description |
//! |------|-------------|
//! | [`AreaKind::PE`] | Process inputs |
//! | [`AreaKind::PA`] | Process outputs |
//! | [`AreaKind::MK`] | Merkers (flags) |
//! | [`AreaKind::DB`] | Data blocks, numbered |
//! | [`AreaKind::CT`] | Counters |
//! | [`AreaKind::TM`] | Timers |
//!
//! ## Field Codec
//!
//! The [`codec`] module works on byte slices the caller already holds:
//!
//! ```
//! use s7_datablock::codec::{format_byte, get_bit, get_dword, set_bit};
//!
//! let mut byte = [0u8];
//! set_bit(&mut byte, 0, 2, true)?;
//! assert!(get_bit(&byte, 0, 2)?);
//! assert_eq!(format_byte(byte[0]), "0b0000_0100");
//! assert_eq!(get_dword(&[0x00, 0x00, 0x02, 0x4A], 0)?, 0x24A);
//! # Ok::<(), s7_datablock::DbError>(())
//! ```
//!
//! ## Error Handling
//!
//! ```no_run
//! use s7_datablock::{AreaId, Client, ClientConfig, DbError};
//!
//! let mut client = Client::new(ClientConfig::new());
//! client.try_connect("127.0.0.1", 0, 1)?;
//!
//! match client.read_field(AreaId::db(1), 10236, 8) {
//!     Ok(data) => println!("Data: {:?}", data),
//!     Err(DbError::OutOfRange { offset, length }) => {
//!         println!("{} bytes at {} are outside DB1", length, offset);
//!     }
//!     Err(e) if e.is_communication() => println!("Session lost: {}", e),
//!     Err(e) => println!("Error: {}", e),
//! }
//! # Ok::<(), DbError>(())
//! ```
//!
//! ## Concurrent Bit Writes
//!
//! [`Client::write_bit`] is a read followed by a write of the whole byte.
//! Two clients changing different bits of the same byte at the same time
//! can lose one of the changes. Give each writer its own byte when that
//! matters.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod client;
mod command;
mod error;
mod event;
mod header;
mod memory;
mod response;
mod server;
mod session;
mod transport;
pub mod codec;
pub mod monitor;

// Public re-exports
pub use client::{Client, ClientConfig, ConnectionState};
pub use codec::FieldAddress;
pub use command::{
    ConnectRequest, ConnectionType, ReadRequest, Request, WriteRequest, MAX_DATA_LENGTH,
};
pub use error::{DbError, Result};
pub use event::{Event, EventKind, EventMask, EventQueue, EventRange, MAX_QUEUED_EVENTS};
pub use header::{FrameHeader, Function, FRAME_HEADER_SIZE, PROTOCOL_ID};
pub use memory::{AreaId, AreaKind, MemoryArea};
pub use monitor::{LogHandler, Monitor, ShutdownSignal, StatusHandler};
pub use response::{Response, ReturnCode};
pub use server::{
    CpuState, Server, ServerConfig, ServerState, ServerStatus, SharedArea, DEFAULT_POLL_INTERVAL,
};
pub use session::Session;
pub use transport::{TcpTransport, DEFAULT_PORT, DEFAULT_TIMEOUT};
