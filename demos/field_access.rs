//! Example: Reading and writing data block fields
//!
//! Run a server first, then:
//!
//! ```bash
//! cargo run --bin s7-dbserver -- --bind 127.0.0.1:1102
//! cargo run --example field_access -- 127.0.0.1 1102
//! ```
//!
//! This example demonstrates:
//! - Connecting with rack 0, slot 1 and checking the connection state
//! - Reading and toggling a single bit (DB1.DBX1010.2)
//! - Reading and writing a double word (DB1.DBD590)
//! - Formatting helpers for logging raw bytes

use s7_datablock::codec::{format_byte, format_hex_bytes};
use s7_datablock::{AreaId, Client, ClientConfig, FieldAddress, DEFAULT_PORT};

fn main() -> s7_datablock::Result<()> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = args
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    // =========================================================================
    // Connect
    // =========================================================================

    let mut client = Client::new(ClientConfig::new().with_port(port));
    let state = client.connect(&host, 0, 1);
    if !state.connected {
        println!(
            "Could not connect to {}:{}: {}",
            host,
            port,
            state.reason.unwrap_or_default()
        );
        return Ok(());
    }
    println!("Connected to {}:{}", host, port);

    let db1 = AreaId::db(1);

    // =========================================================================
    // Bits
    // =========================================================================

    let running: FieldAddress = "1010.2".parse()?;
    println!("\n=== Bit {} ===\n", running);

    let (offset, bit) = (running.byte_offset, running.bit_index.unwrap_or(0));

    let value = client.read_bit(db1, offset, bit)?;
    println!("{}.DBX{} = {}", db1, running, value);

    client.write_bit(db1, offset, bit, !value)?;
    let byte = client.read_byte(db1, offset)?;
    println!("{}.DBX{} = {}", db1, running, client.read_bit(db1, offset, bit)?);
    println!("{}.DBB{} = {}", db1, offset, format_byte(byte));

    // =========================================================================
    // Double words
    // =========================================================================

    println!("\n=== Double word 590 ===\n");

    let value = client.read_dword(db1, 590)?;
    println!("{}.DBD590 = {} (0x{:08X})", db1, value, value);

    client.write_dword(db1, 590, value.wrapping_add(1))?;
    let raw = client.read_field(db1, 590, 4)?;
    println!("{}.DBD590 raw: {}", db1, format_hex_bytes(&raw));

    client.disconnect();
    println!("\nField access example completed!");
    Ok(())
}
