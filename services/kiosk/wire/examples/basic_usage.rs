//! Basic usage example for the kiosk wire protocol.

use kiosk_wire::{AckStatus, ClientMessage, ServerMessage};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Kiosk Wire Protocol Example ===\n");

    // 1. Decode the handshake
    println!("1. Decoding the handshake...");
    let welcome = ServerMessage::decode(
        r#"{"type":"connected","device_id":"lobby-1","message":"ready"}"#,
    )?;
    println!("   {:?}", welcome);

    // 2. Decode a command
    println!("\n2. Decoding a command...");
    let raw = r#"{"type":"command","command_id":"c1","command_type":"clear_content","parameters":{}}"#;
    let command = match ServerMessage::decode(raw)? {
        ServerMessage::Command(command) => command,
        other => return Err(format!("unexpected message: {}", other.kind()).into()),
    };
    println!(
        "   id={} type={} known={}",
        command.command_id,
        command.command_type,
        command.command_type.is_known()
    );

    // 3. Acknowledge it
    println!("\n3. Encoding the acknowledgment...");
    let ack = ClientMessage::ack(command.command_id, AckStatus::Completed).encode()?;
    println!("   {}", ack);

    // 4. Heartbeat
    println!("\n4. Encoding a heartbeat...");
    println!("   {}", ClientMessage::Heartbeat.encode()?);

    // 5. Malformed input is an error, not a panic
    println!("\n5. Decoding malformed input...");
    match ServerMessage::decode("{not json") {
        Ok(msg) => println!("   unexpectedly decoded {:?}", msg),
        Err(e) => println!("   rejected: {}", e),
    }

    Ok(())
}
