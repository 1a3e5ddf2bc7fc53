//! Async channel example with Tokio.
//!
//! Run with: cargo run --example channel_async --features tokio -- /dev/input/event3
//!
//! Key channel updates are received in an async context next to a
//! heartbeat timer.

use evsession::channel::async_channel;
use evsession::{ChannelUpdate, ContactState, HandlerConfig, InputHandler};
use std::time::Duration;
use tokio::time::interval;

#[tokio::main]
async fn main() {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/input/event0".to_string());

    println!("evsession channel example (async/tokio)");
    println!("=======================================\n");
    println!("Press Ctrl+C to exit.\n");

    let (sink, mut rx) = async_channel(100);
    let handler =
        InputHandler::start(HandlerConfig::new(&path), sink).expect("Failed to start session");

    let mut pressed = 0u32;
    let mut heartbeat = interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            update = rx.recv() => {
                match update {
                    Some(ChannelUpdate::State { channel, state: ContactState::Closed }) => {
                        pressed += 1;
                        println!("[{}] {} down", pressed, channel);
                    }
                    Some(ChannelUpdate::State { channel, state: ContactState::Open }) => {
                        println!("    {} up", channel);
                    }
                    Some(_) => {}
                    None => {
                        println!("Channel closed, session stopped.");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                println!("... heartbeat ({} presses so far)", pressed);
            }
        }
    }

    handler.shutdown();
}
