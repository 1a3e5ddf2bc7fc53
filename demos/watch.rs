//! Watch the key channels of one device.
//!
//! Run with: cargo run --example watch -- /dev/input/event3 [--grab]
//!
//! Prints the device properties and supported keys, then every channel
//! update until Ctrl+C. With `--grab` other applications stop receiving
//! the device's events while this runs.

use evsession::channel::channel;
use evsession::{ChannelUpdate, HandlerConfig, InputHandler, Shutdown};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

fn main() {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: watch <device> [--grab]");
        std::process::exit(2);
    };
    let grab = args.any(|a| a == "--grab");

    println!("evsession watch");
    println!("===============\n");

    let (sink, rx) = channel();
    let config = HandlerConfig::new(&path).with_grab(grab);
    let mut handler = match InputHandler::start(config, sink) {
        Ok(handler) => handler,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Ok(properties) = handler.properties() {
        for (key, value) in &properties {
            println!("{:>18}: {}", key, value);
        }
    }
    println!("\n{} keys supported", handler.keys().len());
    println!("Press Ctrl+C to exit.\n");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(ChannelUpdate::Trigger { channel, event }) => println!("{:<28} {}", channel, event),
            Ok(ChannelUpdate::Grab { grabbed, .. }) => println!("grabbed: {}", grabbed),
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {
                if let Some(Err(e)) = handler.exit_status() {
                    eprintln!("Pump stopped: {}", e);
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    match handler.shutdown() {
        Shutdown::Stopped(stats) => println!("\n{} events, {} wakeups", stats.events, stats.wakeups),
        Shutdown::Failed(e) => eprintln!("\nPump failed: {}", e),
        Shutdown::Abandoned => eprintln!("\nPump did not stop in time"),
    }
}
