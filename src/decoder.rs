//! Turning one read attempt into a decoded event.
//!
//! Every record is surfaced on its own as soon as it is read. `SYN_REPORT`
//! frames are not assembled and `SYN_DROPPED` overruns are not recovered;
//! both arrive as ordinary `EV_SYN` events.

use crate::error::{Error, Result};
use crate::event::DecodedEvent;
use crate::session::DeviceSession;
use std::io;

/// Outcome of one non-blocking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A record was available.
    Event(DecodedEvent),
    /// The kernel queue is empty right now.
    NoData,
}

/// Read and decode the next record from `session`.
///
/// Would-block becomes [`Decoded::NoData`]; any other read failure is
/// [`Error::Read`].
pub fn next_event(session: &DeviceSession) -> Result<Decoded> {
    match session.with_device(|d| d.read_event())? {
        Ok(raw) => Ok(Decoded::Event(raw.decode())),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Decoded::NoData),
        Err(e) => Err(Error::read(&e)),
    }
}
