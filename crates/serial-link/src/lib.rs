//! Serial command/response link for Rusty Photon device drivers
//!
//! Focusers, rotators and similar accessories speak small vendor protocols
//! over a serial line: write a command, wait (bounded by a timeout) for a
//! delimited or fixed-length reply, parse it. Motion is asynchronous on the
//! device side, so drivers start a move and then poll until it completes.
//!
//! This crate holds the parts every such driver shares:
//!
//! - [`Framing`] and [`read_framed`]: delimiter or fixed-length reply frames
//! - [`SerialReader`], [`SerialWriter`], [`SerialPortFactory`]: transport
//!   traits with a tokio-serial implementation
//! - [`DeviceLink`]: reference-counted connection with exclusive command access
//! - [`MotionTracker`]: the `Idle -> Busy -> Ok | Alert` motion state machine
//! - [`Poller`]: the background polling task
//! - [`sum8`]/[`verify_sum8`]: additive checksums for binary frames

pub mod checksum;
pub mod error;
pub mod framing;
pub mod io;
pub mod link;
pub mod motion;
pub mod poller;
pub mod serial;

#[cfg(feature = "testing")]
pub mod testing;

pub use checksum::{sum8, verify_sum8};
pub use error::{LinkError, Result};
pub use framing::{read_framed, read_framed_into, Framing};
pub use io::{SerialPair, SerialPortFactory, SerialReader, SerialWriter};
pub use link::{DeviceLink, LinkSettings, MAX_STALE_RESPONSES};
pub use motion::{MotionState, MotionTracker, MotionUpdate};
pub use poller::Poller;
pub use serial::TokioSerialPortFactory;
