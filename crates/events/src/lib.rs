#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! # Sentinel Events
//!
//! Client for pushing discrete [`Event`]s to a Riemann-style event-monitoring
//! service. Events are merged over configured [`EventDefaults`] and sent over
//! a stream (TCP, acknowledged) or datagram (UDP) transport, optionally in
//! batches. Sends are bounded by an acknowledgment timeout and never raise:
//! the caller gets a [`SendOutcome`] describing what happened.

mod client;
mod event;
mod transport;
pub mod utils;

pub use client::{
    CloseReport, DEFAULT_ACK_TIMEOUT, DEFAULT_EVENTS_PORT, EventClient, EventsConfig, SendOutcome,
};
pub use event::{Event, EventDefaults, NO_SERVICE, WireEvent};
pub use transport::{
    Ack, DatagramTransport, EventTransport, MAX_FRAME_LEN, MockEventTransport, StreamTransport,
    TransportKind, decode_ack, decode_message, encode_ack, encode_message, read_frame,
    write_frame,
};
