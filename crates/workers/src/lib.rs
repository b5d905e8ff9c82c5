//! Render worker connection plumbing.
//!
//! One persistent WebSocket connection per worker: typed wire messages,
//! connect with timeout, fixed-delay reconnection, a per-connection session
//! task that multiplexes outbound commands and inbound replies, and the
//! benchmark barrier used to estimate worker capability. Everything the
//! scheduler needs to know arrives as a [`events::WorkerEvent`] on one
//! shared channel.

pub mod benchmark;
pub mod client;
pub mod events;
pub mod handle;
pub mod manager;
pub mod messages;
pub mod processor;
pub mod reconnect;
