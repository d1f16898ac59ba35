//! Room synchronization client library for the Hayaoshi quiz platform.
//!
//! This library maintains a persistent WebSocket connection to the room
//! coordination service and keeps a consistent local view of room membership
//! and quiz progress. Presentation code subscribes to typed domain events and
//! re-renders from immutable room snapshots.

// layers
pub mod client;
pub mod domain;
pub mod infrastructure;

// shared library
pub mod common;
