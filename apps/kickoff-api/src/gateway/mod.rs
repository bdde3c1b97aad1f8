//! Zone-scoped real-time channels.
//!
//! `/ws/matches` carries match board actions, `/ws/chat` carries chat lines
//! for one match. Both share a single [`hub::Hub`] keyed by zone.

pub mod events;
mod handler;
pub mod hub;
pub mod server;
pub mod session;
