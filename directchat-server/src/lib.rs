//! `DirectChat` server library.
//!
//! Real-time messaging and presence engine: tracks which users are
//! currently reachable, routes messages and typing signals to live
//! connections, and advances each message through the
//! sent -> delivered -> read delivery lifecycle.
//!
//! Exposed as a library so tests can embed an in-process server.

pub mod auth;
pub mod config;
pub mod delivery;
pub mod http;
pub mod presence;
pub mod registry;
pub mod router;
pub mod socket;
pub mod store;
pub mod typing;
