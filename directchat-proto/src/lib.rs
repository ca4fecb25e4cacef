//! Shared protocol definitions for the `DirectChat` wire format.

pub mod event;
pub mod ident;
pub mod message;
