//! Command handlers.

pub mod call;
pub mod chat;
pub mod servers;
