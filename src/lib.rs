//! ITSM backend: service catalogue and user management over REST, a read-through
//! response cache, and a queue-driven notification relay.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod messaging;
pub mod notifications;
mod util;
