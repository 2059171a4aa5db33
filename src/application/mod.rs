//! Application services: use-cases over repositories, the cache and the message relay.

pub mod auth;
pub mod catalog;
pub mod error;
pub mod events;
pub mod repos;
pub mod users;
