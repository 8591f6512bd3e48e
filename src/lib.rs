//! Client-side data layer for the dashboard REST API.
//!
//! A tag-based read-through cache ([`cache`]) keeps file-manager listings and
//! audit-log pages consistent with the mutations issued through the
//! [`application`] services. [`Session`] wires the HTTP transport, the cache
//! and the services together for one signed-in user.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
mod session;

pub use session::Session;
