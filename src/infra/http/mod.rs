//! HTTP transport for the dashboard REST API.

mod client;
mod executor;

pub use client::ApiClient;
pub use executor::HttpExecutor;
