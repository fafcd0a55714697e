//! A small Rust client for the Gardin analytics query API.
//!
//! This crate implements the full query workflow:
//! authenticate with OAuth2 client credentials, submit a query, poll for
//! completion, then download the resulting CSV file.
//!
//! ## Quick start
//! - Configure credentials via environment variables (`GARDIN_CLIENT_ID`,
//!   `GARDIN_CLIENT_SECRET`) or a `.gardinrc` file (supported in the current
//!   directory and in your home directory).
//! - Call [`Client::retrieve`] with a [`QuerySpec`].
//!
//! ```no_run
//! use anyhow::Result;
//! use gardin_query::{Client, QuerySpec};
//!
//! fn main() -> Result<()> {
//!     let client = Client::from_env()?;
//!     let query = QuerySpec::indices("2024-12-01T17:32:28Z", "2024-12-30T00:23:46Z");
//!     let path = client.retrieve(&query)?;
//!     println!("results saved to {}", path.display());
//!     Ok(())
//! }
//! ```
//!
//! For full usage and configuration details, see the crate README.

#![forbid(unsafe_code)]

mod client;
mod config;
mod error;
mod query;
mod util;

pub use client::Client;
pub use config::ClientConfig;
pub use query::{JobStatus, QuerySpec, TimeRange};
