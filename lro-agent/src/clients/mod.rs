//! Clients for storage backends.
//!
//! - sim: file-backed simulation of a slow cloud disk API

pub mod sim;

pub use sim::SimClient;
