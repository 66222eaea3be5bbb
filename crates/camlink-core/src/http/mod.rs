//! HTTP channels
//!
//! Client for the transmitter's control surface and the locally hosted
//! rotation callback endpoint.

pub mod client;
pub mod server;

pub use client::{HttpConfigClient, SwapMode};
pub use server::{router, serve, serve_on, ControlState, CONTROL_PORT};
