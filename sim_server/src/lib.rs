//! `sim_server`
//!
//! Server-side driver for the simulation core:
//! - Fixed timestep tick loop over a [`sim_shared::world::World`]
//! - Debug console
//! - Encoded replication output for the networking layer
//!
//! Transport itself is out of scope; broadcasts leave through a channel.

pub mod server;

pub use server::SimServer;
