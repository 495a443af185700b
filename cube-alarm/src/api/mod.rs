//! HTTP API and push channel.
//!
//! Handlers never touch alarm or cube state directly. Reads come from the
//! store and the broadcaster's snapshot; changes to the active session or
//! the cube link are sent to the owning actor as [`commands`].

pub mod commands;
mod events;
pub mod server;
mod v0;

pub use server::{ApiState, SharedState, router, serve};
