//! Wake-up alarms that can only be dismissed by solving a smart cube.
//!
//! The daemon couples three independent event sources into one alarm state:
//! the wall-clock [`scheduler`], the wireless [`cube`] link, and operator
//! commands arriving over the HTTP [`api`]. The [`machine`] module owns the
//! single active-alarm slot; every change is fanned out to observers through
//! the [`broadcast`] module.

pub mod alarm;
pub mod api;
pub mod api_client;
pub mod audio;
pub mod broadcast;
pub mod config;
pub mod cube;
pub mod daemon;
pub mod error;
pub mod machine;
pub mod scheduler;
pub mod store;
pub mod tracing;
