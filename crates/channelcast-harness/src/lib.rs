//! Deterministic test doubles for channelcast.
//!
//! - [`SimEnv`]: clock pinned to a chosen local instant and UTC offset
//! - [`FaultyStore`]: store wrapper failing exactly the calls a test names
//! - [`ScriptedPush`]: push adapter with per-connection scripted outcomes
//!   that records every delivery attempt

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod faulty_store;
pub mod scripted_push;
pub mod sim_env;

pub use faulty_store::FaultyStore;
pub use scripted_push::{Delivery, ScriptedPush};
pub use sim_env::SimEnv;
