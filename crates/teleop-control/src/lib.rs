//! `teleop-control` – operator input to motor commands.
//!
//! # Modules
//!
//! - [`keys`] – the directional keys the controller listens to and the set
//!   of keys currently held.
//! - [`remote`] – the [`RemoteControl`] state machine that resolves held keys
//!   to a [`MotorState`][teleop_types::MotorState] and transmits a command on
//!   every change.

pub mod keys;
pub mod remote;

pub use keys::{Key, KeySet};
pub use remote::{CommandSink, KeyPattern, RESOLUTION_TABLE, RemoteControl, Transition, resolve};
