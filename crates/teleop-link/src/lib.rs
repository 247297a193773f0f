//! `teleop-link` – the communication layer between the operator client and
//! the robot's control module.
//!
//! Messages are JSON objects on a TCP byte stream, each terminated by the
//! literal token `__MSG_END__`. Every object carries its channel name in the
//! `id` field.
//!
//! # Modules
//!
//! - [`transport`] – the [`Transport`] seam and its TCP implementation.
//! - [`framer`] – splits the byte stream into frames, keeping partial tails.
//! - [`registry`] – ordered channel → handler lists.
//! - [`dispatch`] – decodes a frame and routes it through the registry.
//! - [`link`] – the [`Link`] context object the host loop polls once per tick.
//! - [`server`] – the control-module end of the same protocol.

pub mod dispatch;
pub mod framer;
pub mod link;
pub mod registry;
pub mod server;
pub mod transport;

pub use dispatch::{DispatchOutcome, dispatch};
pub use framer::{FRAME_DELIMITER, Framer};
pub use link::{Link, PollStats};
pub use registry::{Delivery, HandlerId, HandlerRegistry};
pub use server::ModuleServer;
pub use transport::{LinkConfig, TcpTransport, Transport};
