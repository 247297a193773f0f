//! Frame decoding and routing.
//!
//! | Frame | Outcome | Log level |
//! |---|---|---|
//! | not JSON, or not a JSON object | [`DispatchOutcome::Malformed`] | `warn` |
//! | object without a usable `id` | [`DispatchOutcome::MissingChannel`] | `debug` |
//! | `id` with no registered handler | [`DispatchOutcome::Unhandled`] | `debug` |
//! | otherwise | [`DispatchOutcome::Delivered`] | – |

use teleop_types::{LinkError, Message};
use tracing::{debug, warn};

use crate::registry::HandlerRegistry;

/// What happened to a single frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered {
        channel: String,
        invoked: usize,
        failed: usize,
    },
    Malformed,
    MissingChannel,
    Unhandled(String),
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }
}

/// Decode `frame` and hand its fields to every handler for its channel.
pub fn dispatch(registry: &mut HandlerRegistry, frame: &[u8]) -> DispatchOutcome {
    let message = match Message::decode(frame) {
        Ok(message) => message,
        Err(LinkError::MissingChannel) => {
            debug!(frame = %String::from_utf8_lossy(frame), "dropping frame without channel id");
            return DispatchOutcome::MissingChannel;
        }
        Err(e) => {
            warn!(frame = %String::from_utf8_lossy(frame), error = %e, "dropping undecodable frame");
            return DispatchOutcome::Malformed;
        }
    };

    match registry.invoke(&message.channel, &message.fields) {
        Some(delivery) => DispatchOutcome::Delivered {
            channel: message.channel,
            invoked: delivery.invoked,
            failed: delivery.failed,
        },
        None => {
            debug!(channel = %message.channel, "unhandled channel");
            DispatchOutcome::Unhandled(message.channel)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use teleop_types::{Fields, RobotPose};

    #[test]
    fn malformed_frame_does_not_reach_handlers() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        let h = hits.clone();
        registry.subscribe(move |pose: RobotPose| h.borrow_mut().push(pose));

        let first = dispatch(&mut registry, br#"{"id":"robot","x":1,"#);
        let second = dispatch(&mut registry, br#"{"id":"robot","x":3,"y":4,"r":5}"#);

        assert_eq!(first, DispatchOutcome::Malformed);
        assert!(second.is_delivered());
        assert_eq!(
            *hits.borrow(),
            vec![RobotPose {
                x: 3.0,
                y: 4.0,
                r: 5.0
            }]
        );
    }

    #[test]
    fn non_object_payload_is_malformed() {
        let mut registry = HandlerRegistry::new();
        assert_eq!(dispatch(&mut registry, b"42"), DispatchOutcome::Malformed);
    }

    #[test]
    fn frame_without_channel_is_dropped() {
        let mut registry = HandlerRegistry::new();
        registry.register("robot", |_: &Fields| panic!("must not be called"));
        assert_eq!(
            dispatch(&mut registry, br#"{"x":1,"y":2,"r":0}"#),
            DispatchOutcome::MissingChannel
        );
    }

    #[test]
    fn unknown_channel_is_reported_unhandled() {
        let mut registry = HandlerRegistry::new();
        assert_eq!(
            dispatch(&mut registry, br#"{"id":"weather","temp":3}"#),
            DispatchOutcome::Unhandled("weather".to_string())
        );
    }

    #[test]
    fn channel_field_is_removed_before_handlers_run() {
        let seen = Rc::new(RefCell::new(Fields::new()));
        let mut registry = HandlerRegistry::new();
        let s = seen.clone();
        registry.register("message", move |fields: &Fields| {
            *s.borrow_mut() = fields.clone();
            Ok(())
        });

        dispatch(&mut registry, br#"{"id":"message","text":"hello"}"#);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen["text"], "hello");
    }
}
