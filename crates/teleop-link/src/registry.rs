//! [`HandlerRegistry`] – ordered channel → handler lists.
//!
//! Collaborators register closures for the channels they care about when they
//! are constructed. Handlers for one channel run in registration order. A
//! handler that fails, by returning an error or by panicking, is logged and
//! skipped; the remaining handlers for the message still run.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use teleop_types::{ChannelPayload, Fields, LinkError, parse_fields};
use tracing::{error, warn};

/// Callback invoked with a message's fields (channel identifier removed).
pub type Handler = Box<dyn FnMut(&Fields) -> Result<(), LinkError>>;

/// Token returned by registration, used to remove the handler again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Result of delivering one message to a channel's handlers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub invoked: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct HandlerRegistry {
    channels: HashMap<String, Vec<(HandlerId, Handler)>>,
    next_id: u64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the list for `channel`.
    pub fn register<F>(&mut self, channel: impl Into<String>, handler: F) -> HandlerId
    where
        F: FnMut(&Fields) -> Result<(), LinkError> + 'static,
    {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.channels
            .entry(channel.into())
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Register a handler that receives the fields already deserialized into
    /// the channel's payload type.
    ///
    /// Fields that do not match `P` count as a handler failure.
    pub fn subscribe<P, F>(&mut self, mut handler: F) -> HandlerId
    where
        P: ChannelPayload,
        F: FnMut(P) + 'static,
    {
        self.register(P::CHANNEL, move |fields: &Fields| {
            let payload = parse_fields::<P>(P::CHANNEL, fields)?;
            handler(payload);
            Ok(())
        })
    }

    /// Remove a previously registered handler. Returns `false` if it was
    /// already gone.
    pub fn unregister(&mut self, id: HandlerId) -> bool {
        let mut removed = false;
        self.channels.retain(|_, handlers| {
            let before = handlers.len();
            handlers.retain(|(hid, _)| *hid != id);
            removed |= handlers.len() != before;
            !handlers.is_empty()
        });
        removed
    }

    /// Number of handlers registered for `channel`.
    pub fn handler_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, Vec::len)
    }

    /// Channels with at least one handler, in no particular order.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Call every handler registered for `channel` with `fields`.
    ///
    /// Returns `None` when the channel has no handlers.
    pub fn invoke(&mut self, channel: &str, fields: &Fields) -> Option<Delivery> {
        let handlers = self.channels.get_mut(channel).filter(|h| !h.is_empty())?;
        let mut delivery = Delivery::default();
        for (id, handler) in handlers.iter_mut() {
            delivery.invoked += 1;
            match panic::catch_unwind(AssertUnwindSafe(|| handler(fields))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    delivery.failed += 1;
                    warn!(channel, handler = id.0, error = %e, "handler failed");
                }
                Err(payload) => {
                    delivery.failed += 1;
                    error!(
                        channel,
                        handler = id.0,
                        panic = panic_message(payload.as_ref()),
                        "handler panicked"
                    );
                }
            }
        }
        Some(delivery)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .channels
            .iter()
            .map(|(channel, handlers)| (channel.as_str(), handlers.len()))
            .collect();
        f.debug_struct("HandlerRegistry")
            .field("channels", &counts)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
