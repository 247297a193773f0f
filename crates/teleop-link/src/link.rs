//! [`Link`] – the context object that owns the connection to the control
//! module.
//!
//! One `Link` is built at start-up and handed to every collaborator that
//! needs to register handlers or send messages. The host loop calls
//! [`Link::poll`] exactly once per tick; that call is the only place inbound
//! traffic is drained and handlers run.

use teleop_types::{
    Calibration, ChannelPayload, Fields, LinkError, MotorCommand, MotorState, encode,
};
use tracing::{debug, info, warn};

use crate::dispatch::{DispatchOutcome, dispatch};
use crate::framer::Framer;
use crate::registry::{HandlerId, HandlerRegistry};
use crate::transport::{LinkConfig, TcpTransport, Transport};

/// Per-tick counters returned by [`Link::poll`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Bytes read from the transport this tick.
    pub bytes: usize,
    /// Complete frames found.
    pub frames: usize,
    /// Frames that reached at least one handler.
    pub delivered: usize,
    /// Frames dropped as malformed, channel-less, or unhandled.
    pub dropped: usize,
}

impl PollStats {
    pub(crate) fn record(&mut self, outcome: &DispatchOutcome) {
        self.frames += 1;
        if outcome.is_delivered() {
            self.delivered += 1;
        } else {
            self.dropped += 1;
        }
    }
}

/// Connection, framer, and handler registry for one control module.
#[derive(Debug)]
pub struct Link<T: Transport = TcpTransport> {
    transport: T,
    framer: Framer,
    registry: HandlerRegistry,
}

impl Link<TcpTransport> {
    /// A closed link that will dial the module described by `config`.
    pub fn tcp(config: LinkConfig) -> Self {
        Self::new(TcpTransport::new(config))
    }
}

impl<T: Transport> Link<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            framer: Framer::new(),
            registry: HandlerRegistry::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Open the connection. Calling this on an open link keeps the partial
    /// frame buffered so far.
    ///
    /// Failure is logged and returned but leaves the link usable in offline
    /// mode: sends fail with [`LinkError::NotConnected`] and polls are empty.
    pub fn connect(&mut self) -> Result<(), LinkError> {
        let was_open = self.transport.is_open();
        match self.transport.connect() {
            Ok(()) if was_open => Ok(()),
            Ok(()) => {
                self.framer.clear();
                info!("connected to control module");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "could not connect to control module; running offline");
                Err(e)
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    /// Close the connection. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.transport.is_open() {
            info!("closing connection to control module");
        }
        self.transport.close();
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Append `handler` to the handlers for `channel`.
    pub fn register<F>(&mut self, channel: impl Into<String>, handler: F) -> HandlerId
    where
        F: FnMut(&Fields) -> Result<(), LinkError> + 'static,
    {
        self.registry.register(channel, handler)
    }

    /// Register a typed handler for `P::CHANNEL`.
    pub fn subscribe<P, F>(&mut self, handler: F) -> HandlerId
    where
        P: ChannelPayload,
        F: FnMut(P) + 'static,
    {
        self.registry.subscribe(handler)
    }

    pub fn unregister(&mut self, id: HandlerId) -> bool {
        self.registry.unregister(id)
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Read whatever the transport has, split it into frames, and dispatch
    /// every complete frame in order.
    pub fn poll(&mut self) -> PollStats {
        let chunk = self.transport.read_available();
        let mut stats = PollStats {
            bytes: chunk.len(),
            ..PollStats::default()
        };
        for frame in self.framer.feed(&chunk) {
            let outcome = dispatch(&mut self.registry, &frame);
            stats.record(&outcome);
        }
        if stats.frames > 0 {
            debug!(
                frames = stats.frames,
                delivered = stats.delivered,
                dropped = stats.dropped,
                residual = self.framer.residual().len(),
                "poll"
            );
        }
        stats
    }

    /// Dispatch one already-framed payload.
    pub fn dispatch(&mut self, frame: &[u8]) -> DispatchOutcome {
        dispatch(&mut self.registry, frame)
    }

    /// Bytes buffered while waiting for the rest of a frame.
    pub fn residual(&self) -> &[u8] {
        self.framer.residual()
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Send a raw JSON payload. The delimiter is appended by the transport.
    ///
    /// Failures are logged and returned; they never close the link.
    pub fn send(&mut self, payload: &str) -> Result<(), LinkError> {
        self.transport.send(payload.as_bytes()).inspect_err(|e| {
            warn!(error = %e, "failed to send message to control module");
        })
    }

    /// Encode `payload` with its channel identifier and send it.
    pub fn transmit<P: ChannelPayload>(&mut self, payload: &P) -> Result<(), LinkError> {
        let json = encode(payload)?;
        debug!(channel = P::CHANNEL, "transmit");
        self.send(&json)
    }

    /// Send a `command` message for `state`.
    pub fn transmit_command(&mut self, state: MotorState) -> Result<(), LinkError> {
        self.transmit(&MotorCommand { state })
    }

    /// Send a `calibration` message with the given controller gains.
    pub fn transmit_calibration(&mut self, kp: f32, kd: f32) -> Result<(), LinkError> {
        self.transmit(&Calibration { kp, kd })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
