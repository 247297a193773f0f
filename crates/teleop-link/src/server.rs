//! [`ModuleServer`] – the control-module end of the link.
//!
//! The robot's control module listens for operator clients, pushes telemetry
//! (`sensor`, `robot`, `rplidar`, …) to every connected client, and receives
//! `command` and `calibration` messages back. This type implements that side
//! of the protocol with the same framing and dispatch rules as [`Link`], so
//! it doubles as a stand-in module for integration tests and bench work.
//!
//! Like the client, it is driven by polling: call
//! [`ModuleServer::check_activity`] once per loop iteration.
//!
//! [`Link`]: crate::link::Link

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use teleop_types::{ChannelPayload, Fields, LinkError, encode};
use tracing::{debug, info, warn};

use crate::dispatch::dispatch;
use crate::framer::Framer;
use crate::link::PollStats;
use crate::registry::{HandlerId, HandlerRegistry};
use crate::transport::{LinkConfig, TcpTransport, Transport};

/// Default number of simultaneous clients.
pub const DEFAULT_MAX_CLIENTS: usize = 30;

struct Client {
    peer: SocketAddr,
    transport: TcpTransport,
    framer: Framer,
}

/// Non-blocking, multi-client listener speaking the framed JSON protocol.
pub struct ModuleServer {
    listener: TcpListener,
    clients: Vec<Client>,
    registry: HandlerRegistry,
    max_clients: usize,
    client_config: LinkConfig,
}

impl ModuleServer {
    /// Bind to `addr` and start listening.
    ///
    /// # Errors
    ///
    /// [`LinkError::Io`] if the address cannot be bound.
    pub fn bind(addr: impl ToSocketAddrs, max_clients: usize) -> Result<Self, LinkError> {
        let listener = TcpListener::bind(addr).map_err(|source| LinkError::Io { op: "bind", source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| LinkError::Io {
                op: "configure",
                source,
            })?;
        if let Ok(local) = listener.local_addr() {
            info!(%local, max_clients, "module endpoint listening");
        }
        Ok(Self {
            listener,
            clients: Vec::new(),
            registry: HandlerRegistry::new(),
            max_clients,
            client_config: LinkConfig::default(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, LinkError> {
        self.listener
            .local_addr()
            .map_err(|source| LinkError::Io { op: "local_addr", source })
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn register<F>(&mut self, channel: impl Into<String>, handler: F) -> HandlerId
    where
        F: FnMut(&Fields) -> Result<(), LinkError> + 'static,
    {
        self.registry.register(channel, handler)
    }

    pub fn subscribe<P, F>(&mut self, handler: F) -> HandlerId
    where
        P: ChannelPayload,
        F: FnMut(P) + 'static,
    {
        self.registry.subscribe(handler)
    }

    /// Accept pending clients, then read and dispatch whatever every client
    /// has sent. Clients that hung up are dropped.
    pub fn check_activity(&mut self) -> PollStats {
        self.accept_pending();

        let mut stats = PollStats::default();
        let registry = &mut self.registry;
        self.clients.retain_mut(|client| {
            let chunk = client.transport.read_available();
            stats.bytes += chunk.len();
            for frame in client.framer.feed(&chunk) {
                let outcome = dispatch(registry, &frame);
                stats.record(&outcome);
            }
            if !client.transport.is_open() {
                info!(peer = %client.peer, "client disconnected");
                return false;
            }
            true
        });
        stats
    }

    /// Send `payload` to every connected client. Clients whose write fails
    /// are disconnected. Returns the number of clients reached.
    pub fn broadcast<P: ChannelPayload>(&mut self, payload: &P) -> Result<usize, LinkError> {
        let json = encode(payload)?;
        Ok(self.broadcast_raw(&json))
    }

    /// Send a raw JSON payload to every connected client.
    pub fn broadcast_raw(&mut self, payload: &str) -> usize {
        let mut reached = 0;
        self.clients.retain_mut(|client| match client.transport.send(payload.as_bytes()) {
            Ok(()) => {
                reached += 1;
                true
            }
            Err(e) => {
                warn!(peer = %client.peer, error = %e, "could not send to client; dropping it");
                false
            }
        });
        reached
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if self.clients.len() >= self.max_clients {
                        warn!(%peer, max_clients = self.max_clients, "client limit reached; refusing");
                        continue;
                    }
                    match TcpTransport::from_stream(stream, self.client_config.clone()) {
                        Ok(transport) => {
                            info!(%peer, "client connected");
                            self.clients.push(Client {
                                peer,
                                transport,
                                framer: Framer::new(),
                            });
                        }
                        Err(e) => warn!(%peer, error = %e, "could not set up client socket"),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }
}

impl std::fmt::Debug for ModuleServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleServer")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("clients", &self.clients.len())
            .field("max_clients", &self.max_clients)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_on_ephemeral_port_reports_address() {
        let server = ModuleServer::bind("127.0.0.1:0", DEFAULT_MAX_CLIENTS).expect("bind");
        assert_ne!(server.local_addr().expect("addr").port(), 0);
        assert_eq!(server.client_count(), 0);
    }

    #[test]
    fn check_activity_without_clients_is_empty() {
        let mut server = ModuleServer::bind("127.0.0.1:0", DEFAULT_MAX_CLIENTS).expect("bind");
        assert_eq!(server.check_activity(), PollStats::default());
        assert_eq!(server.broadcast_raw("{}"), 0);
    }

    #[test]
    fn binding_a_taken_port_fails() {
        let first = ModuleServer::bind("127.0.0.1:0", 1).expect("bind");
        let addr = first.local_addr().expect("addr");
        assert!(matches!(
            ModuleServer::bind(addr, 1),
            Err(LinkError::Io { op: "bind", .. })
        ));
    }
}
