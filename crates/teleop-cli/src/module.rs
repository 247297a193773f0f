//! `teleop module` – a stand-in control module endpoint.
//!
//! Accepts console connections, logs every `command` and `calibration` it
//! receives, and answers each with a `message` acknowledgement.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use colored::Colorize;
use teleop_link::{ModuleServer, server::DEFAULT_MAX_CLIENTS};
use teleop_types::{Calibration, LinkError, MotorCommand, TextMessage};
use tracing::{info, warn};

use crate::config::Config;

/// A module server with acknowledgement handlers installed.
pub struct StandIn {
    server: ModuleServer,
    acks: Rc<RefCell<Vec<String>>>,
}

impl StandIn {
    pub fn bind(addr: &str, port: u16) -> Result<Self, LinkError> {
        let mut server = ModuleServer::bind((addr, port), DEFAULT_MAX_CLIENTS)?;
        let acks = Rc::new(RefCell::new(Vec::new()));

        let a = acks.clone();
        server.subscribe(move |cmd: MotorCommand| {
            info!(state = %cmd.state, code = cmd.state.code(), "command received");
            a.borrow_mut().push(format!("ack command {}", cmd.state));
        });

        let a = acks.clone();
        server.subscribe(move |cal: Calibration| {
            info!(kp = cal.kp, kd = cal.kd, "calibration received");
            a.borrow_mut().push(format!("ack calibration kp={} kd={}", cal.kp, cal.kd));
        });

        Ok(Self { server, acks })
    }

    pub fn server(&self) -> &ModuleServer {
        &self.server
    }

    /// Service clients once and broadcast any pending acknowledgements.
    pub fn step(&mut self) {
        self.server.check_activity();
        let pending: Vec<String> = self.acks.borrow_mut().drain(..).collect();
        for text in pending {
            if let Err(e) = self.server.broadcast(&TextMessage { text }) {
                warn!(error = %e, "could not encode acknowledgement");
            }
        }
    }
}

/// Run the stand-in until `shutdown` is set.
pub fn run(cfg: &Config, shutdown: Arc<AtomicBool>) {
    let mut module = match StandIn::bind("0.0.0.0", cfg.port) {
        Ok(m) => m,
        Err(e) => {
            println!("{}: {}", "Could not start module endpoint".red(), e);
            return;
        }
    };
    match module.server().local_addr() {
        Ok(addr) => println!("  Module endpoint listening on {}", addr.to_string().bold()),
        Err(e) => warn!(error = %e, "listener address unavailable"),
    }

    let tick = cfg.tick_interval();
    while !shutdown.load(Ordering::SeqCst) {
        module.step();
        thread::sleep(tick);
    }
    println!("{}", "Module endpoint stopped.".green());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use teleop_link::{Link, LinkConfig};
    use teleop_types::MotorState;

    #[test]
    fn commands_are_acknowledged() {
        let mut module = StandIn::bind("127.0.0.1", 0).expect("bind");
        let port = module.server().local_addr().expect("addr").port();

        let mut link = Link::tcp(LinkConfig::new("127.0.0.1", port));
        link.connect().expect("connect");
        let texts = Rc::new(RefCell::new(Vec::new()));
        let t = texts.clone();
        link.subscribe(move |msg: TextMessage| t.borrow_mut().push(msg.text));

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut sent = false;
        while Instant::now() < deadline && texts.borrow().is_empty() {
            module.step();
            if !sent && module.server().client_count() == 1 {
                link.transmit_command(MotorState::DriveBackward)
                    .expect("send");
                sent = true;
            }
            link.poll();
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(*texts.borrow(), vec!["ack command drive-backward".to_string()]);
    }
}
