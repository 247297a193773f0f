//! REPL – the operator console's command loop.
//!
//! Supported slash-commands:
//!   /help               – show this list
//!   /status             – connection, motor state, and latest telemetry
//!   /press <key>        – hold a direction key (up/down/left/right or WASD)
//!   /release <key>      – release a direction key
//!   /stop               – release every key (halts the robot)
//!   /local              – toggle local mode (commands tracked, not sent)
//!   /calibrate <kp> <kd>– send controller gains
//!   /connect            – (re)connect to the control module
//!   /quit | /exit       – release all keys and exit
//!
//! Stdin is read on a helper thread so the link keeps being polled while the
//! operator is idle at the prompt.

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use teleop_control::{Key, RemoteControl, Transition};
use teleop_link::{Link, Transport};
use tracing::{debug, warn};

use crate::config::Config;
use crate::panel::StatusPanel;

/// A parsed console command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Help,
    Status,
    Press(Key),
    Release(Key),
    Stop,
    Local,
    Calibrate { kp: f32, kd: f32 },
    Connect,
    Quit,
}

/// Parse one input line.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Err("empty command".to_string());
    };
    let args: Vec<&str> = parts.collect();

    let command = match head {
        "/help" => Command::Help,
        "/status" => Command::Status,
        "/stop" => Command::Stop,
        "/local" => Command::Local,
        "/connect" => Command::Connect,
        "/quit" | "/exit" => Command::Quit,
        "/press" | "/release" => {
            let [name] = args.as_slice() else {
                return Err(format!("usage: {head} <up|down|left|right>"));
            };
            let key = name.parse::<Key>()?;
            return Ok(if head == "/press" {
                Command::Press(key)
            } else {
                Command::Release(key)
            });
        }
        "/calibrate" => {
            let [kp, kd] = args.as_slice() else {
                return Err("usage: /calibrate <kp> <kd>".to_string());
            };
            let kp = kp
                .parse::<f32>()
                .map_err(|e| format!("invalid kp '{kp}': {e}"))?;
            let kd = kd
                .parse::<f32>()
                .map_err(|e| format!("invalid kd '{kd}': {e}"))?;
            return Ok(Command::Calibrate { kp, kd });
        }
        other => return Err(format!("unknown command '{other}'")),
    };
    if !args.is_empty() {
        return Err(format!("{head} takes no arguments"));
    }
    Ok(command)
}

/// Whether the loop should keep going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Link, remote controller, and status panel for one console session.
pub struct Console<T: Transport> {
    link: Link<T>,
    remote: RemoteControl,
    panel: StatusPanel,
}

impl<T: Transport> Console<T> {
    pub fn new(mut link: Link<T>) -> Self {
        let panel = StatusPanel::attach(&mut link);
        Self {
            link,
            remote: RemoteControl::new(),
            panel,
        }
    }

    pub fn remote(&self) -> &RemoteControl {
        &self.remote
    }

    pub fn connect(&mut self) {
        match self.link.connect() {
            Ok(()) => println!("  {} connected to control module", "✓".green().bold()),
            Err(e) => println!("  {} {}", "offline:".yellow(), e),
        }
    }

    pub fn execute(&mut self, command: Command) -> Flow {
        match command {
            Command::Help => cmd_help(),
            Command::Status => self.cmd_status(),
            Command::Press(key) => {
                let t = self.remote.key_down(key, &mut self.link);
                report(t);
            }
            Command::Release(key) => {
                let t = self.remote.key_up(key, &mut self.link);
                report(t);
            }
            Command::Stop => {
                let t = self.remote.release_all(&mut self.link);
                report(t);
            }
            Command::Local => {
                let remote = !self.remote.is_remote();
                self.remote.set_remote(remote);
                let mode = if remote { "remote" } else { "local" };
                println!("  mode: {}", mode.bold());
            }
            Command::Calibrate { kp, kd } => match self.link.transmit_calibration(kp, kd) {
                Ok(()) => println!("  calibration sent (kp {kp}, kd {kd})"),
                Err(e) => println!("  {}: {}", "Calibration not sent".red(), e),
            },
            Command::Connect => self.connect(),
            Command::Quit => return Flow::Exit,
        }
        Flow::Continue
    }

    /// Poll the link once.
    pub fn tick(&mut self) {
        let stats = self.link.poll();
        if stats.dropped > 0 {
            debug!(dropped = stats.dropped, "frames dropped this tick");
        }
    }

    /// Release every key (sending halt if needed) and close the link.
    pub fn shutdown(&mut self) {
        report(self.remote.release_all(&mut self.link));
        self.link.close();
    }

    fn cmd_status(&self) {
        println!();
        println!("{}", "Status".bold().underline());
        let conn = if self.link.is_connected() {
            "connected".green()
        } else {
            "offline".yellow()
        };
        println!("  link   : {conn}");
        println!(
            "  mode   : {}",
            if self.remote.is_remote() { "remote" } else { "local" }
        );
        println!("  keys   : {}", self.remote.keys());
        println!("  motors : {}", self.remote.state().to_string().bold());
        for line in self.panel.snapshot().render() {
            println!("  {line}");
        }
        println!();
    }
}

fn report(transition: Option<Transition>) {
    match transition {
        Some(t) if t.sent => println!("  {} → {}", t.from, t.to.to_string().bold()),
        Some(t) => println!(
            "  {} → {} {}",
            t.from,
            t.to.to_string().bold(),
            "(not sent)".dimmed()
        ),
        None => {}
    }
}

fn cmd_help() {
    println!();
    println!("{}", "Teleop Commands".bold().underline());
    println!("  {}               – link, motors, and telemetry", "/status".bold().cyan());
    println!("  {}  – hold / release a direction key", "/press /release <key>".bold().cyan());
    println!("  {}                 – release every key", "/stop".bold().cyan());
    println!("  {}                – toggle local mode", "/local".bold().cyan());
    println!("  {}  – send controller gains", "/calibrate <kp> <kd>".bold().cyan());
    println!("  {}              – reconnect to the module", "/connect".bold().cyan());
    println!("  {}          – exit the console", "/quit  /exit".bold().cyan());
    println!();
}

fn prompt() {
    print!("{} ", "teleop>".bold().cyan());
    io::stdout().flush().ok();
}

/// Forward stdin lines to the loop; the channel closes on EOF.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stdin read error");
                    break;
                }
            }
        }
    });
    rx
}

/// Entry point for the interactive console.
///
/// `shutdown` is polled each tick; when set the console releases all keys,
/// closes the link, and returns.
pub fn run<T: Transport>(cfg: &Config, link: Link<T>, shutdown: Arc<AtomicBool>) {
    let mut console = Console::new(link);
    console.connect();
    run_loop(&mut console, cfg.tick_interval(), &shutdown);
    console.shutdown();
    println!("{}", "Goodbye.".green());
}

fn run_loop<T: Transport>(console: &mut Console<T>, tick: Duration, shutdown: &AtomicBool) {
    let input = spawn_stdin_reader();
    prompt();
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        match input.try_recv() {
            Ok(line) => {
                let line = line.trim();
                if !line.is_empty() {
                    match parse_command(line) {
                        Ok(cmd) => {
                            if console.execute(cmd) == Flow::Exit {
                                break;
                            }
                        }
                        Err(e) => println!(
                            "{} {}. Type {} for available commands.",
                            "Error:".red(),
                            e.yellow(),
                            "/help".bold()
                        ),
                    }
                }
                prompt();
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break, // EOF
        }

        console.tick();
        thread::sleep(tick);
    }
}
