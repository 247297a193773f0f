//! `teleop` – operator console for a remotely driven robot.
//!
//! This binary:
//!
//! 1. Checks for `~/.teleop/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Connects to the robot's control module and drops the operator into a
//!    slash-command **console** that drives the motors and shows telemetry.
//! 3. Intercepts **Ctrl-C** to release every key (halting the robot) and close
//!    the link before exiting.
//!
//! `teleop module` instead runs a stand-in control module endpoint, useful for
//! exercising the console without a robot.

mod config;
mod module;
mod panel;
mod repl;
mod telemetry;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use teleop_link::Link;

enum Mode {
    Console,
    Module,
}

fn main() {
    telemetry::init_tracing();

    let mode = match std::env::args().nth(1).as_deref() {
        None | Some("console") => Mode::Console,
        Some("module") => Mode::Module,
        Some(other) => {
            eprintln!("{} '{}'. Usage: teleop [console|module]", "Unknown mode".red(), other);
            std::process::exit(2);
        }
    };

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    // The loops notice the flag on their next tick; the console then sends
    // halt and closes the link itself.
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the robot will not be halted on Ctrl-C");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let file = match config::load() {
        Ok(None) if matches!(mode, Mode::Console) => run_first_run_wizard(),
        Ok(None) => None,
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            Some(cfg)
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            None
        }
    };
    let cfg = config::effective(file);

    match mode {
        Mode::Module => module::run(&cfg, shutdown),
        Mode::Console => {
            println!(
                "\n  Control module at {} – type {} for a list of commands.\n",
                format!("{}:{}", cfg.host, cfg.port).bold(),
                "/help".bold().cyan()
            );
            let link = Link::tcp(cfg.link_config());
            repl::run(&cfg, link, shutdown);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> Option<config::Config> {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       Teleop First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Where is the robot?\n");

    let mut cfg = config::Config::default();

    cfg.host = prompt_line(
        &format!("  Control module host [{}]: ", cfg.host),
        &cfg.host,
    );

    let port_str = prompt_line(
        &format!("  Control module port [{}]: ", cfg.port),
        &cfg.port.to_string(),
    );
    if let Ok(p) = port_str.trim().parse::<u16>() {
        cfg.port = p;
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    Some(cfg)
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  __       __           "#.bold().cyan());
    println!("{}", r#" / /____  / /__ ___  ___ "#.bold().cyan());
    println!("{}", r#"/ __/ -_)/ / -_) _ \/ _ \"#.bold().cyan());
    println!("{}", r#"\__/\__//_/\__/\___/ .__/"#.bold().cyan());
    println!("{}", r#"                  /_/    "#.bold().cyan());
    println!();
    println!("  {} {}",
        "Teleop".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Remote control console");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
