//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p sim_server -- [--config sim.json] [--tick-hz 20] [--seed 1] [--monsters 8]
//!
//! Runs a fixed timestep simulation over a flat demo world. Encoded
//! replication messages are handed to a consumer task standing in for the
//! network layer.
//!
//! Console commands:
//!   status                     - Show tick, counts and every entity
//!   state <id> [label]         - Show or set a monster's AI state
//!   spawn <player|species> [x y z]
//!   destroy <id>
//!   attach <child> <parent> / detach <child>
//!   attr <id> <name> <value>   - Set a monster attribute
//!   fire <id> <seconds>
//!   config                     - Print the active config
//!   quit                       - Shutdown server

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use bytes::Bytes;
use sim_server::SimServer;
use sim_shared::config::SimConfig;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Args {
    config: Option<String>,
    tick_hz: Option<u32>,
    seed: Option<u64>,
    monsters: Option<u32>,
}

fn parse_args() -> Args {
    let mut out = Args::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                out.config = Some(args[i + 1].clone());
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                out.tick_hz = args[i + 1].parse().ok();
                i += 2;
            }
            "--seed" if i + 1 < args.len() => {
                out.seed = args[i + 1].parse().ok();
                i += 2;
            }
            "--monsters" if i + 1 < args.len() => {
                out.monsters = args[i + 1].parse().ok();
                i += 2;
            }
            _ => i += 1,
        }
    }
    out
}

fn load_config(args: &Args) -> anyhow::Result<SimConfig> {
    let mut cfg = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
            SimConfig::from_json_str(&text).with_context(|| format!("parse {path}"))?
        }
        None => SimConfig {
            monster_count: 8,
            ..Default::default()
        },
    };
    if let Some(hz) = args.tick_hz {
        cfg.tick_hz = hz;
    }
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }
    if let Some(n) = args.monsters {
        cfg.monster_count = n;
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = load_config(&parse_args())?;
    info!(
        tick_hz = cfg.tick_hz,
        seed = cfg.seed,
        monsters = cfg.monster_count,
        "Starting server"
    );

    let mut server = SimServer::new(cfg).context("create server")?;

    // Network stand-in: drain encoded broadcasts.
    let (broadcast_tx, mut broadcast_rx) = mpsc::channel::<Bytes>(1024);
    server.set_broadcast_output(broadcast_tx);
    tokio::spawn(async move {
        while let Some(payload) = broadcast_rx.recv().await {
            debug!(bytes = payload.len(), "Broadcast");
        }
    });

    // Set up console input channel.
    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    server.set_console_input(console_rx);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Server ready. Type 'status' for info, 'quit' to exit.");
    println!();

    // Main server loop.
    let tick_interval = server.tick_interval();
    let mut next_tick = tokio::time::Instant::now();

    while !server.quit_requested() {
        server.step(tick_interval.as_secs_f32())?;

        // Wait for next tick.
        next_tick += tick_interval;
        tokio::time::sleep_until(next_tick).await;
    }

    info!(ticks = server.tick(), sent = server.sent(), "Server stopped");
    Ok(())
}
