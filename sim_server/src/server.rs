//! Server implementation.
//!
//! Authoritative fixed-timestep loop around a [`World`]. It supports:
//! - Demo world bootstrap from [`SimConfig`]
//! - Console commands (status, state, spawn, destroy, attach, detach, attr,
//!   fire, config, quit)
//! - Handing encoded replication messages to the networking layer
//!
//! Determinism notes:
//! - Keep simulation in a fixed timestep.
//! - The world owns the only AI random stream, seeded from config.
//! - Entities are ticked in id order.

use std::time::Duration;

use anyhow::{bail, Context};
use bytes::Bytes;
use sim_shared::{
    config::{AttributeValue, SimConfig},
    ecs::EntityId,
    entity::Movable,
    math::DVec3,
    monster::DESTINATION_LIFT,
    net::{encode_to_bytes, NetMsg},
    terrain::BlockTerrain,
    world::World,
};
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, info, warn};

/// Simulation server.
pub struct SimServer {
    pub cfg: SimConfig,
    world: World,
    tick: u64,
    quit: bool,
    /// Messages encoded and handed off so far.
    sent: u64,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
    /// Encoded broadcasts for the networking layer.
    broadcast_tx: Option<mpsc::Sender<Bytes>>,
}

impl SimServer {
    /// Creates a server with a flat demo world populated per `cfg`.
    pub fn new(cfg: SimConfig) -> anyhow::Result<Self> {
        if cfg.tick_hz == 0 {
            bail!("tick_hz must be positive");
        }
        let terrain = BlockTerrain::flat(cfg.ground_height);
        let world = World::from_config(&cfg, terrain);

        let mut server = Self {
            cfg,
            world,
            tick: 0,
            quit: false,
            sent: 0,
            console_rx: None,
            broadcast_tx: None,
        };
        server.spawn_demo_population()?;
        Ok(server)
    }

    /// Spawns one player at the origin and `monster_count` monsters on a ring
    /// around it, cycling through the configured species.
    fn spawn_demo_population(&mut self) -> anyhow::Result<()> {
        let count = self.cfg.monster_count;
        if count == 0 {
            return Ok(());
        }
        let species: Vec<String> = self.world.species_names().map(str::to_string).collect();
        if species.is_empty() {
            bail!("monster_count is {count} but no species are configured");
        }

        let y = self.cfg.ground_height as f64 + DESTINATION_LIFT as f64;
        let player = self.world.spawn_player(DVec3::new(0.5, y, 0.5));
        info!(id = %player, "Spawned demo player");

        for i in 0..count {
            let angle = i as f64 / count as f64 * std::f64::consts::TAU;
            let pos = DVec3::new(12.0 * angle.cos(), y, 12.0 * angle.sin());
            let name = &species[i as usize % species.len()];
            let id = self
                .world
                .spawn_monster(name, pos)
                .with_context(|| format!("spawn demo {name}"))?;
            debug!(id = %id, species = %name, "Spawned demo monster");
        }
        Ok(())
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Sets where encoded broadcasts go. Without one they are discarded.
    pub fn set_broadcast_output(&mut self, tx: mpsc::Sender<Bytes>) {
        self.broadcast_tx = Some(tx);
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.cfg.tick_hz as f32)
    }

    /// Runs the server for a number of ticks.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = self.tick_interval();
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step(dt.as_secs_f32())?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Executes one fixed simulation step.
    pub fn step(&mut self, dt_sec: f32) -> anyhow::Result<()> {
        self.process_console_commands()?;
        self.world.tick(dt_sec);
        let msgs = self.world.drain_broadcasts();
        self.publish(msgs)?;
        self.tick += 1;
        Ok(())
    }

    fn publish(&mut self, msgs: Vec<NetMsg>) -> anyhow::Result<()> {
        for msg in msgs {
            let payload = encode_to_bytes(&msg).context("encode broadcast")?;
            self.sent += 1;
            if let Some(tx) = &self.broadcast_tx {
                if let Err(e) = tx.try_send(payload) {
                    warn!(error = %e, "Broadcast dropped");
                }
            }
        }
        Ok(())
    }

    fn process_console_commands(&mut self) -> anyhow::Result<()> {
        // Collect lines first to avoid borrow conflict
        let lines: Vec<String> = if let Some(ref mut rx) = self.console_rx {
            let mut collected = Vec::new();
            while let Ok(line) = rx.try_recv() {
                collected.push(line);
            }
            collected
        } else {
            Vec::new()
        };

        for line in lines {
            match self.exec_console(&line) {
                Ok(out) => {
                    for l in out {
                        println!("{l}");
                    }
                }
                Err(e) => println!("{e:#}"),
            }
        }
        Ok(())
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&cmd, args)) = tokens.split_first() else {
            return Ok(Vec::new());
        };

        match cmd {
            "status" => Ok(self.status()),
            "state" => match args {
                [id] => {
                    let id = parse_id(id)?;
                    let monster = self
                        .world
                        .get(id)
                        .and_then(|e| e.monster())
                        .with_context(|| format!("{id} is not a monster"))?;
                    Ok(vec![format!("{id}: {}", monster.state_label())])
                }
                [id, label] => {
                    let id = parse_id(id)?;
                    match self.world.set_monster_state(id, label) {
                        Ok(()) => Ok(vec![format!("{id}: {label}")]),
                        Err(e) => Ok(vec![format!("Failed to set state: {e}")]),
                    }
                }
                _ => Ok(vec!["Usage: state <id> [Idle|Chasing|Escaping|Attacking]".to_string()]),
            },
            "spawn" => {
                let Some((&what, coords)) = args.split_first() else {
                    return Ok(vec!["Usage: spawn <player|species> [x y z]".to_string()]);
                };
                let pos = self.parse_position(coords)?;
                let spawned = if what == "player" {
                    Ok(self.world.spawn_player(pos))
                } else {
                    self.world.spawn_monster(what, pos)
                };
                match spawned {
                    Ok(id) => Ok(vec![format!("Spawned {what} {id}")]),
                    Err(e) => Ok(vec![format!("Failed to spawn: {e}")]),
                }
            }
            "destroy" => {
                let [id] = args else {
                    return Ok(vec!["Usage: destroy <id>".to_string()]);
                };
                let id = parse_id(id)?;
                match self.world.destroy(id) {
                    Ok(true) => Ok(vec![format!("Destroyed {id}")]),
                    Ok(false) => Ok(vec![format!("{id} was already destroyed")]),
                    Err(e) => Ok(vec![format!("Failed to destroy: {e}")]),
                }
            }
            "attach" => {
                let [child, parent] = args else {
                    return Ok(vec!["Usage: attach <child> <parent>".to_string()]);
                };
                let (child, parent) = (parse_id(child)?, parse_id(parent)?);
                match self.world.attach(child, parent) {
                    Ok(()) => Ok(vec![format!("Attached {child} to {parent}")]),
                    Err(e) => Ok(vec![format!("Failed to attach: {e}")]),
                }
            }
            "detach" => {
                let [child] = args else {
                    return Ok(vec!["Usage: detach <child>".to_string()]);
                };
                let child = parse_id(child)?;
                match self.world.detach(child) {
                    Ok(true) => Ok(vec![format!("Detached {child}")]),
                    Ok(false) => Ok(vec![format!("{child} is not attached")]),
                    Err(e) => Ok(vec![format!("Failed to detach: {e}")]),
                }
            }
            "attr" => {
                let [id, name, value] = args else {
                    return Ok(vec!["Usage: attr <id> <name> <value>".to_string()]);
                };
                let id = parse_id(id)?;
                let value = AttributeValue::parse(value);
                match self.world.set_monster_attribute(id, name, &value) {
                    Ok(()) => Ok(vec![format!("{id}: {name} = {value}")]),
                    Err(e) => Ok(vec![format!("Failed to set attribute: {e}")]),
                }
            }
            "fire" => {
                let [id, secs] = args else {
                    return Ok(vec!["Usage: fire <id> <seconds>".to_string()]);
                };
                let id = parse_id(id)?;
                let secs: f32 = secs.parse().context("parse seconds")?;
                match self.world.set_on_fire(id, secs) {
                    Ok(()) => Ok(vec![format!("{id} is burning")]),
                    Err(e) => Ok(vec![format!("Failed to ignite: {e}")]),
                }
            }
            "config" => Ok(vec![
                serde_json::to_string_pretty(&self.cfg).context("serialize config")?
            ]),
            "quit" | "exit" => {
                info!("Server shutting down");
                self.quit = true;
                Ok(vec!["Bye".to_string()])
            }
            other => bail!("unknown command: {other}"),
        }
    }

    fn status(&self) -> Vec<String> {
        let mut out = Vec::new();
        out.push(format!("Tick: {}", self.tick));
        out.push(format!("World age: {}", self.world.world_age()));
        out.push(format!("Entities: {}", self.world.len()));
        out.push(format!("Broadcasts sent: {}", self.sent));
        for e in self.world.entities() {
            let p = e.position();
            let mut line = format!(
                "  {} {} at ({:.1}, {:.1}, {:.1})",
                e.id(),
                e.class_name(),
                p.x,
                p.y,
                p.z
            );
            if let Some(h) = e.health() {
                line.push_str(&format!(" hp={h}"));
            }
            if let Some(m) = e.monster() {
                line.push_str(&format!(" {} {}", m.attributes().mob_type, m.state_label()));
            }
            if e.is_riding() {
                line.push_str(" riding");
            }
            if e.is_on_fire() {
                line.push_str(" burning");
            }
            out.push(line);
        }
        out
    }

    /// `[x y z]` or nothing (then just above ground at the origin).
    fn parse_position(&self, coords: &[&str]) -> anyhow::Result<DVec3> {
        match coords {
            [] => Ok(DVec3::new(
                0.5,
                self.cfg.ground_height as f64 + DESTINATION_LIFT as f64,
                0.5,
            )),
            [x, y, z] => Ok(DVec3::new(
                x.parse().context("parse x")?,
                y.parse().context("parse y")?,
                z.parse().context("parse z")?,
            )),
            _ => bail!("position needs three coordinates"),
        }
    }
}

fn parse_id(token: &str) -> anyhow::Result<EntityId> {
    let raw = token.trim_start_matches('#');
    let n: u32 = raw
        .parse()
        .with_context(|| format!("parse entity id '{token}'"))?;
    Ok(EntityId(n))
}

/// Helper for tests: a server on an empty flat world.
pub fn ephemeral(tick_hz: u32) -> anyhow::Result<(SimServer, SimConfig)> {
    let cfg = SimConfig {
        tick_hz,
        monster_count: 0,
        ..Default::default()
    };
    let server = SimServer::new(cfg.clone())?;
    Ok((server, cfg))
}
