//! Configuration.
//!
//! - [`SimConfig`]: root JSON config for the server (tick rate, seed, demo
//!   world, species table). File IO is left to the app.
//! - [`MonsterAttributes`]: per-species tunables with a name-keyed setter so
//!   an external monster-config loader can assign them one by one.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Typed attribute value handed to [`MonsterAttributes::set_attribute`].
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
}

impl AttributeValue {
    /// Parses console/config text: integer, then float, then bool, else string.
    pub fn parse(s: &str) -> Self {
        if let Ok(v) = s.parse::<i64>() {
            AttributeValue::Int(v)
        } else if let Ok(v) = s.parse::<f64>() {
            AttributeValue::Float(v)
        } else if let Ok(v) = s.parse::<bool>() {
            AttributeValue::Bool(v)
        } else {
            AttributeValue::String(s.to_string())
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::String(s) => s.parse().ok(),
            AttributeValue::Bool(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            AttributeValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            AttributeValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Int(v) => write!(f, "{v}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// Species tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonsterAttributes {
    /// Protocol mob type sent in spawn messages.
    pub mob_type: String,
    pub max_health: i32,
    pub sight_distance: f32,
    pub attack_damage: f32,
    pub attack_range: f32,
    /// Attack interval grows by `dt * attack_rate`; an attack lands above 3.
    pub attack_rate: f32,
    /// Empty means silent.
    pub sound_hurt: String,
    pub sound_death: String,
}

impl Default for MonsterAttributes {
    fn default() -> Self {
        Self {
            mob_type: "zombie".to_string(),
            max_health: 10,
            sight_distance: 25.0,
            attack_damage: 1.0,
            attack_range: 5.0,
            attack_rate: 3.0,
            sound_hurt: String::new(),
            sound_death: String::new(),
        }
    }
}

impl MonsterAttributes {
    /// Assigns one attribute by name. The value is left unchanged on error.
    pub fn set_attribute(&mut self, name: &str, value: &AttributeValue) -> SimResult<()> {
        let invalid = || SimError::InvalidAttribute {
            name: name.to_string(),
            value: value.to_string(),
        };
        let float = || {
            value
                .as_float()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v as f32)
                .ok_or_else(invalid)
        };

        match name {
            "mob_type" => self.mob_type = value.as_string(),
            "sound_hurt" => self.sound_hurt = value.as_string(),
            "sound_death" => self.sound_death = value.as_string(),
            "max_health" => {
                self.max_health = value
                    .as_int()
                    .filter(|v| *v > 0 && *v <= i32::MAX as i64)
                    .map(|v| v as i32)
                    .ok_or_else(invalid)?
            }
            "sight_distance" => self.sight_distance = float()?,
            "attack_damage" => self.attack_damage = float()?,
            "attack_range" => self.attack_range = float()?,
            "attack_rate" => self.attack_rate = float()?,
            _ => return Err(SimError::UnknownAttribute(name.to_string())),
        }
        Ok(())
    }
}

/// How a species reacts to players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Personality {
    #[default]
    Aggressive,
    Passive,
}

/// One entry of a species drop table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropRule {
    pub item: i16,
    pub min: u32,
    pub max: u32,
    #[serde(default)]
    pub damage: i16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SpeciesConfig {
    #[serde(default)]
    pub personality: Personality,
    #[serde(default)]
    pub attributes: MonsterAttributes,
    #[serde(default)]
    pub drops: Vec<DropRule>,
}

/// Root server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// Seed of the per-tick AI random stream.
    #[serde(default)]
    pub seed: u64,
    /// Top solid layer of the demo world.
    #[serde(default = "default_ground_height")]
    pub ground_height: i32,
    /// Monsters spawned into the demo world at startup.
    #[serde(default)]
    pub monster_count: u32,
    #[serde(default = "default_species")]
    pub species: BTreeMap<String, SpeciesConfig>,
}

fn default_ground_height() -> i32 {
    63
}

fn default_species() -> BTreeMap<String, SpeciesConfig> {
    let mut species = BTreeMap::new();
    species.insert(
        "zombie".to_string(),
        SpeciesConfig {
            personality: Personality::Aggressive,
            attributes: MonsterAttributes {
                max_health: 20,
                sound_hurt: "mob.zombie.hurt".to_string(),
                sound_death: "mob.zombie.death".to_string(),
                ..Default::default()
            },
            drops: vec![DropRule {
                item: 367,
                min: 0,
                max: 2,
                damage: 0,
            }],
        },
    );
    species.insert(
        "pig".to_string(),
        SpeciesConfig {
            personality: Personality::Passive,
            attributes: MonsterAttributes {
                mob_type: "pig".to_string(),
                sound_hurt: "mob.pig.say".to_string(),
                sound_death: "mob.pig.death".to_string(),
                ..Default::default()
            },
            drops: vec![DropRule {
                item: 319,
                min: 1,
                max: 3,
                damage: 0,
            }],
        },
    );
    species
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_hz: 20,
            seed: 0,
            ground_height: default_ground_height(),
            monster_count: 0,
            species: default_species(),
        }
    }
}

impl SimConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn species(&self, name: &str) -> Option<&SpeciesConfig> {
        self.species.get(name)
    }
}
