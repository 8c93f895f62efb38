// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Capability-oriented command model.
//!
//! These types describe *what* the caller wants the bed to do. The codec
//! registry turns them into wire bytes for a particular protocol family.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Physical actuator on the bed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Motor {
    Head,
    Back,
    Legs,
    Feet,
    Lumbar,
    Tilt,
    Neck,
}

impl Motor {
    pub const ALL: [Motor; 7] = [
        Motor::Head,
        Motor::Back,
        Motor::Legs,
        Motor::Feet,
        Motor::Lumbar,
        Motor::Tilt,
        Motor::Neck,
    ];

    /// Parse from string code.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "head" => Some(Self::Head),
            "back" => Some(Self::Back),
            "legs" | "leg" => Some(Self::Legs),
            "feet" | "foot" => Some(Self::Feet),
            "lumbar" => Some(Self::Lumbar),
            "tilt" => Some(Self::Tilt),
            "neck" => Some(Self::Neck),
            _ => None,
        }
    }

    /// Get string code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Back => "back",
            Self::Legs => "legs",
            Self::Feet => "feet",
            Self::Lumbar => "lumbar",
            Self::Tilt => "tilt",
            Self::Neck => "neck",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// Named positions. `Memory` slots are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Flat,
    ZeroG,
    Lounge,
    Tv,
    AntiSnore,
    Memory(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MassageZone {
    Head,
    Foot,
    Lumbar,
    All,
}

impl MassageZone {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "head" => Some(Self::Head),
            "foot" | "feet" => Some(Self::Foot),
            "lumbar" => Some(Self::Lumbar),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightAction {
    On,
    Off,
    Toggle,
}

/// Which half of a split bed a command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Both,
    Left,
    Right,
}

impl Side {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "both" | "sync" => Some(Self::Both),
            "left" | "a" => Some(Self::Left),
            "right" | "b" => Some(Self::Right),
            _ => None,
        }
    }
}

/// A logical operation, independent of wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Command {
    MotorMove { motor: Motor, direction: Direction },
    Stop,
    Preset { preset: Preset },
    SavePreset { slot: u8 },
    MassageToggle { zone: MassageZone },
    MassageOff,
    Light { action: LightAction },
    FanCycle { side: Side },
    PositionQuery,
    CapabilityQuery,
    /// Several intents OR-ed into one command word.
    Combined { commands: Vec<Command> },
}

impl Command {
    pub fn motor(motor: Motor, direction: Direction) -> Self {
        Command::MotorMove { motor, direction }
    }

    pub fn preset(preset: Preset) -> Self {
        Command::Preset { preset }
    }

    /// Held operations are retransmitted and always end with a Stop.
    pub fn is_held(&self) -> bool {
        match self {
            Command::MotorMove { .. } => true,
            Command::Combined { commands } => commands.iter().any(Command::is_held),
            _ => false,
        }
    }

    /// Short capability name, used in error messages.
    pub fn capability(&self) -> &'static str {
        match self {
            Command::MotorMove { .. } => "motor control",
            Command::Stop => "stop",
            Command::Preset {
                preset: Preset::Memory(_),
            } => "memory presets",
            Command::Preset { .. } => "presets",
            Command::SavePreset { .. } => "memory programming",
            Command::MassageToggle { .. } | Command::MassageOff => "massage",
            Command::Light { .. } => "lights",
            Command::FanCycle { .. } => "fan control",
            Command::PositionQuery => "position feedback",
            Command::CapabilityQuery => "capability query",
            Command::Combined { .. } => "combined commands",
        }
    }

    /// Parse the command-line form, e.g. `head-up`, `preset:flat`,
    /// `memory:2`, `save:1`, `massage:head`, `light:on`, `fan:left`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        if let Some((kind, arg)) = s.split_once(':') {
            return match kind {
                "preset" => match arg {
                    "flat" => Some(Self::preset(Preset::Flat)),
                    "zero-g" | "zerog" | "zero_g" => Some(Self::preset(Preset::ZeroG)),
                    "lounge" => Some(Self::preset(Preset::Lounge)),
                    "tv" => Some(Self::preset(Preset::Tv)),
                    "anti-snore" | "antisnore" => Some(Self::preset(Preset::AntiSnore)),
                    _ => None,
                },
                "memory" => arg.parse().ok().map(|n| Self::preset(Preset::Memory(n))),
                "save" => arg.parse().ok().map(|slot| Self::SavePreset { slot }),
                "massage" if arg == "off" => Some(Self::MassageOff),
                "massage" => MassageZone::parse(arg).map(|zone| Self::MassageToggle { zone }),
                "light" => match arg {
                    "on" => Some(Self::Light {
                        action: LightAction::On,
                    }),
                    "off" => Some(Self::Light {
                        action: LightAction::Off,
                    }),
                    "toggle" => Some(Self::Light {
                        action: LightAction::Toggle,
                    }),
                    _ => None,
                },
                "fan" => Side::parse(arg).map(|side| Self::FanCycle { side }),
                _ => None,
            };
        }

        match s.as_str() {
            "stop" => return Some(Self::Stop),
            "position" => return Some(Self::PositionQuery),
            "capabilities" => return Some(Self::CapabilityQuery),
            _ => {}
        }

        let (motor, direction) = s.rsplit_once('-')?;
        let direction = match direction {
            "up" => Direction::Up,
            "down" => Direction::Down,
            _ => return None,
        };
        Motor::parse(motor).map(|motor| Self::motor(motor, direction))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::MotorMove { motor, direction } => {
                let dir = match direction {
                    Direction::Up => "up",
                    Direction::Down => "down",
                };
                write!(f, "{}-{}", motor.as_str(), dir)
            }
            Command::Stop => write!(f, "stop"),
            Command::Preset {
                preset: Preset::Memory(n),
            } => write!(f, "memory:{}", n),
            Command::Preset { preset } => write!(f, "preset:{:?}", preset),
            Command::SavePreset { slot } => write!(f, "save:{}", slot),
            Command::MassageToggle { zone } => write!(f, "massage:{:?}", zone),
            Command::MassageOff => write!(f, "massage:off"),
            Command::Light { action } => write!(f, "light:{:?}", action),
            Command::FanCycle { side } => write!(f, "fan:{:?}", side),
            Command::PositionQuery => write!(f, "position"),
            Command::CapabilityQuery => write!(f, "capabilities"),
            Command::Combined { commands } => {
                let parts: Vec<String> = commands.iter().map(|c| c.to_string()).collect();
                write!(f, "{}", parts.join("+"))
            }
        }
    }
}

/// How many times a packet is sent and how far apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatPolicy {
    pub count: u32,
    pub interval: Duration,
}

impl RepeatPolicy {
    pub const SINGLE: RepeatPolicy = RepeatPolicy {
        count: 1,
        interval: Duration::ZERO,
    };

    pub const fn held(count: u32, interval_ms: u64) -> Self {
        Self {
            count,
            interval: Duration::from_millis(interval_ms),
        }
    }

    pub fn is_multi_shot(&self) -> bool {
        self.count > 1
    }
}

impl Default for RepeatPolicy {
    fn default() -> Self {
        Self::SINGLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse() {
        assert_eq!(
            Command::parse("head-up"),
            Some(Command::motor(Motor::Head, Direction::Up))
        );
        assert_eq!(
            Command::parse("FEET-down"),
            Some(Command::motor(Motor::Feet, Direction::Down))
        );
        assert_eq!(Command::parse("preset:zero-g"), Some(Command::preset(Preset::ZeroG)));
        assert_eq!(
            Command::parse("memory:2"),
            Some(Command::preset(Preset::Memory(2)))
        );
        assert_eq!(Command::parse("save:3"), Some(Command::SavePreset { slot: 3 }));
        assert_eq!(Command::parse("massage:off"), Some(Command::MassageOff));
        assert_eq!(Command::parse("fan:right"), Some(Command::FanCycle { side: Side::Right }));
        assert_eq!(Command::parse("stop"), Some(Command::Stop));
        assert_eq!(Command::parse("head-sideways"), None);
        assert_eq!(Command::parse("memory:x"), None);
    }

    #[test]
    fn test_display_matches_parse() {
        for text in ["head-up", "legs-down", "memory:4", "save:1", "stop", "position"] {
            let cmd = Command::parse(text).unwrap();
            assert_eq!(cmd.to_string(), text);
        }
    }

    #[test]
    fn test_held_commands() {
        assert!(Command::motor(Motor::Head, Direction::Up).is_held());
        assert!(!Command::preset(Preset::Flat).is_held());
        let combined = Command::Combined {
            commands: vec![
                Command::MassageToggle {
                    zone: MassageZone::Head,
                },
                Command::motor(Motor::Feet, Direction::Down),
            ],
        };
        assert!(combined.is_held());
    }

    #[test]
    fn test_repeat_policy() {
        assert!(!RepeatPolicy::SINGLE.is_multi_shot());
        let held = RepeatPolicy::held(25, 50);
        assert!(held.is_multi_shot());
        assert_eq!(held.interval, Duration::from_millis(50));
    }
}
