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

//! Protocol codecs and connection coordination for BLE-controlled
//! adjustable beds.
//!
//! The [`protocol`] registry describes every supported wire format as data.
//! A [`controller::BedController`] binds one descriptor to a bed's
//! configuration, and a [`coordinator::BedCoordinator`] owns the single link
//! to that bed.

pub mod bluetooth;
pub mod commands;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod detector;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod protocol;
pub mod state;

pub use commands::{Command, Direction, LightAction, MassageZone, Motor, Preset, Side};
pub use controller::{BedController, Response};
pub use coordinator::BedCoordinator;
pub use detector::{identify, Detection};
pub use error::{BedError, Result};
pub use protocol::{Codec, ProtocolId};
pub use state::LinkState;
