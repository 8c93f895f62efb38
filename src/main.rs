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

//! bedlink command-line tool

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use bedlink::protocol::{all_descriptors, Codec};
use bedlink::{identify, Command, ProtocolId, Side};

#[derive(Parser)]
#[command(name = "bedlink", version, about = "Talk to BLE adjustable beds")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Guess the protocol from advertisement data
    Identify {
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "service")]
        services: Vec<Uuid>,
    },
    /// Print the packets a command encodes to
    Encode {
        #[arg(long)]
        protocol: ProtocolId,
        #[arg(long, default_value = "both")]
        side: String,
        /// e.g. head-up, preset:flat, memory:1, head-up+feet-up
        command: String,
    },
    /// List supported protocols and what they can do
    Protocols,
    /// Connect to a bed and run one command
    #[cfg(feature = "bluez")]
    Run {
        address: String,
        command: String,
        #[arg(long)]
        protocol: Option<ProtocolId>,
        /// Dump captured frames as JSON afterwards
        #[arg(long)]
        diagnostics: bool,
    },
}

fn parse_command(input: &str) -> Result<Command> {
    let parts = input
        .split('+')
        .map(|part| Command::parse(part).ok_or_else(|| anyhow!("unknown command '{}'", part)))
        .collect::<Result<Vec<_>>>()?;
    match <[Command; 1]>::try_from(parts) {
        Ok([command]) => Ok(command),
        Err(commands) => Ok(Command::Combined { commands }),
    }
}

fn encode(protocol: ProtocolId, side: &str, input: &str) -> Result<()> {
    let side = Side::parse(side).ok_or_else(|| anyhow!("unknown side '{}'", side))?;
    let command = parse_command(input)?;
    let codec = Codec::new(protocol);
    for packet in codec.encode(&command, side)? {
        println!("{}  {}", packet.characteristic(), packet.hex());
    }
    Ok(())
}

fn list_protocols() {
    for desc in all_descriptors() {
        let caps = desc.capabilities();
        let mut features = Vec::new();
        if caps.motor_control {
            features.push("motors".to_string());
        }
        if caps.memory_presets {
            features.push(format!("memory x{}", caps.memory_slots));
        }
        if caps.memory_programming {
            features.push("store".to_string());
        }
        if caps.massage {
            features.push("massage".to_string());
        }
        if caps.lights {
            features.push("lights".to_string());
        }
        if caps.fan {
            features.push(format!("fan 0-{}", caps.fan_max_level));
        }
        if caps.position_feedback {
            features.push("positions".to_string());
        }
        if desc.requires_pin() {
            features.push("pin".to_string());
        }
        println!("{:<20} {:<24} {}", desc.id.as_str(), desc.name, features.join(", "));
    }
}

#[cfg(feature = "bluez")]
async fn run(
    address: String,
    input: String,
    protocol: Option<ProtocolId>,
    diagnostics: bool,
) -> Result<()> {
    use bedlink::bluetooth::BluezLinkService;
    use bedlink::config::{BedConfig, Config};
    use bedlink::diagnostics::DiagnosticsCapture;
    use bedlink::{BedController, BedCoordinator, Response};
    use anyhow::Context;
    use std::sync::Arc;
    use tracing::info;

    let config = Config::load()?;
    let command = parse_command(&input)?;
    let service = Arc::new(BluezLinkService::new().await?);

    let mut bed = config
        .bed(&address)
        .cloned()
        .unwrap_or_else(|| BedConfig::undetected(&address));
    if let Some(protocol) = protocol {
        bed.protocol = Some(protocol);
    }
    if bed.protocol.is_none() {
        let (name, services) = service.advertisement(&address).await?;
        let detected = identify(&services, name.as_deref());
        info!("Detected {} for {}", detected, address);
        bed.protocol = Some(
            detected
                .into_result()
                .context("pass --protocol to choose one")?,
        );
    }

    let controller = Arc::new(BedController::from_config(Arc::new(bed))?);
    let coordinator = BedCoordinator::new(service, controller);
    let capture = (diagnostics || config.diagnostics.enabled)
        .then(|| DiagnosticsCapture::new(config.diagnostics.capacity));
    coordinator.attach_diagnostics(capture.clone());

    let result = coordinator.execute(command).await;
    if let Err(e) = coordinator.disconnect().await {
        tracing::warn!("Disconnect failed: {}", e);
    }

    match result? {
        Response::Done => println!("ok"),
        Response::Cancelled => println!("cancelled"),
        Response::Positions(readings) => {
            for r in readings {
                println!("{:<8} raw {:>6}  {:.1} deg", r.motor.as_str(), r.raw, r.angle);
            }
        }
        Response::Features(features) => println!("{}", serde_json::to_string_pretty(&features)?),
    }
    if let Some(capture) = capture {
        println!("{}", capture.to_json()?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bedlink=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Cmd::Identify { name, services } => {
            if name.is_none() && services.is_empty() {
                bail!("give --name and/or --service");
            }
            println!("{}", identify(&services, name.as_deref()));
        }
        Cmd::Encode {
            protocol,
            side,
            command,
        } => encode(protocol, &side, &command)?,
        Cmd::Protocols => list_protocols(),
        #[cfg(feature = "bluez")]
        Cmd::Run {
            address,
            command,
            protocol,
            diagnostics,
        } => run(address, command, protocol, diagnostics).await?,
    }
    Ok(())
}
