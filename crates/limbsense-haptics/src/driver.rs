use crate::grid::ActuatorGrid;
use anyhow::{anyhow, Context, Result};
use limbsense_config::DriverConfig;
use serde::Serialize;
use std::net::{SocketAddr, ToSocketAddrs};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Boundary to the hardware. Calls are fire-and-forget: implementations log
/// their own failures and never report back.
pub trait ActuatorDriver {
    fn play_motors(&mut self, grid: &ActuatorGrid, duration_ms: u32);
    fn stop_all(&mut self);
}

/// Prints every dispatch through tracing.
#[derive(Debug, Default)]
pub struct LogDriver {
    plays: u64,
}

impl LogDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActuatorDriver for LogDriver {
    fn play_motors(&mut self, grid: &ActuatorGrid, duration_ms: u32) {
        self.plays += 1;
        debug!(duration_ms, plays = self.plays, "play_motors\n{grid}");
    }

    fn stop_all(&mut self) {
        info!("Actuators stopped");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Play { grid: ActuatorGrid, duration_ms: u32 },
    StopAll,
}

/// Keeps every call in memory, for tests and debug views.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    pub calls: Vec<DriverCall>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grids of every `play_motors` call, in order.
    pub fn plays(&self) -> Vec<(ActuatorGrid, u32)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                DriverCall::Play { grid, duration_ms } => Some((*grid, *duration_ms)),
                DriverCall::StopAll => None,
            })
            .collect()
    }

    pub fn stop_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, DriverCall::StopAll))
            .count()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl ActuatorDriver for RecordingDriver {
    fn play_motors(&mut self, grid: &ActuatorGrid, duration_ms: u32) {
        self.calls.push(DriverCall::Play {
            grid: *grid,
            duration_ms,
        });
    }

    fn stop_all(&mut self) {
        self.calls.push(DriverCall::StopAll);
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Frame {
    Play {
        motors: ActuatorGrid,
        duration_ms: u32,
    },
    Stop {
        stop: bool,
    },
}

/// Sends JSON frames to a bridge process that owns the vest connection.
///
/// Frames are queued to a background task so the simulation never waits on
/// the socket. Must be created inside a tokio runtime.
#[derive(Debug)]
pub struct UdpDriver {
    target: SocketAddr,
    tx: mpsc::UnboundedSender<Frame>,
}

impl UdpDriver {
    pub fn spawn(target: &str) -> Result<Self> {
        let target = target
            .to_socket_addrs()
            .with_context(|| format!("Invalid UDP driver target {target:?}"))?
            .next()
            .ok_or_else(|| anyhow!("UDP driver target {target:?} resolved to nothing"))?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(udp_sender(target, rx));
        info!(%target, "UDP actuator driver started");
        Ok(Self { target, tx })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    fn send(&self, frame: Frame) {
        if self.tx.send(frame).is_err() {
            warn!(target = %self.target, "UDP driver task is gone, frame dropped");
        }
    }
}

impl ActuatorDriver for UdpDriver {
    fn play_motors(&mut self, grid: &ActuatorGrid, duration_ms: u32) {
        self.send(Frame::Play {
            motors: *grid,
            duration_ms,
        });
    }

    fn stop_all(&mut self) {
        self.send(Frame::Stop { stop: true });
    }
}

async fn udp_sender(target: SocketAddr, mut rx: mpsc::UnboundedReceiver<Frame>) {
    let bind: SocketAddr = if target.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    let socket = match UdpSocket::bind(bind).await {
        Ok(s) => s,
        Err(e) => {
            warn!(?e, "Failed to bind UDP driver socket");
            return;
        }
    };

    let mut sent: u64 = 0;
    while let Some(frame) = rx.recv().await {
        let bytes = match serde_json::to_vec(&frame) {
            Ok(b) => b,
            Err(e) => {
                warn!(?e, "Failed to encode actuator frame");
                continue;
            }
        };
        match socket.send_to(&bytes, target).await {
            Ok(_) => sent += 1,
            Err(e) => warn!(?e, %target, "Failed to send actuator frame"),
        }
    }
    debug!(sent, "UDP driver task exiting");
}

/// Driver selected by configuration.
#[derive(Debug)]
pub enum ConfiguredDriver {
    Log(LogDriver),
    Udp(UdpDriver),
}

impl ConfiguredDriver {
    pub fn from_config(config: &DriverConfig) -> Result<Self> {
        Ok(match config {
            DriverConfig::Log => ConfiguredDriver::Log(LogDriver::new()),
            DriverConfig::Udp { target } => ConfiguredDriver::Udp(UdpDriver::spawn(target)?),
        })
    }
}

impl ActuatorDriver for ConfiguredDriver {
    fn play_motors(&mut self, grid: &ActuatorGrid, duration_ms: u32) {
        match self {
            ConfiguredDriver::Log(d) => d.play_motors(grid, duration_ms),
            ConfiguredDriver::Udp(d) => d.play_motors(grid, duration_ms),
        }
    }

    fn stop_all(&mut self) {
        match self {
            ConfiguredDriver::Log(d) => d.stop_all(),
            ConfiguredDriver::Udp(d) => d.stop_all(),
        }
    }
}
