pub mod conditioning;
pub mod store;
pub mod types;
pub mod wire;

pub use store::SampleStore;
pub use types::{AxisConvention, InertialSample};

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use conditioning::SampleConditioner;
use glam::Vec3;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Commands sent to the ingestion task.
enum IngestCommand {
    SetZero,
    ClearZero,
    Recalibrate(u32),
}

/// Ingestion options, usually filled from the `ingest` config section.
#[derive(Debug, Clone)]
pub struct ListenerOptions {
    pub bind_addr: SocketAddr,
    pub axes: AxisConvention,
    pub calibration_samples: u32,
}

/// Receives sensor packets from the phone and keeps a [`SampleStore`] current.
///
/// An HTTP endpoint accepts JSON posts, parses them, and hands samples to a
/// conditioning task that publishes into the store. Neither task ever waits on
/// the simulation; the simulation only ever reads the store.
pub struct ImuListener {
    local_addr: Option<SocketAddr>,
    command_tx: mpsc::UnboundedSender<IngestCommand>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

struct IngestState {
    axes: AxisConvention,
    packet_tx: mpsc::UnboundedSender<InertialSample>,
    received: AtomicU64,
}

impl ImuListener {
    /// Bind the HTTP listener and start ingesting into `store`.
    pub async fn bind(options: ListenerOptions, store: Arc<SampleStore>) -> Result<Self> {
        let listener = TcpListener::bind(options.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "IMU listener bound, phone should POST sensor JSON here");

        let (packet_tx, packet_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let state = Arc::new(IngestState {
            axes: options.axes,
            packet_tx,
            received: AtomicU64::new(0),
        });
        let app = Router::new().route("/", post(ingest)).with_state(state);

        let mut server_shutdown = shutdown_rx.clone();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    // Fires on shutdown or when the handle is gone.
                    let _ = server_shutdown.changed().await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(?e, "IMU listener failed");
            }
            tracing::info!("IMU listener stopped");
        });

        let pump = tokio::spawn(sample_pump(
            packet_rx,
            command_rx,
            shutdown_rx,
            store,
            SampleConditioner::new(options.calibration_samples),
        ));

        Ok(Self {
            local_addr: Some(local_addr),
            command_tx,
            shutdown_tx,
            tasks: vec![server, pump],
        })
    }

    /// Publish a synthetic swinging motion for development without a phone.
    pub fn simulated(store: Arc<SampleStore>, amplitude: f32, rate_hz: f32) -> Self {
        let (packet_tx, packet_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let period = Duration::from_secs_f32(1.0 / rate_hz.max(1.0));
        let mut generator_shutdown = shutdown_rx.clone();
        let generator = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut t = 0.0_f32;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        t += period.as_secs_f32();
                        let accel = Vec3::new(
                            (t * 0.9).sin() * amplitude,
                            0.0,
                            (t * 0.4).sin() * amplitude,
                        );
                        let gyro = Vec3::new(0.0, (t * 0.9).cos() * amplitude, 0.0);
                        let sample = InertialSample::new(accel, gyro, (t * 1000.0) as u64);
                        if packet_tx.send(sample).is_err() {
                            break;
                        }
                    }
                    _ = generator_shutdown.changed() => break,
                }
            }
        });

        let pump = tokio::spawn(sample_pump(
            packet_rx,
            command_rx,
            shutdown_rx,
            store,
            SampleConditioner::new(0),
        ));

        tracing::info!(amplitude, rate_hz, "Simulated IMU source started");

        Self {
            local_addr: None,
            command_tx,
            shutdown_tx,
            tasks: vec![generator, pump],
        }
    }

    /// Bound address (`None` for the simulated source).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Treat the current acceleration as neutral.
    pub fn set_zero(&self) {
        let _ = self.command_tx.send(IngestCommand::SetZero);
    }

    /// Remove the acceleration zero reference.
    pub fn clear_zero(&self) {
        let _ = self.command_tx.send(IngestCommand::ClearZero);
    }

    /// Restart gyro bias calibration.
    pub fn recalibrate(&self, samples: u32) {
        let _ = self.command_tx.send(IngestCommand::Recalibrate(samples));
    }

    /// Stop accepting packets and wait for the background tasks to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                tracing::warn!(?e, "IMU task ended abnormally");
            }
        }
    }
}

impl Drop for ImuListener {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn ingest(State(state): State<Arc<IngestState>>, body: Bytes) -> StatusCode {
    match wire::parse_packet(&body, state.axes) {
        Ok(sample) => {
            let _ = state.packet_tx.send(sample);
            let received = state.received.fetch_add(1, Ordering::Relaxed) + 1;
            if received % 1000 == 0 {
                tracing::debug!(received, "Sensor packets received");
            }
            StatusCode::OK
        }
        Err(e) => {
            tracing::warn!(?e, "Rejected sensor packet");
            StatusCode::BAD_REQUEST
        }
    }
}

/// Background task: condition incoming samples and publish them.
async fn sample_pump(
    mut packet_rx: mpsc::UnboundedReceiver<InertialSample>,
    mut command_rx: mpsc::UnboundedReceiver<IngestCommand>,
    mut shutdown_rx: watch::Receiver<bool>,
    store: Arc<SampleStore>,
    mut conditioner: SampleConditioner,
) {
    let mut sample_count: u64 = 0;

    loop {
        tokio::select! {
            Some(sample) = packet_rx.recv() => {
                store.publish(conditioner.apply(sample));
                sample_count += 1;
                if sample_count % 1000 == 0 {
                    tracing::debug!(sample_count, "IMU samples published");
                }
            }
            Some(cmd) = command_rx.recv() => {
                match cmd {
                    IngestCommand::SetZero => conditioner.set_zero(),
                    IngestCommand::ClearZero => conditioner.clear_zero(),
                    IngestCommand::Recalibrate(n) => conditioner.recalibrate(n),
                }
            }
            _ = shutdown_rx.changed() => break,
            else => break,
        }
    }

    tracing::debug!(sample_count, "IMU sample pump exiting");
}
