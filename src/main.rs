use anyhow::{Context, Result};
use clap::Parser;
use limbsense_chain::{Chain, ChainController, CollisionBus, ConstraintSolver, SimpleSolver};
use limbsense_config::AppConfig;
use limbsense_haptics::{ConfiguredDriver, ContactPhase, HapticEngine, PhoneVibrator};
use limbsense_imu::{AxisConvention, ImuListener, ListenerOptions, SampleStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "limbsense",
    about = "Drive a simulated limb from a phone IMU and feel it on a haptic vest"
)]
struct Args {
    /// Config file (defaults to the platform config dir).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use a synthetic IMU source instead of listening for a phone.
    #[arg(long, default_value_t = false)]
    simulate: bool,
}

/// Commands typed on stdin while running.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ConsoleCommand {
    Haptics(bool),
    Tension(f32),
    /// Touch the torso at this angle from forward, degrees.
    Poke(f32),
    SetZero,
    ClearZero,
    Recalibrate(u32),
    Reset,
    Quit,
}

fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let mut words = line.split_whitespace();
    let cmd = match words.next()? {
        "h" | "on" => ConsoleCommand::Haptics(true),
        "j" | "off" => ConsoleCommand::Haptics(false),
        "t" | "tension" => ConsoleCommand::Tension(words.next()?.parse().ok()?),
        "p" | "poke" => ConsoleCommand::Poke(words.next()?.parse().ok()?),
        "z" | "zero" => ConsoleCommand::SetZero,
        "unzero" => ConsoleCommand::ClearZero,
        "cal" => ConsoleCommand::Recalibrate(words.next().and_then(|n| n.parse().ok()).unwrap_or(200)),
        "r" | "reset" => ConsoleCommand::Reset,
        "q" | "quit" => ConsoleCommand::Quit,
        _ => return None,
    };
    Some(cmd)
}

fn spawn_console() -> mpsc::UnboundedReceiver<ConsoleCommand> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_command(&line) {
                Some(cmd) => {
                    if tx.send(cmd).is_err() {
                        break;
                    }
                }
                None => warn!(%line, "Unknown command (h, j, t <0..1>, p <deg>, z, unzero, cal [n], r, q)"),
            }
        }
    });
    rx
}

async fn start_input(config: &AppConfig, simulate: bool, store: Arc<SampleStore>) -> ImuListener {
    let sim = &config.simulation;
    if simulate {
        return ImuListener::simulated(store, sim.simulated_amplitude, sim.simulated_rate_hz);
    }

    let ingest = &config.ingest;
    let bound = async {
        let bind_addr: SocketAddr = ingest
            .bind_addr
            .parse()
            .with_context(|| format!("Invalid bind address {:?}", ingest.bind_addr))?;
        let options = ListenerOptions {
            bind_addr,
            axes: AxisConvention {
                flip_x: ingest.flip_x,
                flip_y: ingest.flip_y,
                flip_z: ingest.flip_z,
            },
            calibration_samples: ingest.calibration_samples,
        };
        ImuListener::bind(options, store.clone()).await
    }
    .await;

    match bound {
        Ok(listener) => listener,
        Err(e) => {
            warn!(?e, "IMU listener not available, using simulated input");
            ImuListener::simulated(store, sim.simulated_amplitude, sim.simulated_rate_hz)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "limbsense=info,limbsense_imu=info,limbsense_chain=info,limbsense_haptics=info"
                    .into()
            }),
        )
        .init();

    let args = Args::parse();
    info!("limbsense starting");

    let config = match &args.config {
        Some(path) => limbsense_config::load_config_from(path)?,
        None => limbsense_config::load_config().unwrap_or_else(|e| {
            warn!(?e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };
    info!(
        segments = config.chain.segments.len(),
        step_s = config.simulation.fixed_step_s,
        "Config loaded"
    );

    let mut chain = Chain::from_config(&config.chain).context("Invalid chain layout")?;
    let mut controller =
        ChainController::new(&config.chain).context("Invalid stiffness curve")?;
    let mut solver = SimpleSolver::new(&chain, config.simulation.floor_height);

    let mut bus = CollisionBus::new();
    bus.add_trace();
    let driver = ConfiguredDriver::from_config(&config.driver)?;
    let mut engine = HapticEngine::new(config.haptics.clone(), driver);
    engine.attach_collisions(bus.subscribe());

    let mut phone = if config.phone.enabled {
        let mut phone = PhoneVibrator::spawn(&config.phone)?;
        phone.attach_collisions(bus.subscribe());
        Some(phone)
    } else {
        None
    };

    let store = Arc::new(SampleStore::new());
    let input = start_input(&config, args.simulate, store.clone()).await;
    let mut console = spawn_console();

    let dt = config.simulation.fixed_step_s.max(0.001);
    let mut ticker = tokio::time::interval(Duration::from_secs_f32(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let heartbeat = (5.0 / dt).round().max(1.0) as u64;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(dt, "Simulation running (h/j toggle haptics, t <value> sets tension, q quits)");
    let mut step: u64 = 0;
    let mut now_ms: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                step += 1;
                now_ms = (step as f64 * dt as f64 * 1000.0) as u64;

                let sample = store.latest();
                let commands = controller.step(&mut chain, &sample, dt);
                solver.integrate(&mut chain, &commands, dt);
                for contact in solver.drain_contacts() {
                    bus.report(&chain, contact.segment, &contact.contact, now_ms);
                }
                engine.tick(now_ms, &chain.snapshot());
                if let Some(phone) = phone.as_mut() {
                    phone.tick(now_ms, solver.touching());
                }

                if step % heartbeat == 0 {
                    let snap = chain.snapshot();
                    debug!(
                        step,
                        accel = ?sample.accel,
                        yaw_rate = snap.base_angular_velocity.y,
                        collisions = bus.published(),
                        dispatched = engine.dispatched(),
                        "Heartbeat"
                    );
                }
            }
            Some(cmd) = console.recv() => {
                match cmd {
                    ConsoleCommand::Haptics(on) => {
                        engine.set_enabled(on);
                        if let Some(phone) = phone.as_mut() {
                            phone.set_enabled(on);
                        }
                    }
                    ConsoleCommand::Tension(t) => {
                        engine.set_tension(t);
                        info!(tension = engine.tension(), "Tension set");
                    }
                    ConsoleCommand::Poke(angle) => {
                        let felt = engine.handle_directional_angle(angle, ContactPhase::Enter, now_ms);
                        info!(angle, felt, "Torso contact");
                    }
                    ConsoleCommand::SetZero => input.set_zero(),
                    ConsoleCommand::ClearZero => input.clear_zero(),
                    ConsoleCommand::Recalibrate(n) => input.recalibrate(n),
                    ConsoleCommand::Reset => {
                        chain.reset_dynamics();
                        solver.reset(&chain);
                        info!("Chain reset to bind pose");
                    }
                    ConsoleCommand::Quit => break,
                }
            }
            _ = &mut shutdown => break,
        }
    }

    info!(step, "Shutting down");
    engine.stop_all();
    input.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_console_commands() {
        assert_eq!(parse_command("h"), Some(ConsoleCommand::Haptics(true)));
        assert_eq!(parse_command("off"), Some(ConsoleCommand::Haptics(false)));
        assert_eq!(parse_command("t 0.4"), Some(ConsoleCommand::Tension(0.4)));
        assert_eq!(parse_command("p -135"), Some(ConsoleCommand::Poke(-135.0)));
        assert_eq!(parse_command("poke"), None);
        assert_eq!(parse_command("cal"), Some(ConsoleCommand::Recalibrate(200)));
        assert_eq!(parse_command("cal 50"), Some(ConsoleCommand::Recalibrate(50)));
        assert_eq!(parse_command("  r  "), Some(ConsoleCommand::Reset));
        assert_eq!(parse_command("t"), None);
        assert_eq!(parse_command("dance"), None);
        assert_eq!(parse_command(""), None);
    }
}
