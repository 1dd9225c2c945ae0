use crate::directional::{contact_angle, ContactPhase, DirectionalMapper};
use crate::driver::ActuatorDriver;
use crate::grid::ActuatorGrid;
use crate::pattern::{impact_response, tension_pattern, IdleMapper, Pattern, SwayMapper};
use crate::schedule::{PatternId, PatternScheduler};
use crate::zones::HapticZoneMap;
use glam::Vec3;
use limbsense_chain::{ChainSnapshot, CollisionEvent};
use limbsense_config::HapticsConfig;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// Hold time for the all-zero grid sent when patterns are cut short.
const STOP_DURATION_MS: u32 = 100;

/// Turns chain state, tension and collisions into actuator grids.
///
/// Driven once per fixed step by [`tick`](HapticEngine::tick) with the
/// current simulation time. Multi-step patterns are queued in a
/// [`PatternScheduler`] and released by later ticks, so nothing here blocks.
pub struct HapticEngine<D: ActuatorDriver> {
    config: HapticsConfig,
    zones: HapticZoneMap,
    driver: D,
    scheduler: PatternScheduler,
    enabled: bool,
    tension: f32,
    collisions: Option<mpsc::UnboundedReceiver<CollisionEvent>>,
    sway: SwayMapper,
    idle: IdleMapper,
    directional: DirectionalMapper,
    dispatched: u64,
}

impl<D: ActuatorDriver> HapticEngine<D> {
    pub fn new(config: HapticsConfig, driver: D) -> Self {
        Self {
            enabled: config.enabled,
            zones: HapticZoneMap::new(),
            scheduler: PatternScheduler::new(),
            tension: 0.0,
            collisions: None,
            sway: SwayMapper::new(config.sway.clone()),
            idle: IdleMapper::new(config.idle.clone()),
            directional: DirectionalMapper::new(config.directional.clone()),
            dispatched: 0,
            config,
            driver,
        }
    }

    /// Consume collision events from `rx` on every tick.
    pub fn attach_collisions(&mut self, rx: mpsc::UnboundedReceiver<CollisionEvent>) {
        self.collisions = Some(rx);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turning off cancels everything pending, stops the driver and sends one
    /// all-zero grid. Turning on resumes mapping from the next tick.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if enabled {
            self.sway.reset();
            self.idle.reset();
            self.directional.reset();
            info!("Haptics enabled");
        } else {
            self.stop_all();
            info!("Haptics disabled");
        }
    }

    /// Clamped to `[0, 1]`; non-finite input counts as zero.
    pub fn set_tension(&mut self, tension: f32) {
        self.tension = if tension.is_finite() {
            tension.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    pub fn tension(&self) -> f32 {
        self.tension
    }

    pub fn zones(&self) -> &HapticZoneMap {
        &self.zones
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Reverberation steps still waiting.
    pub fn pending_steps(&self) -> usize {
        self.scheduler.len()
    }

    /// Total grids sent to the driver.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// One fixed step: collisions first, then due reverberation steps, then
    /// the continuous mappings.
    pub fn tick(&mut self, now_ms: u64, snapshot: &ChainSnapshot) {
        let mut events = Vec::new();
        if let Some(rx) = self.collisions.as_mut() {
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
        }
        if !self.enabled {
            if !events.is_empty() {
                trace!(dropped = events.len(), "Collisions ignored while disabled");
            }
            return;
        }
        for event in &events {
            self.handle_collision(event, snapshot.root_position, now_ms);
        }

        for (id, step) in self.scheduler.drain_due(now_ms) {
            trace!(pattern = id.0, "Reverberation step");
            self.dispatch(&step);
        }

        let yaw_velocity_deg = snapshot.base_angular_velocity.y.to_degrees();
        if let Some(pattern) = self.sway.evaluate(yaw_velocity_deg, now_ms, &self.zones) {
            self.dispatch(&pattern);
        }

        if let Some(pattern) = tension_pattern(&self.config.tension, self.tension, &self.zones) {
            self.dispatch(&pattern);
        }

        if let Some(pattern) = self.idle.evaluate(now_ms, &self.zones) {
            self.dispatch(&pattern);
        }
    }

    /// React to a collision right away. Returns the id of any reverberation
    /// scheduled for it.
    pub fn handle_collision(
        &mut self,
        event: &CollisionEvent,
        root_position: Vec3,
        now_ms: u64,
    ) -> Option<PatternId> {
        if !self.enabled || !self.config.impact.enabled {
            return None;
        }
        let response = impact_response(
            &self.config.impact,
            event.impact_force,
            event.contact_point,
            root_position,
            &self.zones,
        )?;

        debug!(
            segment = %event.source_segment,
            force = event.impact_force,
            near_root = response.near_root,
            "Impact"
        );
        self.dispatch(&response.immediate);

        if response.reverberation.is_empty() {
            return None;
        }
        let id = self.scheduler.allocate_id();
        for step in response.reverberation {
            self.scheduler
                .schedule(id, now_ms + step.delay_ms, step.pattern);
        }
        Some(id)
    }

    /// Light the torso columns facing a contact around the body.
    ///
    /// Entry point for hosts that track a torso collider; the reference
    /// solver has none, so the binary only reaches this through
    /// [`handle_directional_angle`](Self::handle_directional_angle).
    pub fn handle_directional_contact(
        &mut self,
        body_position: Vec3,
        body_forward: Vec3,
        contact_point: Vec3,
        phase: ContactPhase,
        now_ms: u64,
    ) -> bool {
        let angle = contact_angle(body_position, body_forward, contact_point);
        self.handle_directional_angle(angle, phase, now_ms)
    }

    /// Same as [`handle_directional_contact`](Self::handle_directional_contact)
    /// with the horizontal angle already known, degrees from forward.
    pub fn handle_directional_angle(&mut self, angle_deg: f32, phase: ContactPhase, now_ms: u64) -> bool {
        if !self.enabled {
            return false;
        }
        match self.directional.evaluate(angle_deg, phase, now_ms) {
            Some(pattern) => {
                self.dispatch(&pattern);
                true
            }
            None => false,
        }
    }

    /// Drop the remaining steps of one sequence. Sends an all-zero grid if
    /// anything was still pending, leaving other sequences alone.
    pub fn cancel_pattern(&mut self, id: PatternId) -> usize {
        let removed = self.scheduler.cancel(id);
        if removed > 0 {
            self.dispatch(&Pattern::new(ActuatorGrid::ZERO, STOP_DURATION_MS));
        }
        removed
    }

    /// Cancel all pending steps and silence the driver.
    pub fn stop_all(&mut self) {
        let removed = self.scheduler.cancel_all();
        self.driver.stop_all();
        self.dispatch(&Pattern::new(ActuatorGrid::ZERO, STOP_DURATION_MS));
        debug!(removed, "All haptics stopped");
    }

    fn dispatch(&mut self, pattern: &Pattern) {
        self.dispatched += 1;
        self.driver.play_motors(&pattern.grid, pattern.duration_ms);
    }
}
