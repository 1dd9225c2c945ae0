use crate::pattern::RateLimiter;
use anyhow::{Context, Result};
use limbsense_chain::CollisionEvent;
use limbsense_config::PhoneConfig;
use reqwest::Url;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VibrationKind {
    Impact,
    Contact,
}

/// Body of one `POST /vibrate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VibrateRequest {
    pub force: f32,
    #[serde(rename = "type")]
    pub kind: VibrationKind,
}

impl VibrateRequest {
    /// Duration (ms) and amplitude (1..=255) the watch app plays for this force.
    pub fn watch_pulse(&self) -> (u64, u8) {
        let duration = (self.force * 200.0).clamp(100.0, 2000.0) as u64;
        let amplitude = (self.force * 50.0).clamp(50.0, 255.0) as u8;
        (duration, amplitude)
    }
}

/// Decides which collisions become phone vibrations. One shared throttle
/// covers impacts and resting contact alike.
#[derive(Debug, Clone)]
pub struct VibrationFilter {
    impact_threshold: f32,
    contact_force: f32,
    limiter: RateLimiter,
}

impl VibrationFilter {
    pub fn new(config: &PhoneConfig) -> Self {
        Self {
            impact_threshold: config.impact_threshold,
            contact_force: config.contact_force,
            limiter: RateLimiter::new(config.throttle_ms),
        }
    }

    /// Soft impacts are dropped without touching the throttle.
    pub fn impact(&mut self, impact_force: f32, now_ms: u64) -> Option<VibrateRequest> {
        if !(impact_force > self.impact_threshold) || !self.limiter.ready(now_ms) {
            return None;
        }
        Some(VibrateRequest {
            force: impact_force,
            kind: VibrationKind::Impact,
        })
    }

    pub fn contact(&mut self, now_ms: u64) -> Option<VibrateRequest> {
        self.limiter.ready(now_ms).then_some(VibrateRequest {
            force: self.contact_force,
            kind: VibrationKind::Contact,
        })
    }

    pub fn reset(&mut self) {
        self.limiter.reset();
    }
}

/// Forwards collisions to a phone's vibration endpoint.
///
/// Requests are handed to a background task and posted without waiting for
/// the reply. Must be created inside a tokio runtime.
#[derive(Debug)]
pub struct PhoneVibrator {
    url: Url,
    filter: VibrationFilter,
    enabled: bool,
    collisions: Option<mpsc::UnboundedReceiver<CollisionEvent>>,
    tx: mpsc::UnboundedSender<VibrateRequest>,
    sent: u64,
}

impl PhoneVibrator {
    pub fn spawn(config: &PhoneConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .with_context(|| format!("Invalid phone vibration URL {:?}", config.url))?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(http_sender(client, url.clone(), rx));
        info!(%url, "Phone vibration sink started");
        Ok(Self {
            url,
            filter: VibrationFilter::new(config),
            enabled: true,
            collisions: None,
            tx,
            sent: 0,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Requests queued so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn attach_collisions(&mut self, rx: mpsc::UnboundedReceiver<CollisionEvent>) {
        self.collisions = Some(rx);
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.filter.reset();
        }
        self.enabled = enabled;
    }

    /// One fixed step. New impacts take precedence; otherwise `touching`
    /// sends the weak resting-contact buzz.
    pub fn tick(&mut self, now_ms: u64, touching: bool) {
        let mut strongest: Option<f32> = None;
        if let Some(rx) = self.collisions.as_mut() {
            while let Ok(event) = rx.try_recv() {
                strongest = Some(strongest.map_or(event.impact_force, |f| f.max(event.impact_force)));
            }
        }
        if !self.enabled {
            return;
        }

        let request = match strongest {
            Some(force) => self.filter.impact(force, now_ms),
            None if touching => self.filter.contact(now_ms),
            None => None,
        };
        if let Some(request) = request {
            self.send(request);
        }
    }

    /// Forward one collision right away, subject to the threshold and throttle.
    pub fn handle_collision(&mut self, event: &CollisionEvent, now_ms: u64) -> bool {
        if !self.enabled {
            return false;
        }
        match self.filter.impact(event.impact_force, now_ms) {
            Some(request) => {
                self.send(request);
                true
            }
            None => false,
        }
    }

    fn send(&mut self, request: VibrateRequest) {
        let (duration_ms, amplitude) = request.watch_pulse();
        trace!(force = request.force, kind = ?request.kind, duration_ms, amplitude, "Vibrate");
        if self.tx.send(request).is_err() {
            warn!(url = %self.url, "Phone sender task is gone, request dropped");
            return;
        }
        self.sent += 1;
    }
}

async fn http_sender(
    client: reqwest::Client,
    url: Url,
    mut rx: mpsc::UnboundedReceiver<VibrateRequest>,
) {
    while let Some(request) = rx.recv().await {
        let pending = client.post(url.clone()).json(&request).send();
        tokio::spawn(async move {
            match pending.await {
                Ok(response) if !response.status().is_success() => {
                    debug!(status = %response.status(), "Phone rejected vibration");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Failed to send vibration"),
            }
        });
    }
    debug!("Phone sender task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use glam::Vec3;
    use limbsense_chain::SegmentId;

    fn hit(force: f32) -> CollisionEvent {
        CollisionEvent {
            impact_force: force,
            contact_point: Vec3::ZERO,
            source_segment: SegmentId(2),
            at_ms: 0,
        }
    }

    #[test]
    fn soft_impacts_do_not_use_up_the_throttle() {
        let mut filter = VibrationFilter::new(&PhoneConfig::default());
        assert_eq!(filter.impact(0.5, 0), None);
        assert_eq!(filter.impact(0.3, 10), None);
        let request = filter.impact(1.5, 20).unwrap();
        assert_eq!(request.kind, VibrationKind::Impact);
        assert_eq!(request.force, 1.5);
    }

    #[test]
    fn impacts_and_contact_share_one_throttle() {
        let mut filter = VibrationFilter::new(&PhoneConfig::default());
        assert!(filter.impact(2.0, 0).is_some());
        assert!(filter.contact(50).is_none());
        assert!(filter.impact(2.0, 99).is_none());
        let contact = filter.contact(100).unwrap();
        assert_eq!(contact.kind, VibrationKind::Contact);
        assert_eq!(contact.force, 0.2);
    }

    #[test]
    fn request_body_matches_endpoint() {
        let body = serde_json::to_value(VibrateRequest {
            force: 0.25,
            kind: VibrationKind::Contact,
        })
        .unwrap();
        assert_eq!(body["type"], "contact");
        assert_eq!(body["force"], 0.25);
    }

    #[test]
    fn watch_pulse_is_clamped() {
        let soft = VibrateRequest {
            force: 0.2,
            kind: VibrationKind::Contact,
        };
        assert_eq!(soft.watch_pulse(), (100, 50));
        let hard = VibrateRequest {
            force: 20.0,
            kind: VibrationKind::Impact,
        };
        assert_eq!(hard.watch_pulse(), (2000, 255));
    }

    #[tokio::test]
    async fn bad_url_is_an_error() {
        let config = PhoneConfig {
            url: "not a url".into(),
            ..PhoneConfig::default()
        };
        assert!(PhoneVibrator::spawn(&config).is_err());
    }

    #[tokio::test]
    async fn impacts_reach_the_phone_endpoint() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<serde_json::Value>();
        let app = Router::new().route(
            "/vibrate",
            post(move |Json(body): Json<serde_json::Value>| {
                let seen_tx = seen_tx.clone();
                async move {
                    let _ = seen_tx.send(body);
                    StatusCode::OK
                }
            }),
        );
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let config = PhoneConfig {
            enabled: true,
            url: format!("http://{addr}/vibrate"),
            ..PhoneConfig::default()
        };
        let mut phone = PhoneVibrator::spawn(&config).unwrap();
        let mut bus = limbsense_chain::CollisionBus::new();
        phone.attach_collisions(bus.subscribe());

        bus.publish(hit(0.4));
        bus.publish(hit(3.0));
        phone.tick(0, false);
        assert_eq!(phone.sent(), 1);

        let body = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body["type"], "impact");
        assert_eq!(body["force"], 3.0);

        // Resting contact after the throttle window.
        phone.tick(50, true);
        assert_eq!(phone.sent(), 1);
        phone.tick(100, true);
        let body = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body["type"], "contact");
    }

    #[tokio::test]
    async fn disabled_phone_drains_events_silently() {
        let config = PhoneConfig {
            enabled: true,
            url: "http://127.0.0.1:9/vibrate".into(),
            ..PhoneConfig::default()
        };
        let mut phone = PhoneVibrator::spawn(&config).unwrap();
        let mut bus = limbsense_chain::CollisionBus::new();
        phone.attach_collisions(bus.subscribe());

        phone.set_enabled(false);
        bus.publish(hit(3.0));
        phone.tick(0, true);
        assert!(!phone.handle_collision(&hit(3.0), 0));

        phone.set_enabled(true);
        phone.tick(200, false);
        assert_eq!(phone.sent(), 0);
        assert!(phone.handle_collision(&hit(3.0), 300));
        assert_eq!(phone.sent(), 1);
    }
}
