//! TriggerEngineActor - probability and hold triggers over telemetry
//!
//! ## Per variable, per tick
//!
//! ```text
//! value < threshold ──► cancel hold timer, skip
//!        │
//!        ├─ hold configured, value >= hold threshold, no timer ──► arm hold timer
//!        │                                                        (fires with a random
//!        │                                                         hold intensity)
//!        │
//!        └─ outside probability window ──► draw < value³ ──► shock at interpolated
//!                                                           intensity, open window
//! ```
//!
//! Actuations go straight to shockers through [`Dispatcher::trigger_shockers`] and are spawned
//! off the poll loop so a slow remote call never delays the next tick.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, instrument, trace, warn};

use crate::config::{Config, TriggerVariable};
use crate::dispatcher::Dispatcher;
use crate::timers::TimerSet;
use crate::util::duration_from_secs;

use super::messages::{ShockSource, TickReport, TriggerCommand};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Chance that a value fires on one tick
///
/// Cubic, so mid-range noise rarely fires while sustained high values usually do:
/// `0.5 → 12.5%`, `0.7 → 34.3%`, `0.9 → 72.9%`.
pub fn probability(value: f32) -> f64 {
    f64::from(value.clamp(0.0, 1.0)).powi(3)
}

/// One probability draw for `value`
pub fn roll<R: Rng + ?Sized>(rng: &mut R, value: f32) -> bool {
    rng.gen_range(0.0..1.0) < probability(value)
}

/// Linear interpolation between `min` and `max` by `value` in `0.0..=1.0`
pub fn interpolate_intensity(min: i32, max: i32, value: f32) -> i32 {
    let t = f64::from(value.clamp(0.0, 1.0));
    let span = i64::from(max) - i64::from(min);
    let offset = (span as f64 * t).round() as i64;
    // the result lies between min and max, so it always fits
    (i64::from(min) + offset) as i32
}

fn random_in<R: Rng + ?Sized>(rng: &mut R, min: i32, max: i32) -> i32 {
    if min < max {
        rng.gen_range(min..=max)
    } else {
        min
    }
}

fn poll_interval(config: &Config) -> Duration {
    duration_from_secs(config.slide.poll_interval).max(MIN_POLL_INTERVAL)
}

pub struct TriggerEngineActor {
    dispatcher: Dispatcher,
    rng: StdRng,

    /// Pending hold timers, keyed by variable path
    holds: TimerSet<String>,

    /// End of each variable's probability window
    windows: HashMap<String, Instant>,
    command_rx: mpsc::Receiver<TriggerCommand>,
}

impl TriggerEngineActor {
    pub fn new(
        dispatcher: Dispatcher,
        rng: StdRng,
        command_rx: mpsc::Receiver<TriggerCommand>,
    ) -> Self {
        Self {
            dispatcher,
            rng,
            holds: TimerSet::new(),
            windows: HashMap::new(),
            command_rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting trigger engine");

        let mut config_rx = self.dispatcher.state().watch_config();
        let mut period = poll_interval(&config_rx.borrow());
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.evaluate().await;
                    trace!("tick: {report:?}");
                }

                changed = config_rx.changed() => {
                    if changed.is_err() {
                        debug!("config channel closed, shutting down");
                        break;
                    }
                    let updated = poll_interval(&config_rx.borrow_and_update());
                    if updated != period {
                        debug!("poll interval changed to {updated:?}");
                        period = updated;
                        ticker = interval_at(Instant::now() + period, period);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        TriggerCommand::TickNow { respond_to } => {
                            let report = self.evaluate().await;
                            let _ = respond_to.send(report);
                        }

                        TriggerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        let cancelled = self.holds.cancel_all();
        debug!("trigger engine stopped, {} hold timer(s) cancelled", cancelled.len());
    }

    /// Evaluate every enabled variable once
    async fn evaluate(&mut self) -> TickReport {
        let config = self.dispatcher.state().config();
        let mut report = TickReport::default();

        if !config.slide.enabled {
            self.holds.cancel_all();
            return report;
        }

        for variable in config.slide.variables.iter().filter(|v| v.enabled) {
            report.evaluated += 1;
            self.evaluate_variable(&config, variable, &mut report).await;
        }

        report
    }

    async fn evaluate_variable(
        &mut self,
        config: &Config,
        variable: &TriggerVariable,
        report: &mut TickReport,
    ) {
        let key = variable.path.clone();
        let value = self.dispatcher.state().telemetry.value(&variable.path).await;

        if value < variable.threshold {
            if self.holds.cancel(&key) {
                debug!("{} dropped below threshold, hold cancelled", variable.display_name());
            }
            report.below_threshold += 1;
            return;
        }

        if let Some(hold) = &variable.hold {
            if value >= hold.threshold && !self.holds.is_pending(&key) {
                let hold_time = hold.time.unwrap_or(config.shock.hold_time);
                let intensity = random_in(
                    &mut self.rng,
                    config.slide.hold_intensity_min,
                    config.slide.hold_intensity_max,
                );

                let dispatcher = self.dispatcher.clone();
                let shockers = variable.shockers.clone();
                let name = variable.display_name().to_string();
                self.holds.schedule(key.clone(), duration_from_secs(hold_time), async move {
                    info!("hold trigger fired for '{name}' at {intensity}%");
                    let outcome = dispatcher
                        .trigger_shockers(&shockers, intensity, ShockSource::Trigger(name))
                        .await;
                    debug!("hold trigger → {outcome:?}");
                });

                debug!("armed {hold_time}s hold for '{}'", variable.display_name());
                report.holds_armed += 1;
            }
        }

        let now = Instant::now();
        if self.windows.get(&key).is_some_and(|until| *until > now) {
            trace!("'{}' inside its probability window", variable.display_name());
            return;
        }

        if !roll(&mut self.rng, value) {
            return;
        }

        let intensity =
            interpolate_intensity(config.slide.intensity_min, config.slide.intensity_max, value);
        info!(
            "probability trigger for '{}' (value {value:.2}, chance {:.1}%, {intensity}%)",
            variable.display_name(),
            probability(value) * 100.0
        );

        let dispatcher = self.dispatcher.clone();
        let shockers = variable.shockers.clone();
        let source = ShockSource::Trigger(variable.display_name().to_string());
        tokio::spawn(async move {
            let outcome = dispatcher.trigger_shockers(&shockers, intensity, source).await;
            debug!("probability trigger → {outcome:?}");
        });

        self.windows
            .insert(key, now + duration_from_secs(config.slide.probability_cooldown));
        report.probability_hits += 1;
    }
}

/// Handle for controlling a TriggerEngineActor
#[derive(Clone)]
pub struct TriggerHandle {
    sender: mpsc::Sender<TriggerCommand>,
}

impl TriggerHandle {
    pub fn spawn(dispatcher: Dispatcher) -> Self {
        Self::spawn_with_rng(dispatcher, StdRng::from_entropy())
    }

    /// Spawn with a fixed random source, for reproducible draws
    pub fn spawn_with_rng(dispatcher: Dispatcher, rng: StdRng) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let actor = TriggerEngineActor::new(dispatcher, rng, cmd_rx);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Evaluate every variable now, bypassing the poll interval
    pub async fn tick_now(&self) -> Result<TickReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(TriggerCommand::TickNow { respond_to: tx })
            .await
            .context("failed to send TickNow command")?;

        rx.await.context("failed to receive tick report")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(TriggerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
