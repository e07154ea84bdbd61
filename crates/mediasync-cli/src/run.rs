//! Running a scenario against the simulated collaborators.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use mediasync_core::sim::{DeviceStats, ManualHost, SimDevice, SimTimingObject, VirtualClock};
use mediasync_core::{
    start_synchronization, Host, Mode, SupportedRates, SyncEvent, SyncOptions, TimingObject, UpdateStrategy,
};

use crate::config::Scenario;

/// Events seen during a run, by kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub play_rejected: u32,
    pub mode_changes: u32,
    pub resynchronized: u32,
    pub ticks_skipped: u32,
}

impl EventCounts {
    fn record(&mut self, event: &SyncEvent) {
        match event {
            SyncEvent::PlayRejected { device, error } => {
                self.play_rejected += 1;
                log::info!("{}: {}", device, error);
            }
            SyncEvent::ModeChanged { from, to } => {
                self.mode_changes += 1;
                log::info!("Mode {} -> {}", from, to);
            }
            SyncEvent::Resynchronized {
                position,
                velocity,
                delay,
            } => {
                self.resynchronized += 1;
                log::debug!("Resynchronized to {:.3} at {} (delay {:.3})", position, velocity, delay);
            }
            SyncEvent::TickSkipped => self.ticks_skipped += 1,
        }
    }
}

/// Outcome of a simulated run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub strategy: UpdateStrategy,
    pub rates: SupportedRates,
    pub simulated: Duration,
    pub ticks: u64,
    pub writes: DeviceStats,
    pub events: EventCounts,
    pub final_mode: Option<Mode>,
    pub device_position: f64,
    pub timing_position: f64,
}

impl RunSummary {
    /// Distance between the device and the timing object at the end.
    pub fn drift(&self) -> f64 {
        (self.device_position - self.timing_position).abs()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Simulated {:.2}s with {} strategy, rates [{}, {}]",
            self.simulated.as_secs_f64(),
            self.strategy,
            self.rates.min,
            self.rates.max
        )?;
        writeln!(f, "  ticks:            {}", self.ticks)?;
        writeln!(
            f,
            "  writes:           {} position, {} rate, {} play ({} rejected), {} pause",
            self.writes.position_writes,
            self.writes.rate_writes,
            self.writes.play_calls,
            self.writes.rejected_plays,
            self.writes.pause_calls
        )?;
        writeln!(
            f,
            "  events:           {} mode changes, {} resyncs, {} rejected plays, {} skipped ticks",
            self.events.mode_changes, self.events.resynchronized, self.events.play_rejected, self.events.ticks_skipped
        )?;
        match self.final_mode {
            Some(mode) => writeln!(f, "  final mode:       {}", mode)?,
            None => writeln!(f, "  final mode:       disposed")?,
        }
        write!(
            f,
            "  final drift:      {:.4}s (device {:.3}, timing object {:.3})",
            self.drift(),
            self.device_position,
            self.timing_position
        )
    }
}

/// Simulate `scenario` from start to end.
pub fn run_scenario(scenario: &Scenario) -> Result<RunSummary> {
    scenario.validate().context("Invalid scenario")?;

    let clock = VirtualClock::new();
    let device = SimDevice::new(&clock, scenario.device.duration);
    device.configure(|m| {
        m.position = scenario.device.position;
        m.quirks = scenario.device.quirks();
    });

    let rates = if scenario.session.detect_rates {
        let mut probe = SimDevice::new(&clock, scenario.device.duration);
        probe.configure(|m| m.quirks = scenario.device.quirks());
        SupportedRates::detect(&mut probe)
    } else {
        scenario.rates()
    };

    let timing = SimTimingObject::new(&clock);
    timing.set_anchor(scenario.timing.initial_vector(clock.now()));

    let host = ManualHost::new(&clock);
    host.set_visible(scenario.host.visible_at(0.0));

    let (tx, rx) = crossbeam_channel::unbounded();
    let options = SyncOptions::new()
        .strategy(scenario.session.strategy)
        .rates(rates)
        .events(tx);

    log::info!(
        "Running {} scenario for {:.2}s",
        scenario.session.strategy,
        scenario.session.duration_secs
    );
    let mut disposer = start_synchronization(device.clone(), timing.clone(), host.clone(), options)
        .context("Failed to start synchronization")?;

    let mut events = EventCounts::default();
    let total = Duration::from_secs_f64(scenario.session.duration_secs);
    let frame = scenario.host.frame();
    let changes = scenario.timing.sorted_changes();
    let mut next_change = 0;
    let mut elapsed = Duration::ZERO;

    drain(&rx, &mut events);
    while elapsed < total {
        let now = elapsed.as_secs_f64();
        while let Some(change) = changes.get(next_change).filter(|change| change.at_secs <= now) {
            log::info!("Timing change at {:.2}s: {:?}", now, change);
            timing.update(change.position, change.velocity, change.acceleration);
            next_change += 1;
        }

        let visible = scenario.host.visible_at(now);
        if visible != host.is_visible() {
            log::info!("Host {} at {:.2}s", if visible { "shown" } else { "hidden" }, now);
            host.set_visible(visible);
        }

        let step = frame.min(total - elapsed);
        host.advance(step);
        host.fire_repaint();
        elapsed += step;
        drain(&rx, &mut events);
    }

    let summary = RunSummary {
        strategy: scenario.session.strategy,
        rates,
        simulated: elapsed,
        ticks: disposer.ticks(),
        writes: device.stats(),
        events,
        final_mode: disposer.mode(),
        device_position: device.model().position,
        timing_position: timing.query().position,
    };
    disposer.dispose();
    Ok(summary)
}

fn drain(rx: &Receiver<SyncEvent>, counts: &mut EventCounts) {
    for event in rx.try_iter() {
        counts.record(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingChange;

    fn scenario(strategy: UpdateStrategy) -> Scenario {
        let mut scenario = Scenario::default();
        scenario.session.strategy = strategy;
        scenario.session.duration_secs = 3.0;
        scenario
    }

    #[test]
    fn test_default_run_stays_locked() {
        for strategy in [UpdateStrategy::Gradual, UpdateStrategy::Stepwise] {
            let summary = run_scenario(&scenario(strategy)).unwrap();
            assert!(summary.drift() < 0.025, "{}: drift {}", strategy, summary.drift());
            assert_eq!(summary.final_mode, Some(Mode::ActivePolling));
            assert_eq!(summary.writes.position_writes, 1);
            assert_eq!(summary.writes.play_calls, 1);
            assert!(summary.ticks > 100);
        }
    }

    #[test]
    fn test_rejected_plays_are_counted() {
        let mut scenario = scenario(UpdateStrategy::Gradual);
        scenario.device.rejected_plays = 2;
        let summary = run_scenario(&scenario).unwrap();
        assert_eq!(summary.events.play_rejected, 2);
        assert_eq!(summary.writes.rejected_plays, 2);
        assert_eq!(summary.writes.play_calls, 3);
    }

    #[test]
    fn test_scripted_stop_goes_idle() {
        let mut scenario = scenario(UpdateStrategy::Stepwise);
        scenario.timing.changes.push(TimingChange {
            at_secs: 1.0,
            velocity: Some(0.0),
            ..TimingChange::default()
        });
        let summary = run_scenario(&scenario).unwrap();
        assert_eq!(summary.final_mode, Some(Mode::IdleReactive));
        assert_eq!(summary.events.mode_changes, 1);
        assert!(summary.drift() < 1e-9);
    }

    #[test]
    fn test_detected_rates_follow_device() {
        let mut scenario = scenario(UpdateStrategy::Gradual);
        scenario.session.detect_rates = true;
        scenario.device.max_rate = 2.0;
        let summary = run_scenario(&scenario).unwrap();
        assert_eq!(summary.rates.max, 2.0);
        assert_eq!(summary.rates.min, 0.0625);
    }

    #[test]
    fn test_huge_duration_is_an_error() {
        let mut scenario = scenario(UpdateStrategy::Gradual);
        scenario.session.duration_secs = 1e30;
        assert!(run_scenario(&scenario).is_err());
    }

    #[test]
    fn test_summary_mentions_drift() {
        let summary = run_scenario(&scenario(UpdateStrategy::Gradual)).unwrap();
        let text = summary.to_string();
        assert!(text.contains("gradual strategy"));
        assert!(text.contains("final drift"));
    }
}
