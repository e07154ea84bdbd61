//! Tick scheduling for a synchronization session.
//!
//! A session is in one of two modes:
//!
//! - [`Mode::IdleReactive`]: the device is stopped, so nothing drifts. The
//!   session only listens for timing object changes and ticks on each one.
//! - [`Mode::ActivePolling`]: the device is playing. The session ticks every
//!   [`POLL_INTERVAL`] and on every repaint. Each repaint also restarts the
//!   interval, so polling stays in phase with the display. Change events are
//!   only acted on while the host is hidden, since no repaints arrive then.
//!
//! The first tick runs synchronously inside [`start_synchronization`]; its
//! result picks the starting mode. Every later tick decides whether to switch.
//!
//! Trigger callbacks hold only a `Weak` reference to the session. The
//! [`Disposer`] holds the strong one, and disposing cancels every trigger and
//! marks the session dead, so a trigger that was already queued finds nothing
//! to run.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::controller::{SyncController, UpdateHook, VectorHook};
use crate::device::MediaDevice;
use crate::error::{Result, SyncError};
use crate::events::{EventSink, SyncEvent};
use crate::host::{Host, Subscription, SubscriptionSet};
use crate::rates::SupportedRates;
use crate::strategy::{UpdateStrategy, UpdateVector};
use crate::timing_object::TimingObject;
use crate::vector::TimingStateVector;

/// Tick period while the device is playing.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Scheduling mode of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Ticking on timing object changes only.
    IdleReactive,
    /// Ticking on a fixed interval and on every repaint.
    ActivePolling,
}

impl Mode {
    fn for_motion(moving: bool) -> Self {
        if moving {
            Mode::ActivePolling
        } else {
            Mode::IdleReactive
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::IdleReactive => write!(f, "idle"),
            Mode::ActivePolling => write!(f, "polling"),
        }
    }
}

/// Configuration of a synchronization session.
#[derive(Default)]
pub struct SyncOptions {
    strategy: UpdateStrategy,
    rates: SupportedRates,
    prepare_vector: Option<VectorHook>,
    prepare_update: Option<UpdateHook>,
    events: Option<Sender<SyncEvent>>,
}

impl SyncOptions {
    /// Gradual strategy over the default rate range.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the correction strategy.
    pub fn strategy(mut self, strategy: UpdateStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the playback rates the device supports.
    pub fn rates(mut self, rates: SupportedRates) -> Self {
        self.rates = rates;
        self
    }

    /// Transform every queried vector before the strategy sees it.
    pub fn prepare_vector(mut self, hook: impl Fn(TimingStateVector) -> TimingStateVector + 'static) -> Self {
        self.prepare_vector = Some(Box::new(hook));
        self
    }

    /// Transform every strategy target before it is applied.
    pub fn prepare_update(mut self, hook: impl Fn(UpdateVector) -> UpdateVector + 'static) -> Self {
        self.prepare_update = Some(Box::new(hook));
        self
    }

    /// Send session events to `tx`.
    pub fn events(mut self, tx: Sender<SyncEvent>) -> Self {
        self.events = Some(tx);
        self
    }
}

impl std::fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOptions")
            .field("strategy", &self.strategy)
            .field("rates", &self.rates)
            .field("prepare_vector", &self.prepare_vector.is_some())
            .field("prepare_update", &self.prepare_update.is_some())
            .field("events", &self.events.is_some())
            .finish()
    }
}

#[derive(Clone, Copy, Debug)]
enum Trigger {
    Change,
    Timer,
    Repaint,
}

struct Session<D: MediaDevice, T, H> {
    controller: RefCell<SyncController<D>>,
    timing: T,
    host: H,
    events: EventSink,
    mode: Cell<Option<Mode>>,
    subscriptions: RefCell<SubscriptionSet>,
    disposed: Cell<bool>,
    ticks: Cell<u64>,
}

impl<D, T, H> Session<D, T, H>
where
    D: MediaDevice + 'static,
    T: TimingObject + 'static,
    H: Host + 'static,
{
    fn on_trigger(self: &Rc<Self>, trigger: Trigger) {
        if self.disposed.get() {
            return;
        }
        let polling = self.mode.get() == Some(Mode::ActivePolling);
        match trigger {
            Trigger::Change => {
                if polling && self.host.is_visible() {
                    return;
                }
            }
            Trigger::Timer => {
                if !polling {
                    return;
                }
            }
            Trigger::Repaint => {
                if !polling {
                    return;
                }
                self.restart_polling();
            }
        }
        self.run_tick(trigger);
    }

    fn run_tick(self: &Rc<Self>, trigger: Trigger) {
        let result = {
            let Ok(mut controller) = self.controller.try_borrow_mut() else {
                log::trace!("Dropping {:?} trigger during a running tick", trigger);
                return;
            };
            controller.tick(&self.timing)
        };
        self.ticks.set(self.ticks.get() + 1);

        match result {
            Ok(outcome) => self.select_mode(outcome.moving),
            Err(err) => log::warn!("Skipping tick: {}", err),
        }
    }

    fn select_mode(self: &Rc<Self>, moving: bool) {
        if self.disposed.get() {
            return;
        }
        let next = Mode::for_motion(moving);
        let previous = self.mode.get();
        if previous == Some(next) {
            return;
        }

        match previous {
            Some(from) => {
                log::debug!("Switching from {} to {}", from, next);
                self.events.emit(SyncEvent::ModeChanged { from, to: next });
            }
            None => log::debug!("Starting in {} mode", next),
        }
        self.mode.set(Some(next));

        let mut stale = self.subscriptions.take();
        stale.cancel_all();

        let mut fresh = SubscriptionSet {
            change: Some(self.subscribe_change()),
            ..SubscriptionSet::default()
        };
        if next == Mode::ActivePolling {
            fresh.timer = Some(self.start_interval());
            fresh.repaint = Some(self.request_repaint());
        }
        *self.subscriptions.borrow_mut() = fresh;
    }

    fn restart_polling(self: &Rc<Self>) {
        let timer = self.start_interval();
        let repaint = self.request_repaint();
        let (stale_timer, stale_repaint) = {
            let mut subscriptions = self.subscriptions.borrow_mut();
            (subscriptions.timer.replace(timer), subscriptions.repaint.replace(repaint))
        };
        for mut sub in [stale_timer, stale_repaint].into_iter().flatten() {
            sub.cancel();
        }
    }

    fn subscribe_change(self: &Rc<Self>) -> Subscription {
        let weak = Rc::downgrade(self);
        self.timing.subscribe_change(Box::new(move || {
            if let Some(session) = weak.upgrade() {
                session.on_trigger(Trigger::Change);
            }
        }))
    }

    fn start_interval(self: &Rc<Self>) -> Subscription {
        let weak = Rc::downgrade(self);
        self.host.set_interval(
            POLL_INTERVAL,
            Box::new(move || {
                if let Some(session) = weak.upgrade() {
                    session.on_trigger(Trigger::Timer);
                }
            }),
        )
    }

    fn request_repaint(self: &Rc<Self>) -> Subscription {
        let weak: Weak<Self> = Rc::downgrade(self);
        self.host.request_repaint(Box::new(move || {
            if let Some(session) = weak.upgrade() {
                session.on_trigger(Trigger::Repaint);
            }
        }))
    }
}

/// Type-erased view of a running session.
trait SessionControl {
    fn dispose(&self);
    fn is_disposed(&self) -> bool;
    fn mode(&self) -> Option<Mode>;
    fn ticks(&self) -> u64;
}

impl<D, T, H> SessionControl for Session<D, T, H>
where
    D: MediaDevice + 'static,
    T: TimingObject + 'static,
    H: Host + 'static,
{
    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        log::debug!("Disposing synchronization session after {} ticks", self.ticks.get());
        let mut subscriptions = self.subscriptions.take();
        subscriptions.cancel_all();
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn mode(&self) -> Option<Mode> {
        self.mode.get()
    }

    fn ticks(&self) -> u64 {
        self.ticks.get()
    }
}

/// Handle that ends a synchronization session.
///
/// Dropping the handle disposes the session.
#[must_use = "dropping the disposer ends the session"]
pub struct Disposer {
    session: Option<Rc<dyn SessionControl>>,
}

impl Disposer {
    /// Stop the session. No tick runs afterwards, whatever triggers were
    /// pending. Safe to call more than once and from inside a tick.
    pub fn dispose(&mut self) {
        if let Some(session) = self.session.take() {
            session.dispose();
        }
    }

    /// Whether the session has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.session.as_ref().map_or(true, |session| session.is_disposed())
    }

    /// Current scheduling mode, `None` once disposed.
    pub fn mode(&self) -> Option<Mode> {
        self.session
            .as_ref()
            .filter(|session| !session.is_disposed())
            .and_then(|session| session.mode())
    }

    /// Ticks run so far, skipped ones included. 0 once disposed.
    pub fn ticks(&self) -> u64 {
        self.session.as_ref().map_or(0, |session| session.ticks())
    }
}

impl Drop for Disposer {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("mode", &self.mode())
            .field("ticks", &self.ticks())
            .finish()
    }
}

/// Lock `device` to `timing` until the returned [`Disposer`] is disposed.
///
/// Fails when the rate range in `options` is invalid or `host` lacks repaint
/// callbacks or recurring timers. The first tick runs before this returns.
pub fn start_synchronization<D, T, H>(device: D, timing: T, host: H, options: SyncOptions) -> Result<Disposer>
where
    D: MediaDevice + 'static,
    T: TimingObject + 'static,
    H: Host + 'static,
{
    options.rates.validate()?;
    let capabilities = host.capabilities();
    if !capabilities.repaint {
        return Err(SyncError::UnsupportedCapability("repaint callbacks"));
    }
    if !capabilities.interval {
        return Err(SyncError::UnsupportedCapability("recurring timers"));
    }

    let SyncOptions {
        strategy,
        rates,
        prepare_vector,
        prepare_update,
        events,
    } = options;
    let events = events.map(EventSink::new).unwrap_or_default();

    log::debug!("Starting {} synchronization of {}", strategy, device.id());
    let controller = SyncController::new(device, strategy, rates)
        .with_vector_hook(prepare_vector)
        .with_update_hook(prepare_update)
        .with_events(events.clone());

    let session = Rc::new(Session {
        controller: RefCell::new(controller),
        timing,
        host,
        events,
        mode: Cell::new(None),
        subscriptions: RefCell::new(SubscriptionSet::default()),
        disposed: Cell::new(false),
        ticks: Cell::new(0),
    });

    session.run_tick(Trigger::Change);
    if session.mode.get().is_none() {
        // The first tick was skipped; wait for the timing object to change.
        session.select_mode(false);
    }

    Ok(Disposer {
        session: Some(session),
    })
}
