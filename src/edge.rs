//! Stability-filtered edge detection.
//!
//! Each watched pin gets a sampler thread that reads the line every sample
//! interval and feeds a [`Debouncer`]. A transition is only reported once the
//! new level has held for the whole debounce window, so reports arrive at the
//! end of the window rather than at the first transition, and a train of
//! pulses narrower than the window reports nothing at all.

use log::{debug, error, warn};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::backend::GpioBackend;
use crate::config::{Edge, Level};
use crate::error::{Error, Result};
use crate::session::DeviceSession;

/// Invoked with the channel, in the active numbering, on every reported edge.
pub type EdgeCallback = Arc<dyn Fn(u32) + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
pub struct EdgeEvent {
    pub channel: u32,
    pub edge: Edge,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    edge: Edge,
    window: Duration,
    stable: Option<Level>,
    candidate: Option<Instant>,
}

impl Debouncer {
    pub fn new(edge: Edge, window: Duration) -> Self {
        Self {
            edge,
            window,
            stable: None,
            candidate: None,
        }
    }

    pub fn stable(&self) -> Option<Level> {
        self.stable
    }

    /// Feeds one sample taken at `now`. Returns the transition kind when a
    /// matching edge completes its stability window on this sample.
    pub fn sample(&mut self, level: Level, now: Instant) -> Option<Edge> {
        let Some(stable) = self.stable else {
            self.stable = Some(level);
            return None;
        };
        if level == stable {
            self.candidate = None;
            return None;
        }

        let since = *self.candidate.get_or_insert(now);
        if now.saturating_duration_since(since) < self.window {
            return None;
        }
        self.stable = Some(level);
        self.candidate = None;

        let observed = match level {
            Level::High => Edge::Rising,
            Level::Low => Edge::Falling,
        };
        self.edge.matches(observed).then_some(observed)
    }
}

#[derive(Default)]
struct WatchState {
    callbacks: Vec<EdgeCallback>,
    latch: bool,
    generation: u64,
    waiters: usize,
    removed: bool,
}

struct WatchShared {
    state: Mutex<WatchState>,
    reported: Condvar,
}

impl WatchShared {
    fn report(&self, channel: u32, edge: Edge, events: &broadcast::Sender<EdgeEvent>) {
        let callbacks = {
            let mut state = self.state.lock();
            state.latch = true;
            state.generation += 1;
            state.callbacks.clone()
        };
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(channel))).is_err() {
                error!("edge callback for channel {channel} panicked");
            }
        }
        self.reported.notify_all();
        let _ = events.send(EdgeEvent {
            channel,
            edge,
            timestamp_ms: epoch_millis(),
        });
    }
}

struct Sampler {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            // removal from inside a callback runs on the sampler itself
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

struct Watch {
    edge: Edge,
    bouncetime: Option<u32>,
    temporary: bool,
    shared: Arc<WatchShared>,
    _sampler: Sampler,
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.shared.state.lock().removed = true;
        self.shared.reported.notify_all();
    }
}

pub struct EdgeEngine<B: GpioBackend> {
    session: Arc<DeviceSession<B>>,
    sample_interval: Duration,
    watches: Mutex<FxHashMap<u32, Watch>>, // keyed by logical pin
    events: broadcast::Sender<EdgeEvent>,
}

impl<B: GpioBackend + 'static> EdgeEngine<B> {
    pub fn new(
        session: Arc<DeviceSession<B>>,
        sample_interval: Duration,
        broadcast_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            session,
            sample_interval,
            watches: Mutex::new(FxHashMap::default()),
            events,
        }
    }

    fn spawn_watch(
        &self,
        pin: u32,
        channel: u32,
        edge: Edge,
        bouncetime: Option<u32>,
        temporary: bool,
        callbacks: Vec<EdgeCallback>,
    ) -> Watch {
        let shared = Arc::new(WatchShared {
            state: Mutex::new(WatchState {
                callbacks,
                ..WatchState::default()
            }),
            reported: Condvar::new(),
        });
        let cancel = Arc::new(AtomicBool::new(false));
        let window = Duration::from_millis(bouncetime.unwrap_or(0).into());

        let handle = {
            let shared = shared.clone();
            let cancel = cancel.clone();
            let session = self.session.clone();
            let events = self.events.clone();
            let interval = self.sample_interval;
            std::thread::spawn(move || {
                let mut debouncer = Debouncer::new(edge, window);
                let mut failing = false;
                while !cancel.load(Ordering::Relaxed) {
                    match session.read(pin) {
                        Ok(level) => {
                            failing = false;
                            if let Some(observed) = debouncer.sample(level, Instant::now()) {
                                shared.report(channel, observed, &events);
                            }
                        }
                        Err(e) => {
                            if !failing {
                                warn!("edge sampling error for pin {pin}: {e}");
                            }
                            failing = true;
                        }
                    }
                    std::thread::sleep(interval);
                }
            })
        };

        debug!("armed {edge:?} watch on pin {pin} (bouncetime {bouncetime:?})");
        Watch {
            edge,
            bouncetime,
            temporary,
            shared,
            _sampler: Sampler {
                cancel,
                handle: Some(handle),
            },
        }
    }

    pub fn add(
        &self,
        pin: u32,
        channel: u32,
        edge: Edge,
        bouncetime: Option<u32>,
        callback: Option<EdgeCallback>,
    ) -> Result<()> {
        let mut watches = self.watches.lock();
        if watches.contains_key(&pin) {
            return Err(Error::ConflictingEdge);
        }
        let callbacks = callback.into_iter().collect();
        let watch = self.spawn_watch(pin, channel, edge, bouncetime, false, callbacks);
        watches.insert(pin, watch);
        Ok(())
    }

    pub fn add_callback(&self, pin: u32, callback: EdgeCallback) -> Result<()> {
        let watches = self.watches.lock();
        let watch = watches.get(&pin).ok_or(Error::NoEventDetect)?;
        watch.shared.state.lock().callbacks.push(callback);
        Ok(())
    }

    /// Returns and clears the latch.
    pub fn event_detected(&self, pin: u32) -> bool {
        self.watches
            .lock()
            .get(&pin)
            .is_some_and(|w| std::mem::take(&mut w.shared.state.lock().latch))
    }

    pub fn remove(&self, pin: u32) {
        let watch = self.watches.lock().remove(&pin);
        if let Some(watch) = watch {
            drop(watch);
            debug!("removed watch on pin {pin}");
        }
    }

    pub fn remove_all(&self) {
        let watches: Vec<Watch> = self.watches.lock().drain().map(|(_, w)| w).collect();
        drop(watches);
    }

    /// Blocks until the next reported edge, returning `Some(channel)`, or
    /// `None` once `timeout` elapses or the watch is removed.
    pub fn wait(
        &self,
        pin: u32,
        channel: u32,
        edge: Edge,
        bouncetime: Option<u32>,
        timeout: Option<Duration>,
    ) -> Result<Option<u32>> {
        let shared = {
            let mut watches = self.watches.lock();
            match watches.get(&pin) {
                // a watch carrying callbacks is never shared with waiters
                Some(w)
                    if w.edge == edge
                        && w.bouncetime == bouncetime
                        && w.shared.state.lock().callbacks.is_empty() =>
                {
                    w.shared.clone()
                }
                Some(_) => return Err(Error::ConflictingEdge),
                None => {
                    let watch =
                        self.spawn_watch(pin, channel, edge, bouncetime, true, Vec::new());
                    let shared = watch.shared.clone();
                    watches.insert(pin, watch);
                    shared
                }
            }
        };

        let deadline = timeout.map(|t| Instant::now() + t);
        let reported = {
            let mut state = shared.state.lock();
            state.waiters += 1;
            let generation = state.generation;
            let reported = loop {
                if state.generation != generation {
                    break true;
                }
                if state.removed {
                    break false;
                }
                match deadline {
                    Some(deadline) => {
                        if shared.reported.wait_until(&mut state, deadline).timed_out() {
                            break state.generation != generation;
                        }
                    }
                    None => shared.reported.wait(&mut state),
                }
            };
            state.waiters -= 1;
            reported
        };

        self.drop_if_unused(pin, &shared);
        Ok(reported.then_some(channel))
    }

    fn drop_if_unused(&self, pin: u32, shared: &Arc<WatchShared>) {
        let mut watches = self.watches.lock();
        let unused = watches.get(&pin).is_some_and(|w| {
            w.temporary && Arc::ptr_eq(&w.shared, shared) && w.shared.state.lock().waiters == 0
        });
        let watch = if unused { watches.remove(&pin) } else { None };
        drop(watches);
        drop(watch);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EdgeEvent> {
        self.events.subscribe()
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
