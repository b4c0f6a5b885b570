//! Packet dispatch and bundle scheduling.
//!
//! A [`Dispatcher`] routes decoded packets to registered listeners. Each
//! registration key is an OSC address pattern; an incoming message is
//! delivered to every listener whose pattern matches the message's literal
//! address. Bundles dispatch their elements in order, either synchronously
//! (immediate or past time tags) or on a dedicated timer worker at the
//! instant their time tag names.

use core::cmp::Reverse;
use core::time::Duration;
use osc_proto::{Bundle, Message, Packet, pattern};
use rustc_hash::{FxBuildHasher, FxHashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A registered message callback.
///
/// Listeners may be invoked from the caller of [`Dispatcher::dispatch`] or
/// from the timer worker, so they must be `Send + Sync`.
pub type Listener = Arc<dyn Fn(&Message) + Send + Sync + 'static>;

/// Priority queue of pending bundle ids, soonest deadline first.
type DeadlineQueue = priority_queue::PriorityQueue<u64, Reverse<Instant>, FxBuildHasher>;

/// Deferred bundles waiting for their deadline.
struct Pending {
    deadlines: DeadlineQueue,
    bundles: FxHashMap<u64, Bundle>,
    next_id: u64,
}

/// State shared between the dispatcher handle and the timer worker.
struct Shared {
    listeners: Mutex<FxHashMap<String, Listener>>,
    pending: Mutex<Pending>,
    timer_wake: Condvar,
    shutdown: AtomicBool,
}

/// Routes OSC packets to registered listeners.
///
/// Registration and dispatch may run concurrently from arbitrary threads;
/// the table is mutex-guarded and dispatch iterates over a snapshot of the
/// matching listeners, so mutation never tears an in-progress fan-out.
///
/// Deferred bundles fire on a single background worker. Firing precision is
/// bounded by the OS timer granularity (typically a millisecond or two);
/// bundles scheduled for the same instant fire in unspecified relative order.
pub struct Dispatcher {
    shared: Arc<Shared>,
    timer: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Creates a dispatcher and starts its timer worker.
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            listeners: Mutex::new(FxHashMap::default()),
            pending: Mutex::new(Pending {
                deadlines: DeadlineQueue::with_hasher(FxBuildHasher),
                bundles: FxHashMap::default(),
                next_id: 0,
            }),
            timer_wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let timer = thread::Builder::new()
            .name("osc-timer".into())
            .spawn(move || timer_loop(&worker_shared))
            .expect("failed to spawn the OSC timer worker");

        Self {
            shared,
            timer: Mutex::new(Some(timer)),
        }
    }

    /// Registers a listener for an address pattern, replacing any previous
    /// listener registered for the same pattern string.
    ///
    /// Pattern syntax is not validated here: a malformed pattern simply
    /// never matches.
    pub fn register(
        &self,
        pattern: impl Into<String>,
        listener: impl Fn(&Message) + Send + Sync + 'static,
    ) {
        self.shared
            .listeners
            .lock()
            .unwrap()
            .insert(pattern.into(), Arc::new(listener));
    }

    /// Removes the listener registered for `pattern`, if any.
    pub fn unregister(&self, pattern: &str) {
        self.shared.listeners.lock().unwrap().remove(pattern);
    }

    /// Routes a packet.
    ///
    /// Messages fan out synchronously to every matching listener before this
    /// returns. Bundles with an immediate or past time tag dispatch their
    /// elements synchronously, in order; bundles with a future time tag are
    /// handed to the timer worker without blocking the caller.
    ///
    /// After [`shutdown`](Self::shutdown), a not-yet-due bundle is ignored
    /// and logged; immediate packets still dispatch synchronously.
    pub fn dispatch(&self, packet: Packet) {
        dispatch_packet(&self.shared, packet);
    }

    /// Stops the timer worker, discarding every pending bundle.
    ///
    /// Idempotent. Blocks until the worker has exited; the worker reacts to
    /// the shutdown flag as soon as it wakes, so the wait is bounded.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);

        {
            let mut pending = self.shared.pending.lock().unwrap();
            pending.deadlines.clear();
            pending.bundles.clear();
        }
        self.shared.timer_wake.notify_all();

        if let Some(timer) = self.timer.lock().unwrap().take() {
            if timer.join().is_err() {
                log::error!("OSC timer worker panicked");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch_packet(shared: &Arc<Shared>, packet: Packet) {
    match packet {
        Packet::Message(msg) => dispatch_message(shared, &msg),
        Packet::Bundle(bundle) => dispatch_bundle(shared, bundle),
    }
}

fn dispatch_message(shared: &Arc<Shared>, msg: &Message) {
    // Snapshot the matching listeners so the table lock is not held while
    // user code runs.
    let matching: Vec<Listener> = {
        let listeners = shared.listeners.lock().unwrap();
        listeners
            .iter()
            .filter(|(registered, _)| pattern::matches(registered, msg.address()))
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    };

    for listener in matching {
        // One panicking listener must not starve the others.
        if catch_unwind(AssertUnwindSafe(|| listener(msg))).is_err() {
            log::error!("listener panicked while handling {}", msg.address());
        }
    }
}

fn dispatch_bundle(shared: &Arc<Shared>, bundle: Bundle) {
    let now_millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64;

    // The immediate sentinel is checked by identity, never via its bit
    // layout as a calendar instant.
    let due = bundle.time_tag.is_immediate() || bundle.time_tag.to_unix_millis() <= now_millis;

    if due {
        for element in bundle.elements {
            dispatch_packet(shared, element);
        }
        return;
    }

    if shared.shutdown.load(Ordering::Acquire) {
        log::warn!("dispatcher is shut down; dropping deferred bundle");
        return;
    }

    let delay = Duration::from_millis(bundle.time_tag.to_unix_millis() - now_millis);
    let deadline = Instant::now() + delay;

    {
        let mut pending = shared.pending.lock().unwrap();
        let id = pending.next_id;
        pending.next_id += 1;
        pending.deadlines.push(id, Reverse(deadline));
        pending.bundles.insert(id, bundle);
    }
    shared.timer_wake.notify_all();
}

/// Timer worker: sleeps until the soonest deadline, then dispatches that
/// bundle's elements in order. Each scheduled bundle fires at most once; it
/// is removed from the pending set before its elements run.
fn timer_loop(shared: &Arc<Shared>) {
    loop {
        let due: Option<Bundle> = {
            let mut pending = shared.pending.lock().unwrap();
            loop {
                if shared.shutdown.load(Ordering::Acquire) {
                    return;
                }

                let soonest = pending
                    .deadlines
                    .peek()
                    .map(|(&id, &Reverse(deadline))| (id, deadline));

                match soonest {
                    None => pending = shared.timer_wake.wait(pending).unwrap(),
                    Some((id, deadline)) => {
                        let now = Instant::now();
                        if deadline <= now {
                            pending.deadlines.pop();
                            break pending.bundles.remove(&id);
                        }
                        let (guard, _) = shared
                            .timer_wake
                            .wait_timeout(pending, deadline - now)
                            .unwrap();
                        pending = guard;
                    }
                }
            }
        };

        if let Some(bundle) = due {
            for element in bundle.elements {
                dispatch_packet(shared, element);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osc_proto::{TimeTag, Value};
    use std::sync::atomic::AtomicUsize;

    fn message(address: &str) -> Packet {
        Message::new(address, vec![Value::Int(1)]).unwrap().into()
    }

    fn unix_millis_now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64
    }

    #[test]
    fn overlapping_patterns_each_fire_once() {
        let dispatcher = Dispatcher::new();
        let star = Arc::new(AtomicUsize::new(0));
        let exact = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&star);
        dispatcher.register("/foo/*", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&exact);
        dispatcher.register("/foo/bar", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(message("/foo/bar"));

        assert_eq!(star.load(Ordering::SeqCst), 1);
        assert_eq!(exact.load(Ordering::SeqCst), 1);
        dispatcher.shutdown();
    }

    #[test]
    fn non_matching_listeners_are_not_invoked() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        dispatcher.register("/other", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(message("/foo/bar"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        dispatcher.shutdown();
    }

    #[test]
    fn unregister_stops_delivery() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        dispatcher.register("/x", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(message("/x"));
        dispatcher.unregister("/x");
        dispatcher.dispatch(message("/x"));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        dispatcher.shutdown();
    }

    #[test]
    fn panicking_listener_does_not_starve_others() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));

        dispatcher.register("/boom/*", |_| panic!("listener failure"));
        let counter = Arc::clone(&hits);
        dispatcher.register("/boom/here", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(message("/boom/here"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        dispatcher.shutdown();
    }

    #[test]
    fn immediate_bundles_dispatch_synchronously_in_order() {
        let dispatcher = Dispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&order);
        dispatcher.register("/seq/*", move |msg| {
            seen.lock().unwrap().push(msg.address().to_owned());
        });

        let bundle = Bundle::new(
            TimeTag::IMMEDIATE,
            vec![
                message("/seq/a"),
                Bundle::new(TimeTag::IMMEDIATE, vec![message("/seq/b")]).into(),
                message("/seq/c"),
            ],
        );
        dispatcher.dispatch(bundle.into());

        // Synchronous: everything is visible before dispatch returned.
        assert_eq!(*order.lock().unwrap(), ["/seq/a", "/seq/b", "/seq/c"]);
        dispatcher.shutdown();
    }

    #[test]
    fn future_bundles_fire_no_earlier_than_their_deadline() {
        let dispatcher = Dispatcher::new();
        let fired = Arc::new(Mutex::new(None::<Instant>));

        let fired_at = Arc::clone(&fired);
        dispatcher.register("/later", move |_| {
            *fired_at.lock().unwrap() = Some(Instant::now());
        });

        let delay_ms = 300u64;
        let scheduled_at = Instant::now();
        let bundle = Bundle::new(
            TimeTag::from_unix_millis(unix_millis_now() + delay_ms),
            vec![message("/later")],
        );
        dispatcher.dispatch(bundle.into());

        // Not dispatched synchronously.
        assert!(fired.lock().unwrap().is_none());

        thread::sleep(Duration::from_millis(delay_ms * 3));
        let fired_at = fired.lock().unwrap().expect("bundle never fired");

        // 2 ms tolerance for clock-domain conversion and timer granularity.
        let min = scheduled_at + Duration::from_millis(delay_ms) - Duration::from_millis(2);
        assert!(fired_at >= min);
        dispatcher.shutdown();
    }

    #[test]
    fn shutdown_before_the_deadline_suppresses_dispatch() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        dispatcher.register("/never", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let bundle = Bundle::new(
            TimeTag::from_unix_millis(unix_millis_now() + 200),
            vec![message("/never")],
        );
        dispatcher.dispatch(bundle.into());
        dispatcher.shutdown();

        thread::sleep(Duration::from_millis(400));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        // Deferred dispatch after shutdown is ignored.
        let bundle = Bundle::new(
            TimeTag::from_unix_millis(unix_millis_now() + 50),
            vec![message("/never")],
        );
        dispatcher.dispatch(bundle.into());
        thread::sleep(Duration::from_millis(150));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
