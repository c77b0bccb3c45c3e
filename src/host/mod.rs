//! In-process host environment and its event loop.
//!
//! The host models the environment a promise runtime is embedded in: it owns
//! the event queue, the timers, and the "run later" primitives that the
//! deferred scheduler chooses between. Primitives are reached through
//! capability probes returning `Option`, so code can only use what the host
//! actually exposes:
//!
//! | Probe | Primitive | Present when |
//! |-------|-----------|--------------|
//! | [`Host::set_immediate`] | true deferred task | `capabilities.set_immediate` |
//! | [`Host::message_channel`] | entangled port pairs | `capabilities.message_channel` |
//! | [`Host::window`] | broadcast post-and-listen | `capabilities.post_message` |
//! | [`Host::set_timeout`] | timers | always |
//!
//! Immediates, port messages and window messages share one FIFO event queue.
//! Timers fire from a min-heap once the clock reaches their deadline.
//!
//! The loop is single-threaded: [`Host::turn`] runs exactly one callback.

pub mod clock;
pub mod timer;

pub use clock::ClockMode;
pub use timer::TimerId;

use crate::error::Error;
use crate::tracing_compat::trace;
use clock::Clock;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;
use timer::TimerHeap;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

type MessageHandler = Rc<dyn Fn(&Message)>;

/// The set of deferral primitives a host exposes.
///
/// Timers are not listed: every host has them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    /// A true deferred-task primitive.
    pub set_immediate: bool,
    /// Message channels with entangled port pairs.
    pub message_channel: bool,
    /// Broadcast post-and-listen messaging.
    pub post_message: bool,
}

impl HostCapabilities {
    /// Every primitive available.
    pub const ALL: Self = Self {
        set_immediate: true,
        message_channel: true,
        post_message: true,
    };

    /// Timers only.
    pub const TIMERS_ONLY: Self = Self {
        set_immediate: false,
        message_channel: false,
        post_message: false,
    };

    /// Parses a comma-separated capability list.
    ///
    /// Accepted names: `immediate`, `message-channel`, `post-message` and
    /// `timeout`. `all` and `none` name a whole set and must stand alone.
    /// The first unknown or misplaced name is returned as the error.
    pub fn parse_list(list: &str) -> Result<Self, String> {
        let names: Vec<&str> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let alone = names.len() == 1;
        let mut caps = Self::TIMERS_ONLY;
        for name in names {
            match name.to_ascii_lowercase().replace('_', "-").as_str() {
                "immediate" | "set-immediate" => caps.set_immediate = true,
                "message-channel" => caps.message_channel = true,
                "post-message" => caps.post_message = true,
                "all" if alone => caps = Self::ALL,
                "none" if alone => {}
                "timeout" => {}
                _ => return Err(name.to_string()),
            }
        }
        Ok(caps)
    }
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self::ALL
    }
}

/// A message delivered to a port handler or window listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    data: Rc<str>,
}

impl Message {
    /// Returns the message payload.
    #[must_use]
    pub fn data(&self) -> &str {
        &self.data
    }
}

/// Identifier of a message port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(u64);

/// Identifier of a window message listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

enum HostEvent {
    Immediate(Task),
    PortMessage { target: PortId, message: Message },
    WindowMessage(Message),
}

struct HostInner {
    caps: HostCapabilities,
    clock: Clock,
    events: RefCell<VecDeque<HostEvent>>,
    timers: RefCell<TimerHeap>,
    timer_tasks: RefCell<HashMap<TimerId, Task>>,
    ports: RefCell<HashMap<PortId, MessageHandler>>,
    listeners: RefCell<Vec<(ListenerId, MessageHandler)>>,
    next_port: Cell<u64>,
    next_listener: Cell<u64>,
    turns: Cell<u64>,
}

/// Handle to a host environment. Cloning shares the same event loop.
#[derive(Clone)]
pub struct Host {
    inner: Rc<HostInner>,
}

impl Host {
    /// Creates a host exposing the given primitives.
    #[must_use]
    pub fn new(caps: HostCapabilities, clock: ClockMode) -> Self {
        Self {
            inner: Rc::new(HostInner {
                caps,
                clock: Clock::new(clock),
                events: RefCell::new(VecDeque::new()),
                timers: RefCell::new(TimerHeap::new()),
                timer_tasks: RefCell::new(HashMap::new()),
                ports: RefCell::new(HashMap::new()),
                listeners: RefCell::new(Vec::new()),
                next_port: Cell::new(0),
                next_listener: Cell::new(0),
                turns: Cell::new(0),
            }),
        }
    }

    /// Returns the primitives this host exposes.
    #[must_use]
    pub fn capabilities(&self) -> HostCapabilities {
        self.inner.caps
    }

    /// Returns the clock mode driving this host.
    #[must_use]
    pub fn clock_mode(&self) -> ClockMode {
        self.inner.clock.mode()
    }

    /// Time elapsed since the host started.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.inner.clock.now()
    }

    /// Probes for the true deferred-task primitive.
    #[must_use]
    pub fn set_immediate(&self) -> Option<SetImmediate> {
        self.inner.caps.set_immediate.then(|| SetImmediate {
            host: self.clone(),
        })
    }

    /// Probes for message channels.
    #[must_use]
    pub fn message_channel(&self) -> Option<MessageChannel> {
        self.inner.caps.message_channel.then(|| MessageChannel {
            host: self.clone(),
        })
    }

    /// Probes for broadcast post-and-listen messaging.
    #[must_use]
    pub fn window(&self) -> Option<Window> {
        self.inner.caps.post_message.then(|| Window {
            host: self.clone(),
        })
    }

    /// Timers are available on every host.
    #[must_use]
    pub fn set_timeout(&self) -> SetTimeout {
        SetTimeout { host: self.clone() }
    }

    /// Cancels a pending timer. Returns false if it already fired or was cleared.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        let cancelled = self.inner.timers.borrow_mut().cancel(id);
        if cancelled {
            self.inner.timer_tasks.borrow_mut().remove(&id);
        }
        cancelled
    }

    /// Number of queued events (immediates and messages).
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.inner.events.borrow().len()
    }

    /// Number of live timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.inner.timers.borrow().len()
    }

    /// Number of ports with a message handler installed.
    #[must_use]
    pub fn open_ports(&self) -> usize {
        self.inner.ports.borrow().len()
    }

    /// Returns true if any event or timer is outstanding.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        !self.inner.events.borrow().is_empty() || !self.inner.timers.borrow().is_empty()
    }

    /// Total callbacks run by this host.
    #[must_use]
    pub fn turns(&self) -> u64 {
        self.inner.turns.get()
    }

    /// Runs exactly one callback.
    ///
    /// Queued events run first, in FIFO order. Otherwise the earliest timer
    /// runs, advancing the clock to its deadline if needed. Returns false if
    /// the host is idle.
    pub fn turn(&self) -> bool {
        let event = self.inner.events.borrow_mut().pop_front();
        if let Some(event) = event {
            self.dispatch(event);
            self.count_turn();
            return true;
        }

        let now = self.now();
        let mut expired = self.inner.timers.borrow_mut().pop_expired(now);
        if expired.is_none() {
            let Some(deadline) = self.inner.timers.borrow_mut().peek_deadline() else {
                return false;
            };
            self.inner.clock.advance_to(deadline);
            let now = self.now().max(deadline);
            expired = self.inner.timers.borrow_mut().pop_expired(now);
        }

        let Some(id) = expired else {
            return false;
        };
        let task = self.inner.timer_tasks.borrow_mut().remove(&id);
        if let Some(task) = task {
            trace!(timer = id.as_u64(), "timer fired");
            task();
        }
        self.count_turn();
        true
    }

    /// Runs turns until the host is idle.
    ///
    /// With a turn `limit`, fails with `TurnLimitExceeded` if work is still
    /// pending after that many turns. Returns the number of turns run.
    pub fn run_until_idle(&self, limit: Option<u64>) -> Result<u64, Error> {
        let mut ran = 0_u64;
        loop {
            if let Some(limit) = limit {
                if ran >= limit && self.has_pending_work() {
                    return Err(Error::turn_limit_exceeded(limit));
                }
            }
            if !self.turn() {
                return Ok(ran);
            }
            ran += 1;
        }
    }

    fn count_turn(&self) {
        self.inner.turns.set(self.inner.turns.get() + 1);
    }

    fn push_event(&self, event: HostEvent) {
        self.inner.events.borrow_mut().push_back(event);
    }

    fn dispatch(&self, event: HostEvent) {
        match event {
            HostEvent::Immediate(task) => task(),
            HostEvent::PortMessage { target, message } => {
                let handler = self.inner.ports.borrow().get(&target).cloned();
                match handler {
                    Some(handler) => handler(&message),
                    None => {
                        trace!(port = target.0, "message dropped: port has no handler");
                    }
                }
            }
            HostEvent::WindowMessage(message) => {
                let listeners: Vec<MessageHandler> = self
                    .inner
                    .listeners
                    .borrow()
                    .iter()
                    .map(|(_, handler)| Rc::clone(handler))
                    .collect();
                for listener in listeners {
                    listener(&message);
                }
            }
        }
    }

    fn next_port_id(&self) -> PortId {
        let id = self.inner.next_port.get();
        self.inner.next_port.set(id + 1);
        PortId(id)
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("capabilities", &self.inner.caps)
            .field("clock", &self.clock_mode())
            .field("pending_events", &self.pending_events())
            .field("pending_timers", &self.pending_timers())
            .finish()
    }
}

/// The true deferred-task primitive.
pub struct SetImmediate {
    host: Host,
}

impl SetImmediate {
    /// Queues `task` behind every event already queued.
    pub fn call(&self, task: impl FnOnce() + 'static) {
        self.host.push_event(HostEvent::Immediate(Box::new(task)));
    }
}

/// Factory for entangled port pairs.
pub struct MessageChannel {
    host: Host,
}

impl MessageChannel {
    /// Creates a new channel. A message posted on one port is delivered to
    /// the other port's handler on a later turn.
    #[must_use]
    pub fn create(&self) -> (MessagePort, MessagePort) {
        let a = self.host.next_port_id();
        let b = self.host.next_port_id();
        (
            MessagePort {
                host: self.host.clone(),
                id: a,
                peer: b,
            },
            MessagePort {
                host: self.host.clone(),
                id: b,
                peer: a,
            },
        )
    }
}

/// One end of a message channel.
#[derive(Clone)]
pub struct MessagePort {
    host: Host,
    id: PortId,
    peer: PortId,
}

impl MessagePort {
    /// Returns this port's id.
    #[must_use]
    pub fn id(&self) -> PortId {
        self.id
    }

    /// Installs the handler invoked for messages arriving at this port.
    pub fn set_on_message(&self, handler: impl Fn(&Message) + 'static) {
        self.host
            .inner
            .ports
            .borrow_mut()
            .insert(self.id, Rc::new(handler));
    }

    /// Posts a message to the entangled peer port.
    pub fn post_message(&self, data: &str) {
        self.host.push_event(HostEvent::PortMessage {
            target: self.peer,
            message: Message { data: data.into() },
        });
    }

    /// Removes this port's handler; later messages to it are dropped.
    pub fn close(&self) {
        self.host.inner.ports.borrow_mut().remove(&self.id);
    }

    /// Returns a handle that closes this port without keeping the host alive.
    #[must_use]
    pub fn closer(&self) -> PortCloser {
        PortCloser {
            host: Rc::downgrade(&self.host.inner),
            id: self.id,
        }
    }
}

/// Weak handle closing a port, safe to capture in the port's own handler.
pub struct PortCloser {
    host: Weak<HostInner>,
    id: PortId,
}

impl PortCloser {
    /// Closes the port if the host is still alive.
    pub fn close(&self) {
        if let Some(inner) = self.host.upgrade() {
            inner.ports.borrow_mut().remove(&self.id);
        }
    }
}

/// Broadcast post-and-listen messaging.
#[derive(Clone)]
pub struct Window {
    host: Host,
}

impl Window {
    /// Registers a listener invoked for every posted message.
    pub fn add_listener(&self, handler: impl Fn(&Message) + 'static) -> ListenerId {
        let id = ListenerId(self.host.inner.next_listener.get());
        self.host.inner.next_listener.set(id.0 + 1);
        self.host
            .inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(handler)));
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        remove_listener(&self.host.inner, id)
    }

    /// Returns a handle that removes listeners without keeping the host alive.
    #[must_use]
    pub fn remover(&self) -> ListenerRemover {
        ListenerRemover {
            host: Rc::downgrade(&self.host.inner),
        }
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.host.inner.listeners.borrow().len()
    }

    /// Broadcasts a message to every listener on a later turn.
    pub fn post_message(&self, data: &str) {
        self.host
            .push_event(HostEvent::WindowMessage(Message { data: data.into() }));
    }
}

/// Weak handle removing window listeners, safe to capture in a listener.
pub struct ListenerRemover {
    host: Weak<HostInner>,
}

impl ListenerRemover {
    /// Removes the listener if the host is still alive.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.host
            .upgrade()
            .is_some_and(|inner| remove_listener(&inner, id))
    }
}

fn remove_listener(inner: &HostInner, id: ListenerId) -> bool {
    let mut listeners = inner.listeners.borrow_mut();
    let before = listeners.len();
    listeners.retain(|(lid, _)| *lid != id);
    listeners.len() != before
}

/// The timer primitive.
pub struct SetTimeout {
    host: Host,
}

impl SetTimeout {
    /// Runs `task` once `delay` has elapsed.
    pub fn call(&self, delay: Duration, task: impl FnOnce() + 'static) -> TimerId {
        let deadline = self.host.now() + delay;
        let id = self.host.inner.timers.borrow_mut().insert(deadline);
        self.host
            .inner
            .timer_tasks
            .borrow_mut()
            .insert(id, Box::new(task));
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn virtual_host(caps: HostCapabilities) -> Host {
        Host::new(caps, ClockMode::Virtual)
    }

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let make = move |name: &str| -> Box<dyn FnOnce()> {
            let sink = Rc::clone(&sink);
            let name = name.to_string();
            Box::new(move || sink.borrow_mut().push(name))
        };
        (log, make)
    }

    #[test]
    fn probes_follow_capabilities() {
        let host = virtual_host(HostCapabilities::TIMERS_ONLY);
        assert!(host.set_immediate().is_none());
        assert!(host.message_channel().is_none());
        assert!(host.window().is_none());

        let host = virtual_host(HostCapabilities::ALL);
        assert!(host.set_immediate().is_some());
        assert!(host.message_channel().is_some());
        assert!(host.window().is_some());
    }

    #[test]
    fn immediates_run_fifo_and_never_inline() {
        let host = virtual_host(HostCapabilities::ALL);
        let (log, make) = recorder();
        let immediate = host.set_immediate().unwrap();
        immediate.call(make("a"));
        immediate.call(make("b"));
        assert!(log.borrow().is_empty());
        assert_eq!(host.run_until_idle(None).unwrap(), 2);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn port_messages_reach_the_peer() {
        let host = virtual_host(HostCapabilities::ALL);
        let (port1, port2) = host.message_channel().unwrap().create();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        port1.set_on_message(move |m| sink.borrow_mut().push(m.data().to_string()));
        port2.post_message("ping");
        assert!(seen.borrow().is_empty());
        host.run_until_idle(None).unwrap();
        assert_eq!(*seen.borrow(), vec!["ping"]);

        port1.close();
        port2.post_message("dropped");
        host.run_until_idle(None).unwrap();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn window_messages_broadcast_to_listeners() {
        let host = virtual_host(HostCapabilities::ALL);
        let window = host.window().unwrap();
        let count = Rc::new(Cell::new(0));
        let c1 = Rc::clone(&count);
        let c2 = Rc::clone(&count);
        let first = window.add_listener(move |_| c1.set(c1.get() + 1));
        window.add_listener(move |_| c2.set(c2.get() + 10));
        window.post_message("hello");
        host.run_until_idle(None).unwrap();
        assert_eq!(count.get(), 11);

        assert!(window.remove_listener(first));
        assert!(!window.remove_listener(first));
        window.post_message("again");
        host.run_until_idle(None).unwrap();
        assert_eq!(count.get(), 21);
    }

    #[test]
    fn timers_advance_virtual_time() {
        let host = virtual_host(HostCapabilities::TIMERS_ONLY);
        let (log, make) = recorder();
        let timeout = host.set_timeout();
        timeout.call(Duration::from_millis(100), make("late"));
        timeout.call(Duration::from_millis(10), make("early"));
        host.run_until_idle(None).unwrap();
        assert_eq!(*log.borrow(), vec!["early", "late"]);
        assert_eq!(host.now(), Duration::from_millis(100));
    }

    #[test]
    fn events_run_before_timers() {
        let host = virtual_host(HostCapabilities::ALL);
        let (log, make) = recorder();
        host.set_timeout().call(Duration::ZERO, make("timer"));
        host.set_immediate().unwrap().call(make("immediate"));
        host.run_until_idle(None).unwrap();
        assert_eq!(*log.borrow(), vec!["immediate", "timer"]);
    }

    #[test]
    fn cleared_timer_never_fires() {
        let host = virtual_host(HostCapabilities::TIMERS_ONLY);
        let (log, make) = recorder();
        let id = host.set_timeout().call(Duration::from_millis(5), make("x"));
        assert!(host.has_pending_work());
        assert!(host.clear_timeout(id));
        assert!(!host.clear_timeout(id));
        assert!(!host.has_pending_work());
        assert_eq!(host.run_until_idle(None).unwrap(), 0);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn turn_limit_is_enforced() {
        let host = virtual_host(HostCapabilities::ALL);
        let immediate = host.set_immediate().unwrap();
        for _ in 0..5 {
            immediate.call(|| {});
        }
        let err = host.run_until_idle(Some(3)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TurnLimitExceeded);
        assert_eq!(host.run_until_idle(Some(3)).unwrap(), 2);
    }

    #[test]
    fn parse_capability_lists() {
        assert_eq!(
            HostCapabilities::parse_list("immediate, post_message").unwrap(),
            HostCapabilities {
                set_immediate: true,
                message_channel: false,
                post_message: true,
            }
        );
        assert_eq!(
            HostCapabilities::parse_list("all").unwrap(),
            HostCapabilities::ALL
        );
        assert_eq!(
            HostCapabilities::parse_list("").unwrap(),
            HostCapabilities::TIMERS_ONLY
        );
        assert_eq!(
            HostCapabilities::parse_list("carrier-pigeon").unwrap_err(),
            "carrier-pigeon"
        );
    }

    #[test]
    fn whole_set_names_must_stand_alone() {
        assert_eq!(
            HostCapabilities::parse_list("none").unwrap(),
            HostCapabilities::TIMERS_ONLY
        );
        assert_eq!(
            HostCapabilities::parse_list("timeout, message-channel").unwrap(),
            HostCapabilities {
                message_channel: true,
                ..HostCapabilities::TIMERS_ONLY
            }
        );
        assert_eq!(HostCapabilities::parse_list("all,none").unwrap_err(), "all");
        assert_eq!(
            HostCapabilities::parse_list("none, immediate").unwrap_err(),
            "none"
        );
        assert_eq!(
            HostCapabilities::parse_list("immediate,all").unwrap_err(),
            "all"
        );
    }
}
