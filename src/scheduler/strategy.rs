//! Concrete deferral strategies, one per host primitive.
//!
//! Each strategy wraps a capability handle obtained from a host probe, so a
//! strategy can only exist on a host that exposes its primitive.

use super::{DeferStrategy, StrategyKind};
use crate::host::{MessageChannel, SetImmediate, SetTimeout, Task, Window};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// Payload posted by the message-based strategies.
pub const DEFER_MESSAGE: &str = "pledge:deferred";

/// Queues tasks with the host's true deferred-task primitive.
pub struct ImmediateStrategy {
    api: SetImmediate,
}

impl ImmediateStrategy {
    pub(crate) fn new(api: SetImmediate) -> Self {
        Self { api }
    }
}

impl DeferStrategy for ImmediateStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Immediate
    }

    fn defer(&self, task: Task) {
        self.api.call(task);
    }
}

/// Round-trips each task through a fresh message channel.
///
/// The task is parked on one port, a message is posted from the other, and
/// the receiving handler runs the task and closes its port.
pub struct MessageChannelStrategy {
    api: MessageChannel,
}

impl MessageChannelStrategy {
    pub(crate) fn new(api: MessageChannel) -> Self {
        Self { api }
    }
}

impl DeferStrategy for MessageChannelStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MessageChannel
    }

    fn defer(&self, task: Task) {
        let (receiver, sender) = self.api.create();
        let closer = receiver.closer();
        let slot = RefCell::new(Some(task));
        receiver.set_on_message(move |_| {
            closer.close();
            let task = slot.borrow_mut().take();
            if let Some(task) = task {
                task();
            }
        });
        sender.post_message(DEFER_MESSAGE);
    }
}

/// Posts a broadcast message and listens for it.
///
/// Every message carries a unique token; a listener only reacts to its own
/// token and removes itself before running its task, so two pending tasks
/// are never coalesced.
pub struct PostMessageStrategy {
    window: Window,
    next_token: Cell<u64>,
}

impl PostMessageStrategy {
    pub(crate) fn new(window: Window) -> Self {
        Self {
            window,
            next_token: Cell::new(0),
        }
    }
}

impl DeferStrategy for PostMessageStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PostMessage
    }

    fn defer(&self, task: Task) {
        let n = self.next_token.get();
        self.next_token.set(n + 1);
        let token = format!("{DEFER_MESSAGE}#{n}");

        let remover = self.window.remover();
        let registration = Rc::new(Cell::new(None));
        let own_id = Rc::clone(&registration);
        let expected = token.clone();
        let slot = RefCell::new(Some(task));
        let id = self.window.add_listener(move |message| {
            if message.data() != expected {
                return;
            }
            if let Some(id) = own_id.take() {
                remover.remove(id);
            }
            let task = slot.borrow_mut().take();
            if let Some(task) = task {
                task();
            }
        });
        registration.set(Some(id));
        self.window.post_message(&token);
    }
}

/// Last resort: a minimal-delay timer.
pub struct TimeoutStrategy {
    api: SetTimeout,
    delay: Duration,
}

impl TimeoutStrategy {
    pub(crate) fn new(api: SetTimeout, delay: Duration) -> Self {
        Self { api, delay }
    }

    /// The delay applied to every deferred task.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl DeferStrategy for TimeoutStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Timeout
    }

    fn defer(&self, task: Task) {
        self.api.call(self.delay, task);
    }
}
