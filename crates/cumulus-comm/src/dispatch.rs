//! Client-side work queues for the comm worker.
//!
//! Three queues feed one dispatcher: pending replies, pending signals,
//! and outbound requests, always served in that priority order. The
//! order *within* each queue is an explicit policy rather than an
//! accident of container choice; the default is oldest-first, so
//! signals reach the application in the order they arrived on the
//! wire.

use std::collections::VecDeque;
use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::Notify;

use cumulus_core::proto::{RequestNum, SignalNum};

/// Service order within one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchOrder {
    /// Newest first: the most recent user action wins.
    Lifo,
    /// Oldest first: arrival order is preserved.
    #[default]
    Fifo,
}

#[derive(Debug, PartialEq)]
pub(crate) enum WorkItem {
    Reply(u64, Bytes),
    Signal(u64, SignalNum, Bytes),
    Request(u64, RequestNum, Bytes),
}

#[derive(Default)]
struct QueueState {
    replies: VecDeque<(u64, Bytes)>,
    signals: VecDeque<(u64, SignalNum, Bytes)>,
    requests: VecDeque<(u64, RequestNum, Bytes)>,
    stop: bool,
}

pub(crate) struct DispatchQueues {
    state: Mutex<QueueState>,
    notify: Notify,
    order: DispatchOrder,
}

impl DispatchQueues {
    pub fn new(order: DispatchOrder) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            order,
        }
    }

    pub fn push_reply(&self, id: u64, result: Bytes) {
        self.state
            .lock()
            .expect("dispatch queue lock poisoned")
            .replies
            .push_back((id, result));
        self.notify.notify_one();
    }

    pub fn push_signal(&self, id: u64, num: SignalNum, params: Bytes) {
        self.state
            .lock()
            .expect("dispatch queue lock poisoned")
            .signals
            .push_back((id, num, params));
        self.notify.notify_one();
    }

    pub fn push_request(&self, id: u64, num: RequestNum, params: Bytes) {
        self.state
            .lock()
            .expect("dispatch queue lock poisoned")
            .requests
            .push_back((id, num, params));
        self.notify.notify_one();
    }

    /// One-way stop: wakes the dispatcher, which then drains no further work.
    pub fn stop(&self) {
        self.state
            .lock()
            .expect("dispatch queue lock poisoned")
            .stop = true;
        self.notify.notify_one();
    }

    /// Next item per priority and policy; `None` once stopped.
    pub async fn next(&self) -> Option<WorkItem> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().expect("dispatch queue lock poisoned");
                if state.stop {
                    return None;
                }
                if let Some(item) = Self::pop(&mut state, self.order) {
                    return Some(item);
                }
            }
            notified.await;
        }
    }

    /// Non-blocking pop, used by `next` and by tests.
    pub(crate) fn try_next(&self) -> Option<WorkItem> {
        let mut state = self.state.lock().expect("dispatch queue lock poisoned");
        if state.stop {
            return None;
        }
        Self::pop(&mut state, self.order)
    }

    fn pop(state: &mut QueueState, order: DispatchOrder) -> Option<WorkItem> {
        fn take<T>(queue: &mut VecDeque<T>, order: DispatchOrder) -> Option<T> {
            match order {
                DispatchOrder::Lifo => queue.pop_back(),
                DispatchOrder::Fifo => queue.pop_front(),
            }
        }

        if let Some((id, result)) = take(&mut state.replies, order) {
            return Some(WorkItem::Reply(id, result));
        }
        if let Some((id, num, params)) = take(&mut state.signals, order) {
            return Some(WorkItem::Signal(id, num, params));
        }
        if let Some((id, num, params)) = take(&mut state.requests, order) {
            return Some(WorkItem::Request(id, num, params));
        }
        None
    }
}
