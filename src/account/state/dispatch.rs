//-
// Copyright (c) 2026, The Mailrow Authors
//
// This file is part of Mailrow.
//
// Mailrow is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Mailrow is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mailrow. If not, see <http://www.gnu.org/licenses/>.

//! Fan-out of changes to the handles that have a mailbox open.
//!
//! Every open `Mailbox` handle owns a queue. Whoever changes a mailbox
//! publishes events to the queues of every handle on it; a handle applies
//! what accumulated in its queue when it polls. Handles never touch each
//! other's state directly.
//!
//! Both subscribing and publishing run their database operation while holding
//! the lock of the mailbox's hub. A handle's snapshot and the events queued
//! for it therefore partition the history of the mailbox exactly: every change
//! is either already reflected in the snapshot or arrives as an event, never
//! both and never neither.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Weak};

use log::debug;

use super::super::storage::MailboxId;
use crate::{account::model::Uid, support::error::Error};

/// A change to a mailbox that open handles need to learn about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Event {
    /// One or more messages were added.
    Appended,
    Expunged(Uid),
    FlagsChanged(Uid),
}

type Queue = Mutex<VecDeque<Event>>;

/// The handles open on one mailbox.
struct Hub {
    queues: Mutex<Vec<Weak<Queue>>>,
}

#[derive(Default)]
pub(super) struct Dispatcher {
    hubs: Mutex<HashMap<MailboxId, Weak<Hub>>>,
}

/// A handle's membership in the hub of one mailbox.
///
/// Dropping the subscription discards whatever is still queued for it.
pub(super) struct Subscription {
    hub: Arc<Hub>,
    queue: Arc<Queue>,
}

impl Dispatcher {
    fn hub(&self, mailbox: MailboxId) -> Arc<Hub> {
        let mut hubs = self.hubs.lock().unwrap();
        if let Some(hub) = hubs.get(&mailbox).and_then(Weak::upgrade) {
            return hub;
        }

        hubs.retain(|_, hub| hub.strong_count() > 0);
        let hub = Arc::new(Hub {
            queues: Mutex::new(Vec::new()),
        });
        hubs.insert(mailbox, Arc::downgrade(&hub));
        hub
    }

    /// Registers a new handle on `mailbox`.
    ///
    /// `snapshot` runs under the hub lock and produces the handle's initial
    /// view; events are queued for the handle from that point on.
    pub(super) fn subscribe<T>(
        &self,
        mailbox: MailboxId,
        snapshot: impl FnOnce() -> Result<T, Error>,
    ) -> Result<(T, Subscription), Error> {
        let hub = self.hub(mailbox);
        let queue = Arc::new(Queue::default());
        let ret = {
            let mut queues = hub.queues.lock().unwrap();
            let ret = snapshot()?;
            queues.retain(|q| q.strong_count() > 0);
            queues.push(Arc::downgrade(&queue));
            ret
        };

        Ok((ret, Subscription { hub, queue }))
    }

    /// Runs `change` against `mailbox` and queues the events it returns for
    /// the handles open on it.
    ///
    /// `FlagsChanged` events are not queued for `origin`. Everything else
    /// is, so that the originating handle learns of its own appends and
    /// expunges through its next poll like everyone else.
    pub(super) fn publish<T>(
        &self,
        mailbox: MailboxId,
        origin: Option<&Subscription>,
        change: impl FnOnce() -> Result<(T, Vec<Event>), Error>,
    ) -> Result<T, Error> {
        let hub = self.hub(mailbox);
        let queues = hub.queues.lock().unwrap();
        let (ret, events) = change()?;
        if events.is_empty() {
            return Ok(ret);
        }

        for queue in queues.iter().filter_map(Weak::upgrade) {
            let is_origin =
                origin.is_some_and(|origin| Arc::ptr_eq(&origin.queue, &queue));
            let mut queue = queue.lock().unwrap();
            queue.extend(events.iter().copied().filter(|&event| {
                !is_origin || !matches!(event, Event::FlagsChanged(_))
            }));
        }

        Ok(ret)
    }
}

impl Subscription {
    /// Takes every event queued so far.
    pub(super) fn drain(&self) -> Vec<Event> {
        self.queue.lock().unwrap().drain(..).collect()
    }

    /// Puts `events` back at the front of the queue, ahead of anything that
    /// arrived since they were drained.
    pub(super) fn requeue(&self, events: Vec<Event>) {
        let mut queue = self.queue.lock().unwrap();
        for event in events.into_iter().rev() {
            queue.push_front(event);
        }
    }

    /// Number of handles currently subscribed to the same mailbox, including
    /// this one.
    #[cfg(test)]
    pub(super) fn siblings(&self) -> usize {
        self.hub
            .queues
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.strong_count() > 0)
            .count()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let pending = self.queue.lock().unwrap().len();
        if pending > 0 {
            debug!("Dropping {pending} undelivered mailbox events");
        }
    }
}
