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

use itertools::Itertools;
use log::error;

use super::defs::*;
use super::dispatch::Event;
use crate::{account::model::*, support::error::Error};

impl Mailbox {
    /// Applies the changes queued for this handle since the last poll,
    /// reporting them to the handle's sink.
    ///
    /// Expunges are reported first, in descending sequence-number order, so
    /// each sequence number is valid at the moment the client applies it.
    /// New messages follow as one `Update::Mailbox`, then the flags of
    /// messages changed by other handles.
    ///
    /// If `expunge_allowed` is false, expunges stay queued and the messages
    /// keep their sequence numbers until a later poll allows them.
    ///
    /// If reporting fails partway, the changes not yet reported stay queued
    /// for the next poll.
    pub fn poll(&mut self, expunge_allowed: bool) -> Result<(), Error> {
        let result = self.apply_events(expunge_allowed);
        match result {
            Ok(()) | Err(Error::MailboxClosed) => {},
            Err(ref e) => error!("{} Poll failed: {e}", self.log_prefix),
        }
        result
    }

    fn apply_events(&mut self, expunge_allowed: bool) -> Result<(), Error> {
        let events = self.subscription()?.drain();

        let mut appended = false;
        let mut expunged = Vec::new();
        let mut deferred = Vec::new();
        let mut changed = Vec::new();
        for event in events {
            match event {
                Event::Appended => appended = true,
                Event::Expunged(uid) if expunge_allowed => expunged.push(uid),
                Event::Expunged(_) => deferred.push(event),
                Event::FlagsChanged(uid) => changed.push(uid),
            }
        }
        self.subscription()?.requeue(deferred);

        let mut pending = PendingEvents {
            appended,
            // Ascending so that popping yields descending order.
            expunged: expunged.into_iter().sorted_unstable().dedup().collect(),
            changed: changed.into_iter().sorted_unstable().dedup().collect(),
        };

        let result = self.report_events(&mut pending);
        if result.is_err() {
            self.subscription()?.requeue(pending.into_events());
        }
        result
    }

    /// Reports `pending` to the sink, removing each change from it once it
    /// has been applied.
    fn report_events(
        &mut self,
        pending: &mut PendingEvents,
    ) -> Result<(), Error> {
        while let Some(&uid) = pending.expunged.last() {
            if let Some(ix) = self.uid_index(uid) {
                self.send(Update::Expunge(Seqnum::from_index(ix)))?;
                self.messages.remove(ix);
            }
            pending.expunged.pop();
        }

        if pending.appended {
            self.poll_new_messages()?;
            pending.appended = false;
        }

        pending.changed.retain(|&uid| self.uid_index(uid).is_some());
        if pending.changed.is_empty() {
            return Ok(());
        }

        let mut last_sent = None;
        let result = self
            .metadb
            .fetch_flags(self.id, &pending.changed)
            .and_then(|changed| {
                for (uid, flags) in changed {
                    // Present since `changed` was filtered and only this
                    // method removes messages.
                    let Some(ix) = self.uid_index(uid) else {
                        continue;
                    };
                    let recent = self.messages[ix].recent;
                    self.send(Update::Message {
                        seqnum: Seqnum::from_index(ix),
                        uid,
                        flags,
                        recent,
                    })?;
                    last_sent = Some(uid);
                }
                Ok(())
            });
        pending.changed.retain(|&uid| Some(uid) > last_sent);
        result
    }

    fn poll_new_messages(&mut self) -> Result<(), Error> {
        let (new_messages, next_uid) = self.metadb.poll_new_messages(
            self.id,
            self.next_uid,
            self.writable,
        )?;
        if new_messages.is_empty() {
            self.next_uid = next_uid;
            return Ok(());
        }

        let update = MailboxStatusUpdate {
            exists: self.messages.len() + new_messages.len(),
            recent: self.messages.iter().filter(|m| m.recent).count()
                + new_messages.iter().filter(|&&(_, recent)| recent).count(),
        };
        self.send(Update::Mailbox(update))?;

        self.next_uid = next_uid;
        self.messages.extend(
            new_messages
                .into_iter()
                .map(|(uid, recent)| MessageStatus { uid, recent }),
        );
        Ok(())
    }
}

/// The changes drained from the subscription that have not been reported
/// yet.
struct PendingEvents {
    appended: bool,
    expunged: Vec<Uid>,
    changed: Vec<Uid>,
}

impl PendingEvents {
    fn into_events(self) -> Vec<Event> {
        self.expunged
            .into_iter()
            .map(Event::Expunged)
            .chain(self.appended.then_some(Event::Appended))
            .chain(self.changed.into_iter().map(Event::FlagsChanged))
            .collect()
    }
}
