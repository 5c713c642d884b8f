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

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::super::storage;
use super::dispatch::{Dispatcher, Subscription};
use crate::{
    account::model::*,
    support::{
        error::Error, log_prefix::LogPrefix, safe_name::normalise_mailbox_name,
        store_config::StoreConfig,
    },
};

/// Process-wide state shared by everything opened from one `Backend`.
pub(super) struct Shared {
    pub(super) path: PathBuf,
    pub(super) config: StoreConfig,
    pub(super) dispatcher: Dispatcher,
}

impl Shared {
    /// Opens a fresh connection to the store.
    pub(super) fn connect(
        &self,
        log_prefix: &LogPrefix,
    ) -> Result<storage::MetaDb, Error> {
        storage::MetaDb::new(log_prefix, &self.path, &self.config)
    }

    /// Maps a client-supplied mailbox name to the name it is stored under.
    pub(super) fn mailbox_name(&self, name: &str) -> Result<String, Error> {
        normalise_mailbox_name(name, &self.config.inbox_name)
            .ok_or(Error::UnsafeName)
    }
}

/// The registry of users in one store.
///
/// A `Backend` is shared by every session of the process; all its methods
/// take `&self`.
pub struct Backend {
    pub(super) shared: Arc<Shared>,
    pub(super) metadb: Mutex<storage::MetaDb>,
    pub(super) log_prefix: LogPrefix,
}

/// A user, as seen by one session.
pub struct User {
    pub(super) id: storage::UserId,
    pub(super) name: String,
    pub(super) metadb: storage::MetaDb,
    pub(super) shared: Arc<Shared>,
    pub(super) log_prefix: LogPrefix,
}

/// A handle on an open mailbox.
///
/// The handle holds the session's view of the mailbox: which messages it
/// knows about (and thus their sequence numbers) and which of them are
/// `\Recent` to it. The view only changes when the handle polls.
pub struct Mailbox {
    pub(super) id: storage::MailboxId,
    pub(super) user_id: storage::UserId,
    pub(super) name: String,
    pub(super) writable: bool,
    pub(super) metadb: storage::MetaDb,
    pub(super) shared: Arc<Shared>,
    /// The messages currently known to this session, sorted ascending by UID.
    ///
    /// Sequence numbers are indices-plus-one into this `Vec`.
    pub(super) messages: Vec<MessageStatus>,
    /// The UID the next message added to the mailbox will get, as of the last
    /// poll.
    pub(super) next_uid: Uid,
    pub(super) uid_validity: u32,
    pub(super) sink: Box<dyn UpdateSink>,
    /// `None` once the handle has been closed.
    pub(super) subscription: Option<Subscription>,
    pub(super) log_prefix: LogPrefix,
}

/// Information about a message retained in a selected mailbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct MessageStatus {
    pub(super) uid: Uid,
    /// Whether the message is considered `\Recent` in this session.
    pub(super) recent: bool,
}

impl Mailbox {
    /// Returns the subscription of this handle, or `Error::MailboxClosed` if
    /// it has been closed.
    pub(super) fn subscription(&self) -> Result<&Subscription, Error> {
        self.subscription.as_ref().ok_or(Error::MailboxClosed)
    }

    /// Fails with `Error::MailboxClosed` or `Error::MailboxReadOnly` unless
    /// the handle can modify the mailbox.
    pub(super) fn check_writable(&self) -> Result<(), Error> {
        self.subscription()?;
        if !self.writable {
            return Err(Error::MailboxReadOnly);
        }
        Ok(())
    }

    pub(super) fn uid_index(&self, uid: Uid) -> Option<usize> {
        self.messages.binary_search_by_key(&uid, |m| m.uid).ok()
    }

    pub(super) fn seqnum_to_uid(&self, seqnum: Seqnum) -> Option<Uid> {
        self.messages.get(seqnum.to_index()).map(|m| m.uid)
    }

    pub(super) fn max_uid(&self) -> u32 {
        self.messages.last().map_or(0, |m| m.uid.into())
    }

    /// Resolves a client-supplied message set against the current view.
    ///
    /// Returns the UIDs of the messages the set names, ascending. Numbers
    /// naming nothing in the view are silently dropped.
    pub(super) fn resolve_ids(&self, use_uid: bool, ids: &SeqSet) -> Vec<Uid> {
        if use_uid {
            let range = ids.resolve::<Uid>(self.max_uid());
            self.messages
                .iter()
                .map(|m| m.uid)
                .filter(|&uid| range.contains(uid))
                .collect()
        } else {
            let max = u32::try_from(self.messages.len()).unwrap_or(u32::MAX);
            ids.resolve::<Seqnum>(max)
                .items(max)
                .filter_map(|seqnum| self.seqnum_to_uid(seqnum))
                .collect()
        }
    }

    pub(super) fn send(&mut self, update: Update) -> Result<(), Error> {
        self.sink.send_update(update)
    }
}

/// An `UpdateSink` that remembers everything sent to it.
#[cfg(test)]
#[derive(Clone, Default)]
pub(super) struct RecordingSink(pub(super) Arc<Mutex<Vec<Update>>>);

#[cfg(test)]
impl RecordingSink {
    pub(super) fn take(&self) -> Vec<Update> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

#[cfg(test)]
impl UpdateSink for RecordingSink {
    fn send_update(&mut self, update: Update) -> Result<(), Error> {
        self.0.lock().unwrap().push(update);
        Ok(())
    }
}

#[cfg(test)]
pub(super) const TEST_MESSAGE: &[u8] = b"From: <foxcpp@foxcpp.dev>\r\n\
Subject: Hello!\r\n\
Content-Type: text/plain; charset=ascii\r\n\
Non-Cached-Header: 1\r\n\
\r\n\
Hello!\r\n";

#[cfg(test)]
pub(super) struct TestFixture {
    _root: tempfile::TempDir,
    pub(super) backend: Backend,
    pub(super) user: User,
}

#[cfg(test)]
impl TestFixture {
    pub(super) fn new() -> Self {
        crate::init_test_log();

        let root = tempfile::TempDir::new().unwrap();
        let backend = Backend::open(
            &root.path().join("mail.sqlite"),
            StoreConfig::default(),
        )
        .unwrap();
        backend.create_user("alice").unwrap();
        let user = backend.user("alice").unwrap();

        Self {
            _root: root,
            backend,
            user,
        }
    }

    /// Opens `name` with a recording sink.
    pub(super) fn open(
        &mut self,
        name: &str,
        read_only: bool,
    ) -> (MailboxInfo, Mailbox, RecordingSink) {
        let sink = RecordingSink::default();
        let (info, mailbox) = self
            .user
            .get_mailbox(name, read_only, Box::new(sink.clone()))
            .unwrap();
        (info, mailbox, sink)
    }

    /// Appends `TEST_MESSAGE` to `name` with the given flags.
    pub(super) fn append(
        &mut self,
        name: &str,
        flags: &[&str],
        via: Option<&Mailbox>,
    ) -> Uid {
        let flags = flags.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        self.user
            .create_message(
                name,
                &flags,
                chrono::Utc::now(),
                TEST_MESSAGE,
                via,
            )
            .unwrap()
    }
}
