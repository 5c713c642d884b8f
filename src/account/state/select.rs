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

use std::sync::Arc;

use log::debug;

use super::defs::*;
use crate::{account::model::*, support::error::Error};

impl User {
    /// Opens a handle on the named mailbox.
    ///
    /// A read-write open is the point where the mailbox's `\Recent`
    /// watermark advances: the messages it reports as `\Recent` will not be
    /// `\Recent` to any later session. A read-only open reports the same
    /// messages as `\Recent` but leaves them for the next read-write open.
    ///
    /// Updates for the handle are delivered to `sink` when it polls.
    pub fn get_mailbox(
        &mut self,
        name: &str,
        read_only: bool,
        sink: Box<dyn UpdateSink>,
    ) -> Result<(MailboxInfo, Mailbox), Error> {
        let name = self.shared.mailbox_name(name)?;
        let id = self.metadb.find_mailbox(self.id, &name)?;

        let log_prefix = self.log_prefix.deep_clone();
        log_prefix.set_mailbox(name.clone());
        let mut metadb = self.shared.connect(&log_prefix)?;

        let (snapshot, subscription) = self
            .shared
            .dispatcher
            .subscribe(id, || metadb.select(id, !read_only))?;

        let mut mailbox = Mailbox {
            id,
            user_id: self.id,
            name,
            writable: !read_only,
            metadb,
            shared: Arc::clone(&self.shared),
            messages: snapshot
                .messages
                .into_iter()
                .map(|(uid, recent)| MessageStatus { uid, recent })
                .collect(),
            next_uid: snapshot.next_uid,
            uid_validity: snapshot.uid_validity,
            sink,
            subscription: Some(subscription),
            log_prefix,
        };

        debug!(
            "{} Opened {}",
            mailbox.log_prefix,
            if read_only { "read-only" } else { "read-write" },
        );
        let info = mailbox.info()?;
        Ok((info, mailbox))
    }
}

impl Mailbox {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_read_only(&self) -> bool {
        !self.writable
    }

    /// Describes the mailbox as this handle currently sees it.
    ///
    /// This does not poll; it reflects the state as of the last poll.
    pub fn info(&mut self) -> Result<MailboxInfo, Error> {
        self.subscription()?;

        let uids = self.messages.iter().map(|m| m.uid).collect::<Vec<_>>();
        let seen = self
            .metadb
            .fetch_flags(self.id, &uids)?
            .into_iter()
            .filter(|(_, flags)| flags.contains(&Flag::Seen))
            .map(|(uid, _)| uid)
            .collect::<Vec<_>>();

        let unseen = |m: &&MessageStatus| seen.binary_search(&m.uid).is_err();
        Ok(MailboxInfo {
            name: self.name.clone(),
            exists: self.messages.len(),
            recent: self.messages.iter().filter(|m| m.recent).count(),
            unseen: self.messages.iter().filter(unseen).count(),
            first_unseen: self
                .messages
                .iter()
                .position(|m| unseen(&m))
                .map(Seqnum::from_index),
            uid_next: self.next_uid,
            uid_validity: self.uid_validity,
            read_only: !self.writable,
        })
    }

    /// A reconciliation point (`CHECK`). All changes are durable as soon as
    /// they are made, so there is nothing to do beyond validating the
    /// handle.
    pub fn check(&self) -> Result<(), Error> {
        self.subscription().map(|_| ())
    }

    /// Closes the handle.
    ///
    /// Updates that were queued for it and not yet polled are discarded.
    /// Every later operation on the handle fails with
    /// `Error::MailboxClosed`.
    pub fn close(&mut self) -> Result<(), Error> {
        let subscription =
            self.subscription.take().ok_or(Error::MailboxClosed)?;
        drop(subscription);
        debug!("{} Closed", self.log_prefix);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recent_watermark() {
        let mut fixture = TestFixture::new();
        fixture.user.create_mailbox("box").unwrap();
        for _ in 0..5 {
            fixture.append("box", &["flag1", "flag2"], None);
        }

        let (info, mut mailbox, sink) = fixture.open("box", false);
        assert_eq!(5, info.exists);
        assert_eq!(5, info.recent);
        assert_eq!(5, info.unseen);
        assert_eq!(Some(Seqnum::u(1)), info.first_unseen);
        assert_eq!(Uid::u(6), info.uid_next);
        assert!(!info.read_only);

        fixture.append("box", &["flag1", "flag2"], Some(&mailbox));
        mailbox.poll(true).unwrap();
        assert_eq!(
            vec![Update::Mailbox(MailboxStatusUpdate {
                exists: 6,
                recent: 6,
            })],
            sink.take()
        );
        mailbox.close().unwrap();

        let (info, _mailbox, _) = fixture.open("box", false);
        assert_eq!(6, info.exists);
        assert_eq!(0, info.recent);
    }

    #[test]
    fn read_only_open_preserves_recency() {
        let mut fixture = TestFixture::new();
        for _ in 0..3 {
            fixture.append("INBOX", &[], None);
        }

        let (info, examined, _) = fixture.open("INBOX", true);
        assert_eq!(3, info.recent);
        assert!(info.read_only);
        assert!(examined.is_read_only());

        let (info, _, _) = fixture.open("inbox", true);
        assert_eq!(3, info.recent);
        let (info, _, _) = fixture.open("INBOX", false);
        assert_eq!(3, info.recent);
        let (info, _, _) = fixture.open("INBOX", false);
        assert_eq!(0, info.recent);
    }

    #[test]
    fn closed_handle_rejects_everything() {
        let mut fixture = TestFixture::new();
        fixture.append("INBOX", &[], None);

        let (_, mut mailbox, sink) = fixture.open("INBOX", false);
        fixture.append("INBOX", &[], None);
        mailbox.close().unwrap();

        assert_matches!(Err(Error::MailboxClosed), mailbox.close());
        assert_matches!(Err(Error::MailboxClosed), mailbox.poll(true));
        assert_matches!(Err(Error::MailboxClosed), mailbox.info());
        assert_matches!(Err(Error::MailboxClosed), mailbox.check());
        assert_matches!(
            Err(Error::MailboxClosed),
            mailbox.search_messages(false, &SearchCriteria::default())
        );
        assert_matches!(
            Err(Error::MailboxClosed),
            mailbox.list_messages(
                false,
                &SeqSet::all(),
                &[],
                &mut |_: FetchedMessage| (),
            )
        );
        assert_matches!(Err(Error::MailboxClosed), mailbox.expunge());
        assert!(sink.take().is_empty());
    }

    #[test]
    fn open_nonexistent() {
        let mut fixture = TestFixture::new();
        assert!(fixture
            .user
            .get_mailbox("nx", false, Box::new(RecordingSink::default()))
            .is_err_and(|e| matches!(e, Error::NxMailbox)));
    }
}
