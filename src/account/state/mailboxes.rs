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

use log::info;

use super::defs::*;
use super::dispatch::Event;
use crate::{account::model::*, support::error::Error};

impl User {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates a new, empty mailbox.
    ///
    /// It gets a UID validity no mailbox of this store has had before.
    pub fn create_mailbox(&mut self, name: &str) -> Result<(), Error> {
        let name = self.shared.mailbox_name(name)?;
        let id = self.metadb.create_mailbox(self.id, &name)?;
        info!(
            "{} Created mailbox {name:?} (UID validity {})",
            self.log_prefix, id.0,
        );
        Ok(())
    }

    /// Deletes a mailbox and every message in it.
    ///
    /// The inbox cannot be deleted. Handles still open on the mailbox keep
    /// their snapshot, but operations that need the store fail with
    /// `Error::NxMailbox`.
    pub fn delete_mailbox(&mut self, name: &str) -> Result<(), Error> {
        let name = self.shared.mailbox_name(name)?;
        if name == self.shared.config.inbox_name {
            return Err(Error::BadOperationOnInbox);
        }

        self.metadb.delete_mailbox(self.id, &name)?;
        info!("{} Deleted mailbox {name:?}", self.log_prefix);
        Ok(())
    }

    /// Renames mailbox `src` to `dst`.
    ///
    /// The mailbox keeps its UID validity, since its messages keep their
    /// UIDs. Renaming the inbox instead moves all its messages to a new
    /// mailbox, which has a new UID validity, and leaves the inbox empty;
    /// handles open on the inbox see the messages expunged.
    pub fn rename_mailbox(
        &mut self,
        src: &str,
        dst: &str,
    ) -> Result<(), Error> {
        let src = self.shared.mailbox_name(src)?;
        let dst = self.shared.mailbox_name(dst)?;
        let src_id = self.metadb.find_mailbox(self.id, &src)?;

        let renamed =
            self.shared.dispatcher.publish(src_id, None, || {
                let renamed = self.metadb.rename_mailbox(
                    self.id,
                    &src,
                    &dst,
                    &self.shared.config.inbox_name,
                )?;
                let events = renamed
                    .moved
                    .iter()
                    .map(|&uid| Event::Expunged(uid))
                    .collect();
                Ok((renamed, events))
            })?;

        if renamed.src_id == renamed.dst_id {
            info!("{} Renamed mailbox {src:?} to {dst:?}", self.log_prefix);
        } else {
            info!(
                "{} Moved {} messages from {src:?} to new mailbox {dst:?} \
                 (UID validity {})",
                self.log_prefix,
                renamed.moved.len(),
                renamed.dst_id.0,
            );
        }
        Ok(())
    }

    pub fn set_subscribed(
        &mut self,
        name: &str,
        subscribed: bool,
    ) -> Result<(), Error> {
        let name = self.shared.mailbox_name(name)?;
        self.metadb.set_subscribed(self.id, &name, subscribed)
    }

    /// Lists the user's mailboxes (or only the subscribed ones), ordered by
    /// name.
    pub fn list_mailboxes(
        &mut self,
        subscribed_only: bool,
    ) -> Result<Vec<MailboxListing>, Error> {
        self.metadb.list_mailboxes(self.id, subscribed_only)
    }

    /// Reports the `STATUS` of a mailbox without selecting it.
    ///
    /// `recent` is what a read-write open would report right now; computing
    /// it does not consume recency.
    pub fn status(&mut self, name: &str) -> Result<MailboxInfo, Error> {
        let name = self.shared.mailbox_name(name)?;
        let id = self.metadb.find_mailbox(self.id, &name)?;
        let (row, counts, first_unseen) = self.metadb.mailbox_status(id)?;

        Ok(MailboxInfo {
            name: row.name,
            exists: counts.exists,
            recent: counts.recent,
            unseen: counts.unseen,
            first_unseen,
            uid_next: row.next_uid,
            uid_validity: id.as_uid_validity()?,
            read_only: false,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn names(fixture: &mut TestFixture, subscribed_only: bool) -> Vec<String> {
        fixture
            .user
            .list_mailboxes(subscribed_only)
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect()
    }

    #[test]
    fn create_delete_subscribe() {
        let mut fixture = TestFixture::new();

        fixture.user.create_mailbox("Archive").unwrap();
        fixture.user.create_mailbox("Drafts").unwrap();
        assert_matches!(
            Err(Error::MailboxExists),
            fixture.user.create_mailbox("Archive")
        );
        assert_matches!(
            Err(Error::MailboxExists),
            fixture.user.create_mailbox("inbox")
        );
        assert_matches!(
            Err(Error::UnsafeName),
            fixture.user.create_mailbox("foo*")
        );
        assert_eq!(
            vec!["Archive", "Drafts", "INBOX"],
            names(&mut fixture, false)
        );

        fixture.user.set_subscribed("Drafts", true).unwrap();
        fixture.user.set_subscribed("Inbox", true).unwrap();
        assert_eq!(vec!["Drafts", "INBOX"], names(&mut fixture, true));
        fixture.user.set_subscribed("Drafts", false).unwrap();
        assert_eq!(vec!["INBOX"], names(&mut fixture, true));

        fixture.user.delete_mailbox("Drafts").unwrap();
        assert_matches!(
            Err(Error::NxMailbox),
            fixture.user.delete_mailbox("Drafts")
        );
        assert_matches!(
            Err(Error::BadOperationOnInbox),
            fixture.user.delete_mailbox("INBOX")
        );
        assert_eq!(vec!["Archive", "INBOX"], names(&mut fixture, false));
    }

    #[test]
    fn uid_validity_changes_when_name_is_reused() {
        let mut fixture = TestFixture::new();

        fixture.user.create_mailbox("foo").unwrap();
        fixture.append("foo", &[], None);
        let before = fixture.user.status("foo").unwrap();

        fixture.user.rename_mailbox("foo", "bar").unwrap();
        let renamed = fixture.user.status("bar").unwrap();
        assert_eq!(before.uid_validity, renamed.uid_validity);
        assert_eq!(1, renamed.exists);

        fixture.user.create_mailbox("foo").unwrap();
        let recreated = fixture.user.status("foo").unwrap();
        assert_ne!(before.uid_validity, recreated.uid_validity);
        assert_eq!(0, recreated.exists);

        fixture.user.delete_mailbox("bar").unwrap();
        fixture.user.rename_mailbox("foo", "bar").unwrap();
        let replaced = fixture.user.status("bar").unwrap();
        assert_ne!(renamed.uid_validity, replaced.uid_validity);

        assert_matches!(
            Err(Error::RenameToSelf),
            fixture.user.rename_mailbox("bar", "bar")
        );
        assert_matches!(
            Err(Error::MailboxExists),
            fixture.user.rename_mailbox("bar", "inbox")
        );
    }

    #[test]
    fn renaming_inbox_expunges_from_open_handles() {
        let mut fixture = TestFixture::new();
        for _ in 0..2 {
            fixture.append("INBOX", &["\\Seen"], None);
        }

        let (_, mut inbox, sink) = fixture.open("INBOX", false);
        fixture.user.rename_mailbox("INBOX", "Old").unwrap();

        inbox.poll(true).unwrap();
        assert_eq!(
            vec![Update::Expunge(Seqnum::u(2)), Update::Expunge(Seqnum::u(1))],
            sink.take()
        );
        assert_eq!(0, inbox.info().unwrap().exists);

        let old = fixture.user.status("Old").unwrap();
        assert_eq!(2, old.exists);
        assert_eq!(2, old.recent);
        assert_eq!(0, old.unseen);
        assert_eq!(Uid::u(3), old.uid_next);
        assert_eq!(0, fixture.user.status("INBOX").unwrap().exists);
    }

    #[test]
    fn status_does_not_consume_recency() {
        let mut fixture = TestFixture::new();
        fixture.append("INBOX", &[], None);
        fixture.append("INBOX", &["\\Seen"], None);
        fixture.append("INBOX", &[], None);

        let status = fixture.user.status("INBOX").unwrap();
        assert_eq!(3, status.exists);
        assert_eq!(3, status.recent);
        assert_eq!(2, status.unseen);
        assert_eq!(Some(Seqnum::u(1)), status.first_unseen);
        assert_eq!(Uid::u(4), status.uid_next);

        let (info, _, _) = fixture.open("INBOX", false);
        assert_eq!(3, info.recent);
        assert_eq!(0, fixture.user.status("INBOX").unwrap().recent);
    }
}
