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

use chrono::prelude::*;
use log::info;

use super::super::storage;
use super::defs::*;
use super::dispatch::Event;
use crate::{
    account::model::*, mime::header::split_message, support::error::Error,
};

impl User {
    /// Adds a message to the named mailbox, returning its UID.
    ///
    /// `flags` are given in wire form. `\Recent` is ignored, since recency
    /// is derived per session and never stored; any other flag that cannot
    /// be stored fails the whole operation.
    ///
    /// If `via` is a handle open on the same mailbox, the message is added to
    /// the mailbox that handle has open even if it has been renamed since.
    /// Every handle on the mailbox, `via` included, sees the message at its
    /// next poll.
    pub fn create_message(
        &mut self,
        mailbox: &str,
        flags: &[String],
        internal_date: DateTime<Utc>,
        literal: &[u8],
        via: Option<&Mailbox>,
    ) -> Result<Uid, Error> {
        if literal.is_empty() {
            return Err(Error::MalformedMessage);
        }

        let name = self.shared.mailbox_name(mailbox)?;
        let id = match via {
            Some(via) if via.user_id == self.id && via.name == name => via.id,
            _ => self.metadb.find_mailbox(self.id, &name)?,
        };

        let flags = flags
            .iter()
            .filter(|f| !Flag::is_recent(f))
            .map(|f| f.parse::<Flag>())
            .collect::<Result<Vec<_>, _>>()?;

        let (header, body) = split_message(literal);
        let new_message = storage::NewMessage {
            internal_date: storage::UnixTimestamp(internal_date),
            header,
            body,
            flags: &flags,
        };

        self.shared.dispatcher.publish(id, None, || {
            let uid = self.metadb.append_message(id, &new_message)?;
            Ok((uid, vec![Event::Appended]))
        })
    }
}

impl Mailbox {
    /// Applies `op` with `flags` to the messages identified by `ids`
    /// (`STORE`).
    ///
    /// Messages whose flags actually changed are reported to the other
    /// handles open on the mailbox. This handle is not notified, as the
    /// caller already knows what it did.
    pub fn update_messages_flags(
        &mut self,
        use_uid: bool,
        ids: &SeqSet,
        op: FlagOp,
        flags: &[Flag],
    ) -> Result<(), Error> {
        self.check_writable()?;
        let uids = self.resolve_ids(use_uid, ids);
        if uids.is_empty() {
            return Ok(());
        }

        let id = self.id;
        self.shared.dispatcher.publish(
            id,
            self.subscription.as_ref(),
            || {
                let changed = self.metadb.modify_flags(id, &uids, op, flags)?;
                let events =
                    changed.into_iter().map(Event::FlagsChanged).collect();
                Ok(((), events))
            },
        )
    }

    /// Copies the messages identified by `ids` into the named mailbox
    /// (`COPY`).
    ///
    /// This is allowed on read-only handles, since it does not modify this
    /// mailbox. Returns the UID each copied message had here paired with the
    /// UID of its copy.
    pub fn copy_messages(
        &mut self,
        use_uid: bool,
        ids: &SeqSet,
        dest: &str,
    ) -> Result<Vec<(Uid, Uid)>, Error> {
        self.subscription()?;
        let uids = self.resolve_ids(use_uid, ids);
        let dest = self.shared.mailbox_name(dest)?;
        let dest_id = self.metadb.find_mailbox(self.user_id, &dest)?;

        let src_id = self.id;
        self.shared.dispatcher.publish(dest_id, None, || {
            let copied = self.metadb.copy_messages(src_id, &uids, dest_id)?;
            let events = if copied.is_empty() {
                vec![]
            } else {
                vec![Event::Appended]
            };
            Ok((copied, events))
        })
    }

    /// Permanently removes every message with the `\Deleted` flag
    /// (`EXPUNGE`), then polls so the removals are reported to this handle.
    pub fn expunge(&mut self) -> Result<(), Error> {
        self.check_writable()?;

        let id = self.id;
        let expunged = self.shared.dispatcher.publish(
            id,
            self.subscription.as_ref(),
            || {
                let expunged = self.metadb.expunge_deleted(id)?;
                let events =
                    expunged.iter().copied().map(Event::Expunged).collect();
                Ok((expunged.len(), events))
            },
        )?;

        if expunged > 0 {
            info!("{} Expunged {expunged} messages", self.log_prefix);
        }
        self.poll(true)
    }
}

#[cfg(test)]
mod test {
    use rayon::prelude::*;

    use super::*;

    #[test]
    fn create_message_rejects_bad_input() {
        let mut fixture = TestFixture::new();

        assert_matches!(
            Err(Error::MalformedMessage),
            fixture
                .user
                .create_message("INBOX", &[], Utc::now(), b"", None)
        );
        assert_matches!(
            Err(Error::NxMailbox),
            fixture
                .user
                .create_message("nx", &[], Utc::now(), TEST_MESSAGE, None)
        );
        assert_matches!(
            Err(Error::NxFlag),
            fixture.user.create_message(
                "INBOX",
                &["\\Bogus".to_owned()],
                Utc::now(),
                TEST_MESSAGE,
                None,
            )
        );

        // \Recent is silently dropped rather than stored.
        let uid = fixture.append("INBOX", &["\\Recent", "\\Seen"], None);
        assert_eq!(Uid::u(1), uid);
        let (_, mut mailbox, _) = fixture.open("INBOX", false);
        let mut fetched = Vec::new();
        mailbox
            .list_messages(
                true,
                &SeqSet::all(),
                &[FetchItem::Flags],
                &mut |m: FetchedMessage| fetched.push(m),
            )
            .unwrap();
        assert_eq!(
            vec![FetchedItem::Flags {
                flags: vec![Flag::Seen],
                recent: true,
            }],
            fetched[0].items
        );
    }

    #[test]
    fn create_message_via_renamed_handle() {
        let mut fixture = TestFixture::new();
        fixture.user.create_mailbox("foo").unwrap();
        let (_, mut mailbox, sink) = fixture.open("foo", false);

        fixture.user.rename_mailbox("foo", "bar").unwrap();
        fixture.append("foo", &[], Some(&mailbox));
        mailbox.poll(true).unwrap();
        assert_eq!(
            vec![Update::Mailbox(MailboxStatusUpdate {
                exists: 1,
                recent: 1,
            })],
            sink.take()
        );
        assert_eq!(1, fixture.user.status("bar").unwrap().exists);
    }

    #[test]
    fn read_only_handle_cannot_modify() {
        let mut fixture = TestFixture::new();
        fixture.append("INBOX", &["\\Deleted"], None);
        fixture.user.create_mailbox("Archive").unwrap();

        let (_, mut mailbox, _) = fixture.open("INBOX", true);
        assert_matches!(
            Err(Error::MailboxReadOnly),
            mailbox.update_messages_flags(
                false,
                &SeqSet::all(),
                FlagOp::Add,
                &[Flag::Seen],
            )
        );
        assert_matches!(Err(Error::MailboxReadOnly), mailbox.expunge());

        // Copying out of a read-only mailbox is fine.
        assert_eq!(
            vec![(Uid::u(1), Uid::u(1))],
            mailbox
                .copy_messages(false, &SeqSet::all(), "Archive")
                .unwrap()
        );
        assert_eq!(1, fixture.user.status("INBOX").unwrap().exists);
    }

    #[test]
    fn copy_notifies_destination() {
        let mut fixture = TestFixture::new();
        fixture.append("INBOX", &["\\Flagged"], None);
        fixture.append("INBOX", &[], None);
        fixture.user.create_mailbox("Archive").unwrap();

        let (_, mut inbox, inbox_sink) = fixture.open("INBOX", false);
        let (_, mut archive, archive_sink) = fixture.open("Archive", false);

        assert_eq!(
            vec![(Uid::u(2), Uid::u(1))],
            inbox.copy_messages(false, &SeqSet::just(2), "Archive").unwrap()
        );
        assert_eq!(
            vec![(Uid::u(1), Uid::u(2))],
            inbox.copy_messages(true, &SeqSet::just(1), "Archive").unwrap()
        );
        assert!(inbox
            .copy_messages(true, &SeqSet::just(99), "Archive")
            .unwrap()
            .is_empty());
        assert_matches!(
            Err(Error::NxMailbox),
            inbox.copy_messages(true, &SeqSet::all(), "nx")
        );

        inbox.poll(true).unwrap();
        assert!(inbox_sink.take().is_empty());
        archive.poll(true).unwrap();
        assert_eq!(
            vec![Update::Mailbox(MailboxStatusUpdate {
                exists: 2,
                recent: 2,
            })],
            archive_sink.take()
        );
    }

    #[test]
    fn concurrent_appends_get_distinct_uids() {
        let mut fixture = TestFixture::new();
        let (_, mut watcher, sink) = fixture.open("INBOX", false);

        let backend = &fixture.backend;
        let mut uids = (0..4)
            .into_par_iter()
            .flat_map_iter(|_| {
                let mut user = backend.user("alice").unwrap();
                (0..10)
                    .map(|_| {
                        user.create_message(
                            "INBOX",
                            &[],
                            Utc::now(),
                            TEST_MESSAGE,
                            None,
                        )
                        .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        uids.sort_unstable();
        let expected = (1..=40).map(Uid::u).collect::<Vec<_>>();
        assert_eq!(expected, uids);

        watcher.poll(true).unwrap();
        assert_eq!(
            vec![Update::Mailbox(MailboxStatusUpdate {
                exists: 40,
                recent: 40,
            })],
            sink.take()
        );
    }
}
