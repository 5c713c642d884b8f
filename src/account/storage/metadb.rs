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

use std::path::Path;
use std::time::Duration;

use rusqlite::OptionalExtension as _;

use super::{functions, migrations, types::*};
use crate::{
    account::model::*,
    support::{
        error::Error, log_prefix::LogPrefix, store_config::StoreConfig,
    },
};

/// A connection to the store database.
///
/// Every `User` and every open `Mailbox` owns one of these, so that one
/// session blocking on SQLite never holds up another's connection.
pub struct Connection {
    pub(super) cxn: rusqlite::Connection,
}

static MIGRATION_V1: &str = include_str!("metadb.v1.sql");

impl Connection {
    pub fn new(
        log_prefix: &LogPrefix,
        path: &Path,
        config: &StoreConfig,
    ) -> Result<Self, Error> {
        let mut cxn = rusqlite::Connection::open(path)?;

        cxn.pragma_update(None, "foreign_keys", true)?;
        cxn.pragma_update(None, "journal_mode", &config.journal_mode)?;
        cxn.pragma_update(None, "synchronous", &config.synchronous)?;
        cxn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        functions::register(&cxn)?;

        migrations::apply_migrations(log_prefix, &mut cxn, &[MIGRATION_V1])?;

        Ok(Self { cxn })
    }

    /// Creates a user with the given name, along with the given initial
    /// mailboxes.
    pub fn create_user(
        &mut self,
        name: &str,
        initial_mailboxes: &[&str],
    ) -> Result<UserId, Error> {
        let txn = self.cxn.write_tx()?;

        if 0 != txn.query_row(
            "SELECT COUNT(*) FROM `user` WHERE `name` = ?",
            (name,),
            from_single::<i64>,
        )? {
            return Err(Error::UserExists);
        }

        txn.execute("INSERT INTO `user` (`name`) VALUES (?)", (name,))?;
        let id = UserId(txn.last_insert_rowid());

        for &mailbox in initial_mailboxes {
            txn.execute(
                "INSERT INTO `mailbox` (`user_id`, `name`) VALUES (?, ?)",
                (id, mailbox),
            )?;
        }

        txn.commit()?;
        Ok(id)
    }

    /// Finds the ID of the user with the given name, or returns
    /// `Error::NxUser` if there is none.
    pub fn find_user(&mut self, name: &str) -> Result<UserId, Error> {
        self.cxn.enable_write(false)?;
        self.cxn
            .query_row(
                "SELECT `id` FROM `user` WHERE `name` = ?",
                (name,),
                from_single,
            )
            .optional()?
            .ok_or(Error::NxUser)
    }

    /// Deletes the named user and everything they own.
    pub fn delete_user(&mut self, name: &str) -> Result<(), Error> {
        let txn = self.cxn.write_tx()?;
        if 0 == txn.execute("DELETE FROM `user` WHERE `name` = ?", (name,))? {
            return Err(Error::NxUser);
        }
        txn.commit()?;
        Ok(())
    }

    pub fn list_users(&mut self) -> Result<Vec<String>, Error> {
        self.cxn.enable_write(false)?;
        self.cxn
            .prepare("SELECT `name` FROM `user` ORDER BY `name`")?
            .query_map((), from_single)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Creates a mailbox with the given name.
    ///
    /// On success, returns the ID of the created mailbox.
    pub fn create_mailbox(
        &mut self,
        user: UserId,
        name: &str,
    ) -> Result<MailboxId, Error> {
        let txn = self.cxn.write_tx()?;
        let id = create_mailbox(&txn, user, name)?;
        txn.commit()?;
        Ok(id)
    }

    /// Finds the ID of the mailbox with the given name, or returns
    /// `Error::NxMailbox` if it does not exist.
    pub fn find_mailbox(
        &mut self,
        user: UserId,
        name: &str,
    ) -> Result<MailboxId, Error> {
        self.cxn.enable_write(false)?;
        find_mailbox(&self.cxn, user, name)
    }

    /// Retrieves the row for the given mailbox.
    pub fn fetch_mailbox(
        &mut self,
        id: MailboxId,
    ) -> Result<MailboxRow, Error> {
        self.cxn.enable_write(false)?;
        fetch_mailbox(&self.cxn, id)
    }

    /// Deletes the named mailbox, along with all its messages.
    ///
    /// Returns the ID the mailbox had.
    pub fn delete_mailbox(
        &mut self,
        user: UserId,
        name: &str,
    ) -> Result<MailboxId, Error> {
        let txn = self.cxn.write_tx()?;
        let id = find_mailbox(&txn, user, name)?;
        txn.execute("DELETE FROM `mailbox` WHERE `id` = ?", (id,))?;
        txn.commit()?;
        Ok(id)
    }

    /// Renames `src` to `dst`.
    ///
    /// The mailbox keeps its ID, and with it its UID validity and messages.
    ///
    /// The inbox cannot be renamed away. Instead, a new mailbox called `dst`
    /// is created and every message of the inbox is moved into it with fresh
    /// UIDs, leaving the inbox empty. In that case, the result holds the UIDs
    /// the moved messages had in the inbox.
    pub fn rename_mailbox(
        &mut self,
        user: UserId,
        src: &str,
        dst: &str,
        inbox_name: &str,
    ) -> Result<RenamedMailbox, Error> {
        if src == dst {
            return Err(Error::RenameToSelf);
        }

        let txn = self.cxn.write_tx()?;
        let src_id = find_mailbox(&txn, user, src)?;
        if find_mailbox(&txn, user, dst).is_ok() {
            return Err(Error::MailboxExists);
        }

        let mut moved = Vec::new();
        let dst_id = if src == inbox_name {
            let dst_id = create_mailbox(&txn, user, dst)?;
            let messages = txn
                .prepare(
                    "SELECT `id`, `uid` FROM `message` \
                     WHERE `mailbox_id` = ? ORDER BY `uid`",
                )?
                .query_map((src_id,), from_row::<(MessageId, Uid)>)?
                .collect::<Result<Vec<_>, _>>()?;

            let mut next_uid = Uid::MIN;
            for (message_id, old_uid) in messages {
                txn.execute(
                    "UPDATE `message` SET `mailbox_id` = ?, `uid` = ? \
                     WHERE `id` = ?",
                    (dst_id, next_uid, message_id),
                )?;
                moved.push(old_uid);
                next_uid = next_uid.next().ok_or(Error::MailboxFull)?;
            }

            // The moved messages are new to the destination, so they are
            // all \Recent there.
            txn.execute(
                "UPDATE `mailbox` SET `next_uid` = ?, `recent_uid` = 1 \
                 WHERE `id` = ?",
                (next_uid, dst_id),
            )?;
            dst_id
        } else {
            txn.execute(
                "UPDATE `mailbox` SET `name` = ? WHERE `id` = ?",
                (dst, src_id),
            )?;
            src_id
        };

        txn.commit()?;
        Ok(RenamedMailbox {
            src_id,
            dst_id,
            moved,
        })
    }

    pub fn set_subscribed(
        &mut self,
        user: UserId,
        name: &str,
        subscribed: bool,
    ) -> Result<(), Error> {
        let txn = self.cxn.write_tx()?;
        let id = find_mailbox(&txn, user, name)?;
        txn.execute(
            "UPDATE `mailbox` SET `subscribed` = ? WHERE `id` = ?",
            (subscribed, id),
        )?;
        txn.commit()?;
        Ok(())
    }

    /// Lists the user's mailboxes, ordered by name.
    pub fn list_mailboxes(
        &mut self,
        user: UserId,
        subscribed_only: bool,
    ) -> Result<Vec<MailboxListing>, Error> {
        self.cxn.enable_write(false)?;
        self.cxn
            .prepare(
                "SELECT `name`, `subscribed` FROM `mailbox` \
                 WHERE `user_id` = ? AND (`subscribed` OR NOT ?) \
                 ORDER BY `name`",
            )?
            .query_map((user, subscribed_only), |row| {
                Ok(MailboxListing {
                    name: row.get(0)?,
                    subscribed: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Computes the `STATUS` of a mailbox.
    ///
    /// `recent` is the number of messages a read-write `SELECT` performed now
    /// would report as `\Recent`. The watermark is not touched.
    ///
    /// The second element of the result is the sequence number of the first
    /// message without `\Seen`, if any, in a session that selected the
    /// mailbox at this point.
    pub fn mailbox_status(
        &mut self,
        id: MailboxId,
    ) -> Result<(MailboxRow, MailboxCounts, Option<Seqnum>), Error> {
        let txn = self.cxn.read_tx()?;
        let mailbox = fetch_mailbox(&txn, id)?;

        let (exists, recent, unseen, first_unseen) = txn.query_row(
            "SELECT COUNT(*), \
             COALESCE(SUM(`uid` >= ?), 0), \
             COALESCE(SUM(NOT `seen`), 0), \
             MIN(CASE WHEN `seen` THEN NULL ELSE `uid` END) \
             FROM (SELECT `uid`, EXISTS (\
                     SELECT 1 FROM `message_flag` \
                     WHERE `message_flag`.`message_id` = `message`.`id` \
                     AND `message_flag`.`flag` = '\\Seen'\
                   ) AS `seen` \
                   FROM `message` WHERE `mailbox_id` = ?)",
            (mailbox.recent_uid, id),
            from_row::<(usize, usize, usize, Option<Uid>)>,
        )?;

        let first_unseen = match first_unseen {
            None => None,
            Some(uid) => Some(Seqnum::from_index(txn.query_row(
                "SELECT COUNT(*) FROM `message` \
                 WHERE `mailbox_id` = ? AND `uid` < ?",
                (id, uid),
                from_single::<usize>,
            )?)),
        };

        Ok((
            mailbox,
            MailboxCounts {
                exists,
                recent,
                unseen,
            },
            first_unseen,
        ))
    }
}

/// The effect of `Connection::rename_mailbox()`.
#[derive(Debug, Clone)]
pub struct RenamedMailbox {
    /// The ID of the mailbox that was renamed (or emptied).
    pub src_id: MailboxId,
    /// The ID of the mailbox now called by the destination name.
    pub dst_id: MailboxId,
    /// The UIDs of the messages moved out of `src_id`, ascending.
    pub moved: Vec<Uid>,
}

pub(super) trait ConnectionExt {
    fn read_tx(&mut self) -> rusqlite::Result<rusqlite::Transaction<'_>>;
    fn write_tx(&mut self) -> rusqlite::Result<rusqlite::Transaction<'_>>;
    fn enable_write(&mut self, enabled: bool) -> rusqlite::Result<()>;
}

impl ConnectionExt for rusqlite::Connection {
    fn read_tx(&mut self) -> rusqlite::Result<rusqlite::Transaction<'_>> {
        self.enable_write(false)?;
        self.transaction_with_behavior(rusqlite::TransactionBehavior::Deferred)
    }

    fn write_tx(&mut self) -> rusqlite::Result<rusqlite::Transaction<'_>> {
        self.enable_write(true)?;
        self.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
    }

    #[cfg(debug_assertions)]
    fn enable_write(&mut self, enabled: bool) -> rusqlite::Result<()> {
        // PRAGMA doesn't actually support templates, so switch the whole query
        // string based on `enabled`.
        self.execute(
            if enabled {
                "PRAGMA query_only = false"
            } else {
                "PRAGMA query_only = true"
            },
            (),
        )?;
        Ok(())
    }

    #[cfg(not(debug_assertions))]
    fn enable_write(&mut self, _: bool) -> rusqlite::Result<()> {
        Ok(())
    }
}

fn create_mailbox(
    cxn: &rusqlite::Connection,
    user: UserId,
    name: &str,
) -> Result<MailboxId, Error> {
    if find_mailbox(cxn, user, name).is_ok() {
        return Err(Error::MailboxExists);
    }

    cxn.execute(
        "INSERT INTO `mailbox` (`user_id`, `name`) VALUES (?, ?)",
        (user, name),
    )?;
    Ok(MailboxId(cxn.last_insert_rowid()))
}

pub(super) fn find_mailbox(
    cxn: &rusqlite::Connection,
    user: UserId,
    name: &str,
) -> Result<MailboxId, Error> {
    cxn.prepare_cached(
        "SELECT `id` FROM `mailbox` WHERE `user_id` = ? AND `name` = ?",
    )?
    .query_row((user, name), from_single)
    .optional()?
    .ok_or(Error::NxMailbox)
}

pub(super) fn fetch_mailbox(
    cxn: &rusqlite::Connection,
    id: MailboxId,
) -> Result<MailboxRow, Error> {
    cxn.prepare_cached("SELECT * FROM `mailbox` WHERE `id` = ?")?
        .query_row((id,), from_row)
        .optional()?
        .ok_or(Error::NxMailbox)
}

#[cfg(test)]
pub(super) struct TestFixture {
    _root: tempfile::TempDir,
    pub(super) cxn: Connection,
    pub(super) user: UserId,
}

#[cfg(test)]
impl TestFixture {
    pub(super) fn new() -> Self {
        crate::init_test_log();

        let root = tempfile::TempDir::new().unwrap();
        let mut cxn = Connection::new(
            &LogPrefix::new("metadb".to_owned()),
            &root.path().join("store.sqlite"),
            &StoreConfig::default(),
        )
        .unwrap();
        let user = cxn.create_user("alice", &["INBOX"]).unwrap();

        Self {
            _root: root,
            cxn,
            user,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn user_crud() {
        let mut fixture = TestFixture::new();

        assert_matches!(
            Err(Error::UserExists),
            fixture.cxn.create_user("alice", &[])
        );
        let bob = fixture.cxn.create_user("bob", &[]).unwrap();
        assert_eq!(bob, fixture.cxn.find_user("bob").unwrap());
        assert_eq!(fixture.user, fixture.cxn.find_user("alice").unwrap());
        assert_matches!(Err(Error::NxUser), fixture.cxn.find_user("carol"));
        assert_eq!(
            vec!["alice".to_owned(), "bob".to_owned()],
            fixture.cxn.list_users().unwrap()
        );

        fixture.cxn.delete_user("alice").unwrap();
        assert_matches!(Err(Error::NxUser), fixture.cxn.delete_user("alice"));
        assert_eq!(vec!["bob".to_owned()], fixture.cxn.list_users().unwrap());

        // Cascade
        assert_matches!(
            Err(Error::NxMailbox),
            fixture.cxn.find_mailbox(fixture.user, "INBOX")
        );
    }

    #[test]
    fn mailbox_crud() {
        let mut fixture = TestFixture::new();
        let user = fixture.user;

        let foo = fixture.cxn.create_mailbox(user, "foo").unwrap();
        assert_matches!(
            Err(Error::MailboxExists),
            fixture.cxn.create_mailbox(user, "foo")
        );
        assert_eq!(foo, fixture.cxn.find_mailbox(user, "foo").unwrap());

        let row = fixture.cxn.fetch_mailbox(foo).unwrap();
        assert_eq!("foo", row.name);
        assert_eq!(Uid::MIN, row.next_uid);
        assert_eq!(Uid::MIN, row.recent_uid);
        assert!(!row.subscribed);

        fixture.cxn.set_subscribed(user, "foo", true).unwrap();
        assert_eq!(
            vec![MailboxListing {
                name: "foo".to_owned(),
                subscribed: true,
            }],
            fixture.cxn.list_mailboxes(user, true).unwrap()
        );
        assert_eq!(2, fixture.cxn.list_mailboxes(user, false).unwrap().len());
        assert_matches!(
            Err(Error::NxMailbox),
            fixture.cxn.set_subscribed(user, "bar", true)
        );

        assert_eq!(foo, fixture.cxn.delete_mailbox(user, "foo").unwrap());
        assert_matches!(
            Err(Error::NxMailbox),
            fixture.cxn.delete_mailbox(user, "foo")
        );

        // Re-creating the name yields a new UID validity.
        let foo2 = fixture.cxn.create_mailbox(user, "foo").unwrap();
        assert_ne!(foo, foo2);
        assert!(
            foo2.as_uid_validity().unwrap() > foo.as_uid_validity().unwrap()
        );
    }

    #[test]
    fn rename_keeps_identity() {
        let mut fixture = TestFixture::new();
        let user = fixture.user;

        let foo = fixture.cxn.create_mailbox(user, "foo").unwrap();
        fixture.cxn.create_mailbox(user, "bar").unwrap();

        assert_matches!(
            Err(Error::RenameToSelf),
            fixture.cxn.rename_mailbox(user, "foo", "foo", "INBOX")
        );
        assert_matches!(
            Err(Error::MailboxExists),
            fixture.cxn.rename_mailbox(user, "foo", "bar", "INBOX")
        );
        assert_matches!(
            Err(Error::NxMailbox),
            fixture.cxn.rename_mailbox(user, "nx", "baz", "INBOX")
        );

        let renamed =
            fixture.cxn.rename_mailbox(user, "foo", "baz", "INBOX").unwrap();
        assert_eq!(foo, renamed.src_id);
        assert_eq!(foo, renamed.dst_id);
        assert!(renamed.moved.is_empty());
        assert_eq!(foo, fixture.cxn.find_mailbox(user, "baz").unwrap());
        assert_matches!(
            Err(Error::NxMailbox),
            fixture.cxn.find_mailbox(user, "foo")
        );

        // A mailbox created under the old name is a different mailbox.
        let new_foo = fixture.cxn.create_mailbox(user, "foo").unwrap();
        assert_ne!(foo, new_foo);
    }
}
