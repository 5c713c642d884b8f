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

use std::convert::TryFrom;

use log::warn;
use rusqlite::OptionalExtension as _;

use super::metadb::{fetch_mailbox, Connection, ConnectionExt as _};
use super::types::*;
use crate::{account::model::*, support::error::Error};

impl Connection {
    /// Adds a message to `mailbox`, returning the UID it was assigned.
    ///
    /// The UID is allocated in the same transaction that inserts the message,
    /// so concurrent appends never receive the same UID and a failed append
    /// does not consume one.
    pub fn append_message(
        &mut self,
        mailbox: MailboxId,
        message: &NewMessage<'_>,
    ) -> Result<Uid, Error> {
        let txn = self.cxn.write_tx()?;
        let row = fetch_mailbox(&txn, mailbox)?;
        let uid = row.next_uid;
        let next_uid = uid.next().ok_or(Error::MailboxFull)?;
        let size = u32::try_from(message.header.len() + message.body.len())
            .map_err(|_| Error::MalformedMessage)?;

        let id = insert_message(
            &txn,
            mailbox,
            uid,
            message.internal_date,
            size,
            message.header,
            message.body,
        )?;
        add_flags(&txn, id, message.flags)?;
        txn.execute(
            "UPDATE `mailbox` SET `next_uid` = ? WHERE `id` = ?",
            (next_uid, mailbox),
        )?;

        txn.commit()?;
        Ok(uid)
    }

    /// Snapshots the message list of `mailbox` for a new session.
    ///
    /// Messages at or above the Recent watermark are reported as `\Recent`.
    /// If `writable`, the watermark is then moved past every message, so no
    /// later session sees these messages as `\Recent`.
    pub fn select(
        &mut self,
        mailbox: MailboxId,
        writable: bool,
    ) -> Result<InitialSnapshot, Error> {
        let txn = if writable {
            self.cxn.write_tx()?
        } else {
            self.cxn.read_tx()?
        };

        let row = fetch_mailbox(&txn, mailbox)?;
        let messages = txn
            .prepare_cached(
                "SELECT `uid` FROM `message` \
                 WHERE `mailbox_id` = ? ORDER BY `uid`",
            )?
            .query_map((mailbox,), from_single::<Uid>)?
            .map(|uid| uid.map(|uid| (uid, uid >= row.recent_uid)))
            .collect::<Result<Vec<_>, _>>()?;

        if writable {
            claim_recent(&txn, &row)?;
        }
        txn.commit()?;

        Ok(InitialSnapshot {
            uid_validity: mailbox.as_uid_validity()?,
            next_uid: row.next_uid,
            messages,
        })
    }

    /// Retrieves the messages of `mailbox` whose UID is at or above
    /// `from_uid`, with their recency, along with the mailbox's current next
    /// UID.
    ///
    /// As with `select()`, a `writable` poll claims recency of what it finds.
    pub fn poll_new_messages(
        &mut self,
        mailbox: MailboxId,
        from_uid: Uid,
        writable: bool,
    ) -> Result<(Vec<(Uid, bool)>, Uid), Error> {
        let txn = if writable {
            self.cxn.write_tx()?
        } else {
            self.cxn.read_tx()?
        };

        let row = fetch_mailbox(&txn, mailbox)?;
        let messages = txn
            .prepare_cached(
                "SELECT `uid` FROM `message` \
                 WHERE `mailbox_id` = ? AND `uid` >= ? ORDER BY `uid`",
            )?
            .query_map((mailbox, from_uid), from_single::<Uid>)?
            .map(|uid| uid.map(|uid| (uid, uid >= row.recent_uid)))
            .collect::<Result<Vec<_>, _>>()?;

        if writable && !messages.is_empty() {
            claim_recent(&txn, &row)?;
        }
        txn.commit()?;

        Ok((messages, row.next_uid))
    }

    /// Loads the message with the given UID, if it still exists.
    pub fn fetch_message(
        &mut self,
        mailbox: MailboxId,
        uid: Uid,
    ) -> Result<Option<RawMessage>, Error> {
        self.cxn.enable_write(false)?;
        self.cxn
            .prepare_cached(
                "SELECT * FROM `message` WHERE `mailbox_id` = ? AND `uid` = ?",
            )?
            .query_row((mailbox, uid), from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Loads the flags of each message in `uids` that still exists.
    pub fn fetch_flags(
        &mut self,
        mailbox: MailboxId,
        uids: &[Uid],
    ) -> Result<Vec<(Uid, Vec<Flag>)>, Error> {
        let txn = self.cxn.read_tx()?;
        let mut ret = Vec::with_capacity(uids.len());
        for &uid in uids {
            let Some(id) = find_message(&txn, mailbox, uid)? else {
                continue;
            };
            ret.push((uid, message_flags(&txn, id)?));
        }
        Ok(ret)
    }

    /// Applies `op` with `flags` to every message in `uids` that still
    /// exists.
    ///
    /// Returns the UIDs of the messages whose flags actually changed.
    pub fn modify_flags(
        &mut self,
        mailbox: MailboxId,
        uids: &[Uid],
        op: FlagOp,
        flags: &[Flag],
    ) -> Result<Vec<Uid>, Error> {
        let txn = self.cxn.write_tx()?;
        let mut changed = Vec::new();

        for &uid in uids {
            let Some(id) = find_message(&txn, mailbox, uid)? else {
                continue;
            };

            let did_change = match op {
                FlagOp::Add => add_flags(&txn, id, flags)?,
                FlagOp::Remove => remove_flags(&txn, id, flags)?,
                FlagOp::Set => {
                    let current = message_flags(&txn, id)?;
                    let same = current.iter().all(|f| flags.contains(f))
                        && flags.iter().all(|f| current.contains(f));
                    if same {
                        false
                    } else {
                        txn.execute(
                            "DELETE FROM `message_flag` WHERE `message_id` = ?",
                            (id,),
                        )?;
                        add_flags(&txn, id, flags)?;
                        true
                    }
                },
            };

            if did_change {
                changed.push(uid);
            }
        }

        txn.commit()?;
        Ok(changed)
    }

    /// Copies every message in `uids` that still exists from `src` into
    /// `dst`, in UID order.
    ///
    /// Copies keep the internal date and flags of the original, and are
    /// `\Recent` in `dst` since they get fresh UIDs above its watermark.
    /// Returns `(source UID, destination UID)` for each message copied.
    pub fn copy_messages(
        &mut self,
        src: MailboxId,
        uids: &[Uid],
        dst: MailboxId,
    ) -> Result<Vec<(Uid, Uid)>, Error> {
        let txn = self.cxn.write_tx()?;
        let dst_row = fetch_mailbox(&txn, dst)?;
        let mut next_uid = dst_row.next_uid;
        let mut copied = Vec::with_capacity(uids.len());

        let mut uids = uids.to_vec();
        uids.sort_unstable();
        uids.dedup();

        for uid in uids {
            let Some(message) = txn
                .prepare_cached(
                    "SELECT * FROM `message` \
                     WHERE `mailbox_id` = ? AND `uid` = ?",
                )?
                .query_row((src, uid), from_row::<RawMessage>)
                .optional()?
            else {
                continue;
            };

            let new_uid = next_uid;
            next_uid = next_uid.next().ok_or(Error::MailboxFull)?;

            let id = insert_message(
                &txn,
                dst,
                new_uid,
                message.internal_date,
                message.size,
                &message.header,
                &message.body,
            )?;
            txn.execute(
                "INSERT INTO `message_flag` (`message_id`, `flag`) \
                 SELECT ?, `flag` FROM `message_flag` WHERE `message_id` = ?",
                (id, message.id),
            )?;
            copied.push((uid, new_uid));
        }

        txn.execute(
            "UPDATE `mailbox` SET `next_uid` = ? WHERE `id` = ?",
            (next_uid, dst),
        )?;
        txn.commit()?;
        Ok(copied)
    }

    /// Removes every message in `mailbox` that has the `\Deleted` flag.
    ///
    /// Returns the UIDs of the removed messages, ascending.
    pub fn expunge_deleted(
        &mut self,
        mailbox: MailboxId,
    ) -> Result<Vec<Uid>, Error> {
        let txn = self.cxn.write_tx()?;
        let deleted = txn
            .prepare(
                "SELECT `id`, `uid` FROM `message` \
                 WHERE `mailbox_id` = ? AND EXISTS (\
                   SELECT 1 FROM `message_flag` \
                   WHERE `message_flag`.`message_id` = `message`.`id` \
                   AND `message_flag`.`flag` = '\\Deleted'\
                 ) ORDER BY `uid`",
            )?
            .query_map((mailbox,), from_row::<(MessageId, Uid)>)?
            .collect::<Result<Vec<_>, _>>()?;

        for &(id, _) in &deleted {
            txn.execute("DELETE FROM `message` WHERE `id` = ?", (id,))?;
        }

        txn.commit()?;
        Ok(deleted.into_iter().map(|(_, uid)| uid).collect())
    }
}

fn insert_message(
    cxn: &rusqlite::Connection,
    mailbox: MailboxId,
    uid: Uid,
    internal_date: UnixTimestamp,
    size: u32,
    header: &[u8],
    body: &[u8],
) -> Result<MessageId, Error> {
    cxn.prepare_cached(
        "INSERT INTO `message` (\
           `mailbox_id`, `uid`, `internal_date`, `size`, `header`, `body`\
         ) VALUES (?, ?, ?, ?, ?, ?)",
    )?
    .execute((mailbox, uid, internal_date, size, header, body))?;
    Ok(MessageId(cxn.last_insert_rowid()))
}

fn find_message(
    cxn: &rusqlite::Connection,
    mailbox: MailboxId,
    uid: Uid,
) -> Result<Option<MessageId>, Error> {
    cxn.prepare_cached(
        "SELECT `id` FROM `message` WHERE `mailbox_id` = ? AND `uid` = ?",
    )?
    .query_row((mailbox, uid), from_single)
    .optional()
    .map_err(Into::into)
}

fn message_flags(
    cxn: &rusqlite::Connection,
    id: MessageId,
) -> Result<Vec<Flag>, Error> {
    let mut flags = Vec::new();
    let mut stmt = cxn.prepare_cached(
        "SELECT `flag` FROM `message_flag` \
         WHERE `message_id` = ? ORDER BY `flag`",
    )?;
    for flag in stmt.query_map((id,), from_single::<Flag>)? {
        match flag {
            Ok(flag) => flags.push(flag),
            // Only flags that parse are ever inserted, so this means the
            // database was edited by something else. Hide the flag rather
            // than failing the whole operation.
            Err(e) => warn!("Ignoring unparsable flag on message {id:?}: {e}"),
        }
    }
    Ok(flags)
}

/// Adds `flags` to message `id`, returning whether any was not already set.
fn add_flags(
    cxn: &rusqlite::Connection,
    id: MessageId,
    flags: &[Flag],
) -> Result<bool, Error> {
    let mut stmt = cxn.prepare_cached(
        "INSERT OR IGNORE INTO `message_flag` (`message_id`, `flag`) \
         VALUES (?, ?)",
    )?;
    let mut changed = false;
    for flag in flags {
        changed |= 0 != stmt.execute((id, flag))?;
    }
    Ok(changed)
}

/// Removes `flags` from message `id`, returning whether any had been set.
fn remove_flags(
    cxn: &rusqlite::Connection,
    id: MessageId,
    flags: &[Flag],
) -> Result<bool, Error> {
    let mut stmt = cxn.prepare_cached(
        "DELETE FROM `message_flag` WHERE `message_id` = ? AND `flag` = ?",
    )?;
    let mut changed = false;
    for flag in flags {
        changed |= 0 != stmt.execute((id, flag))?;
    }
    Ok(changed)
}

/// Moves the Recent watermark of `mailbox` past every message it holds.
fn claim_recent(
    cxn: &rusqlite::Connection,
    mailbox: &MailboxRow,
) -> Result<(), Error> {
    cxn.execute(
        "UPDATE `mailbox` SET `recent_uid` = ? WHERE `id` = ?",
        (mailbox.next_uid, mailbox.id),
    )?;
    Ok(())
}
