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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No such user")]
    NxUser,
    #[error("User already exists")]
    UserExists,
    #[error("No such mailbox")]
    NxMailbox,
    #[error("Mailbox already exists")]
    MailboxExists,
    #[error("No such message")]
    NxMessage,
    #[error("Non-existent system flag")]
    NxFlag,
    #[error("Unsafe user or mailbox name")]
    UnsafeName,
    #[error("Mailbox handle already closed")]
    MailboxClosed,
    #[error("Mailbox is read-only")]
    MailboxReadOnly,
    #[error("Mailbox renamed to itself")]
    RenameToSelf,
    #[error("Operation not allowed on INBOX")]
    BadOperationOnInbox,
    #[error("UID space of mailbox exhausted")]
    MailboxFull,
    #[error("Message has no header or body")]
    MalformedMessage,
    #[error("Unrecognised fetch item: {0}")]
    BadFetchItem(String),
    #[error("Unparsable sequence set: {0}")]
    BadSequenceSet(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    BadConfig(#[from] toml::de::Error),
}

/// The broad classes of failure a caller needs to distinguish.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A user, mailbox, or message does not exist.
    NotFound,
    /// A user or mailbox of that name already exists.
    AlreadyExists,
    /// The operation is not valid on the handle in its current state.
    InvalidState,
    /// The underlying store failed, or ran out of space.
    StorageFailure,
    /// The caller passed something unparsable or unacceptable.
    MalformedInput,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::NxUser | Error::NxMailbox | Error::NxMessage => {
                ErrorKind::NotFound
            },

            Error::UserExists | Error::MailboxExists => {
                ErrorKind::AlreadyExists
            },

            Error::MailboxClosed
            | Error::MailboxReadOnly
            | Error::RenameToSelf
            | Error::BadOperationOnInbox => ErrorKind::InvalidState,

            Error::MailboxFull | Error::Io(_) | Error::Sqlite(_) => {
                ErrorKind::StorageFailure
            },

            Error::NxFlag
            | Error::UnsafeName
            | Error::MalformedMessage
            | Error::BadFetchItem(_)
            | Error::BadSequenceSet(_)
            | Error::BadConfig(_) => ErrorKind::MalformedInput,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn storage_errors_classify_as_storage_failure() {
        assert_eq!(
            ErrorKind::StorageFailure,
            Error::Sqlite(rusqlite::Error::InvalidQuery).kind(),
        );
        assert_eq!(ErrorKind::NotFound, Error::NxMailbox.kind());
        assert_eq!(ErrorKind::InvalidState, Error::MailboxClosed.kind());
        assert_eq!(ErrorKind::MalformedInput, Error::MalformedMessage.kind());
    }
}
