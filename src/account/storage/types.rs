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

//! Bindings for our model types to `rusqlite`, plus model types specific to
//! the database itself.

use std::convert::TryFrom;
use std::str::FromStr;

use chrono::prelude::*;
use rusqlite::types::{
    FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef,
};

use crate::{account::model::*, support::error::Error};

macro_rules! transparent_to_sql {
    ($t:ident) => {
        impl ToSql for $t {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                self.0.to_sql()
            }
        }
    };
}

macro_rules! transparent_from_sql {
    ($t:ident) => {
        impl FromSql for $t {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                FromSql::column_result(value).map(Self)
            }
        }
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(pub i64);
transparent_to_sql!(UserId);
transparent_from_sql!(UserId);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MailboxId(pub i64);
transparent_to_sql!(MailboxId);
transparent_from_sql!(MailboxId);

impl MailboxId {
    /// The UID validity of a mailbox is its row ID.
    ///
    /// Row IDs are allocated with `AUTOINCREMENT`, so a mailbox created under
    /// a name that was used before always gets a fresh value.
    pub fn as_uid_validity(self) -> Result<u32, Error> {
        u32::try_from(self.0)
            .ok()
            .filter(|&u| u != 0)
            .ok_or(Error::MailboxFull)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub i64);
transparent_to_sql!(MessageId);
transparent_from_sql!(MessageId);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnixTimestamp(pub DateTime<Utc>);

impl UnixTimestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl ToSql for UnixTimestamp {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let ToSqlOutput::Owned(v) = self.0.timestamp().to_sql()? else {
            unreachable!()
        };
        Ok(ToSqlOutput::Owned(v))
    }
}

impl FromSql for UnixTimestamp {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let inner = i64::column_result(value)?;
        DateTime::<Utc>::from_timestamp(inner, 0)
            .ok_or(FromSqlError::OutOfRange(inner))
            .map(Self)
    }
}

impl ToSql for Uid {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let ToSqlOutput::Owned(v) = u32::from(*self).to_sql()? else {
            unreachable!()
        };
        Ok(ToSqlOutput::Owned(v))
    }
}

impl FromSql for Uid {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let inner = u32::column_result(value)?;
        Self::of(inner).ok_or(FromSqlError::OutOfRange(inner as i64))
    }
}

impl ToSql for Flag {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Flag {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let as_str = value.as_str()?;
        Self::from_str(as_str).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// A row of the `mailbox` table.
#[derive(Debug, Clone)]
pub struct MailboxRow {
    pub id: MailboxId,
    pub name: String,
    pub next_uid: Uid,
    /// Messages with a UID at or above this are `\Recent` to the next
    /// read-write session to select the mailbox.
    pub recent_uid: Uid,
    pub subscribed: bool,
}

impl FromRow for MailboxRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            next_uid: row.get("next_uid")?,
            recent_uid: row.get("recent_uid")?,
            subscribed: row.get("subscribed")?,
        })
    }
}

/// Counts over the messages of one mailbox, as reported by `STATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxCounts {
    pub exists: usize,
    pub recent: usize,
    pub unseen: usize,
}

/// Everything stored about a single message.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: MessageId,
    pub uid: Uid,
    pub internal_date: UnixTimestamp,
    pub size: u32,
    /// The header block, including the blank line that ends it.
    pub header: Vec<u8>,
    pub body: Vec<u8>,
}

impl FromRow for RawMessage {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            uid: row.get("uid")?,
            internal_date: row.get("internal_date")?,
            size: row.get("size")?,
            header: row.get("header")?,
            body: row.get("body")?,
        })
    }
}

/// A message to be inserted into a mailbox.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub internal_date: UnixTimestamp,
    pub header: &'a [u8],
    pub body: &'a [u8],
    pub flags: &'a [Flag],
}

/// The state a session starts out with when it selects a mailbox.
#[derive(Debug, Clone)]
pub struct InitialSnapshot {
    pub uid_validity: u32,
    pub next_uid: Uid,
    /// Every message in the mailbox, in ascending UID order, with whether it
    /// is `\Recent` to this session.
    pub messages: Vec<(Uid, bool)>,
}

pub fn from_row<T: FromRow>(row: &rusqlite::Row<'_>) -> rusqlite::Result<T> {
    T::from_row(row)
}

pub fn from_single<T: FromSql>(row: &rusqlite::Row<'_>) -> rusqlite::Result<T> {
    row.get(0)
}

pub trait FromRow: Sized {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self>;
}

macro_rules! from_row_tuple {
    ($($ix:tt: $t:ident),*) => {
        impl<$($t: FromSql,)*> FromRow for ($($t,)*) {
            fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
                Ok(($(row.get::<_, $t>($ix)?,)*))
            }
        }
    };
}

from_row_tuple!(0: A, 1: B);
from_row_tuple!(0: A, 1: B, 2: C);
from_row_tuple!(0: A, 1: B, 2: C, 3: D);
