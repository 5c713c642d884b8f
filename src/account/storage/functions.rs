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

//! SQL functions backing the search predicates that plain SQL cannot express.
//!
//! All of these treat a search key the way IMAP wants: case-insensitively,
//! with any run of whitespace in the key matching any run of whitespace
//! (including line folding) in the message.

use std::str;

use regex::bytes::{Regex, RegexBuilder};
use rusqlite::functions::{Context, FunctionFlags};

use crate::{
    account::model::{SeqSet, Uid},
    mime::header,
};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Register the search functions on `cxn`.
///
/// - `imap_contains(haystack, key)`: whether `key` occurs in `haystack`.
/// - `imap_header_contains(header, field, key)`: whether some field of the
///   header block named `field` has a value containing `key`.
/// - `imap_sent_date(header)`: the date of the `Date` field as
///   `YYYY-MM-DD`, or NULL if there is no intelligible one.
/// - `imap_uid_in(uid, set)`: whether `uid` is in `set`, a sequence set in
///   IMAP wire format without `*`.
pub fn register(cxn: &rusqlite::Connection) -> rusqlite::Result<()> {
    let flags =
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    cxn.create_scalar_function("imap_contains", 2, flags, |ctx| {
        let key = key_regex(ctx, 1)?;
        let haystack = ctx.get_raw(0).as_bytes()?;
        Ok(key.is_match(haystack))
    })?;

    cxn.create_scalar_function("imap_header_contains", 3, flags, |ctx| {
        let key = key_regex(ctx, 2)?;
        let header_block = ctx.get_raw(0).as_bytes()?;
        let field = ctx.get_raw(1).as_str()?;
        Ok(header::fields(header_block)
            .filter(|f| f.name.eq_ignore_ascii_case(field))
            .any(|f| key.is_match(f.value)))
    })?;

    cxn.create_scalar_function("imap_sent_date", 1, flags, |ctx| {
        let header_block = ctx.get_raw(0).as_bytes()?;
        Ok(sent_date(header_block))
    })?;

    cxn.create_scalar_function("imap_uid_in", 2, flags, |ctx| {
        let set = ctx.get_or_create_aux(1, |set| -> Result<_, BoxError> {
            Ok(SeqSet::parse(set.as_str()?)?.resolve::<Uid>(0))
        })?;
        let uid = ctx.get::<u32>(0)?;
        Ok(Uid::of(uid).is_some_and(|uid| set.contains(uid)))
    })?;

    Ok(())
}

fn key_regex(
    ctx: &Context<'_>,
    arg: usize,
) -> rusqlite::Result<std::sync::Arc<Regex>> {
    ctx.get_or_create_aux(arg as i32, |key| -> Result<Regex, BoxError> {
        Ok(to_regex(key.as_str()?)?)
    })
}

fn to_regex(pat: &str) -> Result<Regex, regex::Error> {
    let mut regex_str = String::new();
    for (ix, chunk) in pat.split_whitespace().enumerate() {
        if 0 != ix {
            regex_str.push_str("[ \r\n\t]+");
        }
        regex_str.push_str(&regex::escape(chunk));
    }

    RegexBuilder::new(&regex_str).case_insensitive(true).build()
}

fn sent_date(header_block: &[u8]) -> Option<String> {
    header::fields(header_block)
        .find(|f| f.name.eq_ignore_ascii_case("Date"))
        .and_then(|f| str::from_utf8(f.value).ok())
        .and_then(header::parse_datetime)
        // RFC 3501 compares sent dates disregarding time and timezone, so
        // this is the date as written in the field.
        .map(|dt| dt.date_naive().format("%Y-%m-%d").to_string())
}
