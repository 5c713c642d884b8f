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

use std::collections::BTreeMap;
use std::convert::{TryFrom, TryInto};
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroU32;
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::str::FromStr;

use chrono::prelude::*;

use crate::mime::envelope::Envelope;
use crate::support::error::Error;

/// Uniquely identifies a message within a single mailbox.
///
/// UIDs start at 1 and increase monotonically as messages are added to the
/// mailbox. UIDs are never reused, not even after the message holding one is
/// expunged.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub NonZeroU32);

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Uid({})", self.0.get())
    }
}

// This isn't a useful default implementation, but is here so that things
// containing SeqRange<ID> can still derive Default.
impl Default for Uid {
    fn default() -> Self {
        Uid::MIN
    }
}

impl Uid {
    pub const MIN: Self = Uid(NonZeroU32::MIN);
    pub const MAX: Self = Uid(NonZeroU32::MAX);

    pub fn of(uid: u32) -> Option<Self> {
        NonZeroU32::new(uid).map(Uid)
    }

    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Uid)
    }

    #[cfg(test)]
    pub fn u(uid: u32) -> Self {
        Uid::of(uid).unwrap()
    }
}

impl TryFrom<u32> for Uid {
    type Error = ();

    fn try_from(v: u32) -> Result<Self, ()> {
        Self::of(v).ok_or(())
    }
}

impl From<Uid> for u32 {
    fn from(uid: Uid) -> u32 {
        uid.0.get()
    }
}

/// The sequence number of a message.
///
/// This is one plus the number of messages with a lesser UID in the session's
/// current view of the mailbox. It is never stored; every handle derives it
/// from its own UID-ordered snapshot, which only shifts when the handle polls.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seqnum(pub NonZeroU32);

// This isn't a useful default implementation, but is here so that things
// containing SeqRange<ID> can still derive Default.
impl Default for Seqnum {
    fn default() -> Self {
        Seqnum::MIN
    }
}

impl Seqnum {
    pub const MIN: Self = Seqnum(NonZeroU32::MIN);

    pub fn of(seqnum: u32) -> Option<Self> {
        NonZeroU32::new(seqnum).map(Seqnum)
    }

    #[cfg(test)]
    pub fn u(seqnum: u32) -> Self {
        Seqnum::of(seqnum).unwrap()
    }

    pub fn to_index(self) -> usize {
        self.0.get() as usize - 1
    }

    pub fn from_index(ix: usize) -> Self {
        Seqnum::of((ix + 1).try_into().unwrap()).unwrap()
    }
}

impl TryFrom<u32> for Seqnum {
    type Error = ();

    fn try_from(v: u32) -> Result<Self, ()> {
        Self::of(v).ok_or(())
    }
}

impl From<Seqnum> for u32 {
    fn from(seqnum: Seqnum) -> u32 {
        seqnum.0.get()
    }
}

impl fmt::Debug for Seqnum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Seqnum({})", self.0.get())
    }
}

/// A "sequence set range" of sequence numbers or UIDs.
///
/// Internally, this is maintained as a minimal sorted set of inclusive ranges.
/// It does not maintain information on the original fragmentation, ordering,
/// or duplication.
///
/// There is no support for removal.
///
/// The `Display` format puts this into minimal IMAP wire format. Note that
/// IMAP does not have a way to represent an empty sequence set. `Display`
/// produces an empty string in that case, which is invalid.
#[derive(Clone, PartialEq, Eq)]
pub struct SeqRange<T> {
    parts: BTreeMap<u32, u32>,
    _t: PhantomData<T>,
}

impl<T> SeqRange<T> {
    /// Create a new, empty range.
    pub fn new() -> Self {
        SeqRange {
            parts: BTreeMap::new(),
            _t: PhantomData,
        }
    }

    /// Return whether this range is empty (invalid for IMAP wire format).
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    fn insert_raw(&mut self, start_incl: u32, mut end_incl: u32) {
        // If this range overlaps any later ranges, fuse them.
        loop {
            let following = self
                .parts
                .range((Excluded(start_incl), Unbounded))
                .next()
                .map(|(&start, &end)| (start, end));

            if let Some((following_start, following_end)) = following {
                if following_start - 1 <= end_incl {
                    end_incl = end_incl.max(following_end);
                    self.parts.remove(&following_start);
                    continue;
                }
            }

            break;
        }

        let preceding = self
            .parts
            .range((Unbounded, Included(end_incl)))
            .next_back()
            .map(|(&start, &end)| (start, end));
        if let Some((preceding_start, preceding_end)) = preceding {
            if preceding_end.saturating_add(1) >= start_incl {
                // Overlap with the new range
                if start_incl < preceding_start {
                    self.parts.remove(&preceding_start);
                    self.parts.insert(start_incl, end_incl.max(preceding_end));
                } else {
                    self.parts
                        .insert(preceding_start, end_incl.max(preceding_end));
                }
                return;
            }
        }

        // No overlap
        self.parts.insert(start_incl, end_incl);
    }
}

impl<T: TryFrom<u32> + Into<u32> + PartialOrd> SeqRange<T> {
    /// Create a range containing just the given item.
    pub fn just(item: T) -> Self {
        let mut this = SeqRange::new();
        this.append(item);
        this
    }

    /// Append a single item to this range.
    ///
    /// The item must be strictly greater than all other items already
    /// inserted.
    pub fn append(&mut self, item: T) {
        let item: u32 = item.into();

        if let Some(end) = self.parts.values_mut().next_back() {
            assert!(item > *end);

            if item == *end + 1 {
                *end = item;
                return;
            }
        }

        self.parts.insert(item, item);
    }

    /// Insert the given inclusive range (which must be in the correct order)
    /// into this sequence set.
    pub fn insert(&mut self, start_incl: T, end_incl: T) {
        assert!(end_incl >= start_incl);
        self.insert_raw(start_incl.into(), end_incl.into());
    }

    /// Return whether the given item is present in this set.
    pub fn contains(&self, v: T) -> bool {
        let v: u32 = v.into();
        self.parts
            .range(..=v)
            .next_back()
            .filter(|&(_, &end)| end >= v)
            .is_some()
    }

    /// Return an iterator to the items in this set.
    ///
    /// Invalid items and items greater than `max` are silently excluded.
    ///
    /// Items are delivered in strictly ascending order.
    pub fn items(&self, max: impl Into<u32>) -> impl Iterator<Item = T> + '_ {
        let max: u32 = max.into();
        self.parts
            .iter()
            .map(|(&start, &end)| (start, end))
            .filter(move |&(start, _)| start <= max)
            .flat_map(move |(start, end)| start..=end.min(max))
            .filter_map(|v| T::try_from(v).ok())
    }

    /// Return the total size of the sequence set.
    pub fn len(&self) -> usize {
        self.parts
            .iter()
            .map(|(start, end)| (end - start) as usize + 1)
            .sum()
    }
}

impl<T> fmt::Display for SeqRange<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, (&start, &end)) in self.parts.iter().enumerate() {
            let delim = if 0 == ix { "" } else { "," };

            if start == end {
                write!(f, "{}{}", delim, start)?;
            } else {
                write!(f, "{}{}:{}", delim, start, end)?;
            }
        }

        Ok(())
    }
}

impl fmt::Debug for SeqRange<Seqnum> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[Seqnum {}]", self)
    }
}

impl fmt::Debug for SeqRange<Uid> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[Uid {}]", self)
    }
}

impl<T> Default for SeqRange<T> {
    fn default() -> Self {
        SeqRange::new()
    }
}

/// A sequence set as the client sent it, before `*` has been given meaning.
///
/// `*` stands for the greatest sequence number or UID currently in use, which
/// depends on which of the two the set is interpreted as and on the state of
/// the session at the time it is used. `resolve()` produces the concrete
/// `SeqRange` once that is known.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeqSet {
    /// Inclusive endpoints, in the order sent. `None` is `*`.
    parts: Vec<(Option<u32>, Option<u32>)>,
}

impl SeqSet {
    /// The set `1:*`.
    pub fn all() -> Self {
        SeqSet {
            parts: vec![(Some(1), None)],
        }
    }

    /// The set containing only `n`.
    pub fn just(n: u32) -> Self {
        SeqSet {
            parts: vec![(Some(n), Some(n))],
        }
    }

    /// Parse the IMAP-format of the sequence set.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        fn do_parse(r: &str) -> Option<Option<u32>> {
            if "*" == r {
                Some(None)
            } else {
                r.parse().ok().filter(|&v| v != 0).map(Some)
            }
        }

        let bad = || Error::BadSequenceSet(raw.to_owned());

        let mut parts = Vec::new();
        for part in raw.split(',') {
            let mut subs = part.split(':');
            match (subs.next(), subs.next(), subs.next()) {
                (Some(only), None, None) => {
                    let only = do_parse(only).ok_or_else(bad)?;
                    parts.push((only, only));
                },
                (Some(start), Some(end), None) => {
                    let start = do_parse(start).ok_or_else(bad)?;
                    let end = do_parse(end).ok_or_else(bad)?;
                    parts.push((start, end));
                },
                _ => return Err(bad()),
            }
        }

        Ok(SeqSet { parts })
    }

    /// Resolve this set against a session in which `max` is the greatest
    /// sequence number or UID in use (0 if there are none).
    ///
    /// RFC 3501 allows the endpoints to be in either order, so `5:*` still
    /// includes `max` even when `max` is less than 5.
    pub fn resolve<T>(&self, max: u32) -> SeqRange<T> {
        let mut range = SeqRange::new();
        for &(start, end) in &self.parts {
            let start = start.unwrap_or(max);
            let end = end.unwrap_or(max);
            range.insert_raw(start.min(end), start.max(end));
        }
        range
    }
}

impl FromStr for SeqSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        SeqSet::parse(s)
    }
}

/// A message flag.
///
/// System flags are represented as top-level enum values. Keywords are in the
/// `Keyword` case.
///
/// The `Display` format of this type is the exact string value that would be
/// sent over the wire. `FromStr` does the reverse conversion, and also
/// understands non-standard casing of the system flags.
///
/// `\Recent` is not represented by this enum since it isn't _really_ a flag.
/// It is derived per session and never stored.
#[derive(Clone)]
pub enum Flag {
    Answered,
    Deleted,
    Draft,
    Flagged,
    Seen,
    Keyword(String),
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Flag::Answered => write!(f, "\\Answered"),
            Flag::Deleted => write!(f, "\\Deleted"),
            Flag::Draft => write!(f, "\\Draft"),
            Flag::Flagged => write!(f, "\\Flagged"),
            Flag::Seen => write!(f, "\\Seen"),
            Flag::Keyword(ref kw) => write!(f, "{}", kw),
        }
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        <Flag as fmt::Display>::fmt(self, f)
    }
}

impl FromStr for Flag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if s.eq_ignore_ascii_case("\\answered") {
            Ok(Flag::Answered)
        } else if s.eq_ignore_ascii_case("\\deleted") {
            Ok(Flag::Deleted)
        } else if s.eq_ignore_ascii_case("\\draft") {
            Ok(Flag::Draft)
        } else if s.eq_ignore_ascii_case("\\flagged") {
            Ok(Flag::Flagged)
        } else if s.eq_ignore_ascii_case("\\seen") {
            Ok(Flag::Seen)
        } else if s.starts_with('\\') {
            Err(Error::NxFlag)
        } else if !s.is_empty()
            && s.as_bytes().iter().copied().all(is_atom_char)
        {
            Ok(Flag::Keyword(s.to_owned()))
        } else {
            Err(Error::UnsafeName)
        }
    }
}

impl Flag {
    /// Whether `s` names the `\Recent` pseudo-flag.
    pub fn is_recent(s: &str) -> bool {
        s.eq_ignore_ascii_case("\\recent")
    }
}

fn is_atom_char(ch: u8) -> bool {
    !matches!(
        ch,
        0..=b' '
            | 127..=255
            | b'(' | b')' | b'{' | b'*' | b'%' | b'\\' | b'"' | b']'
    )
}

impl PartialEq for Flag {
    fn eq(&self, other: &Flag) -> bool {
        match (self, other) {
            (&Flag::Answered, &Flag::Answered) => true,
            (&Flag::Deleted, &Flag::Deleted) => true,
            (&Flag::Draft, &Flag::Draft) => true,
            (&Flag::Flagged, &Flag::Flagged) => true,
            (&Flag::Seen, &Flag::Seen) => true,
            // Keywords are compared case-insensitively, matching the
            // `NOCASE` collation of the flag table.
            (&Flag::Keyword(ref a), &Flag::Keyword(ref b)) => {
                a.eq_ignore_ascii_case(b)
            },
            _ => false,
        }
    }
}

impl Eq for Flag {}

/// How `Mailbox::update_messages_flags()` combines the given flags with those
/// already on each message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagOp {
    /// `+FLAGS`
    Add,
    /// `-FLAGS`
    Remove,
    /// `FLAGS`
    Set,
}

/// Status of a mailbox, as reported by `SELECT`, `EXAMINE`, and `STATUS`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxInfo {
    /// The name of the mailbox.
    pub name: String,
    /// The number of messages that currently exist.
    /// `* exists EXISTS`
    pub exists: usize,
    /// The number of messages with the `\Recent` pseudo-flag.
    /// `* recent RECENT`
    pub recent: usize,
    /// The number of messages without the `\Seen` flag.
    pub unseen: usize,
    /// The sequence number of the first message without the `\Seen` flag.
    /// `None` if all messages are seen.
    /// `* OK [UNSEEN first_unseen]`
    pub first_unseen: Option<Seqnum>,
    /// The next UID to be assigned.
    /// `* OK [UIDNEXT uid_next]`
    pub uid_next: Uid,
    /// The current UID validity.
    /// `* OK [UIDVALIDITY uid_validity]`
    pub uid_validity: u32,
    /// Whether the mailbox is read-only.
    /// `TAG OK [READ-WRITE|READ-ONLY]`
    pub read_only: bool,
}

/// One entry of a `LIST` or `LSUB` response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxListing {
    pub name: String,
    pub subscribed: bool,
}

/// New counts for a mailbox whose size has changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MailboxStatusUpdate {
    /// `* exists EXISTS`
    pub exists: usize,
    /// `* recent RECENT`
    pub recent: usize,
}

/// An unsolicited notification for a session, delivered through its
/// `UpdateSink` when the session polls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Update {
    /// The mailbox gained messages.
    Mailbox(MailboxStatusUpdate),
    /// The message at this sequence number was expunged. Sequence numbers
    /// above it shift down by one before the next update is applied.
    Expunge(Seqnum),
    /// The flags of a message changed.
    /// `* seqnum FETCH (UID uid FLAGS (flags...))`
    Message {
        seqnum: Seqnum,
        uid: Uid,
        flags: Vec<Flag>,
        recent: bool,
    },
}

/// Receives the updates for one mailbox handle.
pub trait UpdateSink: Send {
    fn send_update(&mut self, update: Update) -> Result<(), Error>;
}

/// Criteria for `SEARCH` and `UID SEARCH`.
///
/// Every populated field must match for a message to be a hit; `not` and `or`
/// nest further criteria to build arbitrary boolean trees. The default value
/// matches every message.
#[derive(Clone, Debug, Default)]
pub struct SearchCriteria {
    /// Sequence numbers in the session's current view.
    pub seq_num: Option<SeqSet>,
    pub uid: Option<SeqSet>,
    /// Internal date on or after this day.
    pub since: Option<NaiveDate>,
    /// Internal date before this day.
    pub before: Option<NaiveDate>,
    /// `Date` header on or after this day.
    pub sent_since: Option<NaiveDate>,
    /// `Date` header before this day.
    pub sent_before: Option<NaiveDate>,
    /// `(field, substring)` pairs. An empty substring only requires the field
    /// to be present.
    pub header: Vec<(String, String)>,
    /// Substrings of the message body.
    pub body: Vec<String>,
    /// Substrings of either the header or the body.
    pub text: Vec<String>,
    pub with_flags: Vec<String>,
    pub without_flags: Vec<String>,
    /// RFC822.SIZE strictly greater than this.
    pub larger: Option<u32>,
    /// RFC822.SIZE strictly less than this.
    pub smaller: Option<u32>,
    /// Each of these must *not* match.
    pub not: Vec<SearchCriteria>,
    /// At least one of each pair must match.
    pub or: Vec<(SearchCriteria, SearchCriteria)>,
}

/// An item requested by `FETCH`.
///
/// `FromStr` and `Display` convert to and from the wire syntax; see
/// `fetch_item.rs`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FetchItem {
    Uid,
    Flags,
    InternalDate,
    Rfc822Size,
    Envelope,
    Body(BodySection),
    /// Equivalent to `BODY[]`.
    Rfc822,
    /// Equivalent to `BODY.PEEK[HEADER]`.
    Rfc822Header,
    /// Equivalent to `BODY[TEXT]`.
    Rfc822Text,
}

/// A `BODY[...]` or `BODY.PEEK[...]` fetch item.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BodySection {
    pub spec: SectionSpec,
    /// If false, fetching the section sets `\Seen`.
    pub peek: bool,
    /// `<offset.length>`
    pub partial: Option<(u32, u32)>,
}

/// The part of the message a `BodySection` selects.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SectionSpec {
    /// `BODY[]`
    Full,
    /// `BODY[HEADER]`, including the blank line ending the header.
    Header,
    /// `BODY[TEXT]`
    Text,
    /// `BODY[HEADER.FIELDS (names...)]`
    HeaderFields(Vec<String>),
    /// `BODY[HEADER.FIELDS.NOT (names...)]`
    HeaderFieldsNot(Vec<String>),
}

impl FetchItem {
    /// Return the section this item retrieves, if it retrieves message
    /// content at all.
    pub fn section(&self) -> Option<(SectionSpec, Option<(u32, u32)>)> {
        match *self {
            FetchItem::Body(ref body) => {
                Some((body.spec.clone(), body.partial))
            },
            FetchItem::Rfc822 => Some((SectionSpec::Full, None)),
            FetchItem::Rfc822Header => Some((SectionSpec::Header, None)),
            FetchItem::Rfc822Text => Some((SectionSpec::Text, None)),
            _ => None,
        }
    }

    /// Whether fetching this item implicitly sets `\Seen`.
    pub fn sets_seen(&self) -> bool {
        match *self {
            FetchItem::Body(ref body) => !body.peek,
            FetchItem::Rfc822 | FetchItem::Rfc822Text => true,
            _ => false,
        }
    }
}

/// One requested item of a fetched message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchedItem {
    Uid(Uid),
    Flags { flags: Vec<Flag>, recent: bool },
    InternalDate(DateTime<Utc>),
    Rfc822Size(u32),
    Envelope(Envelope),
    /// The content of a section, labelled with the item that requested it.
    Section(FetchItem, Vec<u8>),
}

/// The response for one message of a `FETCH`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedMessage {
    pub seqnum: Seqnum,
    pub uid: Uid,
    /// One entry per requested item, in request order.
    pub items: Vec<FetchedItem>,
}

impl FetchedMessage {
    /// Iterate the section items of this message.
    pub fn sections(&self) -> impl Iterator<Item = (&FetchItem, &[u8])> {
        self.items.iter().filter_map(|item| match *item {
            FetchedItem::Section(ref name, ref data) => Some((name, &data[..])),
            _ => None,
        })
    }

    /// Return the envelope of this message, if one was requested.
    pub fn envelope(&self) -> Option<&Envelope> {
        self.items.iter().find_map(|item| match *item {
            FetchedItem::Envelope(ref envelope) => Some(envelope),
            _ => None,
        })
    }
}
