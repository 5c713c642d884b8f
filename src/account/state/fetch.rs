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

use log::warn;

use super::defs::*;
use super::dispatch::Event;
use crate::{
    account::model::*, mime::cache::HeaderCache, support::error::Error,
};

impl Mailbox {
    /// Retrieves the requested items of each message identified by `ids`
    /// (`FETCH` / `UID FETCH`), passing one `FetchedMessage` per message to
    /// `out` in ascending sequence-number order.
    ///
    /// Items are reported in the order they were requested. If the handle is
    /// writable and any item is a non-peek body section, `\Seen` is added to
    /// the messages first, so the reported flags already include it.
    ///
    /// Messages expunged by another session since the last poll are skipped.
    pub fn list_messages(
        &mut self,
        use_uid: bool,
        ids: &SeqSet,
        items: &[FetchItem],
        out: &mut dyn FnMut(FetchedMessage),
    ) -> Result<(), Error> {
        self.subscription()?;
        let uids = self.resolve_ids(use_uid, ids);
        if uids.is_empty() {
            return Ok(());
        }

        if self.writable && items.iter().any(FetchItem::sets_seen) {
            self.mark_seen(&uids)?;
        }

        for uid in uids {
            let Some(ix) = self.uid_index(uid) else {
                continue;
            };
            let Some(message) = self.metadb.fetch_message(self.id, uid)? else {
                warn!(
                    "{} {uid:?} vanished before it could be fetched",
                    self.log_prefix,
                );
                continue;
            };

            let mut cache = HeaderCache::new(&message.header, &message.body);
            let flags = if items.contains(&FetchItem::Flags) {
                self.metadb
                    .fetch_flags(self.id, &[uid])?
                    .pop()
                    .map(|(_, flags)| flags)
                    .unwrap_or_default()
            } else {
                Vec::new()
            };

            let mut fetched = Vec::with_capacity(items.len());
            for item in items {
                fetched.push(match *item {
                    FetchItem::Uid => FetchedItem::Uid(uid),
                    FetchItem::Flags => FetchedItem::Flags {
                        flags: flags.clone(),
                        recent: self.messages[ix].recent,
                    },
                    FetchItem::InternalDate => {
                        FetchedItem::InternalDate(message.internal_date.0)
                    },
                    FetchItem::Rfc822Size => {
                        FetchedItem::Rfc822Size(message.size)
                    },
                    FetchItem::Envelope => {
                        FetchedItem::Envelope(cache.envelope().clone())
                    },
                    _ => {
                        let Some((spec, partial)) = item.section() else {
                            continue;
                        };
                        let data = cache.section(&spec);
                        let data = apply_partial(data, partial).to_vec();
                        FetchedItem::Section(item.clone(), data)
                    },
                });
            }

            out(FetchedMessage {
                seqnum: Seqnum::from_index(ix),
                uid,
                items: fetched,
            });
        }

        Ok(())
    }

    fn mark_seen(&mut self, uids: &[Uid]) -> Result<(), Error> {
        let id = self.id;
        self.shared.dispatcher.publish(
            id,
            self.subscription.as_ref(),
            || {
                let changed = self.metadb.modify_flags(
                    id,
                    uids,
                    FlagOp::Add,
                    &[Flag::Seen],
                )?;
                let events =
                    changed.into_iter().map(Event::FlagsChanged).collect();
                Ok(((), events))
            },
        )
    }
}

/// Slices `<offset.length>` out of `data`, clamping both ends to the data.
fn apply_partial(data: &[u8], partial: Option<(u32, u32)>) -> &[u8] {
    let Some((offset, length)) = partial else {
        return data;
    };

    let start = (offset as usize).min(data.len());
    let end = start.saturating_add(length as usize).min(data.len());
    &data[start..end]
}

#[cfg(test)]
mod test {
    use super::*;

    fn fetch(
        mailbox: &mut Mailbox,
        ids: &str,
        items: &str,
    ) -> Vec<FetchedMessage> {
        let mut fetched = Vec::new();
        mailbox
            .list_messages(
                false,
                &SeqSet::parse(ids).unwrap(),
                &FetchItem::parse_list(items).unwrap(),
                &mut |m: FetchedMessage| fetched.push(m),
            )
            .unwrap();
        fetched
    }

    fn sections(message: &FetchedMessage) -> Vec<&[u8]> {
        message.sections().map(|(_, data)| data).collect()
    }

    const TEST_HEADER: &[u8] = b"From: <foxcpp@foxcpp.dev>\r\n\
Subject: Hello!\r\n\
Content-Type: text/plain; charset=ascii\r\n\
Non-Cached-Header: 1\r\n\
\r\n";
    const TEST_BODY: &[u8] = b"Hello!\r\n";

    #[test]
    fn header_in_multiple_body_fetch() {
        let mut fixture = TestFixture::new();
        fixture.append("INBOX", &[], None);
        let (_, mut mailbox, _) = fixture.open("INBOX", true);

        let fetched =
            fetch(&mut mailbox, "1", "(BODY.PEEK[TEXT] BODY.PEEK[TEXT])");
        assert_eq!(1, fetched.len());
        assert_eq!(vec![TEST_BODY, TEST_BODY], sections(&fetched[0]));

        let fetched =
            fetch(&mut mailbox, "1", "(BODY.PEEK[HEADER] BODY.PEEK[TEXT])");
        assert_eq!(vec![TEST_HEADER, TEST_BODY], sections(&fetched[0]));

        let fetched = fetch(
            &mut mailbox,
            "1",
            "(BODY.PEEK[HEADER.FIELDS (Subject)] BODY.PEEK[] \
             BODY.PEEK[HEADER.FIELDS.NOT (Subject Non-Cached-Header)])",
        );
        assert_eq!(
            vec![
                &b"Subject: Hello!\r\n\r\n"[..],
                &[TEST_HEADER, TEST_BODY].concat()[..],
                &b"From: <foxcpp@foxcpp.dev>\r\n\
                   Content-Type: text/plain; charset=ascii\r\n\r\n"[..],
            ],
            sections(&fetched[0])
        );
    }

    #[test]
    fn header_cache_is_per_message() {
        let mut fixture = TestFixture::new();
        fixture.append("INBOX", &[], None);
        fixture
            .user
            .create_message(
                "INBOX",
                &[],
                chrono::Utc::now(),
                b"From: <foxcpp@foxcpp.dev>\r\n\r\nNo subject here.\r\n",
                None,
            )
            .unwrap();
        let (_, mut mailbox, _) = fixture.open("INBOX", true);

        let fetched = fetch(
            &mut mailbox,
            "1:*",
            "(ENVELOPE BODY.PEEK[HEADER.FIELDS (Subject)])",
        );
        assert_eq!(2, fetched.len());
        assert_eq!(
            Some("Hello!"),
            fetched[0].envelope().unwrap().subject.as_deref()
        );
        assert_eq!(None, fetched[1].envelope().unwrap().subject);
        assert_eq!(vec![&b"\r\n"[..]], sections(&fetched[1]));
    }

    #[test]
    fn items_in_request_order() {
        let mut fixture = TestFixture::new();
        fixture.append("INBOX", &["\\Flagged"], None);
        let (_, mut mailbox, _) = fixture.open("INBOX", true);

        let fetched = fetch(&mut mailbox, "*", "(RFC822.SIZE FLAGS UID)");
        let size = u32::try_from(TEST_HEADER.len() + TEST_BODY.len()).unwrap();
        assert_eq!(
            vec![
                FetchedItem::Rfc822Size(size),
                FetchedItem::Flags {
                    flags: vec![Flag::Flagged],
                    recent: true,
                },
                FetchedItem::Uid(Uid::u(1)),
            ],
            fetched[0].items
        );
        assert_eq!(Seqnum::u(1), fetched[0].seqnum);

        // Ids naming nothing are dropped.
        assert!(fetch(&mut mailbox, "2:5", "UID").is_empty());
    }

    #[test]
    fn partial_ranges() {
        let mut fixture = TestFixture::new();
        fixture.append("INBOX", &[], None);
        let (_, mut mailbox, _) = fixture.open("INBOX", true);

        let fetched = fetch(
            &mut mailbox,
            "1",
            "(BODY.PEEK[TEXT]<0.5> BODY.PEEK[TEXT]<3.100> \
             BODY.PEEK[TEXT]<100.5> BODY.PEEK[HEADER]<6.20>)",
        );
        assert_eq!(
            vec![
                &b"Hello"[..],
                &b"lo!\r\n"[..],
                &b""[..],
                &TEST_HEADER[6..26],
            ],
            sections(&fetched[0])
        );
    }

    #[test]
    fn non_peek_fetch_sets_seen() {
        let mut fixture = TestFixture::new();
        fixture.append("INBOX", &[], None);
        fixture.append("INBOX", &[], None);

        let (_, mut examined, examined_sink) = fixture.open("INBOX", true);
        let (_, mut a, a_sink) = fixture.open("INBOX", false);
        let (_, mut b, b_sink) = fixture.open("INBOX", false);

        // Read-only handles never set \Seen.
        fetch(&mut examined, "1", "RFC822");
        assert_eq!(2, a.info().unwrap().unseen);

        // Peeking does not either.
        fetch(&mut a, "1", "(BODY.PEEK[] RFC822.HEADER)");
        assert_eq!(2, a.info().unwrap().unseen);

        let fetched = fetch(&mut a, "2", "(FLAGS BODY[TEXT])");
        assert_eq!(
            FetchedItem::Flags {
                flags: vec![Flag::Seen],
                recent: true,
            },
            fetched[0].items[0]
        );
        assert_eq!(1, a.info().unwrap().unseen);

        a.poll(true).unwrap();
        assert!(a_sink.take().is_empty());
        b.poll(true).unwrap();
        assert_eq!(
            vec![Update::Message {
                seqnum: Seqnum::u(2),
                uid: Uid::u(2),
                flags: vec![Flag::Seen],
                recent: false,
            }],
            b_sink.take()
        );
        examined.poll(true).unwrap();
        assert_eq!(1, examined_sink.take().len());

        // Already seen, so nothing further is reported.
        fetch(&mut a, "2", "RFC822.TEXT");
        b.poll(true).unwrap();
        assert!(b_sink.take().is_empty());
    }

    #[test]
    fn apply_partial_clamps() {
        assert_eq!(b"abc", apply_partial(b"abc", None));
        assert_eq!(b"b", apply_partial(b"abc", Some((1, 1))));
        assert_eq!(b"bc", apply_partial(b"abc", Some((1, u32::MAX))));
        assert_eq!(b"", apply_partial(b"abc", Some((5, 1))));
    }
}
