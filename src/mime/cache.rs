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

//! Per-message memoisation of the derived data a `FETCH` can ask for.
//!
//! One `HeaderCache` is created for each message of a listing and dropped
//! before moving on to the next, so nothing derived from one message can be
//! served for another. Within a message, entries are keyed by the kind of
//! section that produced them, so an item only ever shares work with items
//! asking for exactly the same thing.

use std::collections::HashMap;

use super::envelope::Envelope;
use super::header;
use crate::account::model::SectionSpec;

/// The sections whose content has to be computed rather than sliced out of
/// the stored message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum SectionKind {
    Full,
    Fields { names: Vec<String>, negated: bool },
}

#[derive(Debug)]
pub struct HeaderCache<'a> {
    header: &'a [u8],
    body: &'a [u8],
    sections: HashMap<SectionKind, Vec<u8>>,
    envelope: Option<Envelope>,
}

impl<'a> HeaderCache<'a> {
    pub fn new(header: &'a [u8], body: &'a [u8]) -> Self {
        HeaderCache {
            header,
            body,
            sections: HashMap::new(),
            envelope: None,
        }
    }

    /// Return the full content of the given section.
    pub fn section(&mut self, spec: &SectionSpec) -> &[u8] {
        let (header, body) = (self.header, self.body);
        let kind = match *spec {
            SectionSpec::Header => return header,
            SectionSpec::Text => return body,
            SectionSpec::Full => SectionKind::Full,
            SectionSpec::HeaderFields(ref names) => SectionKind::Fields {
                names: normalise_names(names),
                negated: false,
            },
            SectionSpec::HeaderFieldsNot(ref names) => SectionKind::Fields {
                names: normalise_names(names),
                negated: true,
            },
        };

        self.sections.entry(kind).or_insert_with_key(|kind| match *kind {
            SectionKind::Full => {
                let mut full = Vec::with_capacity(header.len() + body.len());
                full.extend_from_slice(header);
                full.extend_from_slice(body);
                full
            },
            SectionKind::Fields {
                ref names,
                negated,
            } => header::filter_fields(header, names, negated),
        })
    }

    pub fn envelope(&mut self) -> &Envelope {
        let header = self.header;
        self.envelope
            .get_or_insert_with(|| Envelope::from_header(header))
    }
}

fn normalise_names(names: &[String]) -> Vec<String> {
    let mut names = names
        .iter()
        .map(|n| n.to_ascii_lowercase())
        .collect::<Vec<_>>();
    names.sort_unstable();
    names.dedup();
    names
}

#[cfg(test)]
mod test {
    use super::*;

    const HEADER: &[u8] = b"From: <foxcpp@foxcpp.dev>\r\n\
                            Subject: Hello!\r\n\
                            \r\n";
    const BODY: &[u8] = b"Hello!\r\n";

    #[test]
    fn sections_do_not_bleed_into_each_other() {
        let mut cache = HeaderCache::new(HEADER, BODY);

        // Interleave requests so every entry has been populated before the
        // others are read again.
        assert_eq!(BODY, cache.section(&SectionSpec::Text));
        assert_eq!(HEADER, cache.section(&SectionSpec::Header));
        assert_eq!(
            [HEADER, BODY].concat(),
            cache.section(&SectionSpec::Full)
        );
        assert_eq!(
            b"Subject: Hello!\r\n\r\n",
            cache.section(&SectionSpec::HeaderFields(vec![
                "Subject".to_owned()
            ]))
        );
        assert_eq!(
            b"From: <foxcpp@foxcpp.dev>\r\n\r\n",
            cache.section(&SectionSpec::HeaderFieldsNot(vec![
                "Subject".to_owned()
            ]))
        );
        assert_eq!(Some("Hello!"), cache.envelope().subject.as_deref());

        assert_eq!(BODY, cache.section(&SectionSpec::Text));
        assert_eq!(HEADER, cache.section(&SectionSpec::Header));
        assert_eq!(
            [HEADER, BODY].concat(),
            cache.section(&SectionSpec::Full)
        );
        assert_eq!(
            b"Subject: Hello!\r\n\r\n",
            cache.section(&SectionSpec::HeaderFields(vec![
                "SUBJECT".to_owned(),
                "subject".to_owned(),
            ]))
        );
    }

    #[test]
    fn equivalent_field_lists_share_an_entry() {
        let mut cache = HeaderCache::new(HEADER, BODY);
        cache.section(&SectionSpec::HeaderFields(vec![
            "From".to_owned(),
            "Subject".to_owned(),
        ]));
        cache.section(&SectionSpec::HeaderFields(vec![
            "subject".to_owned(),
            "FROM".to_owned(),
        ]));
        cache.section(&SectionSpec::HeaderFieldsNot(vec![
            "subject".to_owned(),
            "FROM".to_owned(),
        ]));
        assert_eq!(2, cache.sections.len());
    }
}
