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

use std::borrow::Cow;
use std::str;

use bitflags::bitflags;

use super::header;

/// The `ENVELOPE` structure defined by RFC 3501, in the order the fields are
/// to be sent.
///
/// A field whose header is absent is `None` or empty, never something left
/// over from another message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// The `Date` header, normalised to RFC 2822 format if it could be
    /// parsed and passed through verbatim otherwise.
    pub date: Option<String>,
    /// The `Subject` header, unfolded.
    pub subject: Option<String>,
    /// The `From` header.
    ///
    /// RFC 3501 says this can never be NIL, but messages without an
    /// intelligible `From` do exist, and for those it is empty.
    pub from: Vec<EnvelopeAddress>,
    /// The `Sender` header, or a copy of `from` if there is none.
    pub sender: Vec<EnvelopeAddress>,
    /// The `Reply-To` header, or a copy of `from` if there is none.
    pub reply_to: Vec<EnvelopeAddress>,
    pub to: Vec<EnvelopeAddress>,
    pub cc: Vec<EnvelopeAddress>,
    pub bcc: Vec<EnvelopeAddress>,
    pub in_reply_to: Option<String>,
    pub message_id: Option<String>,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct EnvelopeParts: u32 {
        const DATE = 1 << 0;
        const SUBJECT = 1 << 1;
        const FROM = 1 << 2;
        const SENDER = 1 << 3;
        const REPLY_TO = 1 << 4;
        const TO = 1 << 5;
        const CC = 1 << 6;
        const BCC = 1 << 7;
        const IN_REPLY_TO = 1 << 8;
        const MESSAGE_ID = 1 << 9;
    }
}

/// Representation of an email address, or a group fragment, in an RFC 3501
/// `ENVELOPE`.
///
/// RFC 3501 encodes groups inline: a group starts with an "address" with a
/// local part (the group name) but no domain, and ends with an "address" with
/// neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeAddress {
    pub name: Option<String>,
    /// RFC 822 source routes are always discarded, so this is always NIL.
    pub routing: (),
    /// The local part (RFC 3501 "mailbox name").
    ///
    /// If `None` and `domain` is also `None`, this is a group-end delimiter.
    pub local: Option<String>,
    /// The domain (RFC 3501 "host").
    ///
    /// If `None`, this is a group delimiter.
    pub domain: Option<String>,
}

impl Envelope {
    /// Build the envelope of the message with the given header block.
    ///
    /// Only the first occurrence of each field is used.
    pub fn from_header(header_block: &[u8]) -> Self {
        let mut builder = EnvelopeBuilder {
            envelope: Envelope::default(),
            has_parts: EnvelopeParts::empty(),
        };

        for field in header::fields(header_block) {
            if builder.header(field.name, field.value) {
                break;
            }
        }

        builder.finish()
    }
}

struct EnvelopeBuilder {
    envelope: Envelope,
    has_parts: EnvelopeParts,
}

impl EnvelopeBuilder {
    /// Feed one field into the envelope. Returns whether every part has been
    /// found.
    fn header(&mut self, name: &str, value: &[u8]) -> bool {
        use EnvelopeParts as E;

        if "Date".eq_ignore_ascii_case(name) {
            if self.claim(E::DATE) {
                self.envelope.date = Some(date(value));
            }
        } else if "Subject".eq_ignore_ascii_case(name) {
            if self.claim(E::SUBJECT) {
                self.envelope.subject = Some(header::unfold(value));
            }
        } else if "From".eq_ignore_ascii_case(name) {
            if self.claim(E::FROM) {
                self.envelope.from = addr_list(value);
            }
        } else if "Sender".eq_ignore_ascii_case(name) {
            if self.claim(E::SENDER) {
                self.envelope.sender = addr_list(value);
            }
        } else if "Reply-To".eq_ignore_ascii_case(name) {
            if self.claim(E::REPLY_TO) {
                self.envelope.reply_to = addr_list(value);
            }
        } else if "To".eq_ignore_ascii_case(name) {
            if self.claim(E::TO) {
                self.envelope.to = addr_list(value);
            }
        } else if "Cc".eq_ignore_ascii_case(name) {
            if self.claim(E::CC) {
                self.envelope.cc = addr_list(value);
            }
        } else if "Bcc".eq_ignore_ascii_case(name) {
            if self.claim(E::BCC) {
                self.envelope.bcc = addr_list(value);
            }
        } else if "In-Reply-To".eq_ignore_ascii_case(name) {
            if self.claim(E::IN_REPLY_TO) {
                self.envelope.in_reply_to = message_id(value);
            }
        } else if "Message-Id".eq_ignore_ascii_case(name) {
            if self.claim(E::MESSAGE_ID) {
                self.envelope.message_id = message_id(value);
            }
        }

        self.has_parts.is_all()
    }

    /// Mark `part` as found, returning whether it had not been before.
    fn claim(&mut self, part: EnvelopeParts) -> bool {
        let fresh = !self.has_parts.contains(part);
        self.has_parts |= part;
        fresh
    }

    fn finish(mut self) -> Envelope {
        if self.envelope.sender.is_empty() {
            self.envelope.sender = self.envelope.from.clone();
        }
        if self.envelope.reply_to.is_empty() {
            self.envelope.reply_to = self.envelope.from.clone();
        }
        self.envelope
    }
}

fn date(value: &[u8]) -> String {
    str::from_utf8(value)
        .ok()
        .and_then(header::parse_datetime)
        .map(|dt| dt.to_rfc2822())
        // If we can't parse the date, send whatever we have to the client
        // and let them try to figure it out.
        .unwrap_or_else(|| header::unfold(value))
}

fn message_id(value: &[u8]) -> Option<String> {
    header::parse_message_id(value).map(str::to_owned)
}

fn addr_list(value: &[u8]) -> Vec<EnvelopeAddress> {
    let mut out = Vec::new();
    for address in header::parse_address_list(value).unwrap_or_default() {
        match address {
            header::Address::Mailbox(mailbox) => {
                out.push(to_envelope_address(mailbox))
            },
            header::Address::Group(group) => {
                out.push(EnvelopeAddress {
                    name: None,
                    routing: (),
                    local: Some(join(group.name, b' ')),
                    domain: None,
                });
                out.extend(group.boxes.into_iter().map(to_envelope_address));
                out.push(EnvelopeAddress::default());
            },
        }
    }
    out
}

fn to_envelope_address(mailbox: header::Mailbox<'_>) -> EnvelopeAddress {
    EnvelopeAddress {
        name: Some(join(mailbox.name, b' ')).filter(|s| !s.is_empty()),
        routing: (),
        local: Some(join(mailbox.addr.local, b'.')),
        domain: Some(join(mailbox.addr.domain, b'.')),
    }
}

fn join(parts: Vec<Cow<'_, [u8]>>, delim: u8) -> String {
    let mut accum = Vec::new();
    for (ix, part) in parts.iter().enumerate() {
        if 0 != ix {
            accum.push(delim);
        }
        accum.extend_from_slice(part);
    }

    String::from_utf8_lossy(&accum).into_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(header: &str) -> Envelope {
        Envelope::from_header(header.replace('\n', "\r\n").as_bytes())
    }

    fn addr(name: Option<&str>, local: &str, domain: &str) -> EnvelopeAddress {
        EnvelopeAddress {
            name: name.map(str::to_owned),
            routing: (),
            local: Some(local.to_owned()),
            domain: Some(domain.to_owned()),
        }
    }

    #[test]
    fn parse_simple() {
        let envelope = parse(
            "\
Message-ID: <4102090.1075845189404.JavaMail.evans@thyme>
Date: Mon, 14 May 2001 19:36:00 -0700 (PDT)
From: vmartinez@winstead.com
To: kenneth.lay@enron.com
Subject: Request for meeting
\tnext week
Mime-Version: 1.0

",
        );

        assert_eq!(
            "Mon, 14 May 2001 19:36:00 -0700",
            envelope.date.as_deref().unwrap()
        );
        assert_eq!(
            "<4102090.1075845189404.JavaMail.evans@thyme>",
            envelope.message_id.as_deref().unwrap()
        );
        assert_eq!(
            "Request for meeting\tnext week",
            envelope.subject.as_deref().unwrap()
        );
        assert_eq!(
            vec![addr(None, "vmartinez", "winstead.com")],
            envelope.from
        );
        assert_eq!(envelope.from, envelope.sender);
        assert_eq!(envelope.from, envelope.reply_to);
        assert_eq!(vec![addr(None, "kenneth.lay", "enron.com")], envelope.to);
        assert!(envelope.cc.is_empty());
        assert!(envelope.in_reply_to.is_none());
    }

    #[test]
    fn sender_is_kept_separate_from_from() {
        let envelope = parse(
            "\
From: Alice <alice@example.com>
Sender: Bot <bot@example.com>
Reply-To: replies@example.com

",
        );

        assert_eq!(
            vec![addr(Some("Alice"), "alice", "example.com")],
            envelope.from
        );
        assert_eq!(
            vec![addr(Some("Bot"), "bot", "example.com")],
            envelope.sender
        );
        assert_eq!(
            vec![addr(None, "replies", "example.com")],
            envelope.reply_to
        );
    }

    #[test]
    fn groups_are_delimited() {
        let envelope =
            parse("To: Team: a@example.com, b@example.com;, c@example.com\n\n");
        assert_eq!(
            vec![
                EnvelopeAddress {
                    name: None,
                    routing: (),
                    local: Some("Team".to_owned()),
                    domain: None,
                },
                addr(None, "a", "example.com"),
                addr(None, "b", "example.com"),
                EnvelopeAddress::default(),
                addr(None, "c", "example.com"),
            ],
            envelope.to
        );
    }

    #[test]
    fn missing_fields_are_empty() {
        let envelope = parse("Another-Field: Test\n\n");
        assert_eq!(Envelope::default(), envelope);
    }

    #[test]
    fn unparseable_date_is_passed_through() {
        let envelope = parse("Date: sometime last week\n\n");
        assert_eq!("sometime last week", envelope.date.unwrap());
    }

    #[test]
    fn first_occurrence_wins() {
        let envelope = parse("Subject: one\nSubject: two\n\n");
        assert_eq!("one", envelope.subject.unwrap());
    }
}
