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

//! Utilities for working with RFC 5322 message headers.
//!
//! This covers splitting a message into its header block and body, walking
//! the fields of a header block, and parsing the few structured field values
//! the store needs (dates, address lists, message IDs).

use std::borrow::Cow;
use std::str;

use chrono::prelude::*;
use memchr::memchr;
use nom::{
    branch::alt,
    bytes::complete::{is_a, is_not, tag_no_case, take, take_while1,
                      take_while_m_n},
    character::complete::char,
    combinator::{map, opt, recognize, value},
    multi::{fold_many0, many0, many0_count, many1_count, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddrSpec<'a> {
    pub local: Vec<Cow<'a, [u8]>>,
    pub domain: Vec<Cow<'a, [u8]>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mailbox<'a> {
    pub addr: AddrSpec<'a>,
    pub name: Vec<Cow<'a, [u8]>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group<'a> {
    pub name: Vec<Cow<'a, [u8]>>,
    pub boxes: Vec<Mailbox<'a>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address<'a> {
    Mailbox(Mailbox<'a>),
    Group(Group<'a>),
}

/// Split a raw message into its header block and its body.
///
/// The header block includes the blank line that terminates it, so that the
/// two parts concatenated give back the original message exactly. A message
/// without a blank line is all header.
pub fn split_message(message: &[u8]) -> (&[u8], &[u8]) {
    let mut line_start = 0;
    while line_start < message.len() {
        let line_end = memchr(b'\n', &message[line_start..])
            .map_or(message.len(), |nl| line_start + nl + 1);
        let line = &message[line_start..line_end];
        if b"\r\n" == line || b"\n" == line {
            return message.split_at(line_end);
        }
        line_start = line_end;
    }

    (message, &[])
}

/// A single field of a header block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderField<'a> {
    pub name: &'a str,
    /// Everything after the colon, including folds and the final line ending.
    pub value: &'a [u8],
    /// The whole field as it appears in the header block.
    pub raw: &'a [u8],
}

/// Iterates the fields of a header block, stopping at the blank line.
///
/// Lines that are not a valid field (no colon, or a non-UTF-8 or empty name)
/// are skipped along with their continuation lines.
#[derive(Clone, Debug)]
pub struct HeaderFields<'a> {
    rest: &'a [u8],
}

pub fn fields(header: &[u8]) -> HeaderFields<'_> {
    HeaderFields { rest: header }
}

impl<'a> Iterator for HeaderFields<'a> {
    type Item = HeaderField<'a>;

    fn next(&mut self) -> Option<HeaderField<'a>> {
        loop {
            let rest = self.rest;
            if rest.is_empty() {
                return None;
            }

            let mut end = memchr(b'\n', rest).map_or(rest.len(), |nl| nl + 1);
            if b"\r\n" == &rest[..end] || b"\n" == &rest[..end] {
                self.rest = &[];
                return None;
            }

            while end < rest.len() && matches!(rest[end], b' ' | b'\t') {
                end = memchr(b'\n', &rest[end..])
                    .map_or(rest.len(), |nl| end + nl + 1);
            }

            let raw = &rest[..end];
            self.rest = &rest[end..];

            let Some(colon) = memchr(b':', raw) else {
                continue;
            };
            let Ok(name) = str::from_utf8(&raw[..colon]) else {
                continue;
            };
            let name = name.trim_end();
            if name.is_empty() || name.contains(|c: char| c.is_whitespace()) {
                continue;
            }

            return Some(HeaderField {
                name,
                value: &raw[colon + 1..],
                raw,
            });
        }
    }
}

/// Collect the raw fields of `header` whose name is (or, if `negated`, is
/// not) in `names`, followed by a blank line.
///
/// This is the content of `BODY[HEADER.FIELDS (...)]` and
/// `BODY[HEADER.FIELDS.NOT (...)]`.
pub fn filter_fields(
    header: &[u8],
    names: &[String],
    negated: bool,
) -> Vec<u8> {
    let mut out = Vec::new();
    for field in fields(header) {
        let listed = names.iter().any(|n| n.eq_ignore_ascii_case(field.name));
        if listed != negated {
            out.extend_from_slice(field.raw);
            if !field.raw.ends_with(b"\n") {
                out.extend_from_slice(b"\r\n");
            }
        }
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// Unfold a field value into a single line, without the leading and trailing
/// whitespace.
pub fn unfold(value: &[u8]) -> String {
    let unfolded = value
        .iter()
        .copied()
        .filter(|&b| b'\r' != b && b'\n' != b)
        .collect::<Vec<u8>>();
    String::from_utf8_lossy(&unfolded).trim().to_owned()
}

/// Parse an RFC 5322 `date-time`, including the obsolete forms.
pub fn parse_datetime(value: &str) -> Option<DateTime<FixedOffset>> {
    date_time(value.as_bytes()).ok().and_then(|(_, dt)| dt)
}

/// Parse an address list, as found in `From`, `To`, and similar fields.
pub fn parse_address_list(value: &[u8]) -> Option<Vec<Address<'_>>> {
    address_list(value).ok().map(|(_, list)| list)
}

/// Parse a single `msg-id`, returning it with its angle brackets.
pub fn parse_message_id(value: &[u8]) -> Option<&str> {
    msg_id(value)
        .ok()
        .and_then(|(_, id)| str::from_utf8(id).ok())
}

type Bytes<'a> = &'a [u8];

fn is_digit(ch: u8) -> bool {
    ch.is_ascii_digit()
}

fn decimal(s: &[u8]) -> u32 {
    s.iter()
        .fold(0u32, |acc, &d| acc * 10 + u32::from(d - b'0'))
}

// RFC 5322 3.2.1 "quoted-pair", including the 8-bit clean obsolete syntax.
fn quoted_pair(i: Bytes<'_>) -> IResult<Bytes<'_>, Bytes<'_>> {
    preceded(char('\\'), take(1usize))(i)
}

// RFC 5322 3.2.2 "Folding white space".
// Unfolding is done by simply treating the line-ending characters as
// whitespace.
fn fws(i: Bytes<'_>) -> IResult<Bytes<'_>, Bytes<'_>> {
    map(is_a(" \t\r\n"), |_| &b" "[..])(i)
}

// RFC 5322 3.2.2 "ctext"
fn ctext(i: Bytes<'_>) -> IResult<Bytes<'_>, Bytes<'_>> {
    is_not("()\\ \t\r\n")(i)
}

// RFC 5322 3.2.2 "ccontent", with FWS moved in from "comment".
fn ccontent(i: Bytes<'_>) -> IResult<Bytes<'_>, ()> {
    alt((
        value((), ctext),
        value((), quoted_pair),
        value((), fws),
        comment,
    ))(i)
}

// RFC 5322 3.2.2 "comment". Note that it is recursive.
fn comment(i: Bytes<'_>) -> IResult<Bytes<'_>, ()> {
    value((), delimited(char('('), many0_count(ccontent), char(')')))(i)
}

// RFC 5322 3.2.2 "CFWS". Always succeeds.
fn cfws(i: Bytes<'_>) -> IResult<Bytes<'_>, ()> {
    value((), many0_count(alt((value((), fws), comment))))(i)
}

// RFC 5322 3.2.3 "atext", amended by RFC 6532 to include all non-ASCII
// characters.
fn is_atext(ch: u8) -> bool {
    ch.is_ascii_alphanumeric()
        || ch >= 0x80
        || matches!(
            ch,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'/'
                | b'='
                | b'?'
                | b'^'
                | b'_'
                | b'`'
                | b'{'
                | b'|'
                | b'}'
                | b'~'
        )
}

fn atext(i: Bytes<'_>) -> IResult<Bytes<'_>, Bytes<'_>> {
    take_while1(is_atext)(i)
}

// RFC 5322 3.2.3 "atom"
fn atom(i: Bytes<'_>) -> IResult<Bytes<'_>, Bytes<'_>> {
    delimited(cfws, atext, cfws)(i)
}

// RFC 5322 3.2.4 "qtext" and "qcontent", with FWS moved in from
// "quoted-string".
fn qcontent(i: Bytes<'_>) -> IResult<Bytes<'_>, Bytes<'_>> {
    alt((is_not(" \t\r\n\\\""), quoted_pair, fws))(i)
}

// RFC 5322 3.2.4 "quoted-string"
fn quoted_string(i: Bytes<'_>) -> IResult<Bytes<'_>, Cow<'_, [u8]>> {
    delimited(
        pair(cfws, char('"')),
        fold_many0(
            qcontent,
            || Cow::Borrowed(&[] as &[u8]),
            |mut acc: Cow<[u8]>, item| {
                if acc.is_empty() {
                    acc = Cow::Borrowed(item);
                } else {
                    acc.to_mut().extend_from_slice(item);
                }
                acc
            },
        ),
        pair(char('"'), cfws),
    )(i)
}

// RFC 5322 3.2.5 "word"
fn word(i: Bytes<'_>) -> IResult<Bytes<'_>, Cow<'_, [u8]>> {
    alt((map(atom, Cow::Borrowed), quoted_string))(i)
}

// Part of the obsolete phrase syntax, which permits bare '.' in display
// names.
fn obs_dot(i: Bytes<'_>) -> IResult<Bytes<'_>, Cow<'_, [u8]>> {
    terminated(value(Cow::Borrowed(&b"."[..]), char('.')), cfws)(i)
}

// RFC 5322 3.2.5 "phrase", plus "obs-phrase".
fn phrase(i: Bytes<'_>) -> IResult<Bytes<'_>, Vec<Cow<'_, [u8]>>> {
    map(pair(word, many0(alt((word, obs_dot)))), |(head, mut tail)| {
        tail.insert(0, head);
        tail
    })(i)
}

// RFC 5322 3.3 date/time syntax, including obsolete forms, which allow CFWS
// between all the terms.
fn year(i: Bytes<'_>) -> IResult<Bytes<'_>, u32> {
    map(take_while_m_n(2, 4, is_digit), |s: Bytes<'_>| {
        let y = decimal(s);
        // Y2K workarounds of RFC 5322 4.3
        if 2 == s.len() && y < 50 {
            y + 2000
        } else if s.len() < 4 {
            y + 1900
        } else {
            y
        }
    })(i)
}

fn month(i: Bytes<'_>) -> IResult<Bytes<'_>, u32> {
    alt((
        value(1, tag_no_case("jan")),
        value(2, tag_no_case("feb")),
        value(3, tag_no_case("mar")),
        value(4, tag_no_case("apr")),
        value(5, tag_no_case("may")),
        value(6, tag_no_case("jun")),
        value(7, tag_no_case("jul")),
        value(8, tag_no_case("aug")),
        value(9, tag_no_case("sep")),
        value(10, tag_no_case("oct")),
        value(11, tag_no_case("nov")),
        value(12, tag_no_case("dec")),
    ))(i)
}

fn day(i: Bytes<'_>) -> IResult<Bytes<'_>, u32> {
    map(take_while_m_n(1, 2, is_digit), decimal)(i)
}

fn date(i: Bytes<'_>) -> IResult<Bytes<'_>, (u32, u32, u32)> {
    map(
        tuple((
            terminated(day, cfws),
            terminated(month, cfws),
            terminated(year, cfws),
        )),
        |(d, m, y)| (y, m, d),
    )(i)
}

fn two_digit(i: Bytes<'_>) -> IResult<Bytes<'_>, u32> {
    map(take_while_m_n(2, 2, is_digit), decimal)(i)
}

fn time_of_day(i: Bytes<'_>) -> IResult<Bytes<'_>, (u32, u32, u32)> {
    map(
        tuple((
            terminated(two_digit, tuple((cfws, char(':'), cfws))),
            two_digit,
            opt(preceded(tuple((cfws, char(':'), cfws)), two_digit)),
        )),
        |(h, m, s)| (h, m, s.unwrap_or(0)),
    )(i)
}

/// Convert a `+HHMM`-style offset, held as the decimal number HHMM, into
/// seconds.
fn hhmm_to_seconds(hhmm: i32) -> i32 {
    (hhmm / 100) * 3600 + (hhmm % 100) * 60
}

fn numeric_zone(i: Bytes<'_>) -> IResult<Bytes<'_>, i32> {
    map(
        pair(
            alt((char('+'), char('-'))),
            take_while_m_n(4, 4, is_digit),
        ),
        |(sign, s)| {
            let n = decimal(s) as i32;
            if '-' == sign {
                -n
            } else {
                n
            }
        },
    )(i)
}

fn zone(i: Bytes<'_>) -> IResult<Bytes<'_>, i32> {
    map(
        alt((
            numeric_zone,
            value(0, alt((tag_no_case("ut"), tag_no_case("gmt")))),
            value(-400, tag_no_case("edt")),
            value(-500, alt((tag_no_case("est"), tag_no_case("cdt")))),
            value(-600, alt((tag_no_case("cst"), tag_no_case("mdt")))),
            value(-700, alt((tag_no_case("mst"), tag_no_case("pdt")))),
            value(-800, tag_no_case("pst")),
            // Military and unrecognised zones must be treated as +0000.
            value(0, atext),
        )),
        hhmm_to_seconds,
    )(i)
}

fn time(i: Bytes<'_>) -> IResult<Bytes<'_>, ((u32, u32, u32), i32)> {
    terminated(pair(terminated(time_of_day, cfws), zone), cfws)(i)
}

fn date_time(
    i: Bytes<'_>,
) -> IResult<Bytes<'_>, Option<DateTime<FixedOffset>>> {
    map(
        preceded(
            // We don't care what day of the week it was
            pair(cfws, opt(tuple((atom, char(','), cfws)))),
            pair(date, time),
        ),
        |((year, month, day), ((hour, minute, second), zone))| {
            FixedOffset::east_opt(zone).and_then(|off| {
                off.with_ymd_and_hms(
                    year as i32,
                    month,
                    day,
                    hour,
                    minute,
                    second,
                )
                .latest()
            })
        },
    )(i)
}

// RFC 5322 3.4.1 "local-part". Every dot-atom and quoted-string also matches
// "obs-local-part", which is what this parses.
fn local_part(i: Bytes<'_>) -> IResult<Bytes<'_>, Vec<Cow<'_, [u8]>>> {
    separated_list1(char('.'), word)(i)
}

// RFC 5322 4.4 "obs-domain"
fn obs_domain(i: Bytes<'_>) -> IResult<Bytes<'_>, Vec<Cow<'_, [u8]>>> {
    separated_list1(char('.'), map(atom, Cow::Borrowed))(i)
}

// RFC 5322 3.4.1 "domain-literal", with FWS moved into the content.
fn domain_literal(i: Bytes<'_>) -> IResult<Bytes<'_>, Vec<u8>> {
    map(
        delimited(
            pair(cfws, char('[')),
            fold_many0(
                alt((is_not("[]\\ \t\r\n"), quoted_pair, fws)),
                || vec![b'['],
                |mut acc, item| {
                    acc.extend_from_slice(item);
                    acc
                },
            ),
            pair(char(']'), cfws),
        ),
        |mut res| {
            res.push(b']');
            res
        },
    )(i)
}

fn domain(i: Bytes<'_>) -> IResult<Bytes<'_>, Vec<Cow<'_, [u8]>>> {
    alt((obs_domain, map(domain_literal, |v| vec![Cow::Owned(v)])))(i)
}

// RFC 5322 3.4.1 "addr-spec"
fn addr_spec(i: Bytes<'_>) -> IResult<Bytes<'_>, AddrSpec<'_>> {
    map(
        pair(local_part, preceded(char('@'), domain)),
        |(local, domain)| AddrSpec { local, domain },
    )(i)
}

// Separators of the obsolete list syntaxes, which allow empty elements.
fn list_delim(i: Bytes<'_>) -> IResult<Bytes<'_>, ()> {
    value((), many1_count(tuple((cfws, char(','), cfws))))(i)
}

// RFC 5322 4.4 "obs-route". The routing information is discarded.
fn obs_route(i: Bytes<'_>) -> IResult<Bytes<'_>, ()> {
    value(
        (),
        tuple((
            char('@'),
            domain,
            many0_count(tuple((opt(list_delim), cfws, char('@'), domain))),
            char(':'),
        )),
    )(i)
}

// RFC 5322 3.4 "angle-addr", including "obs-angle-addr".
fn angle_addr(i: Bytes<'_>) -> IResult<Bytes<'_>, AddrSpec<'_>> {
    delimited(
        tuple((cfws, char('<'), opt(obs_route))),
        addr_spec,
        pair(char('>'), cfws),
    )(i)
}

// RFC 5322 3.4 "mailbox"
fn mailbox(i: Bytes<'_>) -> IResult<Bytes<'_>, Mailbox<'_>> {
    map(
        alt((
            pair(opt(phrase), angle_addr),
            map(addr_spec, |a| (None, a)),
        )),
        |(name, addr)| Mailbox {
            name: name.unwrap_or_default(),
            addr,
        },
    )(i)
}

// RFC 5322 3.4 "mailbox-list", including "obs-mbox-list".
fn mailbox_list(i: Bytes<'_>) -> IResult<Bytes<'_>, Vec<Mailbox<'_>>> {
    delimited(
        opt(list_delim),
        separated_list1(list_delim, mailbox),
        opt(list_delim),
    )(i)
}

// RFC 5322 3.4 "group"
fn group(i: Bytes<'_>) -> IResult<Bytes<'_>, Group<'_>> {
    map(
        pair(
            terminated(phrase, char(':')),
            terminated(opt(mailbox_list), tuple((cfws, char(';'), cfws))),
        ),
        |(name, boxes)| Group {
            name,
            boxes: boxes.unwrap_or_default(),
        },
    )(i)
}

// RFC 5322 3.4 "address"
fn address(i: Bytes<'_>) -> IResult<Bytes<'_>, Address<'_>> {
    alt((map(mailbox, Address::Mailbox), map(group, Address::Group)))(i)
}

// RFC 5322 3.4 "address-list", including "obs-addr-list".
fn address_list(i: Bytes<'_>) -> IResult<Bytes<'_>, Vec<Address<'_>>> {
    delimited(
        opt(list_delim),
        separated_list1(list_delim, address),
        opt(list_delim),
    )(i)
}

// RFC 5322 3.6.4 "msg-id". The content is not validated beyond the angle
// brackets, since real-world IDs frequently break the rules.
fn msg_id(i: Bytes<'_>) -> IResult<Bytes<'_>, Bytes<'_>> {
    delimited(
        cfws,
        recognize(tuple((char('<'), is_not("<>\r\n"), char('>')))),
        cfws,
    )(i)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn split_at_first_blank_line() {
        assert_eq!(
            (&b"Subject: Test\r\n\r\n"[..], &b"Body text"[..]),
            split_message(b"Subject: Test\r\n\r\nBody text")
        );
        assert_eq!(
            (&b"A: b\n\n"[..], &b"x\r\n\r\ny"[..]),
            split_message(b"A: b\n\nx\r\n\r\ny")
        );
        assert_eq!(
            (&b"\r\n"[..], &b"body only"[..]),
            split_message(b"\r\nbody only")
        );
        assert_eq!(
            (&b"No: body"[..], &b""[..]),
            split_message(b"No: body")
        );
    }

    #[test]
    fn iterate_fields() {
        let header = b"From: <foxcpp@foxcpp.dev>\r\n\
                       Subject: Hello\r\n \tworld\r\n\
                       garbage line\r\n\
                       X-Empty:\r\n\
                       \r\n\
                       Not-A-Header: body\r\n";
        let found = fields(header)
            .map(|f| (f.name, f.value))
            .collect::<Vec<_>>();
        assert_eq!(
            vec![
                ("From", &b" <foxcpp@foxcpp.dev>\r\n"[..]),
                ("Subject", &b" Hello\r\n \tworld\r\n"[..]),
                ("X-Empty", &b"\r\n"[..]),
            ],
            found
        );
        assert_eq!("Hello \tworld", unfold(found[1].1));
    }

    #[test]
    fn filter_header_fields() {
        let header = b"From: a@b.c\r\nTo: d@e.f\r\nSubject: Hi\r\n\r\n";
        assert_eq!(
            b"From: a@b.c\r\nSubject: Hi\r\n\r\n".to_vec(),
            filter_fields(
                header,
                &["subject".to_owned(), "FROM".to_owned()],
                false
            )
        );
        assert_eq!(
            b"To: d@e.f\r\n\r\n".to_vec(),
            filter_fields(
                header,
                &["subject".to_owned(), "FROM".to_owned()],
                true
            )
        );
        assert_eq!(
            b"\r\n".to_vec(),
            filter_fields(header, &["X-Nope".to_owned()], false)
        );
    }

    #[test]
    fn parse_dates() {
        assert_eq!(
            "2001-05-14T19:36:00-07:00",
            parse_datetime("Mon, 14 May 2001 19:36:00 -0700 (PDT)")
                .unwrap()
                .to_rfc3339()
        );
        assert_eq!(
            "2020-01-02T03:04:00+05:30",
            parse_datetime(" 2 Jan 2020 03:04 +0530").unwrap().to_rfc3339()
        );
        assert_eq!(
            "1999-12-31T23:59:59-05:00",
            parse_datetime("Fri, 31 Dec 99 23:59:59 EST")
                .unwrap()
                .to_rfc3339()
        );
        assert!(parse_datetime("yesterday").is_none());
        assert!(parse_datetime("31 Feb 2020 00:00:00 +0000").is_none());
    }

    #[test]
    fn parse_addresses() {
        let list = parse_address_list(
            b" \"Doe, Jane\" <jane@example.com>, bob@example.org,\r\n \
              Friends: carol@example.net, Dan <dan@example.net>;",
        )
        .unwrap();
        assert_eq!(3, list.len());

        match list[0] {
            Address::Mailbox(ref m) => {
                assert_eq!(vec![Cow::Borrowed(&b"Doe, Jane"[..])], m.name);
                assert_eq!(vec![Cow::Borrowed(&b"jane"[..])], m.addr.local);
                assert_eq!(
                    vec![
                        Cow::Borrowed(&b"example"[..]),
                        Cow::Borrowed(&b"com"[..])
                    ],
                    m.addr.domain
                );
            },
            ref a => panic!("Unexpected address: {:?}", a),
        }

        match list[1] {
            Address::Mailbox(ref m) => assert!(m.name.is_empty()),
            ref a => panic!("Unexpected address: {:?}", a),
        }

        match list[2] {
            Address::Group(ref g) => {
                assert_eq!(vec![Cow::Borrowed(&b"Friends"[..])], g.name);
                assert_eq!(2, g.boxes.len());
            },
            ref a => panic!("Unexpected address: {:?}", a),
        }

        let routed =
            parse_address_list(b"<@relay.example:user@example.com>").unwrap();
        assert_eq!(1, routed.len());

        assert!(parse_address_list(b"<<<").is_none());
    }

    #[test]
    fn parse_message_ids() {
        assert_eq!(
            Some("<4102090.1075845189404.JavaMail.evans@thyme>"),
            parse_message_id(
                b" <4102090.1075845189404.JavaMail.evans@thyme>\r\n"
            )
        );
        assert_eq!(None, parse_message_id(b" no brackets"));
    }
}
