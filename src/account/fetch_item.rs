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

//! Wire syntax of `FETCH` items.
//!
//! Only the item names are handled here; the surrounding command syntax is
//! the protocol layer's concern. The canonical `Display` form is what the
//! item is echoed as when labelling fetched data.

use std::fmt;
use std::str::FromStr;

use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while1};
use nom::character::complete::{char, digit1, space0, space1};
use nom::combinator::{all_consuming, map, map_res, opt, value};
use nom::multi::separated_list1;
use nom::sequence::{delimited, pair, preceded, separated_pair, tuple};
use nom::IResult;

use super::model::{BodySection, FetchItem, SectionSpec};
use crate::support::error::Error;

fn number(i: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse)(i)
}

fn header_field_name(i: &str) -> IResult<&str, String> {
    alt((
        map(
            delimited(char('"'), take_while1(|ch: char| '"' != ch), char('"')),
            str::to_owned,
        ),
        map(
            take_while1(|ch: char| {
                !ch.is_ascii_control() && !matches!(ch, ' ' | '(' | ')' | '"')
            }),
            str::to_owned,
        ),
    ))(i)
}

fn header_field_list(i: &str) -> IResult<&str, Vec<String>> {
    delimited(
        pair(char('('), space0),
        separated_list1(space1, header_field_name),
        pair(space0, char(')')),
    )(i)
}

fn section_spec(i: &str) -> IResult<&str, SectionSpec> {
    alt((
        map(
            preceded(
                pair(tag_no_case("HEADER.FIELDS.NOT"), space1),
                header_field_list,
            ),
            SectionSpec::HeaderFieldsNot,
        ),
        map(
            preceded(
                pair(tag_no_case("HEADER.FIELDS"), space1),
                header_field_list,
            ),
            SectionSpec::HeaderFields,
        ),
        value(SectionSpec::Header, tag_no_case("HEADER")),
        value(SectionSpec::Text, tag_no_case("TEXT")),
        value(SectionSpec::Full, tag("")),
    ))(i)
}

fn partial(i: &str) -> IResult<&str, (u32, u32)> {
    delimited(char('<'), separated_pair(number, char('.'), number), char('>'))(
        i,
    )
}

fn body_section(i: &str) -> IResult<&str, BodySection> {
    map(
        tuple((
            preceded(
                tag_no_case("BODY"),
                map(opt(tag_no_case(".PEEK")), |p| p.is_some()),
            ),
            delimited(char('['), section_spec, char(']')),
            opt(partial),
        )),
        |(peek, spec, partial)| BodySection {
            spec,
            peek,
            partial,
        },
    )(i)
}

fn fetch_item(i: &str) -> IResult<&str, FetchItem> {
    alt((
        map(body_section, FetchItem::Body),
        value(FetchItem::Uid, tag_no_case("UID")),
        value(FetchItem::Flags, tag_no_case("FLAGS")),
        value(FetchItem::InternalDate, tag_no_case("INTERNALDATE")),
        value(FetchItem::Rfc822Size, tag_no_case("RFC822.SIZE")),
        value(FetchItem::Rfc822Header, tag_no_case("RFC822.HEADER")),
        value(FetchItem::Rfc822Text, tag_no_case("RFC822.TEXT")),
        value(FetchItem::Rfc822, tag_no_case("RFC822")),
        value(FetchItem::Envelope, tag_no_case("ENVELOPE")),
    ))(i)
}

impl FromStr for FetchItem {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        all_consuming(fetch_item)(s)
            .map(|(_, item)| item)
            .map_err(|_| Error::BadFetchItem(s.to_owned()))
    }
}

impl FetchItem {
    /// Parse a whole fetch attribute list.
    ///
    /// This accepts a single item, a parenthesised list of items, or one of
    /// the `ALL` and `FAST` macros.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, Error> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("ALL") {
            return Ok(vec![
                FetchItem::Flags,
                FetchItem::InternalDate,
                FetchItem::Rfc822Size,
                FetchItem::Envelope,
            ]);
        } else if trimmed.eq_ignore_ascii_case("FAST") {
            return Ok(vec![
                FetchItem::Flags,
                FetchItem::InternalDate,
                FetchItem::Rfc822Size,
            ]);
        }

        all_consuming(alt((
            delimited(
                pair(char('('), space0),
                separated_list1(space1, fetch_item),
                pair(space0, char(')')),
            ),
            map(fetch_item, |item| vec![item]),
        )))(trimmed)
        .map(|(_, items)| items)
        .map_err(|_| Error::BadFetchItem(s.to_owned()))
    }

    /// The name this item's data is reported under in a `FETCH` response.
    ///
    /// This drops `.PEEK` and the length of a partial, which is how the
    /// server echoes body sections.
    pub fn response_name(&self) -> String {
        match *self {
            FetchItem::Body(ref body) => {
                let mut s = format!("BODY[{}]", body.spec);
                if let Some((offset, _)) = body.partial {
                    s.push_str(&format!("<{}>", offset));
                }
                s
            },
            ref other => other.to_string(),
        }
    }
}

impl fmt::Display for SectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fn fields(
            f: &mut fmt::Formatter,
            name: &str,
            names: &[String],
        ) -> fmt::Result {
            write!(f, "{} ({})", name, names.join(" "))
        }

        match *self {
            SectionSpec::Full => Ok(()),
            SectionSpec::Header => write!(f, "HEADER"),
            SectionSpec::Text => write!(f, "TEXT"),
            SectionSpec::HeaderFields(ref names) => {
                fields(f, "HEADER.FIELDS", names)
            },
            SectionSpec::HeaderFieldsNot(ref names) => {
                fields(f, "HEADER.FIELDS.NOT", names)
            },
        }
    }
}

impl fmt::Display for FetchItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FetchItem::Uid => write!(f, "UID"),
            FetchItem::Flags => write!(f, "FLAGS"),
            FetchItem::InternalDate => write!(f, "INTERNALDATE"),
            FetchItem::Rfc822Size => write!(f, "RFC822.SIZE"),
            FetchItem::Envelope => write!(f, "ENVELOPE"),
            FetchItem::Rfc822 => write!(f, "RFC822"),
            FetchItem::Rfc822Header => write!(f, "RFC822.HEADER"),
            FetchItem::Rfc822Text => write!(f, "RFC822.TEXT"),
            FetchItem::Body(ref body) => {
                write!(
                    f,
                    "BODY{}[{}]",
                    if body.peek { ".PEEK" } else { "" },
                    body.spec
                )?;
                if let Some((offset, len)) = body.partial {
                    write!(f, "<{}.{}>", offset, len)?;
                }
                Ok(())
            },
        }
    }
}
