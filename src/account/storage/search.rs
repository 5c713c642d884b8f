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

use chrono::prelude::*;
use rusqlite::types::Value;

use super::metadb::{Connection, ConnectionExt as _};
use super::types::*;
use crate::{account::model::*, support::error::Error};

/// A search query lowered to the terms the database can evaluate by itself.
///
/// Anything that depends on session state (sequence numbers, `\Recent`) has
/// already been resolved to UIDs by the time a query takes this form.
#[derive(Clone, Debug)]
pub enum SearchExpr {
    True,
    And(Vec<SearchExpr>),
    Or(Vec<SearchExpr>),
    Not(Box<SearchExpr>),
    UidIn(SeqRange<Uid>),
    Flag(Flag),
    InternalDateBefore(NaiveDate),
    InternalDateSince(NaiveDate),
    SentBefore(NaiveDate),
    SentSince(NaiveDate),
    Header(String, String),
    Body(String),
    Text(String),
    Larger(u32),
    Smaller(u32),
}

impl SearchExpr {
    /// Append the SQL form of this expression to `sql`, pushing the values
    /// of its placeholders onto `params` in order.
    ///
    /// The expression is evaluated against one row of `message` at a time,
    /// and flag tests are `EXISTS` subqueries, so a query filtering on it
    /// yields each message at most once.
    fn to_sql(&self, sql: &mut String, params: &mut Vec<Value>) {
        match *self {
            SearchExpr::True => sql.push('1'),

            SearchExpr::And(ref parts) => {
                join_sql(parts, " AND ", "1", sql, params)
            },

            SearchExpr::Or(ref parts) => {
                join_sql(parts, " OR ", "0", sql, params)
            },

            SearchExpr::Not(ref inner) => {
                sql.push_str("NOT (");
                inner.to_sql(sql, params);
                sql.push(')');
            },

            SearchExpr::UidIn(ref uids) => {
                if uids.is_empty() {
                    sql.push('0');
                    return;
                }

                // A fragmented set would make an `OR` chain deeper than
                // SQLite permits.
                sql.push_str("imap_uid_in(`uid`, ?)");
                params.push(Value::Text(uids.to_string()));
            },

            SearchExpr::Flag(ref flag) => {
                sql.push_str(
                    "EXISTS (SELECT 1 FROM `message_flag` \
                     WHERE `message_flag`.`message_id` = `message`.`id` \
                     AND `message_flag`.`flag` = ?)",
                );
                params.push(Value::Text(flag.to_string()));
            },

            SearchExpr::InternalDateBefore(date) => {
                sql.push_str("`internal_date` < ?");
                params.push(Value::Integer(start_of_day(date)));
            },

            SearchExpr::InternalDateSince(date) => {
                sql.push_str("`internal_date` >= ?");
                params.push(Value::Integer(start_of_day(date)));
            },

            SearchExpr::SentBefore(date) => {
                sql.push_str("COALESCE(imap_sent_date(`header`) < ?, 0)");
                params.push(Value::Text(date.format("%Y-%m-%d").to_string()));
            },

            SearchExpr::SentSince(date) => {
                sql.push_str("COALESCE(imap_sent_date(`header`) >= ?, 0)");
                params.push(Value::Text(date.format("%Y-%m-%d").to_string()));
            },

            SearchExpr::Header(ref field, ref key) => {
                sql.push_str("imap_header_contains(`header`, ?, ?)");
                params.push(Value::Text(field.clone()));
                params.push(Value::Text(key.clone()));
            },

            SearchExpr::Body(ref key) => {
                sql.push_str("imap_contains(`body`, ?)");
                params.push(Value::Text(key.clone()));
            },

            SearchExpr::Text(ref key) => {
                sql.push_str(
                    "(imap_contains(`header`, ?) OR imap_contains(`body`, ?))",
                );
                params.push(Value::Text(key.clone()));
                params.push(Value::Text(key.clone()));
            },

            SearchExpr::Larger(size) => {
                sql.push_str("`size` > ?");
                params.push(Value::Integer(size.into()));
            },

            SearchExpr::Smaller(size) => {
                sql.push_str("`size` < ?");
                params.push(Value::Integer(size.into()));
            },
        }
    }
}

fn join_sql(
    parts: &[SearchExpr],
    op: &str,
    empty: &str,
    sql: &mut String,
    params: &mut Vec<Value>,
) {
    if parts.is_empty() {
        sql.push_str(empty);
        return;
    }

    sql.push('(');
    for (ix, part) in parts.iter().enumerate() {
        if 0 != ix {
            sql.push_str(op);
        }
        part.to_sql(sql, params);
    }
    sql.push(')');
}

fn start_of_day(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

impl Connection {
    /// Find the UIDs of the messages in `mailbox` matching `expr`, in
    /// ascending order.
    pub fn search(
        &mut self,
        mailbox: MailboxId,
        expr: &SearchExpr,
    ) -> Result<Vec<Uid>, Error> {
        let mut sql = "SELECT `uid` FROM `message` \
                       WHERE `mailbox_id` = ? AND "
            .to_owned();
        let mut params = vec![Value::Integer(mailbox.0)];
        expr.to_sql(&mut sql, &mut params);
        sql.push_str(" ORDER BY `uid`");

        let txn = self.cxn.read_tx()?;
        let uids = txn
            .prepare(&sql)?
            .query_map(rusqlite::params_from_iter(params), from_single)?
            .collect::<Result<Vec<Uid>, _>>()?;
        Ok(uids)
    }
}

#[cfg(test)]
mod test {
    use super::super::metadb::TestFixture;
    use super::*;

    fn append(
        fixture: &mut TestFixture,
        mailbox: MailboxId,
        date: &str,
        header: &str,
        body: &str,
        flags: &[Flag],
    ) -> Uid {
        let internal_date = DateTime::parse_from_rfc3339(date)
            .unwrap()
            .with_timezone(&Utc);
        fixture
            .cxn
            .append_message(
                mailbox,
                &NewMessage {
                    internal_date: UnixTimestamp(internal_date),
                    header: header.as_bytes(),
                    body: body.as_bytes(),
                    flags,
                },
            )
            .unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn search_terms() {
        let mut fixture = TestFixture::new();
        let inbox = fixture.cxn.find_mailbox(fixture.user, "INBOX").unwrap();
        let kw = |s: &str| Flag::Keyword(s.to_owned());

        let m1 = append(
            &mut fixture,
            inbox,
            "2020-01-01T12:00:00Z",
            "Subject: Lunch plans\r\n\
             Date: Wed, 1 Jan 2020 23:00:00 -0800\r\n\r\n",
            "Shall we get\r\n   noodles?\r\n",
            &[Flag::Seen, kw("flag1"), kw("flag2")],
        );
        let m2 = append(
            &mut fixture,
            inbox,
            "2020-01-02T00:00:00Z",
            "Subject: Invoice\r\nX-Priority: 1\r\n\r\n",
            "Amount due: 42\r\n",
            &[],
        );
        let m3 = append(
            &mut fixture,
            inbox,
            "2020-01-03T23:59:59Z",
            "Subject: Re: lunch\r\n\
             Date: Fri, 3 Jan 2020 08:00:00 +0000\r\n\r\n",
            &"x".repeat(1000),
            &[Flag::Flagged],
        );

        let mut search =
            |expr: SearchExpr| fixture.cxn.search(inbox, &expr).unwrap();

        assert_eq!(vec![m1, m2, m3], search(SearchExpr::True));
        assert_eq!(vec![m1, m2, m3], search(SearchExpr::And(vec![])));
        assert_eq!(Vec::<Uid>::new(), search(SearchExpr::Or(vec![])));

        // One row per message even with several matching flags.
        assert_eq!(
            vec![m1],
            search(SearchExpr::Or(vec![
                SearchExpr::Flag(kw("flag1")),
                SearchExpr::Flag(kw("FLAG2")),
            ]))
        );
        // Messages without any flags still pass absence tests.
        assert_eq!(
            vec![m2, m3],
            search(SearchExpr::Not(Box::new(SearchExpr::Flag(kw("flag1")))))
        );

        assert_eq!(
            vec![m1, m3],
            search(SearchExpr::Header("subject".to_owned(), "LUNCH".to_owned()))
        );
        assert_eq!(
            vec![m2],
            search(SearchExpr::Header("X-Priority".to_owned(), String::new()))
        );
        assert_eq!(
            vec![m1],
            search(SearchExpr::Body("get noodles".to_owned()))
        );
        assert_eq!(
            vec![m2],
            search(SearchExpr::Text("invoice".to_owned()))
        );

        assert_eq!(vec![m3], search(SearchExpr::Larger(500)));
        assert_eq!(vec![m1, m2], search(SearchExpr::Smaller(500)));

        assert_eq!(
            vec![m1],
            search(SearchExpr::InternalDateBefore(date("2020-01-02")))
        );
        assert_eq!(
            vec![m2, m3],
            search(SearchExpr::InternalDateSince(date("2020-01-02")))
        );

        // Sent dates are compared as written, and messages without a Date
        // header never match.
        assert_eq!(
            vec![m1],
            search(SearchExpr::SentBefore(date("2020-01-02")))
        );
        assert_eq!(
            vec![m3],
            search(SearchExpr::SentSince(date("2020-01-02")))
        );
        assert_eq!(
            vec![m2],
            search(SearchExpr::Not(Box::new(SearchExpr::Or(vec![
                SearchExpr::SentBefore(date("2020-01-02")),
                SearchExpr::SentSince(date("2020-01-02")),
            ]))))
        );

        assert_eq!(
            vec![m1, m3],
            search(SearchExpr::UidIn({
                let mut r = SeqRange::just(m1);
                r.append(m3);
                r
            }))
        );
        assert_eq!(
            Vec::<Uid>::new(),
            search(SearchExpr::UidIn(SeqRange::new()))
        );
    }
}
