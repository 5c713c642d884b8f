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

use super::super::storage::SearchExpr;
use super::defs::*;
use crate::{account::model::*, support::error::Error};

impl Mailbox {
    /// Finds the messages matching `criteria` (`SEARCH` / `UID SEARCH`).
    ///
    /// Only messages in this handle's current view are considered. The
    /// result is ascending, holds each message at most once, and is made of
    /// UIDs if `use_uid` and of sequence numbers otherwise.
    pub fn search_messages(
        &mut self,
        use_uid: bool,
        criteria: &SearchCriteria,
    ) -> Result<Vec<u32>, Error> {
        self.subscription()?;
        if self.messages.is_empty() {
            return Ok(Vec::new());
        }

        let expr = self.lower_criteria(criteria);
        let hits = self.metadb.search(self.id, &expr)?;

        Ok(hits
            .into_iter()
            .filter_map(|uid| {
                let ix = self.uid_index(uid)?;
                Some(if use_uid {
                    uid.into()
                } else {
                    Seqnum::from_index(ix).into()
                })
            })
            .collect())
    }

    /// Resolves everything in `criteria` that depends on this session,
    /// producing a query the database can evaluate alone.
    fn lower_criteria(&self, criteria: &SearchCriteria) -> SearchExpr {
        let mut parts = Vec::new();

        if let Some(ref seqnums) = criteria.seq_num {
            let uids = self.resolve_ids(false, seqnums);
            parts.push(SearchExpr::UidIn(to_uid_range(&uids)));
        }
        if let Some(ref uids) = criteria.uid {
            let uids = self.resolve_ids(true, uids);
            parts.push(SearchExpr::UidIn(to_uid_range(&uids)));
        }

        if let Some(date) = criteria.since {
            parts.push(SearchExpr::InternalDateSince(date));
        }
        if let Some(date) = criteria.before {
            parts.push(SearchExpr::InternalDateBefore(date));
        }
        if let Some(date) = criteria.sent_since {
            parts.push(SearchExpr::SentSince(date));
        }
        if let Some(date) = criteria.sent_before {
            parts.push(SearchExpr::SentBefore(date));
        }

        for &(ref field, ref key) in &criteria.header {
            parts.push(SearchExpr::Header(field.clone(), key.clone()));
        }
        for key in &criteria.body {
            parts.push(SearchExpr::Body(key.clone()));
        }
        for key in &criteria.text {
            parts.push(SearchExpr::Text(key.clone()));
        }

        for flag in &criteria.with_flags {
            parts.push(self.lower_flag(flag));
        }
        for flag in &criteria.without_flags {
            parts.push(SearchExpr::Not(Box::new(self.lower_flag(flag))));
        }

        if let Some(size) = criteria.larger {
            parts.push(SearchExpr::Larger(size));
        }
        if let Some(size) = criteria.smaller {
            parts.push(SearchExpr::Smaller(size));
        }

        for not in &criteria.not {
            parts.push(SearchExpr::Not(Box::new(self.lower_criteria(not))));
        }
        for &(ref a, ref b) in &criteria.or {
            parts.push(SearchExpr::Or(vec![
                self.lower_criteria(a),
                self.lower_criteria(b),
            ]));
        }

        match parts.len() {
            0 => SearchExpr::True,
            1 => parts.remove(0),
            _ => SearchExpr::And(parts),
        }
    }

    /// Lowers a test for the presence of `flag`.
    ///
    /// `\Recent` becomes the set of messages recent to this session. Flags
    /// that cannot be stored match nothing.
    fn lower_flag(&self, flag: &str) -> SearchExpr {
        if Flag::is_recent(flag) {
            let recent = self
                .messages
                .iter()
                .filter(|m| m.recent)
                .map(|m| m.uid)
                .collect::<Vec<_>>();
            return SearchExpr::UidIn(to_uid_range(&recent));
        }

        match flag.parse::<Flag>() {
            Ok(flag) => SearchExpr::Flag(flag),
            Err(_) => SearchExpr::Or(vec![]),
        }
    }
}

fn to_uid_range(uids: &[Uid]) -> SeqRange<Uid> {
    let mut range = SeqRange::new();
    for &uid in uids {
        range.append(uid);
    }
    range
}
