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

//! An IMAP mailbox storage engine.
//!
//! Mailrow keeps users, mailboxes, messages and flags in a single SQLite
//! database and exposes the session-relative view IMAP requires on top of it:
//! UID assignment, sequence numbers, the `\Recent` pseudo-flag, search, and
//! header/body retrieval. Wire-level IMAP is the caller's business; the
//! protocol layer drives a `Backend`, the `User`s it hands out, and the
//! `Mailbox` handles those produce, and receives `Update`s through an
//! `UpdateSink`.

#[cfg(test)]
macro_rules! assert_matches {
    ($expected:pat, $actual:expr $(,)?) => {
        match $actual {
            $expected => (),
            unexpected => panic!(
                "Expected {} matches {}, got {:?}",
                stringify!($expected),
                stringify!($actual),
                unexpected
            ),
        }
    };
}

mod account;
mod mime;
mod support;

pub use account::model::{
    BodySection, FetchItem, FetchedItem, FetchedMessage, Flag, FlagOp,
    MailboxInfo, MailboxListing, MailboxStatusUpdate, SearchCriteria,
    SectionSpec, SeqRange, SeqSet, Seqnum, Uid, Update, UpdateSink,
};
pub use account::{Backend, Mailbox, User};
pub use mime::envelope::{Envelope, EnvelopeAddress};
pub use support::error::{Error, ErrorKind};
pub use support::store_config::StoreConfig;

#[cfg(test)]
static INIT_TEST_LOG: std::sync::Once = std::sync::Once::new();

#[cfg(test)]
fn init_test_log() {
    INIT_TEST_LOG.call_once(|| {
        fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "{} [{}][{}] {}",
                    chrono::Local::now().format("%H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    message,
                ))
            })
            .level(log::LevelFilter::Debug)
            .chain(std::io::stderr())
            .apply()
            .unwrap();
    })
}
