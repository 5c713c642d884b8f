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

use std::fmt;
use std::sync::{Arc, Mutex};

/// Tracks text that should be included in at the start of every log statement.
///
/// Clones of a `LogPrefix` share the same underlying data.
#[derive(Clone)]
pub struct LogPrefix {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Clone)]
struct Inner {
    protocol: String,
    user: Option<String>,
    mailbox: Option<String>,
}

impl LogPrefix {
    pub fn new(protocol: String) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                protocol,
                user: None,
                mailbox: None,
            })),
        }
    }

    pub fn deep_clone(&self) -> Self {
        let inner = self.inner.lock().unwrap();
        Self {
            inner: Arc::new(Mutex::new(Inner::clone(&inner))),
        }
    }

    pub fn set_user(&self, user: String) {
        self.inner.lock().unwrap().user = Some(sanitise(user));
    }

    pub fn set_mailbox(&self, mailbox: String) {
        self.inner.lock().unwrap().mailbox = Some(sanitise(mailbox));
    }
}

impl fmt::Display for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        write!(f, "{}", inner.protocol)?;
        match (&inner.user, &inner.mailbox) {
            (None, None) => Ok(()),
            (Some(user), None) => write!(f, "[{user}]"),
            (None, Some(mailbox)) => write!(f, "[mailbox={mailbox}]"),
            (Some(user), Some(mailbox)) => {
                write!(f, "[{user} mailbox={mailbox}]")
            },
        }
    }
}

fn sanitise(mut s: String) -> String {
    s.retain(|c| !c.is_control());
    if let Some((truncate_len, _)) = s.char_indices().nth(64) {
        s.truncate(truncate_len);
    }

    s
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn formatting() {
        let prefix = LogPrefix::new("imap".to_owned());
        assert_eq!("imap", prefix.to_string());

        prefix.set_user("alice\r\n".to_owned());
        assert_eq!("imap[alice]", prefix.to_string());

        let child = prefix.deep_clone();
        child.set_mailbox("INBOX".to_owned());
        assert_eq!("imap[alice mailbox=INBOX]", child.to_string());
        assert_eq!("imap[alice]", prefix.to_string());
    }
}
