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

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::Error;

/// Tuning for the mail store.
///
/// This is typically stored in a TOML file next to the database and loaded
/// with `StoreConfig::load()`. Every field has a default, so an empty file
/// (or `StoreConfig::default()`) is a valid configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long, in milliseconds, a connection waits on a locked database
    /// before failing with a storage error.
    ///
    /// Every mailbox handle has its own connection, so this bounds how long
    /// one session can be held up by a write in another.
    pub busy_timeout_ms: u64,

    /// The SQLite journal mode, passed verbatim to `PRAGMA journal_mode`.
    ///
    /// `WAL` lets readers proceed while another session is appending.
    pub journal_mode: String,

    /// The SQLite synchronous level, passed verbatim to
    /// `PRAGMA synchronous`.
    pub synchronous: String,

    /// The name under which the inbox is stored. Clients may address it with
    /// any casing of `INBOX`.
    pub inbox_name: String,

    /// If true, newly created users get an inbox immediately.
    pub auto_create_inbox: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 10_000,
            journal_mode: "WAL".to_owned(),
            synchronous: "NORMAL".to_owned(),
            inbox_name: "INBOX".to_owned(),
            auto_create_inbox: true,
        }
    }
}

impl StoreConfig {
    /// Load the configuration from the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = fs::read_to_string(path)?;
        Ok(toml::from_str(&data)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let config: StoreConfig = toml::from_str(
            "busy_timeout_ms = 250\n\
             auto_create_inbox = false\n",
        )
        .unwrap();

        assert_eq!(250, config.busy_timeout_ms);
        assert!(!config.auto_create_inbox);
        assert_eq!("WAL", config.journal_mode);
        assert_eq!("INBOX", config.inbox_name);
    }

    #[test]
    fn load_reads_file() {
        let tmpdir = tempfile::TempDir::new().unwrap();
        let path = tmpdir.path().join("mailrow.toml");
        fs::write(&path, "inbox_name = \"Inbox\"\n").unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert_eq!("Inbox", config.inbox_name);
        assert_eq!(10_000, config.busy_timeout_ms);

        assert_matches!(
            Err(Error::Io(_)),
            StoreConfig::load(&tmpdir.path().join("nx.toml")),
        );

        fs::write(&path, "busy_timeout_ms = \"soon\"\n").unwrap();
        assert_matches!(Err(Error::BadConfig(_)), StoreConfig::load(&path));
    }
}
