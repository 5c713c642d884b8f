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

use std::path::Path;
use std::sync::{Arc, Mutex};

use log::info;

use super::defs::*;
use super::dispatch::Dispatcher;
use crate::support::{
    error::Error, log_prefix::LogPrefix, safe_name::is_safe_name,
    store_config::StoreConfig,
};

impl Backend {
    /// Opens the store at `path`, creating it if it does not exist yet.
    pub fn open(path: &Path, config: StoreConfig) -> Result<Self, Error> {
        let log_prefix = LogPrefix::new("store".to_owned());
        let shared = Arc::new(Shared {
            path: path.to_owned(),
            config,
            dispatcher: Dispatcher::default(),
        });
        let metadb = shared.connect(&log_prefix)?;

        Ok(Self {
            shared,
            metadb: Mutex::new(metadb),
            log_prefix,
        })
    }

    /// Creates a user, along with their inbox unless that has been turned
    /// off in the configuration.
    pub fn create_user(&self, name: &str) -> Result<(), Error> {
        if !is_safe_name(name) {
            return Err(Error::UnsafeName);
        }

        let config = &self.shared.config;
        let mut initial_mailboxes = Vec::new();
        if config.auto_create_inbox {
            initial_mailboxes.push(config.inbox_name.as_str());
        }

        self.metadb
            .lock()
            .unwrap()
            .create_user(name, &initial_mailboxes)?;
        info!("{} Created user {name:?}", self.log_prefix);
        Ok(())
    }

    /// Logs in as the given user.
    ///
    /// The returned `User` has its own connection to the store, so that it
    /// can be moved to the thread serving the session.
    pub fn user(&self, name: &str) -> Result<User, Error> {
        let id = self.metadb.lock().unwrap().find_user(name)?;
        let log_prefix = self.log_prefix.deep_clone();
        log_prefix.set_user(name.to_owned());
        let metadb = self.shared.connect(&log_prefix)?;

        Ok(User {
            id,
            name: name.to_owned(),
            metadb,
            shared: Arc::clone(&self.shared),
            log_prefix,
        })
    }

    /// Deletes a user and everything they own.
    ///
    /// Handles the user still has open keep working against their snapshot,
    /// but any operation that needs the store fails.
    pub fn delete_user(&self, name: &str) -> Result<(), Error> {
        self.metadb.lock().unwrap().delete_user(name)?;
        info!("{} Deleted user {name:?}", self.log_prefix);
        Ok(())
    }

    pub fn list_users(&self) -> Result<Vec<String>, Error> {
        self.metadb.lock().unwrap().list_users()
    }
}
