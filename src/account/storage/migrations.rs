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

use log::info;

use super::types::*;
use crate::support::{error::Error, log_prefix::LogPrefix};

/// Bring the schema of `cxn` up to date.
///
/// `migrations[n]` is the script taking the schema from version `n` to
/// version `n + 1`. Migrations already recorded in the `migration` table are
/// skipped; the rest run in one exclusive transaction.
pub fn apply_migrations(
    log_prefix: &LogPrefix,
    cxn: &mut rusqlite::Connection,
    migrations: &[&str],
) -> Result<(), Error> {
    let latest_version = migrations.len();

    if Ok(latest_version)
        == cxn.query_row(
            "SELECT MAX(`version`) FROM `migration`",
            (),
            from_single::<usize>,
        )
    {
        return Ok(());
    }

    let txn = cxn
        .transaction_with_behavior(rusqlite::TransactionBehavior::Exclusive)?;
    txn.execute(
        "CREATE TABLE IF NOT EXISTS `migration` (\
         `version` INTEGER NOT NULL PRIMARY KEY, \
         `applied_at` INTEGER NOT NULL\
         ) STRICT",
        (),
    )?;

    let current_version = txn
        .query_row(
            "SELECT MAX(`version`) FROM `migration`",
            (),
            from_single::<Option<usize>>,
        )?
        .unwrap_or(0);

    for (version, migration) in migrations
        .iter()
        .copied()
        .enumerate()
        .map(|(ix, migration)| (ix + 1, migration))
        .skip(current_version)
    {
        info!("{log_prefix} Applying #{version} schema migration");
        txn.execute_batch(migration)?;
        txn.execute(
            "INSERT INTO `migration` (`version`, `applied_at`) \
             VALUES (?, ?)",
            (version, UnixTimestamp::now()),
        )?;
    }

    txn.commit()?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    const MIGRATIONS: &[&str] = &[
        "CREATE TABLE `a` (`x` INTEGER NOT NULL) STRICT;",
        "CREATE TABLE `b` (`y` INTEGER NOT NULL) STRICT;",
    ];

    #[test]
    fn migrations_apply_once_and_resume() {
        let log_prefix = LogPrefix::new("test".to_owned());
        let mut cxn = rusqlite::Connection::open_in_memory().unwrap();

        apply_migrations(&log_prefix, &mut cxn, &MIGRATIONS[..1]).unwrap();
        apply_migrations(&log_prefix, &mut cxn, &MIGRATIONS[..1]).unwrap();
        apply_migrations(&log_prefix, &mut cxn, MIGRATIONS).unwrap();
        apply_migrations(&log_prefix, &mut cxn, MIGRATIONS).unwrap();

        let versions = cxn
            .prepare("SELECT `version` FROM `migration` ORDER BY `version`")
            .unwrap()
            .query_map((), from_single::<usize>)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(vec![1, 2], versions);

        cxn.execute("INSERT INTO `b` (`y`) VALUES (1)", ()).unwrap();
    }
}
