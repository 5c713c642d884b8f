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

//! The storage layer.
//!
//! Everything here is stateless beyond the database itself. Each operation
//! is atomic and runs in its own transaction; transactions never escape this
//! layer. Anything tied to a particular session, such as sequence numbers or
//! pending notifications, lives in the state layer instead.

mod functions;
mod messages;
mod metadb;
mod migrations;
mod search;
mod types;

pub use metadb::{Connection as MetaDb, RenamedMailbox};
pub use search::SearchExpr;
pub use types::*;
