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

//! The session-facing half of the store. This is the API the protocol layer
//! uses.
//!
//! The module tree is best thought of as one large module: `Backend`, `User`
//! and `Mailbox` are defined in `defs`, and their implementations are split
//! across the other files by operation.

mod defs;
mod dispatch;
mod fetch;
mod mailboxes;
mod messages;
mod poll;
mod search;
mod select;
mod users;

pub use defs::{Backend, Mailbox, User};
