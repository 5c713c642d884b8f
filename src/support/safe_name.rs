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

/// Determine whether the given user or mailbox name is "safe" to store.
///
/// Names live in the database rather than the file system, so only things
/// with special meaning to IMAP itself are excluded: empty names, control
/// characters, the `LIST` wildcards, and the `#` namespace prefix.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty() &&
        name.chars().next() != Some('#') &&
        name.find(|c| c < ' ' || c == '\x7F').is_none() &&
        name.find(|c| c == '*' || c == '%').is_none()
}

/// Normalise a mailbox name supplied by a client.
///
/// Any casing of `INBOX` maps to `inbox_name`, since RFC 3501 makes that
/// one name case-insensitive. Other names are returned verbatim.
pub fn normalise_mailbox_name(name: &str, inbox_name: &str) -> Option<String> {
    if !is_safe_name(name) {
        None
    } else if name.eq_ignore_ascii_case("inbox") {
        Some(inbox_name.to_owned())
    } else {
        Some(name.to_owned())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_is_safe_name() {
        assert!(is_safe_name("foo"));
        assert!(is_safe_name("Entwürfe"));
        assert!(is_safe_name("郵便"));
        assert!(is_safe_name("foo.bar"));
        assert!(is_safe_name("foo/bar"));
        assert!(is_safe_name("folder #1"));
        assert!(!is_safe_name(""));
        assert!(!is_safe_name("#news"));
        assert!(!is_safe_name("foo\0"));
        assert!(!is_safe_name("foo\r"));
        assert!(!is_safe_name("fo\x7Fo"));
        assert!(!is_safe_name("foo*bar"));
        assert!(!is_safe_name("foo%bar"));
    }

    #[test]
    fn inbox_is_case_insensitive() {
        assert_eq!(
            Some("INBOX".to_owned()),
            normalise_mailbox_name("iNbOx", "INBOX"),
        );
        assert_eq!(
            Some("Inboxes".to_owned()),
            normalise_mailbox_name("Inboxes", "INBOX"),
        );
        assert_eq!(None, normalise_mailbox_name("", "INBOX"));
    }
}
