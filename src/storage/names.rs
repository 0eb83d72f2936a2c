//! Label name <-> file name mapping
//!
//! Label names are free text, but each one becomes a directory (or file) name
//! on disk. Names are percent-encoded and upper-case letters are folded to a
//! `^` marker so two labels that differ only in case never collide on a
//! case-insensitive filesystem.
//!
//! ```text
//! "Holiday 2019"  ->  "name_^holiday%202019"
//! "a/b"           ->  "name_a%2fb"
//! ```

use crate::storage::error::{StorageError, StorageResult};

const PREFIX: &str = "name_";
const UPPER_MARK: char = '^';

/// Map an arbitrary name to a file name that is safe on any filesystem
pub fn name_to_filename(name: &str) -> String {
    let encoded = urlencoding::encode(name);
    let mut out = String::with_capacity(PREFIX.len() + encoded.len() + 8);
    out.push_str(PREFIX);

    let mut escape_digits = 0;
    for c in encoded.chars() {
        if escape_digits > 0 {
            out.push(c.to_ascii_lowercase());
            escape_digits -= 1;
        } else if c == '%' {
            out.push(c);
            escape_digits = 2;
        } else if c.is_ascii_uppercase() {
            out.push(UPPER_MARK);
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Reverse [`name_to_filename`]
pub fn filename_to_name(filename: &str) -> StorageResult<String> {
    let invalid = || StorageError::InvalidName(filename.to_string());

    let body = filename.strip_prefix(PREFIX).ok_or_else(invalid)?;

    let mut unfolded = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            UPPER_MARK => match chars.next() {
                Some(lower) if lower.is_ascii_lowercase() => {
                    unfolded.push(lower.to_ascii_uppercase())
                }
                _ => return Err(invalid()),
            },
            '%' => {
                let hi = chars.next().filter(char::is_ascii_hexdigit).ok_or_else(invalid)?;
                let lo = chars.next().filter(char::is_ascii_hexdigit).ok_or_else(invalid)?;
                unfolded.push('%');
                unfolded.push(hi);
                unfolded.push(lo);
            }
            c if c.is_ascii_uppercase() => return Err(invalid()),
            c => unfolded.push(c),
        }
    }

    urlencoding::decode(&unfolded)
        .map(|name| name.into_owned())
        .map_err(|_| invalid())
}

/// True when `filename` looks like something [`name_to_filename`] produced
pub fn is_encoded_name(filename: &str) -> bool {
    filename.starts_with(PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_names() {
        assert_eq!(name_to_filename("abc"), "name_abc");
        assert_eq!(name_to_filename("Abc"), "name_^abc");
        assert_eq!(name_to_filename("a b"), "name_a%20b");
        assert_eq!(name_to_filename("a/b"), "name_a%2fb");
        assert_eq!(name_to_filename(""), "name_");
    }

    #[test]
    fn test_case_does_not_collide() {
        let lower = name_to_filename("holiday");
        let upper = name_to_filename("HOLIDAY");
        assert_ne!(lower.to_lowercase(), upper.to_lowercase());
    }

    #[test]
    fn test_round_trip_awkward_names() {
        let names = [
            "plain",
            "MiXeD Case",
            "slash/and\\backslash",
            "percent % and caret ^",
            "tab\tnewline\ncontrol\u{1}",
            "..",
            "emoji 🎉 and ümlaut",
            "%2F",
            "",
        ];
        for name in names {
            let file = name_to_filename(name);
            assert!(!file.contains('/'), "{:?} produced {:?}", name, file);
            assert!(!file.contains('\\'));
            assert_eq!(filename_to_name(&file).unwrap(), name);
        }
    }

    #[test]
    fn test_rejects_foreign_file_names() {
        assert!(filename_to_name("dates").is_err());
        assert!(filename_to_name("name_%zz").is_err());
        assert!(filename_to_name("name_^1").is_err());
        assert!(filename_to_name("name_ABC").is_err());
        assert!(is_encoded_name("name_abc"));
        assert!(!is_encoded_name("Bits"));
    }
}
