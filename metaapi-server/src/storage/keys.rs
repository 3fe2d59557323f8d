//! Object key layout: `<user_id>/<stem><timestamp>.<ext>`

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;

const STAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

static STAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}-\d{2}-\d{2}").expect("static regex"));

pub fn user_prefix(user_id: &str) -> String {
    format!("{user_id}/")
}

/// Build the storage key for an upload. The timestamp goes between stem and
/// extension; spaces in the stem become underscores.
pub fn upload_key(user_id: &str, file_name: &str, now: NaiveDateTime) -> String {
    let (stem, ext) = match file_name.split_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (file_name, None),
    };
    let name = format!("{stem}{}", now.format(STAMP_FORMAT)).replace(' ', "_");

    match ext {
        Some(ext) => format!("{}{name}.{ext}", user_prefix(user_id)),
        None => format!("{}{name}", user_prefix(user_id)),
    }
}

/// Name shown to the user: the segment after the user prefix, minus the
/// upload timestamp.
pub fn display_name(key: &str) -> String {
    let name = key.split('/').nth(1).unwrap_or(key);
    STAMP.replace_all(name, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn key_inserts_timestamp_before_extension() {
        assert_eq!(
            upload_key("u1", "my report.pdf", at(10, 11, 12)),
            "u1/my_report2024-03-05T10-11-12.pdf"
        );
    }

    #[test]
    fn key_without_extension() {
        assert_eq!(
            upload_key("u1", "notes", at(0, 0, 1)),
            "u1/notes2024-03-05T00-00-01"
        );
    }

    #[test]
    fn key_keeps_compound_extension() {
        assert_eq!(
            upload_key("u1", "backup.tar.gz", at(1, 2, 3)),
            "u1/backup2024-03-05T01-02-03.tar.gz"
        );
    }

    #[test]
    fn display_name_strips_prefix_and_stamp() {
        assert_eq!(
            display_name("u1/my_report2024-03-05T10-11-12.pdf"),
            "my_report.pdf"
        );
        assert_eq!(display_name("u1/plain.txt"), "plain.txt");
        assert_eq!(display_name("u1/"), "");
    }

    #[test]
    fn display_name_inverts_upload_key() {
        let key = upload_key("abc-123", "photo.jpg", at(23, 59, 59));
        assert_eq!(display_name(&key), "photo.jpg");
    }
}
