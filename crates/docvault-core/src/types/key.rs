use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// Default key prefix for archives
pub const DEFAULT_PREFIX: &str = "backups/";

/// Extension of archive objects
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

const KEY_STEM: &str = "backup-";

/// Length of the key timestamp, e.g. `2024-05-01T02-03-04-005Z`
const TIMESTAMP_LEN: usize = 24;

/// Storage key of one backup archive
///
/// `<prefix>backup-<timestamp>[-<tag>].tar.gz`, where the timestamp is the
/// RFC 3339 creation time with `:` and `.` replaced by `-`. Keys under one
/// prefix sort lexicographically in creation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupKey {
    prefix: String,
    created_at: DateTime<Utc>,
    tag: Option<String>,
}

impl BackupKey {
    pub fn new(prefix: impl Into<String>, created_at: DateTime<Utc>, tag: Option<&str>) -> Self {
        let tag = tag
            .map(sanitize_tag)
            .filter(|t| !t.is_empty());
        // Keys carry millisecond precision only.
        let created_at = DateTime::from_timestamp_millis(created_at.timestamp_millis())
            .unwrap_or(created_at);

        Self {
            prefix: prefix.into(),
            created_at,
            tag,
        }
    }

    /// Parse a full storage key back into its parts
    ///
    /// Returns `None` for objects that are not backup archives.
    pub fn parse(key: &str) -> Option<Self> {
        let name_start = key.rfind('/').map(|i| i + 1).unwrap_or(0);
        let stem_start = name_start + key[name_start..].find(KEY_STEM)?;
        let (prefix, file) = key.split_at(stem_start);

        let body = file
            .strip_prefix(KEY_STEM)?
            .strip_suffix(ARCHIVE_EXTENSION)?
            .strip_suffix('.')?;
        if !body.is_ascii() || body.len() < TIMESTAMP_LEN {
            return None;
        }

        let (stamp, rest) = body.split_at(TIMESTAMP_LEN);
        let created_at = parse_timestamp(stamp)?;
        let tag = match rest {
            "" => None,
            r => Some(r.strip_prefix('-')?.to_string()),
        };

        Some(Self {
            prefix: prefix.to_string(),
            created_at,
            tag,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

impl fmt::Display for BackupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.prefix,
            KEY_STEM,
            format_timestamp(self.created_at)
        )?;
        if let Some(tag) = &self.tag {
            write!(f, "-{}", tag)?;
        }
        write!(f, ".{}", ARCHIVE_EXTENSION)
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

fn parse_timestamp(stamp: &str) -> Option<DateTime<Utc>> {
    let b = stamp.as_bytes();
    if b[13] != b'-' || b[16] != b'-' || b[19] != b'-' || b[23] != b'Z' {
        return None;
    }
    let rfc = format!(
        "{}:{}:{}.{}Z",
        &stamp[..13],
        &stamp[14..16],
        &stamp[17..19],
        &stamp[20..23]
    );
    DateTime::parse_from_rfc3339(&rfc)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn sanitize_tag(tag: &str) -> String {
    tag.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 2, 3, 4).unwrap() + chrono::Duration::milliseconds(ms)
    }

    #[test]
    fn test_key_format() {
        let key = BackupKey::new(DEFAULT_PREFIX, at(5), None);
        assert_eq!(key.to_string(), "backups/backup-2024-05-01T02-03-04-005Z.tar.gz");
    }

    #[test]
    fn test_key_with_tag_roundtrip() {
        let key = BackupKey::new("nightly/", at(0), Some("pre migrate!"));
        let s = key.to_string();
        assert_eq!(s, "nightly/backup-2024-05-01T02-03-04-000Z-pre-migrate-.tar.gz");
        assert_eq!(BackupKey::parse(&s), Some(key));
    }

    #[test]
    fn test_parse_rejects_foreign_objects() {
        assert!(BackupKey::parse("backups/readme.txt").is_none());
        assert!(BackupKey::parse("backups/backup-notatime.tar.gz").is_none());
        assert!(BackupKey::parse("backups/backup-2024-05-01T02-03-04-005Z.zip").is_none());
    }

    #[test]
    fn test_lexicographic_order_is_chronological() {
        let mut keys: Vec<String> = [at(900), at(5), at(60_000), at(0)]
            .into_iter()
            .map(|t| BackupKey::new(DEFAULT_PREFIX, t, None).to_string())
            .collect();
        keys.sort();

        let times: Vec<_> = keys
            .iter()
            .map(|k| BackupKey::parse(k).unwrap().created_at())
            .collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
    }
}
