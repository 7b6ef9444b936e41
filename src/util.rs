/*!
Small path and string helpers shared by the model and commit layers.
*/
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref S3A: Regex = Regex::new("s3a://\\w*/").unwrap();
    static ref S3: Regex = Regex::new("s3://\\w*/").unwrap();
    static ref GS: Regex = Regex::new("gs://\\w*/").unwrap();
}

/// Strip a known object-store scheme + bucket prefix off a path, leaving the
/// key relative to the bucket root.
pub fn strip_prefix(path: &str) -> String {
    if path.starts_with("s3a://") {
        S3A.replace(path, "").to_string()
    } else if path.starts_with("s3://") {
        S3.replace(path, "").to_string()
    } else if path.starts_with("gs://") {
        GS.replace(path, "").to_string()
    } else {
        path.to_owned()
    }
}

/// The literal Hive encoding for a null partition value.
pub const HIVE_NULL_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Percent-encode the handful of characters Hive partition paths escape.
/// Hive escapes everything outside of `[A-Za-z0-9_.-]` with `%XX`.
fn hive_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.' | b'-' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Render one `name=value` segment of a Hive-style partition path.
/// `value` is `None` for a null partition value.
pub fn hive_partition_segment(name: &str, value: Option<&str>) -> String {
    match value {
        Some(v) => format!("{}={}", hive_escape(name), hive_escape(v)),
        None => format!("{}={}", hive_escape(name), HIVE_NULL_PARTITION),
    }
}

/// Join partition segments into a `{name}={value}/...` relative path.
pub fn hive_partition_path<'a>(segments: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> String {
    segments
        .into_iter()
        .map(|(name, value)| hive_partition_segment(name, value))
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_prefix_s3() {
        assert_eq!(strip_prefix("s3://bucket/a/b"), "a/b");
    }

    #[test]
    fn test_strip_prefix_passthrough() {
        assert_eq!(strip_prefix("/local/a/b"), "/local/a/b");
    }

    #[test]
    fn test_hive_partition_path_with_null() {
        let path = hive_partition_path([("name", Some("bob")), ("dept", None)]);
        assert_eq!(path, "name=bob/dept=__HIVE_DEFAULT_PARTITION__");
    }

    #[test]
    fn test_hive_escape_special_chars() {
        assert_eq!(hive_partition_segment("a/b", Some("c d")), "a%2Fb=c%20d");
    }
}
