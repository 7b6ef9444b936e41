/*!
Per-column statistics collection while writing a data file (spec.md §4.5):
value/null/NaN counts, an estimated on-disk column size, and running
min/max bounds under [`super::comparator::compare_values`].
*/
use std::cmp::Ordering;

use crate::error::Result;
use crate::model::types::Value;

use super::comparator::compare_values;

/// Accumulates the statistics for one column as rows are written. Feed it
/// every value seen (including nulls) via [`ColumnStatsCollector::update`];
/// read the result back out with the accessor methods once the file is
/// closed.
#[derive(Debug, Clone, Default)]
pub struct ColumnStatsCollector {
    value_count: i64,
    null_count: i64,
    nan_count: i64,
    column_size: i64,
    min: Option<Value>,
    max: Option<Value>,
}

impl ColumnStatsCollector {
    /// A fresh collector with all counters at zero and no bounds.
    pub fn new() -> Self {
        ColumnStatsCollector::default()
    }

    /// Record one value, with its approximate encoded size in bytes
    /// (contributing to `column_sizes`). NaN floats/doubles increment
    /// `nan_count` and do not update the running min/max (spec.md §4.5).
    pub fn update(&mut self, value: &Value, encoded_size_bytes: i64) -> Result<()> {
        self.value_count += 1;
        self.column_size += encoded_size_bytes;
        match value {
            Value::Null => {
                self.null_count += 1;
            }
            Value::Float(f) if f.is_nan() => {
                self.nan_count += 1;
            }
            Value::Double(d) if d.is_nan() => {
                self.nan_count += 1;
            }
            other => {
                self.min = Some(match self.min.take() {
                    None => other.clone(),
                    Some(cur) => {
                        if compare_values(other, &cur)? == Ordering::Less {
                            other.clone()
                        } else {
                            cur
                        }
                    }
                });
                self.max = Some(match self.max.take() {
                    None => other.clone(),
                    Some(cur) => {
                        if compare_values(other, &cur)? == Ordering::Greater {
                            other.clone()
                        } else {
                            cur
                        }
                    }
                });
            }
        }
        Ok(())
    }

    /// Total values seen, including nulls.
    pub fn value_count(&self) -> i64 {
        self.value_count
    }

    /// Null values seen.
    pub fn null_count(&self) -> i64 {
        self.null_count
    }

    /// NaN values seen (float/double columns only).
    pub fn nan_count(&self) -> i64 {
        self.nan_count
    }

    /// Running estimate of the column's encoded size in bytes.
    pub fn column_size(&self) -> i64 {
        self.column_size
    }

    /// The smallest non-null, non-NaN value seen, if any.
    pub fn lower_bound(&self) -> Option<&Value> {
        self.min.as_ref()
    }

    /// The largest non-null, non-NaN value seen, if any.
    pub fn upper_bound(&self) -> Option<&Value> {
        self.max.as_ref()
    }
}

/// Truncate a string to an upper bound with at most `length` Unicode code
/// points that remains `>=` every string with that prefix (spec.md §4.5):
/// take the first `length` code points, then increment the rightmost code
/// point that is not already `U+10FFFF` (skipping the surrogate range,
/// which is not a valid code point anyway). If the truncated prefix is
/// entirely `U+10FFFF`, the prefix is returned unchanged — a wider bound is
/// acceptable, an incorrect one is not.
pub fn truncate_upper_bound_string(s: &str, length: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= length {
        return s.to_string();
    }
    let mut truncated: Vec<char> = chars.into_iter().take(length).collect();
    for i in (0..truncated.len()).rev() {
        let code = truncated[i] as u32;
        if code < 0x10FFFF {
            let incremented = if code == 0xD7FF { 0xE000 } else { code + 1 };
            if let Some(next) = char::from_u32(incremented) {
                truncated.truncate(i + 1);
                truncated[i] = next;
                return truncated.into_iter().collect();
            }
        }
    }
    truncated.into_iter().collect()
}

/// Truncate a byte string to an upper bound of at most `length` bytes that
/// remains `>=` every byte string with that prefix: take the first `length`
/// bytes, then increment the rightmost byte that is not already `0xFF`. If
/// every byte in the prefix is `0xFF`, the prefix is returned unchanged.
pub fn truncate_upper_bound_binary(bytes: &[u8], length: usize) -> Vec<u8> {
    if bytes.len() <= length {
        return bytes.to_vec();
    }
    let mut truncated = bytes[..length].to_vec();
    for i in (0..truncated.len()).rev() {
        if truncated[i] < 0xFF {
            truncated[i] += 1;
            truncated.truncate(i + 1);
            return truncated;
        }
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max_tracking() {
        let mut c = ColumnStatsCollector::new();
        c.update(&Value::Int(5), 4).unwrap();
        c.update(&Value::Int(1), 4).unwrap();
        c.update(&Value::Int(9), 4).unwrap();
        assert_eq!(c.lower_bound(), Some(&Value::Int(1)));
        assert_eq!(c.upper_bound(), Some(&Value::Int(9)));
        assert_eq!(c.value_count(), 3);
    }

    #[test]
    fn test_null_and_nan_counted_separately() {
        let mut c = ColumnStatsCollector::new();
        c.update(&Value::Null, 0).unwrap();
        c.update(&Value::Double(f64::NAN), 8).unwrap();
        c.update(&Value::Double(1.0), 8).unwrap();
        assert_eq!(c.value_count(), 3);
        assert_eq!(c.null_count(), 1);
        assert_eq!(c.nan_count(), 1);
        assert_eq!(c.lower_bound(), Some(&Value::Double(1.0)));
        assert_eq!(c.upper_bound(), Some(&Value::Double(1.0)));
    }

    #[test]
    fn test_truncate_upper_bound_string_increments_last_char() {
        assert_eq!(truncate_upper_bound_string("abcdefg", 3), "abd");
    }

    #[test]
    fn test_truncate_upper_bound_string_noop_when_short() {
        assert_eq!(truncate_upper_bound_string("ab", 3), "ab");
    }

    #[test]
    fn test_truncate_upper_bound_string_all_max_codepoint() {
        let s: String = std::iter::repeat('\u{10FFFF}').take(5).collect();
        let truncated = truncate_upper_bound_string(&s, 3);
        assert_eq!(truncated.chars().count(), 3);
        assert!(truncated.chars().all(|c| c == '\u{10FFFF}'));
    }

    #[test]
    fn test_truncate_upper_bound_binary() {
        assert_eq!(truncate_upper_bound_binary(&[1, 2, 3, 4], 2), vec![1, 3]);
    }

    #[test]
    fn test_truncate_upper_bound_binary_all_ff() {
        assert_eq!(truncate_upper_bound_binary(&[0xFF, 0xFF, 0xFF], 2), vec![0xFF, 0xFF]);
    }
}
