//! Dot-segmented wildcard matching.

use crate::error::{EventError, EventResult};

/// Segment that matches the current segment and everything after it.
const WILDCARD: &str = "*";

/// Whether `event_type` matches `pattern`.
///
/// - `"*"` on its own matches every event type.
/// - Otherwise both strings are split on `.` and walked pairwise. A `*`
///   segment matches the event segment at its position and ends the walk
///   as a match, absorbing all remaining depth: `mqtt.*` matches
///   `mqtt.connected` and `mqtt.message.received` but not `mqtt`.
/// - A literal segment must equal the event segment exactly.
/// - When no wildcard ends the walk, the segment counts must be equal.
#[must_use]
pub fn matches(pattern: &str, event_type: &str) -> bool {
    if pattern == WILDCARD {
        return true;
    }

    let mut event_segments = event_type.split('.');
    for segment in pattern.split('.') {
        match event_segments.next() {
            Some(_) if segment == WILDCARD => return true,
            Some(event_segment) if event_segment == segment => {},
            _ => return false,
        }
    }
    event_segments.next().is_none()
}

/// Reject patterns that can never be meaningful: empty strings and empty
/// segments such as `chat..received`.
///
/// # Errors
///
/// Returns [`EventError::InvalidPattern`] for a malformed pattern.
pub fn validate_pattern(pattern: &str) -> EventResult<()> {
    if pattern.is_empty() || pattern.split('.').any(str::is_empty) {
        return Err(EventError::InvalidPattern(pattern.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_wildcard_matches_everything() {
        for event in ["a", "a.b", "chat.message.received", ""] {
            assert!(matches("*", event));
        }
    }

    #[test]
    fn test_trailing_wildcard_absorbs_depth() {
        assert!(matches("a.b.*", "a.b.c.d"));
        assert!(matches("a.b.*", "a.b.c"));
        assert!(matches("mqtt.*", "mqtt.connected"));
        assert!(matches("mqtt.*", "mqtt.message.received"));
        assert!(matches("chat.message.*", "chat.message.received"));
    }

    #[test]
    fn test_segment_counts_must_match_without_wildcard() {
        assert!(!matches("a.b", "a.b.c"));
        assert!(!matches("a.b.c", "a.b"));
        assert!(matches("a.b", "a.b"));
    }

    #[test]
    fn test_literal_mismatch() {
        assert!(!matches("chat.message.*", "mqtt.connected"));
        assert!(!matches("a.x.*", "a.b.c"));
        assert!(!matches("a.b", "a.c"));
    }

    #[test]
    fn test_wildcard_needs_a_segment() {
        assert!(!matches("mqtt.*", "mqtt"));
        assert!(!matches("mqtt.*", "mqttx"));
        assert!(!matches("a.*.c", "a"));
        assert!(matches("mqtt.*", "mqtt.x"));
    }

    #[test]
    fn test_inner_wildcard_ends_walk() {
        assert!(matches("a.*.c", "a.b.d"));
        assert!(!matches("x.*.c", "a.b.c"));
    }

    #[test]
    fn test_deterministic() {
        for _ in 0..3 {
            assert!(matches("a.b.*", "a.b.c.d"));
            assert!(!matches("a.b", "a.b.c"));
        }
    }

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern("*").is_ok());
        assert!(validate_pattern("chat.message.*").is_ok());
        assert!(validate_pattern("").is_err());
        assert!(validate_pattern("chat..received").is_err());
        assert!(validate_pattern("chat.").is_err());
    }
}
