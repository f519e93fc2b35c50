//! Output formatting utilities

use chrono::{DateTime, Utc};

/// Truncate a string to a maximum length, marking the cut with `...`.
#[must_use]
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len < 3 {
        return "...".to_string();
    }
    let trimmed: String = s.chars().take(max_len - 3).collect();
    format!("{trimmed}...")
}

/// Age of a timestamp relative to `now`, e.g. `3h 12m ago`.
#[must_use]
pub fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = u64::try_from((now - at).num_seconds()).unwrap_or(0);
    if secs >= 86_400 {
        format!("{}d {}h ago", secs / 86_400, (secs % 86_400) / 3600)
    } else if secs >= 3600 {
        format!("{}h {}m ago", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s ago", secs / 60, secs % 60)
    } else {
        format!("{secs}s ago")
    }
}
