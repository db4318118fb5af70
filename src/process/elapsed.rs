//! Parsing of `ps` elapsed-time columns.

use std::time::Duration;

/// Parse an `etime` value into a duration.
///
/// Accepts `SS`, `MM:SS`, `HH:MM:SS` and `D-HH:MM:SS` (any day width).
/// Returns `None` for anything else.
#[must_use]
pub fn parse_elapsed(raw: &str) -> Option<Duration> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (days, clock) = match trimmed.split_once('-') {
        Some((day_part, clock_part)) => (parse_field(day_part)?, clock_part),
        None => (0, trimmed),
    };

    let fields = clock
        .split(':')
        .map(parse_field)
        .collect::<Option<Vec<u64>>>()?;

    let seconds = match fields.as_slice() {
        [ss] if days == 0 => *ss,
        [mm, ss] if days == 0 => mm.saturating_mul(60).saturating_add(*ss),
        [hh, mm, ss] => hh
            .saturating_mul(3600)
            .saturating_add(mm.saturating_mul(60))
            .saturating_add(*ss),
        _ => return None,
    };

    Some(Duration::from_secs(
        days.saturating_mul(86_400).saturating_add(seconds),
    ))
}

fn parse_field(field: &str) -> Option<u64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}
