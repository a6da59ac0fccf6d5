//! Slot arithmetic for the 4-hour UTC epoch grid.
//!
//! Slots start at 00:00, 04:00, 08:00, 12:00, 16:00 and 20:00 UTC. Epoch
//! ids are the slot start formatted as `YYYY-MM-DD-HH:MM`.

use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};

/// Epoch length in hours.
pub const EPOCH_HOURS: i64 = 4;

const EPOCH_ID_FORMAT: &str = "%Y-%m-%d-%H:%M";

/// Start of the slot containing `now`.
pub fn slot_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let hour = now.hour() - (now.hour() % EPOCH_HOURS as u32);
    now.date_naive()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
        .and_utc()
}

/// Start of the slot after the one containing `now`.
pub fn next_slot(now: DateTime<Utc>) -> DateTime<Utc> {
    slot_start(now) + Duration::hours(EPOCH_HOURS)
}

/// End of an epoch starting at `start`.
pub fn epoch_end(start: DateTime<Utc>) -> DateTime<Utc> {
    start + Duration::hours(EPOCH_HOURS)
}

/// Epoch id for a slot start.
pub fn epoch_id_for(start: DateTime<Utc>) -> String {
    start.format(EPOCH_ID_FORMAT).to_string()
}

/// Parse an epoch id back into its slot start. Returns `None` when the id
/// does not parse or is not aligned to the grid.
pub fn parse_epoch_id(id: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(id, EPOCH_ID_FORMAT).ok()?;
    let start = naive.and_utc();
    if start.hour() % EPOCH_HOURS as u32 != 0 || start.minute() != 0 {
        return None;
    }
    Some(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_slot_start_truncates_to_grid() {
        assert_eq!(
            slot_start(utc(2025, 6, 1, 5, 30, 12)),
            utc(2025, 6, 1, 4, 0, 0)
        );
        assert_eq!(
            slot_start(utc(2025, 6, 1, 23, 59, 59)),
            utc(2025, 6, 1, 20, 0, 0)
        );
        assert_eq!(
            slot_start(utc(2025, 6, 1, 0, 0, 0)),
            utc(2025, 6, 1, 0, 0, 0)
        );
    }

    #[test]
    fn test_next_slot_rolls_over_midnight() {
        assert_eq!(
            next_slot(utc(2025, 6, 1, 21, 15, 0)),
            utc(2025, 6, 2, 0, 0, 0)
        );
        assert_eq!(
            next_slot(utc(2025, 6, 1, 3, 0, 0)),
            utc(2025, 6, 1, 4, 0, 0)
        );
    }

    #[test]
    fn test_epoch_id_round_trip() {
        let start = utc(2025, 6, 1, 16, 0, 0);
        let id = epoch_id_for(start);
        assert_eq!(id, "2025-06-01-16:00");
        assert_eq!(parse_epoch_id(&id), Some(start));
    }

    #[test]
    fn test_parse_rejects_misaligned_ids() {
        assert!(parse_epoch_id("2025-06-01-17:00").is_none());
        assert!(parse_epoch_id("2025-06-01-16:30").is_none());
        assert!(parse_epoch_id("garbage").is_none());
    }

    #[test]
    fn test_epoch_end_is_four_hours_later() {
        let start = utc(2025, 6, 1, 8, 0, 0);
        assert_eq!(epoch_end(start), utc(2025, 6, 1, 12, 0, 0));
    }

    #[test]
    fn test_slot_boundary_is_exclusive_of_next() {
        // 04:00 exactly belongs to the 04:00 slot, not 00:00.
        let boundary = utc(2025, 6, 1, 4, 0, 0);
        assert_eq!(slot_start(boundary), boundary);
    }
}
