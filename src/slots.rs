use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Fixed booking grid step. Every declared shift range is cut into
/// intervals of this length.
pub const SLOT_STEP_MINUTES: i64 = 30;

/// Morning/afternoon half of a day's declared hours.
/// Stored as smallint; ordering matters (morning sorts before afternoon).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum Shift {
    Morning = 0,
    Afternoon = 1,
}

impl Shift {
    pub fn as_str(self) -> &'static str {
        match self {
            Shift::Morning => "AM",
            Shift::Afternoon => "PM",
        }
    }
}

/// One bookable (date, shift, time) unit before persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratedSlot {
    pub date: NaiveDate,
    pub shift: Shift,
    pub time: NaiveTime,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SlotError {
    #[error("at least one shift range with start before end is required")]
    InvalidRange,
}

/// Expands declared shift ranges over a set of attendance dates into the
/// discrete slot grid: the Cartesian product of dates x generated shift times,
/// ordered by date, then shift, then time.
///
/// Per range the start time is emitted, then the step is added while
/// `current + step <= end` — so the end boundary itself becomes a slot start
/// when it lands exactly on a step, and a trailing partial interval is
/// dropped. A missing pair, or one with start >= end, contributes nothing.
///
/// Callers supply deduplicated, sorted dates; duplicates would come back out
/// as duplicate grid entries.
pub fn expand_ranges(
    morning: Option<(NaiveTime, NaiveTime)>,
    afternoon: Option<(NaiveTime, NaiveTime)>,
    dates: &[NaiveDate],
) -> Result<Vec<GeneratedSlot>, SlotError> {
    let morning_times = shift_times(morning);
    let afternoon_times = shift_times(afternoon);

    if morning_times.is_empty() && afternoon_times.is_empty() {
        return Err(SlotError::InvalidRange);
    }

    let mut grid = Vec::with_capacity(dates.len() * (morning_times.len() + afternoon_times.len()));
    for &date in dates {
        for &time in &morning_times {
            grid.push(GeneratedSlot { date, shift: Shift::Morning, time });
        }
        for &time in &afternoon_times {
            grid.push(GeneratedSlot { date, shift: Shift::Afternoon, time });
        }
    }
    Ok(grid)
}

fn shift_times(range: Option<(NaiveTime, NaiveTime)>) -> Vec<NaiveTime> {
    let Some((start, end)) = range else {
        return Vec::new();
    };
    if start >= end {
        return Vec::new();
    }

    let step = Duration::minutes(SLOT_STEP_MINUTES);
    let mut times = vec![start];
    let mut current = start;
    loop {
        // overflowing_add_signed: wrap past midnight must terminate the range
        let (next, wrapped) = current.overflowing_add_signed(step);
        if wrapped != 0 || next > end {
            break;
        }
        times.push(next);
        current = next;
    }
    times
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, mo: u32, da: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, mo, da).unwrap()
    }

    #[test]
    fn morning_range_includes_end_boundary_on_step() {
        let grid = expand_ranges(Some((t(8, 0), t(9, 0))), None, &[d(2025, 3, 10)]).unwrap();
        let times: Vec<NaiveTime> = grid.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![t(8, 0), t(8, 30), t(9, 0)]);
        assert!(grid.iter().all(|s| s.shift == Shift::Morning));
        assert!(grid.iter().all(|s| s.date == d(2025, 3, 10)));
    }

    #[test]
    fn trailing_partial_interval_is_dropped() {
        let grid = expand_ranges(Some((t(8, 0), t(8, 45))), None, &[d(2025, 3, 10)]).unwrap();
        let times: Vec<NaiveTime> = grid.iter().map(|s| s.time).collect();
        // 08:30 + 30m = 09:00 > 08:45, so nothing past 08:30
        assert_eq!(times, vec![t(8, 0), t(8, 30)]);
    }

    #[test]
    fn never_emits_past_end_and_gap_is_exactly_one_step() {
        let grid = expand_ranges(Some((t(9, 0), t(12, 0))), None, &[d(2025, 6, 2)]).unwrap();
        let end = t(12, 0);
        for pair in grid.windows(2) {
            assert!(pair[0].time <= end && pair[1].time <= end);
            assert_eq!(pair[1].time - pair[0].time, Duration::minutes(SLOT_STEP_MINUTES));
        }
    }

    #[test]
    fn cross_product_is_ordered_date_then_shift_then_time() {
        let dates = [d(2025, 3, 10), d(2025, 3, 12)];
        let grid = expand_ranges(
            Some((t(8, 0), t(8, 30))),
            Some((t(14, 0), t(14, 30))),
            &dates,
        )
        .unwrap();
        let keys: Vec<(NaiveDate, Shift, NaiveTime)> =
            grid.iter().map(|s| (s.date, s.shift, s.time)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        // 2 times per shift, 2 shifts, 2 dates
        assert_eq!(grid.len(), 8);
    }

    #[test]
    fn inverted_range_contributes_no_slots_for_that_shift() {
        let grid = expand_ranges(
            Some((t(9, 0), t(8, 0))),
            Some((t(14, 0), t(15, 0))),
            &[d(2025, 3, 10)],
        )
        .unwrap();
        assert!(grid.iter().all(|s| s.shift == Shift::Afternoon));
    }

    #[test]
    fn no_usable_range_is_an_error() {
        assert_eq!(
            expand_ranges(None, None, &[d(2025, 3, 10)]),
            Err(SlotError::InvalidRange)
        );
        assert_eq!(
            expand_ranges(Some((t(9, 0), t(9, 0))), Some((t(15, 0), t(14, 0))), &[d(2025, 3, 10)]),
            Err(SlotError::InvalidRange)
        );
    }

    #[test]
    fn range_ending_near_midnight_terminates() {
        let grid = expand_ranges(None, Some((t(23, 0), t(23, 59))), &[d(2025, 3, 10)]).unwrap();
        let times: Vec<NaiveTime> = grid.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![t(23, 0), t(23, 30)]);
    }
}
