//! Projection of recurring weekly availability onto concrete calendar dates.
//!
//! A course advertises availability as weekly slots ("Monday 09:00:00 to
//! 10:00:00"). Booking needs concrete dates, so each distinct weekday is
//! scanned forward from today (inclusive) to its next few occurrences.

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};

use crate::models::CourseAvailability;

/// How many upcoming occurrences of each weekday are offered for booking.
pub const OCCURRENCES_PER_WEEKDAY: usize = 4;

pub fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.to_ascii_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn parse_wall_clock(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

/// Next occurrence of `weekday` counted forward from `from`, inclusive:
/// when `from` already falls on `weekday` it is returned unchanged.
pub fn next_occurrence(from: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (weekday.num_days_from_monday() + 7 - from.weekday().num_days_from_monday()) % 7;
    from + chrono::Days::new(u64::from(ahead))
}

/// Concrete selectable dates for a set of weekly slots: for each distinct
/// weekday present, its next `occurrences` dates from `today` inclusive,
/// merged, deduplicated and sorted ascending. Rows with unrecognized day
/// names are skipped.
pub fn project_dates(
    slots: &[CourseAvailability],
    today: NaiveDate,
    occurrences: usize,
) -> Vec<NaiveDate> {
    let mut weekdays: Vec<Weekday> = slots
        .iter()
        .filter_map(|s| parse_weekday(&s.day_of_week))
        .collect();
    weekdays.sort_by_key(|w| w.num_days_from_monday());
    weekdays.dedup();

    let mut dates = Vec::with_capacity(weekdays.len() * occurrences);
    for weekday in weekdays {
        let mut next = next_occurrence(today, weekday);
        for _ in 0..occurrences {
            dates.push(next);
            next = next + chrono::Days::new(7);
        }
    }
    dates.sort();
    dates.dedup();
    dates
}

/// The slots bookable on a concrete date: rows whose weekday matches,
/// sorted by start time.
pub fn slots_for_date(slots: &[CourseAvailability], date: NaiveDate) -> Vec<CourseAvailability> {
    let mut matching: Vec<CourseAvailability> = slots
        .iter()
        .filter(|s| parse_weekday(&s.day_of_week) == Some(date.weekday()))
        .cloned()
        .collect();
    matching.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    matching
}

/// Combine a calendar date with a wall-clock start time into the session's
/// concrete start instant, kept naive-local as `YYYY-MM-DDTHH:MM:SS`.
pub fn combine(date: NaiveDate, start_time: &str) -> Option<String> {
    let time = parse_wall_clock(start_time)?;
    Some(date.and_time(time).format("%Y-%m-%dT%H:%M:%S").to_string())
}

/// Slot length in whole hours, never less than one.
pub fn slot_duration_hours(start_time: &str, end_time: &str) -> i64 {
    let (Some(start), Some(end)) = (parse_wall_clock(start_time), parse_wall_clock(end_time))
    else {
        return 1;
    };
    let hours = (end - start).num_hours();
    hours.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(day: &str, start: &str, end: &str) -> CourseAvailability {
        CourseAvailability {
            id: format!("slot-{}-{}", day, start),
            course_id: "course-1".to_string(),
            day_of_week: day.to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
        }
    }

    #[test]
    fn projects_four_dates_per_weekday_sorted() {
        let slots = vec![
            slot("Monday", "09:00:00", "10:00:00"),
            slot("Wednesday", "14:00:00", "15:00:00"),
        ];
        // 2025-01-07 is a Tuesday.
        let today = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        let dates = project_dates(&slots, today, OCCURRENCES_PER_WEEKDAY);

        assert_eq!(dates.len(), 8);
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
        for date in &dates {
            assert!(matches!(date.weekday(), Weekday::Mon | Weekday::Wed));
        }
        let mondays: Vec<_> = dates.iter().filter(|d| d.weekday() == Weekday::Mon).collect();
        assert_eq!(mondays.len(), 4);
        assert_eq!(*mondays[0], NaiveDate::from_ymd_opt(2025, 1, 13).unwrap());
    }

    #[test]
    fn today_counts_when_weekday_matches() {
        let slots = vec![slot("Monday", "09:00:00", "10:00:00")];
        // 2025-01-06 is a Monday.
        let today = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let dates = project_dates(&slots, today, OCCURRENCES_PER_WEEKDAY);
        assert_eq!(dates[0], today);
        assert_eq!(dates.len(), 4);
    }

    #[test]
    fn duplicate_weekday_rows_do_not_duplicate_dates() {
        let slots = vec![
            slot("Monday", "09:00:00", "10:00:00"),
            slot("Monday", "11:00:00", "12:00:00"),
        ];
        let today = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let dates = project_dates(&slots, today, OCCURRENCES_PER_WEEKDAY);
        assert_eq!(dates.len(), 4);
    }

    #[test]
    fn unknown_day_names_are_skipped() {
        let slots = vec![slot("Someday", "09:00:00", "10:00:00")];
        let today = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        assert!(project_dates(&slots, today, OCCURRENCES_PER_WEEKDAY).is_empty());
    }

    #[test]
    fn slots_for_date_filters_and_sorts() {
        let slots = vec![
            slot("Monday", "14:00:00", "15:00:00"),
            slot("Monday", "09:00:00", "10:00:00"),
            slot("Tuesday", "09:00:00", "10:00:00"),
        ];
        let monday = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let matching = slots_for_date(&slots, monday);
        assert_eq!(matching.len(), 2);
        assert_eq!(matching[0].start_time, "09:00:00");
        assert_eq!(matching[1].start_time, "14:00:00");
    }

    #[test]
    fn combine_builds_naive_local_instant() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 14).unwrap();
        assert_eq!(
            combine(date, "09:00:00").unwrap(),
            "2025-01-14T09:00:00".to_string()
        );
        assert!(combine(date, "not a time").is_none());
    }

    #[test]
    fn duration_is_whole_hours_with_floor_of_one() {
        assert_eq!(slot_duration_hours("09:00:00", "10:00:00"), 1);
        assert_eq!(slot_duration_hours("09:00:00", "11:30:00"), 2);
        assert_eq!(slot_duration_hours("09:00:00", "09:30:00"), 1);
    }
}
