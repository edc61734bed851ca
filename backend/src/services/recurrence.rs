use chrono::{DateTime, Datelike, Days, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use shared::{CustomInterval, EndCondition, IntervalUnit, RecurrenceInterval, RecurrenceRule};

/// Compute the occurrence following `current` for a recurrence rule.
///
/// Date arithmetic runs on the calendar date of `current` as seen in `tz`, and the
/// wall-clock time of day of `current` is carried over unchanged.
/// Returns None when the rule is malformed or the result is out of range.
pub fn next_occurrence(current: DateTime<Utc>, rule: &RecurrenceRule, tz: Tz) -> Option<DateTime<Utc>> {
    let local = current.with_timezone(&tz).naive_local();
    let next_date = next_due_date(local.date(), rule)?;
    resolve_local(tz, next_date.and_time(local.time()))
}

/// Compute the next due date for a date-only series (recurring todos)
pub fn next_due_date(current: NaiveDate, rule: &RecurrenceRule) -> Option<NaiveDate> {
    match rule.interval {
        RecurrenceInterval::Daily => current.checked_add_days(Days::new(1)),
        RecurrenceInterval::Weekly => current.checked_add_days(Days::new(7)),
        RecurrenceInterval::Monthly => add_months(current, 1),
        RecurrenceInterval::Yearly => add_months(current, 12),
        RecurrenceInterval::Custom => next_custom_date(current, rule.custom_interval.as_ref()?),
        RecurrenceInterval::Unknown => None,
    }
}

/// Decide whether a series stops instead of producing the candidate occurrence.
///
/// `occurrence_index_after_this` is the number of occurrences the series will have
/// produced once the current one is accounted for. Malformed end conditions stop the
/// series.
pub fn should_end(rule: &RecurrenceRule, occurrence_index_after_this: u32, candidate: Option<NaiveDate>) -> bool {
    match rule.end_condition {
        EndCondition::Never => false,
        EndCondition::Count => rule
            .end_count
            .map_or(true, |end_count| occurrence_index_after_this >= end_count),
        EndCondition::UntilDate => match (candidate, rule.end_date) {
            (Some(candidate), Some(end_date)) => candidate > end_date,
            _ => true,
        },
        EndCondition::Unknown => true,
    }
}

/// Calendar date of a timestamp in the scheduler time zone
pub fn local_date(at: DateTime<Utc>, tz: Tz) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// Midnight at the start of `date` in the scheduler time zone
pub fn start_of_day(date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    resolve_local(tz, date.and_time(NaiveTime::MIN))
}

fn next_custom_date(current: NaiveDate, custom: &CustomInterval) -> Option<NaiveDate> {
    if custom.value == 0 {
        return None;
    }
    if custom.day_of_month.is_some_and(|day| !(1..=31).contains(&day)) {
        return None;
    }
    if custom.month_of_year.is_some_and(|month| !(1..=12).contains(&month)) {
        return None;
    }

    match custom.unit {
        IntervalUnit::Day => current.checked_add_days(Days::new(u64::from(custom.value))),
        IntervalUnit::Week => {
            let base = current.checked_add_days(Days::new(7 * u64::from(custom.value)))?;
            advance_to_weekday(base, custom.days_of_week.as_deref().unwrap_or_default())
        }
        IntervalUnit::Month => {
            let base = add_months(current, custom.value)?;
            match custom.day_of_month {
                Some(day) => with_clamped_day(base.year(), base.month(), day),
                None => Some(base),
            }
        }
        IntervalUnit::Year => {
            let base = add_months(current, custom.value.checked_mul(12)?)?;
            match (custom.month_of_year, custom.day_of_month) {
                (Some(month), Some(day)) => with_clamped_day(base.year(), month, day),
                _ => Some(base),
            }
        }
        IntervalUnit::Unknown => None,
    }
}

/// Step forward at least one day until the weekday is one of `days`.
/// Out-of-range weekday numbers are ignored; with none left the date is returned as is.
fn advance_to_weekday(base: NaiveDate, days: &[u8]) -> Option<NaiveDate> {
    let wanted: Vec<Weekday> = days.iter().filter_map(|day| weekday_from_u8(*day)).collect();
    if wanted.is_empty() {
        return Some(base);
    }

    let mut date = base;
    for _ in 0..7 {
        date = date.succ_opt()?;
        if wanted.contains(&date.weekday()) {
            return Some(date);
        }
    }
    None
}

/// Add whole months, clamping to the last day of the target month
fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    let total = i64::from(date.year()) * 12 + i64::from(date.month0()) + i64::from(months);
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = u32::try_from(total.rem_euclid(12)).ok()? + 1;
    with_clamped_day(year, month, date.day())
}

fn with_clamped_day(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    NaiveDate::from_ymd_opt(year, month, day.min(get_last_day_of_month(first)))
}

/// Map a local wall-clock time to UTC. Ambiguous times take the earlier instant and
/// times skipped by a DST jump move forward one hour.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    let resolved = match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => tz
            .from_local_datetime(&naive.checked_add_signed(Duration::hours(1))?)
            .earliest(),
    };
    resolved.map(|dt| dt.with_timezone(&Utc))
}

fn weekday_from_u8(day: u8) -> Option<Weekday> {
    match day {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

fn get_last_day_of_month(date: NaiveDate) -> u32 {
    let (year, month) = (date.year(), date.month());
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };

    next_month
        .map(|d| d.pred_opt().map(|p| p.day()).unwrap_or(28))
        .unwrap_or(28)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;
    use chrono_tz::UTC;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
    }

    fn custom(unit: IntervalUnit, value: u32) -> CustomInterval {
        CustomInterval::new(unit, value)
    }

    #[test]
    fn test_daily_and_weekly() {
        let daily = RecurrenceRule::new(RecurrenceInterval::Daily);
        let weekly = RecurrenceRule::new(RecurrenceInterval::Weekly);

        assert_eq!(next_due_date(date(2024, 12, 31), &daily), Some(date(2025, 1, 1)));
        assert_eq!(next_due_date(date(2024, 2, 26), &weekly), Some(date(2024, 3, 4)));
    }

    #[test]
    fn test_monthly_clamps_to_end_of_february() {
        let monthly = RecurrenceRule::new(RecurrenceInterval::Monthly);

        assert_eq!(next_due_date(date(2023, 1, 31), &monthly), Some(date(2023, 2, 28)));
        assert_eq!(next_due_date(date(2024, 1, 31), &monthly), Some(date(2024, 2, 29)));
    }

    #[test]
    fn test_monthly_keeps_day_when_it_fits() {
        let monthly = RecurrenceRule::new(RecurrenceInterval::Monthly);

        assert_eq!(next_due_date(date(2024, 1, 15), &monthly), Some(date(2024, 2, 15)));
        assert_eq!(next_due_date(date(2024, 12, 31), &monthly), Some(date(2025, 1, 31)));
        assert_eq!(next_due_date(date(2024, 3, 31), &monthly), Some(date(2024, 4, 30)));
    }

    #[test]
    fn test_yearly_from_leap_day() {
        let yearly = RecurrenceRule::new(RecurrenceInterval::Yearly);

        assert_eq!(next_due_date(date(2024, 2, 29), &yearly), Some(date(2025, 2, 28)));
        assert_eq!(next_due_date(date(2023, 7, 4), &yearly), Some(date(2024, 7, 4)));
    }

    #[test]
    fn test_custom_days_and_months() {
        let every_three_days = RecurrenceRule::custom(custom(IntervalUnit::Day, 3));
        assert_eq!(next_due_date(date(2024, 2, 27), &every_three_days), Some(date(2024, 3, 1)));

        let quarterly = RecurrenceRule::custom(custom(IntervalUnit::Month, 3));
        assert_eq!(next_due_date(date(2024, 11, 30), &quarterly), Some(date(2025, 2, 28)));
    }

    #[test]
    fn test_custom_week_lands_on_selected_weekday() {
        let mut interval = custom(IntervalUnit::Week, 1);
        interval.days_of_week = Some(vec![1, 3, 5]);
        let rule = RecurrenceRule::custom(interval);

        // 2024-01-15 is a Monday
        let monday = date(2024, 1, 15);
        let next = next_due_date(monday, &rule).unwrap();

        assert!(next >= date(2024, 1, 17));
        assert!(matches!(next.weekday(), Weekday::Mon | Weekday::Wed | Weekday::Fri));
        assert_eq!(next, date(2024, 1, 24));
    }

    #[test]
    fn test_custom_week_every_landing_day_is_selected() {
        let mut interval = custom(IntervalUnit::Week, 2);
        interval.days_of_week = Some(vec![0, 6]);
        let rule = RecurrenceRule::custom(interval);

        let mut current = date(2024, 1, 1);
        for _ in 0..20 {
            let next = next_due_date(current, &rule).unwrap();
            assert!(next > current);
            assert!(matches!(next.weekday(), Weekday::Sat | Weekday::Sun));
            current = next;
        }
    }

    #[test]
    fn test_custom_week_without_days_is_plain_weeks() {
        let rule = RecurrenceRule::custom(custom(IntervalUnit::Week, 2));
        assert_eq!(next_due_date(date(2024, 1, 15), &rule), Some(date(2024, 1, 29)));

        let mut interval = custom(IntervalUnit::Week, 1);
        interval.days_of_week = Some(vec![9]);
        let rule = RecurrenceRule::custom(interval);
        assert_eq!(next_due_date(date(2024, 1, 15), &rule), Some(date(2024, 1, 22)));
    }

    #[test]
    fn test_custom_month_with_day_of_month() {
        let mut interval = custom(IntervalUnit::Month, 1);
        interval.day_of_month = Some(31);
        let rule = RecurrenceRule::custom(interval);

        assert_eq!(next_due_date(date(2024, 1, 10), &rule), Some(date(2024, 2, 29)));
        assert_eq!(next_due_date(date(2024, 2, 29), &rule), Some(date(2024, 3, 31)));

        let mut interval = custom(IntervalUnit::Month, 2);
        interval.day_of_month = Some(5);
        let rule = RecurrenceRule::custom(interval);
        assert_eq!(next_due_date(date(2024, 1, 20), &rule), Some(date(2024, 3, 5)));
    }

    #[test]
    fn test_custom_year_with_month_and_day() {
        let mut interval = custom(IntervalUnit::Year, 1);
        interval.month_of_year = Some(2);
        interval.day_of_month = Some(30);
        let rule = RecurrenceRule::custom(interval);

        assert_eq!(next_due_date(date(2023, 6, 1), &rule), Some(date(2024, 2, 29)));
        assert_eq!(next_due_date(date(2024, 6, 1), &rule), Some(date(2025, 2, 28)));

        // month without a day is not enough to force the date
        let mut interval = custom(IntervalUnit::Year, 1);
        interval.month_of_year = Some(2);
        let rule = RecurrenceRule::custom(interval);
        assert_eq!(next_due_date(date(2024, 6, 1), &rule), Some(date(2025, 6, 1)));
    }

    #[test]
    fn test_invalid_rules_cannot_be_computed() {
        let start = date(2024, 1, 15);

        assert_eq!(next_due_date(start, &RecurrenceRule::new(RecurrenceInterval::Custom)), None);
        assert_eq!(next_due_date(start, &RecurrenceRule::new(RecurrenceInterval::Unknown)), None);
        assert_eq!(next_due_date(start, &RecurrenceRule::custom(custom(IntervalUnit::Unknown, 1))), None);
        assert_eq!(next_due_date(start, &RecurrenceRule::custom(custom(IntervalUnit::Day, 0))), None);

        let mut interval = custom(IntervalUnit::Month, 1);
        interval.day_of_month = Some(32);
        assert_eq!(next_due_date(start, &RecurrenceRule::custom(interval)), None);

        let mut interval = custom(IntervalUnit::Year, 1);
        interval.month_of_year = Some(13);
        interval.day_of_month = Some(1);
        assert_eq!(next_due_date(start, &RecurrenceRule::custom(interval)), None);
    }

    #[test]
    fn test_next_occurrence_keeps_time_of_day() {
        let monthly = RecurrenceRule::new(RecurrenceInterval::Monthly);
        let current = Utc.with_ymd_and_hms(2024, 1, 31, 17, 45, 12).unwrap()
            + Duration::milliseconds(250);

        let next = next_occurrence(current, &monthly, UTC).unwrap();

        assert_eq!(next, Utc.with_ymd_and_hms(2024, 2, 29, 17, 45, 12).unwrap() + Duration::milliseconds(250));
    }

    #[test]
    fn test_next_occurrence_keeps_local_time_across_dst() {
        let daily = RecurrenceRule::new(RecurrenceInterval::Daily);

        // 09:30 EST on the day before the spring-forward switch
        let current = utc(2024, 3, 9, 14, 30);
        let next = next_occurrence(current, &daily, New_York).unwrap();

        // 09:30 EDT
        assert_eq!(next, utc(2024, 3, 10, 13, 30));
    }

    #[test]
    fn test_next_occurrence_skips_forward_over_dst_gap() {
        let daily = RecurrenceRule::new(RecurrenceInterval::Daily);

        // 02:30 EST, a time that does not exist on 2024-03-10
        let current = utc(2024, 3, 9, 7, 30);
        let next = next_occurrence(current, &daily, New_York).unwrap();

        // 03:30 EDT
        assert_eq!(next, utc(2024, 3, 10, 7, 30));
    }

    #[test]
    fn test_next_occurrence_invalid_rule() {
        let rule = RecurrenceRule::new(RecurrenceInterval::Unknown);
        assert_eq!(next_occurrence(utc(2024, 1, 1, 8, 0), &rule, UTC), None);
    }

    #[test]
    fn test_should_end_never() {
        let rule = RecurrenceRule::new(RecurrenceInterval::Daily);
        assert!(!should_end(&rule, 1, Some(date(2024, 1, 1))));
        assert!(!should_end(&rule, 10_000, None));
    }

    #[test]
    fn test_should_end_count() {
        let rule = RecurrenceRule::new(RecurrenceInterval::Daily).ending_after(3);

        assert!(!should_end(&rule, 1, None));
        assert!(!should_end(&rule, 2, None));
        assert!(should_end(&rule, 3, None));
        assert!(should_end(&rule, 4, None));
    }

    #[test]
    fn test_should_end_until_date() {
        let rule = RecurrenceRule::new(RecurrenceInterval::Daily).ending_on(date(2024, 6, 1));

        assert!(should_end(&rule, 1, Some(date(2024, 6, 2))));
        assert!(!should_end(&rule, 1, Some(date(2024, 5, 31))));
        assert!(!should_end(&rule, 1, Some(date(2024, 6, 1))));
        assert!(should_end(&rule, 1, None));
    }

    #[test]
    fn test_should_end_fails_closed() {
        let mut rule = RecurrenceRule::new(RecurrenceInterval::Daily);
        rule.end_condition = EndCondition::Unknown;
        assert!(should_end(&rule, 0, Some(date(2024, 1, 1))));

        let mut rule = RecurrenceRule::new(RecurrenceInterval::Daily);
        rule.end_condition = EndCondition::Count;
        assert!(should_end(&rule, 0, None));

        let mut rule = RecurrenceRule::new(RecurrenceInterval::Daily);
        rule.end_condition = EndCondition::UntilDate;
        assert!(should_end(&rule, 0, Some(date(2024, 1, 1))));
    }

    #[test]
    fn test_start_of_day_in_timezone() {
        assert_eq!(start_of_day(date(2024, 7, 4), UTC), Some(utc(2024, 7, 4, 0, 0)));
        assert_eq!(start_of_day(date(2024, 7, 4), New_York), Some(utc(2024, 7, 4, 4, 0)));
    }

    #[test]
    fn test_local_date() {
        assert_eq!(local_date(utc(2024, 7, 4, 2, 0), New_York), date(2024, 7, 3));
        assert_eq!(local_date(utc(2024, 7, 4, 2, 0), UTC), date(2024, 7, 4));
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(get_last_day_of_month(date(2024, 1, 15)), 31);
        assert_eq!(get_last_day_of_month(date(2024, 2, 15)), 29);
        assert_eq!(get_last_day_of_month(date(2023, 2, 15)), 28);
        assert_eq!(get_last_day_of_month(date(2024, 12, 1)), 31);
    }
}
