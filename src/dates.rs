use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

const MONTH_NAMES_PT_BR: [&str; 12] = [
    "janeiro",
    "fevereiro",
    "março",
    "abril",
    "maio",
    "junho",
    "julho",
    "agosto",
    "setembro",
    "outubro",
    "novembro",
    "dezembro",
];

pub fn format_date(value: DateTime<Utc>) -> String {
    value.format("%d/%m/%Y").to_string()
}

pub fn format_date_time(value: DateTime<Utc>) -> String {
    value.format("%d/%m/%Y %H:%M").to_string()
}

/// Month name and year in the dashboard locale, e.g. `março 2024`.
pub fn month_label(month: NaiveDate) -> String {
    let name = MONTH_NAMES_PT_BR[month.month0() as usize];
    format!("{} {}", name, month.year())
}

/// First day of each of the `count` calendar months ending with the month of
/// `today`, oldest first.
pub fn months_ending_at(today: NaiveDate, count: u32) -> Vec<NaiveDate> {
    let Some(current) = today.with_day(1) else {
        return Vec::new();
    };
    (0..count)
        .rev()
        .filter_map(|back| current.checked_sub_months(Months::new(back)))
        .collect()
}

pub fn same_month(value: DateTime<Utc>, month: NaiveDate) -> bool {
    value.year() == month.year() && value.month() == month.month()
}

/// Whole days from `now` until `end`, rounded up.
pub fn days_until(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (end - now).num_milliseconds();
    -((-millis).div_euclid(MILLIS_PER_DAY))
}
