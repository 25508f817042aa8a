use chrono::{Datelike, NaiveDate};

pub const SECONDS_PER_HOUR: f64 = 3600.0;
pub const SECONDS_PER_DAY: f64 = 86400.0;
pub const BYTES_PER_GIGABYTE: f64 = 1_073_741_824.0;

pub fn core_seconds_to_hours(value: f64) -> f64 {
    value / SECONDS_PER_HOUR
}

pub fn byte_seconds_to_gigabyte_hours(value: f64) -> f64 {
    value / SECONDS_PER_HOUR / BYTES_PER_GIGABYTE
}

pub fn bytes_to_gigabytes(value: f64) -> f64 {
    value / BYTES_PER_GIGABYTE
}

/// Storage byte-seconds to GiB-months, using the length of the month `date`
/// falls in.
pub fn byte_seconds_to_gigabyte_months(value: f64, date: NaiveDate) -> f64 {
    value / SECONDS_PER_DAY * f64::from(days_in_month(date)) / BYTES_PER_GIGABYTE
}

pub fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1);
    let next = NaiveDate::from_ymd_opt(year, month, 1);
    match (first, next) {
        (Some(first), Some(next)) => (next - first).num_days() as u32,
        _ => 30,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn converts_core_seconds() {
        assert!(close(core_seconds_to_hours(7200.0), 2.0));
    }

    #[test]
    fn converts_memory_byte_seconds() {
        assert!(close(byte_seconds_to_gigabyte_hours(3600.0 * BYTES_PER_GIGABYTE), 1.0));
        assert!(close(bytes_to_gigabytes(2.0 * BYTES_PER_GIGABYTE), 2.0));
    }

    #[test]
    fn converts_storage_to_month_based_units() {
        let september = NaiveDate::from_ymd_opt(2018, 9, 15).expect("date");
        let value = SECONDS_PER_DAY * BYTES_PER_GIGABYTE;
        assert!(close(byte_seconds_to_gigabyte_months(value, september), 30.0));

        let january = NaiveDate::from_ymd_opt(2019, 1, 3).expect("date");
        assert!(close(byte_seconds_to_gigabyte_months(value, january), 31.0));
    }

    #[test]
    fn counts_days_in_month() {
        let feb_leap = NaiveDate::from_ymd_opt(2020, 2, 10).expect("date");
        let feb = NaiveDate::from_ymd_opt(2019, 2, 10).expect("date");
        let december = NaiveDate::from_ymd_opt(2018, 12, 31).expect("date");
        assert_eq!(days_in_month(feb_leap), 29);
        assert_eq!(days_in_month(feb), 28);
        assert_eq!(days_in_month(december), 31);
    }
}
