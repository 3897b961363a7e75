use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

pub const DEFAULT_PAGE_SIZE: i64 = 100;

/// Midnight UTC of `day`.
pub fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// `%needle%` for ILIKE, with the pattern metacharacters of `needle` escaped.
pub fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for ch in needle.trim().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_start_is_utc_midnight() {
        let day = NaiveDate::from_ymd_opt(2025, 4, 30).unwrap();
        assert_eq!(day_start(day), Utc.with_ymd_and_hms(2025, 4, 30, 0, 0, 0).unwrap());
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" cable "), "%cable%");
        assert_eq!(like_pattern("50%_a\\b"), "%50\\%\\_a\\\\b%");
    }
}
