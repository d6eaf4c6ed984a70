/// The event times in the detail report look like `Mon Oct 26 17:43:07`: a weekday, month, day and
/// time, but no year.  We attach the current year, and if that puts the event in the future then
/// the event happened last year.
use chrono::{Datelike, NaiveDateTime};

pub fn parse_bjobs_time(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let fields = text.split_whitespace().collect::<Vec<&str>>();
    if fields.len() != 4 {
        return None;
    }
    // The weekday is dropped; it belongs to the unknown year.
    let rest = fields[1..].join(" ");
    let this_year = now.year();
    match with_year(&rest, this_year) {
        Some(t) if t <= now => Some(t),
        // Either in the future, or Feb 29 in a year that does not have one.
        _ => with_year(&rest, this_year - 1),
    }
}

fn with_year(text: &str, year: i32) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&format!("{year} {text}"), "%Y %b %d %H:%M:%S").ok()
}

#[test]
fn test_parse_bjobs_time() {
    let now = NaiveDateTime::parse_from_str("2024-11-02 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap();

    let t = parse_bjobs_time("Mon Oct 26 17:43:07", now).unwrap();
    assert!(t.format("%Y%m%d_%H%M%S").to_string() == "20241026_174307");

    // December is in the future in November, so it must be last December.
    let t = parse_bjobs_time("Fri Dec 15 08:00:00", now).unwrap();
    assert!(t.format("%Y%m%d_%H%M%S").to_string() == "20231215_080000");

    // A leap day that does not exist this year belongs to an earlier year.
    let now = NaiveDateTime::parse_from_str("2025-03-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
    let t = parse_bjobs_time("Thu Feb 29 10:00:00", now).unwrap();
    assert!(t.year() == 2024);

    assert!(parse_bjobs_time("", now).is_none());
    assert!(parse_bjobs_time("N/A", now).is_none());
    assert!(parse_bjobs_time("Mon Foo 26 17:43:07", now).is_none());
}
