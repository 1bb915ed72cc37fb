//! Night window membership.
//!
//! A night window is a pair of wall-clock times. It may sit inside a single
//! day (`00:30`-`23:00`) or cross midnight (`23:00`-`07:00`). Both shapes use
//! the same test: look at the four boundary instants of today and yesterday
//! and find the one crossed most recently. If that was a start boundary the
//! timestamp is inside the window.

use chrono::{
    DateTime, Duration, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
    Utc,
};
use chrono_tz::Tz;

/// Wall-clock format used for window boundaries in configuration.
pub const BOUNDARY_FORMAT: &str = "%H:%M";

/// Human readable timestamp format used in alert text.
pub const ALERT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How far back a boundary may lie and still count as "most recently crossed".
/// One calendar day can be 25 hours long on a fall-back date.
const LOOKBACK_MS: i64 = 26 * 60 * 60 * 1000;

/// Longest stretch of wall-clock time a zone transition can skip.
const MAX_GAP_MINUTES: i64 = 3 * 60;

/// Configured night interval as two times of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl NightWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse a window from `"HH:MM"` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, WindowError> {
        Ok(Self {
            start: parse_boundary("night_start", start)?,
            end: parse_boundary("night_end", end)?,
        })
    }

    /// Whether the window spans midnight (`start > end`).
    pub fn crosses_midnight(&self) -> bool {
        self.start > self.end
    }

    /// Minute-granularity equality with the window end.
    pub fn is_end_minute(&self, time: NaiveTime) -> bool {
        time.hour() == self.end.hour() && time.minute() == self.end.minute()
    }
}

impl std::fmt::Display for NightWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format(BOUNDARY_FORMAT),
            self.end.format(BOUNDARY_FORMAT)
        )
    }
}

fn parse_boundary(field: &'static str, value: &str) -> Result<NaiveTime, WindowError> {
    NaiveTime::parse_from_str(value.trim(), BOUNDARY_FORMAT).map_err(|_| {
        WindowError::InvalidBoundary {
            field,
            value: value.to_string(),
        }
    })
}

/// Window and time zone errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    InvalidBoundary { field: &'static str, value: String },
    UnknownTimezone(String),
}

impl std::fmt::Display for WindowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowError::InvalidBoundary { field, value } => {
                write!(f, "{field} must be HH:MM, got {value:?}")
            }
            WindowError::UnknownTimezone(name) => write!(f, "Unknown timezone: {name}"),
        }
    }
}

impl std::error::Error for WindowError {}

/// Returns true if `at` falls inside `window`, evaluated in `at`'s own zone.
///
/// A boundary that falls exactly on `at` counts as crossed, so the window is
/// half-open: `start <= t < end`. When a start and an end boundary coincide
/// the end wins, which makes `start == end` an empty window. A boundary that
/// falls in a DST gap takes effect at the first instant after the gap.
pub fn is_within_night_window<Z: TimeZone>(at: &DateTime<Z>, window: &NightWindow) -> bool {
    let zone = at.timezone();
    let today = at.date_naive();
    let Some(yesterday) = today.pred_opt() else {
        return false;
    };
    let at_ms = at.timestamp_millis();

    let mut nearest: Option<(i64, bool)> = None;
    for day in [yesterday, today] {
        for (time, is_start) in [(window.start, true), (window.end, false)] {
            let Some(instant) = resolve_local(&zone, day.and_time(time)) else {
                continue;
            };
            let distance = at_ms - instant.timestamp_millis();
            if !(0..=LOOKBACK_MS).contains(&distance) {
                continue;
            }
            let closer = match nearest {
                None => true,
                Some((best, best_is_start)) => {
                    distance < best || (distance == best && best_is_start && !is_start)
                }
            };
            if closer {
                nearest = Some((distance, is_start));
            }
        }
    }

    nearest.map(|(_, is_start)| is_start).unwrap_or(false)
}

/// Start and end instants of the night that ends on `end_day`.
fn instants_ending_on<Z: TimeZone>(
    zone: &Z,
    end_day: NaiveDate,
    window: &NightWindow,
) -> Option<(DateTime<Z>, DateTime<Z>)> {
    let start_day = if window.crosses_midnight() {
        end_day.pred_opt()?
    } else {
        end_day
    };
    let start = resolve_local(zone, start_day.and_time(window.start))?;
    let end = resolve_local(zone, end_day.and_time(window.end))?;
    Some((start, end))
}

/// Map a wall-clock time to an instant. Repeated times take the earlier
/// instant; skipped times move forward to the end of the gap.
fn resolve_local<Z: TimeZone>(zone: &Z, naive: NaiveDateTime) -> Option<DateTime<Z>> {
    (0..=MAX_GAP_MINUTES).find_map(|minutes| {
        let candidate = naive + Duration::minutes(minutes);
        match zone.from_local_datetime(&candidate) {
            LocalResult::Single(instant) => Some(instant),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => None,
        }
    })
}

/// Convert fractional epoch seconds into a UTC instant.
pub fn to_utc(timestamp: f64) -> Option<DateTime<Utc>> {
    if !timestamp.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt((timestamp * 1000.0).round() as i64).single()
}

/// The wall clock the night window is evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WallClock {
    /// Host local time.
    #[default]
    Local,
    /// A named IANA zone.
    Zone(Tz),
}

impl WallClock {
    /// Resolve an optional IANA zone name; `None` means host local time.
    pub fn from_name(name: Option<&str>) -> Result<Self, WindowError> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            None => Ok(WallClock::Local),
            Some(name) => name
                .parse::<Tz>()
                .map(WallClock::Zone)
                .map_err(|_| WindowError::UnknownTimezone(name.to_string())),
        }
    }

    /// Night window membership for fractional epoch seconds.
    pub fn contains(&self, window: &NightWindow, timestamp: f64) -> bool {
        let Some(utc) = to_utc(timestamp) else {
            return false;
        };
        match self {
            WallClock::Local => is_within_night_window(&utc.with_timezone(&Local), window),
            WallClock::Zone(tz) => is_within_night_window(&utc.with_timezone(tz), window),
        }
    }

    /// Local time of day for a timestamp.
    pub fn time_of_day(&self, timestamp: f64) -> Option<NaiveTime> {
        let utc = to_utc(timestamp)?;
        Some(match self {
            WallClock::Local => utc.with_timezone(&Local).time(),
            WallClock::Zone(tz) => utc.with_timezone(tz).time(),
        })
    }

    /// Local calendar day for a timestamp.
    pub fn date(&self, timestamp: f64) -> Option<NaiveDate> {
        let utc = to_utc(timestamp)?;
        Some(match self {
            WallClock::Local => utc.with_timezone(&Local).date_naive(),
            WallClock::Zone(tz) => utc.with_timezone(tz).date_naive(),
        })
    }

    /// Format a timestamp for alert text.
    pub fn format(&self, timestamp: f64) -> String {
        match to_utc(timestamp) {
            Some(utc) => match self {
                WallClock::Local => utc.with_timezone(&Local).format(ALERT_TIME_FORMAT).to_string(),
                WallClock::Zone(tz) => utc.with_timezone(tz).format(ALERT_TIME_FORMAT).to_string(),
            },
            None => format!("{timestamp}"),
        }
    }

    /// Epoch seconds of `time` on the local day containing `timestamp`.
    pub fn same_day_at(&self, timestamp: f64, time: NaiveTime) -> Option<f64> {
        let naive = self.date(timestamp)?.and_time(time);
        let millis = match self {
            WallClock::Local => resolve_local(&Local, naive)?.timestamp_millis(),
            WallClock::Zone(tz) => resolve_local(tz, naive)?.timestamp_millis(),
        };
        Some(millis as f64 / 1000.0)
    }

    /// Epoch seconds of the effective start and end of the night that ends
    /// on the local day containing `timestamp`.
    pub fn window_instants(&self, window: &NightWindow, timestamp: f64) -> Option<(f64, f64)> {
        let day = self.date(timestamp)?;
        let (start, end) = match self {
            WallClock::Local => {
                let (s, e) = instants_ending_on(&Local, day, window)?;
                (s.timestamp_millis(), e.timestamp_millis())
            }
            WallClock::Zone(tz) => {
                let (s, e) = instants_ending_on(tz, day, window)?;
                (s.timestamp_millis(), e.timestamp_millis())
            }
        };
        Some((start as f64 / 1000.0, end as f64 / 1000.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn utc_at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, h, m, 0).unwrap()
    }

    fn inside(window: &NightWindow, h: u32, m: u32) -> bool {
        is_within_night_window(&utc_at(h, m), window)
    }

    #[test]
    fn test_midnight_crossing_examples() {
        let window = NightWindow::parse("23:00", "07:00").unwrap();
        assert!(window.crosses_midnight());

        assert!(inside(&window, 23, 30));
        assert!(inside(&window, 6, 59));
        assert!(inside(&window, 0, 0));
        assert!(!inside(&window, 7, 1));
        assert!(!inside(&window, 12, 0));
    }

    #[test]
    fn test_edges_are_half_open() {
        let window = NightWindow::parse("23:00", "07:00").unwrap();
        assert!(inside(&window, 23, 0));
        assert!(!inside(&window, 7, 0));

        let same_day = NightWindow::parse("00:30", "23:00").unwrap();
        assert!(inside(&same_day, 0, 30));
        assert!(!inside(&same_day, 23, 0));
    }

    #[test]
    fn test_every_minute_matches_closed_form() {
        let windows = [
            NightWindow::new(hm(23, 0), hm(7, 0)),
            NightWindow::new(hm(0, 30), hm(23, 0)),
            NightWindow::new(hm(21, 15), hm(5, 45)),
            NightWindow::new(hm(1, 0), hm(4, 0)),
        ];
        let midnight = utc_at(0, 0);

        for window in &windows {
            for minute in 0..(24 * 60) {
                let at = midnight + Duration::minutes(minute);
                let tod = at.time();
                let expected = if window.start < window.end {
                    window.start <= tod && tod < window.end
                } else {
                    tod >= window.start || tod < window.end
                };
                assert_eq!(
                    is_within_night_window(&at, window),
                    expected,
                    "window {window} at {tod}"
                );
            }
        }
    }

    #[test]
    fn test_empty_window_is_never_inside() {
        let window = NightWindow::parse("22:00", "22:00").unwrap();
        for h in 0..24 {
            assert!(!inside(&window, h, 0));
        }
    }

    #[test]
    fn test_invalid_boundary() {
        let err = NightWindow::parse("25:00", "07:00").unwrap_err();
        assert!(matches!(
            err,
            WindowError::InvalidBoundary { field: "night_start", .. }
        ));
        assert!(NightWindow::parse("23:00", "").is_err());
    }

    #[test]
    fn test_named_zone_is_applied() {
        let window = NightWindow::parse("23:00", "07:00").unwrap();
        // 03:30 UTC is 22:30 the previous evening in New York.
        let ts = Utc
            .with_ymd_and_hms(2024, 1, 16, 3, 30, 0)
            .unwrap()
            .timestamp() as f64;

        let utc = WallClock::Zone(chrono_tz::UTC);
        let new_york = WallClock::from_name(Some("America/New_York")).unwrap();
        assert!(utc.contains(&window, ts));
        assert!(!new_york.contains(&window, ts));
    }

    #[test]
    fn test_unknown_zone() {
        assert_eq!(
            WallClock::from_name(Some("Mars/Olympus")),
            Err(WindowError::UnknownTimezone("Mars/Olympus".to_string()))
        );
        assert_eq!(WallClock::from_name(None), Ok(WallClock::Local));
        assert_eq!(WallClock::from_name(Some("  ")), Ok(WallClock::Local));
    }

    #[test]
    fn test_window_instants() {
        let clock = WallClock::Zone(chrono_tz::UTC);
        let ts = utc_at(7, 0).timestamp() as f64;

        let window = NightWindow::parse("23:00", "07:00").unwrap();
        let (start, end) = clock.window_instants(&window, ts).unwrap();
        assert_eq!(end, ts);
        assert_eq!(end - start, 8.0 * 3600.0);

        let same_day = NightWindow::parse("00:30", "07:00").unwrap();
        let (start, _) = clock.window_instants(&same_day, ts).unwrap();
        assert_eq!(ts - start, 6.5 * 3600.0);
    }

    #[test]
    fn test_same_day_at() {
        let clock = WallClock::Zone(chrono_tz::UTC);
        let ts = utc_at(15, 20).timestamp() as f64;
        assert_eq!(
            clock.same_day_at(ts, hm(6, 45)),
            Some(utc_at(6, 45).timestamp() as f64)
        );
    }

    #[test]
    fn test_format_and_bad_timestamp() {
        let clock = WallClock::Zone(chrono_tz::UTC);
        let ts = utc_at(23, 5).timestamp() as f64;
        assert_eq!(clock.format(ts), "2024-03-12 23:05:00");
        assert!(!clock.contains(&NightWindow::parse("23:00", "07:00").unwrap(), f64::NAN));
    }

    fn new_york(month: u32, day: u32, h: u32, m: u32) -> f64 {
        New_York
            .with_ymd_and_hms(2024, month, day, h, m, 0)
            .earliest()
            .unwrap()
            .timestamp() as f64
    }

    #[test]
    fn test_start_in_spring_forward_gap() {
        // 2024-03-10 02:00-03:00 does not exist in New York.
        let window = NightWindow::parse("02:00", "06:00").unwrap();
        let clock = WallClock::Zone(New_York);

        assert!(!clock.contains(&window, new_york(3, 10, 1, 59)));
        assert!(clock.contains(&window, new_york(3, 10, 3, 0)));
        assert!(clock.contains(&window, new_york(3, 10, 3, 30)));
        assert!(clock.contains(&window, new_york(3, 10, 4, 0)));
        assert!(clock.contains(&window, new_york(3, 10, 5, 59)));
        assert!(!clock.contains(&window, new_york(3, 10, 6, 0)));
        assert!(clock.contains(&window, new_york(3, 11, 4, 0)));

        let (start, end) = clock.window_instants(&window, new_york(3, 10, 12, 0)).unwrap();
        assert_eq!(start, new_york(3, 10, 3, 0));
        assert_eq!(end - start, 3.0 * 3600.0);
    }

    #[test]
    fn test_long_window_on_fall_back_day() {
        // 2024-11-03 has 25 hours in New York.
        let window = NightWindow::parse("00:05", "00:00").unwrap();
        let clock = WallClock::Zone(New_York);

        assert!(clock.contains(&window, new_york(11, 3, 23, 59)));
        assert!(clock.contains(&window, new_york(11, 4, 23, 59)));
        assert!(!clock.contains(&window, new_york(11, 4, 0, 2)));
    }
}
