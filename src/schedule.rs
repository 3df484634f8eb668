//! Venue operating days and hours.
//!
//! Venue records carry their schedule as loosely typed data: the open days
//! may be a JSON array of Portuguese day names, a comma-separated string, or a
//! string holding a JSON-encoded array; the hours are a `"HH:MM - HH:MM"`
//! string. Everything is normalized into [`OperatingSchedule`] at the edge and
//! parsing never fails: unreadable input falls back to "every day, 08:00-20:00".

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sunday first, matching the 0=Sunday..6=Saturday numbering of venue records.
const WEEK: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

fn hm(hour: u32, min: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, min, 0).unwrap_or(NaiveTime::MIN)
}

pub fn default_open_time() -> NaiveTime {
    hm(8, 0)
}

pub fn default_close_time() -> NaiveTime {
    hm(20, 0)
}

// ── Day sets ─────────────────────────────────────────────────────

/// Set of weekdays as a 7-bit mask, bit 0 = Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DaySet(u8);

impl DaySet {
    pub const EMPTY: DaySet = DaySet(0);
    pub const ALL: DaySet = DaySet(0b111_1111);

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_sunday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_sunday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Days in Sunday-first order.
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        WEEK.into_iter().filter(|d| self.contains(*d))
    }
}

impl Default for DaySet {
    fn default() -> Self {
        DaySet::ALL
    }
}

impl FromIterator<Weekday> for DaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = DaySet::EMPTY;
        for day in iter {
            set.insert(day);
        }
        set
    }
}

// ── Raw day ingestion ────────────────────────────────────────────

/// The shapes in which venue records store their open days.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawDays<'a> {
    Absent,
    /// A real array of names.
    List(Vec<&'a str>),
    /// `"seg, ter, qua"`.
    Delimited(&'a str),
    /// An array stored as a string: `"[\"segunda\", \"terça\"]"`.
    Encoded(Vec<String>),
}

impl<'a> RawDays<'a> {
    pub fn classify(raw: Option<&'a Value>) -> Self {
        match raw {
            None | Some(Value::Null) => RawDays::Absent,
            Some(Value::Array(items)) => RawDays::List(items.iter().filter_map(Value::as_str).collect()),
            Some(Value::String(s)) => RawDays::classify_str(s),
            Some(_) => RawDays::Absent,
        }
    }

    pub fn classify_str(raw: &'a str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return RawDays::Absent;
        }
        if trimmed.starts_with('[')
            && let Ok(items) = serde_json::from_str::<Vec<Value>>(trimmed)
        {
            let names = items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect();
            return RawDays::Encoded(names);
        }
        // Broken JSON degrades to the delimited form; stray brackets and
        // quotes are stripped per token.
        RawDays::Delimited(trimmed)
    }

    /// Recognized days; an empty result means every day.
    pub fn into_days(self) -> DaySet {
        let days: DaySet = match self {
            RawDays::Absent => DaySet::EMPTY,
            RawDays::List(names) => names.into_iter().filter_map(weekday_from_name).collect(),
            RawDays::Delimited(s) => s.split(',').filter_map(weekday_from_name).collect(),
            RawDays::Encoded(names) => names.iter().map(String::as_str).filter_map(weekday_from_name).collect(),
        };
        if days.is_empty() { DaySet::ALL } else { days }
    }
}

pub fn parse_operating_days(raw: Option<&Value>) -> DaySet {
    RawDays::classify(raw).into_days()
}

fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        other => other,
    }
}

fn normalize_day_name(token: &str) -> String {
    let folded: String = token
        .to_lowercase()
        .chars()
        .map(fold_diacritic)
        .filter(|c| !matches!(c, '"' | '\'' | '[' | ']' | '.'))
        .collect();
    let folded = folded.trim();
    let base = folded.strip_suffix("feira").unwrap_or(folded);
    base.trim_end_matches(['-', ' ']).trim().to_string()
}

/// Portuguese day name, full or abbreviated, to weekday.
pub fn weekday_from_name(token: &str) -> Option<Weekday> {
    match normalize_day_name(token).as_str() {
        "domingo" | "dom" => Some(Weekday::Sun),
        "segunda" | "seg" => Some(Weekday::Mon),
        "terca" | "ter" => Some(Weekday::Tue),
        "quarta" | "qua" => Some(Weekday::Wed),
        "quinta" | "qui" => Some(Weekday::Thu),
        "sexta" | "sex" => Some(Weekday::Fri),
        "sabado" | "sab" => Some(Weekday::Sat),
        _ => None,
    }
}

// ── Hours ────────────────────────────────────────────────────────

/// Parse `"HH:MM - HH:MM"`. Absent, malformed, or inverted ranges yield 08:00-20:00.
pub fn parse_operating_hours(raw: Option<&str>) -> (NaiveTime, NaiveTime) {
    raw.and_then(parse_hours_range)
        .unwrap_or_else(|| (default_open_time(), default_close_time()))
}

fn parse_hours_range(raw: &str) -> Option<(NaiveTime, NaiveTime)> {
    let (open, close) = raw.split_once('-')?;
    let open = NaiveTime::parse_from_str(open.trim(), "%H:%M").ok()?;
    let close = NaiveTime::parse_from_str(close.trim(), "%H:%M").ok()?;
    (open < close).then_some((open, close))
}

// ── Schedule ─────────────────────────────────────────────────────

/// A venue's recurring availability. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingSchedule {
    open_days: DaySet,
    open_time: NaiveTime,
    close_time: NaiveTime,
}

impl Default for OperatingSchedule {
    fn default() -> Self {
        Self {
            open_days: DaySet::ALL,
            open_time: default_open_time(),
            close_time: default_close_time(),
        }
    }
}

impl OperatingSchedule {
    /// An empty day set becomes every day; `open >= close` becomes the default hours.
    pub fn new(open_days: DaySet, open_time: NaiveTime, close_time: NaiveTime) -> Self {
        let open_days = if open_days.is_empty() { DaySet::ALL } else { open_days };
        let (open_time, close_time) = if open_time < close_time {
            (open_time, close_time)
        } else {
            (default_open_time(), default_close_time())
        };
        Self {
            open_days,
            open_time,
            close_time,
        }
    }

    pub fn from_raw(raw_days: Option<&Value>, raw_hours: Option<&str>) -> Self {
        let (open, close) = parse_operating_hours(raw_hours);
        Self::new(parse_operating_days(raw_days), open, close)
    }

    pub fn open_days(&self) -> DaySet {
        self.open_days
    }

    pub fn open_time(&self) -> NaiveTime {
        self.open_time
    }

    pub fn close_time(&self) -> NaiveTime {
        self.close_time
    }

    pub fn is_open_on(&self, date: NaiveDate) -> bool {
        self.open_days.contains(date.weekday())
    }

    /// Inclusive at both ends: a booking exactly at closing time is accepted.
    pub fn is_within_hours(&self, time: NaiveTime) -> bool {
        self.open_time <= time && time <= self.close_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn days(list: &[Weekday]) -> DaySet {
        list.iter().copied().collect()
    }

    #[test]
    fn absent_days_mean_every_day() {
        assert_eq!(parse_operating_days(None), DaySet::ALL);
        assert_eq!(parse_operating_days(Some(&Value::Null)), DaySet::ALL);
    }

    #[test]
    fn all_encodings_agree() {
        let expected = days(&[Weekday::Mon, Weekday::Wed, Weekday::Sat]);
        let array = json!(["segunda", "quarta", "sábado"]);
        let delimited = json!("segunda, quarta, sábado");
        let encoded = json!(r#"["segunda","quarta","sábado"]"#);
        assert_eq!(parse_operating_days(Some(&array)), expected);
        assert_eq!(parse_operating_days(Some(&delimited)), expected);
        assert_eq!(parse_operating_days(Some(&encoded)), expected);
    }

    #[test]
    fn tuesday_spellings() {
        for name in ["terça", "terca", "ter", "terça-feira", "Terça-Feira", "TERCA", "terca feira", "Ter."] {
            assert_eq!(weekday_from_name(name), Some(Weekday::Tue), "{name}");
        }
    }

    #[test]
    fn full_name_table() {
        let table = [
            ("domingo", Weekday::Sun),
            ("dom", Weekday::Sun),
            ("segunda-feira", Weekday::Mon),
            ("seg", Weekday::Mon),
            ("quarta-feira", Weekday::Wed),
            ("qua", Weekday::Wed),
            ("quinta", Weekday::Thu),
            ("qui", Weekday::Thu),
            ("sexta-feira", Weekday::Fri),
            ("sex", Weekday::Fri),
            ("sábado", Weekday::Sat),
            ("sabado", Weekday::Sat),
            ("sáb", Weekday::Sat),
        ];
        for (name, day) in table {
            assert_eq!(weekday_from_name(name), Some(day), "{name}");
        }
    }

    #[test]
    fn unknown_tokens_are_skipped() {
        let raw = json!(["seg", "feriado", "sex", ""]);
        assert_eq!(
            parse_operating_days(Some(&raw)),
            days(&[Weekday::Mon, Weekday::Fri])
        );
    }

    #[test]
    fn nothing_recognized_means_every_day() {
        assert_eq!(parse_operating_days(Some(&json!(["monday", "x"]))), DaySet::ALL);
        assert_eq!(parse_operating_days(Some(&json!(""))), DaySet::ALL);
        assert_eq!(parse_operating_days(Some(&json!([]))), DaySet::ALL);
        assert_eq!(parse_operating_days(Some(&json!(42))), DaySet::ALL);
        assert_eq!(parse_operating_days(Some(&json!({"seg": true}))), DaySet::ALL);
    }

    #[test]
    fn broken_json_string_degrades_to_delimited() {
        let raw = json!(r#"["seg", "ter""#);
        assert_eq!(
            parse_operating_days(Some(&raw)),
            days(&[Weekday::Mon, Weekday::Tue])
        );
    }

    #[test]
    fn classify_shapes() {
        let array = json!(["seg"]);
        assert_eq!(RawDays::classify(Some(&array)), RawDays::List(vec!["seg"]));
        let text = json!("seg,ter");
        assert_eq!(RawDays::classify(Some(&text)), RawDays::Delimited("seg,ter"));
        let encoded = json!(r#"["seg"]"#);
        assert_eq!(RawDays::classify(Some(&encoded)), RawDays::Encoded(vec!["seg".to_string()]));
        assert_eq!(RawDays::classify(None), RawDays::Absent);
    }

    #[test]
    fn day_set_iterates_sunday_first() {
        let set = days(&[Weekday::Sat, Weekday::Sun, Weekday::Wed]);
        let order: Vec<Weekday> = set.iter().collect();
        assert_eq!(order, vec![Weekday::Sun, Weekday::Wed, Weekday::Sat]);
        assert_eq!(set.len(), 3);
        assert_eq!(DaySet::ALL.len(), 7);
    }

    #[test]
    fn hours_parse() {
        assert_eq!(parse_operating_hours(Some("08:00 - 20:00")), (hm(8, 0), hm(20, 0)));
        assert_eq!(parse_operating_hours(Some("09:30-17:45")), (hm(9, 30), hm(17, 45)));
        assert_eq!(parse_operating_hours(Some("  07:00   -   15:00 ")), (hm(7, 0), hm(15, 0)));
    }

    #[test]
    fn hours_default_on_bad_input() {
        let default = (hm(8, 0), hm(20, 0));
        assert_eq!(parse_operating_hours(None), default);
        assert_eq!(parse_operating_hours(Some("")), default);
        assert_eq!(parse_operating_hours(Some("manhã")), default);
        assert_eq!(parse_operating_hours(Some("25:00 - 26:00")), default);
        assert_eq!(parse_operating_hours(Some("18:00 - 09:00")), default);
        assert_eq!(parse_operating_hours(Some("10:00 - 10:00")), default);
    }

    #[test]
    fn within_hours_is_inclusive() {
        let schedule = OperatingSchedule::from_raw(None, Some("09:00 - 18:00"));
        assert!(schedule.is_within_hours(hm(9, 0)));
        assert!(schedule.is_within_hours(hm(18, 0)));
        assert!(schedule.is_within_hours(hm(12, 30)));
        assert!(!schedule.is_within_hours(hm(8, 59)));
        assert!(!schedule.is_within_hours(hm(18, 1)));
    }

    #[test]
    fn open_on_weekday() {
        let schedule = OperatingSchedule::from_raw(Some(&json!("seg,ter,qua,qui,sex")), None);
        // 2026-10-14 is a Wednesday, 2026-10-18 a Sunday.
        assert!(schedule.is_open_on(NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()));
        assert!(!schedule.is_open_on(NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()));
    }

    #[test]
    fn new_enforces_invariants() {
        let s = OperatingSchedule::new(DaySet::EMPTY, hm(20, 0), hm(8, 0));
        assert_eq!(s, OperatingSchedule::default());
    }
}
