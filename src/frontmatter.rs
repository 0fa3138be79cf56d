//! Front matter extraction and serialization.
//!
//! A document is a YAML mapping fenced by `---` lines followed by the body
//! text. Metadata is an open map from key to a small closed set of value
//! kinds ([`MetaValue`]); the reserved keys are promoted to typed fields on
//! [`FrontMatter`] and everything else passes through untouched in
//! [`FrontMatter::extra`].
//!
//! ```text
//! ---
//! title: Getting Started
//! published_date: 2024-01-01
//! tags:
//! - intro
//! ---
//! Body text...
//! ```
//!
//! [`parse`] and [`serialize`] round-trip: `parse(&serialize(m, b)?)? == (m, b)`.

use std::collections::BTreeMap;
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDate};
use serde::de::Error as _;
use serde_yaml::{Mapping, Value};

use crate::error::{TrellisError, TrellisResult};

const DELIMITER: &str = "---";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub const KEY_TITLE: &str = "title";
pub const KEY_DESCRIPTION: &str = "description";
pub const KEY_CREATED: &str = "created_date";
pub const KEY_PUBLISHED: &str = "published_date";
pub const KEY_UPDATED: &str = "updated_date";
pub const KEY_STATUS: &str = "status";

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue {
    Text(String),
    /// A calendar date. Any text of the exact shape `YYYY-MM-DD` is a date.
    Date(NaiveDate),
    Bool(bool),
    List(Vec<String>),
}

impl MetaValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            MetaValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    fn from_yaml(value: Value) -> TrellisResult<Option<MetaValue>> {
        Ok(match value {
            Value::Null => None,
            Value::Bool(b) => Some(MetaValue::Bool(b)),
            Value::Number(n) => Some(MetaValue::Text(n.to_string())),
            Value::String(s) => Some(text_or_date(s)),
            Value::Sequence(items) => Some(MetaValue::List(
                items.into_iter().filter_map(scalar_to_string).collect(),
            )),
            other => Some(MetaValue::Text(
                serde_yaml::to_string(&other)?.trim_end().to_string(),
            )),
        })
    }

    fn to_yaml(&self) -> Value {
        match self {
            MetaValue::Text(s) => Value::String(s.clone()),
            MetaValue::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
            MetaValue::Bool(b) => Value::Bool(*b),
            MetaValue::List(items) => {
                Value::Sequence(items.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        text_or_date(s.to_string())
    }
}

impl From<NaiveDate> for MetaValue {
    fn from(d: NaiveDate) -> Self {
        MetaValue::Date(d)
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        MetaValue::Bool(b)
    }
}

fn text_or_date(s: String) -> MetaValue {
    match parse_date(&s) {
        Some(d) => MetaValue::Date(d),
        None => MetaValue::Text(s),
    }
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse a strict `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

/// Open metadata map, ordered by key.
pub type MetaMap = BTreeMap<String, MetaValue>;

/// Publication status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Draft,
    Published,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Draft => "draft",
            Status::Published => "published",
        }
    }

    fn parse(s: &str) -> Option<Status> {
        match s {
            "draft" => Some(Status::Draft),
            "published" => Some(Status::Published),
            _ => None,
        }
    }
}

/// Parsed document metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_date: Option<NaiveDate>,
    pub published_date: Option<NaiveDate>,
    pub updated_date: Option<NaiveDate>,
    pub status: Option<Status>,
    /// Non-reserved keys, plus reserved keys whose value had the wrong kind.
    pub extra: MetaMap,
}

impl FrontMatter {
    /// Promote reserved keys out of an open map.
    pub fn from_map(mut map: MetaMap) -> Self {
        let title = take_text(&mut map, KEY_TITLE);
        let description = take_text(&mut map, KEY_DESCRIPTION);
        let created_date = take_date(&mut map, KEY_CREATED);
        let published_date = take_date(&mut map, KEY_PUBLISHED);
        let updated_date = take_date(&mut map, KEY_UPDATED);

        let status = match map.get(KEY_STATUS).and_then(MetaValue::as_text) {
            Some(s) => Status::parse(s),
            None => None,
        };
        if status.is_some() {
            map.remove(KEY_STATUS);
        }

        Self {
            title,
            description,
            created_date,
            published_date,
            updated_date,
            status,
            extra: map,
        }
    }

    /// Flatten back into an open map.
    pub fn to_map(&self) -> MetaMap {
        let mut map = self.extra.clone();
        if let Some(ref t) = self.title {
            map.insert(KEY_TITLE.to_string(), MetaValue::Text(t.clone()));
        }
        if let Some(ref d) = self.description {
            map.insert(KEY_DESCRIPTION.to_string(), MetaValue::Text(d.clone()));
        }
        for (key, date) in [
            (KEY_CREATED, self.created_date),
            (KEY_PUBLISHED, self.published_date),
            (KEY_UPDATED, self.updated_date),
        ] {
            if let Some(d) = date {
                map.insert(key.to_string(), MetaValue::Date(d));
            }
        }
        if let Some(s) = self.status {
            map.insert(KEY_STATUS.to_string(), MetaValue::Text(s.as_str().to_string()));
        }
        map
    }

    pub fn is_empty(&self) -> bool {
        *self == FrontMatter::default()
    }

    pub fn is_draft(&self) -> bool {
        self.status == Some(Status::Draft)
    }
}

fn take_text(map: &mut MetaMap, key: &str) -> Option<String> {
    match map.get(key) {
        Some(MetaValue::Text(_)) => match map.remove(key) {
            Some(MetaValue::Text(s)) => Some(s),
            _ => None,
        },
        _ => None,
    }
}

fn take_date(map: &mut MetaMap, key: &str) -> Option<NaiveDate> {
    let date = map.get(key).and_then(MetaValue::as_date)?;
    map.remove(key);
    Some(date)
}

/// Split raw document text into front matter and body.
///
/// Text without an opening `---` line, or without a closing one, has empty
/// metadata and is returned whole as the body.
pub fn parse(raw: &str) -> TrellisResult<(FrontMatter, String)> {
    let Some((block, body)) = split(raw) else {
        return Ok((FrontMatter::default(), raw.to_string()));
    };

    let map = parse_block(block)?;
    Ok((FrontMatter::from_map(map), body.to_string()))
}

/// Render front matter and body back into document text.
pub fn serialize(front_matter: &FrontMatter, body: &str) -> TrellisResult<String> {
    let map = front_matter.to_map();
    if map.is_empty() {
        if split(body).is_some() {
            return Ok(format!("{DELIMITER}\n{DELIMITER}\n{body}"));
        }
        return Ok(body.to_string());
    }

    let mut mapping = Mapping::new();
    for (key, value) in &map {
        mapping.insert(Value::String(key.clone()), value.to_yaml());
    }
    let yaml = serde_yaml::to_string(&mapping)?;
    Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n{body}"))
}

fn split(raw: &str) -> Option<(&str, &str)> {
    let rest = raw
        .strip_prefix("---\n")
        .or_else(|| raw.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches('\n').trim_end_matches('\r');
        if trimmed == DELIMITER {
            let block = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((block, body));
        }
        offset += line.len();
    }
    None
}

fn parse_block(block: &str) -> TrellisResult<MetaMap> {
    let mut map = MetaMap::new();
    if block.trim().is_empty() {
        return Ok(map);
    }

    let mapping = match serde_yaml::from_str::<Value>(block)? {
        Value::Mapping(m) => m,
        Value::Null => return Ok(map),
        other => {
            return Err(TrellisError::FrontMatter(serde_yaml::Error::custom(
                format!("front matter must be a mapping, found {other:?}"),
            )))
        }
    };

    for (key, value) in mapping {
        let Some(key) = scalar_to_string(key) else {
            continue;
        };
        if let Some(v) = MetaValue::from_yaml(value)? {
            map.insert(key, v);
        }
    }
    Ok(map)
}

/// Effective "last updated" date of a document.
///
/// Falls back `updated_date` → `published_date` → `created_date` → file
/// modification time → today, in that order. Never absent.
pub fn effective_updated_date(front_matter: &FrontMatter, modified: Option<SystemTime>) -> NaiveDate {
    effective_updated_date_at(front_matter, modified, Local::now().date_naive())
}

/// [`effective_updated_date`] with an explicit "today".
pub fn effective_updated_date_at(
    front_matter: &FrontMatter,
    modified: Option<SystemTime>,
    today: NaiveDate,
) -> NaiveDate {
    front_matter
        .updated_date
        .or(front_matter.published_date)
        .or(front_matter.created_date)
        .or_else(|| modified.map(|m| DateTime::<Local>::from(m).date_naive()))
        .unwrap_or(today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_parse_without_front_matter() {
        let (fm, body) = parse("# Hello\n\nworld").unwrap();
        assert!(fm.is_empty());
        assert_eq!(body, "# Hello\n\nworld");
    }

    #[test]
    fn test_parse_unterminated_block_is_body() {
        let raw = "---\ntitle: Oops\nno closing line";
        let (fm, body) = parse(raw).unwrap();
        assert!(fm.is_empty());
        assert_eq!(body, raw);
    }

    #[test]
    fn test_parse_reserved_and_extra_keys() {
        let raw = "---\ntitle: Getting Started\npublished_date: 2024-01-01\nstatus: draft\ntags:\n- intro\n- docs\nfeatured: true\norder: 3\n---\nBody here\n";
        let (fm, body) = parse(raw).unwrap();
        assert_eq!(fm.title.as_deref(), Some("Getting Started"));
        assert_eq!(fm.published_date, Some(date("2024-01-01")));
        assert!(fm.is_draft());
        assert_eq!(
            fm.extra.get("tags"),
            Some(&MetaValue::List(vec!["intro".into(), "docs".into()]))
        );
        assert_eq!(fm.extra.get("featured"), Some(&MetaValue::Bool(true)));
        assert_eq!(fm.extra.get("order"), Some(&MetaValue::Text("3".into())));
        assert_eq!(body, "Body here\n");
    }

    #[test]
    fn test_reserved_key_with_wrong_kind_stays_extra() {
        let raw = "---\nupdated_date: last week\ntitle: true\n---\nx";
        let (fm, _) = parse(raw).unwrap();
        assert_eq!(fm.updated_date, None);
        assert_eq!(fm.title, None);
        assert_eq!(
            fm.extra.get(KEY_UPDATED),
            Some(&MetaValue::Text("last week".into()))
        );
        assert_eq!(fm.extra.get(KEY_TITLE), Some(&MetaValue::Bool(true)));
    }

    #[test]
    fn test_non_mapping_front_matter_is_error() {
        let raw = "---\n- a\n- b\n---\nbody";
        assert!(matches!(parse(raw), Err(TrellisError::FrontMatter(_))));
    }

    #[test]
    fn test_round_trip() {
        let mut extra = MetaMap::new();
        extra.insert("tags".into(), MetaValue::List(vec!["a".into(), "b c".into()]));
        extra.insert("featured".into(), MetaValue::Bool(false));
        extra.insert("count".into(), MetaValue::Text("42".into()));
        extra.insert("flag_text".into(), MetaValue::Text("true".into()));
        extra.insert("multi".into(), MetaValue::Text("line one\n---\nline two".into()));

        let fm = FrontMatter {
            title: Some("Colons: and \"quotes\"".into()),
            description: Some(String::new()),
            created_date: Some(date("2023-05-01")),
            published_date: None,
            updated_date: Some(date("2024-02-29")),
            status: Some(Status::Published),
            extra,
        };
        let body = "# Heading\n\n---\n\nAfter a rule.\n";

        let raw = serialize(&fm, body).unwrap();
        let (fm2, body2) = parse(&raw).unwrap();
        assert_eq!(fm2, fm);
        assert_eq!(body2, body);
    }

    #[test]
    fn test_round_trip_empty_metadata() {
        for body in ["plain body", "", "---\ntitle: looks like front matter\n---\n"] {
            let raw = serialize(&FrontMatter::default(), body).unwrap();
            let (fm, parsed_body) = parse(&raw).unwrap();
            assert!(fm.is_empty());
            assert_eq!(parsed_body, body);
        }
    }

    #[test]
    fn test_effective_date_prefers_updated() {
        let fm = FrontMatter {
            created_date: Some(date("2020-01-01")),
            published_date: Some(date("2021-01-01")),
            updated_date: Some(date("2022-01-01")),
            ..Default::default()
        };
        assert_eq!(
            effective_updated_date_at(&fm, None, date("2030-01-01")),
            date("2022-01-01")
        );
    }

    #[test]
    fn test_effective_date_falls_back_to_published() {
        let fm = FrontMatter {
            published_date: Some(date("2024-01-01")),
            ..Default::default()
        };
        assert_eq!(format_date(effective_updated_date(&fm, None)), "2024-01-01");
    }

    #[test]
    fn test_effective_date_falls_back_to_created() {
        let fm = FrontMatter {
            created_date: Some(date("2019-07-04")),
            ..Default::default()
        };
        assert_eq!(effective_updated_date(&fm, None), date("2019-07-04"));
    }

    #[test]
    fn test_effective_date_uses_mtime() {
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let expected = DateTime::<Local>::from(mtime).date_naive();
        assert_eq!(
            effective_updated_date(&FrontMatter::default(), Some(mtime)),
            expected
        );
    }

    #[test]
    fn test_effective_date_defaults_to_today() {
        let today = Local::now().date_naive();
        let got = effective_updated_date(&FrontMatter::default(), None);
        // Allow for the test straddling midnight.
        assert!(got == today || got == today.succ_opt().unwrap());
        assert_eq!(format_date(got).len(), 10);
    }
}
