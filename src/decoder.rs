use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::utils::strip_parens;

pub const IMAGE_BASE_URL: &str = "https://plan.navcanada.ca/weather/images/";

// keys tried after english/raw/text, in order
const FALLBACK_FIELDS: [&str; 8] = [
    "body", "report", "metar", "taf", "remarks", "message", "content", "data",
];

// single-element `data` arrays are unwrapped at most this many times
const MAX_NESTING: usize = 8;

// shape of one upstream alpha item, in extraction priority order
#[derive(Debug, Clone, PartialEq)]
pub enum AlphaItem<'a> {
    Empty,
    Text(&'a str),
    // `english` and/or `french`, either as strings or as `{raw}` objects
    Bilingual {
        english: Option<&'a str>,
        french: Option<&'a str>,
    },
    Field { name: &'static str, text: &'a str },
    // `text` that turned out to be JSON
    Embedded(Value),
    Nested(&'a Value),
    Unrecognized(&'a Value),
}

impl<'a> AlphaItem<'a> {
    pub fn classify(item: &'a Value) -> Self {
        let map = match item {
            Value::Null => return AlphaItem::Empty,
            Value::String(text) => return AlphaItem::Text(text),
            Value::Object(map) => map,
            _ => return AlphaItem::Unrecognized(item),
        };

        if let Some(english) = non_empty_str(map, "english") {
            return AlphaItem::Bilingual {
                english: Some(english),
                french: non_empty_str(map, "french"),
            };
        }

        if let Some(raw) = non_empty_str(map, "raw") {
            return AlphaItem::Field { name: "raw", text: raw };
        }

        if let Some(text) = non_empty_str(map, "text") {
            return match serde_json::from_str::<Value>(text) {
                Ok(parsed @ (Value::String(_) | Value::Object(_) | Value::Array(_))) => {
                    AlphaItem::Embedded(parsed)
                }
                _ => AlphaItem::Field { name: "text", text },
            };
        }

        for name in FALLBACK_FIELDS {
            if let Some(text) = non_empty_str(map, name) {
                return AlphaItem::Field { name, text };
            }
        }

        let english = nested_raw(map, "english");
        let french = nested_raw(map, "french");
        if english.is_some() || french.is_some() {
            return AlphaItem::Bilingual { english, french };
        }

        match map.get("data") {
            Some(Value::Array(items)) if items.len() == 1 => AlphaItem::Nested(&items[0]),
            _ => AlphaItem::Unrecognized(item),
        }
    }
}

fn non_empty_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
}

fn nested_raw<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(|value| value.get("raw"))
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn decode_text(item: &Value) -> String {
    decode_nested(item, 0)
}

fn decode_nested(item: &Value, depth: usize) -> String {
    match AlphaItem::classify(item) {
        AlphaItem::Empty => String::new(),
        AlphaItem::Text(text) => text.trim().to_string(),
        AlphaItem::Bilingual { english, french } => english
            .or(french)
            .map(strip_parens)
            .unwrap_or_default(),
        AlphaItem::Field { text, .. } => strip_parens(text),
        AlphaItem::Embedded(Value::String(text)) => text.trim().to_string(),
        AlphaItem::Embedded(parsed) => pretty(&parsed),
        AlphaItem::Nested(inner) if depth < MAX_NESTING => decode_nested(inner, depth + 1),
        AlphaItem::Nested(_) => pretty(item),
        AlphaItem::Unrecognized(value) => match value {
            Value::Array(items) if items.len() == 1 && depth < MAX_NESTING => {
                decode_nested(&items[0], depth + 1)
            }
            Value::Object(map) => match map.get("data") {
                Some(data @ Value::Array(_)) => pretty(data),
                _ => pretty(value),
            },
            Value::Bool(_) | Value::Number(_) => value.to_string(),
            _ => pretty(value),
        },
    }
}

// text for every item of a payload: one entry per `data` element, or one for the payload
pub fn decode_items(payload: &Value) -> Vec<String> {
    match payload.get("data").and_then(Value::as_array) {
        Some(items) => items.iter().map(decode_text).collect(),
        None => vec![decode_text(payload)],
    }
}

// ICAO-8126 style breakdown of a NOTAM
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotamFields {
    pub id: Option<String>,
    pub fir: Option<String>,
    pub subject: Option<String>,
    pub traffic: Option<String>,
    pub purpose: Option<String>,
    pub scope: Option<String>,
    pub lower_limit: Option<String>,
    pub upper_limit: Option<String>,
    pub coordinates: Option<String>,
    pub radius_nm: Option<u32>,
    pub location: Option<String>,
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
    pub schedule: Option<String>,
    pub body: String,
    pub english: String,
    pub french: Option<String>,
    pub lower: Option<String>,
    pub upper: Option<String>,
}

const NOTAM_MARKERS: [char; 8] = ['Q', 'A', 'B', 'C', 'D', 'E', 'F', 'G'];

// a marker only counts at the start of the text or after whitespace
fn find_marker(text: &str, letter: char, from: usize) -> Option<usize> {
    let pattern = format!("{})", letter);
    let mut search = from;
    while let Some(rel) = text[search..].find(&pattern) {
        let idx = search + rel;
        if idx == 0 || text[..idx].ends_with(char::is_whitespace) {
            return Some(idx);
        }
        search = idx + pattern.len();
    }
    None
}

fn notam_id(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|token| token.trim_matches(|c: char| c == '(' || c == ')'))
        .find(|token| match token.split_once('/') {
            Some((series, year)) => {
                !series.is_empty()
                    && series.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
                    && series.chars().any(|c| c.is_ascii_digit())
                    && year.len() == 2
                    && year.chars().all(|c| c.is_ascii_digit())
            }
            None => false,
        })
        .map(str::to_string)
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

// markers are searched in canonical order so free text inside E) never matches an earlier field.
// Q) is FIR/QCODE/TRAFFIC/PURPOSE/SCOPE/LOWER/UPPER/COORDS
pub fn decode_notam(text: &str) -> NotamFields {
    let text = strip_parens(text);
    let mut found: Vec<(char, usize)> = Vec::new();
    let mut cursor = 0;
    for letter in NOTAM_MARKERS {
        if let Some(idx) = find_marker(&text, letter, cursor) {
            found.push((letter, idx));
            cursor = idx + 2;
        }
    }

    let header_end = found.first().map(|(_, idx)| *idx).unwrap_or(text.len());
    let mut fields = NotamFields {
        id: notam_id(&text[..header_end]),
        ..Default::default()
    };

    for (i, (letter, start)) in found.iter().enumerate() {
        let end = found.get(i + 1).map(|(_, idx)| *idx).unwrap_or(text.len());
        let value = text[start + 2..end].trim();
        match letter {
            'Q' => parse_q_line(value, &mut fields),
            'A' => fields.location = non_empty(value),
            'B' => fields.valid_from = non_empty(value),
            'C' => fields.valid_to = non_empty(value),
            'D' => fields.schedule = non_empty(value),
            'E' => fields.body = value.to_string(),
            'F' => fields.lower = non_empty(value),
            'G' => fields.upper = non_empty(value),
            _ => {}
        }
    }

    // no markers at all: the whole thing is the body
    if found.is_empty() {
        fields.body = text.trim().to_string();
    }

    match fields.body.split_once("FR:") {
        Some((english, french)) => {
            fields.english = english.trim().to_string();
            fields.french = non_empty(french);
        }
        None => fields.english = fields.body.clone(),
    }

    fields
}

fn parse_q_line(line: &str, fields: &mut NotamFields) {
    let parts: Vec<&str> = line.split('/').map(str::trim).collect();
    let part = |i: usize| parts.get(i).and_then(|p| non_empty(p));

    fields.fir = part(0);
    fields.subject = part(1);
    fields.traffic = part(2);
    fields.purpose = part(3);
    fields.scope = part(4);
    fields.lower_limit = part(5);
    fields.upper_limit = part(6);

    // 4737N05245W005: 11 chars of position, then a 3 digit radius
    if let Some(coords) = part(7) {
        if coords.len() > 11 && coords.is_char_boundary(11) {
            fields.radius_nm = coords[11..].parse().ok();
            fields.coordinates = Some(coords[..11].to_string());
        } else {
            fields.coordinates = Some(coords);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpperWindLevel {
    pub altitude_ft: Option<i64>,
    pub wind_dir_deg: Option<i64>,
    pub wind_spd_kt: Option<i64>,
    pub temp_c: Option<f64>,
    pub flag: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpperWind {
    pub zone: Option<String>,
    pub source: Option<String>,
    pub issue_time: Option<String>,
    pub valid_start: Option<String>,
    pub valid_end: Option<String>,
    pub frame_start: Option<String>,
    pub frame_end: Option<String>,
    pub use_period: Option<String>,
    pub levels: Vec<UpperWindLevel>,
}

const UPPER_WIND_FIELDS: usize = 12;
const UPPER_WIND_LEVELS_INDEX: usize = 11;

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => non_empty(text),
        other => Some(other.to_string()),
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn parse_utc(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn use_period(frame_start: Option<&str>, frame_end: Option<&str>) -> Option<String> {
    let start = parse_utc(frame_start?)?;
    let end = parse_utc(frame_end?)?;
    Some(format!("{:02}-{:02}", start.hour(), end.hour()))
}

// the positional array lives either in the item itself or in its `text`
fn upper_wind_array(item: &Value) -> Result<Vec<Value>, DecodeError> {
    let source = match item {
        Value::Object(map) => map.get("text").unwrap_or(item),
        _ => item,
    };
    let parsed = match source {
        Value::String(text) => serde_json::from_str::<Value>(text)
            .map_err(|e| DecodeError::InvalidJson(e.to_string()))?,
        other => other.clone(),
    };
    match parsed {
        Value::Array(items) => Ok(items),
        _ => Err(DecodeError::NotAnArray),
    }
}

// decode the 12-slot upper wind array into a level table
pub fn decode_upper_wind(item: &Value) -> Result<UpperWind, DecodeError> {
    let fields = upper_wind_array(item)?;
    if fields.len() < UPPER_WIND_FIELDS {
        return Err(DecodeError::WrongLength(fields.len()));
    }

    let rows = fields[UPPER_WIND_LEVELS_INDEX]
        .as_array()
        .ok_or(DecodeError::MissingLevels)?;

    let levels = rows
        .iter()
        .enumerate()
        .map(|(index, row)| match row.as_array() {
            Some(cols) if cols.len() >= 4 => Ok(UpperWindLevel {
                altitude_ft: as_int(&cols[0]),
                wind_dir_deg: as_int(&cols[1]),
                wind_spd_kt: as_int(&cols[2]),
                temp_c: as_float(&cols[3]),
                flag: cols.get(4).cloned(),
            }),
            _ => Err(DecodeError::MalformedLevel { index }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let frame_start = as_text(&fields[5]);
    let frame_end = as_text(&fields[6]);

    Ok(UpperWind {
        zone: as_text(&fields[0]),
        source: as_text(&fields[1]),
        issue_time: as_text(&fields[2]),
        valid_start: as_text(&fields[3]),
        valid_end: as_text(&fields[4]),
        use_period: use_period(frame_start.as_deref(), frame_end.as_deref()),
        frame_start,
        frame_end,
        levels,
    })
}

// one image referenced by a `frame_lists[].frames[].images[]` manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameImage {
    pub id: String,
    pub url: String,
    pub period: Option<String>,
    pub valid_end: Option<String>,
    pub created: Option<String>,
}

fn manifest_of(item: &Value) -> Option<Value> {
    if item.get("frame_lists").is_some() {
        return Some(item.clone());
    }
    let text = item.get("text")?.as_str()?;
    serde_json::from_str::<Value>(text).ok()
}

fn frames_in(manifest: &Value, out: &mut Vec<FrameImage>) {
    let frame_lists = manifest
        .get("frame_lists")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for frame_list in frame_lists {
        let frames = frame_list
            .get("frames")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for frame in frames {
            let images = frame
                .get("images")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for image in images {
                let Some(id) = image.get("id").and_then(as_text) else {
                    continue;
                };
                out.push(FrameImage {
                    url: format!("{}{}.image", IMAGE_BASE_URL, id),
                    id,
                    period: frame.get("sv").and_then(as_text),
                    valid_end: frame.get("ev").and_then(as_text),
                    created: image.get("created").and_then(as_text),
                });
            }
        }
    }
}

// every image id found in the nested per-frame manifests of a payload
pub fn extract_frame_images(payload: &Value) -> Vec<FrameImage> {
    let mut images = Vec::new();
    match payload.get("data").and_then(Value::as_array) {
        Some(items) => {
            for item in items {
                if let Some(manifest) = manifest_of(item) {
                    frames_in(&manifest, &mut images);
                }
            }
        }
        None => {
            if let Some(manifest) = manifest_of(payload) {
                frames_in(&manifest, &mut images);
            }
        }
    }
    images
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub original_url: String,
    pub period: Option<String>,
}

// unify direct probe results, frame manifests and single-url payloads
pub fn collect_images(payload: &Value) -> Vec<ImageRef> {
    let mut refs = Vec::new();

    if let Some(images) = payload.get("images").and_then(Value::as_array) {
        for image in images {
            let Some(original) = image.get("url").and_then(Value::as_str) else {
                continue;
            };
            let url = image
                .get("proxy_url")
                .and_then(Value::as_str)
                .unwrap_or(original);
            refs.push(ImageRef {
                url: url.to_string(),
                original_url: original.to_string(),
                period: image.get("period").and_then(as_text),
            });
        }
    }

    refs.extend(extract_frame_images(payload).into_iter().map(|frame| ImageRef {
        original_url: frame.url.clone(),
        url: frame.url,
        period: frame.period,
    }));

    if let Some(original) = payload.get("url").and_then(Value::as_str) {
        let url = payload
            .get("proxy_url")
            .and_then(Value::as_str)
            .unwrap_or(original);
        refs.push(ImageRef {
            url: url.to_string(),
            original_url: original.to_string(),
            period: None,
        });
    }

    refs
}
