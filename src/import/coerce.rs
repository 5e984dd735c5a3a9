use super::model::{Field, FieldKind, Value};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Text codec applied to raw payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextCodec {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl TextCodec {
    pub fn from_label(label: &str) -> Option<TextCodec> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(TextCodec::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Some(TextCodec::Latin1),
            _ => None,
        }
    }

    /// Decodes `bytes`. The flag is set when invalid input had to be replaced.
    pub fn decode(self, bytes: &[u8]) -> (String, bool) {
        match self {
            TextCodec::Utf8 => match String::from_utf8_lossy(bytes) {
                Cow::Borrowed(s) => (s.to_string(), false),
                Cow::Owned(s) => (s, true),
            },
            // Latin-1 maps each byte to the code point of the same value.
            TextCodec::Latin1 => (bytes.iter().map(|&b| b as char).collect(), false),
        }
    }
}

impl fmt::Display for TextCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextCodec::Utf8 => f.write_str("utf-8"),
            TextCodec::Latin1 => f.write_str("latin-1"),
        }
    }
}

/// Restores the three escaped markup characters. `&amp;` goes last so that
/// an escaped entity such as `&amp;lt;` comes back as the literal `&lt;`.
pub fn unescape_markup(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn is_absent_token(s: &str) -> bool {
    let t = s.trim();
    t.is_empty() || t.eq_ignore_ascii_case("none") || t.eq_ignore_ascii_case("null")
}

/// Integer field. `Ok(None)` is an explicit absent value.
pub fn parse_int(s: &str) -> Result<Option<i64>, String> {
    if is_absent_token(s) {
        return Ok(None);
    }
    let t = s.trim();
    if let Ok(v) = t.parse::<i64>() {
        return Ok(Some(v));
    }
    // Some exporters wrote integral values as floats ("12.0").
    match t.parse::<f64>() {
        Ok(f) if f.is_finite()
            && f.fract() == 0.0
            && (i64::MIN as f64..i64::MAX as f64).contains(&f) =>
        {
            Ok(Some(f as i64))
        }
        _ => Err(format!("not an integer: {t:?}")),
    }
}

pub fn parse_float(s: &str) -> Result<Option<f64>, String> {
    if is_absent_token(s) {
        return Ok(None);
    }
    let t = s.trim();
    t.parse::<f64>()
        .map(Some)
        .map_err(|_| format!("not a number: {t:?}"))
}

pub fn parse_bool(s: &str) -> Result<bool, String> {
    let t = s.trim();
    if is_absent_token(t) {
        return Ok(false);
    }
    match t.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "t" | "y" => Ok(true),
        "0" | "false" | "no" | "f" | "n" => Ok(false),
        _ => Err(format!("not a boolean: {t:?}")),
    }
}

/// Dates come as `Y-M-D` or `M/D/Y` (slashes or dashes), optionally followed
/// by a time component which is dropped.
pub fn parse_date(s: &str) -> Result<Option<NaiveDate>, String> {
    if is_absent_token(s) {
        return Ok(None);
    }
    let t = s.trim();
    let day_part = t.split(|c: char| c.is_whitespace() || c == 'T').next().unwrap_or(t);
    let parts: Vec<&str> = day_part.split(|c| c == '-' || c == '/').collect();
    if parts.len() != 3 {
        return Err(format!("unrecognised date: {t:?}"));
    }
    let nums: Vec<u32> = parts
        .iter()
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|_| format!("unrecognised date: {t:?}"))?;

    let (y, m, d) = if parts[0].trim().len() == 4 {
        (nums[0], nums[1], nums[2])
    } else {
        let mut year = nums[2];
        if parts[2].trim().len() <= 2 {
            year += if year < 70 { 2000 } else { 1900 };
        }
        (year, nums[0], nums[1])
    };
    let y = i32::try_from(y).map_err(|_| format!("year out of range: {t:?}"))?;
    NaiveDate::from_ymd_opt(y, m, d)
        .map(Some)
        .ok_or_else(|| format!("invalid calendar date: {t:?}"))
}

/// Outcome of coercing one field: the value to store, plus an issue when the
/// payload was malformed and a default was substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub value: Value,
    pub issue: Option<String>,
}

/// Converts the accumulated payload for `field` into a typed value.
pub fn coerce(field: Field, raw: &[u8], codec: TextCodec) -> Coerced {
    let (decoded, lossy) = codec.decode(raw);
    let mut issue = lossy.then(|| format!("payload is not valid {codec}; replaced invalid bytes"));
    let text = unescape_markup(&decoded);

    let value = match field.kind() {
        FieldKind::Int => match parse_int(&text) {
            Ok(v) => Value::Int(v),
            Err(e) => {
                issue = Some(e);
                Value::Int(None)
            }
        },
        FieldKind::Float => match parse_float(&text) {
            Ok(v) => Value::Float(v),
            Err(e) => {
                issue = Some(e);
                Value::Float(None)
            }
        },
        FieldKind::Bool => match parse_bool(&text) {
            Ok(v) => Value::Bool(v),
            Err(e) => {
                issue = Some(e);
                Value::Bool(false)
            }
        },
        FieldKind::Date => match parse_date(&text) {
            Ok(v) => Value::Date(v),
            Err(e) => {
                issue = Some(e);
                Value::Date(None)
            }
        },
        FieldKind::Text => Value::Text(text.trim().to_string()),
        FieldKind::LongText | FieldKind::RichText => Value::Text(text),
    };
    Coerced { value, issue }
}
