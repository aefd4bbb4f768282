use std::fmt::Display;

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Format used when a Date is rendered as text or parsed from text.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Placeholder shown for byte buffers rendered as text.
pub const BUFFER_PLACEHOLDER: &str = "[BUFFER DATA]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantType {
    Integer,
    Long,
    Double,
    String,
    Date,
    Boolean,
    Buffer,
}

impl VariantType {
    /// Integer, Long, Boolean and Date compare exactly as 64-bit integers.
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            VariantType::Integer | VariantType::Long | VariantType::Boolean | VariantType::Date
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            VariantType::Integer => "Integer",
            VariantType::Long => "Long",
            VariantType::Double => "Double",
            VariantType::String => "String",
            VariantType::Date => "Date",
            VariantType::Boolean => "Boolean",
            VariantType::Buffer => "Buffer",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Integer(i32),
    Long(i64),
    Double(f64),
    String(String),
    Date(DateTime<Utc>),
    Boolean(bool),
    Buffer(Bytes),
}

/// The runtime value flowing through expression evaluation.
///
/// Exactly one payload is held at a time. Every `as_*` accessor is total: a
/// payload that has no sensible conversion falls back to a fixed default
/// instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    payload: Payload,
    is_null: bool,
    name: Option<String>,
    type_name: Option<String>,
}

impl Default for Variant {
    fn default() -> Self {
        Variant::null()
    }
}

impl Variant {
    pub fn new(payload: Payload) -> Self {
        Variant {
            payload,
            is_null: false,
            name: None,
            type_name: None,
        }
    }

    /// A null value; its payload is the integer zero.
    pub fn null() -> Self {
        Variant {
            is_null: true,
            ..Variant::new(Payload::Integer(0))
        }
    }

    pub fn integer(value: i32) -> Self {
        Variant::new(Payload::Integer(value))
    }

    pub fn long(value: i64) -> Self {
        Variant::new(Payload::Long(value))
    }

    pub fn double(value: f64) -> Self {
        Variant::new(Payload::Double(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Variant::new(Payload::String(value.into()))
    }

    pub fn date(value: DateTime<Utc>) -> Self {
        Variant::new(Payload::Date(value))
    }

    pub fn boolean(value: bool) -> Self {
        Variant::new(Payload::Boolean(value))
    }

    pub fn buffer(value: impl Into<Bytes>) -> Self {
        Variant::new(Payload::Buffer(value.into()))
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn variant_type(&self) -> VariantType {
        match self.payload {
            Payload::Integer(_) => VariantType::Integer,
            Payload::Long(_) => VariantType::Long,
            Payload::Double(_) => VariantType::Double,
            Payload::String(_) => VariantType::String,
            Payload::Date(_) => VariantType::Date,
            Payload::Boolean(_) => VariantType::Boolean,
            Payload::Buffer(_) => VariantType::Buffer,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self.payload, Payload::String(_))
    }

    pub fn is_null(&self) -> bool {
        self.is_null
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.set_name(name);
        self
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn as_integer(&self) -> i32 {
        match &self.payload {
            Payload::Integer(v) => *v,
            Payload::Long(v) => *v as i32,
            Payload::Double(v) => *v as i32,
            Payload::String(s) => s.parse().unwrap_or(0),
            Payload::Boolean(b) => i32::from(*b),
            Payload::Buffer(buffer) => buffer.len() as i32,
            Payload::Date(_) => 0,
        }
    }

    pub fn as_long(&self) -> i64 {
        match &self.payload {
            Payload::Integer(v) => i64::from(*v),
            Payload::Long(v) => *v,
            Payload::Double(v) => *v as i64,
            Payload::String(s) => s.parse().unwrap_or(0),
            Payload::Boolean(b) => i64::from(*b),
            Payload::Date(date) => date.timestamp_millis(),
            Payload::Buffer(buffer) => buffer.len() as i64,
        }
    }

    pub fn as_double(&self) -> f64 {
        match &self.payload {
            Payload::Integer(v) => f64::from(*v),
            Payload::Long(v) => *v as f64,
            Payload::Double(v) => *v,
            Payload::String(s) => s.parse().unwrap_or(0.0),
            Payload::Boolean(b) => f64::from(u8::from(*b)),
            Payload::Buffer(buffer) => buffer.len() as f64,
            Payload::Date(_) => 0.0,
        }
    }

    pub fn as_string(&self) -> String {
        if self.is_null {
            return "null".to_string();
        }
        match &self.payload {
            Payload::Integer(v) => v.to_string(),
            Payload::Long(v) => v.to_string(),
            Payload::Double(v) => format_double(*v),
            Payload::String(s) => s.clone(),
            Payload::Boolean(b) => b.to_string(),
            Payload::Date(date) => date.format(DEFAULT_DATE_FORMAT).to_string(),
            Payload::Buffer(_) => BUFFER_PLACEHOLDER.to_string(),
        }
    }

    pub fn as_boolean(&self) -> bool {
        match &self.payload {
            Payload::Integer(v) => *v != 0,
            Payload::Long(v) => *v != 0,
            Payload::Double(v) => *v != 0.0,
            Payload::String(s) => s == "true",
            Payload::Boolean(b) => *b,
            Payload::Date(_) => true,
            Payload::Buffer(buffer) => !buffer.is_empty(),
        }
    }

    /// Numbers are epoch milliseconds; unparseable text and other payloads give "now".
    pub fn as_date(&self) -> DateTime<Utc> {
        let millis = match &self.payload {
            Payload::Integer(v) => i64::from(*v),
            Payload::Long(v) => *v,
            Payload::Double(v) => *v as i64,
            Payload::String(s) => {
                return NaiveDateTime::parse_from_str(s, DEFAULT_DATE_FORMAT)
                    .map(|naive| naive.and_utc())
                    .unwrap_or_else(|_| Utc::now());
            }
            Payload::Date(date) => return *date,
            Payload::Boolean(_) | Payload::Buffer(_) => return Utc::now(),
        };
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    pub fn as_buffer(&self) -> Bytes {
        match &self.payload {
            Payload::String(s) => Bytes::from(s.clone().into_bytes()),
            Payload::Buffer(buffer) => buffer.clone(),
            _ => Bytes::from_static(&[0]),
        }
    }
}

/// Renders a double keeping a trailing `.0` on integral values.
fn format_double(n: f64) -> String {
    if n.is_finite() && n == n.trunc() {
        format!("{n}.0")
    } else {
        format!("{n}")
    }
}

impl Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::integer(value)
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Variant::long(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::double(value)
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::boolean(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::string(value)
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::string(value)
    }
}

impl From<DateTime<Utc>> for Variant {
    fn from(value: DateTime<Utc>) -> Self {
        Variant::date(value)
    }
}

impl From<Bytes> for Variant {
    fn from(value: Bytes) -> Self {
        Variant::buffer(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn integer_coercions() {
        assert_eq!(Variant::long(1 << 33 | 5).as_integer(), 5);
        assert_eq!(Variant::double(-2.9).as_integer(), -2);
        assert_eq!(Variant::string("42").as_integer(), 42);
        assert_eq!(Variant::string("4.2").as_integer(), 0);
        assert_eq!(Variant::boolean(true).as_integer(), 1);
        assert_eq!(Variant::buffer(&b"abc"[..]).as_integer(), 3);
    }

    #[test]
    fn date_is_epoch_millis_only_as_long() {
        let date = Utc.timestamp_millis_opt(1_500).unwrap();
        assert_eq!(Variant::date(date).as_long(), 1_500);
        assert_eq!(Variant::date(date).as_integer(), 0);
        assert_eq!(Variant::date(date).as_double(), 0.0);
        assert_eq!(Variant::long(1_500).as_date(), date);
    }

    #[test]
    fn double_coercions() {
        assert_eq!(Variant::string("2.5").as_double(), 2.5);
        assert_eq!(Variant::string("abc").as_double(), 0.0);
        assert_eq!(Variant::boolean(true).as_double(), 1.0);
        assert_eq!(Variant::integer(7).as_double(), 7.0);
    }

    #[test]
    fn string_rendering() {
        assert_eq!(Variant::double(11.0).as_string(), "11.0");
        assert_eq!(Variant::double(0.5).as_string(), "0.5");
        assert_eq!(Variant::long(-3).as_string(), "-3");
        assert_eq!(Variant::boolean(false).as_string(), "false");
        assert_eq!(Variant::buffer(&b"\x01"[..]).as_string(), BUFFER_PLACEHOLDER);
        assert_eq!(Variant::null().as_string(), "null");
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(Variant::date(date).as_string(), "2024-03-01 12:30:00");
    }

    #[test]
    fn boolean_coercions() {
        assert!(Variant::double(-0.5).as_boolean());
        assert!(!Variant::integer(0).as_boolean());
        assert!(Variant::string("true").as_boolean());
        assert!(!Variant::string("True").as_boolean());
        assert!(Variant::date(Utc::now()).as_boolean());
        assert!(!Variant::buffer(Bytes::new()).as_boolean());
    }

    #[test]
    fn date_from_text() {
        let parsed = Variant::string("2024-03-01 12:30:00").as_date();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap());

        let before = Utc::now();
        let fallback = Variant::string("not a date").as_date();
        assert!(fallback >= before);
    }

    #[test]
    fn buffer_coercions() {
        assert_eq!(Variant::string("hi").as_buffer(), Bytes::from_static(b"hi"));
        assert_eq!(Variant::integer(9).as_buffer(), Bytes::from_static(&[0]));
    }

    #[test]
    fn null_keeps_metadata_separate() {
        let value = Variant::null().with_name("system.null");
        assert!(value.is_null());
        assert_eq!(value.name(), Some("system.null"));
        assert_eq!(value.as_long(), 0);
    }
}
