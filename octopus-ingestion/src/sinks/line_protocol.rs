use std::collections::BTreeMap;

use time::OffsetDateTime;

/// Escape tag keys, tag values and field keys.
///
/// Line protocol requires escaping commas, spaces and equals with a backslash.
fn escape_ident(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            ',' | ' ' | '=' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
}

/// Measurements only need commas and spaces escaped.
fn escape_measurement(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            ',' | ' ' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
}

fn push_string_value(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        if matches!(ch, '"' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
}

fn push_tag(out: &mut String, key: &str, value: &str) {
    out.push(',');
    escape_ident(key, out);
    out.push('=');
    escape_ident(value, out);
}

fn push_field(out: &mut String, first: &mut bool, key: &str, value: &FieldValue) {
    if *first {
        *first = false;
    } else {
        out.push(',');
    }

    escape_ident(key, out);
    out.push('=');
    match value {
        FieldValue::Float(v) => out.push_str(&v.to_string()),
        FieldValue::String(s) => push_string_value(s, out),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    String(String),
}

impl FieldValue {
    /// NaN and infinities have no line protocol representation.
    fn is_writable(&self) -> bool {
        match self {
            Self::Float(v) => v.is_finite(),
            Self::String(_) => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Float(_) => None,
            Self::String(s) => Some(s),
        }
    }
}

/// A single time-series point: measurement, tags, typed fields and a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: Vec<(String, FieldValue)>,
    timestamp: OffsetDateTime,
}

impl Point {
    pub fn new(measurement: impl Into<String>, timestamp: OffsetDateTime) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: Vec::new(),
            timestamp,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn float_field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.push((key.into(), FieldValue::Float(value)));
        self
    }

    pub fn string_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), FieldValue::String(value.into())));
        self
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn timestamp_nanos(&self) -> i128 {
        self.timestamp.unix_timestamp_nanos()
    }

    /// Append this point as one line (without trailing newline).
    ///
    /// `default_tags` are merged in underneath the point's own tags. Returns
    /// `false` and writes nothing if the point has no writable field.
    pub fn write_line(&self, default_tags: &BTreeMap<String, String>, out: &mut String) -> bool {
        let fields: Vec<&(String, FieldValue)> =
            self.fields.iter().filter(|(_, v)| v.is_writable()).collect();
        if fields.is_empty() {
            return false;
        }

        escape_measurement(&self.measurement, out);

        let mut tags: BTreeMap<&str, &str> = default_tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        tags.extend(self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        for (key, value) in tags {
            // Empty tag values are not representable.
            if !value.is_empty() {
                push_tag(out, key, value);
            }
        }

        out.push(' ');
        let mut first = true;
        for (key, value) in fields {
            push_field(out, &mut first, key, value);
        }

        out.push(' ');
        out.push_str(&self.timestamp_nanos().to_string());
        true
    }
}
