//! Line-protocol data model

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// One measurement record: name, tags and numeric fields.
///
/// Tags and fields are kept sorted by key so the serialized line is
/// deterministic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, f64>,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Adds or replaces a tag
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Adds or replaces a field.
    ///
    /// NaN and infinite values are not representable in line protocol and are
    /// dropped.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: f64) -> Self {
        if value.is_finite() {
            self.fields.insert(key.into(), value);
        }
        self
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn fields(&self) -> &BTreeMap<String, f64> {
        &self.fields
    }

    pub fn get_field(&self, key: &str) -> Option<f64> {
        self.fields.get(key).copied()
    }

    pub fn get_tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Serializes as `measurement[,tag=val...] field=val[,field=val...]`
    pub fn to_line(&self) -> String {
        let mut line = escape(&self.measurement);
        for (key, value) in &self.tags {
            let _ = write!(line, ",{}={}", escape(key), escape(value));
        }
        let mut separator = ' ';
        for (key, value) in &self.fields {
            let _ = write!(line, "{separator}{}={value}", escape(key));
            separator = ',';
        }
        line
    }
}

/// Escapes backslash first, then comma, space and equals
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' | ',' | ' ' | '=' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_every_identifier_position() {
        let point = Point::new("peer stats")
            .tag("asn", "AS64500 Example")
            .tag("path", "/var/lib/bitcoin,mainnet")
            .field("latency ms", 1.23)
            .field("peers", 8.0);
        assert_eq!(
            point.to_line(),
            r"peer\ stats,asn=AS64500\ Example,path=/var/lib/bitcoin\,mainnet latency\ ms=1.23,peers=8"
        );
    }

    #[test]
    fn backslash_is_escaped_before_other_characters() {
        assert_eq!(escape(r"a\b=c"), r"a\\b\=c");
        assert_eq!(escape(r"\,"), r"\\\,");
    }

    #[test]
    fn no_trailing_space_without_fields() {
        let point = Point::new("empty").tag("network", "mainnet");
        assert_eq!(point.to_line(), "empty,network=mainnet");
        assert!(!point.has_fields());
    }

    #[test]
    fn non_finite_fields_are_dropped() {
        let point = Point::new("m")
            .field("nan", f64::NAN)
            .field("inf", f64::INFINITY)
            .field("ok", 0.5);
        assert_eq!(point.fields().len(), 1);
        assert_eq!(point.get_field("ok"), Some(0.5));
    }

    #[test]
    fn repeated_keys_replace_previous_value() {
        let point = Point::new("m").tag("t", "a").tag("t", "b").field("f", 1.0).field("f", 2.0);
        assert_eq!(point.to_line(), "m,t=b f=2");
    }
}
