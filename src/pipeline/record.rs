use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A record assembled from markup events
///
/// Maps field names to the text collected for them. Fields are kept sorted so records
/// compare and print deterministically.
///
/// # Example
/// ```
/// use copipe_lib::pipeline::Record;
///
/// let mut record = Record::new();
/// record.set("route", "22");
/// record.set("direction", "North Bound");
///
/// assert_eq!(record.get("route"), Some("22"));
/// assert_eq!(record.render("{route} {direction}"), "22 North Bound");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(|s| s.as_str())
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Field names in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Fill `{field}` placeholders in `template` with field values
    ///
    /// Unknown fields render as an empty string, `{{` and `}}` are literal braces.
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    out.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    out.push('}');
                }
                '{' => {
                    let mut field = String::new();
                    let mut closed = false;
                    for next in chars.by_ref() {
                        if next == '}' {
                            closed = true;
                            break;
                        }
                        field.push(next);
                    }
                    if closed {
                        out.push_str(self.get(field.trim()).unwrap_or(""));
                    } else {
                        out.push('{');
                        out.push_str(&field);
                    }
                }
                other => out.push(other),
            }
        }

        out
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {:?}", k, v)?;
        }
        write!(f, "}}")
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_creation() {
        let record = Record::new();
        assert!(record.is_empty());
        assert_eq!(record.keys().count(), 0);
    }

    #[test]
    fn test_set_replaces_value() {
        let mut record = Record::new();
        record.set("route", "22");
        record.set("route", "23");

        assert_eq!(record.get("route"), Some("23"));
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_missing_field() {
        let record = Record::new();
        assert_eq!(record.get("route"), None);
        assert!(!record.has("route"));
    }

    #[test]
    fn test_clear() {
        let mut record: Record = [("id", "7"), ("route", "22")].into_iter().collect();
        assert!(record.has("id"));

        record.clear();
        assert!(record.is_empty());
    }

    #[test]
    fn test_render_template() {
        let record: Record = [
            ("route", "22"),
            ("id", "7574"),
            ("direction", "North Bound"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            record.render("{route},{id},\"{direction}\""),
            "22,7574,\"North Bound\""
        );
        assert_eq!(record.render("{{literal}} {missing}!"), "{literal} !");
        assert_eq!(record.render("open {route"), "open {route");
    }

    #[test]
    fn test_display_is_sorted() {
        let record: Record = [("route", "22"), ("id", "1")].into_iter().collect();
        assert_eq!(record.to_string(), "{id: \"1\", route: \"22\"}");
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let record: Record = [("route", "22")].into_iter().collect();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"route": "22"}));
    }
}
