use serde::{Deserialize, Deserializer, Serialize};

/// Structured biographical record for one author entry.
///
/// Dates are strings, not numbers: the source books give Hijri years,
/// partial dates ("after 660"), or nothing at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub name: String,
    #[serde(default, deserialize_with = "de_date")]
    pub birth_date: Option<String>,
    #[serde(default, deserialize_with = "de_date")]
    pub death_date: Option<String>,
    #[serde(default)]
    pub profession: Option<String>,
    #[serde(default)]
    pub known_works: Vec<String>,
}

/// Accept a date given as a JSON string or a bare number. Models frequently
/// return `"death_date": 1200` even when asked for strings.
fn de_date<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;
    match Option::<Value>::deserialize(de)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string, number, or null for date, got {other}"
        ))),
    }
}

impl AuthorRecord {
    /// Parse a record from a JSON document. Missing `name` or wrong field
    /// types are errors; the optional fields default to null/empty.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Canonical on-disk form: pretty-printed, UTF-8, non-ASCII unescaped
    /// (serde_json never escapes above-ASCII, so RTL text stays readable),
    /// trailing newline. Byte-stable for a given record.
    pub fn to_canonical_json(&self) -> String {
        let mut s = serde_json::to_string_pretty(self).expect("record serializes");
        s.push('\n');
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_record_parses() {
        let r = AuthorRecord::from_json_str(
            r#"{"name":"Ahmad","birth_date":null,"death_date":"1200","profession":null,"known_works":[]}"#,
        )
        .unwrap();
        assert_eq!(r.name, "Ahmad");
        assert_eq!(r.birth_date, None);
        assert_eq!(r.death_date.as_deref(), Some("1200"));
        assert_eq!(r.profession, None);
        assert!(r.known_works.is_empty());
    }

    #[test]
    fn missing_name_is_an_error() {
        let err = AuthorRecord::from_json_str(r#"{"death_date":"1200"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn absent_optional_fields_default() {
        let r = AuthorRecord::from_json_str(r#"{"name":"Yusuf"}"#).unwrap();
        assert_eq!(r.birth_date, None);
        assert_eq!(r.profession, None);
        assert!(r.known_works.is_empty());
    }

    #[test]
    fn numeric_year_coerced_to_string() {
        let r = AuthorRecord::from_json_str(r#"{"name":"Ahmad","death_date":1200}"#).unwrap();
        assert_eq!(r.death_date.as_deref(), Some("1200"));
    }

    #[test]
    fn non_scalar_date_rejected() {
        let err = AuthorRecord::from_json_str(r#"{"name":"Ahmad","death_date":["1200"]}"#);
        assert!(err.is_err());
    }

    #[test]
    fn canonical_json_is_byte_stable() {
        let r = AuthorRecord {
            name: "\u{0623}\u{062d}\u{0645}\u{062f}".to_string(),
            birth_date: None,
            death_date: Some("241 AH".to_string()),
            profession: Some("muhaddith".to_string()),
            known_works: vec!["al-Musnad".to_string()],
        };
        assert_eq!(r.to_canonical_json(), r.to_canonical_json());
        assert!(r.to_canonical_json().ends_with('\n'));
        // Arabic stays unescaped in the output
        assert!(r.to_canonical_json().contains("\u{0623}\u{062d}\u{0645}\u{062f}"));
    }

    #[test]
    fn canonical_roundtrip() {
        let r = AuthorRecord {
            name: "Ahmad".into(),
            birth_date: Some("1150".into()),
            death_date: None,
            profession: None,
            known_works: vec!["Diwan".into()],
        };
        let back = AuthorRecord::from_json_str(&r.to_canonical_json()).unwrap();
        assert_eq!(back, r);
    }
}
