//! Codec Module
//!
//! Reversible transform between JSON values and compact payload strings.
//!
//! Two tiers:
//! - Passthrough: plain compact JSON for scalars, objects and short arrays.
//! - Compacted: long arrays (typically lists of match records) are rewritten
//!   with a substitution table that shortens field names, `null` becomes the
//!   numeric sentinel `0`, and the `https://` / `http://` schemes collapse to
//!   `h://` / `p://`.
//!
//! Compaction walks the value tree rather than rewriting text, and escapes
//! every input that could collide with a substituted form using a leading
//! `~`. Genuine integer zeros are written as the string `"~0"`. This keeps
//! `decompress(compress(v)) == v` for every JSON value.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::cache::entry::{CacheEntry, Tier};
use crate::error::{CacheError, Result};

// == Public Constants ==
/// Codec format tag stored with every entry.
pub const SCHEMA_VERSION: &str = "3";

/// Default minimum array length for the compaction tier.
pub const DEFAULT_COMPACT_MIN_LEN: usize = 10;

const ESCAPE: char = '~';
const ZERO_MARKER: &str = "~0";
const NULL_SENTINEL: u64 = 0;

const HTTPS: &str = "https://";
const HTTP: &str = "http://";
const HTTPS_SHORT: &str = "h://";
const HTTP_SHORT: &str = "p://";

/// Field names of the upstream football data provider and their short tokens.
pub const FOOTBALL_FIELDS: &[(&str, &str)] = &[
    ("match_id", "mi"),
    ("match_date", "md"),
    ("match_time", "mt"),
    ("match_hometeam_name", "mhn"),
    ("match_awayteam_name", "man"),
    ("match_hometeam_id", "mhi"),
    ("match_awayteam_id", "mai"),
    ("match_hometeam_score", "mhs"),
    ("match_awayteam_score", "mas"),
    ("match_status", "mst"),
    ("team_home_badge", "thb"),
    ("team_away_badge", "tab"),
    ("league_name", "ln"),
    ("league_logo", "ll"),
    ("league_id", "li"),
    ("country_name", "cn"),
    ("country_logo", "cl"),
    ("country_id", "ci"),
    ("match_stadium", "ms"),
];

// == Substitution Table ==
/// Bidirectional field-name dictionary used by the compaction tier.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionTable {
    to_short: HashMap<String, String>,
    to_long: HashMap<String, String>,
}

impl SubstitutionTable {
    /// Builds a validated table from `(long, short)` pairs.
    ///
    /// Rejects empty names, names starting with `~`, duplicate long or short
    /// names, and short tokens that are also long names.
    pub fn new<I, L, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (L, S)>,
        L: Into<String>,
        S: Into<String>,
    {
        let mut table = Self::default();

        for (long, short) in pairs {
            let (long, short) = (long.into(), short.into());

            for name in [&long, &short] {
                if name.is_empty() || name.starts_with(ESCAPE) {
                    return Err(CacheError::InvalidConfig(format!(
                        "invalid substitution name: {name:?}"
                    )));
                }
            }
            if table.to_short.contains_key(&long) {
                return Err(CacheError::InvalidConfig(format!(
                    "duplicate field name: {long}"
                )));
            }
            if table.to_long.contains_key(&short) {
                return Err(CacheError::InvalidConfig(format!(
                    "duplicate short token: {short}"
                )));
            }

            table.to_short.insert(long.clone(), short.clone());
            table.to_long.insert(short, long);
        }

        if let Some(clash) = table.to_long.keys().find(|s| table.to_short.contains_key(*s)) {
            return Err(CacheError::InvalidConfig(format!(
                "short token is also a field name: {clash}"
            )));
        }

        Ok(table)
    }

    /// The built-in football data dictionary.
    pub fn football() -> Self {
        let to_short = FOOTBALL_FIELDS
            .iter()
            .map(|(long, short)| (long.to_string(), short.to_string()))
            .collect();
        let to_long = FOOTBALL_FIELDS
            .iter()
            .map(|(long, short)| (short.to_string(), long.to_string()))
            .collect();

        Self { to_short, to_long }
    }

    /// Short token for a field name, if any.
    pub fn shorten(&self, long: &str) -> Option<&str> {
        self.to_short.get(long).map(String::as_str)
    }

    /// Field name for a short token, if any.
    pub fn expand(&self, short: &str) -> Option<&str> {
        self.to_long.get(short).map(String::as_str)
    }

    pub fn is_token(&self, name: &str) -> bool {
        self.to_long.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.to_short.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_short.is_empty()
    }
}

// == Encoded Payload ==
/// Output of [`Codec::compress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub tier: Tier,
    pub payload: String,
}

// == Codec ==
/// Two-tier JSON codec.
#[derive(Debug, Clone)]
pub struct Codec {
    table: Arc<SubstitutionTable>,
    compact_min_len: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(SubstitutionTable::football(), DEFAULT_COMPACT_MIN_LEN)
    }
}

impl Codec {
    // == Constructor ==
    /// Creates a codec.
    ///
    /// # Arguments
    /// * `table` - Field-name dictionary for the compaction tier
    /// * `compact_min_len` - Arrays with at least this many elements are compacted
    pub fn new(table: SubstitutionTable, compact_min_len: usize) -> Self {
        Self {
            table: Arc::new(table),
            compact_min_len,
        }
    }

    /// Picks the tier for a value.
    pub fn select_tier(&self, value: &Value) -> Tier {
        match value {
            Value::Array(items) if items.len() >= self.compact_min_len => Tier::Compacted,
            _ => Tier::Passthrough,
        }
    }

    // == Compress ==
    /// Serializes a value into its stored form.
    pub fn compress(&self, value: &Value) -> Result<Encoded> {
        let tier = self.select_tier(value);
        let payload = match tier {
            Tier::Passthrough => serde_json::to_string(value),
            Tier::Compacted => serde_json::to_string(&self.compact_value(value)),
        }
        .map_err(|e| CacheError::Encode(e.to_string()))?;

        Ok(Encoded { tier, payload })
    }

    // == Decompress ==
    /// Restores a value from a payload produced under `tier`.
    pub fn decompress(&self, payload: &str, tier: Tier) -> Result<Value> {
        let parsed: Value =
            serde_json::from_str(payload).map_err(|e| CacheError::Decode(e.to_string()))?;

        Ok(match tier {
            Tier::Passthrough => parsed,
            Tier::Compacted => self.expand_value(parsed),
        })
    }

    /// Decodes a stored entry, refusing payloads from another codec version.
    pub fn decode_entry(&self, entry: &CacheEntry) -> Result<Value> {
        if entry.schema_version != SCHEMA_VERSION {
            return Err(CacheError::Decode(format!(
                "unsupported schema version {} (expected {})",
                entry.schema_version, SCHEMA_VERSION
            )));
        }
        self.decompress(&entry.payload, entry.tier)
    }

    // == Compaction ==
    fn compact_value(&self, value: &Value) -> Value {
        match value {
            Value::Null => Value::from(NULL_SENTINEL),
            Value::Number(n) if n.as_u64() == Some(0) => Value::String(ZERO_MARKER.to_string()),
            Value::String(s) => Value::String(compact_str(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.compact_value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (self.compact_key(k), self.compact_value(v)))
                    .collect(),
            ),
            Value::Bool(_) | Value::Number(_) => value.clone(),
        }
    }

    fn compact_key(&self, key: &str) -> String {
        if let Some(short) = self.table.shorten(key) {
            short.to_string()
        } else if key.starts_with(ESCAPE) || self.table.is_token(key) {
            format!("{ESCAPE}{key}")
        } else {
            key.to_string()
        }
    }

    fn expand_value(&self, value: Value) -> Value {
        match value {
            Value::Number(n) if n.as_u64() == Some(NULL_SENTINEL) => Value::Null,
            Value::String(s) => expand_str(s),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.expand_value(v)).collect())
            }
            Value::Object(map) => {
                let mut expanded = Map::with_capacity(map.len());
                for (k, v) in map {
                    expanded.insert(self.expand_key(k), self.expand_value(v));
                }
                Value::Object(expanded)
            }
            other => other,
        }
    }

    fn expand_key(&self, key: String) -> String {
        if let Some(rest) = key.strip_prefix(ESCAPE) {
            rest.to_string()
        } else if let Some(long) = self.table.expand(&key) {
            long.to_string()
        } else {
            key
        }
    }
}

fn compact_str(s: &str) -> String {
    if s.starts_with(ESCAPE) || s.starts_with(HTTPS_SHORT) || s.starts_with(HTTP_SHORT) {
        format!("{ESCAPE}{s}")
    } else if let Some(rest) = s.strip_prefix(HTTPS) {
        format!("{HTTPS_SHORT}{rest}")
    } else if let Some(rest) = s.strip_prefix(HTTP) {
        format!("{HTTP_SHORT}{rest}")
    } else {
        s.to_string()
    }
}

fn expand_str(s: String) -> Value {
    if s == ZERO_MARKER {
        Value::from(0u64)
    } else if let Some(rest) = s.strip_prefix(ESCAPE) {
        Value::String(rest.to_string())
    } else if let Some(rest) = s.strip_prefix(HTTPS_SHORT) {
        Value::String(format!("{HTTPS}{rest}"))
    } else if let Some(rest) = s.strip_prefix(HTTP_SHORT) {
        Value::String(format!("{HTTP}{rest}"))
    } else {
        Value::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn match_record(i: u64) -> Value {
        json!({
            "match_id": i.to_string(),
            "match_date": "2024-05-14",
            "match_time": "20:00",
            "match_hometeam_name": "Galatasaray",
            "match_awayteam_name": "Fenerbahce",
            "match_hometeam_score": null,
            "team_home_badge": "https://apiv3.apifootball.com/badges/1.jpg",
            "team_away_badge": "http://example.org/badges/2.jpg",
            "league_name": "Super Lig",
            "league_id": 322,
            "match_stadium": null,
        })
    }

    #[test]
    fn test_small_values_use_passthrough() {
        let codec = Codec::default();
        for value in [json!(null), json!({"a": 1}), json!([1, 2, 3]), json!("text")] {
            let encoded = codec.compress(&value).unwrap();
            assert_eq!(encoded.tier, Tier::Passthrough);
            assert_eq!(encoded.payload, serde_json::to_string(&value).unwrap());
        }
    }

    #[test]
    fn test_passthrough_has_no_whitespace() {
        let codec = Codec::default();
        let encoded = codec.compress(&json!({"a": [1, 2], "b": "x y"})).unwrap();
        assert_eq!(encoded.payload, r#"{"a":[1,2],"b":"x y"}"#);
    }

    #[test]
    fn test_large_arrays_are_compacted() {
        let codec = Codec::default();
        let value = Value::Array((0..20).map(match_record).collect());

        let encoded = codec.compress(&value).unwrap();
        assert_eq!(encoded.tier, Tier::Compacted);
        assert!(encoded.payload.contains(r#""mhn":"Galatasaray""#));
        assert!(encoded.payload.contains(r#""thb":"h://apiv3"#));
        assert!(encoded.payload.contains(r#""tab":"p://example"#));
        assert!(!encoded.payload.contains("null"));
        assert!(encoded.payload.len() < serde_json::to_string(&value).unwrap().len());

        assert_eq!(codec.decompress(&encoded.payload, encoded.tier).unwrap(), value);
    }

    #[test]
    fn test_genuine_zero_survives_compaction() {
        let codec = Codec::new(SubstitutionTable::football(), 2);
        let value = json!([{"score": 0, "missing": null}, [0, 0.0, null, 10]]);

        let encoded = codec.compress(&value).unwrap();
        assert_eq!(encoded.tier, Tier::Compacted);
        assert_eq!(codec.decompress(&encoded.payload, encoded.tier).unwrap(), value);
    }

    #[test]
    fn test_floats_survive_both_tiers() {
        let codec = Codec::new(SubstitutionTable::football(), 2);
        let odds = [59.670212765957444, 0.1 + 0.2, 1.0 / 3.0, 2.2250738585072014e-308, -1.5e300];

        for value in [json!(odds[0]), json!(odds)] {
            let encoded = codec.compress(&value).unwrap();
            assert_eq!(codec.decompress(&encoded.payload, encoded.tier).unwrap(), value);
        }
    }

    #[test]
    fn test_colliding_inputs_are_escaped() {
        let codec = Codec::new(SubstitutionTable::football(), 1);
        let value = json!([{
            "mi": "already a token",
            "~tilde": "~0",
            "match_id": "h://not-a-url",
            "link": "p://also-not",
            "zero": "~~0",
        }]);

        let encoded = codec.compress(&value).unwrap();
        assert_eq!(codec.decompress(&encoded.payload, encoded.tier).unwrap(), value);
    }

    #[test]
    fn test_decode_rejects_other_schema_version() {
        let codec = Codec::default();
        let mut entry = CacheEntry::new("k".into(), "[1]".into(), Tier::Passthrough, 0, 1, 1);
        assert_eq!(codec.decode_entry(&entry).unwrap(), json!([1]));

        entry.schema_version = "2.0".to_string();
        assert!(matches!(codec.decode_entry(&entry), Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_decode_garbage_is_error() {
        let codec = Codec::default();
        assert!(codec.decompress("{not json", Tier::Passthrough).is_err());
        assert!(codec.decompress("[1,", Tier::Compacted).is_err());
    }

    #[test]
    fn test_table_validation() {
        assert!(SubstitutionTable::new(FOOTBALL_FIELDS.iter().copied()).is_ok());
        assert!(SubstitutionTable::new([("a", "x"), ("b", "x")]).is_err());
        assert!(SubstitutionTable::new([("a", "x"), ("a", "y")]).is_err());
        assert!(SubstitutionTable::new([("a", "b"), ("b", "c")]).is_err());
        assert!(SubstitutionTable::new([("~a", "x")]).is_err());
        assert!(SubstitutionTable::new([("a", "")]).is_err());
    }

    #[test]
    fn test_custom_table() {
        let table = SubstitutionTable::new([("player_name", "pn")]).unwrap();
        let codec = Codec::new(table, 1);
        let value = json!([{"player_name": "Icardi"}]);

        let encoded = codec.compress(&value).unwrap();
        assert_eq!(encoded.payload, r#"[{"pn":"Icardi"}]"#);
        assert_eq!(codec.decompress(&encoded.payload, encoded.tier).unwrap(), value);
    }
}
