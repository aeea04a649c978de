//! Flat `key = value` configuration files.
//!
//! One setting per line, blank lines and `#` comments ignored. Values are
//! typed on read: `true`/`false` become booleans, then integers, then floats,
//! anything else a string. [`write_conf`] refuses values that would come back
//! as a different type, so `read(write(map)) == map` for everything it accepts.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Ordered settings map as stored in a conf file.
pub type ConfMap = BTreeMap<String, ConfValue>;

// ---------------------------------------------------------------------------
// ConfValue
// ---------------------------------------------------------------------------

/// A typed setting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ConfValue {
    /// Infer the type of a raw (already trimmed) value.
    ///
    /// # Example
    ///
    /// ```
    /// use minebridge_core::conf::ConfValue;
    ///
    /// assert_eq!(ConfValue::infer("true"), ConfValue::Bool(true));
    /// assert_eq!(ConfValue::infer("-7"), ConfValue::Int(-7));
    /// assert_eq!(ConfValue::infer("0.5"), ConfValue::Float(0.5));
    /// assert_eq!(ConfValue::infer("leaves"), ConfValue::Str("leaves".into()));
    /// ```
    #[must_use]
    pub fn infer(raw: &str) -> Self {
        match raw {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return Self::Float(f);
            }
        }
        Self::Str(raw.to_string())
    }

    /// Text written to the file for this value.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            // Debug keeps the fractional part so 1.0 does not read back as 1.
            Self::Float(f) => format!("{f:?}"),
            Self::Str(s) => s.clone(),
        }
    }

    /// Check that this value survives a write/read cycle unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for non-finite floats, strings
    /// containing line breaks or surrounding whitespace, and strings that
    /// would be read back as another type (e.g. `"42"`).
    pub fn check_round_trip(&self, key: &str) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidValue {
            field: key.to_string(),
            message: message.to_string(),
        };
        match self {
            Self::Float(f) if !f.is_finite() => Err(invalid("float must be finite")),
            Self::Str(s) if s.contains(['\n', '\r']) => Err(invalid("value contains a line break")),
            Self::Str(s) if s.trim() != s => Err(invalid("value has surrounding whitespace")),
            Self::Str(s) if !matches!(Self::infer(s), Self::Str(_)) => {
                Err(invalid("string would be read back as another type"))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ConfValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<bool> for ConfValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ConfValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for ConfValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ConfValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ConfValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ConfValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Check that `key` can be written as the left-hand side of a line.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidKey`] for empty keys, keys containing `=` or
/// whitespace, and keys that would be read as a comment.
pub fn check_key(key: &str) -> Result<(), ConfigError> {
    if key.is_empty()
        || key.starts_with('#')
        || key.contains('=')
        || key.chars().any(char::is_whitespace)
    {
        return Err(ConfigError::InvalidKey(key.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Parse / render
// ---------------------------------------------------------------------------

/// Parse conf text.
///
/// Later lines win when a key repeats.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] for a non-comment line without `=` or with
/// an empty key.
pub fn parse_conf(text: &str) -> Result<ConfMap, ConfigError> {
    let mut map = ConfMap::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::Parse {
                line: i + 1,
                content: line.to_string(),
            });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::Parse {
                line: i + 1,
                content: line.to_string(),
            });
        }
        map.insert(key.to_string(), ConfValue::infer(value.trim()));
    }
    Ok(map)
}

/// Render entries as conf text, one `key = value` line each, in order.
///
/// # Errors
///
/// Fails on the first key or value that would not read back unchanged.
pub fn render_conf<'a, I>(entries: I) -> Result<String, ConfigError>
where
    I: IntoIterator<Item = (&'a String, &'a ConfValue)>,
{
    let mut out = String::new();
    for (key, value) in entries {
        check_key(key)?;
        value.check_round_trip(key)?;
        out.push_str(key);
        out.push_str(" = ");
        out.push_str(&value.render());
        out.push('\n');
    }
    Ok(out)
}

/// Read and parse a conf file.
///
/// # Errors
///
/// Propagates I/O errors and [`parse_conf`] errors.
pub fn read_conf(path: impl AsRef<Path>) -> Result<ConfMap, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    parse_conf(&text)
}

/// Write `map` to `path`, replacing any existing file.
///
/// Nothing is written if any entry is rejected.
///
/// # Errors
///
/// Propagates [`render_conf`] validation errors and I/O errors.
pub fn write_conf(path: impl AsRef<Path>, map: &ConfMap) -> Result<(), ConfigError> {
    let text = render_conf(map)?;
    std::fs::write(path, text)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> ConfMap {
        let mut map = ConfMap::new();
        map.insert("mute_sound".into(), ConfValue::Bool(true));
        map.insert("screen_w".into(), ConfValue::Int(1024));
        map.insert("fixed_map_seed".into(), ConfValue::Int(-42));
        map.insert("dtime".into(), ConfValue::Float(1.0));
        map.insert("fog_start".into(), ConfValue::Float(0.25));
        map.insert("big".into(), ConfValue::Float(1e20));
        map.insert("name".into(), ConfValue::Str("singleplayer".into()));
        map.insert("motd".into(), ConfValue::Str("hello world".into()));
        map.insert("empty".into(), ConfValue::Str(String::new()));
        map
    }

    // ---- infer ----

    #[test]
    fn infer_prefers_bool_then_int_then_float() {
        assert_eq!(ConfValue::infer("false"), ConfValue::Bool(false));
        assert_eq!(ConfValue::infer("12"), ConfValue::Int(12));
        assert_eq!(ConfValue::infer("12.0"), ConfValue::Float(12.0));
        assert_eq!(ConfValue::infer("True"), ConfValue::Str("True".into()));
    }

    #[test]
    fn infer_keeps_non_finite_as_string() {
        assert_eq!(ConfValue::infer("inf"), ConfValue::Str("inf".into()));
        assert_eq!(ConfValue::infer("NaN"), ConfValue::Str("NaN".into()));
    }

    #[test]
    fn whole_floats_keep_fraction() {
        assert_eq!(ConfValue::Float(3.0).render(), "3.0");
    }

    // ---- round trip ----

    #[test]
    fn read_of_write_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.conf");
        let map = sample_map();
        write_conf(&path, &map).unwrap();
        assert_eq!(read_conf(&path).unwrap(), map);
    }

    #[test]
    fn write_rejects_ambiguous_string() {
        let mut map = ConfMap::new();
        map.insert("port".into(), ConfValue::Str("30000".into()));
        assert!(matches!(
            render_conf(&map),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn write_rejects_nan_and_newlines() {
        let mut map = ConfMap::new();
        map.insert("x".into(), ConfValue::Float(f64::NAN));
        assert!(render_conf(&map).is_err());

        let mut map = ConfMap::new();
        map.insert("x".into(), ConfValue::Str("a\nb = c".into()));
        assert!(render_conf(&map).is_err());
    }

    #[test]
    fn write_rejects_bad_keys() {
        for key in ["", "a b", "a=b", "#comment"] {
            let mut map = ConfMap::new();
            map.insert(key.into(), ConfValue::Bool(true));
            assert!(
                matches!(render_conf(&map), Err(ConfigError::InvalidKey(_))),
                "key {key:?} accepted"
            );
        }
    }

    #[test]
    fn rejected_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.conf");
        let mut map = ConfMap::new();
        map.insert("x".into(), ConfValue::Float(f64::INFINITY));
        assert!(write_conf(&path, &map).is_err());
        assert!(!path.exists());
    }

    // ---- parse ----

    #[test]
    fn parse_skips_comments_and_blanks() {
        let map = parse_conf("# header\n\n  a = 1\n#b = 2\nc=  x y \n").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"], ConfValue::Int(1));
        assert_eq!(map["c"], ConfValue::Str("x y".into()));
    }

    #[test]
    fn parse_reports_line_number() {
        let err = parse_conf("a = 1\nbroken\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 2, .. }));
    }

    #[test]
    fn parse_last_duplicate_wins() {
        let map = parse_conf("a = 1\na = 2\n").unwrap();
        assert_eq!(map["a"], ConfValue::Int(2));
    }

    #[test]
    fn untagged_serde_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            overrides: ConfMap,
        }
        let w: Wrapper =
            toml::from_str("overrides = { viewing_range = 50, smooth = false, gamma = 1.5, mode = \"x\" }")
                .unwrap();
        assert_eq!(w.overrides["viewing_range"], ConfValue::Int(50));
        assert_eq!(w.overrides["smooth"], ConfValue::Bool(false));
        assert_eq!(w.overrides["gamma"], ConfValue::Float(1.5));
        assert_eq!(w.overrides["mode"], ConfValue::Str("x".into()));
    }
}
