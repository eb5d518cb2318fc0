use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// 24-bit color stored as `#rrggbb` in persisted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const WHITE: Rgb = Rgb(255, 255, 255);
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const RED: Rgb = Rgb(220, 50, 47);
    pub const GREEN: Rgb = Rgb(133, 153, 0);
    pub const BLUE: Rgb = Rgb(38, 139, 210);
    pub const YELLOW: Rgb = Rgb(255, 215, 0);
    pub const ORANGE: Rgb = Rgb(255, 165, 0);
    pub const CYAN: Rgb = Rgb(42, 161, 152);
    pub const MAGENTA: Rgb = Rgb(211, 54, 130);

    /// Palette cycled by interactive front ends.
    pub const PALETTE: [Rgb; 9] = [
        Rgb::WHITE,
        Rgb::RED,
        Rgb::ORANGE,
        Rgb::YELLOW,
        Rgb::GREEN,
        Rgb::CYAN,
        Rgb::BLUE,
        Rgb::MAGENTA,
        Rgb::BLACK,
    ];

    fn named(name: &str) -> Option<Rgb> {
        let rgb = match name {
            "white" => Rgb::WHITE,
            "black" => Rgb::BLACK,
            "red" => Rgb::RED,
            "green" => Rgb::GREEN,
            "blue" => Rgb::BLUE,
            "yellow" => Rgb::YELLOW,
            "orange" => Rgb::ORANGE,
            "cyan" => Rgb::CYAN,
            "magenta" => Rgb::MAGENTA,
            _ => return None,
        };
        Some(rgb)
    }

    pub fn next_in_palette(self) -> Rgb {
        let idx = Rgb::PALETTE.iter().position(|c| *c == self);
        match idx {
            Some(i) => Rgb::PALETTE[(i + 1) % Rgb::PALETTE.len()],
            None => Rgb::PALETTE[0],
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

impl FromStr for Rgb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if let Some(rgb) = Rgb::named(&lower) {
            return Ok(rgb);
        }
        let hex = lower
            .strip_prefix('#')
            .ok_or_else(|| format!("`{s}` is neither a color name nor #rrggbb"))?;
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("`{s}` must have exactly six hex digits"));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| format!("`{s}` is not valid hex"))
        };
        Ok(Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl From<Rgb> for String {
    fn from(rgb: Rgb) -> Self {
        rgb.to_string()
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A single mode-specific setting value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Color(Rgb),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(v) => write!(f, "{v}"),
            SettingValue::Int(v) => write!(f, "{v}"),
            SettingValue::Color(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Int(value)
    }
}

impl From<Rgb> for SettingValue {
    fn from(value: Rgb) -> Self {
        SettingValue::Color(value)
    }
}

/// Shape of the values a setting key accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Bool,
    Int { min: i64, max: i64 },
    Color,
}

impl SettingKind {
    /// Check a typed value, returning a human readable reason on mismatch.
    pub fn check(&self, value: &SettingValue) -> Result<(), String> {
        match (self, value) {
            (SettingKind::Bool, SettingValue::Bool(_)) => Ok(()),
            (SettingKind::Color, SettingValue::Color(_)) => Ok(()),
            (SettingKind::Int { min, max }, SettingValue::Int(v)) => {
                if (*min..=*max).contains(v) {
                    Ok(())
                } else {
                    Err(format!("{v} is outside {min}..={max}"))
                }
            }
            (expected, got) => Err(format!("expected {expected}, got `{got}`")),
        }
    }

    /// Parse a textual value (from the command line) for this kind.
    pub fn parse(&self, raw: &str) -> Result<SettingValue, String> {
        let value = match self {
            SettingKind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => SettingValue::Bool(true),
                "false" | "off" | "no" | "0" => SettingValue::Bool(false),
                other => return Err(format!("`{other}` is not a boolean")),
            },
            SettingKind::Int { .. } => raw
                .trim()
                .parse::<i64>()
                .map(SettingValue::Int)
                .map_err(|err| format!("`{raw}`: {err}"))?,
            SettingKind::Color => SettingValue::Color(raw.parse()?),
        };
        self.check(&value)?;
        Ok(value)
    }
}

impl fmt::Display for SettingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingKind::Bool => f.write_str("a boolean"),
            SettingKind::Int { min, max } => write!(f, "an integer in {min}..={max}"),
            SettingKind::Color => f.write_str("a color"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SettingSpec {
    pub key: &'static str,
    pub kind: SettingKind,
    pub default: DefaultValue,
}

/// `const`-friendly mirror of [`SettingValue`] for schema tables.
#[derive(Debug, Clone, Copy)]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    Color(Rgb),
}

impl From<DefaultValue> for SettingValue {
    fn from(value: DefaultValue) -> Self {
        match value {
            DefaultValue::Bool(v) => SettingValue::Bool(v),
            DefaultValue::Int(v) => SettingValue::Int(v),
            DefaultValue::Color(v) => SettingValue::Color(v),
        }
    }
}

pub type Settings = BTreeMap<String, SettingValue>;

/// Read a stored settings map, dropping entries whose value has no
/// recognizable shape. Missing keys are filled from the mode defaults when
/// the state is normalized.
pub(crate) fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Settings, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value(value) {
            Ok(value) => Some((key, value)),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "dropping unreadable setting");
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_parses_names_and_hex() {
        assert_eq!("RED".parse::<Rgb>(), Ok(Rgb::RED));
        assert_eq!("#0a0B0c".parse::<Rgb>(), Ok(Rgb(10, 11, 12)));
        assert!("#12345".parse::<Rgb>().is_err());
        assert!("chartreuse".parse::<Rgb>().is_err());
        assert!("#+f+f+f".parse::<Rgb>().is_err());
        assert!("#-1ffff".parse::<Rgb>().is_err());
    }

    #[test]
    fn int_kind_enforces_bounds() {
        let kind = SettingKind::Int { min: 1, max: 6 };
        assert!(kind.check(&SettingValue::Int(6)).is_ok());
        assert!(kind.check(&SettingValue::Int(7)).is_err());
        assert!(kind.check(&SettingValue::Bool(true)).is_err());
        assert_eq!(kind.parse(" 3 "), Ok(SettingValue::Int(3)));
    }

    #[test]
    fn untagged_values_deserialize_by_shape() {
        let v: SettingValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, SettingValue::Bool(true));
        let v: SettingValue = serde_json::from_str("42").unwrap();
        assert_eq!(v, SettingValue::Int(42));
        let v: SettingValue = serde_json::from_str("\"#ff0000\"").unwrap();
        assert_eq!(v, SettingValue::Color(Rgb(255, 0, 0)));
    }

    #[test]
    fn palette_cycles() {
        assert_eq!(Rgb::WHITE.next_in_palette(), Rgb::RED);
        assert_eq!(Rgb::BLACK.next_in_palette(), Rgb::WHITE);
        assert_eq!(Rgb(1, 2, 3).next_in_palette(), Rgb::WHITE);
    }
}
