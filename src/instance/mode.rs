use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::settings::{DefaultValue, Rgb, SettingKind, SettingSpec, SettingValue, Settings};

/// Closed set of widget variants an overlay can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Digital,
    Analog,
    Timer,
    Dice,
    Coin,
}

impl Mode {
    pub const ALL: [Mode; 5] = [Mode::Digital, Mode::Analog, Mode::Timer, Mode::Dice, Mode::Coin];

    pub fn name(self) -> &'static str {
        match self {
            Mode::Digital => "digital",
            Mode::Analog => "analog",
            Mode::Timer => "timer",
            Mode::Dice => "dice",
            Mode::Coin => "coin",
        }
    }

    pub fn next(self) -> Mode {
        let idx = Mode::ALL.iter().position(|m| *m == self).unwrap_or(0);
        Mode::ALL[(idx + 1) % Mode::ALL.len()]
    }

    pub fn schema(self) -> &'static [SettingSpec] {
        match self {
            Mode::Digital => DIGITAL,
            Mode::Analog => ANALOG,
            Mode::Timer => TIMER,
            Mode::Dice => DICE,
            Mode::Coin => COIN,
        }
    }

    pub fn spec(self, key: &str) -> Option<&'static SettingSpec> {
        self.schema().iter().find(|spec| spec.key == key)
    }

    pub fn default_settings(self) -> Settings {
        self.schema()
            .iter()
            .map(|spec| (spec.key.to_string(), SettingValue::from(spec.default)))
            .collect()
    }

    /// Fill in missing keys with defaults and drop keys the mode does not
    /// know or whose value no longer validates.
    pub fn normalize(self, settings: &Settings) -> Settings {
        self.schema()
            .iter()
            .map(|spec| {
                let value = settings
                    .get(spec.key)
                    .filter(|v| spec.kind.check(v).is_ok())
                    .cloned()
                    .unwrap_or_else(|| SettingValue::from(spec.default));
                (spec.key.to_string(), value)
            })
            .collect()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Mode::ALL
            .into_iter()
            .find(|m| m.name() == lower)
            .ok_or_else(|| format!("unknown mode `{s}`"))
    }
}

/// Structural layout a surface is built with. A surface only has to be
/// rebuilt when this changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    DigitalClock,
    AnalogClock,
    Countdown,
    DiceTray,
    CoinFlip,
}

impl ContentKind {
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Digital => ContentKind::DigitalClock,
            Mode::Analog => ContentKind::AnalogClock,
            Mode::Timer => ContentKind::Countdown,
            Mode::Dice => ContentKind::DiceTray,
            Mode::Coin => ContentKind::CoinFlip,
        }
    }

    /// Size (columns, rows including the border) used for auto-sized
    /// dimensions.
    pub fn preferred_size(self) -> (u32, u32) {
        match self {
            ContentKind::DigitalClock => (16, 4),
            ContentKind::AnalogClock => (15, 8),
            ContentKind::Countdown => (16, 5),
            ContentKind::DiceTray => (22, 5),
            ContentKind::CoinFlip => (18, 5),
        }
    }
}

const fn spec(key: &'static str, kind: SettingKind, default: DefaultValue) -> SettingSpec {
    SettingSpec { key, kind, default }
}

pub const KEY_COLOR: &str = "color";

const DIGITAL: &[SettingSpec] = &[
    spec(KEY_COLOR, SettingKind::Color, DefaultValue::Color(Rgb::WHITE)),
    spec("show_seconds", SettingKind::Bool, DefaultValue::Bool(true)),
    spec("use_24h", SettingKind::Bool, DefaultValue::Bool(true)),
];

const ANALOG: &[SettingSpec] = &[
    spec(KEY_COLOR, SettingKind::Color, DefaultValue::Color(Rgb::WHITE)),
    spec("show_seconds", SettingKind::Bool, DefaultValue::Bool(false)),
    spec("show_numbers", SettingKind::Bool, DefaultValue::Bool(true)),
];

const TIMER: &[SettingSpec] = &[
    spec(KEY_COLOR, SettingKind::Color, DefaultValue::Color(Rgb::ORANGE)),
    spec(
        "duration_secs",
        SettingKind::Int { min: 1, max: 86_400 },
        DefaultValue::Int(300),
    ),
    spec("sound", SettingKind::Bool, DefaultValue::Bool(true)),
];

const DICE: &[SettingSpec] = &[
    spec(KEY_COLOR, SettingKind::Color, DefaultValue::Color(Rgb::WHITE)),
    spec("count", SettingKind::Int { min: 1, max: 6 }, DefaultValue::Int(2)),
    spec("sides", SettingKind::Int { min: 2, max: 100 }, DefaultValue::Int(6)),
];

const COIN: &[SettingSpec] = &[
    spec(KEY_COLOR, SettingKind::Color, DefaultValue::Color(Rgb::YELLOW)),
    spec("show_history", SettingKind::Bool, DefaultValue::Bool(true)),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mode_has_a_color_and_distinct_content() {
        for mode in Mode::ALL {
            assert!(mode.spec(KEY_COLOR).is_some(), "{mode} lacks color");
        }
        let kinds: std::collections::HashSet<_> =
            Mode::ALL.iter().map(|m| ContentKind::for_mode(*m)).collect();
        assert_eq!(kinds.len(), Mode::ALL.len());
    }

    #[test]
    fn normalize_drops_foreign_keys_and_fills_defaults() {
        let mut settings = Mode::Dice.default_settings();
        settings.insert("sides".into(), SettingValue::Int(1000));
        settings.insert("show_seconds".into(), SettingValue::Bool(true));
        let normalized = Mode::Dice.normalize(&settings);
        assert_eq!(normalized.get("sides"), Some(&SettingValue::Int(6)));
        assert!(!normalized.contains_key("show_seconds"));
        assert_eq!(normalized.len(), Mode::Dice.schema().len());
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Analog".parse::<Mode>(), Ok(Mode::Analog));
        assert!("sundial".parse::<Mode>().is_err());
        assert_eq!(Mode::Coin.next(), Mode::Digital);
    }
}
