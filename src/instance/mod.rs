pub mod machine;
pub mod mode;
pub mod settings;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::geometry::{Extent, Geometry};

pub use machine::{InstanceMachine, MachineEvent, SubscriptionHandle, SubscriptionToken};
pub use mode::{ContentKind, KEY_COLOR, Mode};
pub use settings::{Rgb, SettingKind, SettingValue, Settings};

/// Install-wide unique identity of one overlay instance. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct InstanceId(u64);

impl InstanceId {
    pub fn new(raw: u64) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub(crate) fn successor(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    pub(crate) fn first() -> Self {
        Self(1)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<InstanceId> for u64 {
    fn from(id: InstanceId) -> Self {
        id.0
    }
}

impl TryFrom<u64> for InstanceId {
    type Error = String;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        InstanceId::new(raw).ok_or_else(|| "instance ids start at 1".to_string())
    }
}

impl FromStr for InstanceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: u64 = s
            .trim()
            .trim_start_matches('#')
            .parse()
            .map_err(|err| format!("`{s}`: {err}"))?;
        InstanceId::try_from(raw)
    }
}

/// One instance's complete logical state.
///
/// The same value is written to the store and emitted to subscribers, so the
/// serialized field names are the persisted schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceState {
    pub instance_id: InstanceId,
    pub mode: Mode,
    pub window_x: i32,
    pub window_y: i32,
    pub window_width: Extent,
    pub window_height: Extent,
    #[serde(default, deserialize_with = "settings::deserialize_lenient")]
    pub settings: Settings,
}

impl InstanceState {
    pub fn new(instance_id: InstanceId, mode: Mode, geometry: Geometry) -> Self {
        Self {
            instance_id,
            mode,
            window_x: geometry.x,
            window_y: geometry.y,
            window_width: geometry.width,
            window_height: geometry.height,
            settings: mode.default_settings(),
        }
    }

    pub fn geometry(&self) -> Geometry {
        Geometry {
            x: self.window_x,
            y: self.window_y,
            width: self.window_width,
            height: self.window_height,
        }
    }

    pub(crate) fn set_geometry(&mut self, geometry: Geometry) {
        self.window_x = geometry.x;
        self.window_y = geometry.y;
        self.window_width = geometry.width;
        self.window_height = geometry.height;
    }

    pub fn setting(&self, key: &str) -> Option<&SettingValue> {
        self.settings.get(key)
    }

    pub fn color(&self) -> Rgb {
        match self.settings.get(KEY_COLOR) {
            Some(SettingValue::Color(rgb)) => *rgb,
            _ => Rgb::WHITE,
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.settings.get(key), Some(SettingValue::Bool(true)))
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.settings.get(key) {
            Some(SettingValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn content_kind(&self) -> ContentKind {
        ContentKind::for_mode(self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids_are_positive() {
        assert!(InstanceId::new(0).is_none());
        assert_eq!("#7".parse::<InstanceId>().map(InstanceId::get), Ok(7));
        assert!("0".parse::<InstanceId>().is_err());
    }

    #[test]
    fn record_uses_persisted_field_names() {
        let id = InstanceId::new(3).unwrap();
        let state = InstanceState::new(id, Mode::Digital, Geometry::auto_at(5, 6));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["instanceId"], 3);
        assert_eq!(json["mode"], "digital");
        assert_eq!(json["windowX"], 5);
        assert_eq!(json["windowWidth"], -1);
        assert_eq!(json["settings"]["color"], "#ffffff");

        let back: InstanceState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn record_without_settings_still_loads() {
        let json = r#"{"instanceId":4,"mode":"coin","windowX":1,"windowY":2,"windowWidth":30,"windowHeight":-1}"#;
        let state: InstanceState = serde_json::from_str(json).unwrap();
        assert!(state.settings.is_empty());
        assert_eq!(state.window_width, Extent::Fixed(30));
    }

    #[test]
    fn unreadable_setting_falls_back_to_default() {
        let json = r##"{"instanceId":5,"mode":"dice","windowX":0,"windowY":0,"windowWidth":-1,"windowHeight":-1,
            "settings":{"color":"#zzzzzz","count":3,"sides":[6]}}"##;
        let state: InstanceState = serde_json::from_str(json).unwrap();
        assert_eq!(state.setting("count"), Some(&SettingValue::Int(3)));
        assert!(state.setting("color").is_none());
        assert!(state.setting("sides").is_none());

        let normalized = Mode::Dice.normalize(&state.settings);
        assert_eq!(normalized.get("color"), Some(&SettingValue::Color(Rgb::WHITE)));
        assert_eq!(normalized.get("sides"), Some(&SettingValue::Int(6)));
    }
}
