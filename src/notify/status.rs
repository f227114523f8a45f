//! Mute status codes and per-status lookup tables
//!
//! [`StatusCode`] is the tri-state the whole pipeline works with, and
//! [`StatusSwitch`] maps each of the three states to a value of some type.

use crate::notify::{NotifyError, NotifyResult};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Observed mute state of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    /// Never observed
    #[default]
    #[display("unknown")]
    Unknown,
    #[display("muted")]
    Muted,
    #[display("unmuted")]
    Unmuted,
}

impl StatusCode {
    /// Status for a member given their voice flags. Server mute, self mute
    /// and suppression (stage audience) all count as muted.
    #[must_use]
    pub fn from_flags(mute: bool, self_mute: bool, suppress: bool) -> Self {
        if mute || self_mute || suppress {
            Self::Muted
        } else {
            Self::Unmuted
        }
    }

    #[must_use]
    pub fn is_muted(self) -> bool {
        self == Self::Muted
    }
}

/// Optional slots as they come out of configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchSlots<T> {
    pub muted: Option<T>,
    pub unmuted: Option<T>,
    pub unknown: Option<T>,
    /// Fills any slot left empty
    #[serde(skip)]
    pub default: Option<T>,
}

impl<T: Clone> SwitchSlots<T> {
    /// Use `value` for every slot that was not given
    #[must_use]
    pub fn with_default(mut self, value: T) -> Self {
        self.default = Some(value);
        self
    }

    /// Build a switch that tolerates empty slots
    #[must_use]
    pub fn allow_none(self) -> StatusSwitch<Option<T>> {
        let default = self.default;
        StatusSwitch {
            muted: self.muted.or_else(|| default.clone()),
            unmuted: self.unmuted.or_else(|| default.clone()),
            unknown: self.unknown.or(default),
        }
    }
}

/// Total lookup from [`StatusCode`] to a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSwitch<T> {
    muted: T,
    unmuted: T,
    unknown: T,
}

impl<T> StatusSwitch<T> {
    #[must_use]
    pub fn new(muted: T, unmuted: T, unknown: T) -> Self {
        Self {
            muted,
            unmuted,
            unknown,
        }
    }

    /// Build a switch, failing on the first slot that is neither given nor
    /// covered by a default.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::MissingSwitchSlot`] naming the empty slot.
    pub fn try_from_slots(slots: SwitchSlots<T>) -> NotifyResult<Self>
    where
        T: Clone,
    {
        let SwitchSlots {
            muted,
            unmuted,
            unknown,
            default,
        } = slots;
        let fill = |slot: Option<T>, name: &'static str| {
            slot.or_else(|| default.clone())
                .ok_or(NotifyError::MissingSwitchSlot(name))
        };
        Ok(Self {
            muted: fill(muted, "muted")?,
            unmuted: fill(unmuted, "unmuted")?,
            unknown: fill(unknown, "unknown")?,
        })
    }

    #[must_use]
    pub fn get(&self, code: StatusCode) -> &T {
        match code {
            StatusCode::Muted => &self.muted,
            StatusCode::Unmuted => &self.unmuted,
            StatusCode::Unknown => &self.unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(muted: Option<&str>, unmuted: Option<&str>, unknown: Option<&str>) -> SwitchSlots<String> {
        SwitchSlots {
            muted: muted.map(str::to_string),
            unmuted: unmuted.map(str::to_string),
            unknown: unknown.map(str::to_string),
            default: None,
        }
    }

    #[test]
    fn test_status_from_flags() {
        assert_eq!(StatusCode::from_flags(false, false, false), StatusCode::Unmuted);
        assert_eq!(StatusCode::from_flags(true, false, false), StatusCode::Muted);
        assert_eq!(StatusCode::from_flags(false, true, false), StatusCode::Muted);
        assert_eq!(StatusCode::from_flags(false, false, true), StatusCode::Muted);
        assert_eq!(StatusCode::default(), StatusCode::Unknown);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(StatusCode::Muted.to_string(), "muted");
        assert_eq!(StatusCode::Unmuted.to_string(), "unmuted");
        assert_eq!(StatusCode::Unknown.to_string(), "unknown");
    }

    #[test]
    fn test_switch_missing_unknown_fails() {
        let result = StatusSwitch::try_from_slots(slots(Some("a"), Some("b"), None));
        assert!(matches!(result, Err(NotifyError::MissingSwitchSlot("unknown"))));
    }

    #[test]
    fn test_switch_missing_muted_reported_first() {
        let result = StatusSwitch::try_from_slots(slots(None, None, Some("c")));
        assert!(matches!(result, Err(NotifyError::MissingSwitchSlot("muted"))));
    }

    #[test]
    fn test_switch_get_returns_each_slot() {
        let switch = StatusSwitch::try_from_slots(slots(Some("a"), Some("b"), Some("c")))
            .expect("all slots present");
        assert_eq!(switch.get(StatusCode::Muted), "a");
        assert_eq!(switch.get(StatusCode::Unmuted), "b");
        assert_eq!(switch.get(StatusCode::Unknown), "c");
    }

    #[test]
    fn test_switch_default_fills_gaps() {
        let switch = StatusSwitch::try_from_slots(
            slots(Some("a"), None, None).with_default("fallback".to_string()),
        )
        .expect("default covers empty slots");
        assert_eq!(switch.get(StatusCode::Muted), "a");
        assert_eq!(switch.get(StatusCode::Unmuted), "fallback");
        assert_eq!(switch.get(StatusCode::Unknown), "fallback");
    }

    #[test]
    fn test_switch_allow_none() {
        let switch = slots(Some("a"), None, None).allow_none();
        assert_eq!(switch.get(StatusCode::Muted).as_deref(), Some("a"));
        assert!(switch.get(StatusCode::Unmuted).is_none());
        assert!(switch.get(StatusCode::Unknown).is_none());
    }

    #[test]
    fn test_slots_deserialize() {
        let slots: SwitchSlots<String> =
            serde_yaml::from_str("muted: a.png\nunmuted: b.png\n").expect("valid yaml");
        assert_eq!(slots.muted.as_deref(), Some("a.png"));
        assert!(slots.unknown.is_none());
    }
}
