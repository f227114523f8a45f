//! Mute notification system
//!
//! Watches the voice mute state of opted-in members and renders a status
//! artifact for each configured output rule whenever that state changes.

mod engine;
mod error;
mod repository;
mod rule;
mod service;
pub mod source;
mod status;

pub use engine::{BroadcastReport, Reconciler, StatusMap, TickReport, Transition};
pub use error::{NotifyError, NotifyResult};
pub use repository::{
    DEFAULT_NOTIFY_DB, MUTE_LISTEN_KEY, MemoryNotifyRepository, NotifyRepository,
    YamlNotifyRepository,
};
pub use rule::{OutputKind, OutputRule, RawId, RuleSpec, SUPPORTED_FORMATS, load_rules, rules_for_user};
pub use service::{REQUEST_BUFFER, ReconcileRequest, ReconcileService};
pub use source::{CacheVoiceSource, VoiceObservation, VoiceSource};
pub use status::{StatusCode, StatusSwitch, SwitchSlots};
