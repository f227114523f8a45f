//! Output rules
//!
//! An output rule binds one watched user to an artifact on disk. When the
//! user's status changes, the rule renders the artifact for the new status:
//! image rules copy a prepared file into place, HTML rules write a template.

use crate::notify::{NotifyError, NotifyResult, StatusCode, StatusSwitch, SwitchSlots};
use derive_more::Display;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Formats a rule can be configured with
pub const SUPPORTED_FORMATS: [&str; 2] = ["image", "html"];

/// User id as written in configuration; YAML files in the wild carry both
#[derive(Debug, Clone, Deserialize, Display)]
#[serde(untagged)]
pub enum RawId {
    Number(u64),
    Text(String),
}

impl RawId {
    /// The id as a number, `None` when the text is not an unsigned integer
    #[must_use]
    pub fn value(&self) -> Option<u64> {
        match self {
            Self::Number(id) => Some(*id),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// A rule as written in configuration, before validation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleSpec {
    pub name: Option<String>,
    pub format: Option<String>,
    pub file: Option<String>,
    pub id: Option<RawId>,
    pub image: Option<SwitchSlots<String>>,
    pub template: Option<SwitchSlots<String>>,
}

/// What a rule renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputKind {
    /// Copy one of three image files to the output path
    Image { sources: StatusSwitch<PathBuf> },
    /// Write one of three templates to the output path
    Html { templates: StatusSwitch<String> },
}

/// A validated output rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRule {
    pub name: String,
    /// User this rule follows
    pub id: u64,
    pub out_file: PathBuf,
    pub kind: OutputKind,
}

impl OutputRule {
    /// Validate a rule specification.
    ///
    /// # Errors
    ///
    /// Returns a config error for a missing field, an unsupported format or
    /// a bad id, and a validation error for an incomplete status switch.
    pub fn from_spec(spec: &RuleSpec) -> NotifyResult<Self> {
        let name = spec.name.clone().ok_or(NotifyError::MissingField {
            field: "name",
            rule: None,
        })?;
        let missing = |field| NotifyError::MissingField {
            field,
            rule: Some(name.clone()),
        };
        let format = spec.format.clone().ok_or_else(|| missing("format"))?;
        let file = spec.file.clone().ok_or_else(|| missing("file"))?;
        let raw_id = spec.id.as_ref().ok_or_else(|| missing("id"))?;
        let id = raw_id.value().ok_or_else(|| NotifyError::InvalidId {
            value: raw_id.to_string(),
            rule: name.clone(),
        })?;

        let kind = match format.as_str() {
            "image" => {
                let slots = spec.image.clone().ok_or_else(|| missing("image"))?;
                let sources = StatusSwitch::try_from_slots(slots)?;
                OutputKind::Image {
                    sources: StatusSwitch::new(
                        PathBuf::from(sources.get(StatusCode::Muted)),
                        PathBuf::from(sources.get(StatusCode::Unmuted)),
                        PathBuf::from(sources.get(StatusCode::Unknown)),
                    ),
                }
            }
            "html" => {
                let slots = spec.template.clone().ok_or_else(|| missing("template"))?;
                OutputKind::Html {
                    templates: StatusSwitch::try_from_slots(slots)?,
                }
            }
            other => {
                return Err(NotifyError::UnsupportedFormat {
                    format: other.to_string(),
                    rule: name,
                });
            }
        };

        Ok(Self {
            name,
            id,
            out_file: PathBuf::from(file),
            kind,
        })
    }

    #[must_use]
    pub fn format(&self) -> &'static str {
        match self.kind {
            OutputKind::Image { .. } => "image",
            OutputKind::Html { .. } => "html",
        }
    }

    /// Render the artifact for `status`, overwriting the output file
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::SourceMissing`] when an image source does not
    /// exist, or [`NotifyError::Io`] when the output cannot be written.
    pub async fn apply(&self, status: StatusCode) -> NotifyResult<()> {
        match &self.kind {
            OutputKind::Image { sources } => {
                let source = sources.get(status);
                copy_source(source, &self.out_file).await?;
            }
            OutputKind::Html { templates } => {
                let rendered = process_template(templates.get(status));
                tokio::fs::write(&self.out_file, rendered).await?;
            }
        }
        info!(
            target: crate::NOTIFY_TARGET,
            rule = %self.name,
            user_id = self.id,
            status = %status,
            output = %self.out_file.display(),
            event = "rendered",
            "Output rule rendered"
        );
        Ok(())
    }
}

async fn copy_source(source: &Path, destination: &Path) -> NotifyResult<()> {
    if !tokio::fs::try_exists(source).await? {
        return Err(NotifyError::SourceMissing(source.to_path_buf()));
    }
    tokio::fs::copy(source, destination).await?;
    Ok(())
}

/// Hook for variable substitution in HTML templates. Templates are written
/// verbatim for now.
fn process_template(template: &str) -> String {
    template.to_string()
}

/// Build every rule in `values`, logging and skipping the ones that fail
#[must_use]
pub fn load_rules(values: &[serde_yaml::Value]) -> Vec<Arc<OutputRule>> {
    let mut rules = Vec::with_capacity(values.len());
    for (index, value) in values.iter().enumerate() {
        let built = serde_yaml::from_value::<RuleSpec>(value.clone())
            .map_err(|e| NotifyError::MalformedRule(format!("entry {index}: {e}")))
            .and_then(|spec| OutputRule::from_spec(&spec));
        match built {
            Ok(rule) => {
                info!(
                    rule = %rule.name,
                    user_id = rule.id,
                    format = rule.format(),
                    "Loaded mute notify output rule"
                );
                rules.push(Arc::new(rule));
            }
            Err(e) => {
                error!(
                    target: crate::ERROR_TARGET,
                    index,
                    kind = e.kind(),
                    error = %e,
                    "Skipping mute notify output rule"
                );
            }
        }
    }
    rules
}

/// Rules bound to `user_id`
pub fn rules_for_user(
    rules: &[Arc<OutputRule>],
    user_id: u64,
) -> impl Iterator<Item = &Arc<OutputRule>> {
    rules.iter().filter(move |rule| rule.id == user_id)
}
