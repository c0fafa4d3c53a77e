use faultreport_backtrace::SymbolicationEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Attributes, ValidationError};

/// The attribute that marks a report as already carrying a symbolication
/// identifier.
pub(crate) const SYMBOLICATION_ID_ATTRIBUTE: &str = "symbolication_id";

/// How the aggregation service should symbolicate a report.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolicationMode {
    /// Frames are resolved with debug information identified by
    /// `debug_identifier`.
    DebugIdentifier,
}

/// The symbolication decision for one finalize call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct SymbolicationPlan {
    /// Whether the payload carries the symbolication marker.
    pub(crate) active: bool,
    /// Whether the parser resolves identifiers itself.
    pub(crate) resolve_frames: bool,
}

impl SymbolicationPlan {
    pub(crate) fn new(flag: bool, attributes: &Attributes, has_explicit_map: bool) -> Self {
        let has_symbolication_id = attributes.contains_key(SYMBOLICATION_ID_ATTRIBUTE);
        Self {
            active: flag || has_symbolication_id || has_explicit_map,
            resolve_frames: flag && !has_symbolication_id && !has_explicit_map,
        }
    }

    /// Activates symbolication when the merged attributes carry an
    /// identifier, whichever source supplied it.
    ///
    /// Only the marker changes: the parser has already run by then.
    pub(crate) fn with_merged_attributes(self, merged: &Attributes) -> Self {
        Self {
            active: self.active || merged.contains_key(SYMBOLICATION_ID_ATTRIBUTE),
            ..self
        }
    }

    pub(crate) fn mode(self) -> Option<SymbolicationMode> {
        self.active.then_some(SymbolicationMode::DebugIdentifier)
    }
}

/// Checks that no entry has an empty `file` or `uuid`.
pub(crate) fn validate(entries: &[SymbolicationEntry]) -> Result<(), ValidationError> {
    for (index, entry) in entries.iter().enumerate() {
        if entry.file.is_empty() {
            return Err(ValidationError::MissingField {
                index,
                field: "file",
            });
        }
        if entry.uuid.is_empty() {
            return Err(ValidationError::MissingField {
                index,
                field: "uuid",
            });
        }
    }
    Ok(())
}

/// Reads a symbolication map from loosely typed data, such as a map loaded
/// from a configuration file.
pub(crate) fn parse_map(value: &Value) -> Result<Vec<SymbolicationEntry>, ValidationError> {
    let Value::Array(items) = value else {
        return Err(ValidationError::NotASequence);
    };

    let field = |item: &Value, index: usize, field: &'static str| {
        item.get(field)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
            .ok_or(ValidationError::MissingField { index, field })
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            Ok(SymbolicationEntry {
                file: field(item, index, "file")?,
                uuid: field(item, index, "uuid")?,
            })
        })
        .collect()
}
