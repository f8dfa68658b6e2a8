use super::ModuleId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// View resources keyed by view name (file base name) with the resource path
/// as value.
pub type ViewMap = BTreeMap<String, String>;

/// Identity of a type as known to the front end.
///
/// Named types use their fully-qualified name; anonymous types get whatever
/// stable identifier the front end assigns them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeHandle(pub String);

impl TypeHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Source file path including the package directories.
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// The type implements `extension_point`. When `definition` is set the
    /// type is the extension point itself.
    Extension {
        extension_point: String,
        definition: bool,
        action: Option<String>,
    },
    Action,
}

/// Classification result for one declared type. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedType {
    pub module: ModuleId,
    pub handle: TypeHandle,
    /// Fully-qualified name, `None` for anonymous types.
    pub implementation: Option<String>,
    pub package: String,
    /// Name relative to the package (`Outer.Inner`), `None` for anonymous types.
    pub class_name: Option<String>,
    pub top_level_class: String,
    pub documentation: Option<String>,
    pub source: Option<SourceLocation>,
    pub views: ViewMap,
    pub capability: Capability,
}

impl ClassifiedType {
    pub fn extension_point(&self) -> Option<&str> {
        match &self.capability {
            Capability::Extension {
                extension_point, ..
            } => Some(extension_point),
            Capability::Action => None,
        }
    }

    pub fn is_definition(&self) -> bool {
        matches!(
            self.capability,
            Capability::Extension {
                definition: true,
                ..
            }
        )
    }

    pub fn is_action(&self) -> bool {
        matches!(self.capability, Capability::Action)
    }

    pub fn has_view(&self) -> bool {
        !self.views.is_empty()
    }

    /// Identity used for de-duplication: the qualified name, or the handle
    /// for anonymous types.
    pub fn identity(&self) -> &str {
        self.implementation
            .as_deref()
            .unwrap_or_else(|| self.handle.as_str())
    }
}

impl fmt::Display for ClassifiedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.identity();
        match &self.capability {
            Capability::Extension {
                extension_point,
                definition: true,
                ..
            } => write!(f, "Extension point {}", extension_point),
            Capability::Extension {
                extension_point, ..
            } => write!(f, "Extension {} of {}", name, extension_point),
            Capability::Action => write!(f, "Action {}", name),
        }
    }
}
