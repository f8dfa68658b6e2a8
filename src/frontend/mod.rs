//! Boundary to the front end that parses and resolves module sources.
//!
//! The indexer never reads source text itself. A [`ModuleProvider`] supplies
//! the modules to scan and opens a [`FrontEnd`] session per module; the
//! session answers hierarchy questions about the types it resolved.
//!
//! [`fixture`] provides an in-memory front end driven by JSON module
//! descriptions.

pub mod fixture;

pub use crate::model::{SourceLocation, TypeHandle};

use crate::error::FrontEndError;
use crate::model::ModuleDescriptor;
use anyhow::Result;
use async_trait::async_trait;

/// How a resolved type relates to the two well-known contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    ExtensionPoint,
    Action,
    Other,
}

/// Fully-qualified names of the two contracts the indexer looks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contracts {
    pub extension_point: String,
    pub action: String,
}

impl Contracts {
    pub fn new(extension_point: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            extension_point: extension_point.into(),
            action: action.into(),
        }
    }

    pub fn kind_of(&self, qualified_name: Option<&str>) -> ContractKind {
        match qualified_name {
            Some(name) if name == self.extension_point => ContractKind::ExtensionPoint,
            Some(name) if name == self.action => ContractKind::Action,
            _ => ContractKind::Other,
        }
    }
}

impl Default for Contracts {
    fn default() -> Self {
        Self::new("hudson.ExtensionPoint", "hudson.model.Action")
    }
}

/// A type the front end managed to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedType {
    pub handle: TypeHandle,
    /// `None` for anonymous types.
    pub qualified_name: Option<String>,
    pub package: String,
    /// Simple name of the outermost enclosing type.
    pub top_level: String,
    pub kind: ContractKind,
    pub interfaces: Vec<TypeHandle>,
    pub superclass: Option<TypeHandle>,
    pub documentation: Option<String>,
    pub source: Option<SourceLocation>,
}

impl ResolvedType {
    /// Name relative to the package, e.g. `Outer.Inner`.
    pub fn class_name(&self) -> Option<String> {
        let name = self.qualified_name.as_deref()?;
        if self.package.is_empty() {
            return Some(name.to_string());
        }
        name.strip_prefix(&self.package)
            .and_then(|rest| rest.strip_prefix('.'))
            .map(str::to_string)
    }
}

/// A declared type and the types declared inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredType {
    pub handle: TypeHandle,
    pub nested: Vec<DeclaredType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationUnit {
    pub path: String,
    pub types: Vec<DeclaredType>,
}

/// One analysis session over a module's unit set.
///
/// Calls block; the coordinator runs each session on a blocking thread.
pub trait FrontEnd: Send {
    /// Parses and analyzes the unit set, returning the declared-type tree.
    ///
    /// # Errors
    ///
    /// Returns [`FrontEndError::Internal`] when analysis breaks down for the
    /// module as a whole.
    fn units(&self) -> Result<Vec<CompilationUnit>, FrontEndError>;

    /// Resolves a type. `Ok(None)` means the type could not be resolved
    /// (a broken reference), which only affects that type.
    fn resolve(&self, ty: &TypeHandle) -> Result<Option<ResolvedType>, FrontEndError>;

    /// View resource files directly associated with a type.
    fn view_resources(&self, qualified_name: &str) -> Vec<String>;
}

/// Supplies modules and opens front-end sessions for them.
#[async_trait]
pub trait ModuleProvider: Send + Sync {
    /// Returns the human-readable name of this provider.
    fn name(&self) -> &str;

    /// Lists the modules available for scanning, core first.
    async fn modules(&self) -> Result<Vec<ModuleDescriptor>>;

    /// Opens a front-end session for one module.
    fn open(&self, module: &ModuleDescriptor) -> Result<Box<dyn FrontEnd>, FrontEndError>;
}
