//! In-memory front end driven by JSON module descriptions.
//!
//! A workspace is either one JSON file:
//!
//! ```json
//! {
//!   "core": { "gav": "org.jenkins-ci.main:jenkins-core:2.400", "title": "Jenkins Core", "units": [] },
//!   "plugins": [
//!     {
//!       "gav": "org.example:git:1.0",
//!       "title": "Git plugin",
//!       "units": [
//!         { "path": "GitSCM.java", "package": "org.example.git",
//!           "types": [ { "name": "GitSCM", "superclass": "hudson.scm.SCM", "line": 40 } ] }
//!       ],
//!       "views": { "org.example.git.GitSCM": ["src/main/resources/org/example/git/GitSCM/config.jelly"] }
//!     }
//!   ],
//!   "library": []
//! }
//! ```
//!
//! or a directory holding one module description per `*.json` file, with
//! `"core": true` marking the core module.
//!
//! Type references resolve against the module's own declarations first and
//! then against every type declared anywhere in the workspace.

use super::{
    CompilationUnit, Contracts, DeclaredType, FrontEnd, ModuleProvider, ResolvedType,
};
use crate::error::FrontEndError;
use crate::model::{ModuleDescriptor, ModuleKind, SourceLocation, TypeHandle};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkspaceFixture {
    pub core: Option<ModuleFixture>,
    pub plugins: Vec<ModuleFixture>,
    /// Units that are on every module's classpath but are not scanned.
    pub library: Vec<UnitFixture>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleFixture {
    pub gav: String,
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub scm: Option<String>,
    #[serde(default)]
    pub core: bool,
    #[serde(default)]
    pub units: Vec<UnitFixture>,
    /// View resource paths keyed by the qualified name of their type.
    #[serde(default)]
    pub views: HashMap<String, Vec<String>>,
    /// Makes analysis of this module fail with the given message.
    #[serde(default)]
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitFixture {
    /// Source file name, e.g. `GitSCM.java`.
    pub path: String,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub types: Vec<TypeFixture>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TypeFixture {
    /// Simple name; absent for anonymous types.
    pub name: Option<String>,
    pub interfaces: Vec<String>,
    pub superclass: Option<String>,
    pub doc: Option<String>,
    pub line: u32,
    pub nested: Vec<TypeFixture>,
    /// Declared but not resolvable, as after a compile error.
    pub unresolved: bool,
}

#[derive(Debug, Clone)]
struct TypeEntry {
    resolved: ResolvedType,
    unresolved: bool,
}

type TypeIndex = HashMap<TypeHandle, TypeEntry>;

#[derive(Debug)]
struct FixtureModule {
    descriptor: ModuleDescriptor,
    units: Vec<CompilationUnit>,
    types: Arc<TypeIndex>,
    views: Arc<HashMap<String, Vec<String>>>,
    failure: Option<String>,
}

/// A workspace of modules described in memory.
#[derive(Debug)]
pub struct FixtureWorkspace {
    modules: Vec<FixtureModule>,
    classpath: Arc<TypeIndex>,
}

impl FixtureWorkspace {
    pub fn new(fixture: WorkspaceFixture, contracts: &Contracts) -> Self {
        let mut modules: Vec<ModuleFixture> = Vec::new();
        if let Some(mut core) = fixture.core {
            core.core = true;
            modules.push(core);
        }
        modules.extend(fixture.plugins);
        Self::build(modules, &fixture.library, contracts)
    }

    /// Builds a workspace from standalone module descriptions. The module
    /// flagged as core is moved to the front.
    pub fn from_modules(mut modules: Vec<ModuleFixture>, contracts: &Contracts) -> Self {
        modules.sort_by_key(|m| !m.core);
        Self::build(modules, &[], contracts)
    }

    /// Loads a workspace from a JSON file or a directory of module files.
    pub fn load(path: &Path, contracts: &Contracts) -> Result<Self> {
        if path.is_dir() {
            let mut modules = Vec::new();
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.with_context(|| format!("Failed to walk {:?}", path))?;
                let file = entry.path();
                if !file.is_file() || file.extension().map(|e| e != "json").unwrap_or(true) {
                    continue;
                }
                let content = fs::read_to_string(file)
                    .with_context(|| format!("Failed to read {:?}", file))?;
                let module: ModuleFixture = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse module description {:?}", file))?;
                debug!("Loaded module description {}", module.gav);
                modules.push(module);
            }
            Ok(Self::from_modules(modules, contracts))
        } else {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read workspace {:?}", path))?;
            let fixture: WorkspaceFixture = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse workspace {:?}", path))?;
            Ok(Self::new(fixture, contracts))
        }
    }

    fn build(modules: Vec<ModuleFixture>, library: &[UnitFixture], contracts: &Contracts) -> Self {
        let mut classpath = TypeIndex::new();
        let mut built = Vec::with_capacity(modules.len());

        for module in modules {
            let mut types = TypeIndex::new();
            let units = module
                .units
                .iter()
                .map(|unit| index_unit(unit, contracts, &mut types))
                .collect();

            for (handle, entry) in &types {
                classpath
                    .entry(handle.clone())
                    .or_insert_with(|| entry.clone());
            }

            let kind = if module.core {
                ModuleKind::Core
            } else {
                ModuleKind::Plugin { scm: module.scm }
            };
            built.push(FixtureModule {
                descriptor: ModuleDescriptor {
                    gav: module.gav,
                    title: module.title,
                    url: module.url,
                    kind,
                },
                units,
                types: Arc::new(types),
                views: Arc::new(module.views),
                failure: module.failure,
            });
        }

        let mut library_types = TypeIndex::new();
        for unit in library {
            index_unit(unit, contracts, &mut library_types);
        }
        for (handle, entry) in library_types {
            classpath.entry(handle).or_insert(entry);
        }

        Self {
            modules: built,
            classpath: Arc::new(classpath),
        }
    }

    pub fn descriptors(&self) -> Vec<ModuleDescriptor> {
        self.modules.iter().map(|m| m.descriptor.clone()).collect()
    }

    /// Opens a session over one module of the workspace.
    pub fn front_end(&self, gav: &str) -> Option<FixtureFrontEnd> {
        let module = self.modules.iter().find(|m| m.descriptor.gav == gav)?;
        Some(FixtureFrontEnd {
            units: module.units.clone(),
            own: Arc::clone(&module.types),
            classpath: Arc::clone(&self.classpath),
            views: Arc::clone(&module.views),
            failure: module.failure.clone(),
        })
    }
}

#[async_trait]
impl ModuleProvider for FixtureWorkspace {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn modules(&self) -> Result<Vec<ModuleDescriptor>> {
        Ok(self.descriptors())
    }

    fn open(&self, module: &ModuleDescriptor) -> Result<Box<dyn FrontEnd>, FrontEndError> {
        match self.front_end(&module.gav) {
            Some(front) => Ok(Box::new(front)),
            None => Err(FrontEndError::Open {
                module: module.gav.clone(),
                reason: "not part of the workspace".to_string(),
            }),
        }
    }
}

/// Front-end session over one fixture module.
#[derive(Debug, Clone)]
pub struct FixtureFrontEnd {
    units: Vec<CompilationUnit>,
    own: Arc<TypeIndex>,
    classpath: Arc<TypeIndex>,
    views: Arc<HashMap<String, Vec<String>>>,
    failure: Option<String>,
}

impl FrontEnd for FixtureFrontEnd {
    fn units(&self) -> Result<Vec<CompilationUnit>, FrontEndError> {
        match &self.failure {
            Some(reason) => Err(FrontEndError::Internal(reason.clone())),
            None => Ok(self.units.clone()),
        }
    }

    fn resolve(&self, ty: &TypeHandle) -> Result<Option<ResolvedType>, FrontEndError> {
        let entry = self.own.get(ty).or_else(|| self.classpath.get(ty));
        Ok(entry
            .filter(|e| !e.unresolved)
            .map(|e| e.resolved.clone()))
    }

    fn view_resources(&self, qualified_name: &str) -> Vec<String> {
        self.views.get(qualified_name).cloned().unwrap_or_default()
    }
}

/// Enclosing scope while walking nested declarations.
struct Scope<'a> {
    handle: &'a TypeHandle,
    qualified_name: Option<&'a str>,
    top_level: &'a str,
}

fn index_unit(unit: &UnitFixture, contracts: &Contracts, index: &mut TypeIndex) -> CompilationUnit {
    let file = source_file(&unit.package, &unit.path);
    let mut anonymous = 0;
    let types = unit
        .types
        .iter()
        .map(|t| index_type(t, unit, &file, None, &mut anonymous, contracts, index))
        .collect();
    CompilationUnit {
        path: file,
        types,
    }
}

fn index_type(
    t: &TypeFixture,
    unit: &UnitFixture,
    file: &str,
    scope: Option<&Scope<'_>>,
    anonymous: &mut usize,
    contracts: &Contracts,
    index: &mut TypeIndex,
) -> DeclaredType {
    let qualified_name = match (&t.name, scope) {
        (Some(name), Some(outer)) => outer.qualified_name.map(|q| format!("{}.{}", q, name)),
        (Some(name), None) if unit.package.is_empty() => Some(name.clone()),
        (Some(name), None) => Some(format!("{}.{}", unit.package, name)),
        (None, _) => None,
    };

    let handle = match &qualified_name {
        Some(q) => TypeHandle::new(q.clone()),
        None => {
            *anonymous += 1;
            let base = scope.map(|s| s.handle.as_str()).unwrap_or(file);
            TypeHandle::new(format!("{}${}", base, anonymous))
        }
    };

    let top_level = match scope {
        Some(outer) => outer.top_level.to_string(),
        None => t.name.clone().unwrap_or_else(|| handle.to_string()),
    };

    let mut nested_anonymous = 0;
    let inner = Scope {
        handle: &handle,
        qualified_name: qualified_name.as_deref(),
        top_level: &top_level,
    };
    let nested = t
        .nested
        .iter()
        .map(|n| index_type(n, unit, file, Some(&inner), &mut nested_anonymous, contracts, index))
        .collect();

    let resolved = ResolvedType {
        handle: handle.clone(),
        kind: contracts.kind_of(qualified_name.as_deref()),
        qualified_name,
        package: unit.package.clone(),
        top_level,
        interfaces: t.interfaces.iter().map(|i| TypeHandle::new(i.clone())).collect(),
        superclass: t.superclass.as_ref().map(|s| TypeHandle::new(s.clone())),
        documentation: t.doc.clone(),
        source: Some(SourceLocation {
            file: file.to_string(),
            line: t.line,
        }),
    };
    index.insert(
        handle.clone(),
        TypeEntry {
            resolved,
            unresolved: t.unresolved,
        },
    );

    DeclaredType { handle, nested }
}

/// Source path made of the package directories and the file name.
fn source_file(package: &str, path: &str) -> String {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    if package.is_empty() {
        name
    } else {
        format!("{}/{}", package.replace('.', "/"), name)
    }
}
