//! View resources associated with a type.
//!
//! A type's effective views are those of its superclass chain, overlaid with
//! its own: a view with the same base name declared lower in the hierarchy
//! replaces the inherited one.

use crate::error::FrontEndError;
use crate::frontend::{FrontEnd, ResolvedType};
use crate::model::{TypeHandle, ViewMap};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Memoized effective view maps for one module scan.
#[derive(Debug, Default)]
pub struct ViewCache {
    resolved: HashMap<TypeHandle, ViewMap>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    pub fn get(&self, ty: &TypeHandle) -> Option<&ViewMap> {
        self.resolved.get(ty)
    }

    /// Returns the effective view map of `ty`, computing and caching it for
    /// every ancestor on the way.
    pub fn effective(
        &mut self,
        front: &dyn FrontEnd,
        ty: &ResolvedType,
    ) -> Result<ViewMap, FrontEndError> {
        if let Some(views) = self.resolved.get(&ty.handle) {
            return Ok(views.clone());
        }

        // Climb until a cached ancestor, a missing superclass, or a cycle.
        let mut chain = vec![ty.clone()];
        let mut seen: HashSet<TypeHandle> = HashSet::from([ty.handle.clone()]);
        let mut inherited = ViewMap::new();
        let mut next = ty.superclass.clone();
        while let Some(handle) = next {
            if let Some(views) = self.resolved.get(&handle) {
                inherited = views.clone();
                break;
            }
            if !seen.insert(handle.clone()) {
                break;
            }
            match front.resolve(&handle)? {
                Some(parent) => {
                    next = parent.superclass.clone();
                    chain.push(parent);
                }
                None => break,
            }
        }

        for node in chain.iter().rev() {
            let own = own_views(front, node);
            inherited.extend(own);
            self.resolved.insert(node.handle.clone(), inherited.clone());
        }
        Ok(inherited)
    }
}

/// Views declared directly for a type. When a type lists two files with the
/// same base name the first one is kept.
fn own_views(front: &dyn FrontEnd, ty: &ResolvedType) -> ViewMap {
    let mut views = ViewMap::new();
    let Some(name) = ty.qualified_name.as_deref() else {
        return views;
    };
    for file in front.view_resources(name) {
        let Some(base) = view_name(&file) else {
            continue;
        };
        views.entry(base).or_insert_with(|| resource_path(&file));
    }
    views
}

/// File name without its extension.
pub fn view_name(file: &str) -> Option<String> {
    let name = Path::new(file).file_name()?.to_string_lossy();
    let base = match name.rfind('.') {
        Some(i) if i > 0 => &name[..i],
        _ => &name[..],
    };
    if base.is_empty() {
        None
    } else {
        Some(base.to_string())
    }
}

/// Resource path relative to the `src/` root when the file lives under one.
pub fn resource_path(file: &str) -> String {
    let normalized = file.replace('\\', "/");
    if let Some(rest) = normalized.strip_prefix("src/") {
        return rest.to_string();
    }
    match normalized.find("/src/") {
        Some(i) => normalized[i + "/src/".len()..].to_string(),
        None => normalized,
    }
}
