//! Classification of a single declared type.
//!
//! Extension discovery walks the whole interface/superclass lattice above the
//! root type. Whenever a node directly implements the extension-point
//! contract, the root is recorded as an extension of that node; if the node
//! is the root itself, the record is the extension point's definition. Each
//! node is visited once, so diamond hierarchies produce a single record.
//!
//! Action discovery is one subtype test for the root.
//!
//! Contracts are matched on the exact handle a type names in its
//! declaration, so a contract missing from the classpath is still seen.

use super::views::ViewCache;
use crate::error::FrontEndError;
use crate::frontend::{ContractKind, Contracts, FrontEnd, ResolvedType};
use crate::model::{Capability, ClassifiedType, ModuleId, TypeHandle};
use std::collections::{HashSet, VecDeque};

/// What the lattice walk found above one root type.
#[derive(Debug, Default)]
struct Ancestry {
    /// Nodes that directly implement the extension-point contract, in
    /// discovery order.
    extension_points: Vec<ResolvedType>,
    /// Name of the action contract if the root is a subtype of it.
    action: Option<String>,
}

/// Classifies `root` and returns its records, all carrying the root's
/// effective view map. Unresolvable roots produce no records.
pub fn classify(
    front: &dyn FrontEnd,
    contracts: &Contracts,
    module: ModuleId,
    root: &TypeHandle,
    views: &mut ViewCache,
) -> Result<Vec<ClassifiedType>, FrontEndError> {
    let Some(root) = front.resolve(root)? else {
        return Ok(Vec::new());
    };

    let ancestry = walk(front, contracts, &root)?;
    if ancestry.extension_points.is_empty() && ancestry.action.is_none() {
        return Ok(Vec::new());
    }

    let view_map = views.effective(front, &root)?;
    let class_name = root.class_name();
    let record = |capability: Capability| ClassifiedType {
        module,
        handle: root.handle.clone(),
        implementation: root.qualified_name.clone(),
        package: root.package.clone(),
        class_name: class_name.clone(),
        top_level_class: root.top_level.clone(),
        documentation: root.documentation.clone(),
        source: root.source.clone(),
        views: view_map.clone(),
        capability,
    };

    let mut records = Vec::with_capacity(ancestry.extension_points.len() + 1);
    for point in &ancestry.extension_points {
        let Some(name) = point.qualified_name.clone() else {
            continue;
        };
        records.push(record(Capability::Extension {
            extension_point: name,
            definition: point.handle == root.handle,
            action: ancestry.action.clone(),
        }));
    }
    if ancestry.action.is_some() {
        records.push(record(Capability::Action));
    }
    Ok(records)
}

fn walk(
    front: &dyn FrontEnd,
    contracts: &Contracts,
    root: &ResolvedType,
) -> Result<Ancestry, FrontEndError> {
    let mut ancestry = Ancestry::default();
    let mut visited: HashSet<TypeHandle> = HashSet::from([root.handle.clone()]);
    let mut emitted: HashSet<TypeHandle> = HashSet::new();
    let mut worklist = VecDeque::from([root.clone()]);

    note_action(&mut ancestry, contracts, &root.handle);

    while let Some(node) = worklist.pop_front() {
        for iface in &node.interfaces {
            if contracts.kind_of(Some(iface.as_str())) == ContractKind::ExtensionPoint
                && emitted.insert(node.handle.clone())
            {
                ancestry.extension_points.push(node.clone());
            }
            note_action(&mut ancestry, contracts, iface);
            if visited.insert(iface.clone()) {
                if let Some(resolved) = front.resolve(iface)? {
                    worklist.push_back(resolved);
                }
            }
        }

        if let Some(parent) = &node.superclass {
            note_action(&mut ancestry, contracts, parent);
            if visited.insert(parent.clone()) {
                if let Some(resolved) = front.resolve(parent)? {
                    worklist.push_back(resolved);
                }
            }
        }
    }
    Ok(ancestry)
}

fn note_action(ancestry: &mut Ancestry, contracts: &Contracts, ty: &TypeHandle) {
    if ancestry.action.is_none() && contracts.kind_of(Some(ty.as_str())) == ContractKind::Action {
        ancestry.action = Some(ty.as_str().to_string());
    }
}
