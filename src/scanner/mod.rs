//! Module scanning.
//!
//! [`ModuleScanner`] walks every declared type of a module (nested types
//! included) and runs the [`classifier`] on each one.
//!
//! # Example
//!
//! ```
//! use extindex::frontend::fixture::{FixtureWorkspace, WorkspaceFixture};
//! use extindex::frontend::Contracts;
//! use extindex::model::ModuleId;
//! use extindex::scanner::ModuleScanner;
//!
//! let fixture: WorkspaceFixture = serde_json::from_str(r#"{
//!     "plugins": [{
//!         "gav": "g:demo:1",
//!         "title": "Demo",
//!         "units": [{ "path": "Point.java", "package": "p",
//!                     "types": [{ "name": "Point", "interfaces": ["hudson.ExtensionPoint"] }] }]
//!     }],
//!     "library": [{ "path": "ExtensionPoint.java", "package": "hudson",
//!                   "types": [{ "name": "ExtensionPoint" }] }]
//! }"#).unwrap();
//! let workspace = FixtureWorkspace::new(fixture, &Contracts::default());
//! let front = workspace.front_end("g:demo:1").unwrap();
//!
//! let scan = ModuleScanner::new(&front, ModuleId(0)).scan();
//! assert_eq!(scan.records.len(), 1);
//! assert!(scan.records[0].is_definition());
//! ```

pub mod classifier;
pub mod views;

pub use classifier::classify;
pub use views::ViewCache;

use crate::error::FrontEndError;
use crate::frontend::{Contracts, DeclaredType, FrontEnd};
use crate::model::{ClassifiedType, ModuleId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Records found in one module.
#[derive(Debug)]
pub struct ModuleScan {
    pub module: ModuleId,
    pub records: Vec<ClassifiedType>,
    pub views: ViewCache,
    /// Set when the front end failed for the whole module; `records` is
    /// then empty.
    pub failure: Option<FrontEndError>,
}

impl ModuleScan {
    pub fn empty(module: ModuleId) -> Self {
        Self {
            module,
            records: Vec::new(),
            views: ViewCache::new(),
            failure: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

pub struct ModuleScanner<'a> {
    front: &'a dyn FrontEnd,
    module: ModuleId,
    contracts: Contracts,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> ModuleScanner<'a> {
    pub fn new(front: &'a dyn FrontEnd, module: ModuleId) -> Self {
        Self {
            front,
            module,
            contracts: Contracts::default(),
            cancel: None,
        }
    }

    /// Looks for these contracts instead of the default ones.
    pub fn with_contracts(mut self, contracts: Contracts) -> Self {
        self.contracts = contracts;
        self
    }

    /// Stops the scan at the next type once `cancel` is set.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Classifies every declared type. A front-end failure abandons the
    /// module: it is logged and an empty scan carrying the failure is
    /// returned.
    pub fn scan(&self) -> ModuleScan {
        let mut scan = ModuleScan::empty(self.module);
        match self.collect(&mut scan.views) {
            Ok(records) => {
                debug!(
                    "Module {:?}: {} records, {} view maps",
                    self.module,
                    records.len(),
                    scan.views.len()
                );
                scan.records = records;
            }
            Err(e) => {
                warn!("Failed to analyze module {:?}: {}", self.module, e);
                scan.views = ViewCache::new();
                scan.failure = Some(e);
            }
        }
        scan
    }

    fn collect(&self, views: &mut ViewCache) -> Result<Vec<ClassifiedType>, FrontEndError> {
        let units = self.front.units()?;
        let mut records = Vec::new();

        for unit in &units {
            // Depth-first, outer types before the types nested in them.
            let mut stack: Vec<&DeclaredType> = unit.types.iter().rev().collect();
            while let Some(declared) = stack.pop() {
                if self.is_cancelled() {
                    return Err(FrontEndError::Cancelled);
                }
                let found =
                    classify(self.front, &self.contracts, self.module, &declared.handle, views)?;
                for record in &found {
                    debug!("Found {}", record);
                }
                records.extend(found);
                stack.extend(declared.nested.iter().rev());
            }
        }
        Ok(records)
    }
}
