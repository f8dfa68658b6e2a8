//! Extension-point indexer.
//!
//! Scans a core module and its plugins through a pluggable front end,
//! classifies every declared type against the extension-point and action
//! contracts, and aggregates the results into a [`ReportModel`].

pub mod aggregate;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod frontend;
pub mod model;
pub mod output;
pub mod scanner;

pub use aggregate::{Aggregator, DuplicatePolicy};
pub use config::Config;
pub use coordinator::{select_modules, CoordinatorOptions, Phase, ScanCoordinator};
pub use error::{AggregateError, CoordinatorError, FrontEndError};
pub use frontend::{Contracts, FrontEnd, ModuleProvider};
pub use model::{ClassifiedType, Module, ModuleDescriptor, ReportModel};
pub use scanner::{ModuleScan, ModuleScanner};
