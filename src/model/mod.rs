//! Core data types for modules, classification records, and reports.
//!
//! - [`Module`] - A scanned unit (the core or one plugin)
//! - [`ClassifiedType`] - One extension, extension point, or action found in a module
//! - [`ReportModel`] - The finished snapshot of a run
//!
//! # Example
//!
//! ```
//! use extindex::model::{normalize_display_name, ModuleDescriptor};
//!
//! let core = ModuleDescriptor::core("2.400");
//! assert!(core.is_core());
//! assert_eq!(normalize_display_name("Jenkins Git plugin", "Jenkins Core"), "Git Plugin");
//! ```

mod classified;
mod module;
mod report;

pub use classified::*;
pub use module::*;
pub use report::*;
