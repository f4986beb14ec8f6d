//! # rwc Compiler
//!
//! Compiles declarative component sources — a `<component name="X">` script
//! section, an optional `<style>` section, an optional `<view>` markup
//! section — into imperative JavaScript programs that define custom elements,
//! build their shadow trees, and keep them updated through a per-instance
//! registry of update entries keyed by dependency name.
//!
//! ## Update Protocol Invariants
//!
//! 1. **Registration order is document order**: the view compiler registers
//!    update entries in the order it constructs nodes, and a dispatch runs
//!    surviving entries in exactly that order.
//!
//! 2. **Lazy purging**: an entry is never eagerly removed. It is dropped when
//!    a dispatch or a filter pass finds its validity predicate false.
//!
//! 3. **Full rebuild for lists**: a `*for` region's update tears down every
//!    node the previous pass produced and re-runs the loop against current
//!    data. There is no reconciliation.
//!
//! 4. **One flush per wrapper per frame**: synchronous mutations of one
//!    reactive wrapper coalesce into a single notification on the next tick.
//!    Primitives additionally suppress writes that do not change the value.
//!
//! The `runtime` module is an executable reference of this protocol over an
//! in-memory document tree; the compiler's generated programs target the same
//! contract in the browser.

mod analyze;
mod cache;
mod discovery;
mod emit;
mod error;
mod interpolate;
mod sections;
mod view;

pub mod runtime;


pub use analyze::{analyze_script, ScriptAnalysis};
pub use cache::IncrementalCache;
pub use discovery::{compile_directory, compile_file, find_rwc_files, output_path, BatchOutcome};
pub use emit::{compile, derive_tag_name};
pub use error::CompileError;
pub use interpolate::Interpolation;
pub use sections::{extract_sections, ComponentDefinition};
