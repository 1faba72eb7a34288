//! Analysis methods: capability declarations, invocation context and the
//! method registry.
//!
//! Methods are plain functions registered by name. The core never
//! inspects a method body; it only checks the declared requirements.

pub mod capability;
pub mod context;
pub mod registry;

pub use capability::{Capability, Requirements};
pub use context::{CancelToken, MethodContext, Options};
pub use registry::{AnalysisFn, AnalysisMethod, AnalysisRegistry, ResultFields};
