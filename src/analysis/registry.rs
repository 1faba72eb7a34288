//! Analysis method registry.

use super::capability::Requirements;
use super::context::MethodContext;
use crate::error::{AnalysisError, RegistryError};
use crate::recording::Recording;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::debug;

/// Structured output of one method on one recording.
pub type ResultFields = BTreeMap<String, Value>;

/// Callable signature of an analysis method.
pub type AnalysisFn =
    dyn Fn(&Recording, &MethodContext) -> Result<ResultFields, AnalysisError> + Send + Sync;

/// A registered method: name, preconditions and callable.
#[derive(Clone)]
pub struct AnalysisMethod {
    name: String,
    requirements: Requirements,
    func: Arc<AnalysisFn>,
}

impl fmt::Debug for AnalysisMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisMethod")
            .field("name", &self.name)
            .field("requirements", &self.requirements)
            .finish()
    }
}

impl AnalysisMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    pub fn call(&self, recording: &Recording, ctx: &MethodContext) -> Result<ResultFields, AnalysisError> {
        (self.func)(recording, ctx)
    }
}

/// Namespace of analysis methods.
#[derive(Default)]
pub struct AnalysisRegistry {
    methods: RwLock<BTreeMap<String, AnalysisMethod>>,
}

impl fmt::Debug for AnalysisRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisRegistry")
            .field("methods", &self.names())
            .finish()
    }
}

impl AnalysisRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry, empty until methods are registered.
    pub fn global() -> Arc<AnalysisRegistry> {
        static GLOBAL: OnceLock<Arc<AnalysisRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(AnalysisRegistry::new())).clone()
    }

    /// Register `func` under `name`.
    pub fn register<F>(&self, name: impl Into<String>, requirements: Requirements, func: F) -> Result<(), RegistryError>
    where
        F: Fn(&Recording, &MethodContext) -> Result<ResultFields, AnalysisError> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut methods = self.methods.write().unwrap_or_else(|e| e.into_inner());
        if methods.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        debug!("Registered analysis method `{}`", name);
        methods.insert(
            name.clone(),
            AnalysisMethod {
                name,
                requirements,
                func: Arc::new(func),
            },
        );
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<AnalysisMethod, RegistryError> {
        self.methods
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownMethod(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.methods
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}
