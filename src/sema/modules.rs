//! Module loading contract for Sable
//!
//! The semantic core never touches the filesystem: resolving an import
//! path to a file and parsing it is the collaborator's job. The core asks
//! for a module once per distinct path; repeated requests hit the cache.

use crate::ast::Decl;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by the module collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImportError {
    #[error("module not found")]
    NotFound,
    /// Ordered path of module names forming the cycle
    #[error("import cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// The external import collaborator
pub trait ModuleProvider {
    /// Map a module path to a file, if one exists
    fn resolve(&mut self, path: &str) -> Option<PathBuf>;

    /// Load and parse a module's declarations
    fn load(&mut self, path: &str) -> Result<Vec<Decl>, ImportError>;
}

/// Caches loaded modules so each distinct path is requested exactly once
pub struct ImportDriver<'a> {
    provider: &'a mut dyn ModuleProvider,
    loaded: HashMap<String, Vec<Decl>>,
}

impl<'a> ImportDriver<'a> {
    pub fn new(provider: &'a mut dyn ModuleProvider) -> Self {
        Self {
            provider,
            loaded: HashMap::new(),
        }
    }

    /// Load a module, hitting the cache on repeated requests
    pub fn load(&mut self, path: &str) -> Result<&[Decl], ImportError> {
        if !self.loaded.contains_key(path) {
            let decls = self.provider.load(path)?;
            log::debug!("loaded module {} ({} declarations)", path, decls.len());
            self.loaded.insert(path.to_string(), decls);
        }
        Ok(self.loaded[path].as_slice())
    }
}
