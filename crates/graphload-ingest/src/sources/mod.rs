//! Built-in source profiles.

pub mod biocyc;
pub mod go;
pub mod ncbi_gene;

use graphload_model::{MappingError, SourceProfile};
use std::collections::BTreeMap;

/// Profiles by name. Constructed once per process and passed by reference.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    profiles: BTreeMap<String, SourceProfile>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every profile shipped with graphload.
    pub fn builtin() -> Result<Self, MappingError> {
        let mut registry = Self::new();
        for profile in biocyc::profiles() {
            registry.register(profile)?;
        }
        registry.register(go::profile())?;
        registry.register(ncbi_gene::profile())?;
        Ok(registry)
    }

    /// Add a profile after validating its mapping.
    pub fn register(&mut self, profile: SourceProfile) -> Result<(), MappingError> {
        profile.validate()?;
        self.profiles.insert(profile.name.clone(), profile);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SourceProfile> {
        self.profiles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}
