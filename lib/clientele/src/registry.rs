//! Named client registry.
//!
//! All client configurations are declared up front through a
//! [`RegistryBuilder`] and frozen into an immutable [`ClientRegistry`].
//! Lookups after the build never race registration, so the registry needs no
//! locking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::typed::TypedClientSpec;
use crate::{Error, Result};

#[derive(Clone)]
pub(crate) struct ClientEntry {
    pub(crate) config: ClientConfig,
    pub(crate) typed: Option<Arc<TypedClientSpec>>,
}

/// Builder collecting named client configurations.
///
/// # Example
///
/// ```ignore
/// use clientele::{ClientConfig, RegistryBuilder};
///
/// let registry = RegistryBuilder::new()
///     .register("github", github_config)?
///     .register("weather", weather_config)?
///     .build();
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<String, ClientEntry>,
}

impl std::fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl RegistryBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateName`] if the name is already taken.
    pub fn register(mut self, name: impl Into<String>, config: ClientConfig) -> Result<Self> {
        let name = name.into();
        self.insert(
            name,
            ClientEntry {
                config,
                typed: None,
            },
        )?;
        Ok(self)
    }

    /// Register a named client together with a typed endpoint specification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateName`] if the name is already taken.
    pub fn register_typed(
        mut self,
        name: impl Into<String>,
        config: ClientConfig,
        spec: TypedClientSpec,
    ) -> Result<Self> {
        let name = name.into();
        self.insert(
            name,
            ClientEntry {
                config,
                typed: Some(Arc::new(spec)),
            },
        )?;
        Ok(self)
    }

    fn insert(&mut self, name: String, entry: ClientEntry) -> Result<()> {
        if self.entries.contains_key(&name) {
            return Err(Error::duplicate_name(name));
        }
        self.entries.insert(name, entry);
        Ok(())
    }

    /// Freeze the registry.
    #[must_use]
    pub fn build(self) -> ClientRegistry {
        ClientRegistry {
            entries: Arc::new(self.entries),
        }
    }
}

/// Immutable set of named client configurations.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct ClientRegistry {
    entries: Arc<HashMap<String, ClientEntry>>,
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("ClientRegistry")
            .field("clients", &names)
            .finish()
    }
}

impl ClientRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub(crate) fn entry(&self, name: &str) -> Result<&ClientEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::configuration_missing(name))
    }

    /// Configuration registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationMissing`] for unknown names.
    pub fn config(&self, name: &str) -> Result<&ClientConfig> {
        self.entry(name).map(|entry| &entry.config)
    }

    /// Whether a client is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered client names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
