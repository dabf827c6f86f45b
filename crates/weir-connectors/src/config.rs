//! Connector configuration property bags and lifecycle states.

use std::collections::HashMap;

/// A flat string-keyed property bag for connector configuration.
///
/// Connector configs parse themselves out of this via `from_config`
/// constructors, so every connector shares one configuration surface
/// (CLI flags, env, files all funnel into the same keys).
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Connector name (for diagnostics only).
    name: String,
    /// Raw key/value properties.
    properties: HashMap<String, String>,
}

impl ConnectorConfig {
    /// Creates an empty config for the named connector.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
        }
    }

    /// Returns the connector name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets a property, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Returns all raw properties.
    #[must_use]
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Returns `(key, value)` pairs whose keys start with `prefix`,
    /// with the prefix stripped from the returned keys.
    #[must_use]
    pub fn properties_with_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        self.properties
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(prefix)
                    .map(|stripped| (stripped.to_string(), v.clone()))
            })
            .collect()
    }
}

/// Lifecycle state of an individual connector.
///
/// Distinct from the pipeline-level state machine: a connector only
/// tracks whether its own I/O resources exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    /// Constructed, no I/O resources yet.
    Created,
    /// `open` in progress.
    Initializing,
    /// Open and delivering data.
    Running,
    /// Closed cleanly; resources released.
    Closed,
    /// Terminated by an unrecoverable error.
    Failed,
}

impl std::fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "Created",
            Self::Initializing => "Initializing",
            Self::Running => "Running",
            Self::Closed => "Closed",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}
