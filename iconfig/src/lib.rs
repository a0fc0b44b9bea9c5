use serde::{Deserialize, Serialize};
use toml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use serde::de::DeserializeOwned;

/// Config files searched by [`load`], lowest precedence first.
pub const SEARCH_PATHS: [&str; 3] = [
    "/etc/ufacade/config.toml",
    "config/config.toml",
    "./config.toml",
];

/// A flexible configuration container that can hold any valid TOML data
/// and supports merging configurations.
///
/// # Examples
///
/// ```
/// use iconfig::ApplicationConfig;
///
/// let mut base = ApplicationConfig::from_str(r#"
///     [container.aliases]
///     fields = "understand.field-provider"
/// "#).unwrap();
///
/// let overlay = ApplicationConfig::from_str(r#"
///     [container.aliases]
///     fp = "understand.field-provider"
/// "#).unwrap();
///
/// base.merge(overlay);
///
/// assert_eq!(base.get("container.aliases.fields").unwrap().as_str(), Some("understand.field-provider"));
/// assert_eq!(base.get("container.aliases.fp").unwrap().as_str(), Some("understand.field-provider"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(flatten)]
    value: Value,
}

impl fmt::Display for ApplicationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        ApplicationConfig { value: Value::Table(toml::Table::new()) }
    }
}

impl ApplicationConfig {
    /// Create a new config from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, anyhow::Error> {
        let value = toml::from_str(s)?;
        Ok(Self { value })
    }

    /// Create a new config from a TOML file
    pub fn from_file<P: AsRef<Path>>(fname: P) -> Result<Self, anyhow::Error> {
        let path = fname.as_ref();
        if !path.exists() {
            return Err(anyhow::anyhow!("File {} does not exist", path.display()));
        }
        let config = std::fs::read_to_string(path)?;
        let value = Self::from_str(&config)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;

        Ok(value)
    }

    /// Merge another config into this one
    ///
    /// This performs a deep merge where:
    /// - Tables are merged recursively
    /// - Arrays are concatenated
    /// - Other values are overwritten by the new config
    pub fn merge(&mut self, other: Self) {
        self.value = merge_values(&self.value, &other.value);
    }

    /// Get a reference to the underlying TOML value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Get a value by dotted path (e.g., "container.aliases")
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.value;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn jsonify(&self) -> Result<String, anyhow::Error> {
        serde_json::to_string(self).map_err(|e| anyhow::anyhow!("Failed to convert to json: {}", e))
    }

    pub fn resolve<T: DeserializeOwned>(&self) -> Result<T, anyhow::Error> {
        let json = self.jsonify()?;
        serde_json::from_str(&json).map_err(|e| anyhow::anyhow!("Failed to convert to json: {}", e))
    }

    pub fn resolve_prefix<T: DeserializeOwned>(&self, prefix: &str) -> Result<T, anyhow::Error> {
        if prefix.is_empty() {
            return self.resolve::<T>();
        }

        let part = self
            .get(prefix)
            .ok_or_else(|| anyhow::anyhow!("No config found for {}", prefix))?;
        let json = serde_json::to_string(part)
            .map_err(|e| anyhow::anyhow!("Failed to convert to json: {}", e))?;

        serde_json::from_str(&json).map_err(|e| anyhow::anyhow!("Failed to convert to json: {}", e))
    }

    /// The `[container]` section, or an empty one if absent.
    pub fn container(&self) -> Result<ContainerConfig, anyhow::Error> {
        if self.get("container").is_none() {
            return Ok(ContainerConfig::default());
        }
        self.resolve_prefix::<ContainerConfig>("container")
    }
}

/// Settings applied to a container when it is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// `alias -> binding key`
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

fn merge_values(a: &Value, b: &Value) -> Value {
    match (a, b) {
        // If both are tables, merge them recursively
        (Value::Table(a_map), Value::Table(b_map)) => {
            let mut result = a_map.clone();
            for (k, v) in b_map {
                let merged = match result.get(k) {
                    Some(existing) => merge_values(existing, v),
                    None => v.clone(),
                };
                result.insert(k.clone(), merged);
            }
            Value::Table(result)
        }
        // If both are arrays, concatenate them
        (Value::Array(a_vec), Value::Array(b_vec)) => {
            let mut result = a_vec.clone();
            result.extend(b_vec.iter().cloned());
            Value::Array(result)
        }
        // In all other cases, use the value from b
        _ => b.clone(),
    }
}

/// Load and merge every existing file in `paths`, later files winning.
pub fn load_from<I, P>(paths: I) -> Result<ApplicationConfig, anyhow::Error>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let mut config: Option<ApplicationConfig> = None;
    for path in paths {
        let path = path.into();
        if !path.exists() {
            continue;
        }
        let layer = ApplicationConfig::from_file(&path)?;
        tracing::debug!(path = %path.display(), "config layer loaded");
        match config.as_mut() {
            Some(base) => base.merge(layer),
            None => config = Some(layer),
        }
    }
    config.ok_or_else(|| anyhow::anyhow!("No config file found"))
}

pub fn load() -> Result<ApplicationConfig, anyhow::Error> {
    load_from(SEARCH_PATHS)
}
