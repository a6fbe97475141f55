//! Environment discovery from stack names
//!
//! Environment stacks follow `<prefix>-<tenant>-<env>` where the tenant is
//! six letters and the environment code is three letters and a digit
//! (`ecs-arlitx-env1`). Nested stacks and anything else are ignored.

use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

use crate::error::{Result, ScalingError};
use crate::models::{DiscoveredEnvironment, EnvironmentKey};
use crate::platform::StackCatalog;

/// Compiled stack naming convention for one prefix
#[derive(Debug, Clone)]
pub struct NamingConvention {
    prefix: String,
    environment: Regex,
}

impl NamingConvention {
    pub fn new(prefix: &str) -> Result<Self> {
        let pattern = format!(
            r"^{}-([A-Za-z]{{6}})-([A-Za-z]{{3}}[0-9])$",
            regex::escape(prefix)
        );
        let environment = Regex::new(&pattern).map_err(|e| {
            ScalingError::Configuration(format!("invalid stack prefix '{}': {}", prefix, e))
        })?;
        Ok(Self {
            prefix: prefix.to_string(),
            environment,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Parse an environment stack name; `None` when it does not follow the convention
    pub fn parse_stack_name(&self, name: &str) -> Option<DiscoveredEnvironment> {
        let captures = self.environment.captures(name)?;
        Some(DiscoveredEnvironment {
            key: EnvironmentKey::new(&captures[1], &captures[2]),
            stack_name: name.to_string(),
        })
    }

    /// Whether `name` is the nested stack carrying `marker` for this environment
    pub fn is_nested_stack(&self, name: &str, key: &EnvironmentKey, marker: &str) -> bool {
        let head = format!("{}-{}-", key.record_name(&self.prefix), marker);
        name.len() > head.len() && name.starts_with(&head)
    }
}

/// Keep the names that follow the convention, in listing order, without duplicates
pub fn discover_environments<'a, I>(
    convention: &NamingConvention,
    names: I,
) -> Vec<DiscoveredEnvironment>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for name in names {
        match convention.parse_stack_name(name) {
            Some(env) if seen.insert(env.key.clone()) => found.push(env),
            Some(_) => debug!(stack = %name, "Duplicate environment stack ignored"),
            None => {}
        }
    }

    found
}

/// List stacks from the catalog and discover the managed environments
pub async fn discover<C>(
    catalog: &C,
    convention: &NamingConvention,
) -> Result<Vec<DiscoveredEnvironment>>
where
    C: StackCatalog + ?Sized,
{
    let names = catalog.list_stack_names().await?;
    Ok(discover_environments(
        convention,
        names.iter().map(String::as_str),
    ))
}
