use super::LoggingConfig;
use crate::error::ConfigError;
use std::ops::Deref;
use tracing::warn;

/// Scoped configuration override.
///
/// Holds the config exclusively while alive and puts every overridden
/// value back, in reverse order, when dropped. Read-only through the guard:
/// only values set by the override are tracked for restore.
#[derive(Debug)]
pub struct ConfigOverride<'a> {
    config: &'a mut LoggingConfig,
    saved: Vec<(String, String, Option<String>)>,
}

impl<'a> ConfigOverride<'a> {
    pub(super) fn apply(
        config: &'a mut LoggingConfig,
        vars: &[((&str, &str), Option<&str>)],
    ) -> Result<Self, ConfigError> {
        let mut guard = Self {
            config,
            saved: Vec::with_capacity(vars.len()),
        };
        for ((section, key), value) in vars {
            // On error the guard drops here and undoes what was already set.
            let previous = guard
                .config
                .set(section, key, value.map(str::to_string))?;
            guard
                .saved
                .push((section.to_string(), key.to_string(), previous));
        }
        Ok(guard)
    }
}

impl Deref for ConfigOverride<'_> {
    type Target = LoggingConfig;

    fn deref(&self) -> &Self::Target {
        &*self.config
    }
}

impl Drop for ConfigOverride<'_> {
    fn drop(&mut self) {
        while let Some((section, key, previous)) = self.saved.pop() {
            if let Err(e) = self.config.set(&section, &key, previous) {
                warn!(section = %section, key = %key, error = %e, "Failed to restore config value");
            }
        }
    }
}
