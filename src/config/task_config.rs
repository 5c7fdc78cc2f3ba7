//! Per-task effective configuration: merge global defaults with any
//! job-scoped overrides passed to `Submit` (§4.1, §4.2).

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::task::TaskName;

/// One task's tunables: timeout and retry budget.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TaskSettings {
    #[serde(default)]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retries: u32,
}

impl TaskSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Defaults for every declared task, keyed by name. Populated from the
/// `[tasks.*]` section of the configuration file; §5 lists the defaults
/// used when a task is absent from the file.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDefaults {
    #[serde(default)]
    overrides: HashMap<String, TaskSettings>,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        let mut overrides = HashMap::new();
        overrides.insert(
            TaskName::GitSync.as_str().to_string(),
            TaskSettings {
                timeout_secs: 300,
                retries: 1,
            },
        );
        overrides.insert(
            TaskName::CodeParsing.as_str().to_string(),
            TaskSettings {
                timeout_secs: 600,
                retries: 0,
            },
        );
        overrides.insert(
            TaskName::GraphUpdate.as_str().to_string(),
            TaskSettings {
                timeout_secs: 900,
                retries: 2,
            },
        );
        overrides.insert(
            TaskName::Cleanup.as_str().to_string(),
            TaskSettings {
                timeout_secs: 60,
                retries: 0,
            },
        );
        TaskDefaults { overrides }
    }
}

impl TaskDefaults {
    pub fn for_task(&self, name: TaskName) -> TaskSettings {
        self.overrides
            .get(name.as_str())
            .copied()
            .unwrap_or(TaskSettings {
                timeout_secs: 300,
                retries: 0,
            })
    }
}

/// Per-job overrides supplied to `Submit(codebaseRef, jobType, overrides?)`.
#[derive(Debug, Clone, Default)]
pub struct TaskOverrides {
    overrides: HashMap<TaskName, TaskSettings>,
}

impl TaskOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: TaskName, settings: TaskSettings) -> Self {
        self.overrides.insert(name, settings);
        self
    }
}

/// The effective configuration for one task in one job: defaults merged
/// with any job-scoped override.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveTaskConfig {
    pub name: TaskName,
    pub timeout: Duration,
    pub retries: u32,
}

/// Produces [`EffectiveTaskConfig`] for a task given the global
/// [`TaskDefaults`] and a job's [`TaskOverrides`]. This is `GetConfig(ctx)`
/// from §4.2.
pub struct TaskConfigResolver<'a> {
    defaults: &'a TaskDefaults,
}

impl<'a> TaskConfigResolver<'a> {
    pub fn new(defaults: &'a TaskDefaults) -> Self {
        TaskConfigResolver { defaults }
    }

    pub fn resolve(&self, name: TaskName, overrides: &TaskOverrides) -> EffectiveTaskConfig {
        let base = self.defaults.for_task(name);
        let settings = overrides.overrides.get(&name).copied().unwrap_or(base);
        EffectiveTaskConfig {
            name,
            timeout: settings.timeout(),
            retries: settings.retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_replaces_default_timeout() {
        let defaults = TaskDefaults::default();
        let resolver = TaskConfigResolver::new(&defaults);
        let overrides = TaskOverrides::new().with(
            TaskName::GitSync,
            TaskSettings {
                timeout_secs: 42,
                retries: 5,
            },
        );

        let effective = resolver.resolve(TaskName::GitSync, &overrides);
        assert_eq!(effective.timeout, Duration::from_secs(42));
        assert_eq!(effective.retries, 5);
    }

    #[test]
    fn absent_override_falls_back_to_default() {
        let defaults = TaskDefaults::default();
        let resolver = TaskConfigResolver::new(&defaults);
        let effective = resolver.resolve(TaskName::CodeParsing, &TaskOverrides::new());
        assert_eq!(effective.timeout, Duration::from_secs(600));
        assert_eq!(effective.retries, 0);
    }
}
