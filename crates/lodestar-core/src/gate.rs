//! Caught-up tracking and dependency ordering between streams.
//!
//! A stream is "caught up" when the most recent response for it reported
//! the final page. Streams that declare dependencies are held back until
//! every dependency is caught up; the check runs before each runner
//! iteration because peers can finish mid-pass.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::stream::StreamSpec;

/// Dependency-graph validation failures.
#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    /// A `depends_on` entry names a stream key that is not configured.
    #[error("stream '{stream}' depends on unknown stream '{dependency}'")]
    UnknownDependency {
        /// The declaring stream.
        stream: String,
        /// The missing key.
        dependency: String,
    },

    /// The dependency digraph contains a cycle.
    #[error("dependency cycle involving stream '{stream}'")]
    Cycle {
        /// A stream on the cycle.
        stream: String,
    },
}

/// Shared caught-up state, one flag per stream.
///
/// The mutex is held only for map reads and writes, never across I/O.
#[derive(Debug, Default)]
pub struct DependencyGate {
    caught_up: Mutex<HashMap<String, bool>>,
}

impl DependencyGate {
    /// Creates a gate with every key initially not caught up.
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            caught_up: Mutex::new(keys.into_iter().map(|key| (key, false)).collect()),
        }
    }

    /// Whether every listed dependency is currently caught up.
    ///
    /// Unknown keys count as not caught up; construction-time validation
    /// rejects them unless the check was explicitly skipped.
    #[must_use]
    pub fn all_caught_up(&self, deps: &[String]) -> bool {
        let caught_up = self.caught_up.lock();
        deps.iter()
            .all(|dep| caught_up.get(dep).copied().unwrap_or(false))
    }

    /// Records whether `key`'s latest response was the final page.
    pub fn set_caught_up(&self, key: &str, value: bool) {
        self.caught_up.lock().insert(key.to_string(), value);
    }

    /// The current flag for one stream.
    #[must_use]
    pub fn is_caught_up(&self, key: &str) -> bool {
        self.caught_up.lock().get(key).copied().unwrap_or(false)
    }
}

/// Validates the `depends_on` digraph of a stream set.
///
/// # Errors
///
/// Returns [`DependencyError::UnknownDependency`] when a dependency names
/// no configured stream, and [`DependencyError::Cycle`] when the digraph
/// is cyclic.
pub fn validate_dependencies(streams: &[StreamSpec]) -> Result<(), DependencyError> {
    let edges: HashMap<&str, &[String]> = streams
        .iter()
        .map(|spec| (spec.key.as_str(), spec.depends_on.as_slice()))
        .collect();

    for spec in streams {
        for dep in &spec.depends_on {
            if !edges.contains_key(dep.as_str()) {
                return Err(DependencyError::UnknownDependency {
                    stream: spec.key.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    // Iterative DFS, three colors: absent = white, false = on the current
    // path, true = fully explored.
    let mut state: HashMap<&str, bool> = HashMap::new();
    for spec in streams {
        if state.contains_key(spec.key.as_str()) {
            continue;
        }
        let mut stack: Vec<(&str, usize)> = vec![(spec.key.as_str(), 0)];
        state.insert(spec.key.as_str(), false);
        while let Some((key, next_edge)) = stack.pop() {
            let deps = edges[key];
            if next_edge >= deps.len() {
                state.insert(key, true);
                continue;
            }
            stack.push((key, next_edge + 1));
            let dep = deps[next_edge].as_str();
            match state.get(dep) {
                Some(false) => {
                    return Err(DependencyError::Cycle {
                        stream: dep.to_string(),
                    });
                }
                Some(true) => {}
                None => {
                    state.insert(dep, false);
                    stack.push((dep, 0));
                }
            }
        }
    }
    Ok(())
}
