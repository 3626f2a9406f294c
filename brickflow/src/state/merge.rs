//! Merge strategies for mod variable writes.

use crate::errors::PropError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a write combines with the existing namespace state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// The written object replaces the namespace state.
    Replace,
    /// Top-level keys of the written object overwrite existing keys.
    #[default]
    Shallow,
    /// Objects merge recursively; arrays and scalars are replaced.
    Deep,
}

/// Merges `update` into `current` using `strategy`.
///
/// # Errors
///
/// Returns an error if `update` is not an object.
pub fn merge_state(
    current: &Map<String, Value>,
    update: Value,
    strategy: MergeStrategy,
) -> Result<Map<String, Value>, PropError> {
    let Value::Object(update) = update else {
        return Err(PropError::new("data", "state updates must be objects"));
    };

    Ok(match strategy {
        MergeStrategy::Replace => update,
        MergeStrategy::Shallow => {
            let mut next = current.clone();
            next.extend(update);
            next
        }
        MergeStrategy::Deep => {
            let mut next = current.clone();
            deep_merge(&mut next, update);
            next
        }
    })
}

fn deep_merge(target: &mut Map<String, Value>, update: Map<String, Value>) {
    for (key, value) in update {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => deep_merge(existing, incoming),
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}
