use crate::common::PREFIX_ID_WIDTH;
use parking_lot::Mutex;
use serde_json::Value;

/// How a collection assigns identifiers to documents inserted without one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdMode {
    /// A random UUID v4.
    #[default]
    Auto,
    /// The caller must supply `_id`; inserting without one fails.
    Manual,
    /// `PREFIX-000001`, `PREFIX-000002`, ... from a per collection counter.
    Prefix(String),
}

impl IdMode {
    pub fn name(&self) -> &'static str {
        match self {
            IdMode::Auto => "auto",
            IdMode::Manual => "manual",
            IdMode::Prefix(_) => "prefix",
        }
    }
}

/// Identifier generation state of a collection.
pub(crate) struct IdGenerator {
    state: Mutex<IdState>,
}

struct IdState {
    mode: IdMode,
    counter: u64,
}

impl IdGenerator {
    pub(crate) fn new() -> Self {
        IdGenerator {
            state: Mutex::new(IdState {
                mode: IdMode::Auto,
                counter: 0,
            }),
        }
    }

    pub(crate) fn mode(&self) -> IdMode {
        self.state.lock().mode.clone()
    }

    /// Switches mode. For prefix mode the counter restarts at `seed`, the
    /// number of the newest stored identifier under that prefix.
    pub(crate) fn set_mode(&self, mode: IdMode, seed: u64) {
        let mut state = self.state.lock();
        state.mode = mode;
        state.counter = seed;
    }

    /// Produces the next identifier, or `None` in manual mode.
    pub(crate) fn next_id(&self) -> Option<Value> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        match &state.mode {
            IdMode::Auto => Some(Value::String(uuid::Uuid::new_v4().to_string())),
            IdMode::Manual => None,
            IdMode::Prefix(prefix) => {
                state.counter += 1;
                Some(Value::String(format_prefixed(prefix, state.counter)))
            }
        }
    }
}

pub(crate) fn format_prefixed(prefix: &str, counter: u64) -> String {
    format!("{}-{:0width$}", prefix, counter, width = PREFIX_ID_WIDTH)
}

/// Extracts the counter from an identifier such as `USR-000042`. Returns
/// `None` when the identifier does not start with `prefix-`.
pub(crate) fn parse_prefixed(prefix: &str, id: &str) -> Option<u64> {
    let rest = id.strip_prefix(prefix)?.strip_prefix('-')?;
    rest.rsplit('-').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_ids_are_unique_uuids() {
        let generator = IdGenerator::new();
        let a = generator.next_id().unwrap();
        let b = generator.next_id().unwrap();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(a.as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_manual_mode_yields_none() {
        let generator = IdGenerator::new();
        generator.set_mode(IdMode::Manual, 0);
        assert!(generator.next_id().is_none());
        assert_eq!(generator.mode().name(), "manual");
    }

    #[test]
    fn test_prefix_mode_counts_from_seed() {
        let generator = IdGenerator::new();
        generator.set_mode(IdMode::Prefix("USR".to_string()), 0);
        assert_eq!(generator.next_id(), Some(Value::from("USR-000001")));
        assert_eq!(generator.next_id(), Some(Value::from("USR-000002")));

        generator.set_mode(IdMode::Prefix("ORD".to_string()), 41);
        assert_eq!(generator.next_id(), Some(Value::from("ORD-000042")));
    }

    #[test]
    fn test_wide_counter_is_not_truncated() {
        assert_eq!(format_prefixed("X", 1234567), "X-1234567");
    }

    #[test]
    fn test_parse_prefixed() {
        assert_eq!(parse_prefixed("USR", "USR-000042"), Some(42));
        assert_eq!(parse_prefixed("USR", "ORD-000042"), None);
        assert_eq!(parse_prefixed("USR", "USR000042"), None);
        assert_eq!(parse_prefixed("A-B", "A-B-000007"), Some(7));
        assert_eq!(parse_prefixed("USR", "USR-abc"), None);
    }
}
