//! Shared fixtures for tests that need real backing services.

pub mod postgres;
pub mod runtime;

use uuid::Uuid;

/// Docker network shared by the containers of one test.
#[derive(Debug, Clone)]
pub struct TestNetwork {
    name: String,
}

impl TestNetwork {
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            name: unique_name(prefix),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) fn unique_name(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_names_are_unique_and_prefixed() {
        let first = TestNetwork::new("rocco");
        let second = TestNetwork::new("rocco");
        assert!(first.name().starts_with("rocco-"));
        assert_ne!(first.name(), second.name());
    }
}
