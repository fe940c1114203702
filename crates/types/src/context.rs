//! Execution context of an agent operation.

use std::fmt;

/// Identifies the logical execution context (tenant) an operation runs in.
///
/// Record storage is scoped per context, and context-bound components such as
/// the persisted DID cache refuse to serve more than one context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentContext {
    correlation_id: String,
}

impl AgentContext {
    /// Creates a context with the given correlation id.
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into() }
    }

    /// Returns the correlation id identifying this context.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

impl fmt::Display for AgentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.correlation_id)
    }
}
