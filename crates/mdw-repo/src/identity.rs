//! Execution identity
//!
//! Identity travels explicitly with every transaction. Elevation means
//! building a new [`ExecutionContext`] for the system principal; nothing
//! ambient is mutated.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who a transaction runs as
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Principal {
    /// Elevated service identity
    System,
    /// Authenticated user
    User(String),
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("System"),
            Self::User(name) => f.write_str(name),
        }
    }
}

/// Execution context carried by a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    principal: Principal,
}

impl ExecutionContext {
    /// Context for the elevated service identity
    #[inline]
    #[must_use]
    pub fn system() -> Self {
        Self {
            principal: Principal::System,
        }
    }

    /// Context for a named user
    #[inline]
    #[must_use]
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            principal: Principal::User(name.into()),
        }
    }

    #[inline]
    #[must_use]
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    #[inline]
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.principal == Principal::System
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_context() {
        let ctx = ExecutionContext::system();
        assert!(ctx.is_system());
        assert_eq!(ctx.principal().to_string(), "System");
    }

    #[test]
    fn user_context_is_not_system() {
        let ctx = ExecutionContext::user("alice");
        assert!(!ctx.is_system());
        assert_eq!(ctx.principal(), &Principal::User("alice".to_string()));
    }
}
