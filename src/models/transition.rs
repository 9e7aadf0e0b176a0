//! Rejected lifecycle transitions

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} a {entity} that is '{from}'")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: String,
    pub action: &'static str,
}

impl TransitionError {
    pub fn new(entity: &'static str, from: impl std::fmt::Display, action: &'static str) -> Self {
        Self {
            entity,
            from: from.to_string(),
            action,
        }
    }
}
