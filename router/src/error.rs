use gridwire_common::db::indices::{LinkId, NodeId};
use thiserror::Error;

/// Engine errors. Ordinary "no route" outcomes are `Ok(None)`, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The step bound was exceeded. Recoverable: callers may retry with a
    /// larger bound or report the link unroutable.
    #[error("search did not converge within {steps} steps")]
    NonConvergence { steps: usize },
    /// Grid state and link geometry disagree. Never patched over.
    #[error("grid model diverged from link geometry: {0}")]
    InvariantViolation(String),
    #[error("unknown link {0}")]
    UnknownLink(LinkId),
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("node {node} has no pad {pad}")]
    UnknownPad { node: NodeId, pad: usize },
}

impl RouteError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RouteError::NonConvergence { .. })
    }
}

pub type Result<T> = std::result::Result<T, RouteError>;
