//! External decision seam.
//!
//! The runtime depends only on this signature and on the call being
//! fallible; any reasoning service can sit behind it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use contracts::{AgentDecision, DecisionContext};

/// Error raised by a decision backend. Always caught at the call site,
/// logged, and isolated to the agent that triggered the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionError {
    pub message: String,
}

impl DecisionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DecisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decision backend error: {}", self.message)
    }
}

impl std::error::Error for DecisionError {}

pub type DecisionFuture =
    Pin<Box<dyn Future<Output = Result<Option<AgentDecision>, DecisionError>> + Send>>;

/// The external decision function. `None` means the agent chooses not to
/// act. There is no timeout enforcement on the call; the concurrency cap
/// and per-agent mutual exclusion bound the exposure.
pub trait DecisionBackend: Send + Sync {
    fn decide(&self, context: DecisionContext) -> DecisionFuture;
}

/// Backend that never acts. Default wiring until a real backend is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

impl DecisionBackend for NullBackend {
    fn decide(&self, _context: DecisionContext) -> DecisionFuture {
        Box::pin(async { Ok(None) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_backend_never_acts() {
        let context = DecisionContext {
            agent_id: "char:golem".to_string(),
            agent_name: "Golem".to_string(),
            in_combat: false,
            now_ms: 0,
            recent_events: Vec::new(),
            recent_outputs: Vec::new(),
        };
        let outcome = NullBackend.decide(context).await.expect("never fails");
        assert!(outcome.is_none());
    }
}
