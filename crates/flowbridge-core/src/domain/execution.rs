use crate::domain::correlation::{CorrelationId, ProcessingEvent};
use crate::domain::flow::FlowId;
use crate::types::Payload;
use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// State of a single flow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    /// Execution created
    Started,
    /// Resolving flow and adapters, checking preconditions
    ValidatingSource,
    /// Running conversion and the transformation pipeline
    Transforming,
    /// Forwarding the payload unchanged
    Passthrough,
    /// Delivering to the target adapter
    Sending,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
}

impl ExecutionState {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Completed | ExecutionState::Failed)
    }

    fn can_transition_to(&self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        match (self, next) {
            (s, Failed) => !s.is_terminal(),
            (Started, ValidatingSource) => true,
            (ValidatingSource, Transforming | Passthrough) => true,
            (Transforming | Passthrough, Sending) => true,
            // a filtered message ends without a send
            (Transforming, Completed) => true,
            (Sending, Completed) => true,
            _ => false,
        }
    }
}

/// Tracks the state machine of one execution
#[derive(Debug)]
pub struct FlowExecution {
    state: ExecutionState,
    visited: Vec<ExecutionState>,
    started: Instant,
}

impl Default for FlowExecution {
    fn default() -> Self {
        Self::start()
    }
}

impl FlowExecution {
    /// Begin in `STARTED`
    pub fn start() -> Self {
        Self {
            state: ExecutionState::Started,
            visited: vec![ExecutionState::Started],
            started: Instant::now(),
        }
    }

    /// Current state
    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Every state entered so far
    pub fn visited(&self) -> &[ExecutionState] {
        &self.visited
    }

    /// Milliseconds since start
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn advance(&mut self, next: ExecutionState) -> Result<(), CoreError> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::IllegalState(format!(
                "Execution cannot move from {:?} to {:?}",
                self.state, next
            )));
        }
        self.state = next;
        self.visited.push(next);
        Ok(())
    }

    /// Move to `FAILED` unless already terminal
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = ExecutionState::Failed;
            self.visited.push(ExecutionState::Failed);
        }
    }
}

/// What happened to the message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Delivered to the target; the target's response, if any
    Delivered {
        /// Target adapter response
        response: Option<Payload>,
    },
    /// Copied byte for byte without conversion or transformation
    DirectTransfer {
        /// Bytes transferred
        bytes: usize,
        /// Target adapter response
        response: Option<Payload>,
    },
    /// Intentionally dropped by a FILTER step; not an error
    Filtered {
        /// Step that dropped the message
        step: String,
        /// Why it was dropped
        reason: String,
    },
}

impl FlowOutcome {
    /// Target response, if the message was delivered
    pub fn response(&self) -> Option<&Payload> {
        match self {
            FlowOutcome::Delivered { response } | FlowOutcome::DirectTransfer { response, .. } => {
                response.as_ref()
            }
            FlowOutcome::Filtered { .. } => None,
        }
    }

    /// Whether a FILTER step dropped the message
    pub fn is_filtered(&self) -> bool {
        matches!(self, FlowOutcome::Filtered { .. })
    }
}

/// Result of a successful execution
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Execution correlation id
    pub correlation_id: CorrelationId,
    /// Flow that ran
    pub flow_id: FlowId,
    /// Outcome
    pub outcome: FlowOutcome,
    /// States entered, in order
    pub states: Vec<ExecutionState>,
    /// Size of the payload read from the source
    pub input_size: usize,
    /// Size of the payload handed to the target
    pub output_size: usize,
    /// Wall clock duration
    pub duration_ms: u64,
    /// Processing events recorded during the execution
    pub events: Vec<ProcessingEvent>,
}

/// Final outcome handed to the execution recorder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    /// Execution correlation id
    pub correlation_id: CorrelationId,
    /// Flow that ran
    pub flow_id: FlowId,
    /// Flow name
    pub flow_name: String,
    /// Final state
    pub state: ExecutionState,
    /// Source payload size
    pub input_size: usize,
    /// Target payload size
    pub output_size: usize,
    /// Wall clock duration
    pub duration_ms: u64,
    /// Error chain, outermost first
    pub error: Option<String>,
    /// Innermost error
    pub root_cause: Option<String>,
    /// Completion time
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_path() {
        let mut exec = FlowExecution::start();
        exec.advance(ExecutionState::ValidatingSource).unwrap();
        exec.advance(ExecutionState::Transforming).unwrap();
        exec.advance(ExecutionState::Sending).unwrap();
        exec.advance(ExecutionState::Completed).unwrap();
        assert_eq!(
            exec.visited(),
            &[
                ExecutionState::Started,
                ExecutionState::ValidatingSource,
                ExecutionState::Transforming,
                ExecutionState::Sending,
                ExecutionState::Completed,
            ]
        );
    }

    #[test]
    fn test_cannot_skip_validation() {
        let mut exec = FlowExecution::start();
        assert!(exec.advance(ExecutionState::Sending).is_err());
        assert_eq!(exec.state(), ExecutionState::Started);
    }

    #[test]
    fn test_failed_reachable_from_any_state() {
        let mut exec = FlowExecution::start();
        exec.advance(ExecutionState::ValidatingSource).unwrap();
        exec.fail();
        assert_eq!(exec.state(), ExecutionState::Failed);

        // terminal states stay put
        exec.fail();
        assert_eq!(exec.visited().len(), 3);
    }
}
