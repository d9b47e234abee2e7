use std::fmt;

use crate::error::PluginError;

/// Hooks run once per job on the plugin template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobHook {
    BeforeAll,
    AfterAll,
}

/// Hooks run once per block on a worker-local plugin instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockHook {
    BeforeBlock,
    AfterBlock,
}

impl fmt::Display for JobHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobHook::BeforeAll => f.write_str("beforeAll"),
            JobHook::AfterAll => f.write_str("afterAll"),
        }
    }
}

impl fmt::Display for BlockHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockHook::BeforeBlock => f.write_str("beforeBlock"),
            BlockHook::AfterBlock => f.write_str("afterBlock"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Initialized,
    BeforeBlock,
    Executing,
    AfterBlock,
    ShutDown,
}

impl WorkerState {
    fn successor(self) -> Option<WorkerState> {
        match self {
            WorkerState::Created => Some(WorkerState::Initialized),
            WorkerState::Initialized => Some(WorkerState::BeforeBlock),
            WorkerState::BeforeBlock => Some(WorkerState::Executing),
            WorkerState::Executing => Some(WorkerState::AfterBlock),
            WorkerState::AfterBlock => Some(WorkerState::ShutDown),
            WorkerState::ShutDown => None,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Created => "Created",
            WorkerState::Initialized => "Initialized",
            WorkerState::BeforeBlock => "BeforeBlock",
            WorkerState::Executing => "Executing",
            WorkerState::AfterBlock => "AfterBlock",
            WorkerState::ShutDown => "ShutDown",
        };
        f.write_str(name)
    }
}

/// Tracks one worker instance through
/// `Created → Initialized → BeforeBlock → Executing → AfterBlock → ShutDown`.
///
/// Steps cannot be skipped. `ShutDown` is reachable from every state but
/// only once.
#[derive(Debug)]
pub struct WorkerLifecycle {
    state: WorkerState,
}

impl WorkerLifecycle {
    pub fn new() -> Self {
        Self {
            state: WorkerState::Created,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_shut_down(&self) -> bool {
        self.state == WorkerState::ShutDown
    }

    pub fn advance(&mut self, to: WorkerState) -> Result<(), PluginError> {
        let legal = match to {
            WorkerState::ShutDown => self.state != WorkerState::ShutDown,
            _ => self.state.successor() == Some(to),
        };

        if !legal {
            return Err(PluginError::IllegalTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }

        self.state = to;
        Ok(())
    }
}

impl Default for WorkerLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_sequence() {
        let mut lifecycle = WorkerLifecycle::new();
        for state in [
            WorkerState::Initialized,
            WorkerState::BeforeBlock,
            WorkerState::Executing,
            WorkerState::AfterBlock,
            WorkerState::ShutDown,
        ] {
            lifecycle.advance(state).unwrap();
        }
        assert!(lifecycle.is_shut_down());
    }

    #[test]
    fn test_skipping_is_rejected() {
        let mut lifecycle = WorkerLifecycle::new();
        lifecycle.advance(WorkerState::Initialized).unwrap();
        let err = lifecycle.advance(WorkerState::Executing).unwrap_err();
        assert!(matches!(
            err,
            PluginError::IllegalTransition { ref from, ref to }
                if from == "Initialized" && to == "Executing"
        ));
        assert_eq!(lifecycle.state(), WorkerState::Initialized);
    }

    #[test]
    fn test_shutdown_from_any_state_once() {
        let mut lifecycle = WorkerLifecycle::new();
        lifecycle.advance(WorkerState::ShutDown).unwrap();
        assert!(lifecycle.advance(WorkerState::ShutDown).is_err());
        assert!(lifecycle.advance(WorkerState::Initialized).is_err());

        let mut lifecycle = WorkerLifecycle::new();
        lifecycle.advance(WorkerState::Initialized).unwrap();
        lifecycle.advance(WorkerState::BeforeBlock).unwrap();
        lifecycle.advance(WorkerState::ShutDown).unwrap();
    }

    #[test]
    fn test_repeating_a_step_is_rejected() {
        let mut lifecycle = WorkerLifecycle::new();
        lifecycle.advance(WorkerState::Initialized).unwrap();
        assert!(lifecycle.advance(WorkerState::Initialized).is_err());
    }
}
