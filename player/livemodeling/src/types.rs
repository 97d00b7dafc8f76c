/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

use common::livemodeling::LiveModelingState;
use std::fmt;

// ========================================
// TRANSITION TABLE ENTRIES
// ========================================

/// Side-effecting workflow executed after a transition is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workflow {
    /// Fetch build-plan parameters and collect their values
    CollectParameters,
    /// Install, deploy and wait for the service-template instance
    Deploy,
    /// Refresh node-template instance states
    RefreshNodeStates,
    /// Terminate the running instance
    Terminate,
    /// Snapshot the topology, then replace the running instance
    Redeploy,
    /// Best-effort teardown after a failure
    Cleanup,
    /// Nothing to do
    Idle,
}

impl Workflow {
    /// Workflow run on entering `state`
    pub fn for_state(state: LiveModelingState) -> Self {
        match state {
            LiveModelingState::Init => Workflow::CollectParameters,
            LiveModelingState::Deploy => Workflow::Deploy,
            LiveModelingState::Update => Workflow::RefreshNodeStates,
            LiveModelingState::Terminate => Workflow::Terminate,
            LiveModelingState::Redeploy => Workflow::Redeploy,
            LiveModelingState::Error => Workflow::Cleanup,
            // entering DISABLED resets the session along with the state
            LiveModelingState::Disabled | LiveModelingState::Enabled => Workflow::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Workflow::CollectParameters => "collect_parameters",
            Workflow::Deploy => "deploy",
            Workflow::RefreshNodeStates => "refresh_node_states",
            Workflow::Terminate => "terminate",
            Workflow::Redeploy => "redeploy",
            Workflow::Cleanup => "cleanup",
            Workflow::Idle => "idle",
        }
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a permitted state transition
#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition {
    pub from_state: LiveModelingState,
    pub to_state: LiveModelingState,
    pub workflow: Workflow,
}

// ========================================
// TRANSITION RESULTS
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success,
    /// Requested state not reachable from the current one; the session moved to ERROR
    IllegalTransition,
    /// Controller task is gone
    Unavailable,
}

/// Outcome of one `set_state` request
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionResult {
    pub new_state: LiveModelingState,
    pub error_code: ErrorCode,
    pub message: String,
    pub workflow: Option<Workflow>,
    pub transition_id: String,
    pub error_details: String,
}

impl TransitionResult {
    /// Check if the transition was successful
    pub fn is_success(&self) -> bool {
        matches!(self.error_code, ErrorCode::Success)
    }

    /// Check if the transition failed
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }
}
