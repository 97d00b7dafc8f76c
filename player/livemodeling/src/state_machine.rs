/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Live-Modeling Transition Table
//!
//! Table-driven legality check for live-modeling state requests. Every
//! permitted `(current, requested)` pair is listed together with the workflow
//! that runs once the session has entered the requested state. A pair that is
//! missing from the table is a protocol violation and sends the session to
//! ERROR.
//!
//! ERROR is the reset point: any request is accepted from it.
//!
//! # Usage Example
//!
//! ```rust
//! use common::livemodeling::LiveModelingState;
//! use livemodeling::state_machine::StateMachine;
//!
//! let state_machine = StateMachine::new();
//! let result = state_machine.evaluate(LiveModelingState::Disabled, LiveModelingState::Init);
//! assert!(result.is_success());
//! ```

use crate::types::{ErrorCode, StateTransition, TransitionResult, Workflow};
use common::livemodeling::LiveModelingState;
use std::collections::HashMap;

pub struct StateMachine {
    /// Permitted transitions indexed by source state
    transition_table: HashMap<LiveModelingState, Vec<StateTransition>>,
}

impl StateMachine {
    /// Creates a new StateMachine with the live-modeling transition table
    pub fn new() -> Self {
        let mut state_machine = StateMachine {
            transition_table: HashMap::new(),
        };
        state_machine.initialize_transitions();
        state_machine
    }

    // ========================================
    // STATE TRANSITION TABLE INITIALIZATION
    // ========================================

    fn initialize_transitions(&mut self) {
        use LiveModelingState::*;

        let permitted: [(LiveModelingState, &[LiveModelingState]); 7] = [
            (Disabled, &[Init, Update]),
            (Init, &[Deploy, Disabled]),
            (Deploy, &[Update]),
            (Enabled, &[Redeploy, Update, Terminate, Disabled, Init]),
            (Redeploy, &[Update]),
            (Update, &[Enabled]),
            (Terminate, &[Disabled]),
        ];

        for (from_state, targets) in permitted {
            self.add_transitions(from_state, targets);
        }
        self.add_transitions(Error, &LiveModelingState::ALL);
    }

    fn add_transitions(&mut self, from_state: LiveModelingState, targets: &[LiveModelingState]) {
        let transitions = targets
            .iter()
            .map(|&to_state| StateTransition {
                from_state,
                to_state,
                workflow: Workflow::for_state(to_state),
            })
            .collect();
        self.transition_table.insert(from_state, transitions);
    }

    // ========================================
    // LOOKUP
    // ========================================

    pub fn find_transition(
        &self,
        from_state: LiveModelingState,
        to_state: LiveModelingState,
    ) -> Option<&StateTransition> {
        self.transition_table
            .get(&from_state)?
            .iter()
            .find(|t| t.to_state == to_state)
    }

    pub fn is_allowed(&self, from_state: LiveModelingState, to_state: LiveModelingState) -> bool {
        self.find_transition(from_state, to_state).is_some()
    }

    /// Targets reachable from `from_state`
    pub fn allowed_targets(&self, from_state: LiveModelingState) -> Vec<LiveModelingState> {
        self.transition_table
            .get(&from_state)
            .map(|transitions| transitions.iter().map(|t| t.to_state).collect())
            .unwrap_or_default()
    }

    /// Decide the state a request leads to
    ///
    /// # Arguments
    /// * `current` - state the session is in
    /// * `requested` - state asked for
    ///
    /// # Returns
    /// A successful result carrying the workflow to run, or an
    /// `IllegalTransition` result whose `new_state` is ERROR (with the cleanup
    /// workflow attached)
    pub fn evaluate(
        &self,
        current: LiveModelingState,
        requested: LiveModelingState,
    ) -> TransitionResult {
        let transition_id = Self::generate_transition_id(current, requested);

        match self.find_transition(current, requested) {
            Some(transition) => TransitionResult {
                new_state: transition.to_state,
                error_code: ErrorCode::Success,
                message: format!("Successfully transitioned to {}", transition.to_state),
                workflow: Some(transition.workflow),
                transition_id,
                error_details: String::new(),
            },
            None => TransitionResult {
                new_state: LiveModelingState::Error,
                error_code: ErrorCode::IllegalTransition,
                message: format!("Illegal transition from {current} to {requested}"),
                workflow: Some(Workflow::for_state(LiveModelingState::Error)),
                transition_id,
                error_details: format!(
                    "{} accepts only [{}]",
                    current,
                    self.allowed_targets(current)
                        .iter()
                        .map(|s| s.as_str_name())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            },
        }
    }

    /// Transition taken when the workflow of `current` fails
    ///
    /// A failing workflow always lands in ERROR, whatever the table says about
    /// `current`.
    pub fn failure(&self, current: LiveModelingState, reason: &str) -> TransitionResult {
        TransitionResult {
            new_state: LiveModelingState::Error,
            error_code: ErrorCode::Success,
            message: format!("Workflow of {current} failed"),
            workflow: Some(Workflow::for_state(LiveModelingState::Error)),
            transition_id: Self::generate_transition_id(current, LiveModelingState::Error),
            error_details: reason.to_string(),
        }
    }

    fn generate_transition_id(from: LiveModelingState, to: LiveModelingState) -> String {
        format!(
            "{}_{}_{}",
            from.as_str_name().to_lowercase(),
            to.as_str_name().to_lowercase(),
            chrono::Utc::now().timestamp_micros()
        )
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
