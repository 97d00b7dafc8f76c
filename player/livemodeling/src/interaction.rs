/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! User-interaction collaborators
//!
//! The controller asks the UI for build-plan parameter values while
//! initializing; confirmation modals gate the destructive requests issued
//! from the UI.

use crate::error::{LiveModelingError, Result};
use common::livemodeling::InputParameter;
use std::collections::HashMap;

/// Collects build-plan parameter values from the user
#[async_trait::async_trait]
pub trait ParameterPrompt: Send + Sync {
    /// `None` when the user cancels
    async fn collect(&self, parameters: Vec<InputParameter>) -> Option<Vec<InputParameter>>;
}

#[async_trait::async_trait]
pub trait ConfirmModal: Send + Sync {
    async fn open_confirm_modal(&self, title: &str, content: &str) -> bool;
}

/// Every required parameter must carry a non-blank value
pub fn validate_input_parameters(parameters: &[InputParameter]) -> Result<()> {
    let missing: Vec<&str> = parameters
        .iter()
        .filter(|p| p.is_missing_value())
        .map(|p| p.name.as_str())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(LiveModelingError::Validation(format!(
            "missing value for {}",
            missing.join(", ")
        )))
    }
}

/// Prompt answering from a fixed set of values
#[derive(Debug, Clone, Default)]
pub struct PresetParameters {
    values: HashMap<String, String>,
    cancel: bool,
}

impl PresetParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }

    /// Behave like a user closing the dialog
    pub fn cancelled() -> Self {
        Self {
            cancel: true,
            ..Self::default()
        }
    }
}

#[async_trait::async_trait]
impl ParameterPrompt for PresetParameters {
    async fn collect(&self, parameters: Vec<InputParameter>) -> Option<Vec<InputParameter>> {
        if self.cancel {
            return None;
        }
        Some(
            parameters
                .into_iter()
                .map(|mut p| {
                    if let Some(value) = self.values.get(&p.name) {
                        p.value = Some(value.clone());
                    }
                    p
                })
                .collect(),
        )
    }
}

/// Modal that always gives the same answer
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

#[async_trait::async_trait]
impl ConfirmModal for FixedAnswer {
    async fn open_confirm_modal(&self, title: &str, _content: &str) -> bool {
        tracing::debug!(%title, answer = self.0, "confirmation");
        self.0
    }
}
