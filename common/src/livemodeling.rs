/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Live-modeling value types
//!
//! States of the live-modeling session, runtime states reported by the
//! container for service-template and node-template instances, build-plan
//! input parameters, and the advisory log entries surfaced to the sidebar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ========================================
// LIVE-MODELING SESSION STATES
// ========================================

/// Phase of a live-modeling session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiveModelingState {
    Disabled,
    Init,
    Deploy,
    Enabled,
    Redeploy,
    Update,
    Terminate,
    Error,
}

impl LiveModelingState {
    pub const ALL: [LiveModelingState; 8] = [
        LiveModelingState::Disabled,
        LiveModelingState::Init,
        LiveModelingState::Deploy,
        LiveModelingState::Enabled,
        LiveModelingState::Redeploy,
        LiveModelingState::Update,
        LiveModelingState::Terminate,
        LiveModelingState::Error,
    ];

    pub fn as_str_name(&self) -> &'static str {
        match self {
            LiveModelingState::Disabled => "DISABLED",
            LiveModelingState::Init => "INIT",
            LiveModelingState::Deploy => "DEPLOY",
            LiveModelingState::Enabled => "ENABLED",
            LiveModelingState::Redeploy => "REDEPLOY",
            LiveModelingState::Update => "UPDATE",
            LiveModelingState::Terminate => "TERMINATE",
            LiveModelingState::Error => "ERROR",
        }
    }

    pub fn from_str_name(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str_name() == value.trim().to_ascii_uppercase())
    }

    /// States during which a service-template instance is expected to exist
    pub fn holds_instance(&self) -> bool {
        matches!(
            self,
            LiveModelingState::Enabled
                | LiveModelingState::Update
                | LiveModelingState::Redeploy
                | LiveModelingState::Terminate
        )
    }
}

impl fmt::Display for LiveModelingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str_name())
    }
}

// ========================================
// RUNTIME INSTANCE STATES
// ========================================

/// State of a node-template instance as reported by the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeInstanceState {
    Initial,
    Creating,
    Created,
    Configuring,
    Configured,
    Starting,
    Started,
    Stopping,
    Stopped,
    Deleting,
    Deleted,
    Error,
    Migrated,
}

impl NodeInstanceState {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            NodeInstanceState::Initial => "INITIAL",
            NodeInstanceState::Creating => "CREATING",
            NodeInstanceState::Created => "CREATED",
            NodeInstanceState::Configuring => "CONFIGURING",
            NodeInstanceState::Configured => "CONFIGURED",
            NodeInstanceState::Starting => "STARTING",
            NodeInstanceState::Started => "STARTED",
            NodeInstanceState::Stopping => "STOPPING",
            NodeInstanceState::Stopped => "STOPPED",
            NodeInstanceState::Deleting => "DELETING",
            NodeInstanceState::Deleted => "DELETED",
            NodeInstanceState::Error => "ERROR",
            NodeInstanceState::Migrated => "MIGRATED",
        }
    }

    pub fn from_str_name(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INITIAL" => Some(NodeInstanceState::Initial),
            "CREATING" => Some(NodeInstanceState::Creating),
            "CREATED" => Some(NodeInstanceState::Created),
            "CONFIGURING" => Some(NodeInstanceState::Configuring),
            "CONFIGURED" => Some(NodeInstanceState::Configured),
            "STARTING" => Some(NodeInstanceState::Starting),
            "STARTED" => Some(NodeInstanceState::Started),
            "STOPPING" => Some(NodeInstanceState::Stopping),
            "STOPPED" => Some(NodeInstanceState::Stopped),
            "DELETING" => Some(NodeInstanceState::Deleting),
            "DELETED" => Some(NodeInstanceState::Deleted),
            "ERROR" => Some(NodeInstanceState::Error),
            "MIGRATED" => Some(NodeInstanceState::Migrated),
            _ => None,
        }
    }
}

impl fmt::Display for NodeInstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str_name())
    }
}

/// State of a service-template instance as reported by the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceTemplateInstanceState {
    Initial,
    Creating,
    Created,
    Deleting,
    Deleted,
    Error,
    Migrating,
    Migrated,
}

impl ServiceTemplateInstanceState {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            ServiceTemplateInstanceState::Initial => "INITIAL",
            ServiceTemplateInstanceState::Creating => "CREATING",
            ServiceTemplateInstanceState::Created => "CREATED",
            ServiceTemplateInstanceState::Deleting => "DELETING",
            ServiceTemplateInstanceState::Deleted => "DELETED",
            ServiceTemplateInstanceState::Error => "ERROR",
            ServiceTemplateInstanceState::Migrating => "MIGRATING",
            ServiceTemplateInstanceState::Migrated => "MIGRATED",
        }
    }
}

impl fmt::Display for ServiceTemplateInstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str_name())
    }
}

/// Runtime state of one topology node within the running deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRuntimeState {
    pub node_id: String,
    pub state: NodeInstanceState,
}

// ========================================
// BUILD-PLAN INPUT PARAMETERS
// ========================================

/// Parameter of a build plan, as listed by the container and posted back on deploy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputParameter {
    pub name: String,
    #[serde(rename = "type", default = "InputParameter::default_type")]
    pub param_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl InputParameter {
    pub fn new(name: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            param_type: Self::default_type(),
            required,
            value: None,
        }
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    /// True when a required parameter carries no usable value
    pub fn is_missing_value(&self) -> bool {
        self.required
            && self
                .value
                .as_deref()
                .map(|v| v.trim().is_empty())
                .unwrap_or(true)
    }

    fn default_type() -> String {
        "String".to_string()
    }
}

// ========================================
// ADVISORY LOGS
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogSeverity {
    Info,
    Success,
    Warning,
    Danger,
}

/// Sidebar log entry; append-only and never read back by the workflows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveModelingLog {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub severity: LogSeverity,
}

impl LiveModelingLog {
    pub fn new(message: impl Into<String>, severity: LogSeverity) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            severity,
        }
    }
}

// ========================================
// POLL SETTINGS
// ========================================

/// Interval and timeout used by every poll of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveModelingSettings {
    pub timeout_ms: u64,
    pub interval_ms: u64,
}

impl LiveModelingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for LiveModelingSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            interval_ms: 1_000,
        }
    }
}
