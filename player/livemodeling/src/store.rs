/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Live-modeling session store
//!
//! The session is only ever changed by dispatching a [`LiveModelingAction`];
//! each dispatch replaces the session atomically and notifies subscribers.

use common::livemodeling::{
    InputParameter, LiveModelingLog, LiveModelingSettings, LiveModelingState, LogSeverity,
    NodeInstanceState, NodeRuntimeState,
};
use common::topology::ServiceTemplateRef;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

/// State of one live-modeling session
#[derive(Debug, Clone, PartialEq)]
pub struct LiveModelingSession {
    pub state: LiveModelingState,
    pub container_url: Option<String>,
    pub current_service_template: Option<ServiceTemplateRef>,
    pub current_csar_id: Option<String>,
    pub current_service_template_instance_id: Option<String>,
    pub node_templates_data: BTreeMap<String, NodeRuntimeState>,
    pub build_plan_input_parameters: Vec<InputParameter>,
    pub logs: Vec<LiveModelingLog>,
    pub settings: LiveModelingSettings,
    /// Nodes whose state could not be read during the last refresh
    pub unreachable_nodes: Vec<String>,
    pub last_error: Option<String>,
}

impl LiveModelingSession {
    pub fn new(settings: LiveModelingSettings) -> Self {
        Self {
            state: LiveModelingState::Disabled,
            container_url: None,
            current_service_template: None,
            current_csar_id: None,
            current_service_template_instance_id: None,
            node_templates_data: BTreeMap::new(),
            build_plan_input_parameters: Vec::new(),
            logs: Vec::new(),
            settings,
            unreachable_nodes: Vec::new(),
            last_error: None,
        }
    }

    pub fn node_state(&self, node_id: &str) -> Option<NodeInstanceState> {
        self.node_templates_data.get(node_id).map(|n| n.state)
    }
}

impl Default for LiveModelingSession {
    fn default() -> Self {
        Self::new(LiveModelingSettings::default())
    }
}

/// Named mutations of the session
#[derive(Debug, Clone, PartialEq)]
pub enum LiveModelingAction {
    SetState(LiveModelingState),
    SetContainerUrl(Option<String>),
    /// Also sets the CSAR id derived from the template
    SetCurrentServiceTemplate(ServiceTemplateRef),
    SetCurrentCsarId(Option<String>),
    SetCurrentServiceTemplateInstanceId(Option<String>),
    SetNodeTemplateData(Vec<NodeRuntimeState>),
    UpdateNodeTemplateState(NodeRuntimeState),
    ClearNodeTemplateData,
    SetBuildPlanInputParameters(Vec<InputParameter>),
    SendLog(LiveModelingLog),
    ClearLogs,
    SetSettings(LiveModelingSettings),
    SetUnreachableNodes(Vec<String>),
    SetLastError(Option<String>),
    /// Back to initial values in DISABLED, keeping settings and logs
    Reset,
}

impl LiveModelingAction {
    pub fn log(message: impl Into<String>, severity: LogSeverity) -> Self {
        LiveModelingAction::SendLog(LiveModelingLog::new(message, severity))
    }
}

/// Apply `action` to `session`
pub fn reduce(session: &mut LiveModelingSession, action: LiveModelingAction) {
    match action {
        LiveModelingAction::SetState(state) => session.state = state,
        LiveModelingAction::SetContainerUrl(url) => session.container_url = url,
        LiveModelingAction::SetCurrentServiceTemplate(template) => {
            session.current_csar_id = Some(template.csar_id());
            session.current_service_template = Some(template);
        }
        LiveModelingAction::SetCurrentCsarId(csar_id) => session.current_csar_id = csar_id,
        LiveModelingAction::SetCurrentServiceTemplateInstanceId(instance_id) => {
            session.current_service_template_instance_id = instance_id
        }
        LiveModelingAction::SetNodeTemplateData(nodes) => {
            session.node_templates_data = nodes
                .into_iter()
                .map(|node| (node.node_id.clone(), node))
                .collect();
        }
        LiveModelingAction::UpdateNodeTemplateState(node) => {
            session
                .node_templates_data
                .insert(node.node_id.clone(), node);
        }
        LiveModelingAction::ClearNodeTemplateData => session.node_templates_data.clear(),
        LiveModelingAction::SetBuildPlanInputParameters(parameters) => {
            session.build_plan_input_parameters = parameters
        }
        LiveModelingAction::SendLog(log) => session.logs.push(log),
        LiveModelingAction::ClearLogs => session.logs.clear(),
        LiveModelingAction::SetSettings(settings) => session.settings = settings,
        LiveModelingAction::SetUnreachableNodes(nodes) => session.unreachable_nodes = nodes,
        LiveModelingAction::SetLastError(error) => session.last_error = error,
        LiveModelingAction::Reset => {
            let settings = session.settings;
            let logs = std::mem::take(&mut session.logs);
            *session = LiveModelingSession::new(settings);
            session.logs = logs;
        }
    }
}

/// Observable holder of the session
#[derive(Clone)]
pub struct LiveModelingStore {
    sender: Arc<watch::Sender<LiveModelingSession>>,
}

impl LiveModelingStore {
    pub fn new(settings: LiveModelingSettings) -> Self {
        let (sender, _) = watch::channel(LiveModelingSession::new(settings));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn dispatch(&self, action: LiveModelingAction) {
        tracing::trace!(?action, "dispatch");
        self.sender.send_modify(|session| reduce(session, action));
    }

    /// Copy of the current session
    pub fn snapshot(&self) -> LiveModelingSession {
        self.sender.borrow().clone()
    }

    pub fn state(&self) -> LiveModelingState {
        self.sender.borrow().state
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveModelingSession> {
        self.sender.subscribe()
    }
}

impl Default for LiveModelingStore {
    fn default() -> Self {
        Self::new(LiveModelingSettings::default())
    }
}
