/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Live-modeling controller
//!
//! One controller task per editor session owns the transition table and the
//! workflows. Requests arrive over an mpsc channel and are handled strictly
//! one at a time: the request is checked against the table, the resulting
//! state is applied, and its workflow runs. Follow-up requests named by a
//! workflow are handled immediately, before the next queued request.
//!
//! Submitting a request through [`LiveModelingHandle`] cancels the
//! outstanding wait of the workflow in flight. That workflow stops without a
//! follow-up request and without an error, and the new request is evaluated
//! against the state reached so far.

use crate::change_detector::TopologySource;
use crate::error::LiveModelingError;
use crate::gateway::{ContainerApiClient, ContainerGateway};
use crate::interaction::{ConfirmModal, ParameterPrompt};
use crate::repository::{RepositoryClient, TopologyRepository};
use crate::state_machine::StateMachine;
use crate::store::{LiveModelingAction, LiveModelingSession, LiveModelingStore};
use crate::types::{ErrorCode, TransitionResult, Workflow};
use crate::workflow::WorkflowContext;
use common::livemodeling::{LiveModelingSettings, LiveModelingState, LogSeverity};
use common::setting::Settings;
use common::topology::ServiceTemplateRef;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
enum Command {
    SetState(LiveModelingState),
    Enable {
        container_url: String,
        template: ServiceTemplateRef,
    },
    Attach {
        container_url: String,
        template: ServiceTemplateRef,
        instance_id: String,
    },
}

struct Request {
    command: Command,
    reply: oneshot::Sender<TransitionResult>,
}

/// What follows a workflow
enum Next {
    Request(LiveModelingState),
    Fail(String),
    Settled,
}

/// Token of the request currently being handled
type InFlight = Arc<Mutex<CancellationToken>>;

fn cancel_in_flight(in_flight: &InFlight) {
    in_flight
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .cancel();
}

pub struct LiveModelingController {
    context: WorkflowContext,
    state_machine: StateMachine,
    receiver: mpsc::UnboundedReceiver<Request>,
    in_flight: InFlight,
}

impl LiveModelingController {
    /// Creates a controller and the handle used to talk to it
    ///
    /// The controller does nothing until [`run`](Self::run) is awaited.
    pub fn new(
        gateway: Arc<dyn ContainerGateway>,
        repository: Arc<dyn TopologyRepository>,
        topology: Arc<dyn TopologySource>,
        prompt: Arc<dyn ParameterPrompt>,
        settings: LiveModelingSettings,
    ) -> (Self, LiveModelingHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let store = LiveModelingStore::new(settings);
        let in_flight: InFlight = Arc::new(Mutex::new(CancellationToken::new()));

        let controller = Self {
            context: WorkflowContext {
                gateway,
                repository,
                topology,
                prompt,
                store: store.clone(),
            },
            state_machine: StateMachine::new(),
            receiver,
            in_flight: Arc::clone(&in_flight),
        };
        let handle = LiveModelingHandle {
            sender,
            in_flight,
            store,
        };
        (controller, handle)
    }

    /// Spawns a controller wired to the container and backend named in `settings`
    pub fn spawn_from_settings(
        settings: &Settings,
        topology: Arc<dyn TopologySource>,
        prompt: Arc<dyn ParameterPrompt>,
    ) -> LiveModelingHandle {
        let gateway = Arc::new(ContainerApiClient::with_container_url(
            &settings.container.url,
        ));
        let repository = Arc::new(RepositoryClient::new(&settings.backend.url));
        let (controller, handle) = Self::new(
            gateway,
            repository,
            topology,
            prompt,
            settings.live_modeling,
        );
        tokio::spawn(controller.run());
        handle
    }

    /// Main processing loop; ends when every handle is dropped
    pub async fn run(mut self) {
        tracing::info!("live modeling controller started");
        while let Some(request) = self.receiver.recv().await {
            let result = self.process(request.command).await;
            if request.reply.send(result).is_err() {
                tracing::debug!("requester went away before the reply");
            }
        }
        tracing::info!("live modeling controller stopped");
    }

    async fn process(&mut self, command: Command) -> TransitionResult {
        let cancel = CancellationToken::new();
        {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *in_flight = cancel.clone();
        }

        let requested = self.prepare(command);
        let result = self.apply(requested);

        let mut next = self.execute(result.workflow, &cancel).await;
        loop {
            let follow_up = match next {
                Next::Request(target) => self.apply(target),
                Next::Fail(reason) => self.fail(&reason),
                Next::Settled => break,
            };
            next = self.execute(follow_up.workflow, &cancel).await;
        }
        result
    }

    /// Record the identifiers carried by `command` and return the state it requests
    ///
    /// Identifiers are only recorded when the request is legal, so an illegal
    /// enable or attach cannot overwrite the data of a running session.
    fn prepare(&self, command: Command) -> LiveModelingState {
        let current = self.context.store.state();
        match command {
            Command::SetState(state) => state,
            Command::Enable {
                container_url,
                template,
            } => {
                if self
                    .state_machine
                    .is_allowed(current, LiveModelingState::Init)
                {
                    self.record_target(&container_url, template);
                }
                LiveModelingState::Init
            }
            Command::Attach {
                container_url,
                template,
                instance_id,
            } => {
                if self
                    .state_machine
                    .is_allowed(current, LiveModelingState::Update)
                {
                    self.record_target(&container_url, template);
                    self.context.store.dispatch(
                        LiveModelingAction::SetCurrentServiceTemplateInstanceId(Some(instance_id)),
                    );
                }
                LiveModelingState::Update
            }
        }
    }

    fn record_target(&self, container_url: &str, template: ServiceTemplateRef) {
        self.context.gateway.set_container_url(container_url);
        let store = &self.context.store;
        store.dispatch(LiveModelingAction::SetContainerUrl(Some(
            container_url.to_string(),
        )));
        store.dispatch(LiveModelingAction::SetCurrentServiceTemplate(template));
    }

    /// Check `requested` against the table and move the session
    fn apply(&self, requested: LiveModelingState) -> TransitionResult {
        let store = &self.context.store;
        let current = store.state();
        let result = self.state_machine.evaluate(current, requested);

        if result.is_success() {
            tracing::info!(
                from = %current,
                to = %result.new_state,
                transition_id = %result.transition_id,
                "live modeling transition"
            );
        } else {
            tracing::error!(
                from = %current,
                requested = %requested,
                details = %result.error_details,
                "illegal live modeling transition"
            );
            let error = LiveModelingError::IllegalTransition {
                from: current,
                to: requested,
            };
            store.dispatch(LiveModelingAction::SetLastError(Some(error.to_string())));
            store.dispatch(LiveModelingAction::log(error.to_string(), LogSeverity::Danger));
        }
        let action = match result.new_state {
            LiveModelingState::Disabled => LiveModelingAction::Reset,
            state => LiveModelingAction::SetState(state),
        };
        store.dispatch(action);
        result
    }

    /// Move to ERROR after a failed workflow
    fn fail(&self, reason: &str) -> TransitionResult {
        let current = self.context.store.state();
        let result = self.state_machine.failure(current, reason);
        tracing::warn!(
            from = %current,
            transition_id = %result.transition_id,
            "live modeling entering ERROR"
        );
        self.context
            .store
            .dispatch(LiveModelingAction::SetState(result.new_state));
        result
    }

    /// Run a workflow and turn its outcome into what happens next
    async fn execute(&self, workflow: Option<Workflow>, cancel: &CancellationToken) -> Next {
        let Some(workflow) = workflow else {
            return Next::Settled;
        };
        match self.context.run(workflow, cancel).await {
            Ok(Some(target)) => Next::Request(target),
            Ok(None) => Next::Settled,
            Err(e) if e.is_superseded() => {
                tracing::info!(%workflow, "workflow superseded by a newer request");
                Next::Settled
            }
            Err(e) => {
                tracing::error!(%workflow, error = %e, "workflow failed");
                let store = &self.context.store;
                store.dispatch(LiveModelingAction::SetLastError(Some(e.to_string())));
                store.dispatch(LiveModelingAction::log(
                    format!("Live modeling {workflow} failed: {e}"),
                    LogSeverity::Danger,
                ));
                Next::Fail(e.to_string())
            }
        }
    }
}

/// Cloneable entry point for the UI
#[derive(Clone)]
pub struct LiveModelingHandle {
    sender: mpsc::UnboundedSender<Request>,
    in_flight: InFlight,
    store: LiveModelingStore,
}

impl LiveModelingHandle {
    /// Request a state change
    ///
    /// Resolves once the request and every follow-up it triggers have settled,
    /// or once a newer request superseded them.
    pub async fn set_state(&self, state: LiveModelingState) -> TransitionResult {
        self.submit(Command::SetState(state)).await
    }

    /// Start live modeling of `template` against the container at `container_url`
    pub async fn enable(&self, container_url: &str, template: ServiceTemplateRef) -> TransitionResult {
        self.submit(Command::Enable {
            container_url: container_url.to_string(),
            template,
        })
        .await
    }

    /// Resume live modeling of an instance that is already running
    pub async fn attach(
        &self,
        container_url: &str,
        template: ServiceTemplateRef,
        instance_id: &str,
    ) -> TransitionResult {
        self.submit(Command::Attach {
            container_url: container_url.to_string(),
            template,
            instance_id: instance_id.to_string(),
        })
        .await
    }

    pub async fn disable(&self) -> TransitionResult {
        self.set_state(LiveModelingState::Disabled).await
    }

    /// Ask for confirmation first; `None` when the user declined
    pub async fn confirm_and_set_state(
        &self,
        modal: &dyn ConfirmModal,
        title: &str,
        content: &str,
        state: LiveModelingState,
    ) -> Option<TransitionResult> {
        if !modal.open_confirm_modal(title, content).await {
            tracing::debug!(%state, "request declined by user");
            return None;
        }
        Some(self.set_state(state).await)
    }

    /// Poll settings for subsequent waits
    pub fn set_settings(&self, settings: LiveModelingSettings) {
        self.store.dispatch(LiveModelingAction::SetSettings(settings));
    }

    pub fn clear_logs(&self) {
        self.store.dispatch(LiveModelingAction::ClearLogs);
    }

    pub fn state(&self) -> LiveModelingState {
        self.store.state()
    }

    pub fn snapshot(&self) -> LiveModelingSession {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveModelingSession> {
        self.store.subscribe()
    }

    async fn submit(&self, command: Command) -> TransitionResult {
        cancel_in_flight(&self.in_flight);

        let (reply, response) = oneshot::channel();
        if self.sender.send(Request { command, reply }).is_err() {
            return self.unavailable();
        }
        response.await.unwrap_or_else(|_| self.unavailable())
    }

    fn unavailable(&self) -> TransitionResult {
        TransitionResult {
            new_state: self.store.state(),
            error_code: ErrorCode::Unavailable,
            message: LiveModelingError::ControllerStopped.to_string(),
            workflow: None,
            transition_id: String::new(),
            error_details: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_detector::TopologyTracker;
    use crate::gateway::MockContainerGateway;
    use crate::interaction::{FixedAnswer, PresetParameters};
    use crate::repository::MockRepository;
    use common::livemodeling::{InputParameter, NodeInstanceState, NodeRuntimeState};
    use common::topology::{NodeTemplate, TopologyTemplate};
    use std::time::Duration;

    const CONTAINER: &str = "http://container:1337";

    fn template() -> ServiceTemplateRef {
        ServiceTemplateRef::new("http://example.org/apps", "App")
    }

    fn topology(node_ids: &[&str]) -> Arc<TopologyTracker> {
        Arc::new(TopologyTracker::new(TopologyTemplate {
            node_templates: node_ids
                .iter()
                .map(|id| NodeTemplate::new(id, "{ns}Component"))
                .collect(),
            relationship_templates: vec![],
        }))
    }

    fn fast_settings() -> LiveModelingSettings {
        LiveModelingSettings {
            timeout_ms: 500,
            interval_ms: 10,
        }
    }

    fn start(
        gateway: Arc<MockContainerGateway>,
        repository: Arc<MockRepository>,
        topology: Arc<TopologyTracker>,
        prompt: PresetParameters,
    ) -> LiveModelingHandle {
        let (controller, handle) = LiveModelingController::new(
            gateway,
            repository,
            topology,
            Arc::new(prompt),
            fast_settings(),
        );
        tokio::spawn(controller.run());
        handle
    }

    fn has_log(session: &LiveModelingSession, severity: LogSeverity) -> bool {
        session.logs.iter().any(|log| log.severity == severity)
    }

    #[tokio::test]
    async fn test_illegal_requests_end_in_error() {
        let state_machine = StateMachine::new();

        for current in LiveModelingState::ALL {
            for requested in LiveModelingState::ALL {
                if state_machine.is_allowed(current, requested) {
                    continue;
                }
                let (controller, handle) = LiveModelingController::new(
                    Arc::new(MockContainerGateway::new()),
                    Arc::new(MockRepository::new()),
                    topology(&["n1"]),
                    Arc::new(PresetParameters::new()),
                    fast_settings(),
                );
                handle
                    .store
                    .dispatch(LiveModelingAction::SetState(current));
                tokio::spawn(controller.run());

                let result = handle.set_state(requested).await;
                assert_eq!(result.error_code, ErrorCode::IllegalTransition);
                assert_eq!(result.new_state, LiveModelingState::Error);

                let session = handle.snapshot();
                assert_eq!(session.state, LiveModelingState::Error, "{current} -> {requested}");
                assert!(session.last_error.is_some());
                assert!(has_log(&session, LogSeverity::Danger));
            }
        }
    }

    #[tokio::test]
    async fn test_install_failure_leaves_no_instance() {
        let gateway = Arc::new(MockContainerGateway::new().fail_on("install_application"));
        let handle = start(
            gateway.clone(),
            Arc::new(MockRepository::new()),
            topology(&["n1"]),
            PresetParameters::new(),
        );

        let result = handle.enable(CONTAINER, template()).await;
        assert!(result.is_success());

        let session = handle.snapshot();
        assert_eq!(session.state, LiveModelingState::Error);
        assert_eq!(session.current_service_template_instance_id, None);
        assert!(session.last_error.is_some());
        assert!(has_log(&session, LogSeverity::Danger));
        assert_eq!(gateway.count("deploy_service_template_instance"), 0);
        assert_eq!(gateway.container_url().as_deref(), Some(CONTAINER));
    }

    #[tokio::test]
    async fn test_init_cancelled_by_user_disables() {
        let gateway = Arc::new(
            MockContainerGateway::new()
                .with_required_parameters(vec![InputParameter::new("size", true)]),
        );
        let handle = start(
            gateway.clone(),
            Arc::new(MockRepository::new()),
            topology(&["n1"]),
            PresetParameters::cancelled(),
        );

        handle.enable(CONTAINER, template()).await;
        let session = handle.snapshot();
        assert_eq!(session.state, LiveModelingState::Disabled);
        assert_eq!(gateway.count("deploy_service_template_instance"), 0);
    }

    #[tokio::test]
    async fn test_init_with_missing_value_disables() {
        let gateway = Arc::new(
            MockContainerGateway::new()
                .with_required_parameters(vec![InputParameter::new("size", true)]),
        );
        let handle = start(
            gateway.clone(),
            Arc::new(MockRepository::new()),
            topology(&["n1"]),
            PresetParameters::new(),
        );

        handle.enable(CONTAINER, template()).await;
        let session = handle.snapshot();
        assert_eq!(session.state, LiveModelingState::Disabled);
        assert!(has_log(&session, LogSeverity::Warning));
        assert_eq!(gateway.count("deploy_service_template_instance"), 0);
    }

    #[tokio::test]
    async fn test_init_parameter_fetch_failure_disables() {
        let gateway = Arc::new(
            MockContainerGateway::new().fail_on("get_required_build_plan_input_parameters"),
        );
        let handle = start(
            gateway,
            Arc::new(MockRepository::new()),
            topology(&["n1"]),
            PresetParameters::new(),
        );

        handle.enable(CONTAINER, template()).await;
        let session = handle.snapshot();
        assert_eq!(session.state, LiveModelingState::Disabled);
        assert!(has_log(&session, LogSeverity::Danger));
    }

    #[tokio::test]
    async fn test_terminate_clears_runtime_state() {
        let gateway = Arc::new(
            MockContainerGateway::new()
                .with_running_instance("x")
                .with_node_state("n1", NodeInstanceState::Started),
        );
        let handle = start(
            gateway.clone(),
            Arc::new(MockRepository::new()),
            topology(&["n1"]),
            PresetParameters::new(),
        );

        handle.attach(CONTAINER, template(), "x").await;
        let session = handle.snapshot();
        assert_eq!(session.state, LiveModelingState::Enabled);
        assert_eq!(session.current_service_template_instance_id.as_deref(), Some("x"));
        assert_eq!(session.node_state("n1"), Some(NodeInstanceState::Started));

        let result = handle.set_state(LiveModelingState::Terminate).await;
        assert!(result.is_success());

        let session = handle.snapshot();
        assert_eq!(session.state, LiveModelingState::Disabled);
        assert_eq!(session.current_service_template_instance_id, None);
        assert!(session.node_templates_data.is_empty());
        assert_eq!(gateway.count("terminate_service_template_instance"), 1);
    }

    #[tokio::test]
    async fn test_update_isolates_node_failures() {
        let gateway = Arc::new(
            MockContainerGateway::new()
                .with_running_instance("i1")
                .with_node_state("web", NodeInstanceState::Started)
                .fail_node("db"),
        );
        let handle = start(
            gateway,
            Arc::new(MockRepository::new()),
            topology(&["web", "db"]),
            PresetParameters::new(),
        );

        handle.attach(CONTAINER, template(), "i1").await;
        let session = handle.snapshot();
        assert_eq!(session.state, LiveModelingState::Enabled);
        assert_eq!(session.node_state("web"), Some(NodeInstanceState::Started));
        assert_eq!(session.node_state("db"), None);
        assert_eq!(session.unreachable_nodes, vec!["db".to_string()]);
        assert!(has_log(&session, LogSeverity::Warning));
        assert!(!has_log(&session, LogSeverity::Danger));
    }

    #[tokio::test]
    async fn test_update_without_instance_fails() {
        let handle = start(
            Arc::new(MockContainerGateway::new()),
            Arc::new(MockRepository::new()),
            topology(&["n1"]),
            PresetParameters::new(),
        );

        let result = handle.set_state(LiveModelingState::Update).await;
        assert!(result.is_success());
        assert_eq!(handle.state(), LiveModelingState::Error);
    }

    #[tokio::test]
    async fn test_redeploy_replaces_running_instance() {
        let gateway = Arc::new(
            MockContainerGateway::new()
                .with_installed("App.csar")
                .with_running_instance("i1"),
        );
        let repository = Arc::new(MockRepository::new());
        let tracker = topology(&["web"]);
        let handle = start(
            gateway.clone(),
            repository.clone(),
            tracker.clone(),
            PresetParameters::new(),
        );

        handle.attach(CONTAINER, template(), "i1").await;
        assert_eq!(handle.state(), LiveModelingState::Enabled);

        let result = handle.set_state(LiveModelingState::Redeploy).await;
        assert!(result.is_success());

        let session = handle.snapshot();
        assert_eq!(session.state, LiveModelingState::Enabled);
        assert_eq!(session.current_csar_id.as_deref(), Some("LiveModeling_1.csar"));
        assert_eq!(session.current_service_template_instance_id.as_deref(), Some("i1"));
        assert_eq!(repository.get_calls(), vec!["create_live_modeling_service_template:web"]);
        assert!(tracker.last_deployed().is_some());

        let calls = gateway.get_calls();
        let position = |call: &str| calls.iter().position(|c| c == call);
        let install = position("install_application:LiveModeling_1.csar").unwrap();
        let terminate = position("terminate_service_template_instance:App.csar:i1").unwrap();
        let deploy = position("deploy_service_template_instance:LiveModeling_1.csar").unwrap();
        assert!(install < terminate && terminate < deploy);
    }

    #[tokio::test]
    async fn test_error_cleanup_failure_keeps_instance() {
        let gateway = Arc::new(
            MockContainerGateway::new()
                .with_running_instance("i1")
                .fail_on("terminate_service_template_instance"),
        );
        let handle = start(
            gateway,
            Arc::new(MockRepository::new()),
            topology(&["n1"]),
            PresetParameters::new(),
        );
        handle.attach(CONTAINER, template(), "i1").await;

        let result = handle.set_state(LiveModelingState::Deploy).await;
        assert_eq!(result.error_code, ErrorCode::IllegalTransition);

        let session = handle.snapshot();
        assert_eq!(session.state, LiveModelingState::Error);
        assert_eq!(session.current_service_template_instance_id.as_deref(), Some("i1"));
        assert!(has_log(&session, LogSeverity::Warning));

        handle.disable().await;
        let session = handle.snapshot();
        assert_eq!(session.state, LiveModelingState::Disabled);
        assert_eq!(session.current_service_template_instance_id, None);
        assert!(!session.logs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_request_supersedes_running_poll() {
        let gateway = Arc::new(MockContainerGateway::new().with_instance_never_created());
        let (controller, handle) = LiveModelingController::new(
            gateway.clone(),
            Arc::new(MockRepository::new()),
            topology(&["n1"]),
            Arc::new(PresetParameters::new()),
            LiveModelingSettings {
                timeout_ms: 600_000,
                interval_ms: 10,
            },
        );
        tokio::spawn(controller.run());

        let enabling = tokio::spawn({
            let handle = handle.clone();
            async move { handle.enable(CONTAINER, template()).await }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(handle.state(), LiveModelingState::Deploy);

        let result = handle.set_state(LiveModelingState::Disabled).await;
        let first = enabling.await.unwrap();
        assert!(first.is_success());
        assert_eq!(first.new_state, LiveModelingState::Init);

        // DEPLOY does not accept DISABLED; the cleanup removes the half-created instance
        assert_eq!(result.error_code, ErrorCode::IllegalTransition);
        let session = handle.snapshot();
        assert_eq!(session.state, LiveModelingState::Error);
        assert_eq!(session.current_service_template_instance_id, None);
        assert_eq!(gateway.count("terminate_service_template_instance"), 1);
        assert!(!session
            .logs
            .iter()
            .any(|log| log.message.starts_with("Live modeling deploy failed")));
    }

    #[tokio::test]
    async fn test_declined_confirmation_issues_no_request() {
        let handle = start(
            Arc::new(MockContainerGateway::new().with_running_instance("i1")),
            Arc::new(MockRepository::new()),
            topology(&["n1"]),
            PresetParameters::new(),
        );
        handle.attach(CONTAINER, template(), "i1").await;

        let declined = handle
            .confirm_and_set_state(
                &FixedAnswer(false),
                "Terminate",
                "Terminate the running instance?",
                LiveModelingState::Terminate,
            )
            .await;
        assert!(declined.is_none());
        assert_eq!(handle.state(), LiveModelingState::Enabled);

        let accepted = handle
            .confirm_and_set_state(
                &FixedAnswer(true),
                "Terminate",
                "Terminate the running instance?",
                LiveModelingState::Terminate,
            )
            .await;
        assert!(accepted.is_some_and(|r| r.is_success()));
        assert_eq!(handle.state(), LiveModelingState::Disabled);
    }

    #[tokio::test]
    async fn test_settings_and_logs_through_handle() {
        let handle = start(
            Arc::new(MockContainerGateway::new()),
            Arc::new(MockRepository::new()),
            topology(&[]),
            PresetParameters::new(),
        );
        let settings = LiveModelingSettings {
            timeout_ms: 1_000,
            interval_ms: 50,
        };
        handle.set_settings(settings);
        handle.set_state(LiveModelingState::Terminate).await;
        assert_eq!(handle.snapshot().settings, settings);
        assert!(!handle.snapshot().logs.is_empty());

        handle.clear_logs();
        assert!(handle.snapshot().logs.is_empty());
    }

    #[tokio::test]
    async fn test_stopped_controller_is_reported() {
        let (controller, handle) = LiveModelingController::new(
            Arc::new(MockContainerGateway::new()),
            Arc::new(MockRepository::new()),
            topology(&[]),
            Arc::new(PresetParameters::new()),
            fast_settings(),
        );
        drop(controller);

        let result = handle.set_state(LiveModelingState::Init).await;
        assert_eq!(result.error_code, ErrorCode::Unavailable);
        assert_eq!(result.new_state, LiveModelingState::Disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_install_starts_no_build_plan() {
        let gateway = Arc::new(
            MockContainerGateway::new().with_install_delay(Duration::from_millis(500)),
        );
        let handle = start(
            gateway.clone(),
            Arc::new(MockRepository::new()),
            topology(&["n1"]),
            PresetParameters::new(),
        );

        let enabling = tokio::spawn({
            let handle = handle.clone();
            async move { handle.enable(CONTAINER, template()).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.state(), LiveModelingState::Deploy);
        assert_eq!(gateway.count("install_application"), 1);

        handle.set_state(LiveModelingState::Update).await;
        enabling.await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let session = handle.snapshot();
        assert_eq!(gateway.count("deploy_service_template_instance"), 0);
        assert_eq!(session.state, LiveModelingState::Error);
        assert_eq!(session.current_service_template_instance_id, None);
        assert!(!session
            .logs
            .iter()
            .any(|log| log.message.starts_with("Live modeling deploy failed")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_redeploy_remains_undeployed() {
        let gateway = Arc::new(
            MockContainerGateway::new()
                .with_installed("App.csar")
                .with_running_instance("i1")
                .with_pending_instance_polls(5),
        );
        let repository = Arc::new(MockRepository::new());
        let tracker = topology(&["web"]);
        let handle = start(
            gateway,
            repository.clone(),
            tracker.clone(),
            PresetParameters::new(),
        );
        handle.attach(CONTAINER, template(), "i1").await;

        let redeploying = tokio::spawn({
            let handle = handle.clone();
            async move { handle.set_state(LiveModelingState::Redeploy).await }
        });
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(handle.state(), LiveModelingState::Redeploy);

        let mut edited = tracker.current_topology();
        edited.node_templates.push(NodeTemplate::new("db", "{ns}Database"));
        tracker.update_topology(edited.clone(), LiveModelingState::Redeploy);

        assert!(redeploying.await.unwrap().is_success());
        assert_eq!(handle.state(), LiveModelingState::Enabled);
        assert_eq!(repository.get_calls(), vec!["create_live_modeling_service_template:web"]);
        assert_eq!(
            tracker.last_deployed().map(|s| s.topology().node_ids()),
            Some(vec!["web".to_string()])
        );

        tracker.update_topology(edited, LiveModelingState::Enabled);
        assert!(tracker.deployment_changes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_creation_timeout_cleans_up_recorded_instance() {
        let gateway = Arc::new(
            MockContainerGateway::new()
                .with_installed("App.csar")
                .with_instance_id("i9")
                .with_instance_never_created(),
        );
        let handle = start(
            gateway.clone(),
            Arc::new(MockRepository::new()),
            topology(&["n1"]),
            PresetParameters::new(),
        );

        assert!(handle.enable(CONTAINER, template()).await.is_success());

        let session = handle.snapshot();
        assert_eq!(session.state, LiveModelingState::Error);
        assert!(session
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("not met within")));
        let calls = gateway.get_calls();
        assert_eq!(gateway.count("terminate_service_template_instance"), 1);
        assert_eq!(
            &calls[calls.len() - 2..],
            [
                "terminate_service_template_instance:App.csar:i9",
                "get_service_template_instance_state:App.csar:i9",
            ]
        );
        assert_eq!(session.current_service_template_instance_id, None);
        assert!(session.node_templates_data.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_instance_fails_without_waiting() {
        let gateway = Arc::new(
            MockContainerGateway::new()
                .with_installed("App.csar")
                .with_failed_instance(),
        );
        let (controller, handle) = LiveModelingController::new(
            gateway.clone(),
            Arc::new(MockRepository::new()),
            topology(&["n1"]),
            Arc::new(PresetParameters::new()),
            LiveModelingSettings {
                timeout_ms: 600_000,
                interval_ms: 10,
            },
        );
        tokio::spawn(controller.run());

        let started = tokio::time::Instant::now();
        handle.enable(CONTAINER, template()).await;
        assert!(started.elapsed() < Duration::from_secs(1));

        let session = handle.snapshot();
        assert_eq!(session.state, LiveModelingState::Error);
        assert!(session
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("entered ERROR")));
        assert_eq!(gateway.count("terminate_service_template_instance"), 1);
    }

    #[tokio::test]
    async fn test_redeploy_repository_failure_keeps_previous_template() {
        let gateway = Arc::new(MockContainerGateway::new().with_running_instance("i1"));
        let handle = start(
            gateway.clone(),
            Arc::new(MockRepository::failing()),
            topology(&["web"]),
            PresetParameters::new(),
        );
        handle.attach(CONTAINER, template(), "i1").await;

        assert!(handle.set_state(LiveModelingState::Redeploy).await.is_success());

        let session = handle.snapshot();
        assert_eq!(session.state, LiveModelingState::Error);
        assert_eq!(session.current_csar_id.as_deref(), Some("App.csar"));
        assert_eq!(session.current_service_template, Some(template()));
        assert!(session.last_error.is_some());
        assert_eq!(gateway.count("install_application"), 0);
        assert_eq!(gateway.count("deploy_service_template_instance"), 0);
        // cleanup tears down the instance that was running before
        assert!(gateway
            .get_calls()
            .contains(&"terminate_service_template_instance:App.csar:i1".to_string()));
        assert_eq!(session.current_service_template_instance_id, None);
    }

    #[tokio::test]
    async fn test_redeploy_install_failure_keeps_running_instance_for_cleanup() {
        let gateway = Arc::new(
            MockContainerGateway::new()
                .with_running_instance("i1")
                .fail_on("install_application"),
        );
        let handle = start(
            gateway.clone(),
            Arc::new(MockRepository::new()),
            topology(&["web"]),
            PresetParameters::new(),
        );
        handle.attach(CONTAINER, template(), "i1").await;

        handle.set_state(LiveModelingState::Redeploy).await;

        let session = handle.snapshot();
        assert_eq!(session.state, LiveModelingState::Error);
        assert_eq!(session.current_csar_id.as_deref(), Some("App.csar"));
        assert_eq!(gateway.count("deploy_service_template_instance"), 0);
        assert_eq!(gateway.count("terminate_service_template_instance"), 1);
        assert!(gateway
            .get_calls()
            .contains(&"terminate_service_template_instance:App.csar:i1".to_string()));
        assert_eq!(session.current_service_template_instance_id, None);
    }

    #[tokio::test]
    async fn test_redeploy_deploy_failure_after_termination() {
        let gateway = Arc::new(
            MockContainerGateway::new()
                .with_running_instance("i1")
                .fail_on("deploy_service_template_instance"),
        );
        let handle = start(
            gateway.clone(),
            Arc::new(MockRepository::new()),
            topology(&["web"]),
            PresetParameters::new(),
        );
        handle.attach(CONTAINER, template(), "i1").await;

        handle.set_state(LiveModelingState::Redeploy).await;

        let session = handle.snapshot();
        assert_eq!(session.state, LiveModelingState::Error);
        assert_eq!(session.current_csar_id.as_deref(), Some("LiveModeling_1.csar"));
        assert_eq!(
            session.current_service_template.as_ref().map(|t| t.id.as_str()),
            Some("LiveModeling_1")
        );
        assert_eq!(session.current_service_template_instance_id, None);
        assert!(session.node_templates_data.is_empty());
        assert_eq!(gateway.count("install_application"), 1);
        assert_eq!(gateway.count("terminate_service_template_instance"), 1);
        assert!(session.last_error.is_some());
    }

    #[tokio::test]
    async fn test_disabling_resets_with_the_state_change() {
        let (controller, handle) = LiveModelingController::new(
            Arc::new(MockContainerGateway::new()),
            Arc::new(MockRepository::new()),
            topology(&["n1"]),
            Arc::new(PresetParameters::new()),
            fast_settings(),
        );
        let store = &handle.store;
        store.dispatch(LiveModelingAction::SetState(LiveModelingState::Enabled));
        store.dispatch(LiveModelingAction::SetCurrentServiceTemplateInstanceId(Some(
            "i1".to_string(),
        )));
        store.dispatch(LiveModelingAction::SetNodeTemplateData(vec![
            NodeRuntimeState {
                node_id: "n1".to_string(),
                state: NodeInstanceState::Started,
            },
        ]));
        store.dispatch(LiveModelingAction::log("running", LogSeverity::Info));
        let mut receiver = handle.subscribe();
        receiver.borrow_and_update();

        let result = controller.apply(LiveModelingState::Disabled);
        assert!(result.is_success());
        assert_eq!(result.workflow, Some(Workflow::Idle));

        assert!(receiver.has_changed().unwrap());
        let session = receiver.borrow_and_update().clone();
        assert_eq!(session.state, LiveModelingState::Disabled);
        assert_eq!(session.current_service_template_instance_id, None);
        assert!(session.node_templates_data.is_empty());
        assert_eq!(session.logs.len(), 1);
    }
}
