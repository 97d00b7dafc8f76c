/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Live-modeling workflows
//!
//! Each workflow runs after the session has entered the state it belongs to.
//! It drives the gateway and the poller, records progress in the store, and
//! finishes by naming the state to request next (if any). Workflows never set
//! the session state themselves.
//!
//! A workflow error other than supersession is turned into an ERROR request by
//! the controller.
//!
//! Once the token is cancelled no further call with side effects on the
//! container or the backend is started. A build-plan or termination request
//! already on the wire is awaited, queries and installs are abandoned.

use crate::change_detector::TopologySource;
use crate::error::{GatewayError, LiveModelingError, PollError, Result};
use crate::gateway::ContainerGateway;
use crate::interaction::{validate_input_parameters, ParameterPrompt};
use crate::poller::Poller;
use crate::repository::TopologyRepository;
use crate::store::{LiveModelingAction, LiveModelingStore};
use crate::types::Workflow;
use common::livemodeling::{
    InputParameter, LiveModelingState, LogSeverity, NodeInstanceState, NodeRuntimeState,
    ServiceTemplateInstanceState,
};
use common::topology::{ServiceTemplateRef, TopologyTemplate};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Collaborators shared by all workflows
#[derive(Clone)]
pub struct WorkflowContext {
    pub gateway: Arc<dyn ContainerGateway>,
    pub repository: Arc<dyn TopologyRepository>,
    pub topology: Arc<dyn TopologySource>,
    pub prompt: Arc<dyn ParameterPrompt>,
    pub store: LiveModelingStore,
}

impl WorkflowContext {
    /// Run `workflow` and return the follow-up request
    pub async fn run(
        &self,
        workflow: Workflow,
        cancel: &CancellationToken,
    ) -> Result<Option<LiveModelingState>> {
        tracing::debug!(%workflow, "running workflow");
        match workflow {
            Workflow::CollectParameters => self.collect_parameters(cancel).await,
            Workflow::Deploy => self.deploy(cancel).await,
            Workflow::RefreshNodeStates => self.refresh_node_states(cancel).await,
            Workflow::Terminate => self.terminate(cancel).await,
            Workflow::Redeploy => self.redeploy(cancel).await,
            Workflow::Cleanup => self.cleanup(cancel).await,
            Workflow::Idle => Ok(None),
        }
    }

    // ========================================
    // INIT
    // ========================================

    async fn collect_parameters(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<LiveModelingState>> {
        let parameters = match cancellable(cancel, self.fetch_parameters()).await {
            Ok(parameters) => parameters,
            Err(e) if e.is_superseded() => return Err(e),
            Err(e) => {
                tracing::error!(error = %e, "could not fetch build plan parameters");
                self.log(
                    format!("Failed to fetch build plan parameters: {e}"),
                    LogSeverity::Danger,
                );
                self.store
                    .dispatch(LiveModelingAction::SetLastError(Some(e.to_string())));
                return Ok(Some(LiveModelingState::Disabled));
            }
        };
        self.store
            .dispatch(LiveModelingAction::SetBuildPlanInputParameters(
                parameters.clone(),
            ));

        if parameters.is_empty() {
            return Ok(Some(LiveModelingState::Deploy));
        }

        let answer = cancellable(cancel, async {
            Ok(self.prompt.collect(parameters).await)
        })
        .await?;
        let Some(values) = answer else {
            self.log("Live modeling start cancelled", LogSeverity::Info);
            return Ok(Some(LiveModelingState::Disabled));
        };

        if let Err(e) = validate_input_parameters(&values) {
            self.log(e.to_string(), LogSeverity::Warning);
            return Ok(Some(LiveModelingState::Disabled));
        }

        self.store
            .dispatch(LiveModelingAction::SetBuildPlanInputParameters(values));
        Ok(Some(LiveModelingState::Deploy))
    }

    async fn fetch_parameters(&self) -> Result<Vec<InputParameter>> {
        let csar_id = self.require_csar_id()?;
        self.log("Fetching build plan input parameters", LogSeverity::Info);
        Ok(self
            .gateway
            .get_required_build_plan_input_parameters(&csar_id)
            .await?)
    }

    // ========================================
    // DEPLOY
    // ========================================

    async fn deploy(&self, cancel: &CancellationToken) -> Result<Option<LiveModelingState>> {
        let session = self.store.snapshot();
        let csar_id = self.require_csar_id()?;
        let topology = self.topology.current_topology();

        self.ensure_installed(&csar_id, session.current_service_template.as_ref(), cancel)
            .await?;
        self.start_instance(&csar_id, &topology, cancel).await?;
        Ok(Some(LiveModelingState::Update))
    }

    async fn ensure_installed(
        &self,
        csar_id: &str,
        template: Option<&ServiceTemplateRef>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let installed = cancellable(cancel, async {
            self.gateway
                .is_application_installed(csar_id)
                .await
                .map_err(LiveModelingError::from)
        })
        .await?;
        if installed {
            self.log(format!("{csar_id} is already installed"), LogSeverity::Info);
            return Ok(());
        }

        let template = template.ok_or(LiveModelingError::MissingSessionData("service template"))?;
        let upload = self.repository.csar_upload(template);
        self.log(format!("Installing {csar_id}"), LogSeverity::Info);
        cancellable(cancel, async {
            self.gateway
                .install_application(&upload)
                .await
                .map_err(LiveModelingError::from)
        })
        .await?;
        self.log(format!("Installed {csar_id}"), LogSeverity::Success);
        Ok(())
    }

    /// Run the build plan for `topology` and wait until its instance is CREATED
    async fn start_instance(
        &self,
        csar_id: &str,
        topology: &TopologyTemplate,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_active(cancel)?;
        let parameters = self.store.snapshot().build_plan_input_parameters;
        let correlation_id = self
            .gateway
            .deploy_service_template_instance(csar_id, &parameters)
            .await?;
        tracing::info!(%csar_id, %correlation_id, "build plan started");
        self.log(
            format!("Deploying {csar_id} (correlation id {correlation_id})"),
            LogSeverity::Info,
        );

        let instance_id = self
            .wait_for_instance_id(csar_id, &correlation_id, cancel)
            .await?;
        tracing::info!(%csar_id, %instance_id, "service template instance created");

        if let Err(e) = self
            .wait_for_instance_state(
                csar_id,
                &instance_id,
                ServiceTemplateInstanceState::Created,
                cancel,
            )
            .await
        {
            // keep the id so the error cleanup can tear the instance down
            self.store
                .dispatch(LiveModelingAction::SetCurrentServiceTemplateInstanceId(
                    Some(instance_id),
                ));
            return Err(e);
        }

        let nodes = topology
            .node_ids()
            .into_iter()
            .map(|node_id| NodeRuntimeState {
                node_id,
                state: NodeInstanceState::Initial,
            })
            .collect();
        self.store
            .dispatch(LiveModelingAction::SetCurrentServiceTemplateInstanceId(
                Some(instance_id.clone()),
            ));
        self.store
            .dispatch(LiveModelingAction::SetNodeTemplateData(nodes));
        self.topology.mark_deployed(topology);
        self.log(
            format!("Service template instance {instance_id} is running"),
            LogSeverity::Success,
        );
        Ok(())
    }

    async fn wait_for_instance_id(
        &self,
        csar_id: &str,
        correlation_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let gateway = Arc::clone(&self.gateway);
        let csar = csar_id.to_string();
        let correlation = correlation_id.to_string();

        let found = self
            .poller()
            .poll_linked(
                move || {
                    let gateway = Arc::clone(&gateway);
                    let csar = csar.clone();
                    let correlation = correlation.clone();
                    async move {
                        gateway
                            .get_service_template_instance_id_after_deployment(&csar, &correlation)
                            .await
                    }
                },
                |instance_id: &Option<String>| instance_id.is_some(),
                cancel,
            )
            .join()
            .await?;

        found.ok_or_else(|| {
            GatewayError::malformed(format!(
                "no instance for correlation id {correlation_id}"
            ))
            .into()
        })
    }

    /// Poll until the instance reaches `target`; an instance entering ERROR fails fast
    async fn wait_for_instance_state(
        &self,
        csar_id: &str,
        instance_id: &str,
        target: ServiceTemplateInstanceState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let gateway = Arc::clone(&self.gateway);
        let csar = csar_id.to_string();
        let instance = instance_id.to_string();

        let reached = self
            .poller()
            .poll_linked(
                move || {
                    let gateway = Arc::clone(&gateway);
                    let csar = csar.clone();
                    let instance = instance.clone();
                    async move {
                        gateway
                            .get_service_template_instance_state(&csar, &instance)
                            .await
                    }
                },
                move |state: &ServiceTemplateInstanceState| {
                    *state == target || *state == ServiceTemplateInstanceState::Error
                },
                cancel,
            )
            .join()
            .await?;

        if reached != target {
            return Err(GatewayError::malformed(format!(
                "service template instance {instance_id} entered {reached} while waiting for {target}"
            ))
            .into());
        }
        Ok(())
    }

    // ========================================
    // UPDATE
    // ========================================

    async fn refresh_node_states(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<LiveModelingState>> {
        let session = self.store.snapshot();
        let csar_id = self.require_csar_id()?;
        let instance_id = session
            .current_service_template_instance_id
            .ok_or(LiveModelingError::MissingSessionData(
                "service template instance id",
            ))?;
        let node_ids = self.topology.current_topology().node_ids();

        let gateway = self.gateway.as_ref();
        let csar = csar_id.as_str();
        let instance = instance_id.as_str();
        let queries = node_ids.iter().map(|node_id| async move {
            let state = gateway
                .get_node_template_instance_state(csar, instance, node_id)
                .await;
            (node_id, state)
        });
        let results = cancellable(cancel, async { Ok(join_all(queries).await) }).await?;

        let mut unreachable = Vec::new();
        for (node_id, result) in results {
            match result {
                Ok(state) => self
                    .store
                    .dispatch(LiveModelingAction::UpdateNodeTemplateState(
                        NodeRuntimeState {
                            node_id: node_id.clone(),
                            state,
                        },
                    )),
                Err(e) => {
                    tracing::warn!(%node_id, error = %e, "node state query failed");
                    unreachable.push(node_id.clone());
                }
            }
        }

        if !unreachable.is_empty() {
            self.log(
                format!("Could not read the state of {}", unreachable.join(", ")),
                LogSeverity::Warning,
            );
        }
        self.store
            .dispatch(LiveModelingAction::SetUnreachableNodes(unreachable));
        Ok(Some(LiveModelingState::Enabled))
    }

    // ========================================
    // TERMINATE / REDEPLOY / ERROR
    // ========================================

    async fn terminate(&self, cancel: &CancellationToken) -> Result<Option<LiveModelingState>> {
        let session = self.store.snapshot();
        match session.current_service_template_instance_id {
            Some(instance_id) => {
                let csar_id = self.require_csar_id()?;
                self.stop_instance(&csar_id, &instance_id, cancel).await?;
            }
            None => self.log("No running instance to terminate", LogSeverity::Info),
        }
        Ok(Some(LiveModelingState::Disabled))
    }

    /// Terminate the instance, wait until DELETED and forget its runtime data
    async fn stop_instance(
        &self,
        csar_id: &str,
        instance_id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.log(
            format!("Terminating service template instance {instance_id}"),
            LogSeverity::Info,
        );
        ensure_active(cancel)?;
        self.gateway
            .terminate_service_template_instance(csar_id, instance_id)
            .await?;
        self.wait_for_instance_state(
            csar_id,
            instance_id,
            ServiceTemplateInstanceState::Deleted,
            cancel,
        )
        .await?;

        self.store.dispatch(LiveModelingAction::ClearNodeTemplateData);
        self.store
            .dispatch(LiveModelingAction::SetCurrentServiceTemplateInstanceId(None));
        self.log(
            format!("Service template instance {instance_id} terminated"),
            LogSeverity::Success,
        );
        Ok(())
    }

    async fn redeploy(&self, cancel: &CancellationToken) -> Result<Option<LiveModelingState>> {
        let session = self.store.snapshot();
        let topology = self.topology.current_topology();

        self.log("Saving topology for redeployment", LogSeverity::Info);
        let template = cancellable(cancel, async {
            self.repository
                .create_live_modeling_service_template(&topology)
                .await
                .map_err(LiveModelingError::from)
        })
        .await?;
        let csar_id = template.csar_id();
        tracing::info!(%csar_id, "redeploying");

        self.ensure_installed(&csar_id, Some(&template), cancel)
            .await?;

        if let (Some(previous_csar), Some(instance_id)) = (
            session.current_csar_id.as_deref(),
            session.current_service_template_instance_id.as_deref(),
        ) {
            self.stop_instance(previous_csar, instance_id, cancel)
                .await?;
        }

        self.store
            .dispatch(LiveModelingAction::SetCurrentServiceTemplate(template));
        self.start_instance(&csar_id, &topology, cancel).await?;
        Ok(Some(LiveModelingState::Update))
    }

    /// Best-effort teardown; failures are logged, never raised
    async fn cleanup(&self, cancel: &CancellationToken) -> Result<Option<LiveModelingState>> {
        let session = self.store.snapshot();
        let (Some(csar_id), Some(instance_id)) = (
            session.current_csar_id,
            session.current_service_template_instance_id,
        ) else {
            return Ok(None);
        };

        match self.stop_instance(&csar_id, &instance_id, cancel).await {
            Ok(()) => {}
            Err(e) if e.is_superseded() => return Err(e),
            Err(e) => {
                tracing::warn!(%instance_id, error = %e, "cleanup after error failed");
                self.log(
                    format!("Could not terminate instance {instance_id}: {e}"),
                    LogSeverity::Warning,
                );
            }
        }
        Ok(None)
    }

    // ========================================
    // HELPERS
    // ========================================

    fn poller(&self) -> Poller {
        Poller::from_settings(&self.store.snapshot().settings)
    }

    fn require_csar_id(&self) -> Result<String> {
        self.store
            .snapshot()
            .current_csar_id
            .ok_or(LiveModelingError::MissingSessionData("csar id"))
    }

    fn log(&self, message: impl Into<String>, severity: LogSeverity) {
        self.store
            .dispatch(LiveModelingAction::log(message, severity));
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(PollError::Cancelled.into());
    }
    Ok(())
}

/// Abandon `future` as soon as `cancel` fires
async fn cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PollError::Cancelled.into()),
        outcome = future => outcome,
    }
}
