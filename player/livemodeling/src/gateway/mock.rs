/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! In-memory container gateway for testing
//!
//! Simulates one container: installed CSARs, a build plan that yields a
//! configurable correlation id and instance id, instance-state progression and
//! per-node states. Every call is recorded in `calls` as `operation:args`.

use super::{filter_user_parameters, ContainerGateway, CsarUpload};
use crate::error::{GatewayError, GatewayErrorKind};
use common::livemodeling::{InputParameter, NodeInstanceState, ServiceTemplateInstanceState};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug)]
struct MockContainer {
    container_url: Option<String>,
    installed: HashSet<String>,
    required_parameters: Vec<InputParameter>,
    deployed_parameters: Vec<InputParameter>,
    correlation_id: String,
    instance_id: String,
    pending_instance_polls: u32,
    pending_state_polls: u32,
    never_created: bool,
    failed_instance: bool,
    install_delay: Option<Duration>,
    deployed: bool,
    terminated: bool,
    node_states: HashMap<String, NodeInstanceState>,
    failing_operations: HashSet<String>,
    failing_nodes: HashSet<String>,
}

/// Mock ContainerGateway for testing
pub struct MockContainerGateway {
    pub calls: Arc<Mutex<Vec<String>>>,
    container: Mutex<MockContainer>,
}

impl MockContainerGateway {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            container: Mutex::new(MockContainer {
                container_url: None,
                installed: HashSet::new(),
                required_parameters: Vec::new(),
                deployed_parameters: Vec::new(),
                correlation_id: "c1".to_string(),
                instance_id: "i1".to_string(),
                pending_instance_polls: 0,
                pending_state_polls: 0,
                never_created: false,
                failed_instance: false,
                install_delay: None,
                deployed: false,
                terminated: false,
                node_states: HashMap::new(),
                failing_operations: HashSet::new(),
                failing_nodes: HashSet::new(),
            }),
        }
    }

    pub fn with_installed(self, csar_id: &str) -> Self {
        self.container().installed.insert(csar_id.to_string());
        self
    }

    pub fn with_required_parameters(self, parameters: Vec<InputParameter>) -> Self {
        self.container().required_parameters = parameters;
        self
    }

    pub fn with_correlation_id(self, correlation_id: &str) -> Self {
        self.container().correlation_id = correlation_id.to_string();
        self
    }

    pub fn with_instance_id(self, instance_id: &str) -> Self {
        self.container().instance_id = instance_id.to_string();
        self
    }

    /// The instance id stays unavailable for the first `polls` lookups
    pub fn with_pending_instance_polls(self, polls: u32) -> Self {
        self.container().pending_instance_polls = polls;
        self
    }

    /// The instance reports CREATING for the first `polls` state queries
    pub fn with_pending_state_polls(self, polls: u32) -> Self {
        self.container().pending_state_polls = polls;
        self
    }

    /// The instance never leaves CREATING
    pub fn with_instance_never_created(self) -> Self {
        self.container().never_created = true;
        self
    }

    /// The build plan fails and the instance reports ERROR
    pub fn with_failed_instance(self) -> Self {
        self.container().failed_instance = true;
        self
    }

    /// Installing a CSAR takes `delay`
    pub fn with_install_delay(self, delay: Duration) -> Self {
        self.container().install_delay = Some(delay);
        self
    }

    /// Treat `instance_id` as an already running deployment
    pub fn with_running_instance(self, instance_id: &str) -> Self {
        {
            let mut container = self.container();
            container.instance_id = instance_id.to_string();
            container.deployed = true;
        }
        self
    }

    pub fn with_node_state(self, node_id: &str, state: NodeInstanceState) -> Self {
        self.container()
            .node_states
            .insert(node_id.to_string(), state);
        self
    }

    /// Make every call of `operation` fail with a 500
    pub fn fail_on(self, operation: &str) -> Self {
        self.container()
            .failing_operations
            .insert(operation.to_string());
        self
    }

    /// Make node-state queries for `node_id` fail
    pub fn fail_node(self, node_id: &str) -> Self {
        self.container().failing_nodes.insert(node_id.to_string());
        self
    }

    pub fn get_calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of recorded calls of `operation`
    pub fn count(&self, operation: &str) -> usize {
        self.get_calls()
            .iter()
            .filter(|call| call.split(':').next() == Some(operation))
            .count()
    }

    /// Parameters posted by the last deployment
    pub fn deployed_parameters(&self) -> Vec<InputParameter> {
        self.container().deployed_parameters.clone()
    }

    fn container(&self) -> MutexGuard<'_, MockContainer> {
        self.container
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, operation: &str, args: &[&str]) -> Result<(), GatewayError> {
        let call = if args.is_empty() {
            operation.to_string()
        } else {
            format!("{}:{}", operation, args.join(":"))
        };
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);

        if self.container().failing_operations.contains(operation) {
            return Err(GatewayError::http(500, format!("{operation} failed")));
        }
        Ok(())
    }

    fn check_instance(container: &MockContainer, instance_id: &str) -> Result<(), GatewayError> {
        if container.deployed && container.instance_id == instance_id {
            Ok(())
        } else {
            Err(GatewayError::new(
                GatewayErrorKind::NotFound,
                format!("unknown instance '{instance_id}'"),
            ))
        }
    }
}

impl Default for MockContainerGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ContainerGateway for MockContainerGateway {
    fn set_container_url(&self, url: &str) {
        self.container().container_url = Some(url.to_string());
    }

    fn container_url(&self) -> Option<String> {
        self.container().container_url.clone()
    }

    async fn is_application_installed(&self, csar_id: &str) -> Result<bool, GatewayError> {
        self.record("is_application_installed", &[csar_id])?;
        Ok(self.container().installed.contains(csar_id))
    }

    async fn install_application(&self, upload: &CsarUpload) -> Result<(), GatewayError> {
        self.record("install_application", &[&upload.name])?;
        let delay = self.container().install_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.container().installed.insert(upload.name.clone());
        Ok(())
    }

    async fn deploy_service_template_instance(
        &self,
        csar_id: &str,
        input_parameters: &[InputParameter],
    ) -> Result<String, GatewayError> {
        self.record("deploy_service_template_instance", &[csar_id])?;
        let mut container = self.container();
        container.deployed = true;
        container.terminated = false;
        container.deployed_parameters = input_parameters.to_vec();
        Ok(container.correlation_id.clone())
    }

    async fn get_service_template_instance_id_after_deployment(
        &self,
        csar_id: &str,
        correlation_id: &str,
    ) -> Result<Option<String>, GatewayError> {
        self.record(
            "get_service_template_instance_id_after_deployment",
            &[csar_id, correlation_id],
        )?;
        let mut container = self.container();
        if container.pending_instance_polls > 0 {
            container.pending_instance_polls -= 1;
            return Ok(None);
        }
        if container.deployed && container.correlation_id == correlation_id {
            Ok(Some(container.instance_id.clone()))
        } else {
            Ok(None)
        }
    }

    async fn get_service_template_instance_state(
        &self,
        csar_id: &str,
        instance_id: &str,
    ) -> Result<ServiceTemplateInstanceState, GatewayError> {
        self.record(
            "get_service_template_instance_state",
            &[csar_id, instance_id],
        )?;
        let mut container = self.container();
        Self::check_instance(&container, instance_id)?;
        if container.terminated {
            return Ok(ServiceTemplateInstanceState::Deleted);
        }
        if container.failed_instance {
            return Ok(ServiceTemplateInstanceState::Error);
        }
        if container.never_created {
            return Ok(ServiceTemplateInstanceState::Creating);
        }
        if container.pending_state_polls > 0 {
            container.pending_state_polls -= 1;
            return Ok(ServiceTemplateInstanceState::Creating);
        }
        Ok(ServiceTemplateInstanceState::Created)
    }

    async fn terminate_service_template_instance(
        &self,
        csar_id: &str,
        instance_id: &str,
    ) -> Result<(), GatewayError> {
        self.record(
            "terminate_service_template_instance",
            &[csar_id, instance_id],
        )?;
        let mut container = self.container();
        Self::check_instance(&container, instance_id)?;
        container.terminated = true;
        Ok(())
    }

    async fn get_node_template_instance_state(
        &self,
        csar_id: &str,
        instance_id: &str,
        node_id: &str,
    ) -> Result<NodeInstanceState, GatewayError> {
        self.record(
            "get_node_template_instance_state",
            &[csar_id, instance_id, node_id],
        )?;
        let container = self.container();
        if container.failing_nodes.contains(node_id) {
            return Err(GatewayError::http(
                503,
                format!("node '{node_id}' unreachable"),
            ));
        }
        Self::check_instance(&container, instance_id)?;
        Ok(container
            .node_states
            .get(node_id)
            .copied()
            .unwrap_or(NodeInstanceState::Started))
    }

    async fn set_node_template_instance_state(
        &self,
        csar_id: &str,
        instance_id: &str,
        node_id: &str,
        state: NodeInstanceState,
    ) -> Result<(), GatewayError> {
        self.record(
            "set_node_template_instance_state",
            &[csar_id, instance_id, node_id, state.as_str_name()],
        )?;
        let mut container = self.container();
        Self::check_instance(&container, instance_id)?;
        container.node_states.insert(node_id.to_string(), state);
        Ok(())
    }

    async fn get_required_build_plan_input_parameters(
        &self,
        csar_id: &str,
    ) -> Result<Vec<InputParameter>, GatewayError> {
        self.record("get_required_build_plan_input_parameters", &[csar_id])?;
        Ok(filter_user_parameters(
            self.container().required_parameters.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_calls() {
        let gateway = MockContainerGateway::new().with_installed("app.csar");
        assert!(gateway.is_application_installed("app.csar").await.unwrap());
        assert!(!gateway.is_application_installed("other.csar").await.unwrap());
        assert_eq!(
            gateway.get_calls(),
            vec![
                "is_application_installed:app.csar",
                "is_application_installed:other.csar"
            ]
        );
        assert_eq!(gateway.count("is_application_installed"), 2);
    }

    #[tokio::test]
    async fn test_mock_deployment_progression() {
        let gateway = MockContainerGateway::new()
            .with_instance_id("i7")
            .with_pending_instance_polls(1)
            .with_pending_state_polls(1);

        let correlation_id = gateway
            .deploy_service_template_instance("app.csar", &[])
            .await
            .unwrap();
        assert_eq!(
            gateway
                .get_service_template_instance_id_after_deployment("app.csar", &correlation_id)
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            gateway
                .get_service_template_instance_id_after_deployment("app.csar", &correlation_id)
                .await
                .unwrap()
                .as_deref(),
            Some("i7")
        );
        assert_eq!(
            gateway
                .get_service_template_instance_state("app.csar", "i7")
                .await
                .unwrap(),
            ServiceTemplateInstanceState::Creating
        );
        assert_eq!(
            gateway
                .get_service_template_instance_state("app.csar", "i7")
                .await
                .unwrap(),
            ServiceTemplateInstanceState::Created
        );

        gateway
            .terminate_service_template_instance("app.csar", "i7")
            .await
            .unwrap();
        assert_eq!(
            gateway
                .get_service_template_instance_state("app.csar", "i7")
                .await
                .unwrap(),
            ServiceTemplateInstanceState::Deleted
        );
    }

    #[tokio::test]
    async fn test_mock_failures() {
        let gateway = MockContainerGateway::new()
            .with_running_instance("i1")
            .fail_on("install_application")
            .fail_node("db");

        let err = gateway
            .install_application(&CsarUpload {
                url: "http://backend/x".into(),
                name: "app.csar".into(),
                overwrite: true,
            })
            .await
            .unwrap_err();
        assert_eq!(err.http_status, Some(500));

        assert!(gateway
            .get_node_template_instance_state("app.csar", "i1", "db")
            .await
            .is_err());
        assert_eq!(
            gateway
                .get_node_template_instance_state("app.csar", "i1", "web")
                .await
                .unwrap(),
            NodeInstanceState::Started
        );
    }
}
