/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Orchestration gateway
//!
//! Translates live-modeling intents (install this CSAR, run its build plan,
//! read instance states, terminate) into calls against the container's
//! resource model of csars, plans, plan instances, service-template instances
//! and node-template instances.
//!
//! Implementations are stateless per call apart from the configured container
//! URL and never retry; waiting for side effects is the poller's job.

use crate::error::GatewayError;
use common::livemodeling::{InputParameter, NodeInstanceState, ServiceTemplateInstanceState};
use serde::{Deserialize, Serialize};

pub mod http_client;
pub mod mock;

pub use http_client::ContainerApiClient;
pub use mock::MockContainerGateway;

/// Build-plan parameters the container fills in itself
pub const HIDDEN_INPUT_PARAMETERS: [&str; 7] = [
    "CorrelationID",
    "csarID",
    "serviceTemplateID",
    "containerApiAddress",
    "instanceDataAPIUrl",
    "planCallbackAddress_invoker",
    "csarEntrypoint",
];

pub const BUILD_PLAN_TYPE: &str = "http://docs.oasis-open.org/tosca/ns/2011/12/PlanTypes/BuildPlan";
pub const TERMINATION_PLAN_TYPE: &str =
    "http://docs.oasis-open.org/tosca/ns/2011/12/PlanTypes/TerminationPlan";

/// Body of `POST /csars`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsarUpload {
    pub url: String,
    pub name: String,
    pub overwrite: bool,
}

/// Container operations used by the live-modeling workflows
#[async_trait::async_trait]
pub trait ContainerGateway: Send + Sync {
    /// Point the gateway at a container instance
    fn set_container_url(&self, url: &str);

    fn container_url(&self) -> Option<String>;

    async fn is_application_installed(&self, csar_id: &str) -> Result<bool, GatewayError>;

    async fn install_application(&self, upload: &CsarUpload) -> Result<(), GatewayError>;

    /// Start the build plan and return its correlation id
    async fn deploy_service_template_instance(
        &self,
        csar_id: &str,
        input_parameters: &[InputParameter],
    ) -> Result<String, GatewayError>;

    /// `Ok(None)` until the build plan has created its service-template instance
    async fn get_service_template_instance_id_after_deployment(
        &self,
        csar_id: &str,
        correlation_id: &str,
    ) -> Result<Option<String>, GatewayError>;

    async fn get_service_template_instance_state(
        &self,
        csar_id: &str,
        instance_id: &str,
    ) -> Result<ServiceTemplateInstanceState, GatewayError>;

    async fn terminate_service_template_instance(
        &self,
        csar_id: &str,
        instance_id: &str,
    ) -> Result<(), GatewayError>;

    async fn get_node_template_instance_state(
        &self,
        csar_id: &str,
        instance_id: &str,
        node_id: &str,
    ) -> Result<NodeInstanceState, GatewayError>;

    async fn set_node_template_instance_state(
        &self,
        csar_id: &str,
        instance_id: &str,
        node_id: &str,
        state: NodeInstanceState,
    ) -> Result<(), GatewayError>;

    /// Build-plan parameters the user has to supply, hidden ones removed
    async fn get_required_build_plan_input_parameters(
        &self,
        csar_id: &str,
    ) -> Result<Vec<InputParameter>, GatewayError>;
}

pub fn is_hidden_parameter(name: &str) -> bool {
    HIDDEN_INPUT_PARAMETERS.contains(&name)
}

/// Drop parameters the container injects on its own
pub fn filter_user_parameters(parameters: Vec<InputParameter>) -> Vec<InputParameter> {
    parameters
        .into_iter()
        .filter(|p| !is_hidden_parameter(&p.name))
        .collect()
}

/// User parameters followed by the hidden system parameters
pub fn deployment_payload(input_parameters: &[InputParameter]) -> Vec<InputParameter> {
    let mut payload: Vec<InputParameter> = input_parameters
        .iter()
        .filter(|p| !is_hidden_parameter(&p.name))
        .cloned()
        .collect();
    payload.extend(
        HIDDEN_INPUT_PARAMETERS
            .iter()
            .map(|name| InputParameter::new(name, true)),
    );
    payload
}

/// Plan types arrive either as the full TOSCA URI or as the bare type name
pub fn plan_type_matches(plan_type: &str, expected: &str) -> bool {
    let short = expected.rsplit('/').next().unwrap_or(expected);
    plan_type == expected || plan_type.rsplit('/').next() == Some(short)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_user_parameters() {
        let params = vec![
            InputParameter::new("size", true),
            InputParameter::new("CorrelationID", true),
            InputParameter::new("csarEntrypoint", true),
            InputParameter::new("flavor", false),
        ];
        let names: Vec<String> = filter_user_parameters(params)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["size", "flavor"]);
    }

    #[test]
    fn test_deployment_payload_appends_hidden_parameters() {
        let payload = deployment_payload(&[InputParameter::new("size", true).with_value("3")]);
        assert_eq!(payload.len(), 1 + HIDDEN_INPUT_PARAMETERS.len());
        assert_eq!(payload[0].value.as_deref(), Some("3"));
        assert!(payload[1..].iter().all(|p| is_hidden_parameter(&p.name)));
    }

    #[test]
    fn test_plan_type_matches() {
        assert!(plan_type_matches(BUILD_PLAN_TYPE, BUILD_PLAN_TYPE));
        assert!(plan_type_matches("BuildPlan", BUILD_PLAN_TYPE));
        assert!(!plan_type_matches(TERMINATION_PLAN_TYPE, BUILD_PLAN_TYPE));
    }
}
