/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! HTTP implementation of the container gateway
//!
//! Resource layout used (relative to the container URL):
//! - `csars/{csar}`                                       CSAR descriptor
//! - `csars/{csar}/servicetemplates`                      service templates
//! - `{st}/buildplans/{plan}/instances`                   build-plan instances
//! - `{st}/instances`                                     service-template instances
//! - `{st}/instances/{id}/managementplans/{plan}/instances` termination
//! - `{st}/nodetemplates/{node}/instances/{id}/state`     node-template instance state

use super::{
    deployment_payload, filter_user_parameters, plan_type_matches, ContainerGateway, CsarUpload,
    BUILD_PLAN_TYPE, TERMINATION_PLAN_TYPE,
};
use crate::error::GatewayError;
use common::livemodeling::{InputParameter, NodeInstanceState, ServiceTemplateInstanceState};
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::RwLock;

// ========================================
// CONTAINER RESOURCE MODEL
// ========================================

#[derive(Debug, Deserialize)]
struct ServiceTemplateList {
    #[serde(default)]
    service_templates: Vec<ServiceTemplateResource>,
}

#[derive(Debug, Deserialize)]
struct ServiceTemplateResource {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PlanList {
    #[serde(default)]
    plans: Vec<PlanResource>,
}

#[derive(Debug, Deserialize)]
struct PlanResource {
    id: String,
    plan_type: String,
    #[serde(default)]
    input_parameters: Vec<InputParameter>,
}

#[derive(Debug, Deserialize)]
struct PlanInstanceList {
    #[serde(default)]
    plan_instances: Vec<PlanInstanceResource>,
}

#[derive(Debug, Deserialize)]
struct PlanInstanceResource {
    correlation_id: String,
    #[serde(default)]
    service_template_instance_id: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ServiceTemplateInstanceList {
    #[serde(default)]
    service_template_instances: Vec<InstanceResource<ServiceTemplateInstanceState>>,
}

#[derive(Debug, Deserialize)]
struct NodeTemplateInstanceList {
    #[serde(default)]
    node_template_instances: Vec<NodeTemplateInstanceResource>,
}

#[derive(Debug, Deserialize)]
struct InstanceResource<S> {
    id: serde_json::Value,
    state: S,
}

#[derive(Debug, Deserialize)]
struct NodeTemplateInstanceResource {
    id: serde_json::Value,
    state: NodeInstanceState,
    #[serde(default)]
    service_template_instance_id: Option<serde_json::Value>,
}

/// Instance ids are numeric on some container versions and strings on others
fn id_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ========================================
// CLIENT
// ========================================

/// reqwest-backed [`ContainerGateway`]
pub struct ContainerApiClient {
    client: Client,
    container_url: RwLock<Option<String>>,
}

impl ContainerApiClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            container_url: RwLock::new(None),
        }
    }

    pub fn with_container_url(url: &str) -> Self {
        let client = Self::new();
        client.set_container_url(url);
        client
    }

    fn base_url(&self) -> Result<String, GatewayError> {
        self.container_url
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or_else(GatewayError::not_configured)
    }

    fn csar_url(&self, csar_id: &str) -> Result<String, GatewayError> {
        Ok(format!(
            "{}/csars/{}",
            self.base_url()?,
            urlencoding::encode(csar_id)
        ))
    }

    /// URL of the (single) service template packaged in the CSAR
    async fn service_template_url(&self, csar_id: &str) -> Result<String, GatewayError> {
        let list_url = format!("{}/servicetemplates", self.csar_url(csar_id)?);
        let list: ServiceTemplateList = self.get_json(&list_url).await?;
        let template = list.service_templates.first().ok_or_else(|| {
            GatewayError::not_found(format!("csar '{csar_id}' contains no service template"))
        })?;
        Ok(format!("{list_url}/{}", urlencoding::encode(&template.id)))
    }

    async fn build_plan(&self, service_template_url: &str) -> Result<PlanResource, GatewayError> {
        let plans: PlanList = self
            .get_json(&format!("{service_template_url}/buildplans"))
            .await?;
        plans
            .plans
            .into_iter()
            .find(|p| plan_type_matches(&p.plan_type, BUILD_PLAN_TYPE))
            .ok_or_else(|| GatewayError::not_found("no build plan found"))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, GatewayError> {
        tracing::debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| GatewayError::malformed(format!("{url}: {e}: {body}")))
    }

    async fn check_status(response: Response) -> Result<Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(GatewayError::http(status.as_u16(), body))
    }
}

impl Default for ContainerApiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ContainerGateway for ContainerApiClient {
    fn set_container_url(&self, url: &str) {
        let mut guard = self
            .container_url
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(url.trim_end_matches('/').to_string());
    }

    fn container_url(&self) -> Option<String> {
        self.container_url
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn is_application_installed(&self, csar_id: &str) -> Result<bool, GatewayError> {
        let url = self.csar_url(csar_id)?;
        tracing::debug!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    async fn install_application(&self, upload: &CsarUpload) -> Result<(), GatewayError> {
        let url = format!("{}/csars", self.base_url()?);
        tracing::info!(%url, csar = %upload.name, "installing application");
        let response = self.client.post(&url).json(upload).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn deploy_service_template_instance(
        &self,
        csar_id: &str,
        input_parameters: &[InputParameter],
    ) -> Result<String, GatewayError> {
        let service_template_url = self.service_template_url(csar_id).await?;
        let plan = self.build_plan(&service_template_url).await?;
        let url = format!(
            "{service_template_url}/buildplans/{}/instances",
            urlencoding::encode(&plan.id)
        );

        tracing::info!(%url, csar = %csar_id, "starting build plan");
        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "text/plain")
            .json(&deployment_payload(input_parameters))
            .send()
            .await?;
        let correlation_id = Self::check_status(response).await?.text().await?;
        let correlation_id = correlation_id.trim().trim_matches('"').to_string();
        if correlation_id.is_empty() {
            return Err(GatewayError::malformed(
                "build plan returned an empty correlation id",
            ));
        }
        Ok(correlation_id)
    }

    async fn get_service_template_instance_id_after_deployment(
        &self,
        csar_id: &str,
        correlation_id: &str,
    ) -> Result<Option<String>, GatewayError> {
        let service_template_url = self.service_template_url(csar_id).await?;
        let plan = self.build_plan(&service_template_url).await?;
        let instances: PlanInstanceList = self
            .get_json(&format!(
                "{service_template_url}/buildplans/{}/instances",
                plan.id
            ))
            .await?;

        Ok(instances
            .plan_instances
            .iter()
            .find(|i| i.correlation_id == correlation_id)
            .and_then(|i| i.service_template_instance_id.as_ref())
            .and_then(id_to_string))
    }

    async fn get_service_template_instance_state(
        &self,
        csar_id: &str,
        instance_id: &str,
    ) -> Result<ServiceTemplateInstanceState, GatewayError> {
        let service_template_url = self.service_template_url(csar_id).await?;
        let instances: ServiceTemplateInstanceList = self
            .get_json(&format!("{service_template_url}/instances"))
            .await?;

        instances
            .service_template_instances
            .into_iter()
            .find(|i| id_to_string(&i.id).as_deref() == Some(instance_id))
            .map(|i| i.state)
            .ok_or_else(|| {
                GatewayError::not_found(format!(
                    "service template instance '{instance_id}' not found"
                ))
            })
    }

    async fn terminate_service_template_instance(
        &self,
        csar_id: &str,
        instance_id: &str,
    ) -> Result<(), GatewayError> {
        let service_template_url = self.service_template_url(csar_id).await?;
        let plans_url = format!(
            "{service_template_url}/instances/{}/managementplans",
            urlencoding::encode(instance_id)
        );
        let plans: PlanList = self.get_json(&plans_url).await?;
        let plan = plans
            .plans
            .into_iter()
            .find(|p| plan_type_matches(&p.plan_type, TERMINATION_PLAN_TYPE))
            .ok_or_else(|| GatewayError::not_found("no termination plan found"))?;

        let url = format!("{plans_url}/{}/instances", urlencoding::encode(&plan.id));
        tracing::info!(%url, instance = %instance_id, "starting termination plan");
        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "text/plain")
            .json(&deployment_payload(&[]))
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn get_node_template_instance_state(
        &self,
        csar_id: &str,
        instance_id: &str,
        node_id: &str,
    ) -> Result<NodeInstanceState, GatewayError> {
        let service_template_url = self.service_template_url(csar_id).await?;
        let instances: NodeTemplateInstanceList = self
            .get_json(&format!(
                "{service_template_url}/nodetemplates/{}/instances",
                urlencoding::encode(node_id)
            ))
            .await?;

        instances
            .node_template_instances
            .into_iter()
            .find(|i| {
                i.service_template_instance_id
                    .as_ref()
                    .and_then(id_to_string)
                    .as_deref()
                    == Some(instance_id)
            })
            .map(|i| i.state)
            .ok_or_else(|| {
                GatewayError::not_found(format!(
                    "no instance of node '{node_id}' in service template instance '{instance_id}'"
                ))
            })
    }

    async fn set_node_template_instance_state(
        &self,
        csar_id: &str,
        instance_id: &str,
        node_id: &str,
        state: NodeInstanceState,
    ) -> Result<(), GatewayError> {
        let service_template_url = self.service_template_url(csar_id).await?;
        let instances_url = format!(
            "{service_template_url}/nodetemplates/{}/instances",
            urlencoding::encode(node_id)
        );
        let instances: NodeTemplateInstanceList = self.get_json(&instances_url).await?;
        let node_instance_id = instances
            .node_template_instances
            .iter()
            .find(|i| {
                i.service_template_instance_id
                    .as_ref()
                    .and_then(id_to_string)
                    .as_deref()
                    == Some(instance_id)
            })
            .and_then(|i| id_to_string(&i.id))
            .ok_or_else(|| {
                GatewayError::not_found(format!(
                    "no instance of node '{node_id}' in service template instance '{instance_id}'"
                ))
            })?;

        let url = format!("{instances_url}/{node_instance_id}/state");
        tracing::info!(%url, %state, "updating node template instance state");
        let response = self
            .client
            .put(&url)
            .header(header::CONTENT_TYPE, "text/plain")
            .body(state.as_str_name())
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn get_required_build_plan_input_parameters(
        &self,
        csar_id: &str,
    ) -> Result<Vec<InputParameter>, GatewayError> {
        let service_template_url = self.service_template_url(csar_id).await?;
        let plan = self.build_plan(&service_template_url).await?;
        Ok(filter_user_parameters(plan.input_parameters))
    }
}
