/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Backend repository access used by redeployment
//!
//! Redeploying saves the current topology as a fresh, temporary service
//! template in the live-modeling namespace and lets the container install the
//! CSAR exported for it.

use crate::error::RepositoryError;
use crate::gateway::CsarUpload;
use common::topology::{ServiceTemplateRef, TopologyTemplate};
use reqwest::{Client, Response};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub const LIVE_MODELING_NAMESPACE: &str = "http://opentosca.org/livemodeling/servicetemplates";

#[async_trait::async_trait]
pub trait TopologyRepository: Send + Sync {
    /// Store `topology` as a new temporary service template
    async fn create_live_modeling_service_template(
        &self,
        topology: &TopologyTemplate,
    ) -> Result<ServiceTemplateRef, RepositoryError>;

    /// Descriptor the container uses to fetch the template's CSAR
    fn csar_upload(&self, template: &ServiceTemplateRef) -> CsarUpload;
}

/// Namespaces appear double-encoded in repository paths
fn encode_namespace(namespace: &str) -> String {
    urlencoding::encode(&urlencoding::encode(namespace)).into_owned()
}

fn service_template_url(backend_url: &str, template: &ServiceTemplateRef) -> String {
    format!(
        "{}/servicetemplates/{}/{}",
        backend_url.trim_end_matches('/'),
        encode_namespace(&template.namespace),
        urlencoding::encode(&template.id)
    )
}

fn upload_for(backend_url: &str, template: &ServiceTemplateRef) -> CsarUpload {
    CsarUpload {
        url: format!("{}/?csar", service_template_url(backend_url, template)),
        name: template.csar_id(),
        overwrite: true,
    }
}

#[derive(Serialize)]
struct NewServiceTemplate<'a> {
    namespace: &'a str,
    name: &'a str,
}

/// reqwest-backed [`TopologyRepository`]
pub struct RepositoryClient {
    client: Client,
    backend_url: String,
}

impl RepositoryClient {
    pub fn new(backend_url: &str) -> Self {
        Self {
            client: Client::new(),
            backend_url: backend_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    fn temporary_id() -> String {
        format!(
            "LiveModeling_{}",
            chrono::Utc::now().format("%Y%m%d%H%M%S%3f")
        )
    }

    async fn check_status(response: Response) -> Result<Response, RepositoryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(RepositoryError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait::async_trait]
impl TopologyRepository for RepositoryClient {
    async fn create_live_modeling_service_template(
        &self,
        topology: &TopologyTemplate,
    ) -> Result<ServiceTemplateRef, RepositoryError> {
        let template = ServiceTemplateRef::new(LIVE_MODELING_NAMESPACE, &Self::temporary_id());

        let create_url = format!("{}/servicetemplates/", self.backend_url);
        tracing::info!(url = %create_url, id = %template.id, "creating live-modeling service template");
        let response = self
            .client
            .post(&create_url)
            .json(&NewServiceTemplate {
                namespace: &template.namespace,
                name: &template.id,
            })
            .send()
            .await?;
        Self::check_status(response).await?;

        let topology_url = format!(
            "{}/topologytemplate",
            service_template_url(&self.backend_url, &template)
        );
        tracing::debug!(url = %topology_url, "saving topology");
        let response = self
            .client
            .put(&topology_url)
            .json(topology)
            .send()
            .await?;
        Self::check_status(response).await?;

        Ok(template)
    }

    fn csar_upload(&self, template: &ServiceTemplateRef) -> CsarUpload {
        upload_for(&self.backend_url, template)
    }
}

/// Mock TopologyRepository for testing
pub struct MockRepository {
    pub calls: Arc<Mutex<Vec<String>>>,
    backend_url: String,
    created: AtomicU32,
    fail: bool,
}

impl MockRepository {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            backend_url: "http://backend".to_string(),
            created: AtomicU32::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn get_calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for MockRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TopologyRepository for MockRepository {
    async fn create_live_modeling_service_template(
        &self,
        topology: &TopologyTemplate,
    ) -> Result<ServiceTemplateRef, RepositoryError> {
        let call = format!(
            "create_live_modeling_service_template:{}",
            topology.node_ids().join(",")
        );
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);

        if self.fail {
            return Err(RepositoryError::Http {
                status: 500,
                body: "repository unavailable".to_string(),
            });
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ServiceTemplateRef::new(
            LIVE_MODELING_NAMESPACE,
            &format!("LiveModeling_{n}"),
        ))
    }

    fn csar_upload(&self, template: &ServiceTemplateRef) -> CsarUpload {
        upload_for(&self.backend_url, template)
    }
}
