/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Topology document model
//!
//! The node and relationship templates edited in the topology modeler, in the
//! JSON shape the repository backend exchanges.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyTemplate {
    #[serde(default)]
    pub node_templates: Vec<NodeTemplate>,
    #[serde(default)]
    pub relationship_templates: Vec<RelationshipTemplate>,
}

impl TopologyTemplate {
    pub fn node_ids(&self) -> Vec<String> {
        self.node_templates.iter().map(|n| n.id.clone()).collect()
    }

    pub fn node(&self, id: &str) -> Option<&NodeTemplate> {
        self.node_templates.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut NodeTemplate> {
        self.node_templates.iter_mut().find(|n| n.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTemplate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default = "NodeTemplate::default_instances")]
    pub min_instances: u32,
    #[serde(default = "NodeTemplate::default_instances")]
    pub max_instances: u32,
    #[serde(default)]
    pub properties: serde_json::Value,
    /// Canvas position; display only
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

impl NodeTemplate {
    pub fn new(id: &str, node_type: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            node_type: node_type.to_string(),
            min_instances: 1,
            max_instances: 1,
            properties: serde_json::Value::Null,
            x: 0.0,
            y: 0.0,
        }
    }

    fn default_instances() -> u32 {
        1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    #[serde(rename = "ref")]
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipTemplate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub source_element: TemplateRef,
    pub target_element: TemplateRef,
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl RelationshipTemplate {
    pub fn new(id: &str, relationship_type: &str, source: &str, target: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            relationship_type: relationship_type.to_string(),
            source_element: TemplateRef {
                reference: source.to_string(),
            },
            target_element: TemplateRef {
                reference: target.to_string(),
            },
            properties: serde_json::Value::Null,
        }
    }
}

/// Namespace-qualified service template in the backend repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceTemplateRef {
    pub namespace: String,
    pub id: String,
}

impl ServiceTemplateRef {
    pub fn new(namespace: &str, id: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            id: id.to_string(),
        }
    }

    /// Id of the CSAR exported for this service template
    pub fn csar_id(&self) -> String {
        format!("{}.csar", self.id)
    }
}
