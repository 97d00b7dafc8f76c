/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Topology change detection
//!
//! Keeps the topology being edited together with two snapshots of it, the
//! last saved one and the last deployed one, and raises the
//! `unsaved_changes` and `deployment_changes` flags by comparing against them
//! after every edit.
//!
//! Node canvas coordinates (`x`, `y`) are not part of the comparison; moving a
//! node around neither dirties the document nor requires a redeploy.

use common::livemodeling::LiveModelingState;
use common::topology::{NodeTemplate, TopologyTemplate};
use std::sync::{Mutex, MutexGuard};

/// Immutable deep copy of a topology
#[derive(Debug, Clone, PartialEq)]
pub struct TopologySnapshot {
    topology: TopologyTemplate,
}

impl TopologySnapshot {
    pub fn capture(topology: &TopologyTemplate) -> Self {
        Self {
            topology: topology.clone(),
        }
    }

    pub fn topology(&self) -> &TopologyTemplate {
        &self.topology
    }
}

/// True when `current` differs from `reference` in anything but node positions
pub fn has_changed(current: &TopologySnapshot, reference: &TopologySnapshot) -> bool {
    let a = &current.topology;
    let b = &reference.topology;

    a.relationship_templates != b.relationship_templates
        || a.node_templates.len() != b.node_templates.len()
        || a.node_templates
            .iter()
            .zip(&b.node_templates)
            .any(|(x, y)| !same_node(x, y))
}

fn same_node(a: &NodeTemplate, b: &NodeTemplate) -> bool {
    a.id == b.id
        && a.name == b.name
        && a.node_type == b.node_type
        && a.min_instances == b.min_instances
        && a.max_instances == b.max_instances
        && a.properties == b.properties
}

/// Read access to the topology being edited
pub trait TopologySource: Send + Sync {
    fn current_topology(&self) -> TopologyTemplate;

    /// Record `deployed` as the topology the running instance was built from
    fn mark_deployed(&self, deployed: &TopologyTemplate);
}

#[derive(Debug, Default)]
struct TrackerState {
    current: TopologyTemplate,
    last_saved: Option<TopologySnapshot>,
    last_deployed: Option<TopologySnapshot>,
    tracking_enabled: bool,
    unsaved_changes: bool,
    deployment_changes: bool,
}

/// Editor-side owner of the topology and its snapshots
#[derive(Debug, Default)]
pub struct TopologyTracker {
    inner: Mutex<TrackerState>,
}

impl TopologyTracker {
    pub fn new(topology: TopologyTemplate) -> Self {
        Self {
            inner: Mutex::new(TrackerState {
                current: topology,
                ..Default::default()
            }),
        }
    }

    /// Start tracking unsaved changes against the topology as loaded
    pub fn enable_tracking(&self) {
        let mut inner = self.lock();
        inner.last_saved = Some(TopologySnapshot::capture(&inner.current));
        inner.tracking_enabled = true;
        inner.unsaved_changes = false;
    }

    /// Replace the topology after an edit and recompute both flags
    ///
    /// `live_modeling_state` decides whether deployment changes are tracked at
    /// all; they are not while live modeling is disabled.
    pub fn update_topology(&self, topology: TopologyTemplate, live_modeling_state: LiveModelingState) {
        let mut inner = self.lock();
        inner.current = topology;
        let current = TopologySnapshot::capture(&inner.current);

        if inner.tracking_enabled {
            inner.unsaved_changes = inner
                .last_saved
                .as_ref()
                .map(|saved| has_changed(&current, saved))
                .unwrap_or(true);
        }

        inner.deployment_changes = live_modeling_state != LiveModelingState::Disabled
            && inner
                .last_deployed
                .as_ref()
                .map(|deployed| has_changed(&current, deployed))
                .unwrap_or(false);
    }

    /// Replace the last-saved snapshot after a successful save
    pub fn mark_saved(&self) {
        let mut inner = self.lock();
        inner.last_saved = Some(TopologySnapshot::capture(&inner.current));
        inner.unsaved_changes = false;
    }

    pub fn unsaved_changes(&self) -> bool {
        self.lock().unsaved_changes
    }

    pub fn deployment_changes(&self) -> bool {
        self.lock().deployment_changes
    }

    pub fn last_deployed(&self) -> Option<TopologySnapshot> {
        self.lock().last_deployed.clone()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TopologySource for TopologyTracker {
    fn current_topology(&self) -> TopologyTemplate {
        self.lock().current.clone()
    }

    fn mark_deployed(&self, deployed: &TopologyTemplate) {
        let mut inner = self.lock();
        let deployed = TopologySnapshot::capture(deployed);
        inner.deployment_changes =
            has_changed(&TopologySnapshot::capture(&inner.current), &deployed);
        inner.last_deployed = Some(deployed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::topology::RelationshipTemplate;

    fn topology() -> TopologyTemplate {
        TopologyTemplate {
            node_templates: vec![
                NodeTemplate::new("web", "{ns}WebServer"),
                NodeTemplate::new("db", "{ns}Database"),
            ],
            relationship_templates: vec![RelationshipTemplate::new(
                "r1",
                "{ns}ConnectsTo",
                "web",
                "db",
            )],
        }
    }

    #[test]
    fn test_copy_is_unchanged() {
        let snapshot = TopologySnapshot::capture(&topology());
        assert!(!has_changed(&snapshot, &snapshot.clone()));
    }

    #[test]
    fn test_tracked_field_change_is_detected() {
        let reference = TopologySnapshot::capture(&topology());

        let mut renamed = topology();
        renamed.node_templates[0].name = "Frontend".into();
        assert!(has_changed(&TopologySnapshot::capture(&renamed), &reference));

        let mut scaled = topology();
        scaled.node_templates[1].max_instances = 3;
        assert!(has_changed(&TopologySnapshot::capture(&scaled), &reference));

        let mut configured = topology();
        configured.node_templates[0].properties = serde_json::json!({"port": 8080});
        assert!(has_changed(&TopologySnapshot::capture(&configured), &reference));

        let mut rewired = topology();
        rewired.relationship_templates.clear();
        assert!(has_changed(&TopologySnapshot::capture(&rewired), &reference));

        let mut extended = topology();
        extended
            .node_templates
            .push(NodeTemplate::new("cache", "{ns}Cache"));
        assert!(has_changed(&TopologySnapshot::capture(&extended), &reference));
    }

    #[test]
    fn test_moving_nodes_is_not_a_change() {
        let reference = TopologySnapshot::capture(&topology());
        let mut moved = topology();
        moved.node_templates[0].x = 300.0;
        moved.node_templates[1].y = -42.5;
        assert!(!has_changed(&TopologySnapshot::capture(&moved), &reference));
    }

    #[test]
    fn test_snapshot_is_detached_from_live_topology() {
        let mut live = topology();
        let snapshot = TopologySnapshot::capture(&live);
        live.node_templates[0].name = "Changed".into();

        assert_eq!(snapshot.topology().node_templates[0].name, "web");
        assert!(has_changed(&TopologySnapshot::capture(&live), &snapshot));
    }

    #[test]
    fn test_unsaved_changes_only_after_tracking_enabled() {
        let tracker = TopologyTracker::new(topology());
        let mut edited = topology();
        edited.node_templates[0].name = "Frontend".into();

        tracker.update_topology(edited.clone(), LiveModelingState::Disabled);
        assert!(!tracker.unsaved_changes());

        tracker.update_topology(topology(), LiveModelingState::Disabled);
        tracker.enable_tracking();
        tracker.update_topology(edited, LiveModelingState::Disabled);
        assert!(tracker.unsaved_changes());

        tracker.mark_saved();
        assert!(!tracker.unsaved_changes());
    }

    #[test]
    fn test_deployment_changes_follow_live_modeling_state() {
        let tracker = TopologyTracker::new(topology());
        tracker.mark_deployed(&topology());

        let mut edited = topology();
        edited.node_templates[1].node_type = "{ns}Postgres".into();

        tracker.update_topology(edited.clone(), LiveModelingState::Disabled);
        assert!(!tracker.deployment_changes());

        tracker.update_topology(edited, LiveModelingState::Enabled);
        assert!(tracker.deployment_changes());

        tracker.mark_deployed(&tracker.current_topology());
        assert!(!tracker.deployment_changes());
        assert_eq!(
            tracker.last_deployed().map(|s| s.topology().node_templates[1].node_type.clone()),
            Some("{ns}Postgres".to_string())
        );
    }

    #[test]
    fn test_edit_during_deployment_stays_a_deployment_change() {
        let tracker = TopologyTracker::new(topology());
        let shipped = tracker.current_topology();

        let mut edited = topology();
        edited.node_templates.push(NodeTemplate::new("cache", "{ns}Redis"));
        tracker.update_topology(edited, LiveModelingState::Redeploy);

        tracker.mark_deployed(&shipped);
        assert!(tracker.deployment_changes());
        assert_eq!(
            tracker.last_deployed().map(|s| s.topology().node_ids()),
            Some(shipped.node_ids())
        );
    }
}
