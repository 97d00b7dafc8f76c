/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Headless live-modeling runner
//!
//! Deploys a topology document to the configured container and reports the
//! node states once the instance is running.
//!
//! ```text
//! livemodeling <topology.json> <namespace> <service-template-id> [name=value ...]
//! ```
//!
//! Container and backend addresses come from the settings file
//! (`LIVEMODELING_SETTINGS`); log verbosity from `RUST_LOG`.

use common::livemodeling::{LiveModelingLog, LiveModelingState, LogSeverity};
use common::setting::get_config;
use common::topology::{ServiceTemplateRef, TopologyTemplate};
use livemodeling::change_detector::TopologyTracker;
use livemodeling::interaction::PresetParameters;
use livemodeling::LiveModelingController;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const USAGE: &str =
    "usage: livemodeling <topology.json> <namespace> <service-template-id> [name=value ...]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [topology_path, namespace, template_id, parameters @ ..] = args.as_slice() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let document = tokio::fs::read_to_string(topology_path).await?;
    let topology: TopologyTemplate = serde_json::from_str(&document)?;
    let tracker = Arc::new(TopologyTracker::new(topology));
    tracker.enable_tracking();

    let mut prompt = PresetParameters::new();
    for parameter in parameters {
        let Some((name, value)) = parameter.split_once('=') else {
            eprintln!("ignoring malformed parameter '{parameter}'");
            continue;
        };
        prompt = prompt.with_value(name, value);
    }

    let settings = get_config();
    let handle = LiveModelingController::spawn_from_settings(settings, tracker, Arc::new(prompt));

    let mut sessions = handle.subscribe();
    let printer = tokio::spawn(async move {
        let mut printed = 0;
        while sessions.changed().await.is_ok() {
            let session = sessions.borrow_and_update().clone();
            session.logs.iter().skip(printed).for_each(print_log);
            printed = session.logs.len();
        }
        printed
    });

    let template = ServiceTemplateRef::new(namespace, template_id);
    handle.enable(&settings.container.url, template).await;
    let session = handle.snapshot();

    // the controller stops once the last handle is gone, which ends the printer
    drop(handle);
    let printed = printer.await.unwrap_or(0);
    session.logs.iter().skip(printed).for_each(print_log);

    println!("live modeling state: {}", session.state);
    if session.state != LiveModelingState::Enabled {
        if let Some(error) = session.last_error {
            eprintln!("last error: {error}");
        }
        std::process::exit(1);
    }

    if let Some(instance_id) = &session.current_service_template_instance_id {
        println!("service template instance: {instance_id}");
    }
    for node in session.node_templates_data.values() {
        println!("  {:<32} {}", node.node_id, node.state);
    }
    Ok(())
}

fn print_log(log: &LiveModelingLog) {
    let marker = match log.severity {
        LogSeverity::Info => "   ",
        LogSeverity::Success => " ok",
        LogSeverity::Warning => "  !",
        LogSeverity::Danger => "!!!",
    };
    println!("{} {marker} {}", log.timestamp.format("%H:%M:%S"), log.message);
}
