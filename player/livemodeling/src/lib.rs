/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Live modeling of topology models
//!
//! Deploys the topology being edited to a container, keeps the per-node
//! runtime states in sync with the running instance, and redeploys it when
//! the model changes.
//!
//! - [`gateway`]: container REST client
//! - [`poller`]: wait for asynchronous container side effects
//! - [`state_machine`]: transition table
//! - [`controller`]: request queue and workflows
//! - [`store`]: observable session state
//! - [`change_detector`]: unsaved and undeployed topology changes

pub mod change_detector;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod interaction;
pub mod poller;
pub mod repository;
pub mod state_machine;
pub mod store;
pub mod types;
pub mod workflow;

pub use controller::{LiveModelingController, LiveModelingHandle};
pub use error::{LiveModelingError, Result};
pub use store::{LiveModelingAction, LiveModelingSession, LiveModelingStore};
