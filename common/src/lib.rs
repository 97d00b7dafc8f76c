/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Shared types for the live-modeling components
//!
//! Holds the value types that cross crate boundaries: live-modeling and
//! runtime instance states, advisory logs, build-plan input parameters,
//! the topology document model, and the settings loader.

pub mod livemodeling;
pub mod setting;
pub mod topology;
