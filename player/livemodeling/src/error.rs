/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Error types for live modeling

use common::livemodeling::LiveModelingState;
use std::time::Duration;
use thiserror::Error;

/// What went wrong while talking to the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// No container URL configured for this session
    NotConfigured,
    /// Connection or transport failure
    Network,
    /// Non-2xx response
    Http,
    /// Response body did not have the expected shape
    MalformedResponse,
    /// Required plan or resource missing from the container's resource model
    NotFound,
}

#[derive(Debug, Clone, Error)]
#[error("container request failed ({kind:?}, status {http_status:?}): {body}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub http_status: Option<u16>,
    pub body: String,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, body: impl Into<String>) -> Self {
        Self {
            kind,
            http_status: None,
            body: body.into(),
        }
    }

    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::Http,
            http_status: Some(status),
            body: body.into(),
        }
    }

    pub fn malformed(body: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::MalformedResponse, body)
    }

    pub fn not_found(body: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::NotFound, body)
    }

    pub fn not_configured() -> Self {
        Self::new(
            GatewayErrorKind::NotConfigured,
            "no container url configured",
        )
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::malformed(e.to_string());
        }
        match e.status() {
            Some(status) => Self::http(status.as_u16(), e.to_string()),
            None => Self::new(GatewayErrorKind::Network, e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("condition not met within {0:?}")]
    Timeout(Duration),
    #[error("poll cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("repository request failed with status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("repository unreachable: {0}")]
    Network(String),
    #[error("unexpected repository response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for RepositoryError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => RepositoryError::Http {
                status: status.as_u16(),
                body: e.to_string(),
            },
            None if e.is_decode() => RepositoryError::Malformed(e.to_string()),
            None => RepositoryError::Network(e.to_string()),
        }
    }
}

/// Failure of a live-modeling workflow or request
#[derive(Debug, Clone, Error)]
pub enum LiveModelingError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        from: LiveModelingState,
        to: LiveModelingState,
    },

    #[error("invalid build plan input: {0}")]
    Validation(String),

    #[error("missing session data: {0}")]
    MissingSessionData(&'static str),

    #[error("live modeling controller is not running")]
    ControllerStopped,
}

impl LiveModelingError {
    /// A cancelled poll means the workflow was superseded, not that it failed
    pub fn is_superseded(&self) -> bool {
        matches!(self, LiveModelingError::Poll(PollError::Cancelled))
    }
}

pub type Result<T> = std::result::Result<T, LiveModelingError>;
