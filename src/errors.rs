//! Error Types
//!
//! This module defines the error types used throughout the engine core.
//!
//! # Overview
//!
//! The main error type [`VeldError`] covers all failure modes including:
//! - Native physics engine initialization failures
//! - Native resource creation failures (actors, shapes, joints)
//! - Invalid node configuration rejected before any native call
//! - Collision geometry cooking errors
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, VeldError>`.

use thiserror::Error;

/// The main error type for the Veld engine core.
///
/// Each variant provides specific context about what went wrong. Failures are
/// recoverable unless documented otherwise: a node whose resource creation
/// fails stays inert, while [`VeldError::EngineInit`] degrades the whole
/// physics subsystem to disabled.
#[derive(Error, Debug)]
pub enum VeldError {
    // ========================================================================
    // Physics Engine Errors
    // ========================================================================
    /// The native physics engine failed to initialize. Fatal to the physics
    /// subsystem; the world keeps running with physics disabled.
    #[error("Native physics engine initialization failed: {0}")]
    EngineInit(String),

    /// A native actor, shape or joint could not be created.
    #[error("Native resource creation failed: {0}")]
    ResourceCreation(String),

    /// Collision geometry could not be cooked into a native mesh.
    #[error("Geometry cooking failed: {0}")]
    GeometryCooking(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A property setter was given a value that can never produce a valid
    /// native resource. Raised before any native call is made, so the
    /// previous resource stays intact.
    #[error("Invalid configuration: {context}")]
    InvalidConfig {
        /// Description of the rejected value
        context: String,
    },
}

impl VeldError {
    /// Shorthand for an [`VeldError::InvalidConfig`] with a formatted context.
    #[must_use]
    pub fn invalid_config(context: impl Into<String>) -> Self {
        VeldError::InvalidConfig {
            context: context.into(),
        }
    }
}

/// Alias for `Result<T, VeldError>`.
pub type Result<T> = std::result::Result<T, VeldError>;
