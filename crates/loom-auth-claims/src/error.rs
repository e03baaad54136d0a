// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Claims evaluation error types.
//!
//! Rule evaluation itself never fails; malformed rules degrade to a skipped or
//! invalid outcome. Errors come from persisting results and from loading
//! configuration.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{AuthenticatorId, UserId};

/// Errors surfaced by the claims applier and its store.
#[derive(Debug, Error)]
pub enum ClaimsError {
	/// The user has no link to the provider being evaluated.
	#[error("user {user_id} is not linked to authenticator {provider_id}")]
	AuthenticatorUserNotFound {
		user_id: UserId,
		provider_id: AuthenticatorId,
	},

	/// Another link already uses this uid for the provider.
	#[error("authenticator {provider_id} already has a user with uid '{uid}'")]
	DuplicateAuthenticatorUser {
		provider_id: AuthenticatorId,
		uid: String,
	},

	/// The user record does not exist in the store.
	#[error("user not found: {0}")]
	UserNotFound(UserId),

	/// The backing store rejected a read or write.
	#[error("store error: {0}")]
	Store(String),

	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),
}

impl ClaimsError {
	/// Returns true if this error should be logged at error level.
	pub fn is_internal(&self) -> bool {
		matches!(
			self,
			ClaimsError::Store(_) | ClaimsError::Config(_)
		)
	}
}

/// Errors raised while loading claims configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("Invalid value for {key}: {message}")]
	InvalidValue { key: String, message: String },

	#[error("Failed to parse TOML config at {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("Failed to read config file {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

pub type Result<T> = std::result::Result<T, ClaimsError>;
