// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Applying evaluated claims to a user record.

use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};

use crate::claims::ClaimsEvaluator;
use crate::config::ClaimsConfig;
use crate::error::{ClaimsError, Result};
use crate::sink::EventSink;
use crate::store::UserClaimsStore;
use crate::types::{Authenticator, User};

/// The updated user and the login decision.
///
/// The applier never rejects a login itself; callers must check
/// `access_allowed`.
#[derive(Debug)]
pub struct AppliedClaims<'u> {
	pub user: &'u mut User,
	pub access_allowed: bool,
}

impl ClaimsEvaluator<'_> {
	/// Evaluates the provider's rules for `user` and persists the result.
	///
	/// `attributes` defaults to the `extra_data` stored on the user's link to
	/// the provider. The claims tree and audit trail are always written to the
	/// link first. The superuser flag only changes when a rule decided it, and
	/// the user record is only saved when the flag actually changed. If that
	/// save fails, `user` is left as it was passed in.
	#[instrument(
		level = "debug",
		skip_all,
		fields(user_id = %user.id, authenticator_id = %authenticator.id)
	)]
	pub fn update_user_claims<'u, S>(
		&self,
		store: &mut S,
		user: &'u mut User,
		authenticator: &Authenticator,
		groups: &[String],
		attributes: Option<&Map<String, Value>>,
	) -> Result<AppliedClaims<'u>>
	where
		S: UserClaimsStore + ?Sized,
	{
		let Some(mut link) = store.authenticator_user(user.id, authenticator.id)? else {
			self.sink.warn(
				"user is not linked to authenticator",
				&[
					("user_id", user.id.to_string()),
					("authenticator_id", authenticator.id.to_string()),
				],
			);
			return Err(ClaimsError::AuthenticatorUserNotFound {
				user_id: user.id,
				provider_id: authenticator.id,
			});
		};

		let bundle = {
			let attributes = attributes.unwrap_or(&link.extra_data);
			self.create_claims(authenticator, &user.username, attributes, groups)
		};

		link.claims = bundle.claims;
		link.last_login_map_results = bundle.last_login_map_results;
		store
			.save_authenticator_user(&mut link)
			.map_err(persistence_failed)?;

		if let Some(is_superuser) = bundle.is_superuser {
			if user.is_superuser != is_superuser {
				user.is_superuser = is_superuser;
				if let Err(e) = store.save_user(user) {
					user.is_superuser = !is_superuser;
					return Err(persistence_failed(e));
				}
			}
		}

		if !bundle.access_allowed {
			info!(username = %user.username, "authentication maps denied access");
		}

		Ok(AppliedClaims {
			user,
			access_allowed: bundle.access_allowed,
		})
	}
}

fn persistence_failed(err: ClaimsError) -> ClaimsError {
	if err.is_internal() {
		error!(error = %err, "failed to persist claims");
	} else {
		warn!(error = %err, "claims not persisted");
	}
	err
}

/// Evaluates and persists with default configuration.
pub fn update_user_claims<'u, S>(
	store: &mut S,
	user: &'u mut User,
	authenticator: &Authenticator,
	groups: &[String],
	attributes: Option<&Map<String, Value>>,
	sink: &dyn EventSink,
) -> Result<AppliedClaims<'u>>
where
	S: UserClaimsStore + ?Sized,
{
	let config = ClaimsConfig::default();
	ClaimsEvaluator::new(&config, sink).update_user_claims(store, user, authenticator, groups, attributes)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sink::RecordingSink;
	use crate::store::MemoryStore;
	use crate::types::{AuthenticatorId, UserId};

	#[test]
	fn unlinked_user_is_an_error() {
		let mut store = MemoryStore::new();
		let mut user = User::new(UserId::new(1), "alice");
		store.insert_user(user.clone());
		let authenticator = Authenticator::new(AuthenticatorId::new(5), "ldap");
		let sink = RecordingSink::new();

		let err = update_user_claims(&mut store, &mut user, &authenticator, &[], None, &sink)
			.unwrap_err();

		assert!(matches!(
			err,
			ClaimsError::AuthenticatorUserNotFound { user_id, provider_id }
				if user_id == UserId::new(1) && provider_id == AuthenticatorId::new(5)
		));
		assert_eq!(sink.warnings().len(), 1);
	}
}
