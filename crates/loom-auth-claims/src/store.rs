// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User record storage.

use std::collections::HashMap;

use chrono::Utc;
use tracing::debug;

use crate::error::{ClaimsError, Result};
use crate::types::{AuthenticatorId, AuthenticatorUser, AuthenticatorUserId, User, UserId};

/// Trait for the system of record the claims applier writes to.
pub trait UserClaimsStore {
	/// Load the link between a user and a provider.
	fn authenticator_user(
		&self,
		user: UserId,
		provider: AuthenticatorId,
	) -> Result<Option<AuthenticatorUser>>;

	/// Persist a link. Implementations refresh `modified`.
	fn save_authenticator_user(&mut self, link: &mut AuthenticatorUser) -> Result<()>;

	/// Persist a user record.
	fn save_user(&mut self, user: &User) -> Result<()>;
}

/// In-memory store for tests and offline evaluation.
#[derive(Debug, Default)]
pub struct MemoryStore {
	users: HashMap<UserId, User>,
	links: HashMap<AuthenticatorUserId, AuthenticatorUser>,
}

impl MemoryStore {
	/// Create a new empty in-memory store.
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert_user(&mut self, user: User) {
		self.users.insert(user.id, user);
	}

	/// Adds a link, rejecting a second link with the same `(provider, uid)`.
	pub fn insert_authenticator_user(&mut self, link: AuthenticatorUser) -> Result<()> {
		self.check_unique_uid(&link)?;
		self.links.insert(link.id, link);
		Ok(())
	}

	pub fn user(&self, id: UserId) -> Option<&User> {
		self.users.get(&id)
	}

	pub fn link(&self, id: AuthenticatorUserId) -> Option<&AuthenticatorUser> {
		self.links.get(&id)
	}

	fn check_unique_uid(&self, link: &AuthenticatorUser) -> Result<()> {
		let taken = self
			.links
			.values()
			.any(|other| other.id != link.id && other.provider == link.provider && other.uid == link.uid);
		if taken {
			return Err(ClaimsError::DuplicateAuthenticatorUser {
				provider_id: link.provider,
				uid: link.uid.clone(),
			});
		}
		Ok(())
	}
}

impl UserClaimsStore for MemoryStore {
	fn authenticator_user(
		&self,
		user: UserId,
		provider: AuthenticatorId,
	) -> Result<Option<AuthenticatorUser>> {
		Ok(self
			.links
			.values()
			.find(|link| link.user == user && link.provider == provider)
			.cloned())
	}

	fn save_authenticator_user(&mut self, link: &mut AuthenticatorUser) -> Result<()> {
		self.check_unique_uid(link)?;
		link.modified = Utc::now();
		self.links.insert(link.id, link.clone());
		debug!(link_id = %link.id, user_id = %link.user, "authenticator user saved");
		Ok(())
	}

	fn save_user(&mut self, user: &User) -> Result<()> {
		if !self.users.contains_key(&user.id) {
			return Err(ClaimsError::UserNotFound(user.id));
		}
		self.users.insert(user.id, user.clone());
		debug!(user_id = %user.id, "user saved");
		Ok(())
	}
}
