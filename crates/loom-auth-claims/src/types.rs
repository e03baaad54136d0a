// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core type definitions for authentication map evaluation.
//!
//! This module defines the records the evaluator reads and writes:
//!
//! - **ID newtypes**: Type-safe wrappers around integer primary keys
//!   ([`AuthenticatorId`], [`AuthenticatorMapId`], [`UserId`], ...)
//! - **Configuration rows**: [`Authenticator`] and its ordered
//!   [`AuthenticatorMap`] rules
//! - **User records**: [`User`] and the provider link [`AuthenticatorUser`]
//! - **Decision bundle**: [`ClaimsBundle`] with the nested [`Claims`] tree and
//!   the per-rule [`RuleResult`] audit trail
//!
//! The serialized shape of [`ClaimsBundle`] is consumed by other services and
//! must stay stable: `access_allowed`, `is_superuser`, `claims` and
//! `last_login_map_results`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

// =============================================================================
// ID Newtypes
// =============================================================================

macro_rules! define_id_type {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(i64);

		impl $name {
			/// Create a new ID from a primary key.
			pub const fn new(id: i64) -> Self {
				Self(id)
			}

			/// Get the inner primary key.
			pub fn into_inner(self) -> i64 {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<i64> for $name {
			fn from(id: i64) -> Self {
				Self(id)
			}
		}

		impl From<$name> for i64 {
			fn from(id: $name) -> Self {
				id.0
			}
		}
	};
}

define_id_type!(AuthenticatorId, "Unique identifier for an authentication provider.");
define_id_type!(AuthenticatorMapId, "Unique identifier for an authentication map rule.");
define_id_type!(UserId, "Unique identifier for a user.");
define_id_type!(AuthenticatorUserId, "Unique identifier for a user-provider link.");

// =============================================================================
// Map Types
// =============================================================================

/// The kind of effect an authentication map has when its trigger fires.
///
/// Unrecognised values are kept verbatim in [`MapType::Unknown`] so that the
/// evaluator can report them instead of failing to load the rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MapType {
	/// Sets or clears the user's superuser flag.
	IsSuperuser,
	/// Gates login; a denial here is sticky for the whole evaluation.
	Allow,
	/// Grants or removes team membership (and the rule's team role).
	Team,
	/// Grants or removes organization membership (and the rule's org role).
	Organization,
	/// Grants a role at team, organization, or system scope.
	Role,
	/// Any other value.
	Unknown(String),
}

impl MapType {
	pub fn parse(value: &str) -> Self {
		match value {
			"is_superuser" => MapType::IsSuperuser,
			"allow" => MapType::Allow,
			"team" => MapType::Team,
			"organization" => MapType::Organization,
			"role" => MapType::Role,
			other => MapType::Unknown(other.to_string()),
		}
	}

	pub fn as_str(&self) -> &str {
		match self {
			MapType::IsSuperuser => "is_superuser",
			MapType::Allow => "allow",
			MapType::Team => "team",
			MapType::Organization => "organization",
			MapType::Role => "role",
			MapType::Unknown(other) => other,
		}
	}
}

impl fmt::Display for MapType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl From<String> for MapType {
	fn from(value: String) -> Self {
		MapType::parse(&value)
	}
}

impl From<MapType> for String {
	fn from(value: MapType) -> Self {
		value.as_str().to_string()
	}
}

// =============================================================================
// Configuration Rows
// =============================================================================

fn default_enabled() -> bool {
	true
}

/// Returns the value if it contains anything other than whitespace.
fn non_blank(value: &Option<String>) -> Option<&str> {
	value.as_deref().filter(|v| !v.trim().is_empty())
}

/// A single authentication mapping rule attached to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatorMap {
	pub id: AuthenticatorMapId,
	pub authenticator: AuthenticatorId,
	pub name: String,
	#[serde(default = "default_enabled")]
	pub enabled: bool,
	/// Explicit priority; lower values are evaluated first.
	#[serde(default)]
	pub order: u32,
	/// Raw trigger object, e.g. `{"groups": {"has_or": ["admins"]}}`.
	#[serde(default)]
	pub triggers: Map<String, Value>,
	#[serde(default)]
	pub revoke: bool,
	pub map_type: MapType,
	#[serde(default)]
	pub role: Option<String>,
	#[serde(default)]
	pub team: Option<String>,
	#[serde(default)]
	pub organization: Option<String>,
}

impl AuthenticatorMap {
	/// Creates an enabled rule with no trigger and no targets.
	pub fn new(id: AuthenticatorMapId, name: impl Into<String>, map_type: MapType) -> Self {
		Self {
			id,
			authenticator: AuthenticatorId::new(0),
			name: name.into(),
			enabled: true,
			order: 0,
			triggers: Map::new(),
			revoke: false,
			map_type,
			role: None,
			team: None,
			organization: None,
		}
	}

	/// Replaces the trigger object. Non-object values clear the triggers.
	pub fn with_triggers(mut self, triggers: Value) -> Self {
		self.triggers = match triggers {
			Value::Object(map) => map,
			_ => Map::new(),
		};
		self
	}

	pub fn with_enabled(mut self, enabled: bool) -> Self {
		self.enabled = enabled;
		self
	}

	pub fn with_order(mut self, order: u32) -> Self {
		self.order = order;
		self
	}

	pub fn with_revoke(mut self, revoke: bool) -> Self {
		self.revoke = revoke;
		self
	}

	pub fn with_role(mut self, role: impl Into<String>) -> Self {
		self.role = Some(role.into());
		self
	}

	pub fn with_team(mut self, team: impl Into<String>) -> Self {
		self.team = Some(team.into());
		self
	}

	pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
		self.organization = Some(organization.into());
		self
	}

	/// The target role, unless unset or whitespace-only.
	pub fn role_name(&self) -> Option<&str> {
		non_blank(&self.role)
	}

	/// The target team, unless unset or whitespace-only.
	pub fn team_name(&self) -> Option<&str> {
		non_blank(&self.team)
	}

	/// The target organization, unless unset or whitespace-only.
	pub fn organization_name(&self) -> Option<&str> {
		non_blank(&self.organization)
	}
}

/// An external identity source and the rules configured for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authenticator {
	pub id: AuthenticatorId,
	pub name: String,
	#[serde(default)]
	pub maps: Vec<AuthenticatorMap>,
}

impl Authenticator {
	pub fn new(id: AuthenticatorId, name: impl Into<String>) -> Self {
		Self {
			id,
			name: name.into(),
			maps: Vec::new(),
		}
	}

	/// Attaches a rule to this provider, taking ownership of it.
	pub fn with_map(mut self, mut map: AuthenticatorMap) -> Self {
		map.authenticator = self.id;
		self.maps.push(map);
		self
	}
}

// =============================================================================
// User Records
// =============================================================================

/// The parts of a user record the evaluator may change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	pub id: UserId,
	pub username: String,
	#[serde(default)]
	pub is_superuser: bool,
}

impl User {
	pub fn new(id: UserId, username: impl Into<String>) -> Self {
		Self {
			id,
			username: username.into(),
			is_superuser: false,
		}
	}
}

/// Links a user to the provider that authenticated them.
///
/// `(provider, uid)` is unique. `extra_data` holds the attributes the provider
/// returned at the last login; the evaluator reads it when no attributes are
/// passed explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatorUser {
	pub id: AuthenticatorUserId,
	pub uid: String,
	pub provider: AuthenticatorId,
	pub user: UserId,
	#[serde(default)]
	pub extra_data: Map<String, Value>,
	#[serde(default)]
	pub claims: Claims,
	#[serde(default)]
	pub last_login_map_results: Vec<RuleResult>,
	pub created: DateTime<Utc>,
	pub modified: DateTime<Utc>,
}

impl AuthenticatorUser {
	pub fn new(
		id: AuthenticatorUserId,
		provider: AuthenticatorId,
		user: UserId,
		uid: impl Into<String>,
	) -> Self {
		let now = Utc::now();
		Self {
			id,
			uid: uid.into(),
			provider,
			user,
			extra_data: Map::new(),
			claims: Claims::default(),
			last_login_map_results: Vec::new(),
			created: now,
			modified: now,
		}
	}

	pub fn with_extra_data(mut self, extra_data: Value) -> Self {
		self.extra_data = match extra_data {
			Value::Object(map) => map,
			_ => Map::new(),
		};
		self
	}
}

// =============================================================================
// Claims Tree
// =============================================================================

/// Role name to granted/removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignments {
	#[serde(default)]
	pub roles: BTreeMap<String, bool>,
}

/// Roles asserted within one organization and its teams.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgRoleAssignments {
	#[serde(default)]
	pub roles: BTreeMap<String, bool>,
	#[serde(default)]
	pub teams: BTreeMap<String, RoleAssignments>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RbacRoles {
	#[serde(default)]
	pub system: RoleAssignments,
	#[serde(default)]
	pub organizations: BTreeMap<String, OrgRoleAssignments>,
}

/// Membership and role state asserted from identity provider data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
	/// org name -> team name -> member?
	#[serde(default)]
	pub team_membership: BTreeMap<String, BTreeMap<String, bool>>,
	/// org name -> member?
	#[serde(default)]
	pub organization_membership: BTreeMap<String, bool>,
	#[serde(default)]
	pub rbac_roles: RbacRoles,
}

// =============================================================================
// Audit Trail
// =============================================================================

/// The recorded result of a single rule.
///
/// Serialized as `true`/`false` for decided outcomes and as a string marker
/// (`"skipped"`, `"invalid"`, `"disabled"`) otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleOutcome {
	Granted,
	Denied,
	/// The trigger did not fire; the rule had no effect.
	Skipped,
	/// The trigger object contained unknown keys; the rule was ignored.
	Invalid,
	/// The rule is disabled and was only recorded, never evaluated.
	Disabled,
}

impl RuleOutcome {
	/// The boolean decision, if the rule reached one.
	pub fn decision(self) -> Option<bool> {
		match self {
			RuleOutcome::Granted => Some(true),
			RuleOutcome::Denied => Some(false),
			RuleOutcome::Skipped | RuleOutcome::Invalid | RuleOutcome::Disabled => None,
		}
	}

	pub fn from_decision(decision: bool) -> Self {
		if decision {
			RuleOutcome::Granted
		} else {
			RuleOutcome::Denied
		}
	}
}

impl TryFrom<&Value> for RuleOutcome {
	type Error = String;

	fn try_from(value: &Value) -> Result<Self, Self::Error> {
		match value {
			Value::Bool(decision) => Ok(RuleOutcome::from_decision(*decision)),
			Value::String(marker) => match marker.as_str() {
				"skipped" => Ok(RuleOutcome::Skipped),
				"invalid" => Ok(RuleOutcome::Invalid),
				"disabled" => Ok(RuleOutcome::Disabled),
				other => Err(format!("unknown rule outcome '{other}'")),
			},
			other => Err(format!("unexpected rule outcome {other}")),
		}
	}
}

impl Serialize for RuleOutcome {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			RuleOutcome::Granted => serializer.serialize_bool(true),
			RuleOutcome::Denied => serializer.serialize_bool(false),
			RuleOutcome::Skipped => serializer.serialize_str("skipped"),
			RuleOutcome::Invalid => serializer.serialize_str("invalid"),
			RuleOutcome::Disabled => serializer.serialize_str("disabled"),
		}
	}
}

impl<'de> Deserialize<'de> for RuleOutcome {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let value = Value::deserialize(deserializer)?;
		RuleOutcome::try_from(&value).map_err(D::Error::custom)
	}
}

/// One entry of `last_login_map_results`.
///
/// Serialized as `{"<rule id>": <outcome>, "enabled": <bool>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleResult {
	pub rule: AuthenticatorMapId,
	pub outcome: RuleOutcome,
	pub enabled: bool,
}

impl RuleResult {
	pub fn new(rule: AuthenticatorMapId, outcome: RuleOutcome, enabled: bool) -> Self {
		Self {
			rule,
			outcome,
			enabled,
		}
	}
}

impl Serialize for RuleResult {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(2))?;
		map.serialize_entry(&self.rule.to_string(), &self.outcome)?;
		map.serialize_entry("enabled", &self.enabled)?;
		map.end()
	}
}

impl<'de> Deserialize<'de> for RuleResult {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = Map::<String, Value>::deserialize(deserializer)?;
		let enabled = raw
			.get("enabled")
			.and_then(Value::as_bool)
			.ok_or_else(|| D::Error::custom("rule result is missing `enabled`"))?;
		let (key, value) = raw
			.iter()
			.find(|(key, _)| key.as_str() != "enabled")
			.ok_or_else(|| D::Error::custom("rule result is missing the rule id"))?;
		let rule = key
			.parse::<i64>()
			.map_err(|e| D::Error::custom(format!("invalid rule id '{key}': {e}")))?;
		let outcome = RuleOutcome::try_from(value).map_err(D::Error::custom)?;
		Ok(RuleResult::new(AuthenticatorMapId::new(rule), outcome, enabled))
	}
}

// =============================================================================
// Decision Bundle
// =============================================================================

/// Everything a single evaluation decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimsBundle {
	/// False once any `allow` rule denied the login.
	pub access_allowed: bool,
	/// None when no `is_superuser` rule reached a decision.
	pub is_superuser: Option<bool>,
	pub claims: Claims,
	pub last_login_map_results: Vec<RuleResult>,
}

impl Default for ClaimsBundle {
	fn default() -> Self {
		Self {
			access_allowed: true,
			is_superuser: None,
			claims: Claims::default(),
			last_login_map_results: Vec::new(),
		}
	}
}
