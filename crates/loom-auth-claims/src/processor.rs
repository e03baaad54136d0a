// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rule processing.
//!
//! Each rule is handled in two steps:
//!
//! 1. [`evaluate_rule`] runs the rule's triggers and applies `revoke`, giving a
//!    [`RuleOutcome`].
//! 2. [`apply_rule`] feeds a decided outcome into the bundle according to the
//!    rule's [`MapType`].
//!
//! The bundle's accumulators use three distinct merge policies:
//!
//! - [`assign_if_decided`] for `is_superuser`: the last decided rule wins.
//! - [`deny_once`] for `access_allowed`: once denied, it stays denied.
//! - [`overwrite`] for memberships and roles: the last rule per key wins.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::sink::EventSink;
use crate::trigger::{TriggerContext, TriggerResult, TriggerSet};
use crate::types::{AuthenticatorMap, Claims, ClaimsBundle, MapType, RuleOutcome, RuleResult};

/// The user data rules are evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct ClaimsInput<'a> {
	pub attributes: &'a Map<String, Value>,
	pub groups: &'a [String],
}

impl<'a> ClaimsInput<'a> {
	pub fn new(attributes: &'a Map<String, Value>, groups: &'a [String]) -> Self {
		Self { attributes, groups }
	}
}

/// Runs a rule's triggers against the input.
///
/// Recognised triggers run in declaration order and the last one decides.
/// With `revoke` set, a `Skip` from a group or attribute trigger becomes a
/// denial.
pub fn evaluate_rule(
	rule: &AuthenticatorMap,
	input: &ClaimsInput<'_>,
	sink: &dyn EventSink,
) -> RuleOutcome {
	let triggers = match TriggerSet::parse(&rule.triggers) {
		TriggerSet::Empty => return RuleOutcome::Skipped,
		TriggerSet::Invalid(keys) => {
			sink.warn(
				"unknown trigger keys, rule ignored",
				&[
					("rule_id", rule.id.to_string()),
					("rule", rule.name.clone()),
					("keys", keys.join(",")),
				],
			);
			return RuleOutcome::Invalid;
		}
		TriggerSet::Triggers(triggers) => triggers,
	};

	let ctx = TriggerContext {
		attributes: input.attributes,
		groups: input.groups,
		authenticator_id: rule.authenticator,
		sink,
	};

	let mut outcome = RuleOutcome::Skipped;
	for trigger in &triggers {
		outcome = match trigger.evaluate(&ctx) {
			TriggerResult::Allow => RuleOutcome::Granted,
			TriggerResult::Deny => RuleOutcome::Denied,
			TriggerResult::Skip if rule.revoke && trigger.is_revocable() => RuleOutcome::Denied,
			TriggerResult::Skip => RuleOutcome::Skipped,
		};
	}
	outcome
}

/// Evaluates an enabled rule, applies a decided outcome and records the audit
/// entry.
pub fn process_rule(
	bundle: &mut ClaimsBundle,
	rule: &AuthenticatorMap,
	input: &ClaimsInput<'_>,
	sink: &dyn EventSink,
) -> RuleOutcome {
	let outcome = evaluate_rule(rule, input, sink);
	debug!(rule_id = %rule.id, map_type = %rule.map_type, outcome = ?outcome, "evaluated authentication map");

	if let Some(decision) = outcome.decision() {
		apply_rule(bundle, rule, decision, sink);
	}
	bundle
		.last_login_map_results
		.push(RuleResult::new(rule.id, outcome, true));
	outcome
}

/// Feeds a decision into the accumulator selected by the rule's map type.
pub fn apply_rule(
	bundle: &mut ClaimsBundle,
	rule: &AuthenticatorMap,
	decision: bool,
	sink: &dyn EventSink,
) {
	match &rule.map_type {
		MapType::IsSuperuser => assign_if_decided(&mut bundle.is_superuser, decision),
		MapType::Allow => deny_once(&mut bundle.access_allowed, decision),
		MapType::Team => grant_team(&mut bundle.claims, rule, decision, sink),
		MapType::Organization => grant_organization(&mut bundle.claims, rule, decision, sink),
		MapType::Role => {
			if rule.team_name().is_some() {
				grant_team(&mut bundle.claims, rule, decision, sink);
			} else if rule.organization_name().is_some() {
				grant_organization(&mut bundle.claims, rule, decision, sink);
			} else {
				grant_system(&mut bundle.claims, rule, decision, sink);
			}
		}
		MapType::Unknown(_) => sink.error(
			&format!(
				"Map type {} of rule {} does not know how to be processed",
				rule.map_type, rule.name
			),
			&[
				("rule_id", rule.id.to_string()),
				("authenticator_id", rule.authenticator.to_string()),
			],
		),
	}
}

/// Stores the decision, replacing any earlier one.
pub fn assign_if_decided(slot: &mut Option<bool>, decision: bool) {
	*slot = Some(decision);
}

/// Clears the flag on a denial; a grant never sets it back.
pub fn deny_once(slot: &mut bool, decision: bool) {
	if !decision {
		*slot = false;
	}
}

/// Stores the decision under `key`, replacing any earlier one.
pub fn overwrite(slot: &mut BTreeMap<String, bool>, key: &str, decision: bool) {
	slot.insert(key.to_string(), decision);
}

fn missing_target(rule: &AuthenticatorMap, target: &str, sink: &dyn EventSink) {
	sink.warn(
		"authentication map has no target, rule has no effect",
		&[
			("rule_id", rule.id.to_string()),
			("rule", rule.name.clone()),
			("map_type", rule.map_type.to_string()),
			("missing", target.to_string()),
		],
	);
}

fn grant_team(claims: &mut Claims, rule: &AuthenticatorMap, decision: bool, sink: &dyn EventSink) {
	let (Some(org), Some(team)) = (rule.organization_name(), rule.team_name()) else {
		let missing = if rule.team_name().is_none() { "team" } else { "organization" };
		missing_target(rule, missing, sink);
		return;
	};

	overwrite(
		claims.team_membership.entry(org.to_string()).or_default(),
		team,
		decision,
	);
	if let Some(role) = rule.role_name() {
		let org_roles = claims
			.rbac_roles
			.organizations
			.entry(org.to_string())
			.or_default();
		overwrite(
			&mut org_roles.teams.entry(team.to_string()).or_default().roles,
			role,
			decision,
		);
	}
}

fn grant_organization(
	claims: &mut Claims,
	rule: &AuthenticatorMap,
	decision: bool,
	sink: &dyn EventSink,
) {
	let Some(org) = rule.organization_name() else {
		missing_target(rule, "organization", sink);
		return;
	};

	overwrite(&mut claims.organization_membership, org, decision);
	if let Some(role) = rule.role_name() {
		let org_roles = claims
			.rbac_roles
			.organizations
			.entry(org.to_string())
			.or_default();
		overwrite(&mut org_roles.roles, role, decision);
	}
}

fn grant_system(claims: &mut Claims, rule: &AuthenticatorMap, decision: bool, sink: &dyn EventSink) {
	let Some(role) = rule.role_name() else {
		missing_target(rule, "role", sink);
		return;
	};
	overwrite(&mut claims.rbac_roles.system.roles, role, decision);
}
