// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Trigger parsing and matching.
//!
//! A rule's `triggers` object selects one of four matchers:
//!
//! | Key          | Payload                                     | Result              |
//! |--------------|---------------------------------------------|---------------------|
//! | `always`     | ignored                                     | always `Allow`      |
//! | `never`      | ignored                                     | always `Deny`       |
//! | `groups`     | `has_or` / `has_and` / `has_not` lists      | `Allow` or `Skip`   |
//! | `attributes` | attribute name -> predicates, `join_condition` | `Allow` or `Skip` |
//!
//! The group and attribute matchers never produce `Deny`; turning their `Skip`
//! into a denial is the job of the rule's `revoke` flag.

use std::collections::HashSet;

use regex::Regex;
use serde_json::{Map, Value};

use crate::join::JoinCondition;
use crate::sink::EventSink;
use crate::types::AuthenticatorId;

/// The result of matching one trigger against a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerResult {
	Allow,
	Deny,
	Skip,
}

/// The user data a trigger is matched against.
pub struct TriggerContext<'a> {
	pub attributes: &'a Map<String, Value>,
	pub groups: &'a [String],
	pub authenticator_id: AuthenticatorId,
	pub sink: &'a dyn EventSink,
}

/// A parsed trigger.
#[derive(Debug, Clone)]
pub enum Trigger {
	Always,
	Never,
	Groups(GroupCondition),
	Attributes(AttributeCondition),
}

impl Trigger {
	/// Parses a single `triggers` entry. Unknown keys yield `None`.
	pub fn parse(key: &str, payload: &Value) -> Option<Self> {
		match key {
			"always" => Some(Trigger::Always),
			"never" => Some(Trigger::Never),
			"groups" => Some(Trigger::Groups(GroupCondition::parse(payload))),
			"attributes" => Some(Trigger::Attributes(AttributeCondition::parse(payload))),
			_ => None,
		}
	}

	pub fn evaluate(&self, ctx: &TriggerContext<'_>) -> TriggerResult {
		match self {
			Trigger::Always => TriggerResult::Allow,
			Trigger::Never => TriggerResult::Deny,
			Trigger::Groups(condition) => condition.evaluate(ctx.groups),
			Trigger::Attributes(condition) => {
				condition.evaluate(ctx.attributes, ctx.authenticator_id, ctx.sink)
			}
		}
	}

	/// Whether the rule's `revoke` flag may turn a `Skip` from this trigger
	/// into a denial.
	pub fn is_revocable(&self) -> bool {
		matches!(self, Trigger::Groups(_) | Trigger::Attributes(_))
	}
}

/// All triggers configured on a rule.
#[derive(Debug, Clone)]
pub enum TriggerSet {
	/// No trigger configured; the rule is skipped.
	Empty,
	/// At least one key is not a known trigger; the rule is ignored.
	Invalid(Vec<String>),
	/// Recognised triggers in declaration order. The last one decides.
	Triggers(Vec<Trigger>),
}

impl TriggerSet {
	pub fn parse(raw: &Map<String, Value>) -> Self {
		if raw.is_empty() {
			return TriggerSet::Empty;
		}

		let mut triggers = Vec::with_capacity(raw.len());
		let mut unknown = Vec::new();
		for (key, payload) in raw {
			match Trigger::parse(key, payload) {
				Some(trigger) => triggers.push(trigger),
				None => unknown.push(key.clone()),
			}
		}

		if unknown.is_empty() {
			TriggerSet::Triggers(triggers)
		} else {
			TriggerSet::Invalid(unknown)
		}
	}
}

// =============================================================================
// Groups
// =============================================================================

/// Group membership condition. Only the first present key is consulted, in the
/// order `has_or`, `has_and`, `has_not`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupCondition {
	pub has_or: Option<Vec<String>>,
	pub has_and: Option<Vec<String>>,
	pub has_not: Option<Vec<String>>,
}

/// Reads a list of group names. A bare string is a one-element list,
/// non-string items are dropped, other values count as absent.
fn string_list(value: &Value) -> Option<Vec<String>> {
	match value {
		Value::String(single) => Some(vec![single.clone()]),
		Value::Array(items) => Some(
			items
				.iter()
				.filter_map(Value::as_str)
				.map(str::to_string)
				.collect(),
		),
		_ => None,
	}
}

impl GroupCondition {
	pub fn parse(payload: &Value) -> Self {
		let Some(condition) = payload.as_object() else {
			return Self::default();
		};
		Self {
			has_or: condition.get("has_or").and_then(string_list),
			has_and: condition.get("has_and").and_then(string_list),
			has_not: condition.get("has_not").and_then(string_list),
		}
	}

	pub fn evaluate(&self, groups: &[String]) -> TriggerResult {
		let user_groups: HashSet<&str> = groups.iter().map(String::as_str).collect();
		let matched = if let Some(any_of) = &self.has_or {
			any_of.iter().any(|g| user_groups.contains(g.as_str()))
		} else if let Some(all_of) = &self.has_and {
			all_of.iter().all(|g| user_groups.contains(g.as_str()))
		} else if let Some(none_of) = &self.has_not {
			!none_of.iter().any(|g| user_groups.contains(g.as_str()))
		} else {
			false
		};

		if matched {
			TriggerResult::Allow
		} else {
			TriggerResult::Skip
		}
	}
}

/// Matches a raw `groups` trigger payload against the user's groups.
pub fn process_groups(condition: &Value, groups: &[String]) -> TriggerResult {
	GroupCondition::parse(condition).evaluate(groups)
}

// =============================================================================
// Attributes
// =============================================================================

/// A single test applied to one attribute value.
#[derive(Debug, Clone)]
pub enum Predicate {
	/// Exact JSON equality.
	Equals(Value),
	/// Unanchored regex search.
	Matches(Regex),
	/// The value contains the operand.
	Contains(String),
	/// The value ends with the operand.
	EndsWith(String),
	/// The value is a substring of the operand.
	In(String),
	/// A `matches` operand that is not a valid regex.
	InvalidPattern { pattern: String, error: String },
	/// An unknown predicate, or a known one with a non-string operand.
	Unsupported(String),
}

impl Predicate {
	pub fn parse(key: &str, operand: &Value) -> Self {
		let text = operand.as_str();
		match (key, text) {
			("equals", _) => Predicate::Equals(operand.clone()),
			("matches", Some(pattern)) => match Regex::new(pattern) {
				Ok(regex) => Predicate::Matches(regex),
				Err(e) => Predicate::InvalidPattern {
					pattern: pattern.to_string(),
					error: e.to_string(),
				},
			},
			("contains", Some(needle)) => Predicate::Contains(needle.to_string()),
			("ends_with", Some(suffix)) => Predicate::EndsWith(suffix.to_string()),
			("in", Some(haystack)) => Predicate::In(haystack.to_string()),
			_ => Predicate::Unsupported(key.to_string()),
		}
	}

	/// String predicates only match string values.
	pub fn matches(&self, value: &Value) -> bool {
		match self {
			Predicate::Equals(expected) => value == expected,
			Predicate::Matches(regex) => value.as_str().is_some_and(|v| regex.is_match(v)),
			Predicate::Contains(needle) => value.as_str().is_some_and(|v| v.contains(needle.as_str())),
			Predicate::EndsWith(suffix) => value.as_str().is_some_and(|v| v.ends_with(suffix.as_str())),
			Predicate::In(haystack) => value.as_str().is_some_and(|v| haystack.contains(v)),
			Predicate::InvalidPattern { .. } | Predicate::Unsupported(_) => false,
		}
	}
}

/// The predicates configured for one attribute. No predicates means the
/// attribute only has to be present.
#[derive(Debug, Clone)]
pub struct AttributeCheck {
	pub attribute: String,
	pub predicates: Vec<Predicate>,
}

impl AttributeCheck {
	fn parse(attribute: &str, payload: &Value) -> Self {
		let predicates = match payload {
			Value::Object(predicates) => predicates
				.iter()
				.map(|(key, operand)| Predicate::parse(key, operand))
				.collect(),
			_ => vec![Predicate::Unsupported(payload.to_string())],
		};
		Self {
			attribute: attribute.to_string(),
			predicates,
		}
	}

	/// Lists are matched element by element and joined with `join`; an empty
	/// list or a `null` value never matches. `null` list elements are dropped.
	fn matches(&self, value: &Value, join: JoinCondition) -> bool {
		if self.predicates.is_empty() {
			return true;
		}

		let values: Vec<&Value> = match value {
			Value::Null => return false,
			Value::Array(items) => items.iter().filter(|v| !v.is_null()).collect(),
			single => vec![single],
		};

		values
			.into_iter()
			.fold(None, |acc, v| join.combine(acc, Some(self.matches_value(v, join))))
			.unwrap_or(false)
	}

	fn matches_value(&self, value: &Value, join: JoinCondition) -> bool {
		self
			.predicates
			.iter()
			.fold(None, |acc, p| join.combine(acc, Some(p.matches(value))))
			.unwrap_or(false)
	}
}

/// Attribute condition: every key except `join_condition` names a user
/// attribute. `join_condition` defaults to `or`.
#[derive(Debug, Clone)]
pub struct AttributeCondition {
	pub join: JoinCondition,
	/// The raw `join_condition` when it was neither `and` nor `or`.
	pub invalid_join: Option<String>,
	pub checks: Vec<AttributeCheck>,
}

impl AttributeCondition {
	pub fn parse(payload: &Value) -> Self {
		let mut condition = Self {
			join: JoinCondition::Or,
			invalid_join: None,
			checks: Vec::new(),
		};
		let Some(entries) = payload.as_object() else {
			return condition;
		};

		for (key, value) in entries {
			if key == "join_condition" {
				match value.as_str().and_then(JoinCondition::parse) {
					Some(join) => condition.join = join,
					None => {
						condition.invalid_join = Some(match value {
							Value::String(raw) => raw.clone(),
							other => other.to_string(),
						});
					}
				}
			} else {
				condition.checks.push(AttributeCheck::parse(key, value));
			}
		}
		condition
	}

	pub fn evaluate(
		&self,
		attributes: &Map<String, Value>,
		authenticator_id: AuthenticatorId,
		sink: &dyn EventSink,
	) -> TriggerResult {
		self.report_problems(authenticator_id, sink);

		let mut has_access = None;
		for check in &self.checks {
			let Some(value) = attributes.get(&check.attribute) else {
				if self.join == JoinCondition::And {
					return TriggerResult::Skip;
				}
				continue;
			};

			has_access = self
				.join
				.combine(has_access, Some(check.matches(value, self.join)));
			match (self.join, has_access) {
				(JoinCondition::Or, Some(true)) => break,
				(JoinCondition::And, Some(false)) => return TriggerResult::Skip,
				_ => {}
			}
		}

		if has_access == Some(true) {
			TriggerResult::Allow
		} else {
			TriggerResult::Skip
		}
	}

	fn report_problems(&self, authenticator_id: AuthenticatorId, sink: &dyn EventSink) {
		if let Some(raw) = &self.invalid_join {
			sink.warn(
				"invalid join condition, defaulting to 'or'",
				&[
					("authenticator_id", authenticator_id.to_string()),
					("join_condition", raw.clone()),
				],
			);
		}

		for check in &self.checks {
			for predicate in &check.predicates {
				match predicate {
					Predicate::Unsupported(key) => sink.warn(
						"unsupported attribute predicate",
						&[
							("authenticator_id", authenticator_id.to_string()),
							("attribute", check.attribute.clone()),
							("predicate", key.clone()),
						],
					),
					Predicate::InvalidPattern { pattern, error } => sink.warn(
						"invalid regular expression in attribute predicate",
						&[
							("authenticator_id", authenticator_id.to_string()),
							("attribute", check.attribute.clone()),
							("pattern", pattern.clone()),
							("error", error.clone()),
						],
					),
					_ => {}
				}
			}
		}
	}
}

/// Matches a raw `attributes` trigger payload against the user's attributes.
pub fn process_user_attributes(
	condition: &Value,
	attributes: &Map<String, Value>,
	authenticator_id: AuthenticatorId,
	sink: &dyn EventSink,
) -> TriggerResult {
	AttributeCondition::parse(condition).evaluate(attributes, authenticator_id, sink)
}
