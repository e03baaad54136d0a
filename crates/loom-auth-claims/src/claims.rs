// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Claims aggregation across all rules of a provider.

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::config::{ClaimsConfig, DisabledRuleAudit, RuleOrder};
use crate::processor::{process_rule, ClaimsInput};
use crate::sink::EventSink;
use crate::types::{Authenticator, AuthenticatorMap, ClaimsBundle, RuleOutcome, RuleResult};

/// Evaluates a provider's rules with a fixed configuration and event sink.
pub struct ClaimsEvaluator<'a> {
	pub(crate) config: &'a ClaimsConfig,
	pub(crate) sink: &'a dyn EventSink,
}

impl<'a> ClaimsEvaluator<'a> {
	pub fn new(config: &'a ClaimsConfig, sink: &'a dyn EventSink) -> Self {
		Self { config, sink }
	}

	/// Folds every rule of `authenticator` into a fresh bundle.
	///
	/// Never fails: malformed rules are recorded as skipped or invalid and
	/// reported to the sink.
	#[instrument(
		level = "debug",
		skip_all,
		fields(authenticator_id = %authenticator.id, username = %username)
	)]
	pub fn create_claims(
		&self,
		authenticator: &Authenticator,
		username: &str,
		attributes: &Map<String, Value>,
		groups: &[String],
	) -> ClaimsBundle {
		let input = ClaimsInput::new(attributes, groups);
		let mut bundle = ClaimsBundle::default();

		for rule in self.ordered_rules(authenticator) {
			if rule.enabled {
				process_rule(&mut bundle, rule, &input, self.sink);
			} else if self.config.disabled_rules == DisabledRuleAudit::Record {
				bundle
					.last_login_map_results
					.push(RuleResult::new(rule.id, RuleOutcome::Disabled, false));
			}
		}

		debug!(
			access_allowed = bundle.access_allowed,
			is_superuser = ?bundle.is_superuser,
			rules = bundle.last_login_map_results.len(),
			"claims evaluated"
		);
		bundle
	}

	/// Rules owned by the provider, in evaluation order.
	fn ordered_rules<'r>(&self, authenticator: &'r Authenticator) -> Vec<&'r AuthenticatorMap> {
		let mut rules: Vec<&AuthenticatorMap> = authenticator
			.maps
			.iter()
			.filter(|m| m.authenticator == authenticator.id)
			.collect();
		match self.config.rule_order {
			RuleOrder::Priority => rules.sort_by_key(|m| (m.order, m.id)),
			RuleOrder::Creation => rules.sort_by_key(|m| m.id),
		}
		rules
	}
}

/// Evaluates with default configuration.
pub fn create_claims(
	authenticator: &Authenticator,
	username: &str,
	attributes: &Map<String, Value>,
	groups: &[String],
	sink: &dyn EventSink,
) -> ClaimsBundle {
	let config = ClaimsConfig::default();
	ClaimsEvaluator::new(&config, sink).create_claims(authenticator, username, attributes, groups)
}
