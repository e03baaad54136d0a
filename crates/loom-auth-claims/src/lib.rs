// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authentication map evaluation for Loom.
//!
//! Identity providers hand us a bag of user attributes and a list of group
//! names. Operators attach ordered authentication maps to each provider that
//! turn that data into:
//!
//! - whether the login is allowed at all
//! - whether the user is a superuser
//! - organization and team memberships, and roles at team, organization or
//!   system scope
//!
//! # Evaluation pipeline
//!
//! ```text
//! attributes + groups
//!     -> trigger      (always / never / groups / attributes)
//!     -> processor    (revoke, map type dispatch, merge policies)
//!     -> claims       (ordered fold over all rules, audit trail)
//!     -> apply        (superuser flag, persisted audit trail)
//! ```
//!
//! Evaluation is synchronous and never fails on bad configuration. Problems are
//! reported to an injected [`EventSink`] and the offending rule degrades to
//! `"skipped"` or `"invalid"` in the audit trail. Only persistence errors
//! surface from [`ClaimsEvaluator::update_user_claims`].

pub mod apply;
pub mod claims;
pub mod config;
pub mod error;
pub mod join;
pub mod processor;
pub mod sink;
pub mod store;
pub mod trigger;
pub mod types;

pub use apply::{update_user_claims, AppliedClaims};
pub use claims::{create_claims, ClaimsEvaluator};
pub use config::{
	load_config, load_config_from_env, load_config_with_file, ClaimsConfig, DisabledRuleAudit,
	RuleOrder,
};
pub use error::{ClaimsError, ConfigError, Result};
pub use join::{has_access_with_join, JoinCondition};
pub use processor::{apply_rule, evaluate_rule, ClaimsInput};
pub use sink::{EventSink, RecordedEvent, RecordingSink, TracingSink};
pub use store::{MemoryStore, UserClaimsStore};
pub use trigger::{process_groups, process_user_attributes, Trigger, TriggerResult, TriggerSet};
pub use types::{
	Authenticator, AuthenticatorId, AuthenticatorMap, AuthenticatorMapId, AuthenticatorUser,
	AuthenticatorUserId, Claims, ClaimsBundle, MapType, RuleOutcome, RuleResult, User, UserId,
};
