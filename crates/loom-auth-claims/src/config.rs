// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Claims evaluation configuration.
//!
//! Configuration is assembled from layered sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. TOML file (`/etc/loom/claims.toml` unless a path is given)
//! 3. Environment variables (`LOOM_CLAIMS_*`)
//!
//! ```toml
//! disabled_rules = "record"
//! rule_order = "creation"
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::ConfigError;

const DISABLED_RULES_ENV: &str = "LOOM_CLAIMS_DISABLED_RULES";
const RULE_ORDER_ENV: &str = "LOOM_CLAIMS_RULE_ORDER";

/// How disabled rules appear in `last_login_map_results`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisabledRuleAudit {
	/// Disabled rules leave no trace.
	#[default]
	Omit,
	/// Disabled rules are recorded as `"disabled"` with `enabled: false`.
	Record,
}

impl FromStr for DisabledRuleAudit {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"omit" => Ok(DisabledRuleAudit::Omit),
			"record" => Ok(DisabledRuleAudit::Record),
			other => Err(format!("unknown disabled rule policy '{other}'")),
		}
	}
}

/// The order rules are evaluated in. Later rules win conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleOrder {
	/// Ascending `order`, ties broken by ascending id.
	#[default]
	Priority,
	/// Ascending id.
	Creation,
}

impl FromStr for RuleOrder {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"priority" => Ok(RuleOrder::Priority),
			"creation" => Ok(RuleOrder::Creation),
			other => Err(format!("unknown rule order '{other}'")),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClaimsConfigLayer {
	pub disabled_rules: Option<DisabledRuleAudit>,
	pub rule_order: Option<RuleOrder>,
}

impl ClaimsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.disabled_rules.is_some() {
			self.disabled_rules = other.disabled_rules;
		}
		if other.rule_order.is_some() {
			self.rule_order = other.rule_order;
		}
	}

	pub fn finalize(self) -> ClaimsConfig {
		ClaimsConfig {
			disabled_rules: self.disabled_rules.unwrap_or_default(),
			rule_order: self.rule_order.unwrap_or_default(),
		}
	}
}

/// Resolved configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimsConfig {
	pub disabled_rules: DisabledRuleAudit,
	pub rule_order: RuleOrder,
}

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ClaimsConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ClaimsConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ClaimsConfigLayer {
			disabled_rules: Some(DisabledRuleAudit::default()),
			rule_order: Some(RuleOrder::default()),
		})
	}
}

/// TOML file configuration source. A missing file is skipped.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/loom/claims.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ClaimsConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ClaimsConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ClaimsConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: LOOM_CLAIMS_<FIELD>
pub struct EnvSource;

impl EnvSource {
	/// Builds a layer from an arbitrary variable lookup.
	pub fn load_from<F>(lookup: F) -> Result<ClaimsConfigLayer, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |name: &str| lookup(name).filter(|v| !v.is_empty());
		Ok(ClaimsConfigLayer {
			disabled_rules: parse_var(DISABLED_RULES_ENV, var(DISABLED_RULES_ENV))?,
			rule_order: parse_var(RULE_ORDER_ENV, var(RULE_ORDER_ENV))?,
		})
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ClaimsConfigLayer, ConfigError> {
		debug!("loading environment variables");
		EnvSource::load_from(|name| std::env::var(name).ok())
	}
}

fn parse_var<T>(name: &str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
	T: FromStr<Err = String>,
{
	match value {
		Some(v) => v.parse().map(Some).map_err(|message| ConfigError::InvalidValue {
			key: name.to_string(),
			message,
		}),
		None => Ok(None),
	}
}

/// Load configuration from all sources with standard precedence.
pub fn load_config() -> Result<ClaimsConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only.
pub fn load_config_from_env() -> Result<ClaimsConfig, ConfigError> {
	load_from_sources(vec![Box::new(DefaultsSource), Box::new(EnvSource)])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<PathBuf>,
) -> Result<ClaimsConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Merges sources in precedence order and resolves the result.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<ClaimsConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ClaimsConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	Ok(merged.finalize())
}
