// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `loom-claims`: evaluate a provider's authentication maps offline.
//!
//! Reads a provider definition and a user's attributes from JSON files, runs
//! the claims evaluator and prints the resulting bundle as JSON on stdout.
//! Logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use loom_auth_claims::{
	load_config, load_config_with_file, Authenticator, ClaimsConfig, ClaimsEvaluator, EventSink,
	RecordingSink, TracingSink,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Evaluate authentication maps against a user's identity provider data
#[derive(Parser, Debug)]
#[command(name = "loom-claims", version, about, long_about = None)]
struct Args {
	/// JSON file with the provider and its maps
	#[arg(short, long)]
	authenticator: PathBuf,

	/// JSON file with the user's attributes (an object)
	#[arg(long)]
	attributes: Option<PathBuf>,

	/// Group the user belongs to (repeatable)
	#[arg(short, long = "group")]
	groups: Vec<String>,

	/// Username to evaluate as
	#[arg(short, long, default_value = "loom-claims")]
	username: String,

	/// Path to custom configuration file
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Output logs as JSON
	#[arg(long)]
	json_logs: bool,

	/// Print configuration problems found in the maps to stderr
	#[arg(long)]
	explain: bool,
}

fn init_tracing(json_logs: bool) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

	if json_logs {
		tracing_subscriber::registry()
			.with(filter)
			.with(fmt::layer().json().with_writer(std::io::stderr))
			.init();
	} else {
		tracing_subscriber::registry()
			.with(filter)
			.with(fmt::layer().compact().with_writer(std::io::stderr))
			.init();
	}
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
	let content =
		std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
	serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_attributes(path: Option<&Path>) -> Result<Map<String, Value>> {
	match path {
		Some(path) => load_json(path),
		None => Ok(Map::new()),
	}
}

fn resolve_config(path: Option<&Path>) -> Result<ClaimsConfig> {
	let config = match path {
		Some(path) => load_config_with_file(path),
		None => load_config(),
	};
	config.context("failed to load configuration")
}

/// Evaluates and renders the bundle. Events land in `sink`.
fn evaluate(args: &Args, config: &ClaimsConfig, sink: &dyn EventSink) -> Result<String> {
	let authenticator: Authenticator = load_json(&args.authenticator)?;
	let attributes = load_attributes(args.attributes.as_deref())?;
	debug!(
		authenticator_id = %authenticator.id,
		maps = authenticator.maps.len(),
		groups = args.groups.len(),
		"loaded inputs"
	);

	let bundle = ClaimsEvaluator::new(config, sink).create_claims(
		&authenticator,
		&args.username,
		&attributes,
		&args.groups,
	);
	info!(
		access_allowed = bundle.access_allowed,
		is_superuser = ?bundle.is_superuser,
		"evaluation complete"
	);

	serde_json::to_string_pretty(&bundle).context("failed to serialize claims")
}

fn main() -> Result<()> {
	let args = Args::parse();
	init_tracing(args.json_logs);

	let config = resolve_config(args.config.as_deref())?;

	if args.explain {
		let recording = RecordingSink::new();
		let output = evaluate(&args, &config, &recording)?;
		println!("{output}");
		for event in recording.events() {
			let fields: Vec<String> = event.fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
			eprintln!("{:?}: {} {}", event.level, event.event, fields.join(" "));
		}
	} else {
		println!("{}", evaluate(&args, &config, &TracingSink)?);
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use std::io::Write;

	fn json_file(value: Value) -> tempfile::NamedTempFile {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(value.to_string().as_bytes()).unwrap();
		file
	}

	fn provider_file() -> tempfile::NamedTempFile {
		json_file(json!({
			"id": 1,
			"name": "ldap",
			"maps": [
				{
					"id": 1,
					"authenticator": 1,
					"name": "admins",
					"map_type": "is_superuser",
					"triggers": {"groups": {"has_or": ["admins"]}},
				},
				{
					"id": 2,
					"authenticator": 1,
					"name": "broken",
					"map_type": "bad_map_type",
					"triggers": {"always": {}},
				},
			],
		}))
	}

	#[test]
	fn groups_are_repeatable() {
		let args = Args::try_parse_from([
			"loom-claims",
			"--authenticator",
			"provider.json",
			"-g",
			"admins",
			"--group",
			"users",
		])
		.unwrap();
		assert_eq!(args.groups, vec!["admins", "users"]);
		assert_eq!(args.username, "loom-claims");
		assert!(!args.explain);
	}

	#[test]
	fn authenticator_is_required() {
		assert!(Args::try_parse_from(["loom-claims"]).is_err());
	}

	#[test]
	fn evaluates_provider_file() {
		let provider = provider_file();
		let attributes = json_file(json!({"email": "alice@example.com"}));
		let args = Args::try_parse_from([
			"loom-claims",
			"--authenticator",
			provider.path().to_str().unwrap(),
			"--attributes",
			attributes.path().to_str().unwrap(),
			"-g",
			"admins",
		])
		.unwrap();
		let sink = RecordingSink::new();

		let output = evaluate(&args, &ClaimsConfig::default(), &sink).unwrap();
		let bundle: Value = serde_json::from_str(&output).unwrap();

		assert_eq!(bundle["is_superuser"], json!(true));
		assert_eq!(bundle["access_allowed"], json!(true));
		assert_eq!(
			bundle["last_login_map_results"],
			json!([{"1": true, "enabled": true}, {"2": true, "enabled": true}])
		);
		assert_eq!(sink.errors().len(), 1);
	}

	#[test]
	fn unreadable_input_names_the_file() {
		let args = Args::try_parse_from(["loom-claims", "--authenticator", "/nonexistent/provider.json"])
			.unwrap();
		let err = evaluate(&args, &ClaimsConfig::default(), &RecordingSink::new()).unwrap_err();
		assert!(err.to_string().contains("/nonexistent/provider.json"));
	}

	#[test]
	fn non_object_attributes_are_rejected() {
		let attributes = json_file(json!(["not", "an", "object"]));
		assert!(load_attributes(Some(attributes.path())).is_err());
		assert!(load_attributes(None).unwrap().is_empty());
	}
}
