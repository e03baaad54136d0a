// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use loom_auth_claims::{
	create_claims, Authenticator, AuthenticatorId, AuthenticatorMap, AuthenticatorMapId,
	ClaimsBundle, MapType, RecordingSink,
};
use serde_json::{json, Map, Value};

const SYSTEM_ROLE_NAME: &str = "System Auditor";

/// A team rule for `testorg`/`testteam`, the shape most scenarios start from.
fn local_map(id: i64) -> AuthenticatorMap {
	AuthenticatorMap::new(AuthenticatorMapId::new(id), format!("local map {id}"), MapType::IsSuperuser)
		.with_triggers(json!({"always": {}}))
		.with_organization("testorg")
		.with_team("testteam")
}

fn local_authenticator(maps: Vec<AuthenticatorMap>) -> Authenticator {
	maps.into_iter().fold(
		Authenticator::new(AuthenticatorId::new(1), "local"),
		Authenticator::with_map,
	)
}

fn evaluate(authenticator: &Authenticator, attributes: Value, groups: &[&str]) -> (ClaimsBundle, RecordingSink) {
	let attributes: Map<String, Value> = match attributes {
		Value::Object(map) => map,
		_ => Map::new(),
	};
	let groups: Vec<String> = groups.iter().map(|g| g.to_string()).collect();
	let sink = RecordingSink::new();
	let bundle = create_claims(authenticator, "username", &attributes, &groups, &sink);
	(bundle, sink)
}

fn empty_claims() -> Value {
	json!({
		"team_membership": {},
		"organization_membership": {},
		"rbac_roles": {"system": {"roles": {}}, "organizations": {}},
	})
}

struct Scenario {
	name: &'static str,
	triggers: Value,
	map_type: &'static str,
	role: Option<&'static str>,
	team: Option<&'static str>,
	organization: Option<&'static str>,
	access_allowed: bool,
	is_superuser: Option<bool>,
	claims: Value,
	results: Value,
}

fn run_scenario(scenario: &Scenario) {
	let mut map = local_map(1).with_triggers(scenario.triggers.clone());
	map.map_type = MapType::parse(scenario.map_type);
	map.role = scenario.role.map(str::to_string);
	if let Some(team) = scenario.team {
		map.team = Some(team.to_string());
	}
	if let Some(organization) = scenario.organization {
		map.organization = Some(organization.to_string());
	}
	if scenario.role == Some(SYSTEM_ROLE_NAME) {
		map.team = None;
	}

	let (bundle, _) = evaluate(&local_authenticator(vec![map]), json!({}), &[]);

	assert_eq!(bundle.access_allowed, scenario.access_allowed, "{}", scenario.name);
	assert_eq!(bundle.is_superuser, scenario.is_superuser, "{}", scenario.name);
	assert_eq!(serde_json::to_value(&bundle.claims).unwrap(), scenario.claims, "{}", scenario.name);
	assert_eq!(
		serde_json::to_value(&bundle.last_login_map_results).unwrap(),
		scenario.results,
		"{}",
		scenario.name
	);
}

#[test]
fn test_single_map_scenarios() {
	let scenarios = vec![
		Scenario {
			name: "always sets is_superuser",
			triggers: json!({"always": {}}),
			map_type: "is_superuser",
			role: None,
			team: None,
			organization: None,
			access_allowed: true,
			is_superuser: Some(true),
			claims: empty_claims(),
			results: json!([{"1": true, "enabled": true}]),
		},
		Scenario {
			name: "never clears is_superuser",
			triggers: json!({"never": {}}),
			map_type: "is_superuser",
			role: None,
			team: None,
			organization: None,
			access_allowed: true,
			is_superuser: Some(false),
			claims: empty_claims(),
			results: json!([{"1": false, "enabled": true}]),
		},
		Scenario {
			name: "unknown trigger is invalid",
			triggers: json!({"badkey": {}}),
			map_type: "is_superuser",
			role: None,
			team: None,
			organization: None,
			access_allowed: true,
			is_superuser: None,
			claims: empty_claims(),
			results: json!([{"1": "invalid", "enabled": true}]),
		},
		Scenario {
			name: "no trigger is skipped",
			triggers: json!({}),
			map_type: "is_superuser",
			role: None,
			team: None,
			organization: None,
			access_allowed: true,
			is_superuser: None,
			claims: empty_claims(),
			results: json!([{"1": "skipped", "enabled": true}]),
		},
		Scenario {
			name: "allow with never denies access",
			triggers: json!({"never": {}}),
			map_type: "allow",
			role: Some(""),
			team: None,
			organization: None,
			access_allowed: false,
			is_superuser: None,
			claims: empty_claims(),
			results: json!([{"1": false, "enabled": true}]),
		},
		Scenario {
			name: "team role granted",
			triggers: json!({"always": {}}),
			map_type: "team",
			role: Some("Team Member"),
			team: None,
			organization: None,
			access_allowed: true,
			is_superuser: None,
			claims: json!({
				"organization_membership": {},
				"team_membership": {"testorg": {"testteam": true}},
				"rbac_roles": {"system": {"roles": {}}, "organizations": {"testorg": {"roles": {}, "teams": {"testteam": {"roles": {"Team Member": true}}}}}},
			}),
			results: json!([{"1": true, "enabled": true}]),
		},
		Scenario {
			name: "team role removed",
			triggers: json!({"never": {}}),
			map_type: "team",
			role: Some("Team Member"),
			team: None,
			organization: None,
			access_allowed: true,
			is_superuser: None,
			claims: json!({
				"organization_membership": {},
				"team_membership": {"testorg": {"testteam": false}},
				"rbac_roles": {"system": {"roles": {}}, "organizations": {"testorg": {"roles": {}, "teams": {"testteam": {"roles": {"Team Member": false}}}}}},
			}),
			results: json!([{"1": false, "enabled": true}]),
		},
		Scenario {
			name: "organization role granted",
			triggers: json!({"always": {}}),
			map_type: "organization",
			role: Some("Organization Member"),
			team: None,
			organization: None,
			access_allowed: true,
			is_superuser: None,
			claims: json!({
				"organization_membership": {"testorg": true},
				"team_membership": {},
				"rbac_roles": {"system": {"roles": {}}, "organizations": {"testorg": {"roles": {"Organization Member": true}, "teams": {}}}},
			}),
			results: json!([{"1": true, "enabled": true}]),
		},
		Scenario {
			name: "organization role removed",
			triggers: json!({"never": {}}),
			map_type: "organization",
			role: Some("Organization Member"),
			team: None,
			organization: None,
			access_allowed: true,
			is_superuser: None,
			claims: json!({
				"organization_membership": {"testorg": false},
				"team_membership": {},
				"rbac_roles": {"system": {"roles": {}}, "organizations": {"testorg": {"roles": {"Organization Member": false}, "teams": {}}}},
			}),
			results: json!([{"1": false, "enabled": true}]),
		},
		Scenario {
			name: "role map with team",
			triggers: json!({"always": {}}),
			map_type: "role",
			role: Some("Team Member"),
			team: None,
			organization: None,
			access_allowed: true,
			is_superuser: None,
			claims: json!({
				"organization_membership": {},
				"team_membership": {"testorg": {"testteam": true}},
				"rbac_roles": {"system": {"roles": {}}, "organizations": {"testorg": {"roles": {}, "teams": {"testteam": {"roles": {"Team Member": true}}}}}},
			}),
			results: json!([{"1": true, "enabled": true}]),
		},
		Scenario {
			name: "role map with blank team falls back to organization",
			triggers: json!({"always": {}}),
			map_type: "role",
			role: Some("Organization Member"),
			team: Some(" "),
			organization: None,
			access_allowed: true,
			is_superuser: None,
			claims: json!({
				"organization_membership": {"testorg": true},
				"team_membership": {},
				"rbac_roles": {"system": {"roles": {}}, "organizations": {"testorg": {"roles": {"Organization Member": true}, "teams": {}}}},
			}),
			results: json!([{"1": true, "enabled": true}]),
		},
		Scenario {
			name: "role map without scope is a system role",
			triggers: json!({"always": {}}),
			map_type: "role",
			role: Some(SYSTEM_ROLE_NAME),
			team: None,
			organization: Some("    "),
			access_allowed: true,
			is_superuser: None,
			claims: json!({
				"organization_membership": {},
				"team_membership": {},
				"rbac_roles": {"system": {"roles": {SYSTEM_ROLE_NAME: true}}, "organizations": {}},
			}),
			results: json!([{"1": true, "enabled": true}]),
		},
		Scenario {
			name: "unknown map type is ignored",
			triggers: json!({"never": {}}),
			map_type: "bad_map_type",
			role: None,
			team: None,
			organization: None,
			access_allowed: true,
			is_superuser: None,
			claims: empty_claims(),
			results: json!([{"1": false, "enabled": true}]),
		},
	];

	for scenario in &scenarios {
		run_scenario(scenario);
	}
}

#[test]
fn test_bad_map_type_logged_once() {
	let mut map = local_map(1);
	map.map_type = MapType::parse("bad_map_type");
	let name = map.name.clone();

	let (_, sink) = evaluate(&local_authenticator(vec![map]), json!({}), &[]);

	let errors = sink.errors();
	assert_eq!(errors.len(), 1);
	assert_eq!(
		errors[0].event,
		format!("Map type bad_map_type of rule {name} does not know how to be processed")
	);
}

#[test]
fn test_multiple_maps_same_org() {
	let mut first = local_map(1).with_role("Member");
	first.map_type = MapType::Team;
	let mut second = local_map(2)
		.with_triggers(json!({"never": {}}))
		.with_team("different_team")
		.with_role("Member");
	second.map_type = MapType::Team;

	let (bundle, _) = evaluate(&local_authenticator(vec![first, second]), json!({}), &[]);

	assert_eq!(
		serde_json::to_value(&bundle.claims.team_membership).unwrap(),
		json!({"testorg": {"testteam": true, "different_team": false}})
	);
	assert!(bundle.claims.organization_membership.is_empty());
}

#[test]
fn test_later_team_rule_overwrites_earlier() {
	let mut grant = local_map(1);
	grant.map_type = MapType::Team;
	let mut revoke = local_map(2).with_triggers(json!({"never": {}}));
	revoke.map_type = MapType::Team;

	let (bundle, _) = evaluate(&local_authenticator(vec![grant, revoke]), json!({}), &[]);
	assert_eq!(bundle.claims.team_membership["testorg"]["testteam"], false);
}

#[test]
fn test_allow_denial_is_sticky() {
	let mut deny = local_map(1).with_triggers(json!({"never": {}}));
	deny.map_type = MapType::Allow;
	let mut allow = local_map(2);
	allow.map_type = MapType::Allow;

	let (bundle, _) = evaluate(&local_authenticator(vec![deny, allow]), json!({}), &[]);
	assert!(!bundle.access_allowed);
}

#[test]
fn test_revoke_with_skipped_triggers() {
	let triggers = [
		json!({"groups": {"has_or": ["foo"]}}),
		json!({"attributes": {"email": {"contains": "@example.com"}}}),
	];

	for trigger in triggers {
		for revoke in [true, false] {
			let map = local_map(1).with_triggers(trigger.clone()).with_revoke(revoke);
			let (bundle, _) = evaluate(
				&local_authenticator(vec![map]),
				json!({"email": "someone@example.org"}),
				&["bar"],
			);

			assert!(bundle.access_allowed);
			assert_eq!(serde_json::to_value(&bundle.claims).unwrap(), empty_claims());
			if revoke {
				assert_eq!(bundle.is_superuser, Some(false), "{trigger}");
				assert_eq!(
					serde_json::to_value(&bundle.last_login_map_results).unwrap(),
					json!([{"1": false, "enabled": true}])
				);
			} else {
				assert_eq!(bundle.is_superuser, None, "{trigger}");
				assert_eq!(
					serde_json::to_value(&bundle.last_login_map_results).unwrap(),
					json!([{"1": "skipped", "enabled": true}])
				);
			}
		}
	}
}

#[test]
fn test_map_enabled_or_disabled() {
	for enabled in [true, false] {
		let map = local_map(1).with_enabled(enabled);
		let (bundle, _) = evaluate(&local_authenticator(vec![map]), json!({}), &[]);
		if enabled {
			assert!(bundle.is_superuser.is_some());
		} else {
			assert!(bundle.is_superuser.is_none());
			assert!(bundle.last_login_map_results.is_empty());
		}
	}
}

#[test]
fn test_groups_and_attributes_drive_claims() {
	let mut admins = local_map(1).with_triggers(json!({"groups": {"has_or": ["admins"]}}));
	admins.map_type = MapType::IsSuperuser;
	let mut staff = local_map(2)
		.with_triggers(json!({"attributes": {"email": {"ends_with": "@example.com"}}}))
		.with_role("Organization Member")
		.with_team(" ");
	staff.map_type = MapType::Organization;

	let authenticator = local_authenticator(vec![admins, staff]);

	let (bundle, _) = evaluate(&authenticator, json!({"email": "alice@example.com"}), &["admins"]);
	assert_eq!(bundle.is_superuser, Some(true));
	assert_eq!(bundle.claims.organization_membership["testorg"], true);

	let (bundle, _) = evaluate(&authenticator, json!({"email": "mallory@example.org"}), &["users"]);
	assert_eq!(bundle.is_superuser, None);
	assert!(bundle.claims.organization_membership.is_empty());
}
