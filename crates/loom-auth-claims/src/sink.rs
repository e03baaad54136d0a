// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Structured event sinks for configuration problems found during evaluation.
//!
//! The evaluator never writes to a global logger. Callers pass an
//! [`EventSink`]; production code uses [`TracingSink`], tests and offline
//! tooling use [`RecordingSink`].

use std::cell::RefCell;

use tracing::{error, warn};

/// A key/value pair attached to an event.
pub type EventField<'a> = (&'a str, String);

/// Receives configuration problems found while evaluating rules.
pub trait EventSink {
	/// Reports a problem that makes a rule unusable.
	fn error(&self, event: &str, fields: &[EventField<'_>]);

	/// Reports a problem the evaluator worked around.
	fn warn(&self, event: &str, fields: &[EventField<'_>]) {
		let _ = (event, fields);
	}
}

/// Keys forwarded to `tracing` as fields of their own.
const STRUCTURED_KEYS: [&str; 5] = ["rule_id", "rule", "map_type", "authenticator_id", "user_id"];

fn field_value<'a>(fields: &'a [EventField<'_>], key: &str) -> Option<&'a str> {
	fields
		.iter()
		.find(|(k, _)| *k == key)
		.map(|(_, v)| v.as_str())
}

/// Renders the fields without a dedicated `tracing` field as `k=v` pairs.
fn render_extra_fields(fields: &[EventField<'_>]) -> Option<String> {
	let rendered: Vec<String> = fields
		.iter()
		.filter(|(key, _)| !STRUCTURED_KEYS.contains(key))
		.map(|(key, value)| format!("{key}={value}"))
		.collect();
	(!rendered.is_empty()).then(|| rendered.join(" "))
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
	fn error(&self, event: &str, fields: &[EventField<'_>]) {
		error!(
			rule_id = field_value(fields, "rule_id"),
			rule = field_value(fields, "rule"),
			map_type = field_value(fields, "map_type"),
			authenticator_id = field_value(fields, "authenticator_id"),
			user_id = field_value(fields, "user_id"),
			details = render_extra_fields(fields).as_deref(),
			"{event}"
		);
	}

	fn warn(&self, event: &str, fields: &[EventField<'_>]) {
		warn!(
			rule_id = field_value(fields, "rule_id"),
			rule = field_value(fields, "rule"),
			map_type = field_value(fields, "map_type"),
			authenticator_id = field_value(fields, "authenticator_id"),
			user_id = field_value(fields, "user_id"),
			details = render_extra_fields(fields).as_deref(),
			"{event}"
		);
	}
}

/// Severity of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
	Error,
	Warn,
}

/// An event captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
	pub level: EventLevel,
	pub event: String,
	pub fields: Vec<(String, String)>,
}

impl RecordedEvent {
	/// Returns the value of a field, if present.
	pub fn field(&self, key: &str) -> Option<&str> {
		self
			.fields
			.iter()
			.find(|(k, _)| k == key)
			.map(|(_, v)| v.as_str())
	}
}

/// Keeps every event in memory, in the order it was reported.
#[derive(Debug, Default)]
pub struct RecordingSink {
	events: RefCell<Vec<RecordedEvent>>,
}

impl RecordingSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn events(&self) -> Vec<RecordedEvent> {
		self.events.borrow().clone()
	}

	pub fn errors(&self) -> Vec<RecordedEvent> {
		self.by_level(EventLevel::Error)
	}

	pub fn warnings(&self) -> Vec<RecordedEvent> {
		self.by_level(EventLevel::Warn)
	}

	fn by_level(&self, level: EventLevel) -> Vec<RecordedEvent> {
		self
			.events
			.borrow()
			.iter()
			.filter(|e| e.level == level)
			.cloned()
			.collect()
	}

	fn record(&self, level: EventLevel, event: &str, fields: &[EventField<'_>]) {
		self.events.borrow_mut().push(RecordedEvent {
			level,
			event: event.to_string(),
			fields: fields
				.iter()
				.map(|(k, v)| ((*k).to_string(), v.clone()))
				.collect(),
		});
	}
}

impl EventSink for RecordingSink {
	fn error(&self, event: &str, fields: &[EventField<'_>]) {
		self.record(EventLevel::Error, event, fields);
	}

	fn warn(&self, event: &str, fields: &[EventField<'_>]) {
		self.record(EventLevel::Warn, event, fields);
	}
}
