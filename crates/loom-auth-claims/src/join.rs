// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Three-valued `and`/`or` joins.
//!
//! `None` means "no opinion yet". Joining anything onto `None` yields the new
//! value unchanged; otherwise the usual boolean operator applies, with `None`
//! on the right treated as unknown (`true or None == true`,
//! `false or None == None`, `true and None == None`, `false and None == false`).

/// A logical operator for combining sub-results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinCondition {
	And,
	#[default]
	Or,
}

impl JoinCondition {
	/// Parses `"and"` or `"or"`; anything else is `None`.
	pub fn parse(value: &str) -> Option<Self> {
		match value {
			"and" => Some(JoinCondition::And),
			"or" => Some(JoinCondition::Or),
			_ => None,
		}
	}

	/// Joins `new` onto `current`.
	pub fn combine(self, current: Option<bool>, new: Option<bool>) -> Option<bool> {
		let Some(current) = current else {
			return new;
		};
		match self {
			JoinCondition::Or => {
				if current {
					Some(true)
				} else {
					new
				}
			}
			JoinCondition::And => {
				if current {
					new
				} else {
					Some(false)
				}
			}
		}
	}
}

/// Joins `new` onto `current` using a condition given as text.
///
/// An unset `current` always yields `new`. An unrecognised condition yields
/// `None` rather than falling back to a default.
pub fn has_access_with_join(
	current: Option<bool>,
	new: Option<bool>,
	condition: &str,
) -> Option<bool> {
	if current.is_none() {
		return new;
	}
	JoinCondition::parse(condition)?.combine(current, new)
}
