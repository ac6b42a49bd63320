//! Element-lookup rules for the in-page action executor.
//!
//! Rules are tried in order; the first one that yields an element wins.
//! A [`LookupRule::Shadow`] rule first resolves a host element in the document
//! and then evaluates its selector inside the host's open shadow root.

use serde::{Deserialize, Serialize};

/// One site-specific rule for locating the element to act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LookupRule {
	/// Plain `querySelector` against the document.
	Css { selector: String },
	/// `querySelector(host)`, then `host.shadowRoot.querySelector(selector)`.
	Shadow { host: String, selector: String },
}

impl LookupRule {
	pub fn css(selector: impl Into<String>) -> Self {
		LookupRule::Css {
			selector: selector.into(),
		}
	}

	pub fn shadow(host: impl Into<String>, selector: impl Into<String>) -> Self {
		LookupRule::Shadow {
			host: host.into(),
			selector: selector.into(),
		}
	}

	/// Short label used in logs and in [`ActionOutcome::Performed`](crate::ActionOutcome::Performed).
	pub fn label(&self) -> String {
		match self {
			LookupRule::Css { selector } => selector.clone(),
			LookupRule::Shadow { host, selector } => format!("{host} >>> {selector}"),
		}
	}
}

/// Built-in rules for the supported grocery storefronts.
pub fn default_rules() -> Vec<LookupRule> {
	vec![
		LookupRule::shadow("wc-add-to-cart", ".add-to-cart-btn"),
		LookupRule::css(r#"[data-testid="add-to-cart-button"]"#),
		LookupRule::css(".add-to-cart-button"),
		LookupRule::css(r#"button[class*="add-to-cart"]"#),
	]
}
