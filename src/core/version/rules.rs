// ─── Rules ───
// Pure predicate evaluation for library and argument rules against an
// explicit `Platform`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::platform::Platform;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeMap<String, bool>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    /// Version pattern, e.g. `^10\\.`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Rule {
    pub fn allow() -> Self {
        Self {
            action: RuleAction::Allow,
            os: None,
            features: None,
        }
    }

    pub fn disallow() -> Self {
        Self {
            action: RuleAction::Disallow,
            ..Self::allow()
        }
    }

    pub fn on_os(mut self, name: &str) -> Self {
        self.os.get_or_insert_with(OsRule::default).name = Some(name.to_string());
        self
    }

    pub fn with_feature(mut self, name: &str, value: bool) -> Self {
        self.features
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), value);
        self
    }

    /// A rule matches when every constraint it names holds.
    pub fn matches(&self, platform: &Platform) -> bool {
        if let Some(os) = &self.os {
            if os.name.as_deref().is_some_and(|n| n != platform.os) {
                return false;
            }
            if os.arch.as_deref().is_some_and(|a| a != platform.arch) {
                return false;
            }
            if let Some(pattern) = &os.version {
                match &platform.os_version {
                    Some(actual) if os_version_matches(pattern, actual) => {}
                    _ => return false,
                }
            }
        }

        if let Some(features) = &self.features {
            if features
                .iter()
                .any(|(name, expected)| platform.feature(name) != *expected)
            {
                return false;
            }
        }

        true
    }
}

/// Evaluate a rule list. The last matching rule decides. When nothing
/// matches, a list containing any `allow` rule excludes and a pure deny-list
/// includes. An empty list always includes.
pub fn rules_allow(rules: &[Rule], platform: &Platform) -> bool {
    if rules.is_empty() {
        return true;
    }

    let mut allowed = !rules.iter().any(|r| r.action == RuleAction::Allow);
    for rule in rules {
        if rule.matches(platform) {
            allowed = rule.action == RuleAction::Allow;
        }
    }
    allowed
}

/// Patterns in descriptors are anchored prefixes (`^10\\.`); only that shape
/// is understood.
fn os_version_matches(pattern: &str, actual: &str) -> bool {
    let prefix = pattern
        .trim_start_matches('^')
        .trim_end_matches('$')
        .replace("\\.", ".");
    actual.starts_with(&prefix)
}
