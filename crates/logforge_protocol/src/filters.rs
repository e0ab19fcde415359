//! Per-action filter variants (spec.md §4.3 "Ruleset dispatcher").

use crate::types::{Facility, Message, Severity};
use serde::{Deserialize, Serialize};

/// 24-entry table indexed by facility; each entry is a bitmask over
/// severities 0..7 plus a sentinel "no-pri" bit (bit 8).
///
/// Supports "=pri" (single), "!pri" (inverse), "*" (all), and per-facility
/// "none" constructions, per spec.md §4.3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityMask {
    /// `table[facility][severity]` is true if a message with that
    /// facility/severity pair passes the filter.
    table: [[bool; 8]; Facility::COUNT],
}

impl PriorityMask {
    /// Filter that matches nothing.
    pub fn none() -> Self {
        Self {
            table: [[false; 8]; Facility::COUNT],
        }
    }

    /// Filter that matches everything (`*.*`).
    pub fn all() -> Self {
        Self {
            table: [[true; 8]; Facility::COUNT],
        }
    }

    /// `facility.=severity`: only that exact severity passes.
    pub fn equals(mut self, facility: Facility, severity: Severity) -> Self {
        self.table[facility as usize] = [false; 8];
        self.table[facility as usize][severity as usize] = true;
        self
    }

    /// `facility.!severity`: every severity except this one passes.
    pub fn not_equals(mut self, facility: Facility, severity: Severity) -> Self {
        self.table[facility as usize] = [true; 8];
        self.table[facility as usize][severity as usize] = false;
        self
    }

    /// `facility.severity`: that severity and everything more severe
    /// (numerically lower) passes -- the conventional syslog `.` selector.
    pub fn at_least(mut self, facility: Facility, severity: Severity) -> Self {
        let mut row = [false; 8];
        for s in 0..=severity.as_u8() {
            row[s as usize] = true;
        }
        self.table[facility as usize] = row;
        self
    }

    /// `facility.none`: nothing from this facility passes.
    pub fn none_for(mut self, facility: Facility) -> Self {
        self.table[facility as usize] = [false; 8];
        self
    }

    pub fn matches(&self, facility: Facility, severity: Severity) -> bool {
        self.table[facility as usize][severity as usize]
    }
}

/// Comparison operator for a property filter (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyOp {
    Contains,
    IsEqual,
    StartsWith,
    /// Always passes; used for a disabled/no-op property filter.
    Nop,
}

/// `(property-name, op, value, negated)`. Comparison is case-sensitive on
/// decoded property strings (spec.md §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFilter {
    pub property_name: String,
    pub op: PropertyOp,
    pub value: String,
    pub negated: bool,
}

impl PropertyFilter {
    pub fn evaluate(&self, property_value: Option<&str>) -> bool {
        let base = match self.op {
            PropertyOp::Nop => true,
            PropertyOp::Contains => property_value.is_some_and(|v| v.contains(&self.value)),
            PropertyOp::IsEqual => property_value.is_some_and(|v| v == self.value),
            PropertyOp::StartsWith => property_value.is_some_and(|v| v.starts_with(&self.value)),
        };
        if self.negated {
            !base
        } else {
            base
        }
    }
}

/// `+host` (include), `-host` (exclude), or `*` (reset -- no comparison).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostSelector {
    Any,
    Include(String),
    Exclude(String),
}

impl Default for HostSelector {
    fn default() -> Self {
        HostSelector::Any
    }
}

impl HostSelector {
    pub fn evaluate(&self, hostname: Option<&str>) -> bool {
        match self {
            HostSelector::Any => true,
            HostSelector::Include(h) => hostname == Some(h.as_str()),
            HostSelector::Exclude(h) => hostname != Some(h.as_str()),
        }
    }
}

/// Program-name (tag) selector; `!tag` negates, `*` resets (spec.md §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagSelector {
    Any,
    Include(String),
    Exclude(String),
}

impl Default for TagSelector {
    fn default() -> Self {
        TagSelector::Any
    }
}

impl TagSelector {
    pub fn evaluate(&self, tag: Option<&str>) -> bool {
        match self {
            TagSelector::Any => true,
            TagSelector::Include(t) => tag == Some(t.as_str()),
            TagSelector::Exclude(t) => tag != Some(t.as_str()),
        }
    }
}

/// The composed per-action filter: host selector, then program selector,
/// then the main filter, all three must pass (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionFilter {
    pub host: HostSelector,
    pub tag: TagSelector,
    pub main: MainFilter,
}

impl Default for ActionFilter {
    /// A binding with no filter configured matches every message --
    /// the `*.*` default every other selector in this module falls back
    /// to when left unspecified.
    fn default() -> Self {
        Self {
            host: HostSelector::Any,
            tag: TagSelector::Any,
            main: MainFilter::Priority(PriorityMask::all()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MainFilter {
    Priority(PriorityMask),
    Property(PropertyFilter),
}

impl Default for MainFilter {
    fn default() -> Self {
        MainFilter::Priority(PriorityMask::all())
    }
}

impl ActionFilter {
    pub fn matches(&self, msg: &Message) -> bool {
        if !self.host.evaluate(msg.hostname.as_deref()) {
            return false;
        }
        if !self.tag.evaluate(msg.tag.as_deref()) {
            return false;
        }
        match &self.main {
            MainFilter::Priority(mask) => mask.matches(msg.pri.facility, msg.pri.severity),
            MainFilter::Property(prop) => {
                let value = property_value(msg, &prop.property_name);
                prop.evaluate(value.as_deref())
            }
        }
    }
}

fn property_value(msg: &Message, property_name: &str) -> Option<String> {
    match property_name {
        "msg" => Some(msg.msg_body.clone()),
        "hostname" => msg.hostname.clone(),
        "tag" => msg.tag.clone(),
        "app-name" => msg.app_name.clone(),
        "syslogtag" => msg.tag.clone(),
        other => msg.metadata.get(other).cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Pri;

    fn msg(facility: Facility, severity: Severity, body: &str) -> Message {
        Message::construct("test", Pri::new(facility, severity), body)
    }

    #[test]
    fn priority_mask_equals_matches_only_exact_severity() {
        let mask = PriorityMask::none().equals(Facility::User, Severity::Err);
        assert!(mask.matches(Facility::User, Severity::Err));
        assert!(!mask.matches(Facility::User, Severity::Warning));
        assert!(!mask.matches(Facility::Kern, Severity::Err));
    }

    #[test]
    fn priority_mask_at_least_includes_more_severe() {
        let mask = PriorityMask::none().at_least(Facility::User, Severity::Warning);
        assert!(mask.matches(Facility::User, Severity::Err));
        assert!(mask.matches(Facility::User, Severity::Warning));
        assert!(!mask.matches(Facility::User, Severity::Notice));
    }

    #[test]
    fn property_filter_contains_case_sensitive() {
        let filter = PropertyFilter {
            property_name: "msg".into(),
            op: PropertyOp::Contains,
            value: "ERROR".into(),
            negated: false,
        };
        assert!(filter.evaluate(Some("an ERROR occurred")));
        assert!(!filter.evaluate(Some("an error occurred")));
    }

    #[test]
    fn action_filter_requires_all_three_selectors() {
        let filter = ActionFilter {
            host: HostSelector::Include("web1".into()),
            tag: TagSelector::Any,
            main: MainFilter::Priority(PriorityMask::all()),
        };
        let mut m = msg(Facility::User, Severity::Info, "hi");
        m.set_hostname("web1");
        assert!(filter.matches(&m));
        m.set_hostname("web2");
        assert!(!filter.matches(&m));
    }
}
