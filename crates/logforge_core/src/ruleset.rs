//! Ruleset dispatch: routes a `Message` to the actions bound to its
//! ruleset, in binding order (spec.md §3 "Ruleset", §4.3).

use logforge_ids::{ActionName, RulesetName};
use logforge_protocol::filters::ActionFilter;
use logforge_protocol::types::Message;
use std::collections::HashMap;

/// One `filter => action` binding within a ruleset. Bindings are
/// evaluated in declaration order; a message can match more than one
/// binding, since syslog rulesets fan out rather than short-circuit on
/// first match (spec.md §4.3).
pub struct Binding {
    pub filter: ActionFilter,
    pub action: ActionName,
}

pub struct Ruleset {
    pub name: RulesetName,
    pub bindings: Vec<Binding>,
}

impl Ruleset {
    pub fn new(name: RulesetName) -> Self {
        Self {
            name,
            bindings: Vec::new(),
        }
    }

    pub fn bind(&mut self, filter: ActionFilter, action: ActionName) -> &mut Self {
        self.bindings.push(Binding { filter, action });
        self
    }

    /// Every action name whose filter matches `msg`, in binding order.
    pub fn dispatch(&self, msg: &Message) -> Vec<ActionName> {
        self.bindings
            .iter()
            .filter(|b| b.filter.matches(msg))
            .map(|b| b.action.clone())
            .collect()
    }
}

/// All configured rulesets, keyed by name. A message with no explicit
/// `ruleset` set is routed to `"RSYSLOG_DefaultRuleset"`, matching the
/// legacy default-ruleset name (spec.md §9 design note on ruleset
/// binding).
pub struct RulesetTable {
    rulesets: HashMap<RulesetName, Ruleset>,
    default: RulesetName,
}

impl RulesetTable {
    pub fn new(default: RulesetName) -> Self {
        Self {
            rulesets: HashMap::new(),
            default,
        }
    }

    pub fn insert(&mut self, ruleset: Ruleset) {
        self.rulesets.insert(ruleset.name.clone(), ruleset);
    }

    pub fn get(&self, name: &RulesetName) -> Option<&Ruleset> {
        self.rulesets.get(name)
    }

    /// Resolve the ruleset bound to `msg` (falling back to the default)
    /// and dispatch it, returning the matching action names.
    pub fn dispatch(&self, msg: &Message) -> Vec<ActionName> {
        let name = msg.ruleset.as_ref().unwrap_or(&self.default);
        match self.rulesets.get(name) {
            Some(ruleset) => ruleset.dispatch(msg),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logforge_protocol::filters::{HostSelector, MainFilter, PriorityMask, TagSelector};
    use logforge_protocol::types::{Facility, Pri, Severity};

    #[test]
    fn dispatch_falls_back_to_default_ruleset_when_unset() {
        let default_name: RulesetName = "RSYSLOG_DefaultRuleset".parse().unwrap();
        let mut table = RulesetTable::new(default_name.clone());
        let mut ruleset = Ruleset::new(default_name);
        let action: ActionName = "forward-main".parse().unwrap();
        ruleset.bind(
            ActionFilter {
                host: HostSelector::Any,
                tag: TagSelector::Any,
                main: MainFilter::Priority(PriorityMask::all()),
            },
            action.clone(),
        );
        table.insert(ruleset);

        let msg = Message::construct("test", Pri::new(Facility::User, Severity::Info), "hi");
        assert_eq!(table.dispatch(&msg), vec![action]);
    }

    #[test]
    fn dispatch_can_fan_out_to_multiple_actions() {
        let default_name: RulesetName = "RSYSLOG_DefaultRuleset".parse().unwrap();
        let mut table = RulesetTable::new(default_name.clone());
        let mut ruleset = Ruleset::new(default_name);
        let a1: ActionName = "forward-main".parse().unwrap();
        let a2: ActionName = "file-audit".parse().unwrap();
        ruleset.bind(
            ActionFilter {
                host: HostSelector::Any,
                tag: TagSelector::Any,
                main: MainFilter::Priority(PriorityMask::all()),
            },
            a1.clone(),
        );
        ruleset.bind(
            ActionFilter {
                host: HostSelector::Any,
                tag: TagSelector::Any,
                main: MainFilter::Priority(PriorityMask::none().at_least(Facility::User, Severity::Warning)),
            },
            a2.clone(),
        );
        table.insert(ruleset);

        let msg = Message::construct("test", Pri::new(Facility::User, Severity::Err), "hi");
        assert_eq!(table.dispatch(&msg), vec![a1, a2]);
    }
}
