//! The container table: what the poller has discovered, and what the
//! streaming side needs to know about each one (spec.md §3 "Container
//! log input (imdocker)", §4.6).

use logforge_ids::ContainerId;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub labels: serde_json::Value,
    /// Per-container override for multi-line start-of-record detection,
    /// from the `imdocker.startregex` label (spec.md §4.6).
    pub start_regex: Option<String>,
    /// Whether this container's existing backlog has already been
    /// consumed once (spec.md §4.6 "tail=1 on first attach, full stream
    /// thereafter").
    pub tail_applied: bool,
}

#[derive(Default)]
pub struct ContainerTable {
    containers: Mutex<HashMap<ContainerId, ContainerInfo>>,
}

impl ContainerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly-discovered container; returns `true` if it wasn't
    /// already tracked (i.e. a stream should be started for it).
    pub fn insert_if_absent(&self, info: ContainerInfo) -> bool {
        let mut table = self.containers.lock().expect("container table mutex poisoned");
        if table.contains_key(&info.id) {
            false
        } else {
            table.insert(info.id.clone(), info);
            true
        }
    }

    pub fn remove(&self, id: &ContainerId) -> Option<ContainerInfo> {
        self.containers.lock().expect("container table mutex poisoned").remove(id)
    }

    pub fn mark_tail_applied(&self, id: &ContainerId) {
        if let Some(info) = self.containers.lock().expect("container table mutex poisoned").get_mut(id) {
            info.tail_applied = true;
        }
    }

    pub fn get(&self, id: &ContainerId) -> Option<ContainerInfo> {
        self.containers.lock().expect("container table mutex poisoned").get(id).cloned()
    }

    pub fn known_ids(&self) -> Vec<ContainerId> {
        self.containers
            .lock()
            .expect("container table mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.containers.lock().expect("container table mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str) -> ContainerInfo {
        ContainerInfo {
            id: ContainerId::parse(id.repeat(64 / id.len())).unwrap(),
            name: "web1".into(),
            image: "nginx".into(),
            labels: serde_json::json!({}),
            start_regex: None,
            tail_applied: false,
        }
    }

    #[test]
    fn insert_if_absent_only_true_once() {
        let table = ContainerTable::new();
        assert!(table.insert_if_absent(info("a")));
        assert!(!table.insert_if_absent(info("a")));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remove_forgets_the_container() {
        let table = ContainerTable::new();
        table.insert_if_absent(info("a"));
        assert!(table.remove(&info("a").id).is_some());
        assert!(table.is_empty());
    }
}
