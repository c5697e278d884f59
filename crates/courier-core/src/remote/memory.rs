use super::{ContainerLevel, ContainerRef, RemoteStore};
use crate::error::Error;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct Node {
    id: String,
    parent: Option<String>,
    level: ContainerLevel,
    label: String,
}

#[derive(Debug, Clone)]
pub struct Deposit {
    pub container_label: String,
    pub file_name: String,
    pub metadata: Value,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: Vec<Node>,
    deposits: Vec<Deposit>,
    next_id: u64,
    find_calls: usize,
    create_calls: usize,
    deposit_calls: usize,
    // Scripted faults
    fail_deposits: HashSet<String>,
    conflict_labels: HashSet<String>,
    failing_finds_remaining: usize,
}

/// In-memory [`RemoteStore`], a Mutex-guarded container tree. Supports
/// scripted faults so tests can exercise the pipeline's isolation and retry
/// behavior without a network.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Store seeded with a single project node.
    pub fn with_project(label: &str) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().unwrap();
            let id = next_id(&mut inner);
            inner.nodes.push(Node {
                id,
                parent: None,
                level: ContainerLevel::Project,
                label: label.to_string(),
            });
        }
        store
    }

    /// Make every deposit of `file_name` fail with a remote error.
    pub fn fail_deposit_of(&self, file_name: &str) {
        self.inner
            .lock()
            .unwrap()
            .fail_deposits
            .insert(file_name.to_string());
    }

    /// Make the next create of `label` lose a simulated race: the container
    /// appears (the "winner's"), but the call returns a conflict.
    pub fn conflict_on_create(&self, label: &str) {
        self.inner
            .lock()
            .unwrap()
            .conflict_labels
            .insert(label.to_string());
    }

    /// Make the next `n` find_child calls fail with a transient remote error.
    pub fn fail_next_finds(&self, n: usize) {
        self.inner.lock().unwrap().failing_finds_remaining = n;
    }

    pub fn container_count(&self) -> usize {
        self.inner.lock().unwrap().nodes.len()
    }

    pub fn labels_at(&self, level: ContainerLevel) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .nodes
            .iter()
            .filter(|n| n.level == level)
            .map(|n| n.label.clone())
            .collect()
    }

    pub fn deposits(&self) -> Vec<Deposit> {
        self.inner.lock().unwrap().deposits.clone()
    }

    pub fn find_calls(&self) -> usize {
        self.inner.lock().unwrap().find_calls
    }

    pub fn create_calls(&self) -> usize {
        self.inner.lock().unwrap().create_calls
    }

    pub fn deposit_calls(&self) -> usize {
        self.inner.lock().unwrap().deposit_calls
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn next_id(inner: &mut Inner) -> String {
    inner.next_id += 1;
    format!("mem-{}", inner.next_id)
}

fn to_ref(node: &Node) -> ContainerRef {
    ContainerRef {
        id: node.id.clone(),
        label: node.label.clone(),
        level: node.level,
    }
}

impl RemoteStore for MemoryStore {
    fn find_project(&self, label_prefix: &str) -> Result<Option<ContainerRef>, Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .nodes
            .iter()
            .find(|n| n.level == ContainerLevel::Project && n.label.starts_with(label_prefix))
            .map(to_ref))
    }

    fn find_child(
        &self,
        parent: &ContainerRef,
        label: &str,
    ) -> Result<Option<ContainerRef>, Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.find_calls += 1;

        if inner.failing_finds_remaining > 0 {
            inner.failing_finds_remaining -= 1;
            return Err(Error::Remote("transient lookup failure".to_string()));
        }

        Ok(inner
            .nodes
            .iter()
            .find(|n| n.parent.as_deref() == Some(parent.id.as_str()) && n.label == label)
            .map(to_ref))
    }

    fn create_child(&self, parent: &ContainerRef, label: &str) -> Result<ContainerRef, Error> {
        let level = parent.level.child().ok_or_else(|| {
            Error::Remote(format!("Container level {:?} has no children", parent.level))
        })?;

        let mut inner = self.inner.lock().unwrap();
        inner.create_calls += 1;

        let conflicted = inner.conflict_labels.remove(label);

        let id = next_id(&mut inner);
        let node = Node {
            id,
            parent: Some(parent.id.clone()),
            level,
            label: label.to_string(),
        };
        let container = to_ref(&node);
        inner.nodes.push(node);

        if conflicted {
            return Err(Error::CreateConflict(label.to_string()));
        }
        Ok(container)
    }

    fn deposit_file(
        &self,
        container: &ContainerRef,
        _local_path: &Path,
        file_name: &str,
        metadata: &Value,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.deposit_calls += 1;

        if inner.fail_deposits.contains(file_name) {
            return Err(Error::Remote(format!(
                "scripted deposit failure for '{}'",
                file_name
            )));
        }

        inner.deposits.push(Deposit {
            container_label: container.label.clone(),
            file_name: file_name.to_string(),
            metadata: metadata.clone(),
        });
        Ok(())
    }
}
