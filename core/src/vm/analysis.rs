use rustc_hash::FxHashMap;

use crate::schema::{Kind, NodeId, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visit {
    /// Position in first-visit order.
    pub order: usize,
    pub count: usize,
}

/// Visit counts for every schema node reachable from a root.
///
/// Pointers are transparent: a `ptr` counts as a visit of its target. A node
/// is descended into on its first visit only, so a shared subtree contributes
/// one visit per reference but its children are counted once.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    visits: FxHashMap<NodeId, Visit>,
    order: Vec<Schema>,
    paths: FxHashMap<NodeId, String>,
    active: Vec<(NodeId, String)>,
    cycle: Option<String>,
}

impl DependencyGraph {
    pub fn analyze(root: &Schema) -> Self {
        let mut graph = Self::default();
        graph.walk(root, "root".to_string());
        graph
    }

    fn walk(&mut self, node: &Schema, path: String) {
        if let Kind::Ptr(_) = node.kind() {
            let mut chain = vec![node.id()];
            let mut current = node;
            // Unresolved pointers are reported by the compiler.
            while let Some(target) = current.target() {
                if !matches!(target.kind(), Kind::Ptr(_)) {
                    self.walk(target, path);
                    return;
                }
                if chain.contains(&target.id()) {
                    if self.cycle.is_none() {
                        self.cycle = Some(format!("pointer cycle: {path} refers back to itself"));
                    }
                    return;
                }
                chain.push(target.id());
                current = target;
            }
            return;
        }

        let id = node.id();
        if let Some((_, open)) = self.active.iter().find(|(active, _)| *active == id) {
            if self.cycle.is_none() {
                self.cycle = Some(format!("pointer cycle: {path} refers back to {open}"));
            }
            return;
        }

        let next_order = self.order.len();
        let visit = self.visits.entry(id).or_insert(Visit {
            order: next_order,
            count: 0,
        });
        visit.count += 1;
        if visit.count > 1 {
            return;
        }
        self.order.push(node.clone());
        self.paths.insert(id, path.clone());

        self.active.push((id, path.clone()));
        for (key, child) in node.children() {
            let child_path = match key {
                Some(key) if key.as_ref() == "[]" => format!("{path}[]"),
                Some(key) => format!("{path}.{key}"),
                None => path.clone(),
            };
            self.walk(&child, child_path);
        }
        self.active.pop();
    }

    pub fn visit(&self, id: NodeId) -> Option<Visit> {
        self.visits.get(&id).copied()
    }

    /// Nodes reached more than once, in first-visit order.
    pub fn subroutines(&self) -> Vec<Schema> {
        self.order
            .iter()
            .filter(|node| self.visits.get(&node.id()).is_some_and(|v| v.count > 1))
            .cloned()
            .collect()
    }

    /// Schema path at which the node was first reached.
    pub fn path_of(&self, id: NodeId) -> Option<&str> {
        self.paths.get(&id).map(String::as_str)
    }

    /// First pointer cycle found, described by the schema paths involved.
    pub fn cycle(&self) -> Option<&str> {
        self.cycle.as_deref()
    }

    pub fn node_count(&self) -> usize {
        self.order.len()
    }
}
