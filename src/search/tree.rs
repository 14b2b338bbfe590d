//! The argument tree and its walker (C8, half one).
//!
//! Grounded on `original_source/lib/strace/search.py`'s `MappingTree`/
//! `ContainerNode`/`ListNode`/`DictNode`/`ValueNode`/`MappedValueNode` node
//! kinds and `TreeWalker`'s navigation/mutation operations. The source
//! walker is a mutable cursor over a live object graph; this port instead
//! recomputes the current position by re-descending from the root along a
//! stored path on every access, trading a little CPU for a structure that
//! survives Rust's aliasing rules without `Rc<RefCell<_>>` throughout. The
//! operation set named in spec.md §4.8 (`up`/`down`/`next`/`previous`/
//! `first`/`last`/`down_to_key`/`replace`/`remove`/`insert_next`/`map`/
//! `unmap`) is preserved exactly; only the navigation mechanics differ.

use crate::trace::{Arguments, ParameterKey};

/// One node of the migration target's argument tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    List(Vec<Node>),
    /// Order-preserving key/value pairs (an `Arguments::Object` is
    /// unordered JSON, but the walker needs stable traversal order).
    Mapping(Vec<(String, Node)>),
    Value(serde_json::Value),
    /// A leaf whose original value was replaced by a source parameter,
    /// remembering the target's original value (for `unmap`) and the
    /// substituted source parameter's value (what `to_value` renders).
    Mapped {
        original: serde_json::Value,
        parameter_key: ParameterKey,
        source_value: serde_json::Value,
    },
}

impl Node {
    pub fn from_value(value: &Arguments) -> Node {
        match value {
            Arguments::Array(items) => Node::List(items.iter().map(Node::from_value).collect()),
            Arguments::Object(map) => {
                Node::Mapping(map.iter().map(|(k, v)| (k.clone(), Node::from_value(v))).collect())
            }
            other => Node::Value(other.clone()),
        }
    }

    pub fn to_value(&self) -> Arguments {
        match self {
            Node::List(items) => Arguments::Array(items.iter().map(Node::to_value).collect()),
            Node::Mapping(entries) => {
                Arguments::Object(entries.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
            }
            Node::Value(v) => v.clone(),
            // spec.md §6: the migrated target's arguments are rewritten by
            // substituting the *source*-parameter value at mapped keys, not
            // the target's own original value.
            Node::Mapped { source_value, .. } => source_value.clone(),
        }
    }

    fn children_len(&self) -> usize {
        match self {
            Node::List(items) => items.len(),
            Node::Mapping(entries) => entries.len(),
            Node::Value(_) | Node::Mapped { .. } => 0,
        }
    }
}

/// One step of a path from the tree root to the current position: an index
/// into a `List`, or a key into a `Mapping`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Index(usize),
    Key(String),
}

/// A cursor over a [`Node`] tree, re-descended from the root on every
/// navigation call along a stored `path`.
pub struct TreeWalker {
    root: Node,
    path: Vec<Step>,
}

impl TreeWalker {
    pub fn new(root: Node) -> Self {
        TreeWalker { root, path: Vec::new() }
    }

    pub fn into_root(self) -> Node {
        self.root
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    fn node_at<'a>(root: &'a Node, path: &[Step]) -> Option<&'a Node> {
        let mut cur = root;
        for step in path {
            cur = match (cur, step) {
                (Node::List(items), Step::Index(i)) => items.get(*i)?,
                (Node::Mapping(entries), Step::Key(k)) => &entries.iter().find(|(key, _)| key == k)?.1,
                _ => return None,
            };
        }
        Some(cur)
    }

    fn node_at_mut<'a>(root: &'a mut Node, path: &[Step]) -> Option<&'a mut Node> {
        let mut cur = root;
        for step in path {
            cur = match (cur, step) {
                (Node::List(items), Step::Index(i)) => items.get_mut(*i)?,
                (Node::Mapping(entries), Step::Key(k)) => &mut entries.iter_mut().find(|(key, _)| key == k)?.1,
                _ => return None,
            };
        }
        Some(cur)
    }

    /// The node at the current position, or `None` if the path addresses a
    /// one-past-the-end list position (only valid for `replace`, which in
    /// that case extends the list).
    pub fn current(&self) -> Option<&Node> {
        Self::node_at(&self.root, &self.path)
    }

    /// Move to the parent of the current position.
    pub fn up(&mut self) -> bool {
        self.path.pop().is_some()
    }

    fn parent_path(&self) -> &[Step] {
        &self.path[..self.path.len().saturating_sub(1)]
    }

    /// Move into the first child of the current node.
    pub fn down(&mut self) -> bool {
        self.first()
    }

    pub fn first(&mut self) -> bool {
        match self.current() {
            Some(Node::List(items)) if !items.is_empty() => {
                self.path.push(Step::Index(0));
                true
            }
            Some(Node::Mapping(entries)) if !entries.is_empty() => {
                let key = entries[0].0.clone();
                self.path.push(Step::Key(key));
                true
            }
            _ => false,
        }
    }

    pub fn last(&mut self) -> bool {
        match self.current() {
            Some(Node::List(items)) if !items.is_empty() => {
                self.path.push(Step::Index(items.len() - 1));
                true
            }
            Some(Node::Mapping(entries)) if !entries.is_empty() => {
                let key = entries[entries.len() - 1].0.clone();
                self.path.push(Step::Key(key));
                true
            }
            _ => false,
        }
    }

    /// Descend through a chain of mapping keys / list indices from the
    /// current position, e.g. `down_to_key(&["ANSIBLE_MODULE_ARGS", "name"])`.
    pub fn down_to_key(&mut self, keys: &[&str]) -> bool {
        let mut saved = self.path.clone();
        for &k in keys {
            let stepped = if let Ok(index) = k.parse::<usize>() {
                matches!(self.current(), Some(Node::List(_))) && {
                    self.path.push(Step::Index(index));
                    self.current().is_some()
                }
            } else {
                matches!(self.current(), Some(Node::Mapping(_))) && {
                    self.path.push(Step::Key(k.to_string()));
                    self.current().is_some()
                }
            };
            if !stepped {
                self.path = saved;
                return false;
            }
            saved = self.path.clone();
        }
        true
    }

    /// Move to the next sibling. With `allow_extend`, a position at the end
    /// of a list may advance one past the last element (`len`), addressing
    /// the "falling off the end" position spec.md §4.8 uses during the
    /// mapping-growth pass.
    pub fn next(&mut self, allow_extend: bool) -> bool {
        let Some(last) = self.path.last().cloned() else { return false };
        let parent_path = self.parent_path().to_vec();
        let Some(parent) = Self::node_at(&self.root, &parent_path) else { return false };
        match (parent, last) {
            (Node::List(items), Step::Index(i)) => {
                if i + 1 < items.len() {
                    *self.path.last_mut().unwrap() = Step::Index(i + 1);
                    true
                } else if allow_extend && i == items.len() {
                    // already at the one-past-end sentinel; nothing further
                    false
                } else if allow_extend && i + 1 == items.len() {
                    *self.path.last_mut().unwrap() = Step::Index(i + 1);
                    true
                } else {
                    false
                }
            }
            (Node::Mapping(entries), Step::Key(k)) => match entries.iter().position(|(key, _)| *key == k) {
                Some(pos) if pos + 1 < entries.len() => {
                    *self.path.last_mut().unwrap() = Step::Key(entries[pos + 1].0.clone());
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    pub fn previous(&mut self) -> bool {
        let Some(last) = self.path.last().cloned() else { return false };
        let parent_path = self.parent_path().to_vec();
        let Some(parent) = Self::node_at(&self.root, &parent_path) else { return false };
        match (parent, last) {
            (Node::List(_), Step::Index(i)) if i > 0 => {
                *self.path.last_mut().unwrap() = Step::Index(i - 1);
                true
            }
            (Node::Mapping(entries), Step::Key(k)) => match entries.iter().position(|(key, _)| *key == k) {
                Some(pos) if pos > 0 => {
                    *self.path.last_mut().unwrap() = Step::Key(entries[pos - 1].0.clone());
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Replace the node at the current position. If the current position is
    /// the one-past-end address of a list (`len`), `node` is appended
    /// instead (extending the list with a single real element — spec.md
    /// §4.8's "replace at such an index extends the list").
    pub fn replace(&mut self, node: Node) {
        if self.current().is_some() {
            if let Some(target) = Self::node_at_mut(&mut self.root, &self.path) {
                *target = node;
                return;
            }
        }
        // one-past-end extension
        let parent_path = self.parent_path().to_vec();
        if let Some(Node::List(items)) = Self::node_at_mut(&mut self.root, &parent_path) {
            items.push(node);
        }
    }

    /// Remove the current node, returning `(step-that-addressed-it, node)`.
    pub fn remove(&mut self) -> Option<(Step, Node)> {
        let step = self.path.pop()?;
        let parent = Self::node_at_mut(&mut self.root, &self.path)?;
        match (parent, &step) {
            (Node::List(items), Step::Index(i)) if *i < items.len() => Some((step, items.remove(*i))),
            (Node::Mapping(entries), Step::Key(k)) => {
                let pos = entries.iter().position(|(key, _)| key == k)?;
                Some((step, entries.remove(pos).1))
            }
            _ => None,
        }
    }

    /// Insert `node` immediately after the current position (same parent).
    /// `step` names the key/index the new node is filed under for a mapping
    /// parent; ignored for a list parent, where the node is simply placed
    /// next.
    pub fn insert_next(&mut self, step: Step, node: Node) -> bool {
        let Some(last) = self.path.last().cloned() else { return false };
        let parent_path = self.parent_path().to_vec();
        let Some(parent) = Self::node_at_mut(&mut self.root, &parent_path) else { return false };
        match (parent, last, step) {
            (Node::List(items), Step::Index(i), _) => {
                items.insert((i + 1).min(items.len()), node);
                true
            }
            (Node::Mapping(entries), Step::Key(k), Step::Key(new_key)) => {
                let pos = entries.iter().position(|(key, _)| *key == k).unwrap_or(entries.len());
                entries.insert(pos + 1, (new_key, node));
                true
            }
            _ => false,
        }
    }

    /// Replace the current node with a [`Node::Mapped`] referencing
    /// `parameter_key`, remembering the target's original value for `unmap`
    /// and storing `source_value` (the source parameter's value) as what
    /// gets rendered into the migrated target's arguments.
    pub fn map(&mut self, parameter_key: ParameterKey, source_value: serde_json::Value) {
        let original = self.current().map(Node::to_value).unwrap_or(serde_json::Value::Null);
        self.replace(Node::Mapped {
            original,
            parameter_key,
            source_value,
        });
    }

    /// Restore the current [`Node::Mapped`] position to its original value.
    pub fn unmap(&mut self) {
        if let Some(Node::Mapped { original, .. }) = self.current() {
            let value = original.clone();
            self.replace(Node::Value(value));
        }
    }

    pub fn current_parameter_key(&self) -> Option<&ParameterKey> {
        match self.current() {
            Some(Node::Mapped { parameter_key, .. }) => Some(parameter_key),
            _ => None,
        }
    }

    /// Jump directly to an absolute path collected earlier (e.g. from
    /// [`postorder_paths`]), without re-walking step by step. Trusts the
    /// caller: a one-past-end list address from an `allow_extend` walk is
    /// accepted even though [`Self::current`] will report it as absent.
    pub fn goto(&mut self, path: &[Step]) {
        self.path = path.to_vec();
    }

    pub fn current_path(&self) -> &[Step] {
        &self.path
    }
}

/// All node paths in the tree, in postorder (children before parent),
/// optionally including the one-past-end address of every list (the
/// "falling off" position the mapping-growth pass needs).
pub fn postorder_paths(root: &Node, allow_extend: bool) -> Vec<Vec<Step>> {
    fn walk(node: &Node, prefix: &mut Vec<Step>, allow_extend: bool, out: &mut Vec<Vec<Step>>) {
        match node {
            Node::List(items) => {
                for (i, child) in items.iter().enumerate() {
                    prefix.push(Step::Index(i));
                    walk(child, prefix, allow_extend, out);
                    prefix.pop();
                }
                if allow_extend {
                    prefix.push(Step::Index(items.len()));
                    out.push(prefix.clone());
                    prefix.pop();
                }
            }
            Node::Mapping(entries) => {
                for (k, child) in entries {
                    prefix.push(Step::Key(k.clone()));
                    walk(child, prefix, allow_extend, out);
                    prefix.pop();
                }
            }
            Node::Value(_) | Node::Mapped { .. } => {}
        }
        out.push(prefix.clone());
    }
    let mut out = Vec::new();
    let mut prefix = Vec::new();
    walk(root, &mut prefix, allow_extend, &mut out);
    // The root itself (empty path) is pushed last by `walk`; callers that
    // only want to touch addressable sub-nodes can skip it, but leaf/root
    // scalars (e.g. a bare string command-line) need it reachable too.
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Node {
        Node::from_value(&serde_json::json!({
            "name": "alice",
            "groups": ["sudo", "wheel"],
        }))
    }

    #[test]
    fn down_to_key_navigates_nested_mapping_and_list() {
        let mut walker = TreeWalker::new(sample());
        assert!(walker.down_to_key(&["groups", "1"]));
        assert_eq!(walker.current(), Some(&Node::Value(serde_json::json!("wheel"))));
    }

    #[test]
    fn replace_at_one_past_end_extends_list() {
        let mut walker = TreeWalker::new(sample());
        assert!(walker.down_to_key(&["groups"]));
        assert!(walker.down(), "enters index 0");
        assert!(walker.next(true));
        assert!(walker.next(true));
        // now addressing index 2, one past "wheel" at index 1
        walker.replace(Node::Value(serde_json::json!("admin")));
        assert!(walker.up());
        assert_eq!(walker.current(), Some(&Node::List(vec![
            Node::Value(serde_json::json!("sudo")),
            Node::Value(serde_json::json!("wheel")),
            Node::Value(serde_json::json!("admin")),
        ])));
    }

    #[test]
    fn map_and_unmap_round_trip_the_original_value() {
        let mut walker = TreeWalker::new(sample());
        assert!(walker.down_to_key(&["name"]));
        walker.map(vec!["0".to_string()], serde_json::json!("bob"));
        assert_eq!(walker.current_parameter_key(), Some(&vec!["0".to_string()]));
        assert_eq!(walker.current().map(Node::to_value), Some(serde_json::json!("bob")));
        walker.unmap();
        assert_eq!(walker.current(), Some(&Node::Value(serde_json::json!("alice"))));
    }

    #[test]
    fn remove_then_reinsert_preserves_list_shape() {
        let mut walker = TreeWalker::new(sample());
        assert!(walker.down_to_key(&["groups"]));
        assert!(walker.down());
        let (step, node) = walker.remove().unwrap();
        assert_eq!(step, Step::Index(0));
        assert_eq!(node, Node::Value(serde_json::json!("sudo")));
        assert!(walker.up());
        assert_eq!(walker.current(), Some(&Node::List(vec![Node::Value(serde_json::json!("wheel"))])));
    }

    #[test]
    fn postorder_paths_visits_children_before_parent() {
        let node = sample();
        let paths = postorder_paths(&node, false);
        let groups_list_pos = paths.iter().position(|p| p == &vec![Step::Key("groups".into())]).unwrap();
        let groups_item_pos = paths
            .iter()
            .position(|p| p == &vec![Step::Key("groups".into()), Step::Index(0)])
            .unwrap();
        assert!(groups_item_pos < groups_list_pos);
    }
}
