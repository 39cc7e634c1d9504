//! Lazily expanded variable trees.
//!
//! A [`VariableTree`] owns every node it hands out; nodes are addressed by
//! [`NodeId`] and keep a non-owning link to their parent. Children are fetched
//! from the inspection service the first time a node is expanded and are
//! committed in one step, so a node is either unpopulated or fully populated
//! for its window.

use std::sync::Arc;
use std::time::Duration;

use lumen_config::InspectorConfig;
use lumen_vm::{
    with_timeout, FieldName, Instance, InstanceKind, InstanceRef, IsolateId, Value, VmError,
    VmService,
};

use crate::error::{InspectError, InspectResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Element range of an indexed collection shown by a range group node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub count: usize,
}

#[derive(Clone, Debug)]
pub struct TreeNode {
    name: String,
    value: Option<Value>,
    isolate: IsolateId,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    populated: bool,
    expanded: bool,
    window: Option<Window>,
    error: Option<String>,
}

impl TreeNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The remote value this node stands for; `None` for synthetic groups.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn isolate(&self) -> &IsolateId {
        &self.isolate
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Whether the children have been materialized.
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub fn window(&self) -> Option<Window> {
        self.window
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_expandable(&self) -> bool {
        if self.populated {
            return !self.children.is_empty();
        }
        if self.window.is_some() {
            return true;
        }
        matches!(
            self.value.as_ref().and_then(Value::as_instance).map(|i| i.kind),
            Some(
                InstanceKind::List
                    | InstanceKind::Map
                    | InstanceKind::Set
                    | InstanceKind::Record
                    | InstanceKind::PlainInstance
            )
        )
    }

    pub fn display_value(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        if self.window.is_some() {
            return String::new();
        }
        self.value
            .as_ref()
            .map(Value::display_string)
            .unwrap_or_default()
    }
}

/// Child description produced by a fetch, before it is allocated in the arena.
struct PendingNode {
    name: String,
    value: Option<Value>,
    window: Option<Window>,
    error: Option<String>,
    children: Vec<PendingNode>,
}

impl PendingNode {
    fn value(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            window: None,
            error: None,
            children: Vec::new(),
        }
    }

    fn error(error: &VmError) -> Self {
        Self {
            name: "[error]".to_string(),
            value: None,
            window: None,
            error: Some(format!("<error: {error}>")),
            children: Vec::new(),
        }
    }
}

pub struct VariableTree {
    service: Arc<dyn VmService>,
    grouping_threshold: usize,
    timeout: Duration,
    nodes: Vec<Option<TreeNode>>,
    free: Vec<NodeId>,
    roots: Vec<NodeId>,
}

impl VariableTree {
    pub fn new(service: Arc<dyn VmService>, config: &InspectorConfig) -> Self {
        Self {
            service,
            // Range grouping needs a branching factor of at least two to terminate.
            grouping_threshold: config.grouping_threshold.max(2),
            timeout: config.request_timeout(),
            nodes: Vec::new(),
            free: Vec::new(),
            roots: Vec::new(),
        }
    }

    pub fn insert_root(
        &mut self,
        name: impl Into<String>,
        value: Value,
        isolate: IsolateId,
    ) -> NodeId {
        let id = self.alloc(TreeNode {
            name: name.into(),
            value: Some(value),
            isolate,
            parent: None,
            children: Vec::new(),
            populated: false,
            expanded: false,
            window: None,
            error: None,
        });
        self.roots.push(id);
        id
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Find a direct child of `parent` by display name.
    pub fn child_named(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.node(parent)?
            .children
            .iter()
            .copied()
            .find(|child| self.node(*child).is_some_and(|node| node.name == name))
    }

    /// `name: value` line for presentation code.
    pub fn display(&self, id: NodeId) -> Option<String> {
        let node = self.node(id)?;
        let value = node.display_value();
        Some(if value.is_empty() {
            node.name.clone()
        } else {
            format!("{}: {}", node.name, value)
        })
    }

    /// Drop every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.roots.clear();
    }

    /// Remove a root and its subtree.
    ///
    /// Ids of removed nodes are recycled by later insertions.
    pub fn remove_root(&mut self, id: NodeId) {
        if let Some(position) = self.roots.iter().position(|root| *root == id) {
            self.roots.remove(position);
            self.free_subtree(id);
        }
    }

    /// Materialize the children of `id` and mark it expanded.
    ///
    /// Expanding an already populated node only flips the expansion flag, so
    /// repeated calls never duplicate children. Service failures become a
    /// single error-marker child; the only error returned is for an unknown
    /// node id.
    pub async fn expand(&mut self, id: NodeId) -> InspectResult<()> {
        let node = self.node(id).ok_or(InspectError::UnknownNode(id))?;
        if node.populated {
            if let Some(node) = self.node_mut(id) {
                node.expanded = true;
            }
            return Ok(());
        }

        let isolate = node.isolate.clone();
        let pending = match (node.value.as_ref(), node.window) {
            (Some(Value::Instance(instance)), window) => {
                let instance = instance.clone();
                self.fetch_children(&instance, window).await
            }
            // Sentinels, errors and synthetic nodes without a value are leaves.
            _ => Vec::new(),
        };

        tracing::debug!(
            target: "lumen.inspect",
            node = %id,
            children = pending.len(),
            "expanded variable tree node"
        );

        let mut children = Vec::with_capacity(pending.len());
        for child in pending {
            children.push(self.alloc_pending(child, &isolate, id));
        }
        if let Some(node) = self.node_mut(id) {
            node.children = children;
            node.populated = true;
            node.expanded = true;
        }
        Ok(())
    }

    pub fn collapse(&mut self, id: NodeId) {
        if let Some(node) = self.node_mut(id) {
            node.expanded = false;
        }
    }

    /// Discard the children of `id` so the next [`VariableTree::expand`]
    /// fetches them again.
    pub fn refresh(&mut self, id: NodeId) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        let children = std::mem::take(&mut node.children);
        node.populated = false;
        node.expanded = false;
        for child in children {
            self.free_subtree(child);
        }
    }

    async fn fetch_children(
        &self,
        instance: &InstanceRef,
        window: Option<Window>,
    ) -> Vec<PendingNode> {
        let threshold = self.grouping_threshold;
        match instance.kind {
            InstanceKind::List | InstanceKind::Set | InstanceKind::Map => {
                let (offset, count) = match (window, instance.length) {
                    (Some(window), _) => (window.offset, window.count),
                    (None, Some(length)) => (0, length),
                    (None, None) => (0, threshold),
                };
                if count > threshold {
                    return range_groups(instance, offset, count, threshold);
                }
                match self.fetch_instance(instance, Some(offset), Some(count)).await {
                    Ok(contents) => decode_instance(contents, offset),
                    Err(err) => vec![self.fetch_failed(instance, err)],
                }
            }
            InstanceKind::Record | InstanceKind::PlainInstance => {
                match self.fetch_instance(instance, None, None).await {
                    Ok(contents) => decode_instance(contents, 0),
                    Err(err) => vec![self.fetch_failed(instance, err)],
                }
            }
            _ => Vec::new(),
        }
    }

    async fn fetch_instance(
        &self,
        instance: &InstanceRef,
        offset: Option<usize>,
        count: Option<usize>,
    ) -> lumen_vm::Result<Instance> {
        with_timeout(
            self.timeout,
            self.service
                .get_instance(&instance.isolate, &instance.id, offset, count),
        )
        .await
    }

    fn fetch_failed(&self, instance: &InstanceRef, err: VmError) -> PendingNode {
        tracing::warn!(
            target: "lumen.inspect",
            object = %instance.id,
            error = %err,
            "failed to fetch children"
        );
        PendingNode::error(&err)
    }

    fn alloc(&mut self, node: TreeNode) -> NodeId {
        if let Some(id) = self.free.pop() {
            if let Some(slot) = self.nodes.get_mut(id.0 as usize) {
                *slot = Some(node);
                return id;
            }
        }
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(Some(node));
        id
    }

    fn alloc_pending(&mut self, pending: PendingNode, isolate: &IsolateId, parent: NodeId) -> NodeId {
        let populated = pending.value.is_none() && pending.window.is_none();
        let id = self.alloc(TreeNode {
            name: pending.name,
            value: pending.value,
            isolate: isolate.clone(),
            parent: Some(parent),
            children: Vec::new(),
            populated,
            expanded: false,
            window: pending.window,
            error: pending.error,
        });

        let mut children = Vec::with_capacity(pending.children.len());
        for child in pending.children {
            children.push(self.alloc_pending(child, isolate, id));
        }
        if let Some(node) = self.node_mut(id) {
            node.children = children;
        }
        id
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(slot) = self.nodes.get_mut(next.0 as usize) {
                if let Some(node) = slot.take() {
                    self.free.push(next);
                    stack.extend(node.children);
                }
            }
        }
    }
}

/// Split `count` elements starting at `offset` into groups of at most
/// `threshold^k` elements, with `k` as small as possible while producing no
/// more than `threshold` groups.
fn range_groups(
    collection: &InstanceRef,
    offset: usize,
    count: usize,
    threshold: usize,
) -> Vec<PendingNode> {
    let mut chunk = threshold;
    while count > chunk.saturating_mul(threshold) {
        chunk = chunk.saturating_mul(threshold);
    }

    let end = offset + count;
    (offset..end)
        .step_by(chunk)
        .map(|start| {
            let len = chunk.min(end - start);
            PendingNode {
                name: format!("[{start} - {}]", start + len - 1),
                value: Some(Value::Instance(collection.clone())),
                window: Some(Window { offset: start, count: len }),
                error: None,
                children: Vec::new(),
            }
        })
        .collect()
}

fn decode_instance(instance: Instance, requested_offset: usize) -> Vec<PendingNode> {
    let offset = instance.offset.unwrap_or(requested_offset);

    if let Some(associations) = instance.associations {
        return associations
            .into_iter()
            .enumerate()
            .map(|(i, association)| {
                if association.key.is_primitive() {
                    PendingNode::value(association.key.key_string(), association.value)
                } else {
                    PendingNode {
                        name: format!("[Entry {}]", offset + i),
                        value: None,
                        window: None,
                        error: None,
                        children: vec![
                            PendingNode::value("[key]", association.key),
                            PendingNode::value("[value]", association.value),
                        ],
                    }
                }
            })
            .collect();
    }

    if let Some(elements) = instance.elements {
        return elements
            .into_iter()
            .enumerate()
            .map(|(i, element)| PendingNode::value(format!("[{}]", offset + i), element))
            .collect();
    }

    instance
        .fields
        .into_iter()
        .map(|field| {
            let name = match field.name {
                FieldName::Named(name) => name,
                FieldName::Positional(index) => format!("${}", index + 1),
            };
            PendingNode::value(name, field.value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_vm::{MockVmService, Obj, ObjectId};

    fn list_ref(length: usize) -> InstanceRef {
        InstanceRef {
            id: ObjectId::new("objects/list"),
            isolate: IsolateId::new("isolates/1"),
            kind: InstanceKind::List,
            class: None,
            value_as_string: None,
            length: Some(length),
            type_class: None,
        }
    }

    #[test]
    fn range_groups_cover_the_collection_without_overlap() {
        let groups = range_groups(&list_ref(250), 0, 250, 100);
        let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["[0 - 99]", "[100 - 199]", "[200 - 249]"]);
        assert_eq!(
            groups[2].window,
            Some(Window {
                offset: 200,
                count: 50
            })
        );
    }

    #[test]
    fn very_large_collections_nest_groups() {
        let groups = range_groups(&list_ref(25_000), 0, 25_000, 100);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].name, "[0 - 9999]");

        let nested = range_groups(&list_ref(25_000), 20_000, 5_000, 100);
        assert_eq!(nested.len(), 50);
        assert_eq!(nested[0].name, "[20000 - 20099]");
    }

    #[tokio::test]
    async fn refreshed_nodes_reuse_their_slots() {
        let service = Arc::new(MockVmService::new());
        let list = list_ref(3);
        let elements = (0..3)
            .map(|i| {
                Value::Instance(InstanceRef {
                    id: ObjectId::new(format!("objects/{i}")),
                    kind: InstanceKind::Int,
                    length: None,
                    value_as_string: Some(i.to_string()),
                    ..list.clone()
                })
            })
            .collect();
        service.insert_object(Obj::Instance(Instance {
            reference: list.clone(),
            offset: None,
            count: None,
            elements: Some(elements),
            associations: None,
            fields: Vec::new(),
        }));

        let mut tree = VariableTree::new(service, &InspectorConfig::default());
        let root = tree.insert_root("items", Value::Instance(list), IsolateId::new("isolates/1"));
        tree.expand(root).await.unwrap();
        assert_eq!(tree.len(), 4);
        let slots = tree.nodes.len();

        for _ in 0..5 {
            tree.refresh(root);
            tree.expand(root).await.unwrap();
        }
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.nodes.len(), slots);

        tree.remove_root(root);
        assert_eq!(tree.len(), 0);
        let again = tree.insert_root("again", Value::Instance(list_ref(0)), IsolateId::new("isolates/1"));
        assert_eq!(tree.nodes.len(), slots);
        assert_eq!(tree.node(again).unwrap().name(), "again");
    }
}
