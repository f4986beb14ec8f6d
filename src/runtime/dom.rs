//! In-memory document tree.
//!
//! A small single-threaded DOM, just enough structure for the update protocol
//! to be exercised without a browser: parenting, replacement, attributes,
//! text, and the lifecycle flags the protocol reads. Nodes are shared with
//! `Rc`; parents hold children strongly and children point back weakly.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

pub type NodeHandle = Rc<Node>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element { tag: String },
    Text,
}

pub struct Node {
    pub kind: NodeKind,
    parent: RefCell<Weak<Node>>,
    children: RefCell<Vec<NodeHandle>>,
    attributes: RefCell<HashMap<String, String>>,
    text: RefCell<String>,
    /// None = never loop-tracked; Some(false) = produced by a live loop pass;
    /// Some(true) = torn down by a rebuild.
    loop_removed: Cell<Option<bool>>,
    /// Permanent removal mark, set by nullification.
    removed: Cell<bool>,
    /// Placeholder standing in for this element while it is detached.
    anchor: RefCell<Option<NodeHandle>>,
    /// Back-link from a placeholder to the element it stands in for.
    anchored: RefCell<Weak<Node>>,
}

impl Node {
    fn new(kind: NodeKind, text: &str) -> NodeHandle {
        Rc::new(Node {
            kind,
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            attributes: RefCell::new(HashMap::new()),
            text: RefCell::new(text.to_string()),
            loop_removed: Cell::new(None),
            removed: Cell::new(false),
            anchor: RefCell::new(None),
            anchored: RefCell::new(Weak::new()),
        })
    }

    pub fn element(tag: &str) -> NodeHandle {
        Node::new(
            NodeKind::Element {
                tag: tag.to_string(),
            },
            "",
        )
    }

    pub fn text(content: &str) -> NodeHandle {
        Node::new(NodeKind::Text, content)
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag } => Some(tag),
            NodeKind::Text => None,
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // tree structure
    // ───────────────────────────────────────────────────────────────────────────

    pub fn append_child(self: &NodeHandle, child: &NodeHandle) {
        child.remove();
        *child.parent.borrow_mut() = Rc::downgrade(self);
        self.children.borrow_mut().push(child.clone());
    }

    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent.borrow().upgrade()
    }

    pub fn children(&self) -> Vec<NodeHandle> {
        self.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    pub fn last_child(&self) -> Option<NodeHandle> {
        self.children.borrow().last().cloned()
    }

    /// Detach from the parent; a no-op when already detached.
    pub fn remove(self: &NodeHandle) {
        if let Some(parent) = self.parent() {
            parent
                .children
                .borrow_mut()
                .retain(|c| !Rc::ptr_eq(c, self));
            *self.parent.borrow_mut() = Weak::new();
        }
    }

    /// Swap this node for another at the same position in the parent.
    pub fn replace_with(self: &NodeHandle, other: &NodeHandle) {
        let parent = match self.parent() {
            Some(parent) => parent,
            None => return,
        };
        other.remove();
        {
            let mut siblings = parent.children.borrow_mut();
            if let Some(pos) = siblings.iter().position(|c| Rc::ptr_eq(c, self)) {
                siblings[pos] = other.clone();
            }
        }
        *other.parent.borrow_mut() = Rc::downgrade(&parent);
        *self.parent.borrow_mut() = Weak::new();
    }

    /// Swap this node for its own children, emptying it. The fold a loop
    /// rebuild performs on its anchor after re-running the loop.
    pub fn replace_with_children(self: &NodeHandle) {
        let parent = match self.parent() {
            Some(parent) => parent,
            None => return,
        };
        let moved: Vec<NodeHandle> = self.children.borrow_mut().drain(..).collect();
        {
            let mut siblings = parent.children.borrow_mut();
            if let Some(pos) = siblings.iter().position(|c| Rc::ptr_eq(c, self)) {
                siblings.splice(pos..=pos, moved.iter().cloned());
            }
        }
        for child in &moved {
            *child.parent.borrow_mut() = Rc::downgrade(&parent);
        }
        *self.parent.borrow_mut() = Weak::new();
    }

    /// True when walking parents from here reaches `root`.
    pub fn is_attached_to(&self, root: &NodeHandle) -> bool {
        let mut current = self.parent();
        while let Some(node) = current {
            if Rc::ptr_eq(&node, root) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    // ───────────────────────────────────────────────────────────────────────────
    // content
    // ───────────────────────────────────────────────────────────────────────────

    pub fn set_attribute(&self, name: &str, value: &str) {
        self.attributes
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.borrow().get(name).cloned()
    }

    pub fn set_text(&self, content: &str) {
        *self.text.borrow_mut() = content.to_string();
    }

    pub fn text_content(&self) -> String {
        self.text.borrow().clone()
    }

    // ───────────────────────────────────────────────────────────────────────────
    // lifecycle flags and anchor links
    // ───────────────────────────────────────────────────────────────────────────

    pub fn loop_removed(&self) -> Option<bool> {
        self.loop_removed.get()
    }

    pub fn set_loop_removed(&self, state: Option<bool>) {
        self.loop_removed.set(state);
    }

    pub fn is_removed(&self) -> bool {
        self.removed.get()
    }

    pub fn mark_removed(&self) {
        self.removed.set(true);
    }

    /// Cross-link an element with its placeholder anchor.
    pub fn link_anchor(element: &NodeHandle, anchor: &NodeHandle) {
        *element.anchor.borrow_mut() = Some(anchor.clone());
        *anchor.anchored.borrow_mut() = Rc::downgrade(element);
    }

    pub fn anchor(&self) -> Option<NodeHandle> {
        self.anchor.borrow().clone()
    }

    pub fn anchored_element(&self) -> Option<NodeHandle> {
        self.anchored.borrow().upgrade()
    }

    /// A node is dead for update purposes when it, its loop pass, or either
    /// side of its anchor link has been removed.
    pub fn is_dead(&self) -> bool {
        if self.removed.get() || self.loop_removed.get() == Some(true) {
            return true;
        }
        if let Some(anchor) = self.anchor.borrow().as_ref() {
            if anchor.removed.get() || anchor.loop_removed.get() == Some(true) {
                return true;
            }
        }
        if let Some(element) = self.anchored.borrow().upgrade() {
            if element.removed.get() || element.loop_removed.get() == Some(true) {
                return true;
            }
        }
        false
    }
}

/// Permanently mark a subtree removed, anchors included. Loop-tracked nodes
/// also have their live-pass flag flipped to torn-down, matching the flags
/// compiled programs read.
pub fn nullify(node: &NodeHandle) {
    mark_dead(node);
    if let Some(anchor) = node.anchor() {
        mark_dead(&anchor);
    }
    if let Some(element) = node.anchored_element() {
        mark_dead(&element);
    }
    for child in node.children() {
        nullify(&child);
    }
}

fn mark_dead(node: &NodeHandle) {
    node.mark_removed();
    if node.loop_removed() == Some(false) {
        node.set_loop_removed(Some(true));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_parent_links() {
        let root = Node::element("root");
        let child = Node::element("p");
        root.append_child(&child);
        assert_eq!(root.child_count(), 1);
        assert!(Rc::ptr_eq(&child.parent().unwrap(), &root));
        assert!(child.is_attached_to(&root));
    }

    #[test]
    fn test_replace_with_preserves_position() {
        let root = Node::element("root");
        let a = Node::element("a");
        let b = Node::element("b");
        let c = Node::element("c");
        root.append_child(&a);
        root.append_child(&b);
        root.append_child(&c);

        let anchor = Node::element("template");
        b.replace_with(&anchor);
        let tags: Vec<String> = root
            .children()
            .iter()
            .map(|n| n.tag().unwrap().to_string())
            .collect();
        assert_eq!(tags, vec!["a", "template", "c"]);
        assert!(b.parent().is_none());

        anchor.replace_with(&b);
        let tags: Vec<String> = root
            .children()
            .iter()
            .map(|n| n.tag().unwrap().to_string())
            .collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_replace_with_children_folds_in_place() {
        let root = Node::element("root");
        let before = Node::element("before");
        let template = Node::element("template");
        root.append_child(&before);
        root.append_child(&template);
        let x = Node::element("x");
        let y = Node::element("y");
        template.append_child(&x);
        template.append_child(&y);

        template.replace_with_children();
        let tags: Vec<String> = root
            .children()
            .iter()
            .map(|n| n.tag().unwrap().to_string())
            .collect();
        assert_eq!(tags, vec!["before", "x", "y"]);
        assert_eq!(template.child_count(), 0);
        assert!(Rc::ptr_eq(&x.parent().unwrap(), &root));
    }

    #[test]
    fn test_nullify_marks_subtree_and_anchor() {
        let el = Node::element("div");
        let child = Node::text("hi");
        el.append_child(&child);
        let anchor = Node::element("template");
        Node::link_anchor(&el, &anchor);

        nullify(&el);
        assert!(el.is_removed());
        assert!(child.is_removed());
        assert!(anchor.is_removed());
        assert!(el.is_dead());
        assert!(anchor.is_dead());
    }

    #[test]
    fn test_nullify_flips_loop_flag_to_torn_down() {
        let li = Node::element("li");
        li.set_loop_removed(Some(false));
        let child = Node::text("x");
        child.set_loop_removed(Some(false));
        li.append_child(&child);
        let untracked = Node::element("em");
        li.append_child(&untracked);

        nullify(&li);
        assert_eq!(li.loop_removed(), Some(true));
        assert_eq!(child.loop_removed(), Some(true));
        // nodes a loop never tracked stay that way
        assert_eq!(untracked.loop_removed(), None);
        assert!(untracked.is_removed());
    }

    #[test]
    fn test_dead_via_loop_flags() {
        let el = Node::element("li");
        assert!(!el.is_dead());
        el.set_loop_removed(Some(false));
        assert!(!el.is_dead());
        el.set_loop_removed(Some(true));
        assert!(el.is_dead());
    }
}
