//! Component instance base.
//!
//! `RwcElement` carries the per-instance state the generated constructor code
//! relies on: the update registry, the owned reactive values, the shadow-root
//! subtree, and the removal flag. A wrapper created here seeds one consumer
//! that dispatches the wrapper's key on this instance; forwarding the wrapper
//! to another instance appends that instance's own consumer, so one value can
//! drive several components. A consumer whose instance has been removed
//! detaches itself on its next run.

use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use super::dom::{self, Node, NodeHandle};
use super::reactive::{Consumer, Reactive};
use super::registry::{UpdateEntry, UpdateRegistry};
use super::scheduler::FrameScheduler;

/// An incoming forwarded prop: either a plain value or another instance's
/// wrapper to share.
pub enum PropValue {
    Plain(Value),
    Shared(Reactive),
}

pub struct RwcElement {
    scheduler: Rc<FrameScheduler>,
    registry: UpdateRegistry,
    shadow_root: NodeHandle,
    values: RefCell<HashMap<String, Reactive>>,
    plain_props: RefCell<HashMap<String, Value>>,
    removed: Cell<bool>,
}

impl RwcElement {
    pub fn new(scheduler: Rc<FrameScheduler>) -> Rc<RwcElement> {
        Rc::new(RwcElement {
            scheduler,
            registry: UpdateRegistry::new(),
            shadow_root: Node::element("shadow-root"),
            values: RefCell::new(HashMap::new()),
            plain_props: RefCell::new(HashMap::new()),
            removed: Cell::new(false),
        })
    }

    pub fn shadow_root(&self) -> NodeHandle {
        self.shadow_root.clone()
    }

    pub fn is_removed(&self) -> bool {
        self.removed.get()
    }

    /// Permanent; removed instances stop participating in dispatch the next
    /// time any of their consumers runs.
    pub fn mark_removed(&self) {
        self.removed.set(true);
    }

    // ───────────────────────────────────────────────────────────────────────────
    // update registry surface
    // ───────────────────────────────────────────────────────────────────────────

    pub fn push_update(&self, key: &str, entry: UpdateEntry) {
        self.registry.push(key, entry);
    }

    pub fn updates_len(&self, key: &str) -> usize {
        self.registry.len(key)
    }

    pub fn do_update(&self, key: &str) {
        self.registry.dispatch(key);
    }

    pub fn filter_updates(&self) {
        self.registry.filter_all();
    }

    pub fn on_update(
        &self,
        key: &str,
        is_valid: Box<dyn Fn() -> bool>,
        update: Box<dyn FnMut()>,
    ) {
        self.registry.push(key, UpdateEntry { is_valid, update });
    }

    // ───────────────────────────────────────────────────────────────────────────
    // reactive values and forwarded props
    // ───────────────────────────────────────────────────────────────────────────

    /// Wrap a value under a dependency key and own it. The seeded consumer
    /// dispatches the key on this instance each time the wrapper flushes.
    pub fn reactive(self: &Rc<Self>, value: Value, key: &str) -> Reactive {
        let wrapper = Reactive::wrap(value, Some(key), &self.scheduler);
        wrapper.add_consumer(dispatch_consumer(self, key));
        self.values
            .borrow_mut()
            .insert(key.to_string(), wrapper.clone());
        wrapper
    }

    pub fn value(&self, key: &str) -> Option<Reactive> {
        self.values.borrow().get(key).cloned()
    }

    pub fn prop(&self, name: &str) -> Option<Value> {
        self.plain_props.borrow().get(name).cloned()
    }

    /// Accept a forwarded prop.
    ///
    /// When a reactive value is already held under the name: a shared wrapper
    /// is adopted in its place, guarded by the wrapper's bound-names set so
    /// forwarding the same wrapper under the same name twice registers one
    /// consumer, not two; a plain value is wrapped fresh as instance-owned
    /// state, leaving the previous wrapper and its other holders untouched.
    /// With nothing held the incoming value is assigned directly — no
    /// consumer registration — and the name's updates dispatch once.
    pub fn set_prop(self: &Rc<Self>, name: &str, incoming: PropValue) {
        let held = self.values.borrow().get(name).cloned();
        match (held, incoming) {
            (Some(_), PropValue::Plain(value)) => {
                let fresh = Reactive::wrap(value, Some(name), &self.scheduler);
                fresh.add_consumer(dispatch_consumer(self, name));
                self.values.borrow_mut().insert(name.to_string(), fresh);
            }
            (Some(_), PropValue::Shared(shared)) => {
                if shared.bind_name(name) {
                    shared.add_consumer(dispatch_consumer(self, name));
                }
                self.values.borrow_mut().insert(name.to_string(), shared);
            }
            (None, PropValue::Shared(shared)) => {
                self.values.borrow_mut().insert(name.to_string(), shared);
                self.do_update(name);
            }
            (None, PropValue::Plain(value)) => {
                self.plain_props.borrow_mut().insert(name.to_string(), value);
                self.do_update(name);
            }
        }
    }

    /// Permanently mark a subtree removed, anchors included; its update
    /// entries fall out on the next dispatch or filter pass.
    pub fn nullify_node(&self, node: &NodeHandle) {
        dom::nullify(node);
    }
}

fn dispatch_consumer(element: &Rc<RwcElement>, key: &str) -> Consumer {
    let weak = Rc::downgrade(element);
    let key = key.to_string();
    Box::new(move || match weak.upgrade() {
        Some(el) if !el.is_removed() => {
            el.do_update(&key);
            true
        }
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup() -> (Rc<FrameScheduler>, Rc<RwcElement>) {
        let scheduler = Rc::new(FrameScheduler::new());
        let element = RwcElement::new(scheduler.clone());
        (scheduler, element)
    }

    /// An entry that rewrites a node's text from the wrapper, valid while the
    /// node is alive. The shape every compiled text binding takes.
    fn text_binding(element: &Rc<RwcElement>, key: &str, node: &NodeHandle, value: &Reactive) {
        let node_v = node.clone();
        let node_u = node.clone();
        let value = value.clone();
        element.on_update(
            key,
            Box::new(move || !node_v.is_dead()),
            Box::new(move || {
                node_u.set_text(&value.snapshot().to_string());
            }),
        );
    }

    #[test]
    fn test_change_dispatches_entries_in_order_dropping_invalid() {
        let (scheduler, element) = setup();
        let count = element.reactive(json!(0), "count");

        let root = element.shadow_root();
        let a = Node::text("");
        let b = Node::text("");
        let c = Node::text("");
        for node in [&a, &b, &c] {
            root.append_child(node);
        }
        text_binding(&element, "count", &a, &count);
        text_binding(&element, "count", &b, &count);
        text_binding(&element, "count", &c, &count);

        b.mark_removed();
        count.set(json!(7));
        scheduler.tick();

        assert_eq!(a.text_content(), "7");
        assert_eq!(b.text_content(), "");
        assert_eq!(c.text_content(), "7");
        // the invalid entry was purged during dispatch
        assert_eq!(element.updates_len("count"), 2);
    }

    #[test]
    fn test_loop_teardown_leaves_no_nodes_and_no_entries() {
        let (scheduler, element) = setup();
        let items = element.reactive(json!([1, 2, 3]), "items");
        let root = element.shadow_root();

        // one loop pass: a node per item, each with a live text binding
        let mut produced = Vec::new();
        for _ in 0..items.len() {
            let li = Node::element("li");
            li.set_loop_removed(Some(false));
            root.append_child(&li);
            text_binding(&element, "items", &li, &items);
            produced.push(li);
        }
        assert_eq!(root.child_count(), 3);
        assert_eq!(element.updates_len("items"), 3);

        // teardown: nullify and detach every produced node, then filter
        for node in &produced {
            element.nullify_node(node);
            node.remove();
        }
        element.filter_updates();

        assert_eq!(root.child_count(), 0);
        assert_eq!(element.updates_len("items"), 0);
        // a later change finds nothing left to run
        items.push(json!(4));
        scheduler.tick();
        assert_eq!(element.updates_len("items"), 0);
    }

    #[test]
    fn test_conditional_toggle_restores_exact_attachment() {
        let (scheduler, element) = setup();
        let open = element.reactive(json!(true), "open");
        let root = element.shadow_root();

        let before = Node::element("before");
        let target = Node::element("div");
        let after = Node::element("after");
        root.append_child(&before);
        root.append_child(&target);
        root.append_child(&after);

        let anchor = Node::element("template");
        Node::link_anchor(&target, &anchor);

        let open_u = open.clone();
        let target_u = target.clone();
        let anchor_u = anchor.clone();
        let target_v = target.clone();
        element.on_update(
            "open",
            Box::new(move || !target_v.is_dead()),
            Box::new(move || {
                if open_u.snapshot() == json!(true) {
                    if target_u.parent().is_none() {
                        anchor_u.replace_with(&target_u);
                    }
                } else if anchor_u.parent().is_none() {
                    target_u.replace_with(&anchor_u);
                }
            }),
        );

        open.set(json!(false));
        scheduler.tick();
        let tags: Vec<String> = root
            .children()
            .iter()
            .map(|n| n.tag().unwrap().to_string())
            .collect();
        assert_eq!(tags, vec!["before", "template", "after"]);

        open.set(json!(true));
        scheduler.tick();
        let tags: Vec<String> = root
            .children()
            .iter()
            .map(|n| n.tag().unwrap().to_string())
            .collect();
        assert_eq!(tags, vec!["before", "div", "after"]);
        assert!(target.is_attached_to(&root));
    }

    #[test]
    fn test_forwarded_prop_shares_wrapper_without_double_register() {
        let (scheduler, parent) = setup();
        let child = RwcElement::new(scheduler.clone());
        let total = parent.reactive(json!(10), "total");
        child.reactive(json!(0), "total");
        assert_eq!(total.consumer_count(), 1);

        child.set_prop("total", PropValue::Shared(total.clone()));
        assert_eq!(total.consumer_count(), 2);
        assert!(child
            .value("total")
            .map(|held| held.same_wrapper(&total))
            .unwrap_or(false));

        // forwarding the same wrapper again under the same name is a no-op
        child.set_prop("total", PropValue::Shared(total.clone()));
        assert_eq!(total.consumer_count(), 2);

        // a change reaches both instances' registries
        let parent_node = Node::text("");
        let child_node = Node::text("");
        parent.shadow_root().append_child(&parent_node);
        child.shadow_root().append_child(&child_node);
        text_binding(&parent, "total", &parent_node, &total);
        text_binding(&child, "total", &child_node, &total);
        total.set(json!(11));
        scheduler.tick();
        assert_eq!(parent_node.text_content(), "11");
        assert_eq!(child_node.text_content(), "11");
    }

    #[test]
    fn test_removed_holder_consumer_detaches_itself() {
        let (scheduler, parent) = setup();
        let child = RwcElement::new(scheduler.clone());
        let total = parent.reactive(json!(0), "total");
        child.reactive(json!(0), "total");
        child.set_prop("total", PropValue::Shared(total.clone()));
        assert_eq!(total.consumer_count(), 2);

        child.mark_removed();
        total.set(json!(1));
        scheduler.tick();
        assert_eq!(total.consumer_count(), 1);
    }

    #[test]
    fn test_shared_prop_without_held_value_assigns_without_consumer() {
        let (_scheduler, parent) = setup();
        let child = RwcElement::new(parent.scheduler.clone());
        let total = parent.reactive(json!(1), "total");
        let ran = Rc::new(Cell::new(0u32));
        {
            let ran = ran.clone();
            child.on_update(
                "total",
                Box::new(|| true),
                Box::new(move || ran.set(ran.get() + 1)),
            );
        }

        child.set_prop("total", PropValue::Shared(total.clone()));
        // the wrapper is stored as-is, the child registers no consumer
        assert_eq!(total.consumer_count(), 1);
        assert!(child
            .value("total")
            .map(|held| held.same_wrapper(&total))
            .unwrap_or(false));
        // one immediate dispatch, nothing scheduled
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn test_plain_prop_replaces_held_wrapper_with_fresh_state() {
        let (scheduler, parent) = setup();
        let child = RwcElement::new(scheduler.clone());
        let total = parent.reactive(json!(10), "total");
        child.reactive(json!(0), "total");
        child.set_prop("total", PropValue::Shared(total.clone()));

        child.set_prop("total", PropValue::Plain(json!(5)));
        let held = child.value("total").expect("fresh wrapper held");
        assert!(!held.same_wrapper(&total));
        assert_eq!(held.snapshot(), json!(5));
        // the shared wrapper and its other holders are untouched
        assert_eq!(total.snapshot(), json!(10));
        assert_eq!(scheduler.pending(), 0);

        // the fresh wrapper is seeded with this instance's dispatch
        let node = Node::text("");
        child.shadow_root().append_child(&node);
        text_binding(&child, "total", &node, &held);
        held.set(json!(6));
        scheduler.tick();
        assert_eq!(node.text_content(), "6");
    }

    #[test]
    fn test_plain_prop_without_wrapper_is_stored_and_dispatched() {
        let (_scheduler, element) = setup();
        let ran = Rc::new(Cell::new(false));
        {
            let ran = ran.clone();
            element.on_update(
                "label",
                Box::new(|| true),
                Box::new(move || ran.set(true)),
            );
        }
        element.set_prop("label", PropValue::Plain(json!("hi")));
        assert_eq!(element.prop("label"), Some(json!("hi")));
        assert!(ran.get());
    }
}
