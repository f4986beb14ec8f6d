//! View compilation.
//!
//! Walks the `<view>` markup tree depth-first through an explicit pending
//! queue, so synthetic close-scope markers can be interleaved with real
//! children, and emits the imperative construction and update-registration
//! statements for the generated constructor. Loop regions are tracked with an
//! explicit scope stack; while a scope is open, emission targets its loop body
//! instead of the constructor.
//!
//! The list-update strategy is a full teardown and rebuild of the loop's
//! output, not reconciliation. Rebuilds mark every produced node removed so
//! that the nodes' own update entries invalidate themselves on the next
//! dispatch or filter pass.

use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData};
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::analyze::ScriptAnalysis;
use crate::error::{offset_to_line_col, CompileError, E_CONDITION, E_LOOP_HEADER};
use crate::interpolate;

lazy_static! {
    static ref EVENT_ATTR_REGEX: Regex = Regex::new(r"^\(.*\)$").unwrap();
}

const FOR_ATTRIBUTE: &str = "*for";
const IF_ATTRIBUTE: &str = "*if";
const PROP_PREFIX: &str = "@";

/// Polling cap for forwarded props; at 16.6ms per attempt this is roughly ten
/// seconds before the forward is reported failed.
const PROP_POLL_ATTEMPTS: u32 = 600;

// ═══════════════════════════════════════════════════════════════════════════════
// LOOP SCOPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Compile-time bookkeeping for one `*for` region; discarded at close.
struct LoopScope {
    header: String,
    /// Statements inside the generated for-statement's body.
    body: Vec<String>,
    /// Dependency keys referenced by the loop header.
    keys: Vec<String>,
    has_children: bool,
}

impl LoopScope {
    fn new(header: String, keys: Vec<String>) -> Self {
        LoopScope {
            header,
            body: Vec::new(),
            keys,
            has_children: false,
        }
    }

    fn stringified_loop(&self) -> String {
        format!("for ({}) {{\n{}\n}}", self.header, self.body.join("\n"))
    }

    /// The block spliced into the parent target when the scope closes.
    fn render_block(&self, registrations: &[String]) -> String {
        format!(
            "{{\nlet nodes = [];\nlet template = document.createElement('template');\n\
             currParent.appendChild(template);\n{}\nif (nodes.length > 0) {{\ntemplate.remove();\n}}\n\
             template.$forremove = false;\n{}\n}}",
            self.stringified_loop(),
            registrations.join("\n")
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VIEW COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

enum WorkItem {
    Node(Handle),
    CloseScope,
}

pub struct ViewCompiler<'a> {
    analysis: &'a ScriptAnalysis,
    file: &'a str,
    /// Original source, used to approximate diagnostic locations for markup
    /// attributes (rcdom carries no source positions).
    source: &'a str,
    ctor: Vec<String>,
    scopes: Vec<LoopScope>,
}

impl<'a> ViewCompiler<'a> {
    pub fn new(analysis: &'a ScriptAnalysis, file: &'a str, source: &'a str) -> Self {
        ViewCompiler {
            analysis,
            file,
            source,
            ctor: Vec::new(),
            scopes: Vec::new(),
        }
    }

    /// Compile the view tree into constructor statements.
    pub fn compile(mut self, view_root: &Handle) -> Result<Vec<String>, CompileError> {
        self.emit("let el = null;");
        self.emit("let currParent = this.shadowRoot;");

        let mut queue: VecDeque<WorkItem> = VecDeque::new();
        let mut parent_of: HashMap<usize, Handle> = HashMap::new();
        for child in view_root.children.borrow().iter() {
            parent_of.insert(handle_id(child), view_root.clone());
            queue.push_back(WorkItem::Node(child.clone()));
        }

        let mut curr_parent_markup = view_root.clone();
        let mut prev_was_close_scope = false;

        while let Some(item) = queue.pop_front() {
            let node = match item {
                WorkItem::CloseScope => {
                    prev_was_close_scope = self.close_scope();
                    continue;
                }
                WorkItem::Node(node) => node,
            };

            if !matches!(node.data, NodeData::Element { .. } | NodeData::Text { .. }) {
                continue;
            }

            // Step back up when the markup parent changed, unless a scope
            // close already emitted the step.
            let markup_parent = parent_of.get(&handle_id(&node)).cloned();
            if let Some(parent) = markup_parent {
                if !Rc::ptr_eq(&parent, &curr_parent_markup) {
                    curr_parent_markup = parent;
                    if !prev_was_close_scope {
                        self.emit(
                            "currParent = currParent.parentNode || currParent.$template.parentNode;",
                        );
                    } else {
                        prev_was_close_scope = false;
                    }
                }
            }

            match &node.data {
                NodeData::Element { name, attrs, .. } => {
                    let tag = name.local.to_string();
                    let attributes: Vec<(String, String)> = attrs
                        .borrow()
                        .iter()
                        .map(|a| (a.name.local.to_string(), a.value.to_string()))
                        .collect();

                    let loop_header = attributes
                        .iter()
                        .find(|(n, _)| n == FOR_ATTRIBUTE)
                        .map(|(_, v)| v.clone());
                    if let Some(header) = &loop_header {
                        self.open_scope(header)?;
                    }

                    self.emit_element_creation(&tag);

                    for (attr_name, attr_value) in &attributes {
                        if attr_name == FOR_ATTRIBUTE {
                            // consumed when the scope was opened
                        } else if EVENT_ATTR_REGEX.is_match(attr_name) {
                            let event = &attr_name[1..attr_name.len() - 1];
                            self.emit(&format!(
                                "el.addEventListener('{}', {});",
                                event, attr_value
                            ));
                        } else if attr_name == IF_ATTRIBUTE {
                            self.emit_conditional(attr_value)?;
                        } else if let Some(prop) = attr_name.strip_prefix(PROP_PREFIX) {
                            self.emit_forwarded_prop(prop, attr_value);
                        } else {
                            self.emit_plain_attribute(attr_name, attr_value)?;
                        }
                    }

                    let children: Vec<Handle> = node.children.borrow().iter().cloned().collect();

                    if loop_header.is_some() {
                        queue.push_front(WorkItem::CloseScope);
                        if !children.is_empty() {
                            if let Some(scope) = self.scopes.last_mut() {
                                scope.has_children = true;
                            }
                        }
                    }

                    if !children.is_empty() {
                        self.emit("currParent = el;");
                        curr_parent_markup = node.clone();
                        for child in children.into_iter().rev() {
                            parent_of.insert(handle_id(&child), node.clone());
                            queue.push_front(WorkItem::Node(child));
                        }
                    }
                }
                NodeData::Text { contents } => {
                    let text = contents.borrow().to_string();
                    if !text.trim().is_empty() {
                        self.emit_text_node(&text)?;
                    }
                }
                _ => {}
            }
        }

        Ok(self.ctor)
    }

    fn in_scope(&self) -> bool {
        !self.scopes.is_empty()
    }

    /// Append a statement to the current target: the innermost open loop
    /// scope's body, or the constructor.
    fn emit(&mut self, stmt: &str) {
        match self.scopes.last_mut() {
            Some(scope) => scope.body.push(stmt.to_string()),
            None => self.ctor.push(stmt.to_string()),
        }
    }

    /// Append a finished statement to the scope's parent target, skipping the
    /// scope itself. Used when splicing a closed scope's block.
    fn emit_to_parent(&mut self, depth: usize, stmt: String) {
        if depth == 0 {
            self.ctor.push(stmt);
        } else {
            self.scopes[depth - 1].body.push(stmt);
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // loop scopes
    // ───────────────────────────────────────────────────────────────────────────

    fn open_scope(&mut self, header: &str) -> Result<(), CompileError> {
        if !self.analysis.loop_header_parses(header) {
            let (line, column) = self.locate(header);
            return Err(CompileError::with_hints(
                E_LOOP_HEADER,
                &format!("*for header does not parse: {}", header),
                self.file,
                line,
                column,
                vec!["the header must be legal inside for( ... )".to_string()],
            ));
        }
        let keys = self.analysis.referenced_keys_in_header(header);
        self.scopes.push(LoopScope::new(header.to_string(), keys));
        Ok(())
    }

    /// Close the innermost scope; returns whether it had child markup (which
    /// suppresses the next parent-step emission).
    fn close_scope(&mut self) -> bool {
        let mut scope = match self.scopes.pop() {
            Some(scope) => scope,
            None => return false,
        };
        if scope.has_children {
            scope
                .body
                .push("currParent = currParent.parentNode || currParent.$template.parentNode;".to_string());
        }

        let mut registrations = Vec::new();
        if !scope.keys.is_empty() {
            let loop_src = scope.stringified_loop();
            for key in &scope.keys {
                registrations.push(rebuild_registration(key, &loop_src));
            }
        }
        let block = scope.render_block(&registrations);
        let depth = self.scopes.len();
        self.emit_to_parent(depth, block);
        scope.has_children
    }

    // ───────────────────────────────────────────────────────────────────────────
    // element construction and attributes
    // ───────────────────────────────────────────────────────────────────────────

    fn emit_element_creation(&mut self, tag: &str) {
        self.emit(&format!("el = document.createElement('{}');", tag));
        if self.in_scope() {
            self.emit("el.$forremove = false;");
            self.emit("nodes.push(el);");
            self.emit("el.$fortemplate = template;");
        }
        self.emit("currParent.appendChild(el);");
    }

    fn emit_conditional(&mut self, condition: &str) -> Result<(), CompileError> {
        if !self.analysis.expression_parses(condition) {
            let (line, column) = self.locate(condition);
            return Err(CompileError::new(
                E_CONDITION,
                &format!("*if condition does not parse: {}", condition),
                self.file,
                line,
                column,
            ));
        }
        let scope_flag = if self.in_scope() {
            "iftemplate.$forremove = false;\n"
        } else {
            ""
        };
        let mut block = format!(
            "{{\nlet element = el;\nlet iftemplate = document.createElement('template');\n{}\
             iftemplate.$el = element;\nelement.$template = iftemplate;\n\
             const entry = {{\n\
             isValid: () => {{\n\
             if (element.$forremove === true || element.$template === null || \
             element.$template.$forremove === true || element.$remove || element.$template.$remove) {{\n\
             return false;\n}}\nreturn true;\n}},\n\
             update: () => {{\n\
             if ({}) {{\nif (!element.parentNode) {{\nelement.$template.replaceWith(element);\n}}\n}} \
             else {{\nif (!element.$template.parentNode) {{\nelement.replaceWith(element.$template);\n}}\n}}\n\
             }}\n}};\nentry.update();\n",
            scope_flag, condition
        );
        for key in self.analysis.referenced_keys(condition) {
            block.push_str(&format!("this.$getUpdates('{}').push(entry);\n", key));
        }
        block.push('}');
        self.emit(&block);
        Ok(())
    }

    fn emit_forwarded_prop(&mut self, prop: &str, value: &str) {
        self.emit(&format!(
            "{{\nlet element = el;\nlet attempts = 0;\nconst interval = setInterval(() => {{\n\
             if (element.$setProp) {{\nclearInterval(interval);\nelement.$setProp('{prop}', {value});\n}} \
             else if (++attempts >= {cap}) {{\nclearInterval(interval);\n\
             console.error('[rwc] prop {prop} never forwarded: target did not upgrade');\n}}\n\
             }}, 16.6);\n}}",
            prop = prop,
            value = value,
            cap = PROP_POLL_ATTEMPTS
        ));
    }

    fn emit_plain_attribute(&mut self, name: &str, value: &str) -> Result<(), CompileError> {
        let offset = self.source.find(value).unwrap_or(0);
        let parts = interpolate::extract(value, self.file, offset)?;
        self.emit(&format!("el.setAttribute('{}', {});", name, parts.literal));
        self.emit_updates(
            &format!("node.setAttribute('{}', {});", name, parts.literal),
            &parts.expressions,
        );
        Ok(())
    }

    fn emit_text_node(&mut self, text: &str) -> Result<(), CompileError> {
        let offset = self.source.find(text).unwrap_or(0);
        let parts = interpolate::extract(text, self.file, offset)?;
        self.emit(&format!(
            "currParent.appendChild(document.createTextNode({}));",
            parts.literal
        ));
        if self.in_scope() {
            self.emit("currParent.lastChild.$forremove = false;");
            self.emit("currParent.lastChild.$fortemplate = template;");
        }
        self.emit_updates(
            &format!("node.textContent = {};", parts.literal),
            &parts.expressions,
        );
        Ok(())
    }

    /// Shared tail for attributes and text: one update entry per
    /// (expression, referenced key) pair that re-evaluates and re-applies the
    /// whole value. The target node is the just-appended last child, which for
    /// the attribute path is the element itself.
    fn emit_updates(&mut self, update_stmt: &str, expressions: &[String]) {
        let loop_check = if self.in_scope() {
            "if (node.$forremove === true) return false;\n"
        } else {
            ""
        };
        for expression in expressions {
            for key in self.analysis.referenced_keys(expression) {
                self.emit(&format!(
                    "{{\nlet node = currParent.lastChild;\nthis.$getUpdates('{}').push({{\n\
                     isValid: () => {{\n{}\
                     if (node.$fortemplate?.$forremove === true) return false;\n\
                     if (node.$remove) return false;\nreturn true;\n}},\n\
                     update: () => {{\n{}\n}}\n}});\n}}",
                    key, loop_check, update_stmt
                ));
            }
        }
    }

    fn locate(&self, needle: &str) -> (u32, u32) {
        let offset = self.source.find(needle).unwrap_or(0);
        offset_to_line_col(self.source, offset)
    }
}

/// The full teardown/rebuild update registered under one of a loop's
/// dependency keys. Previously produced nodes are nullified so their own
/// entries self-invalidate, the anchor is reinserted, the loop re-runs against
/// current data, and the anchor's children are folded back into the parent.
fn rebuild_registration(key: &str, loop_src: &str) -> String {
    format!(
        "this.$getUpdates('{}').push({{\n\
         isValid: () => {{\n\
         if (!template) return false;\n\
         if (template.$forremove === true) {{\nreturn false;\n}}\n\
         for (let e of nodes) {{\n\
         if (e.$forremove === true) {{\nreturn false;\n}} \
         else if (e.$el?.$forremove === true) {{\nreturn false;\n}}\n}}\n\
         return true;\n}},\n\
         update: () => {{\n\
         if (!template) return;\n\
         let remove = false;\n\
         if (nodes.length > 0) {{\n\
         if (nodes[0].parentNode === null) {{\nnodes[0].$template.replaceWith(template);\n}} \
         else {{\nnodes[0].replaceWith(template);\n}}\n\
         for (let e of nodes) {{\n\
         if (e.$forremove === true) {{\nremove = true;\n}} \
         else if (e.$el?.$forremove === true) {{\nremove = true;\n}} \
         else {{\nthis.$nullifyNode(e);\n}}\n\
         e.remove();\n\
         if (e.$el) {{\ne.$el.remove();\n}}\n}}\n\
         nodes = [];\n}}\n\
         currParent = template;\n\
         {}\n\
         if (nodes.length > 0) {{\n\
         template.replaceWith(...template.childNodes);\n\
         template.replaceChildren();\n}}\n\
         if (remove) {{\ntemplate = null;\n}}\n\
         this.$filterUpdates();\n}}\n}});",
        key, loop_src
    )
}

fn handle_id(handle: &Handle) -> usize {
    Rc::as_ptr(handle) as *const () as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::analyze_script;
    use crate::sections::extract_sections;

    fn compile(script: &str, view_markup: &str) -> Vec<String> {
        let source = format!(
            "<component name=\"Widget\">{}</component>\n<view>{}</view>",
            script, view_markup
        );
        let def = extract_sections(&source, "widget.rwc").unwrap();
        let analysis = analyze_script(&def.name, &def.script, "widget.rwc").unwrap();
        let view = def.view.expect("view present");
        ViewCompiler::new(&analysis, "widget.rwc", &source)
            .compile(&view)
            .unwrap()
    }

    fn compile_joined(script: &str, view_markup: &str) -> String {
        compile(script, view_markup).join("\n")
    }

    #[test]
    fn test_element_creation_and_append() {
        let code = compile_joined("constructor() { super(); }", "<p></p>");
        assert!(code.contains("el = document.createElement('p');"));
        assert!(code.contains("currParent.appendChild(el);"));
    }

    #[test]
    fn test_event_attribute_becomes_listener() {
        let code = compile_joined(
            "constructor() { super(); }",
            "<button (click)=\"() => this.step()\"></button>",
        );
        assert!(code.contains("el.addEventListener('click', () => this.step());"));
    }

    #[test]
    fn test_interpolated_text_registers_updates() {
        let code = compile_joined(
            "constructor() { super(); this.count = (0).reactive(); }",
            "<p>{{ this.count.value }}</p>",
        );
        assert!(code.contains("document.createTextNode(`${ this.count.value }`)"));
        assert!(code.contains("this.$getUpdates('count')"));
        assert!(code.contains("node.textContent = `${ this.count.value }`;"));
    }

    #[test]
    fn test_plain_attribute_interpolation() {
        let code = compile_joined(
            "constructor() { super(); this.cls = ('big').reactive(); }",
            "<p title=\"mode: {{ this.cls.value }}\"></p>",
        );
        assert!(code.contains("el.setAttribute('title', `mode: ${ this.cls.value }`);"));
        assert!(code.contains("this.$getUpdates('cls')"));
    }

    #[test]
    fn test_static_attribute_registers_nothing() {
        let code = compile_joined("constructor() { super(); }", "<p title=\"plain\"></p>");
        assert!(code.contains("el.setAttribute('title', `plain`);"));
        assert!(!code.contains("$getUpdates"));
    }

    #[test]
    fn test_conditional_runs_once_and_registers_per_key() {
        let code = compile_joined(
            "constructor() { super(); this.open = (true).reactive(); }",
            "<div *if=\"this.open.value\"></div>",
        );
        assert!(code.contains("entry.update();"));
        assert!(code.contains("this.$getUpdates('open').push(entry);"));
        assert!(code.contains("element.$template = iftemplate;"));
        assert!(code.contains("iftemplate.$el = element;"));
    }

    #[test]
    fn test_bad_condition_is_located_error() {
        let source = "<component name=\"W\">constructor() { super(); }</component><view><div *if=\"a ===\"></div></view>";
        let def = extract_sections(source, "w.rwc").unwrap();
        let analysis = analyze_script(&def.name, &def.script, "w.rwc").unwrap();
        let err = ViewCompiler::new(&analysis, "w.rwc", source)
            .compile(&def.view.unwrap())
            .unwrap_err();
        assert_eq!(err.code, "E_CONDITION");
    }

    #[test]
    fn test_loop_scope_emits_rebuild_registration() {
        let code = compile_joined(
            "constructor() { super(); this.items = ([1, 2]).reactive(); }",
            "<ul><li *for=\"let item of this.items\">{{ item }}</li></ul>",
        );
        assert!(code.contains("let nodes = [];"));
        assert!(code.contains("let template = document.createElement('template');"));
        assert!(code.contains("for (let item of this.items)"));
        assert!(code.contains("this.$getUpdates('items')"));
        assert!(code.contains("this.$nullifyNode(e);"));
        assert!(code.contains("this.$filterUpdates();"));
        // loop bookkeeping flags on produced nodes
        assert!(code.contains("el.$forremove = false;"));
        assert!(code.contains("el.$fortemplate = template;"));
    }

    #[test]
    fn test_loop_without_key_reference_registers_no_rebuild() {
        let code = compile_joined(
            "constructor() { super(); }",
            "<li *for=\"let i = 0; i < 3; i++\">x</li>",
        );
        assert!(code.contains("for (let i = 0; i < 3; i++)"));
        assert!(!code.contains("$getUpdates"));
    }

    #[test]
    fn test_bad_loop_header_is_error() {
        let source = "<component name=\"W\">constructor() { super(); }</component><view><li *for=\"let of of\"></li></view>";
        let def = extract_sections(source, "w.rwc").unwrap();
        let analysis = analyze_script(&def.name, &def.script, "w.rwc").unwrap();
        let err = ViewCompiler::new(&analysis, "w.rwc", source)
            .compile(&def.view.unwrap())
            .unwrap_err();
        assert_eq!(err.code, "E_LOOP_HEADER");
    }

    #[test]
    fn test_forwarded_prop_polling_is_bounded() {
        let code = compile_joined(
            "constructor() { super(); this.total = (0).reactive(); }",
            "<child-widget @total=\"this.total\"></child-widget>",
        );
        assert!(code.contains("element.$setProp('total', this.total);"));
        assert!(code.contains("++attempts >= 600"));
        assert!(code.contains("clearInterval(interval);"));
    }

    #[test]
    fn test_nested_children_step_parent_down_and_up() {
        let code = compile(
            "constructor() { super(); }",
            "<div><span></span></div><p></p>",
        );
        let joined = code.join("\n");
        assert!(joined.contains("currParent = el;"));
        assert!(joined
            .contains("currParent = currParent.parentNode || currParent.$template.parentNode;"));
        // the sibling <p> is created after stepping back up
        let span_pos = joined.find("createElement('span')").unwrap();
        let up_pos = joined.rfind("currParent.parentNode").unwrap();
        let p_pos = joined.find("createElement('p')").unwrap();
        assert!(span_pos < up_pos && up_pos < p_pos);
    }
}
