//! Dependency analysis for the component script.
//!
//! Recognizes reactive assignments of the form
//! `this.<key> = <initializer>.reactive(...)`, names each as a dependency key,
//! appends the key as a string-literal argument so the runtime wrapper knows
//! its own name, and synthesizes constructor-time registrations for
//! initializers that read other dependency keys (derived state). Discovery
//! inlines one level into component methods the initializer calls, guarded by
//! a visited set so a self-referential method is a no-op instead of a stack
//! overflow.

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};
use std::collections::{HashMap, HashSet};

use crate::error::{CompileError, E_SCRIPT_PARSE};

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYSIS RESULT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct ScriptAnalysis {
    /// Wrapped class source with key literals spliced into the reactive calls.
    pub patched_src: String,
    /// Wrapped class source before patching; spans in `methods` index into it.
    pub scan_src: String,
    /// Dependency keys in source order.
    pub keys: Vec<String>,
    /// Derived-state registrations to splice into the constructor.
    pub ctor_statements: Vec<String>,
    /// Method name to body span (including braces) within `scan_src`.
    methods: HashMap<String, (usize, usize)>,
}

impl ScriptAnalysis {
    /// Dependency keys referenced by a free-standing expression, in first-seen
    /// order, with the same one-level method inlining the analyzer uses.
    pub fn referenced_keys(&self, snippet: &str) -> Vec<String> {
        let known: HashSet<String> = self.keys.iter().cloned().collect();
        let mut scanner = KeyRefScanner::new(&known, &self.methods, &self.scan_src);
        scanner.scan_snippet(snippet);
        scanner.found
    }

    /// Dependency keys referenced anywhere in a loop header.
    pub fn referenced_keys_in_header(&self, header: &str) -> Vec<String> {
        let known: HashSet<String> = self.keys.iter().cloned().collect();
        let mut scanner = KeyRefScanner::new(&known, &self.methods, &self.scan_src);
        scanner.scan_source(&format!("for ({}) {{}}", header));
        scanner.found
    }

    /// True when `snippet` is parseable as a JavaScript expression.
    pub fn expression_parses(&self, snippet: &str) -> bool {
        parses(&format!("({});", snippet))
    }

    /// True when `header` is legal inside a for-statement's parentheses.
    pub fn loop_header_parses(&self, header: &str) -> bool {
        parses(&format!("for ({}) {{}}", header))
    }
}

fn parses(source: &str) -> bool {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::default()).parse();
    ret.errors.is_empty()
}

// ═══════════════════════════════════════════════════════════════════════════════
// REACTIVE ASSIGNMENT COLLECTION
// ═══════════════════════════════════════════════════════════════════════════════

struct ReactiveAssignment {
    key: String,
    init_start: usize,
    init_end: usize,
    /// Offset just past the call's closing paren.
    call_end: usize,
    has_args: bool,
}

#[derive(Default)]
struct ReactiveCollector {
    found: Vec<ReactiveAssignment>,
}

impl<'a> Visit<'a> for ReactiveCollector {
    fn visit_assignment_expression(&mut self, expr: &AssignmentExpression<'a>) {
        if let Some(assignment) = match_reactive_assignment(expr) {
            self.found.push(assignment);
        }
        walk::walk_assignment_expression(self, expr);
    }
}

/// `this.<key> = <initializer>.reactive(...)`, or None when the node does not
/// match; non-matching assignments are left untouched rather than rejected.
fn match_reactive_assignment(expr: &AssignmentExpression) -> Option<ReactiveAssignment> {
    if expr.operator != AssignmentOperator::Assign {
        return None;
    }
    let key = match &expr.left {
        AssignmentTarget::StaticMemberExpression(member) => {
            if !matches!(member.object, Expression::ThisExpression(_)) {
                return None;
            }
            member.property.name.to_string()
        }
        _ => return None,
    };
    let call = match &expr.right {
        Expression::CallExpression(call) => call,
        _ => return None,
    };
    let callee = match &call.callee {
        Expression::StaticMemberExpression(member) => member,
        _ => return None,
    };
    if callee.property.name != "reactive" {
        return None;
    }
    let init_span = callee.object.span();
    Some(ReactiveAssignment {
        key,
        init_start: init_span.start as usize,
        init_end: init_span.end as usize,
        call_end: call.span.end as usize,
        has_args: !call.arguments.is_empty(),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// METHOD AND CONSTRUCTOR COLLECTION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct MethodCollector {
    methods: HashMap<String, (usize, usize)>,
    has_constructor: bool,
}

impl<'a> Visit<'a> for MethodCollector {
    fn visit_method_definition(&mut self, def: &MethodDefinition<'a>) {
        match def.kind {
            MethodDefinitionKind::Constructor => {
                self.has_constructor = true;
            }
            MethodDefinitionKind::Method => {
                if let PropertyKey::StaticIdentifier(id) = &def.key {
                    if let Some(body) = &def.value.body {
                        let span = body.span();
                        self.methods
                            .insert(id.name.to_string(), (span.start as usize, span.end as usize));
                    }
                }
            }
            _ => {}
        }
        walk::walk_method_definition(self, def);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEY REFERENCE SCANNING
// ═══════════════════════════════════════════════════════════════════════════════

struct KeyRefScanner<'s> {
    known: &'s HashSet<String>,
    methods: &'s HashMap<String, (usize, usize)>,
    class_src: &'s str,
    visited_methods: HashSet<String>,
    found: Vec<String>,
    seen: HashSet<String>,
}

impl<'s> KeyRefScanner<'s> {
    fn new(
        known: &'s HashSet<String>,
        methods: &'s HashMap<String, (usize, usize)>,
        class_src: &'s str,
    ) -> Self {
        KeyRefScanner {
            known,
            methods,
            class_src,
            visited_methods: HashSet::new(),
            found: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn scan_snippet(&mut self, snippet: &str) {
        self.scan_source(&format!("({});", snippet));
    }

    fn scan_method_body(&mut self, body: &str) {
        self.scan_source(&format!("function __inline() {}", body));
    }

    fn scan_source(&mut self, source: &str) {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, SourceType::default()).parse();
        if !ret.errors.is_empty() {
            // Unparseable snippets contribute no dependencies.
            return;
        }
        self.visit_program(&ret.program);
    }

    fn record(&mut self, key: &str) {
        if self.known.contains(key) && self.seen.insert(key.to_string()) {
            self.found.push(key.to_string());
        }
    }
}

impl<'a> Visit<'a> for KeyRefScanner<'_> {
    fn visit_static_member_expression(&mut self, member: &StaticMemberExpression<'a>) {
        if matches!(member.object, Expression::ThisExpression(_)) {
            let name = member.property.name.to_string();
            self.record(&name);
        }
        walk::walk_static_member_expression(self, member);
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Expression::StaticMemberExpression(callee) = &call.callee {
            if matches!(callee.object, Expression::ThisExpression(_)) {
                let method = callee.property.name.to_string();
                if let Some(&(start, end)) = self.methods.get(&method) {
                    if self.visited_methods.insert(method) {
                        let body = self.class_src[start..end].to_string();
                        self.scan_method_body(&body);
                    }
                }
            }
        }
        walk::walk_call_expression(self, call);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYSIS ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// Wrap the component script as a runtime subclass and analyze it.
pub fn analyze_script(
    component_name: &str,
    script: &str,
    file: &str,
) -> Result<ScriptAnalysis, CompileError> {
    let wrapped = wrap_class(component_name, script, false);

    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &wrapped, SourceType::default()).parse();
    if let Some(err) = ret.errors.first() {
        return Err(CompileError::new(
            E_SCRIPT_PARSE,
            &format!("component script failed to parse: {}", err),
            file,
            1,
            1,
        ));
    }

    let mut collector = MethodCollector::default();
    collector.visit_program(&ret.program);

    // A constructor is the append target for style, view, and registration
    // code; synthesize an empty one when the script declares none.
    let scan_src = if collector.has_constructor {
        wrapped
    } else {
        let rebuilt = wrap_class(component_name, script, true);
        let allocator = Allocator::default();
        let reparse = Parser::new(&allocator, &rebuilt, SourceType::default()).parse();
        if !reparse.errors.is_empty() {
            return Err(CompileError::new(
                E_SCRIPT_PARSE,
                "component script failed to parse after constructor synthesis",
                file,
                1,
                1,
            ));
        }
        collector = MethodCollector::default();
        collector.visit_program(&reparse.program);
        rebuilt
    };

    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &scan_src, SourceType::default()).parse();
    let mut reactive = ReactiveCollector::default();
    reactive.visit_program(&ret.program);

    let mut keys: Vec<String> = Vec::new();
    let mut known: HashSet<String> = HashSet::new();
    let mut ctor_statements = Vec::new();
    let mut edits: Vec<(usize, String)> = Vec::new();

    for assignment in &reactive.found {
        known.insert(assignment.key.clone());
        keys.push(assignment.key.clone());

        let insert = if assignment.has_args {
            format!(", '{}'", assignment.key)
        } else {
            format!("'{}'", assignment.key)
        };
        edits.push((assignment.call_end.saturating_sub(1), insert));

        let init_src = &scan_src[assignment.init_start..assignment.init_end];
        let mut scanner = KeyRefScanner::new(&known, &collector.methods, &scan_src);
        scanner.scan_snippet(init_src);
        for dep in scanner.found {
            if dep == assignment.key {
                continue;
            }
            ctor_statements.push(format!(
                "this.$getUpdates('{}').push({{ isValid: () => true, update: () => {{ this.{}.value = {}; }} }});",
                dep, assignment.key, init_src
            ));
        }
    }

    let mut patched_src = scan_src.clone();
    edits.sort_by(|a, b| b.0.cmp(&a.0));
    for (pos, text) in edits {
        patched_src.insert_str(pos, &text);
    }

    Ok(ScriptAnalysis {
        patched_src,
        scan_src,
        keys,
        ctor_statements,
        methods: collector.methods,
    })
}

fn wrap_class(name: &str, script: &str, synthesize_constructor: bool) -> String {
    if synthesize_constructor {
        format!(
            "class {} extends rwc.RwcElement {{\nconstructor() {{\nsuper();\n}}\n{}\n}}",
            name, script
        )
    } else {
        format!("class {} extends rwc.RwcElement {{\n{}\n}}", name, script)
    }
}
