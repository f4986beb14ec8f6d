//! Program assembly.
//!
//! Drives one source through section extraction, script analysis, and view
//! compilation, splices the generated constructor statements into the patched
//! class, appends the custom-element registration, and normalizes the result
//! through a full parse and reprint so the output is guaranteed-valid
//! JavaScript with uniform formatting.

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};

use crate::analyze::analyze_script;
use crate::error::{CompileError, E_EMIT};
use crate::sections::extract_sections;
use crate::view::ViewCompiler;

/// Compile one rwc source into a complete component program.
pub fn compile(source: &str, file: &str) -> Result<String, CompileError> {
    let definition = extract_sections(source, file)?;
    let analysis = analyze_script(&definition.name, &definition.script, file)?;

    let mut ctor_statements: Vec<String> = Vec::new();

    if let Some(style) = &definition.style {
        ctor_statements.push("const style = document.createElement('style');".to_string());
        ctor_statements.push(format!(
            "style.textContent = `{}`;",
            escape_template_text(style)
        ));
        ctor_statements.push("this.shadowRoot.appendChild(style);".to_string());
    }

    if let Some(view) = &definition.view {
        let view_statements =
            ViewCompiler::new(&analysis, file, source).compile(view)?;
        ctor_statements.extend(view_statements);
    }

    // Derived-state registrations go last so the view's nodes exist before any
    // dispatch the registrations might participate in.
    ctor_statements.extend(analysis.ctor_statements.iter().cloned());

    let program = splice_constructor(&analysis.patched_src, &ctor_statements, file)?;
    let program = format!(
        "{}\ncustomElements.define('{}', {});",
        program,
        derive_tag_name(&definition.name),
        definition.name
    );

    normalize(&program, file)
}

/// Custom-element tag for a component name: split before capitals, lowercase,
/// join with dashes. `MyWidget` becomes `my-widget`.
pub fn derive_tag_name(name: &str) -> String {
    let mut tag = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                tag.push('-');
            }
            tag.push(ch.to_ascii_lowercase());
        } else {
            tag.push(ch);
        }
    }
    tag
}

fn escape_template_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTRUCTOR SPLICE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct ConstructorFinder {
    /// Span of the constructor body including braces.
    body: Option<(usize, usize)>,
}

impl<'a> Visit<'a> for ConstructorFinder {
    fn visit_method_definition(&mut self, def: &MethodDefinition<'a>) {
        if def.kind == MethodDefinitionKind::Constructor && self.body.is_none() {
            if let Some(body) = &def.value.body {
                let span = body.span();
                self.body = Some((span.start as usize, span.end as usize));
            }
        }
        walk::walk_method_definition(self, def);
    }
}

/// Insert the generated statements at the end of the constructor body, after
/// every user statement. The analyzer guarantees a constructor exists.
fn splice_constructor(
    class_src: &str,
    statements: &[String],
    file: &str,
) -> Result<String, CompileError> {
    if statements.is_empty() {
        return Ok(class_src.to_string());
    }

    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, class_src, SourceType::default()).parse();
    if !ret.errors.is_empty() {
        return Err(CompileError::new(
            E_EMIT,
            "patched component class failed to parse",
            file,
            1,
            1,
        ));
    }
    let mut finder = ConstructorFinder::default();
    finder.visit_program(&ret.program);

    let (_, body_end) = match finder.body {
        Some(span) => span,
        None => {
            return Err(CompileError::new(
                E_EMIT,
                "component class has no constructor to extend",
                file,
                1,
                1,
            ));
        }
    };

    let mut out = String::with_capacity(class_src.len() + statements.iter().map(String::len).sum::<usize>());
    out.push_str(&class_src[..body_end - 1]);
    out.push('\n');
    out.push_str(&statements.join("\n"));
    out.push('\n');
    out.push_str(&class_src[body_end - 1..]);
    Ok(out)
}

/// Final validity gate: parse the assembled program and reprint it. Syntax
/// errors here mean an embedded expression survived the earlier checks, most
/// often inside an interpolation.
fn normalize(program: &str, file: &str) -> Result<String, CompileError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, program, SourceType::default()).parse();
    if let Some(err) = ret.errors.first() {
        return Err(CompileError::with_hints(
            E_EMIT,
            &format!("generated program failed to parse: {}", err),
            file,
            1,
            1,
            vec!["check interpolated expressions in the view".to_string()],
        ));
    }
    Ok(Codegen::new().build(&ret.program).code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_tag_name() {
        assert_eq!(derive_tag_name("Counter"), "counter");
        assert_eq!(derive_tag_name("MyWidget"), "my-widget");
        assert_eq!(derive_tag_name("TodoListItem"), "todo-list-item");
    }

    #[test]
    fn test_minimal_component_compiles_to_defined_class() {
        let src = "<component name=\"Counter\">constructor() { super(); }</component>";
        let out = compile(src, "counter.rwc").unwrap();
        assert!(out.contains("class Counter extends rwc.RwcElement"));
        assert!(out.contains("customElements.define(\"counter\", Counter)"));
    }

    #[test]
    fn test_style_appended_to_shadow_root() {
        let src = "<component name=\"Styled\">constructor() { super(); }</component>\n\
                   <style>p { color: red; }</style>";
        let out = compile(src, "styled.rwc").unwrap();
        assert!(out.contains("document.createElement(\"style\")"));
        assert!(out.contains("color: red"));
        assert!(out.contains("this.shadowRoot.appendChild(style)"));
    }

    #[test]
    fn test_style_backticks_escaped() {
        let src = "<component name=\"S\">constructor() { super(); }</component>\n\
                   <style>p::before { content: `x`; }</style>";
        let out = compile(src, "s.rwc").unwrap();
        assert!(out.contains("\\`x\\`"));
    }

    #[test]
    fn test_view_statements_land_in_constructor() {
        let src = "<component name=\"Greeter\">constructor() { super(); this.name = ('world').reactive(); }</component>\n\
                   <view><p>Hello {{ this.name.value }}</p></view>";
        let out = compile(src, "greeter.rwc").unwrap();
        assert!(out.contains("this.shadowRoot"));
        assert!(out.contains("document.createTextNode"));
        assert!(out.contains("$getUpdates(\"name\")"));
        // view code runs after the user's reactive assignment
        let assign = out.find(".reactive(").unwrap();
        let view = out.find("createTextNode").unwrap();
        assert!(assign < view);
    }

    #[test]
    fn test_component_without_constructor_still_compiles() {
        let src = "<component name=\"Plain\">greet() { return 'hi'; }</component>\n\
                   <view><p>hello</p></view>";
        let out = compile(src, "plain.rwc").unwrap();
        assert!(out.contains("constructor()"));
        assert!(out.contains("createTextNode"));
    }

    #[test]
    fn test_bad_interpolation_expression_fails_at_emit() {
        let src = "<component name=\"Bad\">constructor() { super(); this.x = (1).reactive(); }</component>\n\
                   <view><p>{{ this.x.value ++- }}</p></view>";
        let err = compile(src, "bad.rwc").unwrap_err();
        assert_eq!(err.code, "E_EMIT");
    }

    #[test]
    fn test_structural_error_propagates() {
        let err = compile("<view><p></p></view>", "x.rwc").unwrap_err();
        assert_eq!(err.code, "E_COMPONENT_MISSING");
    }
}
