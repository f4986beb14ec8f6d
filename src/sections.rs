//! Section extraction for .rwc sources.
//!
//! An rwc file carries three named sections: a required `<component name="X">`
//! block holding the class-body script, an optional `<style>` block inlined
//! verbatim, and an optional `<view>` block holding the markup tree. The
//! script and style blocks are pulled out with regexes before the remaining
//! markup goes to html5ever, so raw JavaScript never confuses the tree builder.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;

use crate::error::{offset_to_line_col, CompileError, E_COMPONENT_MISSING, E_NAME_MISSING};

lazy_static! {
    static ref COMPONENT_REGEX: Regex =
        Regex::new(r"(?is)<component\b([^>]*)>([\s\S]*?)</component>").unwrap();
    static ref STYLE_REGEX: Regex = Regex::new(r"(?is)<style[^>]*>([\s\S]*?)</style>").unwrap();
    static ref ATTR_REGEX: Regex =
        Regex::new(r#"(?i)([a-zA-Z0-9_$-]+)(?:=(?:"([^"]*)"|'([^']*)'|([^>\s]+)))?"#).unwrap();
}

/// One parsed component source, compiler-owned; never escapes compilation.
pub struct ComponentDefinition {
    pub name: String,
    pub script: String,
    pub style: Option<String>,
    pub view: Option<Handle>,
    /// Backing tree for `view`. rcdom nodes drain their children lists on
    /// teardown, so the dom must outlive every walk of the view handle.
    dom: Option<RcDom>,
}

impl std::fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("name", &self.name)
            .field("script", &self.script)
            .field("style", &self.style)
            .field("has_view", &self.view.is_some())
            .finish()
    }
}

/// Split an rwc source into its sections.
///
/// Missing `<component>` or a `<component>` without a name attribute are the
/// two structural failures: compilation aborts and produces no output.
pub fn extract_sections(source: &str, file: &str) -> Result<ComponentDefinition, CompileError> {
    let component = match COMPONENT_REGEX.captures(source) {
        Some(caps) => caps,
        None => {
            return Err(CompileError::new(
                E_COMPONENT_MISSING,
                "<component> section missing",
                file,
                1,
                1,
            ));
        }
    };

    let attr_text = component.get(1).map(|m| m.as_str()).unwrap_or("");
    let script = component
        .get(2)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let name = match attribute_value(attr_text, "name") {
        Some(n) if !n.is_empty() => n,
        _ => {
            let offset = component.get(0).map(|m| m.start()).unwrap_or(0);
            let (line, column) = offset_to_line_col(source, offset);
            return Err(CompileError::new(
                E_NAME_MISSING,
                "name attribute missing from <component>",
                file,
                line,
                column,
            ));
        }
    };

    let style = STYLE_REGEX
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string());

    // Strip the script and style blocks, then hand the rest to html5ever.
    let markup = COMPONENT_REGEX.replace_all(source, "");
    let markup = STYLE_REGEX.replace_all(&markup, "");
    let (dom, view) = match parse_view(&markup) {
        Some((dom, view)) => (Some(dom), Some(view)),
        None => (None, None),
    };

    Ok(ComponentDefinition {
        name,
        script,
        style,
        view,
        dom,
    })
}

fn attribute_value(attr_text: &str, wanted: &str) -> Option<String> {
    for caps in ATTR_REGEX.captures_iter(attr_text) {
        if let Some(name) = caps.get(1) {
            if name.as_str().eq_ignore_ascii_case(wanted) {
                return caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .or_else(|| caps.get(4))
                    .map(|m| m.as_str().to_string());
            }
        }
    }
    None
}

fn parse_view(markup: &str) -> Option<(RcDom, Handle)> {
    if markup.trim().is_empty() {
        return None;
    }
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut markup.as_bytes())
        .ok()?;
    let view = find_element(&dom.document, "view")?;
    Some((dom, view))
}

/// Depth-first search for the first element with the given tag name.
fn find_element(handle: &Handle, tag: &str) -> Option<Handle> {
    if let NodeData::Element { ref name, .. } = handle.data {
        if name.local.as_ref() == tag {
            return Some(handle.clone());
        }
    }
    for child in handle.children.borrow().iter() {
        if let Some(found) = find_element(child, tag) {
            return Some(found);
        }
    }
    None
}
