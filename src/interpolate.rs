//! Interpolation extraction for text content and attribute values.
//!
//! Turns `Hello {{ name }}!` into the template literal `` `Hello ${ name }!` ``
//! plus the ordered list of raw expressions found. Nested braces inside an
//! expression (object literals, destructuring) stay within one expression; only
//! the outermost `{{ }}` pair delimits.

use crate::error::{offset_to_line_col, CompileError, E_INTERPOLATION_UNBALANCED};

#[derive(Debug, Clone, PartialEq)]
pub struct Interpolation {
    /// Backtick template literal ready to embed in generated code.
    pub literal: String,
    /// Raw expression texts in source order, inner whitespace preserved.
    pub expressions: Vec<String>,
}

/// Extract interpolation spans from a literal text.
///
/// Unbalanced braces at the end of the text are a compile error rather than
/// being passed through to the output program.
pub fn extract(text: &str, file: &str, source_offset: usize) -> Result<Interpolation, CompileError> {
    let chars: Vec<char> = text.chars().collect();
    let mut depth = 0usize;
    let mut filtered = String::new();
    let mut expressions = Vec::new();
    let mut expression = String::new();
    let mut i = 0usize;

    while i + 1 < chars.len() {
        let curr = chars[i];
        let next = chars[i + 1];
        if curr == '{' && next == '{' {
            depth += 1;
            if depth == 1 {
                filtered.push_str("${");
                i += 2;
                continue;
            }
        }
        if curr == '}' && next == '}' {
            if depth == 0 {
                let (line, column) = offset_to_line_col(text, source_offset + i);
                return Err(CompileError::new(
                    E_INTERPOLATION_UNBALANCED,
                    "closing }} without a matching {{",
                    file,
                    line,
                    column,
                ));
            }
            depth -= 1;
            if depth == 0 {
                filtered.push('}');
                expressions.push(std::mem::take(&mut expression));
                i += 2;
                continue;
            }
        }
        if depth > 0 {
            expression.push(curr);
        }
        filtered.push(curr);
        i += 1;
    }
    if i + 1 == chars.len() {
        // last character, unless it was consumed as part of a delimiter
        if depth > 0 {
            expression.push(chars[i]);
        }
        filtered.push(chars[i]);
    }

    if depth > 0 {
        let (line, column) = offset_to_line_col(text, source_offset + text.len());
        return Err(CompileError::new(
            E_INTERPOLATION_UNBALANCED,
            "interpolation {{ left open at end of text",
            file,
            line,
            column,
        ));
    }

    Ok(Interpolation {
        literal: format!("`{}`", filtered),
        expressions,
    })
}
