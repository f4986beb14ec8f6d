//! Diagnostics for the rwc compiler.
//!
//! Structural failures (missing `<component>`, missing name) abort compilation
//! with no output. Embedded-syntax failures (loop headers, conditions,
//! interpolation braces) are caught during compilation and reported with a
//! location instead of surfacing later as a raw parse failure in the output.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const E_COMPONENT_MISSING: &str = "E_COMPONENT_MISSING";
pub const E_NAME_MISSING: &str = "E_NAME_MISSING";
pub const E_SCRIPT_PARSE: &str = "E_SCRIPT_PARSE";
pub const E_LOOP_HEADER: &str = "E_LOOP_HEADER";
pub const E_CONDITION: &str = "E_CONDITION";
pub const E_INTERPOLATION_UNBALANCED: &str = "E_INTERPOLATION_UNBALANCED";
pub const E_EMIT: &str = "E_EMIT";
pub const E_IO: &str = "E_IO";

fn get_guarantee(code: &str) -> &'static str {
    match code {
        E_COMPONENT_MISSING => "Every rwc source declares exactly one <component> section.",
        E_NAME_MISSING => "The <component> section carries a name attribute.",
        E_SCRIPT_PARSE => "The component script is syntactically valid JavaScript.",
        E_LOOP_HEADER => "A *for attribute holds a valid for-statement header.",
        E_CONDITION => "A *if attribute holds a valid boolean expression.",
        E_INTERPOLATION_UNBALANCED => "Interpolation braces {{ }} are balanced.",
        E_EMIT => "The generated component program is syntactically valid.",
        E_IO => "Input files are readable and output locations writable.",
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILE ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileError {
    pub code: String,
    pub message: String,
    pub guarantee: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub hints: Vec<String>,
}

impl CompileError {
    pub fn new(code: &str, message: &str, file: &str, line: u32, column: u32) -> Self {
        Self::with_hints(code, message, file, line, column, vec![])
    }

    pub fn with_hints(
        code: &str,
        message: &str,
        file: &str,
        line: u32,
        column: u32,
        hints: Vec<String>,
    ) -> Self {
        CompileError {
            code: code.to_string(),
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            file: file.to_string(),
            line,
            column,
            hints,
        }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}:{}:{}: {}",
            self.code, self.file, self.line, self.column, self.message
        )
    }
}

impl std::error::Error for CompileError {}

/// Translate a byte offset into a 1-based line/column pair.
pub fn offset_to_line_col(source: &str, offset: usize) -> (u32, u32) {
    let clamped = offset.min(source.len());
    let mut line = 1u32;
    let mut col = 1u32;
    for ch in source[..clamped].chars() {
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}
