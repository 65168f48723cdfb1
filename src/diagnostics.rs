//! Pretty error reporting: source context with line numbers and a caret
//! under the offending column.

use crate::error::LumError;

pub struct Diagnostics<'a> {
    source: &'a str,
    filename: &'a str,
}

impl<'a> Diagnostics<'a> {
    pub fn new(source: &'a str, filename: &'a str) -> Self {
        Self { source, filename }
    }

    pub fn format_error(&self, error: &LumError) -> String {
        match error {
            LumError::Lexer {
                message,
                file,
                line,
                col,
            } => self.format_with_context("Lexer Error", message, file, *line, *col),
            LumError::Parser {
                message,
                file,
                line,
                col,
            } => self.format_with_context("Parse Error", message, file, *line, *col),
            other => format!("\n\x1b[1;31merror\x1b[0m: {other}\n"),
        }
    }

    fn format_with_context(
        &self,
        error_type: &str,
        message: &str,
        file: &str,
        line: usize,
        col: usize,
    ) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "\n\x1b[1;31merror[{error_type}]\x1b[0m: {message}\n"
        ));
        output.push_str(&format!("  \x1b[1;34m-->\x1b[0m {file}:{line}:{col}\n"));

        // Source context only when the error is in the file we hold.
        if file == self.filename {
            if let Some(content) = self.source.lines().nth(line.saturating_sub(1)) {
                output.push_str("   \x1b[1;34m|\x1b[0m\n");
                output.push_str(&format!("\x1b[1;34m{line:>3} |\x1b[0m {content}\n"));
                let pointer_offset = col.saturating_sub(1).min(content.len());
                output.push_str(&format!(
                    "   \x1b[1;34m|\x1b[0m {}\x1b[1;31m^\x1b[0m\n",
                    " ".repeat(pointer_offset)
                ));
                output.push_str("   \x1b[1;34m|\x1b[0m\n");
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LumError;

    #[test]
    fn parse_errors_render_with_context() {
        let source = "int x = 1;\nint y = ;\n";
        let diag = Diagnostics::new(source, "test.lum");
        let err = LumError::parser("Expected expression", "test.lum", 2, 9);
        let rendered = diag.format_error(&err);
        assert!(rendered.contains("Parse Error"));
        assert!(rendered.contains("test.lum:2:9"));
        assert!(rendered.contains("int y = ;"));
    }

    #[test]
    fn foreign_file_errors_render_without_context() {
        let diag = Diagnostics::new("int x;", "entry.lum");
        let err = LumError::parser("Expected expression", "other.lum", 1, 1);
        let rendered = diag.format_error(&err);
        assert!(rendered.contains("other.lum:1:1"));
        assert!(!rendered.contains("int x;"));
    }

    #[test]
    fn runtime_errors_render_plainly() {
        let diag = Diagnostics::new("", "entry.lum");
        let rendered = diag.format_error(&LumError::runtime("Division by zero"));
        assert!(rendered.contains("Division by zero"));
    }
}
