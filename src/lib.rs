//! # Lum
//!
//! A small interpreted language toolchain: Lum source is parsed to an AST,
//! optionally serialized to a compact compressed on-disk "lump", and
//! executed by a tree-walking interpreter with a nominal static type
//! system, closures, user records, n-dimensional integer arrays, module
//! import/export, and pluggable native function modules.
//!
//! Pipeline: source text → tokens → AST → (lump bytes) → AST → execution.
//!
//! ## Example
//! ```
//! let result = lum::run_source(
//!     "fin int main() { return 2 + 3 * 4; }",
//!     "example.lum",
//! ).unwrap();
//! assert_eq!(result.as_int().unwrap(), 14);
//! ```

pub mod ast;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod executor;
pub mod lexer;
pub mod lumper;
pub mod native;
pub mod parser;
pub mod span;
pub mod stdlib;
pub mod value;

pub use ast::{BinOp, Node, NodeKind, Primitive};
pub use error::{LumError, LumResult};
pub use executor::Executor;
pub use span::Span;
pub use value::{TypeDesc, Value};

/// Version of the Lum toolchain.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const LANGUAGE_NAME: &str = "Lum";

/// Parse one entry file (plus everything it imports) into a program AST.
pub fn parse_source(source: &str, file: &str) -> LumResult<Node> {
    parser::parse_program(source, file)
}

/// Parse and execute in one step. The result is the program's exit value:
/// `main`'s return value, or `0` when no `main` is defined.
pub fn run_source(source: &str, file: &str) -> LumResult<Value> {
    let program = parse_source(source, file)?;
    Executor::new(program).run()
}

/// Decode and execute lump bytes.
pub fn run_lump(bytes: &[u8]) -> LumResult<Value> {
    let program = lumper::unlump(bytes)?;
    Executor::new(program).run()
}
