/*!
A single-pass, ahead-of-time compiler for the Ion language, emitting x86-64
assembly in FASM syntax for Windows PE64 console programs.

## Compilation stages

1. **Tokenization** - [`lexer::next_token`] classifies one token at a time,
   pure over the source text and a byte index. The parser owns the index and
   peeks by lexing without keeping it.
2. **Parsing** - [`parser::parse`] recognizes statements top-down and runs
   expressions through a shunting-yard collector, producing the
   [`ast::Program`] together with the populated lexical
   [`table::SymbolTable`] and the [`strings::StringTable`] of interned
   string literals. Any violation raises a [`error::CompileError`].
3. **Code generation** - [`codegen::CodeGen`] walks the tree once, replaying
   the scope tree in the order the parser built it, and writes the complete
   assembly text: data section with scratch slots and interned literals,
   code section with 16-byte aligned stack frames, and the import section
   for kernel32/msvcrt.

Errors never recover: the driver prints the first one and exits with
status 1.
*/

#![deny(unused_must_use)]
#![warn(clippy::pedantic)]
#![allow(clippy::wildcard_imports)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_possible_truncation)]

pub mod ast;
pub mod codegen;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod strings;
pub mod table;

use error::Result;

/// Runs the whole pipeline over one source text and returns the assembly.
pub fn compile(source: &str) -> Result<String> {
    let parsed = parser::parse(source)?;
    codegen::CodeGen::generate(&parsed.program, parsed.table, parsed.strings)
}
