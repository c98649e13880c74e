mod builtins;
mod gen;
mod registers;

#[cfg(test)]
mod codegen_tests;

pub use registers::RegisterManager;

use crate::ast::Program;
use crate::error::Result;
use crate::strings::StringTable;
use crate::table::{DataType, SymbolTable};

/// What generating one AST node leaves behind: the register holding the
/// value, the value's category, and (for variables) the resolved offset
/// from the base pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct GenResult {
    pub register: String,
    pub res_type: ResType,
    pub true_address: i64,
}

impl GenResult {
    fn new(register: impl Into<String>, res_type: ResType) -> Self {
        Self {
            register: register.into(),
            res_type,
            true_address: -1,
        }
    }

    /// Statements produce no value; releasing the empty register name is a
    /// no-op by contract.
    fn void() -> Self {
        Self::new("", ResType::Void)
    }
}

/// The category of a generated value. Variable-backed values keep their own
/// half of the enum because assignment and the built-ins treat them
/// differently from literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResType {
    Integer,
    Char,
    String,
    Float,
    Boolean,
    Void,
    VarInteger,
    VarChar,
    VarString,
    VarFloat,
    VarBoolean,
    VarUnknown,
}

impl ResType {
    fn variable(data_type: DataType) -> Self {
        match data_type {
            DataType::Integer => Self::VarInteger,
            DataType::Char => Self::VarChar,
            DataType::String => Self::VarString,
            DataType::Float => Self::VarFloat,
            DataType::Boolean => Self::VarBoolean,
            DataType::Unknown => Self::VarUnknown,
        }
    }

    /// The underlying data type, erasing the literal/variable distinction.
    fn data_type(self) -> Option<DataType> {
        match self {
            Self::Integer | Self::VarInteger => Some(DataType::Integer),
            Self::Char | Self::VarChar => Some(DataType::Char),
            Self::String | Self::VarString => Some(DataType::String),
            Self::Float | Self::VarFloat => Some(DataType::Float),
            Self::Boolean | Self::VarBoolean => Some(DataType::Boolean),
            Self::Void | Self::VarUnknown => None,
        }
    }
}

fn align_up(value: i64, to: i64) -> i64 {
    (value + to - 1) / to * to
}

/// The whole code generation context: the output text, the register pools,
/// the running stack-pointer displacement, the label counter, and the two
/// tables produced by the parser (the scope tree is walked in replay mode).
pub struct CodeGen {
    out: String,
    registers: RegisterManager,
    global_address: i64,
    labels: u64,
    table: SymbolTable,
    strings: StringTable,
}

impl CodeGen {
    pub fn new(table: SymbolTable, strings: StringTable) -> Self {
        Self {
            out: String::new(),
            registers: RegisterManager::new(),
            global_address: 0,
            labels: 0,
            table,
            strings,
        }
    }

    /// Generates the complete assembly text for a parsed program.
    pub fn generate(program: &Program, table: SymbolTable, strings: StringTable) -> Result<String> {
        let mut gen = Self::new(table, strings);
        gen.emit_program(program)?;
        Ok(gen.out)
    }

    fn emit_program(&mut self, program: &Program) -> Result<()> {
        self.emit_header();
        self.emit_data_section();

        self.raw("section '.text' code readable executable\n\n");
        self.raw("start:\n");
        self.text("mov rbp, rsp");

        let frame = align_up(self.table.scope_size(), 16);
        if frame > 0 {
            self.text(format!("sub rsp, {frame}"));
            self.global_address += frame;
        }

        for expression in &program.expressions {
            let result = self.expression(expression)?;
            self.registers.release(&result.register);
        }

        if frame > 0 {
            self.text(format!("add rsp, {frame}"));
            self.global_address -= frame;
        }
        self.text("mov ecx, 0");
        self.text("call [ExitProcess]");
        self.blank();

        self.emit_idata_section();
        Ok(())
    }

    fn emit_header(&mut self) {
        self.raw("format PE64 console\n");
        self.raw("entry start\n");
        self.raw("include 'win64ax.inc'\n");
        self.blank();
    }

    /// Scratch slots for the built-ins, then every interned string literal
    /// with a computed length constant.
    fn emit_data_section(&mut self) {
        self.raw("section '.data' data readable writeable\n\n");
        self.text("buffer      rb 64");
        self.text("intstore    dd 0");
        self.text("charstore   db 0");
        self.text("boolstore   dd 0");
        self.text("stringstore rb 256");

        let literals: Vec<(String, String)> = self
            .strings
            .iter()
            .map(|(text, label)| (text.to_owned(), label.to_owned()))
            .collect();
        if !literals.is_empty() {
            self.blank();
        }
        for (text, label) in literals {
            if text.is_empty() {
                self.text(format!("{label} db 0"));
            } else {
                // FASM escapes a quote inside a quoted string by doubling it
                let escaped = text.replace('\'', "''");
                self.text(format!("{label} db '{escaped}', 0"));
            }
            self.text(format!("{label}_len = $ - {label} - 1"));
        }
        self.blank();
    }

    fn emit_idata_section(&mut self) {
        self.raw("section '.idata' import data readable writeable\n\n");
        self.text("library kernel32, 'KERNEL32.DLL', msvcrt, 'MSVCRT.DLL'");
        self.blank();
        self.text("import kernel32, ExitProcess, 'ExitProcess'");
        self.text("import msvcrt, printf, 'printf', scanf, 'scanf', sprintf, 'sprintf', _getch, '_getch'");
    }

    fn next_label(&mut self) -> u64 {
        let id = self.labels;
        self.labels += 1;
        id
    }

    /// One indented instruction line.
    fn text(&mut self, line: impl AsRef<str>) {
        self.out.push_str("        ");
        self.out.push_str(line.as_ref());
        self.out.push('\n');
    }

    /// A label line, flush left.
    fn label(&mut self, name: impl AsRef<str>) {
        self.out.push_str(name.as_ref());
        self.out.push_str(":\n");
    }

    fn raw(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }
}
