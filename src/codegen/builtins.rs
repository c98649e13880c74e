use super::registers::{reg32, reg8};
use super::{CodeGen, GenResult, ResType};

use crate::ast::{Expression, FunctionCall};
use crate::error::{CompileError, Result};

impl CodeGen {
    /// `write(args...)` prints each argument through msvcrt. Literals use
    /// an inline format string; variables are formatted into the scratch
    /// buffer with sprintf first; strings print straight from their label.
    pub(super) fn write(&mut self, call: &FunctionCall) -> Result<GenResult> {
        for argument in &call.arguments {
            match argument {
                Expression::String(text) => {
                    let label = self
                        .strings
                        .label(text)
                        .ok_or_else(|| {
                            CompileError::runtime(
                                format!("missing string literal label for \"{text}\""),
                                -1,
                            )
                        })?
                        .to_owned();
                    self.text(format!("cinvoke printf, {label}"));
                }
                Expression::Integer(value) => {
                    self.text(format!("cinvoke printf, '%d', {value}"));
                }
                Expression::Boolean(value) => {
                    // booleans print as their numeric spelling
                    let digit = if *value { "1" } else { "0" };
                    self.text(format!("cinvoke printf, '{digit}'"));
                }
                Expression::Char(value) => {
                    self.text(format!("cinvoke printf, '%c', {value}"));
                }
                Expression::Float(value) => {
                    // varargs promote to double, so fold the widening into
                    // the immediate bit pattern
                    let bits = f64::from(*value).to_bits();
                    let scratch = self.registers.get_free()?;
                    self.text(format!("mov {scratch}, {bits}"));
                    self.text(format!("cinvoke printf, '%f', {scratch}"));
                    self.registers.release(&scratch);
                }
                Expression::Variable(_) => {
                    let result = self.expression(argument)?;
                    self.write_variable(&result)?;
                    self.registers.release(&result.register);
                }
                _ => {
                    return Err(CompileError::type_error(
                        "invalid argument to write",
                        -1,
                    ))
                }
            }
        }
        Ok(GenResult::void())
    }

    fn write_variable(&mut self, result: &GenResult) -> Result<()> {
        match result.res_type {
            ResType::VarInteger | ResType::VarBoolean => {
                self.text(format!("cinvoke sprintf, buffer, '%d', {}", result.register));
                self.text("cinvoke printf, buffer");
            }
            ResType::VarChar => {
                self.text(format!("cinvoke sprintf, buffer, '%c', {}", result.register));
                self.text("cinvoke printf, buffer");
            }
            ResType::VarString => {
                self.text(format!("cinvoke printf, {}", result.register));
            }
            ResType::VarFloat => {
                let scratch = self.registers.get_free()?;
                self.text(format!("cvtss2sd {0}, {0}", result.register));
                self.text(format!("movq {scratch}, {}", result.register));
                self.text(format!("cinvoke sprintf, buffer, '%f', {scratch}"));
                self.text("cinvoke printf, buffer");
                self.registers.release(&scratch);
            }
            _ => {
                return Err(CompileError::type_error(
                    "cannot write a variable of unknown type",
                    -1,
                ))
            }
        }
        Ok(())
    }

    /// `read(args...)` scans each variable through the scratch slot of its
    /// type, then spills the value into the variable's stack slot.
    pub(super) fn read(&mut self, call: &FunctionCall) -> Result<GenResult> {
        for argument in &call.arguments {
            if !argument.is_variable() {
                return Err(CompileError::type_error(
                    "read target must be a variable",
                    -1,
                ));
            }

            let result = self.expression(argument)?;
            let address = result.true_address;
            match result.res_type {
                ResType::VarInteger => {
                    self.text("cinvoke scanf, '%d', intstore");
                    self.text(format!("mov {}, dword [intstore]", reg32(&result.register)));
                    self.text(format!(
                        "mov dword [rbp - {address}], {}",
                        reg32(&result.register)
                    ));
                }
                ResType::VarChar => {
                    self.text("cinvoke scanf, '%c', charstore");
                    self.text(format!("movzx {}, byte [charstore]", result.register));
                    self.text(format!(
                        "mov byte [rbp - {address}], {}",
                        reg8(&result.register)
                    ));
                }
                ResType::VarBoolean => {
                    // scanned as a full %d; only the low byte reaches the slot
                    self.text("cinvoke scanf, '%d', boolstore");
                    self.text(format!("movzx {}, byte [boolstore]", result.register));
                    self.text(format!(
                        "mov byte [rbp - {address}], {}",
                        reg8(&result.register)
                    ));
                }
                ResType::VarString => {
                    self.text("cinvoke scanf, '%s', stringstore");
                    self.text(format!("mov {}, stringstore", result.register));
                    self.text(format!("mov qword [rbp - {address}], {}", result.register));
                }
                ResType::VarFloat => {
                    return Err(CompileError::type_error(
                        "cannot read into a float variable",
                        -1,
                    ))
                }
                _ => {
                    return Err(CompileError::type_error(
                        "cannot read into a variable of unknown type",
                        -1,
                    ))
                }
            }
            self.registers.release(&result.register);
        }
        Ok(GenResult::void())
    }
}
