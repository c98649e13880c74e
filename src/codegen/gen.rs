use super::registers::{reg32, reg8};
use super::{align_up, CodeGen, GenResult, ResType};

use crate::ast::{Binary, BinaryOp, Block, Conditional, Expression, Loop, Unary, UnaryOp};
use crate::error::{CompileError, Result};
use crate::table::DataType;

impl CodeGen {
    pub(super) fn expression(&mut self, expression: &Expression) -> Result<GenResult> {
        match expression {
            Expression::Integer(value) => {
                let register = self.registers.get_free()?;
                self.text(format!("mov {register}, {value}"));
                Ok(GenResult::new(register, ResType::Integer))
            }
            Expression::Boolean(value) => {
                let register = self.registers.get_free()?;
                self.text(format!("mov {register}, {}", i64::from(*value)));
                Ok(GenResult::new(register, ResType::Boolean))
            }
            Expression::Char(value) => {
                let register = self.registers.get_free()?;
                self.text(format!("mov {register}, {value}"));
                Ok(GenResult::new(register, ResType::Char))
            }
            Expression::Float(value) => self.float_literal(*value),
            Expression::String(text) => self.string_literal(text),
            Expression::Variable(name) => self.variable(name),
            Expression::Unary(unary) => self.unary(unary),
            Expression::Binary(binary) => self.binary(binary),
            Expression::Block(block) => self.block(block),
            Expression::Conditional(conditional) => self.conditional(conditional),
            Expression::Loop(loop_) => self.loop_(loop_),
            Expression::FunctionCall(call) => self.call(call),
            Expression::Return(expression) => self.return_(expression),
            Expression::Function(function) => Err(CompileError::function(
                format!(
                    "function '{}' cannot be generated, function definitions are not supported",
                    function.name
                ),
                -1,
            )),
        }
    }

    /// There is no move-immediate into an XMM register, so the bit pattern
    /// takes a detour through a general-purpose scratch register.
    fn float_literal(&mut self, value: f32) -> Result<GenResult> {
        let scratch = self.registers.get_free()?;
        let register = self.registers.get_free_xmm()?;
        self.text(format!("mov {}, {}", reg32(&scratch), value.to_bits()));
        self.text(format!("movd {register}, {}", reg32(&scratch)));
        self.registers.release(&scratch);
        Ok(GenResult::new(register, ResType::Float))
    }

    /// A string value is the address of its interned data-section label.
    fn string_literal(&mut self, text: &str) -> Result<GenResult> {
        let label = self
            .strings
            .label(text)
            .ok_or_else(|| {
                CompileError::runtime(format!("missing string literal label for \"{text}\""), -1)
            })?
            .to_owned();
        let register = self.registers.get_free()?;
        self.text(format!("mov {register}, {label}"));
        Ok(GenResult::new(register, ResType::String))
    }

    /// Loads a variable. On first use the base-pointer offset is resolved
    /// from the running stack displacement and cached in the symbol table.
    fn variable(&mut self, name: &str) -> Result<GenResult> {
        let data = self
            .table
            .lookup(name)
            .cloned()
            .ok_or_else(|| {
                CompileError::reference(format!("variable '{name}' has not been declared"), -1)
            })?;

        let true_address = if data.relative_address == -1 {
            let resolved = self.global_address - (data.address + data.size);
            self.table.set_relative_address(name, resolved);
            resolved
        } else {
            data.relative_address
        };

        let mut result = match data.data_type {
            DataType::Integer => {
                let register = self.registers.get_free()?;
                self.text(format!("movsxd {register}, dword [rbp - {true_address}]"));
                GenResult::new(register, ResType::VarInteger)
            }
            DataType::Char | DataType::Boolean => {
                let register = self.registers.get_free()?;
                self.text(format!("movzx {register}, byte [rbp - {true_address}]"));
                GenResult::new(register, ResType::variable(data.data_type))
            }
            DataType::String | DataType::Unknown => {
                let register = self.registers.get_free()?;
                self.text(format!("mov {register}, qword [rbp - {true_address}]"));
                GenResult::new(register, ResType::variable(data.data_type))
            }
            DataType::Float => {
                let register = self.registers.get_free_xmm()?;
                self.text(format!("movss {register}, dword [rbp - {true_address}]"));
                GenResult::new(register, ResType::VarFloat)
            }
        };
        result.true_address = true_address;
        Ok(result)
    }

    fn unary(&mut self, unary: &Unary) -> Result<GenResult> {
        let operand = self.expression(&unary.operand)?;
        match unary.op {
            UnaryOp::Plus => Ok(operand),
            UnaryOp::Negate => {
                if operand.res_type.data_type() != Some(DataType::Integer) {
                    return Err(CompileError::type_error(
                        "unary '-' expects an integer operand",
                        -1,
                    ));
                }
                self.text(format!("neg {}", operand.register));
                Ok(GenResult::new(operand.register, ResType::Integer))
            }
            UnaryOp::LogicalNot => {
                let data_type = operand.res_type.data_type();
                if data_type != Some(DataType::Integer) && data_type != Some(DataType::Boolean) {
                    return Err(CompileError::type_error(
                        "unary '!' expects an integer or boolean operand",
                        -1,
                    ));
                }
                self.text(format!("cmp {}, 0", operand.register));
                self.text("sete al");
                self.text(format!("movzx {}, al", operand.register));
                Ok(GenResult::new(operand.register, ResType::Boolean))
            }
        }
    }

    fn binary(&mut self, binary: &Binary) -> Result<GenResult> {
        match binary.op {
            BinaryOp::Assign => self.assignment(binary),
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => self.logical(binary),
            op if op.is_comparison() => {
                let lhs = self.expression(&binary.lhs)?;
                let rhs = self.expression(&binary.rhs)?;
                self.comparison(op, lhs, rhs)
            }
            op => {
                let lhs = self.expression(&binary.lhs)?;
                let rhs = self.expression(&binary.rhs)?;
                self.arithmetic(op, lhs, rhs)
            }
        }
    }

    /// Integer arithmetic on the LHS register. Division and modulo go
    /// through rax/rdx as idiv demands and move the result back.
    fn arithmetic(&mut self, op: BinaryOp, lhs: GenResult, rhs: GenResult) -> Result<GenResult> {
        let integers = lhs.res_type.data_type() == Some(DataType::Integer)
            && rhs.res_type.data_type() == Some(DataType::Integer);
        if !integers {
            return Err(CompileError::type_error(
                format!("operator '{}' expects integer operands", op.symbol()),
                -1,
            ));
        }

        let (l, r) = (&lhs.register, &rhs.register);
        match op {
            BinaryOp::Add => self.text(format!("add {l}, {r}")),
            BinaryOp::Subtract => self.text(format!("sub {l}, {r}")),
            BinaryOp::Multiply => self.text(format!("imul {l}, {r}")),
            BinaryOp::Divide => {
                self.text(format!("mov rax, {l}"));
                self.text("cqo");
                self.text(format!("idiv {r}"));
                self.text(format!("mov {l}, rax"));
            }
            BinaryOp::Modulo => {
                self.text(format!("mov rax, {l}"));
                self.text("cqo");
                self.text(format!("idiv {r}"));
                self.text(format!("mov {l}, rdx"));
            }
            _ => unreachable!("filtered by the caller"),
        }

        self.registers.release(&rhs.register);
        Ok(GenResult::new(lhs.register, ResType::Integer))
    }

    /// `cmp` plus the matching `set*` on al, widened back into the LHS
    /// register. Strings compare by address, which interning turns into
    /// text equality for literals.
    fn comparison(&mut self, op: BinaryOp, lhs: GenResult, rhs: GenResult) -> Result<GenResult> {
        let pair = (lhs.res_type.data_type(), rhs.res_type.data_type());
        let allowed = match pair {
            (Some(DataType::Integer), Some(DataType::Integer))
            | (Some(DataType::Boolean), Some(DataType::Boolean))
            | (Some(DataType::Char), Some(DataType::Char)) => true,
            (Some(DataType::String), Some(DataType::String)) => op.is_equality(),
            _ => false,
        };
        if !allowed {
            return Err(CompileError::type_error(
                format!("invalid operand types for comparison '{}'", op.symbol()),
                -1,
            ));
        }

        let condition = match op {
            BinaryOp::IsEqual => "e",
            BinaryOp::IsNotEqual => "ne",
            BinaryOp::LessThan => "l",
            BinaryOp::LessOrEqual => "le",
            BinaryOp::GreaterThan => "g",
            BinaryOp::GreaterOrEqual => "ge",
            _ => unreachable!("filtered by the caller"),
        };
        self.text(format!("cmp {}, {}", lhs.register, rhs.register));
        self.text(format!("set{condition} al"));
        self.text(format!("movzx {}, al", lhs.register));

        self.registers.release(&rhs.register);
        Ok(GenResult::new(lhs.register, ResType::Boolean))
    }

    /// Short-circuit expansion with two fresh labels. The right-hand side
    /// only executes when the left-hand side has not decided the result.
    fn logical(&mut self, binary: &Binary) -> Result<GenResult> {
        let lhs = self.expression(&binary.lhs)?;
        self.logical_operand_check(&lhs, binary.op)?;

        let short = self.next_label();
        let end = self.next_label();

        match binary.op {
            BinaryOp::LogicalAnd => {
                self.text(format!("test {0}, {0}", lhs.register));
                self.text(format!("jz label_{short}"));
                let rhs = self.expression(&binary.rhs)?;
                self.logical_operand_check(&rhs, binary.op)?;
                self.text(format!("test {0}, {0}", rhs.register));
                self.text(format!("jz label_{short}"));
                self.registers.release(&rhs.register);
                self.text(format!("mov {}, 1", lhs.register));
                self.text(format!("jmp label_{end}"));
                self.label(format!("label_{short}"));
                self.text(format!("mov {}, 0", lhs.register));
                self.label(format!("label_{end}"));
            }
            BinaryOp::LogicalOr => {
                self.text(format!("test {0}, {0}", lhs.register));
                self.text(format!("jnz label_{short}"));
                let rhs = self.expression(&binary.rhs)?;
                self.logical_operand_check(&rhs, binary.op)?;
                self.text(format!("test {0}, {0}", rhs.register));
                self.text(format!("jnz label_{short}"));
                self.registers.release(&rhs.register);
                self.text(format!("mov {}, 0", lhs.register));
                self.text(format!("jmp label_{end}"));
                self.label(format!("label_{short}"));
                self.text(format!("mov {}, 1", lhs.register));
                self.label(format!("label_{end}"));
            }
            _ => unreachable!("filtered by the caller"),
        }

        Ok(GenResult::new(lhs.register, ResType::Boolean))
    }

    fn logical_operand_check(&self, operand: &GenResult, op: BinaryOp) -> Result<()> {
        let data_type = operand.res_type.data_type();
        if data_type == Some(DataType::Integer) || data_type == Some(DataType::Boolean) {
            Ok(())
        } else {
            Err(CompileError::type_error(
                format!(
                    "operator '{}' expects integer or boolean operands",
                    op.symbol()
                ),
                -1,
            ))
        }
    }

    /// Assignment into a variable slot. An UNKNOWN target takes its type
    /// from the right-hand side before the width of the spill is chosen.
    fn assignment(&mut self, binary: &Binary) -> Result<GenResult> {
        let Expression::Variable(name) = binary.lhs.as_ref() else {
            return Err(CompileError::syntax(
                "left-hand side of assignment is not assignable",
                -1,
            ));
        };

        let mut lhs = self.expression(&binary.lhs)?;
        let rhs = self.expression(&binary.rhs)?;

        let mut lhs_type = lhs.res_type;
        if lhs_type == ResType::VarUnknown {
            let inferred = rhs.res_type.data_type().ok_or_else(|| {
                CompileError::type_error(
                    format!("cannot infer a type for '{name}' from the right-hand side"),
                    -1,
                )
            })?;
            self.table.change_type(name, inferred);
            lhs_type = ResType::variable(inferred);

            // the unknown slot was loaded into a general register; a float
            // value lives in an xmm register instead
            if inferred == DataType::Float {
                self.registers.release(&lhs.register);
                lhs.register = self.registers.get_free_xmm()?;
            }
        }

        let lhs_data_type = lhs_type.data_type().expect("variable types always map");
        match (lhs_data_type, rhs.res_type.data_type()) {
            (DataType::Float, Some(DataType::Float)) => {
                self.text(format!("movss {}, {}", lhs.register, rhs.register));
            }
            (DataType::Float, Some(DataType::Integer)) => {
                self.text(format!("cvtsi2ss {}, {}", lhs.register, rhs.register));
            }
            (DataType::Integer, Some(DataType::Float)) => {
                self.text(format!("cvttss2si {}, {}", lhs.register, rhs.register));
            }
            (DataType::Integer, Some(DataType::Integer))
            | (DataType::Boolean, Some(DataType::Boolean))
            | (DataType::Char, Some(DataType::Char))
            | (DataType::String, Some(DataType::String)) => {
                self.text(format!("mov {}, {}", lhs.register, rhs.register));
            }
            _ => {
                return Err(CompileError::type_error(
                    format!("incompatible types in assignment to '{name}'"),
                    -1,
                ))
            }
        }

        let address = lhs.true_address;
        match lhs_data_type {
            DataType::Integer => {
                self.text(format!("mov dword [rbp - {address}], {}", reg32(&lhs.register)));
            }
            DataType::Char | DataType::Boolean => {
                self.text(format!("mov byte [rbp - {address}], {}", reg8(&lhs.register)));
            }
            DataType::Float => {
                self.text(format!("movss dword [rbp - {address}], {}", lhs.register));
            }
            DataType::String | DataType::Unknown => {
                self.text(format!("mov qword [rbp - {address}], {}", lhs.register));
            }
        }

        self.registers.release(&rhs.register);
        Ok(GenResult {
            register: lhs.register,
            res_type: lhs_type,
            true_address: lhs.true_address,
        })
    }

    /// Replays the scope the parser created for this block and brackets the
    /// body with its aligned frame, keeping the running displacement in
    /// lock-step with rsp.
    pub(super) fn block(&mut self, block: &Block) -> Result<GenResult> {
        self.table.traverse_in()?;

        let frame = align_up(self.table.scope_size(), 16);
        if frame > 0 {
            self.text(format!("sub rsp, {frame}"));
            self.global_address += frame;
        }

        for child in &block.children {
            let result = self.expression(child)?;
            self.registers.release(&result.register);
        }

        if frame > 0 {
            self.text(format!("add rsp, {frame}"));
            self.global_address -= frame;
        }

        self.table.traverse_out()?;
        Ok(GenResult::void())
    }

    /// Conditioned branches each get a skip label and jump to one shared
    /// end label after their body, so exactly one branch runs.
    fn conditional(&mut self, conditional: &Conditional) -> Result<GenResult> {
        let end = self.next_label();

        for branch in &conditional.branches {
            match &branch.condition {
                Some(condition) => {
                    let skip = self.next_label();
                    let result = self.expression(condition)?;
                    self.condition_check(&result)?;
                    self.text(format!("cmp {}, 0", result.register));
                    self.text(format!("je label_{skip}"));
                    self.registers.release(&result.register);
                    self.block(&branch.body)?;
                    self.text(format!("jmp label_{end}"));
                    self.label(format!("label_{skip}"));
                }
                None => {
                    self.block(&branch.body)?;
                }
            }
        }

        self.label(format!("label_{end}"));
        Ok(GenResult::void())
    }

    fn loop_(&mut self, loop_: &Loop) -> Result<GenResult> {
        let start = self.next_label();
        let end = self.next_label();

        self.label(format!("label_{start}"));
        let condition = self.expression(&loop_.condition)?;
        self.condition_check(&condition)?;
        self.text(format!("cmp {}, 0", condition.register));
        self.text(format!("je label_{end}"));
        self.registers.release(&condition.register);

        self.block(&loop_.body)?;
        self.text(format!("jmp label_{start}"));
        self.label(format!("label_{end}"));

        Ok(GenResult::void())
    }

    /// Float results live in XMM registers which the plain `cmp, 0` used
    /// for branching cannot read.
    fn condition_check(&self, condition: &GenResult) -> Result<()> {
        if condition.res_type.data_type() == Some(DataType::Float)
            || condition.res_type == ResType::Void
        {
            return Err(CompileError::type_error(
                "condition must produce an integer or boolean value",
                -1,
            ));
        }
        Ok(())
    }

    fn call(&mut self, call: &crate::ast::FunctionCall) -> Result<GenResult> {
        match call.name.as_str() {
            "write" => self.write(call),
            "read" => self.read(call),
            _ => Err(CompileError::function(
                format!("call to unsupported function '{}'", call.name),
                -1,
            )),
        }
    }

    /// Top-level returns materialize the value in the conventional result
    /// register and nothing more.
    fn return_(&mut self, expression: &Expression) -> Result<GenResult> {
        let result = self.expression(expression)?;
        if result.res_type.data_type() == Some(DataType::Float) {
            self.text(format!("movss xmm0, {}", result.register));
        } else if !result.register.is_empty() {
            self.text(format!("mov rax, {}", result.register));
        }
        self.registers.release(&result.register);
        Ok(GenResult::void())
    }
}
