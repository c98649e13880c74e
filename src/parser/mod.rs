
use std::collections::VecDeque;

use crate::ast::*;
use crate::error::{CompileError, Result};
use crate::lexer::{self, Token, TokenData};
use crate::strings::StringTable;
use crate::table::{DataType, Metadata, SymbolTable};

/// Everything one parse produces: the tree plus the tables the code
/// generator consumes afterwards.
#[derive(Debug)]
pub struct Parsed {
    pub program: Program,
    pub table: SymbolTable,
    pub strings: StringTable,
}

pub fn parse(code: &str) -> Result<Parsed> {
    let mut parser = Parser {
        code,
        index: 0,
        line: 1,
        table: SymbolTable::new(),
        strings: StringTable::new(),
    };
    let program = parse_program(&mut parser)?;
    Ok(Parsed {
        program,
        table: parser.table,
        strings: parser.strings,
    })
}

/// Parser state: a position into the source plus the tables being built.
/// The lexer is pure, so peeking is just lexing without keeping the index.
struct Parser<'a> {
    code: &'a str,
    index: usize,
    line: i64,
    table: SymbolTable,
    strings: StringTable,
}

impl Parser<'_> {
    fn next(&mut self) -> TokenData {
        let (token, index) = lexer::next_token(self.code, self.index);
        self.index = index;
        if token.token == Token::NewLine {
            self.line += 1;
        }
        token
    }

    fn peek(&self) -> TokenData {
        lexer::next_token(self.code, self.index).0
    }
}

fn parse_program(p: &mut Parser) -> Result<Program> {
    let mut expressions = Vec::new();
    loop {
        match p.peek().token {
            Token::EndOfFile => break,
            Token::NewLine | Token::Semicolon => {
                p.next();
            }
            Token::Function => expressions.push(parse_function(p)?),
            _ => expressions.push(parse_statement(p)?),
        }
    }
    Ok(Program { expressions })
}

/// Statements legal both at program level and inside blocks. Functions are
/// dispatched separately because they may only appear at program level.
fn parse_statement(p: &mut Parser) -> Result<Expression> {
    match p.peek().token {
        Token::Let => parse_declaration(p),
        Token::If => parse_conditional(p),
        Token::While => parse_loop(p),
        Token::OpenBrace => parse_block(p, false).map(Expression::Block),
        Token::Return => parse_return(p),
        _ => parse_expression(p, false),
    }
}

fn declared_type(token: Token) -> Option<DataType> {
    match token {
        Token::Int => Some(DataType::Integer),
        Token::Float => Some(DataType::Float),
        Token::Bool => Some(DataType::Boolean),
        Token::Char => Some(DataType::Char),
        Token::String => Some(DataType::String),
        _ => None,
    }
}

/// `let IDENT (":" type)? ("=" expression)?`
///
/// The name enters the symbol table here; with an initializer the whole
/// statement becomes an assignment expression.
fn parse_declaration(p: &mut Parser) -> Result<Expression> {
    let line = p.line;
    let keyword = p.next();
    if keyword.token != Token::Let {
        return Err(CompileError::syntax(
            "expected keyword let in a declaration",
            line,
        ));
    }

    let name_token = p.next();
    if name_token.token != Token::Identifier {
        return Err(CompileError::syntax("expected identifier", line));
    }
    let name = name_token.lexeme;

    let mut t = p.next();
    let data_type = if t.token == Token::Colon {
        let type_token = p.next();
        let data_type = declared_type(type_token.token)
            .ok_or_else(|| CompileError::syntax("expected data type", line))?;
        t = p.next();
        data_type
    } else {
        DataType::Unknown
    };

    p.table
        .add_symbol(&name, Metadata::variable(data_type))
        .map_err(|err| err.at_line(line))?;

    let variable = Expression::Variable(name);
    match t.token {
        Token::NewLine | Token::Semicolon => Ok(variable),
        Token::SingleOperator if t.lexeme == "=" => {
            let rhs = parse_expression(p, false)?;
            Ok(Expression::binary(BinaryOp::Assign, variable, rhs))
        }
        _ => Err(CompileError::syntax("unexpected token in a declaration", line)),
    }
}

fn precedence(t: &TokenData) -> u8 {
    if t.token == Token::UnaryOperator {
        return 4;
    }
    match t.lexeme.as_str() {
        "*" | "/" | "%" => 3,
        "+" | "-" => 2,
        "=" => 0,
        _ => 1,
    }
}

fn pop_higher_precedence(
    stack: &mut Vec<TokenData>,
    queue: &mut VecDeque<TokenData>,
    incoming: &TokenData,
) {
    while stack
        .last()
        .is_some_and(|top| top.token != Token::OpenParen && precedence(top) >= precedence(incoming))
    {
        queue.push_back(stack.pop().expect("stack checked non-empty"));
    }
}

/// Shunting-yard collection of one expression, terminated by NEWLINE or
/// SEMICOLON. With `condition` set, a CLOSE_PAREN with no open paren left on
/// the operator stack ends the expression instead (the condition's own
/// closing paren, which is consumed).
fn parse_expression(p: &mut Parser, condition: bool) -> Result<Expression> {
    let line = p.line;
    let mut operator_stack: Vec<TokenData> = Vec::new();
    let mut output_queue: VecDeque<TokenData> = VecDeque::new();
    let mut last = TokenData::new(Token::Undefined, "");

    'collect: loop {
        match p.peek().token {
            Token::NewLine | Token::Semicolon => {
                p.next();
                break;
            }
            // a close brace ends an inline block statement and stays put
            Token::EndOfFile | Token::CloseBrace => break,
            _ => {}
        }

        let mut t = p.next();
        match t.token {
            Token::OpenParen => operator_stack.push(t.clone()),
            Token::CloseParen => {
                while operator_stack
                    .last()
                    .is_some_and(|top| top.token != Token::OpenParen)
                {
                    output_queue.push_back(operator_stack.pop().expect("stack checked non-empty"));
                }
                if operator_stack.is_empty() {
                    if condition {
                        break 'collect;
                    }
                    return Err(CompileError::syntax("unbalanced closing parenthesis", line));
                }
                operator_stack.pop();
            }
            Token::SingleOperator => {
                if matches!(t.lexeme.as_str(), "+" | "-" | "!")
                    && last.token.starts_unary_context()
                {
                    t.token = Token::UnaryOperator;
                }
                pop_higher_precedence(&mut operator_stack, &mut output_queue, &t);
                operator_stack.push(t.clone());
            }
            Token::SingleComparator | Token::DoubleComparator | Token::DoubleOperator => {
                pop_higher_precedence(&mut operator_stack, &mut output_queue, &t);
                operator_stack.push(t.clone());
            }
            token if token.is_operand() => output_queue.push_back(t.clone()),
            Token::Call => collect_call(p, &mut output_queue, t.clone())?,
            _ => {
                // stray tokens are dropped; the builder reports what is left
            }
        }
        last = t;
    }

    while let Some(op) = operator_stack.pop() {
        output_queue.push_back(op);
    }

    build_expression(p, &mut output_queue, line)
}

/// Captures a whole call, open paren through close paren, into the output
/// queue. Argument lists hold only literals, identifiers and commas.
fn collect_call(p: &mut Parser, queue: &mut VecDeque<TokenData>, call: TokenData) -> Result<()> {
    queue.push_back(call);

    let open = p.next();
    if open.token != Token::OpenParen {
        return Err(CompileError::syntax("function call missing open paren", p.line));
    }
    queue.push_back(open);

    loop {
        let t = p.next();
        match t.token {
            Token::CloseParen => {
                queue.push_back(t);
                return Ok(());
            }
            Token::Comma | Token::Identifier => queue.push_back(t),
            token if token.is_literal() => queue.push_back(t),
            Token::EndOfFile => {
                return Err(CompileError::syntax("unterminated argument list", p.line))
            }
            _ => return Err(CompileError::syntax("invalid parameter", p.line)),
        }
    }
}

/// Folds the shunting-yard output queue left to right over an AST stack.
fn build_expression(
    p: &mut Parser,
    queue: &mut VecDeque<TokenData>,
    line: i64,
) -> Result<Expression> {
    let mut stack: Vec<Expression> = Vec::new();

    while let Some(t) = queue.pop_front() {
        let node = match t.token {
            Token::SingleOperator
            | Token::DoubleOperator
            | Token::SingleComparator
            | Token::DoubleComparator => {
                let rhs = stack.pop();
                let lhs = stack.pop();
                let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
                    return Err(CompileError::syntax("not enough operands for operator", line));
                };
                let op = BinaryOp::try_from(t.lexeme.as_str()).map_err(|err| err.at_line(line))?;
                if op == BinaryOp::Assign && !lhs.is_variable() {
                    return Err(CompileError::syntax(
                        "left-hand side of assignment is not assignable",
                        line,
                    ));
                }
                Expression::binary(op, lhs, rhs)
            }
            Token::UnaryOperator => {
                let operand = stack
                    .pop()
                    .ok_or_else(|| CompileError::syntax("no operand for unary operator", line))?;
                let op = UnaryOp::try_from(t.lexeme.as_str()).map_err(|err| err.at_line(line))?;
                Expression::unary(op, operand)
            }
            Token::Call => build_call(p, queue, &t, line)?,
            _ => literal_node(p, &t, line)?,
        };
        stack.push(node);
    }

    stack
        .pop()
        .ok_or_else(|| CompileError::syntax("invalid expression", line))
}

/// Builds the AST node for one operand token. String literals are interned
/// here, on their first appearance in the tree.
fn literal_node(p: &mut Parser, t: &TokenData, line: i64) -> Result<Expression> {
    match t.token {
        Token::IntLiteral => {
            let value = t.lexeme.parse::<i64>().map_err(|_| {
                CompileError::syntax(format!("integer literal '{}' out of range", t.lexeme), line)
            })?;
            Ok(Expression::Integer(value))
        }
        Token::FloatLiteral => {
            let value = t.lexeme.parse::<f32>().map_err(|_| {
                CompileError::syntax(format!("bad floating point literal '{}'", t.lexeme), line)
            })?;
            Ok(Expression::Float(value))
        }
        Token::BoolLiteral => Ok(Expression::Boolean(t.lexeme == "TRUE")),
        Token::CharLiteral => Ok(Expression::Char(t.lexeme.bytes().next().unwrap_or(0))),
        Token::StringLiteral => {
            p.strings.intern(&t.lexeme);
            Ok(Expression::String(t.lexeme.clone()))
        }
        Token::Identifier => Ok(Expression::Variable(t.lexeme.clone())),
        _ => Err(CompileError::syntax("unknown token type in expression", line)),
    }
}

/// Consumes a call's own tokens from the queue and builds its node.
fn build_call(
    p: &mut Parser,
    queue: &mut VecDeque<TokenData>,
    call: &TokenData,
    line: i64,
) -> Result<Expression> {
    let open = queue.pop_front();
    if open.map_or(true, |t| t.token != Token::OpenParen) {
        return Err(CompileError::syntax("function call missing open paren", line));
    }

    let mut arguments = Vec::new();
    loop {
        let t = queue
            .pop_front()
            .ok_or_else(|| CompileError::syntax("unterminated argument list", line))?;
        match t.token {
            Token::CloseParen => break,
            Token::Comma => {}
            _ => arguments.push(literal_node(p, &t, line)?),
        }
    }

    Ok(Expression::FunctionCall(FunctionCall {
        name: call.lexeme.clone(),
        arguments,
    }))
}

/// `{ ... }` with its own scope, except function bodies which reuse the
/// parameter scope opened by `parse_function`.
fn parse_block(p: &mut Parser, reuse_scope: bool) -> Result<Block> {
    let open = p.next();
    if open.token != Token::OpenBrace {
        return Err(CompileError::scope("block missing open brace", p.line));
    }
    if !reuse_scope {
        p.table.scope_in();
    }

    let mut children = Vec::new();
    loop {
        match p.peek().token {
            Token::CloseBrace => break,
            Token::EndOfFile => {
                return Err(CompileError::scope("block missing close brace", p.line))
            }
            Token::NewLine | Token::Semicolon => {
                p.next();
            }
            Token::Function => {
                return Err(CompileError::function(
                    "functions may only be declared at program level",
                    p.line,
                ))
            }
            _ => children.push(parse_statement(p)?),
        }
    }
    p.next();

    let line = p.line;
    p.table.scope_out().map_err(|err| err.at_line(line))?;

    Ok(Block { children })
}

/// `fn IDENT "(" params ")" (":" type)? block`, program level only.
fn parse_function(p: &mut Parser) -> Result<Expression> {
    let line = p.line;
    let keyword = p.next();
    if keyword.token != Token::Function {
        return Err(CompileError::function("function missing keyword fn", line));
    }

    // the lexer classifies a name directly before `(` as a call token
    let name_token = p.next();
    if name_token.token != Token::Call {
        return Err(CompileError::function("function missing name", line));
    }
    let name = name_token.lexeme;

    let open = p.next();
    if open.token != Token::OpenParen {
        return Err(CompileError::function("function missing open paren", line));
    }

    // parameters live in their own scope, which the body reuses
    p.table.scope_in();

    let mut parameters = Vec::new();
    loop {
        let t = p.next();
        match t.token {
            Token::CloseParen => break,
            Token::Comma => {}
            Token::Identifier => {
                let param_type = if p.peek().token == Token::Colon {
                    p.next();
                    let type_token = p.next();
                    declared_type(type_token.token)
                        .ok_or_else(|| CompileError::type_error("invalid parameter type", p.line))?
                } else {
                    DataType::Unknown
                };
                let line = p.line;
                p.table
                    .add_symbol(&t.lexeme, Metadata::variable(param_type))
                    .map_err(|err| err.at_line(line))?;
                parameters.push(Expression::Variable(t.lexeme));
            }
            token if token.is_literal() => {
                let line = p.line;
                parameters.push(literal_node(p, &t, line)?);
            }
            Token::EndOfFile => {
                return Err(CompileError::function("unterminated parameter list", p.line))
            }
            _ => return Err(CompileError::function("invalid parameter", p.line)),
        }
    }

    let return_type = if p.peek().token == Token::Colon {
        p.next();
        let type_token = p.next();
        declared_type(type_token.token)
            .ok_or_else(|| CompileError::type_error("invalid return type", p.line))?
    } else {
        DataType::Unknown
    };

    let body = parse_block(p, true)?;

    let line = p.line;
    p.table
        .add_symbol(&name, Metadata::function(return_type))
        .map_err(|err| err.at_line(line))?;

    Ok(Expression::Function(Function {
        name,
        parameters,
        body,
    }))
}

/// `if "(" expr ")" block ("else" "if" ... block)* ("else" block)?`
fn parse_conditional(p: &mut Parser) -> Result<Expression> {
    let mut branches = Vec::new();
    loop {
        if p.peek().token == Token::If {
            p.next();
            let open = p.next();
            if open.token != Token::OpenParen {
                return Err(CompileError::syntax("conditional missing open paren", p.line));
            }
            let condition = parse_expression(p, true)?;
            let body = parse_block(p, false)?;
            branches.push(Branch {
                condition: Some(condition),
                body,
            });
        } else {
            // a trailing bare else
            let body = parse_block(p, false)?;
            branches.push(Branch {
                condition: None,
                body,
            });
            break;
        }

        if p.peek().token == Token::Else {
            p.next();
        } else {
            break;
        }
    }
    Ok(Expression::Conditional(Conditional { branches }))
}

/// `while "(" expr ")" block`
fn parse_loop(p: &mut Parser) -> Result<Expression> {
    let keyword = p.next();
    if keyword.token != Token::While {
        return Err(CompileError::syntax("expected keyword while in a loop", p.line));
    }
    let open = p.next();
    if open.token != Token::OpenParen {
        return Err(CompileError::syntax("condition missing open paren", p.line));
    }
    let condition = parse_expression(p, true)?;
    let body = parse_block(p, false)?;
    Ok(Expression::Loop(Loop {
        condition: Box::new(condition),
        body,
    }))
}

/// `return expression`, terminated like any expression statement.
fn parse_return(p: &mut Parser) -> Result<Expression> {
    let keyword = p.next();
    if keyword.token != Token::Return {
        return Err(CompileError::syntax("expected keyword return", p.line));
    }
    let expr = parse_expression(p, false)?;
    Ok(Expression::Return(Box::new(expr)))
}
