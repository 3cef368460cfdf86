use crate::Result;

use super::ast::{
    AssignOp, AssignTarget, BinaryOp, Expr, LogicalOp, Stmt, UnaryOp, UpdateOp,
};
use super::cursor::{Cursor, is_ident_byte};

pub(crate) fn parse_program(source: &str) -> Result<Vec<Stmt>> {
    let mut parser = Parser {
        cur: Cursor::new(source),
    };
    let mut stmts = Vec::new();
    while !parser.cur.at_end() {
        if parser.cur.eat(b';') {
            continue;
        }
        stmts.push(parser.parse_stmt()?);
    }
    Ok(stmts)
}

struct Parser<'a> {
    cur: Cursor<'a>,
}

impl<'a> Parser<'a> {
    fn parse_stmt(&mut self) -> Result<Stmt> {
        if self.cur.peek_keyword("var")
            || self.cur.peek_keyword("let")
            || self.cur.peek_keyword("const")
        {
            let stmt = self.parse_var_decl()?;
            self.cur.eat(b';');
            return Ok(stmt);
        }
        if self.cur.eat_keyword("function") {
            let name = self.cur.parse_identifier()?;
            let (params, body) = self.parse_function_rest()?;
            return Ok(Stmt::FunctionDecl { name, params, body });
        }
        if self.cur.eat_keyword("if") {
            return self.parse_if();
        }
        if self.cur.eat_keyword("while") {
            self.cur.expect(b'(')?;
            let cond = self.parse_expr()?;
            self.cur.expect(b')')?;
            let body = self.parse_block_or_single()?;
            return Ok(Stmt::While { cond, body });
        }
        if self.cur.eat_keyword("do") {
            let body = self.parse_block_or_single()?;
            if !self.cur.eat_keyword("while") {
                return Err(self.cur.error("expected 'while' after do body"));
            }
            self.cur.expect(b'(')?;
            let cond = self.parse_expr()?;
            self.cur.expect(b')')?;
            self.cur.eat(b';');
            return Ok(Stmt::DoWhile { body, cond });
        }
        if self.cur.eat_keyword("for") {
            return self.parse_for();
        }
        if self.cur.eat_keyword("return") {
            let value = if self.cur.peek_after_trivia().is_none_or(|b| b == b';' || b == b'}') {
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.cur.eat(b';');
            return Ok(Stmt::Return(value));
        }
        if self.cur.eat_keyword("break") {
            self.cur.eat(b';');
            return Ok(Stmt::Break);
        }
        if self.cur.eat_keyword("continue") {
            self.cur.eat(b';');
            return Ok(Stmt::Continue);
        }
        if self.cur.eat_keyword("throw") {
            let value = self.parse_expr()?;
            self.cur.eat(b';');
            return Ok(Stmt::Throw(value));
        }
        if self.cur.eat_keyword("try") {
            return self.parse_try();
        }
        if self.cur.peek_after_trivia() == Some(b'{') {
            return Ok(Stmt::Block(self.parse_block()?));
        }
        let expr = self.parse_expr()?;
        self.cur.eat(b';');
        Ok(Stmt::Expr(expr))
    }

    fn parse_var_decl(&mut self) -> Result<Stmt> {
        if !(self.cur.eat_keyword("var")
            || self.cur.eat_keyword("let")
            || self.cur.eat_keyword("const"))
        {
            return Err(self.cur.error("expected a declaration keyword"));
        }
        let mut names = Vec::new();
        loop {
            let name = self.cur.parse_identifier()?;
            let init = if self.eat_assign_equals() {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            names.push((name, init));
            if !self.cur.eat(b',') {
                return Ok(Stmt::VarDecl { names });
            }
        }
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        self.cur.expect(b'(')?;
        let cond = self.parse_expr()?;
        self.cur.expect(b')')?;
        let then = self.parse_block_or_single()?;
        let otherwise = if self.cur.eat_keyword("else") {
            if self.cur.eat_keyword("if") {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block_or_single()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then,
            otherwise,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        self.cur.expect(b'(')?;

        let saved = self.cur.pos;
        if let Some(stmt) = self.try_parse_for_in_or_of()? {
            return Ok(stmt);
        }
        self.cur.pos = saved;

        let init = if self.cur.eat(b';') {
            None
        } else if self.cur.peek_keyword("var")
            || self.cur.peek_keyword("let")
            || self.cur.peek_keyword("const")
        {
            let decl = self.parse_var_decl()?;
            self.cur.expect(b';')?;
            Some(Box::new(decl))
        } else {
            let expr = self.parse_expr()?;
            self.cur.expect(b';')?;
            Some(Box::new(Stmt::Expr(expr)))
        };
        let cond = if self.cur.peek_after_trivia() == Some(b';') {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.cur.expect(b';')?;
        let update = if self.cur.peek_after_trivia() == Some(b')') {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.cur.expect(b')')?;
        let body = self.parse_block_or_single()?;
        Ok(Stmt::For {
            init,
            cond,
            update,
            body,
        })
    }

    fn try_parse_for_in_or_of(&mut self) -> Result<Option<Stmt>> {
        let _ = self.cur.eat_keyword("var")
            || self.cur.eat_keyword("let")
            || self.cur.eat_keyword("const");
        let Ok(var_name) = self.cur.parse_identifier() else {
            return Ok(None);
        };
        let is_in = self.cur.peek_keyword("in");
        let is_of = !is_in && self.cur.peek_keyword("of");
        if !is_in && !is_of {
            return Ok(None);
        }
        let _ = self.cur.eat_keyword("in") || self.cur.eat_keyword("of");
        let object = self.parse_expr()?;
        self.cur.expect(b')')?;
        let body = self.parse_block_or_single()?;
        Ok(Some(if is_in {
            Stmt::ForIn {
                var_name,
                object,
                body,
            }
        } else {
            Stmt::ForOf {
                var_name,
                iterable: object,
                body,
            }
        }))
    }

    fn parse_try(&mut self) -> Result<Stmt> {
        let body = self.parse_block()?;
        let catch = if self.cur.eat_keyword("catch") {
            let binding = if self.cur.eat(b'(') {
                let name = self.cur.parse_identifier()?;
                self.cur.expect(b')')?;
                Some(name)
            } else {
                None
            };
            Some((binding, self.parse_block()?))
        } else {
            None
        };
        let finally = if self.cur.eat_keyword("finally") {
            Some(self.parse_block()?)
        } else {
            None
        };
        if catch.is_none() && finally.is_none() {
            return Err(self.cur.error("try needs a catch or finally"));
        }
        Ok(Stmt::Try {
            body,
            catch,
            finally,
        })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.cur.expect(b'{')?;
        let mut stmts = Vec::new();
        loop {
            if self.cur.eat(b'}') {
                return Ok(stmts);
            }
            if self.cur.at_end() {
                return Err(self.cur.error("unterminated block"));
            }
            if self.cur.eat(b';') {
                continue;
            }
            stmts.push(self.parse_stmt()?);
        }
    }

    fn parse_block_or_single(&mut self) -> Result<Vec<Stmt>> {
        if self.cur.peek_after_trivia() == Some(b'{') {
            self.parse_block()
        } else {
            Ok(vec![self.parse_stmt()?])
        }
    }

    fn parse_function_rest(&mut self) -> Result<(Vec<String>, Vec<Stmt>)> {
        self.cur.expect(b'(')?;
        let mut params = Vec::new();
        if !self.cur.eat(b')') {
            loop {
                params.push(self.cur.parse_identifier()?);
                if self.cur.eat(b',') {
                    continue;
                }
                self.cur.expect(b')')?;
                break;
            }
        }
        let body = self.parse_block()?;
        Ok((params, body))
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_assignment()
    }

    fn eat_assign_equals(&mut self) -> bool {
        self.cur.skip_trivia();
        if self.cur.peek() == Some(b'=')
            && self.cur.peek_at(1) != Some(b'=')
        {
            self.cur.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        let lhs = self.parse_ternary()?;
        self.cur.skip_trivia();
        let op = if self.cur.peek() == Some(b'=') && self.cur.peek_at(1) != Some(b'=') {
            Some(AssignOp::Assign)
        } else if self.cur.starts_with(b"+=") {
            Some(AssignOp::Add)
        } else if self.cur.starts_with(b"-=") {
            Some(AssignOp::Sub)
        } else if self.cur.starts_with(b"*=") {
            Some(AssignOp::Mul)
        } else if self.cur.starts_with(b"/=") {
            Some(AssignOp::Div)
        } else {
            None
        };
        let Some(op) = op else {
            return Ok(lhs);
        };
        self.cur.pos += if op == AssignOp::Assign { 1 } else { 2 };
        let target = to_assign_target(lhs).ok_or_else(|| self.cur.error("invalid assignment target"))?;
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            target,
            op,
            value: Box::new(value),
        })
    }

    fn parse_ternary(&mut self) -> Result<Expr> {
        let cond = self.parse_logical_or()?;
        if self.cur.eat(b'?') {
            let then = self.parse_assignment()?;
            self.cur.expect(b':')?;
            let otherwise = self.parse_assignment()?;
            return Ok(Expr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(cond)
    }

    fn parse_logical_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_logical_and()?;
        while self.cur.eat_str(b"||") {
            let rhs = self.parse_logical_and()?;
            lhs = Expr::Logical {
                op: LogicalOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.cur.eat_str(b"&&") {
            let rhs = self.parse_equality()?;
            lhs = Expr::Logical {
                op: LogicalOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = if self.cur.eat_str(b"===") {
                BinaryOp::StrictEq
            } else if self.cur.eat_str(b"!==") {
                BinaryOp::StrictNe
            } else if self.cur.eat_str(b"==") {
                BinaryOp::Eq
            } else if self.cur.eat_str(b"!=") {
                BinaryOp::Ne
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = if self.cur.eat_str(b"<=") {
                BinaryOp::Le
            } else if self.cur.eat_str(b">=") {
                BinaryOp::Ge
            } else if self.cur.eat(b'<') {
                BinaryOp::Lt
            } else if self.cur.eat(b'>') {
                BinaryOp::Gt
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            self.cur.skip_trivia();
            let op = if self.cur.peek() == Some(b'+') && self.cur.peek_at(1) != Some(b'+') && self.cur.peek_at(1) != Some(b'=') {
                BinaryOp::Add
            } else if self.cur.peek() == Some(b'-')
                && self.cur.peek_at(1) != Some(b'-')
                && self.cur.peek_at(1) != Some(b'=')
            {
                BinaryOp::Sub
            } else {
                return Ok(lhs);
            };
            self.cur.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            self.cur.skip_trivia();
            let op = if self.cur.peek() == Some(b'*') && self.cur.peek_at(1) != Some(b'=') {
                BinaryOp::Mul
            } else if self.cur.peek() == Some(b'/')
                && self.cur.peek_at(1) != Some(b'=')
                && self.cur.peek_at(1) != Some(b'/')
                && self.cur.peek_at(1) != Some(b'*')
            {
                BinaryOp::Div
            } else if self.cur.peek() == Some(b'%') && self.cur.peek_at(1) != Some(b'=') {
                BinaryOp::Mod
            } else {
                return Ok(lhs);
            };
            self.cur.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        self.cur.skip_trivia();
        if self.cur.eat_str(b"++") {
            let operand = self.parse_unary()?;
            let target =
                to_assign_target(operand).ok_or_else(|| self.cur.error("invalid ++ target"))?;
            return Ok(Expr::Update {
                target,
                op: UpdateOp::Incr,
                prefix: true,
            });
        }
        if self.cur.eat_str(b"--") {
            let operand = self.parse_unary()?;
            let target =
                to_assign_target(operand).ok_or_else(|| self.cur.error("invalid -- target"))?;
            return Ok(Expr::Update {
                target,
                op: UpdateOp::Decr,
                prefix: true,
            });
        }
        if self.cur.eat(b'!') {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        if self.cur.peek() == Some(b'-') {
            self.cur.pos += 1;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        if self.cur.peek() == Some(b'+') {
            self.cur.pos += 1;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Plus,
                operand: Box::new(operand),
            });
        }
        if self.cur.eat_keyword("typeof") {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::TypeOf,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            self.cur.skip_trivia();
            if self.cur.eat(b'.') {
                let name = self.cur.parse_identifier()?;
                expr = Expr::Member {
                    target: Box::new(expr),
                    name,
                };
            } else if self.cur.peek() == Some(b'[') {
                self.cur.pos += 1;
                let index = self.parse_expr()?;
                self.cur.expect(b']')?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.cur.peek() == Some(b'(') {
                let args = self.parse_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else if self.cur.starts_with(b"++") {
                let target = to_assign_target(expr)
                    .ok_or_else(|| self.cur.error("invalid ++ target"))?;
                self.cur.pos += 2;
                expr = Expr::Update {
                    target,
                    op: UpdateOp::Incr,
                    prefix: false,
                };
            } else if self.cur.starts_with(b"--") {
                let target = to_assign_target(expr)
                    .ok_or_else(|| self.cur.error("invalid -- target"))?;
                self.cur.pos += 2;
                expr = Expr::Update {
                    target,
                    op: UpdateOp::Decr,
                    prefix: false,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        self.cur.expect(b'(')?;
        let mut args = Vec::new();
        if self.cur.eat(b')') {
            return Ok(args);
        }
        loop {
            args.push(self.parse_assignment()?);
            if self.cur.eat(b',') {
                continue;
            }
            self.cur.expect(b')')?;
            return Ok(args);
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        self.cur.skip_trivia();
        match self.cur.peek() {
            None => Err(self.cur.error("unexpected end of script")),
            Some(b'(') => {
                self.cur.pos += 1;
                let expr = self.parse_expr()?;
                self.cur.expect(b')')?;
                Ok(expr)
            }
            Some(b'[') => {
                self.cur.pos += 1;
                let mut items = Vec::new();
                if self.cur.eat(b']') {
                    return Ok(Expr::Array(items));
                }
                loop {
                    items.push(self.parse_assignment()?);
                    if self.cur.eat(b',') {
                        if self.cur.eat(b']') {
                            return Ok(Expr::Array(items));
                        }
                        continue;
                    }
                    self.cur.expect(b']')?;
                    return Ok(Expr::Array(items));
                }
            }
            Some(b'{') => {
                self.cur.pos += 1;
                let mut props = Vec::new();
                if self.cur.eat(b'}') {
                    return Ok(Expr::Object(props));
                }
                loop {
                    let key = self.parse_property_key()?;
                    self.cur.expect(b':')?;
                    let value = self.parse_assignment()?;
                    props.push((key, value));
                    if self.cur.eat(b',') {
                        if self.cur.eat(b'}') {
                            return Ok(Expr::Object(props));
                        }
                        continue;
                    }
                    self.cur.expect(b'}')?;
                    return Ok(Expr::Object(props));
                }
            }
            Some(b'"') | Some(b'\'') => Ok(Expr::Str(self.cur.parse_string_literal()?)),
            Some(b'/') => self.parse_regex_literal(),
            Some(b) if b.is_ascii_digit() => Ok(Expr::Number(self.cur.parse_number()?)),
            Some(b'.') if self.cur.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => {
                Ok(Expr::Number(self.cur.parse_number()?))
            }
            _ => {
                if self.cur.eat_keyword("true") {
                    return Ok(Expr::Bool(true));
                }
                if self.cur.eat_keyword("false") {
                    return Ok(Expr::Bool(false));
                }
                if self.cur.eat_keyword("null") {
                    return Ok(Expr::Null);
                }
                if self.cur.eat_keyword("undefined") {
                    return Ok(Expr::Undefined);
                }
                if self.cur.eat_keyword("new") {
                    let ctor = self.cur.parse_identifier()?;
                    let args = if self.cur.peek_after_trivia() == Some(b'(') {
                        self.parse_args()?
                    } else {
                        Vec::new()
                    };
                    return Ok(Expr::New { ctor, args });
                }
                if self.cur.eat_keyword("function") {
                    // Function expression names are ignored.
                    if self
                        .cur
                        .peek_after_trivia()
                        .is_some_and(super::cursor::is_ident_start)
                    {
                        let _ = self.cur.parse_identifier()?;
                    }
                    let (params, body) = self.parse_function_rest()?;
                    return Ok(Expr::Function { params, body });
                }
                let name = self.cur.parse_identifier()?;
                Ok(Expr::Var(name))
            }
        }
    }

    fn parse_property_key(&mut self) -> Result<String> {
        self.cur.skip_trivia();
        match self.cur.peek() {
            Some(b'"') | Some(b'\'') => self.cur.parse_string_literal(),
            Some(b) if b.is_ascii_digit() => {
                let n = self.cur.parse_number()?;
                Ok(super::format_float(n))
            }
            _ => self.cur.parse_identifier(),
        }
    }

    fn parse_regex_literal(&mut self) -> Result<Expr> {
        let start = self.cur.pos;
        self.cur.pos += 1;
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            let Some(b) = self.cur.bump() else {
                return Err(self.cur.error_at(start, "unterminated regex literal"));
            };
            match b {
                b'\\' => {
                    pattern.push('\\');
                    let Some(escaped) = self.cur.bump() else {
                        return Err(self.cur.error_at(start, "unterminated regex literal"));
                    };
                    pattern.push(escaped as char);
                }
                b'[' => {
                    in_class = true;
                    pattern.push('[');
                }
                b']' => {
                    in_class = false;
                    pattern.push(']');
                }
                b'/' if !in_class => break,
                b'\n' => return Err(self.cur.error_at(start, "unterminated regex literal")),
                _ => {
                    self.cur.pos -= 1;
                    let Some(ch) = self.cur.remaining_str().chars().next() else {
                        return Err(self.cur.error_at(start, "unterminated regex literal"));
                    };
                    pattern.push(ch);
                    self.cur.pos += ch.len_utf8();
                }
            }
        }
        let mut flags = String::new();
        while self.cur.peek().is_some_and(is_ident_byte) {
            flags.push(self.cur.bump().unwrap_or(b'?') as char);
        }
        Ok(Expr::Regex { pattern, flags })
    }
}

fn to_assign_target(expr: Expr) -> Option<AssignTarget> {
    match expr {
        Expr::Var(name) => Some(AssignTarget::Var(name)),
        Expr::Member { target, name } => Some(AssignTarget::Member { target, name }),
        Expr::Index { target, index } => Some(AssignTarget::Index { target, index }),
        _ => None,
    }
}
