// Recursive-descent parser with the standard Lua operator precedence table.

use std::sync::Arc;

use smol_str::SmolStr;

use crate::ast::{BinOp, Block, Chunk, Expr, ExprKind, FuncBody, Stat, TableItem, UnOp};
use crate::error::{VmError, VmResult};
use crate::lexer::{Lexeme, Lexer, Token};

/// Compile `source` into a chunk. `name` is the diagnostic label attached to
/// errors and debug events.
pub fn compile(source: &str, name: &str) -> VmResult<Chunk> {
    let tokens = Lexer::new(source).tokenize().map_err(|mut e| {
        e.source = SmolStr::new(name);
        e
    })?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        source: SmolStr::new(name),
    };
    let block = parser.parse_block()?;
    parser.expect(Token::Eof)?;
    Ok(Chunk {
        source: SmolStr::new(name),
        block,
    })
}

struct Parser {
    tokens: Vec<Lexeme>,
    pos: usize,
    source: SmolStr,
}

// (left, right) binding powers, Lua 5.4 table.
fn binop_for(token: &Token) -> Option<(BinOp, u8, u8)> {
    Some(match token {
        Token::Or => (BinOp::Or, 1, 1),
        Token::And => (BinOp::And, 2, 2),
        Token::Lt => (BinOp::Lt, 3, 3),
        Token::Gt => (BinOp::Gt, 3, 3),
        Token::LtEq => (BinOp::Le, 3, 3),
        Token::GtEq => (BinOp::Ge, 3, 3),
        Token::NotEq => (BinOp::Ne, 3, 3),
        Token::EqEq => (BinOp::Eq, 3, 3),
        Token::Concat => (BinOp::Concat, 9, 8),
        Token::Plus => (BinOp::Add, 10, 10),
        Token::Minus => (BinOp::Sub, 10, 10),
        Token::Star => (BinOp::Mul, 11, 11),
        Token::Slash => (BinOp::Div, 11, 11),
        Token::DoubleSlash => (BinOp::IDiv, 11, 11),
        Token::Percent => (BinOp::Mod, 11, 11),
        Token::Caret => (BinOp::Pow, 14, 13),
        _ => return None,
    })
}

const UNARY_PRIORITY: u8 = 12;

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn check(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.bump();
            true
        } else {
            false
        }
    }

    fn err(&self, msg: impl Into<String>) -> VmError {
        let mut e = VmError::compile(msg);
        e.source = self.source.clone();
        e.line = self.line();
        e
    }

    fn expect(&mut self, token: Token) -> VmResult<()> {
        if self.peek() == &token {
            self.bump();
            Ok(())
        } else {
            Err(self.err(format!(
                "{} expected near {}",
                token.describe(),
                self.peek().describe()
            )))
        }
    }

    fn expect_name(&mut self) -> VmResult<SmolStr> {
        match self.peek().clone() {
            Token::Name(n) => {
                self.bump();
                Ok(n)
            }
            other => Err(self.err(format!("name expected near {}", other.describe()))),
        }
    }

    fn block_follows(&self) -> bool {
        matches!(
            self.peek(),
            Token::End | Token::Else | Token::Elseif | Token::Until | Token::Eof
        )
    }

    fn parse_block(&mut self) -> VmResult<Block> {
        let mut stats = Vec::new();
        loop {
            if self.block_follows() {
                return Ok(Block { stats });
            }
            if self.check(&Token::Semi) {
                continue;
            }
            let stat = self.parse_stat()?;
            let is_return = matches!(stat, Stat::Return { .. });
            stats.push(stat);
            if is_return {
                self.check(&Token::Semi);
                return Ok(Block { stats });
            }
        }
    }

    fn parse_stat(&mut self) -> VmResult<Stat> {
        let line = self.line();
        match self.peek().clone() {
            Token::If => self.parse_if(),
            Token::While => {
                self.bump();
                let cond = self.parse_expr()?;
                self.expect(Token::Do)?;
                let body = self.parse_block()?;
                self.expect(Token::End)?;
                Ok(Stat::While { cond, body, line })
            }
            Token::Repeat => {
                self.bump();
                let body = self.parse_block()?;
                self.expect(Token::Until)?;
                let cond = self.parse_expr()?;
                Ok(Stat::Repeat { body, cond, line })
            }
            Token::Do => {
                self.bump();
                let body = self.parse_block()?;
                self.expect(Token::End)?;
                Ok(Stat::Do(body))
            }
            Token::For => self.parse_for(),
            Token::Function => self.parse_function_stat(),
            Token::Local => self.parse_local(),
            Token::Return => {
                self.bump();
                let exprs = if self.block_follows() || self.peek() == &Token::Semi {
                    Vec::new()
                } else {
                    self.parse_explist()?
                };
                Ok(Stat::Return { exprs, line })
            }
            Token::Break => {
                self.bump();
                Ok(Stat::Break { line })
            }
            _ => self.parse_expr_stat(),
        }
    }

    fn parse_if(&mut self) -> VmResult<Stat> {
        let line = self.line();
        self.bump(); // if
        let mut arms = Vec::new();
        let cond = self.parse_expr()?;
        self.expect(Token::Then)?;
        arms.push((cond, self.parse_block()?));
        let mut else_block = None;
        loop {
            match self.peek() {
                Token::Elseif => {
                    self.bump();
                    let cond = self.parse_expr()?;
                    self.expect(Token::Then)?;
                    arms.push((cond, self.parse_block()?));
                }
                Token::Else => {
                    self.bump();
                    else_block = Some(self.parse_block()?);
                    self.expect(Token::End)?;
                    break;
                }
                _ => {
                    self.expect(Token::End)?;
                    break;
                }
            }
        }
        Ok(Stat::If {
            arms,
            else_block,
            line,
        })
    }

    fn parse_for(&mut self) -> VmResult<Stat> {
        let line = self.line();
        self.bump(); // for
        let first = self.expect_name()?;
        if self.check(&Token::Assign) {
            let start = self.parse_expr()?;
            self.expect(Token::Comma)?;
            let stop = self.parse_expr()?;
            let step = if self.check(&Token::Comma) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect(Token::Do)?;
            let body = self.parse_block()?;
            self.expect(Token::End)?;
            Ok(Stat::NumericFor {
                var: first,
                start,
                stop,
                step,
                body,
                line,
            })
        } else {
            let mut names = vec![first];
            while self.check(&Token::Comma) {
                names.push(self.expect_name()?);
            }
            self.expect(Token::In)?;
            let exprs = self.parse_explist()?;
            self.expect(Token::Do)?;
            let body = self.parse_block()?;
            self.expect(Token::End)?;
            Ok(Stat::GenericFor {
                names,
                exprs,
                body,
                line,
            })
        }
    }

    /// `function a.b.c(...)` and `function a.b:c(...)` desugar to assignments;
    /// the method form gains an implicit leading `self` parameter.
    fn parse_function_stat(&mut self) -> VmResult<Stat> {
        let line = self.line();
        self.bump(); // function
        let first = self.expect_name()?;
        let mut target = Expr {
            kind: ExprKind::Name(first.clone()),
            line,
        };
        let mut full_name = first.to_string();
        let mut is_method = false;
        loop {
            if self.check(&Token::Dot) {
                let key = self.expect_name()?;
                full_name.push('.');
                full_name.push_str(&key);
                target = Expr {
                    kind: ExprKind::Index(
                        Box::new(target),
                        Box::new(Expr {
                            kind: ExprKind::Str(key),
                            line,
                        }),
                    ),
                    line,
                };
            } else if self.check(&Token::Colon) {
                let key = self.expect_name()?;
                full_name.push(':');
                full_name.push_str(&key);
                target = Expr {
                    kind: ExprKind::Index(
                        Box::new(target),
                        Box::new(Expr {
                            kind: ExprKind::Str(key),
                            line,
                        }),
                    ),
                    line,
                };
                is_method = true;
                break;
            } else {
                break;
            }
        }
        let func = self.parse_func_body(SmolStr::new(&full_name), is_method)?;
        Ok(Stat::Assign {
            targets: vec![target],
            exprs: vec![Expr {
                kind: ExprKind::Function(func),
                line,
            }],
            line,
        })
    }

    fn parse_local(&mut self) -> VmResult<Stat> {
        let line = self.line();
        self.bump(); // local
        if self.check(&Token::Function) {
            let name = self.expect_name()?;
            let func = self.parse_func_body(name.clone(), false)?;
            return Ok(Stat::LocalFunction { name, func, line });
        }
        let mut names = vec![self.expect_name()?];
        while self.check(&Token::Comma) {
            names.push(self.expect_name()?);
        }
        let exprs = if self.check(&Token::Assign) {
            self.parse_explist()?
        } else {
            Vec::new()
        };
        Ok(Stat::Local { names, exprs, line })
    }

    fn parse_func_body(&mut self, name: SmolStr, is_method: bool) -> VmResult<Arc<FuncBody>> {
        let line = self.line();
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if is_method {
            params.push(SmolStr::new("self"));
        }
        let mut is_vararg = false;
        if !self.check(&Token::RParen) {
            loop {
                match self.peek().clone() {
                    Token::Ellipsis => {
                        self.bump();
                        is_vararg = true;
                        break;
                    }
                    Token::Name(n) => {
                        self.bump();
                        params.push(n);
                    }
                    other => {
                        return Err(
                            self.err(format!("parameter expected near {}", other.describe()))
                        );
                    }
                }
                if !self.check(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RParen)?;
        }
        let body = self.parse_block()?;
        self.expect(Token::End)?;
        Ok(Arc::new(FuncBody {
            name,
            params,
            is_vararg,
            body,
            line,
            source: self.source.clone(),
        }))
    }

    fn parse_expr_stat(&mut self) -> VmResult<Stat> {
        let line = self.line();
        let first = self.parse_suffixed()?;
        if self.peek() == &Token::Assign || self.peek() == &Token::Comma {
            let mut targets = vec![first];
            while self.check(&Token::Comma) {
                targets.push(self.parse_suffixed()?);
            }
            for t in &targets {
                if !matches!(t.kind, ExprKind::Name(_) | ExprKind::Index(_, _)) {
                    return Err(self.err("cannot assign to this expression"));
                }
            }
            self.expect(Token::Assign)?;
            let exprs = self.parse_explist()?;
            return Ok(Stat::Assign {
                targets,
                exprs,
                line,
            });
        }
        if !matches!(first.kind, ExprKind::Call(_, _) | ExprKind::MethodCall(_, _, _)) {
            return Err(self.err("syntax error: expression is not a statement"));
        }
        Ok(Stat::Expr(first))
    }

    fn parse_explist(&mut self) -> VmResult<Vec<Expr>> {
        let mut out = vec![self.parse_expr()?];
        while self.check(&Token::Comma) {
            out.push(self.parse_expr()?);
        }
        Ok(out)
    }

    fn parse_expr(&mut self) -> VmResult<Expr> {
        self.parse_binop(0)
    }

    fn parse_binop(&mut self, limit: u8) -> VmResult<Expr> {
        let line = self.line();
        let mut left = match self.peek().clone() {
            Token::Not => {
                self.bump();
                let operand = self.parse_binop(UNARY_PRIORITY)?;
                Expr {
                    kind: ExprKind::Unop(UnOp::Not, Box::new(operand)),
                    line,
                }
            }
            Token::Minus => {
                self.bump();
                let operand = self.parse_binop(UNARY_PRIORITY)?;
                Expr {
                    kind: ExprKind::Unop(UnOp::Neg, Box::new(operand)),
                    line,
                }
            }
            Token::Hash => {
                self.bump();
                let operand = self.parse_binop(UNARY_PRIORITY)?;
                Expr {
                    kind: ExprKind::Unop(UnOp::Len, Box::new(operand)),
                    line,
                }
            }
            _ => self.parse_simple()?,
        };
        while let Some((op, left_prec, right_prec)) = binop_for(self.peek()) {
            if left_prec <= limit {
                break;
            }
            let op_line = self.line();
            self.bump();
            let right = self.parse_binop(right_prec)?;
            left = Expr {
                kind: ExprKind::Binop(op, Box::new(left), Box::new(right)),
                line: op_line,
            };
        }
        Ok(left)
    }

    fn parse_simple(&mut self) -> VmResult<Expr> {
        let line = self.line();
        let kind = match self.peek().clone() {
            Token::Nil => {
                self.bump();
                ExprKind::Nil
            }
            Token::True => {
                self.bump();
                ExprKind::True
            }
            Token::False => {
                self.bump();
                ExprKind::False
            }
            Token::Int(i) => {
                self.bump();
                ExprKind::Int(i)
            }
            Token::Num(n) => {
                self.bump();
                ExprKind::Num(n)
            }
            Token::Str(s) => {
                self.bump();
                ExprKind::Str(s)
            }
            Token::Ellipsis => {
                self.bump();
                ExprKind::Vararg
            }
            Token::Function => {
                self.bump();
                let func = self.parse_func_body(SmolStr::default(), false)?;
                ExprKind::Function(func)
            }
            Token::LBrace => return self.parse_table(),
            _ => return self.parse_suffixed(),
        };
        Ok(Expr { kind, line })
    }

    fn parse_table(&mut self) -> VmResult<Expr> {
        let line = self.line();
        self.expect(Token::LBrace)?;
        let mut items = Vec::new();
        while self.peek() != &Token::RBrace {
            match self.peek().clone() {
                Token::LBracket => {
                    self.bump();
                    let key = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    self.expect(Token::Assign)?;
                    let value = self.parse_expr()?;
                    items.push(TableItem::Keyed(key, value));
                }
                Token::Name(n) if self.tokens[self.pos + 1].token == Token::Assign => {
                    self.bump();
                    self.bump();
                    let value = self.parse_expr()?;
                    items.push(TableItem::Named(n, value));
                }
                _ => {
                    items.push(TableItem::Positional(self.parse_expr()?));
                }
            }
            if !self.check(&Token::Comma) && !self.check(&Token::Semi) {
                break;
            }
        }
        self.expect(Token::RBrace)?;
        Ok(Expr {
            kind: ExprKind::Table(items),
            line,
        })
    }

    fn parse_primary(&mut self) -> VmResult<Expr> {
        let line = self.line();
        match self.peek().clone() {
            Token::Name(n) => {
                self.bump();
                Ok(Expr {
                    kind: ExprKind::Name(n),
                    line,
                })
            }
            Token::LParen => {
                self.bump();
                let e = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(e)
            }
            other => Err(self.err(format!("unexpected symbol near {}", other.describe()))),
        }
    }

    fn parse_suffixed(&mut self) -> VmResult<Expr> {
        let mut e = self.parse_primary()?;
        loop {
            let line = self.line();
            match self.peek().clone() {
                Token::Dot => {
                    self.bump();
                    let key = self.expect_name()?;
                    e = Expr {
                        kind: ExprKind::Index(
                            Box::new(e),
                            Box::new(Expr {
                                kind: ExprKind::Str(key),
                                line,
                            }),
                        ),
                        line,
                    };
                }
                Token::LBracket => {
                    self.bump();
                    let key = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    e = Expr {
                        kind: ExprKind::Index(Box::new(e), Box::new(key)),
                        line,
                    };
                }
                Token::Colon => {
                    self.bump();
                    let name = self.expect_name()?;
                    let args = self.parse_call_args()?;
                    e = Expr {
                        kind: ExprKind::MethodCall(Box::new(e), name, args),
                        line,
                    };
                }
                Token::LParen | Token::LBrace | Token::Str(_) => {
                    let args = self.parse_call_args()?;
                    e = Expr {
                        kind: ExprKind::Call(Box::new(e), args),
                        line,
                    };
                }
                _ => return Ok(e),
            }
        }
    }

    fn parse_call_args(&mut self) -> VmResult<Vec<Expr>> {
        let line = self.line();
        match self.peek().clone() {
            Token::LParen => {
                self.bump();
                if self.check(&Token::RParen) {
                    return Ok(Vec::new());
                }
                let args = self.parse_explist()?;
                self.expect(Token::RParen)?;
                Ok(args)
            }
            Token::Str(s) => {
                self.bump();
                Ok(vec![Expr {
                    kind: ExprKind::Str(s),
                    line,
                }])
            }
            Token::LBrace => Ok(vec![self.parse_table()?]),
            other => Err(self.err(format!("function arguments expected near {}", other.describe()))),
        }
    }
}
