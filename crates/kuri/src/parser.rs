use crate::ast::{BinaryOp, Expr, Script, Stmt, UnaryOp};
use crate::error::KuriError;
use crate::lexer::{Token, TokenKind};

/// 表达式与代码块的最大嵌套深度，超过即为语法错误
pub const MAX_NESTING: usize = 128;

/// # Summary
/// 递归下降语法分析器，将词法单元序列构造成 `Script`。
///
/// # Logic
/// 优先级由低到高：`or` < `and` < `== !=` < `< > <= >=` < `+ -` < `* /` < 一元 `- not` < 调用/字面量。
/// 二元运算均为左结合。
///
/// # Invariants
/// - 括号、一元运算、连续二元运算与 `if` 代码块共享同一个嵌套计数，
///   超过 `MAX_NESTING` 返回 `KuriError::Parse`，语法树深度因此有界。
///
/// # Arguments
/// * `tokens` - 由 `tokenize` 产生、以 `Eof` 结尾的序列。
///
/// # Returns
/// * `Result<Script, KuriError>` - 语法错误返回 `KuriError::Parse`，携带行号。
pub fn parse(tokens: &[Token]) -> Result<Script, KuriError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let statements = parser.block_body(false)?;
    Ok(Script { statements })
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map_or(&TokenKind::Eof, |t| &t.kind)
    }

    fn peek_next(&self) -> &TokenKind {
        self.tokens
            .get(self.pos + 1)
            .map_or(&TokenKind::Eof, |t| &t.kind)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), KuriError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {:?}", what, self.peek())))
        }
    }

    fn error(&self, message: impl Into<String>) -> KuriError {
        KuriError::Parse {
            line: self.line(),
            message: message.into(),
        }
    }

    fn descend(&mut self) -> Result<(), KuriError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!("nesting deeper than {} levels", MAX_NESTING)));
        }
        self.depth += 1;
        Ok(())
    }

    // 在加深一层的嵌套中执行 `f`
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, KuriError>,
    ) -> Result<T, KuriError> {
        self.descend()?;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn skip_separators(&mut self) {
        while self.eat(&TokenKind::Newline) {}
    }

    // 语句序列，`braced` 为 true 时以 `}` 结束，否则以 Eof 结束
    fn block_body(&mut self, braced: bool) -> Result<Vec<Stmt>, KuriError> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                TokenKind::RBrace if braced => {
                    self.advance();
                    return Ok(statements);
                }
                TokenKind::Eof if braced => return Err(self.error("expected '}' before end of input")),
                TokenKind::Eof => return Ok(statements),
                _ => {}
            }
            statements.push(self.statement()?);
            match self.peek() {
                TokenKind::Newline | TokenKind::Eof => {}
                TokenKind::RBrace if braced => {}
                other => {
                    return Err(self.error(format!("expected end of statement, found {:?}", other)));
                }
            }
        }
    }

    fn statement(&mut self) -> Result<Stmt, KuriError> {
        if self.eat(&TokenKind::If) {
            return self.nested(Self::if_statement);
        }
        if let (TokenKind::Ident(name), TokenKind::Assign) = (self.peek(), self.peek_next()) {
            let name = name.clone();
            self.pos += 2;
            let expr = self.expression()?;
            return Ok(Stmt::Assign { name, expr });
        }
        Ok(Stmt::Expr(self.expression()?))
    }

    fn if_statement(&mut self) -> Result<Stmt, KuriError> {
        let cond = self.expression()?;
        self.expect(&TokenKind::LBrace, "'{' after if condition")?;
        let then_branch = self.block_body(true)?;

        // `else` 允许出现在下一行
        let checkpoint = self.pos;
        self.skip_separators();
        let else_branch = if self.eat(&TokenKind::Else) {
            if self.eat(&TokenKind::If) {
                vec![self.nested(Self::if_statement)?]
            } else {
                self.expect(&TokenKind::LBrace, "'{' after else")?;
                self.block_body(true)?
            }
        } else {
            self.pos = checkpoint;
            Vec::new()
        };

        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn expression(&mut self) -> Result<Expr, KuriError> {
        self.nested(Self::or_expr)
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, KuriError>,
        op_for: fn(&TokenKind) -> Option<BinaryOp>,
    ) -> Result<Expr, KuriError> {
        // 左结合链每多一个运算符，语法树就深一层
        let base = self.depth;
        let mut lhs = next(self)?;
        while let Some(op) = op_for(self.peek()) {
            self.advance();
            self.descend()?;
            let rhs = next(self)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        self.depth = base;
        Ok(lhs)
    }

    fn or_expr(&mut self) -> Result<Expr, KuriError> {
        self.binary_level(Self::and_expr, |k| {
            matches!(k, TokenKind::Or).then_some(BinaryOp::Or)
        })
    }

    fn and_expr(&mut self) -> Result<Expr, KuriError> {
        self.binary_level(Self::equality, |k| {
            matches!(k, TokenKind::And).then_some(BinaryOp::And)
        })
    }

    fn equality(&mut self) -> Result<Expr, KuriError> {
        self.binary_level(Self::comparison, |k| match k {
            TokenKind::EqEq => Some(BinaryOp::Eq),
            TokenKind::NotEq => Some(BinaryOp::NotEq),
            _ => None,
        })
    }

    fn comparison(&mut self) -> Result<Expr, KuriError> {
        self.binary_level(Self::additive, |k| match k {
            TokenKind::Greater => Some(BinaryOp::Greater),
            TokenKind::Less => Some(BinaryOp::Less),
            TokenKind::GreaterEq => Some(BinaryOp::GreaterEq),
            TokenKind::LessEq => Some(BinaryOp::LessEq),
            _ => None,
        })
    }

    fn additive(&mut self) -> Result<Expr, KuriError> {
        self.binary_level(Self::multiplicative, |k| match k {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> Result<Expr, KuriError> {
        self.binary_level(Self::unary, |k| match k {
            TokenKind::Star => Some(BinaryOp::Mul),
            TokenKind::Slash => Some(BinaryOp::Div),
            _ => None,
        })
    }

    fn unary(&mut self) -> Result<Expr, KuriError> {
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Not => UnaryOp::Not,
            _ => return self.primary(),
        };
        self.advance();
        let expr = self.nested(Self::unary)?;
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    fn primary(&mut self) -> Result<Expr, KuriError> {
        match self.advance() {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Str(s) => Ok(Expr::Str(s)),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::Na => Ok(Expr::Na),
            TokenKind::LParen => {
                let expr = self.expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::Ident(name) => {
                if !self.eat(&TokenKind::LParen) {
                    return Ok(Expr::Ident(name));
                }
                let mut args = Vec::new();
                if !self.eat(&TokenKind::RParen) {
                    loop {
                        args.push(self.expression()?);
                        if self.eat(&TokenKind::RParen) {
                            break;
                        }
                        self.expect(&TokenKind::Comma, "',' or ')' in argument list")?;
                    }
                }
                Ok(Expr::Call { name, args })
            }
            other => {
                // 回退一步让错误行号指向出错的 token
                self.pos = self.pos.saturating_sub(1);
                Err(self.error(format!("unexpected token {:?}", other)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(source: &str) -> Result<Script, KuriError> {
        parse(&tokenize(source)?)
    }

    fn num(n: f64) -> Box<Expr> {
        Box::new(Expr::Number(n))
    }

    #[test]
    fn test_precedence_is_left_associative() {
        let script = parse_src("x = 1 - 2 - 3 * 4").unwrap();
        let expected = Expr::Binary {
            op: BinaryOp::Sub,
            lhs: Box::new(Expr::Binary {
                op: BinaryOp::Sub,
                lhs: num(1.0),
                rhs: num(2.0),
            }),
            rhs: Box::new(Expr::Binary {
                op: BinaryOp::Mul,
                lhs: num(3.0),
                rhs: num(4.0),
            }),
        };
        assert_eq!(
            script.statements,
            vec![Stmt::Assign {
                name: "x".into(),
                expr: expected
            }]
        );
    }

    #[test]
    fn test_logical_binds_looser_than_comparison() {
        let script = parse_src("a > 1 and b < 2 or not c").unwrap();
        let Stmt::Expr(Expr::Binary { op, lhs, rhs }) = &script.statements[0] else {
            panic!("expected binary expression statement");
        };
        assert_eq!(*op, BinaryOp::Or);
        assert!(matches!(**lhs, Expr::Binary { op: BinaryOp::And, .. }));
        assert!(matches!(**rhs, Expr::Unary { op: UnaryOp::Not, .. }));
    }

    #[test]
    fn test_if_else_chain() {
        let source = "if close > open {\n  up = true\n}\nelse if close < open { up = false } else {\n  up = na\n}";
        let script = parse_src(source).unwrap();
        assert_eq!(script.statements.len(), 1);
        let Stmt::If {
            then_branch,
            else_branch,
            ..
        } = &script.statements[0]
        else {
            panic!("expected if statement");
        };
        assert_eq!(then_branch.len(), 1);
        assert!(matches!(else_branch.as_slice(), [Stmt::If { .. }]));
    }

    #[test]
    fn test_if_without_else_keeps_following_statement() {
        let script = parse_src("if x { y = 1 }\nz = 2").unwrap();
        assert_eq!(script.statements.len(), 2);
    }

    #[test]
    fn test_call_arguments() {
        let script = parse_src("plot(sma(close, 20), \"ma\")").unwrap();
        let Stmt::Expr(Expr::Call { name, args }) = &script.statements[0] else {
            panic!("expected call");
        };
        assert_eq!(name, "plot");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_nesting_limit() {
        let deep = |n: usize| format!("x = {}1{}", "(".repeat(n), ")".repeat(n));
        assert!(parse_src(&deep(100)).is_ok());
        assert!(matches!(parse_src(&deep(MAX_NESTING + 1)), Err(KuriError::Parse { .. })));

        let negations = format!("x = {}1", "-".repeat(MAX_NESTING + 1));
        assert!(matches!(parse_src(&negations), Err(KuriError::Parse { .. })));
    }

    #[test]
    fn test_parse_errors_report_line() {
        let err = parse_src("a = 1\nb = (2 + \nc = 3").unwrap_err();
        assert!(matches!(err, KuriError::Parse { .. } | KuriError::Lex { .. }));

        let err = parse_src("a = 1\nb = 2 3").unwrap_err();
        assert!(matches!(err, KuriError::Parse { line: 2, .. }));

        let err = parse_src("if x { y = 1").unwrap_err();
        assert!(matches!(err, KuriError::Parse { .. }));

        let err = parse_src("x = ").unwrap_err();
        assert!(matches!(err, KuriError::Parse { line: 1, .. }));
    }
}
