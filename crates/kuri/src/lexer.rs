use crate::error::KuriError;

/// 词法单元种类
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    // 标识符，允许带点的限定名 (例如 `strategy.entry`)
    Ident(String),
    Str(String),
    True,
    False,
    Na,
    And,
    Or,
    Not,
    If,
    Else,
    Plus,
    Minus,
    Star,
    Slash,
    Greater,
    Less,
    GreaterEq,
    LessEq,
    EqEq,
    NotEq,
    Assign,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    // 语句分隔符：换行或分号
    Newline,
    Eof,
}

/// 带位置的词法单元
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

/// # Summary
/// 将 Kuri 源码切分为词法单元序列。
///
/// # Logic
/// 1. `//` 到行尾为注释。
/// 2. 圆括号内部的换行被忽略，使多行函数调用成为可能。
/// 3. 连续分隔符只保留一个，序列以 `Eof` 结尾。
///
/// # Arguments
/// * `source` - 脚本源码。
///
/// # Returns
/// * `Result<Vec<Token>, KuriError>` - 非法字符或未闭合字符串返回 `KuriError::Lex`。
pub fn tokenize(source: &str) -> Result<Vec<Token>, KuriError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
    paren_depth: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
            paren_depth: 0,
            tokens: Vec::new(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> KuriError {
        KuriError::Lex {
            line,
            column,
            message: message.into(),
        }
    }

    fn push(&mut self, kind: TokenKind, line: usize, column: usize) {
        if kind == TokenKind::Newline {
            let redundant = matches!(
                self.tokens.last().map(|t| &t.kind),
                None | Some(TokenKind::Newline)
            );
            if redundant || self.paren_depth > 0 {
                return;
            }
        }
        self.tokens.push(Token { kind, line, column });
    }

    fn run(mut self) -> Result<Vec<Token>, KuriError> {
        while let Some(&c) = self.chars.peek() {
            let (line, column) = (self.line, self.column);
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\n' | ';' => {
                    self.bump();
                    self.push(TokenKind::Newline, line, column);
                }
                '/' => {
                    self.bump();
                    if self.chars.peek() == Some(&'/') {
                        while let Some(&n) = self.chars.peek() {
                            if n == '\n' {
                                break;
                            }
                            self.bump();
                        }
                    } else {
                        self.push(TokenKind::Slash, line, column);
                    }
                }
                '0'..='9' | '.' => {
                    let number = self.number(line, column)?;
                    self.push(TokenKind::Number(number), line, column);
                }
                '"' | '\'' => {
                    let text = self.string(c, line, column)?;
                    self.push(TokenKind::Str(text), line, column);
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let word = self.ident();
                    let kind = match word.as_str() {
                        "true" => TokenKind::True,
                        "false" => TokenKind::False,
                        "na" => TokenKind::Na,
                        "and" => TokenKind::And,
                        "or" => TokenKind::Or,
                        "not" => TokenKind::Not,
                        "if" => TokenKind::If,
                        "else" => TokenKind::Else,
                        _ => TokenKind::Ident(word),
                    };
                    self.push(kind, line, column);
                }
                _ => {
                    self.bump();
                    let kind = self.operator(c, line, column)?;
                    match kind {
                        TokenKind::LParen => self.paren_depth += 1,
                        TokenKind::RParen => {
                            self.paren_depth = self.paren_depth.saturating_sub(1);
                        }
                        _ => {}
                    }
                    self.push(kind, line, column);
                }
            }
        }
        if self.paren_depth > 0 {
            return Err(self.error(self.line, self.column, "unclosed '('"));
        }
        let (line, column) = (self.line, self.column);
        self.push(TokenKind::Newline, line, column);
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            line,
            column,
        });
        Ok(self.tokens)
    }

    fn operator(&mut self, c: char, line: usize, column: usize) -> Result<TokenKind, KuriError> {
        let followed_by_eq = |lexer: &mut Self| {
            if lexer.chars.peek() == Some(&'=') {
                lexer.bump();
                true
            } else {
                false
            }
        };
        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            '>' if followed_by_eq(self) => TokenKind::GreaterEq,
            '>' => TokenKind::Greater,
            '<' if followed_by_eq(self) => TokenKind::LessEq,
            '<' => TokenKind::Less,
            '=' if followed_by_eq(self) => TokenKind::EqEq,
            '=' => TokenKind::Assign,
            '!' if followed_by_eq(self) => TokenKind::NotEq,
            other => {
                return Err(self.error(line, column, format!("unexpected character '{}'", other)));
            }
        };
        Ok(kind)
    }

    fn number(&mut self, line: usize, column: usize) -> Result<f64, KuriError> {
        let mut text = String::new();
        let mut seen_dot = false;
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c == '.' && !seen_dot {
                seen_dot = true;
                text.push(c);
            } else {
                break;
            }
            self.bump();
        }
        text.parse::<f64>()
            .map_err(|_| self.error(line, column, format!("invalid number '{}'", text)))
    }

    fn string(&mut self, quote: char, line: usize, column: usize) -> Result<String, KuriError> {
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(text),
                Some('\n') | None => {
                    return Err(self.error(line, column, "unterminated string literal"));
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn ident(&mut self) -> String {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else if c == '.' && !word.is_empty() {
                // 仅当点号后紧跟字母时才视为限定名的一部分
                let mut lookahead = self.chars.clone();
                lookahead.next();
                match lookahead.peek() {
                    Some(n) if n.is_ascii_alphabetic() || *n == '_' => {
                        word.push(c);
                        self.bump();
                    }
                    _ => break,
                }
            } else {
                break;
            }
        }
        word
    }
}
