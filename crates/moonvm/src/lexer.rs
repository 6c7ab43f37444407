// Hand-written lexer. Produces the full token stream up front; the parser
// walks it with one token of lookahead.

use smol_str::SmolStr;

use crate::error::{VmError, VmResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Name(SmolStr),
    Int(i64),
    Num(f64),
    Str(SmolStr),

    // keywords
    And,
    Break,
    Do,
    Else,
    Elseif,
    End,
    False,
    For,
    Function,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    True,
    Until,
    While,

    // symbols
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Caret,
    Hash,
    EqEq,
    NotEq,
    LtEq,
    GtEq,
    Lt,
    Gt,
    Assign,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Colon,
    Comma,
    Dot,
    Concat,
    Ellipsis,

    Eof,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Name(n) => format!("'{}'", n),
            Token::Int(i) => format!("'{}'", i),
            Token::Num(n) => format!("'{}'", n),
            Token::Str(_) => "string literal".to_string(),
            Token::Eof => "<eof>".to_string(),
            other => format!("{:?}", other).to_lowercase(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lexeme {
    pub token: Token,
    pub line: u32,
}

fn keyword(word: &str) -> Option<Token> {
    Some(match word {
        "and" => Token::And,
        "break" => Token::Break,
        "do" => Token::Do,
        "else" => Token::Else,
        "elseif" => Token::Elseif,
        "end" => Token::End,
        "false" => Token::False,
        "for" => Token::For,
        "function" => Token::Function,
        "if" => Token::If,
        "in" => Token::In,
        "local" => Token::Local,
        "nil" => Token::Nil,
        "not" => Token::Not,
        "or" => Token::Or,
        "repeat" => Token::Repeat,
        "return" => Token::Return,
        "then" => Token::Then,
        "true" => Token::True,
        "until" => Token::Until,
        "while" => Token::While,
        _ => return None,
    })
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    pub fn tokenize(mut self) -> VmResult<Vec<Lexeme>> {
        let mut out = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            let line = self.line;
            let token = self.next_token()?;
            let done = token == Token::Eof;
            out.push(Lexeme { token, line });
            if done {
                return Ok(out);
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn err(&self, msg: impl Into<String>) -> VmError {
        let mut e = VmError::compile(msg);
        e.line = self.line;
        e
    }

    fn skip_whitespace_and_comments(&mut self) -> VmResult<()> {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.bump();
                }
                Some(b'-') if self.peek2() == Some(b'-') => {
                    self.bump();
                    self.bump();
                    if self.peek() == Some(b'[') && self.peek2() == Some(b'[') {
                        self.bump();
                        self.bump();
                        self.read_until_long_close()?;
                    } else {
                        while let Some(c) = self.peek() {
                            if c == b'\n' {
                                break;
                            }
                            self.bump();
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_until_long_close(&mut self) -> VmResult<String> {
        let mut out = Vec::new();
        loop {
            match self.bump() {
                Some(b']') if self.peek() == Some(b']') => {
                    self.bump();
                    return String::from_utf8(out).map_err(|_| self.err("invalid utf-8 in chunk"));
                }
                Some(c) => out.push(c),
                None => return Err(self.err("unterminated long bracket")),
            }
        }
    }

    fn next_token(&mut self) -> VmResult<Token> {
        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(Token::Eof),
        };
        match c {
            b'0'..=b'9' => self.read_number(),
            b'"' | b'\'' => self.read_string(c),
            b'[' if self.peek2() == Some(b'[') => {
                self.bump();
                self.bump();
                // Leading newline directly after [[ is dropped, like Lua.
                if self.peek() == Some(b'\n') {
                    self.bump();
                }
                let s = self.read_until_long_close()?;
                Ok(Token::Str(SmolStr::new(s)))
            }
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => {
                let start = self.pos;
                while matches!(self.peek(), Some(b'_' | b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9')) {
                    self.bump();
                }
                let word = std::str::from_utf8(&self.src[start..self.pos])
                    .map_err(|_| self.err("invalid utf-8 in chunk"))?;
                Ok(keyword(word).unwrap_or_else(|| Token::Name(SmolStr::new(word))))
            }
            _ => self.read_symbol(),
        }
    }

    fn read_symbol(&mut self) -> VmResult<Token> {
        let c = self.bump().unwrap_or(0);
        let t = match c {
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' => Token::Star,
            b'/' => {
                if self.peek() == Some(b'/') {
                    self.bump();
                    Token::DoubleSlash
                } else {
                    Token::Slash
                }
            }
            b'%' => Token::Percent,
            b'^' => Token::Caret,
            b'#' => Token::Hash,
            b'=' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Token::EqEq
                } else {
                    Token::Assign
                }
            }
            b'~' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Token::NotEq
                } else {
                    return Err(self.err("unexpected character '~'"));
                }
            }
            b'<' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Token::LtEq
                } else {
                    Token::Lt
                }
            }
            b'>' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Token::GtEq
                } else {
                    Token::Gt
                }
            }
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'{' => Token::LBrace,
            b'}' => Token::RBrace,
            b'[' => Token::LBracket,
            b']' => Token::RBracket,
            b';' => Token::Semi,
            b':' => Token::Colon,
            b',' => Token::Comma,
            b'.' => {
                if self.peek() == Some(b'.') {
                    self.bump();
                    if self.peek() == Some(b'.') {
                        self.bump();
                        Token::Ellipsis
                    } else {
                        Token::Concat
                    }
                } else {
                    Token::Dot
                }
            }
            other => {
                return Err(self.err(format!("unexpected character '{}'", other as char)));
            }
        };
        Ok(t)
    }

    fn read_number(&mut self) -> VmResult<Token> {
        let start = self.pos;
        if self.peek() == Some(b'0') && matches!(self.peek2(), Some(b'x') | Some(b'X')) {
            self.bump();
            self.bump();
            let hex_start = self.pos;
            while matches!(self.peek(), Some(b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F')) {
                self.bump();
            }
            let digits = std::str::from_utf8(&self.src[hex_start..self.pos]).unwrap_or("");
            if digits.is_empty() {
                return Err(self.err("malformed number"));
            }
            let v = i64::from_str_radix(digits, 16)
                .map_err(|_| self.err("hexadecimal constant too large"))?;
            return Ok(Token::Int(v));
        }
        let mut is_float = false;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.bump();
        }
        if self.peek() == Some(b'.') && matches!(self.peek2(), Some(b'0'..=b'9')) {
            is_float = true;
            self.bump();
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            is_float = true;
            self.bump();
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.bump();
            }
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(self.err("malformed number"));
            }
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.bump();
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        if is_float {
            let v: f64 = text.parse().map_err(|_| self.err("malformed number"))?;
            Ok(Token::Num(v))
        } else {
            match text.parse::<i64>() {
                Ok(v) => Ok(Token::Int(v)),
                // Integer literals beyond i64 degrade to floats.
                Err(_) => {
                    let v: f64 = text.parse().map_err(|_| self.err("malformed number"))?;
                    Ok(Token::Num(v))
                }
            }
        }
    }

    fn read_string(&mut self, quote: u8) -> VmResult<Token> {
        self.bump(); // opening quote
        let mut out: Vec<u8> = Vec::new();
        loop {
            match self.bump() {
                None | Some(b'\n') => return Err(self.err("unterminated string")),
                Some(c) if c == quote => break,
                Some(b'\\') => {
                    let esc = self.bump().ok_or_else(|| self.err("unterminated string"))?;
                    match esc {
                        b'n' => out.push(b'\n'),
                        b't' => out.push(b'\t'),
                        b'r' => out.push(b'\r'),
                        b'a' => out.push(0x07),
                        b'b' => out.push(0x08),
                        b'0' => out.push(0),
                        b'\\' => out.push(b'\\'),
                        b'"' => out.push(b'"'),
                        b'\'' => out.push(b'\''),
                        b'\n' => out.push(b'\n'),
                        other => {
                            return Err(
                                self.err(format!("invalid escape sequence '\\{}'", other as char))
                            );
                        }
                    }
                }
                Some(c) => out.push(c),
            }
        }
        let s = String::from_utf8(out).map_err(|_| self.err("invalid utf-8 in string"))?;
        Ok(Token::Str(SmolStr::new(s)))
    }
}
