// src/core/nodetool/describering.rs

//! Parses `nodetool describering` output into token-range endpoint lists.
//!
//! The output is a line-oriented pseudo-literal format:
//!
//! ```text
//! TokenRange(start_token:-9223372036854775808, end_token:-6917529027641081857,
//!            endpoints:[10.0.0.1, 10.0.0.2], rpc_endpoints:[10.0.0.1],
//!            endpoint_details:[EndpointDetails(host:10.0.0.1, datacenter:dc1, rack:rac1)])
//! ```
//!
//! A standard two-phase parser: tokenization, then a small recursive descent
//! over `call ::= ident '(' argument (',' argument)* ')'`,
//! `argument ::= ident ':' expression` and
//! `expression ::= call | list | ident`. Lines that do not open with a call
//! (headers, schema version banners) are skipped.

use crate::core::errors::RingleaderError;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Symbol(char, usize),
    Ident(String, usize),
}

impl Token {
    fn offset(&self) -> usize {
        match self {
            Token::Symbol(_, offset) | Token::Ident(_, offset) => *offset,
        }
    }

    fn is_symbol(&self, want: char) -> bool {
        matches!(self, Token::Symbol(c, _) if *c == want)
    }
}

/// One parsed argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Ident(String),
    List(Vec<Value>),
    Call(Call),
}

impl Value {
    fn as_ident(&self) -> Option<&str> {
        match self {
            Value::Ident(s) => Some(s),
            _ => None,
        }
    }
}

/// A parsed `Name(key:value, ...)` record.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub arguments: HashMap<String, Value>,
}

/// One replicated token range and the nodes responsible for it.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRange {
    pub start_token: String,
    pub end_token: String,
    pub endpoints: Vec<String>,
}

/// Parses the full describering output into its token ranges.
pub fn parse_describering(text: &str) -> Result<Vec<TokenRange>, RingleaderError> {
    let mut ranges = Vec::new();
    for line in text.lines() {
        if let Some(call) = parse_line(line)? {
            ranges.push(to_token_range(line, call)?);
        }
    }
    Ok(ranges)
}

fn to_token_range(line: &str, call: Call) -> Result<TokenRange, RingleaderError> {
    let field = |name: &str| -> Result<&Value, RingleaderError> {
        call.arguments
            .get(name)
            .ok_or_else(|| RingleaderError::parse(line, 0, format!("Missing field '{name}'")))
    };
    let start_token = field("start_token")?
        .as_ident()
        .ok_or_else(|| RingleaderError::parse(line, 0, "start_token is not a scalar"))?
        .to_string();
    let end_token = field("end_token")?
        .as_ident()
        .ok_or_else(|| RingleaderError::parse(line, 0, "end_token is not a scalar"))?
        .to_string();
    let endpoints = match field("endpoints")? {
        Value::List(values) => values
            .iter()
            .map(|v| {
                v.as_ident()
                    .map(str::to_string)
                    .ok_or_else(|| RingleaderError::parse(line, 0, "endpoint is not a scalar"))
            })
            .collect::<Result<Vec<String>, _>>()?,
        _ => return Err(RingleaderError::parse(line, 0, "endpoints is not a list")),
    };
    Ok(TokenRange {
        start_token,
        end_token,
        endpoints,
    })
}

/// Parses one line; `Ok(None)` for lines that are not call records.
fn parse_line(line: &str) -> Result<Option<Call>, RingleaderError> {
    let mut tokens = Tokens::new(line)?;
    if tokens.stack.is_empty() {
        return Ok(None);
    }
    let opens_call = matches!(tokens.stack.last(), Some(Token::Ident(..)))
        && tokens
            .stack
            .get(tokens.stack.len().wrapping_sub(2))
            .is_some_and(|t| t.is_symbol('('));
    if !opens_call {
        return Ok(None);
    }
    Ok(Some(parse_call(&mut tokens)?))
}

/// The token stream for one line, stored reversed so `pop` yields tokens in
/// source order.
struct Tokens<'a> {
    line: &'a str,
    stack: Vec<Token>,
}

impl<'a> Tokens<'a> {
    fn new(line: &'a str) -> Result<Self, RingleaderError> {
        let mut stack = tokenize(line)?;
        stack.reverse();
        Ok(Self { line, stack })
    }

    fn pop(&mut self) -> Result<Token, RingleaderError> {
        self.stack.pop().ok_or_else(|| {
            RingleaderError::parse(self.line, self.line.len(), "Premature end of line")
        })
    }

    fn peek(&self) -> Result<&Token, RingleaderError> {
        self.stack.last().ok_or_else(|| {
            RingleaderError::parse(self.line, self.line.len(), "Premature end of line")
        })
    }

    fn expect_symbol(&mut self, want: char) -> Result<(), RingleaderError> {
        let token = self.pop()?;
        if token.is_symbol(want) {
            Ok(())
        } else {
            Err(RingleaderError::parse(
                self.line,
                token.offset(),
                format!("Expected '{want}'"),
            ))
        }
    }
}

fn parse_call(tokens: &mut Tokens<'_>) -> Result<Call, RingleaderError> {
    let name = match tokens.pop()? {
        Token::Ident(name, _) => name,
        token => {
            return Err(RingleaderError::parse(
                tokens.line,
                token.offset(),
                "Bad identifier",
            ));
        }
    };
    tokens.expect_symbol('(')?;

    let mut arguments = HashMap::new();
    loop {
        parse_argument(tokens, &mut arguments)?;
        if tokens.peek()?.is_symbol(',') {
            tokens.pop()?;
        } else {
            break;
        }
    }
    tokens.expect_symbol(')')?;
    Ok(Call { name, arguments })
}

fn parse_argument(
    tokens: &mut Tokens<'_>,
    arguments: &mut HashMap<String, Value>,
) -> Result<(), RingleaderError> {
    let name = match tokens.pop()? {
        Token::Ident(name, _) => name,
        token => {
            return Err(RingleaderError::parse(
                tokens.line,
                token.offset(),
                "Expected an identifier, not a symbol",
            ));
        }
    };
    tokens.expect_symbol(':')?;
    let value = parse_expression(tokens)?;
    arguments.insert(name, value);
    Ok(())
}

fn parse_expression(tokens: &mut Tokens<'_>) -> Result<Value, RingleaderError> {
    if tokens.peek()?.is_symbol('[') {
        return parse_list(tokens);
    }
    match tokens.peek()? {
        Token::Ident(..) => {
            let followed_by_paren = tokens
                .stack
                .get(tokens.stack.len().wrapping_sub(2))
                .is_some_and(|t| t.is_symbol('('));
            if followed_by_paren {
                Ok(Value::Call(parse_call(tokens)?))
            } else {
                match tokens.pop()? {
                    Token::Ident(s, _) => Ok(Value::Ident(s)),
                    _ => unreachable!(),
                }
            }
        }
        token => Err(RingleaderError::parse(
            tokens.line,
            token.offset(),
            "Expected identifier, call or list",
        )),
    }
}

fn parse_list(tokens: &mut Tokens<'_>) -> Result<Value, RingleaderError> {
    tokens.pop()?; // consume '['
    let mut res = Vec::new();
    if !tokens.peek()?.is_symbol(']') {
        loop {
            res.push(parse_expression(tokens)?);
            if tokens.peek()?.is_symbol(',') {
                tokens.pop()?;
            } else if tokens.peek()?.is_symbol(']') {
                break;
            } else {
                let token = tokens.peek()?;
                return Err(RingleaderError::parse(
                    tokens.line,
                    token.offset(),
                    "Expected ',' or ']'",
                ));
            }
        }
    }
    tokens.pop()?; // consume ']'
    Ok(Value::List(res))
}

fn tokenize(line: &str) -> Result<Vec<Token>, RingleaderError> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if matches!(c, '(' | ')' | '[' | ']' | ',' | ':') {
            tokens.push(Token::Symbol(c, i));
            i += 1;
        } else if c.is_alphanumeric() || c == '-' {
            let start = i;
            let mut ident = String::new();
            while i < chars.len()
                && (chars[i].is_alphanumeric() || matches!(chars[i], '.' | '_' | '-'))
            {
                ident.push(chars[i]);
                i += 1;
            }
            tokens.push(Token::Ident(ident, start));
        } else {
            return Err(RingleaderError::parse(line, i, "Could not parse string"));
        }
    }
    Ok(tokens)
}
