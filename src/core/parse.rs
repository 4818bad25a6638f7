//! Rule expression parsing
//!
//! Small declarative lexer (compile-time DFA via `logos`) plus a hand-rolled
//! parser for the rule syntax accepted on the command line:
//!
//! ```text
//! accept tcp/22
//! drop tcp/8089 from 10.0.0.0/24
//! reject udp/5000-6000
//! drop any
//! accept icmp from fe80::/10
//! ```
//!
//! Grammar: `ACTION [PROTOCOL[/PORT[-PORT]]] [from NETWORK]`. A bare address
//! is treated as a host network (/32 or /128). Port matches are only valid
//! for tcp and udp.

use crate::core::chain::{Action, PortRange, Protocol, Rule};
use crate::validators::validate_port_range;
use ipnetwork::IpNetwork;
use logos::Logos;
use thiserror::Error;

/// Error type for rule expression parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty rule expression")]
    Empty,

    #[error("unrecognized input at '{0}'")]
    Lex(String),

    #[error("expected {expected}, found {found}")]
    Unexpected { expected: String, found: String },

    #[error("port match requires tcp or udp, not {0}")]
    PortlessProtocol(Protocol),

    #[error("invalid port range: start {start} is greater than end {end}")]
    InvertedRange { start: u16, end: u16 },

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("trailing input after rule expression: '{0}'")]
    Trailing(String),
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")]
enum Token {
    #[token("accept")]
    Accept,
    #[token("drop")]
    Drop,
    #[token("reject")]
    Reject,
    #[token("tcp")]
    Tcp,
    #[token("udp")]
    Udp,
    #[token("icmp")]
    Icmp,
    #[token("any")]
    Any,
    #[token("from")]
    From,
    #[token("/")]
    Slash,
    #[token("-")]
    Dash,
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u16>().ok())]
    Number(u16),
    #[regex(r"[0-9]+\.[0-9]+\.[0-9]+\.[0-9]+(/[0-9]+)?", |lex| lex.slice().parse::<IpNetwork>().ok())]
    #[regex(r"[0-9a-fA-F]*:[0-9a-fA-F:]+(/[0-9]+)?", |lex| lex.slice().parse::<IpNetwork>().ok())]
    Network(IpNetwork),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Accept | Token::Drop | Token::Reject => "action".to_string(),
            Token::Tcp | Token::Udp | Token::Icmp | Token::Any => "protocol".to_string(),
            Token::From => "'from'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Dash => "'-'".to_string(),
            Token::Number(n) => format!("number {n}"),
            Token::Network(net) => format!("network {net}"),
        }
    }
}

/// Parsed components of a rule expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleExpr {
    pub action: Action,
    pub protocol: Protocol,
    pub ports: Option<PortRange>,
    pub source: Option<IpNetwork>,
}

impl RuleExpr {
    /// Builds an administrator rule from the parsed expression.
    pub fn into_rule(self, label: impl Into<String>) -> Rule {
        Rule::admin(label, self.protocol, self.ports, self.source, self.action)
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect_number(&mut self, what: &str) -> Result<u16, ParseError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(other) => Err(ParseError::Unexpected {
                expected: what.to_string(),
                found: other.describe(),
            }),
            None => Err(ParseError::Unexpected {
                expected: what.to_string(),
                found: "end of input".to_string(),
            }),
        }
    }
}

/// Parses a rule expression like `drop tcp/8089 from 10.0.0.0/24`.
pub fn parse_expr(input: &str) -> Result<RuleExpr, ParseError> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(input);
    while let Some(result) = lexer.next() {
        match result {
            Ok(tok) => tokens.push(tok),
            Err(()) => return Err(ParseError::Lex(lexer.slice().to_string())),
        }
    }
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };

    let action = match parser.next() {
        Some(Token::Accept) => Action::Accept,
        Some(Token::Drop) => Action::Drop,
        Some(Token::Reject) => Action::Reject,
        Some(other) => {
            return Err(ParseError::Unexpected {
                expected: "action (accept, drop, reject)".to_string(),
                found: other.describe(),
            });
        }
        None => return Err(ParseError::Empty),
    };

    let protocol = match parser.peek() {
        Some(Token::Tcp) => {
            parser.next();
            Protocol::Tcp
        }
        Some(Token::Udp) => {
            parser.next();
            Protocol::Udp
        }
        Some(Token::Icmp) => {
            parser.next();
            Protocol::Icmp
        }
        Some(Token::Any) => {
            parser.next();
            Protocol::Any
        }
        _ => Protocol::Any,
    };

    let ports = if parser.peek() == Some(&Token::Slash) {
        parser.next();
        if !matches!(protocol, Protocol::Tcp | Protocol::Udp) {
            return Err(ParseError::PortlessProtocol(protocol));
        }
        let start = parser.expect_number("port")?;
        let end = if parser.peek() == Some(&Token::Dash) {
            parser.next();
            parser.expect_number("port range end")?
        } else {
            start
        };
        validate_port_range(start, end).map_err(|message| {
            if start > end {
                ParseError::InvertedRange { start, end }
            } else {
                ParseError::InvalidPort(message)
            }
        })?;
        Some(PortRange { start, end })
    } else {
        None
    };

    let source = if parser.peek() == Some(&Token::From) {
        parser.next();
        match parser.next() {
            Some(Token::Network(net)) => Some(net),
            Some(other) => {
                return Err(ParseError::Unexpected {
                    expected: "source network".to_string(),
                    found: other.describe(),
                });
            }
            None => {
                return Err(ParseError::Unexpected {
                    expected: "source network".to_string(),
                    found: "end of input".to_string(),
                });
            }
        }
    } else {
        None
    };

    if let Some(extra) = parser.next() {
        return Err(ParseError::Trailing(extra.describe()));
    }

    Ok(RuleExpr {
        action,
        protocol,
        ports,
        source,
    })
}
