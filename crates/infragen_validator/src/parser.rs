//! Recursive-descent parser for HCL native syntax.
//!
//! Produces a structural document: bodies of attributes and labelled
//! blocks. Expressions are parsed far enough to tell literal values from
//! anything that needs an evaluation context (references, function calls,
//! interpolated templates).

use crate::error::ParseError;
use crate::lexer::{Lexer, Pos, Token, TokenKind};

/// A body: the content of a file or of a block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    pub attributes: Vec<Attribute>,
    pub blocks: Vec<Block>,
}

impl Body {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn blocks_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks.iter().filter(move |b| b.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub expr: Expr,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: String,
    pub labels: Vec<String>,
    pub body: Body,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKey {
    Name(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Template { interpolated: bool },
    Tuple(Vec<Expr>),
    Object(Vec<(ObjectKey, Expr)>),
    /// Variable traversal such as `var.db_password` or `aws_iam_role.x.arn`.
    Reference(String),
    Call { name: String, args: Vec<Expr> },
    Index { base: Box<Expr>, key: Box<Expr> },
    Splat(Box<Expr>),
    Operation(Vec<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    For,
    Parens(Box<Expr>),
}

impl Expr {
    /// Whether the expression evaluates without any variables or functions.
    pub fn is_constant(&self) -> bool {
        match self {
            Self::Literal(_) => true,
            Self::Template { interpolated } => !interpolated,
            Self::Tuple(items) | Self::Operation(items) => items.iter().all(Expr::is_constant),
            Self::Object(items) => items.iter().all(|(key, value)| {
                let key_constant = match key {
                    ObjectKey::Name(_) => true,
                    ObjectKey::Expr(e) => e.is_constant(),
                };
                key_constant && value.is_constant()
            }),
            Self::Index { base, key } => base.is_constant() && key.is_constant(),
            Self::Conditional(cond, then, otherwise) => {
                cond.is_constant() && then.is_constant() && otherwise.is_constant()
            }
            Self::Parens(inner) => inner.is_constant(),
            Self::Reference(_) | Self::Call { .. } | Self::Splat(_) | Self::For => false,
        }
    }

    /// Object entries keyed by their literal names.
    pub fn object_keys(&self) -> Option<Vec<&str>> {
        match self {
            Self::Object(items) => Some(
                items
                    .iter()
                    .filter_map(|(key, _)| match key {
                        ObjectKey::Name(name) => Some(name.as_str()),
                        ObjectKey::Expr(Expr::Literal(Literal::String(s))) => Some(s.as_str()),
                        ObjectKey::Expr(_) => None,
                    })
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// Parse a whole file into its top-level body.
pub fn parse(src: &str) -> Result<Body, ParseError> {
    let tokens = Lexer::new(src).tokenize()?;
    Parser {
        tokens,
        idx: 0,
        group_depth: 0,
        nesting: 0,
    }
    .parse_body(None)
}

/// Deepest block or expression nesting accepted before giving up.
pub const MAX_NESTING: usize = 64;

const BINARY_OPS: [&str; 13] = [
    "||", "&&", "==", "!=", "<", ">", "<=", ">=", "+", "-", "*", "/", "%",
];

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    /// Depth of open `(`, `[` and `{` inside expressions; newlines are
    /// insignificant while it is non-zero.
    group_depth: usize,
    /// Current recursion depth, bounded by [`MAX_NESTING`].
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.idx.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::Eof {
            self.idx += 1;
        }
        tok
    }

    fn skip_newlines(&mut self) {
        while self.peek().kind == TokenKind::Newline {
            self.idx += 1;
        }
    }

    /// Next token as seen from inside an expression.
    fn peek_expr(&mut self) -> Token {
        if self.group_depth > 0 {
            self.skip_newlines();
        }
        self.peek().clone()
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek().kind, TokenKind::Punct(q) if q == p)
    }

    /// Two adjacent colons at `offset`, as in `provider::aws::arn_parse`.
    fn namespace_sep_at(&self, offset: usize) -> bool {
        match (self.tokens.get(self.idx + offset), self.tokens.get(self.idx + offset + 1)) {
            (Some(a), Some(b)) => {
                a.kind == TokenKind::Punct(":")
                    && b.kind == TokenKind::Punct(":")
                    && a.pos.line == b.pos.line
                    && a.pos.column + 1 == b.pos.column
            }
            _ => false,
        }
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(
        &mut self,
        pos: Pos,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.nesting >= MAX_NESTING {
            return Err(ParseError::new(
                format!("Expression nested too deeply: More than {MAX_NESTING} nested blocks or expressions."),
                pos,
            ));
        }
        self.nesting += 1;
        let result = f(self);
        self.nesting -= 1;
        result
    }

    fn parse_body(&mut self, open: Option<Pos>) -> Result<Body, ParseError> {
        let mut body = Body::default();
        loop {
            self.skip_newlines();
            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::Eof => {
                    return match open {
                        Some(pos) => Err(ParseError::new(
                            "Unclosed configuration block: There is no closing brace for this block before the end of the file.",
                            pos,
                        )),
                        None => Ok(body),
                    }
                }
                TokenKind::Punct("}") if open.is_some() => {
                    self.bump();
                    return Ok(body);
                }
                TokenKind::Ident(name) => {
                    self.bump();
                    self.parse_item(name, tok.pos, &mut body)?;
                }
                _ => {
                    return Err(ParseError::new(
                        "Argument or block definition required: An argument or block definition is required here.",
                        tok.pos,
                    ))
                }
            }
        }
    }

    fn parse_item(&mut self, name: String, pos: Pos, body: &mut Body) -> Result<(), ParseError> {
        if self.is_punct("=") {
            self.bump();
            let expr = self.parse_expr()?;
            self.expect_item_end("argument")?;
            body.attributes.push(Attribute { name, expr, pos });
            return Ok(());
        }

        let mut labels = Vec::new();
        loop {
            let tok = self.bump();
            match tok.kind {
                TokenKind::Str {
                    value,
                    interpolated: false,
                } => labels.push(value),
                TokenKind::Ident(label) => labels.push(label),
                TokenKind::Punct("{") => {
                    let inner = self.nested(tok.pos, |p| p.parse_body(Some(tok.pos)))?;
                    self.expect_item_end("block")?;
                    body.blocks.push(Block {
                        kind: name,
                        labels,
                        body: inner,
                        pos,
                    });
                    return Ok(());
                }
                TokenKind::Str {
                    interpolated: true, ..
                } => {
                    return Err(ParseError::new(
                        "Invalid block label: Template sequences are not allowed in block labels.",
                        tok.pos,
                    ))
                }
                _ if labels.is_empty() => {
                    return Err(ParseError::new(
                        "Argument or block definition required: To set an argument, use the equals sign \"=\" to introduce the argument value.",
                        tok.pos,
                    ))
                }
                _ => {
                    return Err(ParseError::new(
                        "Invalid block definition: Either a quoted string block label or an opening brace (\"{\") is expected here.",
                        tok.pos,
                    ))
                }
            }
        }
    }

    fn expect_item_end(&mut self, what: &str) -> Result<(), ParseError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Newline => {
                self.bump();
                Ok(())
            }
            TokenKind::Eof | TokenKind::Punct("}") => Ok(()),
            _ => Err(ParseError::new(
                format!("Missing newline after {what}: An {what} definition must end with a newline."),
                tok.pos,
            )),
        }
    }

    fn expect_close(&mut self, close: &'static str, open: Pos, what: &str) -> Result<(), ParseError> {
        let tok = self.peek_expr();
        match tok.kind {
            TokenKind::Punct(p) if p == close => {
                self.bump();
                Ok(())
            }
            TokenKind::Eof => Err(ParseError::new(
                format!("Unclosed {what}: There is no matching {close:?} for this {what}."),
                open,
            )),
            _ => Err(ParseError::new(
                format!("Missing {close:?}: Expected {close:?} to close the {what}."),
                tok.pos,
            )),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let pos = self.peek_expr().pos;
        self.nested(pos, Self::parse_conditional)
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_binary()?;
        if matches!(self.peek_expr().kind, TokenKind::Punct("?")) {
            self.bump();
            let then = self.parse_expr()?;
            let tok = self.peek_expr();
            if !matches!(tok.kind, TokenKind::Punct(":")) {
                return Err(ParseError::new(
                    "Missing false expression in conditional: The conditional operator requires a colon (\":\") before the false expression.",
                    tok.pos,
                ));
            }
            self.bump();
            let otherwise = self.parse_expr()?;
            return Ok(Expr::Conditional(
                Box::new(cond),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(cond)
    }

    fn parse_binary(&mut self) -> Result<Expr, ParseError> {
        let mut operands = vec![self.parse_unary()?];
        loop {
            match self.peek_expr().kind {
                TokenKind::Punct(op) if BINARY_OPS.contains(&op) => {
                    self.bump();
                    operands.push(self.parse_unary()?);
                }
                _ => break,
            }
        }
        Ok(match operands.len() {
            1 => operands.remove(0),
            _ => Expr::Operation(operands),
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if matches!(self.peek_expr().kind, TokenKind::Punct("!" | "-")) {
            let pos = self.bump().pos;
            let operand = self.nested(pos, Self::parse_unary)?;
            return Ok(Expr::Operation(vec![operand]));
        }
        let primary = self.parse_primary()?;
        self.parse_postfix(primary)
    }

    /// Attribute access, indexing and splats. These bind to the previous
    /// token only, never across a newline.
    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr, ParseError> {
        loop {
            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::Punct(".") => {
                    self.bump();
                    let next = self.bump();
                    let key = match next.kind {
                        TokenKind::Ident(name) | TokenKind::Number(name) => name,
                        TokenKind::Punct("*") => {
                            expr = Expr::Splat(Box::new(expr));
                            continue;
                        }
                        _ => {
                            return Err(ParseError::new(
                                "Invalid attribute name: An attribute name is required after a dot.",
                                next.pos,
                            ))
                        }
                    };
                    expr = match expr {
                        Expr::Reference(path) => Expr::Reference(format!("{path}.{key}")),
                        other => Expr::Index {
                            base: Box::new(other),
                            key: Box::new(Expr::Literal(Literal::String(key))),
                        },
                    };
                }
                TokenKind::Punct("[") => {
                    self.bump();
                    self.group_depth += 1;
                    if matches!(self.peek_expr().kind, TokenKind::Punct("*")) {
                        self.bump();
                        self.expect_close("]", tok.pos, "index")?;
                        self.group_depth -= 1;
                        expr = Expr::Splat(Box::new(expr));
                        continue;
                    }
                    let key = self.parse_expr()?;
                    self.expect_close("]", tok.pos, "index")?;
                    self.group_depth -= 1;
                    expr = match expr {
                        Expr::Reference(path) => Expr::Reference(format!("{path}[...]")),
                        other => Expr::Index {
                            base: Box::new(other),
                            key: Box::new(key),
                        },
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.peek_expr();
        match tok.kind {
            TokenKind::Number(n) => {
                self.bump();
                Ok(Expr::Literal(Literal::Number(n)))
            }
            TokenKind::Str {
                value,
                interpolated,
            } => {
                self.bump();
                Ok(if interpolated {
                    Expr::Template { interpolated }
                } else {
                    Expr::Literal(Literal::String(value))
                })
            }
            TokenKind::Heredoc { interpolated } => {
                self.bump();
                Ok(Expr::Template { interpolated })
            }
            TokenKind::Ident(name) if self.namespace_sep_at(1) => {
                self.parse_provider_call(name)
            }
            TokenKind::Ident(name) => {
                self.bump();
                let keyword = match name.as_str() {
                    "true" => Some(Literal::Bool(true)),
                    "false" => Some(Literal::Bool(false)),
                    "null" => Some(Literal::Null),
                    _ => None,
                };
                match keyword {
                    Some(literal) => Ok(Expr::Literal(literal)),
                    None if self.is_punct("(") => self.parse_call(name),
                    None => Ok(Expr::Reference(name)),
                }
            }
            TokenKind::Punct("(") => {
                self.bump();
                self.group_depth += 1;
                let inner = self.parse_expr()?;
                self.expect_close(")", tok.pos, "parenthesis")?;
                self.group_depth -= 1;
                Ok(Expr::Parens(Box::new(inner)))
            }
            TokenKind::Punct("[") => self.parse_tuple(tok.pos),
            TokenKind::Punct("{") => self.parse_object(tok.pos),
            _ => Err(ParseError::new(
                "Invalid expression: Expected the start of an expression, but found an invalid expression token.",
                tok.pos,
            )),
        }
    }

    /// `provider::<name>::<function>(...)`; the namespace separator is two
    /// adjacent colons.
    fn parse_provider_call(&mut self, first: String) -> Result<Expr, ParseError> {
        let start = self.bump().pos;
        let mut name = first;
        while self.namespace_sep_at(0) {
            self.idx += 2;
            let tok = self.bump();
            match tok.kind {
                TokenKind::Ident(part) => {
                    name.push_str("::");
                    name.push_str(&part);
                }
                _ => {
                    return Err(ParseError::new(
                        "Invalid function name: A function namespace must be followed by a name.",
                        tok.pos,
                    ))
                }
            }
        }
        if !self.is_punct("(") {
            return Err(ParseError::new(
                format!("Missing function call: {name} must be followed by an argument list."),
                start,
            ));
        }
        self.parse_call(name)
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, ParseError> {
        let open = self.bump().pos;
        self.group_depth += 1;
        let mut args = Vec::new();
        loop {
            if matches!(self.peek_expr().kind, TokenKind::Punct(")")) {
                break;
            }
            args.push(self.parse_expr()?);
            match self.peek_expr().kind {
                TokenKind::Punct(",") => {
                    self.bump();
                }
                TokenKind::Punct("...") => {
                    self.bump();
                }
                _ => break,
            }
        }
        self.expect_close(")", open, "function call")?;
        self.group_depth -= 1;
        Ok(Expr::Call { name, args })
    }

    fn parse_tuple(&mut self, open: Pos) -> Result<Expr, ParseError> {
        self.bump();
        self.group_depth += 1;
        if matches!(self.peek_expr().kind, TokenKind::Ident(ref k) if k == "for") {
            self.skip_balanced(open, "]")?;
            self.group_depth -= 1;
            return Ok(Expr::For);
        }

        let mut items = Vec::new();
        loop {
            if matches!(self.peek_expr().kind, TokenKind::Punct("]")) {
                break;
            }
            items.push(self.parse_expr()?);
            if matches!(self.peek_expr().kind, TokenKind::Punct(",")) {
                self.bump();
            } else {
                break;
            }
        }
        self.expect_close("]", open, "tuple")?;
        self.group_depth -= 1;
        Ok(Expr::Tuple(items))
    }

    fn parse_object(&mut self, open: Pos) -> Result<Expr, ParseError> {
        self.bump();
        self.group_depth += 1;
        if matches!(self.peek_expr().kind, TokenKind::Ident(ref k) if k == "for") {
            self.skip_balanced(open, "}")?;
            self.group_depth -= 1;
            return Ok(Expr::For);
        }

        let mut items = Vec::new();
        loop {
            let tok = self.peek_expr();
            if matches!(tok.kind, TokenKind::Punct("}") | TokenKind::Eof) {
                break;
            }

            let key = match tok.kind {
                TokenKind::Ident(name) if self.next_is_assign() => {
                    self.bump();
                    ObjectKey::Name(name)
                }
                TokenKind::Str {
                    value,
                    interpolated: false,
                } if self.next_is_assign() => {
                    self.bump();
                    ObjectKey::Name(value)
                }
                _ => ObjectKey::Expr(self.parse_expr()?),
            };

            let sep = self.peek_expr();
            if !matches!(sep.kind, TokenKind::Punct("=" | ":")) {
                return Err(ParseError::new(
                    "Missing key/value separator: Expected an equals sign (\"=\") to mark the beginning of the attribute value.",
                    sep.pos,
                ));
            }
            self.bump();
            items.push((key, self.parse_expr()?));

            if matches!(self.peek_expr().kind, TokenKind::Punct(",")) {
                self.bump();
            }
        }
        self.expect_close("}", open, "object")?;
        self.group_depth -= 1;
        Ok(Expr::Object(items))
    }

    fn next_is_assign(&self) -> bool {
        matches!(
            self.tokens.get(self.idx + 1).map(|t| &t.kind),
            Some(TokenKind::Punct("=" | ":"))
        )
    }

    /// Skip to the bracket closing the group opened at `open`.
    fn skip_balanced(&mut self, open: Pos, close: &'static str) -> Result<(), ParseError> {
        let mut depth = 1usize;
        loop {
            let tok = self.bump();
            match tok.kind {
                TokenKind::Punct("(" | "[" | "{") => depth += 1,
                TokenKind::Punct(p @ (")" | "]" | "}")) => {
                    depth -= 1;
                    if depth == 0 {
                        if p != close {
                            return Err(ParseError::new(
                                format!("Missing {close:?}: Mismatched bracket in for expression."),
                                tok.pos,
                            ));
                        }
                        return Ok(());
                    }
                }
                TokenKind::Eof => {
                    return Err(ParseError::new(
                        format!("Unclosed for expression: There is no matching {close:?} for this expression."),
                        open,
                    ))
                }
                _ => {}
            }
        }
    }
}
