//! Recursive-descent parser from template segments to a [`Node`] tree

use std::collections::VecDeque;

use crate::ast::{Branch, CmpOp, Cond, Expr, Modifier, Node, Param};
use crate::lexer::{self, Segment, TagToken};

/// Parse failure with the 1-based line of the offending tag
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub line: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Parse template source.
///
/// `is_block` tells the parser which unknown tag names open a block
/// (`{name}...{/name}`) rather than a single function call.
pub fn parse(source: &str, is_block: &dyn Fn(&str) -> bool) -> Result<Vec<Node>, SyntaxError> {
    let mut parser = Parser {
        segments: lexer::segments(source)?.into(),
        is_block,
    };
    let (nodes, terminator) = parser.parse_nodes(&[])?;
    match terminator {
        Some(t) => Err(SyntaxError::new(t.line, format!("unexpected {{{}}}", t.name))),
        None => Ok(nodes),
    }
}

struct Parser<'s, 'b> {
    segments: VecDeque<Segment<'s>>,
    is_block: &'b dyn Fn(&str) -> bool,
}

/// A tag that ended the current body (`{else}`, `{/if}`, ...)
struct Terminator {
    name: String,
    cursor: TokenCursor,
    line: usize,
}

impl Parser<'_, '_> {
    /// Parse nodes until one of `expected` tags or end of input
    fn parse_nodes(&mut self, expected: &[&str]) -> Result<(Vec<Node>, Option<Terminator>), SyntaxError> {
        let mut nodes = Vec::new();

        while let Some(segment) = self.segments.pop_front() {
            let (body, line) = match segment {
                Segment::Text(text) => {
                    nodes.push(Node::Text { text: text.to_string() });
                    continue;
                }
                Segment::Tag { body, line } => (body, line),
            };

            if body.is_empty() {
                return Err(SyntaxError::new(line, "empty tag"));
            }

            let mut cursor = TokenCursor::new(lexer::tokenize_tag(body, line)?, line);
            let name = match cursor.peek() {
                Some(TagToken::Slash) => {
                    cursor.next();
                    let name = format!("/{}", cursor.expect_ident("closing tag name")?);
                    cursor.expect_end()?;
                    Some(name)
                }
                Some(TagToken::Ident(name)) if expected.contains(&name.as_str()) => {
                    let name = name.clone();
                    cursor.next();
                    Some(name)
                }
                _ => None,
            };

            match name {
                Some(name) if expected.contains(&name.as_str()) => {
                    return Ok((nodes, Some(Terminator { name, cursor, line })));
                }
                Some(name) => return Err(SyntaxError::new(line, format!("unexpected {{{name}}}"))),
                None => nodes.push(self.parse_tag(cursor, line)?),
            }
        }

        Ok((nodes, None))
    }

    /// Parse a body that must be closed by one of `expected`
    fn parse_body(&mut self, expected: &[&str], opener: &str, line: usize) -> Result<(Vec<Node>, Terminator), SyntaxError> {
        match self.parse_nodes(expected)? {
            (nodes, Some(terminator)) => Ok((nodes, terminator)),
            (_, None) => Err(SyntaxError::new(line, format!("unclosed {{{opener}}}"))),
        }
    }

    fn parse_tag(&mut self, mut cursor: TokenCursor, line: usize) -> Result<Node, SyntaxError> {
        let name = match cursor.peek() {
            Some(TagToken::Ident(name)) if !matches!(name.as_str(), "true" | "false") => name.clone(),
            _ => {
                let expr = cursor.expr()?;
                cursor.expect_end()?;
                return Ok(Node::Output { expr });
            }
        };
        cursor.next();

        match name.as_str() {
            "if" => self.parse_if(cursor, line),
            "foreach" => self.parse_foreach(cursor, line),
            "include" => {
                let mut params = cursor.params()?;
                let file = take_param(&mut params, "file")
                    .ok_or_else(|| SyntaxError::new(line, "{include} requires a 'file' attribute"))?;
                Ok(Node::Include { file, params })
            }
            "assign" => {
                let mut params = cursor.params()?;
                let var = take_param(&mut params, "var")
                    .and_then(|e| binding_name(&e))
                    .ok_or_else(|| SyntaxError::new(line, "{assign} requires a 'var' attribute"))?;
                let value = take_param(&mut params, "value")
                    .ok_or_else(|| SyntaxError::new(line, "{assign} requires a 'value' attribute"))?;
                Ok(Node::Assign { var, value })
            }
            "else" | "elseif" | "foreachelse" => {
                Err(SyntaxError::new(line, format!("unexpected {{{name}}}")))
            }
            _ if (self.is_block)(&name) => {
                let params = cursor.params()?;
                let close = format!("/{name}");
                let (body, _) = self.parse_body(&[close.as_str()], &name, line)?;
                Ok(Node::Block { name, params, body })
            }
            _ => Ok(Node::Call {
                name,
                params: cursor.params()?,
            }),
        }
    }

    fn parse_if(&mut self, mut cursor: TokenCursor, line: usize) -> Result<Node, SyntaxError> {
        let mut branches = Vec::new();
        let mut cond = cursor.condition()?;
        cursor.expect_end()?;

        loop {
            let (body, terminator) = self.parse_body(&["elseif", "else", "/if"], "if", line)?;
            branches.push(Branch { cond, body });

            let mut cursor = terminator.cursor;
            match terminator.name.as_str() {
                "elseif" => {
                    cond = cursor.condition()?;
                    cursor.expect_end()?;
                }
                "else" => {
                    cursor.expect_end()?;
                    let (otherwise, _) = self.parse_body(&["/if"], "if", line)?;
                    return Ok(Node::If {
                        branches,
                        otherwise: Some(otherwise),
                    });
                }
                _ => {
                    return Ok(Node::If {
                        branches,
                        otherwise: None,
                    });
                }
            }
        }
    }

    fn parse_foreach(&mut self, mut cursor: TokenCursor, line: usize) -> Result<Node, SyntaxError> {
        let mut params = cursor.params()?;
        let from = take_param(&mut params, "from")
            .ok_or_else(|| SyntaxError::new(line, "{foreach} requires a 'from' attribute"))?;
        let item = take_param(&mut params, "item")
            .and_then(|e| binding_name(&e))
            .ok_or_else(|| SyntaxError::new(line, "{foreach} requires an 'item' attribute"))?;
        let key = take_param(&mut params, "key").and_then(|e| binding_name(&e));

        let (body, terminator) = self.parse_body(&["foreachelse", "/foreach"], "foreach", line)?;
        let empty = if terminator.name == "foreachelse" {
            terminator.cursor.expect_end()?;
            let (nodes, _) = self.parse_body(&["/foreach"], "foreach", line)?;
            Some(nodes)
        } else {
            None
        };

        Ok(Node::Foreach {
            from,
            item,
            key,
            body,
            empty,
        })
    }
}

fn take_param(params: &mut Vec<Param>, name: &str) -> Option<Expr> {
    let index = params.iter().position(|p| p.name == name)?;
    Some(params.remove(index).value)
}

/// Name a loop or assignment binds: `item=x`, `item="x"` or `item=$x`
fn binding_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Str(name) if !name.is_empty() => Some(name.clone()),
        Expr::Var(path) if path.len() == 1 => Some(path[0].clone()),
        _ => None,
    }
}

/// Cursor over the tokens of one tag
struct TokenCursor {
    tokens: VecDeque<TagToken>,
    line: usize,
}

impl TokenCursor {
    fn new(tokens: Vec<TagToken>, line: usize) -> Self {
        Self {
            tokens: tokens.into(),
            line,
        }
    }

    fn peek(&self) -> Option<&TagToken> {
        self.tokens.front()
    }

    fn next(&mut self) -> Option<TagToken> {
        self.tokens.pop_front()
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.line, message)
    }

    fn expect_end(&self) -> Result<(), SyntaxError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.error(format!("unexpected token {token:?}"))),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, SyntaxError> {
        match self.next() {
            Some(TagToken::Ident(name)) => Ok(name),
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    /// `name=expr name=expr ...` up to the end of the tag
    fn params(&mut self) -> Result<Vec<Param>, SyntaxError> {
        let mut params = Vec::new();
        while self.peek().is_some() {
            let name = self.expect_ident("attribute name")?;
            if self.next() != Some(TagToken::Assign) {
                return Err(self.error(format!("expected '=' after attribute '{name}'")));
            }
            let value = self.expr()?;
            params.push(Param { name, value });
        }
        Ok(params)
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        match self.next() {
            Some(TagToken::Var(path)) => Ok(Expr::Var(path)),
            Some(TagToken::Str(s)) => Ok(Expr::Str(s)),
            Some(TagToken::Num(n)) => Ok(Expr::Num(n)),
            Some(TagToken::Ident(word)) => Ok(match word.as_str() {
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                _ => Expr::Str(word),
            }),
            Some(token) => Err(self.error(format!("expected a value, found {token:?}"))),
            None => Err(self.error("expected a value")),
        }
    }

    /// Value followed by any number of `|modifier:arg:arg`
    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.primary()?;
        let mut modifiers = Vec::new();

        while self.peek() == Some(&TagToken::Pipe) {
            self.next();
            let name = self.expect_ident("modifier name")?;
            let mut args = Vec::new();
            while self.peek() == Some(&TagToken::Colon) {
                self.next();
                args.push(self.primary()?);
            }
            modifiers.push(Modifier { name, args });
        }

        if modifiers.is_empty() {
            Ok(base)
        } else {
            Ok(Expr::Filtered {
                base: Box::new(base),
                modifiers,
            })
        }
    }

    fn condition(&mut self) -> Result<Cond, SyntaxError> {
        let mut lhs = self.and_condition()?;
        while self.eat_logical("||", "or") {
            let rhs = self.and_condition()?;
            lhs = Cond::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_condition(&mut self) -> Result<Cond, SyntaxError> {
        let mut lhs = self.unary_condition()?;
        while self.eat_logical("&&", "and") {
            let rhs = self.unary_condition()?;
            lhs = Cond::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary_condition(&mut self) -> Result<Cond, SyntaxError> {
        if self.eat_logical("!", "not") {
            return Ok(Cond::Not(Box::new(self.unary_condition()?)));
        }

        let lhs = self.expr()?;
        let op = match self.peek() {
            Some(TagToken::Op(op)) => CmpOp::from_token(op),
            Some(TagToken::Ident(word)) => CmpOp::from_token(word),
            _ => None,
        };

        match op {
            Some(op) => {
                self.next();
                let rhs = self.expr()?;
                Ok(Cond::Compare { lhs, op, rhs })
            }
            None => Ok(Cond::Truthy(lhs)),
        }
    }

    fn eat_logical(&mut self, symbol: &str, word: &str) -> bool {
        let matched = match self.peek() {
            Some(TagToken::Op(op)) => *op == symbol,
            Some(TagToken::Ident(w)) => w == word,
            _ => false,
        };
        if matched {
            self.next();
        }
        matched
    }
}
