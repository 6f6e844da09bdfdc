//! Lexical analysis for templates.
//!
//! Source is first split into [`Segment`]s (plain text and tag bodies), then
//! each tag body is tokenized on its own with [`tokenize_tag`]. Comments and
//! `{literal}` blocks are handled at the segment level so their contents never
//! reach the tag tokenizer.

use crate::parser::SyntaxError;

const COMMENT_OPEN: &str = "{*";
const COMMENT_CLOSE: &str = "*}";
const LITERAL_OPEN: &str = "{literal}";
const LITERAL_CLOSE: &str = "{/literal}";

/// A run of template source: either text to emit or the body of a `{...}` tag
#[derive(Debug, Clone, PartialEq)]
pub enum Segment<'a> {
    Text(&'a str),
    Tag { body: &'a str, line: usize },
}

/// Token inside a tag body
#[derive(Debug, Clone, PartialEq)]
pub enum TagToken {
    /// `$name.path.segments`
    Var(Vec<String>),
    Str(String),
    Num(f64),
    Ident(String),
    /// Comparison or logical operator: `== != <= >= < > ! && ||`
    Op(&'static str),
    Assign,
    Pipe,
    Colon,
    Slash,
}

/// Split template source into text and tag segments
pub fn segments(source: &str) -> Result<Vec<Segment<'_>>, SyntaxError> {
    let bytes = source.as_bytes();
    let mut out = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;
    let mut line = 1;
    let mut line_pos = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'{' {
            pos += 1;
            continue;
        }

        // `{` followed by whitespace is plain text (inline CSS, JS objects)
        match bytes.get(pos + 1) {
            None => break,
            Some(b) if b.is_ascii_whitespace() => {
                pos += 1;
                continue;
            }
            _ => {}
        }

        line += count_lines(&source[line_pos..pos]);
        line_pos = pos;
        push_text(&mut out, &source[text_start..pos]);

        let rest = &source[pos..];
        if rest.starts_with(COMMENT_OPEN) {
            let end = rest
                .find(COMMENT_CLOSE)
                .ok_or_else(|| SyntaxError::new(line, "unterminated comment"))?;
            pos += end + COMMENT_CLOSE.len();
        } else if rest.starts_with(LITERAL_OPEN) {
            let body_start = pos + LITERAL_OPEN.len();
            let end = source[body_start..]
                .find(LITERAL_CLOSE)
                .ok_or_else(|| SyntaxError::new(line, "unterminated {literal} block"))?;
            push_text(&mut out, &source[body_start..body_start + end]);
            pos = body_start + end + LITERAL_CLOSE.len();
        } else {
            let close = find_tag_end(bytes, pos + 1)
                .ok_or_else(|| SyntaxError::new(line, "unterminated tag"))?;
            out.push(Segment::Tag {
                body: source[pos + 1..close].trim(),
                line,
            });
            pos = close + 1;
        }

        text_start = pos;
    }

    push_text(&mut out, &source[text_start..]);
    Ok(out)
}

fn push_text<'a>(out: &mut Vec<Segment<'a>>, text: &'a str) {
    if !text.is_empty() {
        out.push(Segment::Text(text));
    }
}

fn count_lines(text: &str) -> usize {
    text.bytes().filter(|b| *b == b'\n').count()
}

/// Find the `}` closing a tag, skipping over quoted strings
fn find_tag_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'}' => return Some(i),
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Tokenize the body of a single tag
pub fn tokenize_tag(body: &str, line: usize) -> Result<Vec<TagToken>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = body.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        match c {
            '$' => {
                chars.next();
                let mut path = vec![read_word(&mut chars)];
                if path[0].is_empty() {
                    return Err(SyntaxError::new(line, "expected variable name after '$'"));
                }
                while chars.peek() == Some(&'.') {
                    chars.next();
                    let segment = read_word(&mut chars);
                    if segment.is_empty() {
                        return Err(SyntaxError::new(line, "empty segment in variable path"));
                    }
                    path.push(segment);
                }
                tokens.push(TagToken::Var(path));
            }
            '"' | '\'' => {
                chars.next();
                tokens.push(TagToken::Str(read_string(&mut chars, c, line)?));
            }
            '0'..='9' => tokens.push(TagToken::Num(read_number(&mut chars, String::new(), line)?)),
            '-' => {
                chars.next();
                match chars.peek() {
                    Some(d) if d.is_ascii_digit() => {
                        tokens.push(TagToken::Num(read_number(&mut chars, "-".into(), line)?))
                    }
                    _ => return Err(SyntaxError::new(line, "unexpected '-'")),
                }
            }
            c if c.is_alphabetic() || c == '_' => tokens.push(TagToken::Ident(read_word(&mut chars))),
            '=' | '!' | '<' | '>' => {
                chars.next();
                let followed_by_eq = chars.peek() == Some(&'=');
                if followed_by_eq {
                    chars.next();
                }
                tokens.push(match (c, followed_by_eq) {
                    ('=', true) => TagToken::Op("=="),
                    ('=', false) => TagToken::Assign,
                    ('!', true) => TagToken::Op("!="),
                    ('!', false) => TagToken::Op("!"),
                    ('<', true) => TagToken::Op("<="),
                    ('<', false) => TagToken::Op("<"),
                    ('>', true) => TagToken::Op(">="),
                    _ => TagToken::Op(">"),
                });
            }
            '&' => {
                chars.next();
                if chars.next() != Some('&') {
                    return Err(SyntaxError::new(line, "expected '&&'"));
                }
                tokens.push(TagToken::Op("&&"));
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                    tokens.push(TagToken::Op("||"));
                } else {
                    tokens.push(TagToken::Pipe);
                }
            }
            ':' => {
                chars.next();
                tokens.push(TagToken::Colon);
            }
            '/' => {
                chars.next();
                tokens.push(TagToken::Slash);
            }
            other => {
                return Err(SyntaxError::new(
                    line,
                    format!("unexpected character '{other}' in tag"),
                ));
            }
        }
    }

    Ok(tokens)
}

fn read_word(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_alphanumeric() || c == '_' {
            word.push(c);
            chars.next();
        } else {
            break;
        }
    }
    word
}

fn read_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    quote: char,
    line: usize,
) -> Result<String, SyntaxError> {
    let mut value = String::new();
    loop {
        match chars.next() {
            None => return Err(SyntaxError::new(line, "unterminated string literal")),
            Some('\\') => match chars.next() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some(other) => value.push(other),
                None => return Err(SyntaxError::new(line, "unterminated string literal")),
            },
            Some(c) if c == quote => return Ok(value),
            Some(c) => value.push(c),
        }
    }
}

fn read_number(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    mut text: String,
    line: usize,
) -> Result<f64, SyntaxError> {
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() || c == '.' {
            text.push(c);
            chars.next();
        } else {
            break;
        }
    }
    text.parse()
        .map_err(|_| SyntaxError::new(line, format!("invalid number '{text}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_and_tags() {
        let segs = segments("Hello {$name}!\n{if $x}y{/if}").unwrap();
        assert_eq!(
            segs,
            vec![
                Segment::Text("Hello "),
                Segment::Tag { body: "$name", line: 1 },
                Segment::Text("!\n"),
                Segment::Tag { body: "if $x", line: 2 },
                Segment::Text("y"),
                Segment::Tag { body: "/if", line: 2 },
            ]
        );
    }

    #[test]
    fn test_brace_followed_by_space_is_text() {
        let segs = segments("a { color: red; }").unwrap();
        assert_eq!(segs, vec![Segment::Text("a { color: red; }")]);
    }

    #[test]
    fn test_comments_are_dropped() {
        let segs = segments("a{* {$ignored} *}b").unwrap();
        assert_eq!(segs, vec![Segment::Text("a"), Segment::Text("b")]);
    }

    #[test]
    fn test_literal_block_is_raw() {
        let segs = segments("{literal}{$x}{/literal}").unwrap();
        assert_eq!(segs, vec![Segment::Text("{$x}")]);
    }

    #[test]
    fn test_quoted_brace_does_not_close_tag() {
        let segs = segments(r#"{$x|default:"}"}"#).unwrap();
        assert_eq!(
            segs,
            vec![Segment::Tag { body: r#"$x|default:"}""#, line: 1 }]
        );
    }

    #[test]
    fn test_unterminated_tag() {
        let err = segments("line\n{$x").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_tokenize_modifiers() {
        let tokens = tokenize_tag(r#"$user.name|truncate:20:"...""#, 1).unwrap();
        assert_eq!(
            tokens,
            vec![
                TagToken::Var(vec!["user".into(), "name".into()]),
                TagToken::Pipe,
                TagToken::Ident("truncate".into()),
                TagToken::Colon,
                TagToken::Num(20.0),
                TagToken::Colon,
                TagToken::Str("...".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_operators() {
        let tokens = tokenize_tag("$a >= -2 && !$b || $c != 'x'", 1).unwrap();
        assert_eq!(
            tokens,
            vec![
                TagToken::Var(vec!["a".into()]),
                TagToken::Op(">="),
                TagToken::Num(-2.0),
                TagToken::Op("&&"),
                TagToken::Op("!"),
                TagToken::Var(vec!["b".into()]),
                TagToken::Op("||"),
                TagToken::Var(vec!["c".into()]),
                TagToken::Op("!="),
                TagToken::Str("x".into()),
            ]
        );
    }

    #[test]
    fn test_bare_dollar_is_error() {
        assert!(tokenize_tag("$ x", 3).is_err());
    }
}
