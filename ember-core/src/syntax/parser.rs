use std::borrow::Cow;

use tracing::debug;

use super::ast::{
    AttrNode, AttrValue, Block, BlockStatement, CommentStatement, ConcatPart, ConcatStatement,
    ElementModifierStatement, ElementNode, Expression, Hash, HashPair, Literal, LiteralValue,
    MustacheCommentStatement, MustacheStatement, PathExpression, PathHead, Position, SourceSpan,
    Statement, StripFlags, SubExpression, Template, TextNode,
};
use super::scanner::{error_at, Scanner};
use super::whitespace;
use super::ParseOptions;
use crate::error::SyntaxError;

pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Where `parse_content` is collecting statements.
#[derive(Clone, Copy)]
enum Context<'a> {
    Top,
    Element { tag: &'a str, start: Position },
    Block { name: &'a str, start: Position },
}

/// Why `parse_content` returned.
enum Stop {
    Eof,
    CloseTag,
    Close {
        name: String,
        strip: StripFlags,
        at: Position,
    },
    Else {
        chain: Option<Box<BlockOpen>>,
        strip: StripFlags,
        at: Position,
    },
}

/// A parsed `{{#name ...}}` (or the `if b` of `{{else if b}}`).
struct BlockOpen {
    call: Call,
    strip: StripFlags,
    start: Position,
}

struct Call {
    path: Expression,
    params: Vec<Expression>,
    hash: Hash,
    block_params: Vec<String>,
}

enum Mustache {
    Statement(MustacheStatement),
    Comment(MustacheCommentStatement),
    Open(BlockOpen),
    Close {
        name: String,
        strip: StripFlags,
        at: Position,
    },
    Else {
        chain: Option<Box<BlockOpen>>,
        strip: StripFlags,
        at: Position,
    },
}

pub(crate) struct Parser<'s> {
    scanner: Scanner<'s>,
    source: &'s str,
    options: ParseOptions,
}

impl<'s> Parser<'s> {
    pub fn new(source: &'s str, options: &ParseOptions) -> Self {
        Self {
            scanner: Scanner::new(source),
            source,
            options: options.clone(),
        }
    }

    pub fn parse(mut self) -> Result<Template, SyntaxError> {
        let start = self.scanner.position();
        let (mut body, _) = self.parse_content(Context::Top)?;
        whitespace::apply_strip_flags(&mut body);
        if self.options.strip_comments {
            whitespace::remove_mustache_comments(&mut body);
        }
        debug!(statements = body.len(), "parsed template");
        Ok(Template {
            body,
            source: self.source.to_string(),
            loc: self.span_from(start),
        })
    }

    fn span_from(&self, start: Position) -> SourceSpan {
        SourceSpan::new(start, self.scanner.position())
    }

    // ------------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------------

    fn parse_content(&mut self, ctx: Context<'_>) -> Result<(Vec<Statement>, Stop), SyntaxError> {
        let mut body = Vec::new();

        loop {
            if self.scanner.is_at_end() {
                return match ctx {
                    Context::Top => Ok((body, Stop::Eof)),
                    Context::Element { tag, start } => {
                        Err(error_at(start, format!("Unclosed element `{tag}`")))
                    }
                    Context::Block { name, start } => {
                        Err(error_at(start, format!("Unclosed block `{name}`")))
                    }
                };
            }

            if self.scanner.starts_with("{{") {
                match self.parse_mustache()? {
                    Mustache::Statement(m) => body.push(Statement::Mustache(m)),
                    Mustache::Comment(c) => body.push(Statement::MustacheComment(c)),
                    Mustache::Open(open) => {
                        let block = self.parse_block(open, None)?;
                        body.push(Statement::Block(block));
                    }
                    Mustache::Close { name, strip, at } => {
                        return match ctx {
                            Context::Block { .. } => Ok((body, Stop::Close { name, strip, at })),
                            _ => Err(error_at(
                                at,
                                format!("Closing block `{{{{/{name}}}}}` without an open block"),
                            )),
                        };
                    }
                    Mustache::Else { chain, strip, at } => {
                        return match ctx {
                            Context::Block { .. } => Ok((body, Stop::Else { chain, strip, at })),
                            _ => Err(error_at(at, "Unexpected `{{else}}` outside of a block")),
                        };
                    }
                }
            } else if self.scanner.starts_with("<!--") {
                body.push(Statement::Comment(self.parse_html_comment()?));
            } else if self.scanner.starts_with("</") {
                let at = self.scanner.position();
                self.scanner.eat("</");
                let name = self
                    .scanner
                    .consume_while(|c| !c.is_whitespace() && c != '>')
                    .to_string();
                self.scanner.skip_whitespace();
                self.scanner.expect(">")?;

                return match ctx {
                    Context::Element { tag, .. } if tag == name => Ok((body, Stop::CloseTag)),
                    Context::Element { tag, .. } => Err(error_at(
                        at,
                        format!("Closing tag </{name}> did not match last open tag <{tag}>"),
                    )),
                    _ if VOID_ELEMENTS.contains(&name.as_str()) => Err(error_at(
                        at,
                        format!("<{name}> elements do not need end tags"),
                    )),
                    _ => Err(error_at(at, format!("Closing tag </{name}> without an open tag"))),
                };
            } else if self.at_tag_start() {
                body.push(Statement::Element(self.parse_element()?));
            } else {
                body.push(Statement::Text(self.parse_text()));
            }
        }
    }

    fn at_tag_start(&self) -> bool {
        self.scanner.peek() == Some('<')
            && matches!(self.scanner.peek_nth(1), Some(c) if c.is_ascii_alphabetic() || c == ':' || c == '@')
    }

    fn parse_text(&mut self) -> TextNode {
        let start = self.scanner.position();
        let mut chars = String::new();

        while !self.scanner.is_at_end() {
            if self.scanner.starts_with("\\{{") {
                self.scanner.consume();
                self.scanner.eat("{{");
                chars.push_str("{{");
                continue;
            }
            if self.scanner.starts_with("{{")
                || self.scanner.starts_with("</")
                || self.scanner.starts_with("<!--")
                || self.at_tag_start()
            {
                break;
            }
            if let Some(c) = self.scanner.consume() {
                chars.push(c);
            }
        }

        TextNode {
            chars: decode_entities(&chars).into_owned(),
            loc: self.span_from(start),
        }
    }

    fn parse_html_comment(&mut self) -> Result<CommentStatement, SyntaxError> {
        let start = self.scanner.position();
        self.scanner.expect("<!--")?;
        let value = self
            .scanner
            .consume_until("-->")
            .map_err(|()| error_at(start, "Unclosed comment"))?
            .to_string();
        self.scanner.expect("-->")?;
        Ok(CommentStatement {
            value,
            loc: self.span_from(start),
        })
    }

    // ------------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------------

    fn parse_element(&mut self) -> Result<ElementNode, SyntaxError> {
        let start = self.scanner.position();
        self.scanner.expect("<")?;
        let tag = self
            .scanner
            .consume_while(|c| !c.is_whitespace() && !matches!(c, '>' | '/' | '{'))
            .to_string();

        let mut attributes = Vec::new();
        let mut modifiers = Vec::new();
        let mut block_params = Vec::new();
        let self_closing;

        loop {
            self.scanner.skip_whitespace();
            if self.scanner.is_at_end() {
                return Err(error_at(start, format!("Unclosed element start tag `<{tag}`")));
            }
            if self.scanner.eat("/>") {
                self_closing = true;
                break;
            }
            if self.scanner.eat_char('>') {
                self_closing = false;
                break;
            }
            if self.scanner.starts_with("{{") {
                let at = self.scanner.position();
                match self.parse_mustache()? {
                    Mustache::Statement(m) if !m.trusting => modifiers.push(ElementModifierStatement {
                        path: m.path,
                        params: m.params,
                        hash: m.hash,
                        loc: m.loc,
                    }),
                    Mustache::Comment(_) => {}
                    _ => {
                        return Err(error_at(
                            at,
                            "Only modifiers are allowed inside an element's start tag",
                        ))
                    }
                }
                continue;
            }
            if self.at_block_params() {
                block_params = self.parse_block_params()?;
                continue;
            }
            attributes.push(self.parse_attribute()?);
        }

        let children = if self_closing || VOID_ELEMENTS.contains(&tag.as_str()) {
            Vec::new()
        } else {
            let (children, _) = self.parse_content(Context::Element { tag: &tag, start })?;
            children
        };

        Ok(ElementNode {
            tag,
            attributes,
            modifiers,
            children,
            block_params,
            self_closing,
            loc: self.span_from(start),
        })
    }

    fn parse_attribute(&mut self) -> Result<AttrNode, SyntaxError> {
        let start = self.scanner.position();
        let name = self
            .scanner
            .consume_while(|c| !c.is_whitespace() && !matches!(c, '=' | '>' | '/' | '"' | '\'' | '{'))
            .to_string();
        if name.is_empty() {
            return Err(self.scanner.error("Invalid character in element start tag"));
        }

        if !self.scanner.eat_char('=') {
            let loc = self.span_from(start);
            return Ok(AttrNode {
                name,
                value: AttrValue::Text(TextNode {
                    chars: String::new(),
                    loc,
                }),
                loc,
            });
        }

        let value_start = self.scanner.position();
        let value = match self.scanner.peek() {
            Some(quote @ ('"' | '\'')) => self.parse_quoted_value(quote)?,
            Some('{') if self.scanner.starts_with("{{") => match self.parse_mustache()? {
                Mustache::Statement(m) => AttrValue::Mustache(m),
                _ => {
                    return Err(error_at(
                        value_start,
                        "Attribute values must be a string or a mustache",
                    ))
                }
            },
            Some(_) => {
                let offset = self.scanner.offset();
                while let Some(c) = self.scanner.peek() {
                    if c.is_whitespace() || c == '>' || self.scanner.starts_with("/>") || self.scanner.starts_with("{{") {
                        break;
                    }
                    self.scanner.consume();
                }
                if self.scanner.starts_with("{{") {
                    return Err(self.scanner.error(
                        "An unquoted attribute value must be a string or a mustache, not a mix of both",
                    ));
                }
                let raw = self.scanner.slice(offset, self.scanner.offset());
                AttrValue::Text(TextNode {
                    chars: decode_entities(raw).into_owned(),
                    loc: self.span_from(value_start),
                })
            }
            None => return Err(self.scanner.error("Unexpected end of template in attribute")),
        };

        Ok(AttrNode {
            name,
            value,
            loc: self.span_from(start),
        })
    }

    fn parse_quoted_value(&mut self, quote: char) -> Result<AttrValue, SyntaxError> {
        let start = self.scanner.position();
        self.scanner.consume();

        let mut parts = Vec::new();
        let mut text = String::new();
        let mut text_start = self.scanner.position();
        let mut dynamic = false;

        loop {
            match self.scanner.peek() {
                None => return Err(error_at(start, "Unterminated attribute value")),
                Some(c) if c == quote => {
                    self.scanner.consume();
                    break;
                }
                Some('{') if self.scanner.starts_with("{{") => {
                    if !text.is_empty() {
                        parts.push(ConcatPart::Text(TextNode {
                            chars: decode_entities(&text).into_owned(),
                            loc: SourceSpan::new(text_start, self.scanner.position()),
                        }));
                        text.clear();
                    }
                    let at = self.scanner.position();
                    match self.parse_mustache()? {
                        Mustache::Statement(m) => {
                            dynamic = true;
                            parts.push(ConcatPart::Mustache(m));
                        }
                        Mustache::Comment(_) => {}
                        _ => return Err(error_at(at, "Blocks are not allowed in attribute values")),
                    }
                    text_start = self.scanner.position();
                }
                Some(_) => {
                    if let Some(c) = self.scanner.consume() {
                        text.push(c);
                    }
                }
            }
        }

        let end = self.scanner.position();
        if !dynamic {
            let chars = parts
                .into_iter()
                .filter_map(|part| match part {
                    ConcatPart::Text(t) => Some(t.chars),
                    ConcatPart::Mustache(_) => None,
                })
                .chain(std::iter::once(decode_entities(&text).into_owned()))
                .collect::<String>();
            return Ok(AttrValue::Text(TextNode {
                chars,
                loc: SourceSpan::new(start, end),
            }));
        }

        if !text.is_empty() {
            parts.push(ConcatPart::Text(TextNode {
                chars: decode_entities(&text).into_owned(),
                loc: SourceSpan::new(text_start, end),
            }));
        }
        Ok(AttrValue::Concat(ConcatStatement {
            parts,
            loc: SourceSpan::new(start, end),
        }))
    }

    // ------------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------------

    fn parse_block(&mut self, open: BlockOpen, outer: Option<&str>) -> Result<BlockStatement, SyntaxError> {
        let own_name = path_original(&open.call.path);
        let expected = outer.unwrap_or(&own_name).to_string();
        let ctx = Context::Block {
            name: &expected,
            start: open.start,
        };

        let program_start = self.scanner.position();
        let (body, stop) = self.parse_content(ctx)?;
        let program = Block {
            body,
            block_params: open.call.block_params,
            chained: false,
            loc: self.span_from(program_start),
        };

        let (inverse, inverse_strip, close_strip) = match stop {
            Stop::Close { name, strip, at } => {
                check_close(&expected, &name, at)?;
                (None, StripFlags::default(), strip)
            }
            Stop::Else {
                chain: None, strip, ..
            } => {
                let inverse_start = self.scanner.position();
                let (body, stop) = self.parse_content(ctx)?;
                let loc = self.span_from(inverse_start);
                match stop {
                    Stop::Close {
                        name,
                        strip: close,
                        at,
                    } => {
                        check_close(&expected, &name, at)?;
                        let inverse = Block {
                            body,
                            block_params: Vec::new(),
                            chained: false,
                            loc,
                        };
                        (Some(inverse), strip, close)
                    }
                    Stop::Else { at, .. } => {
                        return Err(error_at(at, "Unexpected `{{else}}` after an inverse block"))
                    }
                    Stop::Eof | Stop::CloseTag => {
                        return Err(error_at(open.start, format!("Unclosed block `{expected}`")))
                    }
                }
            }
            Stop::Else {
                chain: Some(next),
                strip,
                ..
            } => {
                let nested = self.parse_block(*next, Some(&expected))?;
                let close = nested.close_strip;
                let loc = nested.loc;
                let inverse = Block {
                    body: vec![Statement::Block(nested)],
                    block_params: Vec::new(),
                    chained: true,
                    loc,
                };
                (Some(inverse), strip, close)
            }
            Stop::Eof | Stop::CloseTag => {
                return Err(error_at(open.start, format!("Unclosed block `{expected}`")))
            }
        };

        Ok(BlockStatement {
            path: open.call.path,
            params: open.call.params,
            hash: open.call.hash,
            program,
            inverse,
            open_strip: open.strip,
            inverse_strip,
            close_strip,
            loc: self.span_from(open.start),
        })
    }

    // ------------------------------------------------------------------------
    // Mustaches
    // ------------------------------------------------------------------------

    fn parse_mustache(&mut self) -> Result<Mustache, SyntaxError> {
        let start = self.scanner.position();
        self.scanner.expect("{{")?;
        let open = self.scanner.eat_char('~');

        if self.scanner.peek() == Some('!') {
            return self.parse_mustache_comment(start, open);
        }

        let trusting = self.scanner.eat_char('{');
        self.scanner.skip_whitespace();

        if !trusting {
            match self.scanner.peek() {
                Some('#') => {
                    self.scanner.consume();
                    let call = self.parse_call(true)?;
                    let close = self.parse_close(false, start)?;
                    return Ok(Mustache::Open(BlockOpen {
                        call,
                        strip: StripFlags { open, close },
                        start,
                    }));
                }
                Some('/') => {
                    self.scanner.consume();
                    self.scanner.skip_whitespace();
                    let path = self.parse_expression()?;
                    let close = self.parse_close(false, start)?;
                    return Ok(Mustache::Close {
                        name: path_original(&path),
                        strip: StripFlags { open, close },
                        at: start,
                    });
                }
                Some('^') => {
                    self.scanner.consume();
                    let close = self.parse_close(false, start)?;
                    return Ok(Mustache::Else {
                        chain: None,
                        strip: StripFlags { open, close },
                        at: start,
                    });
                }
                _ if self.at_keyword("else") => {
                    self.scanner.eat("else");
                    self.scanner.skip_whitespace();
                    if self.at_close() {
                        let close = self.parse_close(false, start)?;
                        return Ok(Mustache::Else {
                            chain: None,
                            strip: StripFlags { open, close },
                            at: start,
                        });
                    }
                    let call = self.parse_call(true)?;
                    let close = self.parse_close(false, start)?;
                    let strip = StripFlags { open, close };
                    return Ok(Mustache::Else {
                        chain: Some(Box::new(BlockOpen { call, strip, start })),
                        strip,
                        at: start,
                    });
                }
                _ => {}
            }
        }

        let call = self.parse_call(false)?;
        let close = self.parse_close(trusting, start)?;
        Ok(Mustache::Statement(MustacheStatement {
            path: call.path,
            params: call.params,
            hash: call.hash,
            trusting,
            strip: StripFlags { open, close },
            loc: self.span_from(start),
        }))
    }

    fn parse_mustache_comment(&mut self, start: Position, open: bool) -> Result<Mustache, SyntaxError> {
        self.scanner.expect("!")?;
        let long = self.scanner.eat("--");
        let end = if long { "--" } else { "}}" };

        let mut value = String::new();
        let close;
        loop {
            let chunk = self
                .scanner
                .consume_until(end)
                .map_err(|()| error_at(start, "Unclosed comment"))?;
            value.push_str(chunk);

            if long {
                self.scanner.eat("--");
                if self.scanner.eat("}}") {
                    close = false;
                    break;
                }
                if self.scanner.eat("~}}") {
                    close = true;
                    break;
                }
                value.push_str("--");
            } else {
                // A trailing `~` belongs to the close.
                close = value.ends_with('~');
                if close {
                    value.pop();
                }
                self.scanner.eat("}}");
                break;
            }
        }

        Ok(Mustache::Comment(MustacheCommentStatement {
            value,
            strip: StripFlags { open, close },
            loc: self.span_from(start),
        }))
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        let rest = self.scanner.rest();
        rest.starts_with(keyword)
            && matches!(rest[keyword.len()..].chars().next(), Some(c) if c.is_whitespace() || c == '~' || c == '}')
    }

    fn at_close(&self) -> bool {
        self.scanner.starts_with("}}") || self.scanner.starts_with("~}}")
    }

    fn parse_close(&mut self, trusting: bool, start: Position) -> Result<bool, SyntaxError> {
        self.scanner.skip_whitespace();
        if self.scanner.is_at_end() {
            return Err(error_at(start, "Unclosed mustache"));
        }
        if trusting && !self.scanner.eat_char('}') {
            return Err(self.scanner.error("Expected `}}}` to close a triple-stash"));
        }
        let strip = self.scanner.eat_char('~');
        if !self.scanner.eat("}}") {
            return Err(self.scanner.error("Expected `}}`"));
        }
        Ok(strip)
    }

    fn parse_call(&mut self, allow_block_params: bool) -> Result<Call, SyntaxError> {
        let path = self.parse_expression()?;
        let mut params = Vec::new();
        let mut pairs: Vec<HashPair> = Vec::new();
        let mut hash_start = None;
        let mut block_params = Vec::new();

        loop {
            self.scanner.skip_whitespace();
            match self.scanner.peek() {
                None => return Err(self.scanner.error("Unexpected end of template in mustache")),
                Some('}' | '~' | ')') => break,
                _ => {}
            }

            if self.at_block_params() {
                if !allow_block_params {
                    return Err(self.scanner.error("Block params are only allowed on blocks and elements"));
                }
                block_params = self.parse_block_params()?;
                continue;
            }
            if !block_params.is_empty() {
                return Err(self.scanner.error("Block params must come last"));
            }

            if let Some(key) = self.peek_hash_key() {
                let start = self.scanner.position();
                hash_start.get_or_insert(start);
                self.scanner.eat(&key);
                self.scanner.expect("=")?;
                self.scanner.skip_whitespace();
                let value = self.parse_expression()?;
                pairs.push(HashPair {
                    key,
                    value,
                    loc: self.span_from(start),
                });
            } else {
                if !pairs.is_empty() {
                    return Err(self
                        .scanner
                        .error("Positional arguments must come before named arguments"));
                }
                params.push(self.parse_expression()?);
            }
        }

        let hash = match hash_start {
            Some(start) => Hash {
                pairs,
                loc: self.span_from(start),
            },
            None => Hash::default(),
        };

        Ok(Call {
            path,
            params,
            hash,
            block_params,
        })
    }

    fn peek_hash_key(&self) -> Option<String> {
        let rest = self.scanner.rest();
        let len = rest
            .char_indices()
            .find(|&(_, c)| !(c.is_alphanumeric() || matches!(c, '-' | '_' | '@' | ':')))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        (len > 0 && rest[len..].starts_with('=')).then(|| rest[..len].to_string())
    }

    fn at_block_params(&self) -> bool {
        let rest = self.scanner.rest();
        rest.strip_prefix("as")
            .filter(|after| after.starts_with(char::is_whitespace))
            .map(|after| after.trim_start().starts_with('|'))
            .unwrap_or(false)
    }

    fn parse_block_params(&mut self) -> Result<Vec<String>, SyntaxError> {
        let start = self.scanner.position();
        self.scanner.expect("as")?;
        self.scanner.skip_whitespace();
        self.scanner.expect("|")?;

        let mut names = Vec::new();
        loop {
            self.scanner.skip_whitespace();
            if self.scanner.eat_char('|') {
                break;
            }
            let name = self
                .scanner
                .consume_while(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '$'));
            if name.is_empty() {
                return Err(match self.scanner.peek() {
                    None => error_at(start, "Unclosed block params"),
                    Some(c) => self.scanner.error(format!("Invalid character `{c}` in block params")),
                });
            }
            names.push(name.to_string());
        }

        if names.is_empty() {
            return Err(error_at(start, "Empty block params"));
        }
        Ok(names)
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn parse_expression(&mut self) -> Result<Expression, SyntaxError> {
        let start = self.scanner.position();
        match self.scanner.peek() {
            Some('(') => {
                self.scanner.consume();
                self.scanner.skip_whitespace();
                let call = self.parse_call(false)?;
                self.scanner.skip_whitespace();
                if !self.scanner.eat_char(')') {
                    return Err(error_at(start, "Unclosed sub-expression"));
                }
                Ok(Expression::SubExpression(SubExpression {
                    path: Box::new(call.path),
                    params: call.params,
                    hash: call.hash,
                    loc: self.span_from(start),
                }))
            }
            Some(quote @ ('"' | '\'')) => {
                let value = self.parse_string(quote)?;
                Ok(self.literal(LiteralValue::String(value), start))
            }
            Some(c) if c.is_ascii_digit() || (c == '-' && self.scanner.peek_nth(1).is_some_and(|d| d.is_ascii_digit())) => {
                let offset = self.scanner.offset();
                self.scanner.consume();
                self.scanner.consume_while(|c| c.is_ascii_digit() || c == '.');
                let raw = self.scanner.slice(offset, self.scanner.offset());
                if let Some(next) = self.scanner.peek().filter(|&c| !ends_number(c)) {
                    return Err(self.scanner.error(format!("Unexpected `{next}` after number `{raw}`")));
                }
                let n = raw
                    .parse::<f64>()
                    .map_err(|_| error_at(start, format!("Invalid number `{raw}`")))?;
                Ok(self.literal(LiteralValue::Number(n), start))
            }
            Some(c) if is_word_char(c) => {
                let word = self.scanner.consume_while(is_word_char);
                let value = match word {
                    "true" => LiteralValue::Boolean(true),
                    "false" => LiteralValue::Boolean(false),
                    "null" => LiteralValue::Null,
                    "undefined" => LiteralValue::Undefined,
                    _ => return Ok(Expression::Path(parse_path(word, start, self.scanner.position())?)),
                };
                Ok(self.literal(value, start))
            }
            Some(c) => Err(self.scanner.error(format!("Unexpected `{c}`, expected an expression"))),
            None => Err(self.scanner.error("Unexpected end of template, expected an expression")),
        }
    }

    fn literal(&self, value: LiteralValue, start: Position) -> Expression {
        Expression::Literal(Literal {
            value,
            loc: self.span_from(start),
        })
    }

    fn parse_string(&mut self, quote: char) -> Result<String, SyntaxError> {
        let start = self.scanner.position();
        self.scanner.consume();
        let mut value = String::new();
        loop {
            match self.scanner.consume() {
                None => return Err(error_at(start, "Unterminated string literal")),
                Some('\\') => match self.scanner.consume() {
                    Some(escaped) => value.push(escaped),
                    None => return Err(error_at(start, "Unterminated string literal")),
                },
                Some(c) if c == quote => return Ok(value),
                Some(c) => value.push(c),
            }
        }
    }
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '}' | '{' | '(' | ')' | '=' | '~' | '|' | '"' | '\'')
}

/// Characters that may directly follow a numeric literal.
fn ends_number(c: char) -> bool {
    c.is_whitespace() || matches!(c, ')' | '}' | '=' | '~')
}

fn parse_path(word: &str, start: Position, end: Position) -> Result<PathExpression, SyntaxError> {
    if word.starts_with("..") || word.contains("../") {
        return Err(error_at(start, "Changing context using `../` is not supported"));
    }
    if word.contains('/') {
        return Err(error_at(start, format!("Invalid path `{word}`: use `.` to separate segments")));
    }

    let mut segments = word.split('.');
    let head = match segments.next().unwrap_or_default() {
        "this" => PathHead::This,
        "" => return Err(error_at(start, format!("Invalid path `{word}`"))),
        head => match head.strip_prefix('@') {
            Some("") => return Err(error_at(start, "Invalid named argument `@`")),
            Some(name) => PathHead::Arg(name.to_string()),
            None => PathHead::Var(head.to_string()),
        },
    };

    let mut tail = Vec::new();
    for segment in segments {
        if segment.is_empty() || segment.starts_with('@') || segment == "this" {
            return Err(error_at(start, format!("Invalid path `{word}`")));
        }
        tail.push(segment.to_string());
    }

    Ok(PathExpression {
        head,
        tail,
        original: word.to_string(),
        loc: SourceSpan::new(start, end),
    })
}

fn path_original(expr: &Expression) -> String {
    match expr {
        Expression::Path(path) => path.original.clone(),
        Expression::Literal(Literal {
            value: LiteralValue::String(s),
            ..
        }) => s.clone(),
        _ => String::new(),
    }
}

fn check_close(open: &str, close: &str, at: Position) -> Result<(), SyntaxError> {
    if open == close {
        Ok(())
    } else {
        Err(error_at(at, format!("`{open}` doesn't match `{close}`")))
    }
}

/// Decode the character references templates commonly use. Unknown
/// references are left untouched.
pub(crate) fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi)));

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    fn only(source: &str) -> Statement {
        let template = parse(source).unwrap();
        assert_eq!(template.body.len(), 1, "{:#?}", template.body);
        template.body.into_iter().next().unwrap()
    }

    #[test]
    fn parses_text() {
        match only("hello &amp; bye") {
            Statement::Text(text) => assert_eq!(text.chars, "hello & bye"),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn parses_element_with_children() {
        let Statement::Element(div) = only("<div class=\"a\"><span>hi</span></div>") else {
            panic!("expected element");
        };
        assert_eq!(div.tag, "div");
        assert_eq!(div.attributes.len(), 1);
        assert_eq!(div.children.len(), 1);
        assert!(matches!(&div.attributes[0].value, AttrValue::Text(t) if t.chars == "a"));
    }

    #[test]
    fn void_and_self_closing_elements() {
        let template = parse("<input disabled><br/><div />").unwrap();
        assert_eq!(template.body.len(), 3);
        let Statement::Element(input) = &template.body[0] else { panic!() };
        assert_eq!(input.attributes[0].name, "disabled");
        let Statement::Element(div) = &template.body[2] else { panic!() };
        assert!(div.self_closing);
    }

    #[test]
    fn parses_mustache_with_params_and_hash() {
        let Statement::Mustache(m) = only("{{format-name user.first \"x\" 2 upper=true}}") else {
            panic!("expected mustache");
        };
        assert_eq!(m.path.simple_name(), Some("format-name"));
        assert_eq!(m.params.len(), 3);
        assert_eq!(m.hash.pairs.len(), 1);
        assert_eq!(m.hash.pairs[0].key, "upper");
        match &m.params[0] {
            Expression::Path(p) => {
                assert_eq!(p.head, PathHead::Var("user".into()));
                assert_eq!(p.tail, vec!["first".to_string()]);
            }
            other => panic!("expected path, got {other:?}"),
        }
    }

    #[test]
    fn parses_this_and_args() {
        let Statement::Mustache(m) = only("{{this.name}}") else { panic!() };
        assert!(matches!(m.path, Expression::Path(PathExpression { head: PathHead::This, .. })));

        let Statement::Mustache(m) = only("{{@title.length}}") else { panic!() };
        let Expression::Path(path) = m.path else { panic!() };
        assert_eq!(path.head, PathHead::Arg("title".into()));
        assert_eq!(path.tail, vec!["length".to_string()]);
    }

    #[test]
    fn parses_triple_stash() {
        let Statement::Mustache(m) = only("{{{html}}}") else { panic!() };
        assert!(m.trusting);
    }

    #[test]
    fn parses_sub_expressions() {
        let Statement::Mustache(m) = only("{{concat (if cond \"a\" \"b\") \"!\"}}") else { panic!() };
        assert!(matches!(m.params[0], Expression::SubExpression(_)));
    }

    #[test]
    fn parses_block_with_inverse_and_params() {
        let Statement::Block(b) = only("{{#each items as |item i|}}{{item}}{{else}}none{{/each}}") else {
            panic!("expected block");
        };
        assert_eq!(b.program.block_params, vec!["item".to_string(), "i".to_string()]);
        assert_eq!(b.program.body.len(), 1);
        let inverse = b.inverse.unwrap();
        assert!(!inverse.chained);
        assert!(matches!(&inverse.body[0], Statement::Text(t) if t.chars == "none"));
    }

    #[test]
    fn else_if_chains_nest() {
        let Statement::Block(b) = only("{{#if a}}A{{else if b}}B{{else}}C{{/if}}") else { panic!() };
        let inverse = b.inverse.unwrap();
        assert!(inverse.chained);
        let Statement::Block(nested) = &inverse.body[0] else { panic!() };
        assert_eq!(nested.path.simple_name(), Some("if"));
        assert!(nested.inverse.is_some());
    }

    #[test]
    fn element_modifiers_and_block_params() {
        let Statement::Element(el) = only("<Foo {{on \"click\" this.go}} ...attributes as |x|>{{x}}</Foo>") else {
            panic!()
        };
        assert_eq!(el.modifiers.len(), 1);
        assert_eq!(el.attributes[0].name, "...attributes");
        assert_eq!(el.block_params, vec!["x".to_string()]);
    }

    #[test]
    fn quoted_interpolation_is_concat() {
        let Statement::Element(el) = only("<div class=\"a {{b}} c\"></div>") else { panic!() };
        let AttrValue::Concat(concat) = &el.attributes[0].value else {
            panic!("expected concat");
        };
        assert_eq!(concat.parts.len(), 3);
    }

    #[test]
    fn comments() {
        let template = parse("<!-- html -->{{! short }}{{!-- long }} --}}").unwrap();
        assert!(matches!(&template.body[0], Statement::Comment(c) if c.value == " html "));
        assert!(matches!(&template.body[1], Statement::MustacheComment(c) if c.value == " short "));
        assert!(matches!(&template.body[2], Statement::MustacheComment(c) if c.value == " long }} "));
    }

    #[test]
    fn locations_are_recorded() {
        let template = parse("a\n  {{b}}").unwrap();
        let loc = template.body[1].loc();
        assert_eq!(loc.start, Position { line: 2, column: 2 });
    }

    #[test]
    fn unclosed_element_is_an_error() {
        let err = parse("<div><span></div>").unwrap_err();
        assert!(err.message.contains("did not match"), "{err}");
    }

    #[test]
    fn unclosed_block_is_an_error() {
        let err = parse("\n{{#if a}}x").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 0);
    }

    #[test]
    fn mismatched_block_close_is_an_error() {
        let err = parse("{{#if a}}x{{/each}}").unwrap_err();
        assert!(err.message.contains("doesn't match"));
    }

    #[test]
    fn stray_else_is_an_error() {
        assert!(parse("{{else}}").is_err());
        assert!(parse("{{/if}}").is_err());
    }

    #[test]
    fn unterminated_constructs_are_errors() {
        assert!(parse("{{foo").is_err());
        assert!(parse("{{foo \"bar}}").is_err());
        assert!(parse("{{!-- never closed").is_err());
        assert!(parse("<div class=\"x></div>").is_err());
    }

    #[test]
    fn numbers_need_a_delimiter() {
        let err = parse("{{foo 1abc}}").unwrap_err();
        assert_eq!((err.line, err.column), (1, 7));
        assert!(parse("{{foo -2x}}").is_err());

        assert!(parse("{{foo 1}}").is_ok());
        assert!(parse("{{foo (bar 2.5) a=3~}}").is_ok());
    }

    #[test]
    fn bad_paths_are_errors() {
        assert!(parse("{{../foo}}").is_err());
        assert!(parse("{{foo..bar}}").is_err());
        assert!(parse("{{@}}").is_err());
    }

    #[test]
    fn entity_decoding() {
        assert_eq!(decode_entities("&lt;b&gt; &#65;&#x42; &unknown; &"), "<b> AB &unknown; &");
    }
}
