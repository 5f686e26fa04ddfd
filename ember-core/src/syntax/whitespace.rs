//! Whitespace control.
//!
//! A `~` next to a mustache's braces trims the whitespace of the adjacent
//! text on that side. For blocks the open, else and close tags each carry
//! their own flags, and the inside of each tag trims into the block body.
//! Text nodes left empty by trimming are removed.

use super::ast::{Block, BlockStatement, Statement};

pub(crate) fn apply_strip_flags(body: &mut Vec<Statement>) {
    for statement in body.iter_mut() {
        match statement {
            Statement::Element(element) => apply_strip_flags(&mut element.children),
            Statement::Block(block) => strip_block_interior(block),
            _ => {}
        }
    }

    for i in 0..body.len() {
        let (left, right) = outer_flags(&body[i]);
        if left && i > 0 {
            trim_text_end(&mut body[i - 1]);
        }
        if right && i + 1 < body.len() {
            trim_text_start(&mut body[i + 1]);
        }
    }

    remove_empty_text(body);
}

/// Whether a statement strips the text before it and after it.
fn outer_flags(statement: &Statement) -> (bool, bool) {
    match statement {
        Statement::Mustache(m) => (m.strip.open, m.strip.close),
        Statement::MustacheComment(c) => (c.strip.open, c.strip.close),
        Statement::Block(b) => (b.open_strip.open, b.close_strip.close),
        _ => (false, false),
    }
}

fn strip_block_interior(block: &mut BlockStatement) {
    apply_strip_flags(&mut block.program.body);

    if block.open_strip.close {
        trim_first(&mut block.program);
    }

    match block.inverse.as_mut() {
        Some(inverse) => {
            if inverse.chained {
                // The nested block owns the shared close tag.
                if let Some(Statement::Block(nested)) = inverse.body.first_mut() {
                    strip_block_interior(nested);
                }
            } else {
                apply_strip_flags(&mut inverse.body);
                if block.inverse_strip.close {
                    trim_first(inverse);
                }
                if block.close_strip.open {
                    trim_last(inverse);
                }
            }
            if block.inverse_strip.open {
                trim_last(&mut block.program);
            }
        }
        None => {
            if block.close_strip.open {
                trim_last(&mut block.program);
            }
        }
    }
}

fn trim_first(block: &mut Block) {
    if let Some(first) = block.body.first_mut() {
        trim_text_start(first);
    }
    remove_empty_text(&mut block.body);
}

fn trim_last(block: &mut Block) {
    if let Some(last) = block.body.last_mut() {
        trim_text_end(last);
    }
    remove_empty_text(&mut block.body);
}

fn trim_text_start(statement: &mut Statement) {
    if let Statement::Text(text) = statement {
        text.chars = text.chars.trim_start().to_string();
    }
}

fn trim_text_end(statement: &mut Statement) {
    if let Statement::Text(text) = statement {
        text.chars = text.chars.trim_end().to_string();
    }
}

fn remove_empty_text(body: &mut Vec<Statement>) {
    body.retain(|statement| !matches!(statement, Statement::Text(text) if text.chars.is_empty()));
}

/// Drop `{{! }}` comments from the tree (after their strip flags applied).
pub(crate) fn remove_mustache_comments(body: &mut Vec<Statement>) {
    body.retain(|statement| !matches!(statement, Statement::MustacheComment(_)));
    for statement in body.iter_mut() {
        match statement {
            Statement::Element(element) => remove_mustache_comments(&mut element.children),
            Statement::Block(block) => {
                remove_mustache_comments(&mut block.program.body);
                if let Some(inverse) = block.inverse.as_mut() {
                    remove_mustache_comments(&mut inverse.body);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::syntax::ast::{Statement, StripMode};
    use crate::syntax::parse;

    fn texts(body: &[Statement]) -> Vec<String> {
        body.iter()
            .filter_map(|s| match s {
                Statement::Text(t) => Some(t.chars.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn tilde_trims_adjacent_text() {
        let template = parse("a  {{~x~}}  b").unwrap();
        assert_eq!(texts(&template.body), vec!["a", "b"]);
        let Statement::Mustache(m) = &template.body[1] else { panic!() };
        assert_eq!(m.strip.mode(), StripMode::Both);
    }

    #[test]
    fn one_sided_strip() {
        let template = parse("a  {{~x}}  b").unwrap();
        assert_eq!(texts(&template.body), vec!["a", "  b"]);
    }

    #[test]
    fn whitespace_only_text_is_removed() {
        let template = parse("  {{~x}}").unwrap();
        assert_eq!(template.body.len(), 1);
    }

    #[test]
    fn block_tags_trim_into_their_bodies() {
        let template = parse("{{#if a~}}\n  yes\n{{~else~}}\n  no\n{{~/if}}").unwrap();
        let Statement::Block(block) = &template.body[0] else { panic!() };
        assert_eq!(texts(&block.program.body), vec!["yes"]);
        assert_eq!(texts(&block.inverse.as_ref().unwrap().body), vec!["no"]);
    }

    #[test]
    fn block_outer_flags_trim_siblings() {
        let template = parse("x \n{{~#if a}}y{{/if~}}\n z").unwrap();
        assert_eq!(texts(&template.body), vec!["x", "z"]);
    }

    #[test]
    fn untouched_without_tilde() {
        let template = parse(" {{x}} ").unwrap();
        assert_eq!(texts(&template.body), vec![" ", " "]);
    }
}
