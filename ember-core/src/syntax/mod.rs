//! Template Syntax
//!
//! Parses Handlebars-flavored HTML templates into an AST.
//!
//! # What Is Supported
//!
//! - Text with character references, HTML comments, elements (void and
//!   self-closing included) with static, dynamic, quoted-interpolated and
//!   valueless attributes, `...attributes`, element modifiers and
//!   `as |x|` block params.
//! - `{{path params hash}}`, `{{{trusting}}}`, `{{! comments }}`,
//!   `{{#block}}...{{else}}...{{/block}}` with `{{else if}}` chains,
//!   sub-expressions and literals.
//! - `~` whitespace control on every mustache form.
//!
//! Partials, decorators and `../` context changes are rejected.

mod ast;
mod parser;
mod scanner;
mod traverse;
mod whitespace;

use serde::{Deserialize, Serialize};

pub use ast::*;
pub use traverse::{traverse, NodeRef, Visitor};

use crate::error::SyntaxError;
pub(crate) use parser::VOID_ELEMENTS;

/// Parser settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParseOptions {
    /// Leave `{{! }}` comments out of the AST.
    pub strip_comments: bool,
}

/// Parse with default options.
pub fn parse(source: &str) -> Result<Template, SyntaxError> {
    parse_with(source, &ParseOptions::default())
}

pub fn parse_with(source: &str, options: &ParseOptions) -> Result<Template, SyntaxError> {
    parser::Parser::new(source, options).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_comments_option() {
        let options = ParseOptions { strip_comments: true };
        let template = parse_with("a{{! gone }}b", &options).unwrap();
        assert_eq!(template.body.len(), 2);
    }

    #[test]
    fn parse_is_deterministic() {
        let source = "<ul>{{#each items key=\"id\" as |item|}}<li>{{item.name}}</li>{{/each}}</ul>";
        assert_eq!(parse(source).unwrap(), parse(source).unwrap());
    }

    #[test]
    fn options_deserialize_from_json() {
        let options: ParseOptions = serde_json::from_str(r#"{"stripComments": true}"#).unwrap();
        assert!(options.strip_comments);
        let defaults: ParseOptions = serde_json::from_str("{}").unwrap();
        assert!(!defaults.strip_comments);
    }
}
