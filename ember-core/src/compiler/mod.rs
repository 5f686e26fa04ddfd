//! Wire-Format Compiler
//!
//! Lowers a parsed [`Template`] into a [`WireTemplate`]: flat statement
//! opcodes plus the symbol tables they index.
//!
//! # How Lowering Works
//!
//! - Elements flatten to open / attrs / modifiers / flush / children /
//!   close; capitalized tags become a single `Component` statement.
//! - Block params get one `locals` slot per declaration. Nested programs
//!   are appended to `blocks` and referenced by index.
//! - `@name` reads intern into `named`; `{{yield}}` and `has-block`
//!   intern into `yields`.
//! - A free variable alone is a `GetFree` (helper, else `this.name`); with
//!   arguments it is a `Call`.
//!
//! Output is deterministic: the same AST and options always produce the
//! same bytes and the same id.

mod lower;
mod precompile;
mod wire;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use precompile::{compile_template, precompile, template_id, ID_LENGTH};
pub use wire::{
    op, Params, SerializedBlock, SerializedTemplateBlock, Slot, TemplateMeta, WireExpression, WireHash,
    WireLiteral, WireStatement, WireTemplate,
};

use crate::error::CompileError;
use crate::syntax::{ParseOptions, Template};

/// Compiler settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompileOptions {
    pub meta: Option<TemplateMeta>,
    /// Reject free variables that are neither keywords, block params nor
    /// listed in `lexical_scope`.
    pub strict: bool,
    pub lexical_scope: Vec<String>,
    pub parse: ParseOptions,
}

/// Compile a parsed template.
pub fn compile(template: &Template, options: &CompileOptions) -> Result<WireTemplate, CompileError> {
    let block = lower::Lowering::new(options).lower(template)?;
    let id = template_id(&template.source, options.meta.as_ref());
    debug!(
        %id,
        statements = block.statements.len(),
        blocks = block.blocks.len(),
        "compiled template"
    );
    Ok(WireTemplate {
        id,
        block,
        meta: options.meta.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    fn block(source: &str) -> SerializedTemplateBlock {
        compile(&parse(source).unwrap(), &CompileOptions::default()).unwrap().block
    }

    fn json(source: &str) -> String {
        serde_json::to_string(&block(source).statements).unwrap()
    }

    fn strict(scope: &[&str]) -> CompileOptions {
        CompileOptions {
            strict: true,
            lexical_scope: scope.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn element_with_dynamic_content() {
        assert_eq!(json("<div>{{title}}</div>"), r#"[[7,"div"],[8],[1,[20,"title",[]]],[9]]"#);
    }

    #[test]
    fn attributes_and_concat() {
        assert_eq!(
            json(r#"<a href="/x/{{id}}" class="c" title={{t}}></a>"#),
            r#"[[7,"a"],[11,"href",[25,["/x/",[20,"id",[]]]],null],[10,"class","c",null],[11,"title",[20,"t",[]],null],[8],[9]]"#
        );
    }

    #[test]
    fn namespaced_attributes() {
        assert_eq!(
            json(r##"<use xlink:href="#a" />"##),
            r##"[[7,"use"],[10,"xlink:href","#a","http://www.w3.org/1999/xlink"],[8],[9]]"##
        );
    }

    #[test]
    fn calls_paths_and_literals() {
        assert_eq!(
            json(r#"{{concat "a" this.b @c.d 2}}"#),
            r#"[[1,[24,"concat",["a",[23,["b"]],[22,0,["d"]],2],null]]]"#
        );
    }

    #[test]
    fn block_params_get_local_slots() {
        let wire = block("{{#each items as |item i|}}{{item.name}}{{i}}{{/each}}{{#let 1 as |item|}}{{item}}{{/let}}");
        assert_eq!(wire.locals, vec!["item", "i", "item"]);
        assert_eq!(wire.blocks[0].parameters, vec![0, 1]);
        assert_eq!(wire.blocks[1].parameters, vec![2]);
        assert_eq!(
            serde_json::to_string(&wire.blocks[0].statements).unwrap(),
            r#"[[1,[21,0,["name"]]],[1,[21,1,[]]]]"#
        );
        assert_eq!(
            serde_json::to_string(&wire.blocks[1].statements).unwrap(),
            r#"[[1,[21,2,[]]]]"#
        );
    }

    #[test]
    fn inner_params_shadow_outer() {
        let wire = block("{{#let 1 as |x|}}{{#let 2 as |x|}}{{x}}{{/let}}{{x}}{{/let}}");
        // Nested programs are appended before their parent.
        assert_eq!(serde_json::to_string(&wire.blocks[0].statements).unwrap(), r#"[[1,[21,1,[]]]]"#);
        let outer = serde_json::to_string(&wire.blocks[1].statements).unwrap();
        assert!(outer.ends_with(r#"[1,[21,0,[]]]]"#));
    }

    #[test]
    fn if_else_block() {
        let wire = block("{{#if cond}}Yes{{else}}No{{/if}}");
        assert_eq!(
            serde_json::to_string(&wire.statements).unwrap(),
            r#"[[5,"if",[[20,"cond",[]]],null,0,1]]"#
        );
        assert_eq!(wire.blocks[0].statements, vec![WireStatement::Text("Yes".into())]);
        assert_eq!(wire.blocks[1].statements, vec![WireStatement::Text("No".into())]);
    }

    #[test]
    fn yields_and_has_block() {
        let wire = block(r#"{{#if (has-block "inverse")}}{{yield to="inverse"}}{{/if}}{{yield @x}}{{has-block}}"#);
        assert_eq!(wire.yields, vec!["&inverse", "&default"]);
        assert_eq!(wire.named, vec!["@x"]);
        assert_eq!(
            serde_json::to_string(&wire.statements).unwrap(),
            r#"[[5,"if",[[26,0]],null,0,null],[12,1,[[22,0,[]]]],[1,[26,1]]]"#
        );
    }

    #[test]
    fn components_split_args_from_attrs() {
        let wire = block(r#"<Card @title={{t}} @kind="big" class="x" ...attributes {{on "click" go}} as |c|>{{c}}</Card>"#);
        assert_eq!(
            serde_json::to_string(&wire.statements).unwrap(),
            r#"[[6,"Card",[[10,"class","x",null],[13],[4,"on",["click",[20,"go",[]]],null]],[["title","kind"],[[20,"t",[]],"big"]],0]]"#
        );
        assert_eq!(wire.blocks[0].parameters, vec![0]);
    }

    #[test]
    fn self_closing_component_has_no_block() {
        let wire = block("<Foo />");
        assert_eq!(
            wire.statements,
            vec![WireStatement::Component {
                tag: "Foo".into(),
                attrs: vec![],
                args: None,
                block: None,
            }]
        );
    }

    #[test]
    fn comments_and_mustache_comments() {
        assert_eq!(json("<!-- c -->{{! gone }}"), r#"[[3," c "]]"#);
    }

    #[test]
    fn has_eval_is_false() {
        assert!(!block("{{x}}").has_eval);
    }

    #[test]
    fn strict_mode_rejects_unknown_free_variables() {
        let ast = parse("{{#each list as |x|}}{{x}}{{/each}}").unwrap();
        assert!(matches!(
            compile(&ast, &strict(&[])),
            Err(CompileError::UnresolvedSymbol { ref name, line: 1, column: 8 }) if name == "list"
        ));
        assert!(compile(&ast, &strict(&["list"])).is_ok());
    }

    #[test]
    fn strict_mode_allows_keywords_and_this() {
        let ast = parse("{{#if this.a}}{{concat @b}}{{/if}}").unwrap();
        assert!(compile(&ast, &strict(&[])).is_ok());
        let ast = parse("{{helper 1}}").unwrap();
        assert!(compile(&ast, &strict(&[])).is_err());
    }

    #[test]
    fn unsupported_constructs() {
        for source in [
            "{{this.f 1}}",
            "<div @a={{b}}></div>",
            "<div as |x|></div>",
            "<this.foo />",
            "<@foo />",
            "{{#let 1 as |h|}}{{h 2}}{{/let}}",
            r#"{{yield to=x}}"#,
        ] {
            let result = compile(&parse(source).unwrap(), &CompileOptions::default());
            assert!(
                matches!(result, Err(CompileError::Unsupported { .. })),
                "{source} should be unsupported, got {result:?}"
            );
        }
    }

    #[test]
    fn compile_is_deterministic() {
        let source = r#"<ul class={{cls}}>{{#each items key="id" as |item|}}<li {{on "click" (fn select item)}}>{{item.label}}</li>{{else}}empty{{/each}}</ul>"#;
        let options = CompileOptions {
            meta: Some(TemplateMeta::module("app/list")),
            ..Default::default()
        };
        let a = compile(&parse(source).unwrap(), &options).unwrap();
        let b = compile(&parse(source).unwrap(), &options).unwrap();
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn options_deserialize() {
        let options: CompileOptions =
            serde_json::from_str(r#"{"strict":true,"lexicalScope":["x"],"meta":{"moduleName":"m"}}"#).unwrap();
        assert!(options.strict);
        assert_eq!(options.lexical_scope, vec!["x"]);
        assert_eq!(options.meta, Some(TemplateMeta::module("m")));
    }
}
