//! Wire Format
//!
//! The compact, serializable form of a compiled template. Every statement
//! and expression serializes as an array whose first element is a numeric
//! opcode; literals serialize inline as JSON primitives. Opcodes refer to
//! locals, named arguments, yields and blocks by index into the symbol
//! tables of the enclosing [`SerializedTemplateBlock`].

use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

pub mod op {
    pub const TEXT: u8 = 0;
    pub const APPEND: u8 = 1;
    pub const TRUSTING_APPEND: u8 = 2;
    pub const COMMENT: u8 = 3;
    pub const MODIFIER: u8 = 4;
    pub const BLOCK: u8 = 5;
    pub const COMPONENT: u8 = 6;
    pub const OPEN_ELEMENT: u8 = 7;
    pub const FLUSH_ELEMENT: u8 = 8;
    pub const CLOSE_ELEMENT: u8 = 9;
    pub const STATIC_ATTR: u8 = 10;
    pub const DYNAMIC_ATTR: u8 = 11;
    pub const YIELD: u8 = 12;
    pub const ATTR_SPLAT: u8 = 13;

    pub const GET_FREE: u8 = 20;
    pub const GET_LOCAL: u8 = 21;
    pub const GET_NAMED: u8 = 22;
    pub const GET_THIS: u8 = 23;
    pub const CALL: u8 = 24;
    pub const CONCAT: u8 = 25;
    pub const HAS_BLOCK: u8 = 26;
}

/// Index into a symbol table or the block list.
pub type Slot = usize;

pub type Params = Option<Vec<WireExpression>>;

/// Ordered hash arguments, serialized as `[[keys], [values]]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WireHash(pub Vec<String>, pub Vec<WireExpression>);

impl WireHash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: WireExpression) {
        self.0.push(key.into());
        self.1.push(value);
    }

    pub fn get(&self, key: &str) -> Option<&WireExpression> {
        self.0.iter().position(|k| k == key).and_then(|i| self.1.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &WireExpression)> {
        self.0.iter().map(String::as_str).zip(self.1.iter())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireLiteral {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireStatement {
    Text(String),
    Append(WireExpression),
    TrustingAppend(WireExpression),
    Comment(String),
    Modifier {
        name: String,
        params: Params,
        hash: Option<WireHash>,
    },
    Block {
        name: String,
        params: Params,
        hash: Option<WireHash>,
        program: Option<Slot>,
        inverse: Option<Slot>,
    },
    /// Angle-bracket invocation. `attrs` holds attribute, modifier and
    /// splat statements; `args` are keyed without the `@`.
    Component {
        tag: String,
        attrs: Vec<WireStatement>,
        args: Option<WireHash>,
        block: Option<Slot>,
    },
    OpenElement(String),
    FlushElement,
    CloseElement,
    StaticAttr {
        name: String,
        value: String,
        namespace: Option<String>,
    },
    DynamicAttr {
        name: String,
        value: WireExpression,
        namespace: Option<String>,
    },
    /// Render the block bound to the `yields` symbol at `to`.
    Yield { to: Slot, params: Params },
    AttrSplat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireExpression {
    Literal(WireLiteral),
    /// A helper by that name, else a property of `this`.
    GetFree { name: String, tail: Vec<String> },
    GetLocal { slot: Slot, tail: Vec<String> },
    GetNamed { slot: Slot, tail: Vec<String> },
    GetThis { tail: Vec<String> },
    Call {
        name: String,
        params: Params,
        hash: Option<WireHash>,
    },
    Concat(Vec<WireExpression>),
    HasBlock(Slot),
}

/// A nested program: statements plus the `locals` slots its block params
/// bind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SerializedBlock {
    pub statements: Vec<WireStatement>,
    pub parameters: Vec<Slot>,
}

/// The top-level program and the symbol tables every opcode indexes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedTemplateBlock {
    pub statements: Vec<WireStatement>,
    /// Block param names, one slot per declaration.
    pub locals: Vec<String>,
    /// Named arguments, with their `@`.
    pub named: Vec<String>,
    /// Yield targets, spelled `&default`, `&inverse`.
    pub yields: Vec<String>,
    pub blocks: Vec<SerializedBlock>,
    pub has_eval: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TemplateMeta {
    #[serde(rename = "moduleName", default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
}

impl TemplateMeta {
    pub fn module(name: impl Into<String>) -> Self {
        Self {
            module_name: Some(name.into()),
        }
    }
}

/// A precompiled template document: `{ "id", "block", "meta"? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTemplate {
    pub id: String,
    pub block: SerializedTemplateBlock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<TemplateMeta>,
}

impl WireTemplate {
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// MessagePack encoding with named struct fields.
    pub fn to_msgpack(&self) -> Result<Vec<u8>, Error> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, Error> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Whether any block of the template applies `...attributes`, either on
    /// an element or forwarded to a nested component.
    pub fn splats_attributes(&self) -> bool {
        fn any_splat(statements: &[WireStatement]) -> bool {
            statements.iter().any(|statement| match statement {
                WireStatement::AttrSplat => true,
                WireStatement::Component { attrs, .. } => any_splat(attrs),
                _ => false,
            })
        }
        any_splat(&self.block.statements) || self.block.blocks.iter().any(|block| any_splat(&block.statements))
    }
}

// ----------------------------------------------------------------------------
// Serialization
// ----------------------------------------------------------------------------

impl Serialize for WireLiteral {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WireLiteral::String(s) => serializer.serialize_str(s),
            WireLiteral::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 && !(*n == 0.0 && n.is_sign_negative()) => {
                serializer.serialize_i64(*n as i64)
            }
            WireLiteral::Number(n) => serializer.serialize_f64(*n),
            WireLiteral::Boolean(b) => serializer.serialize_bool(*b),
            WireLiteral::Null => serializer.serialize_unit(),
        }
    }
}

/// Serialize `op` followed by `fields` as one array.
macro_rules! opcode_seq {
    ($serializer:expr, $op:expr $(, $field:expr)*) => {{
        let len = 1 $(+ { let _ = &$field; 1 })*;
        let mut seq = $serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&$op)?;
        $(seq.serialize_element($field)?;)*
        seq.end()
    }};
}

impl Serialize for WireStatement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WireStatement::Text(text) => opcode_seq!(serializer, op::TEXT, text),
            WireStatement::Append(expr) => opcode_seq!(serializer, op::APPEND, expr),
            WireStatement::TrustingAppend(expr) => opcode_seq!(serializer, op::TRUSTING_APPEND, expr),
            WireStatement::Comment(text) => opcode_seq!(serializer, op::COMMENT, text),
            WireStatement::Modifier { name, params, hash } => {
                opcode_seq!(serializer, op::MODIFIER, name, params, hash)
            }
            WireStatement::Block {
                name,
                params,
                hash,
                program,
                inverse,
            } => opcode_seq!(serializer, op::BLOCK, name, params, hash, program, inverse),
            WireStatement::Component {
                tag,
                attrs,
                args,
                block,
            } => opcode_seq!(serializer, op::COMPONENT, tag, attrs, args, block),
            WireStatement::OpenElement(tag) => opcode_seq!(serializer, op::OPEN_ELEMENT, tag),
            WireStatement::FlushElement => opcode_seq!(serializer, op::FLUSH_ELEMENT),
            WireStatement::CloseElement => opcode_seq!(serializer, op::CLOSE_ELEMENT),
            WireStatement::StaticAttr { name, value, namespace } => {
                opcode_seq!(serializer, op::STATIC_ATTR, name, value, namespace)
            }
            WireStatement::DynamicAttr { name, value, namespace } => {
                opcode_seq!(serializer, op::DYNAMIC_ATTR, name, value, namespace)
            }
            WireStatement::Yield { to, params } => opcode_seq!(serializer, op::YIELD, to, params),
            WireStatement::AttrSplat => opcode_seq!(serializer, op::ATTR_SPLAT),
        }
    }
}

impl Serialize for WireExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WireExpression::Literal(lit) => lit.serialize(serializer),
            WireExpression::GetFree { name, tail } => opcode_seq!(serializer, op::GET_FREE, name, tail),
            WireExpression::GetLocal { slot, tail } => opcode_seq!(serializer, op::GET_LOCAL, slot, tail),
            WireExpression::GetNamed { slot, tail } => opcode_seq!(serializer, op::GET_NAMED, slot, tail),
            WireExpression::GetThis { tail } => opcode_seq!(serializer, op::GET_THIS, tail),
            WireExpression::Call { name, params, hash } => {
                opcode_seq!(serializer, op::CALL, name, params, hash)
            }
            WireExpression::Concat(parts) => opcode_seq!(serializer, op::CONCAT, parts),
            WireExpression::HasBlock(slot) => opcode_seq!(serializer, op::HAS_BLOCK, slot),
        }
    }
}

// ----------------------------------------------------------------------------
// Deserialization
// ----------------------------------------------------------------------------

fn field<'de, A, T>(seq: &mut A, index: usize, expecting: &'static str) -> Result<T, A::Error>
where
    A: SeqAccess<'de>,
    T: Deserialize<'de>,
{
    seq.next_element()?
        .ok_or_else(|| de::Error::invalid_length(index, &expecting))
}

impl<'de> Deserialize<'de> for WireStatement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StatementVisitor;

        impl<'de> Visitor<'de> for StatementVisitor {
            type Value = WireStatement;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a statement opcode array")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<WireStatement, A::Error> {
                const E: &str = "statement operands";
                let opcode: u8 = field(&mut seq, 0, E)?;
                let statement = match opcode {
                    op::TEXT => WireStatement::Text(field(&mut seq, 1, E)?),
                    op::APPEND => WireStatement::Append(field(&mut seq, 1, E)?),
                    op::TRUSTING_APPEND => WireStatement::TrustingAppend(field(&mut seq, 1, E)?),
                    op::COMMENT => WireStatement::Comment(field(&mut seq, 1, E)?),
                    op::MODIFIER => WireStatement::Modifier {
                        name: field(&mut seq, 1, E)?,
                        params: field(&mut seq, 2, E)?,
                        hash: field(&mut seq, 3, E)?,
                    },
                    op::BLOCK => WireStatement::Block {
                        name: field(&mut seq, 1, E)?,
                        params: field(&mut seq, 2, E)?,
                        hash: field(&mut seq, 3, E)?,
                        program: field(&mut seq, 4, E)?,
                        inverse: field(&mut seq, 5, E)?,
                    },
                    op::COMPONENT => WireStatement::Component {
                        tag: field(&mut seq, 1, E)?,
                        attrs: field(&mut seq, 2, E)?,
                        args: field(&mut seq, 3, E)?,
                        block: field(&mut seq, 4, E)?,
                    },
                    op::OPEN_ELEMENT => WireStatement::OpenElement(field(&mut seq, 1, E)?),
                    op::FLUSH_ELEMENT => WireStatement::FlushElement,
                    op::CLOSE_ELEMENT => WireStatement::CloseElement,
                    op::STATIC_ATTR => WireStatement::StaticAttr {
                        name: field(&mut seq, 1, E)?,
                        value: field(&mut seq, 2, E)?,
                        namespace: field(&mut seq, 3, E)?,
                    },
                    op::DYNAMIC_ATTR => WireStatement::DynamicAttr {
                        name: field(&mut seq, 1, E)?,
                        value: field(&mut seq, 2, E)?,
                        namespace: field(&mut seq, 3, E)?,
                    },
                    op::YIELD => WireStatement::Yield {
                        to: field(&mut seq, 1, E)?,
                        params: field(&mut seq, 2, E)?,
                    },
                    op::ATTR_SPLAT => WireStatement::AttrSplat,
                    other => {
                        return Err(de::Error::invalid_value(
                            de::Unexpected::Unsigned(other as u64),
                            &"a statement opcode (0-13)",
                        ))
                    }
                };
                Ok(statement)
            }
        }

        deserializer.deserialize_seq(StatementVisitor)
    }
}

impl<'de> Deserialize<'de> for WireExpression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ExpressionVisitor;

        impl<'de> Visitor<'de> for ExpressionVisitor {
            type Value = WireExpression;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a literal or an expression opcode array")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<WireExpression, E> {
                Ok(WireExpression::Literal(WireLiteral::String(v.to_string())))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<WireExpression, E> {
                Ok(WireExpression::Literal(WireLiteral::String(v)))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<WireExpression, E> {
                Ok(WireExpression::Literal(WireLiteral::Boolean(v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<WireExpression, E> {
                Ok(WireExpression::Literal(WireLiteral::Number(v as f64)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<WireExpression, E> {
                Ok(WireExpression::Literal(WireLiteral::Number(v as f64)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<WireExpression, E> {
                Ok(WireExpression::Literal(WireLiteral::Number(v)))
            }

            fn visit_unit<E: de::Error>(self) -> Result<WireExpression, E> {
                Ok(WireExpression::Literal(WireLiteral::Null))
            }

            fn visit_none<E: de::Error>(self) -> Result<WireExpression, E> {
                Ok(WireExpression::Literal(WireLiteral::Null))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<WireExpression, A::Error> {
                const E: &str = "expression operands";
                let opcode: u8 = field(&mut seq, 0, E)?;
                let expression = match opcode {
                    op::GET_FREE => WireExpression::GetFree {
                        name: field(&mut seq, 1, E)?,
                        tail: field(&mut seq, 2, E)?,
                    },
                    op::GET_LOCAL => WireExpression::GetLocal {
                        slot: field(&mut seq, 1, E)?,
                        tail: field(&mut seq, 2, E)?,
                    },
                    op::GET_NAMED => WireExpression::GetNamed {
                        slot: field(&mut seq, 1, E)?,
                        tail: field(&mut seq, 2, E)?,
                    },
                    op::GET_THIS => WireExpression::GetThis {
                        tail: field(&mut seq, 1, E)?,
                    },
                    op::CALL => WireExpression::Call {
                        name: field(&mut seq, 1, E)?,
                        params: field(&mut seq, 2, E)?,
                        hash: field(&mut seq, 3, E)?,
                    },
                    op::CONCAT => WireExpression::Concat(field(&mut seq, 1, E)?),
                    op::HAS_BLOCK => WireExpression::HasBlock(field(&mut seq, 1, E)?),
                    other => {
                        return Err(de::Error::invalid_value(
                            de::Unexpected::Unsigned(other as u64),
                            &"an expression opcode (20-26)",
                        ))
                    }
                };
                Ok(expression)
            }
        }

        deserializer.deserialize_any(ExpressionVisitor)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn get_free(name: &str) -> WireExpression {
        WireExpression::GetFree {
            name: name.to_string(),
            tail: Vec::new(),
        }
    }

    #[test]
    fn statements_serialize_as_opcode_arrays() {
        let statements = vec![
            WireStatement::OpenElement("div".into()),
            WireStatement::StaticAttr {
                name: "class".into(),
                value: "a".into(),
                namespace: None,
            },
            WireStatement::FlushElement,
            WireStatement::Append(get_free("title")),
            WireStatement::CloseElement,
        ];
        let json = serde_json::to_string(&statements).unwrap();
        assert_eq!(
            json,
            r#"[[7,"div"],[10,"class","a",null],[8],[1,[20,"title",[]]],[9]]"#
        );
    }

    #[test]
    fn literals_are_inline() {
        let call = WireExpression::Call {
            name: "concat".into(),
            params: Some(vec![
                WireExpression::Literal(WireLiteral::String("a".into())),
                WireExpression::Literal(WireLiteral::Number(1.0)),
                WireExpression::Literal(WireLiteral::Number(1.5)),
                WireExpression::Literal(WireLiteral::Boolean(true)),
                WireExpression::Literal(WireLiteral::Null),
            ]),
            hash: None,
        };
        let json = serde_json::to_string(&call).unwrap();
        assert_eq!(json, r#"[24,"concat",["a",1,1.5,true,null],null]"#);
        let back: WireExpression = serde_json::from_str(&json).unwrap();
        assert_eq!(back, call);
    }

    #[test]
    fn negative_zero_keeps_its_sign() {
        let literal = WireExpression::Literal(WireLiteral::Number(-0.0));
        let json = serde_json::to_string(&literal).unwrap();
        assert_eq!(json, "-0.0");
        match serde_json::from_str::<WireExpression>(&json).unwrap() {
            WireExpression::Literal(WireLiteral::Number(n)) => assert!(n == 0.0 && n.is_sign_negative()),
            other => panic!("expected a number literal, got {other:?}"),
        }

        let zero = serde_json::to_string(&WireExpression::Literal(WireLiteral::Number(0.0))).unwrap();
        assert_eq!(zero, "0");
    }

    #[test]
    fn splatting_is_found_in_nested_blocks() {
        let mut template = WireTemplate {
            id: "abcdefgh".into(),
            block: SerializedTemplateBlock {
                statements: vec![WireStatement::OpenElement("div".into()), WireStatement::FlushElement],
                ..Default::default()
            },
            meta: None,
        };
        assert!(!template.splats_attributes());

        template.block.blocks.push(SerializedBlock {
            statements: vec![WireStatement::Component {
                tag: "Inner".into(),
                attrs: vec![WireStatement::AttrSplat],
                args: None,
                block: None,
            }],
            parameters: Vec::new(),
        });
        assert!(template.splats_attributes());
    }

    #[test]
    fn hash_serializes_as_keys_then_values() {
        let mut hash = WireHash::new();
        hash.push("key", WireExpression::Literal(WireLiteral::String("id".into())));
        let block = WireStatement::Block {
            name: "each".into(),
            params: Some(vec![WireExpression::GetThis {
                tail: vec!["items".into()],
            }]),
            hash: Some(hash),
            program: Some(0),
            inverse: None,
        };
        let json = serde_json::to_string(&block).unwrap();
        assert_eq!(json, r#"[5,"each",[[23,["items"]]],[["key"],["id"]],0,null]"#);
    }

    #[test]
    fn unknown_opcodes_are_rejected() {
        assert!(serde_json::from_str::<WireStatement>("[99]").is_err());
        assert!(serde_json::from_str::<WireExpression>("[3, \"x\"]").is_err());
        assert!(serde_json::from_str::<WireStatement>("[0]").is_err());
    }

    #[test]
    fn template_block_uses_camel_case() {
        let block = SerializedTemplateBlock {
            statements: vec![WireStatement::Text("hi".into())],
            ..Default::default()
        };
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains("\"hasEval\":false"));
        assert!(json.starts_with(r#"{"statements":[[0,"hi"]]"#));
    }

    #[test]
    fn meta_is_omitted_when_absent() {
        let template = WireTemplate {
            id: "abcdefgh".into(),
            block: SerializedTemplateBlock::default(),
            meta: None,
        };
        let json = template.to_json().unwrap();
        assert!(!json.contains("meta"));

        let with_meta = WireTemplate {
            meta: Some(TemplateMeta::module("template/hello")),
            ..template
        };
        let json = with_meta.to_json().unwrap();
        assert!(json.contains(r#""meta":{"moduleName":"template/hello"}"#));
    }

    #[test]
    fn msgpack_matches_json_structure() {
        let template = WireTemplate {
            id: "abcdefgh".into(),
            block: SerializedTemplateBlock {
                statements: vec![
                    WireStatement::Yield {
                        to: 0,
                        params: Some(vec![WireExpression::GetNamed {
                            slot: 0,
                            tail: vec!["x".into()],
                        }]),
                    },
                    WireStatement::TrustingAppend(WireExpression::Concat(vec![
                        WireExpression::Literal(WireLiteral::String("<b>".into())),
                        WireExpression::HasBlock(0),
                    ])),
                ],
                named: vec!["@a".into()],
                yields: vec!["&default".into()],
                ..Default::default()
            },
            meta: Some(TemplateMeta::default()),
        };
        let bytes = template.to_msgpack().unwrap();
        assert_eq!(WireTemplate::from_msgpack(&bytes).unwrap(), template);
    }
}
