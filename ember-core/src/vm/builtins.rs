//! Built-in helpers: `concat`, `if`, `unless`, `array`, `hash`, `get`.

use super::arguments::Arguments;
use super::definitions::FnHelper;
use crate::reactive::Runtime;
use crate::value::{TrackedObject, Value};

pub(crate) fn helpers() -> Vec<(&'static str, FnHelper)> {
    vec![
        ("concat", FnHelper::new(concat)),
        ("if", FnHelper::new(inline_if)),
        ("unless", FnHelper::new(inline_unless)),
        ("array", FnHelper::new(array)),
        ("hash", FnHelper::new(hash)),
        ("get", FnHelper::new(get)),
    ]
}

fn concat(_: &Runtime, args: &Arguments) -> Result<Value, String> {
    let joined: String = args.positional().iter().map(Value::to_display_string).collect();
    Ok(Value::from(joined))
}

fn inline_if(_: &Runtime, args: &Arguments) -> Result<Value, String> {
    if args.is_empty() {
        return Err("`if` requires a condition".to_string());
    }
    Ok(if args.at(0).is_truthy() { args.at(1) } else { args.at(2) })
}

fn inline_unless(_: &Runtime, args: &Arguments) -> Result<Value, String> {
    if args.is_empty() {
        return Err("`unless` requires a condition".to_string());
    }
    Ok(if args.at(0).is_truthy() { args.at(2) } else { args.at(1) })
}

fn array(_: &Runtime, args: &Arguments) -> Result<Value, String> {
    Ok(Value::list(args.positional().iter().cloned()))
}

fn hash(_: &Runtime, args: &Arguments) -> Result<Value, String> {
    let object: TrackedObject = args
        .named_args()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Ok(Value::Object(object))
}

/// `(get object "dotted.path")`
fn get(runtime: &Runtime, args: &Arguments) -> Result<Value, String> {
    if args.len() != 2 {
        return Err(format!("`get` takes 2 arguments, got {}", args.len()));
    }
    let path = args.at(1).to_display_string();
    Ok(path
        .split('.')
        .fold(args.at(0), |value, key| value.get_property(runtime, key)))
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    fn positional(values: Vec<Value>) -> Arguments {
        Arguments::new(values, IndexMap::new())
    }

    #[test]
    fn concat_joins_display_strings() {
        let rt = Runtime::new();
        let args = positional(vec!["a".into(), 1.into(), Value::Null, true.into()]);
        assert_eq!(concat(&rt, &args).unwrap(), Value::from("a1true"));
    }

    #[test]
    fn inline_conditionals() {
        let rt = Runtime::new();
        let yes = positional(vec![true.into(), "y".into(), "n".into()]);
        let no = positional(vec![0.into(), "y".into()]);
        assert_eq!(inline_if(&rt, &yes).unwrap(), Value::from("y"));
        assert_eq!(inline_if(&rt, &no).unwrap(), Value::Null);
        assert_eq!(inline_unless(&rt, &no).unwrap(), Value::from("y"));
        assert!(inline_if(&rt, &Arguments::default()).is_err());
    }

    #[test]
    fn hash_and_get() {
        let rt = Runtime::new();
        let mut named = IndexMap::new();
        named.insert("inner".to_string(), Value::Object([("x", Value::from(7))].into_iter().collect()));
        let object = hash(&rt, &Arguments::new(vec![], named)).unwrap();

        let args = positional(vec![object, "inner.x".into()]);
        assert_eq!(get(&rt, &args).unwrap(), Value::from(7));
        assert!(get(&rt, &positional(vec![])).is_err());
    }

    #[test]
    fn array_collects_positional() {
        let rt = Runtime::new();
        let list = array(&rt, &positional(vec![1.into(), 2.into()])).unwrap();
        assert_eq!(list.items().len(), 2);
    }
}
