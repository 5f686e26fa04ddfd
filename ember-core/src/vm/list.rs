//! `{{#each}}`
//!
//! Every item renders into its own child block, keyed by `@identity` (the
//! default), `@index` or a property path given as `key="..."`. When the
//! list changes, blocks are matched to the new items by key: matches are
//! kept (their item and index cells updated in place) and moved if their
//! position changed, unmatched old blocks are torn down and new keys are
//! rendered where they belong. Duplicate keys are made unique by
//! occurrence.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use super::bounds::{BlockBounds, BoundsEnd};
use super::environment::Environment;
use super::interpreter::Interpreter;
use super::opcodes::{Branch, ChildBlock, Snapshot};
use crate::dom::{NodeId, TreeBuilder};
use crate::error::RenderError;
use crate::reactive::{Reference, Runtime};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ListKey {
    Index,
    Identity,
    Path(Vec<String>),
}

impl ListKey {
    pub fn parse(key: Option<&str>) -> Self {
        match key {
            None | Some("@identity") => ListKey::Identity,
            Some("@index") => ListKey::Index,
            Some(path) => ListKey::Path(path.split('.').map(str::to_string).collect()),
        }
    }

    fn key_for(&self, runtime: &Runtime, item: &Value, index: usize) -> KeyBase {
        match self {
            ListKey::Index => KeyBase::Text(index.to_string()),
            ListKey::Identity => match item.identity_key() {
                Some(text) => KeyBase::Text(text),
                None => KeyBase::Shared(item.clone()),
            },
            ListKey::Path(path) => KeyBase::Text(
                path.iter()
                    .fold(item.clone(), |value, key| value.get_property(runtime, key))
                    .to_display_string(),
            ),
        }
    }

    /// One unique key per item.
    pub fn keys(&self, runtime: &Runtime, items: &[Value]) -> Vec<ItemKey> {
        let mut seen: HashMap<KeyBase, usize> = HashMap::new();
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let base = self.key_for(runtime, item, index);
                let count = seen.entry(base.clone()).or_insert(0);
                *count += 1;
                ItemKey {
                    base,
                    occurrence: *count - 1,
                }
            })
            .collect()
    }
}

/// The key of one rendered item, with repeats told apart by occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ItemKey {
    base: KeyBase,
    occurrence: usize,
}

impl ItemKey {
    #[cfg(test)]
    fn text(text: &str) -> Self {
        Self {
            base: KeyBase::Text(text.to_string()),
            occurrence: 0,
        }
    }
}

/// Lists and objects keyed by identity hold the value itself, so the
/// allocation they compare by stays alive, and cannot be reused by a new
/// item, for as long as the key does.
#[derive(Debug, Clone)]
enum KeyBase {
    Text(String),
    Shared(Value),
}

impl PartialEq for KeyBase {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (KeyBase::Text(a), KeyBase::Text(b)) => a == b,
            (KeyBase::Shared(a), KeyBase::Shared(b)) => a.allocation() == b.allocation(),
            _ => false,
        }
    }
}

impl Eq for KeyBase {}

impl Hash for KeyBase {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            KeyBase::Text(text) => text.hash(state),
            KeyBase::Shared(value) => value.allocation().hash(state),
        }
    }
}

/// Read the list and compute its keys in one tracking frame, so key
/// properties are dependencies too.
fn observe(runtime: &Runtime, list: &Reference, key: &ListKey) -> Result<(Value, Vec<ItemKey>, Snapshot), RenderError> {
    let (result, tag) = runtime.track(|| {
        list.value().map(|value| {
            let keys = key.keys(runtime, value.items());
            (value, keys)
        })
    });
    let (value, keys) = result?;
    Ok((value, keys, Snapshot::capture(runtime, tag)))
}

#[derive(Debug)]
struct ListItem {
    key: ItemKey,
    item: Reference,
    index: Reference,
    block: ChildBlock,
}

impl ListItem {
    fn render(
        interpreter: &mut Interpreter<'_>,
        program: &Branch,
        key: ItemKey,
        value: Value,
        index: usize,
    ) -> Result<Self, RenderError> {
        let runtime = interpreter.env().runtime();
        let item = Reference::cell(runtime, value);
        let index_ref = Reference::cell(runtime, index);
        let block = interpreter.child_block(Some(program), vec![item.clone(), index_ref.clone()])?;
        Ok(Self {
            key,
            item,
            index: index_ref,
            block,
        })
    }
}

#[derive(Debug)]
pub(crate) struct ListOpcode {
    list: Reference,
    key: ListKey,
    snapshot: Snapshot,
    program: Branch,
    inverse: Option<Branch>,
    bounds: Rc<BlockBounds>,
    items: Vec<ListItem>,
    empty: Option<ChildBlock>,
}

impl ListOpcode {
    /// Initial render at the interpreter's cursor.
    pub fn render(
        interpreter: &mut Interpreter<'_>,
        list: Reference,
        key: ListKey,
        program: Branch,
        inverse: Option<Branch>,
    ) -> Result<Self, RenderError> {
        let (value, keys, snapshot) = observe(interpreter.env().runtime(), &list, &key)?;
        let bounds = interpreter.push_block();

        let mut items = Vec::with_capacity(keys.len());
        let mut empty = None;
        if keys.is_empty() {
            empty = Some(interpreter.child_block(inverse.as_ref(), Vec::new())?);
        } else {
            for (index, (item, key)) in value.items().iter().zip(keys).enumerate() {
                items.push(ListItem::render(interpreter, &program, key, item.clone(), index)?);
            }
        }
        interpreter.pop_block()?;
        trace!(items = items.len(), "rendered list");

        Ok(Self {
            list,
            key,
            snapshot,
            program,
            inverse,
            bounds,
            items,
            empty,
        })
    }

    pub fn evaluate(&mut self, env: &Environment, dom: &mut dyn TreeBuilder) -> Result<(), RenderError> {
        let runtime = env.runtime();
        if !self.snapshot.is_valid(runtime) {
            let (value, keys, snapshot) = observe(runtime, &self.list, &self.key)?;
            self.sync(env, dom, value.items(), keys)?;
            self.snapshot = snapshot;
            return Ok(());
        }
        for item in &mut self.items {
            item.block.evaluate(env, dom)?;
        }
        if let Some(empty) = &mut self.empty {
            empty.evaluate(env, dom)?;
        }
        Ok(())
    }

    pub fn destroy(&mut self, dom: &mut dyn TreeBuilder) {
        for item in &mut self.items {
            item.block.destroy(dom);
        }
        if let Some(empty) = &mut self.empty {
            empty.destroy(dom);
        }
    }

    fn sync(
        &mut self,
        env: &Environment,
        dom: &mut dyn TreeBuilder,
        values: &[Value],
        keys: Vec<ItemKey>,
    ) -> Result<(), RenderError> {
        let parent = self.bounds.parent();
        let namespace = self.bounds.namespace();
        let after = self.bounds.last_node().and_then(|last| dom.next_sibling(last));

        if keys.is_empty() {
            let removed = self.items.len();
            for mut item in self.items.drain(..) {
                item.block.teardown(dom);
            }
            let empty = match self.empty.take() {
                Some(mut empty) => {
                    empty.evaluate(env, dom)?;
                    empty
                }
                None => Interpreter::at(env, dom, parent, after, namespace)
                    .child_block(self.inverse.as_ref(), Vec::new())?,
            };
            let end = BoundsEnd::Block(empty.bounds().clone());
            self.bounds.set(end.clone(), end);
            self.empty = Some(empty);
            trace!(removed, "list emptied");
            return Ok(());
        }

        let mut before: Option<NodeId> = after;
        if let Some(mut empty) = self.empty.take() {
            before = empty.teardown(dom);
        }

        let wanted: HashSet<&ItemKey> = keys.iter().collect();
        let mut old: IndexMap<ItemKey, ListItem> = IndexMap::with_capacity(self.items.len());
        let mut removed = 0;
        for mut item in self.items.drain(..) {
            if wanted.contains(&item.key) {
                old.insert(item.key.clone(), item);
            } else {
                item.block.teardown(dom);
                removed += 1;
            }
        }

        let runtime = env.runtime();
        let (mut kept, mut moved) = (0, 0);
        let mut items = Vec::with_capacity(keys.len());
        for index in (0..keys.len()).rev() {
            let value = values.get(index).cloned().unwrap_or_default();
            let item = match old.swap_remove(&keys[index]) {
                Some(mut item) => {
                    let next = item.block.bounds().last_node().and_then(|last| dom.next_sibling(last));
                    if next != before {
                        item.block.move_before(dom, before);
                        moved += 1;
                    }
                    item.item.update(value)?;
                    item.index.update(index)?;
                    item.block.evaluate(env, dom)?;
                    kept += 1;
                    item
                }
                None => {
                    let mut interpreter = Interpreter::at(env, dom, parent, before, namespace);
                    ListItem::render(&mut interpreter, &self.program, keys[index].clone(), value, index)?
                }
            };
            before = item.block.bounds().first_node();
            items.push(item);
        }
        items.reverse();

        if let (Some(first), Some(last)) = (items.first(), items.last()) {
            self.bounds.set(
                BoundsEnd::Block(first.block.bounds().clone()),
                BoundsEnd::Block(last.block.bounds().clone()),
            );
        }
        trace!(
            kept,
            moved,
            removed,
            added = items.len() - kept,
            revision = runtime.current_revision(),
            "list synced"
        );
        self.items = items;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TrackedObject;

    #[test]
    fn key_parsing() {
        assert_eq!(ListKey::parse(None), ListKey::Identity);
        assert_eq!(ListKey::parse(Some("@identity")), ListKey::Identity);
        assert_eq!(ListKey::parse(Some("@index")), ListKey::Index);
        assert_eq!(
            ListKey::parse(Some("user.id")),
            ListKey::Path(vec!["user".into(), "id".into()])
        );
    }

    #[test]
    fn duplicate_keys_are_made_unique() {
        let rt = Runtime::new();
        let items = [Value::from("a"), Value::from("b"), Value::from("a"), Value::from("a")];
        let keys = ListKey::Identity.keys(&rt, &items);
        let unique: HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), 4);
        assert_eq!(keys[0], ItemKey::text("s:a"));
    }

    #[test]
    fn objects_key_by_the_allocation_they_hold() {
        let rt = Runtime::new();
        let row = || Value::Object([("id", Value::from(1))].into_iter().collect::<TrackedObject>());
        let (a, b) = (row(), row());
        let keys = ListKey::Identity.keys(&rt, &[a.clone(), b, a.clone()]);
        assert_ne!(keys[0], keys[1]);
        assert_eq!(keys[0].base, keys[2].base);
        assert_eq!(ListKey::Identity.keys(&rt, &[a])[0], keys[0]);

        let shared: Rc<[Value]> = Rc::from(vec![Value::from(1)]);
        let keys = ListKey::Identity.keys(&rt, &[Value::List(shared.clone())]);
        assert_eq!(Rc::strong_count(&shared), 2);
        drop(keys);
        assert_eq!(Rc::strong_count(&shared), 1);
    }

    #[test]
    fn path_keys_read_properties() {
        let rt = Runtime::new();
        let items: Vec<Value> = [1, 2]
            .into_iter()
            .map(|id| Value::Object([("id", Value::from(id))].into_iter().collect::<TrackedObject>()))
            .collect();
        assert_eq!(
            ListKey::parse(Some("id")).keys(&rt, &items),
            vec![ItemKey::text("1"), ItemKey::text("2")]
        );
        assert_eq!(ListKey::Index.keys(&rt, &items), vec![ItemKey::text("0"), ItemKey::text("1")]);
    }
}
