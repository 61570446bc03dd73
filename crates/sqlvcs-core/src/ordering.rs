//! Apply-order sorting for translated change lists.
//!
//! Coarse order by object class (types and sequences before tables, tables
//! before modules, views after procedures, triggers last), then a
//! topological pass inside the table bucket (foreign-key references) and
//! the view bucket (definition references). Cycles are exceptional in FK
//! graphs and fatal here.

use std::collections::HashMap;
use std::sync::OnceLock;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use regex::Regex;

use crate::domain::{DbObject, ObjectType};
use crate::error::{Result, SyncError};

fn references_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bREFERENCES\s+(?:\[(\w+)\]|(\w+))\s*\.\s*(?:\[(\w+)\]|(\w+))")
            .expect("static regex")
    })
}

/// Sort changes into safe apply order. Consumes and returns the list.
pub fn order_for_apply(changes: Vec<DbObject>) -> Result<Vec<DbObject>> {
    let mut buckets: Vec<Vec<DbObject>> = vec![Vec::new(); 9];
    for change in changes {
        buckets[change.key.object_type.apply_rank() as usize].push(change);
    }
    for bucket in &mut buckets {
        bucket.sort_by(|a, b| (&a.key.schema, &a.key.name).cmp(&(&b.key.schema, &b.key.name)));
    }

    let table_rank = ObjectType::Table.apply_rank() as usize;
    let view_rank = ObjectType::View.apply_rank() as usize;

    let tables = std::mem::take(&mut buckets[table_rank]);
    buckets[table_rank] = sort_tables(tables)?;

    let views = std::mem::take(&mut buckets[view_rank]);
    buckets[view_rank] = sort_views(views)?;

    Ok(buckets.into_iter().flatten().collect())
}

/// Referenced tables come before their referencers, so FK creation never
/// races table creation within one apply.
fn sort_tables(tables: Vec<DbObject>) -> Result<Vec<DbObject>> {
    topo_by(tables, |object, qualified_names| {
        let Some(definition) = object.definition.as_deref() else {
            return Vec::new();
        };
        references_re()
            .captures_iter(definition)
            .filter_map(|caps| {
                let schema = caps.get(1).or_else(|| caps.get(2))?.as_str().to_lowercase();
                let name = caps.get(3).or_else(|| caps.get(4))?.as_str().to_lowercase();
                let qualified = format!("{schema}.{name}");
                qualified_names.get(&qualified).copied()
            })
            .collect()
    })
}

/// A view mentioning another view's name depends on it.
fn sort_views(views: Vec<DbObject>) -> Result<Vec<DbObject>> {
    topo_by(views, |object, qualified_names| {
        let Some(definition) = object.definition.as_deref() else {
            return Vec::new();
        };
        let lowered = definition.to_lowercase();
        qualified_names
            .iter()
            .filter(|(qualified, _)| {
                let (_, name) = qualified.split_once('.').unwrap_or(("", qualified));
                name != object.key.name.as_str() && contains_word(&lowered, name)
            })
            .map(|(_, idx)| *idx)
            .collect()
    })
}

/// Topological sort of one bucket. `dependencies` returns, for each object,
/// the indices (into the bucket) of objects it depends on.
fn topo_by<F>(objects: Vec<DbObject>, dependencies: F) -> Result<Vec<DbObject>>
where
    F: Fn(&DbObject, &HashMap<String, usize>) -> Vec<usize>,
{
    if objects.len() <= 1 {
        return Ok(objects);
    }

    let qualified_names: HashMap<String, usize> = objects
        .iter()
        .enumerate()
        .map(|(i, o)| (format!("{}.{}", o.key.schema, o.key.name), i))
        .collect();

    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..objects.len()).map(|i| graph.add_node(i)).collect();

    for (i, object) in objects.iter().enumerate() {
        for dep in dependencies(object, &qualified_names) {
            if dep != i {
                graph.add_edge(nodes[dep], nodes[i], ());
            }
        }
    }

    let sorted = toposort(&graph, None).map_err(|cycle| {
        let index = graph[cycle.node_id()];
        SyncError::DependencyCycle(objects[index].key.to_string())
    })?;

    let mut taken: Vec<Option<DbObject>> = objects.into_iter().map(Some).collect();
    Ok(sorted
        .into_iter()
        .filter_map(|node| taken[graph[node]].take())
        .collect())
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    let bytes = haystack.as_bytes();
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        let start = from + pos;
        let end = start + needle.len();
        let left_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        let right_ok = end >= bytes.len() || !is_word_byte(bytes[end]);
        if left_ok && right_ok {
            return true;
        }
        from = start + 1;
    }
    false
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
