use crate::common::FIELD_SEPARATOR;
use serde_json::{Map, Value};

/// Resolves a dot separated path without fanning out over arrays.
///
/// Object segments are looked up by key and numeric segments index into
/// arrays. Returns `None` as soon as a segment cannot be followed.
pub fn resolve_path<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split(FIELD_SEPARATOR);
    let first = segments.next()?;
    let mut current = root.get(first)?;
    for segment in segments {
        current = step(current, segment)?;
    }
    Some(current)
}

fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Collects every value reachable through `path`, fanning out whenever a
/// non numeric segment meets an array.
///
/// `items.product_id` over `{"items": [{"product_id": 1}, {"product_id": 2}]}`
/// yields both ids. Leaf arrays are returned as is.
pub fn collect_path_values<'a>(root: &'a Value, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split(FIELD_SEPARATOR).collect();
    let mut out = Vec::new();
    collect_into(root, &segments, &mut out);
    out
}

fn collect_into<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(*head) {
                collect_into(child, rest, out);
            }
        }
        Value::Array(items) => match head.parse::<usize>() {
            Ok(index) => {
                if let Some(child) = items.get(index) {
                    collect_into(child, rest, out);
                }
            }
            Err(_) => {
                for item in items {
                    collect_into(item, segments, out);
                }
            }
        },
        _ => {}
    }
}

/// Visits every object that holds the last segment of `path`, fanning out over
/// arrays on the way down. The callback receives the parent object and the
/// last segment name.
pub fn visit_path_parents_mut<F>(root: &mut Value, path: &str, visitor: &mut F)
where
    F: FnMut(&mut Map<String, Value>, &str),
{
    let segments: Vec<&str> = path.split(FIELD_SEPARATOR).collect();
    visit_parents(root, &segments, visitor);
}

fn visit_parents<F>(value: &mut Value, segments: &[&str], visitor: &mut F)
where
    F: FnMut(&mut Map<String, Value>, &str),
{
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    match value {
        Value::Object(map) => {
            if rest.is_empty() {
                visitor(map, head);
            } else if let Some(child) = map.get_mut(*head) {
                visit_parents(child, rest, visitor);
            }
        }
        Value::Array(items) => match head.parse::<usize>() {
            Ok(index) if !rest.is_empty() => {
                if let Some(child) = items.get_mut(index) {
                    visit_parents(child, rest, visitor);
                }
            }
            _ => {
                for item in items.iter_mut() {
                    visit_parents(item, segments, visitor);
                }
            }
        },
        _ => {}
    }
}

/// Returns the last segment of a dot separated path.
pub fn last_segment(path: &str) -> &str {
    path.rsplit(FIELD_SEPARATOR).next().unwrap_or(path)
}
