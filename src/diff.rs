//! Change detection between two snapshots

use serde_json::{Number, Value};

use crate::data::Snapshot;

/// Returns `true` if any of `fields` differs between `old` and `new`
///
/// Numbers compare by value, so `5` and `5.0` are equal. Values of different
/// types never match: `5` and `"5"` differ. A field present on one side and
/// missing on the other counts as a change; a field missing on both sides
/// does not.
pub fn changed<S: AsRef<str>>(fields: &[S], old: &Snapshot, new: &Snapshot) -> bool {
    fields.iter().any(|field| {
        let field = field.as_ref();
        match (old.get(field), new.get(field)) {
            (Some(a), Some(b)) => !same_value(a, b),
            (None, None) => false,
            _ => true,
        }
    })
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => same_number(a, b),
        _ => a == b,
    }
}

fn same_number(a: &Number, b: &Number) -> bool {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
        return a == b;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
