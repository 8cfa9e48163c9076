//! `batchpass-diff` — structural equivalence of JSON documents.
//!
//! Work functions use this as an oracle: two documents are equivalent when
//! they hold the same data, regardless of object key order or of how a number
//! was written (`42` and `42.0` are equal). In [`Mode::Unordered`] arrays are
//! compared as multisets.

pub mod path;

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::{Number, Value};

pub use path::{Path, Segment};

/// How arrays are compared.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Mode {
    /// Element `i` on the left is compared with element `i` on the right.
    #[default]
    Ordered,
    /// Every element must find a distinct equivalent partner on the other side.
    ///
    /// Arrays are compared as multisets, not sets: duplicates count, so
    /// `[1, 1, 2]` and `[1, 2]` differ.
    Unordered,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiffKind {
    /// Both sides hold a value at this path, and the values differ.
    Changed { left: Value, right: Value },
    /// Only the left document holds a value at this path.
    Missing(Value),
    /// Only the right document holds a value at this path.
    Extra(Value),
}

/// One difference between two documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Difference {
    pub path: Path,
    pub kind: DiffKind,
}

/// True when `left` and `right` hold the same data under `mode`.
pub fn equivalent(left: &Value, right: &Value, mode: Mode) -> bool {
    match (left, right) {
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, lv)| b.get(k).is_some_and(|rv| equivalent(lv, rv, mode)))
        }
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                return false;
            }
            match mode {
                Mode::Ordered => a.iter().zip(b).all(|(l, r)| equivalent(l, r, mode)),
                Mode::Unordered => {
                    let (left_only, right_only) = match_unordered(a, b);
                    left_only.is_empty() && right_only.is_empty()
                }
            }
        }
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
        _ => left == right,
    }
}

/// Serialize both values and compare them with [`equivalent`].
pub fn equivalent_serialized<A, B>(left: &A, right: &B, mode: Mode) -> Result<bool, serde_json::Error>
where
    A: Serialize + ?Sized,
    B: Serialize + ?Sized,
{
    let left = serde_json::to_value(left)?;
    let right = serde_json::to_value(right)?;
    Ok(equivalent(&left, &right, mode))
}

/// Every difference between `left` and `right`. Empty exactly when they are
/// [`equivalent`].
pub fn diff(left: &Value, right: &Value, mode: Mode) -> Vec<Difference> {
    let mut out = Vec::new();
    walk(left, right, mode, &mut Path::root(), &mut out);
    out
}

/// Render differences in hunk form, one hunk per difference:
///
/// ```text
/// @ ["user","address","zip"]
/// - 10001
/// + 10002
/// ```
pub fn render(differences: &[Difference]) -> String {
    let mut out = String::new();
    for d in differences {
        let _ = writeln!(out, "@ {}", d.path);
        match &d.kind {
            DiffKind::Changed { left, right } => {
                let _ = writeln!(out, "- {left}");
                let _ = writeln!(out, "+ {right}");
            }
            DiffKind::Missing(left) => {
                let _ = writeln!(out, "- {left}");
            }
            DiffKind::Extra(right) => {
                let _ = writeln!(out, "+ {right}");
            }
        }
    }
    out
}

fn walk(left: &Value, right: &Value, mode: Mode, path: &mut Path, out: &mut Vec<Difference>) {
    match (left, right) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, lv) in a {
                path.push(Segment::Key(key.clone()));
                match b.get(key) {
                    Some(rv) => walk(lv, rv, mode, path, out),
                    None => out.push(Difference {
                        path: path.clone(),
                        kind: DiffKind::Missing(lv.clone()),
                    }),
                }
                path.pop();
            }
            for (key, rv) in b.iter().filter(|(k, _)| !a.contains_key(*k)) {
                path.push(Segment::Key(key.clone()));
                out.push(Difference {
                    path: path.clone(),
                    kind: DiffKind::Extra(rv.clone()),
                });
                path.pop();
            }
        }
        (Value::Array(a), Value::Array(b)) => match mode {
            Mode::Ordered => {
                for i in 0..a.len().max(b.len()) {
                    path.push(Segment::Index(i));
                    match (a.get(i), b.get(i)) {
                        (Some(lv), Some(rv)) => walk(lv, rv, mode, path, out),
                        (Some(lv), None) => out.push(Difference {
                            path: path.clone(),
                            kind: DiffKind::Missing(lv.clone()),
                        }),
                        (None, Some(rv)) => out.push(Difference {
                            path: path.clone(),
                            kind: DiffKind::Extra(rv.clone()),
                        }),
                        (None, None) => {}
                    }
                    path.pop();
                }
            }
            Mode::Unordered => {
                let (left_only, right_only) = match_unordered(a, b);
                for i in left_only {
                    path.push(Segment::Index(i));
                    out.push(Difference {
                        path: path.clone(),
                        kind: DiffKind::Missing(a[i].clone()),
                    });
                    path.pop();
                }
                for j in right_only {
                    path.push(Segment::Index(j));
                    out.push(Difference {
                        path: path.clone(),
                        kind: DiffKind::Extra(b[j].clone()),
                    });
                    path.pop();
                }
            }
        },
        _ if equivalent(left, right, mode) => {}
        _ => out.push(Difference {
            path: path.clone(),
            kind: DiffKind::Changed {
                left: left.clone(),
                right: right.clone(),
            },
        }),
    }
}

/// Pair each left element with the first unused equivalent right element.
/// Returns the indices left unpaired on each side.
fn match_unordered(a: &[Value], b: &[Value]) -> (Vec<usize>, Vec<usize>) {
    let mut used = vec![false; b.len()];
    let mut left_only = Vec::new();

    for (i, lv) in a.iter().enumerate() {
        let partner = (0..b.len()).find(|&j| !used[j] && equivalent(lv, &b[j], Mode::Unordered));
        match partner {
            Some(j) => used[j] = true,
            None => left_only.push(i),
        }
    }

    let right_only = used
        .iter()
        .enumerate()
        .filter(|(_, used)| !**used)
        .map(|(j, _)| j)
        .collect();

    (left_only, right_only)
}

/// Integers compare exactly, also against floats with no fractional part.
/// Two floats compare as `f64`.
fn numbers_equal(a: &Number, b: &Number) -> bool {
    match (integer(a), integer(b)) {
        (Some(x), Some(y)) => x == y,
        (Some(x), None) => b.as_f64().is_some_and(|f| float_is_integer(f, x)),
        (None, Some(y)) => a.as_f64().is_some_and(|f| float_is_integer(f, y)),
        (None, None) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

fn float_is_integer(f: f64, i: i128) -> bool {
    // Integral f64 values inside the i128 range convert exactly.
    const LIMIT: f64 = 170_141_183_460_469_231_731_687_303_715_884_105_728.0;
    f.is_finite() && f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f) && f as i128 == i
}
