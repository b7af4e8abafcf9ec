// SPDX-FileCopyrightText: openot contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The Text OT algebra: a Retain/Insert/Delete operation calculus over
//! Unicode-scalar-value sequences, with the `apply`/`compose`/`transform`
//! operators required for the convergence property (TP1) that makes OT work.
//!
//! Every operator below goes through [`Operation::push`], the normalizing
//! appender, so results are always canonical: no empty components, and no
//! two adjacent components of the same kind.

use crate::error::OtError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A single step of an [`Operation`]: pass through, insert, or remove a run
/// of Unicode scalar values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    /// Pass through `n` units of the snapshot unchanged. `n` must be > 0 in
    /// a normalized operation.
    Retain(usize),
    /// Insert a nonempty string.
    Insert(String),
    /// Remove `n` units of the snapshot. `n` must be > 0 in a normalized
    /// operation.
    Delete(usize),
}

impl Component {
    fn is_empty(&self) -> bool {
        match self {
            Self::Retain(n) | Self::Delete(n) => *n == 0,
            Self::Insert(s) => s.is_empty(),
        }
    }

    const fn kind(&self) -> u8 {
        match self {
            Self::Retain(_) => 0,
            Self::Insert(_) => 1,
            Self::Delete(_) => 2,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ComponentWire {
    #[serde(rename = "r", skip_serializing_if = "Option::is_none")]
    r: Option<usize>,
    #[serde(rename = "i", skip_serializing_if = "Option::is_none")]
    i: Option<String>,
    #[serde(rename = "d", skip_serializing_if = "Option::is_none")]
    d: Option<usize>,
}

impl Serialize for Component {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Retain(n) => ComponentWire {
                r: Some(*n),
                i: None,
                d: None,
            },
            Self::Insert(s) => ComponentWire {
                r: None,
                i: Some(s.clone()),
                d: None,
            },
            Self::Delete(n) => ComponentWire {
                r: None,
                i: None,
                d: Some(*n),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Component {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = ComponentWire::deserialize(deserializer)?;
        match (wire.r, wire.i, wire.d) {
            (Some(n), None, None) => Ok(Self::Retain(n)),
            (None, Some(s), None) => Ok(Self::Insert(s)),
            (None, None, Some(n)) => Ok(Self::Delete(n)),
            _ => Err(serde::de::Error::custom(
                "a component must have exactly one of `r`, `i`, `d`",
            )),
        }
    }
}

/// Which operand of a [`transform`] wins a positional tie between two
/// inserts at the same point. See the module-level discussion in the
/// client and server: the client's own pending op is `Left` against an
/// incoming remote op, and `Right` when being rewritten to follow it; the
/// server's committed history is always the `Left`/priority side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// An ordered sequence of [`Component`]s describing an edit of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Operation(pub Vec<Component>);

/// Whether [`apply`] tolerates an operation shorter than its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPolicy {
    /// An untraversed tail is copied through unchanged, as an implicit
    /// final retain. Matches the behavior of long-lived on-disk operations
    /// that predate a later, stricter client.
    Lenient,
    /// An untraversed tail is a hard error. Prefer this when validating
    /// operations from a client you don't fully trust.
    Strict,
}

impl Operation {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a component through the normalizing appender: merges with
    /// an adjacent component of the same kind, drops it if it would be
    /// empty.
    fn push(&mut self, component: Component) {
        if component.is_empty() {
            return;
        }
        if let Some(last) = self.0.last_mut() {
            let merged = match (last, &component) {
                (Component::Retain(a), Component::Retain(b)) => {
                    *a += b;
                    true
                }
                (Component::Insert(a), Component::Insert(b)) => {
                    a.push_str(b);
                    true
                }
                (Component::Delete(a), Component::Delete(b)) => {
                    *a += b;
                    true
                }
                _ => false,
            };
            if merged {
                return;
            }
        }
        self.0.push(component);
    }

    pub fn retain(&mut self, n: usize) -> &mut Self {
        self.push(Component::Retain(n));
        self
    }

    pub fn insert(&mut self, s: impl Into<String>) -> &mut Self {
        self.push(Component::Insert(s.into()));
        self
    }

    pub fn delete(&mut self, n: usize) -> &mut Self {
        self.push(Component::Delete(n));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// An operation is normalized iff no component is empty and no two
    /// consecutive components share a kind.
    pub fn is_normalized(&self) -> bool {
        let mut prev_kind: Option<u8> = None;
        for component in &self.0 {
            if component.is_empty() {
                return false;
            }
            let kind = component.kind();
            if prev_kind == Some(kind) {
                return false;
            }
            prev_kind = Some(kind);
        }
        true
    }

    pub fn validate(&self) -> Result<(), OtError> {
        if self.is_normalized() {
            Ok(())
        } else {
            Err(OtError::OpMalformed)
        }
    }
}

impl FromIterator<Component> for Operation {
    fn from_iter<T: IntoIterator<Item = Component>>(iter: T) -> Self {
        let mut op = Self::new();
        for component in iter {
            op.push(component);
        }
        op
    }
}

/// Re-emits `op` through the normalizing appender. Idempotent: normalizing
/// an already-normalized operation returns it unchanged.
pub fn normalize(op: &Operation) -> Operation {
    op.0.iter().cloned().collect()
}

/// Applies `op` to `snapshot`, using the lenient tail policy (an
/// untraversed tail is copied through unchanged). See [`apply_with_policy`]
/// to opt into strict totality.
pub fn apply(snapshot: &str, op: &Operation) -> Result<String, OtError> {
    apply_with_policy(snapshot, op, ApplyPolicy::Lenient)
}

pub fn apply_with_policy(
    snapshot: &str,
    op: &Operation,
    policy: ApplyPolicy,
) -> Result<String, OtError> {
    let chars: Vec<char> = snapshot.chars().collect();
    let len = chars.len();
    let mut i = 0usize;
    let mut out = String::new();

    for component in &op.0 {
        match component {
            Component::Retain(n) => {
                let end = i.checked_add(*n).ok_or(OtError::OpOutOfBounds)?;
                if end > len {
                    return Err(OtError::OpOutOfBounds);
                }
                out.extend(chars[i..end].iter());
                i = end;
            }
            Component::Insert(s) => out.push_str(s),
            Component::Delete(n) => {
                let end = i.checked_add(*n).ok_or(OtError::OpOutOfBounds)?;
                if end > len {
                    return Err(OtError::OpOutOfBounds);
                }
                i = end;
            }
        }
    }

    if i < len {
        match policy {
            ApplyPolicy::Lenient => out.extend(chars[i..].iter()),
            ApplyPolicy::Strict => return Err(OtError::OpOutOfBounds),
        }
    }

    Ok(out)
}

/// Reduces the front of `deque` (known to be a `Retain` or `Delete`) by
/// `n`, dropping it entirely if it's now empty.
fn consume_front(deque: &mut VecDeque<Component>, n: usize) {
    match deque.pop_front() {
        Some(Component::Retain(k)) => {
            if k > n {
                deque.push_front(Component::Retain(k - n));
            }
        }
        Some(Component::Delete(k)) => {
            if k > n {
                deque.push_front(Component::Delete(k - n));
            }
        }
        other => unreachable!("consume_front called on {other:?}"),
    }
}

fn split_chars(s: &str, n: usize) -> (String, String) {
    let mut chars = s.chars();
    let taken: String = (&mut chars).take(n).collect();
    let rest: String = chars.collect();
    (taken, rest)
}

/// Produces an operation equivalent to applying `a` then `b`.
pub fn compose(a: &Operation, b: &Operation) -> Operation {
    let mut result = Operation::new();
    let mut ia: VecDeque<Component> = a.0.iter().cloned().collect();
    let mut ib: VecDeque<Component> = b.0.iter().cloned().collect();

    loop {
        match (ia.front().cloned(), ib.front().cloned()) {
            (None, None) => break,
            // Delete(k) | — : emit Delete(k), advance a. Takes priority
            // over every b case, including b's own Insert.
            (Some(Component::Delete(k)), _) => {
                result.delete(k);
                ia.pop_front();
            }
            // — | Insert(s): emit Insert(s), advance b.
            (_, Some(Component::Insert(s))) => {
                result.insert(s);
                ib.pop_front();
            }
            // a exhausted (implicit infinite retain) vs b's Retain/Delete:
            // copy b through.
            (None, Some(Component::Retain(m))) => {
                result.retain(m);
                ib.pop_front();
            }
            (None, Some(Component::Delete(m))) => {
                result.delete(m);
                ib.pop_front();
            }
            // b exhausted (implicit infinite retain) vs a's Retain/Insert:
            // copy a through. (a's Delete is already handled above.)
            (Some(Component::Retain(k)), None) => {
                result.retain(k);
                ia.pop_front();
            }
            (Some(Component::Insert(s)), None) => {
                result.insert(s);
                ia.pop_front();
            }
            (Some(Component::Retain(k)), Some(Component::Retain(m))) => {
                let min = k.min(m);
                result.retain(min);
                consume_front(&mut ia, min);
                consume_front(&mut ib, min);
            }
            (Some(Component::Retain(k)), Some(Component::Delete(m))) => {
                let min = k.min(m);
                result.delete(min);
                consume_front(&mut ia, min);
                consume_front(&mut ib, min);
            }
            (Some(Component::Insert(s)), Some(Component::Retain(m))) => {
                let min = s.chars().count().min(m);
                let (taken, rest) = split_chars(&s, min);
                result.insert(taken);
                ia.pop_front();
                if !rest.is_empty() {
                    ia.push_front(Component::Insert(rest));
                }
                consume_front(&mut ib, min);
            }
            (Some(Component::Insert(s)), Some(Component::Delete(m))) => {
                // Cancellation: the insert and (part of) the delete wipe
                // each other out, nothing is emitted.
                let min = s.chars().count().min(m);
                let (_taken, rest) = split_chars(&s, min);
                ia.pop_front();
                if !rest.is_empty() {
                    ia.push_front(Component::Insert(rest));
                }
                consume_front(&mut ib, min);
            }
        }
    }

    result
}

/// Produces `a'` such that applying `a'` after `b` has the same effect as
/// applying `a` alone had on its own base. `side` breaks positional ties
/// between two inserts at the same point.
pub fn transform(a: &Operation, b: &Operation, side: Side) -> Operation {
    let mut result = Operation::new();
    let mut ia: VecDeque<Component> = a.0.iter().cloned().collect();
    let mut ib: VecDeque<Component> = b.0.iter().cloned().collect();

    loop {
        match (ia.front().cloned(), ib.front().cloned()) {
            (None, None) => break,
            // Insert vs Insert: `side` breaks the tie.
            (Some(Component::Insert(s)), Some(Component::Insert(_))) if side == Side::Left => {
                result.insert(s);
                ia.pop_front();
            }
            (Some(Component::Insert(_)), Some(Component::Insert(t))) => {
                // side == Side::Right: yield to b's insert now, consume our
                // own insert on a later iteration.
                result.retain(t.chars().count());
                ib.pop_front();
            }
            // Insert(a) vs non-Insert(b): a's insert is preserved verbatim,
            // b is not consumed this iteration.
            (Some(Component::Insert(s)), _) => {
                result.insert(s);
                ia.pop_front();
            }
            // non-Insert(a) vs Insert(b): emit Retain(len(b insert)),
            // consume b's insert.
            (_, Some(Component::Insert(t))) => {
                result.retain(t.chars().count());
                ib.pop_front();
            }
            // a exhausted (implicit infinite retain) vs b's Retain/Delete.
            (None, Some(Component::Retain(m))) => {
                result.retain(m);
                ib.pop_front();
            }
            (None, Some(Component::Delete(_))) => {
                // Retain vs Delete: emit nothing, b already removed it.
                ib.pop_front();
            }
            // b exhausted (implicit infinite retain) vs a's Retain/Delete.
            (Some(Component::Retain(k)), None) => {
                result.retain(k);
                ia.pop_front();
            }
            (Some(Component::Delete(k)), None) => {
                result.delete(k);
                ia.pop_front();
            }
            (Some(Component::Retain(k)), Some(Component::Retain(m))) => {
                let min = k.min(m);
                result.retain(min);
                consume_front(&mut ia, min);
                consume_front(&mut ib, min);
            }
            (Some(Component::Delete(k)), Some(Component::Retain(m))) => {
                let min = k.min(m);
                result.delete(min);
                consume_front(&mut ia, min);
                consume_front(&mut ib, min);
            }
            (Some(Component::Retain(k)), Some(Component::Delete(m))) => {
                let min = k.min(m);
                consume_front(&mut ia, min);
                consume_front(&mut ib, min);
            }
            (Some(Component::Delete(k)), Some(Component::Delete(m))) => {
                let min = k.min(m);
                consume_front(&mut ia, min);
                consume_front(&mut ib, min);
            }
        }
    }

    result
}

/// Produces the inverse of `op` relative to `base`, the snapshot `op` was
/// built against: `Retain` stays, `Insert(s)` becomes `Delete(len(s))`,
/// `Delete(n)` becomes `Insert` of the `n` units it removed from `base`.
pub fn invert(op: &Operation, base: &str) -> Operation {
    let chars: Vec<char> = base.chars().collect();
    let mut result = Operation::new();
    let mut i = 0usize;

    for component in &op.0 {
        match component {
            Component::Retain(n) => {
                result.retain(*n);
                i += n;
            }
            Component::Insert(s) => {
                result.delete(s.chars().count());
            }
            Component::Delete(n) => {
                let removed: String = chars[i..i + n].iter().collect();
                result.insert(removed);
                i += n;
            }
        }
    }

    result
}
