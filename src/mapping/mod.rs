//! IndexMapBuilder: compact maps from group-local position to array index.
//!
//! A dense run of indices becomes a [`IndexMap::Contiguous`] range and costs
//! no memory traffic; anything else becomes an [`IndexMap::Explicit`] table
//! declared as a read-only kernel temporary.


use tracing::debug;

use crate::error::{Error, Result};
use crate::ir::{ArgDecl, Expr, LoopDomain};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexMap {
    /// Position `p` maps to `start + p`.
    Contiguous { start: usize, len: usize },
    /// Position `p` maps to `values[p]`.
    Explicit { values: Vec<usize> },
}

impl IndexMap {
    pub fn len(&self) -> usize {
        match self {
            IndexMap::Contiguous { len, .. } => *len,
            IndexMap::Explicit { values } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_contiguous(&self) -> bool {
        matches!(self, IndexMap::Contiguous { .. })
    }

    /// Mapped index of position `p`.
    pub fn get(&self, p: usize) -> Option<usize> {
        match self {
            IndexMap::Contiguous { start, len } => (p < *len).then_some(start + p),
            IndexMap::Explicit { values } => values.get(p).copied(),
        }
    }

    /// Iteration domain of `iname`: the mapped range itself for a
    /// contiguous map, positions `0..len` for an explicit one.
    pub fn domain(&self, iname: &str) -> LoopDomain {
        match self {
            IndexMap::Contiguous { start, len } => LoopDomain::new(iname, *start, start + len),
            IndexMap::Explicit { values } => LoopDomain::new(iname, 0usize, values.len()),
        }
    }

    /// Group-local position of the current iteration.
    pub fn position(&self, iname: &str) -> Expr {
        match self {
            IndexMap::Contiguous { start, .. } if *start > 0 => Expr::var(iname) - *start,
            _ => Expr::var(iname),
        }
    }

    /// Mapped index of the current iteration; `table` names the explicit map.
    pub fn target(&self, iname: &str, table: &str) -> Expr {
        match self {
            IndexMap::Contiguous { .. } => Expr::var(iname),
            IndexMap::Explicit { .. } => Expr::index(table, [Expr::var(iname)]),
        }
    }

    /// Mapped index of an arbitrary position expression.
    pub fn lookup(&self, position: Expr, table: &str) -> Expr {
        match self {
            IndexMap::Contiguous { start: 0, .. } => position,
            IndexMap::Contiguous { start, .. } => position + *start,
            IndexMap::Explicit { .. } => Expr::index(table, [position]),
        }
    }

    /// Read-only table backing an explicit map.
    pub fn declare(&self, name: &str) -> Option<ArgDecl> {
        match self {
            IndexMap::Contiguous { .. } => None,
            IndexMap::Explicit { values } => Some(ArgDecl::constant_i32(
                name,
                values.iter().map(|&v| v as i32).collect(),
            )),
        }
    }
}

/// Chooses between a contiguous range and an explicit table.
#[derive(Debug, Clone, Default)]
pub struct IndexMapBuilder {
    force_zero: bool,
    force_explicit: bool,
}

impl IndexMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A contiguous range must start at zero.
    pub fn with_force_zero(mut self, force: bool) -> Self {
        self.force_zero = force;
        self
    }

    /// Always produce an explicit table.
    pub fn with_force_explicit(mut self, force: bool) -> Self {
        self.force_explicit = force;
        self
    }

    /// Build the map of `indices`, or of `alternate` when the map must point
    /// into a different array than the group's own indices.
    pub fn build(&self, group: &str, indices: &[usize], alternate: Option<&[usize]>) -> Result<IndexMap> {
        if indices.is_empty() {
            return Err(Error::index_mapping(group, "group is empty"));
        }
        let check = match alternate {
            Some(alt) if alt.len() != indices.len() => {
                return Err(Error::index_mapping(
                    group,
                    format!(
                        "alternate list has {} entries for {} indices",
                        alt.len(),
                        indices.len()
                    ),
                ));
            }
            Some(alt) => alt,
            None => indices,
        };
        let mut sorted = check.to_vec();
        sorted.sort_unstable();
        if let Some(w) = sorted.windows(2).find(|w| w[0] == w[1]) {
            return Err(Error::index_mapping(
                group,
                format!("index {} appears more than once", w[0]),
            ));
        }

        let start = check[0];
        let len = check.len();
        let dense = check.iter().enumerate().all(|(p, &g)| g == start + p);
        let map = if dense && (!self.force_zero || start == 0) && !self.force_explicit {
            IndexMap::Contiguous { start, len }
        } else {
            IndexMap::Explicit {
                values: check.to_vec(),
            }
        };
        debug!(
            group,
            len,
            contiguous = map.is_contiguous(),
            "built index map"
        );
        Ok(map)
    }
}
