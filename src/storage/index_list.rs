//! Deduplicated registry of face index lists.
//!
//! Kernels read face values through small integer lists (volume node
//! indices of a face, permutations between matched faces). Only a handful
//! of distinct lists exist per element type, so each list is stored once
//! and face records refer to it by [`IndexListId`].
//!
//! Lists are registered under a semantic [`IndexListKey`]. A key that was
//! seen before returns its id without recomputation; new content that
//! equals an existing list reuses that list's id. Id 0 is always the
//! identity list of face length.

use std::collections::HashMap;

use crate::error::ConsistencyError;
use crate::types::IndexListId;

/// What an index list means, independent of its contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexListKey {
    /// Volume node indices of `face` in its native order.
    Native { face: usize },
    /// Volume node indices of `face`, ordered to match the opposite side.
    Matched { face: usize, reversed: bool },
    /// Write map from the matched order of `face` back to its native order.
    ExtWrite { face: usize, reversed: bool },
}

#[derive(Clone, Debug)]
pub struct IndexListRegistry {
    lists: Vec<Vec<usize>>,
    by_key: HashMap<IndexListKey, IndexListId>,
    by_content: HashMap<Vec<usize>, IndexListId>,
    verify: bool,
}

impl IndexListRegistry {
    /// Registry whose list 0 is `0..identity_len`.
    ///
    /// With `verify`, registering a known key recomputes the list and fails
    /// if the contents changed.
    pub fn new(identity_len: usize, verify: bool) -> Self {
        let identity: Vec<usize> = (0..identity_len).collect();
        let mut by_content = HashMap::new();
        by_content.insert(identity.clone(), IndexListId::ZERO);
        Self {
            lists: vec![identity],
            by_key: HashMap::new(),
            by_content,
            verify,
        }
    }

    /// Id of the identity list.
    pub fn identity(&self) -> IndexListId {
        IndexListId::ZERO
    }

    /// Register the list computed by `compute` under `key`.
    ///
    /// `None` stands for the identity list and always yields id 0.
    pub fn register(
        &mut self,
        key: Option<IndexListKey>,
        compute: impl FnOnce() -> Vec<usize>,
    ) -> Result<IndexListId, ConsistencyError> {
        let Some(key) = key else {
            let id = self.identity();
            if self.verify && compute() != self.lists[id] {
                return Err(ConsistencyError::IndexListMismatch { id });
            }
            return Ok(id);
        };

        if let Some(&id) = self.by_key.get(&key) {
            if self.verify && compute() != self.lists[id] {
                return Err(ConsistencyError::IndexListMismatch { id });
            }
            return Ok(id);
        }

        let list = compute();
        let id = match self.by_content.get(&list) {
            Some(&id) => id,
            None => {
                let id = IndexListId::new(self.lists.len());
                self.by_content.insert(list.clone(), id);
                self.lists.push(list);
                id
            }
        };
        self.by_key.insert(key, id);
        Ok(id)
    }

    pub fn get(&self, id: IndexListId) -> &[usize] {
        &self.lists[id]
    }

    /// Number of distinct lists, identity included.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// All lists, indexed by id.
    pub fn lists(&self) -> &[Vec<usize>] {
        &self.lists
    }

    pub fn into_lists(self) -> Vec<Vec<usize>> {
        self.lists
    }
}

fn check_permutation(map: &[usize]) -> Result<(), ConsistencyError> {
    let mut seen = vec![false; map.len()];
    for &i in map {
        match seen.get_mut(i) {
            Some(slot) if !*slot => *slot = true,
            Some(_) => {
                return Err(ConsistencyError::InvalidWriteMap(format!(
                    "index {i} written twice"
                )))
            }
            None => {
                return Err(ConsistencyError::InvalidWriteMap(format!(
                    "index {i} out of range for length {}",
                    map.len()
                )))
            }
        }
    }
    Ok(())
}

/// Scatter `seq` through `wmap`: `result[wmap[i]] = seq[i]`.
pub fn apply_write_map<T: Clone>(wmap: &[usize], seq: &[T]) -> Result<Vec<T>, ConsistencyError> {
    if wmap.len() != seq.len() {
        return Err(ConsistencyError::InvalidWriteMap(format!(
            "map length {} does not match sequence length {}",
            wmap.len(),
            seq.len()
        )));
    }
    check_permutation(wmap)?;

    let mut slots: Vec<Option<T>> = vec![None; seq.len()];
    for (&target, value) in wmap.iter().zip(seq) {
        slots[target] = Some(value.clone());
    }
    slots
        .into_iter()
        .collect::<Option<Vec<T>>>()
        .ok_or_else(|| ConsistencyError::InvalidWriteMap("unfilled slot".into()))
}

/// Write map taking `from` to `to`: entry i is the position of `from[i]`
/// in `to`, so that `apply_write_map(&write_to_map(a, b)?, a) == b`.
pub fn write_to_map(from: &[usize], to: &[usize]) -> Result<Vec<usize>, ConsistencyError> {
    if from.len() != to.len() {
        return Err(ConsistencyError::InvalidWriteMap(format!(
            "lengths differ: {} vs {}",
            from.len(),
            to.len()
        )));
    }
    let position: HashMap<usize, usize> = to.iter().enumerate().map(|(i, &v)| (v, i)).collect();
    let map = from
        .iter()
        .map(|v| {
            position.get(v).copied().ok_or_else(|| {
                ConsistencyError::InvalidWriteMap(format!("value {v} missing from target"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    check_permutation(&map)?;
    Ok(map)
}
