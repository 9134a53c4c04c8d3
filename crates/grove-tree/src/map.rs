use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use grove_segment::{RecordKind, SegmentStore};
use grove_types::RecordId;

use crate::error::{TreeError, TreeResult};

/// Bits of the name hash consumed per trie level.
const HASH_BITS: u32 = 5;
/// Branch fanout (2^HASH_BITS).
const FANOUT: u32 = 32;
/// A map this small is stored as a single leaf.
const LEAF_MAX: usize = 32;
/// Levels before the 64-bit name hash is exhausted. Leaves below this
/// depth may exceed `LEAF_MAX` (full-hash collisions).
const MAX_LEVEL: u32 = 12;

/// First 64 bits of the BLAKE3 hash of the entry name, little-endian.
fn name_hash(name: &str) -> u64 {
    let digest = blake3::hash(name.as_bytes());
    let mut first = [0u8; 8];
    first.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(first)
}

/// The 5-bit hash chunk steering level `level`.
fn chunk_at(hash: u64, level: u32) -> u32 {
    ((hash >> (level * HASH_BITS)) & (FANOUT as u64 - 1)) as u32
}

#[derive(Serialize, Deserialize)]
struct LeafPayload {
    /// Entries sorted by name.
    entries: Vec<(String, RecordId)>,
}

#[derive(Serialize, Deserialize)]
struct BranchPayload {
    /// Total entries in the subtree rooted here.
    size: u64,
    /// Which hash chunks have a child, one bit per chunk.
    bitmap: u32,
    /// Children of the set bits, in ascending chunk order.
    children: Vec<RecordId>,
}

enum MapNode {
    Leaf(Vec<(String, RecordId)>),
    Branch(BranchPayload),
}

fn load(store: &dyn SegmentStore, id: RecordId) -> TreeResult<MapNode> {
    let record = store.read_record(id)?;
    match record.header.kind {
        RecordKind::MapLeaf => {
            let payload: LeafPayload =
                bincode::deserialize(&record.body).map_err(|e| TreeError::Decode {
                    record: id,
                    reason: e.to_string(),
                })?;
            Ok(MapNode::Leaf(payload.entries))
        }
        RecordKind::MapBranch => {
            let payload: BranchPayload =
                bincode::deserialize(&record.body).map_err(|e| TreeError::Decode {
                    record: id,
                    reason: e.to_string(),
                })?;
            if payload.children.len() != payload.bitmap.count_ones() as usize {
                return Err(TreeError::Decode {
                    record: id,
                    reason: format!(
                        "bitmap population {} does not match child count {}",
                        payload.bitmap.count_ones(),
                        payload.children.len()
                    ),
                });
            }
            Ok(MapNode::Branch(payload))
        }
        actual => Err(TreeError::Decode {
            record: id,
            reason: format!("expected a map record, found {actual:?}"),
        }),
    }
}

/// Read view of a stored child map: names mapped to node record ids.
///
/// A map is a single sorted leaf, or a trie of bitmap-indexed branches
/// partitioned by 5-bit chunks of the BLAKE3 name hash with leaves at the
/// fringe. The layout is canonical: one entry set has exactly one stored
/// shape, so equal maps converge to one record address through writer-side
/// deduplication no matter how they were built.
#[derive(Clone, Copy)]
pub struct MapRecord<'a> {
    store: &'a dyn SegmentStore,
    id: RecordId,
}

impl<'a> MapRecord<'a> {
    /// Wrap the map rooted at `id`, verifying that it is a map record.
    pub fn open(store: &'a dyn SegmentStore, id: RecordId) -> TreeResult<Self> {
        // Loading validates the kind tag and the payload shape.
        load(store, id)?;
        Ok(Self { store, id })
    }

    /// Address of the map's root record.
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Number of entries in the map.
    pub fn size(&self) -> TreeResult<u64> {
        match load(self.store, self.id)? {
            MapNode::Leaf(entries) => Ok(entries.len() as u64),
            MapNode::Branch(branch) => Ok(branch.size),
        }
    }

    /// Look up one entry by name. Touches only the nodes on the hash path.
    pub fn entry(&self, name: &str) -> TreeResult<Option<RecordId>> {
        entry_at(self.store, self.id, name, name_hash(name), 0)
    }

    /// Whether the map contains `name`.
    pub fn contains(&self, name: &str) -> TreeResult<bool> {
        Ok(self.entry(name)?.is_some())
    }

    /// All entries. Order is unspecified.
    pub fn entries(&self) -> TreeResult<Vec<(String, RecordId)>> {
        let mut out = Vec::new();
        collect(self.store, self.id, &mut out)?;
        Ok(out)
    }
}

impl std::fmt::Debug for MapRecord<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapRecord").field("id", &self.id).finish()
    }
}

fn entry_at(
    store: &dyn SegmentStore,
    id: RecordId,
    name: &str,
    hash: u64,
    level: u32,
) -> TreeResult<Option<RecordId>> {
    match load(store, id)? {
        MapNode::Leaf(entries) => Ok(entries
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()
            .map(|i| entries[i].1)),
        MapNode::Branch(branch) => {
            let bit = 1u32 << chunk_at(hash, level);
            if branch.bitmap & bit == 0 {
                return Ok(None);
            }
            let index = (branch.bitmap & (bit - 1)).count_ones() as usize;
            entry_at(store, branch.children[index], name, hash, level + 1)
        }
    }
}

fn collect(
    store: &dyn SegmentStore,
    id: RecordId,
    out: &mut Vec<(String, RecordId)>,
) -> TreeResult<()> {
    match load(store, id)? {
        MapNode::Leaf(entries) => out.extend(entries),
        MapNode::Branch(branch) => {
            for child in branch.children {
                collect(store, child, out)?;
            }
        }
    }
    Ok(())
}

fn write_leaf(store: &dyn SegmentStore, entries: &[(String, RecordId)]) -> TreeResult<RecordId> {
    // Only reachable past LEAF_MAX through full-hash collisions at the
    // deepest level, but the header counter still caps what fits.
    let count = entries.len();
    if count > u16::MAX as usize {
        return Err(TreeError::TooManyEntries { count });
    }
    let payload = LeafPayload {
        entries: entries.to_vec(),
    };
    let body = bincode::serialize(&payload).map_err(|e| TreeError::Encode(e.to_string()))?;
    Ok(store.write_record(RecordKind::MapLeaf, 0, count as u16, &body)?)
}

fn write_branch(
    store: &dyn SegmentStore,
    size: u64,
    bitmap: u32,
    children: &[RecordId],
) -> TreeResult<RecordId> {
    let payload = BranchPayload {
        size,
        bitmap,
        children: children.to_vec(),
    };
    let body = bincode::serialize(&payload).map_err(|e| TreeError::Encode(e.to_string()))?;
    Ok(store.write_record(RecordKind::MapBranch, 0, children.len() as u16, &body)?)
}

/// Persist `entries` as a canonical map and return its root address.
pub fn write_map(
    store: &dyn SegmentStore,
    entries: &BTreeMap<String, RecordId>,
) -> TreeResult<RecordId> {
    let list: Vec<(String, RecordId)> = entries
        .iter()
        .map(|(name, id)| (name.clone(), *id))
        .collect();
    write_level(store, list, 0)
}

/// Canonical shape rule, applied identically by fresh builds and updates:
/// a node holding at most `LEAF_MAX` entries is a leaf, as is any node at
/// `MAX_LEVEL`; everything else is a branch over the level's hash chunks.
fn write_level(
    store: &dyn SegmentStore,
    mut entries: Vec<(String, RecordId)>,
    level: u32,
) -> TreeResult<RecordId> {
    if entries.len() <= LEAF_MAX || level >= MAX_LEVEL {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        return write_leaf(store, &entries);
    }
    let size = entries.len() as u64;
    let mut buckets: Vec<Vec<(String, RecordId)>> = Vec::new();
    buckets.resize_with(FANOUT as usize, Vec::new);
    for (name, id) in entries {
        let chunk = chunk_at(name_hash(&name), level) as usize;
        buckets[chunk].push((name, id));
    }
    let mut bitmap = 0u32;
    let mut children = Vec::new();
    for (chunk, bucket) in buckets.into_iter().enumerate() {
        if bucket.is_empty() {
            continue;
        }
        bitmap |= 1 << chunk;
        children.push(write_level(store, bucket, level + 1)?);
    }
    write_branch(store, size, bitmap, &children)
}

/// One map mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MapOp {
    /// Insert or replace the entry for this name.
    Put(String, RecordId),
    /// Remove the entry for this name, if present.
    Remove(String),
}

enum Op {
    Put(RecordId),
    Remove,
}

struct PlannedOp {
    name: String,
    hash: u64,
    op: Op,
}

struct Outcome {
    /// New subtree root, `None` when the subtree emptied out.
    id: Option<RecordId>,
    /// Entry-count change relative to the base subtree.
    delta: i64,
}

/// Derive an updated map from `base`, rewriting only the trie paths that
/// lead to changed entries; untouched subtrees keep their record ids.
/// Returns `None` when every entry was removed. Later ops win when several
/// address one name.
pub fn update_map(
    store: &dyn SegmentStore,
    base: RecordId,
    ops: &[MapOp],
) -> TreeResult<Option<RecordId>> {
    let mut latest: BTreeMap<&str, Op> = BTreeMap::new();
    for op in ops {
        match op {
            MapOp::Put(name, id) => latest.insert(name, Op::Put(*id)),
            MapOp::Remove(name) => latest.insert(name, Op::Remove),
        };
    }
    if latest.is_empty() {
        return Ok(Some(base));
    }
    let planned: Vec<PlannedOp> = latest
        .into_iter()
        .map(|(name, op)| PlannedOp {
            hash: name_hash(name),
            name: name.to_string(),
            op,
        })
        .collect();
    debug!(base = %base, ops = planned.len(), "updating map");
    let outcome = update_level(store, Some(base), planned, 0)?;
    Ok(outcome.id)
}

fn update_level(
    store: &dyn SegmentStore,
    node: Option<RecordId>,
    ops: Vec<PlannedOp>,
    level: u32,
) -> TreeResult<Outcome> {
    if ops.is_empty() {
        // Untouched subtree: keep the stored node as is.
        return Ok(Outcome { id: node, delta: 0 });
    }
    match node.map(|id| load(store, id)).transpose()? {
        Some(MapNode::Branch(branch)) => update_branch(store, branch, ops, level),
        other => {
            let mut entries = match other {
                Some(MapNode::Leaf(entries)) => entries,
                _ => Vec::new(),
            };
            let before = entries.len() as i64;
            for op in ops {
                let slot = entries.binary_search_by(|(n, _)| n.as_str().cmp(&op.name));
                match (op.op, slot) {
                    (Op::Put(id), Ok(i)) => entries[i].1 = id,
                    (Op::Put(id), Err(i)) => entries.insert(i, (op.name, id)),
                    (Op::Remove, Ok(i)) => {
                        entries.remove(i);
                    }
                    (Op::Remove, Err(_)) => {}
                }
            }
            let delta = entries.len() as i64 - before;
            if entries.is_empty() {
                return Ok(Outcome { id: None, delta });
            }
            let id = write_level(store, entries, level)?;
            Ok(Outcome { id: Some(id), delta })
        }
    }
}

fn update_branch(
    store: &dyn SegmentStore,
    branch: BranchPayload,
    ops: Vec<PlannedOp>,
    level: u32,
) -> TreeResult<Outcome> {
    let mut op_buckets: Vec<Vec<PlannedOp>> = Vec::new();
    op_buckets.resize_with(FANOUT as usize, Vec::new);
    for op in ops {
        let chunk = chunk_at(op.hash, level) as usize;
        op_buckets[chunk].push(op);
    }

    let mut bitmap = 0u32;
    let mut children = Vec::new();
    let mut delta = 0i64;
    for (chunk, bucket) in op_buckets.into_iter().enumerate() {
        let bit = 1u32 << chunk;
        let existing = if branch.bitmap & bit != 0 {
            let index = (branch.bitmap & (bit - 1)).count_ones() as usize;
            Some(branch.children[index])
        } else {
            None
        };
        let outcome = update_level(store, existing, bucket, level + 1)?;
        delta += outcome.delta;
        if let Some(id) = outcome.id {
            bitmap |= bit;
            children.push(id);
        }
    }

    let size = (branch.size as i64 + delta) as u64;
    if size == 0 {
        return Ok(Outcome { id: None, delta });
    }
    if size as usize <= LEAF_MAX {
        // Shrunk to leaf range: collapse so the shape stays canonical.
        let mut entries = Vec::with_capacity(size as usize);
        for child in &children {
            collect(store, *child, &mut entries)?;
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let id = write_leaf(store, &entries)?;
        return Ok(Outcome { id: Some(id), delta });
    }
    let id = write_branch(store, size, bitmap, &children)?;
    Ok(Outcome { id: Some(id), delta })
}
