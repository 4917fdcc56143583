use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, MinibaseError, Result, Timestamp};

/// Kind of access recorded against a frame. The replacer weights its
/// history entries by access kind, so point lookups keep a frame resident
/// longer than index maintenance traffic of the same recency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessType {
    #[default]
    Unknown,
    Lookup,
    Scan,
    Index,
}

impl AccessType {
    fn weight(self) -> u64 {
        match self {
            AccessType::Unknown | AccessType::Index => 1,
            AccessType::Scan => 2,
            AccessType::Lookup => 3,
        }
    }
}

/// Access history for a single frame
#[derive(Debug)]
struct LruKNode {
    /// Up to k most recent accesses as (timestamp, weight), oldest at front
    history: VecDeque<(Timestamp, u64)>,
    /// Sum of the weights currently in the history
    total_weight: u64,
    /// Whether this frame may be chosen as a victim
    is_evictable: bool,
}

impl LruKNode {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            total_weight: 0,
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, weight: u64, k: usize) {
        if self.history.len() == k {
            if let Some((_, oldest_weight)) = self.history.pop_front() {
                self.total_weight -= oldest_weight;
            }
        }
        self.history.push_back((timestamp, weight));
        self.total_weight += weight;
    }

    /// Backward k-distance, or `None` for frames with fewer than k accesses
    /// (infinite distance).
    fn k_back_distance(&self, current_timestamp: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            // With a capped history the front entry is the k-th most recent.
            self.history.front().map(|&(ts, _)| current_timestamp - ts)
        }
    }

    fn earliest_timestamp(&self) -> Timestamp {
        self.history.front().map(|&(ts, _)| ts).unwrap_or(0)
    }
}

#[derive(Default)]
struct LruKReplacerInner {
    nodes: HashMap<FrameId, LruKNode>,
    evictable_count: usize,
    current_timestamp: Timestamp,
}

/// LRU-K replacement policy with access-type weighting.
///
/// The classical LRU-K backward distance is the time since a frame's k-th
/// most recent access; frames with fewer than k accesses count as
/// infinitely distant. This replacer scales the finite distances by the
/// average weight of the frame's recorded accesses
/// (`total_weight * distance / k`), so cheap-to-recreate traffic is
/// sacrificed before hot lookup pages of equal recency.
///
/// Eviction prefers any infinitely-distant frame, oldest first. On the
/// finite side the largest weighted distance wins; ties break to the
/// smallest frame id to keep the policy deterministic.
pub struct LruKReplacer {
    /// K value for the LRU-K algorithm
    k: usize,
    /// Largest frame id the replacer tracks (inclusive)
    max_frame_id: usize,
    /// Single latch over the whole structure
    inner: Mutex<LruKReplacerInner>,
}

impl LruKReplacer {
    /// Creates a replacer tracking frame ids `0..=max_frame_id`.
    pub fn new(k: usize, max_frame_id: usize) -> Self {
        assert!(k >= 1, "LRU-K needs k >= 1");
        Self {
            k,
            max_frame_id,
            inner: Mutex::new(LruKReplacerInner::default()),
        }
    }

    /// Selects and removes a victim frame, or returns `None` when no frame
    /// is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        if inner.evictable_count == 0 {
            return None;
        }

        let now = inner.current_timestamp;
        // Infinite-distance candidates win over any finite one; among them
        // the oldest first access loses (classical LRU tiebreak).
        let mut inf_victim: Option<(Timestamp, FrameId)> = None;
        let mut finite_victim: Option<(u64, FrameId)> = None;

        for (&frame_id, node) in inner.nodes.iter() {
            if !node.is_evictable {
                continue;
            }

            match node.k_back_distance(now, self.k) {
                None => {
                    let candidate = (node.earliest_timestamp(), frame_id);
                    if inf_victim.map_or(true, |current| candidate < current) {
                        inf_victim = Some(candidate);
                    }
                }
                Some(distance) => {
                    let weighted = node.total_weight.saturating_mul(distance) / self.k as u64;
                    let better = match finite_victim {
                        None => true,
                        Some((best, best_id)) => {
                            weighted > best || (weighted == best && frame_id < best_id)
                        }
                    };
                    if better {
                        finite_victim = Some((weighted, frame_id));
                    }
                }
            }
        }

        let victim = inf_victim
            .map(|(_, frame_id)| frame_id)
            .or(finite_victim.map(|(_, frame_id)| frame_id))?;

        inner.nodes.remove(&victim);
        inner.evictable_count -= 1;
        Some(victim)
    }

    /// Records an access to the given frame at the next logical timestamp.
    pub fn record_access(&self, frame_id: FrameId, access_type: AccessType) -> Result<()> {
        if frame_id.as_usize() > self.max_frame_id {
            return Err(MinibaseError::InvalidFrameId(frame_id));
        }

        let mut inner = self.inner.lock();
        let timestamp = inner.current_timestamp;
        inner.current_timestamp += 1;

        inner
            .nodes
            .entry(frame_id)
            .or_insert_with(LruKNode::new)
            .record_access(timestamp, access_type.weight(), self.k);
        Ok(())
    }

    /// Toggles whether a frame may be evicted. Frames the replacer has
    /// never seen an access for are ignored.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) {
        let mut inner = self.inner.lock();
        let LruKReplacerInner {
            nodes,
            evictable_count,
            ..
        } = &mut *inner;

        if let Some(node) = nodes.get_mut(&frame_id) {
            if node.is_evictable != is_evictable {
                node.is_evictable = is_evictable;
                if is_evictable {
                    *evictable_count += 1;
                } else {
                    *evictable_count -= 1;
                }
            }
        }
    }

    /// Drops a frame's history entirely. Removing a frame that is present
    /// but pinned is a caller bug; removing an unknown frame is a no-op.
    pub fn remove(&self, frame_id: FrameId) -> Result<()> {
        let mut inner = self.inner.lock();

        match inner.nodes.get(&frame_id) {
            None => Ok(()),
            Some(node) if !node.is_evictable => Err(MinibaseError::FrameNotEvictable(frame_id)),
            Some(_) => {
                inner.nodes.remove(&frame_id);
                inner.evictable_count -= 1;
                Ok(())
            }
        }
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.inner.lock().evictable_count
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}
