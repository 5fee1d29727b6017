use crate::endpoint::NodeKey;
use smallvec::SmallVec;

pub const SLOT_COUNT: usize = 16384;

/// Dense slot → ordered endpoint-key list (§3, §4.B). Position 0 is the
/// primary; positions ≥1 are replicas, matching the order `CLUSTER SLOTS`
/// returns them in. One flat array indexed by slot number, rather than a
/// sparse list of slot *ranges* searched by bisection — simpler at 16384
/// slots, where the memory a dense array costs is negligible.
#[derive(Debug, Clone)]
pub struct SlotMap {
    slots: Vec<Option<SmallVec<[NodeKey; 3]>>>,
}

impl Default for SlotMap {
    fn default() -> Self {
        Self {
            slots: vec![None; SLOT_COUNT],
        }
    }
}

impl SlotMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: u16) -> Option<&[NodeKey]> {
        self.slots[slot as usize].as_deref()
    }

    /// Overwrites every slot in `[start, end]` with `keys`. Later calls win
    /// over earlier ones for overlapping ranges (§4.B).
    pub fn set_range(&mut self, start: u16, end: u16, keys: &[NodeKey]) {
        let value: SmallVec<[NodeKey; 3]> = keys.iter().cloned().collect();
        for slot in start..=end {
            self.slots[slot as usize] = Some(value.clone());
        }
    }

    /// Replaces the primary (index 0) for a single slot, keeping whatever
    /// replicas were previously recorded there. Used by the MOVED handler,
    /// which only learns the new primary (§4.E.1).
    pub fn set_primary(&mut self, slot: u16, key: NodeKey) {
        match &mut self.slots[slot as usize] {
            Some(list) if !list.is_empty() => list[0] = key,
            _ => self.slots[slot as usize] = Some(SmallVec::from_elem(key, 1)),
        }
    }

    /// Full rebuild from a fresh refresh result (§4.C step 3). Any slot not
    /// covered by `ranges` becomes unmapped.
    pub fn replace_all(&mut self, ranges: &[(u16, u16, Vec<NodeKey>)]) {
        self.slots = vec![None; SLOT_COUNT];
        for (start, end, keys) in ranges {
            self.set_range(*start, *end, keys);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}
