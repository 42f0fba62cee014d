use std::fmt;

use log::trace;

use crate::fingerprint::SimHasher;
use crate::frontier::Frontier;
use crate::hamming::hamming_distance;
use crate::tables::{byte_distance, bytes_at_distance};

/// Fingerprint bits consumed per trie level.
pub const BITS_PER_LEVEL: usize = 8;
/// Trie depth: one level per fingerprint byte, least significant first.
pub const LEVELS: usize = 64 / BITS_PER_LEVEL;
/// A leaf above the deepest level splits once it holds more entries than
/// this. The deepest leaf has no byte left to partition on and just grows.
pub const MAX_KEYS_PER_NODE: usize = 256;

const FANOUT: usize = 1 << BITS_PER_LEVEL;

/// Fingerprint bits not yet matched on the way down to a node at each level:
/// the low `8 * level` bits were consumed picking children.
const UNRESOLVED: [u64; LEVELS] = unresolved_masks();

const fn unresolved_masks() -> [u64; LEVELS] {
    let mut masks = [0u64; LEVELS];
    let mut level = 0;
    while level < LEVELS {
        masks[level] = u64::MAX << (level * BITS_PER_LEVEL);
        level += 1;
    }
    masks
}

/// The fingerprint byte a node at `level` partitions its children by.
#[inline(always)]
fn chunk(key: u64, level: u8) -> u8 {
    (key >> (level as usize * BITS_PER_LEVEL)) as u8
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Entry {
    key: u64,
    id: i64,
}

/// Dense child table: O(1) lookup by byte value, occupancy tracked so the
/// search counters don't have to rescan the slots.
struct ChildMap {
    slots: Box<[Option<Box<Node>>; FANOUT]>,
    occupied: u16,
}

impl ChildMap {
    fn new() -> Self {
        ChildMap {
            slots: Box::new([const { None }; FANOUT]),
            occupied: 0,
        }
    }

    fn len(&self) -> usize {
        self.occupied as usize
    }

    fn get(&self, byte: u8) -> Option<&Node> {
        self.slots[byte as usize].as_deref()
    }

    fn get_or_insert(&mut self, byte: u8, level: u8) -> &mut Node {
        let slot = &mut self.slots[byte as usize];
        if slot.is_none() {
            self.occupied += 1;
        }
        slot.get_or_insert_with(|| Box::new(Node::new(level)))
    }

    fn iter(&self) -> impl Iterator<Item = (u8, &Node)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(byte, slot)| slot.as_deref().map(|node| (byte as u8, node)))
    }
}

/// One trie node: a leaf owning entries, or an internal node owning children
/// keyed by one fingerprint byte. Never both.
pub(crate) struct Node {
    level: u8,
    entries: Vec<Entry>,
    children: Option<ChildMap>,
}

impl Node {
    pub(crate) fn new(level: u8) -> Self {
        Node {
            level,
            entries: Vec::new(),
            children: None,
        }
    }

    fn insert(&mut self, item: Entry) {
        let level = self.level;
        match &mut self.children {
            Some(children) => {
                children
                    .get_or_insert(chunk(item.key, level), level + 1)
                    .insert(item);
            }
            None => {
                self.entries.push(item);
                if self.entries.len() > MAX_KEYS_PER_NODE && (level as usize) < LEVELS - 1 {
                    self.split();
                }
            }
        }
    }

    /// Turn this leaf into an internal node, redistributing every entry by
    /// its byte at this level. Redistribution goes through `insert` so a
    /// child that inherits the whole pile splits in turn.
    fn split(&mut self) {
        let level = self.level;
        let mut children = ChildMap::new();
        for item in self.entries.drain(..) {
            children
                .get_or_insert(chunk(item.key, level), level + 1)
                .insert(item);
        }
        self.children = Some(children);
    }

    fn contains(&self, target: u64) -> Option<i64> {
        match &self.children {
            Some(children) => children.get(chunk(target, self.level))?.contains(target),
            None => self
                .entries
                .iter()
                .find(|item| item.key == target)
                .map(|item| item.id),
        }
    }

    fn find(&self, target: u64, budget: u8, result: &mut FindResult) {
        match &self.children {
            Some(children) => {
                // Hamming distance is additive across byte positions:
                // spending `spent` bits on this level's byte leaves
                // `budget - spent` for the deeper bytes.
                let byte = chunk(target, self.level);
                let end = budget.min(BITS_PER_LEVEL as u8);
                for spent in 0..=end {
                    for &near in bytes_at_distance(byte, spent) {
                        if let Some(child) = children.get(near) {
                            child.find(target, budget - spent, result);
                        }
                    }
                }
                result.nodes_checked += children.len() as u32;
            }
            None => {
                // bytes below this level were matched on the way down;
                // compare only the unresolved remainder
                let mask = UNRESOLVED[self.level as usize];
                for item in &self.entries {
                    if hamming_distance(item.key & mask, target & mask) <= budget {
                        result.ids.push(item.id);
                    }
                }
                result.keys_checked += self.entries.len() as u32;
            }
        }
    }

    fn find_within(&self, target: u64, budget: u8) -> Option<i64> {
        match &self.children {
            Some(children) => {
                let byte = chunk(target, self.level);
                let end = budget.min(BITS_PER_LEVEL as u8);
                for spent in 0..=end {
                    for &near in bytes_at_distance(byte, spent) {
                        let found = children
                            .get(near)
                            .and_then(|child| child.find_within(target, budget - spent));
                        if found.is_some() {
                            return found;
                        }
                    }
                }
                None
            }
            None => {
                let mask = UNRESOLVED[self.level as usize];
                self.entries
                    .iter()
                    .find(|item| hamming_distance(item.key & mask, target & mask) <= budget)
                    .map(|item| item.id)
            }
        }
    }

    fn scan_all(&self, target: u64, budget: u8, found: &mut Vec<u64>) {
        match &self.children {
            Some(children) => {
                for (_, child) in children.iter() {
                    child.scan_all(target, budget, found);
                }
            }
            None => {
                for item in &self.entries {
                    if hamming_distance(item.key, target) <= budget {
                        found.push(item.key);
                    }
                }
            }
        }
    }

    fn stats(&self, stats: &mut Stats) {
        match &self.children {
            Some(children) => {
                stats.nodes += children.len() as u32;
                for (_, child) in children.iter() {
                    child.stats(stats);
                }
            }
            None => stats.keys += self.entries.len() as u32,
        }
    }

    fn pretty(&self, f: &mut fmt::Formatter<'_>, indent: &str) -> fmt::Result {
        match &self.children {
            Some(children) => {
                writeln!(f, "{}level {:2}", indent, self.level)?;
                let deeper = format!("{}   ", indent);
                for (byte, child) in children.iter() {
                    write!(f, "{}{:03}: ", indent, byte)?;
                    child.pretty(f, &deeper)?;
                }
                Ok(())
            }
            None => writeln!(f, "{}keys [{}/{}]", indent, self.entries.len(), MAX_KEYS_PER_NODE),
        }
    }
}

/// Matches within a distance budget, plus how much of the trie the search
/// touched.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FindResult {
    pub ids: Vec<i64>,
    pub keys_checked: u32,
    pub nodes_checked: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub keys: u32,
    pub nodes: u32,
}

/// Near-duplicate lookup index: (fingerprint, id) pairs in a prefix trie
/// chunked by fingerprint byte, eight levels deep.
///
/// Ids are opaque to the store; duplicate fingerprints and duplicate ids are
/// both allowed and never deduplicated.
pub struct SimStore {
    hasher: SimHasher,
    root: Node,
}

impl SimStore {
    pub fn new(hasher: SimHasher) -> Self {
        SimStore {
            hasher,
            root: Node::new(0),
        }
    }

    pub fn hasher(&self) -> &SimHasher {
        &self.hasher
    }

    /// Fingerprints `text` and stores it under `id`. Never fails.
    pub fn insert(&mut self, text: &str, id: i64) {
        let key = self.hasher.fingerprint(text);
        self.insert_fingerprint(key, id);
    }

    pub fn insert_fingerprint(&mut self, key: u64, id: i64) {
        self.root.insert(Entry { key, id });
    }

    /// The id stored under exactly this text's fingerprint, if any.
    pub fn contains(&self, text: &str) -> Option<i64> {
        self.contains_fingerprint(self.hasher.fingerprint(text))
    }

    pub fn contains_fingerprint(&self, key: u64) -> Option<i64> {
        self.root.contains(key)
    }

    /// Every id whose fingerprint is within `distance` bits of the text's.
    /// A distance of 64 or more returns everything.
    pub fn find(&self, text: &str, distance: u8) -> FindResult {
        self.find_fingerprint(self.hasher.fingerprint(text), distance)
    }

    pub fn find_fingerprint(&self, key: u64, distance: u8) -> FindResult {
        let mut result = FindResult::default();
        self.root.find(key, distance, &mut result);
        result
    }

    /// First id found within `distance` bits, abandoning the search early.
    /// Cheaper than [`find`](Self::find) when any close match will do.
    pub fn find_within(&self, text: &str, distance: u8) -> Option<i64> {
        self.find_within_fingerprint(self.hasher.fingerprint(text), distance)
    }

    pub fn find_within_fingerprint(&self, key: u64, distance: u8) -> Option<i64> {
        self.root.find_within(key, distance)
    }

    /// The id of a stored entry at minimum Hamming distance from the text's
    /// fingerprint, or `None` if the store is empty. Ties go to the first
    /// entry reached.
    pub fn find_closest(&self, text: &str) -> Option<i64> {
        self.find_closest_fingerprint(self.hasher.fingerprint(text))
            .map(|(_, id)| id)
    }

    /// Best-first branch-and-bound over the trie: the distance accumulated
    /// along a root path lower-bounds every entry beneath it, so the search
    /// descends cheapest-first and prunes everything at or past the best
    /// leaf entry seen.
    pub fn find_closest_fingerprint(&self, target: u64) -> Option<(u64, i64)> {
        let Some(children) = &self.root.children else {
            // leaf root: nothing to descend, scan directly
            return closest_in_entries(&self.root.entries, target).map(|(key, id, _)| (key, id));
        };

        let mut frontier = Frontier::new();
        let byte = chunk(target, self.root.level);
        for (prefix, child) in children.iter() {
            frontier.push(byte_distance(byte, prefix), child);
        }

        // descend until the first leaf fixes an upper bound
        let mut paths_tried = 0usize;
        let mut best: Option<(u64, i64, u8)> = None;
        while let Some((bound, node)) = frontier.pop() {
            paths_tried += 1;
            match &node.children {
                Some(children) => {
                    let byte = chunk(target, node.level);
                    for (prefix, child) in children.iter() {
                        frontier.push(bound + byte_distance(byte, prefix), child);
                    }
                }
                None => {
                    best = closest_in_entries(&node.entries, target);
                    break;
                }
            }
        }
        let (mut best_key, mut best_id, mut best_dist) = best?;
        trace!("first candidate 0x{best_key:016x} (id {best_id}) at distance {best_dist}");

        if best_dist == 0 {
            return Some((best_key, best_id));
        }

        // refine: anything bounded at or past the best entry cannot improve
        while let Some((bound, node)) = frontier.pop() {
            paths_tried += 1;
            if bound >= best_dist {
                trace!(
                    "remaining {} paths cannot beat distance {best_dist}",
                    frontier.len() + 1
                );
                break;
            }
            match &node.children {
                Some(children) => {
                    let byte = chunk(target, node.level);
                    for (prefix, child) in children.iter() {
                        let next = bound + byte_distance(byte, prefix);
                        if next < best_dist {
                            frontier.push(next, child);
                        }
                    }
                }
                None => {
                    if let Some((key, id, dist)) = closest_in_entries(&node.entries, target) {
                        if dist < best_dist {
                            trace!("improved distance {best_dist} -> {dist} (id {id})");
                            (best_key, best_id, best_dist) = (key, id, dist);
                        }
                    }
                }
            }
        }
        trace!("checked {paths_tried} paths");

        Some((best_key, best_id))
    }

    /// Oracle for [`find`](Self::find): scans every stored key with the full
    /// Hamming distance, no trie pruning.
    pub fn find_scan_all(&self, key: u64, distance: u8) -> Vec<u64> {
        let mut found = Vec::new();
        self.root.scan_all(key, distance, &mut found);
        found
    }

    pub fn stats(&self) -> Stats {
        let mut stats = Stats::default();
        self.root.stats(&mut stats);
        stats
    }
}

impl Default for SimStore {
    fn default() -> Self {
        SimStore::new(SimHasher::default())
    }
}

impl fmt::Display for SimStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.pretty(f, "")
    }
}

/// Linear scan for the entry nearest to `target`; the first entry wins ties.
fn closest_in_entries(entries: &[Entry], target: u64) -> Option<(u64, i64, u8)> {
    let mut best: Option<(u64, i64, u8)> = None;
    for item in entries {
        let dist = hamming_distance(item.key, target);
        if best.map_or(true, |(_, _, d)| dist < d) {
            best = Some((item.key, item.id, dist));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const OPENINGS: [&str; 7] = [
        "It was the best of times, it was the worst of times,",
        "it was the age of wisdom, it was the age of foolishness,",
        "it was the epoch of belief, it was the epoch of incredulity,",
        "it was the season of Light, it was the season of Darkness,",
        "it was the spring of hope, it was the winter of despair,",
        "we had everything before us, we had nothing before us,",
        "we were all going direct to Heaven, we were all going direct the other way",
    ];

    fn openings_store() -> SimStore {
        let mut store = SimStore::default();
        for (i, text) in OPENINGS.iter().enumerate() {
            store.insert(text, i as i64 + 1);
        }
        store
    }

    #[test]
    fn empty_store_finds_nothing() {
        let store = SimStore::default();
        assert_eq!(store.contains("anything"), None);
        assert_eq!(store.find_closest("anything"), None);
        assert_eq!(store.find("anything", 64).ids, Vec::<i64>::new());
        assert_eq!(store.stats(), Stats { keys: 0, nodes: 0 });
    }

    #[test]
    fn contains_roundtrip() {
        let store = openings_store();
        for (i, text) in OPENINGS.iter().enumerate() {
            assert_eq!(store.contains(text), Some(i as i64 + 1));
        }
        assert_eq!(store.contains("never inserted"), None);
    }

    #[test]
    fn zero_radius_covers_exact_matches() {
        let store = openings_store();
        for (i, text) in OPENINGS.iter().enumerate() {
            assert!(store.find(text, 0).ids.contains(&(i as i64 + 1)));
        }
    }

    #[test]
    fn closest_favours_the_nearest_opening() {
        let store = openings_store();
        assert_eq!(
            store.find_closest("It was the best of times, it was the worst of times,"),
            Some(1)
        );
        assert_eq!(
            store.find_closest("It was the best of times and it was the worst of times"),
            Some(1)
        );
    }

    #[test]
    fn find_within_reaches_exact_entries() {
        let store = openings_store();
        assert_eq!(store.find_within(OPENINGS[2], 0), Some(3));
        assert!(store.find_within("completely different words here", 0).is_none());
    }

    #[test]
    fn closest_among_seeded_noise_is_the_sentinel() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut store = SimStore::default();
        let mut keys = Vec::new();
        for id in 0..10_000i64 {
            let text = format!("{:016x}", rng.gen::<u64>());
            store.insert(&text, id);
            keys.push(store.hasher().fingerprint(&text));
        }
        let sentinel = "It was the best of times, it was the worst of times,";
        store.insert(sentinel, -1);
        keys.push(store.hasher().fingerprint(sentinel));

        assert_eq!(store.find_closest(sentinel), Some(-1));
        assert_eq!(
            store.find_closest("It was the best of times, it was peanut butter jelly time"),
            Some(-1)
        );

        // whatever wins, it must win by the full-distance oracle
        let query = store
            .hasher()
            .fingerprint("It was the best of times, it was peanut butter jelly time");
        let (best_key, _) = store.find_closest_fingerprint(query).unwrap();
        let optimum = keys
            .iter()
            .map(|&k| hamming_distance(k, query))
            .min()
            .unwrap();
        assert_eq!(hamming_distance(best_key, query), optimum);
    }

    #[test]
    fn radius_search_matches_the_scan_oracle() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut store = SimStore::default();
        let mut keys = Vec::new();
        for id in 0..20_000i64 {
            let key = rng.gen::<u64>();
            store.insert_fingerprint(key, id);
            keys.push(key);
        }

        for id in (0..20_000usize).step_by(631) {
            assert_eq!(store.contains_fingerprint(keys[id]), Some(id as i64));
        }

        for _ in 0..100 {
            // queries hover near stored keys so small radii have matches
            let base = keys[rng.gen_range(0..keys.len())];
            let mut query = base;
            for _ in 0..rng.gen_range(0..=18) {
                query ^= 1u64 << rng.gen_range(0..64);
            }

            for distance in [1u8, 3, 5, 8, 16] {
                let found = store.find_fingerprint(query, distance);
                let mut via_trie: Vec<u64> =
                    found.ids.iter().map(|&id| keys[id as usize]).collect();
                let mut via_scan = store.find_scan_all(query, distance);
                via_trie.sort_unstable();
                via_scan.sort_unstable();
                assert_eq!(via_trie, via_scan);
            }
        }
    }

    #[test]
    fn radius_results_grow_with_the_budget() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut store = SimStore::default();
        for id in 0..2_000i64 {
            store.insert_fingerprint(rng.gen::<u64>(), id);
        }
        let query = rng.gen::<u64>();
        let mut previous: Vec<i64> = Vec::new();
        for distance in [0u8, 4, 8, 16, 32, 64] {
            let mut ids = store.find_fingerprint(query, distance).ids;
            ids.sort_unstable();
            assert!(previous.iter().all(|id| ids.binary_search(id).is_ok()));
            previous = ids;
        }
        // the whole store is within 64 bits of anything
        assert_eq!(previous.len(), 2_000);
    }

    #[test]
    fn oversized_radius_behaves_like_sixty_four() {
        let mut store = SimStore::default();
        for id in 0..300i64 {
            store.insert_fingerprint((id as u64) << 8 | 0x17, id);
        }
        let everything = store.find_fingerprint(0, u8::MAX);
        assert_eq!(everything.ids.len(), 300);
    }

    #[test]
    fn split_redistributes_without_losing_entries() {
        let mut store = SimStore::default();
        for i in 0..256i64 {
            store.insert_fingerprint((i as u64) << 8 | 0xAB, i);
        }
        // still a single leaf at the cap
        assert_eq!(store.stats(), Stats { keys: 256, nodes: 0 });
        let mut before = store.find_fingerprint(0, 64).ids;
        before.sort_unstable();

        store.insert_fingerprint(256u64 << 8 | 0xAB, 256);

        // the root split on byte 0xAB and its lone child split in turn:
        // levels 0 and 1 are internal now
        let stats = store.stats();
        assert_eq!(stats.keys, 257);
        assert_eq!(stats.nodes, 1 + 256);

        let mut after = store.find_fingerprint(0, 64).ids;
        after.sort_unstable();
        before.push(256);
        assert_eq!(after, before);

        for i in 0..257i64 {
            assert_eq!(store.contains_fingerprint((i as u64) << 8 | 0xAB), Some(i));
        }
    }

    #[test]
    fn zero_radius_stays_on_its_own_path() {
        let mut store = SimStore::default();
        for i in 0..257i64 {
            store.insert_fingerprint((i as u64) << 8, i);
        }
        // level-0 byte of every key is 0x00, so the root has exactly one child
        let miss = store.find_fingerprint(0x50, 0);
        assert_eq!(miss.ids, Vec::<i64>::new());
        assert_eq!(miss.keys_checked, 0);
        assert_eq!(miss.nodes_checked, 1);

        // diverging only in the unresolved high bytes still reaches one leaf
        let deep_miss = store.find_fingerprint(0xDEAD_0000_0000_1200, 0);
        assert_eq!(deep_miss.ids, Vec::<i64>::new());
        assert_eq!(deep_miss.keys_checked, 1);
        assert_eq!(deep_miss.nodes_checked, 1 + 256);
    }

    #[test]
    fn identical_fingerprints_pile_up_at_the_deepest_level() {
        let mut store = SimStore::default();
        for id in 0..600i64 {
            store.insert_fingerprint(0xC0FF_EE00_DECA_F000, id);
        }
        // one chain of single children down to the level-7 leaf, which holds
        // everything and never splits
        assert_eq!(store.stats(), Stats { keys: 600, nodes: 7 });
        assert_eq!(store.contains_fingerprint(0xC0FF_EE00_DECA_F000), Some(0));

        let all = store.find_fingerprint(0xC0FF_EE00_DECA_F000, 0);
        assert_eq!(all.ids.len(), 600);
    }

    #[test]
    fn closest_is_optimal_over_random_keys() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut store = SimStore::default();
        let mut keys = Vec::new();
        for id in 0..5_000i64 {
            let key = rng.gen::<u64>();
            store.insert_fingerprint(key, id);
            keys.push(key);
        }
        for _ in 0..50 {
            let query = rng.gen::<u64>();
            let (best_key, best_id) = store.find_closest_fingerprint(query).unwrap();
            assert_eq!(keys[best_id as usize], best_key);
            let optimum = keys
                .iter()
                .map(|&k| hamming_distance(k, query))
                .min()
                .unwrap();
            assert_eq!(hamming_distance(best_key, query), optimum);
        }
    }

    #[test]
    fn exact_key_shortcuts_the_closest_search() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut store = SimStore::default();
        let mut keys = Vec::new();
        for id in 0..3_000i64 {
            let key = rng.gen::<u64>();
            store.insert_fingerprint(key, id);
            keys.push(key);
        }
        for id in (0..3_000usize).step_by(97) {
            let (best_key, _) = store.find_closest_fingerprint(keys[id]).unwrap();
            assert_eq!(best_key, keys[id]);
        }
    }

    #[test]
    fn pretty_summarises_the_tree() {
        let mut store = SimStore::default();
        let rendered = store.to_string();
        assert!(rendered.contains("keys [0/256]"));

        for i in 0..300i64 {
            store.insert_fingerprint((i as u64) << 8 | 0x01, i);
        }
        let rendered = store.to_string();
        assert!(rendered.contains("level  0"));
        assert!(rendered.contains("001: "));
    }
}
