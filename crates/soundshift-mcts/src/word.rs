use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ndarray::{Array2, ArrayView2};

use crate::error::{MctsError, Result};

// ---------------------------------------------------------------------------
// Symbols
// ---------------------------------------------------------------------------

/// Symbol id drawn from a fixed alphabet.
pub type Abc = u16;

/// Ordered sequence of symbols.
pub type IdSeq = Vec<Abc>;

/// Padding cell in dense arrays. Never appears inside a word.
pub const PAD: Abc = 0;
/// Terminates the search along this branch when chosen as a target symbol.
pub const STOP: Abc = 1;
/// Wildcard context: matches any neighbour, including a word boundary.
pub const ANY: Abc = 2;
/// Plain-substitution rule flavour.
pub const SPECIAL_BASIC: Abc = 3;
/// Real alphabet ids start here.
pub const NUM_RESERVED: Abc = 4;

// ---------------------------------------------------------------------------
// Word — canonical symbol sequence
// ---------------------------------------------------------------------------

/// A canonical word: equal content implies shared identity (same `Arc`).
///
/// Edit distance against the target at a given order is computed lazily and
/// cached per order, since the same word can sit at several orders across
/// states.
#[derive(Debug)]
pub struct Word {
    id_seq: IdSeq,
    key: u32,
    dists: Mutex<HashMap<usize, f32>>,
}

impl Word {
    pub fn id_seq(&self) -> &[Abc] {
        &self.id_seq
    }

    pub fn len(&self) -> usize {
        self.id_seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_seq.is_empty()
    }

    /// Stable intern key, unique per distinct content within one `WordSpace`.
    pub fn key(&self) -> u32 {
        self.key
    }
}

// ---------------------------------------------------------------------------
// WordSpace — interner + distance oracle
// ---------------------------------------------------------------------------

struct Interner {
    map: HashMap<IdSeq, Arc<Word>>,
    next_key: u32,
}

/// Interns words by content and answers per-order edit distances against the
/// target vocabulary.
pub struct WordSpace {
    inner: Mutex<Interner>,
    targets: Vec<Arc<Word>>,
}

impl WordSpace {
    /// Build a word space whose distance targets are `target_seqs` (one
    /// target word per order).
    pub fn new(target_seqs: Vec<IdSeq>) -> Arc<Self> {
        let space = Self {
            inner: Mutex::new(Interner {
                map: HashMap::new(),
                next_key: 0,
            }),
            targets: Vec::new(),
        };
        // Intern the targets through the same table so target words share
        // identity with search words of equal content.
        let targets: Vec<Arc<Word>> = target_seqs.into_iter().map(|s| space.get_word(s)).collect();
        Arc::new(Self { targets, ..space })
    }

    pub fn num_orders(&self) -> usize {
        self.targets.len()
    }

    pub fn target_at(&self, order: usize) -> &Arc<Word> {
        &self.targets[order]
    }

    /// Canonical word for `seq`. Equal content returns the same `Arc`.
    pub fn get_word(&self, seq: IdSeq) -> Arc<Word> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(word) = inner.map.get(&seq) {
            return Arc::clone(word);
        }
        let key = inner.next_key;
        inner.next_key += 1;
        let word = Arc::new(Word {
            id_seq: seq.clone(),
            key,
            dists: Mutex::new(HashMap::new()),
        });
        inner.map.insert(seq, Arc::clone(&word));
        word
    }

    pub fn num_words(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    /// Edit distance of `word` against the target at `order`, cached.
    pub fn edit_dist_at(&self, word: &Word, order: usize) -> f32 {
        assert!(
            order < self.targets.len(),
            "edit_dist_at: order {order} beyond {} targets",
            self.targets.len()
        );
        {
            let dists = word.dists.lock().unwrap();
            if let Some(&d) = dists.get(&order) {
                return d;
            }
        }
        let d = levenshtein(&word.id_seq, &self.targets[order].id_seq) as f32;
        word.dists.lock().unwrap().insert(order, d);
        d
    }

    /// Intern every sequence and derive the state's distance and done flag.
    pub fn state(&self, seqs: Vec<IdSeq>) -> State {
        let words = seqs.into_iter().map(|s| self.get_word(s)).collect();
        self.state_of(words)
    }

    /// Build a state from already-interned words.
    pub fn state_of(&self, words: Vec<Arc<Word>>) -> State {
        let dist: f32 = words
            .iter()
            .enumerate()
            .map(|(order, w)| self.edit_dist_at(w, order))
            .sum();
        State {
            words,
            dist,
            done: dist == 0.0,
        }
    }

    /// Convert a dense `[N, M]` id array plus per-row lengths into a state.
    ///
    /// Cells beyond `lengths[i]` must hold `PAD`; anything else is a
    /// caller-visible error.
    pub fn state_from_padded(&self, ids: ArrayView2<'_, i64>, lengths: &[usize]) -> Result<State> {
        let (n, m) = ids.dim();
        assert_eq!(n, lengths.len(), "state_from_padded: one length per row");
        let mut seqs = Vec::with_capacity(n);
        for (row, &len) in lengths.iter().enumerate() {
            assert!(len <= m, "state_from_padded: length {len} beyond row width {m}");
            for col in len..m {
                if ids[[row, col]] != PAD as i64 {
                    return Err(MctsError::BadPadding { row, col });
                }
            }
            let seq: IdSeq = (0..len).map(|col| ids[[row, col]] as Abc).collect();
            seqs.push(seq);
        }
        Ok(self.state(seqs))
    }
}

/// Pack a state back into a dense `[N, M']` array padded with `PAD`, where
/// `M'` is the longest word in the state.
pub fn to_padded(state: &State) -> (Array2<i64>, Vec<usize>) {
    let n = state.len();
    let m = state.words.iter().map(|w| w.len()).max().unwrap_or(0);
    let mut ids = Array2::from_elem((n, m), PAD as i64);
    let mut lengths = Vec::with_capacity(n);
    for (row, word) in state.words.iter().enumerate() {
        for (col, &unit) in word.id_seq().iter().enumerate() {
            ids[[row, col]] = unit as i64;
        }
        lengths.push(word.len());
    }
    (ids, lengths)
}

// ---------------------------------------------------------------------------
// State — ordered words + derived distance
// ---------------------------------------------------------------------------

/// Immutable search state: an ordered sequence of canonical words.
///
/// Two states are equal iff they have the same length and word identities in
/// order. `dist` is the sum of per-order edit distances; `done` iff zero.
#[derive(Clone, Debug)]
pub struct State {
    pub words: Vec<Arc<Word>>,
    pub dist: f32,
    pub done: bool,
}

impl State {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Word-identity tuple used as the transposition key.
    pub fn key(&self) -> Vec<u32> {
        self.words.iter().map(|w| w.key()).collect()
    }

    pub fn id_seq_at(&self, order: usize) -> &[Abc] {
        self.words[order].id_seq()
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.words.len() == other.words.len()
            && self
                .words
                .iter()
                .zip(&other.words)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

impl Eq for State {}

// ---------------------------------------------------------------------------
// levenshtein
// ---------------------------------------------------------------------------

/// Plain two-row Levenshtein over symbol slices.
pub fn levenshtein(a: &[Abc], b: &[Abc]) -> u32 {
    if a.is_empty() {
        return b.len() as u32;
    }
    if b.is_empty() {
        return a.len() as u32;
    }
    let mut prev: Vec<u32> = (0..=b.len() as u32).collect();
    let mut cur = vec![0u32; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        cur[0] = i as u32 + 1;
        for (j, &cb) in b.iter().enumerate() {
            let sub = prev[j] + u32::from(ca != cb);
            cur[j + 1] = sub.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // ---- levenshtein ----

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein(&[], &[]), 0);
        assert_eq!(levenshtein(&[4, 5, 6], &[4, 5, 6]), 0);
        assert_eq!(levenshtein(&[4, 5, 6], &[]), 3);
        assert_eq!(levenshtein(&[], &[4, 5]), 2);
        // One substitution.
        assert_eq!(levenshtein(&[4, 5, 6], &[4, 7, 6]), 1);
        // One insertion.
        assert_eq!(levenshtein(&[4, 6], &[4, 5, 6]), 1);
        // Disjoint content.
        assert_eq!(levenshtein(&[4, 4], &[5, 5, 5]), 3);
    }

    // ---- interning ----

    #[test]
    fn words_intern_by_content() {
        let space = WordSpace::new(vec![vec![4, 5, 6]]);
        let a = space.get_word(vec![4, 5]);
        let b = space.get_word(vec![4, 5]);
        let c = space.get_word(vec![4, 6]);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn targets_share_identity_with_search_words() {
        let space = WordSpace::new(vec![vec![4, 5, 6]]);
        let w = space.get_word(vec![4, 5, 6]);
        assert!(Arc::ptr_eq(&w, space.target_at(0)));
    }

    // ---- distances and states ----

    #[test]
    fn state_dist_sums_per_order() {
        let space = WordSpace::new(vec![vec![4, 5, 6], vec![7, 7]]);
        // Order 0 off by one substitution, order 1 exact.
        let state = space.state(vec![vec![4, 5, 7], vec![7, 7]]);
        assert!((state.dist - 1.0).abs() < 1e-6);
        assert!(!state.done);
    }

    #[test]
    fn state_done_iff_zero_dist() {
        let space = WordSpace::new(vec![vec![4, 5, 6]]);
        let state = space.state(vec![vec![4, 5, 6]]);
        assert!((state.dist - 0.0).abs() < 1e-6);
        assert!(state.done);
    }

    #[test]
    fn state_equality_is_by_word_identity() {
        let space = WordSpace::new(vec![vec![4, 5, 6]]);
        let a = space.state(vec![vec![4, 5]]);
        let b = space.state(vec![vec![4, 5]]);
        let c = space.state(vec![vec![4, 6]]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn dist_cache_is_per_order() {
        let space = WordSpace::new(vec![vec![4, 5], vec![4, 5, 6, 7]]);
        let w = space.get_word(vec![4, 5]);
        assert!((space.edit_dist_at(&w, 0) - 0.0).abs() < 1e-6);
        assert!((space.edit_dist_at(&w, 1) - 2.0).abs() < 1e-6);
        // Cached lookups agree.
        assert!((space.edit_dist_at(&w, 0) - 0.0).abs() < 1e-6);
        assert!((space.edit_dist_at(&w, 1) - 2.0).abs() < 1e-6);
    }

    // ---- padded round trip ----

    #[test]
    fn padded_round_trip() {
        let space = WordSpace::new(vec![vec![4, 5, 6], vec![7, 7]]);
        let ids = array![[4i64, 5, 6, 0], [7, 7, 0, 0]];
        let lengths = [3usize, 2];

        let state = space.state_from_padded(ids.view(), &lengths).unwrap();
        assert_eq!(state.id_seq_at(0), &[4, 5, 6]);
        assert_eq!(state.id_seq_at(1), &[7, 7]);

        let (out, out_lengths) = to_padded(&state);
        assert_eq!(out_lengths, vec![3, 2]);
        assert!(out.dim().1 >= 3);
        for (row, &len) in out_lengths.iter().enumerate() {
            for col in 0..len {
                assert_eq!(out[[row, col]], ids[[row, col]]);
            }
            for col in len..out.dim().1 {
                assert_eq!(out[[row, col]], PAD as i64);
            }
        }
    }

    #[test]
    fn bad_padding_is_an_error() {
        let space = WordSpace::new(vec![vec![4, 5, 6]]);
        let ids = array![[4i64, 5, 9]];
        let err = space.state_from_padded(ids.view(), &[2]).unwrap_err();
        match err {
            MctsError::BadPadding { row, col } => {
                assert_eq!((row, col), (0, 2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
