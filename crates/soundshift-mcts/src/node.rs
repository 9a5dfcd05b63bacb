use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};

use log::{debug, trace};
use rand::Rng;

use crate::error::{MctsError, Result};
use crate::word::{Abc, State};

/// Score assigned to pruned entries so they lose every comparison.
pub const PRUNED_SCORE: f32 = -9999.9;
/// Initial `max_value` before any backup has reached a node.
pub const VALUE_FLOOR: f32 = -9999.9;
/// Depth marker for the end node, which sits outside the search horizon.
pub const END_DEPTH: i32 = -1;
/// Rows in the evaluator's meta prior output: one for the state node's own
/// selection, one per chain phase.
pub const NUM_PRIOR_ROWS: usize = 7;

/// `(index, symbol)` pair returned by a selection.
pub type ChosenChar = (usize, Abc);
/// `(word order, position)` sites touched by one sub-action.
pub type Affected = Vec<(usize, usize)>;
/// Shared handle to a node.
pub type NodeRef = Arc<Node>;

// ---------------------------------------------------------------------------
// ActionPhase — position in the composite-action chain
// ---------------------------------------------------------------------------

/// Stage of a partial rule inside the seven-selection chain. A state node
/// makes the initial (implicit) selection; the six chain nodes follow in
/// this order, the last being the transition node.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum ActionPhase {
    Before,
    After,
    Pre,
    DPre,
    Post,
    SpecialType,
}

impl ActionPhase {
    /// Next stage in the chain, or `None` past the transition node.
    pub fn next(self) -> Option<ActionPhase> {
        match self {
            ActionPhase::Before => Some(ActionPhase::After),
            ActionPhase::After => Some(ActionPhase::Pre),
            ActionPhase::Pre => Some(ActionPhase::DPre),
            ActionPhase::DPre => Some(ActionPhase::Post),
            ActionPhase::Post => Some(ActionPhase::SpecialType),
            ActionPhase::SpecialType => None,
        }
    }

    /// Row of the base node's meta priors feeding this stage's selection.
    /// Row 0 belongs to the state node itself; the transition stage reads
    /// the special priors instead.
    pub fn prior_row(self) -> usize {
        self as usize + 1
    }
}

// ---------------------------------------------------------------------------
// Stats — per-node mutable search state, guarded by the node mutex
// ---------------------------------------------------------------------------

/// Back-edge to a parent: which node, and at which child slot. Weak so that
/// ownership flows strictly downward through `children`.
pub struct ParentLink {
    pub node: Weak<Node>,
    pub index: usize,
}

/// Everything a simulation reads or writes under the node mutex.
///
/// All per-child vectors share one length (the number of permissible
/// sub-actions); they are empty until expansion.
#[derive(Default)]
pub struct Stats {
    pub permissible: Vec<Abc>,
    pub affected: Vec<Affected>,
    pub children: Vec<Option<NodeRef>>,
    pub parents: Vec<ParentLink>,
    pub priors: Vec<f32>,
    pub pruned: Vec<bool>,
    pub action_counts: Vec<u32>,
    pub total_values: Vec<f32>,
    pub max_values: Vec<f32>,
    pub visit_count: u32,
    pub max_index: Option<usize>,
    pub max_value: f32,
    /// `None` until expansion; `Some(0)` means fully pruned.
    pub num_unpruned: Option<usize>,
    pub played: bool,
    /// Per-child transition rewards; populated only on transition nodes.
    pub rewards: Vec<f32>,
}

impl Stats {
    pub fn is_expanded(&self) -> bool {
        !self.permissible.is_empty()
    }

    pub fn is_evaluated(&self) -> bool {
        !self.priors.is_empty()
    }

    pub fn is_pruned(&self) -> bool {
        self.num_unpruned == Some(0)
    }

    pub fn num_actions(&self) -> usize {
        self.permissible.len()
    }

    /// Install the permissible sub-actions and zeroed per-child statistics.
    pub fn install_actions(
        &mut self,
        permissible: Vec<Abc>,
        affected: Vec<Affected>,
        with_rewards: bool,
    ) {
        debug_assert!(!self.is_expanded(), "install_actions: already expanded");
        debug_assert_eq!(permissible.len(), affected.len());
        let n = permissible.len();
        self.permissible = permissible;
        self.affected = affected;
        self.children = vec![None; n];
        self.pruned = vec![false; n];
        self.action_counts = vec![0; n];
        self.total_values = vec![0.0; n];
        self.max_values = vec![VALUE_FLOOR; n];
        self.visit_count = 0;
        self.max_index = None;
        self.max_value = VALUE_FLOOR;
        self.num_unpruned = Some(n);
        if with_rewards {
            self.rewards = vec![0.0; n];
        }
    }

    /// PUCT + affected-size heuristic + optional exploration noise.
    pub fn scores<R: Rng>(
        &self,
        puct_c: f32,
        heur_c: f32,
        add_noise: bool,
        rng: &mut R,
    ) -> Vec<f32> {
        debug_assert_eq!(self.priors.len(), self.pruned.len());
        let sqrt_ns = (self.visit_count as f32).sqrt();
        let mut scores = Vec::with_capacity(self.priors.len());
        for i in 0..self.priors.len() {
            if self.pruned[i] {
                scores.push(PRUNED_SCORE);
                continue;
            }
            let nsa = self.action_counts[i] as f32;
            let q = self.total_values[i] / (nsa + 1e-8);
            let u = puct_c * self.priors[i] * sqrt_ns / (1.0 + nsa);
            let h = heur_c * (self.affected[i].len() as f32).sqrt() / (1.0 + nsa);
            let noise = if add_noise { rng.gen_range(0.0..1e-8) } else { 0.0 };
            scores.push(q + u + h + noise);
        }
        scores
    }

    /// Inflate statistics for an in-flight simulation, biasing concurrent
    /// selectors away from this edge until the matching backup.
    pub fn virtual_select(&mut self, index: usize, game_count: u32, virtual_loss: f32) {
        self.action_counts[index] += game_count;
        self.total_values[index] -= game_count as f32 * virtual_loss;
        self.visit_count += game_count;
    }

    /// Reverse a virtual select and record the simulation outcome `value`.
    ///
    /// Nets one visit on the edge and adds exactly `value` to its total.
    /// An unmatched call (no prior virtual select) is a fatal assertion.
    pub fn update_stats(&mut self, index: usize, value: f32, game_count: u32, virtual_loss: f32) {
        assert!(
            self.action_counts[index] >= game_count,
            "update_stats: backup without matching virtual select at index {index} \
             (count {}, game_count {game_count})",
            self.action_counts[index],
        );
        self.action_counts[index] -= game_count - 1;
        if value > self.max_value {
            self.max_value = value;
            self.max_index = Some(index);
        }
        if value > self.max_values[index] {
            self.max_values[index] = value;
        }
        self.total_values[index] += game_count as f32 * virtual_loss + value;
        self.visit_count -= game_count - 1;
    }

    /// Index of the best-scoring sub-action (first index wins ties). Used
    /// by the driver so that selection and the virtual select share one
    /// guard.
    pub fn best_action_index<R: Rng>(
        &self,
        puct_c: f32,
        heur_c: f32,
        add_noise: bool,
        rng: &mut R,
    ) -> usize {
        let scores = self.scores(puct_c, heur_c, add_noise, rng);
        argmax(&scores)
    }

    fn parent_links(&self) -> Vec<(Weak<Node>, usize)> {
        self.parents
            .iter()
            .map(|link| (Weak::clone(&link.node), link.index))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Evaluation — priors returned by the external evaluator
// ---------------------------------------------------------------------------

/// Evaluator output cached on a state node: `NUM_PRIOR_ROWS` meta rows over
/// the alphabet, plus the special-type distribution. Chain nodes gather
/// their priors from here without a second evaluator round trip.
pub struct Evaluation {
    pub meta_priors: Vec<Vec<f32>>,
    pub special_priors: Vec<f32>,
}

/// Gather `full[c]` for each permissible symbol and normalize.
pub fn gather_normalized(full: &[f32], permissible: &[Abc]) -> Vec<f32> {
    let mut out: Vec<f32> = permissible.iter().map(|&c| full[c as usize]).collect();
    let sum: f32 = 1e-8 + out.iter().sum::<f32>();
    for p in &mut out {
        *p /= sum;
    }
    out
}

// ---------------------------------------------------------------------------
// Node — tagged kinds instead of an inheritance tree
// ---------------------------------------------------------------------------

pub enum NodeKind {
    /// Full search state. Canonicalised through the transposition table.
    Tree {
        words: State,
        depth: i32,
        eval: RwLock<Option<Evaluation>>,
    },
    /// Partial rule: the first `prefix.len()` sub-actions are committed.
    Mini {
        base: Weak<Node>,
        phase: ActionPhase,
        prefix: Vec<Abc>,
    },
    /// Sixth chain node; carries per-child rewards, children are state nodes.
    Transition { base: Weak<Node>, prefix: Vec<Abc> },
}

/// Greedy policy used by `play_mini`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum PlayPolicy {
    /// Follow the best observed return (`max_index`).
    #[default]
    MaxValue,
    /// Follow the most visited edge.
    MostVisited,
}

pub struct Node {
    pub stopped: bool,
    persistent: AtomicBool,
    stats: Mutex<Stats>,
    kind: NodeKind,
}

impl Node {
    pub fn new_tree(words: State, depth: i32, stopped: bool, persistent: bool) -> NodeRef {
        Arc::new(Self {
            stopped,
            persistent: AtomicBool::new(persistent),
            stats: Mutex::new(Stats::default()),
            kind: NodeKind::Tree {
                words,
                depth,
                eval: RwLock::new(None),
            },
        })
    }

    pub fn new_mini(base: &NodeRef, phase: ActionPhase, prefix: Vec<Abc>) -> NodeRef {
        debug_assert!(phase != ActionPhase::SpecialType, "the last chain node is transitional");
        Arc::new(Self {
            stopped: base.stopped,
            persistent: AtomicBool::new(false),
            stats: Mutex::new(Stats::default()),
            kind: NodeKind::Mini {
                base: Arc::downgrade(base),
                phase,
                prefix,
            },
        })
    }

    pub fn new_transition(base: &NodeRef, prefix: Vec<Abc>) -> NodeRef {
        Arc::new(Self {
            stopped: base.stopped,
            persistent: AtomicBool::new(false),
            stats: Mutex::new(Stats::default()),
            kind: NodeKind::Transition {
                base: Arc::downgrade(base),
                prefix,
            },
        })
    }

    // --- Kind queries ---

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_tree_node(&self) -> bool {
        matches!(self.kind, NodeKind::Tree { .. })
    }

    pub fn is_transitional(&self) -> bool {
        matches!(self.kind, NodeKind::Transition { .. })
    }

    /// Chain stage, `None` for state nodes.
    pub fn phase(&self) -> Option<ActionPhase> {
        match &self.kind {
            NodeKind::Tree { .. } => None,
            NodeKind::Mini { phase, .. } => Some(*phase),
            NodeKind::Transition { .. } => Some(ActionPhase::SpecialType),
        }
    }

    /// Committed sub-action symbols along the chain to this node.
    pub fn prefix(&self) -> &[Abc] {
        match &self.kind {
            NodeKind::Tree { .. } => &[],
            NodeKind::Mini { prefix, .. } | NodeKind::Transition { prefix, .. } => prefix,
        }
    }

    /// Owning state node of a chain node.
    pub fn base(&self) -> Option<NodeRef> {
        match &self.kind {
            NodeKind::Tree { .. } => None,
            NodeKind::Mini { base, .. } | NodeKind::Transition { base, .. } => base.upgrade(),
        }
    }

    pub fn words(&self) -> Option<&State> {
        match &self.kind {
            NodeKind::Tree { words, .. } => Some(words),
            _ => None,
        }
    }

    /// State of a tree node; fatal on chain nodes.
    pub fn state(&self) -> &State {
        self.words().expect("state() called on a chain node")
    }

    pub fn depth(&self) -> i32 {
        match &self.kind {
            NodeKind::Tree { depth, .. } => *depth,
            _ => panic!("depth() called on a chain node"),
        }
    }

    pub fn dist(&self) -> f32 {
        self.state().dist
    }

    pub fn done(&self) -> bool {
        self.state().done
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent.load(Relaxed)
    }

    pub fn make_persistent(&self) {
        self.persistent.store(true, Relaxed);
    }

    // --- Locked access ---

    /// The node mutex. Callers hold at most one node's guard at a time.
    pub fn stats(&self) -> MutexGuard<'_, Stats> {
        self.stats.lock().unwrap()
    }

    pub fn is_expanded(&self) -> bool {
        self.stats().is_expanded()
    }

    pub fn is_evaluated(&self) -> bool {
        self.stats().is_evaluated()
    }

    /// A state node is a leaf until it has been evaluated.
    pub fn is_leaf(&self) -> bool {
        !self.stats().is_evaluated()
    }

    pub fn is_pruned(&self) -> bool {
        self.stats().is_pruned()
    }

    pub fn visit_count(&self) -> u32 {
        self.stats().visit_count
    }

    pub fn num_actions(&self) -> usize {
        self.stats().num_actions()
    }

    pub fn action_counts(&self) -> Vec<u32> {
        self.stats().action_counts.clone()
    }

    pub fn total_values(&self) -> Vec<f32> {
        self.stats().total_values.clone()
    }

    pub fn priors(&self) -> Vec<f32> {
        self.stats().priors.clone()
    }

    pub fn max_value(&self) -> f32 {
        self.stats().max_value
    }

    pub fn max_index(&self) -> Option<usize> {
        self.stats().max_index
    }

    /// Child behind action `index`, as a caller-visible error when the index
    /// is out of range or the edge has never been taken.
    pub fn child(&self, index: usize) -> Result<NodeRef> {
        let st = self.stats();
        if index >= st.children.len() {
            return Err(MctsError::OutOfBounds {
                index,
                len: st.children.len(),
            });
        }
        st.children[index]
            .as_ref()
            .map(Arc::clone)
            .ok_or(MctsError::UnexploredEdge { index })
    }

    /// Slot index of `symbol` among the permissible sub-actions.
    pub fn action_index(&self, symbol: Abc) -> Result<usize> {
        let st = self.stats();
        st.permissible
            .iter()
            .position(|&c| c == symbol)
            .ok_or(MctsError::OutOfBounds {
                index: symbol as usize,
                len: st.permissible.len(),
            })
    }

    // --- Wiring ---

    /// Install `child` at `index` unless another thread got there first; the
    /// installed (or already-present) child is returned and the candidate is
    /// discarded on a race. The parent back-link is pushed under the child's
    /// own lock, after the parent lock has been released.
    pub fn attach_child(self: &Arc<Self>, index: usize, child: NodeRef, reward: Option<f32>) -> NodeRef {
        {
            let mut st = self.stats();
            debug_assert!(index < st.children.len(), "attach_child: index {index} out of range");
            if let Some(existing) = &st.children[index] {
                return Arc::clone(existing);
            }
            st.children[index] = Some(Arc::clone(&child));
            if let Some(r) = reward {
                debug_assert!(self.is_transitional(), "rewards live on transition nodes");
                st.rewards[index] = r;
            }
        }
        child.stats().parents.push(ParentLink {
            node: Arc::downgrade(self),
            index,
        });
        child
    }

    // --- Selection ---

    /// Best sub-action under PUCT + heuristic + optional noise. Ties go to
    /// the first index. Preconditions: expanded, evaluated, and not a
    /// stopped state node.
    pub fn best_subaction<R: Rng>(
        &self,
        puct_c: f32,
        heur_c: f32,
        add_noise: bool,
        rng: &mut R,
    ) -> ChosenChar {
        let st = self.stats();
        assert!(
            st.is_expanded() && st.is_evaluated(),
            "best_subaction: node not expanded or not evaluated"
        );
        assert!(
            !(self.stopped && self.is_tree_node()),
            "best_subaction: selection on a stopped state node"
        );
        let index = st.best_action_index(puct_c, heur_c, add_noise, rng);
        trace!("best subaction ({}, {})", index, st.permissible[index]);
        (index, st.permissible[index])
    }

    /// Greedy step for acting on the real environment. Preconditions: at
    /// least one backup has reached this node and the chosen edge is
    /// connected.
    pub fn play_mini(&self, policy: PlayPolicy) -> (NodeRef, ChosenChar) {
        let mut st = self.stats();
        let index = match policy {
            PlayPolicy::MaxValue => st
                .max_index
                .expect("play_mini: no backup has reached this node"),
            PlayPolicy::MostVisited => {
                assert!(st.is_expanded(), "play_mini: node not expanded");
                let mut best = 0;
                for i in 1..st.action_counts.len() {
                    if st.action_counts[i] > st.action_counts[best] {
                        best = i;
                    }
                }
                best
            }
        };
        st.played = true;
        let child = st.children[index]
            .as_ref()
            .map(Arc::clone)
            .expect("play_mini: chosen edge is not connected");
        (child, (index, st.permissible[index]))
    }

    // --- Evaluation ---

    /// Attach evaluator output to a state node and derive its own priors
    /// from row 0. Idempotent once evaluated; expansion must come first.
    pub fn evaluate(&self, meta_priors: Vec<Vec<f32>>, special_priors: Vec<f32>) {
        let NodeKind::Tree { eval, .. } = &self.kind else {
            panic!("evaluate: chain nodes derive priors from their base");
        };
        assert_eq!(
            meta_priors.len(),
            NUM_PRIOR_ROWS,
            "evaluate: expected {NUM_PRIOR_ROWS} meta prior rows"
        );
        let row0 = meta_priors[0].clone();
        *eval.write().unwrap() = Some(Evaluation {
            meta_priors,
            special_priors,
        });
        let mut st = self.stats();
        assert!(st.is_expanded(), "evaluate: node not expanded");
        if st.is_evaluated() {
            return;
        }
        st.priors = gather_normalized(&row0, &st.permissible);
    }

    /// Mix external noise into the cached priors and re-derive the node's
    /// own selection priors. Root-only in practice.
    pub fn add_noise(&self, meta_noise: &[Vec<f32>], special_noise: &[f32], ratio: f32) {
        let NodeKind::Tree { eval, .. } = &self.kind else {
            panic!("add_noise: chain nodes derive priors from their base");
        };
        let row0 = {
            let mut guard = eval.write().unwrap();
            let cached = guard.as_mut().expect("add_noise: node not evaluated");
            for (row, noise_row) in cached.meta_priors.iter_mut().zip(meta_noise) {
                for (p, &n) in row.iter_mut().zip(noise_row) {
                    *p = *p * (1.0 - ratio) + n * ratio;
                }
            }
            for (p, &n) in cached.special_priors.iter_mut().zip(special_noise) {
                *p = *p * (1.0 - ratio) + n * ratio;
            }
            cached.meta_priors[0].clone()
        };
        let mut st = self.stats();
        if st.is_expanded() {
            st.priors = gather_normalized(&row0, &st.permissible);
        }
    }

    /// Derive a chain node's priors from its base state node's cached
    /// evaluation: meta row `phase.prior_row()`, or the special priors on
    /// the transition node. Idempotent.
    pub fn evaluate_from_base(&self) {
        let (base, row) = match &self.kind {
            NodeKind::Mini { base, phase, .. } => (base, Some(phase.prior_row())),
            NodeKind::Transition { base, .. } => (base, None),
            NodeKind::Tree { .. } => panic!("evaluate_from_base: state nodes use evaluate()"),
        };
        let base = base.upgrade().expect("evaluate_from_base: base node dropped");
        let NodeKind::Tree { eval, .. } = &base.kind else {
            unreachable!("chain nodes always hang off a state node");
        };
        let guard = eval.read().unwrap();
        let cached = guard
            .as_ref()
            .expect("evaluate_from_base: base node not evaluated");
        let source = match row {
            Some(r) => &cached.meta_priors[r],
            None => &cached.special_priors,
        };
        let mut st = self.stats();
        if st.is_evaluated() {
            return;
        }
        assert!(st.is_expanded(), "evaluate_from_base: node not expanded");
        st.priors = gather_normalized(source, &st.permissible);
    }

    // --- Pruning ---

    /// Mark action `index` ineligible. Idempotent. If this exhausts the
    /// node's actions, the prune propagates to every parent at its back
    /// index. Locks are taken one node at a time; re-pruning an already
    /// pruned slot stops the walk, which also terminates on cyclic graphs.
    pub fn prune_at(self: &Arc<Self>, index: usize) {
        let parents = {
            let mut st = self.stats();
            debug_assert!(index < st.pruned.len(), "prune_at: index {index} out of range");
            if st.pruned[index] {
                return;
            }
            st.pruned[index] = true;
            if let Some(n) = st.num_unpruned.as_mut() {
                *n -= 1;
            }
            if !st.is_pruned() {
                return;
            }
            st.parent_links()
        };
        debug!("node fully pruned, propagating to {} parents", parents.len());
        for (parent, idx) in parents {
            if let Some(parent) = parent.upgrade() {
                parent.prune_at(idx);
            }
        }
    }

    /// Prune every action of this node and propagate upward. Also used when
    /// expansion finds no permissible sub-action at all.
    pub fn prune_all(self: &Arc<Self>) {
        let parents = {
            let mut st = self.stats();
            if st.is_pruned() {
                return;
            }
            st.num_unpruned = Some(0);
            st.pruned.iter_mut().for_each(|p| *p = true);
            st.parent_links()
        };
        debug!("node pruned entirely, propagating to {} parents", parents.len());
        for (parent, idx) in parents {
            if let Some(parent) = parent.upgrade() {
                parent.prune_at(idx);
            }
        }
    }
}

/// First-wins argmax over raw scores.
fn argmax(scores: &[f32]) -> usize {
    debug_assert!(!scores.is_empty(), "argmax over no scores");
    let mut best = 0;
    for i in 1..scores.len() {
        if scores[i] > scores[best] {
            best = i;
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
