//! The action space: the only component aware of what the seven
//! sub-selections mean. A composite action is a rewrite rule
//! `before -> after / d_pre pre _ post d_post` plus a rule flavour; each
//! chain stage narrows the set of sites the rule will touch.

use std::collections::BTreeMap;

use log::trace;

use crate::node::{ActionPhase, Affected, NodeRef};
use crate::word::{Abc, State, ANY, NUM_RESERVED, SPECIAL_BASIC, STOP};

// ---------------------------------------------------------------------------
// RuleAction — a completed 7-tuple
// ---------------------------------------------------------------------------

/// Fully specified rewrite rule. `pre`/`d_pre`/`post`/`d_post` may be `ANY`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RuleAction {
    pub before: Abc,
    pub after: Abc,
    pub pre: Abc,
    pub d_pre: Abc,
    pub post: Abc,
    pub d_post: Abc,
    pub special: Abc,
}

impl RuleAction {
    /// Assemble a rule from the six committed chain symbols plus the
    /// transition node's selection.
    pub fn from_chain(prefix: &[Abc], special: Abc) -> Self {
        assert_eq!(prefix.len(), 6, "from_chain: expected six committed sub-actions");
        Self {
            before: prefix[0],
            after: prefix[1],
            pre: prefix[2],
            d_pre: prefix[3],
            post: prefix[4],
            d_post: prefix[5],
            special,
        }
    }

    /// Sites of `state` the rule applies to.
    pub fn matching_sites(&self, state: &State) -> Affected {
        surviving_sites(
            state,
            &[
                self.before,
                self.after,
                self.pre,
                self.d_pre,
                self.post,
                self.d_post,
            ],
        )
    }
}

// ---------------------------------------------------------------------------
// Site scanning
// ---------------------------------------------------------------------------

/// All `(order, position)` sites holding `symbol`.
fn occurrences(state: &State, symbol: Abc) -> Affected {
    let mut sites = Vec::new();
    for (order, word) in state.words.iter().enumerate() {
        for (pos, &unit) in word.id_seq().iter().enumerate() {
            if unit == symbol {
                sites.push((order, pos));
            }
        }
    }
    sites
}

/// Does the neighbour at `offset` from the site match `want`? `ANY` matches
/// everything, including a word boundary.
fn context_matches(state: &State, site: (usize, usize), offset: isize, want: Abc) -> bool {
    if want == ANY {
        return true;
    }
    neighbour(state, site, offset) == Some(want)
}

fn neighbour(state: &State, (order, pos): (usize, usize), offset: isize) -> Option<Abc> {
    let seq = state.id_seq_at(order);
    let p = pos as isize + offset;
    if p < 0 || p as usize >= seq.len() {
        None
    } else {
        Some(seq[p as usize])
    }
}

/// Sites of `state` that survive the committed chain prefix
/// `[before, after, pre, d_pre, post, d_post]` (any tail may be absent).
fn surviving_sites(state: &State, prefix: &[Abc]) -> Affected {
    let mut sites = occurrences(state, prefix[0]);
    // prefix[1] is the replacement; it never narrows the sites.
    for (slot, offset) in [(2usize, -1isize), (3, -2), (4, 1), (5, 2)] {
        if let Some(&want) = prefix.get(slot) {
            sites.retain(|&site| context_matches(state, site, offset, want));
        }
    }
    sites
}

// ---------------------------------------------------------------------------
// ActionSpace
// ---------------------------------------------------------------------------

/// A rule candidate with the sites it would touch, used for evaluator
/// batching ahead of the search.
pub struct PotentialAction {
    pub action: RuleAction,
    pub sites: Affected,
}

/// Edge catalog plus the per-phase permissible computation. Owns no nodes.
pub struct ActionSpace {
    alphabet_size: usize,
    edges: BTreeMap<Abc, Vec<Abc>>,
}

impl ActionSpace {
    pub fn new(alphabet_size: usize) -> Self {
        assert!(
            alphabet_size > NUM_RESERVED as usize,
            "alphabet must extend past the reserved ids"
        );
        Self {
            alphabet_size,
            edges: BTreeMap::new(),
        }
    }

    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    /// Record that `before` may be rewritten into `after`. Duplicate
    /// registrations are ignored.
    pub fn register_edge(&mut self, before: Abc, after: Abc) {
        assert!(
            before >= NUM_RESERVED && after >= NUM_RESERVED,
            "register_edge: reserved ids cannot take part in rules"
        );
        assert!(
            (before as usize) < self.alphabet_size && (after as usize) < self.alphabet_size,
            "register_edge: symbol beyond the alphabet"
        );
        assert_ne!(before, after, "register_edge: identity rewrite");
        let afters = self.edges.entry(before).or_default();
        if !afters.contains(&after) {
            afters.push(after);
        }
    }

    pub fn num_edges(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    // --- Expansion ---

    /// Populate `node`'s permissible sub-actions and affected sites for its
    /// pending selection, conditioned on the committed chain prefix. A node
    /// with nothing permissible is marked fully pruned instead.
    ///
    /// The candidate computation is pure and runs outside the node mutex;
    /// only the install takes the lock, and a concurrent expansion simply
    /// loses the install race.
    pub fn set_action_allowed(&self, node: &NodeRef) {
        {
            let st = node.stats();
            if st.is_expanded() || st.is_pruned() {
                return;
            }
        }
        let (permissible, affected) = match node.words() {
            Some(state) => {
                if node.stopped {
                    return;
                }
                self.state_phase_actions(state)
            }
            None => {
                let base = node.base().expect("chain node outlived its base");
                let phase = node.phase().expect("chain node has a phase");
                self.chain_phase_actions(base.state(), phase, node.prefix())
            }
        };
        trace!("expanding node with {} permissible sub-actions", permissible.len());
        if permissible.is_empty() {
            node.prune_all();
            return;
        }
        let mut st = node.stats();
        if st.is_expanded() {
            return;
        }
        st.install_actions(permissible, affected, node.is_transitional());
    }

    /// Initial selection at a state node: stop, or pick a rewrite target
    /// that occurs in the state and has at least one registered edge.
    pub(crate) fn state_phase_actions(&self, state: &State) -> (Vec<Abc>, Vec<Affected>) {
        let mut permissible = vec![STOP];
        let mut affected = vec![Vec::new()];
        for &before in self.edges.keys() {
            let sites = occurrences(state, before);
            if !sites.is_empty() {
                permissible.push(before);
                affected.push(sites);
            }
        }
        (permissible, affected)
    }

    /// Pending selection at a chain node, given the committed prefix.
    fn chain_phase_actions(
        &self,
        state: &State,
        phase: ActionPhase,
        prefix: &[Abc],
    ) -> (Vec<Abc>, Vec<Affected>) {
        debug_assert_eq!(
            prefix.len(),
            phase as usize + 1,
            "chain prefix length must match the phase"
        );
        let sites = surviving_sites(state, prefix);
        match phase {
            // Choose the replacement symbol; every candidate touches the
            // same target sites.
            ActionPhase::Before => {
                let afters = self.edges.get(&prefix[0]).cloned().unwrap_or_default();
                let affected = afters.iter().map(|_| sites.clone()).collect();
                (afters, affected)
            }
            ActionPhase::After => context_candidates(state, &sites, -1),
            ActionPhase::Pre => {
                if prefix[2] == ANY {
                    (vec![ANY], vec![sites])
                } else {
                    context_candidates(state, &sites, -2)
                }
            }
            ActionPhase::DPre => context_candidates(state, &sites, 1),
            ActionPhase::Post => {
                if prefix[4] == ANY {
                    (vec![ANY], vec![sites])
                } else {
                    context_candidates(state, &sites, 2)
                }
            }
            ActionPhase::SpecialType => (vec![SPECIAL_BASIC], vec![sites]),
        }
    }

    // --- Exploration ---

    /// Context-free rule candidates present in `node`'s state: one per
    /// registered edge whose source occurs, with the sites it would touch.
    /// Deterministic order (sorted by source, registration order within).
    pub fn find_potential_actions(&self, node: &NodeRef) -> Vec<PotentialAction> {
        let state = node.state();
        let mut out = Vec::new();
        for (&before, afters) in &self.edges {
            let sites = occurrences(state, before);
            if sites.is_empty() {
                continue;
            }
            for &after in afters {
                out.push(PotentialAction {
                    action: RuleAction {
                        before,
                        after,
                        pre: ANY,
                        d_pre: ANY,
                        post: ANY,
                        d_post: ANY,
                        special: SPECIAL_BASIC,
                    },
                    sites: sites.clone(),
                });
            }
        }
        out
    }
}

/// Context candidates at `offset` from the surviving sites: `ANY` first
/// (keeps every site), then the distinct neighbour symbols in sorted order,
/// each keeping only the sites it actually borders.
fn context_candidates(state: &State, sites: &Affected, offset: isize) -> (Vec<Abc>, Vec<Affected>) {
    let mut by_symbol: BTreeMap<Abc, Affected> = BTreeMap::new();
    for &site in sites {
        if let Some(symbol) = neighbour(state, site, offset) {
            by_symbol.entry(symbol).or_default().push(site);
        }
    }
    let mut permissible = vec![ANY];
    let mut affected = vec![sites.clone()];
    for (symbol, subset) in by_symbol {
        permissible.push(symbol);
        affected.push(subset);
    }
    (permissible, affected)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ActionPhase, Node};
    use crate::word::WordSpace;
    use std::sync::Arc;

    const A: Abc = 4;
    const B: Abc = 5;
    const C: Abc = 6;
    const D: Abc = 7;

    fn space() -> ActionSpace {
        let mut space = ActionSpace::new(8);
        space.register_edge(A, C);
        space.register_edge(A, D);
        space.register_edge(B, C);
        space
    }

    fn tree(seqs: Vec<Vec<Abc>>) -> NodeRef {
        let words = WordSpace::new(vec![vec![C, B, C], vec![C, C]]);
        Node::new_tree(words.state(seqs), 0, false, false)
    }

    // ---- registration ----

    #[test]
    fn register_edge_deduplicates() {
        let mut space = space();
        assert_eq!(space.num_edges(), 3);
        space.register_edge(A, C);
        assert_eq!(space.num_edges(), 3);
    }

    #[test]
    #[should_panic(expected = "reserved ids")]
    fn reserved_symbols_cannot_form_edges() {
        let mut space = ActionSpace::new(8);
        space.register_edge(STOP, A);
    }

    #[test]
    #[should_panic(expected = "identity rewrite")]
    fn identity_edges_are_rejected() {
        let mut space = ActionSpace::new(8);
        space.register_edge(A, A);
    }

    // ---- state-phase expansion ----

    #[test]
    fn state_phase_offers_stop_then_occurring_sources() {
        let space = space();
        let node = tree(vec![vec![A, B, A]]);
        space.set_action_allowed(&node);

        let st = node.stats();
        assert_eq!(st.permissible, vec![STOP, A, B]);
        assert!(st.affected[0].is_empty());
        assert_eq!(st.affected[1], vec![(0, 0), (0, 2)]);
        assert_eq!(st.affected[2], vec![(0, 1)]);
        assert_eq!(st.num_unpruned, Some(3));
        assert_eq!(st.children.len(), 3);
        assert!(st.rewards.is_empty());
    }

    #[test]
    fn absent_sources_are_not_offered() {
        let space = space();
        // Only B occurs; A's edges are irrelevant here.
        let node = tree(vec![vec![B, C]]);
        space.set_action_allowed(&node);
        assert_eq!(node.stats().permissible, vec![STOP, B]);
    }

    #[test]
    fn expansion_is_idempotent() {
        let space = space();
        let node = tree(vec![vec![A, B]]);
        space.set_action_allowed(&node);
        let before = node.stats().permissible.clone();
        space.set_action_allowed(&node);
        assert_eq!(node.stats().permissible, before);
    }

    #[test]
    fn stopped_nodes_never_expand() {
        let space = space();
        let words = WordSpace::new(vec![vec![C]]);
        let node = Node::new_tree(words.state(vec![vec![A]]), 1, true, false);
        space.set_action_allowed(&node);
        assert!(!node.is_expanded());
    }

    // ---- chain-phase expansion ----

    #[test]
    fn replacement_candidates_follow_registered_edges() {
        let space = space();
        let base = tree(vec![vec![A, B, A]]);
        let mini = Node::new_mini(&base, ActionPhase::Before, vec![A]);
        space.set_action_allowed(&mini);

        let st = mini.stats();
        assert_eq!(st.permissible, vec![C, D]);
        // Both replacements touch the same target sites.
        assert_eq!(st.affected[0], vec![(0, 0), (0, 2)]);
        assert_eq!(st.affected[1], vec![(0, 0), (0, 2)]);
    }

    #[test]
    fn unregistered_target_prunes_the_chain_node() {
        let space = space();
        let base = tree(vec![vec![C, C]]);
        space.set_action_allowed(&base);
        // Fabricate a chain node for a target with no registered edges.
        let mini = Node::new_mini(&base, ActionPhase::Before, vec![C]);
        base.attach_child(0, Arc::clone(&mini), None);

        space.set_action_allowed(&mini);
        assert!(mini.is_pruned());
        // The prune reached the parent slot.
        assert!(base.stats().pruned[0]);
    }

    #[test]
    fn left_context_candidates_split_the_sites() {
        let space = space();
        // A at (0,0) with no left neighbour, at (0,2) after B, at (1,1) after C.
        let base = tree(vec![vec![A, B, A], vec![C, A]]);
        let mini = Node::new_mini(&base, ActionPhase::After, vec![A, C]);
        space.set_action_allowed(&mini);

        let st = mini.stats();
        assert_eq!(st.permissible, vec![ANY, B, C]);
        assert_eq!(st.affected[0], vec![(0, 0), (0, 2), (1, 1)]);
        assert_eq!(st.affected[1], vec![(0, 2)]);
        assert_eq!(st.affected[2], vec![(1, 1)]);
    }

    #[test]
    fn wildcard_pre_forces_wildcard_d_pre() {
        let space = space();
        let base = tree(vec![vec![B, A]]);
        let mini = Node::new_mini(&base, ActionPhase::Pre, vec![A, C, ANY]);
        space.set_action_allowed(&mini);

        let st = mini.stats();
        assert_eq!(st.permissible, vec![ANY]);
        assert_eq!(st.affected[0], vec![(0, 1)]);
    }

    #[test]
    fn concrete_pre_narrows_then_d_pre_looks_two_left() {
        let space = space();
        // Sites for A: (0,2) with pre=B, d_pre=C; (0,4) with pre=B, d_pre=D.
        let base = tree(vec![vec![C, B, A, D, B, A]]);
        let mini = Node::new_mini(&base, ActionPhase::Pre, vec![A, C, B]);
        space.set_action_allowed(&mini);

        let st = mini.stats();
        assert_eq!(st.permissible, vec![ANY, C, D]);
        assert_eq!(st.affected[0], vec![(0, 2), (0, 5)]);
        assert_eq!(st.affected[1], vec![(0, 2)]);
        assert_eq!(st.affected[2], vec![(0, 5)]);
    }

    #[test]
    fn right_context_mirrors_the_left() {
        let space = space();
        // A at (0,0) before B, A at (0,2) at the right boundary.
        let base = tree(vec![vec![A, B, A]]);
        let mini = Node::new_mini(&base, ActionPhase::DPre, vec![A, C, ANY, ANY]);
        space.set_action_allowed(&mini);

        let st = mini.stats();
        assert_eq!(st.permissible, vec![ANY, B]);
        assert_eq!(st.affected[0], vec![(0, 0), (0, 2)]);
        assert_eq!(st.affected[1], vec![(0, 0)]);
    }

    #[test]
    fn transition_offers_the_basic_flavour_with_surviving_sites() {
        let space = space();
        let base = tree(vec![vec![B, A, A]]);
        let transition = Node::new_transition(&base, vec![A, C, B, ANY, ANY, ANY]);
        space.set_action_allowed(&transition);

        let st = transition.stats();
        assert_eq!(st.permissible, vec![SPECIAL_BASIC]);
        // Only the A after B survives the pre filter.
        assert_eq!(st.affected[0], vec![(0, 1)]);
        // Transition nodes get reward slots.
        assert_eq!(st.rewards.len(), 1);
    }

    // ---- rule matching ----

    #[test]
    fn matching_sites_applies_every_context() {
        let words = WordSpace::new(vec![vec![C], vec![C]]);
        let state = words.state(vec![vec![C, B, A, D], vec![B, A]]);

        let anywhere = RuleAction {
            before: A,
            after: C,
            pre: ANY,
            d_pre: ANY,
            post: ANY,
            d_post: ANY,
            special: SPECIAL_BASIC,
        };
        assert_eq!(anywhere.matching_sites(&state), vec![(0, 2), (1, 1)]);

        let after_b_with_d = RuleAction {
            before: A,
            after: C,
            pre: B,
            d_pre: C,
            post: D,
            d_post: ANY,
            special: SPECIAL_BASIC,
        };
        assert_eq!(after_b_with_d.matching_sites(&state), vec![(0, 2)]);
    }

    #[test]
    fn from_chain_orders_the_tuple() {
        let rule = RuleAction::from_chain(&[A, C, B, ANY, D, ANY], SPECIAL_BASIC);
        assert_eq!(rule.before, A);
        assert_eq!(rule.after, C);
        assert_eq!(rule.pre, B);
        assert_eq!(rule.d_pre, ANY);
        assert_eq!(rule.post, D);
        assert_eq!(rule.d_post, ANY);
        assert_eq!(rule.special, SPECIAL_BASIC);
    }

    // ---- exploration ----

    #[test]
    fn potential_actions_enumerate_present_edges() {
        let space = space();
        let node = tree(vec![vec![A, B]]);
        let potentials = space.find_potential_actions(&node);

        // A has two replacements, B has one.
        assert_eq!(potentials.len(), 3);
        assert_eq!(potentials[0].action.before, A);
        assert_eq!(potentials[0].action.after, C);
        assert_eq!(potentials[0].sites, vec![(0, 0)]);
        assert_eq!(potentials[1].action.after, D);
        assert_eq!(potentials[2].action.before, B);
        assert_eq!(potentials[2].sites, vec![(0, 1)]);
        // Contexts are free, flavour is basic.
        assert_eq!(potentials[0].action.pre, ANY);
        assert_eq!(potentials[0].action.special, SPECIAL_BASIC);
    }
}
