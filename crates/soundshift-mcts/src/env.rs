//! The environment: applies a completed rule to a state, canonicalises the
//! successor through the transposition table, and shapes the scalar reward
//! per edge.

use std::sync::Arc;

use log::debug;

use crate::action::RuleAction;
use crate::node::{Node, NodeRef, END_DEPTH};
use crate::table::Table;
use crate::word::{IdSeq, WordSpace};

// ---------------------------------------------------------------------------
// EnvOpts
// ---------------------------------------------------------------------------

/// Reward shaping knobs.
#[derive(Clone, Copy, Debug)]
pub struct EnvOpts {
    /// Bonus for reaching the end state exactly.
    pub final_reward: f32,
    /// Per-step cost, usually negative.
    pub step_penalty: f32,
    /// Weight on the per-step distance reduction.
    pub dist_weight: f32,
}

impl Default for EnvOpts {
    fn default() -> Self {
        Self {
            final_reward: 1.0,
            step_penalty: -0.02,
            dist_weight: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Env
// ---------------------------------------------------------------------------

/// Owns the word space and transposition table, and pins the persistent
/// start and end nodes.
pub struct Env {
    word_space: Arc<WordSpace>,
    pub table: Table,
    pub start: NodeRef,
    pub end: NodeRef,
    pub opts: EnvOpts,
}

impl Env {
    /// Build an environment from the initial and target vocabularies. The
    /// end vocabulary doubles as the distance target per order.
    pub fn new(start_seqs: Vec<IdSeq>, end_seqs: Vec<IdSeq>, opts: EnvOpts) -> Arc<Self> {
        assert_eq!(
            start_seqs.len(),
            end_seqs.len(),
            "start and end vocabularies must align order by order"
        );
        let word_space = WordSpace::new(end_seqs.clone());
        let table = Table::new();

        let end_state = word_space.state(end_seqs);
        let (end, _) = {
            let key = end_state.key();
            table.get_or_insert(&key, || Node::new_tree(end_state, END_DEPTH, false, true))
        };

        let start_state = word_space.state(start_seqs);
        let (start, _) = {
            let key = start_state.key();
            table.get_or_insert(&key, || Node::new_tree(start_state, 0, false, true))
        };
        // On a table hit (start == end) the persistent flag is already set;
        // mark explicitly so a degenerate start is still pinned.
        start.make_persistent();

        Arc::new(Self {
            word_space,
            table,
            start,
            end,
            opts,
        })
    }

    pub fn word_space(&self) -> &Arc<WordSpace> {
        &self.word_space
    }

    /// Apply `action` to `node`'s state: rewrite every matching site, intern
    /// the successor, and return it with the edge reward.
    ///
    /// `reward = step_penalty + dist_weight * (dist - dist')`, plus
    /// `final_reward` when the successor is the end node. The successor's
    /// `done` flag derives from its distance.
    pub fn step(&self, node: &NodeRef, action: &RuleAction) -> (NodeRef, f32) {
        let state = node.state();
        let sites = action.matching_sites(state);

        let mut words = state.words.clone();
        for order in 0..words.len() {
            let positions: Vec<usize> = sites
                .iter()
                .filter(|&&(o, _)| o == order)
                .map(|&(_, pos)| pos)
                .collect();
            if positions.is_empty() {
                continue;
            }
            let mut seq: IdSeq = words[order].id_seq().to_vec();
            for pos in positions {
                seq[pos] = action.after;
            }
            words[order] = self.word_space.get_word(seq);
        }

        let next_state = self.word_space.state_of(words);
        let next_dist = next_state.dist;
        let depth = node.depth() + 1;
        let (next, created) = {
            let key = next_state.key();
            self.table
                .get_or_insert(&key, || Node::new_tree(next_state, depth, false, false))
        };

        let mut reward = self.opts.step_penalty + self.opts.dist_weight * (state.dist - next_dist);
        if Arc::ptr_eq(&next, &self.end) {
            reward += self.opts.final_reward;
        }
        debug!(
            "env step {:?}: {} sites, dist {} -> {}, reward {reward:.4}, created={created}",
            action,
            sites.len(),
            state.dist,
            next_dist
        );
        (next, reward)
    }

    /// Terminal twin used when the stop sub-action is chosen: same words,
    /// search inhibited, never canonicalised through the table.
    pub fn stop_node(&self, node: &NodeRef) -> NodeRef {
        Node::new_tree(node.state().clone(), node.depth() + 1, true, false)
    }

    /// Unlink every child of `root`, dropping whatever was reachable only
    /// through them, then sweep dead table entries. Persistent nodes are
    /// pinned elsewhere and survive. Returns the number of evicted states.
    pub fn clear_subtree(&self, root: &NodeRef) -> usize {
        let children: Vec<NodeRef> = {
            let mut st = root.stats();
            st.children.iter_mut().filter_map(Option::take).collect()
        };
        let root_ptr = Arc::as_ptr(root);
        for child in &children {
            child
                .stats()
                .parents
                .retain(|link| !std::ptr::eq(link.node.as_ptr(), root_ptr));
        }
        drop(children);
        let evicted = self.table.evict_dead();
        debug!("cleared subtree, evicted {evicted} states");
        evicted
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
