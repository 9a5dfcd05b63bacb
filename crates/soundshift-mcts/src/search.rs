//! The search driver: parallel selection over the seven-stage chain,
//! batched evaluation, backup, and the greedy play step.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};
use std::sync::Arc;

use log::debug;
use ndarray::{s, Array2, Array3};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::action::{ActionSpace, RuleAction};
use crate::env::Env;
use crate::evaluator::{EvalResult, Evaluator};
use crate::node::{ActionPhase, ChosenChar, Node, NodeRef, PlayPolicy};
use crate::word::{Abc, PAD, STOP};

// ---------------------------------------------------------------------------
// MctsConfig
// ---------------------------------------------------------------------------

/// Search configuration — immutable, shareable across threads.
#[derive(Clone, Debug)]
pub struct MctsConfig {
    /// Exploration constant (PUCT).
    pub puct_c: f32,
    /// Weight of the affected-site-count heuristic.
    pub heur_c: f32,
    /// Mix a vanishing uniform noise into selection scores.
    pub add_noise: bool,
    /// Virtual visits added per in-flight selection.
    pub game_count: u32,
    /// Pessimistic value inflation per virtual visit.
    pub virtual_loss: f32,
    /// Worker threads for `parallel_select`.
    pub num_threads: usize,
    /// Environment steps allowed per simulation.
    pub depth_limit: usize,
    /// Greedy policy used by `play`.
    pub play_policy: PlayPolicy,
    /// Base seed for per-simulation rngs.
    pub seed: u64,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            puct_c: 5.0,
            heur_c: 1.0,
            add_noise: true,
            game_count: 3,
            virtual_loss: 0.5,
            num_threads: 4,
            depth_limit: 10,
            play_policy: PlayPolicy::MaxValue,
            seed: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// SimPath — one simulation's traversal
// ---------------------------------------------------------------------------

/// Recorded `(node, chosen index)` steps from the root down to (but not
/// including) the leaf, in selection order. Every step carries an
/// outstanding virtual select until `backup` runs.
pub struct SimPath {
    pub steps: SmallVec<[(NodeRef, usize); 32]>,
    /// State node the simulation ended at.
    pub leaf: NodeRef,
    /// False when the leaf is terminal (done, stopped, or pruned out).
    pub needs_eval: bool,
}

/// Completed greedy step: the seven selections and the chain nodes they
/// went through. `chosen` is cut short when the stop sub-action fires.
pub struct Subpath {
    pub chosen: Vec<ChosenChar>,
    pub minis: Vec<NodeRef>,
    pub stopped: bool,
}

// ---------------------------------------------------------------------------
// Mcts — session object
// ---------------------------------------------------------------------------

/// One search session: environment, action space, and tuning knobs.
pub struct Mcts {
    pub env: Arc<Env>,
    pub action_space: Arc<ActionSpace>,
    pub config: MctsConfig,
}

impl Mcts {
    pub fn new(env: Arc<Env>, action_space: Arc<ActionSpace>, config: MctsConfig) -> Self {
        Self {
            env,
            action_space,
            config,
        }
    }

    // --- Selection ---

    /// Run `num_sims` simulations from `root` on `config.num_threads`
    /// native threads. Workers claim simulation indices from a shared
    /// counter; results come back ordered by simulation index.
    ///
    /// Every returned path still carries its virtual-loss inflation; the
    /// caller must `backup` each one exactly once.
    pub fn parallel_select(&self, root: &NodeRef, num_sims: usize) -> Vec<SimPath> {
        assert!(root.is_tree_node(), "parallel_select: root must be a state node");
        let next_sim = AtomicUsize::new(0);
        let next_sim = &next_sim;

        let collected: Vec<Vec<(usize, SimPath)>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..self.config.num_threads.max(1))
                .map(|_| {
                    scope.spawn(move || {
                        let mut local = Vec::new();
                        loop {
                            let idx = next_sim.fetch_add(1, Relaxed);
                            if idx >= num_sims {
                                break;
                            }
                            let seed = self.config.seed.wrapping_add(idx as u64);
                            let mut rng = SmallRng::seed_from_u64(seed);
                            local.push((idx, self.select_one(root, &mut rng)));
                        }
                        local
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut results: Vec<Option<SimPath>> = (0..num_sims).map(|_| None).collect();
        for (idx, path) in collected.into_iter().flatten() {
            results[idx] = Some(path);
        }
        results
            .into_iter()
            .map(|p| p.expect("every simulation index was claimed"))
            .collect()
    }

    /// One simulation: descend state node by state node, walking the
    /// seven-selection chain in between, until a leaf, a terminal, or the
    /// depth limit. Chain nodes are expanded and evaluated on first visit.
    fn select_one(&self, root: &NodeRef, rng: &mut SmallRng) -> SimPath {
        let cfg = &self.config;
        let mut steps: SmallVec<[(NodeRef, usize); 32]> = SmallVec::new();
        let mut node = Arc::clone(root);
        let mut depth_left = cfg.depth_limit;

        'outer: loop {
            if node.done() || node.stopped {
                return SimPath {
                    steps,
                    leaf: node,
                    needs_eval: false,
                };
            }
            if node.is_leaf() || depth_left == 0 {
                return SimPath {
                    steps,
                    leaf: node,
                    needs_eval: true,
                };
            }
            if node.is_pruned() {
                return SimPath {
                    steps,
                    leaf: node,
                    needs_eval: false,
                };
            }

            let mut cur = Arc::clone(&node);
            loop {
                if !cur.is_tree_node() {
                    self.action_space.set_action_allowed(&cur);
                    if cur.is_pruned() {
                        // Dead chain: abandon the simulation, leave the
                        // virtual losses for backup to reverse.
                        return SimPath {
                            steps,
                            leaf: node,
                            needs_eval: false,
                        };
                    }
                    cur.evaluate_from_base();
                }

                // Selection and the virtual select share one guard.
                let (index, chosen, existing) = {
                    let mut st = cur.stats();
                    let index =
                        st.best_action_index(cfg.puct_c, cfg.heur_c, cfg.add_noise, rng);
                    st.virtual_select(index, cfg.game_count, cfg.virtual_loss);
                    (index, st.permissible[index], st.children[index].clone())
                };
                steps.push((Arc::clone(&cur), index));

                let child = match existing {
                    Some(child) => child,
                    None => self.make_child(&cur, index, chosen),
                };

                if child.is_tree_node() {
                    node = child;
                    depth_left -= 1;
                    continue 'outer;
                }
                cur = child;
            }
        }
    }

    /// Create and attach the child behind `(cur, index)`. On a concurrent
    /// race the first install wins and the candidate is discarded.
    fn make_child(&self, cur: &NodeRef, index: usize, chosen: Abc) -> NodeRef {
        if cur.is_tree_node() {
            if chosen == STOP {
                return cur.attach_child(index, self.env.stop_node(cur), None);
            }
            let mini = Node::new_mini(cur, ActionPhase::Before, vec![chosen]);
            return cur.attach_child(index, mini, None);
        }

        let phase = cur.phase().expect("chain node has a phase");
        let base = cur.base().expect("chain node outlived its base");
        match phase.next() {
            Some(ActionPhase::SpecialType) => {
                let mut prefix = cur.prefix().to_vec();
                prefix.push(chosen);
                cur.attach_child(index, Node::new_transition(&base, prefix), None)
            }
            Some(next_phase) => {
                let mut prefix = cur.prefix().to_vec();
                prefix.push(chosen);
                cur.attach_child(index, Node::new_mini(&base, next_phase, prefix), None)
            }
            None => {
                // Transition node: the rule is complete, step the
                // environment and record the edge reward.
                let rule = RuleAction::from_chain(cur.prefix(), chosen);
                let (next, reward) = self.env.step(&base, &rule);
                cur.attach_child(index, next, Some(reward))
            }
        }
    }

    // --- Expansion + evaluation ---

    /// Expand a leaf state node and attach the evaluator output. Terminal
    /// and stopped leaves are left alone; repeated calls are no-ops.
    pub fn expand_leaf(&self, leaf: &NodeRef, eval: EvalResult) {
        if leaf.stopped || leaf.done() {
            return;
        }
        self.action_space.set_action_allowed(leaf);
        if leaf.is_pruned() {
            return;
        }
        leaf.evaluate(eval.meta_priors, eval.special_priors);
    }

    // --- Backup ---

    /// Walk the recorded path leaf-to-root, reversing each virtual select
    /// and folding transition rewards into the running value, so every edge
    /// sees its downstream reward plus the leaf value.
    pub fn backup(&self, path: &SimPath, leaf_value: f32) {
        let cfg = &self.config;
        let mut value = leaf_value;
        for (node, index) in path.steps.iter().rev() {
            let mut st = node.stats();
            if node.is_transitional() {
                value += st.rewards[*index];
            }
            st.update_stats(*index, value, cfg.game_count, cfg.virtual_loss);
        }
    }

    pub fn backup_batch(&self, paths: &[SimPath], values: &[f32]) {
        assert_eq!(paths.len(), values.len(), "one value per simulation");
        for (path, &value) in paths.iter().zip(values) {
            self.backup(path, value);
        }
    }

    // --- Full cycle ---

    /// Select → evaluate → expand → backup, in batches of `batch_size`
    /// simulations, until `num_sims` have run.
    pub fn run(&self, root: &NodeRef, evaluator: &dyn Evaluator, num_sims: usize, batch_size: usize) {
        let mut remaining = num_sims;
        let batch_size = batch_size.max(1);
        while remaining > 0 {
            let batch = remaining.min(batch_size);
            self.run_batch(root, evaluator, batch);
            remaining -= batch;
        }
    }

    fn run_batch(&self, root: &NodeRef, evaluator: &dyn Evaluator, batch: usize) {
        let paths = self.parallel_select(root, batch);

        // The same leaf can come back from several simulations; evaluate
        // each distinct one once.
        let mut unique: Vec<NodeRef> = Vec::new();
        let mut slot_of: HashMap<*const Node, usize> = HashMap::new();
        for path in &paths {
            if path.needs_eval {
                let ptr = Arc::as_ptr(&path.leaf);
                slot_of.entry(ptr).or_insert_with(|| {
                    unique.push(Arc::clone(&path.leaf));
                    unique.len() - 1
                });
            }
        }

        let evals = if unique.is_empty() {
            Vec::new()
        } else {
            evaluator.evaluate_batch(&unique)
        };
        for (leaf, eval) in unique.iter().zip(&evals) {
            self.expand_leaf(leaf, eval.clone());
        }

        for path in &paths {
            let value = if path.needs_eval {
                evals[slot_of[&Arc::as_ptr(&path.leaf)]].value
            } else {
                0.0
            };
            self.backup(path, value);
        }
        debug!(
            "batch done: {} sims, {} distinct leaves evaluated",
            paths.len(),
            unique.len()
        );
    }

    // --- Acting ---

    /// Greedily descend the seven selections from `root` and return the
    /// next state node with the taken subpath. Preconditions: every node on
    /// the greedy path has seen at least one backup.
    pub fn play(&self, root: &NodeRef) -> (NodeRef, Subpath) {
        assert!(root.is_tree_node(), "play: root must be a state node");
        let mut chosen = Vec::with_capacity(7);
        let mut minis = Vec::with_capacity(6);
        let mut cur = Arc::clone(root);
        for _ in 0..7 {
            let (child, pick) = cur.play_mini(self.config.play_policy);
            chosen.push(pick);
            if child.is_tree_node() {
                let stopped = child.stopped;
                debug!("played {} selections, stopped={stopped}", chosen.len());
                return (child, Subpath { chosen, minis, stopped });
            }
            minis.push(Arc::clone(&child));
            cur = child;
        }
        unreachable!("the selection chain is at most seven long")
    }

    // --- Batched host-boundary ops ---

    /// `[N, alphabet]` mask of the initial-selection candidates per node.
    /// Expanded nodes answer from their installed actions, leaves from a
    /// fresh computation. Input order is preserved.
    pub fn action_masks(&self, nodes: &[NodeRef]) -> Array2<bool> {
        let alphabet = self.action_space.alphabet_size();
        let rows: Vec<Vec<bool>> = nodes
            .par_iter()
            .map(|node| {
                let mut row = vec![false; alphabet];
                let permissible = {
                    let st = node.stats();
                    if st.is_expanded() {
                        st.permissible.clone()
                    } else {
                        drop(st);
                        self.action_space.state_phase_actions(node.state()).0
                    }
                };
                for c in permissible {
                    row[c as usize] = true;
                }
                row
            })
            .collect();

        let mut out = Array2::from_elem((nodes.len(), alphabet), false);
        for (i, row) in rows.into_iter().enumerate() {
            for (j, bit) in row.into_iter().enumerate() {
                out[[i, j]] = bit;
            }
        }
        out
    }
}

/// Stack node states into a padded `[N, MaxLen, W]` id tensor (time-major
/// per state), preserving input order. Pads with `PAD`.
pub fn stack_ids(nodes: &[NodeRef]) -> Array3<i64> {
    let n = nodes.len();
    let w = nodes.iter().map(|n| n.state().len()).max().unwrap_or(0);
    let max_len = nodes
        .iter()
        .flat_map(|n| n.state().words.iter().map(|word| word.len()))
        .max()
        .unwrap_or(0);

    let mats: Vec<Array2<i64>> = nodes
        .par_iter()
        .map(|node| {
            let mut mat = Array2::from_elem((max_len, w), PAD as i64);
            for (order, word) in node.state().words.iter().enumerate() {
                for (pos, &unit) in word.id_seq().iter().enumerate() {
                    mat[[pos, order]] = unit as i64;
                }
            }
            mat
        })
        .collect();

    let mut out = Array3::from_elem((n, max_len, w), PAD as i64);
    for (i, mat) in mats.into_iter().enumerate() {
        out.slice_mut(s![i, .., ..]).assign(&mat);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{ConstantValueEvaluator, UniformEvaluator};
    use crate::test_util::{session, two_word_session, SessionOpts};
    use crate::word::{Abc, SPECIAL_BASIC};
    use std::collections::HashSet;

    const A: Abc = 4;
    const B: Abc = 5;
    const C: Abc = 6;

    // ---- trivially done root ----

    #[test]
    fn done_root_selects_itself_without_expansion() {
        let mcts = session(
            vec![vec![A, B, C]],
            vec![vec![A, B, C]],
            SessionOpts::default(),
        );
        let root = Arc::clone(&mcts.env.start);
        assert!(root.done());

        let paths = mcts.parallel_select(&root, 4);
        assert_eq!(paths.len(), 4);
        for path in &paths {
            assert!(Arc::ptr_eq(&path.leaf, &root));
            assert!(path.steps.is_empty());
            assert!(!path.needs_eval);
        }
        assert!(!root.is_expanded());
    }

    // ---- single-threaded cycle ----

    #[test]
    fn first_batch_expands_the_root_only() {
        let mcts = session(vec![vec![A, B, A]], vec![vec![C, B, C]], SessionOpts::default());
        let root = Arc::clone(&mcts.env.start);
        let evaluator = UniformEvaluator::new(8);

        mcts.run(&root, &evaluator, 1, 1);
        assert!(root.is_expanded());
        assert!(root.is_evaluated());
        // Stop plus the one registered source present in the state.
        assert_eq!(root.stats().permissible, vec![STOP, A]);
        let priors = root.priors();
        assert!((priors.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        // The priming batch never descends, so no edge was taken.
        assert_eq!(root.visit_count(), 0);
    }

    #[test]
    fn simulations_descend_and_reach_the_end_state() {
        let mcts = session(
            vec![vec![A, B, A]],
            vec![vec![C, B, C]],
            SessionOpts {
                final_reward: 1.0,
                step_penalty: -0.02,
                ..Default::default()
            },
        );
        let root = Arc::clone(&mcts.env.start);
        let evaluator = UniformEvaluator::new(8);

        mcts.run(&root, &evaluator, 40, 8);
        assert!(root.visit_count() > 0);

        // The wide-open rewrite closes the whole distance in one step:
        // step_penalty + dist closed + final bonus.
        let expected = -0.02 + 2.0 + 1.0;
        assert!(
            (root.max_value() - expected).abs() < 1e-4,
            "max_value {} != {expected}",
            root.max_value()
        );
        // The best edge is the rewrite target, not stop.
        let best = root.max_index().unwrap();
        assert_eq!(root.stats().permissible[best], A);
    }

    #[test]
    fn backup_nets_the_leaf_value_plus_path_rewards() {
        let mcts = session(
            vec![vec![A, B, A]],
            vec![vec![C, B, C]],
            SessionOpts {
                game_count: 3,
                virtual_loss: 0.5,
                ..Default::default()
            },
        );
        let root = Arc::clone(&mcts.env.start);
        let evaluator = ConstantValueEvaluator {
            alphabet_size: 8,
            value: 0.0,
        };
        // Prime the root, then run exactly one simulation.
        mcts.run(&root, &evaluator, 1, 1);
        let paths = mcts.parallel_select(&root, 1);
        assert_eq!(paths.len(), 1);
        let path = &paths[0];
        assert!(!path.steps.is_empty());

        let leaf_value = 0.25;
        mcts.backup(path, leaf_value);

        // Every step netted exactly one visit.
        for (node, index) in path.steps.iter() {
            let st = node.stats();
            assert_eq!(st.action_counts[*index], 1);
            assert_eq!(st.visit_count, 1);
        }
        // The root edge's total folds the transition reward into the leaf
        // value whenever the simulation completed a full rule.
        let (root_node, root_index) = &path.steps[0];
        let total = root_node.stats().total_values[*root_index];
        let transition_reward: f32 = path
            .steps
            .iter()
            .filter(|(n, _)| n.is_transitional())
            .map(|(n, i)| n.stats().rewards[*i])
            .sum();
        assert!((total - (leaf_value + transition_reward)).abs() < 1e-4);
    }

    // ---- stop handling ----

    #[test]
    fn stop_edge_leads_to_a_stopped_twin() {
        let mcts = session(
            vec![vec![A, B, A]],
            vec![vec![C, B, C]],
            SessionOpts {
                // Make stop attractive: no noise, uniform value floor.
                add_noise: false,
                ..Default::default()
            },
        );
        let root = Arc::clone(&mcts.env.start);
        let evaluator = UniformEvaluator::new(8);
        mcts.run(&root, &evaluator, 50, 4);

        // The stop edge sits at slot 0 of the initial selection and gets
        // explored once the rewrite edge's exploration bonus decays.
        let stopped = root.child(0).expect("stop edge explored");
        assert!(stopped.stopped);
        assert!(stopped.is_tree_node());
        assert!(!stopped.is_expanded());
        // A stopped state never outscores the productive rewrite.
        let best = root.max_index().unwrap();
        assert_ne!(root.stats().permissible[best], STOP);
    }

    // ---- depth limit ----

    #[test]
    fn depth_limit_bounds_environment_steps() {
        let mcts = session(
            vec![vec![A, B, A]],
            vec![vec![C, B, C]],
            SessionOpts {
                depth_limit: 1,
                ..Default::default()
            },
        );
        let root = Arc::clone(&mcts.env.start);
        let evaluator = UniformEvaluator::new(8);
        mcts.run(&root, &evaluator, 8, 4);

        let paths = mcts.parallel_select(&root, 8);
        for path in &paths {
            let env_steps = path
                .steps
                .iter()
                .filter(|(n, _)| n.is_transitional())
                .count();
            assert!(env_steps <= 1, "depth limit exceeded: {env_steps}");
        }
        // Reverse the probes so the tree stays consistent.
        let values = vec![0.0; paths.len()];
        mcts.backup_batch(&paths, &values);
    }

    // ---- parallel safety ----

    fn walk_graph(root: &NodeRef) -> Vec<NodeRef> {
        let mut seen: HashSet<*const Node> = HashSet::new();
        let mut queue = vec![Arc::clone(root)];
        let mut out = Vec::new();
        while let Some(node) = queue.pop() {
            if !seen.insert(Arc::as_ptr(&node)) {
                continue;
            }
            for child in node.stats().children.iter().flatten() {
                queue.push(Arc::clone(child));
            }
            out.push(node);
        }
        out
    }

    #[test]
    fn parallel_run_keeps_statistics_consistent() {
        let mcts = two_word_session(SessionOpts {
            num_threads: 8,
            depth_limit: 6,
            ..Default::default()
        });
        let root = Arc::clone(&mcts.env.start);
        let evaluator = UniformEvaluator::new(10);

        mcts.run(&root, &evaluator, 1000, 64);

        for node in walk_graph(&root) {
            let st = node.stats();
            let n = st.permissible.len();
            assert_eq!(st.affected.len(), n);
            assert_eq!(st.children.len(), n);
            assert_eq!(st.pruned.len(), n);
            assert_eq!(st.action_counts.len(), n);
            assert_eq!(st.total_values.len(), n);
            assert_eq!(st.max_values.len(), n);
            if st.is_evaluated() {
                assert_eq!(st.priors.len(), n);
            }
            if let Some(unpruned) = st.num_unpruned {
                assert_eq!(unpruned, st.pruned.iter().filter(|&&p| !p).count());
            }
            // All virtual selects were reversed by matching backups.
            assert_eq!(
                st.visit_count,
                st.action_counts.iter().sum::<u32>(),
                "unbalanced virtual select / backup"
            );
        }
    }

    #[test]
    fn transpositions_record_multiple_parents() {
        let mcts = session(vec![vec![A, B, A]], vec![vec![C, B, C]], SessionOpts::default());
        let root = Arc::clone(&mcts.env.start);
        let evaluator = UniformEvaluator::new(8);
        mcts.run(&root, &evaluator, 400, 32);

        // Some canonical state must be reachable through more than one
        // transition edge once the two single-site orders interleave.
        let shared = walk_graph(&root)
            .into_iter()
            .filter(|n| n.is_tree_node())
            .any(|n| n.stats().parents.len() > 1);
        assert!(shared, "no transposition sharing observed");
    }

    // ---- play ----

    #[test]
    fn play_follows_the_best_return_to_the_next_state() {
        let mcts = session(
            vec![vec![A, B, A]],
            vec![vec![C, B, C]],
            SessionOpts {
                final_reward: 5.0,
                ..Default::default()
            },
        );
        let root = Arc::clone(&mcts.env.start);
        let evaluator = UniformEvaluator::new(8);
        mcts.run(&root, &evaluator, 200, 16);

        let (next, subpath) = mcts.play(&root);
        assert!(!subpath.stopped);
        assert_eq!(subpath.chosen.len(), 7);
        assert_eq!(subpath.minis.len(), 6);
        // Greedy play takes the rewrite, not the stop.
        assert_eq!(subpath.chosen[0].1, A);
        assert_eq!(subpath.chosen[6].1, SPECIAL_BASIC);
        assert!(next.is_tree_node());
        assert!(!next.stopped);
    }

    // ---- batched ops ----

    #[test]
    fn stack_ids_pads_and_preserves_order() {
        let mcts = session(vec![vec![A, B, A]], vec![vec![C, B, C]], SessionOpts::default());
        let env = &mcts.env;
        let space = env.word_space();
        let short = crate::node::Node::new_tree(space.state(vec![vec![A]]), 0, false, false);

        let nodes = vec![Arc::clone(&env.start), short];
        let ids = stack_ids(&nodes);
        assert_eq!(ids.dim(), (2, 3, 1));
        // First node: [A, B, A] down the time axis.
        assert_eq!(ids[[0, 0, 0]], A as i64);
        assert_eq!(ids[[0, 1, 0]], B as i64);
        assert_eq!(ids[[0, 2, 0]], A as i64);
        // Second node: one symbol then padding.
        assert_eq!(ids[[1, 0, 0]], A as i64);
        assert_eq!(ids[[1, 1, 0]], PAD as i64);
        assert_eq!(ids[[1, 2, 0]], PAD as i64);
    }

    #[test]
    fn action_masks_cover_expanded_and_leaf_nodes() {
        let mcts = session(vec![vec![A, B, A]], vec![vec![C, B, C]], SessionOpts::default());
        let root = Arc::clone(&mcts.env.start);
        let evaluator = UniformEvaluator::new(8);
        mcts.run(&root, &evaluator, 1, 1); // expands the root only

        let space = mcts.env.word_space();
        let leaf = crate::node::Node::new_tree(space.state(vec![vec![B, B]]), 0, false, false);

        let masks = mcts.action_masks(&[Arc::clone(&root), leaf]);
        assert_eq!(masks.dim(), (2, 8));
        // Root: stop + A.
        assert!(masks[[0, STOP as usize]]);
        assert!(masks[[0, A as usize]]);
        assert!(!masks[[0, B as usize]]);
        // Leaf without edges for B: only stop.
        assert!(masks[[1, STOP as usize]]);
        assert!(!masks[[1, A as usize]]);
        assert!(!masks[[1, B as usize]]);
    }
}
