//! Python bindings for the search core.
//!
//! Gated behind the `python` feature. Exposes `register_search_module()` for
//! the combined extension crate to call — no `#[pymodule]` here.

use numpy::{PyArray2, PyArray3, PyReadonlyArray1, PyReadonlyArray2, PyReadonlyArray3};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyTuple;
use std::sync::Arc;

use crate::action::ActionSpace;
use crate::env::{Env, EnvOpts};
use crate::evaluator::{EvalResult, Evaluator, UniformEvaluator};
use crate::node::{NodeRef, PlayPolicy, NUM_PRIOR_ROWS};
use crate::search::{stack_ids, Mcts, MctsConfig};
use crate::word::{to_padded, Abc, IdSeq, PAD};

// ---------------------------------------------------------------------------
// Input conversion
// ---------------------------------------------------------------------------

/// Strip padding from a dense `[N, M]` id array. Cells beyond each row's
/// length must equal `PAD`.
fn seqs_from_padded(ids: PyReadonlyArray2<'_, i64>, lengths: &[usize]) -> PyResult<Vec<IdSeq>> {
    let ids = ids.as_array();
    let (n, m) = ids.dim();
    if n != lengths.len() {
        return Err(PyValueError::new_err(format!(
            "expected {n} lengths, got {}",
            lengths.len()
        )));
    }
    let mut seqs = Vec::with_capacity(n);
    for (row, &len) in lengths.iter().enumerate() {
        if len > m {
            return Err(PyValueError::new_err(format!(
                "length {len} beyond row width {m}"
            )));
        }
        for col in len..m {
            if ids[[row, col]] != PAD as i64 {
                return Err(PyValueError::new_err(format!(
                    "padding cell ({row}, {col}) holds a non-pad symbol"
                )));
            }
        }
        seqs.push((0..len).map(|col| ids[[row, col]] as Abc).collect());
    }
    Ok(seqs)
}

// ---------------------------------------------------------------------------
// PyCallbackEvaluator — calls a Python predict_fn for batched evaluation
// ---------------------------------------------------------------------------

/// Evaluator that delegates to a Python callable.
///
/// The callable signature:
/// ```python
/// def predict_fn(ids) -> tuple[
///     np.ndarray,  # meta_priors [N, 7, alphabet] float32
///     np.ndarray,  # special_priors [N, alphabet] float32
///     np.ndarray,  # values [N] float32
/// ]: ...
/// ```
/// where `ids` is the stacked `[N, MaxLen, W]` int64 tensor of the batch.
///
/// One GIL acquisition per batch; the driver's batching amortises the
/// Python round-trip cost.
struct PyCallbackEvaluator {
    predict_fn: PyObject,
}

impl Evaluator for PyCallbackEvaluator {
    fn evaluate(&self, node: &NodeRef) -> EvalResult {
        self.evaluate_batch(std::slice::from_ref(node))
            .into_iter()
            .next()
            .expect("predict_fn returned an empty batch")
    }

    fn evaluate_batch(&self, nodes: &[NodeRef]) -> Vec<EvalResult> {
        Python::with_gil(|py| {
            let ids = PyArray3::from_owned_array(py, stack_ids(nodes));
            let result = self
                .predict_fn
                .call1(py, (ids,))
                .expect("predict_fn raised an exception");
            parse_eval_results(result.bind(py), nodes.len())
        })
    }
}

/// Parse the 3-tuple of numpy arrays returned by predict_fn.
fn parse_eval_results(result: &Bound<'_, PyAny>, n: usize) -> Vec<EvalResult> {
    let tuple = result
        .downcast::<PyTuple>()
        .expect("predict_fn must return a tuple");
    assert!(
        tuple.len() == 3,
        "predict_fn must return (meta_priors, special_priors, values)"
    );

    let meta: PyReadonlyArray3<f32> = tuple
        .get_item(0)
        .unwrap()
        .extract()
        .expect("meta_priors: expected float32 array [N, 7, alphabet]");
    let special: PyReadonlyArray2<f32> = tuple
        .get_item(1)
        .unwrap()
        .extract()
        .expect("special_priors: expected float32 array [N, alphabet]");
    let values: PyReadonlyArray1<f32> = tuple
        .get_item(2)
        .unwrap()
        .extract()
        .expect("values: expected float32 array [N]");

    let meta = meta.as_array();
    let special = special.as_array();
    let values = values.as_array();
    assert_eq!(meta.dim().0, n, "meta_priors batch dimension mismatch");
    assert_eq!(meta.dim().1, NUM_PRIOR_ROWS, "meta_priors row dimension mismatch");

    let alphabet = meta.dim().2;
    (0..n)
        .map(|i| {
            let meta_priors = (0..NUM_PRIOR_ROWS)
                .map(|r| (0..alphabet).map(|c| meta[[i, r, c]]).collect())
                .collect();
            let special_priors = (0..alphabet).map(|c| special[[i, c]]).collect();
            EvalResult {
                meta_priors,
                special_priors,
                value: values[i],
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Searcher — session object exposed to Python
// ---------------------------------------------------------------------------

/// One search session over a fixed vocabulary pair and edge catalog.
#[pyclass(name = "Searcher")]
pub struct PySearcher {
    mcts: Mcts,
    root: NodeRef,
}

#[pymethods]
impl PySearcher {
    #[new]
    #[pyo3(signature = (
        start_ids, start_lengths, end_ids, end_lengths, alphabet_size, edges, *,
        puct_c = 5.0, heur_c = 1.0, game_count = 3, virtual_loss = 0.5,
        num_threads = 4, depth_limit = 10, final_reward = 1.0,
        step_penalty = -0.02, dist_weight = 1.0, most_visited_play = false,
        seed = 0
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        start_ids: PyReadonlyArray2<'_, i64>,
        start_lengths: Vec<usize>,
        end_ids: PyReadonlyArray2<'_, i64>,
        end_lengths: Vec<usize>,
        alphabet_size: usize,
        edges: Vec<(Abc, Abc)>,
        puct_c: f32,
        heur_c: f32,
        game_count: u32,
        virtual_loss: f32,
        num_threads: usize,
        depth_limit: usize,
        final_reward: f32,
        step_penalty: f32,
        dist_weight: f32,
        most_visited_play: bool,
        seed: u64,
    ) -> PyResult<Self> {
        let start_seqs = seqs_from_padded(start_ids, &start_lengths)?;
        let end_seqs = seqs_from_padded(end_ids, &end_lengths)?;
        let env = Env::new(
            start_seqs,
            end_seqs,
            EnvOpts {
                final_reward,
                step_penalty,
                dist_weight,
            },
        );
        let mut space = ActionSpace::new(alphabet_size);
        for (before, after) in edges {
            space.register_edge(before, after);
        }
        let config = MctsConfig {
            puct_c,
            heur_c,
            add_noise: true,
            game_count,
            virtual_loss,
            num_threads,
            depth_limit,
            play_policy: if most_visited_play {
                PlayPolicy::MostVisited
            } else {
                PlayPolicy::MaxValue
            },
            seed,
        };
        let root = Arc::clone(&env.start);
        Ok(Self {
            mcts: Mcts::new(env, Arc::new(space), config),
            root,
        })
    }

    /// Run simulations from the current root.
    ///
    /// With `predict_fn`, the GIL is held during search (Python callbacks
    /// need it). Without, the GIL is released for pure Rust computation and
    /// flat priors are used.
    #[pyo3(signature = (*, predict_fn = None, simulations = 100, batch_size = 32))]
    fn run(
        &self,
        py: Python<'_>,
        predict_fn: Option<PyObject>,
        simulations: usize,
        batch_size: usize,
    ) {
        match predict_fn {
            Some(pf) => {
                let evaluator = PyCallbackEvaluator { predict_fn: pf };
                self.mcts.run(&self.root, &evaluator, simulations, batch_size);
            }
            None => {
                let evaluator = UniformEvaluator::new(self.mcts.action_space.alphabet_size());
                py.allow_threads(|| {
                    self.mcts.run(&self.root, &evaluator, simulations, batch_size);
                });
            }
        }
    }

    /// Greedily act once, advance the root, and return
    /// `(ids, lengths, chosen, stopped)` for the new root state.
    fn play<'py>(
        &mut self,
        py: Python<'py>,
    ) -> (Bound<'py, PyArray2<i64>>, Vec<usize>, Vec<(usize, Abc)>, bool) {
        let (next, subpath) = self.mcts.play(&self.root);
        self.root = Arc::clone(&next);
        let (ids, lengths) = to_padded(next.state());
        (
            PyArray2::from_owned_array(py, ids),
            lengths,
            subpath.chosen,
            subpath.stopped,
        )
    }

    /// Mix external noise into the root's cached priors.
    fn add_root_noise(
        &self,
        meta_noise: PyReadonlyArray2<'_, f32>,
        special_noise: PyReadonlyArray1<'_, f32>,
        ratio: f32,
    ) {
        let meta = meta_noise.as_array();
        let rows: Vec<Vec<f32>> = (0..meta.dim().0)
            .map(|r| (0..meta.dim().1).map(|c| meta[[r, c]]).collect())
            .collect();
        let special: Vec<f32> = special_noise.as_array().iter().copied().collect();
        self.root.add_noise(&rows, &special, ratio);
    }

    /// Current root state as a padded id array plus lengths.
    fn root_ids<'py>(&self, py: Python<'py>) -> (Bound<'py, PyArray2<i64>>, Vec<usize>) {
        let (ids, lengths) = to_padded(self.root.state());
        (PyArray2::from_owned_array(py, ids), lengths)
    }

    /// Initial-selection mask for the current root, `[alphabet]` bools.
    fn root_action_mask(&self) -> Vec<bool> {
        let masks = self.mcts.action_masks(std::slice::from_ref(&self.root));
        masks.row(0).to_vec()
    }

    #[getter]
    fn root_visits(&self) -> u32 {
        self.root.visit_count()
    }

    #[getter]
    fn root_value(&self) -> f32 {
        self.root.max_value()
    }

    #[getter]
    fn root_dist(&self) -> f32 {
        self.root.dist()
    }

    #[getter]
    fn done(&self) -> bool {
        self.root.done() || self.root.stopped
    }

    #[getter]
    fn num_states(&self) -> usize {
        self.mcts.env.table.len()
    }

    fn __repr__(&self) -> String {
        format!(
            "Searcher(root_dist={:.1}, root_visits={}, states={})",
            self.root.dist(),
            self.root.visit_count(),
            self.mcts.env.table.len()
        )
    }
}

// ---------------------------------------------------------------------------
// Module registration
// ---------------------------------------------------------------------------

/// Register search types on the given module.
///
/// Called by the combined extension crate — not a standalone pymodule.
pub fn register_search_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PySearcher>()?;
    Ok(())
}
