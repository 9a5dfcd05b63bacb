use crate::node::{NodeRef, NUM_PRIOR_ROWS};

// ---------------------------------------------------------------------------
// EvalResult — output of one state evaluation
// ---------------------------------------------------------------------------

/// Priors and value for one state node: `NUM_PRIOR_ROWS` meta rows over the
/// alphabet (row 0 feeds the state node's own selection, row `k+1` the k-th
/// chain stage), the special-type distribution, and a scalar value estimate.
#[derive(Clone, Debug)]
#[must_use]
pub struct EvalResult {
    pub meta_priors: Vec<Vec<f32>>,
    pub special_priors: Vec<f32>,
    pub value: f32,
}

// ---------------------------------------------------------------------------
// Evaluator trait
// ---------------------------------------------------------------------------

/// Clean boundary between search and evaluation.
///
/// The driver hands over a batch of leaf state nodes and gets priors +
/// values back; it doesn't know whether the evaluator is a neural network,
/// a uniform prior, or anything else.
///
/// `Send + Sync` because one evaluator is shared across search threads.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, node: &NodeRef) -> EvalResult;

    /// Batch evaluation — sequential fallback; real evaluators override for
    /// device batching. Must preserve input order.
    fn evaluate_batch(&self, nodes: &[NodeRef]) -> Vec<EvalResult> {
        nodes.iter().map(|n| self.evaluate(n)).collect()
    }
}

// ---------------------------------------------------------------------------
// UniformEvaluator — no-model mode
// ---------------------------------------------------------------------------

/// Flat priors over the whole alphabet and zero values.
///
/// Normalisation happens when priors are gathered over the permissible
/// sub-actions, so flat rows turn into uniform distributions over exactly
/// the candidates on offer.
pub struct UniformEvaluator {
    alphabet_size: usize,
}

impl UniformEvaluator {
    pub fn new(alphabet_size: usize) -> Self {
        Self { alphabet_size }
    }
}

impl Evaluator for UniformEvaluator {
    fn evaluate(&self, _node: &NodeRef) -> EvalResult {
        EvalResult {
            meta_priors: vec![vec![1.0; self.alphabet_size]; NUM_PRIOR_ROWS],
            special_priors: vec![1.0; self.alphabet_size],
            value: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// ConstantValueEvaluator — test-only, configurable constant values
// ---------------------------------------------------------------------------

/// Flat priors + a constant value output. Test-only.
///
/// Use this to exercise backup propagation with non-zero leaf values, which
/// `UniformEvaluator` can't (it always returns 0).
#[cfg(test)]
pub(crate) struct ConstantValueEvaluator {
    pub alphabet_size: usize,
    pub value: f32,
}

#[cfg(test)]
impl Evaluator for ConstantValueEvaluator {
    fn evaluate(&self, _node: &NodeRef) -> EvalResult {
        EvalResult {
            meta_priors: vec![vec![1.0; self.alphabet_size]; NUM_PRIOR_ROWS],
            special_priors: vec![1.0; self.alphabet_size],
            value: self.value,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
