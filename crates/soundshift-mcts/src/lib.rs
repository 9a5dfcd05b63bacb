pub mod action;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod node;
pub mod search;
pub mod table;
pub mod word;

#[cfg(feature = "python")]
pub mod bindings;

#[cfg(test)]
pub(crate) mod test_util;

pub use action::{ActionSpace, PotentialAction, RuleAction};
pub use env::{Env, EnvOpts};
pub use error::{MctsError, Result};
pub use evaluator::{EvalResult, Evaluator, UniformEvaluator};
pub use node::{
    ActionPhase, Affected, ChosenChar, Evaluation, Node, NodeKind, NodeRef, ParentLink,
    PlayPolicy, Stats, END_DEPTH, NUM_PRIOR_ROWS, PRUNED_SCORE, VALUE_FLOOR,
};
pub use search::{stack_ids, Mcts, MctsConfig, SimPath, Subpath};
pub use table::Table;
pub use word::{
    levenshtein, to_padded, Abc, IdSeq, State, Word, WordSpace, ANY, NUM_RESERVED, PAD,
    SPECIAL_BASIC, STOP,
};
