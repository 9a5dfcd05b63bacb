//! Shared test fixtures: small alphabets, seeded sessions.

use std::sync::Arc;

use crate::action::ActionSpace;
use crate::env::{Env, EnvOpts};
use crate::node::PlayPolicy;
use crate::search::{Mcts, MctsConfig};
use crate::word::{Abc, IdSeq};

pub(crate) const A: Abc = 4;
pub(crate) const B: Abc = 5;
pub(crate) const C: Abc = 6;
pub(crate) const D: Abc = 7;

/// Per-test knobs with sane defaults; everything else is fixed.
pub(crate) struct SessionOpts {
    pub final_reward: f32,
    pub step_penalty: f32,
    pub game_count: u32,
    pub virtual_loss: f32,
    pub num_threads: usize,
    pub depth_limit: usize,
    pub add_noise: bool,
}

impl Default for SessionOpts {
    fn default() -> Self {
        Self {
            final_reward: 1.0,
            step_penalty: -0.02,
            game_count: 3,
            virtual_loss: 0.5,
            num_threads: 2,
            depth_limit: 10,
            add_noise: true,
        }
    }
}

fn config(opts: &SessionOpts) -> MctsConfig {
    MctsConfig {
        puct_c: 5.0,
        heur_c: 1.0,
        add_noise: opts.add_noise,
        game_count: opts.game_count,
        virtual_loss: opts.virtual_loss,
        num_threads: opts.num_threads,
        depth_limit: opts.depth_limit,
        play_policy: PlayPolicy::MaxValue,
        seed: 7,
    }
}

/// One-word session over an 8-symbol alphabet with the single edge `A -> C`.
pub(crate) fn session(start: Vec<IdSeq>, end: Vec<IdSeq>, opts: SessionOpts) -> Mcts {
    let env = Env::new(
        start,
        end,
        EnvOpts {
            final_reward: opts.final_reward,
            step_penalty: opts.step_penalty,
            dist_weight: 1.0,
        },
    );
    let mut space = ActionSpace::new(8);
    space.register_edge(A, C);
    Mcts::new(env, Arc::new(space), config(&opts))
}

/// Two-word session over a 10-symbol alphabet with a denser edge catalog,
/// including an inverse pair so transpositions and cycles show up.
pub(crate) fn two_word_session(opts: SessionOpts) -> Mcts {
    let env = Env::new(
        vec![vec![A, B, A], vec![B, A]],
        vec![vec![C, B, C], vec![B, C]],
        EnvOpts {
            final_reward: opts.final_reward,
            step_penalty: opts.step_penalty,
            dist_weight: 1.0,
        },
    );
    let mut space = ActionSpace::new(10);
    space.register_edge(A, C);
    space.register_edge(C, A);
    space.register_edge(B, C);
    space.register_edge(A, D);
    Mcts::new(env, Arc::new(space), config(&opts))
}
