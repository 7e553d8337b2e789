use rand::{rngs::StdRng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

/// Seeded generator behind `getRandomNr`. Only the seed and the number of
/// draws are persisted; restoring replays the stream to the same point.
#[derive(Debug, Clone)]
pub struct ScriptRng {
    seed: u64,
    draws: u64,
    rng: StdRng,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngState {
    pub seed: u64,
    pub draws: u64,
}

impl ScriptRng {
    pub fn new(seed: u64) -> Self {
        ScriptRng {
            seed,
            draws: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Value in `0..=max`, one 32-bit draw per call. Negative maxima yield 0.
    pub fn next_in(&mut self, max: i32) -> i32 {
        self.draws += 1;
        let range = max.max(0) as u64 + 1;
        (self.rng.next_u32() as u64 % range) as i32
    }

    pub fn state(&self) -> RngState {
        RngState {
            seed: self.seed,
            draws: self.draws,
        }
    }

    pub fn restore(state: RngState) -> Self {
        let mut rng = ScriptRng::new(state.seed);
        for _ in 0..state.draws {
            rng.rng.next_u32();
        }
        rng.draws = state.draws;
        rng
    }
}
