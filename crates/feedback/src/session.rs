use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Re-rolls the per-effect random vector once per interaction session.
#[derive(Debug)]
pub struct SessionRandomizer {
    rng: StdRng,
    session: Option<u64>,
    seed: [f32; 3],
}

impl SessionRandomizer {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Deterministic sequence, for headless renders and tests.
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(mut rng: StdRng) -> Self {
        let seed = roll(&mut rng);
        Self {
            rng,
            session: None,
            seed,
        }
    }

    /// Observes the pose source's session id; returns `true` when a new
    /// session started and the vector was re-rolled.
    pub fn observe(&mut self, session_id: u64) -> bool {
        if self.session == Some(session_id) {
            return false;
        }
        let previous = self.session.replace(session_id);
        if previous.is_none() {
            return false;
        }
        let mut next = roll(&mut self.rng);
        while next == self.seed {
            next = roll(&mut self.rng);
        }
        self.seed = next;
        tracing::debug!(session_id, seed = ?self.seed, "reseeded session random");
        true
    }

    pub fn seed(&self) -> [f32; 3] {
        self.seed
    }
}

impl Default for SessionRandomizer {
    fn default() -> Self {
        Self::new()
    }
}

fn roll(rng: &mut StdRng) -> [f32; 3] {
    [
        rng.gen::<f32>() * 0.5,
        rng.gen::<f32>() * 0.5,
        rng.gen::<f32>() * 0.5,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_rerolls_seed() {
        let mut session = SessionRandomizer::seeded(7);
        session.observe(1);
        let first = session.seed();
        assert!(session.observe(2));
        assert_ne!(session.seed(), first);
    }

    #[test]
    fn same_session_keeps_seed() {
        let mut session = SessionRandomizer::seeded(7);
        session.observe(3);
        let seed = session.seed();
        for _ in 0..10 {
            assert!(!session.observe(3));
            assert_eq!(session.seed(), seed);
        }
    }

    #[test]
    fn components_stay_in_half_range() {
        let mut session = SessionRandomizer::seeded(11);
        for id in 0..50 {
            session.observe(id);
            assert!(session.seed().iter().all(|c| (0.0..0.5).contains(c)));
        }
    }
}
