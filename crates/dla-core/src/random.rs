//! Source of the uniform choices that drive walkers.

use rand::Rng;

/// Uniform draws consumed by the walk and launch logic.
///
/// Every [`Rng`] is a source; tests substitute scripted sequences.
pub trait RandomSource {
    /// Index into [`crate::DIRECTIONS`], uniform in `0..8`.
    fn direction(&mut self) -> usize;

    /// Launch offset, uniform in `[-radius, radius]`.
    fn offset(&mut self, radius: i32) -> i32;
}

impl<R: Rng> RandomSource for R {
    fn direction(&mut self) -> usize {
        self.random_range(0..crate::DIRECTIONS.len())
    }

    fn offset(&mut self, radius: i32) -> i32 {
        self.random_range(-radius..=radius)
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    use super::RandomSource;
    use std::collections::VecDeque;

    /// Replays fixed directions and offsets; panics when a script runs dry.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedSource {
        directions: VecDeque<usize>,
        offsets: VecDeque<i32>,
    }

    impl ScriptedSource {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Queue a launch point relative to center.
        pub(crate) fn launch_at(mut self, d_row: i32, d_col: i32) -> Self {
            self.offsets.push_back(d_row);
            self.offsets.push_back(d_col);
            self
        }

        pub(crate) fn steps(mut self, directions: &[usize]) -> Self {
            self.directions.extend(directions.iter().copied());
            self
        }

        pub(crate) fn repeat(mut self, direction: usize, count: usize) -> Self {
            self.directions.extend(std::iter::repeat_n(direction, count));
            self
        }

        pub(crate) fn is_exhausted(&self) -> bool {
            self.directions.is_empty() && self.offsets.is_empty()
        }
    }

    impl RandomSource for ScriptedSource {
        fn direction(&mut self) -> usize {
            self.directions.pop_front().expect("direction script exhausted")
        }

        fn offset(&mut self, radius: i32) -> i32 {
            let value = self.offsets.pop_front().expect("offset script exhausted");
            assert!(value.abs() <= radius, "scripted offset outside radius");
            value
        }
    }
}
