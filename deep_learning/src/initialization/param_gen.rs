/// Source of the initial values of a weight matrix or bias vector.
pub trait ParamGen {
    /// Draws the next `n` values, fewer if the generator runs out.
    ///
    /// # Returns
    /// `None` once the generator is exhausted.
    fn sample(&mut self, n: usize) -> Option<Vec<f32>>;

    /// Overwrites the front of `out` with freshly drawn values.
    ///
    /// # Returns
    /// How many entries were written.
    fn fill(&mut self, out: &mut [f32]) -> usize {
        let Some(values) = self.sample(out.len()) else {
            return 0;
        };
        out[..values.len()].copy_from_slice(&values);
        values.len()
    }
}
