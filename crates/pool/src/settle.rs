//! Partitioning of settled fan-out results.

/// Outcomes of a set of concurrent operations that have all finished,
/// split by success. Both halves keep the order of the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled<T, E> {
    /// Values of the operations that succeeded.
    pub successful: Vec<T>,
    /// Errors of the operations that failed.
    pub rejected: Vec<E>,
}

impl<T, E> Default for Settled<T, E> {
    fn default() -> Self {
        Self { successful: Vec::new(), rejected: Vec::new() }
    }
}

impl<T, E> FromIterator<Result<T, E>> for Settled<T, E> {
    fn from_iter<I: IntoIterator<Item = Result<T, E>>>(iter: I) -> Self {
        let mut settled = Self::default();
        for result in iter {
            match result {
                Ok(value) => settled.successful.push(value),
                Err(error) => settled.rejected.push(error),
            }
        }
        settled
    }
}
