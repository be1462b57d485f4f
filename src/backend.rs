//! Executing a kernel over every cell of a table.
//!
//! A pass is a kernel: a pure function from a cell index to the values of
//! that cell in each of the pass's output tables. Cells never depend on each
//! other within a pass, so the backend is free to evaluate them in any order
//! and on any number of threads. The results are written back in one sweep
//! after every cell is evaluated, so a pass never observes its own partially
//! written output.

use log::warn;
use ndarray::{indices, Dimension, Zip};

use crate::{
    error::PrecomputeError,
    table::{Table, Texel},
};

/// How a kernel result is combined with what a table already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Replace the cell
    Overwrite,
    /// Add to the cell
    Additive,
}

impl BlendMode {
    fn apply(self, dst: &mut Texel, src: &Texel) {
        match self {
            BlendMode::Overwrite => *dst = *src,
            BlendMode::Additive => dst.iter_mut().zip(src).for_each(|(d, s)| *d += s),
        }
    }
}

/// Something that can run a data-parallel kernel over a set of tables.
pub trait ComputeBackend {
    /// Evaluate `kernel` for every cell of `targets` and blend the results in.
    ///
    /// All targets must have the same shape. Result `n` of the kernel goes to
    /// target `n`, and every cell is written exactly once.
    fn dispatch<D, F, const N: usize>(
        &self,
        targets: [&mut Table<D>; N],
        blend: BlendMode,
        kernel: F,
    ) where
        D: Dimension + Copy,
        D::Pattern: Send,
        F: Fn(D::Pattern) -> [Texel; N] + Sync + Send;
}

/// Blend the collected kernel results into the targets.
fn write_back<D, const N: usize>(
    targets: [&mut Table<D>; N],
    blend: BlendMode,
    results: &ndarray::Array<[Texel; N], D>,
) where
    D: Dimension,
{
    for (n, target) in targets.into_iter().enumerate() {
        debug_assert_eq!(target.shape(), results.shape());
        Zip::from(target.data_mut())
            .and(results)
            .for_each(|dst, src| blend.apply(dst, &src[n]));
    }
}

/// Runs kernels on a dedicated rayon thread pool.
#[derive(Debug)]
pub struct RayonBackend {
    pool: rayon::ThreadPool,
}

impl RayonBackend {
    /// Create the thread pool. `num_threads` must be positive, or `None` to
    /// automatically choose the number of threads.
    pub fn new(num_threads: Option<usize>) -> Result<Self, PrecomputeError> {
        let available = std::thread::available_parallelism();
        if let (Some(requested), Ok(available)) = (num_threads, available) {
            if requested > available.get() {
                warn!("{requested} threads requested, but only {available} are available");
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.unwrap_or(0))
            .build()?;
        Ok(Self { pool })
    }

    /// Number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ComputeBackend for RayonBackend {
    fn dispatch<D, F, const N: usize>(
        &self,
        targets: [&mut Table<D>; N],
        blend: BlendMode,
        kernel: F,
    ) where
        D: Dimension + Copy,
        D::Pattern: Send,
        F: Fn(D::Pattern) -> [Texel; N] + Sync + Send,
    {
        let Some(dim) = targets.first().map(|t| t.data().raw_dim()) else {
            return;
        };

        let results = self
            .pool
            .install(|| Zip::from(indices(dim)).par_map_collect(&kernel));
        write_back(targets, blend, &results);
    }
}

/// Runs kernels on the calling thread, one cell after the other.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialBackend;

impl ComputeBackend for SerialBackend {
    fn dispatch<D, F, const N: usize>(
        &self,
        targets: [&mut Table<D>; N],
        blend: BlendMode,
        kernel: F,
    ) where
        D: Dimension + Copy,
        D::Pattern: Send,
        F: Fn(D::Pattern) -> [Texel; N] + Sync + Send,
    {
        let Some(dim) = targets.first().map(|t| t.data().raw_dim()) else {
            return;
        };

        let results = Zip::from(indices(dim)).map_collect(&kernel);
        write_back(targets, blend, &results);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table2;

    fn kernel((h, l): (usize, usize)) -> [Texel; 2] {
        let x = (h * 10 + l) as f32;
        [[x, 0.0, 0.0, 0.0], [0.0, x * 2.0, 0.0, 0.0]]
    }

    #[test]
    fn overwrite_fills_every_target() {
        let backend = SerialBackend;
        let mut first = Table2::new(3, 4);
        let mut second = Table2::new(3, 4);
        backend.dispatch([&mut first, &mut second], BlendMode::Overwrite, kernel);

        assert_eq!(first.get((2, 3)).x, 23.0);
        assert_eq!(second.get((2, 3)).y, 46.0);
        assert_eq!(first.get((1, 0)).y, 0.0);
    }

    #[test]
    fn additive_adds_exactly_once() {
        let backend = RayonBackend::new(Some(2)).unwrap();
        let mut first = Table2::new(3, 4);
        let mut second = Table2::new(3, 4);

        backend.dispatch([&mut first, &mut second], BlendMode::Additive, kernel);
        backend.dispatch([&mut first, &mut second], BlendMode::Additive, kernel);
        assert_eq!(first.get((2, 1)).x, 42.0);

        backend.dispatch([&mut first, &mut second], BlendMode::Overwrite, kernel);
        assert_eq!(first.get((2, 1)).x, 21.0);
    }

    #[test]
    fn backends_agree() {
        let rayon = RayonBackend::new(None).unwrap();
        assert!(rayon.num_threads() > 0);

        let mut a = [Table2::new(17, 9), Table2::new(17, 9)];
        let mut b = a.clone();
        let [a0, a1] = &mut a;
        let [b0, b1] = &mut b;
        rayon.dispatch([a0, a1], BlendMode::Overwrite, kernel);
        SerialBackend.dispatch([b0, b1], BlendMode::Overwrite, kernel);
        assert_eq!(a, b);
    }
}
