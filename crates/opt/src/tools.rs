//! Process-wide utilities shared by all opale crates: the seedable random
//! generator with per-thread streams and the parallel-for primitive.

/// A process-wide pseudo-random generator.
///
/// The generator is seeded once (ideally at process start) with [`seed`];
/// each thread then lazily derives its own `Xoshiro256Plus` stream so that
/// parallel regions never contend on a lock. Reseeding starts a new epoch:
/// live thread streams are replaced the next time they are used.
pub mod rng {
    use ndarray::Array1;
    use ndarray_rand::rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256Plus;
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicU64, Ordering};

    static SEED: AtomicU64 = AtomicU64::new(0x5eed_0ba1);
    static EPOCH: AtomicU64 = AtomicU64::new(1);
    static STREAMS: AtomicU64 = AtomicU64::new(0);

    struct Slot {
        epoch: u64,
        id: Option<u64>,
        rng: Xoshiro256Plus,
    }

    thread_local! {
        static STREAM: RefCell<Slot> = RefCell::new(Slot {
            epoch: 0,
            id: None,
            rng: Xoshiro256Plus::seed_from_u64(0),
        });
    }

    /// Seed the process-wide generator.
    ///
    /// Thread streams spawned before the call are invalidated and re-derived
    /// from the new seed on their next use. Each thread keeps its stream
    /// number across reseeds, so reseeding with the same value replays the
    /// same per-thread sequence.
    pub fn seed(seed: u64) {
        SEED.store(seed, Ordering::SeqCst);
        EPOCH.fetch_add(1, Ordering::SeqCst);
    }

    /// Run `f` with the calling thread's random stream.
    pub fn with_rng<T>(f: impl FnOnce(&mut Xoshiro256Plus) -> T) -> T {
        STREAM.with(|cell| {
            let mut slot = cell.borrow_mut();
            let epoch = EPOCH.load(Ordering::SeqCst);
            if slot.epoch != epoch {
                let id = *slot
                    .id
                    .get_or_insert_with(|| STREAMS.fetch_add(1, Ordering::SeqCst));
                let base = SEED.load(Ordering::SeqCst);
                // distinct streams through a Weyl sequence on the seed
                let derived = base.wrapping_add(id.wrapping_mul(0x9E37_79B9_7F4A_7C15));
                slot.rng = Xoshiro256Plus::seed_from_u64(derived);
                slot.epoch = epoch;
            }
            f(&mut slot.rng)
        })
    }

    /// One sample uniform in `[lo, hi)`.
    pub fn uniform(lo: f64, hi: f64) -> f64 {
        with_rng(|rng| rng.gen_range(lo..hi))
    }

    /// A vector of `dim` components uniform in the unit box `[0, 1)^dim`.
    pub fn random_unit_vector(dim: usize) -> Array1<f64> {
        with_rng(|rng| Array1::from_iter((0..dim).map(|_| rng.gen_range(0.0..1.0))))
    }
}

/// The single parallel-for primitive of the opale crates.
///
/// Everything CPU-bound fans out through these helpers so that the
/// threading library never appears in a public API. Under a one-thread
/// rayon pool the iteration order is the sequential one.
pub mod par {
    use rayon::prelude::*;

    /// Run `body(i)` for `i` in `0..n`, possibly in parallel.
    pub fn par_loop(n: usize, body: impl Fn(usize) + Sync + Send) {
        (0..n).into_par_iter().for_each(body);
    }

    /// Collect `body(i)` for `i` in `0..n`, preserving index order.
    pub fn par_map<T: Send>(n: usize, body: impl Fn(usize) -> T + Sync + Send) -> Vec<T> {
        (0..n).into_par_iter().map(body).collect()
    }

    /// Run `body(i, &mut items[i])` for every item, possibly in parallel.
    pub fn par_for_each_mut<T: Send>(items: &mut [T], body: impl Fn(usize, &mut T) + Sync + Send) {
        items
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, item)| body(i, item));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_vector_bounds() {
        rng::seed(42);
        for _ in 0..1000 {
            let v = rng::random_unit_vector(3);
            assert_eq!(v.len(), 3);
            assert!(v.iter().all(|&x| (0.0..1.0).contains(&x)));
        }
    }

    #[test]
    fn test_thread_streams_are_distinct() {
        rng::seed(7);
        let here = rng::random_unit_vector(8);
        let there = std::thread::spawn(|| rng::random_unit_vector(8))
            .join()
            .unwrap();
        // each thread draws from its own stream
        assert_ne!(here, there);
        assert_ne!(here, rng::random_unit_vector(8));
    }

    #[test]
    fn test_par_map_order() {
        let squares = par::par_map(10, |i| i * i);
        assert_eq!(squares, vec![0, 1, 4, 9, 16, 25, 36, 49, 64, 81]);
    }

    #[test]
    fn test_par_for_each_mut() {
        let mut data = vec![0usize; 8];
        par::par_for_each_mut(&mut data, |i, v| *v = i + 1);
        assert_eq!(data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
