//! Executors run a list of independent traversal jobs and reduce their
//! accumulators.
//!
//! The jobs are split into contiguous chunks. Every chunk gets a fresh
//! accumulator and the chunk accumulators are merged in chunk order. For a
//! fixed number of chunks the result is therefore reproducible, no matter
//! which thread ran which chunk.

use crate::error::Error;
use rayon::prelude::*;

pub(crate) trait Executor {
    /// Run `job(i, &mut acc)` for every `i` in `0..n_jobs` and return the
    /// merged accumulator.
    fn run<A, M, J, R>(&self, n_jobs: usize, make: M, job: J, merge: R) -> Result<A, Error>
    where
        A: Send,
        M: Fn() -> A + Sync,
        J: Fn(usize, &mut A) -> Result<(), Error> + Sync,
        R: Fn(&mut A, A) -> Result<(), Error>;
}

/// Runs every job on the calling thread
pub(crate) struct SerialExecutor;

impl Executor for SerialExecutor {
    fn run<A, M, J, R>(&self, n_jobs: usize, make: M, job: J, _merge: R) -> Result<A, Error>
    where
        A: Send,
        M: Fn() -> A + Sync,
        J: Fn(usize, &mut A) -> Result<(), Error> + Sync,
        R: Fn(&mut A, A) -> Result<(), Error>,
    {
        let mut acc = make();
        for i in 0..n_jobs {
            job(i, &mut acc)?;
        }
        Ok(acc)
    }
}

/// Runs chunks of jobs on a dedicated rayon thread pool
pub(crate) struct ThreadPoolExecutor {
    pool: rayon::ThreadPool,
    n_threads: usize,
}

impl ThreadPoolExecutor {
    /// number of chunks created per thread (for load balancing)
    const CHUNKS_PER_THREAD: usize = 8;

    pub(crate) fn new(n_threads: usize) -> Result<Self, Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build()
            .map_err(|e| Error::parameter("num_threads", e.to_string()))?;
        Ok(Self { pool, n_threads })
    }
}

impl Executor for ThreadPoolExecutor {
    fn run<A, M, J, R>(&self, n_jobs: usize, make: M, job: J, merge: R) -> Result<A, Error>
    where
        A: Send,
        M: Fn() -> A + Sync,
        J: Fn(usize, &mut A) -> Result<(), Error> + Sync,
        R: Fn(&mut A, A) -> Result<(), Error>,
    {
        let n_chunks = (self.n_threads * Self::CHUNKS_PER_THREAD).min(n_jobs).max(1);
        let partials: Vec<Result<A, Error>> = self.pool.install(|| {
            (0..n_chunks)
                .into_par_iter()
                .map(|chunk| {
                    let start = chunk * n_jobs / n_chunks;
                    let stop = (chunk + 1) * n_jobs / n_chunks;
                    let mut acc = make();
                    for i in start..stop {
                        job(i, &mut acc)?;
                    }
                    Ok(acc)
                })
                .collect()
        });

        let mut out = make();
        for partial in partials {
            merge(&mut out, partial?)?;
        }
        Ok(out)
    }
}

/// The executor selected for a calculation
pub(crate) enum Workers {
    Serial(SerialExecutor),
    Pool(ThreadPoolExecutor),
}

impl Workers {
    /// `n_threads <= 1` runs everything on the calling thread
    pub(crate) fn new(n_threads: usize) -> Result<Self, Error> {
        if n_threads <= 1 {
            Ok(Workers::Serial(SerialExecutor))
        } else {
            Ok(Workers::Pool(ThreadPoolExecutor::new(n_threads)?))
        }
    }
}

impl Executor for Workers {
    fn run<A, M, J, R>(&self, n_jobs: usize, make: M, job: J, merge: R) -> Result<A, Error>
    where
        A: Send,
        M: Fn() -> A + Sync,
        J: Fn(usize, &mut A) -> Result<(), Error> + Sync,
        R: Fn(&mut A, A) -> Result<(), Error>,
    {
        match self {
            Workers::Pool(pool) if n_jobs > 1 => pool.run(n_jobs, make, job, merge),
            _ => SerialExecutor.run(n_jobs, make, job, merge),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum_squares(executor: &impl Executor, n: usize) -> Vec<f64> {
        executor
            .run(
                n,
                || vec![0.0; 2],
                |i, acc: &mut Vec<f64>| {
                    acc[i % 2] += (i * i) as f64;
                    Ok(())
                },
                |out, other| {
                    for (a, b) in out.iter_mut().zip(other) {
                        *a += b;
                    }
                    Ok(())
                },
            )
            .unwrap()
    }

    #[test]
    fn serial_and_threaded_agree() {
        let serial = sum_squares(&SerialExecutor, 101);
        let threaded = sum_squares(&ThreadPoolExecutor::new(3).unwrap(), 101);
        assert_eq!(serial, threaded);
        let expected: f64 = (0..101).filter(|i| i % 2 == 0).map(|i| (i * i) as f64).sum();
        assert_eq!(serial[0], expected);
    }

    #[test]
    fn errors_propagate() {
        let result = ThreadPoolExecutor::new(2).unwrap().run(
            10,
            || 0usize,
            |i, _acc: &mut usize| {
                if i == 7 { Err(Error::internal("job failed")) } else { Ok(()) }
            },
            |out, other| {
                *out += other;
                Ok(())
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn workers_choose_executor() {
        assert!(matches!(Workers::new(1).unwrap(), Workers::Serial(_)));
        let workers = Workers::new(2).unwrap();
        assert!(matches!(workers, Workers::Pool(_)));
        assert_eq!(sum_squares(&workers, 40), sum_squares(&SerialExecutor, 40));
    }

    #[test]
    fn no_jobs() {
        let out = SerialExecutor
            .run(0, || 5usize, |_, _: &mut usize| Ok(()), |_, _| Ok(()))
            .unwrap();
        assert_eq!(out, 5);
    }
}
