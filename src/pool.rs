//! Ordered fan-out over a fixed set of worker threads.
//!
//! Inputs are queued up front on an unbounded channel; workers send results on
//! a bounded channel tagged with the input's index, and the calling thread
//! reassembles them so `consume` always sees inputs in their original order.

use crate::error::Result;
use crossbeam_channel::{bounded, unbounded, Receiver};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::debug;

/// Worker count when none is configured.
pub fn default_jobs() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Run `work` over `inputs` on `jobs` threads and hand each result to
/// `consume` in input order, on the calling thread.
///
/// The first error, from either side, stops workers picking up new inputs.
/// It is returned after every earlier input has been consumed. With
/// `jobs <= 1` everything runs on the calling thread.
pub fn for_each_ordered<I, T, W, C>(jobs: usize, inputs: Vec<I>, work: W, mut consume: C) -> Result<()>
where
    I: Send,
    T: Send,
    W: Fn(&I) -> Result<T> + Sync,
    C: FnMut(I, T) -> Result<()>,
{
    if jobs <= 1 || inputs.len() <= 1 {
        for input in inputs {
            let output = work(&input)?;
            consume(input, output)?;
        }
        return Ok(());
    }

    let workers = jobs.min(inputs.len());
    let (task_tx, task_rx) = unbounded::<(usize, I)>();
    for task in inputs.into_iter().enumerate() {
        if task_tx.send(task).is_err() {
            break;
        }
    }
    drop(task_tx);

    let (result_tx, result_rx) = bounded::<(usize, I, Result<T>)>(workers * 2);
    let cancel = AtomicBool::new(false);
    debug!(workers, "starting worker pool");

    thread::scope(|scope| {
        for _ in 0..workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let work = &work;
            let cancel = &cancel;
            scope.spawn(move || loop {
                if cancel.load(Ordering::Acquire) {
                    break;
                }
                let Ok((index, input)) = task_rx.recv() else {
                    break;
                };
                let output = work(&input);
                if output.is_err() {
                    cancel.store(true, Ordering::Release);
                }
                if result_tx.send((index, input, output)).is_err() {
                    break;
                }
            });
        }
        drop(result_tx);

        drain_in_order(result_rx, &cancel, &mut consume)
    })
}

/// Consume results as soon as the next expected index is available.
/// Dropping `results` on return unblocks any worker waiting to send.
fn drain_in_order<I, T, C>(
    results: Receiver<(usize, I, Result<T>)>,
    cancel: &AtomicBool,
    consume: &mut C,
) -> Result<()>
where
    C: FnMut(I, T) -> Result<()>,
{
    let mut pending = BTreeMap::new();
    let mut next = 0usize;

    for (index, input, output) in results.iter() {
        pending.insert(index, (input, output));
        while let Some((input, output)) = pending.remove(&next) {
            next += 1;
            let outcome = output.and_then(|output| consume(input, output));
            if let Err(e) = outcome {
                cancel.store(true, Ordering::Release);
                return Err(e);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DebtError;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn slow_square(n: &u64) -> Result<u64> {
        // Later inputs finish first.
        thread::sleep(Duration::from_millis(20u64.saturating_sub(*n)));
        Ok(n * n)
    }

    #[test]
    fn preserves_input_order() {
        for jobs in [1, 2, 4, 16] {
            let mut seen = Vec::new();
            for_each_ordered(jobs, (0..20).collect(), slow_square, |n, sq| {
                seen.push((n, sq));
                Ok(())
            })
            .unwrap();
            let expected: Vec<(u64, u64)> = (0..20).map(|n| (n, n * n)).collect();
            assert_eq!(seen, expected, "jobs = {jobs}");
        }
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let mut calls = 0;
        for_each_ordered(4, Vec::<u64>::new(), slow_square, |_, _| {
            calls += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(calls, 0);
    }

    #[test]
    fn work_error_is_returned_after_earlier_results() {
        for jobs in [1, 4] {
            let mut consumed = Vec::new();
            let err = for_each_ordered(
                jobs,
                (0..50u64).collect(),
                |n| {
                    if *n == 10 {
                        Err(DebtError::DiffParse(format!("bad {n}")))
                    } else {
                        Ok(*n)
                    }
                },
                |n, _| {
                    consumed.push(n);
                    Ok(())
                },
            )
            .unwrap_err();

            assert!(matches!(err, DebtError::DiffParse(msg) if msg == "bad 10"));
            assert_eq!(consumed, (0..10).collect::<Vec<_>>(), "jobs = {jobs}");
        }
    }

    #[test]
    fn consume_error_stops_the_pool() {
        let computed = AtomicUsize::new(0);
        let err = for_each_ordered(
            2,
            (0..1000u64).collect(),
            |n| {
                computed.fetch_add(1, Ordering::SeqCst);
                Ok(*n)
            },
            |n, _| {
                if n == 3 {
                    Err(DebtError::UnknownMetric("x".into()))
                } else {
                    Ok(())
                }
            },
        )
        .unwrap_err();

        assert!(matches!(err, DebtError::UnknownMetric(_)));
        assert!(computed.load(Ordering::SeqCst) < 1000);
    }
}
