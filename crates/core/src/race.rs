//! First-success racing over a fixed set of futures.

use std::future::Future;

use futures_util::stream::{FuturesUnordered, StreamExt};

/// Drive all `futures` concurrently and return the first `Ok`.
///
/// Settle order decides the winner, not start order. Futures still pending
/// when a winner appears are dropped, which cancels them. If every future
/// fails, all errors are returned in settle order; an empty input yields an
/// empty error list.
pub async fn first_success<I, F, T, E>(futures: I) -> Result<T, Vec<E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    let mut pending: FuturesUnordered<F> = futures.into_iter().collect();
    let mut failures = Vec::with_capacity(pending.len());

    while let Some(outcome) = pending.next().await {
        match outcome {
            Ok(value) => return Ok(value),
            Err(err) => failures.push(err),
        }
    }

    Err(failures)
}
