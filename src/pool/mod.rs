use std::num::NonZeroU32;
use std::sync::Arc;

use futures::future::join_all;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::io::AsyncWrite;
use tokio::task::{self, JoinError};

use crate::aggregator::Aggregator;
use crate::probe::Probe;
use crate::queue::ClaimQueue;

pub type SharedLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

pub fn build_limiter(rate: Option<u32>) -> Option<SharedLimiter> {
    let rate = NonZeroU32::new(rate?)?;
    Some(Arc::new(RateLimiter::direct(Quota::per_second(rate))))
}

// claim -> probe -> record until the queue runs dry; returns how many candidates
// this worker handled
pub async fn run_worker<P, W>(
    claims: ClaimQueue,
    probe: Arc<P>,
    aggregator: Arc<Aggregator<W>>,
    limiter: Option<SharedLimiter>,
) -> usize
where
    P: Probe + ?Sized,
    W: AsyncWrite + Unpin + Send,
{
    let mut handled = 0usize;
    loop {
        let Some(candidate) = claims.try_claim() else {
            break;
        };
        if let Some(lim) = limiter.as_ref() {
            lim.until_ready().await;
        }
        let outcome = probe.probe(&candidate.url).await;
        aggregator.record(outcome).await;
        handled += 1;
    }
    handled
}

/// Starts `workers` tasks over the same queue and waits for every one of them.
///
/// Returns the per-worker handled counts, in spawn order.
pub async fn run_pool<P, W>(
    workers: usize,
    claims: ClaimQueue,
    probe: Arc<P>,
    aggregator: Arc<Aggregator<W>>,
    limiter: Option<SharedLimiter>,
) -> Result<Vec<usize>, JoinError>
where
    P: Probe + ?Sized + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let handles: Vec<_> = (0..workers.max(1))
        .map(|_| {
            task::spawn(run_worker(
                claims.clone(),
                probe.clone(),
                aggregator.clone(),
                limiter.clone(),
            ))
        })
        .collect();
    drop(claims);

    join_all(handles).await.into_iter().collect()
}
