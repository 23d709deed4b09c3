//! Background verification of pooled proxies.
//!
//! The loop repeatedly takes a random entry out of the pool, probes it and puts
//! it back: reset to score 0 on success, demoted by the failure penalty
//! otherwise. Entries whose score would reach [`MAX_SCORE`] are dropped.

use crate::config::AutoProxyConfig;
use crate::error::{Empty, VerifierError};
use crate::pool::{ProxyPool, Wait, MAX_SCORE};
use crate::probe::Prober;
use crate::proxy::PoolEntry;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Lifecycle of the verification loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Result of verifying one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Probe succeeded, entry re-queued with score 0.
    Promoted,
    /// Probe failed, entry re-queued with the new score.
    Demoted(u32),
    /// Probe failed and the entry ran out of score; it is gone for good.
    Dropped,
}

#[derive(Debug, Clone, Copy)]
struct LoopSettings {
    interval: Duration,
    pop_timeout: Duration,
    failure_penalty: u32,
}

/// Handle to the background verification task.
pub struct Verifier {
    pool: Arc<ProxyPool>,
    prober: Arc<dyn Prober>,
    settings: LoopSettings,
    state: Arc<Mutex<VerifierState>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Verifier {
    pub fn new(pool: Arc<ProxyPool>, prober: Arc<dyn Prober>, config: &AutoProxyConfig) -> Self {
        Self {
            pool,
            prober,
            settings: LoopSettings {
                interval: config.verify_interval,
                pop_timeout: config.pop_timeout,
                failure_penalty: config.failure_penalty,
            },
            state: Arc::new(Mutex::new(VerifierState::Idle)),
            shutdown: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> VerifierState {
        *self.state.lock()
    }

    /// Spawn the loop on the current tokio runtime.
    ///
    /// Fails if the loop is running or still stopping, or if called outside a
    /// runtime. A stopped loop may be started again.
    pub fn start(&self) -> Result<(), VerifierError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| VerifierError::NoRuntime)?;

        // The state lock is held until the sender is installed so `stop` never
        // sees `Running` without a way to signal the loop.
        let mut state = self.state.lock();
        match *state {
            VerifierState::Running | VerifierState::Stopping => return Err(VerifierError::AlreadyStarted),
            VerifierState::Idle | VerifierState::Stopped => {}
        }

        let (tx, rx) = watch::channel(false);
        let handle = runtime.spawn(run_loop(
            Arc::clone(&self.pool),
            Arc::clone(&self.prober),
            self.settings,
            Arc::clone(&self.state),
            rx,
        ));
        *self.shutdown.lock() = Some(tx);
        *self.task.lock() = Some(handle);
        *state = VerifierState::Running;
        drop(state);

        info!("Proxy verification started");
        Ok(())
    }

    /// Ask the loop to stop. It exits after finishing the cycle in progress.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if *state != VerifierState::Running {
            return;
        }
        *state = VerifierState::Stopping;
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(true);
        }
        drop(state);
        info!("Proxy verification stopping");
    }

    /// Wait for the loop task to exit.
    pub async fn stopped(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Verification task failed: {}", e);
                *self.state.lock() = VerifierState::Stopped;
            }
        }
    }
}

impl Drop for Verifier {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.get_mut().take() {
            let _ = tx.send(true);
        }
    }
}

async fn run_loop(
    pool: Arc<ProxyPool>,
    prober: Arc<dyn Prober>,
    settings: LoopSettings,
    state: Arc<Mutex<VerifierState>>,
    mut shutdown: watch::Receiver<bool>,
) {
    // A zero interval disables pacing.
    let pacer = Quota::with_period(settings.interval).map(RateLimiter::direct);

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = pace(pacer.as_ref()) => {}
            _ = shutdown.changed() => break,
        }

        let popped = {
            let pool = Arc::clone(&pool);
            let wait = Wait::Timeout(settings.pop_timeout);
            tokio::task::spawn_blocking(move || pool.pop_random(wait)).await
        };
        let entry = match popped {
            Ok(Ok(entry)) => entry,
            Ok(Err(Empty)) => continue,
            Err(e) => {
                error!("Pool wait task failed: {}", e);
                continue;
            }
        };

        verify_entry(&pool, prober.as_ref(), entry, settings.failure_penalty).await;
    }

    *state.lock() = VerifierState::Stopped;
    info!("Proxy verification stopped");
}

async fn pace(pacer: Option<&DefaultDirectRateLimiter>) {
    if let Some(pacer) = pacer {
        pacer.until_ready().await;
    }
}

/// Probe one entry that has been taken out of the pool and re-queue or drop it.
pub async fn verify_entry(
    pool: &ProxyPool,
    prober: &dyn Prober,
    mut entry: PoolEntry,
    failure_penalty: u32,
) -> Verdict {
    match prober.probe(&entry.descriptor).await {
        Ok(()) => {
            debug!("Proxy {} is alive", entry.descriptor);
            entry.score = 0;
            pool.put(entry);
            Verdict::Promoted
        }
        Err(e) => {
            let score = entry.score.saturating_add(failure_penalty);
            if score < MAX_SCORE {
                debug!("Proxy {} failed probe ({}), score {} -> {}", entry.descriptor, e, entry.score, score);
                entry.score = score;
                pool.put(entry);
                Verdict::Demoted(score)
            } else {
                info!("Dropping proxy {} after repeated probe failures", entry.descriptor);
                Verdict::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::proxy::{ProxyDescriptor, ProxyScheme};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProber {
        alive: HashSet<ProxyDescriptor>,
        calls: AtomicUsize,
        failures: AtomicUsize,
    }

    impl ScriptedProber {
        fn new(alive: impl IntoIterator<Item = ProxyDescriptor>) -> Self {
            Self {
                alive: alive.into_iter().collect(),
                calls: AtomicUsize::new(0),
                failures: AtomicUsize::new(0),
            }
        }

        fn dead() -> Self {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn probe(&self, proxy: &ProxyDescriptor) -> Result<(), ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.alive.contains(proxy) {
                Ok(())
            } else {
                self.failures.fetch_add(1, Ordering::SeqCst);
                Err(ProbeError::Status(502))
            }
        }
    }

    fn proxy(n: u8) -> ProxyDescriptor {
        ProxyDescriptor::new(ProxyScheme::Http, format!("192.168.0.{n}"), 3128)
    }

    fn fast_config() -> AutoProxyConfig {
        AutoProxyConfig::builder()
            .verify_interval(Duration::from_millis(5))
            .pop_timeout(Duration::from_millis(50))
            .build()
    }

    #[tokio::test]
    async fn success_resets_score() {
        let pool = ProxyPool::new();
        let prober = ScriptedProber::new([proxy(1)]);
        let verdict = verify_entry(&pool, &prober, PoolEntry::new(proxy(1), 70), 10).await;
        assert_eq!(verdict, Verdict::Promoted);
        assert_eq!(pool.snapshot(), vec![PoolEntry::new(proxy(1), 0)]);
    }

    #[tokio::test]
    async fn failure_demotes_score() {
        let pool = ProxyPool::new();
        let prober = ScriptedProber::dead();
        let verdict = verify_entry(&pool, &prober, PoolEntry::new(proxy(1), 50), 10).await;
        assert_eq!(verdict, Verdict::Demoted(60));
        assert_eq!(pool.snapshot(), vec![PoolEntry::new(proxy(1), 60)]);
    }

    #[tokio::test]
    async fn failure_at_95_drops_for_good() {
        let pool = ProxyPool::new();
        let prober = ScriptedProber::dead();
        let verdict = verify_entry(&pool, &prober, PoolEntry::new(proxy(1), 95), 10).await;
        assert_eq!(verdict, Verdict::Dropped);
        assert!(pool.is_empty());
        assert_eq!(pool.pop_random(Wait::Immediate), Err(Empty));
        assert_eq!(pool.pop_best(Wait::Immediate), Err(Empty));
    }

    #[tokio::test]
    async fn loop_scores_entries_and_evicts_dead_ones() {
        let pool = Arc::new(ProxyPool::new());
        pool.put(PoolEntry::new(proxy(1), 50));
        pool.put(PoolEntry::new(proxy(2), 50));
        let prober = Arc::new(ScriptedProber::new([proxy(1)]));

        let verifier = Verifier::new(Arc::clone(&pool), prober.clone(), &fast_config());
        verifier.start().unwrap();
        assert_eq!(verifier.state(), VerifierState::Running);

        // proxy(2) needs five failures to go from 50 to 100
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while prober.failures.load(Ordering::SeqCst) < 5 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        verifier.stop();
        verifier.stopped().await;
        assert_eq!(verifier.state(), VerifierState::Stopped);

        let snap = pool.snapshot();
        assert_eq!(snap, vec![PoolEntry::new(proxy(1), 0)]);
        assert!(prober.calls.load(Ordering::SeqCst) > 5);
    }

    #[tokio::test]
    async fn stop_is_observed_while_pool_is_empty() {
        let pool = Arc::new(ProxyPool::new());
        let prober = Arc::new(ScriptedProber::dead());
        let verifier = Verifier::new(pool, prober, &fast_config());

        assert_eq!(verifier.state(), VerifierState::Idle);
        verifier.start().unwrap();
        assert_eq!(verifier.start(), Err(VerifierError::AlreadyStarted));
        tokio::time::sleep(Duration::from_millis(20)).await;

        verifier.stop();
        tokio::time::timeout(Duration::from_secs(2), verifier.stopped())
            .await
            .expect("loop exits within the pop timeout");
        assert_eq!(verifier.state(), VerifierState::Stopped);

        // a stopped loop can be restarted
        verifier.start().unwrap();
        verifier.stop();
        verifier.stopped().await;
        assert_eq!(verifier.state(), VerifierState::Stopped);
    }

    #[test]
    fn start_outside_runtime_fails_cleanly() {
        let verifier = Verifier::new(
            Arc::new(ProxyPool::new()),
            Arc::new(ScriptedProber::dead()),
            &fast_config(),
        );
        assert_eq!(verifier.start(), Err(VerifierError::NoRuntime));
        assert_eq!(verifier.state(), VerifierState::Idle);

        // the same verifier still starts and stops once a runtime is available
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            verifier.start().unwrap();
            verifier.stop();
            verifier.stopped().await;
        });
        assert_eq!(verifier.state(), VerifierState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_start_and_stop_never_strands_the_loop() {
        let verifier = Arc::new(Verifier::new(
            Arc::new(ProxyPool::new()),
            Arc::new(ScriptedProber::dead()),
            &fast_config(),
        ));

        for _ in 0..200 {
            let starter = {
                let verifier = Arc::clone(&verifier);
                tokio::spawn(async move { verifier.start() })
            };
            let stopper = {
                let verifier = Arc::clone(&verifier);
                tokio::spawn(async move { verifier.stop() })
            };
            let _ = starter.await.unwrap();
            stopper.await.unwrap();

            // whichever order they ran in, a final stop must bring the loop down
            verifier.stop();
            tokio::time::timeout(Duration::from_secs(2), verifier.stopped())
                .await
                .expect("loop exits after stop");
            assert_ne!(verifier.state(), VerifierState::Running);
            assert_ne!(verifier.state(), VerifierState::Stopping);
        }
    }

    struct TimedProber {
        calls: Mutex<Vec<tokio::time::Instant>>,
    }

    #[async_trait]
    impl Prober for TimedProber {
        async fn probe(&self, _proxy: &ProxyDescriptor) -> Result<(), ProbeError> {
            self.calls.lock().push(tokio::time::Instant::now());
            Ok(())
        }
    }

    #[tokio::test]
    async fn cycles_are_spaced_by_the_verify_interval() {
        let interval = Duration::from_millis(100);
        let config = AutoProxyConfig::builder()
            .verify_interval(interval)
            .pop_timeout(Duration::from_millis(50))
            .build();
        let pool = Arc::new(ProxyPool::new());
        pool.put(PoolEntry::new(proxy(1), 50));
        let prober = Arc::new(TimedProber {
            calls: Mutex::new(Vec::new()),
        });

        let verifier = Verifier::new(Arc::clone(&pool), prober.clone(), &config);
        verifier.start().unwrap();
        tokio::time::sleep(Duration::from_millis(650)).await;
        verifier.stop();
        verifier.stopped().await;

        let calls = prober.calls.lock().clone();
        assert!(calls.len() >= 3, "only {} cycles ran", calls.len());
        // the entry is always available, so only pacing separates the cycles
        for pair in calls.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= interval - Duration::from_millis(5), "cycles {gap:?} apart");
        }
    }

    #[test]
    fn stop_before_start_is_a_no_op() {
        let verifier = Verifier::new(
            Arc::new(ProxyPool::new()),
            Arc::new(ScriptedProber::dead()),
            &fast_config(),
        );
        verifier.stop();
        assert_eq!(verifier.state(), VerifierState::Idle);
    }
}
