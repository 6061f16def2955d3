//! Tests for the periodic query cacher.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;

fn fixed(tick: Duration) -> QueryCacherConfig {
    QueryCacherConfig::default()
        .with_tick_period(tick)
        .with_jitter(Duration::ZERO)
}

/// Cacher whose query returns how many times it has run.
fn counting(config: QueryCacherConfig) -> (QueryCacher<u32>, Arc<AtomicU32>) {
    let runs = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&runs);
    let cacher = QueryCacher::new("counting", config, move || {
        let counter = Arc::clone(&counter);
        async move { Ok::<_, BoxError>(counter.fetch_add(1, Ordering::SeqCst) + 1) }
    });
    (cacher, runs)
}

#[fixture]
fn ten_second_cacher() -> (QueryCacher<u32>, Arc<AtomicU32>) {
    counting(fixed(Duration::from_secs(10)))
}

#[rstest]
#[tokio::test]
async fn nothing_is_cached_before_the_first_run(ten_second_cacher: (QueryCacher<u32>, Arc<AtomicU32>)) {
    let (cacher, runs) = ten_second_cacher;
    assert_eq!(cacher.cached_res(), None);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(cacher.state(), CacherState::Unstarted);
}

#[rstest]
#[tokio::test]
async fn cached_value_tracks_the_latest_run(ten_second_cacher: (QueryCacher<u32>, Arc<AtomicU32>)) {
    let (cacher, _) = ten_second_cacher;
    for expected in 1..=3 {
        assert_eq!(cacher.run_query().await.expect("query runs"), expected);
        assert_eq!(cacher.cached_res(), Some(expected));
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_readers_never_see_the_value_go_backwards() {
    const RUNS: u32 = 200;
    let (cacher, _) = counting(fixed(Duration::from_secs(10)));
    let cacher = Arc::new(cacher);
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cacher = Arc::clone(&cacher);
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while !done.load(Ordering::SeqCst) {
                    if let Some(value) = cacher.cached_res() {
                        seen.push(value);
                    }
                    tokio::task::yield_now().await;
                }
                seen
            })
        })
        .collect();

    for _ in 0..RUNS {
        cacher.run_query().await.expect("query runs");
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        let seen = reader.await.expect("reader task");
        assert!(
            seen.windows(2).all(|pair| pair[0] <= pair[1]),
            "reader observed a stale value after a newer one"
        );
        assert!(seen.iter().all(|value| (1..=RUNS).contains(value)));
    }
    assert_eq!(cacher.cached_res(), Some(RUNS));
}

#[rstest]
#[tokio::test]
async fn failed_run_keeps_previous_value() {
    let runs = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&runs);
    let cacher = QueryCacher::new("flaky", fixed(Duration::from_secs(10)), move || {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt == 1 {
                Err::<u32, BoxError>("database went away".into())
            } else {
                Ok(attempt)
            }
        }
    });
    cacher.run_query().await.expect("first run");
    let err = cacher.run_query().await.expect_err("second run fails");
    assert!(matches!(err, QueryCacheError::Query { .. }));
    assert_eq!(cacher.cached_res(), Some(0));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn slow_query_times_out() {
    let config = fixed(Duration::from_secs(10)).with_run_timeout(Duration::from_secs(30));
    let cacher = QueryCacher::new("slow", config, || async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok::<_, BoxError>(1_u8)
    });
    let err = cacher.run_query().await.expect_err("run times out");
    assert!(matches!(err, QueryCacheError::Timeout { after, .. } if after == Duration::from_secs(30)));
    assert_eq!(cacher.cached_res(), None);
}

#[rstest]
fn tick_period_stays_within_jitter_bounds() {
    let config = QueryCacherConfig::default();
    for _ in 0..50 {
        let (cacher, _) = counting(config);
        let tick = cacher.tick_period();
        assert!(tick >= Duration::from_secs(9), "{tick:?} below bound");
        assert!(tick <= Duration::from_secs(11), "{tick:?} above bound");
    }
}

#[rstest]
fn identically_configured_instances_jitter_apart() {
    let config = QueryCacherConfig::default();
    let (first, _) = counting(config);
    let (second, _) = counting(config);
    assert_ne!(first.tick_period(), second.tick_period());
}

#[rstest]
fn zero_jitter_uses_the_base_period() {
    let (cacher, _) = counting(fixed(Duration::from_secs(10)));
    assert_eq!(cacher.tick_period(), Duration::from_secs(10));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn loop_refreshes_on_each_tick(ten_second_cacher: (QueryCacher<u32>, Arc<AtomicU32>)) {
    let (cacher, runs) = ten_second_cacher;
    cacher.start(std::future::pending()).expect("start");
    assert_eq!(cacher.state(), CacherState::Running);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(cacher.cached_res(), None);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(cacher.cached_res(), Some(2));

    cacher.stop().await;
    assert_eq!(cacher.state(), CacherState::Stopped);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn second_start_is_a_no_op(ten_second_cacher: (QueryCacher<u32>, Arc<AtomicU32>)) {
    let (cacher, runs) = ten_second_cacher;
    cacher.start(std::future::pending()).expect("first start");
    cacher.start(std::future::pending()).expect("second start");

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    cacher.stop().await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn refresh_errors_do_not_stop_the_loop() {
    let runs = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&runs);
    let cacher = QueryCacher::new("recovering", fixed(Duration::from_secs(10)), move || {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt == 0 {
                Err::<u32, BoxError>("relation does not exist".into())
            } else {
                Ok(attempt)
            }
        }
    });
    cacher.start(std::future::pending()).expect("start");

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(cacher.cached_res(), None);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(cacher.cached_res(), Some(1));
    cacher.stop().await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn shutdown_future_ends_the_loop(ten_second_cacher: (QueryCacher<u32>, Arc<AtomicU32>)) {
    let (cacher, runs) = ten_second_cacher;
    let (cancel, cancelled) = tokio::sync::oneshot::channel::<()>();
    cacher
        .start(async move {
            let _ = cancelled.await;
        })
        .expect("start");

    let _ = cancel.send(());
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(cacher.state(), CacherState::Stopped);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn stop_after_shutdown_is_safe(ten_second_cacher: (QueryCacher<u32>, Arc<AtomicU32>)) {
    let (cacher, _) = ten_second_cacher;
    cacher.start(std::future::ready(())).expect("start");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(cacher.state(), CacherState::Stopped);

    cacher.stop().await;
    assert_eq!(cacher.state(), CacherState::Stopped);
}

#[rstest]
#[tokio::test]
async fn stop_without_start_is_safe(ten_second_cacher: (QueryCacher<u32>, Arc<AtomicU32>)) {
    let (cacher, _) = ten_second_cacher;
    cacher.stop().await;
    assert_eq!(cacher.state(), CacherState::Unstarted);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn stopped_cacher_can_restart(ten_second_cacher: (QueryCacher<u32>, Arc<AtomicU32>)) {
    let (cacher, runs) = ten_second_cacher;
    cacher.start(std::future::pending()).expect("start");
    cacher.stop().await;
    cacher.start(std::future::pending()).expect("restart");
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    cacher.stop().await;
}

#[rstest]
fn start_outside_a_runtime_fails(ten_second_cacher: (QueryCacher<u32>, Arc<AtomicU32>)) {
    let (cacher, _) = ten_second_cacher;
    let err = cacher
        .start(std::future::pending())
        .expect_err("no runtime");
    assert!(matches!(err, QueryCacheError::NoRuntime));
    assert_eq!(cacher.state(), CacherState::Unstarted);
}
