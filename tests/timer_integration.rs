//! End-to-end timer tests: scheduling into a live pool via the app context.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use taskpool::{AppContext, DrainMode, Executor, ExecutorConfig, Timer};

#[test]
fn test_context_wires_timer_to_pool() {
    let ctx = AppContext::with_config(2, ExecutorConfig::default());
    let fired = Arc::new(AtomicUsize::new(0));

    let timer = ctx.timer().unwrap();
    for _ in 0..5 {
        let fired = Arc::clone(&fired);
        timer.schedule(Duration::from_millis(20), move || {
            fired.fetch_add(1, Ordering::Relaxed);
        });
    }
    assert_eq!(timer.pending(), 5);

    thread::sleep(Duration::from_millis(250));
    assert_eq!(fired.load(Ordering::Relaxed), 5);
    assert_eq!(timer.pending(), 0);
    ctx.shutdown().unwrap();
}

#[test]
fn test_repeating_callback_mixes_with_direct_submissions() {
    let pool = Arc::new(Executor::new(4).unwrap());
    let timer = Timer::new(Arc::clone(&pool)).unwrap();

    let ticks = Arc::new(AtomicUsize::new(0));
    let direct = Arc::new(AtomicUsize::new(0));

    let t = Arc::clone(&ticks);
    let id = timer.schedule_repeating(Duration::from_millis(10), Duration::from_millis(15), move || {
        t.fetch_add(1, Ordering::Relaxed);
    });

    for _ in 0..100 {
        let direct = Arc::clone(&direct);
        pool.spawn(move || {
            direct.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
    }

    thread::sleep(Duration::from_millis(200));
    timer.cancel(id);
    pool.wait(DrainMode::Block).unwrap();

    assert_eq!(direct.load(Ordering::Relaxed), 100);
    assert!(
        ticks.load(Ordering::Relaxed) >= 3,
        "repeating entry should have ticked several times, got {}",
        ticks.load(Ordering::Relaxed)
    );

    timer.stop();
    pool.join().unwrap();
}

#[test]
fn test_shutdown_stops_future_entries() {
    let ctx = AppContext::with_config(2, ExecutorConfig::default());
    let fired = Arc::new(AtomicUsize::new(0));

    {
        let fired = Arc::clone(&fired);
        ctx.timer().unwrap().schedule(Duration::from_secs(300), move || {
            fired.fetch_add(1, Ordering::Relaxed);
        });
    }

    let begin = Instant::now();
    ctx.shutdown().unwrap();
    assert!(
        begin.elapsed() < Duration::from_secs(2),
        "shutdown must not wait for undue entries"
    );
    assert_eq!(fired.load(Ordering::Relaxed), 0);
}

#[test]
fn test_callback_failure_surfaces_through_pool() {
    let pool = Arc::new(Executor::new(2).unwrap());
    let timer = Timer::new(Arc::clone(&pool)).unwrap();

    timer.schedule(Duration::from_millis(10), || panic!("tick handler broke"));
    thread::sleep(Duration::from_millis(150));

    let err = pool.wait(DrainMode::Reject).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("tick handler broke"), "got: {}", message);

    timer.stop();
    pool.join().unwrap();
}
