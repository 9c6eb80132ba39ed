use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use now_playing_accent::{
    poller::{PlaybackPoller, PollError, StatusSource},
    status::{PayloadError, PlaybackStatus},
};

struct Flaky {
    calls: Arc<AtomicUsize>,
}

impl StatusSource for Flaky {
    fn fetch_status(&self) -> Result<PlaybackStatus, PollError> {
        // Every other tick fails, like an endpoint that keeps dropping out.
        if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
            return Err(PayloadError::MissingItem.into());
        }
        Ok(PlaybackStatus::idle())
    }
}

#[test]
fn test_poll_keeps_fixed_rate() {
    let interval = Duration::from_millis(40);
    let calls = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let (poller, rx) = PlaybackPoller::spawn(
        Flaky {
            calls: calls.clone(),
        },
        interval,
        || {},
    );

    for _ in 0..3 {
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
    let elapsed = start.elapsed();
    poller.shutdown();

    // Successes land on ticks 0, 2 and 4.
    assert!(elapsed >= interval * 4, "ticks came too fast: {elapsed:?}");
    assert!(elapsed < interval * 4 + Duration::from_secs(3), "ticks stalled: {elapsed:?}");
    assert!(calls.load(Ordering::SeqCst) >= 5);
}
