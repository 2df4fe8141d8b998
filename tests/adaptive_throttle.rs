//! Adaptive rate limiting, end to end.

mod common;

use common::{MockSession, Scripted};
use http::StatusCode;
use scrapekit::{
    producer_fn, AdaptiveConfig, CancellationToken, Config, RateLimitConfig, Request, Scraper,
};
use std::time::Duration;

async fn run(scraper: Scraper) {
    scraper
        .run_with_shutdown(CancellationToken::new(), CancellationToken::new())
        .await
        .unwrap();
}

fn adaptive_config(default_interval: Duration) -> RateLimitConfig {
    RateLimitConfig::builder()
        .enabled(true)
        .default_interval(default_interval)
        .adaptive(
            AdaptiveConfig::builder()
                .increase_factor(2.0)
                .max_interval(Duration::from_secs(5))
                .inherit_retry_triggers(false)
                .trigger_statuses(vec![503])
                .build(),
        )
        .build()
}

#[tokio::test(flavor = "multi_thread")]
async fn interval_doubles_after_each_service_unavailable() {
    let session = MockSession::new().script(
        "https://busy.test/feed",
        vec![
            Scripted::status(StatusCode::SERVICE_UNAVAILABLE),
            Scripted::status(StatusCode::SERVICE_UNAVAILABLE),
            Scripted::ok_json(b"{}"),
            Scripted::ok_json(b"{}"),
        ],
    );

    let mut scraper: Scraper = Scraper::new();
    scraper
        .with_config(Config {
            rate_limit: adaptive_config(Duration::from_millis(200)),
            ..Config::default()
        })
        .with_session(session.clone())
        .add_producer(producer_fn(|cx| {
            Box::pin(async move {
                for _ in 0..4 {
                    cx.send(
                        Request::get("https://busy.test/feed")
                            .raise_for_status(false)
                            .build()?,
                    )
                    .await?;
                }
                Ok(())
            })
        }));

    run(scraper).await;

    let calls = session.calls_for("https://busy.test/feed");
    assert_eq!(calls.len(), 4);

    // After the first 503 the interval is 400ms, after the second 800ms;
    // the remaining successes keep it there (the streak threshold is not
    // reached).
    let gap23 = calls[2].duration_since(calls[1]);
    let gap34 = calls[3].duration_since(calls[2]);
    assert!(gap23 >= Duration::from_millis(380), "gap 2->3 was {gap23:?}");
    assert!(gap34 >= Duration::from_millis(760), "gap 3->4 was {gap34:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn retry_after_sets_the_group_interval() {
    let session = MockSession::new().script(
        "https://polite.test/",
        vec![
            Scripted::status(StatusCode::TOO_MANY_REQUESTS).with_header("retry-after", "1"),
            Scripted::ok_json(b"{}"),
        ],
    );

    let mut scraper: Scraper = Scraper::new();
    scraper
        .with_config(Config {
            rate_limit: adaptive_config(Duration::from_millis(100)),
            ..Config::default()
        })
        .with_session(session.clone())
        .add_producer(producer_fn(|cx| {
            Box::pin(async move {
                for _ in 0..2 {
                    cx.send(
                        Request::get("https://polite.test/")
                            .raise_for_status(false)
                            .build()?,
                    )
                    .await?;
                }
                Ok(())
            })
        }));

    run(scraper).await;

    let calls = session.calls_for("https://polite.test/");
    assert_eq!(calls.len(), 2);
    let gap = calls[1].duration_since(calls[0]);
    assert!(gap >= Duration::from_millis(950), "gap was {gap:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn successes_shrink_the_interval_after_a_streak() {
    let session = MockSession::new();

    let rate_limit = RateLimitConfig::builder()
        .enabled(true)
        .default_interval(Duration::from_millis(200))
        .adaptive(
            AdaptiveConfig::builder()
                .success_threshold(2)
                .decrease_step(Duration::from_millis(100))
                .min_interval(Duration::from_millis(50))
                .inherit_retry_triggers(false)
                .trigger_statuses(vec![503])
                .build(),
        )
        .build();

    let mut scraper: Scraper = Scraper::new();
    scraper
        .with_config(Config {
            rate_limit,
            ..Config::default()
        })
        .with_session(session.clone())
        .add_producer(producer_fn(|cx| {
            Box::pin(async move {
                for i in 0..5 {
                    cx.send(Request::get(format!("https://calm.test/{i}")).build()?)
                        .await?;
                }
                Ok(())
            })
        }));

    let started = std::time::Instant::now();
    run(scraper).await;

    assert_eq!(session.call_count(), 5);
    // Two success streaks shave 100ms each off the 200ms interval; the
    // whole run is faster than five full intervals.
    assert!(
        started.elapsed() < Duration::from_millis(5 * 200 + 400),
        "took {:?}",
        started.elapsed()
    );
}
