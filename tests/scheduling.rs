//! Dispatch ordering and delayed scheduling, end to end.

mod common;

use common::MockSession;
use scrapekit::{
    callback_fn, producer_fn, CancellationToken, Config, Request, Scraper, SchedulerConfig,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn single_worker_config() -> Config {
    Config {
        scheduler: SchedulerConfig::builder().concurrent_requests(1).build(),
        ..Config::default()
    }
}

async fn run(scraper: Scraper) {
    scraper
        .run_with_shutdown(CancellationToken::new(), CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn lower_priority_dispatches_first() {
    let session = MockSession::with_latency(Duration::from_millis(100));
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut scraper: Scraper = Scraper::new();
    scraper
        .with_config(single_worker_config())
        .with_session(session.clone());

    let seen = Arc::clone(&order);
    scraper.add_producer(producer_fn(move |cx| {
        let seen = Arc::clone(&seen);
        Box::pin(async move {
            // A shared short delay parks all three on the delayed heap, so
            // they reach the ready queue together and dispatch purely by
            // priority.
            for priority in [3, 1, 2] {
                let seen = Arc::clone(&seen);
                let request = Request::get(format!("https://example.com/p{priority}"))
                    .priority(priority)
                    .delay(Duration::from_millis(100))
                    .callback(callback_fn(move |request, _response, _cx| {
                        let seen = Arc::clone(&seen);
                        let url = request.url.clone();
                        Box::pin(async move {
                            seen.lock().unwrap().push(url);
                            Ok(())
                        })
                    }))
                    .build()?;
                cx.send(request).await?;
            }
            Ok(())
        })
    }));

    run(scraper).await;

    assert_eq!(
        *order.lock().unwrap(),
        vec![
            "https://example.com/p1",
            "https://example.com/p2",
            "https://example.com/p3",
        ]
    );
}

#[tokio::test]
async fn each_request_hits_the_transport_exactly_once() {
    let session = MockSession::new();

    let mut scraper: Scraper = Scraper::new();
    scraper
        .with_config(Config::default())
        .with_session(session.clone())
        .add_producer(producer_fn(|cx| {
            Box::pin(async move {
                for i in 0..10 {
                    cx.send(Request::get(format!("https://example.com/{i}")).build()?)
                        .await?;
                }
                Ok(())
            })
        }));

    run(scraper).await;

    assert_eq!(session.call_count(), 10);
    let mut urls: Vec<_> = session.calls().into_iter().map(|(u, _)| u).collect();
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), 10);
}

#[tokio::test]
async fn delayed_request_is_not_dispatched_early() {
    let session = MockSession::new();
    let submitted = Arc::new(Mutex::new(None));

    let mut scraper: Scraper = Scraper::new();
    scraper
        .with_config(Config::default())
        .with_session(session.clone());

    let mark = Arc::clone(&submitted);
    scraper.add_producer(producer_fn(move |cx| {
        let mark = Arc::clone(&mark);
        Box::pin(async move {
            *mark.lock().unwrap() = Some(Instant::now());
            cx.send(
                Request::get("https://example.com/delayed")
                    .delay(Duration::from_millis(300))
                    .build()?,
            )
            .await
        })
    }));

    run(scraper).await;

    let submitted = submitted.lock().unwrap().unwrap();
    let dispatched = session.calls_for("https://example.com/delayed");
    assert_eq!(dispatched.len(), 1);
    assert!(
        dispatched[0].duration_since(submitted) >= Duration::from_millis(300),
        "dispatched after {:?}",
        dispatched[0].duration_since(submitted)
    );
}

#[tokio::test]
async fn equal_priority_preserves_submission_order() {
    let session = MockSession::with_latency(Duration::from_millis(30));
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut scraper: Scraper = Scraper::new();
    scraper
        .with_config(single_worker_config())
        .with_session(session.clone());

    let seen = Arc::clone(&order);
    scraper.add_producer(producer_fn(move |cx| {
        let seen = Arc::clone(&seen);
        Box::pin(async move {
            for i in 0..4 {
                let seen = Arc::clone(&seen);
                let request = Request::get(format!("https://example.com/fifo/{i}"))
                    .callback(callback_fn(move |request, _response, _cx| {
                        let seen = Arc::clone(&seen);
                        let url = request.url.clone();
                        Box::pin(async move {
                            seen.lock().unwrap().push(url);
                            Ok(())
                        })
                    }))
                    .build()?;
                cx.send(request).await?;
            }
            Ok(())
        })
    }));

    run(scraper).await;

    assert_eq!(
        *order.lock().unwrap(),
        (0..4)
            .map(|i| format!("https://example.com/fifo/{i}"))
            .collect::<Vec<_>>()
    );
}
