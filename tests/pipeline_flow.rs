//! Callback-to-pipeline flow, end to end.

mod common;

use common::MockSession;
use scrapekit::{
    callback_fn, pipeline_fn, producer_fn, CancellationToken, Config, Item, PipelineDispatcher,
    Request, ScrapeError, Scraper,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
struct Listing {
    url: String,
}

impl Item for Listing {
    fn pipeline_name(&self) -> &str {
        "listings"
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn callbacks_feed_items_into_pipelines() {
    let session = MockSession::new();
    let stored = Arc::new(Mutex::new(Vec::new()));

    let mut scraper: Scraper<Listing> = Scraper::new();
    scraper
        .with_config(Config::default())
        .with_session(session.clone());

    let sink = Arc::clone(&stored);
    scraper.add_pipeline(
        "listings",
        pipeline_fn(move |item: Listing| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                sink.lock().unwrap().push(item.url.clone());
                Ok(item)
            })
        }),
    );

    scraper.add_producer(producer_fn(|cx| {
        Box::pin(async move {
            for i in 0..3 {
                let request = Request::get(format!("https://shop.test/item/{i}"))
                    .callback(callback_fn(|request, _response, cx| {
                        let url = request.url.clone();
                        let dispatcher = cx
                            .dep::<Arc<PipelineDispatcher<Listing>>>()
                            .cloned();
                        Box::pin(async move {
                            let dispatcher = dispatcher.ok_or_else(|| {
                                ScrapeError::Pipeline("dispatcher not registered".into())
                            })?;
                            dispatcher.put(Listing { url }).await?;
                            Ok(())
                        })
                    }))
                    .build()?;
                cx.send(request).await?;
            }
            Ok(())
        })
    }));

    scraper
        .run_with_shutdown(CancellationToken::new(), CancellationToken::new())
        .await
        .unwrap();

    let mut stored = stored.lock().unwrap().clone();
    stored.sort();
    assert_eq!(
        stored,
        vec![
            "https://shop.test/item/0",
            "https://shop.test/item/1",
            "https://shop.test/item/2",
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn pipelines_are_closed_after_the_run() {
    use async_trait::async_trait;
    use scrapekit::Pipeline;

    struct CountingPipeline {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Pipeline<Listing> for CountingPipeline {
        async fn put(&self, item: Listing) -> Result<Listing, ScrapeError> {
            Ok(item)
        }

        async fn close(&self) -> Result<(), ScrapeError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let closes = Arc::new(AtomicUsize::new(0));
    let session = MockSession::new();

    let mut scraper: Scraper<Listing> = Scraper::new();
    scraper
        .with_config(Config::default())
        .with_session(session)
        .add_pipeline(
            "listings",
            Arc::new(CountingPipeline {
                closes: Arc::clone(&closes),
            }),
        )
        .add_producer(producer_fn(|_cx| Box::pin(async move { Ok(()) })));

    scraper
        .run_with_shutdown(CancellationToken::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(closes.load(Ordering::SeqCst), 1);
}
