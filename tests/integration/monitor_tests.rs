use super::*;
use price_sentinel::broadcaster::ChannelObserver;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_timeout_mid_batch_still_completes() -> anyhow::Result<()> {
    let launcher = ScriptedLauncher::new(vec![
        (url_for("a"), Page::Price(ExtractionResult::regular(dec!(100)))),
        (url_for("b"), Page::Timeout),
        (url_for("c"), Page::Price(ExtractionResult::regular(dec!(45)))),
    ]);
    let stats = Arc::clone(&launcher.stats);
    let monitor = PriceMonitor::new(Arc::new(launcher), no_delay());
    let sink = RecordingSink::default();
    let products = vec![product("a", dec!(100)), product("b", dec!(20)), product("c", dec!(50))];

    let outcome = monitor.run(&products, "batch-1", &sink).await?;

    assert_eq!(outcome.updated_products.len(), 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(sink.progress_counts(), vec![0, 1, 2, 3]);
    assert_eq!(sink.kinds().last(), Some(&"complete"));
    assert_eq!(stats.launches.load(Ordering::SeqCst), 1);
    assert_eq!(stats.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(stats.visits.lock().unwrap().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_missing_price_node_yields_no_record() -> anyhow::Result<()> {
    let launcher = ScriptedLauncher::new(vec![
        (url_for("a"), Page::MissingPrice),
        (url_for("b"), Page::Price(ExtractionResult::regular(dec!(10)))),
    ]);
    let monitor = PriceMonitor::new(Arc::new(launcher), no_delay());
    let products = vec![product("a", dec!(100)), product("b", dec!(10))];

    let outcome = monitor.run(&products, "batch-2", &RecordingSink::default()).await?;

    assert_eq!(outcome.updated_products.len(), 1);
    assert_eq!(outcome.updated_products[0].id, "b");
    assert!(outcome.price_changes.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_change_records_match_readings() -> anyhow::Result<()> {
    let launcher = ScriptedLauncher::new(vec![
        (url_for("a"), Page::Price(ExtractionResult::regular(dec!(120.00)))),
        (url_for("b"), Page::Price(ExtractionResult::offer(dec!(90.00), Some(dec!(100.00))))),
    ]);
    let monitor = PriceMonitor::new(Arc::new(launcher), no_delay());
    let products = vec![product("a", dec!(100.00)), product("b", dec!(100.00))];

    let outcome = monitor.run(&products, "batch-3", &RecordingSink::default()).await?;

    let increase = &outcome.price_changes[0];
    assert_eq!(increase.old_price, dec!(100.00));
    assert_eq!(increase.new_price, dec!(120.00));
    assert_eq!(increase.difference, dec!(20.00));
    assert_eq!(increase.percentage_change.as_deref(), Some("20.00"));

    let offer = &outcome.price_changes[1];
    assert!(offer.is_on_offer);
    assert_eq!(offer.original_price, Some(dec!(100.00)));
    assert_eq!(offer.percentage_change.as_deref(), Some("-10.00"));

    let updated = &outcome.updated_products[1];
    assert_eq!(updated.new_price, Some(dec!(90.00)));
    assert!(updated.is_on_offer);
    assert!(updated.last_checked.is_some());
    Ok(())
}

#[tokio::test]
async fn test_launch_failure_records_error_without_completion() {
    let service = service_with(PriceMonitor::new(Arc::new(ScriptedLauncher::failing()), no_delay()));

    let result = service.run_session(&[product("a", dec!(1))], "batch-4").await;

    assert!(matches!(result, Err(AppError::EngineLaunch(_))));
    let status = service.store().get("batch-4").await;
    assert!(status.error.is_some());
    assert!(status.complete.is_none());
    assert!(status.progress.is_none());
}

#[tokio::test]
async fn test_notifier_gets_full_change_list_once() -> anyhow::Result<()> {
    let launcher = ScriptedLauncher::new(vec![
        (url_for("a"), Page::Price(ExtractionResult::regular(dec!(11)))),
        (url_for("b"), Page::Price(ExtractionResult::regular(dec!(22)))),
    ]);
    let notifier = Arc::new(RecordingNotifier {
        fail: true,
        ..Default::default()
    });
    let monitor = PriceMonitor::new(Arc::new(launcher), no_delay()).with_notifier(notifier.clone());
    let products = vec![product("a", dec!(10)), product("b", dec!(20))];

    let outcome = monitor.run(&products, "batch-5", &RecordingSink::default()).await?;

    assert_eq!(outcome.price_changes.len(), 2);
    let calls = notifier.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_catalog_write_back_is_best_effort() -> anyhow::Result<()> {
    let launcher = ScriptedLauncher::new(vec![
        (url_for("a"), Page::Price(ExtractionResult::regular(dec!(12)))),
        (url_for("b"), Page::Price(ExtractionResult::regular(dec!(20)))),
        (url_for("c"), Page::Price(ExtractionResult::regular(dec!(33)))),
    ]);
    let catalog = Arc::new(RecordingCatalog {
        reject_ids: vec!["a".to_string()],
        ..Default::default()
    });
    let monitor = PriceMonitor::new(Arc::new(launcher), no_delay()).with_catalog(catalog.clone());
    let mut c = product("c", dec!(30));
    c.price_history = vec![price_sentinel::models::PriceHistoryEntry {
        price: dec!(30),
        timestamp: chrono::Utc::now() - chrono::Duration::days(1),
    }];
    let products = vec![product("a", dec!(10)), product("b", dec!(20)), c];

    let outcome = monitor.run(&products, "batch-6", &RecordingSink::default()).await?;

    assert_eq!(outcome.updated_products.len(), 3);
    let updates = catalog.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].id, "c");
    assert_eq!(updates[0].current_price, dec!(33));
    assert_eq!(updates[0].price_history.len(), 2);
    assert!(updates[0].price_history[0].timestamp <= updates[0].price_history[1].timestamp);
    Ok(())
}

#[tokio::test]
async fn test_session_store_and_observers_follow_the_run() -> anyhow::Result<()> {
    let launcher = ScriptedLauncher::new(vec![
        (url_for("a"), Page::Price(ExtractionResult::regular(dec!(15)))),
        (url_for("b"), Page::Timeout),
    ]);
    let service = service_with(PriceMonitor::new(Arc::new(launcher), no_delay()));
    let (observer, mut rx) = ChannelObserver::pair();
    service.broadcaster().register(Arc::new(observer)).await;

    service
        .run_session(&[product("a", dec!(10)), product("b", dec!(5))], "batch-7")
        .await?;

    let status = service.store().get("batch-7").await;
    let progress = status.progress.expect("progress recorded");
    assert_eq!((progress.completed, progress.total), (2, 2));
    assert_eq!(status.price_changes.map(|c| c.len()), Some(1));
    let complete = status.complete.expect("completion recorded");
    assert_eq!((complete.total, complete.updated), (2, 1));

    let mut kinds = Vec::new();
    while let Ok(message) = rx.try_recv() {
        let value: serde_json::Value = serde_json::from_str(&message)?;
        assert_eq!(value["sessionId"], "batch-7");
        kinds.push(value["type"].as_str().unwrap_or_default().to_string());
    }
    assert_eq!(
        kinds,
        vec!["progress", "priceChange", "progress", "progress", "complete"]
    );
    Ok(())
}

#[tokio::test]
async fn test_tiny_old_price_does_not_abort_batch() -> anyhow::Result<()> {
    let launcher = ScriptedLauncher::new(vec![
        (url_for("a"), Page::Price(ExtractionResult::regular(dec!(10_000_000_000)))),
        (url_for("b"), Page::Price(ExtractionResult::regular(dec!(12)))),
    ]);
    let monitor = PriceMonitor::new(Arc::new(launcher), no_delay());
    let products = vec![product("a", rust_decimal::Decimal::new(1, 20)), product("b", dec!(10))];

    let outcome = monitor.run(&products, "batch-8", &RecordingSink::default()).await?;

    assert_eq!(outcome.price_changes.len(), 2);
    assert!(outcome.price_changes[0].percentage_change.is_none());
    assert_eq!(outcome.price_changes[1].percentage_change.as_deref(), Some("20.00"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_caller_does_not_cancel_pass() {
    let launcher = ScriptedLauncher::new(vec![
        (url_for("a"), Page::Price(ExtractionResult::regular(dec!(11)))),
        (url_for("b"), Page::Price(ExtractionResult::regular(dec!(20)))),
    ]);
    let stats = Arc::clone(&launcher.stats);
    let monitor = PriceMonitor::new(
        Arc::new(launcher),
        MonitorConfig {
            inter_product_delay_ms: 500,
            ..MonitorConfig::default()
        },
    );
    let service = service_with(monitor);
    let products = [product("a", dec!(10)), product("b", dec!(20))];

    // The caller gives up while the pass waits between products.
    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        service.run_session(&products, "gone"),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_secs(5)).await;

    let status = service.store().get("gone").await;
    let complete = status.complete.expect("pass ran to completion");
    assert_eq!((complete.total, complete.updated), (2, 2));
    assert_eq!(stats.shutdowns.load(Ordering::SeqCst), 1);

    tokio::time::advance(service.store().retention()).await;
    assert_eq!(service.store().purge_expired().await, 1);
    assert!(service.store().get("gone").await.is_empty());
}
