mod common;

use common::{config_builder, due_event, scan_only, ScriptedGateway};
use starkloop_keeper::core::dispatcher::TickProgress;
use starkloop_keeper::core::scheduler::run_tick;
use starkloop_keeper::{
    AttemptOutcome, BlockWindow, DispatchStage, DueSource, EventScanSource, KeeperContext,
    KeeperError, ObligationId, TaskIntervals,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn context(gateway: &Arc<ScriptedGateway>, suppress_replays: bool) -> KeeperContext {
    let config = config_builder(TaskIntervals::default())
        .suppress_replays(suppress_replays)
        .with_page_size(2)
        .build()
        .unwrap();
    KeeperContext::new(gateway.clone(), config).unwrap()
}

#[tokio::test]
async fn test_due_event_in_window_is_paid() {
    let gateway = Arc::new(ScriptedGateway::new(1000));
    gateway.push_event(due_event(42, 1_700_000_000, 999, 0xa1));

    let ctx = KeeperContext::new(gateway.clone(), scan_only()).unwrap();
    let mut source = EventScanSource::new(&ctx).unwrap();
    let (summary, attempts) = run_tick(&mut source, &ctx.dispatcher(), &TickProgress::new())
        .await
        .unwrap();

    assert_eq!(
        source.last_window(),
        Some(BlockWindow {
            from_block: 998,
            to_block: 1000
        })
    );
    assert_eq!(summary.signals, 1);
    assert_eq!(summary.confirmed, 1);
    assert_eq!(attempts[0].obligation_id, ObligationId::from(42u64));
    assert_eq!(gateway.paid_ids(), vec![42]);
}

#[tokio::test]
async fn test_record_outside_window_is_ignored() {
    let gateway = Arc::new(ScriptedGateway::new(1000));
    gateway.push_event(due_event(5, 1, 990, 0xb1));

    let ctx = context(&gateway, false);
    let mut source = EventScanSource::new(&ctx).unwrap();
    let signals = source.next_batch().await.unwrap();

    assert!(signals.is_empty());
    assert!(gateway.paid_ids().is_empty());
}

#[tokio::test]
async fn test_all_pages_are_followed() {
    let gateway = Arc::new(ScriptedGateway::new(50));
    for id in 1..=5 {
        gateway.push_event(due_event(id, 1, 49, 0x10 + id));
    }

    // Page size 2 over five records: three requests.
    let ctx = context(&gateway, false);
    let mut source = EventScanSource::new(&ctx).unwrap();
    let signals = source.next_batch().await.unwrap();

    let ids: Vec<_> = signals.iter().map(|s| s.obligation_id).collect();
    assert_eq!(
        ids,
        (1..=5u64).map(ObligationId::from).collect::<Vec<_>>()
    );
    assert_eq!(gateway.event_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_pagination_overflow_fails_tick() {
    let gateway = Arc::new(ScriptedGateway::new(50));
    for id in 1..=5 {
        gateway.push_event(due_event(id, 1, 49, 0x10 + id));
    }

    let config = config_builder(TaskIntervals::default())
        .with_page_size(1)
        .with_max_pages(2)
        .build()
        .unwrap();
    let ctx = KeeperContext::new(gateway.clone(), config).unwrap();
    let mut source = EventScanSource::new(&ctx).unwrap();

    let result = run_tick(&mut source, &ctx.dispatcher(), &TickProgress::new()).await;
    assert!(matches!(
        result,
        Err(KeeperError::PaginationOverflow { pages: 2 })
    ));
    assert!(gateway.paid_ids().is_empty());
}

#[tokio::test]
async fn test_overlapping_windows_dispatch_twice_by_default() {
    let gateway = Arc::new(ScriptedGateway::new(102));
    gateway.push_event(due_event(8, 1, 101, 0xc1));

    let ctx = context(&gateway, false);
    let dispatcher = ctx.dispatcher();
    let mut source = EventScanSource::new(&ctx).unwrap();

    run_tick(&mut source, &dispatcher, &TickProgress::new())
        .await
        .unwrap();
    gateway.set_head(103);
    run_tick(&mut source, &dispatcher, &TickProgress::new())
        .await
        .unwrap();

    assert_eq!(gateway.paid_ids(), vec![8, 8]);
}

#[tokio::test]
async fn test_replay_suppression_dispatches_once() {
    let gateway = Arc::new(ScriptedGateway::new(102));
    gateway.push_event(due_event(8, 1, 101, 0xc1));

    let ctx = context(&gateway, true);
    let dispatcher = ctx.dispatcher();
    let mut source = EventScanSource::new(&ctx).unwrap();

    run_tick(&mut source, &dispatcher, &TickProgress::new())
        .await
        .unwrap();
    gateway.set_head(103);
    let (summary, _) = run_tick(&mut source, &dispatcher, &TickProgress::new())
        .await
        .unwrap();

    assert_eq!(summary.signals, 0);
    assert_eq!(summary.skipped, 1);
    assert_eq!(gateway.paid_ids(), vec![8]);
}

#[tokio::test]
async fn test_replay_suppression_retries_unsubmitted() {
    let gateway = Arc::new(ScriptedGateway::new(102));
    gateway.push_event(due_event(8, 1, 101, 0xc1));
    gateway.fail_estimate_for(8);

    let ctx = context(&gateway, true);
    let dispatcher = ctx.dispatcher();
    let mut source = EventScanSource::new(&ctx).unwrap();

    run_tick(&mut source, &dispatcher, &TickProgress::new())
        .await
        .unwrap();
    gateway.set_head(103);
    let (summary, _) = run_tick(&mut source, &dispatcher, &TickProgress::new())
        .await
        .unwrap();

    // Nothing was submitted, so the second window sees the record again.
    assert_eq!(summary.signals, 1);
    assert_eq!(gateway.estimate_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_estimate_failure_isolated_and_next_tick_runs() {
    let gateway = Arc::new(ScriptedGateway::new(20));
    gateway.push_event(due_event(3, 1, 19, 0xd1));
    gateway.push_event(due_event(7, 1, 19, 0xd2));
    gateway.push_event(due_event(9, 1, 20, 0xd3));
    gateway.fail_estimate_for(7);

    let ctx = context(&gateway, false);
    let dispatcher = ctx.dispatcher();
    let mut source = EventScanSource::new(&ctx).unwrap();

    let (summary, attempts) = run_tick(&mut source, &dispatcher, &TickProgress::new())
        .await
        .unwrap();
    assert_eq!(summary.confirmed, 2);
    assert_eq!(summary.failed, 1);
    assert!(matches!(
        attempts[1].outcome,
        AttemptOutcome::Failed {
            stage: DispatchStage::Estimate,
            ..
        }
    ));
    assert_eq!(gateway.paid_ids(), vec![3, 9]);

    // The following tick proceeds normally.
    gateway.set_head(21);
    run_tick(&mut source, &dispatcher, &TickProgress::new())
        .await
        .unwrap();
    assert_eq!(gateway.head_calls.load(Ordering::SeqCst), 2);
    assert_eq!(gateway.paid_ids(), vec![3, 9, 3, 9]);
}

#[tokio::test]
async fn test_foreign_selector_is_skipped() {
    let gateway = Arc::new(ScriptedGateway::new(10));
    let mut foreign = due_event(1, 1, 10, 0xe1);
    foreign.keys = vec![starknet::core::types::Felt::from(0xdead_u64)];
    gateway.push_event(foreign);
    gateway.push_event(due_event(2, 1, 10, 0xe2));

    let ctx = context(&gateway, false);
    let mut source = EventScanSource::new(&ctx).unwrap();
    let signals = source.next_batch().await.unwrap();

    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].obligation_id, ObligationId::from(2u64));
}
