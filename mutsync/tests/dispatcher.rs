mod common;

use common::{http, timeout, MockTransport};
use mutsync::{Dispatcher, MutationError, MutationOptions, OfflineQueue};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

const ENDPOINT: &str = "https://api.example.com/bookings/confirm";

fn dispatcher(transport: Arc<MockTransport>, queue: Arc<OfflineQueue>) -> Dispatcher {
    Dispatcher::builder(ENDPOINT, transport).queue(queue).build()
}

#[tokio::test(start_paused = true)]
async fn recovers_after_two_server_errors() {
    let transport = Arc::new(MockTransport::scripted(vec![
        Err(http(500)),
        Err(http(502)),
        Ok(json!({"booking": "confirmed"})),
    ]));
    let queue = Arc::new(OfflineQueue::in_memory());
    let retries = Arc::new(Mutex::new(vec![]));
    let seen = retries.clone();
    let succeeded = Arc::new(AtomicU32::new(0));
    let s = succeeded.clone();
    let d = Dispatcher::builder(ENDPOINT, transport.clone())
        .queue(queue.clone())
        .on_retry(move |attempt, err| seen.lock().unwrap().push((attempt, err.status())))
        .on_success(move |data, vars| {
            assert_eq!(data["booking"], "confirmed");
            assert_eq!(vars["id"], "b_1");
            s.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    let out = d.mutate(json!({"id": "b_1"})).await.unwrap();
    assert_eq!(out["booking"], "confirmed");

    let state = d.state();
    assert!(state.is_success() && !state.is_error() && !state.is_pending());
    assert_eq!(state.progress().attempt, 2);
    assert_eq!(state.progress().max_retries, 3);
    assert_eq!(state.data(), Some(&out));
    assert_eq!(*retries.lock().unwrap(), vec![(1, Some(500)), (2, Some(502))]);
    assert_eq!(succeeded.load(Ordering::SeqCst), 1);
    assert!(queue.is_empty());

    let calls = transport.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| c.key == d.idempotency_key().as_str()));
    assert!(calls.iter().all(|c| c.body == json!({"id": "b_1"})));
}

#[tokio::test(start_paused = true)]
async fn client_error_is_terminal_and_not_queued() {
    let transport = Arc::new(MockTransport::always(Err(http(400))));
    let queue = Arc::new(OfflineQueue::in_memory());
    let errors = Arc::new(Mutex::new(vec![]));
    let seen = errors.clone();
    let d = Dispatcher::builder(ENDPOINT, transport.clone())
        .queue(queue.clone())
        .on_error(move |err, vars| seen.lock().unwrap().push((err.clone(), vars.clone())))
        .build();

    let err = d.mutate(json!({"id": "b_2"})).await.unwrap_err();
    assert_eq!(err, http(400));
    assert_eq!(transport.calls().len(), 1);
    assert!(queue.is_empty());

    let state = d.state();
    assert!(state.is_error() && !state.is_success());
    assert_eq!(state.error(), Some(&http(400)));
    assert_eq!(state.progress().attempt, 0);
    assert_eq!(*errors.lock().unwrap(), vec![(http(400), json!({"id": "b_2"}))]);
}

#[tokio::test(start_paused = true)]
async fn exhausted_timeouts_land_in_the_offline_queue() {
    let transport = Arc::new(MockTransport::always(Err(timeout())));
    let queue = Arc::new(OfflineQueue::in_memory());
    let d = dispatcher(transport.clone(), queue.clone());

    let err = d.mutate(json!({"to": "+15550100", "body": "See you at 3"})).await.unwrap_err();
    assert!(matches!(err, MutationError::Timeout(_)));
    assert_eq!(transport.calls().len(), 4);
    assert_eq!(d.state().progress().attempt, 3);

    let items = queue.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].endpoint, ENDPOINT);
    assert_eq!(items[0].variables, json!({"to": "+15550100", "body": "See you at 3"}));
    assert_eq!(&items[0].idempotency_key, d.idempotency_key());
}

#[tokio::test(start_paused = true)]
async fn disabled_queue_keeps_nothing() {
    let transport = Arc::new(MockTransport::always(Err(MutationError::Network("unreachable".into()))));
    let queue = Arc::new(OfflineQueue::in_memory());
    let d = Dispatcher::builder(ENDPOINT, transport)
        .options(MutationOptions {
            max_retries: 1,
            offline_queue_enabled: false,
            ..MutationOptions::default()
        })
        .queue(queue.clone())
        .build();

    assert!(d.mutate(json!({})).await.is_err());
    assert!(queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn should_retry_override_limits_attempts() {
    let transport = Arc::new(MockTransport::always(Err(http(503))));
    let d = Dispatcher::builder(ENDPOINT, transport.clone())
        .should_retry(|err, attempt| err.status() == Some(503) && attempt < 1)
        .build();

    let err = d.mutate(json!({})).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(transport.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn key_is_per_dispatcher_not_per_call() {
    let transport = Arc::new(MockTransport::always(Ok(json!({"ok": true}))));
    let a = Dispatcher::builder(ENDPOINT, transport.clone()).build();
    let b = Dispatcher::builder(ENDPOINT, transport.clone()).build();
    a.mutate(json!({"n": 1})).await.unwrap();
    a.mutate(json!({"n": 2})).await.unwrap();
    b.mutate(json!({"n": 3})).await.unwrap();

    let keys: Vec<_> = transport.calls().into_iter().map(|c| c.key).collect();
    assert_eq!(keys[0], keys[1]);
    assert_ne!(keys[1], keys[2]);
}

#[tokio::test(start_paused = true)]
async fn next_call_resets_state_to_pending_then_error() {
    let transport = Arc::new(MockTransport::scripted(vec![Ok(json!(1)), Err(http(404))]));
    let d = Dispatcher::builder(ENDPOINT, transport).build();
    let mut rx = d.subscribe();

    d.mutate(json!({})).await.unwrap();
    assert!(rx.borrow_and_update().is_success());

    assert!(d.mutate(json!({})).await.is_err());
    let state = rx.borrow_and_update().clone();
    assert!(state.is_error() && !state.is_success());
    assert!(state.data().is_none());

    d.reset();
    assert!(d.state().is_idle());
}

#[tokio::test(start_paused = true)]
async fn budget_aware_override_still_queues_exhausted_call() {
    let transport = Arc::new(MockTransport::always(Err(timeout())));
    let queue = Arc::new(OfflineQueue::in_memory());
    let d = Dispatcher::builder(ENDPOINT, transport.clone())
        .queue(queue.clone())
        .should_retry(|err, attempt| err.is_retryable() && attempt < 3)
        .build();

    let err = d.mutate(json!({"lead": 7, "status": "won"})).await.unwrap_err();
    assert!(matches!(err, MutationError::Timeout(_)));
    assert_eq!(transport.calls().len(), 4);

    let items = queue.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].variables, json!({"lead": 7, "status": "won"}));
    assert_eq!(&items[0].idempotency_key, d.idempotency_key());
}

#[tokio::test(start_paused = true)]
async fn override_refusal_with_budget_left_is_not_queued() {
    let transport = Arc::new(MockTransport::always(Err(http(503))));
    let queue = Arc::new(OfflineQueue::in_memory());
    let d = Dispatcher::builder(ENDPOINT, transport.clone())
        .queue(queue.clone())
        .should_retry(|_, _| false)
        .build();

    assert!(d.mutate(json!({})).await.is_err());
    assert_eq!(transport.calls().len(), 1);
    assert!(queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn dispatcher_without_a_queue_reports_it_and_still_fails_cleanly() {
    let transport = Arc::new(MockTransport::always(Err(timeout())));
    let bare = Dispatcher::builder(ENDPOINT, transport.clone()).build();
    assert!(!bare.queues_failures());
    assert!(matches!(bare.mutate(json!({})).await, Err(MutationError::Timeout(_))));
    assert!(bare.state().is_error());

    let queued = dispatcher(transport.clone(), Arc::new(OfflineQueue::in_memory()));
    assert!(queued.queues_failures());

    let disabled = Dispatcher::builder(ENDPOINT, transport)
        .options(MutationOptions { offline_queue_enabled: false, ..MutationOptions::default() })
        .queue(Arc::new(OfflineQueue::in_memory()))
        .build();
    assert!(!disabled.queues_failures());
}
