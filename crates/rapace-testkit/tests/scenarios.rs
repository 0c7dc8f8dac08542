//! The six literal end-to-end scenarios from the runtime spec's testable
//! properties section, run against the demo contracts in this crate.

use std::time::{Duration, Instant};

use futures::stream::StreamExt;

use rapace::{EndpointConfig, StatusCode, StreamDistributor, TransportConfig};
use rapace_testkit::{spawn_demo_responder, AddRequest, CounterRequest};

#[tokio::test]
async fn scenario_1_unary_success() {
    let caller = spawn_demo_responder(TransportConfig::default());
    let started = Instant::now();
    let sum: i32 = caller
        .unary::<AddRequest, i32, rapace::JsonCodec>("Calc", "Add", AddRequest { a: 5, b: 3 })
        .await
        .unwrap();
    assert_eq!(sum, 8);
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn scenario_2_unary_timeout() {
    let config = EndpointConfig::default().with_unary_timeout(Duration::from_millis(50));
    let (caller_t, responder_t) =
        rapace::InProcTransport::pair(TransportConfig::default());
    let registry = rapace_testkit::demo_registry();
    let responder_t = std::sync::Arc::new(responder_t);
    let responder = rapace::ResponderEndpoint::new(responder_t.clone(), registry);
    tokio::spawn(async move { responder.serve().await });

    let caller = rapace::CallerEndpoint::with_config(std::sync::Arc::new(caller_t), config);
    let started = Instant::now();
    let err = caller
        .unary::<(), (), rapace::JsonCodec>("Calc", "Slow", ())
        .await
        .unwrap_err();
    assert_eq!(err.code, StatusCode::DeadlineExceeded);
    assert!(started.elapsed() < Duration::from_millis(250));
}

#[tokio::test]
async fn scenario_3_server_stream_fan_out() {
    let caller = spawn_demo_responder(TransportConfig::default());
    let stream = caller
        .server_streaming::<CounterRequest, i32, rapace::JsonCodec>(
            "Counter",
            "From",
            CounterRequest { start: 10, n: 5 },
        )
        .await
        .unwrap();
    let values: Vec<i32> = stream.map(|r| r.unwrap()).collect().await;
    assert_eq!(values, vec![10, 11, 12, 13, 14]);
}

#[tokio::test]
async fn scenario_4_client_stream_aggregation() {
    let caller = spawn_demo_responder(TransportConfig::default());
    let handle = caller
        .client_stream::<String, i32, rapace::JsonCodec>("Words", "Count")
        .await
        .unwrap();

    handle.send("hello world".to_string()).await.unwrap();
    handle.send("foo bar baz".to_string()).await.unwrap();
    handle.finish_sending().await.unwrap();

    // A send after finish_sending fails locally, it never reaches the
    // responder (§4.6.3).
    let err = handle.send("too late".to_string()).await.unwrap_err();
    assert_eq!(err.code, StatusCode::FailedPrecondition);

    let count: i32 = handle.await_response().await.unwrap();
    assert_eq!(count, 5);
}

#[tokio::test]
async fn scenario_5_bidi_interleave() {
    let caller = spawn_demo_responder(TransportConfig::default());
    let handle = caller
        .bidi::<String, String, rapace::JsonCodec>("Chat", "Connect")
        .await
        .unwrap();

    // The responder's handler stops (and sends its trailer) on "bye"; the
    // caller's fourth "ping", sent after that, must not error locally even
    // though the responder has already discarded it (§4.6.4 tie-break rule).
    for word in ["ping", "ping", "bye", "ping"] {
        handle.send(word.to_string()).await.unwrap();
    }
    handle.finish_sending().await.unwrap();

    let replies: Vec<String> = handle.responses.map(|r| r.unwrap()).collect().await;
    assert_eq!(replies, vec!["pong".to_string(), "pong".to_string()]);
}

#[tokio::test]
async fn scenario_6_distributor_fairness() {
    let distributor: StreamDistributor<i32> = StreamDistributor::new();
    let (a_id, mut a_rx) = distributor.subscribe(None);
    let (b_id, mut b_rx) = distributor.subscribe(None);
    let (c_id, mut c_rx) = distributor.subscribe(None);

    distributor.pause(b_id).unwrap();
    for i in 1..=10 {
        distributor.publish(i, 4, None);
    }

    let mut a_items = Vec::new();
    while let Ok(item) = a_rx.try_recv() {
        a_items.push(item.item);
    }
    let mut c_items = Vec::new();
    while let Ok(item) = c_rx.try_recv() {
        c_items.push(item.item);
    }
    assert_eq!(a_items, (1..=10).collect::<Vec<_>>());
    assert_eq!(c_items, (1..=10).collect::<Vec<_>>());
    assert!(b_rx.try_recv().is_err());

    distributor.resume(b_id).unwrap();
    distributor.publish(11, 4, None);
    let b_item = b_rx.recv().await.unwrap();
    assert_eq!(b_item.item, 11);
    assert!(b_rx.try_recv().is_err());

    let _ = a_id;
    let _ = c_id;
}
