//! Demo service contracts used by the end-to-end scenario tests (§8): one
//! method per call shape, matching the literal scenarios verbatim —
//! `Calc.Add`, `Calc.Slow`, `Counter.From`, `Words.Count`, `Chat.Connect`.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use rapace::{
    CallerEndpoint, ContractRegistry, ContractRegistryBuilder, InProcTransport, JsonCodec,
    ResponderEndpoint, Status, Transport, TransportConfig,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AddRequest {
    pub a: i32,
    pub b: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CounterRequest {
    pub start: i32,
    pub n: i32,
}

/// Builds the registry shared by every scenario test.
pub fn demo_registry() -> ContractRegistry {
    ContractRegistryBuilder::new()
        .unary::<AddRequest, i32, JsonCodec, _, _>("Calc", "Add", |req| async move {
            Ok(req.a + req.b)
        })
        .unwrap()
        .unary::<(), (), JsonCodec, _, _>("Calc", "Slow", |_req| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .unwrap()
        .server_streaming::<CounterRequest, i32, JsonCodec, _, _>(
            "Counter",
            "From",
            |req: CounterRequest| {
                let stream = futures::stream::iter(0..req.n).then(move |i| async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(req.start + i)
                });
                Ok(Box::pin(stream) as BoxStream<'static, Result<i32, Status>>)
            },
        )
        .unwrap()
        .client_streaming::<String, i32, JsonCodec, _, _>("Words", "Count", |mut reqs| async move {
            let mut total = 0i32;
            while let Some(item) = reqs.next().await {
                let sentence = item?;
                total += sentence.split_whitespace().count() as i32;
            }
            Ok(total)
        })
        .unwrap()
        .bidirectional::<String, String, JsonCodec, _, _>("Chat", "Connect", |reqs| {
            Box::pin(futures::stream::unfold(reqs, |mut reqs| async move {
                match reqs.next().await {
                    None => None,
                    Some(Err(status)) => Some((Err(status), reqs)),
                    Some(Ok(word)) if word == "bye" => None,
                    Some(Ok(word)) => {
                        let reply = if word == "ping" {
                            "pong".to_string()
                        } else {
                            word
                        };
                        Some((Ok(reply), reqs))
                    }
                }
            })) as BoxStream<'static, Result<String, Status>>
        })
        .unwrap()
        .build()
}

/// Spins up an in-process transport pair, serves [`demo_registry`] on one
/// end, and hands back a caller endpoint wired to the other.
pub fn spawn_demo_responder(config: TransportConfig) -> CallerEndpoint<InProcTransport> {
    let (caller_transport, responder_transport) = InProcTransport::pair(config);
    let responder = ResponderEndpoint::new(Arc::new(responder_transport), demo_registry());
    tokio::spawn(async move { responder.serve().await });
    CallerEndpoint::new(Arc::new(caller_transport))
}
