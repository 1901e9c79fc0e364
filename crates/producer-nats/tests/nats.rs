use std::time::Duration;

use async_nats::HeaderMap;
use courier_producer::{Envelope, Error, Producer, ProducerOptions};
use courier_producer_nats::transport::{CORRELATION_KEY_HEADER, REPLY_ERROR_HEADER, REPLY_TOPIC_HEADER};
use courier_producer_nats::{NatsTransport, NatsTransportOptions};
use futures::StreamExt;
use serde_json::{Value, json};

const URL: &str = "nats://localhost:4222";

async fn responder(subject: &str, fail: bool) {
    let client = async_nats::connect(URL).await.unwrap();
    let mut requests = client.subscribe(subject.to_string()).await.unwrap();
    client.flush().await.unwrap();

    tokio::spawn(async move {
        while let Some(request) = requests.next().await {
            let Some(headers) = request.headers else {
                continue;
            };
            let reply_topic = headers.get(REPLY_TOPIC_HEADER).unwrap().as_str().to_string();
            let envelope = Envelope::<Value>::decode(&request.payload).unwrap();

            let mut reply_headers = HeaderMap::new();
            reply_headers.insert(CORRELATION_KEY_HEADER, envelope.key().as_str());
            let payload = if fail {
                reply_headers.insert(REPLY_ERROR_HEADER, "rejected");
                Vec::new()
            } else {
                serde_json::to_vec(envelope.value()).unwrap()
            };

            client
                .publish_with_headers(reply_topic, reply_headers, payload.into())
                .await
                .unwrap();
        }
    });
}

async fn producer(topics: &[&str]) -> Producer<NatsTransport> {
    let producer = Producer::new(
        NatsTransport::new(NatsTransportOptions {
            url: URL.to_string(),
            ..NatsTransportOptions::default()
        }),
        ProducerOptions {
            timeout: Duration::from_secs(2),
        },
    );
    producer.bootstrap(topics.iter().copied()).await.unwrap();
    producer
}

#[tokio::test]
#[ignore = "requires a NATS server at localhost:4222"]
async fn test_request_reply_over_nats() {
    responder("courier.test.echo", false).await;
    let producer = producer(&["courier.test.echo"]).await;

    let reply: Value = producer
        .send("courier.test.echo", json!({"foo": 1}), None)
        .await
        .unwrap();

    assert_eq!(reply, json!({"foo": 1}));
}

#[tokio::test]
#[ignore = "requires a NATS server at localhost:4222"]
async fn test_remote_error_over_nats() {
    responder("courier.test.fail", true).await;
    let producer = producer(&["courier.test.fail"]).await;

    let result: Result<Value, _> = producer.send("courier.test.fail", json!(1), None).await;

    assert!(matches!(result, Err(Error::Remote(message)) if message == "rejected"));
}

#[tokio::test]
#[ignore = "requires a NATS server at localhost:4222"]
async fn test_emit_is_flushed() {
    let producer = producer(&[]).await;

    producer.emit("courier.test.events", json!({"bar": 2}), None).await.unwrap();
}
