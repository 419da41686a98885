//! Integration tests for hotfn-worker.
//!
//! Each test drives a full `Worker` over in-memory duplex pipes, acting as
//! the caller on the other end.

use std::time::Duration;

use hotfn_worker::handler::HandlerError;
use hotfn_worker::protocol::{Format, Framing};
use hotfn_worker::transport::CloseReason;
use hotfn_worker::{Reply, Result, Worker, WorkerBuilder};
use serde_json::{json, Value};
use tokio::io::{duplex, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;

struct Pipe {
    input: DuplexStream,
    output: BufReader<DuplexStream>,
    task: JoinHandle<Result<CloseReason>>,
}

impl Pipe {
    fn spawn(worker: Worker) -> Self {
        let (input, worker_in) = duplex(64 * 1024);
        let (worker_out, output) = duplex(64 * 1024);
        let task = tokio::spawn(async move { worker.run(worker_in, worker_out).await });
        Self {
            input,
            output: BufReader::new(output),
            task,
        }
    }

    async fn send(&mut self, data: &[u8]) {
        self.input.write_all(data).await.unwrap();
        self.input.flush().await.unwrap();
    }

    async fn recv_json(&mut self) -> Value {
        let mut line = String::new();
        let n = self.output.read_line(&mut line).await.unwrap();
        assert!(n > 0, "worker closed the outbound pipe");
        serde_json::from_str(line.trim_end()).unwrap()
    }

    async fn close(self) -> (CloseReason, Vec<u8>) {
        let Pipe {
            input,
            mut output,
            task,
        } = self;
        drop(input);
        let mut rest = Vec::new();
        output.read_to_end(&mut rest).await.unwrap();
        (task.await.unwrap().unwrap(), rest)
    }
}

fn echo() -> WorkerBuilder {
    Worker::builder().handler(|_ctx, data| async move { Ok(Reply::new(data)) })
}

fn inner_body(response: &Value) -> Value {
    serde_json::from_str(response["body"].as_str().unwrap()).unwrap()
}

/// Test a double-encoded string body round trip.
#[tokio::test]
async fn test_string_body_echo() {
    let mut pipe = Pipe::spawn(echo().build().unwrap());

    pipe.send(br#"{"body": "{\"data\": 42}"}"#).await;
    let response = pipe.recv_json().await;

    assert_eq!(response["status_code"], 202);
    assert_eq!(inner_body(&response), json!({"data": 42}));
    assert_eq!(response.as_object().unwrap().len(), 2);

    let (reason, rest) = pipe.close().await;
    assert_eq!(reason, CloseReason::Eof);
    assert!(rest.is_empty());
}

/// Test an object body used without a second decode.
#[tokio::test]
async fn test_object_body_echo() {
    let mut pipe = Pipe::spawn(echo().build().unwrap());

    pipe.send(br#"{"body": {"data": "x"}}"#).await;
    let response = pipe.recv_json().await;

    assert_eq!(response["status_code"], 202);
    assert_eq!(inner_body(&response), json!({"data": "x"}));
}

/// Test that a malformed envelope gets an error and the worker keeps serving.
#[tokio::test]
async fn test_malformed_input_keeps_serving() {
    let mut pipe = Pipe::spawn(echo().build().unwrap());

    pipe.send(b"this is not json\n").await;
    let error = pipe.recv_json().await;
    assert!(error["error"]["message"].is_string());
    assert!(error.get("body").is_none());
    assert!(error.get("status_code").is_none());

    pipe.send(br#"{"body": {"data": [1, 2]}}"#).await;
    let response = pipe.recv_json().await;
    assert_eq!(inner_body(&response), json!({"data": [1, 2]}));
}

/// Test a garbage line arriving in two writes (one error, then service resumes).
#[tokio::test]
async fn test_garbage_line_split_across_writes_gets_one_error() {
    let mut pipe = Pipe::spawn(echo().build().unwrap());

    pipe.send(b"no").await;
    tokio::task::yield_now().await;
    pipe.send(b"t json\n").await;
    pipe.send(br#"{"body": {"data": "after"}}"#).await;

    assert!(pipe.recv_json().await["error"].is_object());
    assert_eq!(inner_body(&pipe.recv_json().await), json!({"data": "after"}));

    let (_, rest) = pipe.close().await;
    assert!(rest.is_empty(), "{}", String::from_utf8_lossy(&rest));
}

/// Test a multi-line malformed envelope answered with a single error.
#[tokio::test]
async fn test_pretty_printed_bad_envelope_gets_one_error() {
    let mut pipe = Pipe::spawn(echo().build().unwrap());

    pipe.send(b"{\n  \"body\": 1,\n  ,\n  \"x\": 2\n}\n").await;
    pipe.send(br#"{"body": {"data": "next"}}"#).await;

    assert!(pipe.recv_json().await["error"]["message"].is_string());
    assert_eq!(inner_body(&pipe.recv_json().await), json!({"data": "next"}));

    let (_, rest) = pipe.close().await;
    assert!(rest.is_empty(), "{}", String::from_utf8_lossy(&rest));
}

/// Test handler failure reported as an error payload.
#[tokio::test]
async fn test_handler_error_payload() {
    let worker = Worker::builder()
        .handler(|_ctx, _data| async move { Err(HandlerError::new("name is required")) })
        .build()
        .unwrap();
    let mut pipe = Pipe::spawn(worker);

    pipe.send(br#"{"body": {"data": {}}}"#).await;
    assert_eq!(
        pipe.recv_json().await,
        json!({"error": {"message": "name is required"}})
    );

    // A failed invocation does not end the connection.
    pipe.send(br#"{"body": {"data": {}}}"#).await;
    assert!(pipe.recv_json().await["error"].is_object());
}

/// Test handler panic and timeout, followed by a normal call.
#[tokio::test]
async fn test_handler_panic_and_timeout() {
    let worker = Worker::builder()
        .handler(|_ctx, data| async move {
            let mode = data.as_text().unwrap_or_default().to_string();
            match mode.as_str() {
                "panic" => panic!("handler blew up"),
                "slow" => tokio::time::sleep(Duration::from_secs(10)).await,
                _ => {}
            }
            Ok(Reply::new(data))
        })
        .content_type("text/plain")
        .handler_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let mut pipe = Pipe::spawn(worker);

    pipe.send(br#"{"body": "panic"}"#).await;
    let error = pipe.recv_json().await;
    assert!(error["error"]["message"]
        .as_str()
        .unwrap()
        .contains("handler blew up"));

    pipe.send(br#"{"body": "slow"}"#).await;
    let error = pipe.recv_json().await;
    assert!(error["error"]["message"]
        .as_str()
        .unwrap()
        .contains("timed out"));

    pipe.send(br#"{"body": "fast"}"#).await;
    assert_eq!(inner_body(&pipe.recv_json().await), json!({"data": "fast"}));
}

/// Test envelopes sharing one write and one envelope split over many.
#[tokio::test]
async fn test_concatenated_and_fragmented_envelopes() {
    let mut pipe = Pipe::spawn(echo().build().unwrap());

    pipe.send(br#"{"body": {"data": 1}} {"body": {"data": 2}}"#)
        .await;
    assert_eq!(inner_body(&pipe.recv_json().await), json!({"data": 1}));
    assert_eq!(inner_body(&pipe.recv_json().await), json!({"data": 2}));

    let envelope = br#"{"body": "{\"data\": \"split\"}"}"#;
    for piece in envelope.chunks(3) {
        pipe.send(piece).await;
        tokio::task::yield_now().await;
    }
    assert_eq!(inner_body(&pipe.recv_json().await), json!({"data": "split"}));
}

/// Test that responses come back in request order.
#[tokio::test]
async fn test_responses_follow_request_order() {
    let worker = Worker::builder()
        .handler(|ctx, data| async move {
            Ok(Reply::new(json!({"seq": ctx.sequence(), "echo": data.as_json().cloned()})))
        })
        .build()
        .unwrap();
    let mut pipe = Pipe::spawn(worker);

    let mut input = Vec::new();
    for i in 0..20 {
        input.extend_from_slice(format!("{{\"body\": {{\"data\": {}}}}}\n", i).as_bytes());
    }
    pipe.send(&input).await;

    for i in 0..20u64 {
        let inner = inner_body(&pipe.recv_json().await);
        assert_eq!(inner["data"]["seq"], i + 1);
        assert_eq!(inner["data"]["echo"], i);
    }
}

/// Test envelope metadata visible to the handler, status and headers in the reply.
#[tokio::test]
async fn test_envelope_metadata_reaches_handler() {
    let worker = Worker::builder()
        .handler(|ctx, _data| async move {
            Ok(Reply::new(json!({
                "call_id": ctx.call_id(),
                "method": ctx.method(),
                "url": ctx.request_url(),
                "trace": ctx.header("x-trace"),
            }))
            .with_status(200)
            .with_header("X-Handled", "yes"))
        })
        .build()
        .unwrap();
    let mut pipe = Pipe::spawn(worker);

    pipe.send(
        br#"{"call_id": "01ABC", "deadline": "2030-01-01T00:00:00Z",
             "content_type": "application/json",
             "protocol": {"type": "http", "method": "POST",
                          "request_url": "http://localhost/r/app/fn",
                          "headers": {"X-Trace": ["a", "b"]}},
             "body": "{}"}"#,
    )
    .await;
    let response = pipe.recv_json().await;

    assert_eq!(response["status_code"], 200);
    assert_eq!(response["headers"], json!({"X-Handled": "yes"}));
    assert_eq!(
        inner_body(&response),
        json!({"data": {
            "call_id": "01ABC",
            "method": "POST",
            "url": "http://localhost/r/app/fn",
            "trace": "a, b",
        }})
    );
}

/// Test permissive and strict handling of unknown content types.
#[tokio::test]
async fn test_unknown_content_type_policies() {
    let envelope = br#"{"content_type": "application/x-custom", "body": "raw"}"#;

    let mut pipe = Pipe::spawn(echo().build().unwrap());
    pipe.send(envelope).await;
    assert_eq!(inner_body(&pipe.recv_json().await), json!({"data": "raw"}));

    let mut pipe = Pipe::spawn(echo().strict(true).build().unwrap());
    pipe.send(envelope).await;
    assert_eq!(
        pipe.recv_json().await,
        json!({"error": {"message": "unsupported content type: application/x-custom"}})
    );
}

/// Test oversized frame rejection under newline framing.
#[tokio::test]
async fn test_oversized_frame_is_rejected() {
    let mut pipe = Pipe::spawn(
        echo()
            .framing(Framing::Newline)
            .max_frame_size(64)
            .build()
            .unwrap(),
    );

    let big = format!("{{\"body\": \"{}\"}}\n", "x".repeat(200));
    pipe.send(big.as_bytes()).await;
    let error = pipe.recv_json().await;
    assert!(error["error"]["message"]
        .as_str()
        .unwrap()
        .contains("exceeds maximum"));

    pipe.send(b"{\"body\": {\"data\": \"small\"}}\n").await;
    assert_eq!(inner_body(&pipe.recv_json().await), json!({"data": "small"}));
}

/// Test length-prefixed framing in both directions.
#[tokio::test]
async fn test_length_prefixed_framing() {
    let mut pipe = Pipe::spawn(echo().framing(Framing::LengthPrefixed).build().unwrap());

    let envelope = br#"{"body": {"data": true}}"#;
    let mut frame = (envelope.len() as u32).to_be_bytes().to_vec();
    frame.extend_from_slice(envelope);
    pipe.send(&frame).await;
    drop(pipe.input);

    let mut out = Vec::new();
    pipe.output.read_to_end(&mut out).await.unwrap();
    let len = u32::from_be_bytes([out[0], out[1], out[2], out[3]]) as usize;
    assert_eq!(out.len(), 4 + len);

    let response: Value = serde_json::from_slice(&out[4..]).unwrap();
    assert_eq!(inner_body(&response), json!({"data": true}));
    assert_eq!(pipe.task.await.unwrap().unwrap(), CloseReason::Eof);
}

/// Test chunk framing (one envelope per write).
#[tokio::test]
async fn test_chunk_framing_one_envelope_per_write() {
    let mut pipe = Pipe::spawn(echo().framing(Framing::Chunk).build().unwrap());

    for i in 0..3 {
        pipe.send(format!("{{\"body\": {{\"data\": {}}}}}", i).as_bytes())
            .await;
        assert_eq!(inner_body(&pipe.recv_json().await), json!({"data": i}));
    }
}

/// Test a truncated envelope at end of input.
#[tokio::test]
async fn test_truncated_envelope_at_eof_gets_error() {
    let mut pipe = Pipe::spawn(echo().build().unwrap());
    pipe.send(br#"{"body": {"data": "#).await;

    let (reason, rest) = pipe.close().await;
    assert_eq!(reason, CloseReason::Eof);

    let error: Value = serde_json::from_slice(rest.trim_ascii_end()).unwrap();
    assert!(error["error"]["message"].is_string());
}

/// Test the HTTP envelope end to end.
#[tokio::test]
async fn test_http_format() {
    let worker = Worker::builder()
        .format(Format::Http)
        .handler(|ctx, data| async move {
            let name = ctx.query_param("name").unwrap_or("world").to_string();
            let greeting = format!(
                "{} {} says hello to {}: {}",
                ctx.method().unwrap_or("?"),
                ctx.call_id().unwrap_or("?"),
                name,
                data.as_text().unwrap_or("")
            );
            Ok(Reply::text(greeting).with_header("X-Fn", "echo"))
        })
        .build()
        .unwrap();
    let mut pipe = Pipe::spawn(worker);

    pipe.send(
        b"POST /hello?name=fn HTTP/1.1\r\n\
          Host: localhost\r\n\
          Fn_call_id: call-7\r\n\
          Content-Type: text/plain\r\n\
          Content-Length: 4\r\n\
          \r\n\
          ping",
    )
    .await;

    let (reason, out) = pipe.close().await;
    assert_eq!(reason, CloseReason::Eof);

    let text = String::from_utf8(out).unwrap();
    let body = "POST call-7 says hello to fn: ping";
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{}", text);
    assert!(text.contains("Content-Type: text/plain\r\n"));
    assert!(text.contains(&format!("Content-Length: {}\r\n", body.len())));
    assert!(text.contains("X-Fn: echo\r\n"));
    assert!(text.ends_with(&format!("\r\n\r\n{}", body)));
}

/// Test the CloudEvent envelope end to end.
#[tokio::test]
async fn test_cloudevent_format() {
    let worker = Worker::builder()
        .format(Format::CloudEvent)
        .handler(|ctx, data| async move {
            Ok(Reply::new(json!({
                "source": ctx.source(),
                "type": ctx.event_type(),
                "deadline": ctx.deadline(),
                "got": data.as_json().cloned(),
            }))
            .with_header("X-Fn", "ce"))
        })
        .build()
        .unwrap();
    let mut pipe = Pipe::spawn(worker);

    pipe.send(
        br#"{"cloudEventsVersion": "0.1", "eventID": "ev-1",
             "source": "/sensors/7", "eventType": "reading",
             "contentType": "application/json",
             "extensions": {"deadline": "2030-01-01T00:00:00Z"},
             "data": {"celsius": 21}}"#,
    )
    .await;
    let event = pipe.recv_json().await;

    assert_eq!(event["cloudEventsVersion"], "0.1");
    assert_eq!(event["eventID"], "ev-1");
    assert_eq!(event["eventType"], "reading");
    assert_eq!(event["contentType"], "application/json");
    assert_eq!(
        event["extensions"]["protocol"],
        json!({"status_code": 200, "headers": {"X-Fn": ["ce"]}})
    );
    assert_eq!(
        event["data"],
        json!({
            "source": "/sensors/7",
            "type": "reading",
            "deadline": "2030-01-01T00:00:00Z",
            "got": {"celsius": 21},
        })
    );

    pipe.send(b"[\"not an event\"]\n").await;
    assert!(pipe.recv_json().await["error"]["message"].is_string());
}

/// Test an HTTP request with a chunked body.
#[tokio::test]
async fn test_http_chunked_request() {
    let worker = echo().format(Format::Http).content_type("text/plain").build().unwrap();
    let mut pipe = Pipe::spawn(worker);

    pipe.send(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nping\r\n0\r\n\r\n")
        .await;

    let (reason, out) = pipe.close().await;
    assert_eq!(reason, CloseReason::Eof);

    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{}", text);
    assert!(text.contains("Content-Length: 4\r\n"));
    assert!(text.ends_with("\r\n\r\nping"), "{}", text);
    assert_eq!(text.matches("HTTP/1.1").count(), 1);
    assert!(!text.contains("error"));
}

/// Test a malformed HTTP request answered with a JSON error.
#[tokio::test]
async fn test_http_malformed_request_gets_json_error() {
    let mut pipe = Pipe::spawn(echo().format(Format::Http).build().unwrap());

    pipe.send(b"NOT A REQUEST\r\n\r\n").await;
    let error = pipe.recv_json().await;
    assert!(error["error"]["message"]
        .as_str()
        .unwrap()
        .contains("invalid HTTP request"));
}
