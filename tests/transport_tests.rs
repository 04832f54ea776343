//! Integration tests for the file and HTTP transports
//!
//! The HTTP tests run a throwaway `TcpListener` on a background thread that
//! accepts a fixed number of POSTs and hands back what it received.

use cgtrace::config::{TraceConfig, CALL_GRAPH_FILE_PREFIX, FUNCTION_FILE_PREFIX};
use cgtrace::context::TracerContext;
use cgtrace::endpoint::Endpoint;
use cgtrace::host::{FrameSnapshot, FunctionKey, LiteralInfo, SourceScript};
use cgtrace::http_transport::HttpTransport;
use cgtrace::records::{FunctionCall, FunctionId};
use cgtrace::serializer::Serializer;
use cgtrace::trace_reader::{read_trace_file, TraceRecord};
use cgtrace::transport::{FileTransport, Transport};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::TempDir;

/// One request as seen by the test server
#[derive(Debug)]
struct ReceivedRequest {
    request_line: String,
    content_length: usize,
    content_type: Option<String>,
    body: Vec<u8>,
}

fn spawn_server(requests: usize) -> (String, JoinHandle<Vec<ReceivedRequest>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/collect", listener.local_addr().unwrap());
    let handle = thread::spawn(move || {
        let mut received = Vec::new();
        for _ in 0..requests {
            let (stream, _) = listener.accept().unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            let mut reader = BufReader::new(stream);

            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut content_length = 0;
            let mut content_type = None;
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).unwrap();
                let header = header.trim_end();
                if header.is_empty() {
                    break;
                }
                let (name, value) = header.split_once(':').unwrap();
                match name.to_ascii_lowercase().as_str() {
                    "content-length" => content_length = value.trim().parse().unwrap(),
                    "content-type" => content_type = Some(value.trim().to_string()),
                    _ => {}
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();

            let mut stream = reader.into_inner();
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .unwrap();
            received.push(ReceivedRequest {
                request_line: request_line.trim_end().to_string(),
                content_length,
                content_type,
                body,
            });
        }
        received
    });
    (url, handle)
}

fn http(url: &str) -> Transport {
    Transport::Http(HttpTransport::new(
        Endpoint::parse(url).unwrap(),
        Duration::from_secs(5),
    ))
}

#[test]
fn test_http_content_length_matches_each_payload() {
    let (url, server) = spawn_server(2);
    let mut serializer = Serializer::new(http(&url), 256);

    for i in 0..3 {
        serializer.serialize_function_call(&FunctionCall::new(
            FunctionId::new(i),
            FunctionId::new(i + 1),
            1_700_000_000_000,
        ));
    }
    serializer.flush();
    serializer.serialize_function_call(&FunctionCall::entry(FunctionId::new(9), 5));
    serializer.flush();

    let stats = serializer.stats();
    drop(serializer);
    let received = server.join().unwrap();

    assert_eq!(received.len(), 2);
    assert_eq!(received[0].request_line, "POST /collect HTTP/1.1");
    assert_eq!(received[0].content_type.as_deref(), Some("text/plain"));
    assert_eq!(
        received[0].body,
        b"0\t1\t1700000000000\n1\t2\t1700000000000\n2\t3\t1700000000000\n"
    );
    assert_eq!(received[1].body, b"-1\t9\t5\n");
    for request in &received {
        assert_eq!(request.content_length, request.body.len());
    }
    assert_eq!(stats.flushes, 2);
    assert_eq!(stats.failed_flushes, 0);
}

#[test]
fn test_http_failure_drops_batch_and_continues() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut serializer = Serializer::new(http(&format!("http://127.0.0.1:{port}/")), 256);
    serializer.serialize_function_call(&FunctionCall::entry(FunctionId::new(1), 1));
    serializer.flush();

    let stats = serializer.stats();
    assert_eq!(stats.failed_flushes, 1);
    assert_eq!(stats.dropped_bytes, "-1\t1\t1\n".len() as u64);
    assert_eq!(serializer.buffered_len(), 0);

    // Tracing carries on after the failure.
    serializer.serialize_function_call(&FunctionCall::entry(FunctionId::new(2), 2));
    assert!(serializer.buffered_len() > 0);
}

#[test]
fn test_file_transport_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/cg_test.tsv");
    let transport = Transport::File(FileTransport::create(&path).unwrap());
    let mut serializer = Serializer::new(transport, 256);

    serializer.serialize_function_call(&FunctionCall::new(
        FunctionId::new(0),
        FunctionId::new(1),
        10,
    ));
    serializer.serialize_function_call(&FunctionCall::exit(FunctionId::new(1), 11));
    drop(serializer);

    let records = read_trace_file(&path).unwrap();
    assert_eq!(
        records,
        vec![
            TraceRecord::Call(FunctionCall::new(FunctionId::new(0), FunctionId::new(1), 10)),
            TraceRecord::Call(FunctionCall::exit(FunctionId::new(1), 11)),
        ]
    );
}

#[test]
fn test_context_writes_per_process_files() {
    let dir = TempDir::new().unwrap();
    let config = TraceConfig::default()
        .with_stack_depth(10)
        .with_output_dir(dir.path());
    let mut tracer = TracerContext::with_config(config.clone());

    let script = SourceScript::new("/app/server.js", "function a() {}\nfunction b() {}\n");
    let a = tracer.trace_function_creation(&script, &LiteralInfo::new(1, 0, 15).named("a"), false);
    let b = tracer.trace_function_creation(&script, &LiteralInfo::new(2, 16, 31).named("b"), false);
    tracer.trace_enter(a, [FrameSnapshot::new(FunctionKey::from_address(1))]);
    tracer.trace_enter(
        b,
        [
            FrameSnapshot::new(FunctionKey::from_address(2)),
            FrameSnapshot::new(FunctionKey::from_address(1)),
        ],
    );
    tracer.shutdown();

    let defs = read_trace_file(config.output_path(FUNCTION_FILE_PREFIX)).unwrap();
    assert_eq!(defs.len(), 2);
    let TraceRecord::Definition(second) = &defs[1] else {
        panic!("expected definition");
    };
    assert_eq!(second.name, "b");
    assert_eq!((second.line, second.column), (2, 1));

    let calls = read_trace_file(config.output_path(CALL_GRAPH_FILE_PREFIX)).unwrap();
    assert_eq!(calls.len(), 1, "only the a -> b edge is expected");
    let TraceRecord::Call(edge) = &calls[0] else {
        panic!("expected call");
    };
    assert_eq!(edge.edge(), (a, b));
}

#[test]
fn test_context_posts_both_streams_to_endpoint() {
    let (url, server) = spawn_server(2);
    let config = TraceConfig::default()
        .with_stack_depth(0)
        .with_entrypoint(url);
    let mut tracer = TracerContext::with_config(config);

    let script = SourceScript::new("/app/index.js", "");
    let f = tracer.trace_function_creation(&script, &LiteralInfo::new(1, 0, 1), false);
    tracer.trace_enter(f, Vec::<FrameSnapshot>::new());
    tracer.shutdown();

    let received = server.join().unwrap();
    let bodies: Vec<String> = received
        .iter()
        .map(|r| String::from_utf8(r.body.clone()).unwrap())
        .collect();
    assert!(bodies.iter().any(|b| b.split('\t').count() == 9));
    assert!(bodies.iter().any(|b| b.starts_with("-1\t0\t")));
}
