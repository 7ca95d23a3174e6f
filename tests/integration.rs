//! Integration tests for cluster-follower.
//!
//! These tests verify the integration between the protocol, codec and
//! connection layers.

use std::time::Duration;

use cluster_follower::codec::{JsonTranscoder, MsgPackTranscoder, Transcoder};
use cluster_follower::connection::{Connection, ConnectionEvent, ConnectionOptions};
use cluster_follower::follower::{decode_reply, Reply};
use cluster_follower::protocol::{
    body_length_of, build_frame, ConnObj, FrameBuffer, Header, Packet, Request, Response,
    HEADER_SIZE,
};
use cluster_follower::ClusterError;
use serde_json::json;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

/// Test full frame encode/decode cycle with a MsgPack payload.
#[test]
fn test_request_with_msgpack_payload() {
    let payload = MsgPackTranscoder
        .encode(&json!({"id": 42, "message": "Hello, world!"}))
        .unwrap();

    let req = Request::new(
        ConnObj::Invoke {
            method: "echo".to_string(),
            args: vec![json!(1)],
            oneway: false,
        },
        3000,
    )
    .with_data(payload.clone());
    let bytes = req.encode().unwrap();

    let mut buffer = FrameBuffer::new();
    let frames = buffer.push(&bytes).unwrap();
    assert_eq!(frames.len(), 1);

    let frame = &frames[0];
    assert_eq!(frame.id(), req.id);
    assert!(!frame.is_response());
    assert_eq!(frame.data(), &payload[..]);

    let decoded = Packet::from_frame(frame).unwrap();
    assert_eq!(decoded, req);
    assert_eq!(
        MsgPackTranscoder.decode(decoded.data.as_deref().unwrap()).unwrap(),
        json!({"id": 42, "message": "Hello, world!"})
    );
}

/// Body length is the sum of the two int32 length fields.
#[test]
fn test_header_body_length_matches_encoding() {
    let req = Request::new(ConnObj::Heartbeat, 10).with_data(vec![7u8; 33]);
    let bytes = req.encode().unwrap();

    let declared = body_length_of(&bytes[..HEADER_SIZE]).unwrap();
    assert_eq!(declared as usize, bytes.len() - HEADER_SIZE);
    assert_eq!(body_length_of(&bytes[..HEADER_SIZE - 1]), None);
}

/// Test multiple frames in sequence, delivered in uneven slices.
#[test]
fn test_multiple_frames_sequence() {
    let mut all_bytes = Vec::new();
    let mut ids = Vec::new();

    for i in 1u8..=5 {
        let req = Request::new(ConnObj::Heartbeat, u32::from(i) * 100)
            .with_data(JsonTranscoder.encode(&json!(format!("message_{}", i))).unwrap());
        ids.push(req.id);
        all_bytes.extend(req.encode().unwrap());
    }

    let mut buffer = FrameBuffer::new();
    let mut frames = Vec::new();
    for chunk in all_bytes.chunks(13) {
        frames.extend(buffer.push(chunk).unwrap());
    }

    assert_eq!(frames.len(), 5);
    assert!(buffer.is_empty());

    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.id(), ids[i]);
        assert_eq!(frame.header.timeout, (i as u32 + 1) * 100);
        let value = JsonTranscoder.decode(frame.data()).unwrap();
        assert_eq!(value, json!(format!("message_{}", i + 1)));
    }
}

/// Metadata-only and data-only frames decode to the right `None`s.
#[test]
fn test_empty_sections() {
    let header = Header::new(9, true, 0, 0, 3);
    let bytes = build_frame(&header, &[], b"abc");
    let packet = Packet::decode(&bytes).unwrap();
    assert_eq!(packet.conn_obj, None);
    assert_eq!(packet.data.as_deref(), Some(&b"abc"[..]));

    let ack = Response::new(9, 0, Some(ConnObj::SubscribeResultRes));
    let packet = Packet::decode(&ack.encode().unwrap()).unwrap();
    assert_eq!(packet.conn_obj, Some(ConnObj::SubscribeResultRes));
    assert_eq!(packet.data, None);
}

/// Truncated input never yields a packet.
#[test]
fn test_truncated_packet_is_malformed() {
    let bytes = Request::new(ConnObj::Heartbeat, 1)
        .with_data(vec![1u8; 10])
        .encode()
        .unwrap();

    let err = Packet::decode(&bytes[..bytes.len() - 1]).unwrap_err();
    assert!(matches!(err, ClusterError::MalformedFrame(_)));
}

/// Unknown control types survive decoding as `Unknown`.
#[test]
fn test_unknown_control_type_decodes() {
    let meta = br#"{"type":"leader_gossip","epoch":3}"#;
    let header = Header::new(77, false, 100, meta.len() as i32, 0);
    let packet = Packet::decode(&build_frame(&header, meta, &[])).unwrap();
    assert_eq!(packet.conn_obj, Some(ConnObj::Unknown));
}

/// A reply frame decodes into an invoke outcome.
#[test]
fn test_invoke_result_reply_decoding() {
    let ok = Response::new(
        1,
        0,
        Some(ConnObj::InvokeResult {
            success: true,
            message: None,
            stack: None,
        }),
    )
    .with_data(JsonTranscoder.encode(&json!([1, 2, 3])).unwrap());

    let frame = FrameBuffer::new().push(&ok.encode().unwrap()).unwrap().remove(0);
    let decoded = decode_reply(&JsonTranscoder, &frame).unwrap();
    assert!(matches!(decoded.reply, Reply::Data(Some(ref v)) if *v == json!([1, 2, 3])));
}

/// A call made over a connection is answered by a peer speaking raw frames.
#[tokio::test]
async fn test_connection_call_over_duplex() {
    let (client, mut server) = duplex(16 * 1024);
    let (conn, _events) = Connection::new(client, "leader", ConnectionOptions::default());

    let leader = tokio::spawn(async move {
        let mut buffer = FrameBuffer::new();
        let mut buf = vec![0u8; 1024];
        let frame = loop {
            let n = server.read(&mut buf).await.unwrap();
            if let Some(frame) = buffer.push(&buf[..n]).unwrap().pop() {
                break frame;
            }
        };
        let request = Packet::from_frame(&frame).unwrap();
        let reply = Response::new(request.id, request.timeout, None).with_data(b"done".to_vec());
        server.write_all(&reply.encode().unwrap()).await.unwrap();
        server
    });

    let reply = conn.call(Request::new(ConnObj::Heartbeat, 1000)).await.unwrap();
    assert!(reply.is_response);
    assert_eq!(reply.data.as_deref(), Some(&b"done"[..]));

    drop(leader.await.unwrap());
}

/// An oversized frame from the peer tears the connection down.
#[tokio::test]
async fn test_oversized_frame_closes_connection() {
    let (client, mut server) = duplex(16 * 1024);
    let options = ConnectionOptions {
        max_body_size: 16,
        ..Default::default()
    };
    let (conn, mut events) = Connection::new(client, "leader", options);

    let pending = tokio::spawn({
        let conn = conn.clone();
        async move { conn.call(Request::new(ConnObj::Heartbeat, 60_000)).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let big = Request::new(ConnObj::Heartbeat, 1).with_data(vec![0u8; 64]);
    server.write_all(&big.encode().unwrap()).await.unwrap();

    assert!(matches!(
        events.recv().await,
        Some(ConnectionEvent::Error(ClusterError::MalformedFrame(_)))
    ));
    assert!(matches!(events.recv().await, Some(ConnectionEvent::Close)));
    assert!(matches!(
        pending.await.unwrap(),
        Err(ClusterError::ConnectionClosed)
    ));
}
