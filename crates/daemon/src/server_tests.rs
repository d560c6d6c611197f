// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use keel_adapters::protocol::{ListSnapshotsRequest, Request, Response};
use keel_adapters::ErrorCode;
use keel_core::PartitionId;
use keel_engine::BrokerRequestHandler;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

async fn serve_once() -> (std::net::SocketAddr, JoinHandle<Result<(), ServerError>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        handle_connection(&BrokerRequestHandler::default(), stream).await
    });
    (addr, task)
}

#[tokio::test]
async fn answers_one_request_per_connection() {
    let (addr, task) = serve_once().await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut reader, mut writer) = stream.into_split();
    let request = Request::ListSnapshots(ListSnapshotsRequest {
        partition: PartitionId(3),
    });
    protocol::write_request(&mut writer, &request, DEFAULT_TIMEOUT)
        .await
        .unwrap();
    let response = protocol::read_response(&mut reader, DEFAULT_TIMEOUT)
        .await
        .unwrap();

    match response {
        Response::Error(e) => assert_eq!(e.code, ErrorCode::PartitionNotFound),
        other => panic!("unexpected response: {:?}", other),
    }
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn peer_closing_early_is_not_an_error() {
    let (addr, task) = serve_once().await;

    drop(TcpStream::connect(addr).await.unwrap());

    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn malformed_request_is_a_protocol_error() {
    let (addr, task) = serve_once().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    protocol::write_message(&mut stream, &[0xFF, 0xFF, 0xFF])
        .await
        .unwrap();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(ServerError::Protocol(_))));
}
