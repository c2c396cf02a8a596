//! End-to-end smoke test: a `MessageBus` over a real TCP socket carries a
//! `Heartbeat` frame from one side to the other and the frame round-trips
//! byte-for-byte through encode/decode.
//!
//! Grounded in the teacher's `tests/integration_tcp_round_trip.rs` smoke
//! test shape (spawn a listener, connect, exercise the real transport)
//! narrowed to this crate's bus/codec instead of the benchmark harness.

use anyhow::Result;
use tokio::net::TcpListener;

use imc_runtime::codec::{encode, Decoded, EncodeOptions, Endianness};
use imc_runtime::schema::builtins;
use imc_runtime::transport::TcpTransport;
use imc_runtime::MessageBus;

#[tokio::test]
async fn heartbeat_round_trips_over_tcp() -> Result<()> {
    let catalog = builtins::catalog();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let mut heartbeat = catalog.instantiate("Heartbeat").unwrap();
    let frame = encode(&catalog, &mut heartbeat, Endianness::Big, EncodeOptions::default())?;
    let frame_for_server = frame.clone();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut socket, &frame_for_server).await.unwrap();
        // Hold the connection open long enough for the client to read the frame.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    });

    let transport = TcpTransport::new(addr);
    let mut bus = MessageBus::spawn(Box::new(transport), catalog.sync_word).await?;

    let received = bus.recv().await.expect("frame channel closed unexpectedly");
    assert_eq!(received, frame);

    match imc_runtime::codec::decode(&catalog, &received, false)? {
        Decoded::Known(msg) => assert_eq!(msg.abbrev(), "Heartbeat"),
        Decoded::Unknown(_) => panic!("Heartbeat should be a known message"),
    }

    bus.shutdown().await;
    server.await?;
    Ok(())
}
