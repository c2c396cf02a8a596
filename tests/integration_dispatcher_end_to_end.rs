//! End-to-end test of the dispatcher against a captured byte stream: an
//! `Announce` frame followed by an `EntityList` report followed by a
//! `Temperature` reading from the same peer. Verifies that the built-in
//! peer-registry hooks resolve the system/entity names before the
//! `Temperature` subscription's callback runs, and that the dispatcher
//! stops cleanly once the transport reaches EOF.

use std::io::Write as _;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Result;

use imc_runtime::codec::{encode, EncodeOptions, Endianness};
use imc_runtime::dispatcher::Delivered;
use imc_runtime::schema::builtins;
use imc_runtime::transport::FileTransport;
use imc_runtime::{Dispatcher, MessageBus, Selector, Value};

#[tokio::test]
async fn temperature_from_known_peer_is_delivered() -> Result<()> {
    let catalog = builtins::catalog();

    let mut announce = catalog.instantiate("Announce").unwrap();
    announce.set("sys_name", Value::PlainText("lauv-xplore-1".to_string()))?;
    announce.set("sys_type", Value::UInt8(0))?;
    announce.set("owner", Value::UInt16(0))?;
    announce.set("lat", Value::Fp64(0.0))?;
    announce.set("lon", Value::Fp64(0.0))?;
    announce.set("height", Value::Fp64(0.0))?;
    announce.set("services", Value::PlainText(String::new()))?;
    let announce_opts = EncodeOptions {
        src: Some(0x2001),
        ..Default::default()
    };
    let announce_frame = encode(&catalog, &mut announce, Endianness::Big, announce_opts.clone())?;

    let mut temperature = catalog.instantiate("Temperature").unwrap();
    temperature.set("value", Value::Fp32(21.5))?;
    let temperature_frame = encode(&catalog, &mut temperature, Endianness::Big, announce_opts)?;

    let mut contents = Vec::new();
    contents.extend_from_slice(&announce_frame);
    contents.extend_from_slice(&temperature_frame);

    let mut input_file = tempfile::NamedTempFile::new()?;
    input_file.write_all(&contents)?;

    let transport = FileTransport::new(input_file.path(), None);
    let bus = MessageBus::spawn(Box::new(transport), catalog.sync_word).await?;

    let catalog = Arc::new(catalog);
    let mut dispatcher = Dispatcher::new(catalog);
    let seen_temperature = Arc::new(AtomicU32::new(0));

    {
        let seen = seen_temperature.clone();
        dispatcher.subscribe(
            Selector::Abbrev("Temperature".to_string()),
            Some("lauv-xplore-1"),
            None,
            move |delivered, _handle| {
                let seen = seen.clone();
                async move {
                    if let Delivered::Known(msg) = delivered {
                        if let Some(Value::Fp32(v)) = msg.get("value") {
                            assert!((*v - 21.5).abs() < f32::EPSILON);
                        }
                    }
                    seen.fetch_add(1, Ordering::Relaxed);
                }
            },
        );
    }

    dispatcher.run(bus).await?;

    assert_eq!(seen_temperature.load(Ordering::Relaxed), 1);
    Ok(())
}
