//! Subscription dispatcher (C7): routes decoded frames to subscriber
//! callbacks filtered by message selector and by peer (`src`/`src_ent`),
//! plus periodic/call-once background tasks.
//!
//! Grounded in `original_source/src/pyimclsts/network.py`'s `subscriber`
//! class: `subscribe_async`/`periodic_async`/`call_once`/`_event_loop`/
//! `_validate_call` map directly onto [`Dispatcher::subscribe`]/
//! [`Dispatcher::periodic`]/[`Dispatcher::call_once`]/[`Dispatcher::run`]/
//! [`crate::peers::PeerRegistry::matches`]. The built-in subscriptions
//! installed at construction time there (`Abort` triggers shutdown,
//! `Announce`/`EntityList`/`EntityInfo` update the peer registry, a
//! periodic `EntityList(QUERY)` probes peers every 300s with one eager
//! call at 1s) are implemented here as dispatcher-internal hooks rather
//! than literal pre-registered `Subscription`s — functionally equivalent,
//! and they always run before user subscriptions matching the same
//! frame. This is recorded as an Open Question resolution in DESIGN.md.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::bus::{MessageBus, OutboundHandle};
use crate::codec::{decode, peek_ids, Decoded, EncodeOptions, Endianness};
use crate::error::ImcError;
use crate::hostaddr::default_src;
use crate::message::{Message, Value};
use crate::peers::PeerRegistry;
use crate::schema::Catalog;
use crate::transport::ByteTransport;

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// What a decoded frame is delivered to a callback as. Only `Selector::All`
/// subscriptions ever see [`Delivered::Unknown`].
#[derive(Clone)]
pub enum Delivered {
    Known(Message),
    Unknown(crate::codec::UnknownMessage),
}

/// Which messages a subscription wants.
pub enum Selector {
    Id(u16),
    Abbrev(String),
    Category(String),
    All,
}

type Callback = Arc<dyn Fn(Delivered, OutboundHandle) -> BoxFuture + Send + Sync>;
type PeriodicCallback = Arc<dyn Fn(OutboundHandle) -> BoxFuture + Send + Sync>;

struct Subscription {
    callback: Callback,
    src: Option<String>,
    src_ent: Option<String>,
}

impl Subscription {
    fn matches(&self, peers: &PeerRegistry, observed_src: u16, observed_src_ent: u8) -> bool {
        peers.matches(observed_src, observed_src_ent, &self.src, &self.src_ent)
    }
}

struct PeriodicTask {
    period: Duration,
    callback: PeriodicCallback,
}

struct CallOnceTask {
    delay: Option<Duration>,
    callback: PeriodicCallback,
}

/// Lets a caller stop a running [`Dispatcher::run`] loop from the
/// outside, mirroring `subscriber.stop()`.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

pub struct Dispatcher {
    catalog: Arc<Catalog>,
    by_id: HashMap<u16, Vec<Subscription>>,
    all: Vec<Subscription>,
    periodic: Vec<PeriodicTask>,
    call_once: Vec<CallOnceTask>,
    peers: PeerRegistry,
    running: Arc<AtomicBool>,
    builtin_ids: HashSet<u16>,
    local_src: u16,
}

impl Dispatcher {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        let builtin_ids: HashSet<u16> = ["Abort", "Announce", "EntityList", "EntityInfo"]
            .iter()
            .filter_map(|abbrev| catalog.by_abbrev(abbrev).map(|d| d.id))
            .collect();

        let mut dispatcher = Dispatcher {
            catalog,
            by_id: HashMap::new(),
            all: Vec::new(),
            periodic: Vec::new(),
            call_once: Vec::new(),
            peers: PeerRegistry::new(),
            running: Arc::new(AtomicBool::new(true)),
            builtin_ids,
            local_src: default_src(),
        };

        dispatcher.install_entity_list_probe();
        dispatcher
    }

    fn install_entity_list_probe(&mut self) {
        let Some(descriptor) = self.catalog.by_abbrev("EntityList").cloned() else {
            return;
        };
        let op_field = descriptor.fields.get("op").cloned();
        let query_value = op_field
            .as_ref()
            .and_then(|fd| fd.enum_def.as_ref())
            .and_then(|def| def.symbols.get("QUERY").copied())
            .unwrap_or(1);

        let catalog = self.catalog.clone();
        let make_query: Arc<dyn Fn() -> Option<Message> + Send + Sync> = Arc::new(move || {
            let mut msg = catalog.instantiate("EntityList")?;
            let _ = msg.set("op", Value::UInt8(query_value as u8));
            let _ = msg.set("list", Value::PlainText(String::new()));
            Some(msg)
        });

        let catalog_for_periodic = self.catalog.clone();
        let make_query_periodic = make_query.clone();
        self.periodic.push(PeriodicTask {
            period: Duration::from_secs(300),
            callback: Arc::new(move |handle| {
                let make_query_periodic = make_query_periodic.clone();
                let catalog = catalog_for_periodic.clone();
                Box::pin(async move {
                    if let Some(mut msg) = make_query_periodic() {
                        if let Ok(bytes) = crate::codec::encode(
                            &catalog,
                            &mut msg,
                            Endianness::Big,
                            EncodeOptions::default(),
                        ) {
                            handle.send_bytes(bytes);
                        }
                    }
                })
            }),
        });

        let catalog_for_once = self.catalog.clone();
        self.call_once.push(CallOnceTask {
            delay: Some(Duration::from_secs(1)),
            callback: Arc::new(move |handle| {
                let make_query = make_query.clone();
                let catalog = catalog_for_once.clone();
                Box::pin(async move {
                    if let Some(mut msg) = make_query() {
                        if let Ok(bytes) = crate::codec::encode(
                            &catalog,
                            &mut msg,
                            Endianness::Big,
                            EncodeOptions::default(),
                        ) {
                            handle.send_bytes(bytes);
                        }
                    }
                })
            }),
        });
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.running.clone())
    }

    pub fn subscribe<F, Fut>(&mut self, selector: Selector, src: Option<&str>, src_ent: Option<&str>, callback: F)
    where
        F: Fn(Delivered, OutboundHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cb: Callback = Arc::new(move |msg, handle| Box::pin(callback(msg, handle)));
        let sub = |cb: Callback| Subscription {
            callback: cb,
            src: src.map(String::from),
            src_ent: src_ent.map(String::from),
        };
        match selector {
            Selector::All => self.all.push(sub(cb)),
            Selector::Id(id) => self.by_id.entry(id).or_default().push(sub(cb)),
            Selector::Abbrev(name) => {
                if let Some(id) = self.catalog.by_abbrev(&name).map(|d| d.id) {
                    self.by_id.entry(id).or_default().push(sub(cb));
                } else {
                    warn!(message = %name, "subscribed to an abbrev absent from the catalog");
                }
            }
            Selector::Category(name) => {
                if let Some(ids) = self.catalog.categories.get(&name).cloned() {
                    for id in ids {
                        self.by_id.entry(id).or_default().push(sub(cb.clone()));
                    }
                } else {
                    warn!(category = %name, "subscribed to a category absent from the catalog");
                }
            }
        }
    }

    pub fn periodic<F, Fut>(&mut self, period: Duration, callback: F)
    where
        F: Fn(OutboundHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.periodic.push(PeriodicTask {
            period,
            callback: Arc::new(move |h| Box::pin(callback(h))),
        });
    }

    pub fn call_once<F, Fut>(&mut self, delay: Option<Duration>, callback: F)
    where
        F: Fn(OutboundHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.call_once.push(CallOnceTask {
            delay,
            callback: Arc::new(move |h| Box::pin(callback(h))),
        });
    }

    /// Consumes the dispatcher and the bus, running the dispatch loop
    /// until stopped, the transport reaches EOF, or an `Abort` addressed
    /// to this runtime's own `src` arrives.
    pub async fn run(mut self, mut bus: MessageBus) -> Result<(), ImcError> {
        let handle = bus.sender();

        for task in self.call_once.drain(..) {
            let cb = task.callback.clone();
            let h = handle.clone();
            match task.delay {
                Some(delay) => {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        cb(h).await;
                    });
                }
                None => {
                    tokio::spawn(async move {
                        cb(h).await;
                    });
                }
            }
        }

        let mut periodic_handles = Vec::new();
        for task in self.periodic.drain(..) {
            let cb = task.callback.clone();
            let h = handle.clone();
            let period = task.period;
            periodic_handles.push(tokio::spawn(async move {
                loop {
                    tokio::time::sleep(period).await;
                    cb(h.clone()).await;
                }
            }));
        }

        let abort_id = self.catalog.by_abbrev("Abort").map(|d| d.id);
        let announce_id = self.catalog.by_abbrev("Announce").map(|d| d.id);
        let entity_list_id = self.catalog.by_abbrev("EntityList").map(|d| d.id);
        let entity_info_id = self.catalog.by_abbrev("EntityInfo").map(|d| d.id);

        while self.running.load(Ordering::Relaxed) {
            let Some(frame) = bus.recv().await else { break };
            if frame.is_empty() {
                debug!("transport reached end of stream, stopping dispatch loop");
                break;
            }

            let Some((mgid, src, src_ent)) = peek_ids(&frame, self.catalog.sync_word) else {
                continue;
            };

            let per_id_indices: Vec<usize> = self
                .by_id
                .get(&mgid)
                .map(|subs| {
                    subs.iter()
                        .enumerate()
                        .filter(|(_, s)| s.matches(&self.peers, src, src_ent))
                        .map(|(i, _)| i)
                        .collect()
                })
                .unwrap_or_default();
            let all_indices: Vec<usize> = self
                .all
                .iter()
                .enumerate()
                .filter(|(_, s)| s.matches(&self.peers, src, src_ent))
                .map(|(i, _)| i)
                .collect();

            let needs_decode =
                !per_id_indices.is_empty() || !all_indices.is_empty() || self.builtin_ids.contains(&mgid);
            if !needs_decode {
                continue;
            }

            match decode(&self.catalog, &frame, true) {
                Ok(Decoded::Known(msg)) => {
                    if Some(mgid) == announce_id {
                        if let Some(Value::PlainText(name)) = msg.get("sys_name") {
                            self.peers.observe_announce(name, src);
                        }
                    } else if Some(mgid) == entity_list_id {
                        if let (Some(Value::UInt8(0)), Some(Value::PlainText(list))) =
                            (msg.get("op"), msg.get("list"))
                        {
                            self.peers.observe_entity_list_report(src, list);
                        }
                    } else if Some(mgid) == entity_info_id {
                        if let (Some(Value::UInt8(id)), Some(Value::PlainText(label))) =
                            (msg.get("id"), msg.get("label"))
                        {
                            self.peers.observe_entity_info(src, label, *id);
                        }
                    } else if Some(mgid) == abort_id && msg.header.map(|h| h.dst) == Some(self.local_src) {
                        self.running.store(false, Ordering::Relaxed);
                    }

                    if let Some(subs) = self.by_id.get(&mgid) {
                        for &i in &per_id_indices {
                            (subs[i].callback)(Delivered::Known(msg.clone()), handle.clone()).await;
                        }
                    }
                    for &i in &all_indices {
                        (self.all[i].callback)(Delivered::Known(msg.clone()), handle.clone()).await;
                    }
                }
                Ok(Decoded::Unknown(u)) => {
                    for &i in &all_indices {
                        (self.all[i].callback)(Delivered::Unknown(u.clone()), handle.clone()).await;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "dropping frame that failed to decode after framer accepted it");
                }
            }
        }

        for h in periodic_handles {
            h.abort();
        }
        bus.shutdown().await;
        Ok(())
    }
}

/// Connects to `transport`, prints every `Announce`/`EntityList` it
/// observes until both have been seen once or `timeout` elapses, then
/// returns. The Rust analogue of
/// `original_source/src/pyimclsts/network.py::print_information`.
pub async fn print_information(
    catalog: Arc<Catalog>,
    transport: Box<dyn ByteTransport>,
    timeout: Duration,
) -> Result<(), ImcError> {
    let bus = MessageBus::spawn(transport, catalog.sync_word).await?;
    let mut dispatcher = Dispatcher::new(catalog);
    let seen_announce = Arc::new(AtomicBool::new(false));
    let seen_entity_list = Arc::new(AtomicBool::new(false));

    {
        let seen = seen_announce.clone();
        dispatcher.subscribe(Selector::Abbrev("Announce".to_string()), None, None, move |msg, _| {
            let seen = seen.clone();
            async move {
                if let Delivered::Known(m) = msg {
                    tracing::info!(header = ?m.header, "Announce received");
                }
                seen.store(true, Ordering::Relaxed);
            }
        });
    }
    {
        let seen = seen_entity_list.clone();
        dispatcher.subscribe(Selector::Abbrev("EntityList".to_string()), None, None, move |msg, _| {
            let seen = seen.clone();
            async move {
                if let Delivered::Known(m) = msg {
                    tracing::info!(header = ?m.header, "EntityList received");
                }
                seen.store(true, Ordering::Relaxed);
            }
        });
    }

    let stop = dispatcher.stop_handle();
    let seen_a = seen_announce.clone();
    let seen_e = seen_entity_list.clone();
    let watchdog = tokio::spawn(async move {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if seen_a.load(Ordering::Relaxed) && seen_e.load(Ordering::Relaxed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        stop.stop();
    });

    dispatcher.run(bus).await?;
    watchdog.abort();
    Ok(())
}
