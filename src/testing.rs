//! In-memory store and connector for unit tests.
//!
//! `FakeStore` answers the read-only commands the sampler sends, with knobs
//! for the failure modes a real deployment produces: keys expiring between
//! SCAN and lookup, failing size lookups, slow or dying nodes, nodes that
//! were never reachable.

use crate::config::NodeAddr;
use crate::connection::{Connector, Session};
use crate::error::ClientError;
use crate::protocol::{Command, RespValue};
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// `MEMORY USAGE` answer for keys without an explicit size.
const DEFAULT_MEMORY: u64 = 128;

#[derive(Debug, Clone)]
enum FakeValue {
    String(Bytes),
    Hash(Vec<(Bytes, Bytes)>),
    List(Vec<Bytes>),
    Set(Vec<Bytes>),
    Zset(Vec<(Bytes, f64)>),
    Stream(u64),
    Module(&'static str),
}

#[derive(Debug, Clone)]
pub(crate) struct FakeKey {
    value: FakeValue,
    ttl_ms: Option<u64>,
    idle_sec: Option<u64>,
    memory: Option<u64>,
    broken_size: bool,
    vanished: bool,
}

fn bytes(items: &[&str]) -> Vec<Bytes> {
    items.iter().map(|s| Bytes::from(s.to_string())).collect()
}

impl FakeKey {
    fn of(value: FakeValue) -> Self {
        Self {
            value,
            ttl_ms: None,
            idle_sec: Some(0),
            memory: None,
            broken_size: false,
            vanished: false,
        }
    }

    pub fn string(value: &str) -> Self {
        Self::of(FakeValue::String(Bytes::from(value.to_string())))
    }

    pub fn hash(pairs: &[(&str, &str)]) -> Self {
        Self::of(FakeValue::Hash(
            pairs
                .iter()
                .map(|(f, v)| (Bytes::from(f.to_string()), Bytes::from(v.to_string())))
                .collect(),
        ))
    }

    pub fn list(items: &[&str]) -> Self {
        Self::of(FakeValue::List(bytes(items)))
    }

    pub fn set(members: &[&str]) -> Self {
        Self::of(FakeValue::Set(bytes(members)))
    }

    pub fn zset(members: &[(&str, f64)]) -> Self {
        Self::of(FakeValue::Zset(
            members
                .iter()
                .map(|(m, s)| (Bytes::from(m.to_string()), *s))
                .collect(),
        ))
    }

    pub fn stream(entries: u64) -> Self {
        Self::of(FakeValue::Stream(entries))
    }

    pub fn module(type_name: &'static str) -> Self {
        Self::of(FakeValue::Module(type_name))
    }

    pub fn with_ttl(mut self, ms: u64) -> Self {
        self.ttl_ms = Some(ms);
        self
    }

    pub fn with_idle(mut self, secs: u64) -> Self {
        self.idle_sec = Some(secs);
        self
    }

    /// `OBJECT IDLETIME` answers with an error, as under an LFU policy.
    pub fn without_idle(mut self) -> Self {
        self.idle_sec = None;
        self
    }

    pub fn with_memory(mut self, bytes: u64) -> Self {
        self.memory = Some(bytes);
        self
    }

    /// Every size lookup for this key fails.
    pub fn broken_size(mut self) -> Self {
        self.broken_size = true;
        self
    }

    /// Returned by SCAN but gone by the time it is looked up.
    pub fn vanished(mut self) -> Self {
        self.vanished = true;
        self
    }

    fn type_name(&self) -> &'static str {
        match &self.value {
            FakeValue::String(_) => "string",
            FakeValue::Hash(_) => "hash",
            FakeValue::List(_) => "list",
            FakeValue::Set(_) => "set",
            FakeValue::Zset(_) => "zset",
            FakeValue::Stream(_) => "stream",
            FakeValue::Module(name) => name,
        }
    }

    fn len(&self) -> u64 {
        match &self.value {
            FakeValue::String(v) => v.len() as u64,
            FakeValue::Hash(pairs) => pairs.len() as u64,
            FakeValue::List(items) | FakeValue::Set(items) => items.len() as u64,
            FakeValue::Zset(members) => members.len() as u64,
            FakeValue::Stream(n) => *n,
            FakeValue::Module(_) => 0,
        }
    }

    /// Elements as they appear on the wire, one `Vec` per element.
    fn elements(&self) -> Vec<Vec<Bytes>> {
        match &self.value {
            FakeValue::Hash(pairs) => pairs
                .iter()
                .map(|(f, v)| vec![f.clone(), v.clone()])
                .collect(),
            FakeValue::List(items) | FakeValue::Set(items) => {
                items.iter().map(|i| vec![i.clone()]).collect()
            }
            FakeValue::Zset(members) => members
                .iter()
                .map(|(m, s)| vec![m.clone(), Bytes::from(s.to_string())])
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeStore {
    dbs: BTreeMap<u32, BTreeMap<Bytes, FakeKey>>,
    no_memory_usage: bool,
    cluster_nodes: Option<String>,
    masters: HashMap<String, NodeAddr>,
    latency: Option<Duration>,
    fail_scan_after: Option<usize>,
    break_on: Option<&'static str>,
    repeating_scan: bool,
}

fn flat(items: impl IntoIterator<Item = Bytes>) -> RespValue {
    RespValue::array(items.into_iter().map(RespValue::BulkString).collect())
}

fn arg_usize(args: &[Bytes], index: usize) -> Option<usize> {
    std::str::from_utf8(args.get(index)?).ok()?.parse().ok()
}

fn glob_match(pattern: &[u8], key: &[u8]) -> bool {
    match pattern.strip_suffix(b"*") {
        Some(prefix) => key.starts_with(prefix),
        None => pattern == key,
    }
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `MEMORY USAGE` with "unknown command".
    pub fn without_memory_usage(mut self) -> Self {
        self.no_memory_usage = true;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_cluster_nodes(mut self, text: &str) -> Self {
        self.cluster_nodes = Some(text.to_string());
        self
    }

    pub fn with_master(mut self, name: &str, addr: NodeAddr) -> Self {
        self.masters.insert(name.to_string(), addr);
        self
    }

    /// The session breaks on the SCAN call after `n` successful ones.
    pub fn fail_scan_after(mut self, n: usize) -> Self {
        self.fail_scan_after = Some(n);
        self
    }

    /// The session breaks on any pipeline carrying `command`.
    pub fn break_on(mut self, command: &'static str) -> Self {
        self.break_on = Some(command);
        self
    }

    /// Consecutive SCAN pages overlap by one key.
    pub fn with_repeating_scan(mut self) -> Self {
        self.repeating_scan = true;
        self
    }

    pub fn insert(&mut self, db: u32, key: &str, value: FakeKey) -> &mut Self {
        self.dbs
            .entry(db)
            .or_default()
            .insert(Bytes::from(key.to_string()), value);
        self
    }

    pub fn shared(self) -> SharedStore {
        SharedStore(Arc::new(Shared {
            store: self,
            calls: Mutex::new(HashMap::new()),
            round_trips: AtomicUsize::new(0),
        }))
    }

    fn lookup(&self, db: u32, key: Option<&Bytes>) -> Option<&FakeKey> {
        self.dbs
            .get(&db)?
            .get(key?)
            .filter(|k| !k.vanished)
    }

    fn execute(&self, db: u32, command: &Command) -> RespValue {
        let args = command.args();
        let name = command.name().to_ascii_uppercase();
        match name.as_str() {
            "DBSIZE" => RespValue::integer(self.dbs.get(&db).map_or(0, |keys| keys.len()) as i64),
            "SCAN" => self.scan(db, args),
            "TYPE" => RespValue::simple_string(
                self.lookup(db, args.get(1)).map_or("none", FakeKey::type_name),
            ),
            "PTTL" => match self.lookup(db, args.get(1)) {
                None => RespValue::integer(-2),
                Some(key) => RespValue::integer(key.ttl_ms.map_or(-1, |ms| ms as i64)),
            },
            "OBJECT" => match self.lookup(db, args.get(2)) {
                None => RespValue::Null,
                Some(key) => match key.idle_sec {
                    Some(secs) => RespValue::integer(secs as i64),
                    None => RespValue::error(
                        "ERR An LFU maxmemory policy is selected, idle time not tracked.",
                    ),
                },
            },
            "MEMORY" if self.no_memory_usage => {
                RespValue::error("ERR unknown command 'MEMORY', with args beginning with: 'USAGE'")
            }
            "MEMORY" => match self.lookup(db, args.get(2)) {
                None => RespValue::Null,
                Some(key) if key.broken_size => RespValue::error("ERR injected failure"),
                Some(key) => RespValue::integer(key.memory.unwrap_or(DEFAULT_MEMORY) as i64),
            },
            "STRLEN" | "HLEN" | "LLEN" | "SCARD" | "ZCARD" | "XLEN" => {
                match self.lookup(db, args.get(1)) {
                    None => RespValue::integer(0),
                    Some(key) if key.broken_size => RespValue::error("ERR injected failure"),
                    Some(key) => RespValue::integer(key.len() as i64),
                }
            }
            "HSCAN" | "SSCAN" => {
                let count = arg_usize(args, 4).unwrap_or(10);
                let items: Vec<Bytes> = self
                    .lookup(db, args.get(1))
                    .map(|key| key.elements().into_iter().take(count).flatten().collect())
                    .unwrap_or_default();
                RespValue::array(vec![RespValue::bulk_string("0"), flat(items)])
            }
            "LRANGE" | "ZRANGE" => {
                let stop = arg_usize(args, 3).unwrap_or(0);
                let items: Vec<Bytes> = self
                    .lookup(db, args.get(1))
                    .map(|key| key.elements().into_iter().take(stop + 1).flatten().collect())
                    .unwrap_or_default();
                flat(items)
            }
            "CLUSTER" => match &self.cluster_nodes {
                Some(text) => RespValue::bulk_string(text.clone()),
                None => RespValue::error("ERR This instance has cluster support disabled"),
            },
            "SENTINEL" => {
                let name = args
                    .get(2)
                    .map(|n| String::from_utf8_lossy(n).into_owned())
                    .unwrap_or_default();
                match self.masters.get(&name) {
                    Some(addr) => RespValue::array(vec![
                        RespValue::bulk_string(addr.host.clone()),
                        RespValue::bulk_string(addr.port.to_string()),
                    ]),
                    None => RespValue::Null,
                }
            }
            "QUIT" => RespValue::simple_string("OK"),
            _ => RespValue::error(format!("ERR unknown command '{}'", name)),
        }
    }

    fn scan(&self, db: u32, args: &[Bytes]) -> RespValue {
        let cursor = arg_usize(args, 1).unwrap_or(0);
        let mut count = 10;
        let mut pattern: Option<&Bytes> = None;
        let mut i = 2;
        while i + 1 < args.len() {
            match args[i].to_ascii_uppercase().as_slice() {
                b"COUNT" => count = arg_usize(args, i + 1).unwrap_or(10),
                b"MATCH" => pattern = Some(&args[i + 1]),
                _ => {}
            }
            i += 2;
        }

        let all: Vec<&Bytes> = self
            .dbs
            .get(&db)
            .map(|keys| keys.keys().collect())
            .unwrap_or_default();
        let end = (cursor + count).min(all.len());
        let page: Vec<Bytes> = all
            .get(cursor..end)
            .unwrap_or_default()
            .iter()
            .filter(|k| pattern.map_or(true, |p| glob_match(p, k)))
            .map(|k| (*k).clone())
            .collect();

        let next = if end >= all.len() {
            0
        } else if self.repeating_scan && end - cursor > 1 {
            end - 1
        } else {
            end
        };
        RespValue::array(vec![
            RespValue::bulk_string(next.to_string()),
            flat(page),
        ])
    }
}

struct Shared {
    store: FakeStore,
    calls: Mutex<HashMap<String, usize>>,
    round_trips: AtomicUsize,
}

#[derive(Clone)]
pub(crate) struct SharedStore(Arc<Shared>);

impl SharedStore {
    pub fn session(&self, db: u32) -> FakeSession {
        FakeSession {
            store: self.clone(),
            db,
            scans: 0,
        }
    }

    /// Times a command was executed, across all sessions.
    pub fn calls(&self, name: &str) -> usize {
        let calls = self.0.calls.lock().unwrap();
        calls.get(name).copied().unwrap_or(0)
    }

    pub fn round_trips(&self) -> usize {
        self.0.round_trips.load(Ordering::Relaxed)
    }
}

pub(crate) struct FakeSession {
    store: SharedStore,
    db: u32,
    scans: usize,
}

impl Session for FakeSession {
    async fn pipeline(&mut self, commands: &[Command]) -> Result<Vec<RespValue>, ClientError> {
        let shared = Arc::clone(&self.store.0);
        if let Some(latency) = shared.store.latency {
            tokio::time::sleep(latency).await;
        }
        shared.round_trips.fetch_add(1, Ordering::Relaxed);

        let mut replies = Vec::with_capacity(commands.len());
        for command in commands {
            let name = command.name().to_ascii_uppercase();
            if shared.store.break_on == Some(name.as_str()) {
                return Err(ClientError::ConnectionClosed);
            }
            if name == "SCAN" {
                self.scans += 1;
                if shared.store.fail_scan_after.is_some_and(|n| self.scans > n) {
                    return Err(ClientError::ConnectionClosed);
                }
            }
            *shared.calls.lock().unwrap().entry(name).or_insert(0) += 1;
            replies.push(shared.store.execute(self.db, command));
        }
        Ok(replies)
    }

    async fn close(self) {}
}

/// Routes sessions to in-memory nodes. Addresses without a node refuse
/// connections.
#[derive(Default)]
pub(crate) struct FakeConnector {
    nodes: HashMap<NodeAddr, SharedStore>,
    opened: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, addr: &str, store: SharedStore) -> Self {
        let addr = addr.parse().expect("test address");
        self.nodes.insert(addr, store);
        self
    }

    /// Sessions opened so far, successful or not.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn open(&self, node: &NodeAddr, db: u32) -> Result<FakeSession, ClientError> {
        self.opened.fetch_add(1, Ordering::Relaxed);
        match self.nodes.get(node) {
            Some(store) => Ok(store.session(db)),
            None => Err(ClientError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        }
    }
}
