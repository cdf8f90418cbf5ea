//! Bridge tests against an in-process fake engine.
//!
//! # Test Strategy
//!
//! 1. **Handshake**: version checks at session open
//! 2. **Identity**: one live proxy per remote id
//! 3. **Reclaim**: exactly one release per unreachable proxy
//! 4. **Dispatch**: fault mapping, case rewrite, adapters, set materialization
//! 5. **Close**: no transport traffic after close

use parking_lot::Mutex;
use serde_json::{json, Value as Json};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use umi_core::{
    Adapter, AdapterFactory, Binder, BridgeConfig, BridgeError, Proxy, RemoteId, Session,
    TypedAdapter, Value,
};
use umi_wire::{Fault, MemoryTransport};

const SET_CLASS: &str = "java.util.HashSet";
const BINDER_CLASS: &str = "net.sergeych.tools.Binder";

#[derive(Clone, Default)]
struct Obj {
    class: String,
    entries: Vec<(String, Json)>,
    items: Vec<Json>,
}

/// Minimal engine: creates objects, answers a handful of methods and
/// records every release.
#[derive(Default)]
struct FakeEngine {
    next_id: AtomicI64,
    objects: Mutex<HashMap<i64, Obj>>,
    released: Mutex<Vec<i64>>,
    system: Mutex<Option<String>>,
}

fn record(id: i64, class: &str) -> Json {
    json!({"__type": "RemoteObject", "id": id, "className": class})
}

fn no_such_method(method: &str) -> Fault {
    Fault::Remote {
        class: "NoSuchMethodException".into(),
        message: method.into(),
    }
}

impl FakeEngine {
    fn handle(&self, cmd: &str, args: &[Json]) -> Result<Json, Fault> {
        match cmd {
            "version" => {
                let system = self.system.lock().clone().unwrap_or_else(|| "UMI".into());
                Ok(json!({"system": system, "version": "0.8.21"}))
            }
            "instantiate" => {
                let class = args[0].as_str().unwrap_or_default();
                Ok(self.create(Obj {
                    class: class.into(),
                    ..Obj::default()
                }))
            }
            "invoke" => {
                let method = args[1].as_str().unwrap_or_default();
                match &args[0] {
                    Json::String(class) => self.invoke_static(class, method, &args[2..]),
                    target => self.invoke(target.as_i64().unwrap_or(-1), method, &args[2..]),
                }
            }
            "drop_objects" => {
                let id = args[0].as_i64().unwrap_or(-1);
                self.objects.lock().remove(&id);
                self.released.lock().push(id);
                Ok(Json::Null)
            }
            other => Err(no_such_method(other)),
        }
    }

    fn create(&self, obj: Obj) -> Json {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let class = obj.class.clone();
        self.objects.lock().insert(id, obj);
        record(id, &class)
    }

    fn invoke_static(&self, class: &str, method: &str, args: &[Json]) -> Result<Json, Fault> {
        match (class, method) {
            (BINDER_CLASS, "of") => {
                let entries = args
                    .chunks(2)
                    .map(|kv| (kv[0].as_str().unwrap_or_default().to_string(), kv[1].clone()))
                    .collect();
                Ok(self.create(Obj {
                    class: class.into(),
                    entries,
                    ..Obj::default()
                }))
            }
            ("Registry", "lookup") => {
                let id = args[0].as_i64().unwrap_or(-1);
                let class = self
                    .objects
                    .lock()
                    .get(&id)
                    .map(|o| o.class.clone())
                    .unwrap_or_else(|| "Thing".into());
                Ok(record(id, &class))
            }
            _ => Err(no_such_method(method)),
        }
    }

    fn invoke(&self, id: i64, method: &str, args: &[Json]) -> Result<Json, Fault> {
        let obj = self.objects.lock().get(&id).cloned().ok_or_else(|| Fault::Remote {
            class: "IllegalArgumentException".into(),
            message: format!("no object {id}"),
        })?;
        match method {
            "self" => Ok(record(id, &obj.class)),
            "toString" => Ok(json!(format!("{}#{id}", obj.class))),
            "getName" => Ok(json!("fake")),
            "echo" => Ok(Json::Array(args.to_vec())),
            "equals" => Ok(json!(args[0]["id"] == json!(id))),
            "get" => {
                let key = args[0].as_str().unwrap_or_default();
                Ok(obj
                    .entries
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Json::Null))
            }
            "size" => Ok(json!(obj.entries.len())),
            "keySet" => {
                let items = obj.entries.iter().map(|(k, _)| json!(k)).collect();
                Ok(self.create(Obj {
                    class: SET_CLASS.into(),
                    items,
                    ..Obj::default()
                }))
            }
            "toArray" => Ok(Json::Array(obj.items)),
            "fail" => Err(Fault::Remote {
                class: "IllegalStateException".into(),
                message: "requested failure".into(),
            }),
            "crash" => Err(Fault::Io("broken pipe".into())),
            other => Err(no_such_method(other)),
        }
    }

    fn releases_of(&self, id: i64) -> usize {
        self.released.lock().iter().filter(|r| **r == id).count()
    }
}

fn start() -> (Arc<FakeEngine>, Arc<MemoryTransport>, Session) {
    start_with(AdapterFactory::new())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn start_with(adapters: AdapterFactory) -> (Arc<FakeEngine>, Arc<MemoryTransport>, Session) {
    init_tracing();
    let engine = Arc::new(FakeEngine::default());
    let served = Arc::clone(&engine);
    let transport = Arc::new(MemoryTransport::new(move |cmd, args| served.handle(cmd, args)));
    let session = Session::open(transport.clone(), &BridgeConfig::default(), adapters)
        .expect("session opens");
    (engine, transport, session)
}

fn new_thing(session: &Session) -> Proxy {
    session
        .instantiate("Thing", vec![])
        .unwrap()
        .as_proxy()
        .cloned()
        .unwrap()
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// ============================================================================
// Handshake
// ============================================================================

#[test]
fn test_session_reports_engine_version() {
    let (_, _, session) = start();
    assert_eq!(session.version(), "0.8.21");
    assert_eq!(session.version_info().system, "UMI");
}

#[test]
fn test_unexpected_system_aborts_startup() {
    let engine = Arc::new(FakeEngine::default());
    *engine.system.lock() = Some("NOT-UMI".into());
    let served = Arc::clone(&engine);
    let transport = Arc::new(MemoryTransport::new(move |cmd, args| served.handle(cmd, args)));

    let err = Session::open(transport.clone(), &BridgeConfig::default(), AdapterFactory::new())
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnsupportedSystem(_)));
    assert!(transport.is_closed());
}

#[test]
fn test_unsupported_version_aborts_startup() {
    let engine = Arc::new(FakeEngine::default());
    let served = Arc::clone(&engine);
    let transport = Arc::new(MemoryTransport::new(move |cmd, args| served.handle(cmd, args)));
    let config = BridgeConfig::default().with_version_prefix(Some("0.9.".into()));

    let err = Session::open(transport, &config, AdapterFactory::new()).unwrap_err();
    assert!(matches!(err, BridgeError::UnsupportedVersion(_)));
}

// ============================================================================
// Identity
// ============================================================================

#[test]
fn test_same_remote_object_is_same_proxy() {
    let (_, _, session) = start();
    let thing = new_thing(&session);

    let again = thing.call("self", vec![]).unwrap();
    let again = again.as_proxy().unwrap();
    assert!(Proxy::same_instance(&thing, again));
    assert_eq!(&thing, again);
    assert!(thing.remote_equals(again).unwrap());

    let found = session.find_by_remote_id(thing.remote_id()).unwrap();
    assert!(Proxy::same_instance(&thing, &found));
}

#[test]
fn test_identity_holds_across_threads() {
    let (_, _, session) = start();
    let thing = new_thing(&session);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let thing = thing.clone();
            thread::spawn(move || {
                (0..20)
                    .map(|_| thing.call("self", vec![]).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    for handle in handles {
        for value in handle.join().unwrap() {
            assert!(Proxy::same_instance(&thing, value.as_proxy().unwrap()));
        }
    }
}

#[test]
fn test_recreated_proxy_equals_by_remote_id() {
    let (engine, _, session) = start();
    let first = new_thing(&session);
    let id = first.remote_id();
    let lookup = |s: &Session| {
        s.invoke_static("Registry", "lookup", vec![Value::from(id.0)])
            .unwrap()
            .as_proxy()
            .cloned()
            .unwrap()
    };

    let second = lookup(&session);
    assert!(Proxy::same_instance(&first, &second));
    drop(first);
    drop(second);
    assert!(wait_for(|| engine.releases_of(id.0) == 1));
    assert!(session.find_by_remote_id(id).is_none());

    let recreated = lookup(&session);
    let recreated_again = lookup(&session);
    assert_eq!(recreated.remote_id(), id);
    assert!(Proxy::same_instance(&recreated, &recreated_again));
}

// ============================================================================
// Reclaim
// ============================================================================

#[test]
fn test_unreachable_proxy_is_released_exactly_once() {
    let (engine, _, session) = start();
    let thing = new_thing(&session);
    let id = thing.remote_id().0;
    let clone = thing.clone();

    drop(thing);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(engine.releases_of(id), 0, "still reachable through a clone");

    drop(clone);
    assert!(wait_for(|| engine.releases_of(id) == 1));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(engine.releases_of(id), 1);
    assert_eq!(session.live_proxies(), 0);
}

#[test]
fn test_many_proxies_released_once_each() {
    let (engine, _, session) = start();
    let ids: Vec<i64> = (0..50)
        .map(|_| new_thing(&session).remote_id().0)
        .collect();
    assert!(wait_for(|| engine.released.lock().len() >= ids.len()));
    for id in ids {
        assert_eq!(engine.releases_of(id), 1, "remote object {id}");
    }
}

// ============================================================================
// Dispatch
// ============================================================================

#[test]
fn test_remote_faults_are_mapped() {
    let (_, _, session) = start();
    let thing = new_thing(&session);

    let missing = thing.call("not_there", vec![]).unwrap_err();
    assert!(matches!(missing, BridgeError::NoSuchMethod { .. }));
    assert!(missing.is_remote_fault());

    let failed = thing.call("fail", vec![]).unwrap_err();
    assert_eq!(failed.remote_class(), Some("IllegalStateException"));
    assert!(!session.is_closed());
}

#[test]
fn test_method_names_are_camelized_but_keys_are_not() {
    let (_, transport, session) = start();
    let thing = new_thing(&session);

    assert_eq!(thing.call("get_name", vec![]).unwrap(), Value::from("fake"));

    let mut arg = BTreeMap::new();
    arg.insert("snake_key".to_string(), Value::from(1));
    let echoed = thing.call("echo", vec![Value::Map(arg.clone())]).unwrap();
    assert_eq!(echoed, Value::Array(vec![Value::Map(arg)]));

    let calls = transport.calls();
    let invoked: Vec<_> = calls
        .iter()
        .filter(|c| c.command == "invoke")
        .map(|c| c.args[1].clone())
        .collect();
    assert_eq!(invoked, vec![json!("getName"), json!("echo")]);
}

#[test]
fn test_rich_values_cross_the_bridge() {
    let (_, _, session) = start();
    let thing = new_thing(&session);
    let now = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let args = vec![
        Value::Binary(vec![1, 2, 3]),
        Value::Time(now),
        Value::from(thing.clone()),
    ];
    let echoed = thing.call("echo", args.clone()).unwrap();
    assert_eq!(echoed, Value::Array(args));
}

#[test]
fn test_typed_adapter_and_set_materialization() {
    assert_eq!(Binder::REMOTE_CLASS, BINDER_CLASS);
    let adapters = AdapterFactory::new().with::<Binder>().unwrap();
    let (_, _, session) = start_with(adapters);

    let mut src = BTreeMap::new();
    src.insert("hello".to_string(), Value::from("world"));
    src.insert("foo".to_string(), Value::from(101));
    let binder = Binder::of(&session, &src).unwrap();

    assert_eq!(binder.get("hello").unwrap(), Value::from("world"));
    assert_eq!(binder.get("missing").unwrap(), Value::Null);
    assert_eq!(binder.size().unwrap(), 2);
    let mut keys = binder.keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["foo", "hello"]);
    assert_eq!(binder.to_map().unwrap(), src);

    // the factory built a Binder for the decoded reference
    let again = binder.proxy().call("self", vec![]).unwrap();
    assert!(again.downcast_ref::<Binder>().is_some());
}

#[test]
fn test_unknown_class_passes_through_as_proxy() {
    let adapters = AdapterFactory::new().with::<Binder>().unwrap();
    let (_, _, session) = start_with(adapters);
    let value = session.instantiate("Thing", vec![]).unwrap();
    assert!(value.downcast_ref::<Binder>().is_none());
    assert!(value.downcast_ref::<Proxy>().is_some());
}

#[test]
fn test_handles_cannot_cross_sessions() {
    let (_, _, first) = start();
    let (_, _, second) = start();
    let foreign = new_thing(&first);
    let local = new_thing(&second);

    let err = local.call("echo", vec![Value::from(foreign.clone())]).unwrap_err();
    assert_eq!(err, BridgeError::Interchange);
    assert_eq!(
        second.invoke(&foreign, "toString", vec![]).unwrap_err(),
        BridgeError::Interchange
    );
}

#[test]
fn test_trace_mode_nests() {
    let (_, _, session) = start();
    let thing = new_thing(&session);
    let name = session.with_trace(|| {
        session.with_trace(|| thing.call("toString", vec![]).unwrap())
    });
    assert!(name.as_str().unwrap().starts_with("Thing#"));
}

// ============================================================================
// Close
// ============================================================================

#[test]
fn test_no_calls_after_close() {
    let (engine, transport, session) = start();
    let thing = new_thing(&session);
    session.close();

    let served = transport.calls().len();
    assert_eq!(
        session.instantiate("Thing", vec![]).unwrap_err(),
        BridgeError::SessionClosed
    );
    assert_eq!(thing.call("toString", vec![]).unwrap_err(), BridgeError::SessionClosed);

    let id = thing.remote_id().0;
    drop(thing);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(transport.calls().len(), served);
    assert_eq!(engine.releases_of(id), 0);
}

#[test]
fn test_transport_failure_is_fatal() {
    let (_, transport, session) = start();
    let thing = new_thing(&session);

    assert_eq!(thing.call("crash", vec![]).unwrap_err(), BridgeError::SessionClosed);
    assert!(session.is_closed());
    let served = transport.calls().len();
    assert_eq!(thing.call("self", vec![]).unwrap_err(), BridgeError::SessionClosed);
    assert_eq!(transport.calls().len(), served);
}

#[test]
fn test_find_by_remote_id_does_not_call_engine() -> anyhow::Result<()> {
    let (_, transport, session) = start();
    let served = transport.calls().len();
    assert!(session.find_by_remote_id(RemoteId(999)).is_none());
    assert_eq!(transport.calls().len(), served);
    Ok(())
}
