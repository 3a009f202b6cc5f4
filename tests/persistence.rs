use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex,
    },
    thread,
    time::Duration,
};

use rand::Rng;

use featureflags::{
    Error, ExperimentDefinition, FlagValue, InMemoryStore, JsonFileStore, KeyValueStore,
    ResolverConfig, Result, UserContext, Variant,
};

fn layout(grid: u32, list: u32) -> ExperimentDefinition {
    ExperimentDefinition::new(
        "layout",
        vec![
            Variant::new("A", grid, "grid"),
            Variant::new("B", list, "list"),
        ],
    )
}

fn users(count: usize) -> Vec<UserContext> {
    (0..count)
        .map(|i| UserContext::for_user(format!("user-{i}")))
        .collect()
}

/// Store whose writes wait until the test opens the gate.
#[derive(Default)]
struct GatedStore {
    inner: InMemoryStore,
    gate: Mutex<()>,
}

impl KeyValueStore for GatedStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _open = self.gate.lock().unwrap();
        self.inner.set(key, value)
    }
}

/// Store that is down.
struct UnreachableStore;

impl KeyValueStore for UnreachableStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(Error::storage("connection refused"))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(Error::storage("connection refused"))
    }
}

/// Store whose reads time out while `reads_failing` is set. Writes always go through.
#[derive(Default)]
struct ReadTimeoutStore {
    inner: InMemoryStore,
    reads_failing: AtomicBool,
}

impl KeyValueStore for ReadTimeoutStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        if self.reads_failing.load(Ordering::SeqCst) {
            return Err(Error::storage("read timed out"));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set(key, value)
    }
}

fn stored_assignments(store: &dyn KeyValueStore, user_id: &str) -> HashMap<String, FlagValue> {
    let raw = store
        .get(&format!("@feature_flags_assignments:{user_id}"))
        .unwrap()
        .unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn single_variant(key: &str, name: &str, value: &str) -> ExperimentDefinition {
    ExperimentDefinition::new(key, vec![Variant::new(name, 100, value)])
}

#[test]
fn read_outage_does_not_lose_stored_assignments() {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Arc::new(ReadTimeoutStore::default());
    let user = UserContext::for_user("u1");

    let resolver = ResolverConfig::new(store.clone()).to_resolver().unwrap();
    resolver
        .register_experiment(single_variant("old", "A", "a"))
        .unwrap();
    assert_eq!(resolver.evaluate("old", &user), "a".into());
    resolver.shutdown().unwrap();

    let restarted = ResolverConfig::new(store.clone()).to_resolver().unwrap();
    restarted
        .register_experiment(single_variant("new", "X", "x"))
        .unwrap();
    store.reads_failing.store(true, Ordering::SeqCst);
    assert_eq!(restarted.evaluate("new", &user), "x".into());
    restarted.flush().unwrap();
    assert_eq!(
        stored_assignments(&store.inner, "u1"),
        [("old".to_owned(), FlagValue::from("a"))].into()
    );

    // New users would now get "b".
    store.reads_failing.store(false, Ordering::SeqCst);
    restarted
        .register_experiment(single_variant("old", "B", "b"))
        .unwrap();
    assert_eq!(restarted.evaluate("old", &user), "a".into());
    assert_eq!(restarted.evaluate("new", &user), "x".into());
    restarted.shutdown().unwrap();

    assert_eq!(
        stored_assignments(&store.inner, "u1"),
        [
            ("old".to_owned(), FlagValue::from("a")),
            ("new".to_owned(), FlagValue::from("x")),
        ]
        .into()
    );
}

#[test]
fn assignments_survive_restart_and_split_changes() {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Arc::new(InMemoryStore::new());
    let users = users(200);

    let resolver = ResolverConfig::new(store.clone()).to_resolver().unwrap();
    resolver.register_experiment(layout(50, 50)).unwrap();
    let before = users
        .iter()
        .map(|user| resolver.evaluate("layout", user))
        .collect::<Vec<_>>();
    resolver.shutdown().unwrap();

    // Everybody new would now get "grid".
    let restarted = ResolverConfig::new(store).to_resolver().unwrap();
    restarted.register_experiment(layout(100, 0)).unwrap();
    let after = users
        .iter()
        .map(|user| restarted.evaluate("layout", user))
        .collect::<Vec<_>>();

    assert_eq!(before, after);
    assert!(after.contains(&"list".into()));
    assert_eq!(
        restarted.evaluate("layout", &UserContext::for_user("newcomer")),
        "grid".into()
    );
}

#[test]
fn overrides_survive_restart() {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Arc::new(InMemoryStore::new());

    let resolver = ResolverConfig::new(store.clone()).to_resolver().unwrap();
    resolver
        .sync_overrides([("kill_switch".to_owned(), FlagValue::from(true))].into())
        .unwrap();
    resolver.shutdown().unwrap();

    let restarted = ResolverConfig::new(store).to_resolver().unwrap();
    assert!(restarted.is_enabled("kill_switch", &UserContext::anonymous()));
}

#[test]
fn json_file_store_survives_restart() {
    let _ = env_logger::builder().is_test(true).try_init();
    let suffix: u64 = rand::thread_rng().gen();
    let path = std::env::temp_dir().join(format!("featureflags-restart-{suffix:x}.json"));
    let user = UserContext::for_user("u1");

    let resolver = ResolverConfig::new(Arc::new(JsonFileStore::open(&path).unwrap()))
        .to_resolver()
        .unwrap();
    resolver.register_experiment(layout(50, 50)).unwrap();
    let value = resolver.evaluate("layout", &user);
    resolver.shutdown().unwrap();

    let restarted = ResolverConfig::new(Arc::new(JsonFileStore::open(&path).unwrap()))
        .to_resolver()
        .unwrap();
    restarted
        .register_experiment(if value == "grid".into() {
            layout(0, 100)
        } else {
            layout(100, 0)
        })
        .unwrap();
    assert_eq!(restarted.evaluate("layout", &user), value);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn custom_namespace_and_overrides_key() {
    let store = Arc::new(InMemoryStore::new());
    let resolver = ResolverConfig::new(store.clone())
        .with_assignments_namespace("app:assignments")
        .with_overrides_key("app:overrides")
        .to_resolver()
        .unwrap();
    resolver.register_experiment(layout(100, 0)).unwrap();

    resolver.evaluate("layout", &UserContext::for_user("u1"));
    resolver
        .sync_overrides([("beta".to_owned(), FlagValue::from(true))].into())
        .unwrap();
    resolver.flush().unwrap();

    let blob = store.get("app:assignments:u1").unwrap().unwrap();
    let blob: HashMap<String, FlagValue> = serde_json::from_str(&blob).unwrap();
    assert_eq!(blob.get("layout"), Some(&FlagValue::from("grid")));
    assert!(store.get("app:overrides").unwrap().is_some());
}

#[test]
fn slow_store_does_not_block_evaluation() {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Arc::new(GatedStore::default());
    let resolver = Arc::new(ResolverConfig::new(store.clone()).to_resolver().unwrap());
    resolver.register_experiment(layout(50, 50)).unwrap();

    let held = store.gate.lock().unwrap();

    let (done_sender, done_receiver) = mpsc::channel();
    let evaluating = {
        let resolver = resolver.clone();
        thread::spawn(move || {
            for user in users(50) {
                resolver.evaluate("layout", &user);
            }
            done_sender.send(()).unwrap();
        })
    };

    let finished = done_receiver.recv_timeout(Duration::from_secs(10));
    drop(held);
    evaluating.join().unwrap();
    assert!(finished.is_ok(), "evaluation waited for the store");

    resolver.flush().unwrap();
    assert!(store.inner.get("@feature_flags_assignments:user-0").unwrap().is_some());
}

#[test]
fn unreachable_store_still_evaluates() {
    let _ = env_logger::builder().is_test(true).try_init();
    let resolver = ResolverConfig::new(Arc::new(UnreachableStore))
        .to_resolver()
        .unwrap();
    resolver.register_experiment(layout(50, 50)).unwrap();

    for user in users(20) {
        let first = resolver.evaluate("layout", &user);
        assert_eq!(resolver.evaluate("layout", &user), first);
    }

    let result = resolver.sync_overrides([("beta".to_owned(), FlagValue::from(true))].into());
    assert!(matches!(result, Err(Error::StorageUnavailable(_))));
    assert!(resolver.is_enabled("beta", &UserContext::anonymous()));
}

#[test]
fn concurrent_evaluations_agree() {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Arc::new(InMemoryStore::new());
    let resolver = Arc::new(ResolverConfig::new(store.clone()).to_resolver().unwrap());
    resolver.register_experiment(layout(50, 50)).unwrap();

    let handles = (0..8)
        .map(|_| {
            let resolver = resolver.clone();
            thread::spawn(move || {
                users(300)
                    .iter()
                    .map(|user| resolver.evaluate("layout", user))
                    .collect::<Vec<_>>()
            })
        })
        .collect::<Vec<_>>();
    let results = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();

    for result in &results[1..] {
        assert_eq!(result, &results[0]);
    }

    resolver.flush().unwrap();
    for (user, value) in users(300).iter().zip(&results[0]) {
        let user_id = user.user_id.as_deref().unwrap();
        let raw = store
            .get(&format!("@feature_flags_assignments:{user_id}"))
            .unwrap()
            .unwrap();
        let blob: HashMap<String, FlagValue> = serde_json::from_str(&raw).unwrap();
        assert_eq!(blob.get("layout"), Some(value));
    }
}

#[test]
fn assignment_logger_runs_once_per_user_across_threads() {
    let _ = env_logger::builder().is_test(true).try_init();
    let logged = Arc::new(Mutex::new(Vec::new()));
    let sink = logged.clone();
    let resolver = Arc::new(
        ResolverConfig::in_memory()
            .with_assignment_logger(move |event: featureflags::AssignmentEvent| {
                sink.lock().unwrap().push(event.user_id)
            })
            .to_resolver()
            .unwrap(),
    );
    resolver.register_experiment(layout(50, 50)).unwrap();

    let handles = (0..4)
        .map(|_| {
            let resolver = resolver.clone();
            thread::spawn(move || {
                for user in users(100) {
                    resolver.evaluate("layout", &user);
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut logged = logged.lock().unwrap().clone();
    assert_eq!(logged.len(), 100);
    logged.sort();
    logged.dedup();
    assert_eq!(logged.len(), 100);
}
