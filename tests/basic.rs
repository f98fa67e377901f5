use std::time::Duration;

use stepmap::{Entry, StepMap, Value};

#[test]
fn test_insert_get_remove_string() {
    let mut m: StepMap<String, String> = StepMap::new();
    assert!(m.is_empty());

    // insert new
    let old = m.insert("a".to_string(), "1".to_string());
    assert!(old.is_none());
    assert_eq!(m.len(), 1);
    assert_eq!(m.get("a"), Some(&"1".to_string()));

    // insert another
    let _ = m.insert("b".to_string(), "2".to_string());
    assert_eq!(m.len(), 2);

    // update existing
    let old = m.insert("a".to_string(), "10".to_string());
    assert_eq!(old, Some("1".to_string()));
    assert_eq!(m.get("a"), Some(&"10".to_string()));

    // remove existing
    let old = m.remove("b");
    assert_eq!(old, Some("2".to_string()));
    assert_eq!(m.len(), 1);
    assert_eq!(m.get("b"), None);
}

#[test]
fn test_grow_and_shrink_lifecycle() {
    let mut m: StepMap<u64, u64> = StepMap::new();
    for i in 0..1000 {
        m.insert(i, i * 2);
    }
    assert_eq!(m.len(), 1000);
    while m.rehash(100) {}
    assert!(m.buckets() >= 1000);

    for i in 0..1000 {
        assert_eq!(m.get(&i), Some(&(i * 2)));
    }

    for i in 100..1000 {
        assert_eq!(m.remove(&i), Some(i * 2));
    }
    while m.rehash(100) {}
    assert_eq!(m.len(), 100);
    // The table shrank back towards the live count.
    assert!(m.buckets() <= 256);
    for i in 0..100 {
        assert_eq!(m.get(&i), Some(&(i * 2)));
    }
}

#[test]
fn test_explicit_rehash_control() {
    let mut m: StepMap<u64, u64> = StepMap::new();
    for i in 0..500 {
        m.insert(i, i);
    }
    while m.rehash(100) {}
    assert!(m.rehashing_info().is_none());

    let buckets = m.buckets();
    assert!(m.expand(buckets * 2));
    let (from, to) = m.rehashing_info().unwrap();
    assert_eq!(from, buckets);
    assert_eq!(to, buckets * 2);

    let steps = m.rehash_for(Duration::from_millis(100));
    assert!(steps > 0);
    assert!(!m.is_rehashing());
    assert_eq!(m.len(), 500);
}

#[test]
fn test_pause_rehash_keeps_lookups_correct() {
    let mut m: StepMap<u64, u64> = StepMap::new();
    for i in 0..=4 {
        m.insert(i, i);
    }
    assert!(m.is_rehashing());
    m.pause_rehash();
    for i in 5..100 {
        m.insert(i, i);
    }
    for i in 0..100 {
        assert_eq!(m.get(&i), Some(&i));
    }
    m.resume_rehash();
    while m.rehash(100) {}
    assert_eq!(m.len(), 100);
}

#[test]
fn test_entry_api_surface() {
    let mut m: StepMap<String, u64> = StepMap::new();
    *m.entry("hits".to_string()).or_insert(0) += 1;
    *m.entry("hits".to_string()).or_insert(0) += 1;
    assert_eq!(m.get("hits"), Some(&2));

    match m.entry("hits".to_string()) {
        Entry::Occupied(entry) => {
            assert_eq!(entry.remove(), 2);
        }
        Entry::Vacant(_) => panic!("expected occupied"),
    }
    assert!(m.is_empty());
}

#[test]
fn test_compact_key_set() {
    let mut s: StepMap<u64, ()> = StepMap::new().compact_keys();
    for i in 0..100 {
        assert!(s.try_insert(i, ()).is_ok());
    }
    assert!(s.try_insert(5, ()).is_err());
    assert_eq!(s.len(), 100);
    for i in 0..100 {
        assert!(s.contains_key(&i));
    }
    for i in 0..50 {
        assert!(s.remove(&i).is_some());
    }
    assert_eq!(s.len(), 50);
}

#[test]
fn test_counter_values() {
    let mut m: StepMap<String, Value<String>> = StepMap::new();
    m.insert("n".to_string(), Value::Int(10));
    assert_eq!(m.incr_int("n", 5), Some(15));
    assert_eq!(m.get("n").unwrap().as_int(), 15);

    m.insert("name".to_string(), Value::Ptr("primary".to_string()));
    assert_eq!(m.get("name").unwrap().as_ptr(), "primary");
}

#[test]
fn test_scan_collects_whole_map() {
    let mut m: StepMap<u64, u64> = StepMap::new();
    for i in 0..777 {
        m.insert(i, i);
    }
    let mut seen = std::collections::HashSet::new();
    let mut cursor = 0;
    loop {
        cursor = m.scan(cursor, |k, _| {
            seen.insert(*k);
        });
        if cursor == 0 {
            break;
        }
    }
    assert_eq!(seen.len(), 777);
}

#[test]
fn test_iteration_and_observation() {
    let mut m: StepMap<u64, u64> = StepMap::new();
    for i in 0..50 {
        m.insert(i, 1);
    }
    let total: u64 = m.values().sum();
    assert_eq!(total, 50);
    assert_eq!(m.keys().count(), 50);

    let stats = m.stats(true);
    let used = stats.main.used + stats.rehashing.as_ref().map_or(0, |t| t.used);
    assert_eq!(used, 50);

    assert!(m.mem_usage() > 0);
    let fp = m.fingerprint();
    assert_eq!(fp, m.fingerprint());

    let drained: Vec<(u64, u64)> = m.into_iter().collect();
    assert_eq!(drained.len(), 50);
}

#[test]
fn test_retain_and_clear() {
    let mut m: StepMap<u64, u64> = StepMap::new();
    for i in 0..200 {
        m.insert(i, i);
    }
    m.retain(|k, _| k % 4 == 0);
    assert_eq!(m.len(), 50);
    m.clear();
    assert!(m.is_empty());
    m.insert(1, 1);
    assert_eq!(m.len(), 1);
}
