//! Integration tests for the cache module
//!
//! These tests verify the cache through its public API:
//! - Question normalization
//! - Store idempotence
//! - TTL boundaries
//! - Retention limits
//! - Statistics arithmetic

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use manualbot_core::cache::{fingerprint, CacheConfig, CacheStore, ManualClock, SourceRef};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DAY: i64 = 86_400;

fn open_cache(dir: &TempDir, max_entries: usize) -> (CacheStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
    ));
    let config = CacheConfig::builder()
        .cache_dir(dir.path().join("cache"))
        .ttl(Duration::from_secs(DAY as u64))
        .max_entries(max_entries)
        .build();
    let cache = CacheStore::with_clock(config, clock.clone()).unwrap();
    (cache, clock)
}

#[test]
fn test_normalized_questions_share_an_entry() {
    let dir = TempDir::new().unwrap();
    let (cache, _) = open_cache(&dir, 100);

    cache
        .store(
            "  VRRP Setup  ",
            "Use the vrrp command.",
            vec![SourceRef::new("manual.pdf", Some(3), "vrrp 1 ip 10.0.0.1...")],
        )
        .unwrap();

    let entry = cache.lookup("vrrp setup").expect("normalized question should hit");
    assert_eq!(entry.answer, "Use the vrrp command.");
    assert_eq!(entry.cache_key, fingerprint("VRRP SETUP"));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_store_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (cache, _) = open_cache(&dir, 100);

    for _ in 0..3 {
        cache.store("show ip route", "Displays the routing table.", vec![]).unwrap();
    }

    assert_eq!(cache.stats().entry_count, 1);
    assert_eq!(
        cache.lookup("show ip route").unwrap().answer,
        "Displays the routing table."
    );
}

#[test]
fn test_later_store_replaces_answer() {
    let dir = TempDir::new().unwrap();
    let (cache, _) = open_cache(&dir, 100);

    cache.store("What is STP?", "old", vec![]).unwrap();
    cache.store("what is stp?", "new", vec![]).unwrap();

    let entry = cache.lookup("WHAT IS STP?").unwrap();
    assert_eq!(entry.answer, "new");
    assert_eq!(entry.question, "what is stp?");
}

#[test]
fn test_entry_alive_just_before_ttl() {
    let dir = TempDir::new().unwrap();
    let (cache, clock) = open_cache(&dir, 100);

    cache.store("ttl question", "answer", vec![]).unwrap();
    clock.advance(ChronoDuration::seconds(DAY - 1));

    assert!(cache.lookup("ttl question").is_some());
    assert_eq!(cache.stats().entry_count, 1);
}

#[test]
fn test_entry_expires_just_after_ttl() {
    let dir = TempDir::new().unwrap();
    let (cache, clock) = open_cache(&dir, 100);

    cache.store("ttl question", "answer", vec![]).unwrap();
    clock.advance(ChronoDuration::seconds(DAY + 1));

    assert!(cache.lookup("ttl question").is_none());

    let stats = cache.stats();
    assert_eq!(stats.entry_count, 0);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 0);
}

#[test]
fn test_retention_keeps_most_recent_writes() {
    let dir = TempDir::new().unwrap();
    let limit = 10;
    let (cache, clock) = open_cache(&dir, limit);

    for i in 0..(limit + 5) {
        cache.store(&format!("question {}", i), "answer", vec![]).unwrap();
        clock.advance(ChronoDuration::seconds(1));
    }

    assert_eq!(cache.stats().entry_count, limit);
    for i in 0..5 {
        assert!(!cache.contains(&format!("question {}", i)), "question {} should be evicted", i);
    }
    for i in 5..(limit + 5) {
        assert!(cache.contains(&format!("question {}", i)), "question {} should remain", i);
    }
}

#[test]
fn test_hit_rate_arithmetic() {
    let dir = TempDir::new().unwrap();
    let (cache, _) = open_cache(&dir, 100);

    cache.store("known", "answer", vec![]).unwrap();
    cache.lookup("known");
    cache.lookup("known");
    cache.lookup("known");
    cache.lookup("unknown");

    let stats = cache.stats();
    assert_eq!(stats.total_requests, 4);
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hit_rate_percent, 75.0);
}

#[test]
fn test_hit_rate_with_inexact_ratio() {
    let dir = TempDir::new().unwrap();
    let (cache, _) = open_cache(&dir, 100);

    cache.store("known", "answer", vec![]).unwrap();
    cache.lookup("known");
    cache.lookup("unknown one");
    cache.lookup("unknown two");

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.hit_rate_percent, 100.0 * 1.0 / 3.0);
}

#[test]
fn test_empty_cache_stats() {
    let dir = TempDir::new().unwrap();
    let (cache, _) = open_cache(&dir, 100);

    let stats = cache.stats();
    assert_eq!(stats.total_requests, 0);
    assert_eq!(stats.hit_rate_percent, 0.0);
    assert_eq!(stats.entry_count, 0);
    assert_eq!(stats.size_mb(), 0.0);
}

#[test]
fn test_entries_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let (cache, _) = open_cache(&dir, 100);
        cache.store("persisted", "still here", vec![]).unwrap();
    }

    let (reopened, _) = open_cache(&dir, 100);
    assert_eq!(reopened.lookup("persisted").unwrap().answer, "still here");
    // Counters are per instance
    assert_eq!(reopened.stats().total_requests, 1);
}

#[test]
fn test_clear_all_then_store() {
    let dir = TempDir::new().unwrap();
    let (cache, _) = open_cache(&dir, 100);

    cache.store("a", "1", vec![]).unwrap();
    cache.store("b", "2", vec![]).unwrap();
    assert_eq!(cache.clear_all().unwrap(), 2);
    assert!(cache.lookup("a").is_none());

    cache.store("a", "3", vec![]).unwrap();
    assert_eq!(cache.lookup("a").unwrap().answer, "3");
}
