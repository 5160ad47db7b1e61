//! # Response Cache
//!
//! On-disk cache of generated answers, keyed by the normalized question.
//!
//! ## Features
//!
//! - **Content-addressed**: file name is the SHA-256 of the trimmed, lower-cased question
//! - **Lazy TTL expiry**: expired entries are removed when a lookup finds them
//! - **Bounded retention**: at most `max_entries` files, oldest writes evicted first
//! - **Self-healing**: corrupt files are deleted and counted as misses
//! - **Accounting**: hit/miss/request counters and a hit rate
//!
//! ## Example
//!
//! ```no_run
//! use manualbot_core::cache::{CacheConfig, CacheStore, SourceRef};
//! use std::time::Duration;
//!
//! # fn example() -> manualbot_core::Result<()> {
//! let config = CacheConfig::builder()
//!     .cache_dir("./data/cache")
//!     .ttl(Duration::from_secs(24 * 3600))
//!     .max_entries(1_000)
//!     .build();
//!
//! let cache = CacheStore::new(config)?;
//!
//! cache.store(
//!     "How do I enable OSPF?",
//!     "Enter `router ospf 1` in global configuration mode.",
//!     vec![SourceRef::new("ios-routing.pdf", Some(42), "router ospf process-id ...")],
//! )?;
//!
//! if let Some(entry) = cache.lookup("  how do I enable ospf? ") {
//!     println!("Cache hit: {}", entry.answer);
//! }
//! println!("{}", cache.stats());
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod entry;
pub mod key;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::{CacheEntry, SourceRef};
pub use key::{fingerprint, normalize_question};
pub use store::CacheStore;
pub use types::{hit_rate, CacheCounters, CacheKey, CacheStats};
