//! Optimized allocation and collection types for Lodestone.
//!
//! Re-exports hash collections backed by AHash, which is measurably faster
//! than SipHash for the short string and `TypeId` keys the engine uses.

pub use ahash::{AHashMap as HashMap, AHashSet as HashSet, RandomState};
