#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// The failure and result types used by fallible allocation paths.
pub mod failure;

/// A hash map facade over the flat table.
///
/// This module provides a `FlatMap` that wraps the `FlatTable` and provides
/// a standard key-value map interface with configurable hashers.
pub mod flat_map;

/// The core flat hash table: contiguous slot storage and the Robin Hood
/// probing and displacement engine.
pub mod flat_table;

pub use failure::Failure;
pub use flat_map::FlatMap;
pub use flat_table::FlatTable;

/// The default hash builder for [`FlatMap`], available with the `foldhash`
/// feature.
///
/// Fast and well-distributed, but not hardened against hash flooding; supply
/// a keyed hasher builder instead when that matters.
#[cfg(feature = "foldhash")]
pub type DefaultHashBuilder = foldhash::fast::RandomState;
