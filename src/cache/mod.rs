// ABOUTME: Query-result cache facade: layered storage, pattern-learned preload hints, disk persistence
// ABOUTME: Wraps liquid::LiquidCache and patterns::PatternTracker behind the single type routes/app code depends on
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

pub mod liquid;
pub mod patterns;

pub use liquid::{CacheStats, LiquidCache, LiquidCacheConfig};
