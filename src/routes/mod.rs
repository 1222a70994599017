// ABOUTME: Route group modules, one struct per resource per the teacher's routes/tenants.rs convention
// ABOUTME: Each group exposes a `routes() -> Router<AppState>`; app::build_router merges them and attaches state once
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

pub mod admin;
pub mod auth;
pub mod cells;
pub mod secure;
