// ABOUTME: Crate root: module wiring for the cells key-value service library
// ABOUTME: Binaries in src/bin/ consume app::build_state / app::build_router from here
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![deny(unsafe_code)]

pub mod app;
pub mod auth;
pub mod authz;
pub mod cache;
pub mod catalog;
pub mod cell_store;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod errors;
pub mod events;
pub mod logging;
pub mod middleware;
pub mod query;
pub mod retry;
pub mod routes;
pub mod value;
