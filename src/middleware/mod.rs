// ABOUTME: Request-scoped extractors shared by the route handlers
// ABOUTME: Currently just bearer-token authentication; see auth.rs
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

pub mod auth;

pub use auth::AuthenticatedUser;
