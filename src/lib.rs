// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Portal Controller - Captive Portal Trust & Admission Service
//!
//! Decides whether a network client may pass traffic and which role and
//! profile it receives, and authenticates the portal edge to the controller
//! with signed requests.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `trust` - HMAC request signing, key sets, bearer tokens
//! - `decision` - role rules, policy resolution, strategy selection
//! - `strategies` - `pap`, `token` and `sms` authenticators
//! - `store` - TTL backend and session store
//! - `runtime` - policy export for enforcement points
//! - `audit` - signed audit events

pub mod api;
pub mod audit;
pub mod config;
pub mod decision;
pub mod error;
pub mod models;
pub mod runtime;
pub mod state;
pub mod store;
pub mod strategies;
pub mod trust;

#[cfg(test)]
pub mod testing;
