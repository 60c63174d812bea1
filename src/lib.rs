// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! relayx - HTTP relay endpoint
//!
//! Callers describe an outbound request as JSON (method, url, headers,
//! authentication, certificates, timeouts); relayx executes it and hands
//! back status, headers and body.

pub mod config;
pub mod http;
pub mod server;
pub mod trc;
