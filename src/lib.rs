// Copyright 2026 Pagewatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pagewatch library — change detection and baseline reconciliation for
//! watched pages.
//!
//! The core is a pure change detector and a one-shot reconciler over
//! three capability seams: an observation source, a baseline store, and
//! a notifier. Concrete providers (headless Chromium, HTTP + CSS
//! selectors, file store, webhook) live behind those seams and are
//! replaceable.

pub mod config;
pub mod detect;
pub mod notify;
pub mod observation;
pub mod reconcile;
pub mod source;
pub mod store;
