//! Reconciliation integration tests.
//!
//! The engine is driven with hand-written `ProxyApi` and `DockerClient`
//! mocks; no network access is needed.
//!
//! # Test Structure
//!
//! - `helpers/` -- mock proxy API, static docker client, container factories
//! - `scenarios/` -- engine behaviour and full pipeline lifecycle
//!
//! # Running
//!
//! ```bash
//! cargo test -p labelsync-reconciler --test reconcile
//! ```
