// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # wren-embed-bridge
//!
//! Drives Wren VMs from Rust through the engine's C embedding API, declared
//! in `wren-embed-sys`.
//!
//! ## Features
//!
//! - **Slots**: typed access to the VM's per-call value frame ([`VmContext`])
//! - **Handles**: values pinned across calls, and reusable call handles
//! - **Foreign methods and classes**: Rust closures bound through
//!   build-time generated trampolines
//! - **Callbacks**: write, error, module resolution and loading, and
//!   fallback foreign binding, dispatched per VM through a shared registry
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use wren_embed_bridge::{Configuration, Vm};
//!
//! let output = Arc::new(Mutex::new(String::new()));
//! let sink = output.clone();
//! let vm = Vm::new(Configuration::new().with_write(move |text| sink.lock().push_str(text)));
//!
//! vm.bind_method("Math", true, "twice(_)", |ctx| {
//!     let n = ctx.get_number(1)?;
//!     ctx.set_number(0, n * 2.0)
//! })
//! .unwrap();
//!
//! vm.interpret("main", r#"
//! class Math {
//!   foreign static twice(n)
//! }
//! System.print(Math.twice(21))
//! "#)
//! .unwrap();
//! assert_eq!(*output.lock(), "42\n");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod config;
mod dispatch;
pub mod error;
pub mod foreign;
pub mod handle;
pub mod registry;
pub mod slots;
pub mod trampoline;
pub mod vm;

pub use bridge::Bridge;
pub use config::{
    Callbacks, Configuration, ErrorKind, InterpretResult, default_bind_foreign_class,
    default_bind_foreign_method, default_error, default_write, format_error,
};
pub use error::{Error, Result};
pub use foreign::ForeignObject;
pub use handle::Handle;
pub use slots::{SlotType, VmContext};
pub use trampoline::{ForeignAllocator, ForeignMethod, TRAMPOLINE_CAPACITY, TrampolineId};
pub use vm::{Vm, method_key};

/// Module that foreign bindings are accepted from
pub const DEFAULT_MODULE: &str = "main";

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version number of the engine's embedding API
pub fn engine_version() -> i32 {
    wren_embed_sys::ffi::wren_get_version_number()
}
