// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Trampoline tables.
//!
//! The engine binds foreign methods and allocators as plain `extern "C"`
//! function pointers, which cannot carry a closure. `build.rs` generates
//! [`TRAMPOLINE_CAPACITY`] stubs per table, each a monomorphization of
//! [`method_stub`] or [`class_stub`] with its index baked in. Registering a
//! closure stores it at the next free index and hands out that index's
//! stub; when the engine calls the stub, it forwards to the closure.
//!
//! Indices are never reused. The last index of a table stays reserved, so a
//! table of capacity `N` accepts `N - 1` closures and the `N`th
//! registration fails with [`Error::CapacityExceeded`]. Rebuild with a
//! larger `WREN_EMBED_TRAMPOLINES` to raise the limit.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use wren_embed_sys::ffi::{WrenForeignMethodFn, WrenVM};

use crate::dispatch;
use crate::error::{Error, Result};
use crate::foreign::ForeignObject;
use crate::slots::VmContext;

// The generated tables name `WrenForeignMethodFn`, `method_stub` and
// `class_stub`, which must stay in scope here.
include!(concat!(env!("OUT_DIR"), "/trampolines.rs"));

/// Host closure behind a foreign method.
///
/// Arguments are in slots 1.., the receiver in slot 0. The return value is
/// whatever slot 0 holds afterwards. An `Err` aborts the calling fiber.
pub type ForeignMethod = dyn Fn(&VmContext<'_>) -> Result<()> + Send + Sync;

/// Host closure that creates the object behind a foreign class instance.
/// Constructor arguments are in slots 1...
pub type ForeignAllocator = dyn Fn(&VmContext<'_>) -> Result<ForeignObject> + Send + Sync;

/// Index of a stub in a trampoline table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrampolineId(usize);

impl TrampolineId {
    /// Position in the table
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TrampolineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) unsafe extern "C" fn method_stub<const ID: usize>(vm: *mut WrenVM) {
    // SAFETY: the engine only calls stubs with a live VM.
    unsafe { dispatch::foreign_method(vm, TrampolineId(ID)) }
}

pub(crate) unsafe extern "C" fn class_stub<const ID: usize>(vm: *mut WrenVM) {
    // SAFETY: the engine only calls stubs with a live VM.
    unsafe { dispatch::foreign_allocate(vm, TrampolineId(ID)) }
}

/// A fixed-size table of stubs and the closures registered behind them
pub struct TrampolineTable<F: ?Sized> {
    name: &'static str,
    stubs: &'static [WrenForeignMethodFn],
    limit: usize,
    closures: RwLock<Vec<Arc<F>>>,
}

impl<F: ?Sized> TrampolineTable<F> {
    pub(crate) fn new(name: &'static str, stubs: &'static [WrenForeignMethodFn], limit: usize) -> Self {
        Self {
            name,
            stubs,
            limit: limit.min(stubs.len()),
            closures: RwLock::new(Vec::new()),
        }
    }

    /// Stores `closure` at the next free index.
    ///
    /// Returns the stub to hand to the engine and its index. Fails on the
    /// `capacity()`th attempt.
    pub fn register(&self, closure: Arc<F>) -> Result<(WrenForeignMethodFn, TrampolineId)> {
        let mut closures = self.closures.write();
        let index = closures.len();
        if index + 1 >= self.limit {
            tracing::warn!(table = self.name, capacity = self.limit, "trampoline table full");
            return Err(Error::CapacityExceeded {
                capacity: self.limit,
            });
        }
        closures.push(closure);
        tracing::debug!(table = self.name, index, "registered trampoline");
        Ok((self.stubs[index], TrampolineId(index)))
    }

    pub(crate) fn get(&self, id: TrampolineId) -> Option<Arc<F>> {
        self.closures.read().get(id.0).cloned()
    }

    pub(crate) fn stub(&self, id: TrampolineId) -> WrenForeignMethodFn {
        self.stubs[id.0]
    }

    /// Number of registered closures
    pub fn len(&self) -> usize {
        self.closures.read().len()
    }

    /// Returns true if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.closures.read().is_empty()
    }

    /// Number of stubs in the table; one less can be registered
    pub fn capacity(&self) -> usize {
        self.limit
    }
}

impl<F: ?Sized> fmt::Debug for TrampolineTable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrampolineTable")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("capacity", &self.limit)
            .finish()
    }
}
