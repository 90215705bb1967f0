// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! VM registry.
//!
//! Engine callbacks only receive the native VM pointer. The registry maps
//! that pointer back to the host-side state of the VM. An entry exists from
//! the end of [`crate::Vm::new`] until the native VM has been freed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use wren_embed_sys::ffi::{WrenReallocateFn, WrenVM};

use crate::config::Callbacks;
use crate::error::Error;
use crate::trampoline::TrampolineId;

/// `(module, binding key)` of a foreign method or class
pub(crate) type BindingKey = (String, String);

/// Host-side state of one VM
pub(crate) struct VmEntry {
    pub callbacks: Callbacks,
    /// The engine's allocator, for strings the engine frees
    pub reallocate: Option<WrenReallocateFn>,
    /// Foreign method `(module, method_key)` to trampoline
    pub methods: RwLock<HashMap<BindingKey, TrampolineId>>,
    /// Foreign class `(module, class)` to allocator trampoline
    pub classes: RwLock<HashMap<BindingKey, TrampolineId>>,
    pub live_handles: AtomicUsize,
    /// Set when the `Vm` was dropped while handles were alive; the last
    /// handle frees the native VM.
    pub orphaned: AtomicBool,
    /// Depth of foreign methods and allocators currently running
    foreign_depth: AtomicUsize,
    poisoned: Mutex<Option<(String, String)>>,
    compile_error: Mutex<Option<String>>,
    runtime_error: Mutex<Option<String>>,
}

impl VmEntry {
    pub fn new(callbacks: Callbacks, reallocate: Option<WrenReallocateFn>) -> Self {
        Self {
            callbacks,
            reallocate,
            methods: RwLock::new(HashMap::new()),
            classes: RwLock::new(HashMap::new()),
            live_handles: AtomicUsize::new(0),
            orphaned: AtomicBool::new(false),
            foreign_depth: AtomicUsize::new(0),
            poisoned: Mutex::new(None),
            compile_error: Mutex::new(None),
            runtime_error: Mutex::new(None),
        }
    }

    /// Marks a foreign call as running until the guard drops.
    pub fn enter_foreign(&self) -> ForeignCall<'_> {
        self.foreign_depth.fetch_add(1, Ordering::AcqRel);
        ForeignCall(self)
    }

    /// Returns true while a foreign method or allocator of this VM runs.
    pub fn in_foreign_call(&self) -> bool {
        self.foreign_depth.load(Ordering::Acquire) > 0
    }

    /// Marks the VM unusable after a foreign class could not be bound.
    pub fn poison(&self, module: &str, class: &str) {
        let mut poisoned = self.poisoned.lock();
        if poisoned.is_none() {
            *poisoned = Some((module.to_string(), class.to_string()));
        }
    }

    /// The error every call returns once the VM is poisoned.
    pub fn poison_error(&self) -> Option<Error> {
        self.poisoned
            .lock()
            .as_ref()
            .map(|(module, class)| Error::UnboundForeignClass {
                module: module.clone(),
                class: class.clone(),
            })
    }

    pub fn clear_errors(&self) {
        *self.compile_error.lock() = None;
        *self.runtime_error.lock() = None;
    }

    /// Keeps the first compile error of the current call.
    pub fn record_compile_error(&self, message: String) {
        self.compile_error.lock().get_or_insert(message);
    }

    /// Keeps the first runtime error of the current call.
    pub fn record_runtime_error(&self, message: String) {
        self.runtime_error.lock().get_or_insert(message);
    }

    pub fn take_compile_error(&self) -> String {
        self.compile_error.lock().take().unwrap_or_default()
    }

    /// The runtime error of the current call. Falls back to the compile
    /// error when the engine reported none.
    pub fn take_runtime_error(&self) -> String {
        let runtime = self.runtime_error.lock().take();
        runtime.unwrap_or_else(|| self.take_compile_error())
    }

    pub fn handle_count(&self) -> usize {
        self.live_handles.load(Ordering::Acquire)
    }
}

/// Running foreign call; see [`VmEntry::enter_foreign`]
pub(crate) struct ForeignCall<'a>(&'a VmEntry);

impl Drop for ForeignCall<'_> {
    fn drop(&mut self) {
        self.0.foreign_depth.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Process-shared map from native VM pointers to their host state
#[derive(Default)]
pub struct VmRegistry {
    entries: RwLock<HashMap<usize, Arc<VmEntry>>>,
}

fn key(native: *mut WrenVM) -> usize {
    native as usize
}

impl VmRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    /// If `native` is already registered.
    pub(crate) fn register(&self, native: *mut WrenVM, entry: Arc<VmEntry>) {
        let previous = self.entries.write().insert(key(native), entry);
        if previous.is_some() {
            tracing::error!(vm = ?native, "VM registered twice");
            panic!("VM {:p} is already registered", native);
        }
        tracing::debug!(vm = ?native, "registered VM");
    }

    /// # Panics
    /// If `native` is not registered: a callback arrived for a VM that was
    /// not created by this bridge or was already freed.
    pub(crate) fn lookup(&self, native: *mut WrenVM) -> Arc<VmEntry> {
        match self.entries.read().get(&key(native)) {
            Some(entry) => entry.clone(),
            None => {
                tracing::error!(vm = ?native, "callback for unregistered VM");
                panic!("no registered VM at {:p}", native);
            }
        }
    }

    /// # Panics
    /// If `native` is not registered.
    pub(crate) fn unregister(&self, native: *mut WrenVM) {
        if self.entries.write().remove(&key(native)).is_none() {
            panic!("VM {:p} unregistered twice", native);
        }
        tracing::debug!(vm = ?native, "unregistered VM");
    }

    /// Returns true if `native` is a live VM of this registry
    pub fn contains(&self, native: *mut WrenVM) -> bool {
        self.entries.read().contains_key(&key(native))
    }

    /// Number of live VMs
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no VM is registered
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake(addr: usize) -> *mut WrenVM {
        addr as *mut WrenVM
    }

    #[test]
    fn test_register_lookup_unregister() {
        let registry = VmRegistry::new();
        let entry = Arc::new(VmEntry::new(Callbacks::default(), None));
        registry.register(fake(0x1000), entry.clone());

        assert!(registry.contains(fake(0x1000)));
        assert!(Arc::ptr_eq(&registry.lookup(fake(0x1000)), &entry));
        assert_eq!(registry.len(), 1);

        registry.unregister(fake(0x1000));
        assert!(registry.is_empty());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_double_register_panics() {
        let registry = VmRegistry::new();
        registry.register(fake(0x2000), Arc::new(VmEntry::new(Callbacks::default(), None)));
        registry.register(fake(0x2000), Arc::new(VmEntry::new(Callbacks::default(), None)));
    }

    #[test]
    #[should_panic(expected = "no registered VM")]
    fn test_lookup_missing_panics() {
        VmRegistry::new().lookup(fake(0x3000));
    }

    #[test]
    #[should_panic(expected = "unregistered twice")]
    fn test_double_unregister_panics() {
        let registry = VmRegistry::new();
        registry.register(fake(0x4000), Arc::new(VmEntry::new(Callbacks::default(), None)));
        registry.unregister(fake(0x4000));
        registry.unregister(fake(0x4000));
    }

    #[test]
    fn test_poison_keeps_first_class() {
        let entry = VmEntry::new(Callbacks::default(), None);
        assert!(entry.poison_error().is_none());
        entry.poison("main", "Ghost");
        entry.poison("main", "Other");
        assert!(matches!(
            entry.poison_error(),
            Some(Error::UnboundForeignClass { class, .. }) if class == "Ghost"
        ));
    }

    #[test]
    fn test_errors_keep_first_message() {
        let entry = VmEntry::new(Callbacks::default(), None);
        entry.record_compile_error("first".into());
        entry.record_compile_error("second".into());
        assert_eq!(entry.take_compile_error(), "first");
        assert_eq!(entry.take_compile_error(), "");
    }

    #[test]
    fn test_runtime_error_preferred_over_compile_error() {
        let entry = VmEntry::new(Callbacks::default(), None);
        entry.record_compile_error("[lib line 1] Error at 'x'".into());
        entry.record_runtime_error("Could not compile module 'lib'.".into());
        assert_eq!(entry.take_runtime_error(), "Could not compile module 'lib'.");

        entry.clear_errors();
        entry.record_compile_error("only".into());
        assert_eq!(entry.take_runtime_error(), "only");
    }

    #[test]
    fn test_foreign_call_depth() {
        let entry = VmEntry::new(Callbacks::default(), None);
        assert!(!entry.in_foreign_call());
        {
            let _outer = entry.enter_foreign();
            let _inner = entry.enter_foreign();
            assert!(entry.in_foreign_call());
        }
        assert!(!entry.in_foreign_call());
    }
}
