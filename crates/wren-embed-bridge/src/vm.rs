// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! VM lifecycle

use std::ffi::{CString, c_void};
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::Arc;

use wren_embed_sys::ffi::{
    self as wren, WrenConfiguration, WrenInterpretResult, WrenLoadModuleFn, WrenResolveModuleFn,
    WrenVM,
};

use crate::DEFAULT_MODULE;
use crate::bridge::Bridge;
use crate::config::Configuration;
use crate::dispatch;
use crate::error::{Error, Result};
use crate::foreign::ForeignObject;
use crate::registry::VmEntry;
use crate::slots::VmContext;
use crate::trampoline::TrampolineId;

/// Binding key of a foreign method: `[static ]Class.signature`
pub fn method_key(class: &str, is_static: bool, signature: &str) -> String {
    format!("{}{}.{}", if is_static { "static " } else { "" }, class, signature)
}

/// Runs an engine call, mapping its result and the errors reported during
/// it.
///
/// The engine cannot be re-entered from a foreign method, so calls made
/// while one runs fail with [`Error::ForeignReentry`].
pub(crate) fn run_checked(entry: &VmEntry, call: impl FnOnce() -> WrenInterpretResult) -> Result<()> {
    if let Some(err) = entry.poison_error() {
        return Err(err);
    }
    if entry.in_foreign_call() {
        return Err(Error::ForeignReentry);
    }
    entry.clear_errors();
    let result = call();
    if let Some(err) = entry.poison_error() {
        return Err(err);
    }
    match result {
        WrenInterpretResult::Success => Ok(()),
        WrenInterpretResult::CompileError => Err(Error::Compile(entry.take_compile_error())),
        WrenInterpretResult::RuntimeError => Err(Error::Runtime(entry.take_runtime_error())),
    }
}

/// Frees the native VM, then removes it from the registry.
///
/// # Safety
/// `raw` must be a live VM of `bridge` that nothing uses afterwards.
pub(crate) unsafe fn teardown(bridge: &Bridge, raw: *mut WrenVM) {
    unsafe { wren::wren_free_vm(raw) };
    bridge.registry().unregister(raw);
    tracing::debug!(vm = ?raw, "VM freed");
}

/// A scripting VM.
///
/// The VM is NOT thread-safe and cannot leave the thread that created it.
/// Create one per thread. It is freed by [`Vm::free`] or when dropped.
pub struct Vm {
    raw: *mut WrenVM,
    entry: Arc<VmEntry>,
    bridge: Arc<Bridge>,
    freed: bool,
}

impl Vm {
    /// Create a VM and register it in the configured bridge
    pub fn new(config: Configuration) -> Self {
        let bridge = config.bridge.clone().unwrap_or_else(Bridge::global);
        let callbacks = &config.callbacks;

        let mut native = unsafe {
            let mut native = MaybeUninit::<WrenConfiguration>::uninit();
            wren::wren_init_configuration(native.as_mut_ptr());
            native.assume_init()
        };
        native.write_fn = Some(dispatch::write);
        native.error_fn = Some(dispatch::error);
        native.resolve_module_fn = callbacks
            .resolve_module
            .is_some()
            .then_some(dispatch::resolve_module as WrenResolveModuleFn);
        native.load_module_fn = callbacks
            .load_module
            .is_some()
            .then_some(dispatch::load_module as WrenLoadModuleFn);
        native.bind_foreign_method_fn = Some(dispatch::bind_foreign_method);
        native.bind_foreign_class_fn = Some(dispatch::bind_foreign_class);
        native.initial_heap_size = config.initial_heap_size;
        native.min_heap_size = config.min_heap_size;
        native.heap_growth_percent = config.heap_growth_percent;
        native.user_data = Arc::as_ptr(&bridge) as *mut c_void;

        let raw = unsafe { wren::wren_new_vm(&mut native) };
        let entry = Arc::new(VmEntry::new(config.callbacks, native.reallocate_fn));
        bridge.registry().register(raw, entry.clone());
        tracing::debug!(vm = ?raw, "VM created");

        Self {
            raw,
            entry,
            bridge,
            freed: false,
        }
    }

    /// Compiles and runs `source` in `module`
    pub fn interpret(&self, module: &str, source: &str) -> Result<()> {
        let module = CString::new(module)?;
        let source = CString::new(source)?;
        run_checked(&self.entry, || unsafe {
            wren::wren_interpret(self.raw, module.as_ptr(), source.as_ptr())
        })
    }

    /// Slot access for staging call arguments and reading results
    pub fn context(&self) -> VmContext<'_> {
        VmContext::new(self.raw, self.entry.clone(), self.bridge.clone())
    }

    /// Binds the foreign method `signature` of `class` in the default
    /// module to `method`.
    ///
    /// Bindings are looked up when the class is defined, so bind before
    /// interpreting the code declaring it.
    pub fn bind_method<F>(&self, class: &str, is_static: bool, signature: &str, method: F) -> Result<TrampolineId>
    where
        F: Fn(&VmContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let (_, id) = self.bridge.methods().register(Arc::new(method))?;
        let key = method_key(class, is_static, signature);
        tracing::debug!(%key, %id, "bound foreign method");
        self.entry
            .methods
            .write()
            .insert((DEFAULT_MODULE.to_string(), key), id);
        Ok(id)
    }

    /// Binds the allocator of the foreign class `class` in the default
    /// module.
    pub fn bind_class<F>(&self, class: &str, allocate: F) -> Result<TrampolineId>
    where
        F: Fn(&VmContext<'_>) -> Result<ForeignObject> + Send + Sync + 'static,
    {
        let (_, id) = self.bridge.classes().register(Arc::new(allocate))?;
        tracing::debug!(class, %id, "bound foreign class");
        self.entry
            .classes
            .write()
            .insert((DEFAULT_MODULE.to_string(), class.to_string()), id);
        Ok(id)
    }

    /// Runs a garbage collection
    pub fn collect_garbage(&self) {
        unsafe { wren::wren_collect_garbage(self.raw) };
    }

    /// Number of handles not yet released
    pub fn handle_count(&self) -> usize {
        self.entry.handle_count()
    }

    /// The bridge this VM is registered in
    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// The native VM pointer
    pub fn as_raw(&self) -> *mut WrenVM {
        self.raw
    }

    /// Frees the VM.
    ///
    /// Refuses while handles are alive and gives the VM back.
    pub fn free(mut self) -> std::result::Result<(), (Vm, Error)> {
        let handles = self.handle_count();
        if handles > 0 {
            return Err((self, Error::OutstandingHandles(handles)));
        }
        // SAFETY: no handles remain and `self` is consumed.
        unsafe { teardown(&self.bridge, self.raw) };
        self.freed = true;
        Ok(())
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        if self.freed {
            return;
        }
        let handles = self.handle_count();
        if handles > 0 {
            tracing::warn!(vm = ?self.raw, handles, "VM dropped with live handles, freeing after the last release");
            self.entry.orphaned.store(true, std::sync::atomic::Ordering::Release);
            return;
        }
        // SAFETY: no handles remain and the VM is being dropped.
        unsafe { teardown(&self.bridge, self.raw) };
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("raw", &self.raw)
            .field("handles", &self.handle_count())
            .finish()
    }
}
