// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Entry points the engine calls.
//!
//! Every VM created by the bridge is configured with these functions. Each
//! one recovers the [`Bridge`] from the VM's user data, looks up the VM's
//! entry in the registry and forwards to host code. A missing entry panics,
//! which aborts the process at the `extern "C"` boundary.

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::{CStr, CString, c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use wren_embed_sys::ffi::{
    self as wren, WrenErrorType, WrenForeignClassMethods, WrenForeignMethodFn, WrenLoadModuleResult,
    WrenReallocateFn, WrenVM,
};

use crate::DEFAULT_MODULE;
use crate::bridge::Bridge;
use crate::config::ErrorKind;
use crate::error::Result;
use crate::foreign;
use crate::registry::{BindingKey, VmEntry};
use crate::slots::VmContext;
use crate::trampoline::{TrampolineId, TrampolineTable};
use crate::vm::method_key;

/// Modules whose foreign classes the engine binds itself when the host
/// does not.
const ENGINE_MODULES: [&str; 2] = ["meta", "random"];

/// The bridge a VM was created with.
///
/// # Safety
/// `vm` must be a live VM created by [`crate::Vm::new`], whose user data
/// points to a bridge kept alive by the `Vm`.
unsafe fn bridge_of(vm: *mut WrenVM) -> Arc<Bridge> {
    unsafe {
        let ptr = wren::wren_get_user_data(vm) as *const Bridge;
        Arc::increment_strong_count(ptr);
        Arc::from_raw(ptr)
    }
}

unsafe fn lookup(vm: *mut WrenVM) -> (Arc<Bridge>, Arc<VmEntry>) {
    let bridge = unsafe { bridge_of(vm) };
    let entry = bridge.registry().lookup(vm);
    (bridge, entry)
}

unsafe fn text<'a>(ptr: *const c_char) -> Cow<'a, str> {
    if ptr.is_null() {
        return Cow::Borrowed("");
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
}

// =============================================================================
// Host callbacks
// =============================================================================

pub(crate) unsafe extern "C" fn write(vm: *mut WrenVM, message: *const c_char) {
    let (_, entry) = unsafe { lookup(vm) };
    entry.callbacks.write(&unsafe { text(message) });
}

pub(crate) unsafe extern "C" fn error(
    vm: *mut WrenVM,
    kind: WrenErrorType,
    module: *const c_char,
    line: c_int,
    message: *const c_char,
) {
    let (_, entry) = unsafe { lookup(vm) };
    let kind = ErrorKind::from(kind);
    let module = (!module.is_null()).then(|| unsafe { text(module) });
    let message = unsafe { text(message) };

    match kind {
        ErrorKind::Compile => entry.record_compile_error(format!(
            "[{} line {}] {}",
            module.as_deref().unwrap_or(""),
            line,
            message
        )),
        ErrorKind::Runtime => entry.record_runtime_error(message.to_string()),
        ErrorKind::StackTrace => {}
    }
    entry.callbacks.error(kind, module.as_deref(), line, &message);
}

/// Copies `text` into memory from the engine's allocator, which the engine
/// frees once it has read it.
unsafe fn engine_string(reallocate: Option<WrenReallocateFn>, text: &str) -> *const c_char {
    let Some(reallocate) = reallocate else {
        tracing::error!("engine allocator unavailable");
        return std::ptr::null();
    };
    if text.as_bytes().contains(&0) {
        tracing::warn!(text, "module name contains NUL");
        return std::ptr::null();
    }
    unsafe {
        let data = reallocate(std::ptr::null_mut(), text.len() + 1, std::ptr::null_mut()).cast::<u8>();
        if data.is_null() {
            return std::ptr::null();
        }
        std::ptr::copy_nonoverlapping(text.as_ptr(), data, text.len());
        data.add(text.len()).write(0);
        data.cast()
    }
}

unsafe extern "C" fn release_source(_vm: *mut WrenVM, _name: *const c_char, result: WrenLoadModuleResult) {
    if !result.source.is_null() {
        // SAFETY: allocated by `CString::into_raw` in `load_module`.
        drop(unsafe { CString::from_raw(result.source as *mut c_char) });
    }
}

pub(crate) unsafe extern "C" fn resolve_module(
    vm: *mut WrenVM,
    importer: *const c_char,
    name: *const c_char,
) -> *const c_char {
    let (_, entry) = unsafe { lookup(vm) };
    let Some(resolve) = entry.callbacks.resolve_module.clone() else {
        return name;
    };
    let (importer_text, name_text) = unsafe { (text(importer), text(name)) };
    match resolve(&importer_text, &name_text) {
        // The engine keeps its own string when handed back the same pointer.
        Some(resolved) if resolved == name_text => name,
        Some(resolved) => unsafe { engine_string(entry.reallocate, &resolved) },
        None => {
            tracing::debug!(importer = %importer_text, name = %name_text, "module not resolved");
            std::ptr::null()
        }
    }
}

pub(crate) unsafe extern "C" fn load_module(vm: *mut WrenVM, name: *const c_char) -> WrenLoadModuleResult {
    let (_, entry) = unsafe { lookup(vm) };
    let Some(load) = entry.callbacks.load_module.clone() else {
        return WrenLoadModuleResult::default();
    };
    let name = unsafe { text(name) };
    let Some(source) = load(&name) else {
        tracing::debug!(%name, "module not found");
        return WrenLoadModuleResult::default();
    };
    match CString::new(source) {
        Ok(source) => WrenLoadModuleResult {
            source: source.into_raw(),
            on_complete: Some(release_source),
            user_data: std::ptr::null_mut(),
        },
        Err(err) => {
            tracing::warn!(%name, %err, "module source contains NUL");
            WrenLoadModuleResult::default()
        }
    }
}

// =============================================================================
// Foreign binding
// =============================================================================

/// Registers a closure handed over by a host bind callback and remembers
/// it under `key`, so the binding survives for the VM's lifetime.
fn adopt<F: ?Sized>(
    table: &TrampolineTable<F>,
    bindings: &RwLock<HashMap<BindingKey, TrampolineId>>,
    key: BindingKey,
    closure: Arc<F>,
) -> Option<TrampolineId> {
    match table.register(closure) {
        Ok((_, id)) => {
            tracing::debug!(module = %key.0, key = %key.1, %id, "bound by host callback");
            bindings.write().insert(key, id);
            Some(id)
        }
        Err(err) => {
            tracing::error!(module = %key.0, key = %key.1, %err, "could not bind host callback result");
            None
        }
    }
}

pub(crate) unsafe extern "C" fn bind_foreign_method(
    vm: *mut WrenVM,
    module: *const c_char,
    class_name: *const c_char,
    is_static: bool,
    signature: *const c_char,
) -> Option<WrenForeignMethodFn> {
    let (bridge, entry) = unsafe { lookup(vm) };
    let (module, class_name, signature) = unsafe { (text(module), text(class_name), text(signature)) };
    let key = (module.to_string(), method_key(&class_name, is_static, &signature));

    let id = entry.methods.read().get(&key).copied();
    let id = id.or_else(|| {
        let method = entry
            .callbacks
            .bind_foreign_method(&module, &class_name, is_static, &signature)?;
        adopt(bridge.methods(), &entry.methods, key.clone(), method)
    });
    match id {
        Some(id) => Some(bridge.methods().stub(id)),
        None => {
            if module != DEFAULT_MODULE {
                tracing::warn!(%module, key = %key.1, "foreign method outside the default module not bound");
            } else {
                tracing::debug!(key = %key.1, "no foreign method bound");
            }
            None
        }
    }
}

/// Allocator of a foreign class that could not be bound. The VM is already
/// poisoned; constructing an instance aborts the fiber.
unsafe extern "C" fn unbound_allocate(vm: *mut WrenVM) {
    let (bridge, entry) = unsafe { lookup(vm) };
    let message = match entry.poison_error() {
        Some(err) => err.to_string(),
        None => "Foreign class has no allocator.".to_string(),
    };
    fail(&VmContext::new(vm, entry, bridge), &message);
}

pub(crate) unsafe extern "C" fn bind_foreign_class(
    vm: *mut WrenVM,
    module: *const c_char,
    class_name: *const c_char,
) -> WrenForeignClassMethods {
    let (bridge, entry) = unsafe { lookup(vm) };
    let (module, class_name) = unsafe { (text(module), text(class_name)) };
    let key = (module.to_string(), class_name.to_string());

    let id = entry.classes.read().get(&key).copied();
    let id = id.or_else(|| {
        let allocate = entry.callbacks.bind_foreign_class(&module, &class_name)?;
        adopt(bridge.classes(), &entry.classes, key.clone(), allocate)
    });
    match id {
        Some(id) => WrenForeignClassMethods {
            allocate: Some(bridge.classes().stub(id)),
            finalize: Some(foreign::finalize),
        },
        None if ENGINE_MODULES.contains(&&*module) => WrenForeignClassMethods::default(),
        None => {
            tracing::error!(%module, class = %class_name, "no allocator for foreign class, VM poisoned");
            entry.poison(&module, &class_name);
            WrenForeignClassMethods {
                allocate: Some(unbound_allocate),
                finalize: None,
            }
        }
    }
}

// =============================================================================
// Trampoline targets
// =============================================================================

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Runs host code, turning errors and panics into a message.
fn guarded<T>(what: &str, f: impl FnOnce() -> Result<T>) -> std::result::Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => {
            let message = format!("{} panicked: {}", what, panic_message(payload.as_ref()));
            tracing::error!("{}", message);
            Err(message)
        }
    }
}

/// Aborts the current fiber with `message`.
fn fail(ctx: &VmContext<'_>, message: &str) {
    ctx.ensure_slots(1);
    if ctx.set_string(0, message).and_then(|()| ctx.abort_fiber(0)).is_err() {
        tracing::error!(message, "could not abort fiber");
    }
}

pub(crate) unsafe fn foreign_method(vm: *mut WrenVM, id: TrampolineId) {
    let (bridge, entry) = unsafe { lookup(vm) };
    let _running = entry.enter_foreign();
    let ctx = VmContext::new(vm, entry.clone(), bridge.clone());
    let Some(method) = bridge.methods().get(id) else {
        fail(&ctx, &format!("No foreign method registered at trampoline {}.", id));
        return;
    };
    if let Err(message) = guarded("Foreign method", || method(&ctx)) {
        fail(&ctx, &message);
    }
}

pub(crate) unsafe fn foreign_allocate(vm: *mut WrenVM, id: TrampolineId) {
    let (bridge, entry) = unsafe { lookup(vm) };
    let _running = entry.enter_foreign();
    let ctx = VmContext::new(vm, entry.clone(), bridge.clone());
    let Some(allocate) = bridge.classes().get(id) else {
        fail(&ctx, &format!("No allocator registered at trampoline {}.", id));
        return;
    };
    let result = guarded("Foreign allocator", || {
        let object = allocate(&ctx)?;
        ctx.set_new_foreign(0, 0, object)
    });
    if let Err(message) = result {
        fail(&ctx, &message);
    }
}

