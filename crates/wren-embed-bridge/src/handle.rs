// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Persistent handles.
//!
//! A [`Handle`] keeps a script value alive across calls, or holds a
//! compiled method signature for [`Handle::call`]. Releasing consumes the
//! handle, so it cannot be released twice or used afterwards:
//!
//! ```compile_fail
//! use wren_embed_bridge::{Configuration, Vm};
//!
//! let vm = Vm::new(Configuration::default());
//! let ctx = vm.context();
//! ctx.ensure_slots(1);
//! let handle = ctx.new_handle(0).unwrap();
//! handle.release();
//! handle.release();
//! ```
//!
//! ```compile_fail
//! use wren_embed_bridge::{Configuration, Vm};
//!
//! let vm = Vm::new(Configuration::default());
//! let handle = vm.context().new_call_handle("call()").unwrap();
//! handle.release();
//! handle.call().unwrap();
//! ```
//!
//! A handle that is dropped without [`Handle::release`] is released then.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use wren_embed_sys::ffi::{self as wren, WrenHandle, WrenVM};

use crate::bridge::Bridge;
use crate::error::{Error, Result};
use crate::registry::VmEntry;
use crate::vm;

/// A pinned script value or a call handle
pub struct Handle {
    raw: *mut WrenHandle,
    vm: *mut WrenVM,
    entry: Arc<VmEntry>,
    bridge: Arc<Bridge>,
    signature: Option<String>,
}

impl Handle {
    pub(crate) fn new(
        raw: *mut WrenHandle,
        vm: *mut WrenVM,
        entry: Arc<VmEntry>,
        bridge: Arc<Bridge>,
        signature: Option<String>,
    ) -> Self {
        Self {
            raw,
            vm,
            entry,
            bridge,
            signature,
        }
    }

    pub(crate) fn as_raw(&self) -> *mut WrenHandle {
        self.raw
    }

    /// Signature of a call handle
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Returns true if the handle was made by
    /// [`crate::VmContext::new_call_handle`]
    pub fn is_call(&self) -> bool {
        self.signature.is_some()
    }

    /// Invokes the method of a call handle.
    ///
    /// The receiver must be in slot 0 and the arguments in the slots after
    /// it. On success slot 0 holds the return value.
    pub fn call(&self) -> Result<()> {
        if !self.is_call() {
            return Err(Error::NotCallable);
        }
        vm::run_checked(&self.entry, || unsafe { wren::wren_call(self.vm, self.raw) })
    }

    /// Releases the handle
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        unsafe { wren::wren_release_handle(self.vm, self.raw) };
        let remaining = self.entry.live_handles.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 && self.entry.orphaned.load(Ordering::Acquire) {
            tracing::debug!(vm = ?self.vm, "last handle released, freeing orphaned VM");
            // SAFETY: the owning `Vm` is gone and this was its last handle.
            unsafe { vm::teardown(&self.bridge, self.vm) };
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("vm", &self.vm)
            .field("signature", &self.signature)
            .finish()
    }
}
