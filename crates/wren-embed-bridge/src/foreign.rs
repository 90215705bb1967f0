// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host objects stored inside foreign class instances.
//!
//! The engine gives every foreign instance a block of raw storage. The
//! bridge always asks for [`CELL_SIZE`] bytes and stores one pointer to a
//! boxed [`ForeignObject`] there, so the layout never depends on the host
//! type. [`finalize`] drops the box when the engine frees the instance.

use std::any::Any;
use std::cell::{RefCell, RefMut};
use std::ffi::c_void;
use std::fmt;

/// A type-erased host value owned by a foreign class instance
pub struct ForeignObject {
    value: RefCell<Box<dyn Any>>,
    type_name: &'static str,
}

impl ForeignObject {
    /// Wraps a host value
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            value: RefCell::new(Box::new(value)),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Name of the wrapped type, for diagnostics
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns true if the wrapped value is a `T`
    pub fn is<T: Any>(&self) -> bool {
        self.value.try_borrow().is_ok_and(|value| value.is::<T>())
    }

    /// Unwraps the value if it is a `T`
    pub fn into_inner<T: Any>(self) -> std::result::Result<T, Self> {
        let type_name = self.type_name;
        match self.value.into_inner().downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self {
                value: RefCell::new(value),
                type_name,
            }),
        }
    }

    /// Mutably borrows the value as a `T`.
    ///
    /// `Err(true)` means the value is a different type, `Err(false)` that
    /// it is already borrowed.
    pub(crate) fn borrow_mut<T: Any>(&self) -> std::result::Result<RefMut<'_, T>, bool> {
        let value = self.value.try_borrow_mut().map_err(|_| false)?;
        RefMut::filter_map(value, |value| value.downcast_mut::<T>()).map_err(|_| true)
    }
}

impl fmt::Debug for ForeignObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignObject")
            .field("type", &self.type_name)
            .finish()
    }
}

/// Bytes the bridge requests for every foreign instance.
pub(crate) const CELL_SIZE: usize = std::mem::size_of::<*mut ForeignObject>();

/// Moves `object` into the cell at `data`.
///
/// # Safety
/// `data` must point to at least [`CELL_SIZE`] writable, pointer-aligned
/// bytes that do not already own an object.
pub(crate) unsafe fn store(data: *mut c_void, object: ForeignObject) {
    let boxed = Box::into_raw(Box::new(object));
    // SAFETY: guaranteed by the caller.
    unsafe { data.cast::<*mut ForeignObject>().write(boxed) };
}

/// The object in the cell at `data`, if one was stored.
///
/// # Safety
/// `data` must be a cell filled by [`store`] or zeroed, and stay alive for
/// `'a`.
pub(crate) unsafe fn load<'a>(data: *mut c_void) -> Option<&'a ForeignObject> {
    if data.is_null() {
        return None;
    }
    // SAFETY: guaranteed by the caller.
    unsafe { data.cast::<*mut ForeignObject>().read().as_ref() }
}

/// Finalizer registered for every foreign class.
///
/// # Safety
/// Called by the engine with the storage of an instance being freed.
pub(crate) unsafe extern "C" fn finalize(data: *mut c_void) {
    if data.is_null() {
        return;
    }
    // SAFETY: the cell holds null or a pointer from `store`, and the engine
    // finalizes each instance once.
    unsafe {
        let object = data.cast::<*mut ForeignObject>().read();
        if !object.is_null() {
            data.cast::<*mut ForeignObject>().write(std::ptr::null_mut());
            drop(Box::from_raw(object));
        }
    }
}
