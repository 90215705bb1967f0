// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Slot access.
//!
//! Values cross the boundary through numbered slots of the VM's current
//! call frame. Slot contents are only valid during the call that owns the
//! frame; copy values out, or pin them with a [`Handle`], to keep them.

use std::ffi::{CString, c_int};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use wren_embed_sys::ffi::{self as wren, WrenType, WrenVM};

use crate::bridge::Bridge;
use crate::error::{Error, Result};
use crate::foreign::{self, ForeignObject};
use crate::handle::Handle;
use crate::registry::VmEntry;

/// Kind of value in a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotType {
    /// `true` or `false`
    Bool,
    /// A double
    Num,
    /// A foreign class instance
    Foreign,
    /// A list
    List,
    /// A map
    Map,
    /// `null`
    Null,
    /// A string or byte sequence
    String,
    /// Any other script object
    Unknown,
}

impl From<WrenType> for SlotType {
    fn from(kind: WrenType) -> Self {
        match kind {
            WrenType::Bool => Self::Bool,
            WrenType::Num => Self::Num,
            WrenType::Foreign => Self::Foreign,
            WrenType::List => Self::List,
            WrenType::Map => Self::Map,
            WrenType::Null => Self::Null,
            WrenType::String => Self::String,
            WrenType::Unknown => Self::Unknown,
        }
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bool => "bool",
            Self::Num => "num",
            Self::Foreign => "foreign",
            Self::List => "list",
            Self::Map => "map",
            Self::Null => "null",
            Self::String => "string",
            Self::Unknown => "unknown",
        })
    }
}

/// Slot access to a VM during a call.
///
/// Foreign methods receive one; [`crate::Vm::context`] gives one for
/// staging arguments of a [`Handle::call`].
pub struct VmContext<'vm> {
    raw: *mut WrenVM,
    entry: Arc<VmEntry>,
    bridge: Arc<Bridge>,
    _vm: PhantomData<&'vm WrenVM>,
}

impl<'vm> VmContext<'vm> {
    pub(crate) fn new(raw: *mut WrenVM, entry: Arc<VmEntry>, bridge: Arc<Bridge>) -> Self {
        Self {
            raw,
            entry,
            bridge,
            _vm: PhantomData,
        }
    }

    fn check(&self, slot: usize) -> Result<c_int> {
        let count = self.slot_count();
        if slot >= count {
            return Err(Error::SlotOutOfRange { slot, count });
        }
        Ok(slot as c_int)
    }

    fn expect(&self, slot: usize, expected: SlotType) -> Result<c_int> {
        let found = self.slot_type(slot)?;
        if found != expected {
            return Err(Error::SlotType {
                slot,
                expected,
                found,
            });
        }
        Ok(slot as c_int)
    }

    // =========================================================================
    // Frame
    // =========================================================================

    /// Grows the frame to at least `count` slots. Never shrinks it.
    pub fn ensure_slots(&self, count: usize) {
        let count = c_int::try_from(count).unwrap_or(c_int::MAX);
        unsafe { wren::wren_ensure_slots(self.raw, count) };
    }

    /// Number of slots in the frame
    pub fn slot_count(&self) -> usize {
        let count = unsafe { wren::wren_get_slot_count(self.raw) };
        usize::try_from(count).unwrap_or(0)
    }

    /// Kind of value in `slot`
    pub fn slot_type(&self, slot: usize) -> Result<SlotType> {
        let slot = self.check(slot)?;
        Ok(unsafe { wren::wren_get_slot_type(self.raw, slot) }.into())
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// Reads a bool
    pub fn get_bool(&self, slot: usize) -> Result<bool> {
        let slot = self.expect(slot, SlotType::Bool)?;
        Ok(unsafe { wren::wren_get_slot_bool(self.raw, slot) })
    }

    /// Reads a number
    pub fn get_number(&self, slot: usize) -> Result<f64> {
        let slot = self.expect(slot, SlotType::Num)?;
        Ok(unsafe { wren::wren_get_slot_double(self.raw, slot) })
    }

    /// Copies the bytes of a string
    pub fn get_bytes(&self, slot: usize) -> Result<Vec<u8>> {
        let slot = self.expect(slot, SlotType::String)?;
        let mut length: c_int = 0;
        let ptr = unsafe { wren::wren_get_slot_bytes(self.raw, slot, &mut length) };
        let length = usize::try_from(length).unwrap_or(0);
        if ptr.is_null() || length == 0 {
            return Ok(Vec::new());
        }
        // SAFETY: the engine returns `length` readable bytes that live as
        // long as the slot; they are copied before returning.
        Ok(unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), length) }.to_vec())
    }

    /// Copies a string
    pub fn get_string(&self, slot: usize) -> Result<String> {
        Ok(String::from_utf8(self.get_bytes(slot)?)?)
    }

    /// Runs `f` with the host object of a foreign instance.
    ///
    /// Fails if the object is not a `T`, or is already borrowed by a
    /// foreign call further up the stack.
    pub fn with_foreign<T: 'static, R>(&self, slot: usize, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let raw_slot = self.expect(slot, SlotType::Foreign)?;
        let data = unsafe { wren::wren_get_slot_foreign(self.raw, raw_slot) };
        // SAFETY: every foreign class of a bridge VM is allocated through
        // `set_new_foreign`, and the slot keeps the instance alive.
        let object = unsafe { foreign::load(data) }.ok_or(Error::ForeignType(slot))?;
        let mut value = object.borrow_mut::<T>().map_err(|wrong_type| {
            if wrong_type {
                Error::ForeignType(slot)
            } else {
                Error::ForeignBorrowed(slot)
            }
        })?;
        Ok(f(&mut value))
    }

    /// Pins the value in `slot`. Same as [`VmContext::new_handle`].
    pub fn get_handle(&self, slot: usize) -> Result<Handle> {
        self.new_handle(slot)
    }

    // =========================================================================
    // Setters
    // =========================================================================

    /// Stores a bool
    pub fn set_bool(&self, slot: usize, value: bool) -> Result<()> {
        let slot = self.check(slot)?;
        unsafe { wren::wren_set_slot_bool(self.raw, slot, value) };
        Ok(())
    }

    /// Stores a number
    pub fn set_number(&self, slot: usize, value: f64) -> Result<()> {
        let slot = self.check(slot)?;
        unsafe { wren::wren_set_slot_double(self.raw, slot, value) };
        Ok(())
    }

    /// Stores a byte sequence as a string; NUL bytes are kept
    pub fn set_bytes(&self, slot: usize, bytes: &[u8]) -> Result<()> {
        let slot = self.check(slot)?;
        unsafe { wren::wren_set_slot_bytes(self.raw, slot, bytes.as_ptr().cast(), bytes.len()) };
        Ok(())
    }

    /// Stores a string
    pub fn set_string(&self, slot: usize, text: &str) -> Result<()> {
        self.set_bytes(slot, text.as_bytes())
    }

    /// Stores `null`
    pub fn set_null(&self, slot: usize) -> Result<()> {
        let slot = self.check(slot)?;
        unsafe { wren::wren_set_slot_null(self.raw, slot) };
        Ok(())
    }

    /// Stores a new empty list
    pub fn set_new_list(&self, slot: usize) -> Result<()> {
        let slot = self.check(slot)?;
        unsafe { wren::wren_set_slot_new_list(self.raw, slot) };
        Ok(())
    }

    /// Stores the value pinned by `handle`
    pub fn set_handle(&self, slot: usize, handle: &Handle) -> Result<()> {
        let slot = self.check(slot)?;
        unsafe { wren::wren_set_slot_handle(self.raw, slot, handle.as_raw()) };
        Ok(())
    }

    /// Creates an instance of the foreign class in `class_slot` that owns
    /// `object`, and stores it in `slot`.
    ///
    /// `class_slot` must hold a foreign class. Classes are only known to be
    /// [`SlotType::Unknown`], so other objects of that kind are not caught.
    pub fn set_new_foreign(&self, slot: usize, class_slot: usize, object: ForeignObject) -> Result<()> {
        let raw_slot = self.check(slot)?;
        let raw_class = self.expect(class_slot, SlotType::Unknown)?;
        let data = unsafe { wren::wren_set_slot_new_foreign(self.raw, raw_slot, raw_class, foreign::CELL_SIZE) };
        if data.is_null() {
            return Err(Error::host("the engine did not allocate the foreign instance"));
        }
        // SAFETY: the engine returned CELL_SIZE zeroed bytes for the new
        // instance.
        unsafe { foreign::store(data, object) };
        Ok(())
    }

    // =========================================================================
    // Lists
    // =========================================================================

    /// Number of elements of the list in `slot`
    pub fn list_count(&self, slot: usize) -> Result<usize> {
        let slot = self.expect(slot, SlotType::List)?;
        let count = unsafe { wren::wren_get_list_count(self.raw, slot) };
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn list_index(&self, list_slot: usize, index: i64, allow_end: bool) -> Result<c_int> {
        let count = self.list_count(list_slot)?;
        let len = count as i64;
        let upper = if allow_end { len } else { len - 1 };
        let resolved = if index < 0 { len + index + i64::from(allow_end) } else { index };
        if resolved < 0 || resolved > upper {
            return Err(Error::ListIndex { index, count });
        }
        Ok(resolved as c_int)
    }

    /// Copies element `index` of the list in `list_slot` into
    /// `element_slot`. Negative indices count from the end.
    pub fn list_get_element(&self, list_slot: usize, index: i64, element_slot: usize) -> Result<()> {
        let index = self.list_index(list_slot, index, false)?;
        let element_slot = self.check(element_slot)?;
        unsafe { wren::wren_get_list_element(self.raw, list_slot as c_int, index, element_slot) };
        Ok(())
    }

    /// Replaces element `index` of the list in `list_slot` with the value
    /// in `element_slot`
    pub fn list_set_element(&self, list_slot: usize, index: i64, element_slot: usize) -> Result<()> {
        let index = self.list_index(list_slot, index, false)?;
        let element_slot = self.check(element_slot)?;
        unsafe { wren::wren_set_list_element(self.raw, list_slot as c_int, index, element_slot) };
        Ok(())
    }

    /// Inserts the value in `element_slot` before `index`; `-1` appends
    pub fn list_insert_element(&self, list_slot: usize, index: i64, element_slot: usize) -> Result<()> {
        let index = self.list_index(list_slot, index, true)?;
        let element_slot = self.check(element_slot)?;
        unsafe { wren::wren_insert_in_list(self.raw, list_slot as c_int, index, element_slot) };
        Ok(())
    }

    // =========================================================================
    // Maps
    // =========================================================================

    /// Stores a new empty map
    pub fn set_new_map(&self, slot: usize) -> Result<()> {
        let slot = self.check(slot)?;
        unsafe { wren::wren_set_slot_new_map(self.raw, slot) };
        Ok(())
    }

    /// Number of entries of the map in `slot`
    pub fn map_count(&self, slot: usize) -> Result<usize> {
        let slot = self.expect(slot, SlotType::Map)?;
        let count = unsafe { wren::wren_get_map_count(self.raw, slot) };
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Returns true if the map in `map_slot` has the key in `key_slot`
    pub fn map_contains_key(&self, map_slot: usize, key_slot: usize) -> Result<bool> {
        let (map_slot, key_slot) = self.map_slots(map_slot, key_slot)?;
        Ok(unsafe { wren::wren_get_map_contains_key(self.raw, map_slot, key_slot) })
    }

    /// Copies the value under the key in `key_slot` into `value_slot`;
    /// `null` when the key is missing
    pub fn map_get_value(&self, map_slot: usize, key_slot: usize, value_slot: usize) -> Result<()> {
        let (map_slot, key_slot) = self.map_slots(map_slot, key_slot)?;
        let value_slot = self.check(value_slot)?;
        unsafe { wren::wren_get_map_value(self.raw, map_slot, key_slot, value_slot) };
        Ok(())
    }

    /// Stores the value in `value_slot` under the key in `key_slot`
    pub fn map_set_value(&self, map_slot: usize, key_slot: usize, value_slot: usize) -> Result<()> {
        let (map_slot, key_slot) = self.map_slots(map_slot, key_slot)?;
        let value_slot = self.check(value_slot)?;
        unsafe { wren::wren_set_map_value(self.raw, map_slot, key_slot, value_slot) };
        Ok(())
    }

    /// Removes the key in `key_slot`, copying the removed value (or `null`)
    /// into `removed_slot`
    pub fn map_remove_value(&self, map_slot: usize, key_slot: usize, removed_slot: usize) -> Result<()> {
        let (map_slot, key_slot) = self.map_slots(map_slot, key_slot)?;
        let removed_slot = self.check(removed_slot)?;
        unsafe { wren::wren_remove_map_value(self.raw, map_slot, key_slot, removed_slot) };
        Ok(())
    }

    /// Host map keys must be bools, numbers, strings or `null`; other value
    /// types the engine accepts as keys all read as `Unknown`.
    fn map_slots(&self, map_slot: usize, key_slot: usize) -> Result<(c_int, c_int)> {
        let map_slot = self.expect(map_slot, SlotType::Map)?;
        let found = self.slot_type(key_slot)?;
        match found {
            SlotType::Bool | SlotType::Num | SlotType::String | SlotType::Null => Ok((map_slot, key_slot as c_int)),
            _ => Err(Error::SlotType {
                slot: key_slot,
                expected: SlotType::String,
                found,
            }),
        }
    }

    // =========================================================================
    // Variables
    // =========================================================================

    /// Returns true if `module` has been loaded
    pub fn has_module(&self, module: &str) -> Result<bool> {
        let module = CString::new(module)?;
        Ok(unsafe { wren::wren_has_module(self.raw, module.as_ptr()) })
    }

    /// Returns true if `module` is loaded and defines the top-level
    /// variable `name`
    pub fn has_variable(&self, module: &str, name: &str) -> Result<bool> {
        if !self.has_module(module)? {
            return Ok(false);
        }
        let module = CString::new(module)?;
        let name = CString::new(name)?;
        Ok(unsafe { wren::wren_has_variable(self.raw, module.as_ptr(), name.as_ptr()) })
    }

    /// Copies the top-level variable `name` of `module` into `slot`
    pub fn get_variable(&self, module: &str, name: &str, slot: usize) -> Result<()> {
        let raw_slot = self.check(slot)?;
        if !self.has_variable(module, name)? {
            return Err(Error::UnknownVariable {
                module: module.to_string(),
                name: name.to_string(),
            });
        }
        let module = CString::new(module)?;
        let name = CString::new(name)?;
        unsafe { wren::wren_get_variable(self.raw, module.as_ptr(), name.as_ptr(), raw_slot) };
        Ok(())
    }

    // =========================================================================
    // Fibers and handles
    // =========================================================================

    /// Aborts the current fiber with the value in `slot` as its error. Takes
    /// effect when the foreign call returns.
    pub fn abort_fiber(&self, slot: usize) -> Result<()> {
        let slot = self.check(slot)?;
        unsafe { wren::wren_abort_fiber(self.raw, slot) };
        Ok(())
    }

    /// Pins the value in `slot` until the handle is released
    pub fn new_handle(&self, slot: usize) -> Result<Handle> {
        let slot = self.check(slot)?;
        let raw = unsafe { wren::wren_get_slot_handle(self.raw, slot) };
        Ok(self.adopt(raw, None))
    }

    /// Compiles a call to `signature`, such as `do_add(_,_)`
    pub fn new_call_handle(&self, signature: &str) -> Result<Handle> {
        let text = CString::new(signature)?;
        let raw = unsafe { wren::wren_make_call_handle(self.raw, text.as_ptr()) };
        Ok(self.adopt(raw, Some(signature.to_string())))
    }

    fn adopt(&self, raw: *mut wren::WrenHandle, signature: Option<String>) -> Handle {
        self.entry.live_handles.fetch_add(1, Ordering::AcqRel);
        Handle::new(raw, self.raw, self.entry.clone(), self.bridge.clone(), signature)
    }
}

impl fmt::Debug for VmContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmContext")
            .field("vm", &self.raw)
            .field("slots", &self.slot_count())
            .finish()
    }
}
