// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! C embedding API.
//!
//! Every function takes the VM as a raw pointer and exchanges values through
//! numbered slots.
//!
//! # Safety
//!
//! The engine validates arguments with debug assertions only. Every `vm`
//! argument must be a live pointer from [`wren_new_vm`] used from one thread
//! at a time, slot indices must be below [`wren_get_slot_count`], typed
//! getters must match [`wren_get_slot_type`], and strings must be
//! NUL-terminated.

use std::ffi::{c_char, c_int, c_void};
use std::fmt;
use std::marker::{PhantomData, PhantomPinned};

// Links the C library built by `ruwren-sys`.
use wren_sys as _;

// =============================================================================
// Types
// =============================================================================

/// A virtual machine.
#[repr(C)]
pub struct WrenVM {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// A persistent reference to a value, or a compiled call signature.
#[repr(C)]
pub struct WrenHandle {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Kind of error passed to the error callback.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrenErrorType {
    /// A syntax or resolution error in a module
    Compile,
    /// The message of a runtime error
    Runtime,
    /// One frame of a runtime error's stack trace
    StackTrace,
}

impl fmt::Display for WrenErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WrenErrorType::Compile => "COMPILE",
            WrenErrorType::Runtime => "RUNTIME",
            WrenErrorType::StackTrace => "STACK_TRACE",
        })
    }
}

/// Outcome of [`wren_interpret`] and [`wren_call`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrenInterpretResult {
    /// Ran to completion
    Success,
    /// The source did not compile
    CompileError,
    /// A runtime error aborted the fiber
    RuntimeError,
}

/// Type of the value in a slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrenType {
    /// `true` or `false`
    Bool,
    /// A number
    Num,
    /// A foreign object
    Foreign,
    /// A list
    List,
    /// A map
    Map,
    /// `null`
    Null,
    /// A string
    String,
    /// Anything else, such as classes, functions and fibers
    Unknown,
}

/// Allocates, grows, shrinks (`new_size > 0`) or frees (`new_size == 0`)
/// engine memory.
pub type WrenReallocateFn =
    unsafe extern "C" fn(memory: *mut c_void, new_size: usize, user_data: *mut c_void) -> *mut c_void;

/// A host function callable from script.
pub type WrenForeignMethodFn = unsafe extern "C" fn(vm: *mut WrenVM);

/// Called with a foreign object's storage before it is freed.
pub type WrenFinalizerFn = unsafe extern "C" fn(data: *mut c_void);

/// Maps an import in `importer` to a canonical module name.
///
/// Returns `name` itself, null to fail the import, or a new string
/// allocated with the VM's reallocate function, which the engine frees.
pub type WrenResolveModuleFn =
    unsafe extern "C" fn(vm: *mut WrenVM, importer: *const c_char, name: *const c_char) -> *const c_char;

/// Releases loaded module source once the engine has compiled it.
pub type WrenLoadModuleCompleteFn =
    unsafe extern "C" fn(vm: *mut WrenVM, name: *const c_char, result: WrenLoadModuleResult);

/// Result of loading a module's source.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WrenLoadModuleResult {
    /// Module source, or null if the module does not exist
    pub source: *const c_char,
    /// Called once the engine is done with `source`
    pub on_complete: Option<WrenLoadModuleCompleteFn>,
    /// Host data for `on_complete`
    pub user_data: *mut c_void,
}

impl Default for WrenLoadModuleResult {
    fn default() -> Self {
        Self {
            source: std::ptr::null(),
            on_complete: None,
            user_data: std::ptr::null_mut(),
        }
    }
}

/// Loads the source of a module.
pub type WrenLoadModuleFn = unsafe extern "C" fn(vm: *mut WrenVM, name: *const c_char) -> WrenLoadModuleResult;

/// Looks up the host function for a `foreign` method when its class is
/// defined.
pub type WrenBindForeignMethodFn = unsafe extern "C" fn(
    vm: *mut WrenVM,
    module: *const c_char,
    class_name: *const c_char,
    is_static: bool,
    signature: *const c_char,
) -> Option<WrenForeignMethodFn>;

/// Receives text printed by `System.print` and `System.write`.
pub type WrenWriteFn = unsafe extern "C" fn(vm: *mut WrenVM, text: *const c_char);

/// Receives compile errors, runtime errors and stack trace lines.
pub type WrenErrorFn = unsafe extern "C" fn(
    vm: *mut WrenVM,
    kind: WrenErrorType,
    module: *const c_char,
    line: c_int,
    message: *const c_char,
);

/// Allocator and finalizer of a foreign class.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct WrenForeignClassMethods {
    /// Creates the object with [`wren_set_slot_new_foreign`]
    pub allocate: Option<WrenForeignMethodFn>,
    /// Runs before the object's storage is freed
    pub finalize: Option<WrenFinalizerFn>,
}

/// Looks up the allocator and finalizer of a `foreign class`.
pub type WrenBindForeignClassFn =
    unsafe extern "C" fn(vm: *mut WrenVM, module: *const c_char, class_name: *const c_char) -> WrenForeignClassMethods;

/// VM configuration, copied by [`wren_new_vm`].
///
/// Fill it with [`wren_init_configuration`] before changing fields.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WrenConfiguration {
    /// Memory allocator; the engine's realloc-based default after init
    pub reallocate_fn: Option<WrenReallocateFn>,
    /// Import name resolution; names are used as written when unset
    pub resolve_module_fn: Option<WrenResolveModuleFn>,
    /// Module source loading; only built-in modules load when unset
    pub load_module_fn: Option<WrenLoadModuleFn>,
    /// Foreign method binding
    pub bind_foreign_method_fn: Option<WrenBindForeignMethodFn>,
    /// Foreign class binding
    pub bind_foreign_class_fn: Option<WrenBindForeignClassFn>,
    /// Output of `System.print`/`System.write`; dropped when unset
    pub write_fn: Option<WrenWriteFn>,
    /// Error reporting; errors are only returned as results when unset
    pub error_fn: Option<WrenErrorFn>,
    /// Bytes allocated before the first collection
    pub initial_heap_size: usize,
    /// Lower bound for the next collection threshold
    pub min_heap_size: usize,
    /// Heap growth after a collection, in percent
    pub heap_growth_percent: c_int,
    /// Host data returned by [`wren_get_user_data`]
    pub user_data: *mut c_void,
}

/// Default initial heap size (10 MiB).
pub const DEFAULT_INITIAL_HEAP_SIZE: usize = 10 * 1024 * 1024;
/// Default minimum heap size (1 MiB).
pub const DEFAULT_MIN_HEAP_SIZE: usize = 1024 * 1024;
/// Default heap growth percentage.
pub const DEFAULT_HEAP_GROWTH_PERCENT: c_int = 50;

// =============================================================================
// Functions
// =============================================================================

unsafe extern "C" {
    // Lifecycle

    /// Version packed as `major * 1000000 + minor * 1000 + patch`.
    #[link_name = "wrenGetVersionNumber"]
    pub safe fn wren_get_version_number() -> c_int;

    /// Fills `config` with the engine defaults.
    #[link_name = "wrenInitConfiguration"]
    pub fn wren_init_configuration(config: *mut WrenConfiguration);

    /// Creates a VM. The configuration is copied.
    #[link_name = "wrenNewVM"]
    pub fn wren_new_vm(config: *mut WrenConfiguration) -> *mut WrenVM;

    /// Frees a VM and every object it owns, running foreign finalizers.
    #[link_name = "wrenFreeVM"]
    pub fn wren_free_vm(vm: *mut WrenVM);

    /// Runs a collection.
    #[link_name = "wrenCollectGarbage"]
    pub fn wren_collect_garbage(vm: *mut WrenVM);

    /// Compiles and runs `source` in `module`.
    #[link_name = "wrenInterpret"]
    pub fn wren_interpret(vm: *mut WrenVM, module: *const c_char, source: *const c_char) -> WrenInterpretResult;

    // Handles

    /// Creates a handle that calls the method `signature` on slot 0.
    #[link_name = "wrenMakeCallHandle"]
    pub fn wren_make_call_handle(vm: *mut WrenVM, signature: *const c_char) -> *mut WrenHandle;

    /// Calls a handle from [`wren_make_call_handle`]. The receiver is in
    /// slot 0 and the arguments follow; the result replaces slot 0. Not
    /// callable from inside a foreign method.
    #[link_name = "wrenCall"]
    pub fn wren_call(vm: *mut WrenVM, method: *mut WrenHandle) -> WrenInterpretResult;

    /// Releases a handle.
    #[link_name = "wrenReleaseHandle"]
    pub fn wren_release_handle(vm: *mut WrenVM, handle: *mut WrenHandle);

    // Slots

    /// Number of slots in the current frame; 0 outside any call.
    #[link_name = "wrenGetSlotCount"]
    pub fn wren_get_slot_count(vm: *mut WrenVM) -> c_int;

    /// Grows the current frame to at least `num_slots`, creating one if
    /// there is none.
    #[link_name = "wrenEnsureSlots"]
    pub fn wren_ensure_slots(vm: *mut WrenVM, num_slots: c_int);

    /// Type of the value in `slot`.
    #[link_name = "wrenGetSlotType"]
    pub fn wren_get_slot_type(vm: *mut WrenVM, slot: c_int) -> WrenType;

    /// Reads the bool in `slot`.
    #[link_name = "wrenGetSlotBool"]
    pub fn wren_get_slot_bool(vm: *mut WrenVM, slot: c_int) -> bool;

    /// Bytes of the string in `slot`, owned by the engine.
    #[link_name = "wrenGetSlotBytes"]
    pub fn wren_get_slot_bytes(vm: *mut WrenVM, slot: c_int, length: *mut c_int) -> *const c_char;

    /// Reads the number in `slot`.
    #[link_name = "wrenGetSlotDouble"]
    pub fn wren_get_slot_double(vm: *mut WrenVM, slot: c_int) -> f64;

    /// Storage of the foreign object in `slot`.
    #[link_name = "wrenGetSlotForeign"]
    pub fn wren_get_slot_foreign(vm: *mut WrenVM, slot: c_int) -> *mut c_void;

    /// The NUL-terminated string in `slot`, owned by the engine.
    #[link_name = "wrenGetSlotString"]
    pub fn wren_get_slot_string(vm: *mut WrenVM, slot: c_int) -> *const c_char;

    /// Pins the value in `slot`.
    #[link_name = "wrenGetSlotHandle"]
    pub fn wren_get_slot_handle(vm: *mut WrenVM, slot: c_int) -> *mut WrenHandle;

    /// Stores a bool.
    #[link_name = "wrenSetSlotBool"]
    pub fn wren_set_slot_bool(vm: *mut WrenVM, slot: c_int, value: bool);

    /// Stores a copy of `length` bytes as a string.
    #[link_name = "wrenSetSlotBytes"]
    pub fn wren_set_slot_bytes(vm: *mut WrenVM, slot: c_int, bytes: *const c_char, length: usize);

    /// Stores a number.
    #[link_name = "wrenSetSlotDouble"]
    pub fn wren_set_slot_double(vm: *mut WrenVM, slot: c_int, value: f64);

    /// Creates an instance of the foreign class in `class_slot` with `size`
    /// bytes of storage, stores it in `slot` and returns the storage.
    #[link_name = "wrenSetSlotNewForeign"]
    pub fn wren_set_slot_new_foreign(vm: *mut WrenVM, slot: c_int, class_slot: c_int, size: usize) -> *mut c_void;

    /// Stores a new empty list.
    #[link_name = "wrenSetSlotNewList"]
    pub fn wren_set_slot_new_list(vm: *mut WrenVM, slot: c_int);

    /// Stores a new empty map.
    #[link_name = "wrenSetSlotNewMap"]
    pub fn wren_set_slot_new_map(vm: *mut WrenVM, slot: c_int);

    /// Stores `null`.
    #[link_name = "wrenSetSlotNull"]
    pub fn wren_set_slot_null(vm: *mut WrenVM, slot: c_int);

    /// Stores a copy of a NUL-terminated string.
    #[link_name = "wrenSetSlotString"]
    pub fn wren_set_slot_string(vm: *mut WrenVM, slot: c_int, text: *const c_char);

    /// Stores the value pinned by `handle`.
    #[link_name = "wrenSetSlotHandle"]
    pub fn wren_set_slot_handle(vm: *mut WrenVM, slot: c_int, handle: *mut WrenHandle);

    // Lists

    /// Number of elements of the list in `slot`.
    #[link_name = "wrenGetListCount"]
    pub fn wren_get_list_count(vm: *mut WrenVM, slot: c_int) -> c_int;

    /// Copies element `index` into `element_slot`.
    #[link_name = "wrenGetListElement"]
    pub fn wren_get_list_element(vm: *mut WrenVM, list_slot: c_int, index: c_int, element_slot: c_int);

    /// Replaces element `index` with the value in `element_slot`.
    #[link_name = "wrenSetListElement"]
    pub fn wren_set_list_element(vm: *mut WrenVM, list_slot: c_int, index: c_int, element_slot: c_int);

    /// Inserts before `index`; `index` may equal the count to append.
    #[link_name = "wrenInsertInList"]
    pub fn wren_insert_in_list(vm: *mut WrenVM, list_slot: c_int, index: c_int, element_slot: c_int);

    // Maps

    /// Number of entries of the map in `slot`.
    #[link_name = "wrenGetMapCount"]
    pub fn wren_get_map_count(vm: *mut WrenVM, slot: c_int) -> c_int;

    /// Returns true if the map has the key in `key_slot`.
    #[link_name = "wrenGetMapContainsKey"]
    pub fn wren_get_map_contains_key(vm: *mut WrenVM, map_slot: c_int, key_slot: c_int) -> bool;

    /// Copies the value under the key in `key_slot`, or null, into
    /// `value_slot`.
    #[link_name = "wrenGetMapValue"]
    pub fn wren_get_map_value(vm: *mut WrenVM, map_slot: c_int, key_slot: c_int, value_slot: c_int);

    /// Stores the value in `value_slot` under the key in `key_slot`.
    #[link_name = "wrenSetMapValue"]
    pub fn wren_set_map_value(vm: *mut WrenVM, map_slot: c_int, key_slot: c_int, value_slot: c_int);

    /// Removes a key, storing the removed value, or null, in
    /// `removed_value_slot`.
    #[link_name = "wrenRemoveMapValue"]
    pub fn wren_remove_map_value(vm: *mut WrenVM, map_slot: c_int, key_slot: c_int, removed_value_slot: c_int);

    // Variables

    /// Copies a top-level variable into `slot`. The module and the
    /// variable must exist.
    #[link_name = "wrenGetVariable"]
    pub fn wren_get_variable(vm: *mut WrenVM, module: *const c_char, name: *const c_char, slot: c_int);

    /// The module must exist.
    #[link_name = "wrenHasVariable"]
    pub fn wren_has_variable(vm: *mut WrenVM, module: *const c_char, name: *const c_char) -> bool;

    /// Returns true if `module` has been loaded.
    #[link_name = "wrenHasModule"]
    pub fn wren_has_module(vm: *mut WrenVM, module: *const c_char) -> bool;

    // Fibers and user data

    /// Aborts the current fiber with the value in `slot` as its error.
    #[link_name = "wrenAbortFiber"]
    pub fn wren_abort_fiber(vm: *mut WrenVM, slot: c_int);

    /// The configured user data.
    #[link_name = "wrenGetUserData"]
    pub fn wren_get_user_data(vm: *mut WrenVM) -> *mut c_void;

    /// Replaces the user data.
    #[link_name = "wrenSetUserData"]
    pub fn wren_set_user_data(vm: *mut WrenVM, user_data: *mut c_void);
}
