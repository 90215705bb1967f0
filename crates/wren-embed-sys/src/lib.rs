// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # wren-embed-sys
//!
//! Raw declarations of the Wren 0.4 embedding API (`wren.h`).
//!
//! The C library itself is compiled and linked by `ruwren-sys`; this crate
//! only declares the functions and types the bridge calls, under snake_case
//! names.
//!
//! ## Quick Start
//!
//! ```rust
//! use wren_embed_sys::ffi::*;
//!
//! unsafe {
//!     let mut config = std::mem::MaybeUninit::<WrenConfiguration>::uninit();
//!     wren_init_configuration(config.as_mut_ptr());
//!     let mut config = config.assume_init();
//!     let vm = wren_new_vm(&mut config);
//!     let result = wren_interpret(vm, c"main".as_ptr(), c"var x = {1: [2, 3]}".as_ptr());
//!     assert_eq!(result, WrenInterpretResult::Success);
//!     wren_free_vm(vm);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ffi;

/// Major version of the declared API
pub const WREN_VERSION_MAJOR: i32 = 0;
/// Minor version of the declared API
pub const WREN_VERSION_MINOR: i32 = 4;
/// Patch version of the declared API
pub const WREN_VERSION_PATCH: i32 = 0;
/// Version packed as `major * 1000000 + minor * 1000 + patch`, the value
/// [`ffi::wren_get_version_number`] reports
pub const WREN_VERSION_NUMBER: i32 =
    WREN_VERSION_MAJOR * 1_000_000 + WREN_VERSION_MINOR * 1_000 + WREN_VERSION_PATCH;
