// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the embedding bridge

use thiserror::Error;

use crate::slots::SlotType;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a VM
#[derive(Debug, Error)]
pub enum Error {
    /// Source failed to compile
    #[error("Compile error: {0}")]
    Compile(String),

    /// Script raised an uncaught error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// The trampoline table has no free stubs left
    #[error("Trampoline capacity exceeded: a table of {capacity} stubs takes {} registrations", .capacity.saturating_sub(1))]
    CapacityExceeded {
        /// Number of stubs in the table
        capacity: usize,
    },

    /// A foreign class was declared without a registered allocator.
    /// The VM is unusable afterwards.
    #[error("No allocator bound for foreign class '{class}' in module '{module}'")]
    UnboundForeignClass {
        /// Module declaring the class
        module: String,
        /// Class name
        class: String,
    },

    /// Slot index past the current slot count
    #[error("Slot {slot} is out of range (slot count is {count})")]
    SlotOutOfRange {
        /// Requested slot
        slot: usize,
        /// Current slot count
        count: usize,
    },

    /// Typed slot access found a different kind of value
    #[error("Slot {slot} holds {found}, expected {expected}")]
    SlotType {
        /// Requested slot
        slot: usize,
        /// Kind the accessor reads
        expected: SlotType,
        /// Kind actually stored
        found: SlotType,
    },

    /// List element index past the end of the list
    #[error("List index {index} is out of range (list has {count} elements)")]
    ListIndex {
        /// Requested index
        index: i64,
        /// Number of elements
        count: usize,
    },

    /// Foreign object is not of the requested host type
    #[error("Foreign object in slot {0} has a different host type")]
    ForeignType(usize),

    /// Foreign object is already borrowed by an outer foreign call
    #[error("Foreign object in slot {0} is already in use")]
    ForeignBorrowed(usize),

    /// The engine was called into from inside a foreign method
    #[error("Cannot call into the VM from inside a foreign method")]
    ForeignReentry,

    /// `call` on a handle that was not made from a signature
    #[error("Handle is not a call handle")]
    NotCallable,

    /// Top-level variable lookup failed
    #[error("Variable '{name}' is not defined in module '{module}'")]
    UnknownVariable {
        /// Module searched
        module: String,
        /// Variable name
        name: String,
    },

    /// `free` was refused because handles are still alive
    #[error("{0} handle(s) still alive")]
    OutstandingHandles(usize),

    /// Strings passed to the engine cannot contain NUL
    #[error("String contains an interior NUL byte: {0}")]
    InteriorNul(#[from] std::ffi::NulError),

    /// Slot string is not valid UTF-8
    #[error("Invalid UTF-8 in string slot: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Error raised by host code inside a foreign method or allocator
    #[error("{0}")]
    Host(String),
}

impl Error {
    /// Create an error to return from a foreign method
    pub fn host(msg: impl Into<String>) -> Self {
        Self::Host(msg.into())
    }

    /// Returns true for errors that leave the VM unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnboundForeignClass { .. })
    }
}
