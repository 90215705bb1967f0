// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The shared registries behind every VM.

use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::registry::VmRegistry;
use crate::trampoline::{
    CLASS_STUBS, ForeignAllocator, ForeignMethod, METHOD_STUBS, TRAMPOLINE_CAPACITY, TrampolineTable,
};

static GLOBAL: LazyLock<Arc<Bridge>> = LazyLock::new(|| Arc::new(Bridge::new()));

/// VM registry plus the two trampoline tables.
///
/// VMs use [`Bridge::global`] unless configured with their own bridge.
/// A bridge lives as long as the VMs registered in it.
pub struct Bridge {
    registry: VmRegistry,
    methods: TrampolineTable<ForeignMethod>,
    classes: TrampolineTable<ForeignAllocator>,
}

impl Bridge {
    /// Create a bridge using every generated stub
    pub fn new() -> Self {
        Self::with_capacity(TRAMPOLINE_CAPACITY)
    }

    /// Create a bridge limited to `capacity` stubs per table. The limit is
    /// clamped to [`TRAMPOLINE_CAPACITY`].
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            registry: VmRegistry::new(),
            methods: TrampolineTable::new("methods", &METHOD_STUBS, capacity),
            classes: TrampolineTable::new("classes", &CLASS_STUBS, capacity),
        }
    }

    /// The process-wide bridge
    pub fn global() -> Arc<Bridge> {
        GLOBAL.clone()
    }

    /// Live VMs
    pub fn registry(&self) -> &VmRegistry {
        &self.registry
    }

    /// Foreign method trampolines
    pub fn methods(&self) -> &TrampolineTable<ForeignMethod> {
        &self.methods
    }

    /// Foreign class allocator trampolines
    pub fn classes(&self) -> &TrampolineTable<ForeignAllocator> {
        &self.classes
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("vms", &self.registry.len())
            .field("methods", &self.methods)
            .field("classes", &self.classes)
            .finish()
    }
}
