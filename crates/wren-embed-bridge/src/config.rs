// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! VM configuration and host callbacks

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use wren_embed_sys::ffi::{
    DEFAULT_HEAP_GROWTH_PERCENT, DEFAULT_INITIAL_HEAP_SIZE, DEFAULT_MIN_HEAP_SIZE, WrenErrorType,
};

use crate::bridge::Bridge;
use crate::error::Result;
use crate::trampoline::{ForeignAllocator, ForeignMethod};

/// Kind of error reported through the error callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Syntax error while compiling a module
    Compile,
    /// Message of an uncaught runtime error
    Runtime,
    /// One stack frame of the preceding runtime error
    StackTrace,
}

impl From<WrenErrorType> for ErrorKind {
    fn from(kind: WrenErrorType) -> Self {
        match kind {
            WrenErrorType::Compile => Self::Compile,
            WrenErrorType::Runtime => Self::Runtime,
            WrenErrorType::StackTrace => Self::StackTrace,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Compile => "ERROR_COMPILE",
            Self::Runtime => "ERROR_RUNTIME",
            Self::StackTrace => "ERROR_STACK_TRACE",
        })
    }
}

/// Outcome of running code, as a plain status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    /// Ran to completion
    Success,
    /// Source failed to compile
    CompileError,
    /// Script raised an error, or the VM is unusable
    RuntimeError,
}

impl InterpretResult {
    /// Classifies the result of [`crate::Vm::interpret`] or
    /// [`crate::Handle::call`].
    pub fn of(result: &Result<()>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(crate::Error::Compile(_)) => Self::CompileError,
            Err(_) => Self::RuntimeError,
        }
    }
}

impl fmt::Display for InterpretResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "RESULT_SUCCESS",
            Self::CompileError => "RESULT_COMPILE_ERROR",
            Self::RuntimeError => "RESULT_RUNTIME_ERROR",
        })
    }
}

/// Receives text printed by the script
pub type WriteFn = dyn Fn(&str) + Send + Sync;
/// Receives `(kind, module, line, message)`; module is `None` and line is
/// `-1` for [`ErrorKind::Runtime`]
pub type ErrorFn = dyn Fn(ErrorKind, Option<&str>, i32, &str) + Send + Sync;
/// Maps `(importer, name)` to a canonical module name
pub type ResolveModuleFn = dyn Fn(&str, &str) -> Option<String> + Send + Sync;
/// Returns the source of a module
pub type LoadModuleFn = dyn Fn(&str) -> Option<String> + Send + Sync;
/// Returns the host function for `(module, class, is_static, signature)`
/// of a foreign method that [`crate::Vm::bind_method`] did not bind
pub type BindForeignMethodFn = dyn Fn(&str, &str, bool, &str) -> Option<Arc<ForeignMethod>> + Send + Sync;
/// Returns the allocator for `(module, class)` of a foreign class that
/// [`crate::Vm::bind_class`] did not bind
pub type BindForeignClassFn = dyn Fn(&str, &str) -> Option<Arc<ForeignAllocator>> + Send + Sync;

/// Host callbacks of a VM.
///
/// Write and error always reach the host: when unset, [`default_write`] and
/// [`default_error`] are used. Module resolution and loading are only wired
/// into the engine when set; otherwise the engine's own behavior applies
/// (import names are used as written and only built-in modules load).
///
/// The bind callbacks are asked for foreign methods and classes missing
/// from the VM's binding tables. When unset, [`default_bind_foreign_method`]
/// and [`default_bind_foreign_class`] log a notice and bind nothing.
#[derive(Clone, Default)]
pub struct Callbacks {
    /// `System.print`/`System.write` output
    pub write: Option<Arc<WriteFn>>,
    /// Compile errors, runtime errors and stack traces
    pub error: Option<Arc<ErrorFn>>,
    /// Import name resolution
    pub resolve_module: Option<Arc<ResolveModuleFn>>,
    /// Module source loading
    pub load_module: Option<Arc<LoadModuleFn>>,
    /// Foreign methods not in the binding table
    pub bind_foreign_method: Option<Arc<BindForeignMethodFn>>,
    /// Foreign classes not in the binding table
    pub bind_foreign_class: Option<Arc<BindForeignClassFn>>,
}

impl Callbacks {
    pub(crate) fn write(&self, text: &str) {
        match &self.write {
            Some(write) => write(text),
            None => default_write(text),
        }
    }

    pub(crate) fn error(&self, kind: ErrorKind, module: Option<&str>, line: i32, message: &str) {
        match &self.error {
            Some(error) => error(kind, module, line, message),
            None => default_error(kind, module, line, message),
        }
    }

    pub(crate) fn bind_foreign_method(
        &self,
        module: &str,
        class: &str,
        is_static: bool,
        signature: &str,
    ) -> Option<Arc<ForeignMethod>> {
        match &self.bind_foreign_method {
            Some(bind) => bind(module, class, is_static, signature),
            None => default_bind_foreign_method(module, class, is_static, signature),
        }
    }

    pub(crate) fn bind_foreign_class(&self, module: &str, class: &str) -> Option<Arc<ForeignAllocator>> {
        match &self.bind_foreign_class {
            Some(bind) => bind(module, class),
            None => default_bind_foreign_class(module, class),
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("write", &self.write.is_some())
            .field("error", &self.error.is_some())
            .field("resolve_module", &self.resolve_module.is_some())
            .field("load_module", &self.load_module.is_some())
            .field("bind_foreign_method", &self.bind_foreign_method.is_some())
            .field("bind_foreign_class", &self.bind_foreign_class.is_some())
            .finish()
    }
}

/// Writes script output verbatim to standard output.
pub fn default_write(text: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}

/// Prints `KIND (module) Line N : message` to standard output.
pub fn default_error(kind: ErrorKind, module: Option<&str>, line: i32, message: &str) {
    println!("{}", format_error(kind, module, line, message));
}

/// Logs that host method binding is not implemented and binds nothing.
pub fn default_bind_foreign_method(
    module: &str,
    class: &str,
    is_static: bool,
    signature: &str,
) -> Option<Arc<ForeignMethod>> {
    tracing::info!(module, class, is_static, signature, "BindForeignMethod is not implemented");
    None
}

/// Logs that host class binding is not implemented and binds nothing.
pub fn default_bind_foreign_class(module: &str, class: &str) -> Option<Arc<ForeignAllocator>> {
    tracing::info!(module, class, "BindForeignClass is not implemented");
    None
}

/// Formats an error the way [`default_error`] prints it.
pub fn format_error(kind: ErrorKind, module: Option<&str>, line: i32, message: &str) -> String {
    format!("{} ({}) Line {} : {}", kind, module.unwrap_or(""), line, message)
}

/// Configuration of a new VM
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Bytes allocated before the first collection (default 10 MiB)
    pub initial_heap_size: usize,
    /// Lower bound of the collection threshold (default 1 MiB)
    pub min_heap_size: usize,
    /// Heap growth after a collection, in percent (default 50)
    pub heap_growth_percent: i32,
    /// Host callbacks
    pub callbacks: Callbacks,
    /// Registries the VM is registered in; [`Bridge::global`] when unset
    pub bridge: Option<Arc<Bridge>>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            initial_heap_size: DEFAULT_INITIAL_HEAP_SIZE,
            min_heap_size: DEFAULT_MIN_HEAP_SIZE,
            heap_growth_percent: DEFAULT_HEAP_GROWTH_PERCENT,
            callbacks: Callbacks::default(),
            bridge: None,
        }
    }
}

impl Configuration {
    /// Create a configuration with default heap settings and callbacks
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the write callback
    pub fn with_write(mut self, write: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.callbacks.write = Some(Arc::new(write));
        self
    }

    /// Set the error callback
    pub fn with_error(
        mut self,
        error: impl Fn(ErrorKind, Option<&str>, i32, &str) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.error = Some(Arc::new(error));
        self
    }

    /// Set the module resolver
    pub fn with_resolve_module(
        mut self,
        resolve: impl Fn(&str, &str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.resolve_module = Some(Arc::new(resolve));
        self
    }

    /// Set the module loader
    pub fn with_load_module(
        mut self,
        load: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.load_module = Some(Arc::new(load));
        self
    }

    /// Set the fallback for foreign methods missing from the binding table
    pub fn with_bind_foreign_method(
        mut self,
        bind: impl Fn(&str, &str, bool, &str) -> Option<Arc<ForeignMethod>> + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.bind_foreign_method = Some(Arc::new(bind));
        self
    }

    /// Set the fallback for foreign classes missing from the binding table
    pub fn with_bind_foreign_class(
        mut self,
        bind: impl Fn(&str, &str) -> Option<Arc<ForeignAllocator>> + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.bind_foreign_class = Some(Arc::new(bind));
        self
    }

    /// Set the initial heap size in bytes
    pub fn with_initial_heap_size(mut self, bytes: usize) -> Self {
        self.initial_heap_size = bytes;
        self
    }

    /// Set the minimum heap size in bytes
    pub fn with_min_heap_size(mut self, bytes: usize) -> Self {
        self.min_heap_size = bytes;
        self
    }

    /// Set the heap growth percentage
    pub fn with_heap_growth_percent(mut self, percent: i32) -> Self {
        self.heap_growth_percent = percent;
        self
    }

    /// Register the VM in `bridge` instead of the global one
    pub fn with_bridge(mut self, bridge: Arc<Bridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }
}
