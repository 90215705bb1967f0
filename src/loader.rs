// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module loading from disk.
//!
//! Imports starting with `./` or `../` are resolved against the importing
//! module's directory; other names are taken as paths from the root. A
//! module named `lib/util` is read from `<root>/lib/util.wren`.

use std::path::{Component, Path, PathBuf};

use wren_embed_bridge::{Configuration, DEFAULT_MODULE};

/// File extension of script modules
pub const EXTENSION: &str = "wren";

/// Loads imported modules from a directory tree
#[derive(Debug, Clone)]
pub struct ModuleLoader {
    root: PathBuf,
}

impl ModuleLoader {
    /// Loader for modules below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Canonical name of `name` imported from `importer`
    pub fn resolve(importer: &str, name: &str) -> String {
        if !(name.starts_with("./") || name.starts_with("../")) {
            return name.to_string();
        }

        let base = if importer == DEFAULT_MODULE {
            Path::new("")
        } else {
            Path::new(importer).parent().unwrap_or(Path::new(""))
        };

        let mut parts: Vec<String> = Vec::new();
        for component in base.join(name).components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::ParentDir => {
                    parts.pop();
                }
                _ => {}
            }
        }
        parts.join("/")
    }

    /// Path of the file holding module `name`
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, EXTENSION))
    }

    /// Source of module `name`, if its file exists
    pub fn load(&self, name: &str) -> Option<String> {
        let path = self.path_of(name);
        match std::fs::read_to_string(&path) {
            Ok(source) => {
                tracing::debug!(module = name, path = %path.display(), "module loaded");
                Some(source)
            }
            Err(err) => {
                tracing::debug!(module = name, path = %path.display(), %err, "module not loaded");
                None
            }
        }
    }

    /// Installs this loader's resolve and load callbacks
    pub fn install(self, config: Configuration) -> Configuration {
        config
            .with_resolve_module(|importer, name| Some(Self::resolve(importer, name)))
            .with_load_module(move |name| self.load(name))
    }
}
