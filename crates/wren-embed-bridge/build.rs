// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Generates the trampoline stub tables.
//!
//! The number of stubs is read from `WREN_EMBED_TRAMPOLINES` (default 256,
//! at least 2) and written to `$OUT_DIR/trampolines.rs`, which
//! `src/trampoline.rs` includes.

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

const DEFAULT_CAPACITY: usize = 256;

fn main() {
    println!("cargo:rerun-if-env-changed=WREN_EMBED_TRAMPOLINES");
    println!("cargo:rerun-if-changed=build.rs");

    let capacity = match env::var("WREN_EMBED_TRAMPOLINES") {
        Ok(value) => match value.trim().parse::<usize>() {
            Ok(n) if n > 1 => n,
            _ => {
                println!(
                    "cargo:warning=WREN_EMBED_TRAMPOLINES must be an integer above 1, using {}",
                    DEFAULT_CAPACITY
                );
                DEFAULT_CAPACITY
            }
        },
        Err(_) => DEFAULT_CAPACITY,
    };

    let mut out = String::new();
    writeln!(out, "// @generated by wren-embed-bridge/build.rs").unwrap();
    writeln!(out, "//").unwrap();
    writeln!(
        out,
        "// Included by src/trampoline.rs, which must have `WrenForeignMethodFn`,"
    )
    .unwrap();
    writeln!(
        out,
        "// `method_stub::<ID>` and `class_stub::<ID>` in scope at the include! site."
    )
    .unwrap();
    writeln!(out).unwrap();
    writeln!(out, "/// Number of stubs generated per trampoline table.").unwrap();
    writeln!(out, "pub const TRAMPOLINE_CAPACITY: usize = {};", capacity).unwrap();
    for (table, stub) in [("METHOD_STUBS", "method_stub"), ("CLASS_STUBS", "class_stub")] {
        writeln!(
            out,
            "pub(crate) static {}: [WrenForeignMethodFn; TRAMPOLINE_CAPACITY] = [",
            table
        )
        .unwrap();
        for id in 0..capacity {
            writeln!(out, "    {}::<{}>,", stub, id).unwrap();
        }
        writeln!(out, "];").unwrap();
    }

    let path = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo")).join("trampolines.rs");
    fs::write(&path, out).expect("failed to write trampoline table");
}
