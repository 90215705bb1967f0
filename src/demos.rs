// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Small programs showing the embedding API

use clap::ValueEnum;
use wren_embed_bridge::{Configuration, DEFAULT_MODULE, ForeignObject, Result, Vm};

/// Available demos
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// Call script methods from the host through call handles
    Handles,
    /// Back a script class with a host object
    Foreign,
}

impl Demo {
    /// Runs the demo, printing through the configured write callback
    pub fn run(self, config: Configuration) -> Result<()> {
        match self {
            Demo::Handles => {
                let vm = Vm::new(config);
                for result in math_results(&vm)? {
                    println!("{}", result);
                }
                free(vm)
            }
            Demo::Foreign => foreign_god(config),
        }
    }
}

const MATH: &str = r#"
class WrenMath {
  static do_add(a, b) {
    return a + b
  }
  static do_sub(a, b) {
    return a - b
  }
  static do_mul(a, b) {
    return a * b
  }
  static do_div(a, b) {
    return a / b
  }
}
"#;

/// Calls each `WrenMath` operation with 9 and 3.
fn math_results(vm: &Vm) -> Result<Vec<f64>> {
    vm.interpret(DEFAULT_MODULE, MATH)?;

    let ctx = vm.context();
    let mut results = Vec::new();
    for op in ["do_add", "do_sub", "do_mul", "do_div"] {
        let handle = ctx.new_call_handle(&format!("{}(_,_)", op))?;
        ctx.ensure_slots(3);
        ctx.get_variable(DEFAULT_MODULE, "WrenMath", 0)?;
        ctx.set_number(1, 9.0)?;
        ctx.set_number(2, 3.0)?;
        handle.call()?;
        results.push(ctx.get_number(0)?);
    }
    Ok(results)
}

struct God {
    message: String,
}

const GOD: &str = r#"
foreign class God {
  construct new() {}
  foreign getMessage(name)
}

var god = God.new()
System.print(god.getMessage("Silly boy"))
"#;

fn foreign_god(config: Configuration) -> Result<()> {
    let vm = Vm::new(config);
    vm.bind_class("God", |_| {
        Ok(ForeignObject::new(God {
            message: "What are you doing?".to_string(),
        }))
    })?;
    vm.bind_method("God", false, "getMessage(_)", |ctx| {
        let name = ctx.get_string(1)?;
        let message = ctx.with_foreign(0, |god: &mut God| format!("{} {}", god.message, name))?;
        ctx.set_string(0, &message)
    })?;
    vm.interpret(DEFAULT_MODULE, GOD)?;
    free(vm)
}

fn free(vm: Vm) -> Result<()> {
    vm.free().map_err(|(_, err)| err)
}
