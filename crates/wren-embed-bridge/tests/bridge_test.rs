// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bridge integration tests

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use wren_embed_bridge::{
    Bridge, Configuration, Error, ErrorKind, ForeignAllocator, ForeignMethod, ForeignObject,
    InterpretResult, SlotType, Vm, VmContext,
};

type Errors = Arc<Mutex<Vec<(ErrorKind, Option<String>, i32, String)>>>;

struct Capture {
    output: Arc<Mutex<String>>,
    errors: Errors,
    bridge: Arc<Bridge>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("wren_embed_bridge=debug")
        .with_test_writer()
        .try_init();
}

impl Capture {
    fn new() -> Self {
        init_tracing();
        Self {
            output: Arc::new(Mutex::new(String::new())),
            errors: Arc::new(Mutex::new(Vec::new())),
            bridge: Arc::new(Bridge::new()),
        }
    }

    fn config(&self) -> Configuration {
        let output = self.output.clone();
        let errors = self.errors.clone();
        Configuration::new()
            .with_bridge(self.bridge.clone())
            .with_write(move |text| output.lock().push_str(text))
            .with_error(move |kind, module, line, message| {
                errors
                    .lock()
                    .push((kind, module.map(str::to_string), line, message.to_string()))
            })
    }

    fn vm(&self) -> Vm {
        Vm::new(self.config())
    }

    fn output(&self) -> String {
        self.output.lock().clone()
    }

    fn error_kinds(&self) -> Vec<ErrorKind> {
        self.errors.lock().iter().map(|e| e.0).collect()
    }
}

// =============================================================================
// Interpret and callbacks
// =============================================================================

#[test]
fn test_print_is_captured() {
    let capture = Capture::new();
    let vm = capture.vm();
    vm.interpret("main", r#"System.print("Hello there!")"#).unwrap();
    assert_eq!(capture.output(), "Hello there!\n");
}

#[test]
fn test_compile_error_reported() {
    let capture = Capture::new();
    let vm = capture.vm();
    let result = vm.interpret("main", "Hay, it's me, an error!");
    assert_eq!(InterpretResult::of(&result), InterpretResult::CompileError);
    match result {
        Err(Error::Compile(message)) => {
            assert!(message.starts_with("[main line 1] Error at ','"), "{}", message)
        }
        other => panic!("expected compile error, got {:?}", other),
    }
    assert!(capture.error_kinds().contains(&ErrorKind::Compile));
}

#[test]
fn test_runtime_error_reported_with_trace() {
    let capture = Capture::new();
    let vm = capture.vm();
    let result = vm.interpret("main", "class A {\n  static f() {\n    Fiber.abort(\"bad\")\n  }\n}\nA.f()\n");
    assert!(matches!(result, Err(Error::Runtime(ref m)) if m == "bad"), "{:?}", result);
    assert_eq!(
        capture.error_kinds(),
        vec![ErrorKind::Runtime, ErrorKind::StackTrace, ErrorKind::StackTrace]
    );
    let errors = capture.errors.lock();
    assert_eq!(errors[0].1, None);
    let (_, module, line, function) = &errors[1];
    assert_eq!(module.as_deref(), Some("main"));
    assert_eq!(*line, 3);
    assert!(function.contains("f()"), "{}", function);
    assert_eq!(errors[2].2, 6);
}

#[test]
fn test_runs_standard_wren() {
    let capture = Capture::new();
    let vm = capture.vm();
    let source = r#"
var scores = {"ada": 3, "alan": 4}
var double = Fn.new {|x| x * 2 }
System.print([1, 2, 3].map {|n| double.call(n) }.toList)
var total = 0
for (name in scores.keys) total = total + scores[name]
System.print(total)
var counter = Fiber.new {
  Fiber.yield("one")
  Fiber.yield("two")
}
System.print("%(counter.call()) %(counter.call())")
System.print((1..10).where {|n| n % 3 == 0 }.toList)
"#;
    vm.interpret("main", source).unwrap();
    assert_eq!(capture.output(), "[2, 4, 6]\n7\none two\n[3, 6, 9]\n");
    assert!(capture.errors.lock().is_empty());
}

#[test]
fn test_imports_use_resolve_and_load() {
    let capture = Capture::new();
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    let config = capture
        .config()
        .with_resolve_module(|_importer, name| Some(format!("lib/{}", name)))
        .with_load_module(move |name| {
            counter.fetch_add(1, Ordering::SeqCst);
            (name == "lib/greet").then(|| "var Greeting = \"hello from lib\"".to_string())
        });
    let vm = Vm::new(config);

    vm.interpret("main", "import \"greet\" for Greeting\nSystem.print(Greeting)")
        .unwrap();
    vm.interpret("main", "import \"greet\"").unwrap();
    assert_eq!(capture.output(), "hello from lib\n");
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(vm.context().has_module("lib/greet").unwrap());

    let missing = vm.interpret("main", "import \"nothing\"");
    assert!(matches!(missing, Err(Error::Runtime(ref m)) if m.contains("lib/nothing")), "{:?}", missing);
}

#[test]
fn test_import_compile_error_keeps_runtime_message() {
    let capture = Capture::new();
    let vm = Vm::new(
        capture
            .config()
            .with_load_module(|name| (name == "broken").then(|| "var = \n".to_string())),
    );
    let result = vm.interpret("main", "import \"broken\"");
    match &result {
        Err(Error::Runtime(message)) => {
            assert!(message.contains("broken"), "{}", message);
            assert!(!message.starts_with("[broken line"), "{}", message);
        }
        other => panic!("expected runtime error, got {:?}", other),
    }
    let errors = capture.errors.lock();
    assert_eq!(errors[0].0, ErrorKind::Compile);
    assert_eq!(errors[0].1.as_deref(), Some("broken"));
    assert!(errors.iter().any(|e| e.0 == ErrorKind::Runtime));
}

#[test]
fn test_unresolved_import_is_runtime_error() {
    let capture = Capture::new();
    let vm = Vm::new(capture.config().with_resolve_module(|_, _| None));
    let result = vm.interpret("main", "import \"anything\"");
    assert!(matches!(result, Err(Error::Runtime(_))), "{:?}", result);
}

// =============================================================================
// Slots
// =============================================================================

#[test]
fn test_slot_round_trips() {
    let capture = Capture::new();
    let vm = capture.vm();
    let ctx = vm.context();
    ctx.ensure_slots(1);

    for value in [true, false] {
        ctx.set_bool(0, value).unwrap();
        assert_eq!(ctx.get_bool(0).unwrap(), value);
    }
    for value in [0.0, -1.5, 1.337, 1e300, f64::INFINITY] {
        ctx.set_number(0, value).unwrap();
        assert_eq!(ctx.get_number(0).unwrap(), value);
    }
    for value in ["", "Hi", "héllo wörld"] {
        ctx.set_string(0, value).unwrap();
        assert_eq!(ctx.get_string(0).unwrap(), value);
    }
    let bytes = b"Hel\0lo\xff".to_vec();
    ctx.set_bytes(0, &bytes).unwrap();
    assert_eq!(ctx.get_bytes(0).unwrap(), bytes);
    assert!(matches!(ctx.get_string(0), Err(Error::Utf8(_))));

    ctx.set_null(0).unwrap();
    assert_eq!(ctx.slot_type(0).unwrap(), SlotType::Null);
}

#[test]
fn test_ensure_slots_only_grows() {
    let capture = Capture::new();
    let vm = capture.vm();
    let ctx = vm.context();
    ctx.ensure_slots(1);
    assert!(ctx.slot_count() >= 1);
    ctx.ensure_slots(6);
    assert!(ctx.slot_count() >= 6);
    ctx.ensure_slots(2);
    assert!(ctx.slot_count() >= 6);
}

#[test]
fn test_slot_errors() {
    let capture = Capture::new();
    let vm = capture.vm();
    let ctx = vm.context();
    ctx.ensure_slots(2);

    ctx.set_number(0, 3.0).unwrap();
    assert!(matches!(
        ctx.get_bool(0),
        Err(Error::SlotType { slot: 0, expected: SlotType::Bool, found: SlotType::Num })
    ));
    let count = ctx.slot_count();
    assert!(matches!(
        ctx.set_number(count, 1.0),
        Err(Error::SlotOutOfRange { slot, .. }) if slot == count
    ));
    assert!(matches!(
        ctx.get_variable("main", "Nope", 0),
        Err(Error::UnknownVariable { .. })
    ));
}

#[test]
fn test_list_operations() {
    let capture = Capture::new();
    let vm = capture.vm();
    let ctx = vm.context();
    ctx.ensure_slots(2);
    ctx.set_new_list(0).unwrap();
    assert_eq!(ctx.slot_type(0).unwrap(), SlotType::List);

    for (i, word) in ["a", "b", "c"].into_iter().enumerate() {
        ctx.set_string(1, word).unwrap();
        ctx.list_insert_element(0, -1, 1).unwrap();
        assert_eq!(ctx.list_count(0).unwrap(), i + 1);
    }
    ctx.set_string(1, "start").unwrap();
    ctx.list_insert_element(0, 0, 1).unwrap();
    ctx.set_string(1, "C").unwrap();
    ctx.list_set_element(0, -1, 1).unwrap();

    let mut words = Vec::new();
    for i in 0..ctx.list_count(0).unwrap() {
        ctx.list_get_element(0, i as i64, 1).unwrap();
        words.push(ctx.get_string(1).unwrap());
    }
    assert_eq!(words, ["start", "a", "b", "C"]);
    assert!(matches!(
        ctx.list_get_element(0, 4, 1),
        Err(Error::ListIndex { index: 4, count: 4 })
    ));
}

#[test]
fn test_map_operations() {
    let capture = Capture::new();
    let vm = capture.vm();
    vm.interpret("main", "var ages = {\"ada\": 36}").unwrap();

    let ctx = vm.context();
    ctx.ensure_slots(3);
    ctx.get_variable("main", "ages", 0).unwrap();
    assert_eq!(ctx.slot_type(0).unwrap(), SlotType::Map);
    assert_eq!(ctx.map_count(0).unwrap(), 1);

    ctx.set_new_map(0).unwrap();
    ctx.set_string(1, "answer").unwrap();
    ctx.set_number(2, 42.0).unwrap();
    ctx.map_set_value(0, 1, 2).unwrap();
    assert_eq!(ctx.map_count(0).unwrap(), 1);
    assert!(ctx.map_contains_key(0, 1).unwrap());

    ctx.set_null(2).unwrap();
    ctx.map_get_value(0, 1, 2).unwrap();
    assert_eq!(ctx.get_number(2).unwrap(), 42.0);

    ctx.map_remove_value(0, 1, 2).unwrap();
    assert_eq!(ctx.get_number(2).unwrap(), 42.0);
    assert_eq!(ctx.map_count(0).unwrap(), 0);
    ctx.map_get_value(0, 1, 2).unwrap();
    assert_eq!(ctx.slot_type(2).unwrap(), SlotType::Null);

    ctx.set_new_list(1).unwrap();
    assert!(matches!(
        ctx.map_contains_key(0, 1),
        Err(Error::SlotType { slot: 1, found: SlotType::List, .. })
    ));
    assert!(matches!(
        ctx.map_count(1),
        Err(Error::SlotType { expected: SlotType::Map, .. })
    ));
}

// =============================================================================
// Handles
// =============================================================================

#[test]
fn test_call_handle_do_add() {
    let capture = Capture::new();
    let vm = capture.vm();
    vm.interpret("main", "class WrenMath {\n  static do_add(a, b) {\n    return a + b\n  }\n}\n")
        .unwrap();

    let ctx = vm.context();
    let add = ctx.new_call_handle("do_add(_,_)").unwrap();
    ctx.ensure_slots(3);
    ctx.get_variable("main", "WrenMath", 0).unwrap();
    ctx.set_number(1, 228.0).unwrap();
    ctx.set_number(2, 1337.0).unwrap();

    let result = add.call();
    assert_eq!(InterpretResult::of(&result), InterpretResult::Success);
    assert_eq!(ctx.get_number(0).unwrap(), 1565.0);
    add.release();
}

#[test]
fn test_call_handle_reused_with_class_handle() {
    let capture = Capture::new();
    let vm = capture.vm();
    vm.interpret(
        "main",
        "class WrenMath {\n  static do_sub(a, b) { a - b }\n  static do_mul(a, b) { a * b }\n}\n",
    )
    .unwrap();

    let ctx = vm.context();
    ctx.ensure_slots(3);
    ctx.get_variable("main", "WrenMath", 0).unwrap();
    let class = ctx.new_handle(0).unwrap();
    let sub = ctx.new_call_handle("do_sub(_,_)").unwrap();
    let mul = ctx.new_call_handle("do_mul(_,_)").unwrap();

    let mut results = Vec::new();
    for handle in [&sub, &mul] {
        ctx.set_handle(0, &class).unwrap();
        ctx.set_number(1, 9.0).unwrap();
        ctx.set_number(2, 3.0).unwrap();
        handle.call().unwrap();
        results.push(ctx.get_number(0).unwrap());
    }
    assert_eq!(results, vec![6.0, 27.0]);
    assert_eq!(vm.handle_count(), 3);
    for handle in [class, sub, mul] {
        handle.release();
    }
    assert_eq!(vm.handle_count(), 0);
}

#[test]
fn test_value_handle_is_not_callable() {
    let capture = Capture::new();
    let vm = capture.vm();
    let ctx = vm.context();
    ctx.ensure_slots(1);
    ctx.set_number(0, 1.0).unwrap();
    let handle = ctx.new_handle(0).unwrap();
    assert!(!handle.is_call());
    assert!(matches!(handle.call(), Err(Error::NotCallable)));
}

#[test]
fn test_free_refuses_with_live_handles() {
    let capture = Capture::new();
    let vm = capture.vm();
    let handle = {
        let ctx = vm.context();
        ctx.new_call_handle("call()").unwrap()
    };

    let (vm, err) = vm.free().unwrap_err();
    assert!(matches!(err, Error::OutstandingHandles(1)));
    handle.release();
    let raw = vm.as_raw();
    vm.free().unwrap();
    assert!(!capture.bridge.registry().contains(raw));
}

#[test]
fn test_dropped_vm_waits_for_last_handle() {
    let capture = Capture::new();
    let vm = capture.vm();
    vm.interpret("main", "var kept = [1, 2, 3]").unwrap();
    let handle = {
        let ctx = vm.context();
        ctx.ensure_slots(1);
        ctx.get_variable("main", "kept", 0).unwrap();
        ctx.new_handle(0).unwrap()
    };
    let raw = vm.as_raw();
    drop(vm);

    assert!(capture.bridge.registry().contains(raw));
    handle.release();
    assert!(!capture.bridge.registry().contains(raw));
}

// =============================================================================
// Trampolines
// =============================================================================

#[test]
fn test_trampoline_capacity_boundary() {
    const CAPACITY: usize = 8;
    let bridge = Arc::new(Bridge::with_capacity(CAPACITY));
    let mut stubs = HashSet::new();
    for _ in 0..CAPACITY - 1 {
        let method: Arc<ForeignMethod> = Arc::new(|_: &VmContext<'_>| -> wren_embed_bridge::Result<()> { Ok(()) });
        let (stub, _) = bridge.methods().register(method).unwrap();
        assert!(stubs.insert(stub as usize));
    }
    assert_eq!(bridge.methods().len(), CAPACITY - 1);
    let method: Arc<ForeignMethod> = Arc::new(|_: &VmContext<'_>| -> wren_embed_bridge::Result<()> { Ok(()) });
    assert!(matches!(
        bridge.methods().register(method),
        Err(Error::CapacityExceeded { capacity: CAPACITY })
    ));
    assert!(bridge.classes().is_empty());
}

#[test]
fn test_bind_method_reports_capacity() {
    let bridge = Arc::new(Bridge::with_capacity(2));
    let vm = Vm::new(Configuration::new().with_bridge(bridge));
    vm.bind_method("Ops", true, "a()", |_| Ok(())).unwrap();
    assert!(matches!(
        vm.bind_method("Ops", true, "b()", |_| Ok(())),
        Err(Error::CapacityExceeded { capacity: 2 })
    ));
    assert!(matches!(
        vm.bind_class("Point", |_| Ok(ForeignObject::new(()))),
        Ok(_)
    ));
    // Running code is unaffected.
    vm.interpret("main", "var x = 1").unwrap();
}

// =============================================================================
// Foreign classes and methods
// =============================================================================

struct Deity {
    title: String,
    drops: Arc<AtomicUsize>,
}

impl Drop for Deity {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

const GOD: &str = r#"
foreign class God {
  construct new(title) {}
  foreign getMessage(name)
  foreign title
  foreign static smite(reason)
  foreign static explode()
}
"#;

fn god_vm(capture: &Capture, drops: Arc<AtomicUsize>) -> Vm {
    let vm = capture.vm();
    vm.bind_class("God", move |ctx| {
        Ok(ForeignObject::new(Deity {
            title: ctx.get_string(1)?,
            drops: drops.clone(),
        }))
    })
    .unwrap();
    vm.bind_method("God", false, "getMessage(_)", |ctx| {
        let name = ctx.get_string(1)?;
        let title = ctx.with_foreign(0, |deity: &mut Deity| deity.title.clone())?;
        ctx.set_string(0, &format!("{} says hello to {}", title, name))
    })
    .unwrap();
    vm.bind_method("God", false, "title", |ctx| {
        let title = ctx.with_foreign(0, |deity: &mut Deity| deity.title.clone())?;
        ctx.set_string(0, &title)
    })
    .unwrap();
    vm.bind_method("God", true, "smite(_)", |ctx| {
        Err(Error::host(format!("smitten: {}", ctx.get_string(1)?)))
    })
    .unwrap();
    vm.bind_method("God", true, "explode()", |_| panic!("kaboom")).unwrap();
    vm.interpret("main", GOD).unwrap();
    vm
}

#[test]
fn test_foreign_class_round_trip() {
    let capture = Capture::new();
    let drops = Arc::new(AtomicUsize::new(0));
    {
        let vm = god_vm(&capture, drops.clone());
        vm.interpret("main", "var god = God.new(\"Zeus\")\nSystem.print(god.getMessage(\"Bob\"))\nSystem.print(god.title)")
            .unwrap();
        assert_eq!(capture.output(), "Zeus says hello to Bob\nZeus\n");
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        let ctx = vm.context();
        ctx.ensure_slots(1);
        ctx.get_variable("main", "god", 0).unwrap();
        assert_eq!(ctx.slot_type(0).unwrap(), SlotType::Foreign);
        assert!(matches!(
            ctx.with_foreign(0, |_: &mut String| ()),
            Err(Error::ForeignType(0))
        ));
        ctx.set_null(0).unwrap();
    }
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_foreign_error_aborts_fiber() {
    let capture = Capture::new();
    let vm = god_vm(&capture, Arc::new(AtomicUsize::new(0)));
    let result = vm.interpret("main", "God.smite(\"pride\")");
    assert!(matches!(result, Err(Error::Runtime(ref m)) if m == "smitten: pride"), "{:?}", result);
}

#[test]
fn test_foreign_panic_aborts_fiber() {
    let capture = Capture::new();
    let vm = god_vm(&capture, Arc::new(AtomicUsize::new(0)));
    let result = vm.interpret("main", "God.explode()");
    assert!(
        matches!(result, Err(Error::Runtime(ref m)) if m == "Foreign method panicked: kaboom"),
        "{:?}",
        result
    );
    // The VM stays usable.
    vm.interpret("main", "System.print(\"still here\")").unwrap();
    assert_eq!(capture.output(), "still here\n");
}

#[test]
fn test_allocator_error_aborts_construction() {
    let capture = Capture::new();
    let vm = god_vm(&capture, Arc::new(AtomicUsize::new(0)));
    let result = vm.interpret("main", "God.new(42)");
    assert!(matches!(result, Err(Error::Runtime(ref m)) if m.contains("expected string")), "{:?}", result);
}

#[test]
fn test_unbound_foreign_method_is_runtime_error() {
    let capture = Capture::new();
    let vm = capture.vm();
    // The engine binds foreign methods when the class is defined.
    let result = vm.interpret("main", "class Oracle {\n  foreign static ask()\n}\n");
    assert!(matches!(result, Err(Error::Runtime(ref m)) if m.contains("ask()")), "{:?}", result);
    // Recoverable: the VM keeps working.
    vm.interpret("main", "var ok = true").unwrap();
}

#[test]
fn test_bind_method_callback_fills_missing_bindings() {
    let capture = Capture::new();
    let asked = Arc::new(Mutex::new(Vec::new()));
    let log = asked.clone();
    let vm = Vm::new(
        capture
            .config()
            .with_load_module(|name| {
                (name == "tools").then(|| "class Tools {\n  foreign static run(n)\n}\n".to_string())
            })
            .with_bind_foreign_method(move |module, class, is_static, signature| {
                log.lock().push(format!("{} {} {} {}", module, class, is_static, signature));
                (signature == "run(_)").then(|| {
                    let method: Arc<ForeignMethod> =
                        Arc::new(|ctx: &VmContext<'_>| -> wren_embed_bridge::Result<()> {
                            let n = ctx.get_number(1)?;
                            ctx.set_number(0, n + 1.0)
                        });
                    method
                })
            }),
    );
    vm.bind_method("Local", true, "id", |ctx| ctx.set_number(0, 7.0)).unwrap();

    vm.interpret(
        "main",
        "import \"tools\" for Tools\nclass Local {\n  foreign static id\n}\nSystem.print(Tools.run(Local.id))\n",
    )
    .unwrap();
    assert_eq!(capture.output(), "8\n");
    // Table hits never reach the callback.
    assert_eq!(*asked.lock(), vec!["tools Tools true run(_)".to_string()]);

    let result = vm.interpret("main", "class Other {\n  foreign static nope()\n}\n");
    assert!(matches!(result, Err(Error::Runtime(_))), "{:?}", result);
}

#[test]
fn test_bind_class_callback_fills_missing_bindings() {
    let capture = Capture::new();
    let vm = Vm::new(capture.config().with_bind_foreign_class(|module, class| {
        (module == "main" && class == "Counter").then(|| {
            let allocate: Arc<ForeignAllocator> =
                Arc::new(|ctx: &VmContext<'_>| -> wren_embed_bridge::Result<ForeignObject> {
                    Ok(ForeignObject::new(ctx.get_number(1)?))
                });
            allocate
        })
    }));
    vm.bind_method("Counter", false, "next()", |ctx| {
        let value = ctx.with_foreign(0, |count: &mut f64| {
            *count += 1.0;
            *count
        })?;
        ctx.set_number(0, value)
    })
    .unwrap();

    vm.interpret(
        "main",
        "foreign class Counter {\n  construct new(start) {}\n  foreign next()\n}\nvar c = Counter.new(10)\nc.next()\nSystem.print(c.next())\n",
    )
    .unwrap();
    assert_eq!(capture.output(), "12\n");
    assert_eq!(vm.bridge().classes().len(), 1);

    let result = vm.interpret("main", "foreign class Missing {}\n");
    assert!(matches!(result, Err(Error::UnboundForeignClass { ref class, .. }) if class == "Missing"));
}

#[test]
fn test_unbound_foreign_class_is_fatal() {
    let capture = Capture::new();
    let vm = capture.vm();
    let result = vm.interpret("main", "foreign class Ghost {\n  construct new() {}\n}\nGhost.new()\n");
    match &result {
        Err(err @ Error::UnboundForeignClass { module, class }) => {
            assert_eq!(module, "main");
            assert_eq!(class, "Ghost");
            assert!(err.is_fatal());
        }
        other => panic!("expected unbound foreign class, got {:?}", other),
    }
    assert_eq!(InterpretResult::of(&result), InterpretResult::RuntimeError);
    assert!(matches!(
        vm.interpret("main", "var x = 1"),
        Err(Error::UnboundForeignClass { .. })
    ));
}

#[test]
fn test_bindings_outside_main_module_rejected() {
    let capture = Capture::new();
    let vm = Vm::new(capture.config().with_load_module(|name| {
        (name == "tools").then(|| "class Tools {\n  foreign static run()\n}\n".to_string())
    }));
    vm.bind_method("Tools", true, "run()", |ctx| ctx.set_number(0, 1.0)).unwrap();
    let result = vm.interpret("main", "import \"tools\" for Tools");
    assert!(matches!(result, Err(Error::Runtime(ref m)) if m.contains("run()")), "{:?}", result);
}

#[test]
fn test_abort_fiber_from_host() {
    let capture = Capture::new();
    let vm = capture.vm();
    vm.bind_method("Guard", true, "check(_)", |ctx| {
        if ctx.get_number(1)? < 0.0 {
            ctx.set_string(0, "negative")?;
            ctx.abort_fiber(0)?;
        }
        Ok(())
    })
    .unwrap();
    vm.interpret("main", "class Guard {\n  foreign static check(n)\n}\nGuard.check(1)\n")
        .unwrap();
    let result = vm.interpret("main", "Guard.check(-1)");
    assert!(matches!(result, Err(Error::Runtime(ref m)) if m == "negative"), "{:?}", result);
}

#[test]
fn test_call_from_foreign_method_is_refused() {
    let capture = Capture::new();
    let vm = capture.vm();
    vm.bind_method("Host", true, "apply(_)", |ctx| {
        let call = ctx.new_call_handle("call()")?;
        let function = ctx.get_handle(1)?;
        ctx.set_handle(0, &function)?;
        call.call()
    })
    .unwrap();
    let result = vm.interpret(
        "main",
        "class Host {\n  foreign static apply(f)\n}\nHost.apply(Fn.new { 1 })\n",
    );
    assert!(
        matches!(result, Err(Error::Runtime(ref m)) if m == &Error::ForeignReentry.to_string()),
        "{:?}",
        result
    );
    assert_eq!(vm.handle_count(), 0);
    // Outside a foreign method the same call works.
    vm.interpret("main", "var ok = true").unwrap();
}

// =============================================================================
// Many VMs
// =============================================================================

#[test]
fn test_vms_on_many_threads() {
    let threads: Vec<_> = (0..4)
        .map(|n| {
            std::thread::spawn(move || {
                let output = Arc::new(Mutex::new(String::new()));
                let sink = output.clone();
                let vm = Vm::new(Configuration::new().with_write(move |text| sink.lock().push_str(text)));
                vm.bind_method("Worker", true, "id", move |ctx| ctx.set_number(0, n as f64))
                    .unwrap();
                vm.interpret(
                    "main",
                    "class Worker {\n  foreign static id\n}\nfor (i in 1..3) System.print(Worker.id)\n",
                )
                .unwrap();
                vm.free().unwrap();
                let text = output.lock().clone();
                (n, text)
            })
        })
        .collect();

    for thread in threads {
        let (n, text) = thread.join().unwrap();
        assert_eq!(text, format!("{n}\n{n}\n{n}\n"));
    }
}

#[test]
fn test_version_numbers() {
    assert_eq!(wren_embed_bridge::engine_version(), 4000);
    assert!(!wren_embed_bridge::VERSION.is_empty());
}
