mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{idx, op, ClassBytes, MethodHandlers, ACC_PUBLIC, ACC_STATIC, ACC_SYNCHRONIZED};
use kava::errors::Flow;
use kava::strings;
use kava::value::Value;
use kava::vm::Vm;

fn boot() -> Arc<Vm> {
    let vm = Vm::new();
    vm.bootstrap(HashMap::new()).expect("bootstrap");
    vm
}

fn expect_int(result: Option<Value>) -> i32 {
    match result {
        Some(Value::Int(v)) => v,
        other => panic!("expected an int result, got {other:?}"),
    }
}

fn expect_long(result: Option<Value>) -> i64 {
    match result {
        Some(Value::Long(v)) => v,
        other => panic!("expected a long result, got {other:?}"),
    }
}

fn thrown_class(vm: &Arc<Vm>, result: Result<Option<Value>, Flow>) -> String {
    match result {
        Err(Flow::Thrown(throwable)) => {
            let name = throwable.class_type().name().to_string();
            vm.take_thrown();
            name
        }
        other => panic!("expected a thrown completion, got {other:?}"),
    }
}

#[test]
fn adds_two_ints_and_returns() {
    let vm = boot();
    let mut b = ClassBytes::new("demo/Calc", "java/lang/Object");
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "add",
        "(II)I",
        2,
        2,
        &[op::ILOAD_0, op::ILOAD_1, op::IADD, op::IRETURN],
        MethodHandlers::none(),
    );
    let calc = vm.define_class(&b.build()).unwrap();

    let result = calc
        .call_class_method(&vm, "add", "(II)I", vec![Value::Int(7), Value::Int(35)])
        .unwrap();
    assert_eq!(expect_int(result), 42);
}

#[test]
fn catches_a_thrown_exception_locally() {
    let vm = boot();
    let mut b = ClassBytes::new("demo/Catcher", "java/lang/Object");
    let exc_class = b.class("java/lang/ArithmeticException");
    let message = b.string("x");
    let ctor = b.methodref(
        "java/lang/ArithmeticException",
        "<init>",
        "(Ljava/lang/String;)V",
    );
    let get_message = b.methodref(
        "java/lang/ArithmeticException",
        "getMessage",
        "()Ljava/lang/String;",
    );
    assert!(message < 256, "ldc needs a one-byte index");
    let mut code = Vec::new();
    code.push(op::NEW); // 0
    code.extend_from_slice(&idx(exc_class));
    code.push(op::DUP); // 3
    code.push(op::LDC); // 4
    code.push(message as u8);
    code.push(op::INVOKESPECIAL); // 6
    code.extend_from_slice(&idx(ctor));
    code.push(op::ATHROW); // 9
    code.push(op::ASTORE_0); // 10, handler target
    code.push(op::ALOAD_0); // 11
    code.push(op::INVOKEVIRTUAL); // 12
    code.extend_from_slice(&idx(get_message));
    code.push(op::ARETURN); // 15
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "run",
        "()Ljava/lang/String;",
        3,
        1,
        &code,
        MethodHandlers::catching(&[(0, 10, 10, exc_class)]),
    );
    let catcher = vm.define_class(&b.build()).unwrap();

    let result = catcher
        .call_class_method(&vm, "run", "()Ljava/lang/String;", Vec::new())
        .unwrap()
        .expect("run returns a string");
    assert_eq!(strings::get_string(&result).unwrap(), "x");
    // The record is clear once the handler ran.
    assert!(vm.pending_thrown().is_none());
}

#[test]
fn virtual_dispatch_selects_the_receiver_implementation() {
    let vm = boot();
    let mut base = ClassBytes::new("demo/Base", "java/lang/Object");
    base.add_method(
        ACC_PUBLIC,
        "f",
        "()I",
        1,
        1,
        &[op::ICONST_1, op::IRETURN],
        MethodHandlers::none(),
    );
    vm.define_class(&base.build()).unwrap();

    let mut derived = ClassBytes::new("demo/Derived", "demo/Base");
    derived.add_method(
        ACC_PUBLIC,
        "f",
        "()I",
        1,
        1,
        &[op::ICONST_2, op::IRETURN],
        MethodHandlers::none(),
    );
    let derived = vm.define_class(&derived.build()).unwrap();

    let instance = derived.new_instance(&vm).unwrap();
    let result = instance.call_virtual(&vm, "f", "()I", Vec::new()).unwrap();
    assert_eq!(expect_int(result), 2);
}

#[test]
fn static_initializers_run_supers_first_and_once() {
    let vm = boot();

    let mut a = ClassBytes::new("demo/A", "java/lang/Object");
    a.add_field(ACC_PUBLIC | ACC_STATIC, "x", "I");
    let a_x = a.fieldref("demo/A", "x", "I");
    let mut clinit = vec![op::BIPUSH, 10, op::PUTSTATIC];
    clinit.extend_from_slice(&idx(a_x));
    clinit.push(op::RETURN);
    a.add_method(ACC_STATIC, "<clinit>", "()V", 1, 0, &clinit, MethodHandlers::none());
    vm.define_class(&a.build()).unwrap();

    let mut bb = ClassBytes::new("demo/B", "demo/A");
    bb.add_field(ACC_PUBLIC | ACC_STATIC, "y", "I");
    let ref_a_x = bb.fieldref("demo/A", "x", "I");
    let b_y = bb.fieldref("demo/B", "y", "I");
    let mut clinit = vec![op::GETSTATIC];
    clinit.extend_from_slice(&idx(ref_a_x));
    clinit.push(op::ICONST_1);
    clinit.push(op::IADD);
    clinit.push(op::PUTSTATIC);
    clinit.extend_from_slice(&idx(b_y));
    clinit.push(op::RETURN);
    bb.add_method(ACC_STATIC, "<clinit>", "()V", 2, 0, &clinit, MethodHandlers::none());
    let b_type = vm.define_class(&bb.build()).unwrap();

    // First touch of B runs A's initializer before B's.
    let y = b_type.static_get(&vm, "y", "I").unwrap();
    assert!(matches!(y, Value::Int(11)));
    let a_type = vm.locate_class("demo/A").unwrap();
    assert!(a_type.static_init_called());
    assert!(b_type.static_init_called());
    assert!(matches!(a_type.static_get(&vm, "x", "I").unwrap(), Value::Int(10)));

    // Ensure is idempotent: nothing resets on a second pass.
    a_type.static_put(&vm, "x", "I", Value::Int(99)).unwrap();
    b_type.ensure_static_init(&vm).unwrap();
    assert!(matches!(a_type.static_get(&vm, "x", "I").unwrap(), Value::Int(99)));
}

#[test]
fn static_initializer_runs_once_under_contention() {
    let vm = boot();
    let mut b = ClassBytes::new("demo/Once", "java/lang/Object");
    b.add_field(ACC_PUBLIC | ACC_STATIC, "c", "I");
    let c_ref = b.fieldref("demo/Once", "c", "I");
    let mut clinit = vec![op::GETSTATIC];
    clinit.extend_from_slice(&idx(c_ref));
    clinit.push(op::ICONST_1);
    clinit.push(op::IADD);
    clinit.push(op::PUTSTATIC);
    clinit.extend_from_slice(&idx(c_ref));
    clinit.push(op::RETURN);
    b.add_method(ACC_STATIC, "<clinit>", "()V", 2, 0, &clinit, MethodHandlers::none());
    let once = vm.define_class(&b.build()).unwrap();

    let mut workers = Vec::new();
    for _ in 0..8 {
        let vm = Arc::clone(&vm);
        let once = Arc::clone(&once);
        workers.push(std::thread::spawn(move || {
            once.ensure_static_init(&vm).unwrap();
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }
    assert!(matches!(once.static_get(&vm, "c", "I").unwrap(), Value::Int(1)));
}

#[test]
fn multianewarray_builds_nested_arrays() {
    let vm = boot();
    let mut b = ClassBytes::new("demo/Grid", "java/lang/Object");
    let int_2d = b.class("[[I");
    let mut code = Vec::new();
    code.push(op::ICONST_2); // 0
    code.push(op::ICONST_3); // 1
    code.push(op::MULTIANEWARRAY); // 2
    code.extend_from_slice(&idx(int_2d));
    code.push(2);
    code.push(op::ASTORE_0); // 6
    code.push(op::ALOAD_0); // 7
    code.push(op::ICONST_1); // 8
    code.push(op::AALOAD); // 9
    code.push(op::ICONST_2); // 10
    code.push(op::BIPUSH); // 11
    code.push(7);
    code.push(op::IASTORE); // 13
    code.push(op::ALOAD_0); // 14
    code.push(op::ICONST_1); // 15
    code.push(op::AALOAD); // 16
    code.push(op::ICONST_2); // 17
    code.push(op::IALOAD); // 18
    code.push(op::IRETURN); // 19
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "fill",
        "()I",
        4,
        1,
        &code,
        MethodHandlers::none(),
    );

    let int_2d_again = b.class("[[I");
    let mut make = Vec::new();
    make.push(op::ICONST_2);
    make.push(op::ICONST_3);
    make.push(op::MULTIANEWARRAY);
    make.extend_from_slice(&idx(int_2d_again));
    make.push(2);
    make.push(op::ARETURN);
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "make",
        "()[[I",
        2,
        0,
        &make,
        MethodHandlers::none(),
    );
    let grid = vm.define_class(&b.build()).unwrap();

    let result = grid
        .call_class_method(&vm, "fill", "()I", Vec::new())
        .unwrap();
    assert_eq!(expect_int(result), 7);

    let array = grid
        .call_class_method(&vm, "make", "()[[I", Vec::new())
        .unwrap()
        .expect("make returns an array")
        .as_array()
        .unwrap();
    assert_eq!(array.len(), 2);
    let inner = array.get(0).unwrap().as_array().unwrap();
    assert_eq!(inner.len(), 3);
}

#[test]
fn multianewarray_stops_at_a_zero_dimension() {
    let vm = boot();
    let mut b = ClassBytes::new("demo/Ragged", "java/lang/Object");
    let int_3d = b.class("[[[I");
    let mut code = Vec::new();
    code.push(op::ICONST_3);
    code.push(op::ICONST_0);
    code.push(op::ICONST_2);
    code.push(op::MULTIANEWARRAY);
    code.extend_from_slice(&idx(int_3d));
    code.push(3);
    code.push(op::ARETURN);
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "make",
        "()[[[I",
        3,
        0,
        &code,
        MethodHandlers::none(),
    );
    let ragged = vm.define_class(&b.build()).unwrap();

    let outer = ragged
        .call_class_method(&vm, "make", "()[[[I", Vec::new())
        .unwrap()
        .expect("make returns an array")
        .as_array()
        .unwrap();
    assert_eq!(outer.len(), 3);
    let middle = outer.get(1).unwrap().as_array().unwrap();
    // The deepest dimension is never allocated.
    assert_eq!(middle.len(), 0);
    assert!(middle.get(0).is_none());
}

#[test]
fn synchronized_increments_from_two_threads_stay_exact() {
    let vm = boot();
    let mut b = ClassBytes::new("demo/Counter", "java/lang/Object");
    b.add_field(ACC_PUBLIC, "n", "I");
    let n_ref = b.fieldref("demo/Counter", "n", "I");
    let mut code = vec![op::ALOAD_0, op::DUP, op::GETFIELD];
    code.extend_from_slice(&idx(n_ref));
    code.push(op::ICONST_1);
    code.push(op::IADD);
    code.push(op::PUTFIELD);
    code.extend_from_slice(&idx(n_ref));
    code.push(op::RETURN);
    b.add_method(
        ACC_PUBLIC | ACC_SYNCHRONIZED,
        "bump",
        "()V",
        3,
        1,
        &code,
        MethodHandlers::none(),
    );
    let counter = vm.define_class(&b.build()).unwrap();
    let shared = counter.new_instance(&vm).unwrap();

    let mut workers = Vec::new();
    for _ in 0..2 {
        let vm = Arc::clone(&vm);
        let shared = Arc::clone(&shared);
        workers.push(std::thread::spawn(move || {
            for _ in 0..10_000 {
                shared.call_virtual(&vm, "bump", "()V", Vec::new()).unwrap();
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }
    assert!(matches!(
        shared.get_field("n", "I").unwrap(),
        Value::Int(20_000)
    ));
}

#[test]
fn lookupswitch_takes_the_default_for_a_missing_key() {
    let vm = boot();
    let mut b = ClassBytes::new("demo/Switcher", "java/lang/Object");
    let mut code = Vec::new();
    code.push(op::ILOAD_0); // 0
    code.push(op::LOOKUPSWITCH); // 1
    code.extend_from_slice(&[0, 0]); // padding to offset 4
    code.extend_from_slice(&34i32.to_be_bytes()); // default -> 35
    code.extend_from_slice(&2i32.to_be_bytes()); // npairs
    code.extend_from_slice(&(-1i32).to_be_bytes());
    code.extend_from_slice(&27i32.to_be_bytes()); // -1 -> 28
    code.extend_from_slice(&1i32.to_be_bytes());
    code.extend_from_slice(&30i32.to_be_bytes()); // 1 -> 31
    assert_eq!(code.len(), 28);
    code.push(op::BIPUSH); // 28
    code.push(100);
    code.push(op::IRETURN); // 30
    code.push(op::SIPUSH); // 31
    code.extend_from_slice(&200i16.to_be_bytes());
    code.push(op::IRETURN); // 34
    code.push(op::SIPUSH); // 35
    code.extend_from_slice(&300i16.to_be_bytes());
    code.push(op::IRETURN); // 38
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "pick",
        "(I)I",
        1,
        1,
        &code,
        MethodHandlers::none(),
    );
    let switcher = vm.define_class(&b.build()).unwrap();

    let pick = |key: i32| {
        expect_int(
            switcher
                .call_class_method(&vm, "pick", "(I)I", vec![Value::Int(key)])
                .unwrap(),
        )
    };
    assert_eq!(pick(0), 300);
    assert_eq!(pick(-1), 100);
    assert_eq!(pick(1), 200);
}

#[test]
fn shift_distances_mask_to_the_operand_width() {
    let vm = boot();
    let mut b = ClassBytes::new("demo/Shifts", "java/lang/Object");
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "shl33",
        "(I)I",
        2,
        1,
        &[op::ILOAD_0, op::BIPUSH, 33, op::ISHL, op::IRETURN],
        MethodHandlers::none(),
    );
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "lshl65",
        "()J",
        3,
        0,
        &[op::LCONST_1, op::BIPUSH, 65, op::LSHL, op::LRETURN],
        MethodHandlers::none(),
    );
    let shifts = vm.define_class(&b.build()).unwrap();

    let result = shifts
        .call_class_method(&vm, "shl33", "(I)I", vec![Value::Int(1)])
        .unwrap();
    assert_eq!(expect_int(result), 2);
    let result = shifts
        .call_class_method(&vm, "lshl65", "()J", Vec::new())
        .unwrap();
    assert_eq!(expect_long(result), 2);
}

#[test]
fn float_compare_nan_defaults_follow_the_opcode() {
    let vm = boot();
    let mut b = ClassBytes::new("demo/Nan", "java/lang/Object");
    let nan = b.float_const(f32::NAN);
    assert!(nan < 256);
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "cmpl",
        "()I",
        2,
        0,
        &[op::LDC, nan as u8, op::FCONST_0, op::FCMPL, op::IRETURN],
        MethodHandlers::none(),
    );
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "cmpg",
        "()I",
        2,
        0,
        &[op::LDC, nan as u8, op::FCONST_0, op::FCMPG, op::IRETURN],
        MethodHandlers::none(),
    );
    let nan_class = vm.define_class(&b.build()).unwrap();

    let cmpl = nan_class
        .call_class_method(&vm, "cmpl", "()I", Vec::new())
        .unwrap();
    assert_eq!(expect_int(cmpl), -1);
    let cmpg = nan_class
        .call_class_method(&vm, "cmpg", "()I", Vec::new())
        .unwrap();
    assert_eq!(expect_int(cmpg), 1);
}

#[test]
fn loops_branch_relative_to_the_instruction_start() {
    let vm = boot();
    let mut b = ClassBytes::new("demo/Loop", "java/lang/Object");
    let code = vec![
        op::ICONST_0, // 0: sum
        op::ISTORE_0, // 1
        op::ICONST_1, // 2: i
        op::ISTORE_1, // 3
        op::ILOAD_1,  // 4
        op::BIPUSH,   // 5
        5,
        op::IF_ICMPGT, // 7 -> 7 + 13 = 20
        0,
        13,
        op::ILOAD_0, // 10
        op::ILOAD_1, // 11
        op::IADD,    // 12
        op::ISTORE_0, // 13
        op::IINC,    // 14
        1,
        1,
        op::GOTO, // 17 -> 17 - 13 = 4
        0xff,
        0xf3,
        op::ILOAD_0, // 20
        op::IRETURN, // 21
    ];
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "sum",
        "()I",
        2,
        2,
        &code,
        MethodHandlers::none(),
    );
    let looper = vm.define_class(&b.build()).unwrap();

    let result = looper
        .call_class_method(&vm, "sum", "()I", Vec::new())
        .unwrap();
    assert_eq!(expect_int(result), 15);
}

#[test]
fn a_callee_throw_unwinds_into_the_caller_handler() {
    let vm = boot();
    let mut b = ClassBytes::new("demo/Unwind", "java/lang/Object");
    let arith = b.class("java/lang/ArithmeticException");
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "boom",
        "()I",
        2,
        0,
        &[op::ICONST_1, op::ICONST_0, op::IDIV, op::IRETURN],
        MethodHandlers::none(),
    );
    let boom_ref = b.methodref("demo/Unwind", "boom", "()I");
    let mut code = Vec::new();
    code.push(op::INVOKESTATIC); // 0
    code.extend_from_slice(&idx(boom_ref));
    code.push(op::IRETURN); // 3
    code.push(op::POP); // 4, handler target
    code.push(op::ICONST_5); // 5
    code.push(op::IRETURN); // 6
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "safe",
        "()I",
        1,
        0,
        &code,
        MethodHandlers::catching(&[(0, 4, 4, arith)]),
    );
    let unwind = vm.define_class(&b.build()).unwrap();

    let result = unwind
        .call_class_method(&vm, "safe", "()I", Vec::new())
        .unwrap();
    assert_eq!(expect_int(result), 5);
    assert!(vm.pending_thrown().is_none());

    // Uncaught, the same division registers the thrown record.
    let result = unwind.call_class_method(&vm, "boom", "()I", Vec::new());
    assert_eq!(thrown_class(&vm, result), "java/lang/ArithmeticException");
}

#[test]
fn checkcast_and_instanceof_agree() {
    let vm = boot();
    let mut base = ClassBytes::new("demo/Base", "java/lang/Object");
    base.add_method(
        ACC_PUBLIC,
        "f",
        "()I",
        1,
        1,
        &[op::ICONST_1, op::IRETURN],
        MethodHandlers::none(),
    );
    vm.define_class(&base.build()).unwrap();
    let mut derived = ClassBytes::new("demo/Derived", "demo/Base");
    derived.add_method(
        ACC_PUBLIC,
        "f",
        "()I",
        1,
        1,
        &[op::ICONST_2, op::IRETURN],
        MethodHandlers::none(),
    );
    let derived = vm.define_class(&derived.build()).unwrap();

    let mut tester = ClassBytes::new("demo/Tester", "java/lang/Object");
    let base_class = tester.class("demo/Base");
    let mut is_code = vec![op::ALOAD_0, op::INSTANCEOF];
    is_code.extend_from_slice(&idx(base_class));
    is_code.push(op::IRETURN);
    tester.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "isBase",
        "(Ljava/lang/Object;)I",
        1,
        1,
        &is_code,
        MethodHandlers::none(),
    );
    let base_class2 = tester.class("demo/Base");
    let mut cast_code = vec![op::ALOAD_0, op::CHECKCAST];
    cast_code.extend_from_slice(&idx(base_class2));
    cast_code.push(op::ARETURN);
    tester.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "asBase",
        "(Ljava/lang/Object;)Ldemo/Base;",
        1,
        1,
        &cast_code,
        MethodHandlers::none(),
    );
    let tester = vm.define_class(&tester.build()).unwrap();

    let derived_value = Value::Instance(derived.new_instance(&vm).unwrap());
    let string_value = strings::new_string(&vm, "not a base").unwrap();

    let is_base = |value: Value| {
        expect_int(
            tester
                .call_class_method(&vm, "isBase", "(Ljava/lang/Object;)I", vec![value])
                .unwrap(),
        )
    };
    assert_eq!(is_base(derived_value.clone()), 1);
    assert_eq!(is_base(string_value.clone()), 0);
    assert_eq!(is_base(Value::Null), 0);

    // Where instanceof said yes, checkcast passes...
    let cast = tester
        .call_class_method(
            &vm,
            "asBase",
            "(Ljava/lang/Object;)Ldemo/Base;",
            vec![derived_value.clone()],
        )
        .unwrap()
        .expect("cast returns the value");
    assert!(cast.ref_eq(&derived_value));
    // ...and where it said no, checkcast throws.
    let result = tester.call_class_method(
        &vm,
        "asBase",
        "(Ljava/lang/Object;)Ldemo/Base;",
        vec![string_value],
    );
    assert_eq!(thrown_class(&vm, result), "java/lang/ClassCastException");
    // null passes a checkcast untouched.
    let result = tester
        .call_class_method(&vm, "asBase", "(Ljava/lang/Object;)Ldemo/Base;", vec![Value::Null])
        .unwrap()
        .expect("null flows through");
    assert!(result.is_null());
}

#[test]
fn reference_equality_is_identity() {
    let vm = boot();
    let a = strings::new_string(&vm, "same").unwrap();
    let b = strings::new_string(&vm, "same").unwrap();
    assert!(!a.ref_eq(&b));
    assert!(a.ref_eq(&a.clone()));

    // Interning collapses equal contents to one allocation.
    let x = strings::intern(&vm, "same").unwrap();
    let y = strings::intern(&vm, "same").unwrap();
    assert!(x.ref_eq(&y));
}

#[test]
fn stack_juggling_respects_wide_values() {
    let vm = boot();
    let mut b = ClassBytes::new("demo/Juggle", "java/lang/Object");
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "dupx1",
        "()I",
        3,
        0,
        &[
            op::ICONST_1,
            op::ICONST_2,
            op::DUP_X1,
            op::IADD,
            op::IADD,
            op::IRETURN,
        ],
        MethodHandlers::none(),
    );
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "dup2long",
        "()J",
        4,
        0,
        &[op::LCONST_1, op::DUP2, op::LADD, op::LRETURN],
        MethodHandlers::none(),
    );
    let two = b.long_const(2);
    let mut code = vec![op::LCONST_1, op::LDC2_W];
    code.extend_from_slice(&idx(two));
    code.push(op::DUP2_X2);
    code.push(op::LADD);
    code.push(op::LADD);
    code.push(op::LRETURN);
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "dup2x2",
        "()J",
        6,
        0,
        &code,
        MethodHandlers::none(),
    );
    let juggle = vm.define_class(&b.build()).unwrap();

    let result = juggle
        .call_class_method(&vm, "dupx1", "()I", Vec::new())
        .unwrap();
    assert_eq!(expect_int(result), 5);
    let result = juggle
        .call_class_method(&vm, "dup2long", "()J", Vec::new())
        .unwrap();
    assert_eq!(expect_long(result), 2);
    let result = juggle
        .call_class_method(&vm, "dup2x2", "()J", Vec::new())
        .unwrap();
    assert_eq!(expect_long(result), 5);
}

#[test]
fn zero_length_arrays_reject_every_access() {
    let vm = boot();
    let mut b = ClassBytes::new("demo/Empty", "java/lang/Object");
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "read",
        "()I",
        2,
        0,
        &[
            op::ICONST_0,
            op::NEWARRAY,
            10, // int
            op::ICONST_0,
            op::IALOAD,
            op::IRETURN,
        ],
        MethodHandlers::none(),
    );
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "len",
        "()I",
        1,
        0,
        &[op::ICONST_0, op::NEWARRAY, 10, op::ARRAYLENGTH, op::IRETURN],
        MethodHandlers::none(),
    );
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "negative",
        "()V",
        1,
        0,
        &[op::BIPUSH, 0xff, op::NEWARRAY, 10, op::POP, op::RETURN],
        MethodHandlers::none(),
    );
    let empty = vm.define_class(&b.build()).unwrap();

    let result = empty.call_class_method(&vm, "read", "()I", Vec::new());
    assert_eq!(
        thrown_class(&vm, result),
        "java/lang/ArrayIndexOutOfBoundsException"
    );
    let result = empty
        .call_class_method(&vm, "len", "()I", Vec::new())
        .unwrap();
    assert_eq!(expect_int(result), 0);
    let result = empty.call_class_method(&vm, "negative", "()V", Vec::new());
    assert_eq!(
        thrown_class(&vm, result),
        "java/lang/NegativeArraySizeException"
    );
}

#[test]
fn null_dereference_throws_a_catchable_exception() {
    let vm = boot();
    let mut b = ClassBytes::new("demo/Nully", "java/lang/Object");
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "lengthOfNull",
        "()I",
        1,
        0,
        &[op::ACONST_NULL, op::ARRAYLENGTH, op::IRETURN],
        MethodHandlers::none(),
    );
    let nully = vm.define_class(&b.build()).unwrap();

    let result = nully.call_class_method(&vm, "lengthOfNull", "()I", Vec::new());
    assert_eq!(thrown_class(&vm, result), "java/lang/NullPointerException");
}

#[test]
fn string_builder_concatenates_through_dispatch() {
    let vm = boot();
    let mut b = ClassBytes::new("demo/Concat", "java/lang/Object");
    let builder_class = b.class("java/lang/StringBuilder");
    let ctor = b.methodref("java/lang/StringBuilder", "<init>", "()V");
    let append_str = b.methodref(
        "java/lang/StringBuilder",
        "append",
        "(Ljava/lang/String;)Ljava/lang/StringBuilder;",
    );
    let append_int = b.methodref(
        "java/lang/StringBuilder",
        "append",
        "(I)Ljava/lang/StringBuilder;",
    );
    let to_string = b.methodref(
        "java/lang/StringBuilder",
        "toString",
        "()Ljava/lang/String;",
    );
    let hello = b.string("value=");
    assert!(hello < 256);
    let mut code = Vec::new();
    code.push(op::NEW);
    code.extend_from_slice(&idx(builder_class));
    code.push(op::DUP);
    code.push(op::INVOKESPECIAL);
    code.extend_from_slice(&idx(ctor));
    code.push(op::LDC);
    code.push(hello as u8);
    code.push(op::INVOKEVIRTUAL);
    code.extend_from_slice(&idx(append_str));
    code.push(op::BIPUSH);
    code.push(42);
    code.push(op::INVOKEVIRTUAL);
    code.extend_from_slice(&idx(append_int));
    code.push(op::INVOKEVIRTUAL);
    code.extend_from_slice(&idx(to_string));
    code.push(op::ARETURN);
    b.add_method(
        ACC_PUBLIC | ACC_STATIC,
        "concat",
        "()Ljava/lang/String;",
        3,
        0,
        &code,
        MethodHandlers::none(),
    );
    let concat = vm.define_class(&b.build()).unwrap();

    let result = concat
        .call_class_method(&vm, "concat", "()Ljava/lang/String;", Vec::new())
        .unwrap()
        .expect("concat returns a string");
    assert_eq!(strings::get_string(&result).unwrap(), "value=42");
}

#[test]
fn managed_threads_run_and_join() {
    let vm = boot();
    let mut b = ClassBytes::new("demo/Task", "java/lang/Thread");
    b.add_field(ACC_PUBLIC | ACC_STATIC, "done", "I");
    let done_ref = b.fieldref("demo/Task", "done", "I");
    let mut run = vec![op::ICONST_1, op::PUTSTATIC];
    run.extend_from_slice(&idx(done_ref));
    run.push(op::RETURN);
    b.add_method(ACC_PUBLIC, "run", "()V", 1, 1, &run, MethodHandlers::none());
    let task = vm.define_class(&b.build()).unwrap();

    let instance = task.new_instance(&vm).unwrap();
    instance
        .call_special(&vm, "demo/Task", "<init>", "()V", Vec::new())
        .unwrap();
    instance.call_virtual(&vm, "start", "()V", Vec::new()).unwrap();
    instance.call_virtual(&vm, "join", "()V", Vec::new()).unwrap();

    assert!(matches!(
        task.static_get(&vm, "done", "I").unwrap(),
        Value::Int(1)
    ));
}

#[test]
fn fields_default_lazily_and_memoize() {
    let vm = boot();
    let mut b = ClassBytes::new("demo/Defaults", "java/lang/Object");
    b.add_field(ACC_PUBLIC, "count", "I");
    b.add_field(ACC_PUBLIC, "big", "J");
    b.add_field(ACC_PUBLIC, "label", "Ljava/lang/String;");
    let defaults = vm.define_class(&b.build()).unwrap();

    let instance = defaults.new_instance(&vm).unwrap();
    assert!(matches!(instance.get_field("count", "I").unwrap(), Value::Int(0)));
    assert!(matches!(instance.get_field("big", "J").unwrap(), Value::Long(0)));
    assert!(instance
        .get_field("label", "Ljava/lang/String;")
        .unwrap()
        .is_null());

    instance.set_field("count", "I", Value::Int(9)).unwrap();
    assert!(matches!(instance.get_field("count", "I").unwrap(), Value::Int(9)));
}

#[test]
fn reflection_surfaces_interned_class_objects() {
    let vm = boot();
    let a = kava::reflect::class_object_for(&vm, "java/lang/String").unwrap();
    let b = kava::reflect::class_object_for(&vm, "Ljava/lang/String;").unwrap();
    assert!(a.ref_eq(&b));

    let primitive = kava::reflect::class_object_for(&vm, "I").unwrap();
    assert!(!primitive.ref_eq(&a));
    let array = kava::reflect::class_object_for(&vm, "[I").unwrap();
    let array_again = kava::reflect::class_object_for(&vm, "[I").unwrap();
    assert!(array.ref_eq(&array_again));
}

#[test]
fn system_properties_mirror_into_the_managed_object() {
    let vm = Vm::new();
    let mut properties = HashMap::new();
    properties.insert("app.mode".to_string(), "fast".to_string());
    vm.bootstrap(properties).unwrap();

    let system = vm.locate_class("java/lang/System").unwrap();
    let key = strings::new_string(&vm, "app.mode").unwrap();
    let value = system
        .call_class_method(
            &vm,
            "getProperty",
            "(Ljava/lang/String;)Ljava/lang/String;",
            vec![key],
        )
        .unwrap()
        .expect("getProperty answers");
    assert_eq!(strings::get_string(&value).unwrap(), "fast");
}
