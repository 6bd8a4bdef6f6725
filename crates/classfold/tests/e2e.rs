//! End-to-end integration tests for classfold.
//!
//! These tests build real class files, run the complete pipeline
//! (parse → optimize → serialize) and decode the result.

mod common;

use anyhow::{Context, Result};
use classfold::bytecode::{Category, Insn, Push, Value};
use classfold::classfile::{ClassFile, ExceptionTableEntry};
use classfold::optimizer::method_fold::interpret;
use classfold::optimizer::FoldOutcome;
use classfold::{optimize_bytes, optimize_file, optimize_with_report, OptimizeOptions};
use common::{body_of, code_of, insns_of, ClassBuilder};

/// Round-trips a class through bytes and the optimizer.
fn optimize_class(class: ClassFile) -> Result<ClassFile> {
    let bytes = optimize_bytes(&class.to_bytes(), &OptimizeOptions::default())?;
    ClassFile::parse(&bytes).context("optimized class does not parse")
}

/// `int b = 62; int c = (b + 764) * 3; return c + 1234 - b;`
fn scenario_a() -> Vec<u8> {
    vec![
        0x10, 62, // bipush 62
        0x3b, // istore_0
        0x1a, // iload_0
        0x11, 0x02, 0xfc, // sipush 764
        0x60, // iadd
        0x06, // iconst_3
        0x68, // imul
        0x3c, // istore_1
        0x1b, // iload_1
        0x11, 0x04, 0xd2, // sipush 1234
        0x60, // iadd
        0x1a, // iload_0
        0x64, // isub
        0xac, // ireturn
    ]
}

// ── Scenarios ───────────────────────────────────────────────────────────────

#[test]
fn test_arithmetic_chain_folds_to_constant() -> Result<()> {
    let class = ClassBuilder::new("Scenario")
        .method("compute", "()I", 2, scenario_a())
        .build();
    let before = interpret(&body_of(&class, "compute"), &class.constant_pool);
    assert_eq!(before, FoldOutcome::Resolved(Value::Int(3650)));

    let class = optimize_class(class)?;
    let code = code_of(&class, "compute");
    // sipush 3650; ireturn
    assert_eq!(code.code, vec![0x11, 0x0e, 0x42, 0xac]);
    assert_eq!(code.max_stack, 1);
    assert_eq!(code.max_locals, 0);
    Ok(())
}

#[test]
fn test_int_comparison_folds_to_false() -> Result<()> {
    let mut builder = ClassBuilder::new("Scenario");
    let y = builder.pool().add_integer(54321)?;
    let code = vec![
        0x11, 0x30, 0x39, // sipush 12345
        0x3b, // istore_0
        0x12, y as u8, // ldc 54321
        0x3c, // istore_1
        0x1a, // iload_0
        0x1b, // iload_1
        0xa4, 0x00, 0x07, // if_icmple +7
        0x04, // iconst_1
        0xa7, 0x00, 0x04, // goto +4
        0x03, // iconst_0
        0xac, // ireturn
    ];
    let class = builder.method("greater", "()I", 2, code).build();
    let class = optimize_class(class)?;
    assert_eq!(code_of(&class, "greater").code, vec![0x03, 0xac]);
    Ok(())
}

#[test]
fn test_long_comparison_folds_to_true() -> Result<()> {
    let mut builder = ClassBuilder::new("Scenario");
    let x = builder.pool().add_long(4_835_783_423)?;
    let y = builder.pool().add_long(400_000)?;
    let code = vec![
        0x14, 0x00, x as u8, // ldc2_w 4835783423
        0x3f, // lstore_0
        0x14, 0x00, y as u8, // ldc2_w 400000
        0x41, // lstore_2
        0x1e, // lload_0
        0x20, // lload_2
        0x94, // lcmp
        0x9e, 0x00, 0x07, // ifle +7
        0x04, // iconst_1
        0xa7, 0x00, 0x04, // goto +4
        0x03, // iconst_0
        0xac, // ireturn
    ];
    let class = builder.method("greater", "()I", 4, code).build();
    let before = interpret(&body_of(&class, "greater"), &class.constant_pool);
    assert_eq!(before, FoldOutcome::ResolvedViaBranch(Value::Int(1)));

    let class = optimize_class(class)?;
    let code = code_of(&class, "greater");
    assert_eq!(code.code, vec![0x04, 0xac]);
    assert_eq!(code.max_locals, 0);
    Ok(())
}

#[test]
fn test_division_by_literal_zero_is_kept() -> Result<()> {
    // int a = 10; int b = a / 0;
    let code = vec![
        0x10, 0x0a, // bipush 10
        0x3b, // istore_0
        0x1a, // iload_0
        0x03, // iconst_0
        0x6c, // idiv
        0x3c, // istore_1
        0xb1, // return
    ];
    let class = ClassBuilder::new("Scenario")
        .method("divide", "()V", 2, code)
        .build();
    let class = optimize_class(class)?;
    let insns = insns_of(&class, "divide");
    assert!(
        insns.iter().any(|i| matches!(
            i,
            Insn::Arith {
                cat: Category::Int,
                op: classfold::bytecode::ArithOp::Div
            }
        )),
        "idiv must survive: {insns:?}"
    );
    // The load may become a push, but the divisor stays a literal zero.
    assert_eq!(
        code_of(&class, "divide").code,
        vec![0x10, 0x0a, 0x3b, 0x10, 0x0a, 0x03, 0x6c, 0x3c, 0xb1]
    );
    Ok(())
}

#[test]
fn test_wide_product_uses_pool_load() -> Result<()> {
    // sipush 300; sipush 300; imul; ireturn
    let code = vec![0x11, 0x01, 0x2c, 0x11, 0x01, 0x2c, 0x68, 0xac];
    let class = ClassBuilder::new("Scenario")
        .method("square", "()I", 0, code)
        .build();
    let class = optimize_class(class)?;
    match insns_of(&class, "square").as_slice() {
        [Insn::Push(Push::Ldc(index)), Insn::Return(Some(Category::Int))] => {
            assert_eq!(class.constant_pool.numeric(*index), Some(Value::Int(90000)));
        }
        other => panic!("expected ldc 90000; ireturn, got {other:?}"),
    }
    Ok(())
}

// ── Control flow ────────────────────────────────────────────────────────────

#[test]
fn test_jump_back_onto_store_keeps_load() -> Result<()> {
    // int v = 1; while (a != 0) { a--; v = b; } return v;
    // with the loop's `goto` landing on the `istore_2` of `v = 1`.
    let code = vec![
        0x04, // iconst_1
        0x3d, // S: istore_2
        0x1a, // iload_0
        0x99, 0x00, 0x0a, // ifeq +10
        0x84, 0x00, 0xff, // iinc 0 -1
        0x1b, // iload_1
        0xa7, 0xff, 0xf7, // goto S
        0x1c, // iload_2
        0xac, // ireturn
    ];
    let class = ClassBuilder::new("Loops")
        .method("last", "(II)I", 3, code.clone())
        .build();
    let (class, report) = optimize_with_report(class, &OptimizeOptions::default())?;
    assert_eq!(report.loads_propagated, 0);
    assert_eq!(report.methods_changed, 0);
    assert_eq!(code_of(&class, "last").code, code);
    Ok(())
}

#[test]
fn test_loop_body_sees_constant_local() -> Result<()> {
    // int k = 1; int s; for (int i = 0; i < 10; i++) s = k + i; return k;
    let code = vec![
        0x04, // iconst_1
        0x3c, // istore_1
        0x03, // iconst_0
        0x3d, // istore_2
        0xa7, 0x00, 0x0a, // goto C
        0x1b, // B: iload_1
        0x1c, // iload_2
        0x60, // iadd
        0x3e, // istore_3
        0x84, 0x02, 0x01, // iinc 2 1
        0x1c, // C: iload_2
        0x10, 10, // bipush 10
        0xa1, 0xff, 0xf6, // if_icmplt B
        0x1b, // iload_1
        0xac, // ireturn
    ];
    let class = ClassBuilder::new("Loops")
        .method("count", "()I", 4, code)
        .build();
    let class = optimize_class(class)?;
    let expected = vec![
        0x04, 0x3c, 0x03, 0x3d, 0xa7, 0x00, 0x0a, // unchanged prologue
        0x04, // iconst_1
        0x1c, 0x60, 0x3e, 0x84, 0x02, 0x01, 0x1c, 0x10, 10, 0xa1, 0xff, 0xf6,
        0x04, // iconst_1
        0xac,
    ];
    assert_eq!(code_of(&class, "count").code, expected);
    Ok(())
}

// ── Properties ───────────────────────────────────────────────────────────────

#[test]
fn test_optimize_is_idempotent() -> Result<()> {
    let class = ClassBuilder::new("Scenario")
        .method("compute", "()I", 2, scenario_a())
        .method(
            "partial",
            "(I)I",
            1,
            vec![0x1a, 0x10, 62, 0x11, 0x02, 0xfc, 0x60, 0x60, 0xac],
        )
        .build();
    let once = optimize_bytes(&class.to_bytes(), &OptimizeOptions::default())?;
    let twice = optimize_bytes(&once, &OptimizeOptions::default())?;
    assert_eq!(once, twice);
    Ok(())
}

/// `v1 = 1; v2 = v1 + 1; ... vN = vN-1 + 1; return arg + vN;`
fn dependent_locals(n: u8) -> Vec<u8> {
    let load = |slot: u8| if slot <= 3 { vec![0x1a + slot] } else { vec![0x15, slot] };
    let store = |slot: u8| if slot <= 3 { vec![0x3b + slot] } else { vec![0x36, slot] };
    let mut code = vec![0x04];
    code.extend(store(1));
    for slot in 2..=n {
        code.extend(load(slot - 1));
        code.extend([0x04, 0x60]);
        code.extend(store(slot));
    }
    code.push(0x1a);
    code.extend(load(n));
    code.extend([0x60, 0xac]);
    code
}

#[test]
fn test_long_local_chain_reaches_fixpoint() -> Result<()> {
    let class = ClassBuilder::new("Chain")
        .method("chain", "(I)I", 13, dependent_locals(12))
        .build();
    let once = optimize_bytes(&class.to_bytes(), &OptimizeOptions::default())?;
    let twice = optimize_bytes(&once, &OptimizeOptions::default())?;
    assert_eq!(once, twice);

    let code = code_of(&ClassFile::parse(&once)?, "chain").code;
    // iload_0; bipush 12; iadd; ireturn
    assert!(code.ends_with(&[0x1a, 0x10, 12, 0x60, 0xac]), "{code:02x?}");
    Ok(())
}

#[test]
fn test_results_use_narrowest_push() -> Result<()> {
    // 2 + 3, 100 + 27, 30000 + 2767, 1.0f + 1.0f, 0L + 1L
    let class = ClassBuilder::new("Narrow")
        .method("small", "()I", 0, vec![0x05, 0x06, 0x60, 0xac])
        .method("byte", "()I", 0, vec![0x10, 100, 0x10, 27, 0x60, 0xac])
        .method(
            "short",
            "()I",
            0,
            vec![0x11, 0x75, 0x30, 0x11, 0x0a, 0xcf, 0x60, 0xac],
        )
        .method("float", "()F", 0, vec![0x0c, 0x0c, 0x62, 0xae])
        .method("long", "()J", 0, vec![0x09, 0x0a, 0x61, 0xad])
        .build();
    let class = optimize_class(class)?;
    assert_eq!(code_of(&class, "small").code, vec![0x08, 0xac]);
    assert_eq!(code_of(&class, "byte").code, vec![0x10, 127, 0xac]);
    assert_eq!(code_of(&class, "short").code, vec![0x11, 0x7f, 0xff, 0xac]);
    assert_eq!(code_of(&class, "float").code, vec![0x0d, 0xae]);
    assert_eq!(code_of(&class, "long").code, vec![0x0a, 0xad]);
    Ok(())
}

#[test]
fn test_line_numbers_follow_folded_code() -> Result<()> {
    let class = ClassBuilder::new("Scenario")
        .method_with_lines("compute", "()I", 2, scenario_a(), &[(0, 3), (3, 4), (12, 5)])
        .build();
    let class = optimize_class(class)?;
    let body = body_of(&class, "compute");
    match body.attributes.as_slice() {
        [classfold::bytecode::CodeAttr::LineNumbers { entries, .. }] => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].line, 3);
        }
        other => panic!("expected one LineNumberTable, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_untouched_methods_are_byte_identical() -> Result<()> {
    // iload_0; iload_1; iadd; ireturn
    let class = ClassBuilder::new("Plain")
        .method("add", "(II)I", 2, vec![0x1a, 0x1b, 0x60, 0xac])
        .build();
    let original = class.to_bytes();
    let (class, report) = optimize_with_report(class, &OptimizeOptions::default())?;
    assert_eq!(report.methods_visited, 1);
    assert_eq!(report.methods_changed, 0);
    assert_eq!(class.to_bytes(), original);
    Ok(())
}

#[test]
fn test_method_with_handlers_keeps_structure() -> Result<()> {
    // try { return 2 + 3; } catch (Throwable t) { return -1; }
    let code = vec![
        0x05, // 0: iconst_2
        0x06, // 1: iconst_3
        0x60, // 2: iadd
        0xac, // 3: ireturn
        0x4b, // 4: astore_0
        0x02, // 5: iconst_m1
        0xac, // 6: ireturn
    ];
    let handlers = vec![ExceptionTableEntry {
        start_pc: 0,
        end_pc: 4,
        handler_pc: 4,
        catch_type: 0,
    }];
    let class = ClassBuilder::new("Guarded")
        .method_with_handlers("guarded", "()I", 1, code, handlers)
        .build();
    let class = optimize_class(class)?;
    let code = code_of(&class, "guarded");
    assert_eq!(code.code, vec![0x08, 0xac, 0x4b, 0x02, 0xac]);
    assert_eq!(
        code.exception_table,
        vec![ExceptionTableEntry {
            start_pc: 0,
            end_pc: 2,
            handler_pc: 2,
            catch_type: 0,
        }]
    );
    assert_eq!(code.max_stack, 1);
    assert_eq!(code.max_locals, 1);
    Ok(())
}

#[test]
fn test_broken_method_does_not_stop_the_class() -> Result<()> {
    // The handler points into the middle of sipush.
    let broken = ClassBuilder::new("Mixed")
        .method_with_handlers(
            "broken",
            "()I",
            0,
            vec![0x11, 0x01, 0x00, 0xac],
            vec![ExceptionTableEntry {
                start_pc: 0,
                end_pc: 3,
                handler_pc: 1,
                catch_type: 0,
            }],
        )
        .method("small", "()I", 0, vec![0x05, 0x06, 0x60, 0xac])
        .build();
    let broken_code = code_of(&broken, "broken");
    let (class, report) = optimize_with_report(broken, &OptimizeOptions::default())?;
    assert_eq!(report.methods_abandoned, 1);
    assert_eq!(report.methods_changed, 1);
    assert_eq!(code_of(&class, "broken"), broken_code);
    assert_eq!(code_of(&class, "small").code, vec![0x08, 0xac]);
    Ok(())
}

#[test]
fn test_malformed_input_is_an_error() {
    let err = optimize_bytes(&[0xca, 0xfe, 0xba, 0xbe, 0x00], &OptimizeOptions::default())
        .unwrap_err();
    assert!(format!("{err:#}").contains("failed to parse class file"));
}

// ── Files ───────────────────────────────────────────────────────────────────

#[test]
fn test_optimize_file_writes_output() -> Result<()> {
    let dir = std::env::temp_dir().join(format!("classfold-e2e-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let input = dir.join("Scenario.class");
    let output = dir.join("Scenario.out.class");
    let class = ClassBuilder::new("Scenario")
        .method("compute", "()I", 2, scenario_a())
        .build();
    std::fs::write(&input, class.to_bytes())?;

    let report = optimize_file(&input, &output, &OptimizeOptions::default())?;
    assert_eq!(report.methods_folded, 1);
    let written = ClassFile::parse(&std::fs::read(&output)?)?;
    assert_eq!(code_of(&written, "compute").code, vec![0x11, 0x0e, 0x42, 0xac]);
    // The input is left alone when an output path is given.
    assert_eq!(std::fs::read(&input)?, class.to_bytes());

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_optimize_file_reports_missing_input() {
    let missing = std::env::temp_dir().join("classfold-e2e-missing/Nope.class");
    let err = optimize_file(&missing, &missing, &OptimizeOptions::default()).unwrap_err();
    assert!(format!("{err:#}").contains("failed to read"));
}
