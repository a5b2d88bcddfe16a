//! Compiles small Cx programs and runs the assembled icode through
//! `cx-vm`, exercising the full translate-then-execute pipeline `cxc`
//! itself drives.

use cxc::{parse_program, to_program_table, TranslationContext, TranslationOptions};
use cx_core::error::{ErrorCode, RuntimeErrorCode};
use cx_vm::Vm;

fn run(source: &str) -> Result<i32, RuntimeErrorCode> {
    let mut ctx = TranslationContext::new(TranslationOptions::default());
    let compiled = parse_program(source, &mut ctx).expect("translation should succeed");
    let table = to_program_table(&compiled, &ctx);
    let mut vm = Vm::new(table, compiled.entry).expect("vm construction should succeed");
    vm.run()
}

#[test]
fn arithmetic_honors_operator_precedence() {
    let source = "int main() { return 2 + 3 * 4; }";
    assert_eq!(run(source), Ok(14));
}

#[test]
fn for_loop_sums_one_through_ten() {
    let source = "
        int main() {
            int sum;
            int i;
            sum = 0;
            for (i = 1; i <= 10; i++) {
                sum += i;
            }
            return sum;
        }
    ";
    assert_eq!(run(source), Ok(55));
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let source = "
        int main() {
            int a;
            int b;
            a = 1;
            b = 0;
            return a / b;
        }
    ";
    assert_eq!(run(source), Err(RuntimeErrorCode::DivisionByZero));
}

#[test]
fn array_index_past_its_bound_is_value_out_of_range() {
    let source = "
        int main() {
            int a[3];
            a[3] = 1;
            return 0;
        }
    ";
    assert_eq!(run(source), Err(RuntimeErrorCode::ValueOutOfRange));
}

#[test]
fn equal_length_char_arrays_compare_element_wise() {
    let source = r#"
        int main() {
            char a[3] = "cat";
            char b[3] = "cat";
            if (a == b) {
                return 1;
            }
            return 0;
        }
    "#;
    assert_eq!(run(source), Ok(1));
}

#[test]
fn mismatched_char_arrays_compare_unequal() {
    let source = r#"
        int main() {
            char a[3] = "cat";
            char b[3] = "dog";
            if (a == b) {
                return 1;
            }
            return 0;
        }
    "#;
    assert_eq!(run(source), Ok(0));
}

#[test]
fn if_else_takes_the_else_branch_when_the_condition_is_false() {
    let source = "
        int main() {
            int x;
            x = 0;
            if (x > 0) {
                return 1;
            } else {
                return 2;
            }
        }
    ";
    assert_eq!(run(source), Ok(2));
}

#[test]
fn if_without_else_falls_through_when_the_condition_is_false() {
    let source = "
        int main() {
            int x;
            x = 0;
            if (x > 0) {
                x = 99;
            }
            return x;
        }
    ";
    assert_eq!(run(source), Ok(0));
}

#[test]
fn function_call_threads_a_value_through_two_activations() {
    let source = "
        int add(int a, int b) {
            return a + b;
        }
        int main() {
            return add(19, 23);
        }
    ";
    assert_eq!(run(source), Ok(42));
}

#[test]
fn switch_dispatches_to_the_matching_case_without_fallthrough() {
    let source = "
        int main() {
            int x;
            int result;
            x = 2;
            result = 0;
            switch (x) {
                case 1:
                    result = 10;
                    break;
                case 2:
                    result = 20;
                    break;
                default:
                    result = 30;
            }
            return result;
        }
    ";
    assert_eq!(run(source), Ok(20));
}

#[test]
fn include_pulls_in_a_function_defined_in_another_file() {
    use std::fs;
    use tempfile::tempdir;

    let dir = tempdir().unwrap();
    fs::write(dir.path().join("helper.cx"), "int triple(int n) { return n * 3; }\n").unwrap();
    fs::write(dir.path().join("main.cx"), "#include \"helper.cx\"\nint main() { return triple(14); }\n").unwrap();

    let mut ctx = TranslationContext::new(TranslationOptions {
        origin_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    });
    let source = fs::read_to_string(dir.path().join("main.cx")).unwrap();
    let compiled = parse_program(&source, &mut ctx).expect("translation should succeed");
    let table = to_program_table(&compiled, &ctx);
    let mut vm = Vm::new(table, compiled.entry).expect("vm construction should succeed");
    assert_eq!(vm.run(), Ok(42));
}

#[test]
fn including_the_same_file_twice_does_not_redefine_its_functions() {
    use std::fs;
    use tempfile::tempdir;

    let dir = tempdir().unwrap();
    fs::write(dir.path().join("helper.cx"), "int triple(int n) { return n * 3; }\n").unwrap();
    fs::write(
        dir.path().join("main.cx"),
        "#include \"helper.cx\"\n#include \"helper.cx\"\nint main() { return triple(14); }\n",
    )
    .unwrap();

    let mut ctx = TranslationContext::new(TranslationOptions {
        origin_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    });
    let source = fs::read_to_string(dir.path().join("main.cx")).unwrap();
    let compiled = parse_program(&source, &mut ctx).expect("translation should succeed");
    assert!(ctx.diagnostics.is_empty());
    let table = to_program_table(&compiled, &ctx);
    let mut vm = Vm::new(table, compiled.entry).expect("vm construction should succeed");
    assert_eq!(vm.run(), Ok(42));
}

#[test]
fn true_and_false_behave_as_the_boolean_enum_constants_they_are() {
    let source = "
        int main() {
            bool done;
            done = false;
            if (done == true) {
                return 1;
            }
            done = true;
            if (done == true) {
                return 2;
            }
            return 0;
        }
    ";
    assert_eq!(run(source), Ok(2));
}

#[test]
fn a_top_level_enum_declaration_is_reported_as_unimplemented() {
    let mut ctx = TranslationContext::new(TranslationOptions::default());
    let source = "
        enum Color { red, green, blue };
        int main() { return 0; }
    ";
    let compiled = parse_program(source, &mut ctx).expect("parser should recover and still produce a program");
    assert!(ctx.diagnostics.entries().iter().any(|e| e.code == ErrorCode::UnimplementedFeature));
    assert!(compiled.functions.contains_key(&compiled.entry));
}

#[test]
fn a_stray_character_is_reported_without_truncating_the_rest_of_the_file() {
    let mut ctx = TranslationContext::new(TranslationOptions::default());
    let source = "
        int main() @ {
            return 7;
        }
    ";
    let compiled = parse_program(source, &mut ctx).expect("parser should recover and still produce a program");
    assert!(!ctx.diagnostics.is_empty());
    assert!(compiled.functions.contains_key(&compiled.entry));
}

#[test]
fn a_malformed_expression_is_reported_and_parsing_continues() {
    let mut ctx = TranslationContext::new(TranslationOptions::default());
    let source = "
        int main() {
            int x;
            x = ;
            return 0;
        }
    ";
    let compiled = parse_program(source, &mut ctx).expect("parser should recover and still produce a program");
    assert!(!ctx.diagnostics.is_empty());
    assert!(compiled.functions.contains_key(&compiled.entry));
}
