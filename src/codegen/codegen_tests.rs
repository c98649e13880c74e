use super::*;

use crate::error::{CompileError, ErrorKind};
use crate::parser;

fn generate(source: &str) -> String {
    let parsed = parser::parse(source).expect("program should parse");
    CodeGen::generate(&parsed.program, parsed.table, parsed.strings)
        .expect("program should generate")
}

fn generate_err(source: &str) -> CompileError {
    let parsed = parser::parse(source).expect("program should parse");
    CodeGen::generate(&parsed.program, parsed.table, parsed.strings)
        .expect_err("generation should fail")
}

#[test]
fn test_file_skeleton() {
    let asm = generate("let x: int = 1\n");
    assert!(asm.starts_with("format PE64 console\nentry start\ninclude 'win64ax.inc'\n"));

    // sections appear in data, text, idata order
    let data = asm.find("section '.data'").unwrap();
    let text = asm.find("section '.text'").unwrap();
    let idata = asm.find("section '.idata'").unwrap();
    assert!(data < text && text < idata);

    assert!(asm.contains("buffer      rb 64"));
    assert!(asm.contains("stringstore rb 256"));
    assert!(asm.contains("mov rbp, rsp"));
    assert!(asm.contains("mov ecx, 0"));
    assert!(asm.contains("call [ExitProcess]"));
    assert!(asm.contains("import kernel32, ExitProcess, 'ExitProcess'"));
    assert!(asm.contains("printf, 'printf', scanf, 'scanf', sprintf, 'sprintf'"));
}

#[test]
fn test_declaration_and_print() {
    let asm = generate("let x: int = 5 + 3\nwrite(\"x=\", x)\n");

    // one 16-byte frame for the 4-byte x
    assert!(asm.contains("sub rsp, 16"));
    assert!(asm.contains("add rsp, 16"));

    // 5 + 3 lands in x's slot at [rbp - 12]
    assert!(asm.contains("add rsi, rdi"));
    assert!(asm.contains("mov dword [rbp - 12], ebx"));

    // the literal prints from its label, the variable through sprintf
    assert!(asm.contains("str_0 db 'x=', 0"));
    assert!(asm.contains("str_0_len = $ - str_0 - 1"));
    assert!(asm.contains("cinvoke printf, str_0"));
    assert!(asm.contains("cinvoke sprintf, buffer, '%d', rbx"));
    assert!(asm.contains("cinvoke printf, buffer"));
}

#[test]
fn test_type_inference_spills_a_byte() {
    let parsed = parser::parse("let y\ny = 'A'\n").unwrap();
    let mut gen = CodeGen::new(parsed.table, parsed.strings);
    gen.emit_program(&parsed.program).unwrap();

    assert_eq!(
        crate::table::DataType::Char,
        gen.table.lookup("y").unwrap().data_type
    );
    // the 8-byte unknown slot sits at [rbp - 8]; the char spill is one byte
    assert!(gen.out.contains("mov byte [rbp - 8], bl"));
}

#[test]
fn test_loop_shape() {
    let asm = generate("let i: int = 0\nwhile (i < 10) { i = i + 1 }\n");

    // exactly one zero test at the loop head
    assert_eq!(1, asm.matches("cmp rbx, 0").count());
    assert_eq!(1, asm.matches("je label_").count());
    assert!(asm.contains("label_0:"));
    assert!(asm.contains("je label_1"));
    assert!(asm.contains("jmp label_0"));
    assert!(asm.contains("label_1:"));

    // the comparison feeding the test
    assert!(asm.contains("setl al"));
    assert!(asm.contains("movzx rbx, al"));
}

#[test]
fn test_conditional_chain_runs_one_branch() {
    let asm = generate("let x: int = 1\nif (x == 1) {\nx = 2\n} else {\nx = 3\n}\n");

    // the conditioned branch tests once and skips to its label; its body
    // then jumps over the else branch to the shared end label
    assert_eq!(1, asm.matches("je label_").count());
    assert!(asm.contains("je label_1"));
    assert!(asm.contains("jmp label_0"));
    assert_eq!(1, asm.matches("label_0:").count());
    assert_eq!(1, asm.matches("label_1:").count());

    let jmp_end = asm.find("jmp label_0").unwrap();
    let skip = asm.find("label_1:").unwrap();
    assert!(jmp_end < skip, "the then body jumps to end before the skip label");
}

#[test]
fn test_nested_scopes_get_distinct_slots() {
    let asm = generate("let a: int = 1\n{\nlet b: int = 2\nwrite(b)\n}\nwrite(a)\n");

    // a in the program frame, b in the block frame below it
    assert!(asm.contains("[rbp - 12]"));
    assert!(asm.contains("[rbp - 28]"));
    assert_eq!(2, asm.matches("sub rsp, 16").count());
    assert_eq!(2, asm.matches("add rsp, 16").count());
}

#[test]
fn test_stack_balance_across_nesting() {
    let asm = generate("let a: int\n{\nlet b: int\n{\nlet c: int\n}\n}\n");
    assert_eq!(3, asm.matches("sub rsp, 16").count());
    assert_eq!(3, asm.matches("add rsp, 16").count());
}

#[test]
fn test_registers_balance_after_every_statement() {
    let parsed =
        parser::parse("let x: int = 1 + 2 * 3\nlet f: float = 1.5\nwrite(x)\n").unwrap();
    let mut gen = CodeGen::new(parsed.table, parsed.strings);
    gen.emit_program(&parsed.program).unwrap();
    assert_eq!((14, 16), gen.registers.free_counts());
}

#[test]
fn test_division_through_rax() {
    let asm = generate("let q: int = 7 / 2\n");
    assert!(asm.contains("mov rax, rsi"));
    assert!(asm.contains("cqo"));
    assert!(asm.contains("idiv rdi"));
    assert!(asm.contains("mov rsi, rax"));
}

#[test]
fn test_modulo_takes_rdx() {
    let asm = generate("let m: int = 7 % 2\n");
    assert!(asm.contains("mov rsi, rdx"));
}

#[test]
fn test_float_literal_goes_through_bits() {
    let asm = generate("let f: float = 1.5\n");
    assert!(asm.contains(&format!("mov ebx, {}", 1.5_f32.to_bits())));
    assert!(asm.contains("movd xmm1, ebx"));
    assert!(asm.contains("movss xmm0, xmm1"));
    assert!(asm.contains("movss dword [rbp - 12], xmm0"));
}

#[test]
fn test_int_to_float_coercion() {
    let asm = generate("let g: float = 2\n");
    assert!(asm.contains("cvtsi2ss xmm0, rbx"));
    assert!(asm.contains("movss dword [rbp - 12], xmm0"));
}

#[test]
fn test_string_arithmetic_is_type_error() {
    let err = generate_err("let s: string = \"hi\"\nlet n: int = s + 1\n");
    assert_eq!(ErrorKind::Type, err.kind);
}

#[test]
fn test_float_arithmetic_is_type_error() {
    let err = generate_err("let a: float = 1.0\nlet b: float = a + a\n");
    assert_eq!(ErrorKind::Type, err.kind);
}

#[test]
fn test_string_equality_shares_one_label() {
    let asm = generate("let s: string = \"a\"\nlet t: string = \"a\"\nlet e: bool = s == t\n");
    assert!(asm.contains("str_0 db 'a', 0"));
    assert!(!asm.contains("str_1"));
    assert!(asm.contains("sete al"));
}

#[test]
fn test_short_circuit_and() {
    let asm = generate("let r: bool = (1 < 2) && (0 < 1)\n");
    assert_eq!(2, asm.matches("jz label_0").count());
    assert!(asm.contains("jmp label_1"));
    assert!(asm.contains("label_0:"));
    assert!(asm.contains("label_1:"));
}

#[test]
fn test_short_circuit_or() {
    let asm = generate("let r: bool = (1 < 2) || (0 < 1)\n");
    assert_eq!(2, asm.matches("jnz label_0").count());
}

#[test]
fn test_boolean_literal_prints_digit() {
    let asm = generate("write(TRUE)\nwrite(FALSE)\n");
    assert!(asm.contains("cinvoke printf, '1'"));
    assert!(asm.contains("cinvoke printf, '0'"));
}

#[test]
fn test_read_into_char() {
    let asm = generate("let c: char = 'A'\nread(c)\n");
    assert!(asm.contains("cinvoke scanf, '%c', charstore"));
    assert!(asm.contains("movzx rbx, byte [charstore]"));
    assert!(asm.contains("mov byte [rbp - 15], bl"));
}

#[test]
fn test_read_into_unknown_is_type_error() {
    let err = generate_err("let u\nread(u)\n");
    assert_eq!(ErrorKind::Type, err.kind);
}

#[test]
fn test_read_of_literal_is_type_error() {
    let err = generate_err("read(5)\n");
    assert_eq!(ErrorKind::Type, err.kind);
}

#[test]
fn test_undeclared_variable_is_reference_error() {
    let err = generate_err("x = 1\n");
    assert_eq!(ErrorKind::Reference, err.kind);
}

#[test]
fn test_function_definition_is_rejected_at_emit() {
    let err = generate_err("fn f() {\n}\n");
    assert_eq!(ErrorKind::Function, err.kind);
}

#[test]
fn test_unknown_call_is_rejected() {
    let err = generate_err("foo(1)\n");
    assert_eq!(ErrorKind::Function, err.kind);
}

#[test]
fn test_register_manager_exhaustion_and_release() {
    let mut registers = RegisterManager::new();
    let mut taken = Vec::new();
    for _ in 0..14 {
        taken.push(registers.get_free().unwrap());
    }
    let err = registers.get_free().unwrap_err();
    assert_eq!(ErrorKind::Runtime, err.kind);

    // release routes by prefix, ignores empty names, and is idempotent
    registers.release("");
    registers.release(&taken[0]);
    registers.release(&taken[0]);
    assert_eq!((1, 16), registers.free_counts());

    let xmm = registers.get_free_xmm().unwrap();
    assert!(xmm.starts_with("xmm"));
    registers.release(&xmm);
    assert_eq!((1, 16), registers.free_counts());
}

#[test]
fn test_empty_program_has_no_frame() {
    let asm = generate("\n");
    assert!(!asm.contains("sub rsp"));
    assert!(!asm.contains("add rsp"));
    assert!(asm.contains("call [ExitProcess]"));
}

#[test]
fn test_write_literal_formats() {
    let asm = generate("write(5)\nwrite('A')\nwrite(2.5)\n");
    assert!(asm.contains("cinvoke printf, '%d', 5"));
    assert!(asm.contains("cinvoke printf, '%c', 65"));
    // float literals fold to their promoted double bit pattern
    assert!(asm.contains(&format!("mov rbx, {}", 2.5_f64.to_bits())));
    assert!(asm.contains("cinvoke printf, '%f', rbx"));
}

#[test]
fn test_write_string_variable_prints_pointer() {
    let asm = generate("let s: string = \"hi\"\nwrite(s)\n");
    assert!(asm.contains("mov rbx, qword [rbp - 8]"));
    assert!(asm.contains("cinvoke printf, rbx"));
}

#[test]
fn test_write_float_variable_promotes_to_double() {
    let asm = generate("let f: float = 1.0\nwrite(f)\n");
    assert!(asm.contains("cvtss2sd xmm0, xmm0"));
    assert!(asm.contains("movq rbx, xmm0"));
    assert!(asm.contains("cinvoke sprintf, buffer, '%f', rbx"));
}

#[test]
fn test_read_into_int() {
    let asm = generate("let n: int = 0\nread(n)\n");
    assert!(asm.contains("cinvoke scanf, '%d', intstore"));
    assert!(asm.contains("mov ebx, dword [intstore]"));
    assert!(asm.contains("mov dword [rbp - 12], ebx"));
}

#[test]
fn test_read_into_string_points_at_scratch() {
    let asm = generate("let s: string = \"x\"\nread(s)\n");
    assert!(asm.contains("cinvoke scanf, '%s', stringstore"));
    assert!(asm.contains("mov rbx, stringstore"));
    assert!(asm.contains("mov qword [rbp - 8], rbx"));
}

#[test]
fn test_read_into_float_is_type_error() {
    let err = generate_err("let f: float = 1.0\nread(f)\n");
    assert_eq!(ErrorKind::Type, err.kind);
}

#[test]
fn test_unary_negate_and_not() {
    let asm = generate("let a: int = -5\nlet b: bool = !TRUE\n");
    assert!(asm.contains("neg rsi"));
    assert!(asm.contains("cmp rsi, 0"));
    assert!(asm.contains("sete al"));
    assert!(asm.contains("movzx rsi, al"));
}

#[test]
fn test_unary_minus_on_string_is_type_error() {
    let err = generate_err("let s: string = \"a\"\nlet n: int = -s\n");
    assert_eq!(ErrorKind::Type, err.kind);
}

#[test]
fn test_else_if_chain_jumps_to_shared_end() {
    let asm = generate(
        "let x: int = 1\nif (x == 1) {\nx = 2\n} else if (x == 2) {\nx = 3\n} else {\nx = 4\n}\n",
    );
    // two conditioned branches, each with its own skip label
    assert_eq!(2, asm.matches("je label_").count());
    // both conditioned bodies jump to the one shared end label
    assert_eq!(2, asm.matches("jmp label_0").count());
    assert_eq!(1, asm.matches("label_0:").count());
}

#[test]
fn test_mixed_comparison_is_type_error() {
    let err = generate_err("let n: int = 1\nlet c: char = 'a'\nlet b: bool = n < c\n");
    assert_eq!(ErrorKind::Type, err.kind);
}

#[test]
fn test_char_comparison_is_allowed() {
    let asm = generate("let a: char = 'x'\nlet b: char = 'y'\nlet r: bool = a < b\n");
    assert!(asm.contains("setl al"));
}

#[test]
fn test_string_ordering_is_type_error() {
    let err = generate_err("let s: string = \"a\"\nlet t: string = \"b\"\nlet r: bool = s < t\n");
    assert_eq!(ErrorKind::Type, err.kind);
}

#[test]
fn test_logical_on_string_is_type_error() {
    let err = generate_err("let s: string = \"a\"\nlet r: bool = s && TRUE\n");
    assert_eq!(ErrorKind::Type, err.kind);
}

#[test]
fn test_float_condition_is_type_error() {
    let err = generate_err("let f: float = 1.0\nwhile (f) {\n}\n");
    assert_eq!(ErrorKind::Type, err.kind);
}

#[test]
fn test_return_materializes_into_rax() {
    let asm = generate("return 5\n");
    assert!(asm.contains("mov rbx, 5"));
    assert!(asm.contains("mov rax, rbx"));
}

#[test]
fn test_empty_string_literal_data() {
    let asm = generate("let s: string = \"\"\n");
    assert!(asm.contains("str_0 db 0"));
    assert!(asm.contains("str_0_len = $ - str_0 - 1"));
}

#[test]
fn test_quote_in_string_literal_is_doubled() {
    let asm = generate("write(\"it's\")\n");
    assert!(asm.contains("str_0 db 'it''s', 0"));
}

#[test]
fn test_assignment_result_allows_chaining_register_release() {
    let parsed = parser::parse("let a: int = 1\nlet b: int = 2\na = b\n").unwrap();
    let mut gen = CodeGen::new(parsed.table, parsed.strings);
    gen.emit_program(&parsed.program).unwrap();
    assert_eq!((14, 16), gen.registers.free_counts());
}
