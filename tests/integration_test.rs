/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! End-to-end coverage threading the whole toolchain: C source in, a
//! running HD6303 system out. These mirror the build driver's own
//! surface (`hd6303kit::driver`) rather than any single phase's unit
//! tests, so a regression anywhere in compile → assemble → pack → emulate
//! shows up here.

use std::path::Path;

use hd6303kit::asm::relocator::STUB_LEN;
use hd6303kit::asm::{AssembleOptions, OutputForm};
use hd6303kit::file_reader::{MockFileReader, OsFileReader};
use hd6303kit::models::TargetModel;
use hd6303kit::pack::{Record, RecordType};
use hd6303kit::{assemble, compile_c, emulator_display_text, emulator_new, emulator_reset, emulator_run, pack_create, pack_extract, pack_inspect};

const RUN_BUDGET: u64 = 5_000;

fn build_and_run(source: &str) -> hd6303kit::Emulator {
    let mut reader = MockFileReader::default();
    reader.add_file("main.c", source);
    let asm = compile_c(Path::new("main.c"), TargetModel::CompactLz, true, &reader).unwrap();

    let options = AssembleOptions { form: OutputForm::Raw, ..AssembleOptions::default() };
    let out = assemble(&asm, &options, &reader).unwrap();

    let mut emu = emulator_new(TargetModel::CompactLz);
    emu.load_code(&out.object_bytes);
    emu.reset();
    emulator_run(&mut emu, RUN_BUDGET);
    emu
}

#[test]
fn hello_world_clears_the_display_and_prints_two_characters() {
    let emu = build_and_run(
        "external void CLS();\n\
         external void PUTC(char c);\n\
         int main() { CLS(); PUTC('H'); PUTC('I'); return 0; }\n",
    );
    let rows = emulator_display_text(&emu);
    assert_eq!(rows.len(), 2);
    assert!(rows[0].starts_with("HI"));
    assert_eq!(rows[1].trim(), "");
}

#[test]
fn print_int_renders_decimal_digits() {
    let emu = build_and_run(
        "external void PRINT_INT(int n);\n\
         int main() { PRINT_INT(123); return 0; }\n",
    );
    assert!(emulator_display_text(&emu)[0].starts_with("123"));
}

#[test]
fn eight_bit_char_addition_wraps_instead_of_widening() {
    // 200 + 100 = 300, which truncates to 44 once both operands are `char`.
    let emu = build_and_run(
        "external void PRINT_INT(int n);\n\
         int main() { char a; char b; a = 200; b = 100; PRINT_INT(a + b); return 0; }\n",
    );
    assert!(emulator_display_text(&emu)[0].starts_with("44"));
}

#[test]
fn sizeof_a_two_field_struct_counts_every_field_with_no_padding() {
    let emu = build_and_run(
        "struct Point { int x; int y; };\n\
         external void PRINT_INT(int n);\n\
         int main() { PRINT_INT(sizeof(struct Point)); return 0; }\n",
    );
    assert!(emulator_display_text(&emu)[0].starts_with('4'));
}

#[test]
fn external_addnum_returns_the_sum_through_the_service_trap() {
    let mut reader = MockFileReader::default();
    reader.add_file(
        "main.c",
        "external int ADDNUM(int a, int b);\n\
         external void PRINT_INT(int n);\n\
         int main() { PRINT_INT(ADDNUM(10, 32)); return 0; }\n",
    );
    let asm = compile_c(Path::new("main.c"), TargetModel::CompactLz, true, &reader).unwrap();

    let options = AssembleOptions { form: OutputForm::Raw, ..AssembleOptions::default() };
    let out = assemble(&asm, &options, &reader).unwrap();

    let mut emu = emulator_new(TargetModel::CompactLz);
    emu.load_code(&out.object_bytes);
    emu.reset();
    emulator_run(&mut emu, RUN_BUDGET);

    assert!(emulator_display_text(&emu)[0].starts_with("42"));
}

#[test]
fn self_relocating_object_produces_identical_output_from_two_load_addresses() {
    let mut reader = MockFileReader::default();
    reader.add_file(
        "main.c",
        "external void CLS();\n\
         external void PUTC(char c);\n\
         int counter = 3;\n\
         int main() { CLS(); PUTC('0' + counter); return 0; }\n",
    );
    let asm = compile_c(Path::new("main.c"), TargetModel::CompactLz, true, &reader).unwrap();

    let options = AssembleOptions {
        form: OutputForm::Raw,
        relocatable: true,
        ..AssembleOptions::default()
    };
    let out = assemble(&asm, &options, &reader).unwrap();

    let mut rendered = Vec::new();
    for base in [0x0100u16, 0x1000u16] {
        let mut emu = emulator_new(TargetModel::CompactLz);
        emu.load_relocatable(&out.object_bytes, base);
        emu.reset();
        emu.run_relocation_stub(base, STUB_LEN as u16, RUN_BUDGET);
        emulator_run(&mut emu, RUN_BUDGET);
        rendered.push(emulator_display_text(&emu));
    }
    assert_eq!(rendered[0], rendered[1]);
    assert!(rendered[0][0].starts_with('3'));
}

#[test]
fn pack_round_trips_several_records_through_create_inspect_extract() {
    let records = vec![
        Record { name: "MAIN".to_string(), kind: RecordType::Procedure, payload: vec![0xBD, 0x80, 0x00] },
        Record { name: "GREETING".to_string(), kind: RecordType::Data, payload: b"HELLO".to_vec() },
    ];
    let bytes = pack_create(&records, 20_260_129).unwrap();

    let directory = pack_inspect(&bytes).unwrap();
    assert_eq!(directory.entries.len(), 2);
    assert_eq!(directory.header.creation_date, 20_260_129);

    let greeting = pack_extract(&bytes, "GREETING").unwrap();
    assert_eq!(greeting, b"HELLO");
    let main = pack_extract(&bytes, "MAIN").unwrap();
    assert_eq!(main, vec![0xBD, 0x80, 0x00]);
}

#[test]
fn library_mode_and_main_mode_files_link_with_a_single_entry_point() {
    let mut reader = MockFileReader::default();
    reader.add_file("adder.c", "int add(int a, int b) { return a + b; }\n");
    reader.add_file(
        "main.c",
        "int add(int a, int b);\n\
         external void PRINT_INT(int n);\n\
         int main() { PRINT_INT(add(2, 3)); return 0; }\n",
    );
    let sources = vec![
        hd6303kit::cc::SourceFile { path: "adder.c".into(), role: hd6303kit::cc::SourceRole::Library },
        hd6303kit::cc::SourceFile { path: "main.c".into(), role: hd6303kit::cc::SourceRole::Main },
    ];
    let asm = hd6303kit::compile_and_link(&sources, TargetModel::CompactLz, &reader).unwrap();
    assert_eq!(asm.matches("_start:").count(), 1);

    let options = AssembleOptions { form: OutputForm::Raw, ..AssembleOptions::default() };
    let out = assemble(&asm, &options, &reader).unwrap();
    let mut emu = emulator_new(TargetModel::CompactLz);
    emu.load_code(&out.object_bytes);
    emu.reset();
    emulator_run(&mut emu, RUN_BUDGET);
    assert!(emulator_display_text(&emu)[0].starts_with('5'));
}

#[test]
fn hash_include_resolves_relative_to_the_including_file_on_a_real_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("greeting.h"), "#define GREETING_LEN 5\n").unwrap();
    let main_path = dir.path().join("main.c");
    std::fs::write(
        &main_path,
        "#include \"greeting.h\"\n\
         external void PRINT_INT(int n);\n\
         int main() { PRINT_INT(GREETING_LEN); return 0; }\n",
    )
    .unwrap();

    let reader = OsFileReader;
    let asm = compile_c(&main_path, TargetModel::CompactLz, true, &reader).unwrap();

    let options = AssembleOptions { form: OutputForm::Raw, ..AssembleOptions::default() };
    let out = assemble(&asm, &options, &reader).unwrap();

    let mut emu = emulator_new(TargetModel::CompactLz);
    emu.load_code(&out.object_bytes);
    emu.reset();
    emulator_run(&mut emu, RUN_BUDGET);
    assert!(emulator_display_text(&emu)[0].starts_with('5'));
}
