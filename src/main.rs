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

//! A thin CLI wrapper over `hd6303kit`'s build-driver surface. Not the
//! interesting part of the toolchain: it parses arguments, reads/writes
//! files, and renders diagnostics, leaving every real decision to the
//! library.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hd6303kit::asm::{AssembleOptions, OutputForm};
use hd6303kit::errors::DiagnosticBundle;
use hd6303kit::file_reader::OsFileReader;
use hd6303kit::models::TargetModel;
use hd6303kit::pack::{PackError, Record, RecordType};
use hd6303kit::{
    assemble, compile_c, emulator_display_text, emulator_load_pack, emulator_new, emulator_reset, emulator_run,
    emulator_tap_key, key_for_char, pack_create, pack_extract, pack_inspect,
};

#[derive(Parser)]
#[clap(version, author = "Connor Nolan")]
struct Opts {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a C source file to HD6303 assembly.
    Cc {
        input: PathBuf,
        #[clap(short, long)]
        output: PathBuf,
        #[clap(short, long, default_value = "LZ")]
        model: String,
        /// Compile in library mode: no entry point, no global init.
        #[clap(long)]
        lib: bool,
    },
    /// Assemble HD6303 assembly text to an object file.
    Asm {
        input: PathBuf,
        #[clap(short, long)]
        output: PathBuf,
        #[clap(short, long, default_value = "LZ")]
        model: String,
        #[clap(long)]
        relocatable: bool,
        #[clap(long)]
        no_optimize: bool,
        #[clap(long, default_value_t = 0x8000)]
        origin: u32,
    },
    /// Bundle one or more records into an OPK pack.
    PackCreate {
        #[clap(short, long)]
        output: PathBuf,
        /// `NAME:procedure|data:PATH`, repeatable.
        #[clap(long = "record")]
        records: Vec<String>,
        #[clap(long, default_value_t = 0)]
        creation_date: u32,
    },
    /// Print a pack's directory.
    PackInspect { input: PathBuf },
    /// Extract one record's payload from a pack.
    PackExtract {
        input: PathBuf,
        record: String,
        #[clap(short, long)]
        output: PathBuf,
    },
    /// Load a pack into the emulator, run it, and print the display.
    Emulate {
        input: PathBuf,
        #[clap(short, long, default_value = "LZ")]
        model: String,
        #[clap(long, default_value_t = 0)]
        slot: usize,
        #[clap(long, default_value_t = 200_000)]
        cycles: u64,
        /// Characters to feed through the keyboard before running.
        #[clap(long)]
        keys: Option<String>,
    },
}

fn resolve_model(name: &str) -> Result<TargetModel, String> {
    TargetModel::parse(name).ok_or_else(|| format!("unknown target model `{name}`"))
}

fn report<T>(result: Result<T, DiagnosticBundle>) -> Result<T, ExitCode> {
    result.map_err(|bundle| {
        eprintln!("{bundle}");
        ExitCode::from(2)
    })
}

fn main() -> ExitCode {
    env_logger::init();
    let opts = Opts::parse();
    match run(opts) {
        Ok(code) => code,
        Err(code) => code,
    }
}

fn run(opts: Opts) -> Result<ExitCode, ExitCode> {
    let reader = OsFileReader;
    match opts.command {
        Command::Cc { input, output, model, lib } => {
            let model = resolve_model(&model).map_err(usage_error)?;
            let asm = report(compile_c(&input, model, !lib, &reader))?;
            fs::write(&output, asm).map_err(io_error)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Asm { input, output, model, relocatable, no_optimize, origin } => {
            let model = resolve_model(&model).map_err(usage_error)?;
            let text = fs::read_to_string(&input).map_err(io_error)?;
            let options = AssembleOptions {
                origin,
                relocatable,
                optimize: !no_optimize,
                form: OutputForm::Object,
                want_listing: false,
                want_debug: false,
                target_model: model,
            };
            let out = report(assemble(&text, &options, &reader))?;
            fs::write(&output, out.object_bytes).map_err(io_error)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::PackCreate { output, records, creation_date } => {
            let mut parsed = Vec::with_capacity(records.len());
            for spec in &records {
                parsed.push(parse_record_spec(spec).map_err(usage_error)?);
            }
            let bytes = pack_create(&parsed, creation_date).map_err(pack_error)?;
            fs::write(&output, bytes).map_err(io_error)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::PackInspect { input } => {
            let bytes = fs::read(&input).map_err(io_error)?;
            let directory = pack_inspect(&bytes).map_err(pack_error)?;
            println!("{} records, created {}", directory.entries.len(), directory.header.creation_date);
            for entry in &directory.entries {
                println!("  {:<8} {:?} {} bytes", entry.name_str(), entry.kind(), entry.length);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::PackExtract { input, record, output } => {
            let bytes = fs::read(&input).map_err(io_error)?;
            let payload = pack_extract(&bytes, &record).map_err(pack_error)?;
            fs::write(&output, payload).map_err(io_error)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Emulate { input, model, slot, cycles, keys } => {
            let model = resolve_model(&model).map_err(usage_error)?;
            let pack_bytes = fs::read(&input).map_err(io_error)?;
            let mut emu = emulator_new(model);
            emulator_load_pack(&mut emu, &pack_bytes, slot).map_err(pack_error)?;
            emulator_reset(&mut emu);
            if let Some(keys) = keys {
                for c in keys.chars() {
                    if let Some(key) = key_for_char(c) {
                        emulator_tap_key(&mut emu, key, 2_000);
                    }
                }
            }
            emulator_run(&mut emu, cycles);
            for row in emulator_display_text(&emu) {
                println!("{row}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Parses a `NAME:KIND:PATH` record spec for `pack-create`, where `KIND` is
/// `procedure` or `data`.
fn parse_record_spec(spec: &str) -> Result<Record, String> {
    let mut parts = spec.splitn(3, ':');
    let name = parts.next().ok_or("missing record name")?;
    let kind = parts.next().ok_or("missing record kind")?;
    let path = parts.next().ok_or("missing record path")?;
    let kind = match kind {
        "procedure" => RecordType::Procedure,
        "data" => RecordType::Data,
        other => return Err(format!("unknown record kind `{other}` (expected procedure or data)")),
    };
    let payload = fs::read(path).map_err(|e| format!("reading {path}: {e}"))?;
    Ok(Record {
        name: name.to_string(),
        kind,
        payload,
    })
}

fn usage_error(message: String) -> ExitCode {
    eprintln!("{message}");
    ExitCode::from(1)
}

fn io_error(e: std::io::Error) -> ExitCode {
    eprintln!("{e}");
    ExitCode::from(2)
}

fn pack_error(e: PackError) -> ExitCode {
    eprintln!("{e}");
    ExitCode::from(2)
}
