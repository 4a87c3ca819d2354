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

//! A cross-development toolchain for the HD6303-based Cicada-family pocket
//! computers: a restricted C dialect compiler, a two-pass HD6303 assembler
//! with a peephole optimizer and self-relocation, an OPK pack container
//! reader/writer, and a cycle-accurate CPU/peripheral emulator. `driver`
//! exposes the thin sequencer the CLI front-ends are built on.

pub mod asm;
pub mod cc;
pub mod cpu;
pub mod driver;
pub mod errors;
pub mod expr;
pub mod file_reader;
pub mod isa;
pub mod models;
pub mod pack;
pub mod peripherals;

extern crate pest;
extern crate pest_derive;

pub use driver::{
    assemble, compile_and_link, compile_c, emulator_display_text, emulator_load_pack, emulator_new,
    emulator_reset, emulator_run, emulator_tap_key, key_for_char, pack_create, pack_extract, pack_inspect,
    Emulator,
};
