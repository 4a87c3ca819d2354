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

//! Placeholder for mnemonic families that don't fit the other
//! `instruction_encoders` modules. The HD6303 subset this assembler targets
//! turns out not to need one: `SWI`'s service selector (spec.md §4.1.5,
//! §4.4) is just the `FCB` byte a programmer writes after the bare `swi`
//! inherent-mode opcode, so no special casing is needed here.
