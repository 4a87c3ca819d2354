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

//! Pack slots (spec.md §4.5 "Pack slots"): up to three address-decoded
//! windows that a loaded pack image's bytes populate, readable the same
//! way RAM is (so the ROM's own record-directory scanning needs no special
//! casing). Grounded on `thatnewyorker-Arness`'s `ppu_bus.rs` window-decode
//! style (fixed-size address regions backed by a plain byte vector).

pub const SLOT_COUNT: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct PackSlots {
    slots: [Option<Vec<u8>>; SLOT_COUNT],
}

impl PackSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, slot: usize, bytes: Vec<u8>) {
        self.slots[slot % SLOT_COUNT] = Some(bytes);
    }

    pub fn unload(&mut self, slot: usize) {
        self.slots[slot % SLOT_COUNT] = None;
    }

    pub fn is_loaded(&self, slot: usize) -> bool {
        self.slots[slot % SLOT_COUNT].is_some()
    }

    /// Reads byte `offset` within `slot`'s window; an empty slot or an
    /// out-of-range offset reads as `0xFF` (open-bus convention), matching
    /// how the ROM's directory scan detects an absent pack.
    pub fn read(&self, slot: usize, offset: usize) -> u8 {
        self.slots[slot % SLOT_COUNT]
            .as_ref()
            .and_then(|bytes| bytes.get(offset))
            .copied()
            .unwrap_or(0xFF)
    }

    pub fn len(&self, slot: usize) -> usize {
        self.slots[slot % SLOT_COUNT].as_ref().map_or(0, |b| b.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slot_reads_as_open_bus() {
        let slots = PackSlots::new();
        assert_eq!(slots.read(0, 0), 0xFF);
    }

    #[test]
    fn loaded_slot_reads_back_its_bytes() {
        let mut slots = PackSlots::new();
        slots.load(1, vec![b'O', b'P', b'K', b'1']);
        assert_eq!(slots.read(1, 2), b'K');
        assert_eq!(slots.read(1, 10), 0xFF);
    }
}
