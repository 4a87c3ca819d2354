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

//! Free-running tick counter (spec.md §4.5 "Tick counter"), incremented on
//! a periodic timer interrupt that the ROM consumes for delays and
//! time-of-day. The period is expressed in CPU cycles rather than wall
//! time, consistent with the emulator's cycle-driven clock (spec.md §5).

#[derive(Debug, Clone, Copy)]
pub struct TickCounter {
    count: u16,
    period_cycles: u32,
    accumulated: u32,
}

impl TickCounter {
    pub fn new(period_cycles: u32) -> Self {
        Self {
            count: 0,
            period_cycles: period_cycles.max(1),
            accumulated: 0,
        }
    }

    pub fn value(&self) -> u16 {
        self.count
    }

    /// Advances the internal accumulator by `elapsed_cycles`; returns
    /// `true` if at least one period elapsed (the caller raises the timer
    /// IRQ in that case).
    pub fn advance(&mut self, elapsed_cycles: u32) -> bool {
        self.accumulated += elapsed_cycles;
        let mut fired = false;
        while self.accumulated >= self.period_cycles {
            self.accumulated -= self.period_cycles;
            self.count = self.count.wrapping_add(1);
            fired = true;
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_period() {
        let mut tick = TickCounter::new(100);
        assert!(!tick.advance(99));
        assert!(tick.advance(1));
        assert_eq!(tick.value(), 1);
    }

    #[test]
    fn counts_multiple_periods_in_one_advance() {
        let mut tick = TickCounter::new(10);
        assert!(tick.advance(35));
        assert_eq!(tick.value(), 3);
    }
}
