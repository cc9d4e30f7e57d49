//! Raw mode LED buffer
//!
//! 40 LEDs in 8 banks of 5. Writes mark the slot dirty; `Lamp::show` sends
//! only the dirty banks and marks them written once the lamp acks them.

use ion_proto::{BANK_COUNT, BANK_SIZE, LED_COUNT, Rgb};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLedBuffer {
    leds: [Rgb; LED_COUNT],
    dirty: [bool; LED_COUNT],
}

impl Default for RawLedBuffer {
    fn default() -> Self {
        Self::filled(Rgb::BLACK)
    }
}

impl RawLedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn filled(color: Rgb) -> Self {
        Self { leds: [color; LED_COUNT], dirty: [false; LED_COUNT] }
    }

    /// Out of range indices are ignored
    pub fn set_led(&mut self, index: usize, color: Rgb) {
        if index < LED_COUNT {
            self.leds[index] = color;
            self.dirty[index] = true;
        }
    }

    pub fn led(&self, index: usize) -> Option<Rgb> {
        self.leds.get(index).copied()
    }

    pub fn leds(&self) -> &[Rgb; LED_COUNT] {
        &self.leds
    }

    /// Every LED to `color`, every bank clean. The lamp is told with a single
    /// fill command, not bank by bank.
    pub fn fill(&mut self, color: Rgb) {
        *self = Self::filled(color);
    }

    pub fn clear(&mut self) {
        self.fill(Rgb::BLACK);
    }

    pub fn bank(&self, bank_id: usize) -> Option<[Rgb; BANK_SIZE]> {
        if bank_id >= BANK_COUNT {
            return None;
        }
        let start = bank_id * BANK_SIZE;
        let mut colors = [Rgb::BLACK; BANK_SIZE];
        colors.copy_from_slice(&self.leds[start..start + BANK_SIZE]);
        Some(colors)
    }

    pub fn bank_requires_update(&self, bank_id: usize) -> bool {
        if bank_id >= BANK_COUNT {
            return false;
        }
        let start = bank_id * BANK_SIZE;
        self.dirty[start..start + BANK_SIZE].iter().any(|d| *d)
    }

    pub fn mark_bank_written(&mut self, bank_id: usize) {
        if bank_id >= BANK_COUNT {
            return;
        }
        let start = bank_id * BANK_SIZE;
        self.dirty[start..start + BANK_SIZE].fill(false);
    }

    /// Mark the bank written if it still holds `sent`; returns whether it did
    pub fn mark_bank_sent(&mut self, bank_id: usize, sent: &[Rgb; BANK_SIZE]) -> bool {
        if self.bank(bank_id).as_ref() != Some(sent) {
            return false;
        }
        self.mark_bank_written(bank_id);
        true
    }

    pub fn dirty_banks(&self) -> impl Iterator<Item = usize> + '_ {
        (0..BANK_COUNT).filter(|bank| self.bank_requires_update(*bank))
    }
}
