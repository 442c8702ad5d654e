//! Bit-banged transmission of one frame.

use crate::platform::Platform;

/// The ten logical line levels of one frame: a start bit (0), eight data bits
/// least-significant first, and a stop bit (1).
pub fn frame_bits(byte: u8) -> impl Iterator<Item = bool> {
    core::iter::once(false)
        .chain((0..8).map(move |bit| (byte >> bit) & 1 != 0))
        .chain(core::iter::once(true))
}

/// Drive one frame onto `pin`, holding every bit for `tx_delay` ticks.
///
/// Blocks for about ten bit periods. Must run with interrupts disabled: a
/// receive interrupt in the middle of a frame stretches the bit it lands in.
pub(crate) fn send_frame<P: Platform>(
    platform: &P,
    pin: P::Pin,
    byte: u8,
    inverse_logic: bool,
    tx_delay: u32,
) {
    for level in frame_bits(byte) {
        platform.set_level(pin, level != inverse_logic);
        platform.busy_wait(tx_delay);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::Sim;
    use std::vec::Vec;

    #[test]
    fn frame_of_0x55() {
        let bits: Vec<bool> = frame_bits(0x55).collect();
        assert_eq!(
            bits,
            [false, true, false, true, false, true, false, true, false, true]
        );
    }

    #[test]
    fn frame_is_lsb_first() {
        let bits: Vec<bool> = frame_bits(0x01).collect();
        assert_eq!(
            bits,
            [false, true, false, false, false, false, false, false, false, true]
        );
    }

    #[test]
    fn waveform_is_evenly_spaced() {
        let sim = Sim::new();
        sim.set_mode(1, crate::PinMode::Output);
        send_frame(&sim, 1, 0xA3, false, 100);

        let wave = sim.driven(1);
        assert_eq!(wave.len(), 10);
        for (i, (t, _)) in wave.iter().enumerate() {
            assert_eq!(*t, i as u64 * 100);
        }
        let levels: Vec<bool> = wave.iter().map(|&(_, level)| level).collect();
        assert_eq!(levels, frame_bits(0xA3).collect::<Vec<_>>());
        assert_eq!(sim.now(), 1000);
    }

    #[test]
    fn inverted_waveform() {
        let sim = Sim::new();
        sim.set_mode(1, crate::PinMode::Output);
        send_frame(&sim, 1, 0x0F, true, 10);

        let levels: Vec<bool> = sim.driven(1).iter().map(|&(_, level)| level).collect();
        let expected: Vec<bool> = frame_bits(0x0F).map(|bit| !bit).collect();
        assert_eq!(levels, expected);
    }
}
