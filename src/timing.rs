//! Baud rate calibration.

/// Tick rate and fixed instruction costs of a platform's busy-wait loop.
///
/// All overheads are expressed in ticks of [`CpuProfile::tick_rate`], the unit
/// [`crate::Platform::busy_wait`] counts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CpuProfile {
    /// Busy-wait ticks per second.
    pub tick_rate: u32,
    /// Cost from the edge interrupt firing to the first delay of the sampler.
    pub rx_entry_overhead: u32,
    /// Cost of sampling and storing one data bit.
    pub rx_bit_overhead: u32,
    /// Cost from the last data sample to the stop-bit delay.
    pub rx_stop_overhead: u32,
    /// Cost of driving one bit onto the transmit pin.
    pub tx_overhead: u32,
    /// Highest baud rate known to receive reliably.
    pub max_reliable_baud: u32,
}

impl CpuProfile {
    /// An AVR core clocked at `cpu_hz`, using a 4-cycle busy-wait loop.
    ///
    /// Reception has been observed to be reliable up to 57 600 baud at 16 MHz.
    pub const fn avr(cpu_hz: u32) -> Self {
        Self {
            tick_rate: cpu_hz / 4,
            rx_entry_overhead: (4 + 4 + 75 + 17 - 23) / 4,
            rx_bit_overhead: 23 / 4,
            rx_stop_overhead: (37 + 11) / 4,
            tx_overhead: 15 / 4,
            max_reliable_baud: 57_600 / 16 * (cpu_hz / 1_000_000),
        }
    }

    /// A platform whose delays are exact and whose instructions are free.
    ///
    /// Suits cores that busy-wait on a hardware timer and run fast enough for
    /// their instruction cost to vanish in the delay rounding.
    pub const fn ideal(tick_rate: u32) -> Self {
        Self {
            tick_rate,
            rx_entry_overhead: 0,
            rx_bit_overhead: 0,
            rx_stop_overhead: 0,
            tx_overhead: 0,
            max_reliable_baud: u32::MAX,
        }
    }
}

/// Delay constants for one baud rate, in busy-wait ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
    /// Nominal length of one bit.
    pub bit_duration: u32,
    /// From interrupt entry to the middle of the start bit.
    pub rx_delay_centering: u32,
    /// Between consecutive data-bit samples.
    pub rx_delay_intrabit: u32,
    /// From the last data sample into the stop bit.
    pub rx_delay_stopbit: u32,
    /// Hold time of each transmitted bit.
    pub tx_delay: u32,
    /// The baud rate is above what the profile receives reliably, or a delay
    /// had to be clamped to zero.
    pub degraded: bool,
}

impl Timing {
    /// Derive the delay constants for `baud` on `profile`.
    ///
    /// Never fails. Rates the platform cannot keep up with produce clamped
    /// delays and set [`Timing::degraded`]; received data is then unreliable.
    /// A baud rate of zero is treated as one.
    pub fn calibrate(baud: u32, profile: &CpuProfile) -> Self {
        let bit_duration = profile.tick_rate / baud.max(1);

        let centering = (bit_duration / 2).checked_sub(profile.rx_entry_overhead);
        let intrabit = bit_duration.checked_sub(profile.rx_bit_overhead);
        let three_quarters = (u64::from(bit_duration) * 3 / 4) as u32;
        let stopbit = three_quarters.checked_sub(profile.rx_stop_overhead);
        let tx = bit_duration.checked_sub(profile.tx_overhead);

        let clamped =
            centering.is_none() || intrabit.is_none() || stopbit.is_none() || tx.is_none();
        let degraded = clamped || baud > profile.max_reliable_baud;

        let timing = Self {
            bit_duration,
            rx_delay_centering: centering.unwrap_or(0),
            rx_delay_intrabit: intrabit.unwrap_or(0),
            rx_delay_stopbit: stopbit.unwrap_or(0),
            tx_delay: tx.unwrap_or(0),
            degraded,
        };

        if degraded {
            warn!(
                "{=u32} baud exceeds the platform timing limit of {=u32}, reception is unreliable",
                baud,
                profile.max_reliable_baud
            );
        }
        debug!("calibrated {=u32} baud: {}", baud, timing);

        timing
    }
}
