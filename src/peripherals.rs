//! Hardware abstraction: the register transport contract, the
//! millisecond clock consumed by the retry layer, and the wrapper that
//! drives an RFM69-compat register map through a [`Transport`].
//!
//! The driver never touches pins or chip-select timing itself; a board
//! crate implements [`Transport`] once and everything above it is
//! portable, including host-side simulation.

use crate::Error;
use log::debug;

/// Registers and flag bits of the RFM69-compat register map used by this
/// driver. Public so host-side transports (simulators, tests) can
/// interpret the traffic they see.
pub mod regs {
    pub const FIFO: u8 = 0x00;
    pub const OPMODE: u8 = 0x01;
    pub const FRF_MSB: u8 = 0x07;
    pub const OSC1: u8 = 0x0A;
    pub const LOW_BAT: u8 = 0x0C;
    pub const RSSI_VALUE: u8 = 0x24;
    pub const DIO_MAPPING1: u8 = 0x25;
    pub const IRQ_FLAGS1: u8 = 0x27;
    pub const IRQ_FLAGS2: u8 = 0x28;
    pub const SYNC_CONFIG: u8 = 0x2E;
    pub const SYNC_GROUP: u8 = 0x33;
    pub const SYNC_VALUE7: u8 = 0x35;
    pub const SYNC_VALUE8: u8 = 0x36;

    // OPMODE mode field.
    pub const MODE_MASK: u8 = 0x1C;
    pub const MODE_SLEEP: u8 = 0x00;
    pub const MODE_STANDBY: u8 = 0x04;
    pub const MODE_TRANSMITTER: u8 = 0x0C;
    pub const MODE_RECEIVER: u8 = 0x10;

    // IRQ_FLAGS1 bits.
    pub const IRQ1_MODE_READY: u8 = 0x80;
    pub const IRQ1_RSSI: u8 = 0x08;

    // IRQ_FLAGS2 bits.
    pub const IRQ2_FIFO_FULL: u8 = 0x80;
    pub const IRQ2_FIFO_NOT_EMPTY: u8 = 0x40;
    pub const IRQ2_FIFO_OVERRUN: u8 = 0x10;
    pub const IRQ2_PACKET_SENT: u8 = 0x08;

    // OSC1 bits.
    pub const OSC1_RC_CAL_START: u8 = 0x80;
    pub const OSC1_RC_CAL_DONE: u8 = 0x40;

    // LOW_BAT bits.
    pub const LOW_BAT_MONITOR: u8 = 0x10;
    pub const LOW_BAT_ON: u8 = 0x08;

    // SYNC_CONFIG values: sync on, four or five sync bytes.
    pub const SYNC_FOUR_BYTES: u8 = 0x98;
    pub const SYNC_FIVE_BYTES: u8 = 0xA0;

    // DIO_MAPPING1 values: interrupt source per direction.
    pub const DIO_RX_RSSI: u8 = 0x80;
    pub const DIO_TX_PACKET_SENT: u8 = 0x00;
}

/// How deep `send_wait` parks the CPU between interrupts.
///
/// Deeper modes trade wake latency for power; on most platforms
/// `Standby` and `PowerDown` can cost the millisecond timer a few ticks
/// while the core is asleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    /// Spin without sleeping.
    Normal,
    /// Halt the CPU clock, keep peripherals running.
    Idle,
    /// Stop most clocks; wake on the radio or timer interrupt.
    Standby,
    /// Deepest sleep the platform supports.
    PowerDown,
}

/// Register-level access to the radio chip.
///
/// Implementations own chip-select timing and the wiring of the radio's
/// interrupt line. All multi-step register sequences the driver performs
/// from non-interrupt context go through [`with_irq_masked`], so an
/// implementation must guarantee the mask is restored on every exit
/// path.
///
/// [`with_irq_masked`]: Transport::with_irq_masked
pub trait Transport {
    /// Read one chip register.
    fn read_register(&mut self, addr: u8) -> u8;

    /// Write one chip register.
    fn write_register(&mut self, addr: u8, value: u8);

    /// Run `f` with the radio interrupt masked, restoring it afterwards.
    fn with_irq_masked<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R;

    /// Park the CPU until something happens, per `mode`. The default
    /// implementation spins; platforms with a sleep instruction should
    /// override it.
    fn park(&mut self, mode: PowerMode) {
        let _ = mode;
        core::hint::spin_loop();
    }
}

/// Millisecond clock consumed by the EasyTx retry layer.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

// Fixed startup register table: bit rate, deviation, filter bandwidth,
// sync word, FIFO thresholds. Opaque configuration data, not protocol
// logic; values differ per chip revision.
const CONFIG_REGS: &[(u8, u8)] = &[
    (0x02, 0x00), // DataModul: packet mode, FSK
    (0x03, 0x02), // BitRateMsb, 49.23 kbps
    (0x04, 0x8A), // BitRateLsb
    (0x05, 0x05), // FdevMsb: 90 kHz
    (0x06, 0xC3), // FdevLsb
    (0x0B, 0x20), // AfcCtrl: afclowbetaon
    (0x19, 0x42), // RxBw
    (0x1A, 0x91), // AfcBw
    (0x1E, 0x0E), // AfcFei: autoclear, auto on
    (0x29, 0xA0), // RssiThresh: -80 dB
    (0x2E, 0xA0), // SyncConfig: on, five sync bytes
    (0x2F, 0xAA), // SyncValue1
    (0x30, 0xAA), // SyncValue2
    (0x31, 0xAA), // SyncValue3
    (0x32, 0x2D), // SyncValue4
    (0x33, 0xD4), // SyncValue5: group
    (0x37, 0x00), // PacketConfig1: fixed length, no hardware CRC
    (0x38, 0x00), // PayloadLength: unlimited
    (0x3C, 0x8F), // FifoThresh: not empty, level 15
    (0x3D, 0x10), // PacketConfig2: interpacket delay, no auto restart
    (0x6F, 0x20), // TestDagc
];

/// Drives the chip's register map through whatever [`Transport`] the
/// board provides: mode switching, FIFO housekeeping, the startup
/// sequence and the clear-channel probe.
pub(crate) struct RfmChip<T: Transport> {
    pub(crate) spi: T,
}

impl<T: Transport> RfmChip<T> {
    pub(crate) fn new(spi: T) -> Self {
        RfmChip { spi }
    }

    #[inline]
    pub(crate) fn read(&mut self, addr: u8) -> u8 {
        self.spi.read_register(addr)
    }

    #[inline]
    pub(crate) fn write(&mut self, addr: u8, value: u8) {
        self.spi.write_register(addr, value)
    }

    /// Probe the SPI link through the spare sync-value registers, then
    /// program the startup table, sync group, carrier frequency, and
    /// calibrate the RC oscillator.
    pub(crate) fn init(&mut self, group: u8, frf: u32) -> Result<(), Error> {
        self.write(regs::SYNC_VALUE7, 0xAA);
        self.write(regs::SYNC_VALUE8, 0x55);
        if self.read(regs::SYNC_VALUE7) != 0xAA || self.read(regs::SYNC_VALUE8) != 0x55 {
            debug!("radio probe failed");
            return Err(Error::RadioNotFound);
        }

        for &(reg, value) in CONFIG_REGS {
            self.write(reg, value);
        }
        self.write(regs::SYNC_GROUP, group);
        // With group 0 the group byte is not part of the sync word; it
        // arrives as the first data byte instead.
        let sync = if group == 0 {
            regs::SYNC_FOUR_BYTES
        } else {
            regs::SYNC_FIVE_BYTES
        };
        self.write(regs::SYNC_CONFIG, sync);
        self.write_frf(frf);
        self.set_mode(regs::MODE_STANDBY);

        self.write(regs::OSC1, regs::OSC1_RC_CAL_START);
        while self.read(regs::OSC1) & regs::OSC1_RC_CAL_DONE == 0 {}

        self.write(regs::LOW_BAT, regs::LOW_BAT_ON);
        self.write(regs::IRQ_FLAGS2, regs::IRQ2_FIFO_OVERRUN); // clear FIFO
        self.write(regs::DIO_MAPPING1, regs::DIO_RX_RSSI);
        debug!("radio up, group {}", group);
        Ok(())
    }

    pub(crate) fn write_frf(&mut self, frf: u32) {
        self.write(regs::FRF_MSB, (frf >> 16) as u8);
        self.write(regs::FRF_MSB + 1, (frf >> 8) as u8);
        self.write(regs::FRF_MSB + 2, frf as u8);
    }

    /// Switch the operating mode and wait for the chip to settle.
    pub(crate) fn set_mode(&mut self, mode: u8) {
        let current = self.read(regs::OPMODE);
        self.write(regs::OPMODE, (current & !regs::MODE_MASK) | mode);
        while self.read(regs::IRQ_FLAGS1) & regs::IRQ1_MODE_READY == 0 {}
    }

    /// Discard whatever the receive FIFO still holds.
    pub(crate) fn flush_fifo(&mut self) {
        while self.read(regs::IRQ_FLAGS2) & (regs::IRQ2_FIFO_NOT_EMPTY | regs::IRQ2_FIFO_OVERRUN)
            != 0
        {
            self.read(regs::FIFO);
        }
    }

    /// RSSI-threshold clear-channel probe. Masked, so the check cannot
    /// interleave with the receive interrupt.
    pub(crate) fn channel_clear(&mut self) -> bool {
        self.spi
            .with_irq_masked(|spi| spi.read_register(regs::IRQ_FLAGS1) & regs::IRQ1_RSSI == 0)
    }

    pub(crate) fn park(&mut self, mode: PowerMode) {
        self.spi.park(mode);
    }
}
