//! The interrupt-side half of the driver: one byte moves between the
//! chip's FIFO and the frame buffers per invocation.
//!
//! On hardware, [`Radio::interrupt`] is called from the radio's interrupt
//! handler; on the host the same function is stepped in a loop, which is
//! how the integration tests simulate air time. All state lives in the
//! [`Radio`] value, so back-to-back calls are safe.

use crate::frame::{crc16_update, Header, CRC_INIT, GRP};
use crate::peripherals::{regs, Transport};
use crate::{Radio, State};
use log::warn;

impl<T: Transport> Radio<T> {
    /// Advance the transceiver by exactly one byte. Spurious invocations
    /// (no FIFO space, no data, idle machine) are harmless.
    pub fn interrupt(&mut self) {
        match self.state {
            State::Receiving => self.receive_step(),
            State::Idle => {}
            _ => self.transmit_step(),
        }
    }

    fn receive_step(&mut self) {
        let flags = self.chip.read(regs::IRQ_FLAGS2);
        if flags & regs::IRQ2_FIFO_OVERRUN != 0 {
            // Data was lost mid-frame; the CRC could never come out to
            // zero, so reset the FIFO, drop the partial frame and hunt
            // for the next sync word.
            self.counters.fifo_overruns += 1;
            warn!("fifo overrun, frame abandoned");
            self.chip.write(regs::IRQ_FLAGS2, regs::IRQ2_FIFO_OVERRUN);
            self.recv_start();
            return;
        }
        if flags & regs::IRQ2_FIFO_NOT_EMPTY == 0 || self.rx_complete() {
            return;
        }

        if self.fill == 0 {
            // The window for sampling signal quality is the front of the
            // frame, while bytes still stream into the FIFO.
            self.rssi = self.chip.read(regs::RSSI_VALUE);
            if self.group != 0 {
                // The group byte rode in the sync word; reconstruct it in
                // the buffer. Its CRC share was seeded in recv_start.
                self.rx.buf[GRP] = self.group;
                self.fill = 1;
            }
        }

        let byte = self.chip.read(regs::FIFO);
        self.rx.buf[usize::from(self.fill)] = byte;
        self.fill += 1;
        self.crc = crc16_update(self.crc, byte);

        if self.rx_complete() {
            // Leave the rest to the recv_done poll.
            self.chip.set_mode(regs::MODE_STANDBY);
        }
    }

    fn transmit_step(&mut self) {
        let flags = self.chip.read(regs::IRQ_FLAGS2);
        if self.state == State::Done {
            if flags & regs::IRQ2_PACKET_SENT != 0 {
                self.counters.tx_packets += 1;
                self.finish_tx();
            }
            return;
        }
        if flags & regs::IRQ2_PACKET_SENT != 0 {
            // The FIFO drained before the frame was fully fed: the chip
            // terminated the packet early. Nothing to salvage.
            self.counters.underruns += 1;
            warn!("fifo underrun, transmission truncated");
            self.finish_tx();
            return;
        }
        if flags & regs::IRQ2_FIFO_FULL != 0 {
            return;
        }

        let out = match self.state {
            State::SendingPayload { pos } => {
                // Header, length and payload leave in buffer order; the
                // CRC only covers these bytes plus the seeded group.
                let byte = self.tx.buf[1 + usize::from(pos)];
                self.crc = crc16_update(self.crc, byte);
                self.state = if pos + 1 == self.tx.len() + 2 {
                    State::SendingCrcLow
                } else {
                    State::SendingPayload { pos: pos + 1 }
                };
                byte
            }
            State::SendingCrcLow => {
                self.state = State::SendingCrcHigh;
                self.crc as u8
            }
            State::SendingCrcHigh => {
                self.state = State::SendingTrailer;
                (self.crc >> 8) as u8
            }
            State::SendingTrailer => {
                self.state = State::Done;
                0xAA
            }
            // Filtered out above.
            State::Idle | State::Receiving | State::Done => return,
        };
        self.chip.write(regs::FIFO, out);
    }

    fn finish_tx(&mut self) {
        self.chip.set_mode(regs::MODE_STANDBY);
        self.chip.write(regs::DIO_MAPPING1, regs::DIO_RX_RSSI);
        if self.group == 0 {
            // Transmission always carries the group in the sync word;
            // fall back to the short sync so reception hears every group.
            self.chip.write(regs::SYNC_CONFIG, regs::SYNC_FOUR_BYTES);
        }
        self.state = State::Idle;
    }

    /// Arm the receiver: reset the frame assembly state, seed the CRC
    /// with the group byte, flush stale FIFO content and switch the chip
    /// to receive.
    pub(crate) fn recv_start(&mut self) {
        if self.fixed_len != 0 {
            // Raw mode: no group or header on the air, a preset length.
            self.rx.set_group(0);
            self.rx.set_header(Header::from_bits(0));
            self.rx.set_len(self.fixed_len);
            self.fill = 3;
            self.crc = CRC_INIT;
        } else {
            self.rx.set_len(0);
            self.fill = 0;
            self.crc = if self.group != 0 {
                crc16_update(CRC_INIT, self.group)
            } else {
                CRC_INIT
            };
        }
        self.seq = None;
        self.state = State::Receiving;
        self.chip.flush_fifo();
        self.chip.set_mode(regs::MODE_RECEIVER);
    }
}
