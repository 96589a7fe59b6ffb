//! EasyTx: a bounded-retry, change-detecting acknowledged send layer on
//! top of the raw driver facade.
//!
//! One payload is outstanding at a time. `send` buffers it (suppressing
//! byte-identical resubmits of already-acknowledged data), `poll` keeps
//! the machinery going: it transmits with the ACK-request bit set, waits
//! for the matching acknowledgment and retries on a fixed schedule until
//! the budget of 8 sends runs out. Exhaustion is not an error; the layer
//! simply settles back to `Idle`.

use crate::frame::Header;
use crate::peripherals::{Clock, Transport};
use crate::{Band, Radio, MAX_PAYLOAD, RETRIES, RETRY_DELAY_MS};
use heapless::Vec;
use log::{debug, trace};

/// What `poll` found for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EasyPoll {
    /// The acknowledgment carried payload bytes; read them through the
    /// radio's receive accessors.
    NewData,
    /// Nothing pending: the last send was acknowledged, or the retry
    /// budget ran out.
    Idle,
    /// Still sending or waiting for an acknowledgment.
    InFlight,
}

/// What `send` decided to do with the submitted bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EasySend {
    /// A transmission (with retries) has been scheduled.
    Scheduled,
    /// Same bytes as the last acknowledged payload; nothing to do.
    Unchanged,
}

/// The retry session. One per radio; create it once after the radio is
/// up and keep calling [`poll`](EasyTx::poll) frequently, once per
/// millisecond or so in normal use.
pub struct EasyTx<C: Clock> {
    clock: C,
    interval_s: u8,
    buf: Vec<u8, MAX_PAYLOAD>,
    pending: u8,
    acked: bool,
    next_retry_at: u64,
    next_new_at: u64,
}

impl<C: Clock> EasyTx<C> {
    /// `interval_s` is the minimum number of seconds between *new* data
    /// packets. With 0, packets go out as fast as the band allows: a
    /// 1% duty-cycle estimate on 868 MHz, 100 ms elsewhere.
    pub fn new(clock: C, interval_s: u8) -> Self {
        EasyTx {
            clock,
            interval_s,
            buf: Vec::new(),
            pending: 0,
            acked: true,
            next_retry_at: 0,
            next_new_at: 0,
        }
    }

    /// Submit payload bytes for acknowledged transmission. The bytes are
    /// copied; the actual send happens in [`poll`](EasyTx::poll).
    ///
    /// Resubmitting the bytes that were already sent and acknowledged is
    /// a no-op. An empty `data` forces a resend of the buffered payload
    /// even if unchanged, as a sign of life or to repopulate a rebooted
    /// peer.
    ///
    /// # Panics
    ///
    /// Panics when `data` exceeds [`MAX_PAYLOAD`] bytes.
    pub fn send(&mut self, data: &[u8]) -> EasySend {
        if !data.is_empty() {
            assert!(data.len() <= MAX_PAYLOAD);
            if self.acked && data == &self.buf[..] {
                return EasySend::Unchanged;
            }
            self.buf.clear();
            // Length checked above.
            let _ = self.buf.extend_from_slice(data);
        }
        self.pending = RETRIES;
        EasySend::Scheduled
    }

    /// Keep the retry machinery going. Call frequently; failure to poll
    /// is relatively harmless but loses acknowledgments.
    pub fn poll<T: Transport>(&mut self, radio: &mut Radio<T>) -> EasyPoll {
        if radio.recv_done() {
            let ack = Header::from_bits(Header::CTL | Header::DST | radio.node_id());
            if radio.header() == ack {
                self.pending = 0;
                self.acked = true;
                trace!("easy: acknowledged");
                if radio.length() > 0 {
                    return EasyPoll::NewData;
                }
            }
        }

        if self.pending > 0 {
            // New data sends respect the configured interval; retries go
            // out on the fixed schedule.
            let fresh = self.pending == RETRIES;
            let now = self.clock.now_ms();
            let due = if fresh {
                self.next_new_at
            } else {
                self.next_retry_at
            };
            if now >= due && radio.can_send() {
                self.acked = false;
                self.next_retry_at = now + RETRY_DELAY_MS;
                if fresh {
                    self.next_new_at = now + self.new_data_spacing(radio.band());
                }
                radio.send_start(Header::broadcast().with_ack(), &self.buf);
                self.pending -= 1;
                debug!("easy: sent, {} tries left", self.pending);
            }
        }

        if self.pending > 0 {
            EasyPoll::InFlight
        } else {
            EasyPoll::Idle
        }
    }

    fn new_data_spacing(&self, band: Band) -> u64 {
        if self.interval_s > 0 {
            u64::from(self.interval_s) * 1000
        } else if band == Band::Mhz868 {
            // Keep under the band's 1% duty-cycle limit: scale the gap
            // with the airtime of the packet.
            13 * (self.buf.len() as u64 + 10)
        } else {
            100
        }
    }
}
