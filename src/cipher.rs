//! XXTEA payload encryption with an embedded send sequence number.
//!
//! The transform works on 32-bit words, so the payload is padded with
//! 1..=4 trailing bytes before encryption. Those bytes carry a 6..30-bit
//! sequence number, incremented for every encrypted send; the top two
//! bits of the final byte record how many sequence bytes were appended.
//! The receiver strips them again after decryption and restores the
//! original payload length, exposing the sequence to the caller. Replay
//! checking against previously seen sequence values is deliberately left
//! to the caller.

use crate::frame::FrameBuf;
use crate::MAX_PAYLOAD;

const DELTA: u32 = 0x9E37_79B9;
const ROUNDS: u32 = 6;

/// Key schedule plus the strictly increasing send sequence.
pub(crate) struct CipherContext {
    key: [u32; 4],
    send_seq: u32,
}

impl CipherContext {
    pub(crate) fn new(key: &[u8; 16]) -> Self {
        let mut k = [0u32; 4];
        for (word, chunk) in k.iter_mut().zip(key.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        CipherContext { key: k, send_seq: 0 }
    }

    /// Pad the payload up to a multiple of four bytes with the next
    /// sequence number, then transform it in place and grow the frame's
    /// declared length. Payloads whose padded form is a single word are
    /// too short to mix and stay in the clear.
    pub(crate) fn encrypt(&mut self, frame: &mut FrameBuf) {
        self.send_seq = self.send_seq.wrapping_add(1);
        let seq = self.send_seq.to_le_bytes();

        let mut len = usize::from(frame.len());
        let pad = 3 - (len & 3);
        let data = frame.data_mut();
        data[len..len + pad].copy_from_slice(&seq[..pad]);
        len += pad;
        data[len] = (seq[pad] & 0x3F) | ((pad as u8) << 6);
        len += 1;

        let words = len / 4;
        if words > 1 {
            with_words(&mut data[..len], |v| encode(v, &self.key));
        }
        frame.set_len(len as u8);
    }

    /// Inverse transform; only called once the CRC checked out. Returns
    /// the unpacked sequence number and shrinks the frame back to its
    /// original length. `None` when the payload cannot have been
    /// produced by [`encrypt`](CipherContext::encrypt).
    pub(crate) fn decrypt(&self, frame: &mut FrameBuf) -> Option<u32> {
        let mut len = usize::from(frame.len());
        if len < 4 || len > MAX_PAYLOAD {
            return None;
        }
        let data = frame.data_mut();
        let words = len / 4;
        if words > 1 {
            with_words(&mut data[..words * 4], |v| decode(v, &self.key));
        }

        len -= 1;
        let pad = usize::from(data[len] >> 6);
        let mut seq = u32::from(data[len] & 0x3F);
        if pad > len {
            return None;
        }
        for _ in 0..pad {
            len -= 1;
            seq = (seq << 8) | u32::from(data[len]);
        }
        frame.set_len(len as u8);
        Some(seq)
    }
}

/// Run `f` over the byte slice viewed as little-endian 32-bit words.
fn with_words(bytes: &mut [u8], f: impl FnOnce(&mut [u32])) {
    let mut v = [0u32; MAX_PAYLOAD / 4];
    let words = bytes.len() / 4;
    for (word, chunk) in v.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    f(&mut v[..words]);
    for (chunk, word) in bytes.chunks_exact_mut(4).zip(v.iter()) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
}

fn mx(sum: u32, y: u32, z: u32, p: usize, e: usize, key: &[u32; 4]) -> u32 {
    (((z >> 5) ^ (y << 2)).wrapping_add((y >> 3) ^ (z << 4)))
        ^ ((sum ^ y).wrapping_add(key[(p & 3) ^ e] ^ z))
}

fn encode(v: &mut [u32], key: &[u32; 4]) {
    let n = v.len();
    let mut sum: u32 = 0;
    let mut z = v[n - 1];
    for _ in 0..ROUNDS {
        sum = sum.wrapping_add(DELTA);
        let e = ((sum >> 2) & 3) as usize;
        for p in 0..n - 1 {
            let y = v[p + 1];
            v[p] = v[p].wrapping_add(mx(sum, y, z, p, e, key));
            z = v[p];
        }
        let y = v[0];
        v[n - 1] = v[n - 1].wrapping_add(mx(sum, y, z, n - 1, e, key));
        z = v[n - 1];
    }
}

fn decode(v: &mut [u32], key: &[u32; 4]) {
    let n = v.len();
    let mut sum = DELTA.wrapping_mul(ROUNDS);
    let mut y = v[0];
    while sum != 0 {
        let e = ((sum >> 2) & 3) as usize;
        for p in (1..n).rev() {
            let z = v[p - 1];
            v[p] = v[p].wrapping_sub(mx(sum, y, z, p, e, key));
            y = v[p];
        }
        let z = v[n - 1];
        v[0] = v[0].wrapping_sub(mx(sum, y, z, 0, e, key));
        y = v[0];
        sum = sum.wrapping_sub(DELTA);
    }
}
