//! Word-oriented bit packing for the compressed pixel stream.
//!
//! Fields are packed MSB-first into 32-bit words, and each word is emitted
//! big-endian. Word width and byte order are part of the format contract for
//! version 1 streams; they do not depend on the host.

use std::io::{Read, Write};

use scd_core::{Result, ScdError};

/// Width of one packed word in bits.
pub const WORD_BITS: u32 = 32;

/// Longest comma code in the format (the end sentinel).
pub const MAX_COMMA_LEN: u32 = 27;

#[inline]
fn low_bits(value: u32, n: u32) -> u32 {
    if n >= WORD_BITS {
        value
    } else {
        value & ((1u32 << n) - 1)
    }
}

/// Packs bit fields and comma codes into big-endian 32-bit words.
pub struct BitWriter<W> {
    out: W,
    /// Pending bits, right-aligned.
    acc: u32,
    /// Number of valid bits in `acc`.
    filled: u32,
    words: u64,
}

impl<W: Write> BitWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            acc: 0,
            filled: 0,
            words: 0,
        }
    }

    /// Write the low `n` bits of `value`, most significant first. `n` may be
    /// anything from 0 to the full word width.
    #[inline]
    pub fn put_bits(&mut self, value: u32, n: u32) -> Result<()> {
        debug_assert!(n <= WORD_BITS);
        if n == 0 {
            return Ok(());
        }
        let value = low_bits(value, n);
        let room = WORD_BITS - self.filled;

        if n < room {
            self.acc = (self.acc << n) | value;
            self.filled += n;
            return Ok(());
        }

        // Field fills the word exactly or straddles into the next one.
        let spill = n - room;
        let head = value >> spill;
        let word = if room == WORD_BITS {
            head
        } else {
            (self.acc << room) | head
        };
        self.emit(word)?;
        self.acc = low_bits(value, spill);
        self.filled = spill;
        Ok(())
    }

    /// Write a comma code of `len` bits: `len - 1` zeros then a one.
    #[inline]
    pub fn put_comma(&mut self, len: u32) -> Result<()> {
        debug_assert!((1..=MAX_COMMA_LEN).contains(&len));
        self.put_bits(1, len)
    }

    fn emit(&mut self, word: u32) -> Result<()> {
        self.out.write_all(&word.to_be_bytes())?;
        self.words += 1;
        Ok(())
    }

    /// Words emitted so far.
    pub fn words_written(&self) -> u64 {
        self.words
    }

    /// Emit any partial word (left-justified, zero-filled) and flush the
    /// underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        if self.filled > 0 {
            let word = self.acc << (WORD_BITS - self.filled);
            self.emit(word)?;
            self.acc = 0;
            self.filled = 0;
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// [`flush`](Self::flush) and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.out)
    }
}

/// Reads bit fields and comma codes back out of big-endian 32-bit words.
pub struct BitReader<R> {
    input: R,
    /// Current word; only the low `avail` bits are unread.
    acc: u32,
    avail: u32,
    words: u64,
}

impl<R: Read> BitReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            acc: 0,
            avail: 0,
            words: 0,
        }
    }

    fn refill(&mut self) -> Result<()> {
        let mut buf = [0u8; 4];
        self.input.read_exact(&mut buf)?;
        self.acc = u32::from_be_bytes(buf);
        self.avail = WORD_BITS;
        self.words += 1;
        Ok(())
    }

    /// Read an `n`-bit field (0 to the full word width).
    #[inline]
    pub fn get_bits(&mut self, n: u32) -> Result<u32> {
        debug_assert!(n <= WORD_BITS);
        if n == 0 {
            return Ok(0);
        }
        if n <= self.avail {
            self.avail -= n;
            return Ok(low_bits(self.acc >> self.avail, n));
        }

        // Take what is left of this word, then the rest from the next.
        let need = n - self.avail;
        let head = low_bits(self.acc, self.avail) as u64;
        self.refill()?;
        self.avail = WORD_BITS - need;
        let tail = (self.acc as u64) >> self.avail;
        Ok(((head << need) | tail) as u32)
    }

    /// Read one comma code and return its length (zeros + 1).
    ///
    /// Fails with a format error if no terminating one bit appears within
    /// [`MAX_COMMA_LEN`] bits.
    #[inline]
    pub fn get_comma(&mut self) -> Result<u32> {
        let mut zeros = 0u32;
        loop {
            if self.avail == 0 {
                self.refill()?;
            }
            // Unread bits moved to the top of the word.
            let window = self.acc << (WORD_BITS - self.avail);
            let lead = window.leading_zeros();
            if lead < self.avail {
                self.avail -= lead + 1;
                zeros += lead;
                break;
            }
            zeros += self.avail;
            self.avail = 0;
            if zeros >= MAX_COMMA_LEN {
                break;
            }
        }
        if zeros >= MAX_COMMA_LEN {
            return Err(ScdError::format(format!(
                "comma code longer than {MAX_COMMA_LEN} bits"
            )));
        }
        Ok(zeros + 1)
    }

    /// Words consumed so far.
    pub fn words_read(&self) -> u64 {
        self.words
    }
}
