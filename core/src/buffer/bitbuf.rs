use anyhow::{Result, bail};

use super::BitBuffer;

/// Growable in-memory bit buffer, most significant bit first.
///
/// Writes overwrite at the cursor and extend the buffer when they run past
/// its end; reads fail with `end of buffer` once the cursor reaches `len`.
#[derive(Debug, Clone, Default)]
pub struct BitBuf {
    data: Vec<u8>,
    len: usize,
    pos: usize,
}

impl BitBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
            len: bytes.len() * 8,
            pos: 0,
        }
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes),
            len: 0,
            pos: 0,
        }
    }

    pub fn seek(&mut self, bit: usize) -> Result<()> {
        if bit > self.len {
            bail!("seek to bit {bit} past end of buffer ({} bits)", self.len);
        }
        self.pos = bit;
        Ok(())
    }

    /// Bytes written so far; a trailing partial byte is zero-filled.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len.div_ceil(8)]
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.data.truncate(self.len.div_ceil(8));
        self.data
    }
}

impl BitBuffer for BitBuf {
    fn fits(&self, bits: usize) -> bool {
        self.pos.checked_add(bits).is_some_and(|end| end <= self.len)
    }

    fn index(&self) -> usize {
        self.pos
    }

    fn len(&self) -> usize {
        self.len
    }

    fn read_bits(&mut self, width: u32) -> Result<u64> {
        if width > 64 {
            bail!("cannot read {width} bits at once");
        }
        if !self.fits(width as usize) {
            bail!("end of buffer");
        }
        let mut out = 0u64;
        let mut remaining = width;
        while remaining > 0 {
            let byte = self.data[self.pos / 8];
            let avail = 8 - (self.pos % 8) as u32;
            let take = avail.min(remaining);
            let chunk = (byte >> (avail - take)) & (((1u16 << take) - 1) as u8);
            out = (out << take) | chunk as u64;
            self.pos += take as usize;
            remaining -= take;
        }
        Ok(out)
    }

    fn write_bits(&mut self, width: u32, value: u64) -> Result<()> {
        if width > 64 {
            bail!("cannot write {width} bits at once");
        }
        let needed = (self.pos + width as usize).div_ceil(8);
        if self.data.len() < needed {
            self.data.resize(needed, 0);
        }
        let mut remaining = width;
        while remaining > 0 {
            let avail = 8 - (self.pos % 8) as u32;
            let take = avail.min(remaining);
            let shift = avail - take;
            let chunk = ((value >> (remaining - take)) & ((1u64 << take) - 1)) as u8;
            let mask = (((1u16 << take) - 1) as u8) << shift;
            let byte = &mut self.data[self.pos / 8];
            *byte = (*byte & !mask) | (chunk << shift);
            self.pos += take as usize;
            remaining -= take;
        }
        self.len = self.len.max(self.pos);
        Ok(())
    }

    fn read_pad(&mut self, bits: usize) -> Result<()> {
        if !self.fits(bits) {
            bail!("end of buffer");
        }
        self.pos += bits;
        Ok(())
    }
}
