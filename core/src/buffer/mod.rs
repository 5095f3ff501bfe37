//! Bit-addressable buffer collaborator.
//!
//! The VM never looks at byte layout directly; every scalar instruction goes
//! through [`BitBuffer`]. Implementors only have to provide raw bit access,
//! the typed readers and writers are derived from it.

use anyhow::{Result, bail};

mod bitbuf;

pub use bitbuf::BitBuf;


pub trait BitBuffer {
    /// Whether `bits` more bits can be read from the cursor.
    fn fits(&self, bits: usize) -> bool;

    /// Current cursor, in bits.
    fn index(&self) -> usize;

    /// Total length, in bits.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads `width` (0..=64) bits as an unsigned integer, most significant bit first.
    fn read_bits(&mut self, width: u32) -> Result<u64>;

    fn write_bits(&mut self, width: u32, value: u64) -> Result<()>;

    fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_bits(1, value as u64)
    }

    fn read_uint(&mut self, width: u32) -> Result<u64> {
        check_width("uint", width)?;
        self.read_bits(width)
    }

    fn write_uint(&mut self, width: u32, value: u64) -> Result<()> {
        check_width("uint", width)?;
        if width < 64 && value >> width != 0 {
            bail!("value {value} does not fit in uint({width})");
        }
        self.write_bits(width, value)
    }

    fn read_int(&mut self, width: u32) -> Result<i64> {
        check_width("int", width)?;
        let raw = self.read_bits(width)?;
        Ok(sign_extend(raw, width))
    }

    fn write_int(&mut self, width: u32, value: i64) -> Result<()> {
        check_width("int", width)?;
        if width < 64 {
            let min = -(1i64 << (width - 1));
            let max = (1i64 << (width - 1)) - 1;
            if value < min || value > max {
                bail!("value {value} does not fit in int({width})");
            }
        }
        self.write_bits(width, (value as u64) & mask(width))
    }

    fn read_byte(&mut self) -> Result<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    fn write_byte(&mut self, value: u8) -> Result<()> {
        self.write_bits(8, value as u64)
    }

    fn read_float(&mut self, width: u32) -> Result<f64> {
        match width {
            32 => Ok(f32::from_bits(self.read_bits(32)? as u32) as f64),
            64 => Ok(f64::from_bits(self.read_bits(64)?)),
            other => bail!("float width must be 32 or 64, got {other}"),
        }
    }

    fn write_float(&mut self, width: u32, value: f64) -> Result<()> {
        match width {
            32 => self.write_bits(32, (value as f32).to_bits() as u64),
            64 => self.write_bits(64, value.to_bits()),
            other => bail!("float width must be 32 or 64, got {other}"),
        }
    }

    /// Signed fixed-point with `int` integer bits and `frac` fractional bits.
    fn read_fixed(&mut self, int: u32, frac: u32) -> Result<f64> {
        let raw = self.read_int(int + frac)?;
        Ok(raw as f64 / scale(frac))
    }

    fn write_fixed(&mut self, int: u32, frac: u32, value: f64) -> Result<()> {
        let raw = (value * scale(frac)).round();
        if !raw.is_finite() || raw < i64::MIN as f64 || raw > i64::MAX as f64 {
            bail!("value {value} does not fit in fixed({int}, {frac})");
        }
        self.write_int(int + frac, raw as i64)
    }

    fn read_ufixed(&mut self, int: u32, frac: u32) -> Result<f64> {
        let raw = self.read_uint(int + frac)?;
        Ok(raw as f64 / scale(frac))
    }

    fn write_ufixed(&mut self, int: u32, frac: u32, value: f64) -> Result<()> {
        let raw = (value * scale(frac)).round();
        if !raw.is_finite() || raw < 0.0 || raw > u64::MAX as f64 {
            bail!("value {value} does not fit in ufixed({int}, {frac})");
        }
        self.write_uint(int + frac, raw as u64)
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        if !n.checked_mul(8).is_some_and(|bits| self.fits(bits)) {
            bail!("end of buffer");
        }
        (0..n).map(|_| self.read_byte()).collect()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        bytes.iter().try_for_each(|b| self.write_byte(*b))
    }

    /// Byte run preceded by its length as an unsigned `prefix`-bit integer.
    fn read_prefixed(&mut self, prefix: u32) -> Result<Vec<u8>> {
        let n = self.read_uint(prefix)?;
        let n = usize::try_from(n).map_err(|_| anyhow::anyhow!("length prefix {n} is too large"))?;
        self.read_bytes(n)
    }

    fn write_prefixed(&mut self, prefix: u32, bytes: &[u8]) -> Result<()> {
        self.write_uint(prefix, bytes.len() as u64)?;
        self.write_bytes(bytes)
    }

    fn read_pad(&mut self, bits: usize) -> Result<()>;

    fn write_pad(&mut self, bits: usize) -> Result<()> {
        let mut remaining = bits;
        while remaining > 0 {
            let chunk = remaining.min(64);
            self.write_bits(chunk as u32, 0)?;
            remaining -= chunk;
        }
        Ok(())
    }

    /// Bits needed to move the cursor to the next multiple of `bits`.
    fn align_gap(&self, bits: usize) -> usize {
        if bits == 0 {
            return 0;
        }
        let rem = self.index() % bits;
        if rem == 0 { 0 } else { bits - rem }
    }

    fn read_align(&mut self, bits: usize) -> Result<()> {
        let gap = self.align_gap(bits);
        self.read_pad(gap)
    }

    fn write_align(&mut self, bits: usize) -> Result<()> {
        let gap = self.align_gap(bits);
        self.write_pad(gap)
    }
}

fn check_width(kind: &str, width: u32) -> Result<()> {
    if width == 0 || width > 64 {
        bail!("{kind} width must be in 1..=64, got {width}");
    }
    Ok(())
}

#[inline]
fn mask(width: u32) -> u64 {
    if width >= 64 { u64::MAX } else { (1u64 << width) - 1 }
}

#[inline]
fn sign_extend(raw: u64, width: u32) -> i64 {
    if width >= 64 {
        return raw as i64;
    }
    let shift = 64 - width;
    ((raw << shift) as i64) >> shift
}

#[inline]
fn scale(frac: u32) -> f64 {
    2f64.powi(frac as i32)
}
