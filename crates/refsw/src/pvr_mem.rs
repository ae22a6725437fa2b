/*
    This file is part of libswirl
*/
// #include "license/bsd"

//! Video memory with its two access paths.
//!
//! Textures and DMA use the linear (64 bit) path. Everything the TA and the
//! core exchange (parameters, object lists, region array, frame buffer) goes
//! through the 32 bit path, which interleaves the two 4MB banks every word.

pub const VRAM_SIZE: usize = 8 * 1024 * 1024;
pub const VRAM_MASK: u32 = (VRAM_SIZE - 1) as u32;
pub const VRAM_BANK_BIT: u32 = 0x400000;

#[inline(always)]
pub const fn pvr_map32(offset32: u32) -> u32 {
    // 64b wide bus is achieved by interleaving the banks every 32 bits
    let static_bits = (VRAM_MASK - (VRAM_BANK_BIT * 2 - 1)) | 3;
    let offset_bits = (VRAM_BANK_BIT - 1) & !3;

    let bank = (offset32 & VRAM_BANK_BIT) / VRAM_BANK_BIT;

    let mut rv = offset32 & static_bits;
    rv |= (offset32 & offset_bits) * 2;
    rv |= bank * 4;

    rv & VRAM_MASK
}

pub struct Vram {
    data: Box<[u8]>,
}

impl Default for Vram {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Vram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vram").field("size", &self.data.len()).finish()
    }
}

impl Vram {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; VRAM_SIZE].into_boxed_slice(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    // 32 bit path

    #[inline(always)]
    pub fn read8_32(&self, addr: u32) -> u8 {
        self.data[pvr_map32(addr & VRAM_MASK) as usize]
    }

    #[inline(always)]
    pub fn read16_32(&self, addr: u32) -> u16 {
        let a = pvr_map32(addr & VRAM_MASK & !1) as usize;
        u16::from_le_bytes([self.data[a], self.data[a + 1]])
    }

    #[inline(always)]
    pub fn read32(&self, addr: u32) -> u32 {
        let a = pvr_map32(addr & VRAM_MASK & !3) as usize;
        u32::from_le_bytes([self.data[a], self.data[a + 1], self.data[a + 2], self.data[a + 3]])
    }

    #[inline(always)]
    pub fn read_f32(&self, addr: u32) -> f32 {
        f32::from_bits(self.read32(addr))
    }

    #[inline(always)]
    pub fn write8_32(&mut self, addr: u32, data: u8) {
        self.data[pvr_map32(addr & VRAM_MASK) as usize] = data;
    }

    #[inline(always)]
    pub fn write16_32(&mut self, addr: u32, data: u16) {
        let a = pvr_map32(addr & VRAM_MASK & !1) as usize;
        self.data[a..a + 2].copy_from_slice(&data.to_le_bytes());
    }

    #[inline(always)]
    pub fn write32(&mut self, addr: u32, data: u32) {
        let a = pvr_map32(addr & VRAM_MASK & !3) as usize;
        self.data[a..a + 4].copy_from_slice(&data.to_le_bytes());
    }

    #[inline(always)]
    pub fn write_f32(&mut self, addr: u32, data: f32) {
        self.write32(addr, data.to_bits());
    }

    // 64 bit (linear) path

    #[inline(always)]
    pub fn read8_64(&self, addr: u32) -> u8 {
        self.data[(addr & VRAM_MASK) as usize]
    }

    #[inline(always)]
    pub fn read64(&self, addr: u32) -> u64 {
        let a = (addr & (VRAM_MASK - 7)) as usize;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[a..a + 8]);
        u64::from_le_bytes(bytes)
    }

    #[inline(always)]
    pub fn write8_64(&mut self, addr: u32, data: u8) {
        self.data[(addr & VRAM_MASK) as usize] = data;
    }

    /// Copies `data` in at `addr`, wrapping at the end of VRAM.
    pub fn write_linear(&mut self, addr: u32, data: &[u8]) {
        let base = (addr & VRAM_MASK) as usize;
        let first_len = (VRAM_SIZE - base).min(data.len());
        self.data[base..base + first_len].copy_from_slice(&data[..first_len]);
        if first_len < data.len() {
            let remaining = data.len() - first_len;
            self.data[..remaining].copy_from_slice(&data[first_len..]);
        }
    }

    pub fn read_linear(&self, addr: u32, buf: &mut [u8]) {
        let base = (addr & VRAM_MASK) as usize;
        let first_len = (VRAM_SIZE - base).min(buf.len());
        buf[..first_len].copy_from_slice(&self.data[base..base + first_len]);
        if first_len < buf.len() {
            let remaining = buf.len() - first_len;
            buf[first_len..].copy_from_slice(&self.data[..remaining]);
        }
    }

    pub fn write_interleaved(&mut self, addr: u32, data: &[u8]) {
        for (i, b) in data.iter().enumerate() {
            self.write8_32(addr.wrapping_add(i as u32), *b);
        }
    }

    pub fn read_interleaved(&self, addr: u32, buf: &mut [u8]) {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.read8_32(addr.wrapping_add(i as u32));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map32_interleaves_banks() {
        assert_eq!(pvr_map32(0), 0);
        assert_eq!(pvr_map32(4), 8);
        assert_eq!(pvr_map32(VRAM_BANK_BIT), 4);
        assert_eq!(pvr_map32(VRAM_BANK_BIT + 4), 12);
        assert_eq!(pvr_map32(2), 2);
    }

    #[test]
    fn test_paths_agree_on_bank_layout() {
        let mut vram = Vram::new();
        vram.write32(0, 0x1122_3344);
        vram.write32(VRAM_BANK_BIT, 0x5566_7788);
        assert_eq!(vram.read64(0), 0x5566_7788_1122_3344);
        assert_eq!(vram.read32(0), 0x1122_3344);
        assert_eq!(vram.read16_32(2), 0x1122);
    }

    #[test]
    fn test_linear_write_wraps() {
        let mut vram = Vram::new();
        vram.write_linear(VRAM_MASK - 1, &[1, 2, 3, 4]);
        assert_eq!(vram.read8_64(VRAM_MASK - 1), 1);
        assert_eq!(vram.read8_64(VRAM_MASK), 2);
        assert_eq!(vram.read8_64(0), 3);
        assert_eq!(vram.read8_64(1), 4);
    }
}
