//! PVR-DMA: 32 byte block copies between system memory and VRAM.

use bitfield::bitfield;
use refsw::Vram;

use crate::error::PvrError;

pub const SB_PDSTAP: u32 = 0x005F_7C00;
pub const SB_PDSTAR: u32 = 0x005F_7C04;
pub const SB_PDLEN: u32 = 0x005F_7C08;
pub const SB_PDDIR: u32 = 0x005F_7C0C;
pub const SB_PDTSEL: u32 = 0x005F_7C10;
pub const SB_PDEN: u32 = 0x005F_7C14;
pub const SB_PDST: u32 = 0x005F_7C18;
pub const SB_PDAPRO: u32 = 0x005F_7C80;

pub const DMA_BLOCK: u32 = 32;

/// Security code the upper half of SB_PDAPRO must carry for a write to stick
const PDAPRO_CODE: u32 = 0x6702;

bitfield! {
    /// SB_PDAPRO: system RAM window a transfer must stay inside, in 1MB units
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct PdaproReg(u32);
    impl Debug;

    pub bottom, set_bottom: 6, 0;
    pub top, set_top: 14, 8;
    pub code, _: 31, 16;
}

impl PdaproReg {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.bottom() == 0 && self.top() == 0
    }
}

/// Host memory on the other end of a PVR-DMA
pub trait SystemMemory {
    fn read_block(&mut self, addr: u32, buf: &mut [u8]);
    fn write_block(&mut self, addr: u32, data: &[u8]);
}

/// System RAM as a flat buffer, wrapping on its length
impl SystemMemory for Vec<u8> {
    fn read_block(&mut self, addr: u32, buf: &mut [u8]) {
        let len = self.len();
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self[(addr as usize + i) % len];
        }
    }

    fn write_block(&mut self, addr: u32, data: &[u8]) {
        let len = self.len();
        for (i, b) in data.iter().enumerate() {
            self[(addr as usize + i) % len] = *b;
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DmaDirection {
    ToVram,
    FromVram,
}

/// A validated transfer, ready to copy
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DmaTransfer {
    pub vram_addr: u32,
    pub system_addr: u32,
    pub len: u32,
    pub direction: DmaDirection,
}

impl DmaTransfer {
    #[inline]
    pub fn blocks(&self) -> u32 {
        self.len / DMA_BLOCK
    }

    /// Runs the whole copy. System to VRAM data is handed to `sink` one block at a time.
    pub fn run(&self, vram: &Vram, mem: &mut dyn SystemMemory, mut sink: impl FnMut(u32, &[u8])) {
        let mut block = [0u8; DMA_BLOCK as usize];
        for i in 0..self.blocks() {
            let vram_addr = self.vram_addr.wrapping_add(i * DMA_BLOCK);
            let system_addr = self.system_addr.wrapping_add(i * DMA_BLOCK);
            match self.direction {
                DmaDirection::ToVram => {
                    mem.read_block(system_addr, &mut block);
                    sink(vram_addr, &block);
                }
                DmaDirection::FromVram => {
                    vram.read_linear(vram_addr, &mut block);
                    mem.write_block(system_addr, &block);
                }
            }
        }
    }
}

/// The SB_PD* register block
#[derive(Clone, Debug, Default)]
pub struct PvrDma {
    pub pdstap: u32,
    pub pdstar: u32,
    pub pdlen: u32,
    pub pddir: u32,
    pub pdtsel: u32,
    pub pden: u32,
    pub pdst: u32,
    pub pdapro: PdaproReg,
}

impl PvrDma {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn read(&self, addr: u32) -> u32 {
        match addr {
            SB_PDSTAP => self.pdstap,
            SB_PDSTAR => self.pdstar,
            SB_PDLEN => self.pdlen,
            SB_PDDIR => self.pddir,
            SB_PDTSEL => self.pdtsel,
            SB_PDEN => self.pden,
            SB_PDST => self.pdst,
            SB_PDAPRO => self.pdapro.0,
            _ => 0,
        }
    }

    /// Returns true when the write requests a transfer start
    pub fn write(&mut self, addr: u32, value: u32) -> bool {
        match addr {
            SB_PDSTAP => self.pdstap = value & 0x1FFF_FFE0,
            SB_PDSTAR => self.pdstar = value & 0x1FFF_FFE0,
            SB_PDLEN => self.pdlen = value & 0x00FF_FFFF,
            SB_PDDIR => self.pddir = value & 1,
            SB_PDTSEL => self.pdtsel = value & 1,
            SB_PDEN => self.pden = value & 1,
            SB_PDST => {
                if value & 1 != 0 && self.pdst == 0 {
                    return true;
                }
            }
            SB_PDAPRO => {
                let reg = PdaproReg(value);
                if reg.code() == PDAPRO_CODE {
                    self.pdapro = PdaproReg(value & 0x7F7F);
                } else {
                    log::debug!("pvr-dma: SB_PDAPRO write without security code ({:08X})", value);
                }
            }
            _ => log::debug!("pvr-dma: write to unknown register {:08X}", addr),
        }
        false
    }

    /// Checks the registers and builds the transfer they describe
    pub fn prepare(&self) -> Result<DmaTransfer, PvrError> {
        if self.pdlen == 0 || self.pdlen % DMA_BLOCK != 0 {
            return Err(PvrError::DmaLength(self.pdlen));
        }

        // PVR side: the 64 bit texture area or its mirror
        let area = self.pdstap & 0x1F00_0000;
        if area != 0x0400_0000 && area != 0x0600_0000 {
            return Err(PvrError::DmaAddress(self.pdstap));
        }
        let vram_addr = self.pdstap & refsw::pvr_mem::VRAM_MASK;

        // System side: main RAM only
        if self.pdstar & 0x1C00_0000 != 0x0C00_0000 {
            return Err(PvrError::DmaAddress(self.pdstar));
        }

        // Protection window, in 1MB units of main RAM
        if !self.pdapro.is_open() {
            let first = (self.pdstar & 0x07FF_FFFF) >> 20;
            let last = ((self.pdstar & 0x07FF_FFFF) + self.pdlen - 1) >> 20;
            if first < self.pdapro.bottom() || last > self.pdapro.top() {
                return Err(PvrError::DmaProtected(self.pdstar));
            }
        }

        Ok(DmaTransfer {
            vram_addr,
            system_addr: self.pdstar,
            len: self.pdlen,
            direction: if self.pddir == 0 { DmaDirection::ToVram } else { DmaDirection::FromVram },
        })
    }

    pub fn begin(&mut self) {
        self.pdst = 1;
    }

    /// Register state after the last block has moved
    pub fn complete(&mut self, transfer: &DmaTransfer) {
        self.pdstap = self.pdstap.wrapping_add(transfer.len);
        self.pdstar = self.pdstar.wrapping_add(transfer.len);
        self.pdlen = 0;
        self.pdst = 0;
    }
}
