//! Sync pulse generator: scanline counter and the blanking interrupts.
//! Timing comes straight from the SPG registers in `PvrRegs`.

use refsw::pvr_regs::{PvrRegs, SPG_STATUS_type};

use crate::asic::{Interrupt, InterruptSink};

pub const SH4_CLOCK: u64 = 200_000_000;
pub const PIXEL_CLOCK: u64 = 27_000_000;

#[derive(Clone, Debug, Default)]
pub struct Spg {
    cycle_acc: u64,
    scanline: u32,
    field: bool,
    in_vblank: bool,
}

impl Spg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[inline]
    pub fn scanline(&self) -> u32 {
        self.scanline
    }

    /// Cycles per scanline, halved in interlace mode
    pub fn line_cycles(regs: &PvrRegs) -> u64 {
        let h_total = regs.spg_load().hcount() as u64 + 1;
        let mut cycles = SH4_CLOCK * h_total / PIXEL_CLOCK;
        if regs.spg_control().interlace() {
            cycles /= 2;
        }
        cycles.max(1)
    }

    pub fn total_lines(regs: &PvrRegs) -> u32 {
        regs.spg_load().vcount() + 1
    }

    pub fn status(&self) -> u32 {
        let mut status = SPG_STATUS_type::from(0);
        status.set_scanline(self.scanline & 0x3FF);
        status.set_fieldnum(self.field);
        status.set_blank(self.in_vblank);
        status.set_vsync(self.in_vblank);
        status.full()
    }

    pub fn tick(&mut self, regs: &PvrRegs, cycles: u64, irq: &mut dyn InterruptSink) {
        let line_cycles = Self::line_cycles(regs);
        let total_lines = Self::total_lines(regs);
        let vblank = regs.spg_vblank();
        let vblank_int = regs.spg_vblank_int();
        let hblank_int = regs.spg_hblank_int();

        self.cycle_acc += cycles;
        while self.cycle_acc >= line_cycles {
            self.cycle_acc -= line_cycles;
            self.scanline = (self.scanline + 1) % total_lines;

            if self.scanline == vblank_int.vblank_in_interrupt_line_number() {
                irq.raise(Interrupt::VBlankIn);
            }
            if self.scanline == vblank_int.vblank_out_interrupt_line_number() {
                irq.raise(Interrupt::VBlankOut);
            }

            let comp = hblank_int.line_comp_val();
            let hblank = match hblank_int.hblank_int_mode() {
                0 => self.scanline == comp,
                1 => comp != 0 && self.scanline % comp == 0,
                _ => true,
            };
            if hblank {
                irq.raise(Interrupt::HBlankIn);
            }

            if self.scanline == vblank.vstart() {
                self.in_vblank = true;
            }
            if self.scanline == vblank.vbend() {
                self.in_vblank = false;
            }

            if self.scanline == 0 {
                self.field = regs.spg_control().interlace() && !self.field;
            }
        }
    }
}
