//! The PVR2 block as the host sees it: a register window, the TA and YUV
//! FIFOs, PVR-DMA and a `tick` that delivers timed events.
//!
//! Renders run to completion inside the `STARTRENDER` write. The render-done
//! interrupts are scheduled for later, and until they fire VRAM belongs to the
//! render: host writes are deferred or rejected per `PvrConfig`.

use refsw::pvr_mem::VRAM_SIZE;
use refsw::pvr_regs::{
    SOFTRESET_type, PvrRegs, READ_ONLY_REGS, SOFTRESET_ADDR, SPG_STATUS_ADDR, STARTRENDER_ADDR,
    TA_LIST_CONT_ADDR, TA_LIST_INIT_ADDR, TA_YUV_TEX_BASE_ADDR,
};
use refsw::{RenderCore, RenderStats, Vram};

use crate::asic::{Asic, Interrupt, InterruptSink};
use crate::config::{BusyRenderPolicy, PvrConfig, VramWritePolicy};
use crate::dma::{DmaTransfer, PvrDma, SystemMemory};
use crate::error::PvrError;
use crate::framebuffer::{self, FrameImage};
use crate::scheduler::{Event, Scheduler};
use crate::spg::Spg;
use crate::ta::{TaBus, TileAccelerator};
use crate::yuv::YuvConverter;

/// Bus address of register offset 0
pub const PVR_REG_BASE: u32 = 0x005F_8000;

pub struct Pvr<S: InterruptSink = Asic> {
    config: PvrConfig,
    regs: PvrRegs,
    vram: Vram,
    ta: TileAccelerator,
    core: RenderCore,
    spg: Spg,
    yuv: YuvConverter,
    dma: PvrDma,
    dma_transfer: Option<DmaTransfer>,
    scheduler: Scheduler,
    irq: S,

    rendering: bool,
    queued_render: bool,
    last_render: RenderStats,
    deferred_writes: Vec<(u32, Vec<u8>)>,
    fifo_partial: Vec<u8>,
}

impl Pvr<Asic> {
    pub fn new(config: PvrConfig) -> Self {
        Self::with_sink(config, Asic::new())
    }
}

impl<S: InterruptSink> Pvr<S> {
    pub fn with_sink(config: PvrConfig, irq: S) -> Self {
        Self {
            config,
            regs: PvrRegs::new(),
            vram: Vram::new(),
            ta: TileAccelerator::new(),
            core: RenderCore::new(),
            spg: Spg::new(),
            yuv: YuvConverter::new(),
            dma: PvrDma::new(),
            dma_transfer: None,
            scheduler: Scheduler::new(),
            irq,
            rendering: false,
            queued_render: false,
            last_render: RenderStats::default(),
            deferred_writes: Vec::new(),
            fifo_partial: Vec::new(),
        }
    }

    /// Power-on state. VRAM contents survive, like on hardware.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.ta.reset();
        self.core.reset();
        self.spg.reset();
        self.yuv.reset(&mut self.regs);
        self.dma.reset();
        self.dma_transfer = None;
        self.scheduler.clear();
        self.rendering = false;
        self.queued_render = false;
        self.deferred_writes.clear();
        self.fifo_partial.clear();
    }

    pub fn config(&self) -> &PvrConfig {
        &self.config
    }

    pub fn regs(&self) -> &PvrRegs {
        &self.regs
    }

    pub fn vram(&self) -> &Vram {
        &self.vram
    }

    /// Direct VRAM access, bypassing the render ownership rules
    pub fn vram_mut(&mut self) -> &mut Vram {
        &mut self.vram
    }

    pub fn irq(&self) -> &S {
        &self.irq
    }

    pub fn irq_mut(&mut self) -> &mut S {
        &mut self.irq
    }

    pub fn ta(&self) -> &TileAccelerator {
        &self.ta
    }

    #[inline]
    pub fn is_rendering(&self) -> bool {
        self.rendering
    }

    pub fn last_render(&self) -> RenderStats {
        self.last_render
    }

    pub fn elapsed(&self) -> u64 {
        self.scheduler.elapsed()
    }

    pub fn read_reg(&self, offset: u32) -> u32 {
        match offset & !3 {
            SPG_STATUS_ADDR => self.spg.status(),
            addr => self.regs.read(addr),
        }
    }

    pub fn write_reg(&mut self, offset: u32, value: u32) {
        let addr = offset & !3;
        match addr {
            a if READ_ONLY_REGS.contains(&a) => {
                log::debug!("pvr: write to read-only register {:04X} ignored", a);
            }
            SOFTRESET_ADDR => {
                self.regs.write(addr, value);
                self.soft_reset(SOFTRESET_type::from(value));
            }
            STARTRENDER_ADDR => self.start_render(),
            TA_LIST_INIT_ADDR => {
                if value >> 31 != 0 {
                    let mut bus = TaBus { vram: &mut self.vram, regs: &mut self.regs, irq: &mut self.irq };
                    self.ta.list_init(&mut bus);
                }
            }
            TA_LIST_CONT_ADDR => {
                if value >> 31 != 0 {
                    self.ta.list_continue();
                }
            }
            TA_YUV_TEX_BASE_ADDR => {
                self.regs.write(addr, value);
                self.yuv.reset(&mut self.regs);
            }
            _ => self.regs.write(addr, value),
        }
    }

    fn soft_reset(&mut self, reset: SOFTRESET_type) {
        if reset.ta_reset() {
            log::debug!("pvr: TA soft reset");
            self.ta.reset();
            self.fifo_partial.clear();
        }
        if reset.pipeline_reset() {
            if self.rendering {
                log::debug!("pvr: render aborted by soft reset");
            }
            self.scheduler.cancel(Event::RenderDone);
            self.core.reset();
            self.rendering = false;
            self.queued_render = false;
            self.apply_deferred_writes();
        }
    }

    fn start_render(&mut self) {
        if self.rendering {
            match self.config.busy_render_policy {
                BusyRenderPolicy::Ignore => log::warn!("pvr: render start while busy ignored"),
                BusyRenderPolicy::Queue => {
                    log::debug!("pvr: render start queued");
                    self.queued_render = true;
                }
            }
            return;
        }
        self.run_render();
    }

    fn run_render(&mut self) {
        let stats = self.core.render(&mut self.vram, &self.regs, self.config.max_regions);
        self.last_render = stats;
        self.rendering = true;
        self.scheduler.schedule(self.config.render_cycles(stats.tiles), Event::RenderDone);
    }

    /// Polygon FIFO, whole words
    pub fn ta_fifo_write(&mut self, words: &[u32]) {
        let mut bus = TaBus { vram: &mut self.vram, regs: &mut self.regs, irq: &mut self.irq };
        self.ta.submit(words, &mut bus);
    }

    /// Polygon FIFO as seen by a byte oriented store queue. Partial words are kept.
    pub fn ta_fifo_write_bytes(&mut self, data: &[u8]) {
        self.fifo_partial.extend_from_slice(data);
        let complete = self.fifo_partial.len() & !3;
        let words: Vec<u32> = self.fifo_partial[..complete]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        self.fifo_partial.drain(..complete);
        self.ta_fifo_write(&words);
    }

    pub fn yuv_fifo_write(&mut self, data: &[u8]) {
        let mut out = Vec::new();
        self.yuv.feed(data, &mut self.regs, &mut self.irq, |addr, bytes| out.push((addr, bytes.to_vec())));
        for (addr, bytes) in out {
            if let Err(err) = self.write_vram(addr, &bytes) {
                log::warn!("yuv: {}", err);
            }
        }
    }

    /// Host write into VRAM through the linear path
    pub fn write_vram(&mut self, addr: u32, data: &[u8]) -> Result<(), PvrError> {
        let offset = addr & refsw::pvr_mem::VRAM_MASK;
        if offset as usize + data.len() > VRAM_SIZE {
            return Err(PvrError::VramRange { addr, len: data.len() as u32 });
        }

        if self.rendering {
            match self.config.vram_write_policy {
                VramWritePolicy::Defer => {
                    log::trace!("pvr: VRAM write at {:08X} deferred", addr);
                    self.deferred_writes.push((offset, data.to_vec()));
                    return Ok(());
                }
                VramWritePolicy::Reject => {
                    log::warn!("pvr: VRAM write at {:08X} rejected during render", addr);
                    return Err(PvrError::VramBusy);
                }
            }
        }

        self.vram.write_linear(offset, data);
        Ok(())
    }

    fn apply_deferred_writes(&mut self) {
        for (addr, data) in self.deferred_writes.drain(..) {
            self.vram.write_linear(addr, &data);
        }
    }

    pub fn read_dma_reg(&self, addr: u32) -> u32 {
        self.dma.read(addr)
    }

    /// SB_PD* register write. A start request runs the copy at once and
    /// schedules the DMA-done interrupt.
    pub fn write_dma_reg(&mut self, addr: u32, value: u32, memory: &mut dyn SystemMemory) -> Result<(), PvrError> {
        if !self.dma.write(addr, value) {
            return Ok(());
        }
        if self.dma.pden == 0 {
            log::debug!("pvr-dma: start while disabled");
            return Ok(());
        }

        let transfer = match self.dma.prepare() {
            Ok(t) => t,
            Err(err) => {
                log::warn!("pvr-dma: {}", err);
                if !matches!(err, PvrError::DmaLength(_)) {
                    self.irq.raise(Interrupt::PvrIllegalAddress);
                }
                return Err(err);
            }
        };

        log::debug!(
            "pvr-dma: {:?} {} bytes, vram {:08X}, system {:08X}",
            transfer.direction,
            transfer.len,
            transfer.vram_addr,
            transfer.system_addr
        );

        self.dma.begin();
        let mut out = Vec::new();
        transfer.run(&self.vram, memory, |addr, block| out.push((addr, block.to_vec())));
        let mut result = Ok(());
        for (addr, block) in out {
            if let Err(err) = self.write_vram(addr, &block) {
                result = Err(err);
            }
        }

        self.dma_transfer = Some(transfer);
        self.scheduler.schedule(transfer.blocks() as u64 * self.config.dma_cycles_per_block, Event::PvrDmaDone);
        result
    }

    pub fn read_back(&self) -> Option<FrameImage> {
        framebuffer::read_back(&self.vram, &self.regs)
    }

    /// Builds the region array for the lists submitted this frame
    pub fn write_region_array(&mut self, pre_sort: bool) -> u32 {
        self.ta.write_region_array(&mut self.vram, &self.regs, pre_sort)
    }

    /// Advances time: scanline counter first, then any events that came due
    pub fn tick(&mut self, cycles: u64) {
        self.spg.tick(&self.regs, cycles, &mut self.irq);
        self.scheduler.advance(cycles);

        while let Some(due) = self.scheduler.pop() {
            match due.event {
                Event::RenderDone => self.render_done(),
                Event::PvrDmaDone => {
                    if let Some(t) = self.dma_transfer.take() {
                        self.dma.complete(&t);
                    }
                    self.irq.raise(Interrupt::PvrDmaDone);
                }
            }
        }
    }

    fn render_done(&mut self) {
        self.irq.raise(Interrupt::RenderDoneIsp);
        self.irq.raise(Interrupt::RenderDoneTsp);
        self.irq.raise(Interrupt::RenderDoneVideo);
        self.rendering = false;
        self.apply_deferred_writes();

        if std::mem::take(&mut self.queued_render) {
            self.run_render();
        }
    }
}
