//! PowerVR2 (Holly) graphics core.
//!
//! `Pvr` is the device: registers, VRAM, the tile accelerator that turns host
//! packets into parameter blocks and per-tile object lists, and the render
//! core from `refsw` that walks those lists into the frame buffer. Around it
//! sit the sync pulse generator, YUV converter, PVR-DMA and an event scheduler.
//!
//! ```no_run
//! use pvr2::{Pvr, PvrConfig};
//!
//! let mut pvr = Pvr::new(PvrConfig::default());
//! pvr.write_reg(0x144, 0x8000_0000); // TA_LIST_INIT
//! pvr.ta_fifo_write(&[0; 8]); // end of list
//! pvr.write_reg(0x14, 1); // STARTRENDER
//! pvr.tick(200_000);
//! ```

pub mod asic;
pub mod config;
pub mod dma;
pub mod error;
pub mod framebuffer;
pub mod object_list;
pub mod pvr;
pub mod scheduler;
pub mod spg;
pub mod ta;
pub mod yuv;

pub use asic::{Asic, Interrupt, InterruptSink};
pub use config::{BusyRenderPolicy, PvrConfig, VramWritePolicy};
pub use error::PvrError;
pub use framebuffer::FrameImage;
pub use pvr::Pvr;
pub use refsw;
