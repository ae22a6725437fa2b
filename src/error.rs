use thiserror::Error;

#[derive(Error, Debug)]
pub enum PvrError {
    #[error("Configuration could not be parsed: {0}")]
    Config(#[from] serde_json::Error),
    #[error("VRAM access {addr:#010X}+{len:#X} is out of range")]
    VramRange { addr: u32, len: u32 },
    #[error("VRAM is in use by a render")]
    VramBusy,
    #[error("DMA length {0:#X} is not a multiple of 32")]
    DmaLength(u32),
    #[error("DMA address {0:#010X} is not mapped")]
    DmaAddress(u32),
    #[error("DMA address {0:#010X} is outside the protected range")]
    DmaProtected(u32),
}
