//! Holly interrupt events and the status/mask latch they land in.

use refsw::lists::ListClass;

pub const SB_ISTNRM: u32 = 0x005F_6900;
pub const SB_ISTERR: u32 = 0x005F_6908;
pub const SB_IML2NRM: u32 = 0x005F_6910;
pub const SB_IML2ERR: u32 = 0x005F_6918;
pub const SB_IML4NRM: u32 = 0x005F_6920;
pub const SB_IML4ERR: u32 = 0x005F_6928;
pub const SB_IML6NRM: u32 = 0x005F_6930;
pub const SB_IML6ERR: u32 = 0x005F_6938;

/// Interrupt events raised by the PVR block
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Interrupt {
    RenderDoneVideo,
    RenderDoneIsp,
    RenderDoneTsp,
    VBlankIn,
    VBlankOut,
    HBlankIn,
    YuvDone,
    OpaqueListDone,
    OpaqueModListDone,
    TransListDone,
    TransModListDone,
    PunchThroughListDone,
    PvrDmaDone,

    // SB_ISTERR
    IspParamOverflow,
    ObjectListOverflow,
    TaIllegalParam,
    PvrIllegalAddress,
}

impl Interrupt {
    /// Bit position in SB_ISTNRM, or SB_ISTERR for error events
    pub const fn bit(self) -> u8 {
        match self {
            Interrupt::RenderDoneVideo => 0,
            Interrupt::RenderDoneIsp => 1,
            Interrupt::RenderDoneTsp => 2,
            Interrupt::VBlankIn => 3,
            Interrupt::VBlankOut => 4,
            Interrupt::HBlankIn => 5,
            Interrupt::YuvDone => 6,
            Interrupt::OpaqueListDone => 7,
            Interrupt::OpaqueModListDone => 8,
            Interrupt::TransListDone => 9,
            Interrupt::TransModListDone => 10,
            Interrupt::PvrDmaDone => 11,
            Interrupt::PunchThroughListDone => 21,

            Interrupt::IspParamOverflow => 2,
            Interrupt::ObjectListOverflow => 3,
            Interrupt::TaIllegalParam => 4,
            Interrupt::PvrIllegalAddress => 6,
        }
    }

    pub const fn is_error(self) -> bool {
        matches!(
            self,
            Interrupt::IspParamOverflow
                | Interrupt::ObjectListOverflow
                | Interrupt::TaIllegalParam
                | Interrupt::PvrIllegalAddress
        )
    }

    pub const fn list_done(class: ListClass) -> Self {
        match class {
            ListClass::Opaque => Interrupt::OpaqueListDone,
            ListClass::OpaqueMod => Interrupt::OpaqueModListDone,
            ListClass::Trans => Interrupt::TransListDone,
            ListClass::TransMod => Interrupt::TransModListDone,
            ListClass::PunchThrough => Interrupt::PunchThroughListDone,
        }
    }
}

/// Receiver for interrupt events. Delivery and priority are up to the implementor.
pub trait InterruptSink {
    fn raise(&mut self, irq: Interrupt);
}

/// Records events in order, mostly useful to observe the device in tests
impl InterruptSink for Vec<Interrupt> {
    fn raise(&mut self, irq: Interrupt) {
        self.push(irq);
    }
}

/// SB_IST*/SB_IML* latch. Status bits are cleared by writing ones.
#[derive(Clone, Debug, Default)]
pub struct Asic {
    ist_nrm: u32,
    ist_err: u32,
    iml2_nrm: u32,
    iml2_err: u32,
    iml4_nrm: u32,
    iml4_err: u32,
    iml6_nrm: u32,
    iml6_err: u32,
}

impl Asic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn read(&self, addr: u32) -> u32 {
        match addr {
            SB_ISTNRM => {
                let mut value = self.ist_nrm & 0x3FFF_FFFF;
                if self.ist_err != 0 {
                    value |= 0x8000_0000;
                }
                value
            }
            SB_ISTERR => self.ist_err,
            SB_IML2NRM => self.iml2_nrm,
            SB_IML2ERR => self.iml2_err,
            SB_IML4NRM => self.iml4_nrm,
            SB_IML4ERR => self.iml4_err,
            SB_IML6NRM => self.iml6_nrm,
            SB_IML6ERR => self.iml6_err,
            _ => 0,
        }
    }

    pub fn write(&mut self, addr: u32, value: u32) {
        match addr {
            SB_ISTNRM => self.ist_nrm &= !value,
            SB_ISTERR => self.ist_err &= !value,
            SB_IML2NRM => self.iml2_nrm = value,
            SB_IML2ERR => self.iml2_err = value,
            SB_IML4NRM => self.iml4_nrm = value,
            SB_IML4ERR => self.iml4_err = value,
            SB_IML6NRM => self.iml6_nrm = value,
            SB_IML6ERR => self.iml6_err = value,
            _ => log::debug!("asic: write to unknown register {:08X} = {:08X}", addr, value),
        }
    }

    pub fn is_pending(&self, irq: Interrupt) -> bool {
        let status = if irq.is_error() { self.ist_err } else { self.ist_nrm };
        status & (1u32 << irq.bit()) != 0
    }

    /// Highest interrupt level (6, 4 or 2) with an unmasked pending event
    pub fn pending_level(&self) -> Option<u8> {
        let active = |nrm: u32, err: u32| (self.ist_nrm & nrm) != 0 || (self.ist_err & err) != 0;

        if active(self.iml6_nrm, self.iml6_err) {
            Some(6)
        } else if active(self.iml4_nrm, self.iml4_err) {
            Some(4)
        } else if active(self.iml2_nrm, self.iml2_err) {
            Some(2)
        } else {
            None
        }
    }
}

impl InterruptSink for Asic {
    fn raise(&mut self, irq: Interrupt) {
        if irq.is_error() {
            log::warn!("asic: error interrupt {:?}", irq);
            self.ist_err |= 1u32 << irq.bit();
        } else {
            log::trace!("asic: interrupt {:?}", irq);
            self.ist_nrm |= 1u32 << irq.bit();
        }
    }
}
