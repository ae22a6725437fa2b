/*
    This file is part of libswirl
*/
// #include "license/bsd"

// Region array parsing and object list walking

use crate::isp::IspParamBlock;
use crate::lists_types::*;
use crate::pvr_mem::Vram;
use crate::pvr_regs::{ISP_BACKGND_T_type, PvrRegs};

/// Upper bound on object list words followed for one list, guards against
/// link loops in uninitialized memory
const MAX_LIST_WORDS: usize = 1 << 16;

/// The five primitive classes in TA list order
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ListClass {
    Opaque,
    OpaqueMod,
    Trans,
    TransMod,
    PunchThrough,
}

impl ListClass {
    pub const ALL: [ListClass; 5] = [
        ListClass::Opaque,
        ListClass::OpaqueMod,
        ListClass::Trans,
        ListClass::TransMod,
        ListClass::PunchThrough,
    ];

    #[inline]
    pub const fn id(self) -> u32 {
        self as u32
    }

    pub const fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(ListClass::Opaque),
            1 => Some(ListClass::OpaqueMod),
            2 => Some(ListClass::Trans),
            3 => Some(ListClass::TransMod),
            4 => Some(ListClass::PunchThrough),
            _ => None,
        }
    }

    #[inline]
    pub const fn is_modifier(self) -> bool {
        matches!(self, ListClass::OpaqueMod | ListClass::TransMod)
    }
}

/// A decoded primitive with the tag the ISP stores for it
#[derive(Copy, Clone, Debug)]
pub struct TaggedPrimitive {
    pub tag: ISP_BACKGND_T_type,
    pub block: IspParamBlock,
}

pub fn core_tag_from_desc(cache_bypass: bool, shadow: bool, skip: u32, param_offs_in_words: u32, tag_offset: u32) -> ISP_BACKGND_T_type {
    let mut rv = ISP_BACKGND_T_type(0);
    rv.set_tag_offset(tag_offset);
    rv.set_param_offs_in_words(param_offs_in_words);
    rv.set_skip(skip);
    rv.set_shadow(shadow);
    rv.set_cache_bypass(cache_bypass);
    rv
}

/// Parameter offsets in tags and list entries are relative to the 1MB page
/// holding `PARAM_BASE`.
#[inline]
pub fn param_page(regs: &PvrRegs) -> u32 {
    regs.param_base() & 0xF0_0000
}

/// Reads one region array entry. Returns the entry and its size in bytes.
pub fn read_region_array_entry(vram: &Vram, regs: &PvrRegs, base: u32) -> (RegionArrayEntry, u32) {
    let fmt_v1 = !regs.fpu_param_cfg().region_header_type();

    let mut entry = RegionArrayEntry {
        control: RegionArrayEntryControl(vram.read32(base)),
        opaque: ListPointer(vram.read32(base + 4)),
        opaque_mod: ListPointer(vram.read32(base + 8)),
        trans: ListPointer(vram.read32(base + 12)),
        trans_mod: ListPointer(vram.read32(base + 16)),
        puncht: ListPointer::EMPTY,
    };

    if fmt_v1 {
        entry.control.set_pre_sort(regs.isp_feed_cfg().pre_sort());
        (entry, 5 * 4)
    } else {
        entry.puncht = ListPointer(vram.read32(base + 20));
        (entry, 6 * 4)
    }
}

/// Decodes the block a tag points at
pub fn decode_tag(vram: &Vram, regs: &PvrRegs, tag: ISP_BACKGND_T_type) -> IspParamBlock {
    IspParamBlock::deserialize(vram, param_page(regs) + tag.param_offs_in_words() * 4)
}

/// Collects every primitive of one tile's list in submission order.
pub fn walk_object_list(vram: &Vram, regs: &PvrRegs, list: ListPointer, out: &mut Vec<TaggedPrimitive>) {
    out.clear();
    if list.empty() {
        return;
    }

    let page = param_page(regs);
    let mut base = list.addr();

    for _ in 0..MAX_LIST_WORDS {
        let obj = ObjectListEntry::new(vram.read32(base));
        base += 4;

        if !obj.is_not_triangle_strip() {
            log::debug!("walk_object_list: strip entry {:08X} at {:08X} not supported", obj.full(), base - 4);
            continue;
        }

        match obj.obj_type() {
            OBJ_TYPE_LINK => {
                let link = obj.as_link();
                if link.end_of_list() {
                    return;
                }
                base = link.next_block_ptr_in_words() * 4;
            }
            OBJ_TYPE_TRIANGLE_ARRAY | OBJ_TYPE_QUAD_ARRAY => {
                let array = obj.as_array();
                let mut param_ptr = page + array.param_offs_in_words() * 4;

                for _ in 0..array.count() {
                    let block = IspParamBlock::deserialize(vram, param_ptr);
                    let tag = core_tag_from_desc(
                        block.isp.cache_bypass(),
                        array.shadow(),
                        array.skip(),
                        (param_ptr - page) / 4,
                        0,
                    );
                    param_ptr += block.size_words() * 4;
                    out.push(TaggedPrimitive { tag, block });
                }
            }
            other => {
                log::debug!("walk_object_list: unhandled object type {:03b} at {:08X}", other, base - 4);
            }
        }
    }

    log::warn!("walk_object_list: list at {:08X} has no end marker", list.addr());
}
