/*
    This file is part of libswirl
*/
// #include "license/bsd"

// Region array and object list word layouts

use bitfield::bitfield;

pub const OBJ_TYPE_TRIANGLE_ARRAY: u32 = 0b100;
pub const OBJ_TYPE_QUAD_ARRAY: u32 = 0b101;
pub const OBJ_TYPE_LINK: u32 = 0b111;

/// Link to the next block of the same list
pub const OL_LINK: u32 = 0xE000_0000;
pub const OL_END: u32 = 0xF000_0000;

/// Longest run a single array entry can describe
pub const MAX_RUN: u32 = 16;

macro_rules! list_word_full {
    ($($t:ident),* $(,)?) => {
        $(
            impl $t {
                #[inline]
                pub const fn full(&self) -> u32 { self.0 }
                #[inline]
                pub fn set_full(&mut self, val: u32) { self.0 = val; }
            }

            impl From<u32> for $t {
                #[inline]
                fn from(val: u32) -> Self { $t(val) }
            }
        )*
    };
}

bitfield! {
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct RegionArrayEntryControl(u32);
    impl Debug;

    pub tilex, set_tilex: 7, 2;
    pub tiley, set_tiley: 13, 8;
    pub no_writeout, set_no_writeout: 28;
    pub pre_sort, set_pre_sort: 29;
    pub z_keep, set_z_keep: 30;
    pub last_region, set_last_region: 31;
}

bitfield! {
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct ListPointer(u32);
    impl Debug;

    pub ptr_in_words, set_ptr_in_words: 23, 2;
    pub empty, set_empty: 31;
}

bitfield! {
    /// Triangle or quad array entry. `prims` is the run length minus one.
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct ObjectListArray(u32);
    impl Debug;

    pub param_offs_in_words, set_param_offs_in_words: 20, 0;
    pub skip, set_skip: 23, 21;
    pub shadow, set_shadow: 24;
    pub prims, set_prims: 28, 25;
    pub obj_type, set_obj_type: 31, 29;
}

bitfield! {
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct ObjectListLink(u32);
    impl Debug;

    pub next_block_ptr_in_words, set_next_block_ptr_in_words: 23, 2;
    pub end_of_list, set_end_of_list: 28;
    pub obj_type, set_obj_type: 31, 29;
}

list_word_full!(RegionArrayEntryControl, ListPointer, ObjectListArray, ObjectListLink);

impl ListPointer {
    pub const EMPTY: ListPointer = ListPointer(0x8000_0000);

    pub fn to(addr: u32) -> Self {
        ListPointer(addr & 0x00FF_FFFC)
    }

    #[inline]
    pub fn addr(&self) -> u32 {
        self.ptr_in_words() * 4
    }
}

impl ObjectListArray {
    pub fn new(quad: bool, shadow: bool, skip: u32, param_offs_in_words: u32) -> Self {
        let mut rv = ObjectListArray(0);
        rv.set_obj_type(if quad { OBJ_TYPE_QUAD_ARRAY } else { OBJ_TYPE_TRIANGLE_ARRAY });
        rv.set_shadow(shadow);
        rv.set_skip(skip);
        rv.set_param_offs_in_words(param_offs_in_words);
        rv
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.prims() + 1
    }

    /// Entries that only differ in run position can be merged
    #[inline]
    pub fn same_kind(&self, other: &ObjectListArray) -> bool {
        self.obj_type() == other.obj_type() && self.shadow() == other.shadow() && self.skip() == other.skip()
    }
}

// Union-like view over one object list word
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ObjectListEntry {
    data: u32,
}

impl ObjectListEntry {
    pub fn new(val: u32) -> Self {
        Self { data: val }
    }

    pub fn full(&self) -> u32 {
        self.data
    }

    pub fn is_not_triangle_strip(&self) -> bool {
        (self.data >> 31) & 1 != 0
    }

    pub fn obj_type(&self) -> u32 {
        (self.data >> 29) & 0b111
    }

    pub fn as_array(&self) -> ObjectListArray {
        ObjectListArray(self.data)
    }

    pub fn as_link(&self) -> ObjectListLink {
        ObjectListLink(self.data)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionArrayEntry {
    pub control: RegionArrayEntryControl,
    pub opaque: ListPointer,
    pub opaque_mod: ListPointer,
    pub trans: ListPointer,
    pub trans_mod: ListPointer,
    pub puncht: ListPointer,
}

impl RegionArrayEntry {
    /// List pointer for a list id, in TA list order
    pub fn list(&self, list_id: u32) -> ListPointer {
        match list_id {
            0 => self.opaque,
            1 => self.opaque_mod,
            2 => self.trans,
            3 => self.trans_mod,
            _ => self.puncht,
        }
    }
}
