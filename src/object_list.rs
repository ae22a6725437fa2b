//! Per-tile object list construction: parameter memory writes, OPB
//! allocation and run concatenation.
//!
//! Each list class owns a tile matrix at `TA_OL_BASE`, one OPB per tile in
//! row-major order, the classes laid out one after the other. A full OPB
//! links to a fresh block taken from `TA_NEXT_OPB`.

use refsw::isp::{IspParamBlock, ScreenRect};
use refsw::lists::ListClass;
use refsw::lists_types::{ListPointer, ObjectListArray, RegionArrayEntryControl, MAX_RUN, OL_END, OL_LINK};
use refsw::pvr_regs::{PvrRegs, TA_ISP_CURRENT_ADDR, TA_NEXT_OPB_ADDR};
use refsw::Vram;

use crate::asic::Interrupt;
use crate::ta::TaBus;

/// OPB sizes in words, indexed by the `TA_ALLOC_CTRL` selector. 0 disables the list.
pub const OPB_WORDS: [u32; 4] = [0, 8, 16, 32];

/// Inclusive rectangle in tile units
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TileRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

fn tile_coord(v: f32) -> i64 {
    if v.is_nan() || v < 0.0 {
        -1
    } else if v >= (i32::MAX as f32) {
        (i32::MAX / 32) as i64
    } else {
        (v / 32.0) as i64
    }
}

impl TileRect {
    /// Tiles touched by `bounds`, clamped to a `width` x `height` tile grid.
    /// `None` when the box lies entirely outside the grid.
    pub fn of(bounds: &ScreenRect, width: u32, height: u32) -> Option<Self> {
        let x1 = tile_coord(bounds.min_x).max(0);
        let y1 = tile_coord(bounds.min_y).max(0);
        let x2 = tile_coord(bounds.max_x).min(width as i64 - 1);
        let y2 = tile_coord(bounds.max_y).min(height as i64 - 1);

        if x1 > x2 || y1 > y2 {
            return None;
        }
        Some(Self {
            x1: x1 as u32,
            y1: y1 as u32,
            x2: x2 as u32,
            y2: y2 as u32,
        })
    }

    /// Rectangle from the tile coordinates of a user clip or object list set packet
    pub fn from_words(words: &[u32], width: u32, height: u32) -> Self {
        Self {
            x1: words[0] & 0x3F,
            y1: words[1] & 0x0F,
            x2: (words[2] & 0x3F).min(width.saturating_sub(1)),
            y2: (words[3] & 0x0F).min(height.saturating_sub(1)),
        }
    }

    #[inline]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    #[inline]
    pub fn is_single(&self) -> bool {
        self.x1 == self.x2 && self.y1 == self.y2
    }

    pub fn union(&self, other: &TileRect) -> Self {
        Self {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    pub fn intersect(&self, other: &TileRect) -> Option<Self> {
        let rv = Self {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        };
        if rv.x1 > rv.x2 || rv.y1 > rv.y2 { None } else { Some(rv) }
    }

    fn tiles(self) -> impl Iterator<Item = (u32, u32)> {
        (self.y1..=self.y2).flat_map(move |y| (self.x1..=self.x2).map(move |x| (x, y)))
    }
}

/// User tile clip, latched by the TA and selected per header
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UserClip {
    /// 0 and 1 disable, 2 keeps tiles inside `rect`, 3 keeps tiles outside
    pub mode: u32,
    pub rect: TileRect,
}

impl UserClip {
    pub const fn disabled() -> Self {
        Self {
            mode: 0,
            rect: TileRect { x1: 0, y1: 0, x2: 0, y2: 0 },
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Run {
    entry_addr: u32,
    entry: ObjectListArray,
    /// Parameter offset the next block must start at to join the run
    next_offs: u32,
}

#[derive(Copy, Clone, Debug, Default)]
struct TileTail {
    /// Address of the end marker
    end_ptr: u32,
    /// Last word of the current OPB, reserved for the link
    last_slot: u32,
    run: Option<Run>,
}

#[derive(Clone, Debug)]
struct ClassMatrix {
    base: u32,
    opb_words: u32,
    tails: Vec<TileTail>,
}

#[derive(Clone, Debug, Default)]
pub struct ObjectListBuilder {
    width: u32,
    height: u32,
    current: Option<ListClass>,
    opened: [bool; 5],
    matrices: [Option<ClassMatrix>; 5],
}

impl ObjectListBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new frame: tile grid from `TA_GLOB_TILE_CLIP`, no list opened
    pub fn init(&mut self, regs: &PvrRegs) {
        let clip = regs.ta_glob_tile_clip();
        *self = Self {
            width: clip.width_tiles(),
            height: clip.height_tiles(),
            ..Default::default()
        };
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Address of a tile's first OPB for `class`, if the class has storage
    pub fn tile_head(&self, class: ListClass, x: u32, y: u32) -> Option<u32> {
        let m = self.matrices[class.id() as usize].as_ref()?;
        Some(m.base + (y * self.width + x) * m.opb_words * 4)
    }

    /// Makes `class` the target of emitted primitives. The first open in a
    /// frame terminates every tile's OPB; reopening appends.
    pub fn open(&mut self, class: ListClass, vram: &mut Vram, regs: &PvrRegs) {
        self.current = Some(class);
        let id = class.id() as usize;
        if self.opened[id] {
            return;
        }
        self.opened[id] = true;

        let alloc = regs.ta_alloc_ctrl();
        let tiles = self.width * self.height;
        let base = regs.ta_ol_base()
            + (0..id)
                .map(|l| tiles * OPB_WORDS[alloc.opb_size_sel(l) as usize] * 4)
                .sum::<u32>();
        let opb_words = OPB_WORDS[alloc.opb_size_sel(id) as usize];

        if opb_words == 0 {
            log::debug!("object list: {:?} has no OPB storage, its primitives are dropped", class);
            self.matrices[id] = None;
            return;
        }

        let mut tails = Vec::with_capacity(tiles as usize);
        for i in 0..tiles {
            let slot = base + i * opb_words * 4;
            vram.write32(slot, OL_END);
            tails.push(TileTail {
                end_ptr: slot,
                last_slot: slot + (opb_words - 1) * 4,
                run: None,
            });
        }
        self.matrices[id] = Some(ClassMatrix { base, opb_words, tails });
    }

    pub fn close(&mut self) {
        self.current = None;
    }

    /// Writes `block` to parameter memory and bins it into every tile of
    /// `bounds` that survives the user clip. Returns false if it was dropped.
    pub fn emit_primitive(
        &mut self,
        block: &IspParamBlock,
        bounds: TileRect,
        shadow: bool,
        clip: UserClip,
        bus: &mut TaBus<'_>,
    ) -> bool {
        let Some(class) = self.current else {
            log::debug!("object list: primitive outside of a list");
            return false;
        };
        if self.matrices[class.id() as usize].is_none() {
            return false;
        }

        let bounds = match clip.mode {
            2 => match bounds.intersect(&clip.rect) {
                Some(b) => b,
                None => return false,
            },
            3 if clip.rect.intersect(&bounds) == Some(bounds) => return false,
            _ => bounds,
        };

        let Some(offs) = write_params(block, bus) else {
            return false;
        };

        let entry = ObjectListArray::new(block.header.quad(), shadow, block.header.skip(), offs);
        let merge_words = bounds.is_single().then(|| block.size_words());

        for (x, y) in bounds.tiles() {
            if clip.mode == 3 && clip.rect.contains(x, y) {
                continue;
            }
            self.append(class, x, y, entry.full(), merge_words, bus);
        }
        true
    }

    /// Inserts a host supplied object list word into every tile of `rect`
    pub fn insert_raw(&mut self, word: u32, rect: TileRect, bus: &mut TaBus<'_>) {
        let Some(class) = self.current else {
            return;
        };
        for (x, y) in rect.tiles() {
            self.append(class, x, y, word, None, bus);
        }
    }

    fn append(&mut self, class: ListClass, x: u32, y: u32, word: u32, merge_words: Option<u32>, bus: &mut TaBus<'_>) {
        let width = self.width;
        let Some(matrix) = self.matrices[class.id() as usize].as_mut() else {
            return;
        };
        let opb_bytes = matrix.opb_words * 4;
        let tail = &mut matrix.tails[(y * width + x) as usize];
        let entry = ObjectListArray::from(word);

        if let (Some(words), Some(run)) = (merge_words, tail.run.as_mut()) {
            if run.entry.same_kind(&entry)
                && run.next_offs == entry.param_offs_in_words()
                && run.entry.count() < MAX_RUN
            {
                run.entry.set_prims(run.entry.prims() + 1);
                run.next_offs += words;
                bus.vram.write32(run.entry_addr, run.entry.full());
                return;
            }
        }

        if tail.end_ptr >= tail.last_slot {
            let Some(next) = alloc_block(bus, opb_bytes) else {
                tail.run = None;
                return;
            };
            bus.vram.write32(tail.last_slot, OL_LINK | next);
            tail.end_ptr = next;
            tail.last_slot = next + opb_bytes - 4;
        }

        bus.vram.write32(tail.end_ptr, word);
        bus.vram.write32(tail.end_ptr + 4, OL_END);
        tail.run = merge_words.map(|words| Run {
            entry_addr: tail.end_ptr,
            entry,
            next_offs: entry.param_offs_in_words() + words,
        });
        tail.end_ptr += 4;
    }

    /// Writes a region array at `REGION_BASE` covering the tile grid, pointing
    /// at this frame's tile matrices. Returns the number of entries.
    pub fn write_region_array(&self, vram: &mut Vram, regs: &PvrRegs, pre_sort: bool) -> u32 {
        let lists = if regs.fpu_param_cfg().region_header_type() { 5 } else { 4 };
        let count = self.width * self.height;
        if count == 0 {
            return 0;
        }
        let mut ptr = regs.region_base();

        for (i, (x, y)) in (TileRect { x1: 0, y1: 0, x2: self.width - 1, y2: self.height - 1 }).tiles().enumerate() {
            let mut control = RegionArrayEntryControl::from(0);
            control.set_tilex(x);
            control.set_tiley(y);
            control.set_pre_sort(pre_sort);
            control.set_last_region(i as u32 + 1 == count);
            vram.write32(ptr, control.full());
            ptr += 4;

            for class in ListClass::ALL.iter().take(lists) {
                let pointer = match self.tile_head(*class, x, y) {
                    Some(addr) => ListPointer::to(addr),
                    None => ListPointer::EMPTY,
                };
                vram.write32(ptr, pointer.full());
                ptr += 4;
            }
        }
        count
    }
}

// Serializes at TA_ISP_CURRENT. Returns the offset in words from the 1MB page
// of TA_ISP_BASE.
fn write_params(block: &IspParamBlock, bus: &mut TaBus<'_>) -> Option<u32> {
    let current = bus.regs.ta_isp_current();
    let bytes = block.size_words() * 4;

    if current + bytes > bus.regs.ta_isp_limit() {
        log::warn!(
            "object list: parameter memory full at {:08X} (limit {:08X})",
            current,
            bus.regs.ta_isp_limit()
        );
        bus.irq.raise(Interrupt::IspParamOverflow);
        return None;
    }

    let written = block.serialize(bus.vram, current);
    bus.regs.write(TA_ISP_CURRENT_ADDR, current + written * 4);
    Some((current - (bus.regs.ta_isp_base() & 0xF0_0000)) / 4)
}

fn alloc_block(bus: &mut TaBus<'_>, bytes: u32) -> Option<u32> {
    let next = bus.regs.ta_next_opb();
    let limit = bus.regs.ta_ol_limit();

    let (block, after, fits) = if bus.regs.ta_alloc_ctrl().opb_grow_down() {
        let block = next.wrapping_sub(bytes);
        (block, block, next >= bytes && block >= limit)
    } else {
        (next, next + bytes, next + bytes <= limit)
    };

    if !fits {
        log::warn!("object list: OPB pool exhausted at {:08X} (limit {:08X})", next, limit);
        bus.irq.raise(Interrupt::ObjectListOverflow);
        return None;
    }

    bus.regs.write(TA_NEXT_OPB_ADDR, after);
    Some(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use refsw::isp::{setup, LIST_OPAQUE};
    use refsw::lists::walk_object_list;
    use refsw::pvr_regs::*;
    use refsw::types::{Vertex, ISP_TSP};

    const OL_BASE: u32 = 0x10_0000;
    const OPB_POOL: u32 = 0x14_0000;

    struct Fixture {
        vram: Vram,
        regs: PvrRegs,
        irqs: Vec<Interrupt>,
        builder: ObjectListBuilder,
    }

    impl Fixture {
        fn new(alloc_ctrl: u32) -> Self {
            let mut regs = PvrRegs::new();
            regs.write(TA_GLOB_TILE_CLIP_ADDR, (1 << 16) | 1);
            regs.write(TA_ALLOC_CTRL_ADDR, alloc_ctrl);
            regs.write(TA_OL_BASE_ADDR, OL_BASE);
            regs.write(TA_OL_LIMIT_ADDR, 0x18_0000);
            regs.write(TA_NEXT_OPB_ADDR, OPB_POOL);
            regs.write(TA_ISP_BASE_ADDR, 0);
            regs.write(TA_ISP_CURRENT_ADDR, 0);
            regs.write(TA_ISP_LIMIT_ADDR, 0x8_0000);
            regs.write(PARAM_BASE_ADDR, 0);

            let mut builder = ObjectListBuilder::new();
            builder.init(&regs);
            let mut vram = Vram::new();
            builder.open(ListClass::Opaque, &mut vram, &regs);
            Self { vram, regs, irqs: Vec::new(), builder }
        }

        fn emit(&mut self, x: f32, y: f32, size: f32) -> bool {
            let v = [Vertex::at(x, y, 1.0), Vertex::at(x + size, y, 1.0), Vertex::at(x, y + size, 1.0)];
            let s = setup(&v, 0, 0.0, 0.0).unwrap();
            let block = IspParamBlock::new(ISP_TSP(0), LIST_OPAQUE, false, &v, &s);
            let rect = TileRect::of(&ScreenRect::of(&v), self.builder.width(), self.builder.height()).unwrap();
            let mut bus = TaBus {
                vram: &mut self.vram,
                regs: &mut self.regs,
                irq: &mut self.irqs,
            };
            self.builder.emit_primitive(&block, rect, false, UserClip::disabled(), &mut bus)
        }

        fn walk(&self, x: u32, y: u32) -> usize {
            let head = self.builder.tile_head(ListClass::Opaque, x, y).unwrap();
            let mut prims = Vec::new();
            walk_object_list(&self.vram, &self.regs, ListPointer::to(head), &mut prims);
            prims.len()
        }
    }

    #[test]
    fn test_tile_rect_clamps() {
        let r = ScreenRect { min_x: -5.0, min_y: 10.0, max_x: 100.0, max_y: 31.9 };
        assert_eq!(TileRect::of(&r, 2, 2), Some(TileRect { x1: 0, y1: 0, x2: 1, y2: 0 }));

        let outside = ScreenRect { min_x: 70.0, min_y: 0.0, max_x: 90.0, max_y: 5.0 };
        assert_eq!(TileRect::of(&outside, 2, 2), None);
    }

    #[test]
    fn test_adjacent_single_tile_prims_share_an_entry() {
        let mut f = Fixture::new(1);
        for _ in 0..5 {
            assert!(f.emit(2.0, 2.0, 8.0));
        }

        let head = f.builder.tile_head(ListClass::Opaque, 0, 0).unwrap();
        let entry = ObjectListArray::from(f.vram.read32(head));
        assert_eq!(entry.count(), 5);
        assert_eq!(f.vram.read32(head + 4), OL_END);
        assert_eq!(f.walk(0, 0), 5);
        assert_eq!(f.walk(1, 0), 0);
    }

    #[test]
    fn test_runs_split_at_sixteen() {
        let mut f = Fixture::new(1);
        for _ in 0..20 {
            f.emit(2.0, 2.0, 8.0);
        }
        let head = f.builder.tile_head(ListClass::Opaque, 0, 0).unwrap();
        assert_eq!(ObjectListArray::from(f.vram.read32(head)).count(), 16);
        assert_eq!(ObjectListArray::from(f.vram.read32(head + 4)).count(), 4);
        assert_eq!(f.walk(0, 0), 20);
    }

    #[test]
    fn test_multi_tile_prims_are_not_merged() {
        let mut f = Fixture::new(1);
        f.emit(16.0, 2.0, 24.0);
        f.emit(16.0, 2.0, 24.0);

        let head = f.builder.tile_head(ListClass::Opaque, 1, 0).unwrap();
        assert_eq!(ObjectListArray::from(f.vram.read32(head)).count(), 1);
        assert_eq!(ObjectListArray::from(f.vram.read32(head + 4)).count(), 1);
        assert_eq!(f.walk(0, 0), 2);
        assert_eq!(f.walk(1, 0), 2);
    }

    #[test]
    fn test_full_opb_links_to_pool() {
        // 8 word OPBs hold 7 entries before the link slot
        let mut f = Fixture::new(1);
        for i in 0..10 {
            f.emit(16.0 + i as f32, 2.0, 24.0);
        }
        let head = f.builder.tile_head(ListClass::Opaque, 0, 0).unwrap();
        assert_eq!(f.vram.read32(head + 28), OL_LINK | OPB_POOL);
        // both tiles overflowed their first OPB
        assert_eq!(f.regs.ta_next_opb(), OPB_POOL + 64);
        assert_eq!(f.walk(0, 0), 10);
    }

    #[test]
    fn test_opb_exhaustion_raises_overflow() {
        let mut f = Fixture::new(1);
        f.regs.write(TA_OL_LIMIT_ADDR, OPB_POOL + 16);
        for i in 0..8 {
            f.emit(16.0 + i as f32, 2.0, 24.0);
        }
        assert_eq!(f.irqs, vec![Interrupt::ObjectListOverflow; 2]);
        assert_eq!(f.walk(0, 0), 7);
    }

    #[test]
    fn test_param_limit_drops_primitive() {
        let mut f = Fixture::new(1);
        f.regs.write(TA_ISP_LIMIT_ADDR, 16);
        assert!(!f.emit(2.0, 2.0, 8.0));
        assert_eq!(f.irqs, vec![Interrupt::IspParamOverflow]);
        assert_eq!(f.regs.ta_isp_current(), 0);
        assert_eq!(f.walk(0, 0), 0);
    }

    #[test]
    fn test_disabled_class_drops() {
        let mut f = Fixture::new(1);
        f.builder.open(ListClass::Trans, &mut f.vram, &f.regs);
        assert!(!f.emit(2.0, 2.0, 8.0));
        assert_eq!(f.regs.ta_isp_current(), 0);
    }

    #[test]
    fn test_user_clip_modes() {
        let mut f = Fixture::new(1);
        let v = [Vertex::at(2.0, 2.0, 1.0), Vertex::at(60.0, 2.0, 1.0), Vertex::at(2.0, 60.0, 1.0)];
        let s = setup(&v, 0, 0.0, 0.0).unwrap();
        let block = IspParamBlock::new(ISP_TSP(0), LIST_OPAQUE, false, &v, &s);
        let all = TileRect { x1: 0, y1: 0, x2: 1, y2: 1 };
        let corner = UserClip { mode: 3, rect: TileRect { x1: 0, y1: 0, x2: 0, y2: 0 } };
        let inside = UserClip { mode: 2, rect: TileRect { x1: 1, y1: 1, x2: 1, y2: 1 } };

        let mut bus = TaBus { vram: &mut f.vram, regs: &mut f.regs, irq: &mut f.irqs };
        f.builder.emit_primitive(&block, all, false, corner, &mut bus);
        f.builder.emit_primitive(&block, all, false, inside, &mut bus);

        assert_eq!(f.walk(0, 0), 0);
        assert_eq!(f.walk(1, 0), 1);
        assert_eq!(f.walk(0, 1), 1);
        assert_eq!(f.walk(1, 1), 2);
    }

    #[test]
    fn test_region_array_points_at_matrix() {
        let mut f = Fixture::new(1);
        f.regs.write(REGION_BASE_ADDR, 0x1F_0000);
        f.regs.write(FPU_PARAM_CFG_ADDR, 1 << 21);
        f.emit(2.0, 2.0, 8.0);
        let count = f.builder.write_region_array(&mut f.vram, &f.regs, false);
        assert_eq!(count, 4);

        let last = 0x1F_0000 + 3 * 24;
        let control = RegionArrayEntryControl::from(f.vram.read32(last));
        assert!(control.last_region());
        assert_eq!((control.tilex(), control.tiley()), (1, 1));
        assert_eq!(f.vram.read32(0x1F_0004), ListPointer::to(OL_BASE).full());
        assert!(ListPointer::from(f.vram.read32(0x1F_0008)).empty());
    }
}
