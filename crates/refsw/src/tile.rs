/*
    This file is part of libswirl
*/
// #include "license/bsd"

//! Tile walk: per-tile depth/tag resolution, the TSP pixel pipeline and the
//! state machine that sequences the five primitive classes of each region.
//!
//! The core only reads VRAM while it resolves a tile and writes it when the
//! tile is flushed, so `render` can run synchronously from the start-render
//! register write.

use crate::blend::{blend, blend_mode_index, BLEND_ONE, BLEND_ZERO};
use crate::fb::{self, TILE_SIZE};
use crate::isp::IspParamBlock;
use crate::lists::{decode_tag, read_region_array_entry, walk_object_list, ListClass, TaggedPrimitive};
use crate::lists_types::RegionArrayEntry;
use crate::pvr_mem::Vram;
use crate::pvr_regs::{FPU_SHAD_SCALE_type, ISP_BACKGND_T_type, PvrRegs};
use crate::texture::{select_mip, to_u8_256, Sampler, TextureDescriptor};
use crate::types::{Color, Vertex, ISP_TSP, TSP};

pub const TILE_PIXELS: usize = (TILE_SIZE * TILE_SIZE) as usize;

/// Tags compare on the parameter address only
pub const TAG_SORT_MASK: u32 = 0xFFFF_FFC0;
const TAG_MAX: u32 = 0xFFFF_FFFF;

pub const DEPTH_A: usize = 0;
pub const DEPTH_B: usize = 1;
pub const DEPTH_C: usize = 2;
pub const TAG_A: usize = 0;
pub const TAG_B: usize = 1;
pub const COLOR_PRIMARY: usize = 0;
pub const COLOR_SECONDARY: usize = 1;

const STENCIL_IN_VOLUME: u8 = 0b001;
const STENCIL_PARITY: u8 = 0b010;
const STENCIL_TOUCHED: u8 = 0b100;

/// Per-tile working storage. Survives between region entries so `z_keep`
/// can continue a tile.
pub struct TileBuffers {
    pub depth: [[f32; TILE_PIXELS]; 3],
    pub tags: [[u32; TILE_PIXELS]; 2],
    pub tag_valid: [bool; TILE_PIXELS],
    pub stencil: [u8; TILE_PIXELS],
    pub color: [[u32; TILE_PIXELS]; 2],
    initialized: bool,
}

impl TileBuffers {
    pub fn new() -> Box<Self> {
        Box::new(Self {
            depth: [[0.0; TILE_PIXELS]; 3],
            tags: [[0; TILE_PIXELS]; 2],
            tag_valid: [false; TILE_PIXELS],
            stencil: [0; TILE_PIXELS],
            color: [[0; TILE_PIXELS]; 2],
            initialized: false,
        })
    }

    pub fn clear(&mut self, tag: u32, depth: f32, stencil: u8) {
        self.depth[DEPTH_A].fill(depth);
        self.tags[TAG_A].fill(tag);
        self.tag_valid.fill(true);
        self.stencil.fill(stencil);
    }

    pub fn invalidate_tags(&mut self) {
        self.tag_valid.fill(false);
    }

    pub fn set_tags_to_max(&mut self) {
        self.tags[TAG_A].fill(TAG_MAX);
    }

    /// Depth and tags of the last layer move to the reference buffers
    pub fn peel(&mut self, depth: f32, stencil: u8) {
        let [a, b, _] = &mut self.depth;
        b.copy_from_slice(&a[..]);
        a.fill(depth);

        let [ta, tb] = &mut self.tags;
        tb.copy_from_slice(&ta[..]);

        self.tag_valid.fill(false);
        self.stencil.fill(stencil);
    }

    pub fn save_depth(&mut self) {
        let [a, _, c] = &mut self.depth;
        c.copy_from_slice(&a[..]);
    }

    pub fn restore_depth(&mut self) {
        let [a, _, c] = &mut self.depth;
        a.copy_from_slice(&c[..]);
    }

    pub fn summarize_stencil_or(&mut self) {
        for s in self.stencil.iter_mut() {
            if (*s & STENCIL_TOUCHED) != 0 {
                *s |= *s >> 1;
                *s &= STENCIL_IN_VOLUME;
            }
        }
    }

    pub fn summarize_stencil_and(&mut self) {
        for s in self.stencil.iter_mut() {
            if (*s & STENCIL_TOUCHED) != 0 {
                *s &= *s >> 1;
                *s &= STENCIL_IN_VOLUME;
            }
        }
    }

    fn opaque_fragment(&mut self, index: usize, z: f32, tag: u32, isp: ISP_TSP) {
        if !depth_test(isp.depth_mode(), z, self.depth[DEPTH_A][index]) {
            return;
        }
        if !isp.z_write_dis() {
            self.depth[DEPTH_A][index] = z;
        }
        self.tags[TAG_A][index] = tag;
        self.tag_valid[index] = true;
    }

    fn modifier_fragment(&mut self, index: usize, z: f32) {
        if z >= self.depth[DEPTH_A][index] {
            self.stencil[index] ^= STENCIL_PARITY;
            self.stencil[index] |= STENCIL_TOUCHED;
        }
    }

    // Keeps the farthest fragment not yet drawn. Returns true if another pass is needed.
    fn autosort_fragment(&mut self, index: usize, z: f32, tag: u32) -> bool {
        let za = self.depth[DEPTH_A][index];
        let zb = self.depth[DEPTH_B][index];
        let tag_rendered = self.tags[TAG_B][index];
        let drawn_before = |tag: u32| (tag & TAG_SORT_MASK) <= (tag_rendered & TAG_SORT_MASK) && tag_rendered != TAG_MAX;

        if z > za {
            return true;
        }
        if z < zb {
            return false;
        }
        if z == zb && drawn_before(tag) {
            return false;
        }

        let mut more = false;
        if z == za && self.tag_valid[index] {
            let tag_pending = self.tags[TAG_A][index];
            if (tag & TAG_SORT_MASK) > (tag_pending & TAG_SORT_MASK) {
                return true;
            }
            more = true;
        } else if self.tag_valid[index] {
            more = true;
        }

        self.depth[DEPTH_A][index] = z;
        self.tags[TAG_A][index] = tag;
        self.tag_valid[index] = true;
        more
    }
}

/// Depth compare, `z` against the stored value. Depth is 1/w: greater is nearer.
#[inline(always)]
pub fn depth_test(mode: u32, z: f32, stored: f32) -> bool {
    match mode & 7 {
        0 => false,
        1 => z < stored,
        2 => z == stored,
        3 => z <= stored,
        4 => z > stored,
        5 => z != stored,
        6 => z >= stored,
        _ => true,
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct PlaneStepper3 {
    pub ddx: f32,
    pub ddy: f32,
    pub c: f32,
}

impl PlaneStepper3 {
    pub fn setup(v1: &Vertex, v2: &Vertex, v3: &Vertex, val1: f32, val2: f32, val3: f32) -> Self {
        let dx1 = v2.x - v1.x;
        let dx2 = v3.x - v1.x;
        let dy1 = v2.y - v1.y;
        let dy2 = v3.y - v1.y;
        let dv1 = val2 - val1;
        let dv2 = val3 - val1;

        let det = dx1 * dy2 - dx2 * dy1;
        let det_inv = if det.abs() < 0.0001 { 0.0 } else { 1.0 / det };

        let ddx = (dv1 * dy2 - dv2 * dy1) * det_inv;
        let ddy = (dv2 * dx1 - dv1 * dx2) * det_inv;

        PlaneStepper3 { ddx, ddy, c: val1 - ddx * v1.x - ddy * v1.y }
    }

    #[inline(always)]
    pub fn ip(&self, x: f32, y: f32) -> f32 {
        self.c + self.ddx * x + self.ddy * y
    }

    #[inline(always)]
    pub fn ip_u8(&self, x: f32, y: f32, w: f32) -> u8 {
        (self.ip(x, y) * w).clamp(0.0, 255.0) as u8
    }
}

/// Perspective-correct attribute planes of one primitive: each attribute is
/// interpolated as `attr * z` and multiplied by `w` per pixel.
#[derive(Copy, Clone, Debug, Default)]
pub struct InterpolatedParameters {
    pub inv_w: PlaneStepper3,
    pub col: [[PlaneStepper3; 4]; 2],
    pub ofs: [[PlaneStepper3; 4]; 2],
    pub u: [PlaneStepper3; 2],
    pub v: [PlaneStepper3; 2],
}

impl InterpolatedParameters {
    pub fn setup(block: &IspParamBlock) -> Self {
        let [v1, v2, v3, _] = &block.vertices;
        let plane = |f: &dyn Fn(&Vertex) -> f32| PlaneStepper3::setup(v1, v2, v3, f(v1) * v1.z, f(v2) * v2.z, f(v3) * v3.z);

        let mut rv = Self { inv_w: PlaneStepper3::setup(v1, v2, v3, v1.z, v2.z, v3.z), ..Default::default() };
        let gouraud = block.isp.gouraud();
        let volumes = if block.header.two_volumes() { 2 } else { 1 };

        for vol in 0..volumes {
            let col = move |v: &Vertex| if vol == 0 { v.col } else { v.col1 };
            let spc = move |v: &Vertex| if vol == 0 { v.spc } else { v.spc1 };

            rv.u[vol] = plane(&|v: &Vertex| if vol == 0 { v.u } else { v.u1 });
            rv.v[vol] = plane(&|v: &Vertex| if vol == 0 { v.v } else { v.v1 });

            for i in 0..4 {
                if gouraud {
                    rv.col[vol][i] = plane(&|v: &Vertex| col(v)[i] as f32);
                    rv.ofs[vol][i] = plane(&|v: &Vertex| spc(v)[i] as f32);
                } else {
                    // flat shading takes the colours of the last vertex
                    rv.col[vol][i] = plane(&|_: &Vertex| col(v3)[i] as f32);
                    rv.ofs[vol][i] = plane(&|_: &Vertex| spc(v3)[i] as f32);
                }
            }
        }

        rv
    }
}

#[derive(Copy, Clone, Debug)]
pub struct FpuEntry {
    pub block: IspParamBlock,
    pub ips: InterpolatedParameters,
}

impl FpuEntry {
    pub fn new(block: IspParamBlock) -> Self {
        Self { ips: InterpolatedParameters::setup(&block), block }
    }
}

/// Decoded primitives by tag, indexed by the low bits of the parameter offset
pub struct FpuCache {
    slots: Box<[Option<(u32, FpuEntry)>; 32]>,
}

impl FpuCache {
    pub fn new() -> Self {
        Self { slots: Box::new([None; 32]) }
    }

    pub fn clear(&mut self) {
        self.slots.fill(None);
    }

    pub fn get(&mut self, vram: &Vram, regs: &PvrRegs, tag: ISP_BACKGND_T_type) -> &FpuEntry {
        let slot = &mut self.slots[(tag.param_offs_in_words() & 31) as usize];
        if !matches!(slot, Some((t, _)) if *t == tag.full()) {
            *slot = None;
        }
        &slot.get_or_insert_with(|| (tag.full(), FpuEntry::new(decode_tag(vram, regs, tag)))).1
    }
}

impl Default for FpuCache {
    fn default() -> Self {
        Self::new()
    }
}

// Everything the TSP reads from the register file, latched once per tile
struct ShadeContext<'a> {
    sampler: Sampler<'a>,
    regs: &'a PvrRegs,
    shad_scale: FPU_SHAD_SCALE_type,
    text_control: u32,
}

impl<'a> ShadeContext<'a> {
    fn new(vram: &'a Vram, regs: &'a PvrRegs) -> Self {
        Self {
            sampler: Sampler::new(vram, regs),
            regs,
            shad_scale: regs.fpu_shad_scale(),
            text_control: regs.text_control(),
        }
    }
}

// Interpolate a colour for a pixel, scaled by `mult` / 256
#[inline(always)]
fn interpolate_color(planes: &[PlaneStepper3; 4], x: f32, y: f32, w: f32, mult: u32, scale_alpha: bool) -> Color {
    let ch = |p: &PlaneStepper3| (0.5 + p.ip_u8(x, y, w) as f32 * mult as f32 / 256.0) as u8;
    Color {
        b: ch(&planes[0]),
        g: ch(&planes[1]),
        r: ch(&planes[2]),
        a: if scale_alpha { ch(&planes[3]) } else { planes[3].ip_u8(x, y, w) },
    }
}

// Color combiner - combine base, texture, and offset colors
#[inline(always)]
fn color_combiner(base: Color, textel: Color, offset: Color, pp_texture: bool, pp_offset: bool, pp_shad_instr: u32) -> Color {
    if !pp_texture {
        return base;
    }

    let modulate = |t: u8, b: u8| (t as u32 * to_u8_256(b) / 256) as u8;

    let mut rv = match pp_shad_instr {
        // Decal
        0 => textel,
        // Modulate RGB, texture alpha
        1 => Color {
            b: modulate(textel.b, base.b),
            g: modulate(textel.g, base.g),
            r: modulate(textel.r, base.r),
            a: textel.a,
        },
        // Decal alpha
        2 => {
            let tb = to_u8_256(textel.a);
            let cb = 256 - tb;
            let mix = |t: u8, b: u8| ((t as u32 * tb + b as u32 * cb) / 256) as u8;
            Color {
                b: mix(textel.b, base.b),
                g: mix(textel.g, base.g),
                r: mix(textel.r, base.r),
                a: base.a,
            }
        }
        // Modulate alpha
        _ => Color {
            b: modulate(textel.b, base.b),
            g: modulate(textel.g, base.g),
            r: modulate(textel.r, base.r),
            a: modulate(textel.a, base.a),
        },
    };

    if pp_offset {
        rv.b = rv.b.saturating_add(offset.b);
        rv.g = rv.g.saturating_add(offset.g);
        rv.r = rv.r.saturating_add(offset.r);
    }

    rv
}

/// Fog alpha for a pixel depth from `FOG_DENSITY` and the 128 entry table
pub fn lookup_fog_table(regs: &PvrRegs, inv_w: f32) -> u8 {
    let fog_density = regs.fog_density().to_le_bytes();
    let fog_den_mant = fog_density[1] as f32 / 128.0;
    let fog_den_exp = fog_density[0] as i8;

    let fog_den = fog_den_mant * 2.0f32.powi(fog_den_exp as i32);
    let fog_w = (fog_den * inv_w).clamp(1.0, 255.999985);

    // table index from the float exponent and the top of the mantissa
    let fog_w_bits = fog_w.to_bits();
    let m = fog_w_bits & 0x7F_FFFF;
    let e = (fog_w_bits >> 23) & 0xFF;

    let index = (((e + 1) & 7) << 4) | ((m >> 19) & 15);
    let blend_factor = ((m >> 11) & 255) as u8;
    let blend_inv = 255 ^ blend_factor;

    let fog_entry = regs.fog_table()[index as usize].to_le_bytes();
    ((fog_entry[0] as u32 * to_u8_256(blend_factor) + fog_entry[1] as u32 * to_u8_256(blend_inv)) >> 8) as u8
}

#[inline(always)]
fn fog_mix(col: Color, fog: Color, alpha: u8) -> Color {
    let inv = to_u8_256(255 ^ alpha);
    let f = to_u8_256(alpha);
    let ch = |c: u8, k: u8| ((c as u32 * inv + k as u32 * f) >> 8) as u8;
    Color { b: ch(col.b, fog.b), g: ch(col.g, fog.g), r: ch(col.r, fog.r), a: col.a }
}

// Fog unit - apply color clamping and fog
fn fog_unit(regs: &PvrRegs, tsp: TSP, pp_offset: bool, mut col: Color, inv_w: f32, offs_a: u8) -> Color {
    if tsp.color_clamp() {
        let clamp_max = Color::from_raw(regs.fog_clamp_max());
        let clamp_min = Color::from_raw(regs.fog_clamp_min());

        col.b = col.b.min(clamp_max.b).max(clamp_min.b);
        col.g = col.g.min(clamp_max.g).max(clamp_min.g);
        col.r = col.r.min(clamp_max.r).max(clamp_min.r);
        col.a = col.a.min(clamp_max.a).max(clamp_min.a);
    }

    match tsp.fog_ctrl() {
        0b00 => fog_mix(col, Color::from_raw(regs.fog_col_ram()), lookup_fog_table(regs, inv_w)),
        0b11 => {
            // table mode 2: fog colour with the table alpha
            let ram = Color::from_raw(regs.fog_col_ram());
            Color { a: lookup_fog_table(regs, inv_w), ..ram }
        }
        0b01 if pp_offset => fog_mix(col, Color::from_raw(regs.fog_col_vert()), offs_a),
        _ => col,
    }
}

/// Runs the TSP for one pixel. Returns the colour and the TSP word that
/// selects its blending.
fn shade(ctx: &ShadeContext, entry: &FpuEntry, x: f32, y: f32, in_volume: bool) -> (Color, TSP) {
    let block = &entry.block;
    let ips = &entry.ips;

    let cheap_shadows = ctx.shad_scale.intensity_shadow();
    let vol = if in_volume && !cheap_shadows && block.header.two_volumes() { 1 } else { 0 };
    let mult = if cheap_shadows && in_volume { to_u8_256(ctx.shad_scale.scale_factor()) } else { 256 };

    let tsp = block.tsp[vol];
    let tcw = block.tcw[vol];
    let pp_texture = block.isp.texture();
    let pp_offset = pp_texture && block.isp.offset();

    let inv_w = ips.inv_w.ip(x, y);
    let w = if inv_w != 0.0 { 1.0 / inv_w } else { 0.0 };

    let mut base = interpolate_color(&ips.col[vol], x, y, w, mult, true);
    if !tsp.use_alpha() {
        base.a = 255;
    }

    let mut textel = Color::WHITE;
    let mut offset = Color::default();

    if pp_texture {
        let u = ips.u[vol].ip(x, y) * w;
        let v = ips.v[vol].ip(x, y) * w;
        let desc = TextureDescriptor::from_words(tsp, tcw, ctx.text_control);

        let (level, frac) = if desc.mipmapped {
            let ddx = ips.u[vol].ddx + ips.v[vol].ddx;
            let ddy = ips.u[vol].ddy + ips.v[vol].ddy;
            let footprint = ddx.abs().min(ddy.abs()) * w * desc.width as f32 * desc.mip_bias as f32 / 4.0;
            select_mip(footprint, desc.max_level())
        } else {
            (0, 0)
        };

        textel = ctx.sampler.sample(&desc, u, v, level, frac);

        if pp_offset {
            offset = interpolate_color(&ips.ofs[vol], x, y, w, mult, false);
        }
    }

    let col = color_combiner(base, textel, offset, pp_texture, pp_offset, tsp.shad_instr());
    (fog_unit(ctx.regs, tsp, pp_offset, col, inv_w, offset.a), tsp)
}

// Blending unit: source and destination can come from the secondary accumulator
fn blend_pixel(buffers: &mut TileBuffers, index: usize, col: Color, tsp: TSP, mode: usize) {
    let secondary = Color::from_raw(buffers.color[COLOR_SECONDARY][index]);
    let src = if tsp.src_select() { secondary } else { col };
    let dst_buf = if tsp.dst_select() { COLOR_SECONDARY } else { COLOR_PRIMARY };
    let dst = Color::from_raw(buffers.color[dst_buf][index]);

    buffers.color[dst_buf][index] = blend(mode, src, dst).to_raw();
}

#[inline(always)]
fn tsp_blend_mode(tsp: TSP) -> usize {
    blend_mode_index(tsp.src_instr(), tsp.dst_instr())
}

/// Calls `f(index, depth)` for every tile pixel whose ISP sample point lies
/// inside the primitive.
fn for_each_covered(block: &IspParamBlock, origin: (f32, f32), half: f32, mut f: impl FnMut(usize, f32)) {
    let edges = block.edges();

    for y in 0..TILE_SIZE {
        let py = origin.1 + y as f32 + half;
        for x in 0..TILE_SIZE {
            let px = origin.0 + x as f32 + half;
            if edges.iter().all(|e| e.inside(px, py)) {
                f((y * TILE_SIZE + x) as usize, block.depth.at(px, py));
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    SetupTile,
    WalkClass(ListClass),
    ResolvePixels(ListClass),
    FlushTile,
    Done,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Region array entries processed
    pub regions: u32,
    /// Tiles written to the frame buffer
    pub tiles: u32,
    /// Autosort passes over all tiles
    pub peel_passes: u32,
}

pub struct RenderCore {
    buffers: Box<TileBuffers>,
    cache: FpuCache,
    state: RenderState,
    region_ptr: u32,
    entry: RegionArrayEntry,
    lists: [Vec<TaggedPrimitive>; 5],
    first_peel: bool,
    tile_passes: u32,
    more_to_draw: bool,
    stats: RenderStats,
    max_regions: u32,
}

impl Default for RenderCore {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderCore {
    pub fn new() -> Self {
        Self {
            buffers: TileBuffers::new(),
            cache: FpuCache::new(),
            state: RenderState::Idle,
            region_ptr: 0,
            entry: RegionArrayEntry::default(),
            lists: Default::default(),
            first_peel: true,
            tile_passes: 0,
            more_to_draw: false,
            stats: RenderStats::default(),
            max_regions: u32::MAX,
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn buffers(&self) -> &TileBuffers {
        &self.buffers
    }

    /// Pipeline reset: drops the walk, keeps tile memory
    pub fn reset(&mut self) {
        self.state = RenderState::Idle;
        self.cache.clear();
        self.lists.iter_mut().for_each(Vec::clear);
    }

    /// Walks the region array at `REGION_BASE` to completion.
    pub fn render(&mut self, vram: &mut Vram, regs: &PvrRegs, max_regions: u32) -> RenderStats {
        self.begin(regs, max_regions);
        while !matches!(self.state, RenderState::Done | RenderState::Idle) {
            self.step(vram, regs);
        }
        log::debug!(
            "render: {} regions, {} tiles written, {} peel passes",
            self.stats.regions,
            self.stats.tiles,
            self.stats.peel_passes
        );
        self.stats
    }

    pub fn begin(&mut self, regs: &PvrRegs, max_regions: u32) {
        self.region_ptr = regs.region_base();
        self.max_regions = max_regions;
        self.stats = RenderStats::default();
        self.state = RenderState::SetupTile;
    }

    #[inline]
    fn origin(&self) -> (f32, f32) {
        (
            (self.entry.control.tilex() * TILE_SIZE) as f32,
            (self.entry.control.tiley() * TILE_SIZE) as f32,
        )
    }

    /// Performs the work of the current state and moves to the next one.
    pub fn step(&mut self, vram: &mut Vram, regs: &PvrRegs) -> RenderState {
        self.state = self.transition(vram, regs);
        self.state
    }

    fn transition(&mut self, vram: &mut Vram, regs: &PvrRegs) -> RenderState {
        match self.state {
            RenderState::Idle | RenderState::Done => self.state,
            RenderState::SetupTile => {
                self.setup_tile(vram, regs);
                RenderState::WalkClass(ListClass::Opaque)
            }
            RenderState::WalkClass(ListClass::Opaque) => {
                self.walk_opaque(regs);
                RenderState::WalkClass(ListClass::OpaqueMod)
            }
            RenderState::WalkClass(ListClass::OpaqueMod) => {
                self.walk_modifiers(ListClass::OpaqueMod, regs);
                RenderState::ResolvePixels(ListClass::Opaque)
            }
            RenderState::ResolvePixels(ListClass::Opaque) => {
                self.resolve(vram, regs, Some(blend_mode_index(BLEND_ONE, BLEND_ZERO)));
                self.buffers.save_depth();
                self.first_peel = true;
                if self.lists[ListClass::Trans.id() as usize].is_empty() {
                    RenderState::WalkClass(ListClass::PunchThrough)
                } else {
                    RenderState::WalkClass(ListClass::Trans)
                }
            }
            RenderState::WalkClass(ListClass::Trans) => {
                if self.entry.control.pre_sort() {
                    self.composite_presort(vram, regs);
                    self.buffers.restore_depth();
                    RenderState::WalkClass(ListClass::PunchThrough)
                } else {
                    self.walk_autosort(regs);
                    RenderState::WalkClass(ListClass::TransMod)
                }
            }
            RenderState::WalkClass(ListClass::TransMod) => {
                self.walk_modifiers(ListClass::TransMod, regs);
                RenderState::ResolvePixels(ListClass::Trans)
            }
            RenderState::ResolvePixels(ListClass::Trans) => {
                self.resolve(vram, regs, None);
                self.stats.peel_passes += 1;
                self.tile_passes += 1;
                if self.more_to_draw {
                    RenderState::WalkClass(ListClass::Trans)
                } else {
                    self.buffers.restore_depth();
                    RenderState::WalkClass(ListClass::PunchThrough)
                }
            }
            RenderState::WalkClass(ListClass::PunchThrough) => {
                self.composite_punch_through(vram, regs);
                RenderState::FlushTile
            }
            RenderState::ResolvePixels(_) => RenderState::FlushTile,
            RenderState::FlushTile => {
                if !self.entry.control.no_writeout() {
                    let (tx, ty) = (self.entry.control.tilex(), self.entry.control.tiley());
                    fb::write_tile(vram, regs, tx, ty, &self.buffers.color[COLOR_PRIMARY]);
                    self.stats.tiles += 1;
                }
                if self.entry.control.last_region() || self.stats.regions >= self.max_regions {
                    if !self.entry.control.last_region() {
                        log::warn!("render: region limit {} reached before the last region", self.max_regions);
                    }
                    RenderState::Done
                } else {
                    RenderState::SetupTile
                }
            }
        }
    }

    fn setup_tile(&mut self, vram: &Vram, regs: &PvrRegs) {
        let (entry, size) = read_region_array_entry(vram, regs, self.region_ptr);
        log::trace!(
            "TILE: {:08X} {:08X} {:08X} {:08X} {:08X} {:08X} {:08X}",
            self.region_ptr,
            entry.control.full(),
            entry.opaque.full(),
            entry.opaque_mod.full(),
            entry.trans.full(),
            entry.trans_mod.full(),
            entry.puncht.full()
        );
        self.region_ptr += size;
        self.entry = entry;
        self.stats.regions += 1;

        self.cache.clear();
        self.more_to_draw = false;
        self.tile_passes = 0;

        for class in ListClass::ALL {
            walk_object_list(vram, regs, entry.list(class.id()), &mut self.lists[class.id() as usize]);
        }

        let buffers = &mut self.buffers;
        if !buffers.initialized {
            buffers.depth[DEPTH_A].fill(0.0);
            buffers.invalidate_tags();
            buffers.stencil.fill(0);
            buffers.color.iter_mut().for_each(|c| c.fill(0));
            buffers.initialized = true;
        }

        if entry.control.z_keep() {
            buffers.invalidate_tags();
        } else {
            buffers.clear(regs.isp_backgnd_t().full(), regs.isp_backgnd_d(), 0);
        }
    }

    fn walk_opaque(&mut self, regs: &PvrRegs) {
        let origin = self.origin();
        let half = isp_half(regs);
        let buffers = &mut self.buffers;

        for prim in &self.lists[ListClass::Opaque.id() as usize] {
            for_each_covered(&prim.block, origin, half, |i, z| {
                buffers.opaque_fragment(i, z, prim.tag.full(), prim.block.isp)
            });
        }
    }

    fn walk_modifiers(&mut self, class: ListClass, regs: &PvrRegs) {
        let origin = self.origin();
        let half = isp_half(regs);
        let buffers = &mut self.buffers;

        for prim in &self.lists[class.id() as usize] {
            for_each_covered(&prim.block, origin, half, |i, z| buffers.modifier_fragment(i, z));

            let modvol = prim.block.modvol();
            if modvol.volume_last() {
                // instruction 2 closes an exclusion volume
                if modvol.depth_mode() == 2 {
                    buffers.summarize_stencil_and();
                } else {
                    buffers.summarize_stencil_or();
                }
            }
        }
    }

    fn walk_autosort(&mut self, regs: &PvrRegs) {
        let origin = self.origin();
        let half = isp_half(regs);
        let trans = &self.lists[ListClass::Trans.id() as usize];

        // every pass draws at least one layer of each pixel it touches
        if self.tile_passes > trans.len() as u32 + 1 {
            log::warn!("walk_autosort: layer peeling did not converge, dropping the rest");
            self.more_to_draw = false;
            self.buffers.invalidate_tags();
            return;
        }

        if self.first_peel {
            self.buffers.set_tags_to_max();
            self.first_peel = false;
        }
        self.buffers.peel(f32::MAX, 0);

        let buffers = &mut self.buffers;
        let mut more = false;
        for prim in trans {
            for_each_covered(&prim.block, origin, half, |i, z| {
                more |= buffers.autosort_fragment(i, z, prim.tag.full());
            });
        }
        self.more_to_draw = more;
    }

    // Shades every valid tag. `forced_mode` overrides the TSP blend factors.
    fn resolve(&mut self, vram: &Vram, regs: &PvrRegs, forced_mode: Option<usize>) {
        let (ox, oy) = self.origin();
        let half = tsp_half(regs);
        let ctx = ShadeContext::new(vram, regs);
        let RenderCore { buffers, cache, .. } = self;

        for index in 0..TILE_PIXELS {
            if !buffers.tag_valid[index] {
                continue;
            }

            let tag = ISP_BACKGND_T_type(buffers.tags[TAG_A][index]);
            let in_volume = (buffers.stencil[index] & STENCIL_IN_VOLUME) != 0 && tag.shadow();
            let entry = cache.get(vram, regs, tag);

            let x = ox + (index as u32 % TILE_SIZE) as f32 + half;
            let y = oy + (index as u32 / TILE_SIZE) as f32 + half;
            let (col, tsp) = shade(&ctx, entry, x, y, in_volume);
            blend_pixel(buffers, index, col, tsp, forced_mode.unwrap_or_else(|| tsp_blend_mode(tsp)));
        }
    }

    fn composite_presort(&mut self, vram: &Vram, regs: &PvrRegs) {
        if !self.lists[ListClass::TransMod.id() as usize].is_empty() {
            log::trace!("composite_presort: translucent modifier volumes ignored in presort mode");
        }
        self.composite_immediate(vram, regs, ListClass::Trans);
    }

    fn composite_punch_through(&mut self, vram: &Vram, regs: &PvrRegs) {
        self.composite_immediate(vram, regs, ListClass::PunchThrough);
    }

    // Shades primitives as they are rasterized, in submission order
    fn composite_immediate(&mut self, vram: &Vram, regs: &PvrRegs, class: ListClass) {
        let origin = self.origin();
        let isp_half = isp_half(regs);
        let tsp_half = tsp_half(regs);
        let punch_through = class == ListClass::PunchThrough;
        let alpha_ref = regs.pt_alpha_ref();
        let ctx = ShadeContext::new(vram, regs);
        let buffers = &mut self.buffers;

        for prim in &self.lists[class.id() as usize] {
            let entry = FpuEntry::new(prim.block);
            let isp = prim.block.isp;
            let mode = if punch_through { 6 } else { isp.depth_mode() };

            for_each_covered(&prim.block, origin, isp_half, |i, z| {
                if !depth_test(mode, z, buffers.depth[DEPTH_A][i]) {
                    return;
                }

                let x = origin.0 + (i as u32 % TILE_SIZE) as f32 + tsp_half;
                let y = origin.1 + (i as u32 / TILE_SIZE) as f32 + tsp_half;
                let (mut col, tsp) = shade(&ctx, &entry, x, y, false);

                if punch_through {
                    if col.a < alpha_ref {
                        return;
                    }
                    col.a = 255;
                }

                blend_pixel(buffers, i, col, tsp, tsp_blend_mode(tsp));
                if punch_through || !isp.z_write_dis() {
                    buffers.depth[DEPTH_A][i] = z;
                }
            });
        }
    }
}

#[inline]
fn isp_half(regs: &PvrRegs) -> f32 {
    if regs.half_offset().fpu_pixel_half_offset() { 0.5 } else { 0.0 }
}

#[inline]
fn tsp_half(regs: &PvrRegs) -> f32 {
    if regs.half_offset().tsp_pixel_half_offset() { 0.5 } else { 0.0 }
}
