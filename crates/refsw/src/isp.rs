/*
    This file is part of libswirl
*/
// #include "license/bsd"

//! Triangle setup and the packed ISP parameter block.
//!
//! The TA runs `setup` on every assembled primitive, drops the culled ones
//! and serializes the rest as an `IspParamBlock` into parameter memory. The
//! render core reads the same blocks back through `deserialize`; nothing
//! else knows the packed layout.

use crate::pvr_mem::Vram;
use crate::types::{Vertex, ISP_Modvol, ISP_TSP, TCW, TSP};
use bitfield::bitfield;

pub const LIST_OPAQUE: u32 = 0;
pub const LIST_OPAQUE_MOD: u32 = 1;
pub const LIST_TRANS: u32 = 2;
pub const LIST_TRANS_MOD: u32 = 3;
pub const LIST_PUNCH_THROUGH: u32 = 4;

bitfield! {
    /// Second word of every parameter block
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct ParamHeader(u32);
    impl Debug;

    pub quad, set_quad: 0;
    pub two_volumes, set_two_volumes: 1;
    pub skip, set_skip: 4, 2;
    pub list_id, set_list_id: 7, 5;
    pub tile_min_y, set_tile_min_y: 13, 8;
    pub tile_max_y, set_tile_max_y: 19, 14;
}

impl ParamHeader {
    #[inline]
    pub const fn full(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_modifier(&self) -> bool {
        matches!(self.list_id(), LIST_OPAQUE_MOD | LIST_TRANS_MOD)
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        if self.quad() { 4 } else { 3 }
    }
}

/// `a·x + b·y + c`, non-negative on the inside of the primitive
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct EdgeEquation {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

impl EdgeEquation {
    /// Edge from `p` to `q`; positive to the left for positive determinants
    pub fn between(p: &Vertex, q: &Vertex) -> Self {
        Self {
            a: p.y - q.y,
            b: q.x - p.x,
            c: p.x * q.y - q.x * p.y,
        }
    }

    #[inline(always)]
    pub fn eval(&self, x: f32, y: f32) -> f32 {
        self.a * x + self.b * y + self.c
    }

    /// Pixels exactly on a top or left edge belong to the primitive
    #[inline(always)]
    pub fn is_top_left(&self) -> bool {
        self.a > 0.0 || (self.a == 0.0 && self.b > 0.0)
    }

    #[inline(always)]
    pub fn inside(&self, x: f32, y: f32) -> bool {
        let e = self.eval(x, y);
        e > 0.0 || (e == 0.0 && self.is_top_left())
    }

    fn negated(self) -> Self {
        Self { a: -self.a, b: -self.b, c: -self.c }
    }
}

/// `depth(x, y) = a·x + b·y + c` in absolute pixel coordinates
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PlaneEquation {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

impl PlaneEquation {
    pub const fn constant(c: f32) -> Self {
        Self { a: 0.0, b: 0.0, c }
    }

    #[inline(always)]
    pub fn at(&self, x: f32, y: f32) -> f32 {
        self.a * x + self.b * y + self.c
    }
}

/// Screen-space bounding box of a primitive
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScreenRect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl ScreenRect {
    pub fn of(vertices: &[Vertex]) -> Self {
        let mut rv = Self {
            min_x: f32::MAX,
            min_y: f32::MAX,
            max_x: f32::MIN,
            max_y: f32::MIN,
        };
        for v in vertices {
            rv.min_x = rv.min_x.min(v.x);
            rv.min_y = rv.min_y.min(v.y);
            rv.max_x = rv.max_x.max(v.x);
            rv.max_y = rv.max_y.max(v.y);
        }
        rv
    }

    pub fn union(&self, other: &ScreenRect) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IspSetup {
    pub edges: [EdgeEquation; 4],
    pub edge_count: usize,
    pub depth: PlaneEquation,
    pub det: f32,
}

impl IspSetup {
    /// Setup whose edges cover no pixel
    pub fn empty() -> Self {
        Self {
            edges: [EdgeEquation::default(); 4],
            edge_count: 3,
            depth: PlaneEquation::default(),
            det: 0.0,
        }
    }
}

// Flush NaN values to zero
#[inline(always)]
fn flush_nan(a: f32) -> f32 {
    if a.is_nan() { 0.0 } else { a }
}

/// `(x1-x0)(y2-y0) - (y1-y0)(x2-x0)` over the first three vertices
#[inline]
pub fn determinant(v: &[Vertex]) -> f32 {
    (v[1].x - v[0].x) * (v[2].y - v[0].y) - (v[1].y - v[0].y) * (v[2].x - v[0].x)
}

/// Returns true when the primitive must be dropped.
pub fn is_culled(det: f32, cull_mode: u32, cull_threshold: f32) -> bool {
    match cull_mode & 3 {
        0 => false,
        1 => det.abs() <= cull_threshold,
        2 => det <= 0.0 || det.abs() <= cull_threshold,
        _ => det >= 0.0 || det.abs() <= cull_threshold,
    }
}

/// Edge and depth setup for a triangle or quad. `None` means culled.
pub fn setup(vertices: &[Vertex], cull_mode: u32, cull_threshold: f32, perp_threshold: f32) -> Option<IspSetup> {
    let count = vertices.len().clamp(3, 4);
    let mut v = [Vertex::default(); 4];
    for (dst, src) in v.iter_mut().zip(vertices.iter()) {
        *dst = Vertex {
            x: flush_nan(src.x),
            y: flush_nan(src.y),
            z: flush_nan(src.z),
            ..*src
        };
    }

    let det = determinant(&v);
    if is_culled(det, cull_mode, cull_threshold) {
        return None;
    }

    let mut edges = [EdgeEquation::default(); 4];
    for i in 0..count {
        let e = EdgeEquation::between(&v[i], &v[(i + 1) % count]);
        edges[i] = if det < 0.0 { e.negated() } else { e };
    }

    let depth = if det.abs() <= perp_threshold || det == 0.0 {
        PlaneEquation::constant(v[..count].iter().map(|v| v.z).sum::<f32>() / count as f32)
    } else {
        let dx1 = v[1].x - v[0].x;
        let dy1 = v[1].y - v[0].y;
        let dx2 = v[2].x - v[0].x;
        let dy2 = v[2].y - v[0].y;
        let dz1 = v[1].z - v[0].z;
        let dz2 = v[2].z - v[0].z;

        let a = (dz1 * dy2 - dz2 * dy1) / det;
        let b = (dz2 * dx1 - dz1 * dx2) / det;
        PlaneEquation { a, b, c: v[0].z - a * v[0].x - b * v[0].y }
    };

    Some(IspSetup { edges, edge_count: count, depth, det })
}

/// Attribute words per vertex and volume for the given ISP word
pub fn skip_words(isp: ISP_TSP) -> u32 {
    let uv = if isp.texture() { if isp.uv_16b() { 1 } else { 2 } } else { 0 };
    let offset = if isp.texture() && isp.offset() { 1 } else { 0 };
    uv + 1 + offset
}

#[inline]
pub fn f16(v: u16) -> f32 {
    f32::from_bits((v as u32) << 16)
}

#[inline]
fn to_f16(v: f32) -> u16 {
    (v.to_bits() >> 16) as u16
}

#[inline(always)]
fn put(vram: &mut Vram, ptr: &mut u32, word: u32) {
    vram.write32(*ptr, word);
    *ptr += 4;
}

/// One primitive as stored in parameter memory
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IspParamBlock {
    /// ISP/TSP word, or the modifier word for volume lists
    pub isp: ISP_TSP,
    pub header: ParamHeader,
    pub tsp: [TSP; 2],
    pub tcw: [TCW; 2],
    pub edges: [EdgeEquation; 4],
    pub depth: PlaneEquation,
    pub vertices: [Vertex; 4],
}

impl Default for IspParamBlock {
    fn default() -> Self {
        Self {
            isp: ISP_TSP(0),
            header: ParamHeader(0),
            tsp: [TSP(0); 2],
            tcw: [TCW(0); 2],
            edges: [EdgeEquation::default(); 4],
            depth: PlaneEquation::default(),
            vertices: [Vertex::default(); 4],
        }
    }
}

impl IspParamBlock {
    pub fn new(isp: ISP_TSP, list_id: u32, two_volumes: bool, vertices: &[Vertex], setup: &IspSetup) -> Self {
        let mut rv = Self { isp, ..Default::default() };
        rv.header.set_quad(setup.edge_count == 4);
        rv.header.set_list_id(list_id);

        if rv.header.is_modifier() {
            rv.header.set_skip(0);
        } else {
            rv.header.set_two_volumes(two_volumes);
            rv.header.set_skip(skip_words(isp));
        }

        rv.edges = setup.edges;
        rv.depth = setup.depth;
        for (dst, src) in rv.vertices.iter_mut().zip(vertices.iter()) {
            *dst = *src;
        }
        rv
    }

    #[inline]
    pub fn modvol(&self) -> ISP_Modvol {
        ISP_Modvol(self.isp.full())
    }

    #[inline]
    pub fn edges(&self) -> &[EdgeEquation] {
        &self.edges[..self.header.vertex_count()]
    }

    #[inline]
    fn volumes(&self) -> u32 {
        if self.header.two_volumes() { 2 } else { 1 }
    }

    pub fn vertex_words(&self) -> u32 {
        3 + self.header.skip() * self.volumes()
    }

    /// Size of the serialized block in words
    pub fn size_words(&self) -> u32 {
        let n = self.header.vertex_count() as u32;
        let tsp_words = if self.header.is_modifier() { 0 } else { 2 * self.volumes() };
        2 + tsp_words + n * 3 + 3 + n * self.vertex_words()
    }

    fn write_attrs(&self, vram: &mut Vram, ptr: &mut u32, uv: (f32, f32), col: [u8; 4], spc: [u8; 4]) {
        if self.isp.texture() {
            if self.isp.uv_16b() {
                put(vram, ptr, ((to_f16(uv.0) as u32) << 16) | to_f16(uv.1) as u32);
            } else {
                put(vram, ptr, uv.0.to_bits());
                put(vram, ptr, uv.1.to_bits());
            }
        }

        put(vram, ptr, u32::from_le_bytes(col));

        if self.isp.texture() && self.isp.offset() {
            put(vram, ptr, u32::from_le_bytes(spc));
        }
    }

    fn read_attrs(&self, vram: &Vram, mut ptr: u32) -> (u32, (f32, f32), [u8; 4], [u8; 4]) {
        let mut uv = (0.0, 0.0);
        let mut spc = [0u8; 4];

        if self.isp.texture() {
            if self.isp.uv_16b() {
                let packed = vram.read32(ptr);
                uv = (f16((packed >> 16) as u16), f16((packed & 0xFFFF) as u16));
                ptr += 4;
            } else {
                uv = (vram.read_f32(ptr), vram.read_f32(ptr + 4));
                ptr += 8;
            }
        }

        let col = vram.read32(ptr).to_le_bytes();
        ptr += 4;

        if self.isp.texture() && self.isp.offset() {
            spc = vram.read32(ptr).to_le_bytes();
            ptr += 4;
        }
        (ptr, uv, col, spc)
    }

    /// Writes the block at `addr` (32 bit path). Returns the words written.
    pub fn serialize(&self, vram: &mut Vram, addr: u32) -> u32 {
        let mut ptr = addr;

        put(vram, &mut ptr, self.isp.full());
        put(vram, &mut ptr, self.header.full());

        if !self.header.is_modifier() {
            for vol in 0..self.volumes() as usize {
                put(vram, &mut ptr, self.tsp[vol].full());
                put(vram, &mut ptr, self.tcw[vol].full());
            }
        }

        for e in self.edges() {
            put(vram, &mut ptr, e.a.to_bits());
            put(vram, &mut ptr, e.b.to_bits());
            put(vram, &mut ptr, e.c.to_bits());
        }
        put(vram, &mut ptr, self.depth.a.to_bits());
        put(vram, &mut ptr, self.depth.b.to_bits());
        put(vram, &mut ptr, self.depth.c.to_bits());

        for v in &self.vertices[..self.header.vertex_count()] {
            put(vram, &mut ptr, v.x.to_bits());
            put(vram, &mut ptr, v.y.to_bits());
            put(vram, &mut ptr, v.z.to_bits());
            if self.header.is_modifier() {
                continue;
            }
            self.write_attrs(vram, &mut ptr, (v.u, v.v), v.col, v.spc);
            if self.header.two_volumes() {
                self.write_attrs(vram, &mut ptr, (v.u1, v.v1), v.col1, v.spc1);
            }
        }

        (ptr - addr) / 4
    }

    pub fn deserialize(vram: &Vram, addr: u32) -> Self {
        let mut rv = Self {
            isp: ISP_TSP(vram.read32(addr)),
            header: ParamHeader(vram.read32(addr + 4)),
            ..Default::default()
        };
        let mut ptr = addr + 8;

        if !rv.header.is_modifier() {
            for vol in 0..rv.volumes() as usize {
                rv.tsp[vol] = TSP(vram.read32(ptr));
                rv.tcw[vol] = TCW(vram.read32(ptr + 4));
                ptr += 8;
            }
        }

        let n = rv.header.vertex_count();
        for i in 0..n {
            rv.edges[i] = EdgeEquation {
                a: vram.read_f32(ptr),
                b: vram.read_f32(ptr + 4),
                c: vram.read_f32(ptr + 8),
            };
            ptr += 12;
        }
        rv.depth = PlaneEquation {
            a: vram.read_f32(ptr),
            b: vram.read_f32(ptr + 4),
            c: vram.read_f32(ptr + 8),
        };
        ptr += 12;

        for i in 0..n {
            let mut v = Vertex::at(vram.read_f32(ptr), vram.read_f32(ptr + 4), vram.read_f32(ptr + 8));
            ptr += 12;
            if !rv.header.is_modifier() {
                let (next, uv, col, spc) = rv.read_attrs(vram, ptr);
                (ptr, v.u, v.v, v.col, v.spc) = (next, uv.0, uv.1, col, spc);
                if rv.header.two_volumes() {
                    let (next, uv, col, spc) = rv.read_attrs(vram, ptr);
                    (ptr, v.u1, v.v1, v.col1, v.spc1) = (next, uv.0, uv.1, col, spc);
                }
            }
            rv.vertices[i] = v;
        }

        rv
    }
}

/// Builds the block a background tag points at: a flat, untextured
/// rectangle covering the whole tile space at constant depth.
pub fn background_block(isp: ISP_TSP, tsp: TSP, argb: u32, depth: f32) -> IspParamBlock {
    let mut isp = isp;
    isp.set_texture(false);
    isp.set_offset(false);
    isp.set_uv_16b(false);

    let corners = [(0.0, 0.0), (2048.0, 0.0), (2048.0, 2048.0), (0.0, 2048.0)];
    let mut vertices = [Vertex::default(); 4];
    for (v, (x, y)) in vertices.iter_mut().zip(corners) {
        *v = Vertex::at(x, y, depth);
        v.set_base_argb(argb);
    }

    let mut setup = setup(&vertices, 0, 0.0, 0.0).unwrap_or(IspSetup {
        edges: [EdgeEquation::default(); 4],
        edge_count: 4,
        depth: PlaneEquation::default(),
        det: 0.0,
    });
    setup.depth = PlaneEquation::constant(depth);

    let mut rv = IspParamBlock::new(isp, LIST_OPAQUE, false, &vertices, &setup);
    rv.tsp[0] = tsp;
    rv
}
