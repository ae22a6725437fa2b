//! Tile accelerator front end.
//!
//! Host packets arrive one 32 bit word at a time. The first word of a packet
//! (its PCW) together with the latched header decides whether the packet is
//! 8 or 16 words long. Complete packets are decoded into vertices, assembled
//! into triangles, quads or modifier volume triangles, set up and handed to
//! the object list builder.

use refsw::isp::{self, IspParamBlock, IspSetup, ScreenRect};
use refsw::lists::ListClass;
use refsw::pvr_regs::{PvrRegs, TA_ISP_CURRENT_ADDR, TA_NEXT_OPB_ADDR};
use refsw::types::{ISP_Modvol, ISP_TSP, PCW, TCW, TSP, Vertex};
use refsw::Vram;

use crate::asic::{Interrupt, InterruptSink};
use crate::object_list::{ObjectListBuilder, TileRect, UserClip};

pub const PARA_END_OF_LIST: u32 = 0;
pub const PARA_USER_TILE_CLIP: u32 = 1;
pub const PARA_OBJECT_LIST_SET: u32 = 2;
pub const PARA_POLYGON: u32 = 4;
pub const PARA_SPRITE: u32 = 5;
pub const PARA_VERTEX: u32 = 7;

const STRIP_LENGTHS: [usize; 4] = [3, 4, 6, 8];

/// Everything a packet may touch while it is processed
pub struct TaBus<'a> {
    pub vram: &'a mut Vram,
    pub regs: &'a mut PvrRegs,
    pub irq: &'a mut dyn InterruptSink,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColourMode {
    Packed,
    Float,
    Intensity,
    /// Intensity against the previous header's face colours
    LastIntensity,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VertexFormat {
    pub colour: ColourMode,
    pub textured: bool,
    pub uv16: bool,
    pub offset: bool,
    pub two_volumes: bool,
}

impl VertexFormat {
    pub const PACKED: VertexFormat = VertexFormat {
        colour: ColourMode::Packed,
        textured: false,
        uv16: false,
        offset: false,
        two_volumes: false,
    };

    pub fn from_pcw(pcw: PCW) -> Self {
        let textured = pcw.texture();
        let two_volumes = pcw.shadow() && pcw.volume();
        let colour = match pcw.col_type() {
            0 => ColourMode::Packed,
            1 if two_volumes => ColourMode::LastIntensity,
            1 => ColourMode::Float,
            2 => ColourMode::Intensity,
            _ => ColourMode::LastIntensity,
        };

        Self {
            colour,
            textured,
            uv16: textured && pcw.uv_16bit(),
            offset: textured && pcw.offset(),
            two_volumes,
        }
    }

    #[inline]
    pub fn is_intensity(&self) -> bool {
        matches!(self.colour, ColourMode::Intensity | ColourMode::LastIntensity)
    }

    /// Intensity headers carry a second block when they need two face colours
    pub fn header_words(&self) -> usize {
        if self.colour == ColourMode::Intensity && (self.two_volumes || self.offset) { 16 } else { 8 }
    }

    pub fn vertex_words(&self) -> usize {
        if self.textured && (self.two_volumes || self.colour == ColourMode::Float) { 16 } else { 8 }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketShape {
    EndOfList,
    UserTileClip,
    ObjectListSet,
    PolygonHeader(VertexFormat),
    SpriteHeader,
    ModifierHeader,
    Vertex(VertexFormat),
    SpriteVertex,
    ModifierVertex,
    Unknown,
}

impl PacketShape {
    pub fn words(&self) -> usize {
        match self {
            PacketShape::PolygonHeader(fmt) => fmt.header_words(),
            PacketShape::Vertex(fmt) => fmt.vertex_words(),
            PacketShape::SpriteVertex | PacketShape::ModifierVertex => 16,
            _ => 8,
        }
    }
}

#[inline]
fn ta_is_inf(value: f32) -> bool {
    value.is_infinite() && value.is_sign_positive()
}

/// ARGB floats in 0..1 to packed ARGB8888
pub fn parse_float_colour(a: f32, r: f32, g: f32, b: f32) -> u32 {
    let conv = |component: f32| -> u32 {
        if ta_is_inf(component) {
            return 255;
        }
        let v = 256.0 * component.clamp(0.0, 1.0) - 1.0;
        if v.is_nan() { 0 } else { (v as i32).clamp(0, 255) as u32 }
    };

    (conv(a) << 24) | (conv(r) << 16) | (conv(g) << 8) | conv(b)
}

/// Scales the RGB channels of a face colour, alpha is kept
pub fn parse_intensity_colour(base: u32, intensity: f32) -> u32 {
    let i = (256.0 * intensity.clamp(0.0, 1.0)) as u32;
    (((((base & 0xFF) * i) & 0xFF00) | (((base & 0xFF00) * i) & 0xFF_0000) | (((base & 0xFF_0000) * i) & 0xFF00_0000))
        >> 8)
        | (base & 0xFF00_0000)
}

fn float_colour(w: &[u32]) -> u32 {
    parse_float_colour(
        f32::from_bits(w[0]),
        f32::from_bits(w[1]),
        f32::from_bits(w[2]),
        f32::from_bits(w[3]),
    )
}

#[inline]
fn unpack_uv16(w: u32) -> (f32, f32) {
    (isp::f16((w >> 16) as u16), isp::f16((w & 0xFFFF) as u16))
}

#[derive(Copy, Clone, Debug)]
struct PolygonContext {
    isp: ISP_TSP,
    tsp: [TSP; 2],
    tcw: [TCW; 2],
    format: VertexFormat,
    shadow: bool,
}

#[derive(Copy, Clone, Debug)]
struct SpriteContext {
    isp: ISP_TSP,
    tsp: TSP,
    tcw: TCW,
    base: u32,
    offset: u32,
    shadow: bool,
}

#[derive(Copy, Clone, Debug)]
struct ModifierContext {
    word: ISP_Modvol,
    /// Triangles under this header close the volume
    last: bool,
}

#[derive(Copy, Clone, Debug)]
enum Context {
    Polygon(PolygonContext),
    Sprite(SpriteContext),
    Modifier(ModifierContext),
}

// The final triangle of a volume is only known once the next header or the
// end of the list shows up, so the newest triangle of a closing group is held back.
// Face colours latched by intensity headers. Offset intensities always scale
// `offset`, which only offset headers update.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct FaceColours {
    base: [u32; 2],
    offset: u32,
}

#[derive(Clone, Debug, Default)]
struct ModvolState {
    last: bool,
    bounds: Option<TileRect>,
    held: Option<IspParamBlock>,
    // Word of the closing group, set even when all of its triangles are culled
    closing: Option<ISP_Modvol>,
}

pub struct TileAccelerator {
    packet: [u32; 16],
    len: usize,
    shape: PacketShape,
    list: Option<ListClass>,
    context: Option<Context>,
    strip: [Vertex; 8],
    strip_count: usize,
    strip_len: usize,
    parity: bool,
    clip_mode: u32,
    clip_rect: TileRect,
    face: FaceColours,
    modvol: ModvolState,
    builder: ObjectListBuilder,
}

impl Default for TileAccelerator {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_textured_volume(v: &mut Vertex, vol: usize, w: &[u32], fmt: &VertexFormat, face: &FaceColours) {
    let uv = if fmt.uv16 { unpack_uv16(w[0]) } else { (f32::from_bits(w[0]), f32::from_bits(w[1])) };
    let (base, offset) = if fmt.is_intensity() {
        (
            parse_intensity_colour(face.base[vol], f32::from_bits(w[2])),
            parse_intensity_colour(face.offset, f32::from_bits(w[3])),
        )
    } else {
        (w[2], w[3])
    };
    let offset = if fmt.offset { offset } else { 0 };

    if vol == 0 {
        (v.u, v.v) = uv;
        v.set_base_argb(base);
        v.set_offset_argb(offset);
    } else {
        (v.u1, v.v1) = uv;
        v.col1 = base.to_le_bytes();
        v.spc1 = offset.to_le_bytes();
    }
}

fn decode_vertex(fmt: &VertexFormat, w: &[u32], face: &FaceColours) -> Vertex {
    let f = |i: usize| f32::from_bits(w[i]);
    let mut v = Vertex::at(f(1), f(2), f(3));

    if fmt.two_volumes {
        if fmt.textured {
            decode_textured_volume(&mut v, 0, &w[4..8], fmt, face);
            decode_textured_volume(&mut v, 1, &w[8..12], fmt, face);
        } else if fmt.is_intensity() {
            v.set_base_argb(parse_intensity_colour(face.base[0], f(4)));
            v.col1 = parse_intensity_colour(face.base[1], f(5)).to_le_bytes();
        } else {
            v.set_base_argb(w[4]);
            v.col1 = w[5].to_le_bytes();
        }
        return v;
    }

    if fmt.textured {
        (v.u, v.v) = if fmt.uv16 { unpack_uv16(w[4]) } else { (f(4), f(5)) };
        let (base, offset) = match fmt.colour {
            ColourMode::Packed => (w[6], w[7]),
            ColourMode::Float => (float_colour(&w[8..12]), float_colour(&w[12..16])),
            _ => (parse_intensity_colour(face.base[0], f(6)), parse_intensity_colour(face.offset, f(7))),
        };
        v.set_base_argb(base);
        if fmt.offset {
            v.set_offset_argb(offset);
        }
    } else {
        let base = match fmt.colour {
            ColourMode::Packed => w[6],
            ColourMode::Float => float_colour(&w[4..8]),
            _ => parse_intensity_colour(face.base[0], f(6)),
        };
        v.set_base_argb(base);
    }
    v
}

impl TileAccelerator {
    pub fn new() -> Self {
        Self {
            packet: [0; 16],
            len: 0,
            shape: PacketShape::Unknown,
            list: None,
            context: None,
            strip: [Vertex::default(); 8],
            strip_count: 0,
            strip_len: 3,
            parity: false,
            clip_mode: 0,
            clip_rect: TileRect { x1: 0, y1: 0, x2: 0, y2: 0 },
            face: FaceColours::default(),
            modvol: ModvolState::default(),
            builder: ObjectListBuilder::new(),
        }
    }

    /// Soft reset: drops any partial packet and the open list
    pub fn reset(&mut self) {
        self.len = 0;
        self.shape = PacketShape::Unknown;
        self.list = None;
        self.context = None;
        self.strip_count = 0;
        self.strip_len = 3;
        self.parity = false;
        self.clip_mode = 0;
        self.modvol = ModvolState::default();
        self.builder.close();
    }

    /// `TA_LIST_INIT`: rewinds parameter and OPB allocation and starts a new frame
    pub fn list_init(&mut self, bus: &mut TaBus<'_>) {
        let isp_base = bus.regs.ta_isp_base();
        let opb_init = bus.regs.ta_next_opb_init();
        bus.regs.write(TA_ISP_CURRENT_ADDR, isp_base);
        bus.regs.write(TA_NEXT_OPB_ADDR, opb_init);
        self.builder.init(bus.regs);
        self.reset();
        log::debug!("TA: list init, params at {:08X}, OPBs from {:08X}", isp_base, opb_init);
    }

    /// `TA_LIST_CONT`: accepts further lists into the current frame
    pub fn list_continue(&mut self) {
        self.reset();
    }

    #[inline]
    pub fn list(&self) -> Option<ListClass> {
        self.list
    }

    pub fn builder(&self) -> &ObjectListBuilder {
        &self.builder
    }

    pub fn write_region_array(&self, vram: &mut Vram, regs: &PvrRegs, pre_sort: bool) -> u32 {
        self.builder.write_region_array(vram, regs, pre_sort)
    }

    pub fn submit_word(&mut self, word: u32, bus: &mut TaBus<'_>) {
        self.packet[self.len] = word;
        self.len += 1;

        if self.len == 1 {
            self.shape = self.classify(PCW::from(word));
        }

        let words = self.shape.words();
        if self.len == words {
            self.len = 0;
            let packet = self.packet;
            self.process(&packet[..words], bus);
        }
    }

    pub fn submit(&mut self, words: &[u32], bus: &mut TaBus<'_>) {
        for &w in words {
            self.submit_word(w, bus);
        }
    }

    fn classify(&self, pcw: PCW) -> PacketShape {
        match pcw.para_type() {
            PARA_END_OF_LIST => PacketShape::EndOfList,
            PARA_USER_TILE_CLIP => PacketShape::UserTileClip,
            PARA_OBJECT_LIST_SET => PacketShape::ObjectListSet,
            PARA_POLYGON => {
                let list = self.list.or_else(|| ListClass::from_id(pcw.list_type()));
                if list.is_some_and(ListClass::is_modifier) {
                    PacketShape::ModifierHeader
                } else {
                    PacketShape::PolygonHeader(VertexFormat::from_pcw(pcw))
                }
            }
            PARA_SPRITE => PacketShape::SpriteHeader,
            PARA_VERTEX => match &self.context {
                Some(Context::Polygon(ctx)) => PacketShape::Vertex(ctx.format),
                Some(Context::Sprite(_)) => PacketShape::SpriteVertex,
                Some(Context::Modifier(_)) => PacketShape::ModifierVertex,
                None => PacketShape::Vertex(VertexFormat::PACKED),
            },
            _ => PacketShape::Unknown,
        }
    }

    fn illegal(&mut self, bus: &mut TaBus<'_>, what: &str) {
        log::debug!("TA: {}", what);
        bus.irq.raise(Interrupt::TaIllegalParam);
    }

    fn process(&mut self, words: &[u32], bus: &mut TaBus<'_>) {
        let pcw = PCW::from(words[0]);
        log::trace!("TA: {:?} pcw {:08X}", self.shape, words[0]);

        match self.shape {
            PacketShape::EndOfList => self.end_list(bus),
            PacketShape::UserTileClip => {
                self.clip_rect = TileRect::from_words(&words[4..8], self.builder.width(), self.builder.height());
            }
            PacketShape::ObjectListSet => {
                if self.list.is_none() {
                    self.illegal(bus, "object list set outside of a list");
                    return;
                }
                let rect = TileRect::from_words(&words[4..8], self.builder.width(), self.builder.height());
                self.builder.insert_raw(words[1], rect, bus);
            }
            PacketShape::PolygonHeader(format) => {
                if self.begin_header(pcw, bus) {
                    self.parse_polygon_header(pcw, format, words);
                }
            }
            PacketShape::SpriteHeader => {
                if self.begin_header(pcw, bus) {
                    self.parse_sprite_header(pcw, words);
                }
            }
            PacketShape::ModifierHeader => {
                if self.begin_header(pcw, bus) {
                    self.parse_modifier_header(pcw, words);
                }
            }
            PacketShape::Vertex(_) | PacketShape::SpriteVertex | PacketShape::ModifierVertex => {
                self.parse_vertex(pcw, words, bus);
            }
            PacketShape::Unknown => {
                log::debug!("TA: dropping packet with parameter type {}", pcw.para_type());
            }
        }
    }

    fn end_list(&mut self, bus: &mut TaBus<'_>) {
        self.flush_modvol(bus);
        if self.strip_count != 0 {
            self.strip_count = 0;
            self.illegal(bus, "end of list inside an open strip");
        }

        match self.list.take() {
            Some(class) => {
                log::debug!("TA: end of {:?} list", class);
                bus.irq.raise(Interrupt::list_done(class));
            }
            None => log::debug!("TA: end of list with no open list"),
        }

        self.builder.close();
        self.context = None;
        self.parity = false;
        self.modvol = ModvolState::default();
    }

    // Common header handling. Returns false if the header must be dropped.
    fn begin_header(&mut self, pcw: PCW, bus: &mut TaBus<'_>) -> bool {
        self.flush_modvol(bus);
        if self.strip_count != 0 {
            self.strip_count = 0;
            self.parity = false;
            self.illegal(bus, "header inside an open strip");
        }

        if self.list.is_none() {
            let Some(class) = ListClass::from_id(pcw.list_type()) else {
                self.illegal(bus, "header with an invalid list type");
                return false;
            };
            log::debug!("TA: start of {:?} list", class);
            self.builder.open(class, bus.vram, bus.regs);
            self.list = Some(class);
        }

        self.strip_len = STRIP_LENGTHS[pcw.strip_len() as usize];
        self.clip_mode = pcw.user_clip();
        true
    }

    fn parse_polygon_header(&mut self, pcw: PCW, format: VertexFormat, words: &[u32]) {
        let mut isp = ISP_TSP::from((words[1] & 0xFC3F_FFFF) | ((pcw.obj_ctrl() as u32 & 0xF) << 22));
        isp.set_uv_16b(format.uv16);
        isp.set_offset(format.offset);

        let mut tsp = [TSP::from(words[2]), TSP::from(0)];
        let mut tcw = [TCW::from(words[3]), TCW::from(0)];
        if format.two_volumes {
            tsp[1] = TSP::from(words[4]);
            tcw[1] = TCW::from(words[5]);
        }

        if format.colour == ColourMode::Intensity {
            if format.two_volumes {
                self.face.base = [float_colour(&words[8..12]), float_colour(&words[12..16])];
            } else if format.offset {
                self.face.base[0] = float_colour(&words[8..12]);
                self.face.offset = float_colour(&words[12..16]);
            } else {
                self.face.base[0] = float_colour(&words[4..8]);
            }
        }

        self.context = Some(Context::Polygon(PolygonContext {
            isp,
            tsp,
            tcw,
            format,
            shadow: pcw.shadow(),
        }));
    }

    fn parse_sprite_header(&mut self, pcw: PCW, words: &[u32]) {
        let textured = pcw.texture();
        let mut isp = ISP_TSP::from(words[1] & 0xFC3F_FFFF);
        isp.set_texture(textured);
        isp.set_uv_16b(textured);
        isp.set_offset(textured && pcw.offset());

        self.context = Some(Context::Sprite(SpriteContext {
            isp,
            tsp: TSP::from(words[2]),
            tcw: TCW::from(words[3]),
            base: words[4],
            offset: words[5],
            shadow: pcw.shadow(),
        }));
    }

    fn parse_modifier_header(&mut self, pcw: PCW, words: &[u32]) {
        if self.modvol.last {
            self.modvol.bounds = None;
        }
        self.modvol.last = pcw.volume();

        self.context = Some(Context::Modifier(ModifierContext {
            word: ISP_Modvol::from(words[1]),
            last: pcw.volume(),
        }));
    }

    fn parse_vertex(&mut self, pcw: PCW, words: &[u32], bus: &mut TaBus<'_>) {
        let Some(context) = self.context.filter(|_| self.list.is_some()) else {
            self.illegal(bus, "vertex outside of a list");
            return;
        };

        match context {
            Context::Polygon(ctx) => {
                self.strip[self.strip_count] = decode_vertex(&ctx.format, words, &self.face);
                self.strip_count += 1;

                let end = pcw.end_of_strip();
                if end || self.strip_count >= self.strip_len {
                    self.flush_strip(&ctx, bus);
                }
                if end {
                    self.strip_count = 0;
                    self.parity = false;
                }
            }
            Context::Sprite(ctx) => self.sprite(&ctx, words, bus),
            Context::Modifier(ctx) => self.modifier_triangle(&ctx, words, bus),
        }
    }

    // Emits the window as triangles, every other one with its first two
    // vertices swapped, and keeps the last two vertices for the next window.
    fn flush_strip(&mut self, ctx: &PolygonContext, bus: &mut TaBus<'_>) {
        let n = self.strip_count;
        if n < 3 {
            self.strip_count = 0;
            self.illegal(bus, "strip with fewer than three vertices");
            return;
        }

        for i in 0..n - 2 {
            let mut tri = [self.strip[i], self.strip[i + 1], self.strip[i + 2]];
            if self.parity {
                tri.swap(0, 1);
            }
            self.parity = !self.parity;
            self.emit_polygon(ctx, &tri, bus);
        }

        self.strip[0] = self.strip[n - 2];
        self.strip[1] = self.strip[n - 1];
        self.strip_count = 2;
    }

    fn user_clip(&self) -> UserClip {
        UserClip {
            mode: self.clip_mode,
            rect: self.clip_rect,
        }
    }

    fn bounds(&self, vertices: &[Vertex]) -> Option<TileRect> {
        TileRect::of(&ScreenRect::of(vertices), self.builder.width(), self.builder.height())
    }

    fn emit_polygon(&mut self, ctx: &PolygonContext, vertices: &[Vertex], bus: &mut TaBus<'_>) {
        let Some(class) = self.list else {
            return;
        };
        let Some(s) = isp::setup(vertices, ctx.isp.cull_mode(), bus.regs.fpu_cull_val(), bus.regs.fpu_perp_val())
        else {
            log::trace!("TA: culled {:?}", vertices.iter().map(|v| (v.x, v.y)).collect::<Vec<_>>());
            return;
        };
        let Some(bounds) = self.bounds(vertices) else {
            log::trace!("TA: primitive outside the tile grid");
            return;
        };

        let mut block = IspParamBlock::new(ctx.isp, class.id(), ctx.format.two_volumes, vertices, &s);
        block.tsp = ctx.tsp;
        block.tcw = ctx.tcw;
        let clip = self.user_clip();
        self.builder.emit_primitive(&block, bounds, ctx.shadow, clip, bus);
    }

    fn sprite(&mut self, ctx: &SpriteContext, w: &[u32], bus: &mut TaBus<'_>) {
        let f = |i: usize| f32::from_bits(w[i]);
        let (a, b, c) = ((f(1), f(2), f(3)), (f(4), f(5), f(6)), (f(7), f(8), f(9)));
        let mut vertices = [
            Vertex::at(a.0, a.1, a.2),
            Vertex::at(b.0, b.1, b.2),
            Vertex::at(c.0, c.1, c.2),
            Vertex::at(f(10), f(11), a.2 + c.2 - b.2),
        ];

        if ctx.isp.texture() {
            let (ua, va) = unpack_uv16(w[13]);
            let (ub, vb) = unpack_uv16(w[14]);
            let (uc, vc) = unpack_uv16(w[15]);
            let uvs = [(ua, va), (ub, vb), (uc, vc), (ua + uc - ub, va + vc - vb)];
            for (v, (u, vv)) in vertices.iter_mut().zip(uvs) {
                v.u = u;
                v.v = vv;
            }
        }
        for v in vertices.iter_mut() {
            v.set_base_argb(ctx.base);
            v.set_offset_argb(ctx.offset);
        }

        let Some(class) = self.list else {
            return;
        };
        let Some(s) = isp::setup(&vertices, ctx.isp.cull_mode(), bus.regs.fpu_cull_val(), bus.regs.fpu_perp_val())
        else {
            log::trace!("TA: culled sprite");
            return;
        };
        let Some(bounds) = self.bounds(&vertices) else {
            return;
        };

        let mut block = IspParamBlock::new(ctx.isp, class.id(), false, &vertices, &s);
        block.tsp[0] = ctx.tsp;
        block.tcw[0] = ctx.tcw;
        let clip = self.user_clip();
        self.builder.emit_primitive(&block, bounds, ctx.shadow, clip, bus);
    }

    fn modifier_triangle(&mut self, ctx: &ModifierContext, w: &[u32], bus: &mut TaBus<'_>) {
        let f = |i: usize| f32::from_bits(w[i]);
        let vertices = [
            Vertex::at(f(1), f(2), f(3)),
            Vertex::at(f(4), f(5), f(6)),
            Vertex::at(f(7), f(8), f(9)),
        ];

        let Some(class) = self.list else {
            return;
        };
        if ctx.last {
            self.modvol.closing = Some(ctx.word);
        }
        let Some(s) = isp::setup(&vertices, ctx.word.cull_mode(), bus.regs.fpu_cull_val(), bus.regs.fpu_perp_val())
        else {
            log::trace!("TA: culled modifier triangle");
            return;
        };
        let Some(bounds) = self.bounds(&vertices) else {
            return;
        };
        let union = match self.modvol.bounds {
            Some(b) => b.union(&bounds),
            None => bounds,
        };
        self.modvol.bounds = Some(union);

        let mut word = ctx.word;
        word.set_volume_last(false);
        let block = IspParamBlock::new(ISP_TSP::from(word.full()), class.id(), false, &vertices, &s);
        let clip = self.user_clip();

        if ctx.last {
            if let Some(prev) = self.modvol.held.replace(block) {
                self.builder.emit_primitive(&prev, union, false, clip, bus);
            }
        } else {
            self.builder.emit_primitive(&block, bounds, false, clip, bus);
        }
    }

    // Emits the held triangle as the one that closes its volume. When every
    // triangle of the closing group was culled an empty triangle closes it.
    fn flush_modvol(&mut self, bus: &mut TaBus<'_>) {
        let held = self.modvol.held.take();
        let Some(closing) = self.modvol.closing.take() else {
            return;
        };
        let (Some(bounds), Some(class)) = (self.modvol.bounds, self.list) else {
            return;
        };
        let mut block = held.unwrap_or_else(|| {
            log::trace!("TA: modifier volume closed by a culled triangle");
            let isp = ISP_TSP::from(closing.full());
            IspParamBlock::new(isp, class.id(), false, &[Vertex::default(); 3], &IspSetup::empty())
        });

        let mut word = block.modvol();
        word.set_volume_last(true);
        block.isp = ISP_TSP::from(word.full());
        let clip = self.user_clip();
        self.builder.emit_primitive(&block, bounds, false, clip, bus);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refsw::isp::determinant;
    use refsw::lists::{walk_object_list, TaggedPrimitive};
    use refsw::lists_types::ListPointer;
    use refsw::pvr_regs::*;

    const ISP_BASE: u32 = 0x10_0000;
    const OL_BASE: u32 = 0x20_0000;

    struct Fixture {
        vram: Vram,
        regs: PvrRegs,
        irqs: Vec<Interrupt>,
        ta: TileAccelerator,
    }

    impl Fixture {
        fn new() -> Self {
            let _ = env_logger::builder().is_test(true).try_init();

            let mut regs = PvrRegs::new();
            regs.write(TA_GLOB_TILE_CLIP_ADDR, (1 << 16) | 1);
            regs.write(TA_ALLOC_CTRL_ADDR, 0x0001_1111);
            regs.write(TA_OL_BASE_ADDR, OL_BASE);
            regs.write(TA_OL_LIMIT_ADDR, 0x30_0000);
            regs.write(TA_NEXT_OPB_INIT_ADDR, 0x28_0000);
            regs.write(TA_ISP_BASE_ADDR, ISP_BASE);
            regs.write(TA_ISP_LIMIT_ADDR, 0x18_0000);
            regs.write(PARAM_BASE_ADDR, ISP_BASE);

            let mut f = Self {
                vram: Vram::new(),
                regs,
                irqs: Vec::new(),
                ta: TileAccelerator::new(),
            };
            let mut bus = TaBus { vram: &mut f.vram, regs: &mut f.regs, irq: &mut f.irqs };
            f.ta.list_init(&mut bus);
            f
        }

        fn send(&mut self, words: &[u32]) {
            let mut bus = TaBus { vram: &mut self.vram, regs: &mut self.regs, irq: &mut self.irqs };
            self.ta.submit(words, &mut bus);
        }

        fn prims(&self, class: ListClass, x: u32, y: u32) -> Vec<TaggedPrimitive> {
            let head = self.ta.builder().tile_head(class, x, y).unwrap();
            let mut prims = Vec::new();
            walk_object_list(&self.vram, &self.regs, ListPointer::to(head), &mut prims);
            prims
        }
    }

    fn pcw(para_type: u32, list: u32, obj_ctrl: u32) -> u32 {
        (para_type << 29) | (list << 24) | obj_ctrl
    }

    fn header(list: u32, obj_ctrl: u32, isp: u32) -> [u32; 8] {
        [pcw(PARA_POLYGON, list, obj_ctrl), isp, 0, 0, 0, 0, 0, 0]
    }

    fn vertex(x: f32, y: f32, z: f32, argb: u32, last: bool) -> [u32; 8] {
        let eos = if last { 1 << 28 } else { 0 };
        [pcw(PARA_VERTEX, 0, 0) | eos, x.to_bits(), y.to_bits(), z.to_bits(), 0, 0, argb, 0]
    }

    const END: [u32; 8] = [0; 8];

    #[test]
    fn test_triangle_round_trip() {
        let mut f = Fixture::new();
        f.send(&header(0, 0b10, 6 << 29));
        f.send(&vertex(4.0, 4.0, 0.5, 0xFF11_2233, false));
        f.send(&vertex(20.0, 4.0, 0.25, 0xFF11_2233, false));
        f.send(&vertex(4.0, 20.0, 0.125, 0xFF11_2233, true));
        f.send(&END);

        assert_eq!(f.irqs, vec![Interrupt::OpaqueListDone]);

        let block = IspParamBlock::deserialize(&f.vram, ISP_BASE);
        assert_eq!(block.header.list_id(), 0);
        assert!(!block.header.quad());
        assert!(block.isp.gouraud());
        assert_eq!(block.isp.depth_mode(), 6);
        let xyz: Vec<_> = block.vertices[..3].iter().map(|v| (v.x, v.y, v.z)).collect();
        assert_eq!(xyz, vec![(4.0, 4.0, 0.5), (20.0, 4.0, 0.25), (4.0, 20.0, 0.125)]);
        assert_eq!(block.vertices[1].base_argb(), 0xFF11_2233);
        assert_eq!(f.regs.ta_isp_current(), ISP_BASE + block.size_words() * 4);

        let prims = f.prims(ListClass::Opaque, 0, 0);
        assert_eq!(prims.len(), 1);
        assert!(f.prims(ListClass::Opaque, 1, 1).is_empty());
    }

    #[test]
    fn test_strip_keeps_winding() {
        let mut f = Fixture::new();
        // strip length 8
        f.send(&header(0, 3 << 18, 0));
        let points = [(0.0, 0.0), (0.0, 10.0), (10.0, 0.0), (10.0, 10.0), (20.0, 0.0)];
        for (i, (x, y)) in points.iter().enumerate() {
            f.send(&vertex(*x, *y, 1.0, 0, i == points.len() - 1));
        }
        f.send(&END);

        let prims = f.prims(ListClass::Opaque, 0, 0);
        assert_eq!(prims.len(), 3);
        for p in &prims {
            assert!(determinant(&p.block.vertices[..3]) < 0.0);
        }
        assert_eq!((prims[1].block.vertices[0].x, prims[1].block.vertices[0].y), (10.0, 0.0));
    }

    #[test]
    fn test_short_strips_flush_at_strip_length() {
        let mut f = Fixture::new();
        // strip length 3, no end of strip until the fifth vertex
        f.send(&header(0, 0, 0));
        for i in 0..5 {
            f.send(&vertex(i as f32 * 4.0, (i % 2) as f32 * 8.0, 1.0, 0, i == 4));
        }
        f.send(&END);
        assert_eq!(f.prims(ListClass::Opaque, 0, 0).len(), 3);
        assert!(f.irqs.iter().all(|i| !i.is_error()));
    }

    #[test]
    fn test_vertex_without_list_is_illegal() {
        let mut f = Fixture::new();
        f.send(&vertex(0.0, 0.0, 1.0, 0, true));
        assert_eq!(f.irqs, vec![Interrupt::TaIllegalParam]);
        assert_eq!(f.regs.ta_isp_current(), ISP_BASE);
    }

    #[test]
    fn test_unknown_packets_are_silent() {
        let mut f = Fixture::new();
        f.send(&[pcw(3, 0, 0), 0, 0, 0, 0, 0, 0, 0]);
        f.send(&[pcw(6, 0, 0), 0, 0, 0, 0, 0, 0, 0]);
        assert!(f.irqs.is_empty());
        assert_eq!(f.ta.list(), None);

        f.send(&header(2, 0, 0));
        assert_eq!(f.ta.list(), Some(ListClass::Trans));
    }

    #[test]
    fn test_intensity_face_colour() {
        let mut f = Fixture::new();
        let mut h = header(0, 2 << 4, 0);
        h[4] = 1.0f32.to_bits();
        h[5] = 1.0f32.to_bits();
        h[6] = 0.5f32.to_bits();
        h[7] = 0.0f32.to_bits();
        f.send(&h);

        let intensity = |x: f32, y: f32, i: f32, last: bool| {
            let mut v = vertex(x, y, 1.0, 0, last);
            v[6] = i.to_bits();
            v
        };
        f.send(&intensity(0.0, 0.0, 1.0, false));
        f.send(&intensity(8.0, 0.0, 0.5, false));
        f.send(&intensity(0.0, 8.0, 0.0, true));

        let block = IspParamBlock::deserialize(&f.vram, ISP_BASE);
        assert_eq!(block.vertices[0].base_argb(), 0xFFFF_7F00);
        assert_eq!(block.vertices[1].base_argb(), 0xFF7F_3F00);
        assert_eq!(block.vertices[2].base_argb(), 0xFF00_0000);
    }

    #[test]
    fn test_sprite_derives_fourth_vertex() {
        let mut f = Fixture::new();
        f.send(&[pcw(PARA_SPRITE, 0, 0), 0, 0, 0, 0xFF00_FF00, 0, 0, 0]);

        let mut v = [0u32; 16];
        v[0] = pcw(PARA_VERTEX, 0, 0) | (1 << 28);
        let coords = [0.0f32, 0.0, 0.5, 16.0, 0.0, 0.75, 16.0, 16.0, 1.0, 0.0, 16.0];
        for (i, c) in coords.iter().enumerate() {
            v[1 + i] = c.to_bits();
        }
        f.send(&v);

        let block = IspParamBlock::deserialize(&f.vram, ISP_BASE);
        assert!(block.header.quad());
        let d = block.vertices[3];
        assert_eq!((d.x, d.y, d.z), (0.0, 16.0, 0.75));
        assert!(block.vertices.iter().all(|v| v.base_argb() == 0xFF00_FF00));
    }

    #[test]
    fn test_modifier_volume_closes_on_last_triangle() {
        let mut f = Fixture::new();
        let tri = |x: f32| {
            let mut v = [0u32; 16];
            v[0] = pcw(PARA_VERTEX, 0, 0);
            let c = [x, 0.0, 1.0, x + 8.0, 0.0, 1.0, x, 8.0, 1.0];
            for (i, c) in c.iter().enumerate() {
                v[1 + i] = c.to_bits();
            }
            v
        };

        f.send(&header(1, 0, 0));
        f.send(&tri(0.0));
        f.send(&header(1, 1 << 6, 1 << 29));
        f.send(&tri(2.0));
        f.send(&tri(4.0));
        f.send(&END);

        assert_eq!(f.irqs, vec![Interrupt::OpaqueModListDone]);
        let prims = f.prims(ListClass::OpaqueMod, 0, 0);
        assert_eq!(prims.len(), 3);
        let last: Vec<_> = prims.iter().map(|p| p.block.modvol().volume_last()).collect();
        assert_eq!(last, vec![false, false, true]);
        assert_eq!(prims[2].block.vertices[0].x, 4.0);
        assert_eq!(prims[2].block.modvol().depth_mode(), 1);
    }

    #[test]
    fn test_user_clip_inside() {
        let mut f = Fixture::new();
        f.send(&[pcw(PARA_USER_TILE_CLIP, 0, 0), 0, 0, 0, 1, 0, 1, 0]);
        f.send(&header(0, 2 << 16, 0));
        f.send(&vertex(2.0, 2.0, 1.0, 0, false));
        f.send(&vertex(60.0, 2.0, 1.0, 0, false));
        f.send(&vertex(2.0, 20.0, 1.0, 0, true));

        assert!(f.prims(ListClass::Opaque, 0, 0).is_empty());
        assert_eq!(f.prims(ListClass::Opaque, 1, 0).len(), 1);
    }

    #[test]
    fn test_header_inside_strip_is_illegal() {
        let mut f = Fixture::new();
        f.send(&header(0, 0, 0));
        f.send(&vertex(0.0, 0.0, 1.0, 0, false));
        f.send(&header(0, 0, 0));
        assert_eq!(f.irqs, vec![Interrupt::TaIllegalParam]);
    }

    #[test]
    fn test_packet_lengths() {
        let intensity_offset = PCW::from((2 << 4) | (1 << 3) | (1 << 2));
        assert_eq!(VertexFormat::from_pcw(intensity_offset).header_words(), 16);
        let textured_float = PCW::from((1 << 4) | (1 << 3));
        assert_eq!(VertexFormat::from_pcw(textured_float).vertex_words(), 16);
        let float = PCW::from(1 << 4);
        assert_eq!(VertexFormat::from_pcw(float).vertex_words(), 8);
        let two_volume_float = PCW::from((1 << 4) | (1 << 6) | (1 << 7));
        assert_eq!(VertexFormat::from_pcw(two_volume_float).colour, ColourMode::LastIntensity);
    }

    #[test]
    fn test_two_volume_offset_uses_offset_face() {
        let mut f = Fixture::new();
        let colours = |h: &mut [u32; 16], a: [f32; 4], b: [f32; 4]| {
            for (i, c) in a.iter().chain(b.iter()).enumerate() {
                h[8 + i] = c.to_bits();
            }
        };

        let offset_ctrl = (2 << 4) | (1 << 3) | (1 << 2);
        let mut h = [0u32; 16];
        h[0] = pcw(PARA_POLYGON, 0, offset_ctrl);
        colours(&mut h, [1.0, 1.0, 0.0, 0.0], [1.0, 0.0, 1.0, 0.0]);
        f.send(&h);
        assert_eq!(f.ta.face, FaceColours { base: [0xFFFF_0000, 0], offset: 0xFF00_FF00 });

        // two face colours, one per volume; the offset face stays latched
        let two_volume_ctrl = offset_ctrl | (1 << 6) | (1 << 7);
        h[0] = pcw(PARA_POLYGON, 0, two_volume_ctrl);
        colours(&mut h, [1.0, 0.0, 0.0, 1.0], [1.0, 1.0, 1.0, 1.0]);
        f.send(&h);
        assert_eq!(f.ta.face, FaceColours { base: [0xFF00_00FF, 0xFFFF_FFFF], offset: 0xFF00_FF00 });

        let fmt = VertexFormat::from_pcw(PCW::from(two_volume_ctrl));
        assert!(fmt.two_volumes && fmt.offset);
        let mut w = [0u32; 16];
        for (i, x) in [2.0f32, 3.0, 1.0, 0.25, 0.5, 0.5, 0.5, 0.75, 0.0, 0.5, 1.0].iter().enumerate() {
            w[1 + i] = x.to_bits();
        }
        let v = decode_vertex(&fmt, &w, &f.ta.face);
        assert_eq!((v.u, v.v, v.u1, v.v1), (0.25, 0.5, 0.75, 0.0));
        assert_eq!(v.base_argb(), 0xFF00_007F);
        assert_eq!(u32::from_le_bytes(v.spc), 0xFF00_7F00);
        assert_eq!(u32::from_le_bytes(v.col1), 0xFF7F_7F7F);
        assert_eq!(u32::from_le_bytes(v.spc1), 0xFF00_FF00);
    }

    #[test]
    fn test_culled_last_triangle_still_closes_volume() {
        let mut f = Fixture::new();
        let tri = |c: [f32; 9]| {
            let mut v = [0u32; 16];
            v[0] = pcw(PARA_VERTEX, 0, 0);
            for (i, c) in c.iter().enumerate() {
                v[1 + i] = c.to_bits();
            }
            v
        };

        f.send(&header(1, 0, 0));
        f.send(&tri([0.0, 0.0, 1.0, 40.0, 0.0, 1.0, 0.0, 8.0, 1.0]));
        // zero area, dropped by cull mode 1
        f.send(&header(1, 1 << 6, (1 << 29) | (1 << 27)));
        f.send(&tri([4.0, 4.0, 1.0, 4.0, 4.0, 1.0, 4.0, 4.0, 1.0]));
        f.send(&END);

        assert_eq!(f.irqs, vec![Interrupt::OpaqueModListDone]);
        for x in 0..2 {
            let prims = f.prims(ListClass::OpaqueMod, x, 0);
            let last: Vec<_> = prims.iter().map(|p| p.block.modvol().volume_last()).collect();
            assert_eq!(last, vec![false, true]);
            assert_eq!(prims[1].block.modvol().depth_mode(), 1);
            assert!(prims[1].block.edges().iter().all(|e| !e.inside(4.5, 4.5)));
        }
        assert!(f.prims(ListClass::OpaqueMod, 0, 1).is_empty());
    }
}
