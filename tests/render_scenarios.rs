use pvr2::refsw::blend::{blend, blend_mode_index, BLEND_INV_SRC_ALPHA, BLEND_SRC_ALPHA};
use pvr2::refsw::isp::background_block;
use pvr2::refsw::lists::{core_tag_from_desc, ListClass};
use pvr2::refsw::lists_types::{ObjectListArray, OL_END};
use pvr2::refsw::pvr_regs::*;
use pvr2::refsw::types::{Color, ISP_TSP, TSP};
use pvr2::{Interrupt, Pvr, PvrConfig};

const PARAM_BASE: u32 = 0x10_0000;
const BACKGROUND: u32 = 0x1F_0000;
const FB_BASE: u32 = 0x40_0000;
const FB_STRIDE: u32 = 32 * 4;

const PARA_END_OF_LIST: u32 = 0;
const PARA_POLYGON: u32 = 4;
const PARA_VERTEX: u32 = 7;

const LIST_OPAQUE: u32 = 0;
const LIST_TRANS: u32 = 2;

const GOURAUD: u32 = 1 << 1;
const END_OF_STRIP: u32 = 1 << 28;

// src ONE, dst ZERO, no fog
const OPAQUE_TSP: u32 = (1 << 29) | (0b10 << 22);
// src SRC_ALPHA, dst INV_SRC_ALPHA, alpha from the vertex colour, no fog
const ALPHA_TSP: u32 = (4 << 29) | (5 << 26) | (0b10 << 22) | (1 << 20);

const BLUE: u32 = 0xFF00_00FF;
const RED: u32 = 0xFFFF_0000;
const GREEN: u32 = 0xFF00_FF00;

type Device = Pvr<Vec<Interrupt>>;

/// One 32x32 tile, every list with 8 word OPBs, an 8888 frame buffer and a
/// background plane at depth 0.125.
fn device(background: u32) -> Device {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut pvr = Pvr::with_sink(PvrConfig::default(), Vec::new());
    pvr.write_reg(TA_GLOB_TILE_CLIP_ADDR, 0);
    pvr.write_reg(TA_ALLOC_CTRL_ADDR, 0x0001_1111);
    pvr.write_reg(TA_OL_BASE_ADDR, 0x20_0000);
    pvr.write_reg(TA_OL_LIMIT_ADDR, 0x30_0000);
    pvr.write_reg(TA_NEXT_OPB_INIT_ADDR, 0x28_0000);
    pvr.write_reg(TA_ISP_BASE_ADDR, PARAM_BASE);
    pvr.write_reg(TA_ISP_LIMIT_ADDR, BACKGROUND);
    pvr.write_reg(PARAM_BASE_ADDR, PARAM_BASE);
    pvr.write_reg(REGION_BASE_ADDR, 0x30_0000);
    pvr.write_reg(FB_W_CTRL_ADDR, 6);
    pvr.write_reg(FB_W_SOF1_ADDR, FB_BASE);
    pvr.write_reg(FB_W_LINESTRIDE_ADDR, FB_STRIDE / 8);

    let block = background_block(ISP_TSP::from(0), TSP::from(OPAQUE_TSP), background, 0.125);
    block.serialize(pvr.vram_mut(), BACKGROUND);
    let tag = core_tag_from_desc(false, false, block.header.skip(), (BACKGROUND - PARAM_BASE) / 4, 0);
    pvr.write_reg(ISP_BACKGND_T_ADDR, tag.full());
    pvr.write_reg(ISP_BACKGND_D_ADDR, 0.125f32.to_bits());

    pvr.write_reg(TA_LIST_INIT_ADDR, 0x8000_0000);
    pvr
}

fn pcw(para_type: u32, list: u32, obj_ctrl: u32) -> u32 {
    (para_type << 29) | (list << 24) | obj_ctrl
}

fn polygon(list: u32, obj_ctrl: u32, depth_mode: u32, tsp: u32) -> [u32; 8] {
    [pcw(PARA_POLYGON, list, obj_ctrl), depth_mode << 29, tsp, 0, 0, 0, 0, 0]
}

fn vertex(x: f32, y: f32, z: f32, argb: u32, last: bool) -> [u32; 8] {
    let eos = if last { END_OF_STRIP } else { 0 };
    [pcw(PARA_VERTEX, 0, 0) | eos, x.to_bits(), y.to_bits(), z.to_bits(), 0, 0, argb, 0]
}

fn triangle(pvr: &mut Device, at: [(f32, f32); 3], z: f32, colours: [u32; 3]) {
    for (i, (&(x, y), &argb)) in at.iter().zip(colours.iter()).enumerate() {
        pvr.ta_fifo_write(&vertex(x, y, z, argb, i == 2));
    }
}

fn end_list(pvr: &mut Device) {
    pvr.ta_fifo_write(&[pcw(PARA_END_OF_LIST, 0, 0), 0, 0, 0, 0, 0, 0, 0]);
}

fn render(pvr: &mut Device) {
    pvr.write_region_array(false);
    pvr.write_reg(STARTRENDER_ADDR, 1);
    pvr.tick(10_000_000);
}

fn pixel(pvr: &Device, x: u32, y: u32) -> u32 {
    pvr.vram().read32(FB_BASE + y * FB_STRIDE + x * 4)
}

fn channels(argb: u32) -> [i32; 4] {
    argb.to_be_bytes().map(|c| c as i32)
}

#[test]
fn test_gouraud_triangle() {
    let mut pvr = device(BLUE);
    pvr.ta_fifo_write(&polygon(LIST_OPAQUE, GOURAUD, 6, OPAQUE_TSP));
    triangle(&mut pvr, [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)], 1.0, [RED, GREEN, 0xFF00_00FF]);
    end_list(&mut pvr);
    render(&mut pvr);

    assert!(pvr.irq().contains(&Interrupt::OpaqueListDone));
    assert!(pvr.irq().contains(&Interrupt::RenderDoneTsp));
    assert_eq!(pvr.last_render().tiles, 1);

    // Channels step by 25.5 per pixel and truncate. At (3.5, 3.5) the weights
    // are 0.3 red, 0.35 green, 0.35 blue: 76.5, 89.25, 89.25.
    assert_eq!(pixel(&pvr, 3, 3), 0xFF4C_5959);
    // At (1.5, 1.5): 178.5, 38.25, 38.25
    assert_eq!(pixel(&pvr, 1, 1), 0xFFB2_2626);

    // outside the triangle the background shows
    assert_eq!(pixel(&pvr, 20, 20), BLUE);
    assert_eq!(pixel(&pvr, 9, 9), BLUE);
}

#[test]
fn test_nearer_opaque_wins() {
    let mut pvr = device(BLUE);

    // near triangle first, then a far strip covering the whole tile
    pvr.ta_fifo_write(&polygon(LIST_OPAQUE, 0, 6, OPAQUE_TSP));
    triangle(&mut pvr, [(0.0, 0.0), (16.0, 0.0), (0.0, 16.0)], 1.0, [GREEN; 3]);

    pvr.ta_fifo_write(&polygon(LIST_OPAQUE, 0, 6, OPAQUE_TSP));
    pvr.ta_fifo_write(&vertex(0.0, 0.0, 0.5, RED, false));
    pvr.ta_fifo_write(&vertex(32.0, 0.0, 0.5, RED, false));
    pvr.ta_fifo_write(&vertex(0.0, 32.0, 0.5, RED, false));
    pvr.ta_fifo_write(&vertex(32.0, 32.0, 0.5, RED, true));
    end_list(&mut pvr);
    render(&mut pvr);

    assert_eq!(pixel(&pvr, 2, 2), GREEN);
    assert_eq!(pixel(&pvr, 10, 3), GREEN);
    assert_eq!(pixel(&pvr, 20, 20), RED);
    assert_eq!(pixel(&pvr, 30, 1), RED);
}

#[test]
fn test_translucent_blends_over_background() {
    let mut pvr = device(BLUE);
    let colour = 0x80FF_0000;
    pvr.ta_fifo_write(&polygon(LIST_TRANS, 0, 7, ALPHA_TSP));
    pvr.ta_fifo_write(&vertex(0.0, 0.0, 1.0, colour, false));
    pvr.ta_fifo_write(&vertex(32.0, 0.0, 1.0, colour, false));
    pvr.ta_fifo_write(&vertex(0.0, 32.0, 1.0, colour, false));
    pvr.ta_fifo_write(&vertex(32.0, 32.0, 1.0, colour, true));
    end_list(&mut pvr);
    render(&mut pvr);

    assert!(pvr.irq().contains(&Interrupt::TransListDone));

    let mode = blend_mode_index(BLEND_SRC_ALPHA, BLEND_INV_SRC_ALPHA);
    let want = blend(mode, Color::from_raw(colour), Color::from_raw(BLUE)).to_raw();
    assert_eq!(pixel(&pvr, 3, 3), want);
    assert_eq!(pixel(&pvr, 28, 28), want);

    let got = channels(want);
    assert!(got[1] > 120 && got[3] > 120 && got[2] == 0);
}

fn grid_of_triangles(pvr: &mut Device, count: u32) -> Vec<u32> {
    let mut colours = Vec::new();
    for i in 0..count {
        let (x, y) = ((i % 5 * 6) as f32, (i / 5 * 6) as f32);
        let argb = 0xFF00_0000 | (i * 12 + 8) << 16 | (255 - i * 12);
        pvr.ta_fifo_write(&polygon(LIST_OPAQUE, 0, 6, OPAQUE_TSP));
        triangle(pvr, [(x, y), (x + 4.0, y), (x, y + 4.0)], 1.0, [argb; 3]);
        colours.push(argb);
    }
    end_list(pvr);
    colours
}

fn opaque_head(pvr: &Device) -> u32 {
    pvr.ta().builder().tile_head(ListClass::Opaque, 0, 0).unwrap()
}

#[test]
fn test_triangles_in_one_tile_share_an_entry() {
    let mut pvr = device(0xFF00_0000);
    let colours = grid_of_triangles(&mut pvr, 5);

    let head = opaque_head(&pvr);
    assert_eq!(ObjectListArray::from(pvr.vram().read32(head)).count(), 5);
    assert_eq!(pvr.vram().read32(head + 4), OL_END);

    render(&mut pvr);
    for (i, &argb) in colours.iter().enumerate() {
        let i = i as u32;
        assert_eq!(pixel(&pvr, i % 5 * 6 + 1, i / 5 * 6 + 1), argb, "triangle {i}");
    }
}

#[test]
fn test_long_runs_split() {
    let mut pvr = device(0xFF00_0000);
    let colours = grid_of_triangles(&mut pvr, 20);

    let head = opaque_head(&pvr);
    assert_eq!(ObjectListArray::from(pvr.vram().read32(head)).count(), 16);
    assert_eq!(ObjectListArray::from(pvr.vram().read32(head + 4)).count(), 4);

    render(&mut pvr);
    for (i, &argb) in colours.iter().enumerate() {
        let i = i as u32;
        assert_eq!(pixel(&pvr, i % 5 * 6 + 1, i / 5 * 6 + 1), argb, "triangle {i}");
    }
}

fn draw_after_resets(resets: usize) -> Vec<u32> {
    let mut pvr = device(BLUE);
    // a half sent strip the resets have to throw away
    pvr.ta_fifo_write(&polygon(LIST_OPAQUE, 0, 6, OPAQUE_TSP));
    pvr.ta_fifo_write(&vertex(0.0, 0.0, 1.0, RED, false));

    for _ in 0..resets {
        pvr.write_reg(SOFTRESET_ADDR, 3);
        pvr.write_reg(SOFTRESET_ADDR, 0);
    }
    pvr.write_reg(TA_LIST_INIT_ADDR, 0x8000_0000);

    pvr.ta_fifo_write(&polygon(LIST_OPAQUE, GOURAUD, 6, OPAQUE_TSP));
    triangle(&mut pvr, [(4.0, 4.0), (28.0, 4.0), (4.0, 28.0)], 1.0, [RED, GREEN, BLUE]);
    end_list(&mut pvr);
    render(&mut pvr);

    (0..32 * 32).map(|i| pixel(&pvr, i % 32, i / 32)).collect()
}

#[test]
fn test_soft_reset_is_idempotent() {
    let once = draw_after_resets(1);
    let twice = draw_after_resets(2);
    assert_eq!(once, twice);
    assert_ne!(once[10 * 32 + 10], BLUE);
}

#[test]
fn test_read_back_matches_rendered_tile() {
    let mut pvr = device(BLUE);
    pvr.ta_fifo_write(&polygon(LIST_OPAQUE, 0, 6, OPAQUE_TSP));
    triangle(&mut pvr, [(0.0, 0.0), (32.0, 0.0), (0.0, 32.0)], 1.0, [GREEN; 3]);
    end_list(&mut pvr);
    render(&mut pvr);

    // 32 bit read-back of the 32x32 tile
    pvr.write_reg(FB_R_CTRL_ADDR, 1 | (3 << 2));
    pvr.write_reg(FB_R_SIZE_ADDR, 31 | (31 << 10) | (1 << 20));
    pvr.write_reg(FB_R_SOF1_ADDR, FB_BASE);

    let image = pvr.read_back().unwrap();
    assert_eq!((image.width, image.height), (32, 32));
    for (x, y) in [(1, 1), (20, 2), (30, 30), (2, 29)] {
        assert_eq!(image.pixel(x, y) & 0x00FF_FFFF, pixel(&pvr, x, y) & 0x00FF_FFFF);
    }
    assert_eq!(image.pixel(1, 1) & 0x00FF_FFFF, GREEN & 0x00FF_FFFF);
    assert_eq!(image.pixel(30, 30) & 0x00FF_FFFF, BLUE & 0x00FF_FFFF);
}
