//! Renders learned first-layer weights as a tiled grayscale montage, and
//! optionally the forward computation graph as a Graphviz DOT file

use std::error::Error;
use std::fmt::Write as _;
use std::fs;

use ndarray::{Array2, ArrayView1};
use plotters::prelude::{BitMapBackend, IntoDrawingArea, Rectangle};
use plotters::style::{Color, RGBColor, WHITE};

use crate::datasets::{IMAGE_PIXELS, IMAGE_SIDE};
use crate::nn::Mlp;

// one weight pixel becomes a SCALE x SCALE block in the output image
const SCALE: usize = 4;

/// Grid dimensions (columns, rows) that fit `n` tiles: the narrowest
/// near-square grid, so 128 hidden units land on 12x11 = 132 cells with 4
/// left blank.
fn grid_shape(n: usize) -> (usize, usize) {
    if n == 0 {
        return (0, 0);
    }
    let cols = (n as f64).sqrt().ceil() as usize;
    let rows = n.div_ceil(cols);
    (cols, rows)
}

/// Maps a weight into a gray level using the tile's own min/max range
fn gray_level(weight: f32, min: f32, max: f32) -> u8 {
    if max <= min {
        return 127;
    }
    ((weight - min) / (max - min) * 255.0).round() as u8
}

fn tile_range(column: ArrayView1<f32>) -> (f32, f32) {
    let min = column.fold(f32::INFINITY, |a, &b| a.min(b));
    let max = column.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    (min, max)
}

/// Plots each first-layer unit's incoming weights (a column of the
/// n_inputs x n_hidden matrix) as a 28x28 grayscale tile, all tiles arranged
/// in a grid. Unused grid cells stay blank.
pub fn plot_weight_grid(w1: &Array2<f32>, file_name: &str) -> Result<(), Box<dyn Error>> {
    if w1.nrows() != IMAGE_PIXELS {
        return Err(format!(
            "weight rows ({}) do not reshape to {}x{} tiles",
            w1.nrows(),
            IMAGE_SIDE,
            IMAGE_SIDE
        )
        .into());
    }

    let n_units = w1.ncols();
    let (cols, rows) = grid_shape(n_units);
    let width = (cols * IMAGE_SIDE * SCALE) as u32;
    let height = (rows * IMAGE_SIDE * SCALE) as u32;

    let root_area = BitMapBackend::new(file_name, (width, height)).into_drawing_area();
    root_area.fill(&WHITE)?;

    for (unit, column) in w1.columns().into_iter().enumerate() {
        let (min, max) = tile_range(column);
        let tile_x = (unit % cols) * IMAGE_SIDE * SCALE;
        let tile_y = (unit / cols) * IMAGE_SIDE * SCALE;
        for (pixel, &weight) in column.iter().enumerate() {
            let gray = gray_level(weight, min, max);
            let x = (tile_x + (pixel % IMAGE_SIDE) * SCALE) as i32;
            let y = (tile_y + (pixel / IMAGE_SIDE) * SCALE) as i32;
            root_area.draw(&Rectangle::new(
                [(x, y), (x + SCALE as i32, y + SCALE as i32)],
                RGBColor(gray, gray, gray).filled(),
            ))?;
        }
    }

    root_area.present()?;
    log::info!("Weight grid saved to '{}'.", file_name);
    Ok(())
}

/// Renders the forward computation as a Graphviz DOT digraph, with tensor
/// shapes on the parameter nodes. Purely illustrative.
pub fn draw_dot(model: &Mlp, file_name: &str) -> std::io::Result<()> {
    fs::write(file_name, dot_string(model))?;
    log::info!("Computation graph saved to '{}'.", file_name);
    Ok(())
}

fn dot_string(model: &Mlp) -> String {
    let (n_inputs, n_hidden) = model.w1.dim();
    let n_classes = model.w2.ncols();
    let mut dot = String::new();
    let _ = writeln!(dot, "digraph mlp {{");
    let _ = writeln!(dot, "    rankdir=LR;");
    let _ = writeln!(dot, "    node [fontname=\"sans-serif\"];");
    let _ = writeln!(dot, "    input [label=\"input\\n(batch, {n_inputs})\"];");
    let _ = writeln!(
        dot,
        "    w1 [shape=box, label=\"W1\\n({n_inputs}, {n_hidden})\"];"
    );
    let _ = writeln!(dot, "    b1 [shape=box, label=\"b1\\n({n_hidden},)\"];");
    let _ = writeln!(
        dot,
        "    w2 [shape=box, label=\"W2\\n({n_hidden}, {n_classes})\"];"
    );
    let _ = writeln!(dot, "    b2 [shape=box, label=\"b2\\n({n_classes},)\"];");
    let _ = writeln!(dot, "    matmul1 [label=\"matmul\"];");
    let _ = writeln!(dot, "    add1 [label=\"add\"];");
    let _ = writeln!(dot, "    relu [label=\"relu\"];");
    let _ = writeln!(dot, "    matmul2 [label=\"matmul\"];");
    let _ = writeln!(dot, "    add2 [label=\"add\"];");
    let _ = writeln!(
        dot,
        "    logits [label=\"logits\\n(batch, {n_classes})\"];"
    );
    let _ = writeln!(dot, "    loss [label=\"cross entropy\"];");
    let _ = writeln!(dot, "    input -> matmul1; w1 -> matmul1;");
    let _ = writeln!(dot, "    matmul1 -> add1; b1 -> add1;");
    let _ = writeln!(dot, "    add1 -> relu;");
    let _ = writeln!(dot, "    relu -> matmul2; w2 -> matmul2;");
    let _ = writeln!(dot, "    matmul2 -> add2; b2 -> add2;");
    let _ = writeln!(dot, "    add2 -> logits;");
    let _ = writeln!(dot, "    logits -> loss;");
    let _ = writeln!(dot, "}}");
    dot
}
