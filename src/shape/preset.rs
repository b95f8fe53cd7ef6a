//! Built-in shapes.
//!
//! Every preset takes `width` in ns. Shapes with an `amplitude` also take a
//! `phase` in radians applied as `exp(I * phase)`.
use super::Shape;
use crate::expr::Expr;

fn build(name: &str, expr: &str, progress: &str) -> Shape {
    let expr: Expr = expr.parse().expect("Preset expression should parse");
    let progress: Expr = progress.parse().expect("Preset progress should parse");
    Shape::new(name.into(), expr, progress).expect("Preset progress should not depend on time")
}

/// Zero waveform advancing the cursor by `width`.
#[must_use]
pub fn blank() -> Shape {
    build("blank", "0", "width")
}

/// Gaussian with full width at half maximum `width`, centered on the cursor.
/// Does not advance the cursor.
#[must_use]
pub fn gaussian() -> Shape {
    build(
        "gaussian",
        "amplitude * exp(-4 * log(2) / width ** 2 * t ** 2) * exp(I * phase)",
        "0",
    )
}

/// [`gaussian`] with a DRAG correction `-I * drag * d/dt`.
#[must_use]
pub fn gaussian_drag() -> Shape {
    build(
        "gaussian_drag",
        "amplitude * (1 + I * drag * 8 * log(2) / width ** 2 * t) \
         * exp(-4 * log(2) / width ** 2 * t ** 2) * exp(I * phase)",
        "0",
    )
}

/// Rectangle on `0 < t < width`.
#[must_use]
pub fn flattop() -> Shape {
    build(
        "flattop",
        "if(0 < t && t < width, amplitude * exp(I * phase), 0)",
        "width",
    )
}

/// Rectangle on `0 < t < width` with raised-cosine edges of length
/// `risetime` centered on both ends.
#[must_use]
pub fn flattop_cosrise() -> Shape {
    build(
        "flattop_cosrise",
        "exp(I * phase) * \
         if(-risetime / 2 < t && t < min(risetime / 2, width / 2), \
            (1 - cos((t + risetime / 2) / risetime * pi)) / 2 * amplitude, \
         if(max(width - risetime / 2, width / 2) < t && t < width + risetime / 2, \
            (1 - cos((width + risetime / 2 - t) / risetime * pi)) / 2 * amplitude, \
         if(0 < t && t < width, amplitude, 0)))",
        "width",
    )
}

#[must_use]
pub fn all() -> Vec<Shape> {
    vec![blank(), gaussian(), gaussian_drag(), flattop(), flattop_cosrise()]
}
