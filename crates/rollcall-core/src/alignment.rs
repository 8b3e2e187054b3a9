//! Face alignment to the canonical ArcFace crop.
//!
//! Fits a similarity transform (uniform scale, rotation, translation) from the
//! five detected landmarks onto the InsightFace reference points, then
//! resamples the frame into a 112×112 RGB crop.

use image::{Rgb, RgbImage};

/// Side length of the aligned crop fed to the recognizer.
pub const ALIGNED_SIZE: u32 = 112;

/// Reference landmark positions for a 112×112 crop:
/// left eye, right eye, nose tip, left mouth corner, right mouth corner.
const REFERENCE_LANDMARKS: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

/// Similarity transform `dst = [a -b; b a] * src + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    /// Least-squares fit over corresponding point pairs (closed form).
    pub(crate) fn fit(src: &[(f32, f32)], dst: &[(f32, f32)]) -> Option<Self> {
        let n = src.len().min(dst.len());
        if n == 0 {
            return None;
        }
        let nf = n as f32;
        let (msx, msy) = src[..n]
            .iter()
            .fold((0.0, 0.0), |(x, y), p| (x + p.0 / nf, y + p.1 / nf));
        let (mdx, mdy) = dst[..n]
            .iter()
            .fold((0.0, 0.0), |(x, y), p| (x + p.0 / nf, y + p.1 / nf));

        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        let mut norm = 0.0f32;
        for (s, d) in src[..n].iter().zip(&dst[..n]) {
            let (sx, sy) = (s.0 - msx, s.1 - msy);
            let (dx, dy) = (d.0 - mdx, d.1 - mdy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            norm += sx * sx + sy * sy;
        }
        if norm < 1e-12 {
            return None;
        }

        let a = dot / norm;
        let b = cross / norm;
        Some(Self {
            a,
            b,
            tx: mdx - (a * msx - b * msy),
            ty: mdy - (b * msx + a * msy),
        })
    }

    pub(crate) fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Inverse mapping, `None` for a degenerate (zero-scale) transform.
    pub(crate) fn invert(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let ia = self.a / det;
        let ib = -self.b / det;
        Some(Self {
            a: ia,
            b: ib,
            tx: -(ia * self.tx - ib * self.ty),
            ty: -(ib * self.tx + ia * self.ty),
        })
    }
}

/// Bilinear sample with black outside the frame.
fn sample(frame: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (w, h) = (frame.width() as i64, frame.height() as i64);

    let px = |xi: i64, yi: i64| -> [f32; 3] {
        if xi >= 0 && xi < w && yi >= 0 && yi < h {
            let p = frame.get_pixel(xi as u32, yi as u32);
            [p[0] as f32, p[1] as f32, p[2] as f32]
        } else {
            [0.0; 3]
        }
    };

    let (xi, yi) = (x0 as i64, y0 as i64);
    let tl = px(xi, yi);
    let tr = px(xi + 1, yi);
    let bl = px(xi, yi + 1);
    let br = px(xi + 1, yi + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = tl[c] * (1.0 - fx) + tr[c] * fx;
        let bot = bl[c] * (1.0 - fx) + br[c] * fx;
        out[c] = (top * (1.0 - fy) + bot * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Warp the face described by `landmarks` into an aligned 112×112 crop.
///
/// Degenerate landmarks (all points coincident) yield a black crop.
pub fn align_face(frame: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let mut out = RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    let Some(inverse) = Similarity::fit(landmarks, &REFERENCE_LANDMARKS).and_then(|m| m.invert())
    else {
        return out;
    };

    for (ox, oy, pixel) in out.enumerate_pixels_mut() {
        let (sx, sy) = inverse.apply((ox as f32, oy as f32));
        *pixel = sample(frame, sx, sy);
    }
    out
}
