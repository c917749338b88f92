//! Saddle-point refinement of chessboard corners.

use image::GrayImage;
use nalgebra::{Matrix2, Point2, Vector2};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubPixParams {
    /// Half-size of the square search window, pixels.
    pub window_radius: u32,
    pub max_iters: usize,
    /// Stop once an update moves the estimate by less than this, pixels.
    pub eps: f64,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            window_radius: 5,
            max_iters: 40,
            eps: 1e-3,
        }
    }
}

#[inline]
fn pixel(img: &GrayImage, x: i64, y: i64) -> f64 {
    let x = x.clamp(0, img.width() as i64 - 1) as u32;
    let y = y.clamp(0, img.height() as i64 - 1) as u32;
    img.get_pixel(x, y).0[0] as f64
}

/// Bilinear intensity with edge clamping.
pub(crate) fn sample_bilinear(img: &GrayImage, x: f64, y: f64) -> f64 {
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (xi, yi) = (x0 as i64, y0 as i64);
    let p00 = pixel(img, xi, yi);
    let p10 = pixel(img, xi + 1, yi);
    let p01 = pixel(img, xi, yi + 1);
    let p11 = pixel(img, xi + 1, yi + 1);
    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

/// Refine a corner estimate to the point where the image gradient inside the
/// window is everywhere orthogonal to the offset from the corner.
///
/// Each iteration solves `sum(w * g * g^T) * c = sum(w * g * g^T * q)` over
/// window samples `q` with gradient `g` and Gaussian weight `w`. If the
/// estimate wanders out of the window, or the system is singular, the
/// starting point is returned unchanged.
pub fn refine_corner(img: &GrayImage, start: Point2<f64>, params: &SubPixParams) -> Point2<f64> {
    if img.width() < 3 || img.height() < 3 || params.window_radius == 0 {
        return start;
    }
    let r = params.window_radius as i32;
    let sigma = params.window_radius as f64 / 2.0;
    let inv_two_sigma2 = 1.0 / (2.0 * sigma * sigma);

    let mut c = start.coords;
    for _ in 0..params.max_iters.max(1) {
        let mut a = Matrix2::<f64>::zeros();
        let mut b = Vector2::<f64>::zeros();
        for dy in -r..=r {
            for dx in -r..=r {
                let q = c + Vector2::new(dx as f64, dy as f64);
                let gx = 0.5
                    * (sample_bilinear(img, q.x + 1.0, q.y) - sample_bilinear(img, q.x - 1.0, q.y));
                let gy = 0.5
                    * (sample_bilinear(img, q.x, q.y + 1.0) - sample_bilinear(img, q.x, q.y - 1.0));
                let w = (-((dx * dx + dy * dy) as f64) * inv_two_sigma2).exp();
                let g = Vector2::new(gx, gy);
                let ggt = g * g.transpose() * w;
                a += ggt;
                b += ggt * q;
            }
        }
        let Some(inv) = a.try_inverse() else {
            return start;
        };
        let next = inv * b;
        let step = (next - c).norm();
        c = next;
        if (c - start.coords).norm() > params.window_radius as f64 {
            return start;
        }
        if step < params.eps {
            break;
        }
    }
    Point2::from(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Anti-aliased saddle centred at `(cx, cy)`.
    fn saddle(cx: f64, cy: f64) -> GrayImage {
        GrayImage::from_fn(40, 40, |x, y| {
            let mut acc = 0.0_f64;
            for sy in 0..4 {
                for sx in 0..4 {
                    let px = x as f64 + (sx as f64 + 0.5) / 4.0 - 0.5;
                    let py = y as f64 + (sy as f64 + 0.5) / 4.0 - 0.5;
                    let dark = (px < cx) == (py < cy);
                    acc += if dark { 20.0 } else { 230.0 };
                }
            }
            Luma([(acc / 16.0).round() as u8])
        })
    }

    #[test]
    fn converges_to_saddle() {
        let img = saddle(19.3, 20.6);
        let refined = refine_corner(&img, Point2::new(18.0, 22.0), &SubPixParams::default());
        assert!((refined.x - 19.3).abs() < 0.1, "{refined:?}");
        assert!((refined.y - 20.6).abs() < 0.1, "{refined:?}");
    }

    #[test]
    fn flat_patch_keeps_start() {
        let img = GrayImage::from_pixel(20, 20, Luma([128]));
        let start = Point2::new(10.0, 10.0);
        assert_eq!(refine_corner(&img, start, &SubPixParams::default()), start);
    }
}
