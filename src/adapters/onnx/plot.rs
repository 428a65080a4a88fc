use image::{Rgb, RgbImage};

use crate::domain::detection::Detection;

const LINE_WIDTH: u32 = 3;

// Paleta en orden BGR, indexada por clase.
const PALETTE_BGR: [[u8; 3]; 6] = [
    [56, 56, 255],
    [151, 157, 255],
    [31, 112, 255],
    [29, 178, 255],
    [49, 210, 207],
    [10, 249, 72],
];

/// Dibuja las cajas como el plotter del exportador: sobre un lienzo BGR.
/// Quien llama debe invertir los canales antes de mostrarla.
pub fn plot_bgr(rgb: &RgbImage, boxes: &[Detection]) -> RgbImage {
    let mut canvas = rgb.clone();
    for px in canvas.pixels_mut() {
        px.0.swap(0, 2);
    }
    for det in boxes {
        draw_box(&mut canvas, det, Rgb(PALETTE_BGR[det.class_id % PALETTE_BGR.len()]));
    }
    canvas
}

fn draw_box(img: &mut RgbImage, det: &Detection, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let clamp_x = |v: f32| (v.max(0.0) as u32).min(w - 1);
    let clamp_y = |v: f32| (v.max(0.0) as u32).min(h - 1);
    let (x1, y1, x2, y2) = (clamp_x(det.x1), clamp_y(det.y1), clamp_x(det.x2), clamp_y(det.y2));
    if x2 < x1 || y2 < y1 {
        return;
    }

    for t in 0..LINE_WIDTH {
        let top = (y1 + t).min(y2);
        let bottom = y2.saturating_sub(t).max(y1);
        for x in x1..=x2 {
            img.put_pixel(x, top, color);
            img.put_pixel(x, bottom, color);
        }
        let left = (x1 + t).min(x2);
        let right = x2.saturating_sub(t).max(x1);
        for y in y1..=y2 {
            img.put_pixel(left, y, color);
            img.put_pixel(right, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection { x1, y1, x2, y2, score: 0.9, class_id: 0, label: "apple".into() }
    }

    #[test]
    fn canvas_is_bgr() {
        let img = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        let out = plot_bgr(&img, &[]);
        assert_eq!(out.get_pixel(0, 0), &Rgb([3, 2, 1]));
    }

    #[test]
    fn box_outline_is_drawn_and_interior_left_alone() {
        let img = RgbImage::new(40, 40);
        let out = plot_bgr(&img, &[det(5.0, 5.0, 30.0, 30.0)]);
        assert_eq!(out.get_pixel(5, 5), &Rgb(PALETTE_BGR[0]));
        assert_eq!(out.get_pixel(30, 17), &Rgb(PALETTE_BGR[0]));
        assert_eq!(out.get_pixel(17, 17), &Rgb([0, 0, 0]));
    }

    #[test]
    fn boxes_outside_the_frame_are_clamped() {
        let img = RgbImage::new(10, 10);
        let out = plot_bgr(&img, &[det(-20.0, -20.0, 50.0, 50.0)]);
        assert_eq!(out.get_pixel(9, 9), &Rgb(PALETTE_BGR[0]));
    }
}
