//! Mask → polygon → label line conversion.
//!
//! Labels use the segmentation text format consumed by YOLO trainers:
//! `"<class_id> x1 y1 x2 y2 … xn yn"` with coordinates normalized to the
//! mask size and printed with exactly six decimals.

use anyhow::{anyhow, Context, Result};
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;

/// Default Douglas–Peucker tolerance as a fraction of the contour perimeter.
pub const DEFAULT_EPSILON_FACTOR: f64 = 0.001;

/// Contours enclosing less than this many square pixels are treated as noise.
pub const MIN_CONTOUR_AREA: f64 = 10.0;

/// Ordered outline with coordinates in `[0, 1]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Polygon {
    points: Vec<(f64, f64)>,
}

impl Polygon {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Area-weighted centroid; falls back to the vertex mean for degenerate outlines.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.points.is_empty() {
            return None;
        }
        let n = self.points.len();
        let mut area2 = 0.0;
        let mut cx = 0.0;
        let mut cy = 0.0;
        for i in 0..n {
            let (x0, y0) = self.points[i];
            let (x1, y1) = self.points[(i + 1) % n];
            let cross = x0 * y1 - x1 * y0;
            area2 += cross;
            cx += (x0 + x1) * cross;
            cy += (y0 + y1) * cross;
        }
        if area2.abs() < f64::EPSILON {
            let (sx, sy) = self
                .points
                .iter()
                .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
            return Some((sx / n as f64, sy / n as f64));
        }
        Some((cx / (3.0 * area2), cy / (3.0 * area2)))
    }
}

/// Shoelace area of a closed pixel contour.
pub(crate) fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut acc: i64 = 0;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        acc += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    (acc as f64).abs() / 2.0
}

/// Outer borders that are not nested inside another region.
///
/// Border following only reports an outer border for regions surrounded by
/// background, so the mask is traced inside a one pixel zero frame and the
/// points are shifted back into mask coordinates.
pub(crate) fn external_contours(mask: &GrayImage) -> Vec<Contour<i32>> {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let mut padded = GrayImage::new(w + 2, h + 2);
    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] != 0 {
            padded.put_pixel(x + 1, y + 1, Luma([255]));
        }
    }
    let (max_x, max_y) = (w as i32 - 1, h as i32 - 1);
    find_contours::<i32>(&padded)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|mut c| {
            for p in &mut c.points {
                p.x = (p.x - 1).clamp(0, max_x);
                p.y = (p.y - 1).clamp(0, max_y);
            }
            c
        })
        .collect()
}

/// Convert a binary mask (non-zero = foreground) into normalized polygons.
///
/// One polygon per external region whose area is at least `MIN_CONTOUR_AREA`.
pub fn mask_to_polygons(mask: &GrayImage, epsilon_factor: f64) -> Vec<Polygon> {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let (w, h) = (w as f64, h as f64);

    let mut polygons = Vec::new();
    for contour in external_contours(mask) {
        if contour_area(&contour.points) < MIN_CONTOUR_AREA {
            continue;
        }
        let epsilon = epsilon_factor * arc_length(&contour.points, true);
        let approx = approximate_polygon_dp(&contour.points, epsilon, true);
        if approx.is_empty() {
            continue;
        }
        let points = approx
            .iter()
            .map(|p| {
                (
                    (p.x as f64 / w).clamp(0.0, 1.0),
                    (p.y as f64 / h).clamp(0.0, 1.0),
                )
            })
            .collect();
        polygons.push(Polygon::new(points));
    }
    polygons
}

/// One label line per polygon, all sharing `class_id`.
pub fn format_label(class_id: u32, polygons: &[Polygon]) -> Vec<String> {
    polygons
        .iter()
        .map(|polygon| {
            let mut line = class_id.to_string();
            for (x, y) in polygon.points() {
                line.push_str(&format!(" {:.6} {:.6}", x, y));
            }
            line
        })
        .collect()
}

/// Parse a single label line back into its class id and polygon.
pub fn parse_label_line(line: &str) -> Result<(u32, Polygon)> {
    let mut fields = line.split_whitespace();
    let class_id: u32 = fields
        .next()
        .ok_or_else(|| anyhow!("empty label line"))?
        .parse()
        .context("label class id is not an integer")?;
    let coords = fields
        .map(|f| f.parse::<f64>().with_context(|| format!("bad coordinate '{}'", f)))
        .collect::<Result<Vec<_>>>()?;
    if coords.len() % 2 != 0 {
        return Err(anyhow!(
            "label line has an odd number of coordinates ({})",
            coords.len()
        ));
    }
    if coords.iter().any(|c| !(0.0..=1.0).contains(c)) {
        return Err(anyhow!("label coordinate outside [0, 1]"));
    }
    let points = coords.chunks_exact(2).map(|c| (c[0], c[1])).collect();
    Ok((class_id, Polygon::new(points)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_circle(w: u32, h: u32, r: f64) -> GrayImage {
        let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
        GrayImage::from_fn(w, h, |x, y| {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            if dx * dx + dy * dy <= r * r {
                Luma([1])
            } else {
                Luma([0])
            }
        })
    }

    fn filled_rect(mask: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) {
        for y in y0..y1 {
            for x in x0..x1 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    #[test]
    fn empty_mask_yields_no_polygons() {
        let mask = GrayImage::new(64, 48);
        assert!(mask_to_polygons(&mask, DEFAULT_EPSILON_FACTOR).is_empty());
    }

    #[test]
    fn specks_below_min_area_are_dropped() {
        let mut mask = GrayImage::new(32, 32);
        filled_rect(&mut mask, 4, 4, 6, 6);
        assert!(mask_to_polygons(&mask, DEFAULT_EPSILON_FACTOR).is_empty());
    }

    #[test]
    fn circle_centroid_is_mask_center() {
        let mask = filled_circle(320, 240, 60.0);
        let polygons = mask_to_polygons(&mask, DEFAULT_EPSILON_FACTOR);
        assert_eq!(polygons.len(), 1);
        let (cx, cy) = polygons[0].centroid().unwrap();
        assert!((cx - 0.5).abs() < 0.01, "cx = {}", cx);
        assert!((cy - 0.5).abs() < 0.01, "cy = {}", cy);
    }

    #[test]
    fn disjoint_regions_become_separate_lines() {
        let mut mask = GrayImage::new(100, 100);
        filled_rect(&mut mask, 5, 5, 30, 30);
        filled_rect(&mut mask, 60, 60, 95, 90);
        let polygons = mask_to_polygons(&mask, DEFAULT_EPSILON_FACTOR);
        assert_eq!(polygons.len(), 2);
        let lines = format_label(3, &polygons);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.starts_with("3 ")));
    }

    #[test]
    fn full_frame_mask_stays_in_unit_range() {
        let mut mask = GrayImage::new(40, 30);
        filled_rect(&mut mask, 0, 0, 40, 30);
        let polygons = mask_to_polygons(&mask, DEFAULT_EPSILON_FACTOR);
        assert!(!polygons.is_empty());
        for polygon in &polygons {
            for (x, y) in polygon.points() {
                assert!((0.0..=1.0).contains(x));
                assert!((0.0..=1.0).contains(y));
            }
        }
    }

    #[test]
    fn region_touching_left_edge_is_traced() {
        let mut mask = GrayImage::new(40, 30);
        filled_rect(&mut mask, 0, 8, 12, 22);
        let polygons = mask_to_polygons(&mask, DEFAULT_EPSILON_FACTOR);
        assert_eq!(polygons.len(), 1);
        let min_x = polygons[0]
            .points()
            .iter()
            .map(|(x, _)| *x)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(min_x, 0.0);
        let (cx, cy) = polygons[0].centroid().unwrap();
        assert!(cx < 0.2, "cx = {}", cx);
        assert!((cy - 0.5).abs() < 0.05, "cy = {}", cy);
    }

    #[test]
    fn region_in_corner_is_traced() {
        let mut mask = GrayImage::new(40, 30);
        filled_rect(&mut mask, 0, 0, 10, 10);
        let polygons = mask_to_polygons(&mask, DEFAULT_EPSILON_FACTOR);
        assert_eq!(polygons.len(), 1);
        assert!(polygons[0].points().contains(&(0.0, 0.0)));
    }

    #[test]
    fn region_touching_far_edges_is_clamped() {
        let mut mask = GrayImage::new(40, 30);
        filled_rect(&mut mask, 25, 15, 40, 30);
        let polygons = mask_to_polygons(&mask, DEFAULT_EPSILON_FACTOR);
        assert_eq!(polygons.len(), 1);
        for (x, y) in polygons[0].points() {
            assert!(*x <= 1.0 && *y <= 1.0);
        }
        let max_x = polygons[0]
            .points()
            .iter()
            .map(|(x, _)| *x)
            .fold(0.0, f64::max);
        assert!((max_x - 39.0 / 40.0).abs() < 1e-9);
    }

    #[test]
    fn format_uses_six_decimals() {
        let polygon = Polygon::new(vec![(0.5, 0.25), (1.0, 0.0), (0.123_456_789, 1.0)]);
        let lines = format_label(7, &[polygon]);
        assert_eq!(
            lines,
            vec!["7 0.500000 0.250000 1.000000 0.000000 0.123457 1.000000".to_string()]
        );
    }

    #[test]
    fn parse_rejects_odd_coordinates() {
        assert!(parse_label_line("1 0.1 0.2 0.3").is_err());
        assert!(parse_label_line("").is_err());
        assert!(parse_label_line("x 0.1 0.2").is_err());
        assert!(parse_label_line("1 0.1 1.2").is_err());
    }

    #[test]
    fn formatted_lines_parse_back() {
        let mask = filled_circle(200, 150, 40.0);
        let polygons = mask_to_polygons(&mask, DEFAULT_EPSILON_FACTOR);
        let lines = format_label(12, &polygons);
        for (line, polygon) in lines.iter().zip(&polygons) {
            let (class_id, parsed) = parse_label_line(line).unwrap();
            assert_eq!(class_id, 12);
            assert_eq!(parsed.len(), polygon.len());
            for (a, b) in parsed.points().iter().zip(polygon.points()) {
                assert!((a.0 - b.0).abs() <= 1e-6);
                assert!((a.1 - b.1).abs() <= 1e-6);
            }
        }
    }
}
