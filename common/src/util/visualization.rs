use crate::db::core::DiagramDB;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect as ImageRect;
use std::path::Path;

/// Debug dump of a routed scenario: groups, nodes, link polylines and pads.
pub fn draw_routed_diagram(db: &DiagramDB, filename: &str, width: u32, height: u32) {
    let mut img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));

    let bounds = db.bounds();
    let margin = 20.0;
    let span_w = bounds.width() + 2.0 * margin;
    let span_h = bounds.height() + 2.0 * margin;
    if span_w <= 0.0 || span_h <= 0.0 {
        return;
    }

    let scale = (width as f64 / span_w).min(height as f64 / span_h);
    let map = |x: f64, y: f64| {
        (
            (x - bounds.min.x + margin) * scale,
            (y - bounds.min.y + margin) * scale,
        )
    };

    let group_color = Rgba([90, 90, 140, 255]);
    let mut groups: Vec<_> = db.groups.iter().collect();
    groups.sort_by_key(|g| g.z);
    for group in groups {
        let (x, y) = map(group.rect.min.x, group.rect.min.y);
        let w = (group.rect.width() * scale).max(2.0);
        let h = (group.rect.height() * scale).max(2.0);
        let rect = ImageRect::at(x as i32, y as i32).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(&mut img, rect, group_color);
    }

    let node_color = Rgba([180, 60, 60, 255]);
    for node in &db.nodes {
        let (x, y) = map(node.rect.min.x, node.rect.min.y);
        let w = (node.rect.width() * scale).max(2.0);
        let h = (node.rect.height() * scale).max(2.0);
        let rect = ImageRect::at(x as i32, y as i32).of_size(w as u32, h as u32);
        draw_filled_rect_mut(&mut img, rect, node_color);
    }

    let colors = [
        Rgba([0, 110, 255, 255]),
        Rgba([0, 255, 100, 255]),
        Rgba([255, 215, 0, 255]),
        Rgba([180, 50, 255, 255]),
        Rgba([0, 240, 255, 255]),
    ];
    for (i, link) in db.links.iter().enumerate() {
        let color = colors[i % colors.len()];
        for w in link.route.windows(2) {
            let (x1, y1) = map(w[0].x, w[0].y);
            let (x2, y2) = map(w[1].x, w[1].y);
            draw_line_segment_mut(
                &mut img,
                (x1 as f32, y1 as f32),
                (x2 as f32, y2 as f32),
                color,
            );
        }
    }

    let pad_color = Rgba([255, 255, 255, 255]);
    for (ni, node) in db.nodes.iter().enumerate() {
        for pi in 0..node.pads.len() {
            let p = db.pad_position(crate::db::indices::NodeId::new(ni), pi);
            let (px, py) = map(p.x, p.y);
            let rect = ImageRect::at(px as i32 - 1, py as i32 - 1).of_size(3, 3);
            draw_filled_rect_mut(&mut img, rect, pad_color);
        }
    }

    if let Err(e) = img.save(Path::new(filename)) {
        log::warn!("Failed to write {}: {}", filename, e);
    }
}
