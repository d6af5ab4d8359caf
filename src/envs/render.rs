//! Top-down drawing of the arena with `plotters`.
//!
//! World coordinates have `y` pointing up; pixel rows grow downward, so every
//! point is flipped against the arena height before drawing.

use std::path::Path;

use nalgebra::Vector2;
use plotters::{coord::Shift, prelude::*};

use super::{entity::Role, Frame};
use crate::{Error, Result};

const BACKGROUND: RGBColor = RGBColor(0, 25, 20);
const PREDATOR_FILL: RGBColor = RGBColor(255, 150, 120);
const PREY_FILL: RGBColor = RGBColor(155, 200, 255);
const HEADING: RGBColor = RGBColor(255, 0, 0);

/// Everything the renderer needs to know about one body.
#[derive(Debug, Clone, Copy)]
pub struct Sprite {
    pub position: Vector2<f32>,
    pub angle: f32,
    pub radius: f32,
    pub role: Role,
}

fn draw_err<E: std::fmt::Debug>(e: E) -> Error {
    Error::Render(format!("{:?}", e))
}

pub fn draw_scene<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    height: u32,
    sprites: &[Sprite],
) -> Result<()> {
    root.fill(&BACKGROUND).map_err(draw_err)?;
    for sprite in sprites {
        let centre = (
            sprite.position.x as i32,
            height as i32 - sprite.position.y as i32,
        );
        let tip = (
            centre.0 + (sprite.radius * sprite.angle.cos()) as i32,
            centre.1 - (sprite.radius * sprite.angle.sin()) as i32,
        );
        let fill = match sprite.role {
            Role::Predator => PREDATOR_FILL,
            Role::Prey => PREY_FILL,
        };
        root.draw(&Circle::new(centre, sprite.radius as u32, fill.filled()))
            .map_err(draw_err)?;
        root.draw(&PathElement::new(vec![centre, tip], HEADING.stroke_width(2)))
            .map_err(draw_err)?;
    }
    Ok(())
}

/// Renders one frame into an owned RGB buffer.
pub fn rasterize(width: u32, height: u32, sprites: &[Sprite]) -> Result<Frame> {
    let mut rgb = vec![0u8; (width * height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut rgb, (width, height)).into_drawing_area();
        draw_scene(&root, height, sprites)?;
        root.present().map_err(draw_err)?;
    }
    Ok(Frame { width, height, rgb })
}

/// Appends one animation frame per `push` to a GIF file.
pub struct GifRecorder {
    root: DrawingArea<BitMapBackend<'static>, Shift>,
    height: u32,
    frames: usize,
}

impl GifRecorder {
    pub fn create(path: impl AsRef<Path>, width: u32, height: u32, fps: f32) -> Result<Self> {
        let delay_ms = (1000.0 / fps).round() as u32;
        let backend = BitMapBackend::gif(path.as_ref(), (width, height), delay_ms).map_err(draw_err)?;
        Ok(Self {
            root: backend.into_drawing_area(),
            height,
            frames: 0,
        })
    }

    pub fn push(&mut self, sprites: &[Sprite]) -> Result<()> {
        draw_scene(&self.root, self.height, sprites)?;
        self.root.present().map_err(draw_err)?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * frame.width + x) * 3) as usize;
        [frame.rgb[i], frame.rgb[i + 1], frame.rgb[i + 2]]
    }

    #[test]
    fn empty_arena_is_background() {
        let frame = rasterize(120, 80, &[]).unwrap();
        assert_eq!(pixel(&frame, 10, 10), [0, 25, 20]);
        assert_eq!(pixel(&frame, 119, 79), [0, 25, 20]);
    }

    #[test]
    fn bodies_are_drawn_with_y_flipped() {
        let sprite = Sprite {
            position: Vector2::new(30.0, 20.0),
            angle: std::f32::consts::PI,
            radius: 10.0,
            role: Role::Prey,
        };
        let frame = rasterize(120, 80, &[sprite]).unwrap();
        // world y = 20 lands on pixel row 60; the heading points left so the right side is untouched fill
        assert_eq!(pixel(&frame, 34, 60), [155, 200, 255]);
        assert_eq!(pixel(&frame, 34, 20), [0, 25, 20]);
    }

    #[test]
    fn gif_frames_are_counted() {
        let path = std::env::temp_dir().join(format!("ppmarl-render-{}.gif", std::process::id()));
        let mut gif = GifRecorder::create(&path, 64, 48, 30.0).unwrap();
        gif.push(&[]).unwrap();
        gif.push(&[]).unwrap();
        assert_eq!(gif.frames(), 2);
        drop(gif);
        assert!(path.exists());
        let _ = std::fs::remove_file(path);
    }
}
