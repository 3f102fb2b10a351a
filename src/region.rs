//! Axis-aligned pixel regions.

use std::str::FromStr;

use crate::error::Error;

/// A rectangle in frame coordinates, half-open on the right and bottom edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Area of the shape this region was derived from. For plain rectangles
    /// this is `width * height`; for traced outlines it is the polygon area.
    pub area: f64,
}

impl Region {
    /// Create a rectangular region whose area is its pixel count.
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            area: f64::from(width) * f64::from(height),
        }
    }

    /// Grow the region by `pad` pixels on every side, clipped to `(frame_w, frame_h)`.
    #[must_use]
    pub fn padded(&self, pad: u32, frame_w: u32, frame_h: u32) -> Self {
        let x0 = self.x.saturating_sub(pad);
        let y0 = self.y.saturating_sub(pad);
        let x1 = (self.right() + pad).min(frame_w);
        let y1 = (self.bottom() + pad).min(frame_h);
        Self {
            x: x0,
            y: y0,
            width: x1.saturating_sub(x0),
            height: y1.saturating_sub(y0),
            area: self.area,
        }
    }

    /// Shift the region by `(dx, dy)`.
    #[must_use]
    pub fn translated(&self, dx: u32, dy: u32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// Exclusive right edge.
    #[must_use]
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    #[must_use]
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Whether `(px, py)` lies inside the region.
    #[must_use]
    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    /// Whether the region covers no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Parses `"x,y,w,h"`.
impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|e| Error::InvalidRegion(format!("{s}: {e}")))?;

        match parts.as_slice() {
            &[x, y, w, h] if w > 0 && h > 0 => Ok(Region::new(x, y, w, h)),
            &[_, _, _, _] => Err(Error::InvalidRegion(format!("{s}: empty rectangle"))),
            _ => Err(Error::InvalidRegion(format!(
                "{s}: expected four comma-separated values x,y,w,h"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_clips_to_frame() {
        let r = Region::new(2, 3, 10, 10).padded(5, 14, 100);
        assert_eq!((r.x, r.y), (0, 0));
        assert_eq!(r.right(), 14);
        assert_eq!(r.bottom(), 18);
    }

    #[test]
    fn translated_keeps_size_and_area() {
        let r = Region::new(1, 1, 4, 2).translated(10, 20);
        assert_eq!((r.x, r.y, r.width, r.height), (11, 21, 4, 2));
        assert!((r.area - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn contains_is_half_open() {
        let r = Region::new(5, 5, 2, 2);
        assert!(r.contains(5, 5));
        assert!(r.contains(6, 6));
        assert!(!r.contains(7, 6));
        assert!(!r.contains(4, 5));
    }

    #[test]
    fn parses_comma_separated_rect() {
        let r: Region = "10, 20,30,40".parse().unwrap();
        assert_eq!((r.x, r.y, r.width, r.height), (10, 20, 30, 40));
    }

    #[test]
    fn rejects_malformed_rects() {
        assert!("1,2,3".parse::<Region>().is_err());
        assert!("a,b,c,d".parse::<Region>().is_err());
        assert!("1,2,0,4".parse::<Region>().is_err());
    }
}
