use serde::Deserialize;

use crate::device::{Filter, Rect, TextureSlice};

/// Mapping from the rendered image to the presentation rectangle.
///
/// Backends whose framebuffer origin differs from the swap image origin
/// present with `FlipVertical`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentTransform {
    #[default]
    Identity,
    FlipVertical,
}

impl PresentTransform {
    /// Destination rectangle for a source region. A flipped rectangle has
    /// its origin on the bottom edge and a negative height.
    pub fn destination(self, source: Rect) -> Rect {
        match self {
            PresentTransform::Identity => source,
            PresentTransform::FlipVertical => {
                Rect::new(source.x, source.y + source.h, source.w, -source.h)
            }
        }
    }
}

/// Presentation step of a frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PresentPlan {
    pub source: TextureSlice,
    pub transform: PresentTransform,
    pub filter: Filter,
}

impl PresentPlan {
    pub fn destination(&self) -> Rect {
        self.transform.destination(self.source.rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_moves_origin_to_bottom_edge() {
        let src = Rect::from_size(1280, 720);
        assert_eq!(PresentTransform::FlipVertical.destination(src), Rect::new(0, 720, 1280, -720));
        assert_eq!(PresentTransform::Identity.destination(src), src);
    }

    #[test]
    fn flipped_destination_covers_the_same_area() {
        let src = Rect::new(10, 20, 30, 40);
        let flipped = PresentTransform::FlipVertical.destination(src);
        assert_eq!(flipped.normalized(), src);
    }
}
