use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DisplayBudget;
use crate::error::{OtolithError, Result};
use crate::rect::Rectangle;

/// Scale between the original image and its preview
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImageScale {
    /// preview = original × scale
    pub scale: f64,
    pub width: u32,
    pub height: u32,
}

/// Maps rectangles between preview space and original-image pixels.
///
/// All mapping fails with [`OtolithError::UninitializedScale`] until
/// [`CoordinateMapper::set_image`] has been called for the current image.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CoordinateMapper {
    image: Option<ImageScale>,
}

impl CoordinateMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest scale in (0, 1] at which the image fits the display budget
    pub fn fit_scale(width: u32, height: u32, budget: &DisplayBudget) -> f64 {
        if width == 0 || height == 0 {
            return 1.0;
        }
        let sx = f64::from(budget.max_width) / f64::from(width);
        let sy = f64::from(budget.max_height) / f64::from(height);
        sx.min(sy).min(1.0)
    }

    pub fn set_image(&mut self, scale: f64, width: u32, height: u32) -> Result<()> {
        if !scale.is_finite() || scale <= 0.0 || scale > 1.0 {
            return Err(OtolithError::InvalidScale(scale));
        }
        if width == 0 || height == 0 {
            return Err(OtolithError::InvalidGeometry(format!(
                "image dimensions {width}x{height} are empty"
            )));
        }
        debug!("Mapping {}x{} image at scale {:.4}", width, height, scale);
        self.image = Some(ImageScale { scale, width, height });
        Ok(())
    }

    pub fn clear(&mut self) {
        self.image = None;
    }

    pub fn image(&self) -> Option<ImageScale> {
        self.image
    }

    pub fn scale(&self) -> Result<f64> {
        Ok(self.current()?.scale)
    }

    pub fn original_size(&self) -> Result<(u32, u32)> {
        let image = self.current()?;
        Ok((image.width, image.height))
    }

    /// Preview dimensions, truncated to whole pixels and never zero
    pub fn preview_size(&self) -> Result<(u32, u32)> {
        let image = self.current()?;
        let scaled = |v: u32| ((f64::from(v) * image.scale).floor() as u32).max(1);
        Ok((scaled(image.width), scaled(image.height)))
    }

    /// Divide by the scale and clamp to the image bounds
    pub fn to_original(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> Result<[f64; 4]> {
        let image = self.current()?;
        let (w, h) = (f64::from(image.width), f64::from(image.height));
        let mapped = [
            (x1 / image.scale).clamp(0.0, w),
            (y1 / image.scale).clamp(0.0, h),
            (x2 / image.scale).clamp(0.0, w),
            (y2 / image.scale).clamp(0.0, h),
        ];
        let [mx1, my1, mx2, my2] = mapped;
        if mapped.iter().any(|v| !v.is_finite()) || mx1 >= mx2 || my1 >= my2 {
            return Err(OtolithError::InvalidRectangle { x1: mx1, y1: my1, x2: mx2, y2: my2 });
        }
        Ok(mapped)
    }

    pub fn rect_to_original(&self, rect: &Rectangle) -> Result<[f64; 4]> {
        self.to_original(rect.x1(), rect.y1(), rect.x2(), rect.y2())
    }

    /// Multiply original-image coordinates by the scale
    pub fn to_preview(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> Result<[f64; 4]> {
        let scale = self.scale()?;
        Ok([x1 * scale, y1 * scale, x2 * scale, y2 * scale])
    }

    fn current(&self) -> Result<ImageScale> {
        self.image.ok_or(OtolithError::UninitializedScale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper(scale: f64, width: u32, height: u32) -> CoordinateMapper {
        let mut mapper = CoordinateMapper::new();
        mapper.set_image(scale, width, height).unwrap();
        mapper
    }

    #[test]
    fn test_uninitialized_scale() {
        let mapper = CoordinateMapper::new();
        assert!(matches!(
            mapper.to_original(0.0, 0.0, 10.0, 10.0),
            Err(OtolithError::UninitializedScale)
        ));
        assert!(matches!(mapper.preview_size(), Err(OtolithError::UninitializedScale)));
    }

    #[test]
    fn test_invalid_scale_rejected() {
        let mut mapper = CoordinateMapper::new();
        for scale in [0.0, -0.5, 1.5, f64::NAN] {
            assert!(matches!(mapper.set_image(scale, 100, 100), Err(OtolithError::InvalidScale(_))));
        }
        assert!(mapper.image().is_none());
    }

    #[test]
    fn test_to_original_divides_and_clamps() {
        let mapper = mapper(0.25, 4000, 3000);
        assert_eq!(mapper.to_original(100.0, 50.0, 200.0, 150.0).unwrap(), [400.0, 200.0, 800.0, 600.0]);
        // preview box hanging off the right and bottom edges
        assert_eq!(
            mapper.to_original(950.0, 700.0, 1020.0, 760.0).unwrap(),
            [3800.0, 2800.0, 4000.0, 3000.0]
        );
    }

    #[test]
    fn test_to_original_outside_image_is_invalid() {
        let mapper = mapper(0.5, 100, 100);
        assert!(matches!(
            mapper.to_original(60.0, 10.0, 80.0, 20.0),
            Err(OtolithError::InvalidRectangle { .. })
        ));
    }

    #[test]
    fn test_round_trip_within_one_pixel() {
        let mapper = mapper(0.3, 5000, 4000);
        let original = [1234.0, 567.0, 1890.0, 999.0];
        let [px1, py1, px2, py2] = mapper.to_preview(original[0], original[1], original[2], original[3]).unwrap();
        let back = mapper.to_original(px1, py1, px2, py2).unwrap();
        for (a, b) in original.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1.0);
        }
    }

    #[test]
    fn test_fit_scale_respects_budget() {
        let budget = DisplayBudget { max_width: 1600, max_height: 900 };
        assert_eq!(CoordinateMapper::fit_scale(800, 600, &budget), 1.0);
        assert!((CoordinateMapper::fit_scale(6400, 3000, &budget) - 0.25).abs() < 1e-12);
        assert!((CoordinateMapper::fit_scale(3200, 3600, &budget) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_preview_size() {
        let mapper = mapper(0.25, 4001, 3000);
        assert_eq!(mapper.preview_size().unwrap(), (1000, 750));
        assert_eq!(mapper.original_size().unwrap(), (4001, 3000));
    }
}
