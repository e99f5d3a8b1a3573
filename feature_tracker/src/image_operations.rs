use crate::types::*;


pub use conversion_module::*; // Re-export to higher module
mod conversion_module {
    use super::*;
    use image::{GrayImage, Luma, Pixel};

    /// Return the image as intensities between 0 and 1
    pub fn to_float_image(in_image: &GrayImage) -> FloatGrayImage {
        FloatGrayImage::from_fn(in_image.width(), in_image.height(), |col, row| {
            Luma([(in_image.get_pixel(col, row).channels()[0] as f32) / 255.0])
        })
    }
}



pub use interpolation_module::*; // Re-export to higher module
mod interpolation_module {
    use super::*;
    use image::GrayImage;

    /// Single channel raster sampled by the trackers.
    ///
    /// Coordinates follow the (row, col) convention: `row` runs along the image height
    /// and `col` along the width.
    pub trait IntensityImage: Sync {
        fn width(&self) -> u32;
        fn height(&self) -> u32;

        /// Raw intensity at an integer location. Panics when out of the raster.
        fn intensity(&self, row: u32, col: u32) -> Float;

        /// Bilinear sample, `None` when the 2x2 stencil would leave the raster.
        #[inline]
        fn sample(&self, row: Float, col: Float) -> Option<Float> {
            let max_row = (self.height() as Float) - 1.0;
            let max_col = (self.width() as Float) - 1.0;
            // Written so that NaN coordinates fall through to None.
            if row >= 0.0 && col >= 0.0 && row < max_row && col < max_col {
                Some(self.sample_unchecked(row, col))
            } else {
                None
            }
        }

        /// Bilinear sample without validity check. The caller has already made sure the
        /// stencil fits, e.g. through a previous `sample` at the same location.
        #[inline]
        fn sample_unchecked(&self, row: Float, col: Float) -> Float {
            let int_row = row.floor();
            let int_col = col.floor();
            let dec_row = row - int_row;
            let dec_col = col - int_col;
            let (r, c) = (int_row as u32, int_col as u32);

            let w_top_left = (1.0 - dec_row) * (1.0 - dec_col);
            let w_top_right = (1.0 - dec_row) * dec_col;
            let w_bottom_left = dec_row * (1.0 - dec_col);
            let w_bottom_right = dec_row * dec_col;

            // Zero-weight neighbours are skipped so integer locations on the last
            // row/column never read past the raster.
            let mut value = w_top_left * self.intensity(r, c);
            if w_top_right != 0.0 {
                value += w_top_right * self.intensity(r, c + 1);
            }
            if w_bottom_left != 0.0 {
                value += w_bottom_left * self.intensity(r + 1, c);
            }
            if w_bottom_right != 0.0 {
                value += w_bottom_right * self.intensity(r + 1, c + 1);
            }
            value
        }
    }

    impl IntensityImage for FloatGrayImage {
        #[inline]
        fn width(&self) -> u32 {
            self.dimensions().0
        }
        #[inline]
        fn height(&self) -> u32 {
            self.dimensions().1
        }
        #[inline]
        fn intensity(&self, row: u32, col: u32) -> Float {
            let index = (row * self.dimensions().0 + col) as usize;
            self.as_raw()[index] as Float
        }
    }

    impl IntensityImage for GrayImage {
        #[inline]
        fn width(&self) -> u32 {
            self.dimensions().0
        }
        #[inline]
        fn height(&self) -> u32 {
            self.dimensions().1
        }
        #[inline]
        fn intensity(&self, row: u32, col: u32) -> Float {
            let index = (row * self.dimensions().0 + col) as usize;
            self.as_raw()[index] as Float
        }
    }

    /// Whether `pixel` (x = col, y = row) lies in `[0, width-1] x [0, height-1]`.
    #[inline]
    pub fn contains_pixel<I: IntensityImage>(image: &I, pixel: &Vec2) -> bool {
        let max_x = (image.width() as Float) - 1.0;
        let max_y = (image.height() as Float) - 1.0;
        pixel.x >= 0.0 && pixel.x <= max_x && pixel.y >= 0.0 && pixel.y <= max_y
    }


}
