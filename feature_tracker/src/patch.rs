use crate::image_operations::IntensityImage;
use crate::types::*;

/// Rectangular patch centred on a feature.
///
/// The window spans `[-row_half_size, row_half_size] x [-col_half_size, col_half_size]`
/// pixel offsets around the centre.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PatchWindow {
    pub row_half_size: u32,
    pub col_half_size: u32,
}

impl PatchWindow {
    pub fn new(row_half_size: u32, col_half_size: u32) -> Self {
        Self { row_half_size, col_half_size }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        (2 * self.row_half_size + 1) as usize
    }

    #[inline]
    pub fn cols(&self) -> usize {
        (2 * self.col_half_size + 1) as usize
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.rows() * self.cols()
    }

    /// The same window padded by one pixel on every side.
    #[inline]
    pub fn extended(&self) -> PatchWindow {
        PatchWindow::new(self.row_half_size + 1, self.col_half_size + 1)
    }

    /// Row-major `(drow, dcol)` offsets, matching the layout of every per-pixel buffer.
    pub fn offsets(&self) -> impl Iterator<Item = (i32, i32)> + use<> {
        let row_half = self.row_half_size as i32;
        let col_half = self.col_half_size as i32;
        (-row_half..=row_half)
            .flat_map(move |drow| (-col_half..=col_half).map(move |dcol| (drow, dcol)))
    }
}


/// Reference patch plus its one pixel border, sampled once per feature.
///
/// Buffers are reserved for the configured window and only cleared between features.
#[derive(Clone, Debug)]
pub struct ExtendedPatch {
    window: PatchWindow,
    values: Vec<Float>,
    valid: Vec<bool>,
}

impl ExtendedPatch {
    pub fn new(window: PatchWindow) -> Self {
        let mut patch = Self { window, values: Vec::new(), valid: Vec::new() };
        patch.reserve(window);
        patch
    }

    /// Size the buffers for `window` (the non-extended patch geometry).
    pub fn reserve(&mut self, window: PatchWindow) {
        self.window = window;
        let ex_size = window.extended().size();
        self.values.clear();
        self.valid.clear();
        self.values.reserve(ex_size);
        self.valid.reserve(ex_size);
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.valid.clear();
    }

    /// Sample the extended window around `ref_pixel`. Returns how many samples are valid.
    pub fn extract<I: IntensityImage>(&mut self, ref_image: &I, ref_pixel: &Vec2) -> usize {
        self.clear();
        let mut valid_pixel_num = 0;
        for (drow, dcol) in self.window.extended().offsets() {
            let row = ref_pixel.y + drow as Float;
            let col = ref_pixel.x + dcol as Float;
            match ref_image.sample(row, col) {
                Some(value) => {
                    self.values.push(value);
                    self.valid.push(true);
                    valid_pixel_num += 1;
                }
                None => {
                    self.values.push(0.0);
                    self.valid.push(false);
                }
            }
        }
        valid_pixel_num
    }

    #[inline]
    pub fn window(&self) -> PatchWindow {
        self.window
    }

    #[inline]
    pub fn ex_cols(&self) -> usize {
        self.window.cols() + 2
    }

    #[inline]
    pub fn value(&self, ex_index: usize) -> Float {
        self.values[ex_index]
    }

    #[inline]
    pub fn is_valid(&self, ex_index: usize) -> bool {
        self.valid[ex_index]
    }

    /// Index in the extended buffers of the patch pixel `(row, col)` (0-based, non-extended).
    #[inline]
    pub fn ex_index(&self, row: usize, col: usize) -> usize {
        (row + 1) * self.ex_cols() + col + 1
    }
}


/// Central-difference derivatives of every patch pixel of an `ExtendedPatch`.
#[derive(Clone, Debug, Default)]
pub struct PatchDerivatives {
    dx: Vec<Float>,
    dy: Vec<Float>,
    valid: Vec<bool>,
}

impl PatchDerivatives {
    pub fn new(window: PatchWindow) -> Self {
        let mut derivatives = Self::default();
        derivatives.reserve(window);
        derivatives
    }

    pub fn reserve(&mut self, window: PatchWindow) {
        self.clear();
        self.dx.reserve(window.size());
        self.dy.reserve(window.size());
        self.valid.reserve(window.size());
    }

    pub fn clear(&mut self) {
        self.dx.clear();
        self.dy.clear();
        self.valid.clear();
    }

    /// Fill from `patch`. A pixel gets a derivative only when its left, right, top and
    /// bottom neighbours are all valid; otherwise both derivatives are zero.
    /// Returns how many pixels have a derivative.
    pub fn compute(&mut self, patch: &ExtendedPatch) -> usize {
        self.clear();
        let window = patch.window();
        let ex_cols = patch.ex_cols();
        let mut valid_num = 0;
        for row in 0..window.rows() {
            for col in 0..window.cols() {
                let ex_index = patch.ex_index(row, col);
                let left = ex_index - 1;
                let right = ex_index + 1;
                let top = ex_index - ex_cols;
                let bottom = ex_index + ex_cols;

                if patch.is_valid(left) && patch.is_valid(right)
                    && patch.is_valid(top) && patch.is_valid(bottom)
                {
                    self.dx.push(patch.value(right) - patch.value(left));
                    self.dy.push(patch.value(bottom) - patch.value(top));
                    self.valid.push(true);
                    valid_num += 1;
                } else {
                    self.dx.push(0.0);
                    self.dy.push(0.0);
                    self.valid.push(false);
                }
            }
        }
        valid_num
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<(Float, Float)> {
        self.valid[index].then(|| (self.dx[index], self.dy[index]))
    }

    pub fn len(&self) -> usize {
        self.valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }
}


/// Per-offset validity flags of a patch, in `PatchWindow::offsets` order.
#[derive(Clone, Debug, Default)]
pub struct PatchMask {
    valid: Vec<bool>,
}

impl PatchMask {
    pub fn new(window: PatchWindow) -> Self {
        Self { valid: Vec::with_capacity(window.size()) }
    }

    pub fn reserve(&mut self, window: PatchWindow) {
        self.valid.clear();
        self.valid.reserve(window.size());
    }

    pub fn clear(&mut self) {
        self.valid.clear();
    }

    #[inline]
    pub fn push(&mut self, valid: bool) {
        self.valid.push(valid);
    }

    #[inline]
    pub fn is_valid(&self, index: usize) -> bool {
        self.valid[index]
    }
}
