/// Borrowed 8-bit grayscale image.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

/// Owned 8-bit grayscale image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl<'a> GrayImageView<'a> {
    /// Wrap a row-major buffer. Returns `None` when the length does not match.
    pub fn new(width: usize, height: usize, data: &'a [u8]) -> Option<Self> {
        (width.checked_mul(height)? == data.len()).then_some(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Pixel at `(x, y)`. Callers guarantee the coordinates are in bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn row(&self, y: usize) -> &'a [u8] {
        let start = y * self.width;
        &self.data[start..start + self.width]
    }
}

impl GrayImage {
    /// Black image of the given size.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    /// Take ownership of a row-major buffer. Returns `None` when the length does not match.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Option<Self> {
        (width.checked_mul(height)? == data.len()).then_some(Self {
            width,
            height,
            data,
        })
    }

    /// Build an image by evaluating `f(x, y)` for every pixel in row-major order.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> u8) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

/// Halve both dimensions with a 2×2 box filter.
///
/// Output size is `floor(w / 2) × floor(h / 2)`; an odd trailing row or
/// column is dropped. Each output pixel is the truncated integer mean of its
/// four source pixels, so the result is exact and platform independent.
pub fn downsample_2x(src: &GrayImageView<'_>) -> GrayImage {
    let w2 = src.width / 2;
    let h2 = src.height / 2;
    let mut dst = GrayImage::new(w2, h2);

    for y in 0..h2 {
        let r0 = src.row(2 * y);
        let r1 = src.row(2 * y + 1);
        let out = &mut dst.data[y * w2..(y + 1) * w2];
        for (x, px) in out.iter_mut().enumerate() {
            let sx = 2 * x;
            let sum = r0[sx] as u16 + r0[sx + 1] as u16 + r1[sx] as u16 + r1[sx + 1] as u16;
            *px = (sum / 4) as u8;
        }
    }

    dst
}

/// Linear contrast stretch around `mean`: `clamp((p - mean) * factor + mean)`.
pub fn enhance_contrast(src: &GrayImageView<'_>, mean: f64, factor: f64) -> GrayImage {
    // 256-entry lookup keeps the per-pixel work to a single index.
    let mut lut = [0u8; 256];
    for (v, slot) in lut.iter_mut().enumerate() {
        let stretched = (v as f64 - mean) * factor + mean;
        *slot = stretched.round().clamp(0.0, 255.0) as u8;
    }

    GrayImage {
        width: src.width,
        height: src.height,
        data: src.data.iter().map(|&p| lut[p as usize]).collect(),
    }
}
