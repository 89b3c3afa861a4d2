/// An owned, row-major RGBA8 pixel buffer.
///
/// Each pixel is a single `u32` with the red channel in the lowest byte and
/// alpha in the highest, matching the layout the encoder kernels consume.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    data: Vec<u32>,
}

impl Bitmap {
    /// Create a zero-filled bitmap.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    /// Wrap existing pixel data. `data` must hold exactly `width * height`
    /// pixels.
    pub fn from_data(width: u32, height: u32, data: Vec<u32>) -> Self {
        assert_eq!(data.len(), width as usize * height as usize);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u32] {
        &mut self.data
    }

    /// The pixel data viewed as RGBA bytes.
    pub fn data_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub(crate) fn data_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.data)
    }

    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.data[(y * self.width + x) as usize]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, value: u32) {
        self.data[(y * self.width + x) as usize] = value;
    }
}

#[cfg(feature = "image")]
impl Bitmap {
    /// Copy the pixels of `image` into a new bitmap.
    pub fn from_image(image: &image::RgbaImage) -> Self {
        let data = image
            .as_raw()
            .chunks_exact(4)
            .map(|rgba| u32::from_le_bytes([rgba[0], rgba[1], rgba[2], rgba[3]]))
            .collect();
        Self {
            width: image.width(),
            height: image.height(),
            data,
        }
    }

    /// Convert the bitmap into an [image::RgbaImage].
    pub fn to_image(&self) -> Option<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.data_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_byte_order() {
        let mut bitmap = Bitmap::new(4, 4);
        bitmap.set_pixel(1, 0, 0xFF00_10FF);
        assert_eq!(&bitmap.data_bytes()[4..8], &[0xFF, 0x10, 0x00, 0xFF]);
    }

    #[test]
    fn from_data_dimensions() {
        let bitmap = Bitmap::from_data(2, 2, vec![1, 2, 3, 4]);
        assert_eq!(bitmap.pixel(0, 0), 1);
        assert_eq!(bitmap.pixel(1, 1), 4);
    }
}
