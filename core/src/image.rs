use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, RgbImage};

/// A batch of images as one flat NCHW buffer with values in [-1, 1].
///
/// This is the in-memory hand-off format from the training loop: whatever
/// tensor library produced the data, the reporter only needs the raw floats
/// and the dimensions.
#[derive(Clone, Debug)]
pub struct ImageBatch {
    data: Vec<f32>,
    batch: usize,
    channels: usize,
    height: usize,
    width: usize,
}

impl ImageBatch {
    pub fn new(
        data: Vec<f32>,
        batch: usize,
        channels: usize,
        height: usize,
        width: usize,
    ) -> Result<Self> {
        let expected = batch * channels * height * width;
        if data.len() != expected {
            anyhow::bail!(
                "buffer length {} does not match batch shape {}x{}x{}x{}",
                data.len(),
                batch,
                channels,
                height,
                width
            );
        }

        Ok(Self {
            data,
            batch,
            channels,
            height,
            width,
        })
    }

    /// A batch with every value set to `fill`. Handy for tests and warm-up
    /// placeholders.
    pub fn filled(batch: usize, channels: usize, height: usize, width: usize, fill: f32) -> Self {
        Self {
            data: vec![fill; batch * channels * height * width],
            batch,
            channels,
            height,
            width,
        }
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// The first `count` batch entries (fewer if the batch is smaller).
    pub fn head(&self, count: usize) -> Self {
        let keep = count.min(self.batch);
        let stride = self.channels * self.height * self.width;
        Self {
            data: self.data[..keep * stride].to_vec(),
            batch: keep,
            channels: self.channels,
            height: self.height,
            width: self.width,
        }
    }
}

/// Convert the first image of a batch into a displayable RGB image.
///
/// Values are mapped from [-1, 1] to [0, 255]; a single-channel image is
/// replicated across all three output channels.
pub fn to_display_image(images: &ImageBatch) -> Result<RgbImage> {
    if images.batch() == 0 {
        anyhow::bail!("cannot render an empty image batch");
    }
    let channels = images.channels();
    if channels != 1 && channels != 3 {
        anyhow::bail!("expected 1 or 3 channels, got {}", channels);
    }

    let height = images.height();
    let width = images.width();
    let plane = height * width;
    let data = images.data();

    let mut pixels = Vec::with_capacity(plane * 3);
    for row in 0..height {
        for col in 0..width {
            let offset = row * width + col;
            for channel in 0..3 {
                let source = if channels == 1 { 0 } else { channel };
                let value = data[source * plane + offset].clamp(-1.0, 1.0);
                pixels.push(((value + 1.0) / 2.0 * 255.0).round() as u8);
            }
        }
    }

    RgbImage::from_raw(width as u32, height as u32, pixels)
        .context("failed to assemble RGB image from pixel buffer")
}

/// Write an RGB image to `path` as PNG, stretching one axis when the aspect
/// ratio is not 1: above 1 the width grows by the ratio, below 1 the height
/// grows by its inverse.
pub fn save_image(image: &RgbImage, path: &Path, aspect_ratio: f64) -> Result<()> {
    let (width, height) = image.dimensions();

    let resized;
    let output = if aspect_ratio > 1.0 {
        let target = (width as f64 * aspect_ratio).round() as u32;
        resized = DynamicImage::ImageRgb8(image.clone())
            .resize_exact(target, height, FilterType::Lanczos3)
            .into_rgb8();
        &resized
    } else if aspect_ratio < 1.0 {
        let target = (height as f64 / aspect_ratio).round() as u32;
        resized = DynamicImage::ImageRgb8(image.clone())
            .resize_exact(width, target, FilterType::Lanczos3)
            .into_rgb8();
        &resized
    } else {
        image
    };

    output
        .save(path)
        .with_context(|| format!("failed to write image to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn batch_length_is_validated() {
        assert!(ImageBatch::new(vec![0.0; 11], 1, 3, 2, 2).is_err());
        assert!(ImageBatch::new(vec![0.0; 12], 1, 3, 2, 2).is_ok());
    }

    #[test]
    fn head_keeps_leading_entries() {
        let mut data = vec![-1.0; 4];
        data.extend(vec![1.0; 4]);
        let batch = ImageBatch::new(data, 2, 1, 2, 2).unwrap();

        let head = batch.head(1);
        assert_eq!(head.batch(), 1);
        assert!(head.data().iter().all(|&v| v == -1.0));

        // Asking for more than the batch holds is not an error.
        assert_eq!(batch.head(8).batch(), 2);
    }

    #[test]
    fn display_image_maps_value_range() {
        let batch = ImageBatch::new(vec![-1.0, 1.0, 0.0, -1.0], 1, 1, 2, 2).unwrap();
        let image = to_display_image(&batch).unwrap();

        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(1, 0).0, [255, 255, 255]);
        assert_eq!(image.get_pixel(0, 1).0, [128, 128, 128]);
    }

    #[test]
    fn display_image_uses_first_batch_entry_only() {
        let mut data = vec![1.0; 4];
        data.extend(vec![-1.0; 4]);
        let batch = ImageBatch::new(data, 2, 1, 2, 2).unwrap();

        let image = to_display_image(&batch).unwrap();
        assert!(image.pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn rejects_unsupported_channel_counts() {
        let batch = ImageBatch::filled(1, 4, 2, 2, 0.0);
        assert!(to_display_image(&batch).is_err());
    }

    #[test]
    fn save_image_applies_aspect_ratio() {
        let dir = tempdir().unwrap();
        let image = RgbImage::new(4, 2);

        let wide = dir.path().join("wide.png");
        save_image(&image, &wide, 2.0).unwrap();
        assert_eq!(image::open(&wide).unwrap().into_rgb8().dimensions(), (8, 2));

        let tall = dir.path().join("tall.png");
        save_image(&image, &tall, 0.5).unwrap();
        assert_eq!(image::open(&tall).unwrap().into_rgb8().dimensions(), (4, 4));

        let plain = dir.path().join("plain.png");
        save_image(&image, &plain, 1.0).unwrap();
        assert_eq!(image::open(&plain).unwrap().into_rgb8().dimensions(), (4, 2));
    }
}
