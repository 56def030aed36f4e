use std::fmt;
use std::str::FromStr;

use ffmpeg_next::format::Pixel;

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both dimensions are non-zero.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The shape of a decoded frame as seen by the converter: the backend's raw pixel format
/// id and the frame size. A converter is only valid for the layout it was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameLayout {
    pub pixel_format: i32,
    pub resolution: Resolution,
}

/// Packed pixel formats the converter can produce for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    #[default]
    Bgr24,
    Rgb24,
    Bgra,
    Rgba,
    Gray8,
}

impl OutputFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            OutputFormat::Bgr24 | OutputFormat::Rgb24 => 3,
            OutputFormat::Bgra | OutputFormat::Rgba => 4,
            OutputFormat::Gray8 => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Bgr24 => "bgr24",
            OutputFormat::Rgb24 => "rgb24",
            OutputFormat::Bgra => "bgra",
            OutputFormat::Rgba => "rgba",
            OutputFormat::Gray8 => "gray",
        }
    }

    pub(crate) fn pixel(&self) -> Pixel {
        match self {
            OutputFormat::Bgr24 => Pixel::BGR24,
            OutputFormat::Rgb24 => Pixel::RGB24,
            OutputFormat::Bgra => Pixel::BGRA,
            OutputFormat::Rgba => Pixel::RGBA,
            OutputFormat::Gray8 => Pixel::GRAY8,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bgr24" | "bgr" => Ok(OutputFormat::Bgr24),
            "rgb24" | "rgb" => Ok(OutputFormat::Rgb24),
            "bgra" => Ok(OutputFormat::Bgra),
            "rgba" => Ok(OutputFormat::Rgba),
            "gray" | "gray8" => Ok(OutputFormat::Gray8),
            other => Err(format!("unsupported output format: {other}")),
        }
    }
}

/// A decoded, converted image handed to the application.
///
/// Rows are tightly packed (`stride == width * bytes_per_pixel`). The pipeline keeps no
/// reference to the image once the callback returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    resolution: Resolution,
    format: OutputFormat,
    sequence: u64,
    data: Vec<u8>,
}

impl Image {
    pub fn new(resolution: Resolution, format: OutputFormat, sequence: u64, data: Vec<u8>) -> Self {
        Self {
            resolution,
            format,
            sequence,
            data,
        }
    }

    /// Copies `height` rows of `width * bpp` bytes out of a plane whose rows are `stride`
    /// bytes apart.
    pub(crate) fn from_strided_plane(
        resolution: Resolution,
        format: OutputFormat,
        sequence: u64,
        plane: &[u8],
        stride: usize,
    ) -> Option<Self> {
        let row_bytes = resolution.width as usize * format.bytes_per_pixel();
        let height = resolution.height as usize;
        if stride < row_bytes || (height > 0 && plane.len() < stride * (height - 1) + row_bytes) {
            return None;
        }
        let mut data = Vec::with_capacity(row_bytes * height);
        for row in 0..height {
            let start = row * stride;
            data.extend_from_slice(&plane[start..start + row_bytes]);
        }
        Some(Self::new(resolution, format, sequence, data))
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Position of this image within the current connection, starting at zero.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn stride(&self) -> usize {
        self.resolution.width as usize * self.format.bytes_per_pixel()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_validity() {
        assert!(Resolution::new(1920, 1080).is_valid());
        assert!(!Resolution::new(0, 1080).is_valid());
        assert!(!Resolution::default().is_valid());
        assert_eq!(Resolution::new(640, 480).to_string(), "640x480");
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("bgr24".parse::<OutputFormat>().unwrap(), OutputFormat::Bgr24);
        assert_eq!("RGBA".parse::<OutputFormat>().unwrap(), OutputFormat::Rgba);
        assert_eq!("gray".parse::<OutputFormat>().unwrap(), OutputFormat::Gray8);
        assert!("yuv420p".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::default(), OutputFormat::Bgr24);
    }

    #[test]
    fn test_from_strided_plane_packs_rows() {
        // 2x2 gray image with 4 bytes of stride padding per row
        let plane = [1u8, 2, 0, 0, 3, 4, 0, 0];
        let image =
            Image::from_strided_plane(Resolution::new(2, 2), OutputFormat::Gray8, 7, &plane, 4)
                .unwrap();
        assert_eq!(image.data(), &[1, 2, 3, 4]);
        assert_eq!(image.stride(), 2);
        assert_eq!(image.sequence(), 7);
    }

    #[test]
    fn test_from_strided_plane_rejects_short_plane() {
        let plane = [0u8; 5];
        let image =
            Image::from_strided_plane(Resolution::new(2, 2), OutputFormat::Bgr24, 0, &plane, 6);
        assert!(image.is_none());
    }
}
