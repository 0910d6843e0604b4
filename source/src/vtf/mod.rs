//! Valve texture files. Only the largest mip of frame 0 is kept; the decoder
//! hands pixels to the assembler as RGBA8888.

pub mod consts;
pub mod decode;
mod header;

use std::io::{BufReader, Read, Seek, SeekFrom};

use num_traits::FromPrimitive;

use crate::binaries::BinaryData;
use crate::error::{Error, FileType, Result};

pub use consts::ImageFormat;
pub use header::VTFHeader;

pub struct VTF {
    header: VTFHeader,
    format: ImageFormat,
    /// Raw bytes of the largest stored mip.
    high_res_data: Vec<u8>,
}

impl VTF {
    pub fn width(&self) -> u32 {
        self.header.width as u32
    }
    pub fn height(&self) -> u32 {
        self.header.height as u32
    }
    pub fn format(&self) -> ImageFormat {
        self.format
    }
    pub fn header(&self) -> &VTFHeader {
        &self.header
    }

    /// Largest mip as RGBA8888 scanlines, `4 * width * height` bytes.
    pub fn decode_rgba(&self) -> Option<Vec<u8>> {
        decode::decode_rgba(
            self.format,
            self.width() as usize,
            self.height() as usize,
            &self.high_res_data,
        )
    }
}

impl BinaryData for VTF {
    fn read<R: Read + Seek>(
        buffer: &mut BufReader<R>,
        _max_size: Option<usize>,
    ) -> std::io::Result<Self> {
        VTF::read_inner(buffer).map_err(|e| match e {
            Error::Io(io) => io,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
        })
    }
}

impl VTF {
    pub fn read_inner<R: Read + Seek>(buffer: &mut BufReader<R>) -> Result<Self> {
        let base = buffer.stream_position()?;
        let header = VTFHeader::read(buffer, None)?;

        if &header.signature != b"VTF\0" {
            return Err(Error::malformed(FileType::Vtf, "bad signature"));
        }

        let format = ImageFormat::from_i32({ header.high_res_image_format })
            .ok_or(Error::UnsupportedFormat({ header.high_res_image_format }))?;

        let width = header.width as usize;
        let height = header.height as usize;

        // Image data starts after the full aligned header (and the resource
        // dictionary on 7.3+).
        buffer.seek(SeekFrom::Start(base + header.header_size as u64))?;

        // Low-res thumbnail comes first and is never used.
        if header.low_res_image_width > 0 && header.low_res_image_height > 0 {
            if let Some(low_format) = ImageFormat::from_i32({ header.low_res_image_format }) {
                let thumb = low_format.bytes_for_size(
                    header.low_res_image_width as usize,
                    header.low_res_image_height as usize,
                    0,
                );
                buffer.seek_relative(thumb as i64)?;
            }
        }

        // Mips are stored smallest first; skip everything up to the final,
        // largest one. Each frame of a level is stored back to back.
        let frames = (header.frames as usize).max(1);
        let mut high_res_data = Vec::new();
        for level in (0..header.mipmap_count as usize).rev() {
            let size = format.bytes_for_size(width, height, level);
            if level == 0 {
                high_res_data = vec![0; size];
                buffer.read_exact(&mut high_res_data)?;
            } else {
                buffer.seek_relative((size * frames) as i64)?;
            }
        }

        Ok(Self {
            header,
            format,
            high_res_data,
        })
    }
}

#[cfg(test)]
mod vtf_tests {
    use super::*;
    use std::io::Cursor;

    fn header_bytes(
        width: u16,
        height: u16,
        format: i32,
        mips: u8,
        low_w: u8,
        low_h: u8,
    ) -> Vec<u8> {
        let mut h = Vec::new();
        h.extend_from_slice(b"VTF\0");
        h.extend_from_slice(&7u32.to_le_bytes());
        h.extend_from_slice(&2u32.to_le_bytes());
        h.extend_from_slice(&80u32.to_le_bytes()); // header_size
        h.extend_from_slice(&width.to_le_bytes());
        h.extend_from_slice(&height.to_le_bytes());
        h.extend_from_slice(&0u32.to_le_bytes()); // flags
        h.extend_from_slice(&1u16.to_le_bytes()); // frames
        h.extend_from_slice(&0u16.to_le_bytes());
        h.extend_from_slice(&[0u8; 4]);
        h.extend_from_slice(&[0u8; 12]); // reflectivity
        h.extend_from_slice(&[0u8; 4]);
        h.extend_from_slice(&1.0f32.to_le_bytes());
        h.extend_from_slice(&format.to_le_bytes());
        h.push(mips);
        h.extend_from_slice(&(ImageFormat::DXT1 as i32).to_le_bytes());
        h.push(low_w);
        h.push(low_h);
        h.resize(80, 0);
        h
    }

    #[test]
    fn test_largest_mip_wins() {
        // 2x2 RGBA8888 with two mips: 1x1 stored first, then the 2x2 level.
        let mut data = header_bytes(2, 2, ImageFormat::RGBA8888 as i32, 2, 0, 0);
        data.extend_from_slice(&[9, 9, 9, 9]); // 1x1 mip, skipped
        for px in 0u8..4 {
            data.extend_from_slice(&[px, 0, 0, 255]);
        }

        let vtf = VTF::read_inner(&mut BufReader::new(Cursor::new(&data[..]))).unwrap();
        let rgba = vtf.decode_rgba().unwrap();
        assert_eq!(rgba.len(), 4 * 2 * 2);
        assert_eq!(rgba[0], 0);
        assert_eq!(rgba[4], 1);
    }

    #[test]
    fn test_thumbnail_skipped() {
        // 4x4 low-res DXT1 thumbnail (8 bytes) before the single mip.
        let mut data = header_bytes(1, 1, ImageFormat::RGB888 as i32, 1, 4, 4);
        data.extend_from_slice(&[0xEE; 8]);
        data.extend_from_slice(&[1, 2, 3]);

        let vtf = VTF::read_inner(&mut BufReader::new(Cursor::new(&data[..]))).unwrap();
        assert_eq!(vtf.decode_rgba().unwrap(), vec![1, 2, 3, 255]);
    }

    #[test]
    fn test_bad_signature() {
        let mut data = header_bytes(1, 1, 0, 1, 0, 0);
        data[0] = b'X';
        assert!(VTF::read_inner(&mut BufReader::new(Cursor::new(&data[..]))).is_err());
    }

    #[test]
    fn test_unknown_format_is_unsupported() {
        let data = header_bytes(1, 1, 999, 1, 0, 0);
        assert!(matches!(
            VTF::read_inner(&mut BufReader::new(Cursor::new(&data[..]))),
            Err(Error::UnsupportedFormat(999))
        ));
    }
}
