use crate::binaries::BinaryData;

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct VTFHeader {
    pub signature: [u8; 4], // File signature ("VTF\0").
    pub version: [u32; 2],  // version[0].version[1] (currently 7.2).
    pub header_size: u32, // Size of the header struct (16 byte aligned) + resource dictionary (7.3+).
    pub width: u16,       // Width of the largest mipmap in pixels. Must be a power of 2.
    pub height: u16,      // Height of the largest mipmap in pixels. Must be a power of 2.
    pub flags: u32,
    pub frames: u16,      // Number of frames, if animated (1 for no animation).
    pub first_frame: u16, // First frame in animation (0 based).
    padding0: [u8; 4],    // reflectivity padding (16 byte alignment).
    pub reflectivity: [f32; 3],
    padding1: [u8; 4], // reflectivity padding (8 byte packing).
    pub bumpmap_scale: f32,
    pub high_res_image_format: i32,
    pub mipmap_count: u8,
    pub low_res_image_format: i32, // Low resolution image format (always DXT1).
    pub low_res_image_width: u8,
    pub low_res_image_height: u8,
}

impl BinaryData for VTFHeader {}

#[cfg(test)]
mod header_tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_header_size() {
        // The packed header mirrors the first 63 bytes of the on-disk
        // struct; header_size covers the aligned remainder (7.2+ depth,
        // 7.3+ resource dictionary).
        assert_eq!(size_of::<VTFHeader>(), 63);
    }
}
