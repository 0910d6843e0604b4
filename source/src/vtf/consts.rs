use num_derive::FromPrimitive;

#[derive(Copy, Clone, FromPrimitive, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ImageFormat {
    NONE = -1,
    RGBA8888 = 0,
    ABGR8888,
    RGB888,
    BGR888,
    RGB565,
    I8,
    IA88,
    P8,
    A8,
    RGB888BLUESCREEN,
    BGR888BLUESCREEN,
    ARGB8888,
    BGRA8888,
    DXT1,
    DXT3,
    DXT5,
    BGRX8888,
    BGR565,
    BGRX5551,
    BGRA4444,
    DXT1ONEBITALPHA,
    BGRA5551,
    UV88,
    UVWQ8888,
    RGBA16161616F,
    RGBA16161616,
    UVLX8888,
}

impl ImageFormat {
    /// Byte size of one stored mip level. Block formats round dimensions up
    /// to whole 4x4 blocks.
    pub fn bytes_for_size(&self, width: usize, height: usize, mip_level: usize) -> usize {
        let width = (width >> mip_level).max(1);
        let height = (height >> mip_level).max(1);

        let block_count = width.div_ceil(4) * height.div_ceil(4);

        match self {
            ImageFormat::NONE => 0,
            ImageFormat::UVLX8888
            | ImageFormat::UVWQ8888
            | ImageFormat::BGRA8888
            | ImageFormat::ARGB8888
            | ImageFormat::RGBA8888
            | ImageFormat::ABGR8888
            | ImageFormat::BGRX8888 => width * height * 4,
            ImageFormat::RGB888BLUESCREEN
            | ImageFormat::BGR888BLUESCREEN
            | ImageFormat::RGB888
            | ImageFormat::BGR888 => width * height * 3,
            ImageFormat::I8 | ImageFormat::P8 | ImageFormat::A8 => width * height,
            ImageFormat::DXT1 | ImageFormat::DXT1ONEBITALPHA => block_count * 8,
            // 4x4 block has 64 bits of colour and 64 bits of alpha
            ImageFormat::DXT3 | ImageFormat::DXT5 => block_count * 16,
            ImageFormat::IA88
            | ImageFormat::RGB565
            | ImageFormat::UV88
            | ImageFormat::BGRA5551
            | ImageFormat::BGRX5551
            | ImageFormat::BGR565
            | ImageFormat::BGRA4444 => width * height * 2,
            ImageFormat::RGBA16161616F | ImageFormat::RGBA16161616 => width * height * 8,
        }
    }
}
