// Staging texture map/unmap behaviour on the Null backend
#[cfg(test)]
mod tests {
    use gcvideo_core::backend::NullBackend;
    use gcvideo_core::math::EfbRectangle;
    use gcvideo_core::texture::{AbstractTextureFormat, StagingTextureType, TextureConfig};
    use gcvideo_core::RenderBackend;

    fn checkerboard(width: u32, height: u32) -> Vec<u8> {
        (0..width * height)
            .flat_map(|i| {
                let v = if (i % width + i / width) % 2 == 0 { 0xFF } else { 0x00 };
                [v, (i % 251) as u8, 0x7F, 0xFF]
            })
            .collect()
    }

    #[test]
    fn copy_unmaps_and_next_map_sees_new_data() {
        let mut backend = NullBackend::new(64, 64).unwrap();
        let config = TextureConfig::simple(16, 8, AbstractTextureFormat::RGBA8);
        let texture = backend.create_texture(&config).unwrap();
        let pixels = checkerboard(16, 8);
        texture.load(0, 16, 8, 16, &pixels);

        let mut readback = backend
            .create_staging_texture(StagingTextureType::Readback, &config)
            .unwrap();
        assert!(readback.map());
        assert!(readback.is_mapped());

        readback.copy_from_texture_all(&texture, 0, 0);
        assert!(!readback.is_mapped());
        assert!(readback.mapped_data().is_none());

        assert!(readback.map());
        let stride = readback.mapped_stride() as usize;
        let data = readback.mapped_data().unwrap();
        for row in 0..8 {
            assert_eq!(&data[row * stride..row * stride + 64], &pixels[row * 64..(row + 1) * 64]);
        }
    }

    #[test]
    fn partial_read_honours_output_stride() {
        let mut backend = NullBackend::new(64, 64).unwrap();
        let config = TextureConfig::simple(16, 8, AbstractTextureFormat::RGBA8);
        let texture = backend.create_texture(&config).unwrap();
        let pixels = checkerboard(16, 8);
        texture.load(0, 16, 8, 16, &pixels);

        let mut readback = backend
            .create_staging_texture(StagingTextureType::Readback, &config)
            .unwrap();
        readback.copy_from_texture_all(&texture, 0, 0);

        let rect = EfbRectangle::new(4, 2, 8, 4);
        let mut out = vec![0u8; 2 * 32];
        readback.read_texels(&rect, &mut out, 32);
        for row in 0..2 {
            let src = (2 + row) * 64 + 4 * 4;
            assert_eq!(&out[row * 32..row * 32 + 16], &pixels[src..src + 16]);
        }
    }

    #[test]
    fn upload_staging_writes_reach_texture() {
        let mut backend = NullBackend::new(64, 64).unwrap();
        let config = TextureConfig::simple(4, 4, AbstractTextureFormat::RGBA8);
        let texture = backend.create_texture(&config).unwrap();

        let mut upload = backend
            .create_staging_texture(StagingTextureType::Upload, &config)
            .unwrap();
        upload.write_texel(1, 2, &[1, 2, 3, 4]);
        upload.copy_to_texture(&config.rect(), &texture, &config.rect(), 0, 0);
        assert!(!upload.is_mapped());

        let mut readback = backend
            .create_staging_texture(StagingTextureType::Readback, &config)
            .unwrap();
        readback.copy_from_texture_all(&texture, 0, 0);
        let mut texel = [0u8; 4];
        readback.read_texel(1, 2, &mut texel);
        assert_eq!(texel, [1, 2, 3, 4]);
    }
}
