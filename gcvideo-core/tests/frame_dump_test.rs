// Frame dumping and screenshots through the renderer
mod utils;

#[cfg(test)]
mod tests {
    use super::utils::{headless_renderer, insert_xfb};
    use gcvideo_core::VideoConfig;

    const XFB: u32 = 0x0040_0000;
    const COLOR: [u8; 4] = [0x20, 0x40, 0x60, 0xFF];

    #[test]
    fn screenshot_is_written_one_swap_later() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let (mut r, cache) = headless_renderer(VideoConfig::default());
        let handle = r.screenshot_handle();

        insert_xfb(&mut r, &cache, XFB, 1, (320, 240), COLOR);
        assert!(handle.save_screenshot(&path, false));
        assert!(r.is_frame_dumping());
        r.swap(XFB, 320, 320, 240, 0);

        // The readback is mapped on the following swap.
        r.swap(XFB, 320, 320, 240, 0);
        r.shutdown();

        let image = image::open(&path).unwrap().to_rgba8();
        assert!(image.width() > 0 && image.height() > 0);
        let center = image.get_pixel(image.width() / 2, image.height() / 2);
        assert_eq!(center.0, COLOR);
        assert!(!handle.is_frame_dumping());
    }

    #[test]
    fn image_dump_numbers_frames_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = VideoConfig {
            dump_frames_as_images: true,
            dump_frames_silent: true,
            dump_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let (mut r, cache) = headless_renderer(config);
        r.screenshot_handle().set_dump_frames(true);

        // Each frame reaches the worker on the swap after it was presented.
        for id in 1..=4 {
            insert_xfb(&mut r, &cache, XFB, id, (64, 48), [id as u8; 4]);
            r.swap(XFB, 64, 64, 48, id * 1000);
        }
        r.screenshot_handle().set_dump_frames(false);
        r.swap(XFB, 64, 64, 48, 5000);
        r.shutdown();

        for n in 1..=3 {
            assert!(dir.path().join(format!("framedump_{n}.png")).exists());
        }
        assert!(!dir.path().join("framedump_5.png").exists());
    }

    #[cfg(feature = "video-dump")]
    #[test]
    fn video_dump_writes_y4m_stream() {
        let dir = tempfile::tempdir().unwrap();
        let config = VideoConfig {
            dump_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let (mut r, cache) = headless_renderer(config);
        r.screenshot_handle().set_dump_frames(true);

        for id in 1..=3 {
            insert_xfb(&mut r, &cache, XFB, id, (64, 48), COLOR);
            r.swap(XFB, 64, 64, 48, 0);
        }
        r.screenshot_handle().set_dump_frames(false);
        r.swap(XFB, 64, 64, 48, 0);
        r.shutdown();

        let dumps: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "y4m"))
            .collect();
        assert_eq!(dumps.len(), 1);
        let bytes = std::fs::read(dumps[0].path()).unwrap();
        assert!(bytes.starts_with(b"YUV4MPEG2 "));
        assert_eq!(bytes.windows(5).filter(|w| w == b"FRAME").count(), 2);
    }
}
