// Integration tests for VI swaps on the Null backend
mod utils;

#[cfg(test)]
mod tests {
    use super::utils::{headless_renderer, insert_xfb};
    use gcvideo_core::index_generator::GxPrimitive;
    use gcvideo_core::math::EfbRectangle;
    use gcvideo_core::native_vertex_format::PortableVertexDeclaration;
    use gcvideo_core::shader_cache::GxPipelineUid;
    use gcvideo_core::shader_gen::PixelShaderUid;
    use gcvideo_core::VideoConfig;

    const XFB: u32 = 0x0030_0000;

    #[test]
    fn unchanged_xfb_is_presented_once() {
        let (mut r, cache) = headless_renderer(VideoConfig::default());
        insert_xfb(&mut r, &cache, XFB, 1, (640, 480), [0x10, 0x20, 0x30, 0xFF]);

        r.swap(XFB, 640, 640, 480, 100);

        // Draws queued before a redundant swap still reach the backend.
        r.set_gx_pipeline(GxPipelineUid::new(
            PortableVertexDeclaration::simple(0),
            PixelShaderUid::default(),
        ));
        let stride = PortableVertexDeclaration::simple(0).stride as usize;
        r.submit_vertices(GxPrimitive::Triangles, &vec![0u8; stride * 3], 3);
        let draws_before = r.backend().as_null().unwrap().counters().draw_count;
        let flushes_before = r.backend().as_null().unwrap().counters().flush_count;
        r.swap(XFB, 640, 640, 480, 200);

        let counters = r.backend().as_null().unwrap().counters();
        assert_eq!(counters.draw_count, draws_before + 1);
        assert!(counters.flush_count > flushes_before);
        assert_eq!(r.stats().this_frame.num_draw_calls, 1);
        assert_eq!(r.frame_count(), 1);
        assert_eq!(r.stats().num_frames_presented, 1);
        assert_eq!(r.stats().num_swaps_skipped, 1);
        let counters = r.backend().as_null().unwrap().counters();
        assert_eq!(counters.present_count, 1);
        assert_eq!(counters.blit_count, 1);
    }

    #[test]
    fn new_xfb_contents_present_again() {
        let (mut r, cache) = headless_renderer(VideoConfig::default());
        insert_xfb(&mut r, &cache, XFB, 1, (640, 480), [0; 4]);
        r.swap(XFB, 640, 640, 480, 0);
        insert_xfb(&mut r, &cache, XFB, 2, (640, 480), [0xFF; 4]);
        r.swap(XFB, 640, 640, 480, 0);

        assert_eq!(r.frame_count(), 2);
        assert_eq!(r.frame_counter().load(std::sync::atomic::Ordering::Acquire), 2);
        assert_eq!(cache.last_cleanup(), Some(2));
        assert_eq!(cache.efb_copy_flushes(), 2);
    }

    #[test]
    fn unknown_xfb_only_flushes() {
        let (mut r, _cache) = headless_renderer(VideoConfig::default());
        r.swap(XFB, 640, 640, 480, 0);

        assert_eq!(r.frame_count(), 0);
        assert_eq!(r.stats().num_swaps_skipped, 1);
        let counters = r.backend().as_null().unwrap().counters();
        assert_eq!(counters.present_count, 0);
        assert!(counters.flush_count >= 1);
        assert_eq!(r.last_xfb_size(), (640, 480));
    }

    #[test]
    fn stride_padding_is_cropped_from_region() {
        let (mut r, cache) = headless_renderer(VideoConfig::default());
        insert_xfb(&mut r, &cache, XFB, 1, (656, 480), [0x80; 4]);
        r.swap(XFB, 640, 656, 480, 0);

        assert_eq!(r.last_xfb_region(), EfbRectangle::new(0, 0, 640, 480));
    }

    #[test]
    fn xfb_is_blitted_into_target_rectangle() {
        let (mut r, cache) = headless_renderer(VideoConfig::default());
        insert_xfb(&mut r, &cache, XFB, 1, (640, 480), [0x40, 0x80, 0xC0, 0xFF]);
        r.swap(XFB, 640, 640, 480, 0);

        let target = r.target_rectangle();
        let counters = r.backend().as_null().unwrap().counters();
        assert_eq!(counters.last_blit_dst, Some(target));
        assert!(target.width() > 0 && target.height() > 0);
        assert!(target.fits_within(640, 480));
    }
}
