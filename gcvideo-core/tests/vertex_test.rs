// GX vertex batching and the widescreen heuristic through the renderer
mod utils;

#[cfg(test)]
mod tests {
    use super::utils::{headless_renderer, headless_renderer_for};
    use gcvideo_core::backend::StreamTarget;
    use gcvideo_core::host::SystemInfo;
    use gcvideo_core::index_generator::GxPrimitive;
    use gcvideo_core::native_vertex_format::PortableVertexDeclaration;
    use gcvideo_core::shader_cache::GxPipelineUid;
    use gcvideo_core::shader_gen::PixelShaderUid;
    use gcvideo_core::vertex_manager::ProjectionAspect;
    use gcvideo_core::{Renderer, VideoConfig};

    const IDENTITY: [[f32; 4]; 4] = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];

    fn stride() -> usize {
        PortableVertexDeclaration::simple(0).stride as usize
    }

    fn use_simple_pipeline(r: &mut Renderer) {
        r.set_gx_pipeline(GxPipelineUid::new(
            PortableVertexDeclaration::simple(0),
            PixelShaderUid::default(),
        ));
    }

    /// Projection whose y/x scale ratio is `aspect`, drawn into a 4:3 viewport.
    fn projection(aspect: f32) -> ProjectionAspect {
        ProjectionAspect {
            raw_projection: [1.0, 0.0, aspect, 0.0, -1.0, 0.0],
            viewport_width: 640.0,
            viewport_height: 480.0,
        }
    }

    fn draw_triangles(r: &mut Renderer, aspect: f32, count: usize) {
        let vertices = vec![0u8; stride() * 3];
        for _ in 0..count {
            r.set_projection(projection(aspect), IDENTITY);
            r.submit_vertices(GxPrimitive::Triangles, &vertices, 3);
            r.flush_vertices();
        }
    }

    #[test]
    fn quads_are_batched_into_one_indexed_draw() {
        let (mut r, _) = headless_renderer(VideoConfig::default());
        use_simple_pipeline(&mut r);

        let vertices: Vec<u8> = (0..stride() * 8).map(|i| i as u8).collect();
        r.submit_vertices(GxPrimitive::Quads, &vertices[..stride() * 4], 4);
        r.submit_vertices(GxPrimitive::Quads, &vertices[stride() * 4..], 4);
        r.flush_vertices();

        assert_eq!(r.stats().this_frame.num_draw_calls, 1);
        assert_eq!(r.stats().this_frame.num_primitives, 4);
        let null = r.backend().as_null().unwrap();
        let draw = null.counters().last_draw.unwrap();
        assert!(draw.indexed);
        assert_eq!(draw.num_indices, 12);
        assert_eq!(draw.vertex_stride as usize, stride());

        let stream = null.stream_contents(StreamTarget::Geometry(draw.geometry_slot));
        let start = draw.base_vertex as usize * stride();
        assert_eq!(&stream[start..start + vertices.len()], &vertices[..]);
    }

    #[test]
    fn primitive_class_change_splits_draws() {
        let (mut r, _) = headless_renderer(VideoConfig::default());
        use_simple_pipeline(&mut r);

        let vertices = vec![0u8; stride() * 4];
        r.submit_vertices(GxPrimitive::Triangles, &vertices[..stride() * 3], 3);
        r.submit_vertices(GxPrimitive::Lines, &vertices[..stride() * 2], 2);
        r.flush_vertices();

        assert_eq!(r.stats().this_frame.num_draw_calls, 2);
    }

    #[test]
    fn anamorphic_projections_switch_to_widescreen() {
        let (mut r, _) = headless_renderer(VideoConfig::default());
        use_simple_pipeline(&mut r);
        assert!(!r.aspect_wide());

        draw_triangles(&mut r, 16.0 / 9.0, 4);
        r.swap(0, 0, 0, 0, 0);
        assert!(r.aspect_wide());
    }

    #[test]
    fn widescreen_classification_has_hysteresis() {
        let (mut r, _) = headless_renderer(VideoConfig::default());
        use_simple_pipeline(&mut r);
        draw_triangles(&mut r, 16.0 / 9.0, 4);
        r.swap(0, 0, 0, 0, 0);
        assert!(r.aspect_wide());

        // A minority of 4:3 draws is not enough to flip back.
        draw_triangles(&mut r, 16.0 / 9.0, 3);
        draw_triangles(&mut r, 4.0 / 3.0, 1);
        r.swap(0, 0, 0, 0, 0);
        assert!(r.aspect_wide());

        draw_triangles(&mut r, 4.0 / 3.0, 4);
        r.swap(0, 0, 0, 0, 0);
        assert!(!r.aspect_wide());
    }

    #[test]
    fn even_split_keeps_classification() {
        let (mut r, _) = headless_renderer(VideoConfig::default());
        use_simple_pipeline(&mut r);
        draw_triangles(&mut r, 16.0 / 9.0, 2);
        draw_triangles(&mut r, 4.0 / 3.0, 2);
        r.swap(0, 0, 0, 0, 0);
        assert!(!r.aspect_wide());

        draw_triangles(&mut r, 16.0 / 9.0, 4);
        r.swap(0, 0, 0, 0, 0);
        assert!(r.aspect_wide());

        draw_triangles(&mut r, 4.0 / 3.0, 2);
        draw_triangles(&mut r, 16.0 / 9.0, 2);
        r.swap(0, 0, 0, 0, 0);
        assert!(r.aspect_wide());
    }

    #[test]
    fn three_quarter_majority_is_not_enough() {
        let (mut r, _) = headless_renderer(VideoConfig::default());
        use_simple_pipeline(&mut r);
        draw_triangles(&mut r, 16.0 / 9.0, 3);
        draw_triangles(&mut r, 4.0 / 3.0, 1);
        r.swap(0, 0, 0, 0, 0);
        assert!(!r.aspect_wide());

        draw_triangles(&mut r, 16.0 / 9.0, 4);
        r.swap(0, 0, 0, 0, 0);
        assert!(r.aspect_wide());

        draw_triangles(&mut r, 4.0 / 3.0, 3);
        draw_triangles(&mut r, 16.0 / 9.0, 1);
        r.swap(0, 0, 0, 0, 0);
        assert!(r.aspect_wide());
    }

    #[test]
    fn frame_without_classified_draws_keeps_aspect() {
        let (mut r, _) = headless_renderer(VideoConfig::default());
        use_simple_pipeline(&mut r);
        draw_triangles(&mut r, 16.0 / 9.0, 2);
        r.swap(0, 0, 0, 0, 0);
        assert!(r.aspect_wide());

        r.swap(0, 0, 0, 0, 0);
        assert!(r.aspect_wide());
    }

    #[test]
    fn wii_ignores_projection_shape() {
        let system = SystemInfo {
            is_wii: true,
            wii_widescreen: false,
        };
        let (mut r, _) = headless_renderer_for(VideoConfig::default(), system);
        use_simple_pipeline(&mut r);
        draw_triangles(&mut r, 16.0 / 9.0, 4);
        r.swap(0, 0, 0, 0, 0);
        assert!(!r.aspect_wide());
    }
}
