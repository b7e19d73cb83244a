// Shader generation across shading languages
#[cfg(test)]
mod tests {
    use gcvideo_core::native_vertex_format::PortableVertexDeclaration;
    use gcvideo_core::shader_gen::tev::{generate_pixel_shader, AlphaTest, TevStageConfig};
    use gcvideo_core::shader_gen::vertex::generate_vertex_shader;
    use gcvideo_core::shader_gen::{PixelShaderUid, ShaderHostConfig, VertexShaderUid};
    use gcvideo_core::ApiType;

    const APIS: [ApiType; 5] = [
        ApiType::D3D,
        ApiType::OpenGL,
        ApiType::Vulkan,
        ApiType::Wgsl,
        ApiType::Nothing,
    ];

    fn textured_uids() -> (VertexShaderUid, PixelShaderUid) {
        let decl = PortableVertexDeclaration::simple(1);
        let ps = PixelShaderUid::new(
            &[TevStageConfig::modulate_texture(0)],
            1,
            AlphaTest::default(),
        );
        (VertexShaderUid::new(&decl, ps.num_texgens), ps)
    }

    #[test]
    fn every_api_generates_deterministic_source() {
        let (vs, ps) = textured_uids();
        let host = ShaderHostConfig::empty();
        for api in APIS {
            let first = (
                generate_vertex_shader(api, host, &vs),
                generate_pixel_shader(api, host, &ps),
            );
            let second = (
                generate_vertex_shader(api, host, &vs),
                generate_pixel_shader(api, host, &ps),
            );
            assert!(!first.0.is_empty() && !first.1.is_empty(), "{api:?}");
            assert_eq!(first, second, "{api:?}");
        }
    }

    #[test]
    fn languages_differ_in_syntax() {
        let (vs, _) = textured_uids();
        let host = ShaderHostConfig::empty();
        let hlsl = generate_vertex_shader(ApiType::D3D, host, &vs);
        let glsl = generate_vertex_shader(ApiType::OpenGL, host, &vs);
        let wgsl = generate_vertex_shader(ApiType::Wgsl, host, &vs);

        assert_ne!(hlsl, glsl);
        assert_ne!(glsl, wgsl);
        assert!(wgsl.contains("@vertex"));
        assert!(!hlsl.contains("@vertex"));
    }

    #[test]
    fn texture_stage_changes_pixel_shader() {
        let (_, textured) = textured_uids();
        let host = ShaderHostConfig::empty();
        for api in APIS {
            let plain = generate_pixel_shader(api, host, &PixelShaderUid::default());
            let sampled = generate_pixel_shader(api, host, &textured);
            assert_ne!(plain, sampled, "{api:?}");
        }
    }
}
