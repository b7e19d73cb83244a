// Backend-neutral description of a vertex layout.
//
// The vertex loader (outside this crate) converts console vertex data into a
// fixed "portable" layout. Pipelines are keyed on this declaration, and each
// backend turns it into its own input layout.

use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ComponentFormat {
    UByte = 0,
    Byte = 1,
    UShort = 2,
    Short = 3,
    #[default]
    Float = 4,
}

impl ComponentFormat {
    pub fn size(self) -> u32 {
        match self {
            ComponentFormat::UByte | ComponentFormat::Byte => 1,
            ComponentFormat::UShort | ComponentFormat::Short => 2,
            ComponentFormat::Float => 4,
        }
    }
}

/// Layout of one attribute inside the vertex stride.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeFormat {
    pub format: ComponentFormat,
    pub components: u8,
    pub offset: u32,
    pub enable: bool,
    /// Read as integers instead of normalized floats.
    pub integer: bool,
}

impl AttributeFormat {
    pub const fn new(format: ComponentFormat, components: u8, offset: u32, integer: bool) -> Self {
        Self {
            format,
            components,
            offset,
            enable: true,
            integer,
        }
    }

    pub fn size(&self) -> u32 {
        self.format.size() * self.components as u32
    }
}

/// Shader input locations for each portable attribute.
pub mod location {
    pub const POSITION: u32 = 0;
    pub const POSMTX: u32 = 1;
    pub const NORMAL: u32 = 2;
    pub const TANGENT: u32 = 3;
    pub const BINORMAL: u32 = 4;
    pub const COLOR0: u32 = 5;
    pub const COLOR1: u32 = 6;
    pub const TEXCOORD0: u32 = 8;
}

/// Complete vertex layout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortableVertexDeclaration {
    pub stride: u32,
    pub position: AttributeFormat,
    pub normals: [AttributeFormat; 3],
    pub colors: [AttributeFormat; 2],
    pub texcoords: [AttributeFormat; 8],
    pub posmtx: AttributeFormat,
}

impl PortableVertexDeclaration {
    /// Iterates `(location, attribute)` for every enabled attribute.
    pub fn enabled_attributes(&self) -> impl Iterator<Item = (u32, AttributeFormat)> + '_ {
        let fixed = [
            (location::POSITION, self.position),
            (location::POSMTX, self.posmtx),
            (location::NORMAL, self.normals[0]),
            (location::TANGENT, self.normals[1]),
            (location::BINORMAL, self.normals[2]),
            (location::COLOR0, self.colors[0]),
            (location::COLOR1, self.colors[1]),
        ];
        let texcoords = self
            .texcoords
            .iter()
            .enumerate()
            .map(|(i, tc)| (location::TEXCOORD0 + i as u32, *tc));
        fixed
            .into_iter()
            .chain(texcoords)
            .filter(|(_, attr)| attr.enable)
    }

    /// Checks every enabled attribute fits inside the stride.
    pub fn is_valid(&self) -> bool {
        self.stride > 0
            && self
                .enabled_attributes()
                .all(|(_, attr)| attr.offset + attr.size() <= self.stride)
    }

    /// Position + one color + `num_texcoords` float texcoords, packed.
    ///
    /// Used by the renderer's utility draws and by the headless driver.
    pub fn simple(num_texcoords: usize) -> Self {
        let mut decl = Self::default();
        let mut offset = 0;
        decl.position = AttributeFormat::new(ComponentFormat::Float, 4, offset, false);
        offset += 16;
        decl.colors[0] = AttributeFormat::new(ComponentFormat::UByte, 4, offset, false);
        offset += 4;
        for tc in decl.texcoords.iter_mut().take(num_texcoords.min(8)) {
            *tc = AttributeFormat::new(ComponentFormat::Float, 3, offset, false);
            offset += 12;
        }
        decl.stride = offset;
        decl
    }
}

/// A vertex layout registered with the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeVertexFormat {
    decl: PortableVertexDeclaration,
}

impl NativeVertexFormat {
    pub fn new(decl: PortableVertexDeclaration) -> Arc<Self> {
        Arc::new(Self { decl })
    }

    pub fn decl(&self) -> &PortableVertexDeclaration {
        &self.decl
    }

    pub fn stride(&self) -> u32 {
        self.decl.stride
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_layout_is_packed_and_valid() {
        let decl = PortableVertexDeclaration::simple(2);
        assert_eq!(decl.stride, 16 + 4 + 24);
        assert!(decl.is_valid());
        let locations: Vec<u32> = decl.enabled_attributes().map(|(loc, _)| loc).collect();
        assert_eq!(
            locations,
            vec![
                location::POSITION,
                location::COLOR0,
                location::TEXCOORD0,
                location::TEXCOORD0 + 1
            ]
        );
    }

    #[test]
    fn attribute_past_stride_is_invalid() {
        let mut decl = PortableVertexDeclaration::simple(0);
        decl.stride = 16;
        assert!(!decl.is_valid());
    }
}
