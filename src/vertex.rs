use crate::entity::EntityId;

/// Discriminant for the batched primitive arenas.
///
/// Stored once per entity when its geometry is registered; every later
/// operation (update, removal, destruction) dispatches on it instead of
/// re-deriving the kind from the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Lines,
    Triangles,
    TexturedTriangles,
    Circles,
}

/// Vertex for line and filled-triangle geometry.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FlatVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
    pub entity_id: u32,
}

impl FlatVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x4, 2 => Uint32];

    pub fn new(position: [f32; 3], color: [f32; 4], id: EntityId) -> Self {
        Self {
            position,
            color,
            entity_id: id.raw(),
        }
    }

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Vertex for textured-triangle geometry. The color multiplies the sampled
/// texel, so plain white vertices show the texture unmodified.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TexturedVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
    pub uv: [f32; 2],
    pub entity_id: u32,
}

impl TexturedVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        0 => Float32x3, 1 => Float32x4, 2 => Float32x2, 3 => Uint32
    ];

    pub fn new(position: [f32; 3], color: [f32; 4], uv: [f32; 2], id: EntityId) -> Self {
        Self {
            position,
            color,
            uv,
            entity_id: id.raw(),
        }
    }

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Vertex for circle geometry: a quad corner carrying unit-square `local`
/// coordinates the fragment shader turns into signed-distance coverage.
///
/// `thickness < 0` draws a filled disc; otherwise a ring of that thickness
/// (in local units, where the radius is 1). `fade` is the anti-alias band
/// width for the display pass; the picking pass ignores it and cuts hard at
/// the radius so ID reads stay exact.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CircleVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
    pub local: [f32; 2],
    pub thickness: f32,
    pub fade: f32,
    pub entity_id: u32,
}

impl CircleVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 6] = wgpu::vertex_attr_array![
        0 => Float32x3, 1 => Float32x4, 2 => Float32x2,
        3 => Float32, 4 => Float32, 5 => Uint32
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }

    /// Builds the four quad corners (and the two triangles indexing them)
    /// for a circle of `radius` around `center`.
    pub fn quad(
        center: [f32; 3],
        radius: f32,
        color: [f32; 4],
        thickness: f32,
        fade: f32,
        id: EntityId,
    ) -> ([CircleVertex; 4], [u32; 6]) {
        let corner = |dx: f32, dy: f32| CircleVertex {
            position: [center[0] + dx * radius, center[1] + dy * radius, center[2]],
            color,
            local: [dx, dy],
            thickness,
            fade,
            entity_id: id.raw(),
        };
        let vertices = [
            corner(-1.0, -1.0),
            corner(1.0, -1.0),
            corner(1.0, 1.0),
            corner(-1.0, 1.0),
        ];
        let indices = [0, 1, 2, 2, 3, 0];
        (vertices, indices)
    }
}
