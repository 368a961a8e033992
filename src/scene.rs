use ahash::{HashMap, HashMapExt};

use crate::arena::GeometryArena;
use crate::camera::Camera;
use crate::entity::EntityId;
use crate::error::{GeometryError, RenderError};
use crate::framebuffer::PickingTarget;
use crate::vertex::{CircleVertex, FlatVertex, PrimitiveKind, TexturedVertex};

/// Which passes a frame of this scene runs. Disabled passes are skipped
/// entirely; the outline pass additionally requires geometry to have been
/// drawn, since it reads the entity-id image that pass produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassConfig {
    pub grid: bool,
    pub geometry: bool,
    pub outline: bool,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            grid: true,
            geometry: true,
            outline: true,
        }
    }
}

/// Background grid appearance. `cell_size` is in world units; `line_width`
/// is in pixels so the grid stays hairline-thin at any zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSettings {
    pub enabled: bool,
    pub cell_size: f32,
    pub line_width: f32,
    pub color: [f32; 4],
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cell_size: 1.0,
            line_width: 1.0,
            color: [1.0, 1.0, 1.0, 0.12],
        }
    }
}

/// Per-scene data uploaded once per frame and bound to every pipeline.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct SceneUniform {
    pub view_proj: [[f32; 4]; 4],
    pub inverse_view_proj: [[f32; 4]; 4],
    pub background_top: [f32; 4],
    pub background_bottom: [f32; 4],
    pub grid_color: [f32; 4],
    pub outline_color: [f32; 4],
    /// x: cell size (world units), y: line width (pixels),
    /// z: grid enabled (0/1), w: unused.
    pub grid_params: [f32; 4],
    /// x, y: viewport size in pixels; z, w: unused.
    pub viewport: [f32; 4],
}

/// One independently rendered and picked 2D world.
///
/// A scene owns its camera, its offscreen targets and four geometry arenas,
/// one per primitive kind. Entities register geometry into exactly one
/// arena; a kind registry remembers which, so updates and removals dispatch
/// without the caller restating the kind's vertex type.
pub struct Scene {
    camera: Camera,
    target: PickingTarget,

    lines: GeometryArena<FlatVertex>,
    triangles: GeometryArena<FlatVertex>,
    textured: GeometryArena<TexturedVertex>,
    circles: GeometryArena<CircleVertex>,
    kinds: HashMap<EntityId, PrimitiveKind>,

    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    texture_bind_group: wgpu::BindGroup,

    background_top: [f32; 4],
    background_bottom: [f32; 4],
    grid: GridSettings,
    outline_color: [f32; 4],
    passes: PassConfig,

    /// Set after the first completed frame; picking against a never-rendered
    /// scene would read garbage.
    has_rendered: bool,
}

impl Scene {
    pub(crate) fn new(
        device: &wgpu::Device,
        uniform_layout: &wgpu::BindGroupLayout,
        texture_bind_group: wgpu::BindGroup,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        sample_count: u32,
    ) -> Result<Self, RenderError> {
        let target = PickingTarget::new(device, format, width, height, sample_count)?;

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene uniform"),
            size: std::mem::size_of::<SceneUniform>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scene uniform"),
            layout: uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Ok(Self {
            camera: Camera::new(width, height),
            target,
            lines: GeometryArena::new("lines"),
            triangles: GeometryArena::new("triangles"),
            textured: GeometryArena::new("textured triangles"),
            circles: GeometryArena::new("circles"),
            kinds: HashMap::new(),
            uniform_buffer,
            bind_group,
            texture_bind_group,
            background_top: [0.12, 0.12, 0.14, 1.0],
            background_bottom: [0.05, 0.05, 0.07, 1.0],
            grid: GridSettings::default(),
            outline_color: [1.0, 0.8, 0.2, 1.0],
            passes: PassConfig::default(),
            has_rendered: false,
        })
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn passes(&self) -> PassConfig {
        self.passes
    }

    pub fn set_passes(&mut self, passes: PassConfig) {
        self.passes = passes;
    }

    pub fn grid(&self) -> GridSettings {
        self.grid
    }

    pub fn set_grid(&mut self, grid: GridSettings) {
        self.grid = grid;
    }

    pub fn set_background(&mut self, top: [f32; 4], bottom: [f32; 4]) {
        self.background_top = top;
        self.background_bottom = bottom;
    }

    pub fn set_outline_color(&mut self, color: [f32; 4]) {
        self.outline_color = color;
    }

    /// What the display pass clears to. The gradient shader covers it when
    /// the background pass is enabled; this shows through when it is not.
    pub(crate) fn clear_color(&self) -> wgpu::Color {
        wgpu::Color {
            r: self.background_top[0] as f64,
            g: self.background_top[1] as f64,
            b: self.background_top[2] as f64,
            a: self.background_top[3] as f64,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.target.size()
    }

    pub fn has_rendered(&self) -> bool {
        self.has_rendered
    }

    pub fn register_lines(
        &mut self,
        id: EntityId,
        vertices: &[FlatVertex],
        indices: &[u32],
    ) -> Result<(), GeometryError> {
        self.check_unregistered(id)?;
        self.lines.insert(id, vertices, indices)?;
        self.kinds.insert(id, PrimitiveKind::Lines);
        Ok(())
    }

    pub fn register_triangles(
        &mut self,
        id: EntityId,
        vertices: &[FlatVertex],
        indices: &[u32],
    ) -> Result<(), GeometryError> {
        self.check_unregistered(id)?;
        self.triangles.insert(id, vertices, indices)?;
        self.kinds.insert(id, PrimitiveKind::Triangles);
        Ok(())
    }

    pub fn register_textured(
        &mut self,
        id: EntityId,
        vertices: &[TexturedVertex],
        indices: &[u32],
    ) -> Result<(), GeometryError> {
        self.check_unregistered(id)?;
        self.textured.insert(id, vertices, indices)?;
        self.kinds.insert(id, PrimitiveKind::TexturedTriangles);
        Ok(())
    }

    pub fn register_circles(
        &mut self,
        id: EntityId,
        vertices: &[CircleVertex],
        indices: &[u32],
    ) -> Result<(), GeometryError> {
        self.check_unregistered(id)?;
        self.circles.insert(id, vertices, indices)?;
        self.kinds.insert(id, PrimitiveKind::Circles);
        Ok(())
    }

    pub fn update_lines(
        &mut self,
        id: EntityId,
        vertices: &[FlatVertex],
    ) -> Result<(), GeometryError> {
        match self.kinds.get(&id) {
            Some(PrimitiveKind::Lines) => self.lines.update_in_place(id, vertices),
            Some(_) => Err(GeometryError::KindMismatch(id)),
            None => Err(GeometryError::UnknownEntity(id)),
        }
    }

    pub fn update_triangles(
        &mut self,
        id: EntityId,
        vertices: &[FlatVertex],
    ) -> Result<(), GeometryError> {
        match self.kinds.get(&id) {
            Some(PrimitiveKind::Triangles) => self.triangles.update_in_place(id, vertices),
            Some(_) => Err(GeometryError::KindMismatch(id)),
            None => Err(GeometryError::UnknownEntity(id)),
        }
    }

    pub fn update_textured(
        &mut self,
        id: EntityId,
        vertices: &[TexturedVertex],
    ) -> Result<(), GeometryError> {
        match self.kinds.get(&id) {
            Some(PrimitiveKind::TexturedTriangles) => self.textured.update_in_place(id, vertices),
            Some(_) => Err(GeometryError::KindMismatch(id)),
            None => Err(GeometryError::UnknownEntity(id)),
        }
    }

    pub fn update_circles(
        &mut self,
        id: EntityId,
        vertices: &[CircleVertex],
    ) -> Result<(), GeometryError> {
        match self.kinds.get(&id) {
            Some(PrimitiveKind::Circles) => self.circles.update_in_place(id, vertices),
            Some(_) => Err(GeometryError::KindMismatch(id)),
            None => Err(GeometryError::UnknownEntity(id)),
        }
    }

    /// Removes whatever geometry `id` has in this scene, whichever kind it
    /// was registered as. Returns `false` if the scene never saw the id.
    pub fn remove_geometry(&mut self, id: EntityId) -> bool {
        let Some(kind) = self.kinds.remove(&id) else {
            log::warn!("remove: entity {id} has no geometry in this scene");
            return false;
        };
        match kind {
            PrimitiveKind::Lines => self.lines.remove(id),
            PrimitiveKind::Triangles => self.triangles.remove(id),
            PrimitiveKind::TexturedTriangles => self.textured.remove(id),
            PrimitiveKind::Circles => self.circles.remove(id),
        }
    }

    /// Drops every entity's geometry at once; used when a document closes
    /// but the scene (camera, settings) lives on.
    pub fn clear_geometry(&mut self) {
        self.lines.clear();
        self.triangles.clear();
        self.textured.clear();
        self.circles.clear();
        self.kinds.clear();
    }

    pub fn kind_of(&self, id: EntityId) -> Option<PrimitiveKind> {
        self.kinds.get(&id).copied()
    }

    pub fn entity_count(&self) -> usize {
        self.kinds.len()
    }

    fn check_unregistered(&self, id: EntityId) -> Result<(), GeometryError> {
        if self.kinds.contains_key(&id) {
            return Err(GeometryError::AlreadyRegistered(id));
        }
        Ok(())
    }

    pub(crate) fn set_texture_bind_group(&mut self, bind_group: wgpu::BindGroup) {
        self.texture_bind_group = bind_group;
    }

    pub(crate) fn resize(
        &mut self,
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        self.target.resize(device, width, height)?;
        self.camera.set_viewport(width, height);
        // The old frame no longer exists at the new size.
        self.has_rendered = false;
        Ok(())
    }

    /// Uploads everything the frame's passes read: arena buffers and the
    /// scene uniform.
    pub(crate) fn sync(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        self.lines.sync(device, queue);
        self.triangles.sync(device, queue);
        self.textured.sync(device, queue);
        self.circles.sync(device, queue);

        let (width, height) = self.target.size();
        let uniform = SceneUniform {
            view_proj: self.camera.view_proj().to_cols_array_2d(),
            inverse_view_proj: self.camera.inverse_view_proj().to_cols_array_2d(),
            background_top: self.background_top,
            background_bottom: self.background_bottom,
            grid_color: self.grid.color,
            outline_color: self.outline_color,
            grid_params: [
                self.grid.cell_size,
                self.grid.line_width,
                if self.grid.enabled { 1.0 } else { 0.0 },
                0.0,
            ],
            viewport: [width as f32, height as f32, 0.0, 0.0],
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    pub(crate) fn mark_rendered(&mut self) {
        self.camera.snapshot_frame_state();
        self.has_rendered = true;
    }

    pub(crate) fn target(&self) -> &PickingTarget {
        &self.target
    }

    pub(crate) fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub(crate) fn texture_bind_group(&self) -> &wgpu::BindGroup {
        &self.texture_bind_group
    }

    pub(crate) fn arenas(
        &self,
    ) -> (
        &GeometryArena<FlatVertex>,
        &GeometryArena<FlatVertex>,
        &GeometryArena<TexturedVertex>,
        &GeometryArena<CircleVertex>,
    ) {
        (&self.lines, &self.triangles, &self.textured, &self.circles)
    }
}
