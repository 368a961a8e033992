mod construction;
mod passes;
mod picking;

use std::fmt;
use std::ops::{Deref, DerefMut};

use ahash::HashMap;
use glam::Vec2;

use crate::binding::SceneBindingStack;
use crate::entity::{EntityAllocator, EntityId, OwnerTag};
use crate::error::RenderError;
use crate::scene::Scene;
use crate::vertex::{CircleVertex, FlatVertex, TexturedVertex};

pub(crate) use construction::Pipelines;

/// Handle to a scene owned by a [`SceneRenderer`]. Stays unique for the
/// renderer's lifetime; deleted scene ids are never reissued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneId(pub(crate) u32);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The renderer: owns the GPU device, every scene, the shared pipelines and
/// the entity identity allocator.
///
/// Most operations are phrased against the *bound* scene rather than taking
/// a scene handle, mirroring how an editor drives it: bind the document's
/// scene once, then stream geometry edits, camera moves and picking queries.
/// Calls made with no scene bound fail with [`RenderError::NoSceneBound`].
pub struct SceneRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,

    scenes: HashMap<SceneId, Scene>,
    next_scene_id: u32,
    binding: SceneBindingStack,
    entities: EntityAllocator<OwnerTag>,

    pipelines: Pipelines,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    outline_layout: wgpu::BindGroupLayout,
    default_texture_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,

    default_sample_count: u32,
}

impl SceneRenderer {
    /// Creates a new scene and binds it. The scene starts empty, with a
    /// default camera framing the world origin.
    pub fn create_scene(
        &mut self,
        width: u32,
        height: u32,
        sample_count: u32,
    ) -> Result<SceneId, RenderError> {
        let scene = Scene::new(
            &self.device,
            &self.uniform_layout,
            self.default_texture_bind_group.clone(),
            self.format,
            width,
            height,
            sample_count,
        )?;
        let id = SceneId(self.next_scene_id);
        self.next_scene_id += 1;
        self.scenes.insert(id, scene);
        self.binding.bind(id);
        log::debug!("created scene {id} ({width}x{height})");
        Ok(id)
    }

    /// Deletes a scene and scrubs it from the binding stack. Entity ids whose
    /// geometry lived only in this scene stay allocated; their owners decide
    /// when to destroy them.
    pub fn delete_scene(&mut self, id: SceneId) -> Result<(), RenderError> {
        self.scenes
            .remove(&id)
            .ok_or(RenderError::SceneNotFound(id))?;
        self.binding.forget(id);
        log::debug!("deleted scene {id}");
        Ok(())
    }

    pub fn bind_scene(&mut self, id: SceneId) -> Result<(), RenderError> {
        if !self.scenes.contains_key(&id) {
            return Err(RenderError::SceneNotFound(id));
        }
        self.binding.bind(id);
        Ok(())
    }

    pub fn unbind_scene(&mut self) {
        self.binding.unbind();
    }

    pub fn bound_scene_id(&self) -> Option<SceneId> {
        self.binding.current()
    }

    /// Temporarily binds `id`, returning a guard that restores the previous
    /// binding when dropped. Scopes nest.
    pub fn scoped(&mut self, id: SceneId) -> Result<SceneScope<'_>, RenderError> {
        if !self.scenes.contains_key(&id) {
            return Err(RenderError::SceneNotFound(id));
        }
        self.binding.store_and_bind(id);
        Ok(SceneScope { renderer: self })
    }

    pub fn scene(&self, id: SceneId) -> Result<&Scene, RenderError> {
        self.scenes.get(&id).ok_or(RenderError::SceneNotFound(id))
    }

    pub fn scene_mut(&mut self, id: SceneId) -> Result<&mut Scene, RenderError> {
        self.scenes
            .get_mut(&id)
            .ok_or(RenderError::SceneNotFound(id))
    }

    fn bound_scene_mut(&mut self) -> Result<&mut Scene, RenderError> {
        let id = self.binding.current().ok_or(RenderError::NoSceneBound)?;
        self.scenes
            .get_mut(&id)
            .ok_or(RenderError::SceneNotFound(id))
    }

    /// Issues a fresh entity id tagged with the caller's owner handle.
    pub fn create_entity(&mut self, owner: OwnerTag) -> EntityId {
        self.entities.allocate(owner)
    }

    /// The id [`create_entity`](Self::create_entity) will issue next. Lets a
    /// caller stamp vertices with their id before committing the entity.
    pub fn peek_next_entity(&self) -> EntityId {
        self.entities.peek_next()
    }

    pub fn entity_owner(&self, id: EntityId) -> Option<OwnerTag> {
        self.entities.lookup(id).copied()
    }

    /// Releases an entity id and removes its geometry from the bound scene.
    ///
    /// Geometry removal is best-effort: an entity with no geometry in the
    /// bound scene (or no scene bound at all) still releases cleanly, since
    /// callers may have already cleared it.
    pub fn destroy_entity(&mut self, id: EntityId) -> Result<OwnerTag, RenderError> {
        if let Ok(scene) = self.bound_scene_mut() {
            if scene.kind_of(id).is_some() {
                scene.remove_geometry(id);
            }
        }
        Ok(self.entities.release(id)?)
    }

    pub fn register_lines(
        &mut self,
        id: EntityId,
        vertices: &[FlatVertex],
        indices: &[u32],
    ) -> Result<(), RenderError> {
        Ok(self.bound_scene_mut()?.register_lines(id, vertices, indices)?)
    }

    pub fn register_triangles(
        &mut self,
        id: EntityId,
        vertices: &[FlatVertex],
        indices: &[u32],
    ) -> Result<(), RenderError> {
        Ok(self
            .bound_scene_mut()?
            .register_triangles(id, vertices, indices)?)
    }

    pub fn register_textured(
        &mut self,
        id: EntityId,
        vertices: &[TexturedVertex],
        indices: &[u32],
    ) -> Result<(), RenderError> {
        Ok(self
            .bound_scene_mut()?
            .register_textured(id, vertices, indices)?)
    }

    pub fn register_circles(
        &mut self,
        id: EntityId,
        vertices: &[CircleVertex],
        indices: &[u32],
    ) -> Result<(), RenderError> {
        Ok(self
            .bound_scene_mut()?
            .register_circles(id, vertices, indices)?)
    }

    pub fn update_lines(
        &mut self,
        id: EntityId,
        vertices: &[FlatVertex],
    ) -> Result<(), RenderError> {
        Ok(self.bound_scene_mut()?.update_lines(id, vertices)?)
    }

    pub fn update_triangles(
        &mut self,
        id: EntityId,
        vertices: &[FlatVertex],
    ) -> Result<(), RenderError> {
        Ok(self.bound_scene_mut()?.update_triangles(id, vertices)?)
    }

    pub fn update_textured(
        &mut self,
        id: EntityId,
        vertices: &[TexturedVertex],
    ) -> Result<(), RenderError> {
        Ok(self.bound_scene_mut()?.update_textured(id, vertices)?)
    }

    pub fn update_circles(
        &mut self,
        id: EntityId,
        vertices: &[CircleVertex],
    ) -> Result<(), RenderError> {
        Ok(self.bound_scene_mut()?.update_circles(id, vertices)?)
    }

    pub fn remove_geometry(&mut self, id: EntityId) -> Result<bool, RenderError> {
        Ok(self.bound_scene_mut()?.remove_geometry(id))
    }

    /// Pans the bound scene's camera by a cursor delta in pixels. The content
    /// follows the cursor.
    pub fn pan(&mut self, delta_pixels: Vec2) -> Result<(), RenderError> {
        let camera = self.bound_scene_mut()?.camera_mut();
        let from = camera.pixel_to_world(Vec2::ZERO, true);
        let to = camera.pixel_to_world(delta_pixels, true);
        camera.translate(to - from);
        Ok(())
    }

    /// Sets the bound scene's camera to an absolute position and zoom.
    pub fn set_camera(&mut self, position: Vec2, scale: Vec2) -> Result<(), RenderError> {
        let camera = self.bound_scene_mut()?.camera_mut();
        camera.set_position(position);
        camera.set_scale(scale);
        Ok(())
    }

    /// Zooms the bound scene's camera by `steps` scroll increments around a
    /// cursor position in pixels.
    pub fn zoom(&mut self, steps: f32, cursor_pixels: Vec2) -> Result<(), RenderError> {
        self.bound_scene_mut()?
            .camera_mut()
            .increment_zoom_around_cursor(steps, cursor_pixels);
        Ok(())
    }

    /// Converts a pixel to world coordinates in the bound scene. Pass
    /// `updated = false` when interpreting a picking result, so the
    /// conversion matches the frame the pick was read from.
    pub fn pixel_to_world(&mut self, pixel: Vec2, updated: bool) -> Result<Vec2, RenderError> {
        Ok(self
            .bound_scene_mut()?
            .camera_mut()
            .pixel_to_world(pixel, updated))
    }

    /// Converts a world point to a pixel in the bound scene's viewport.
    pub fn world_to_pixel(&mut self, world: Vec2) -> Result<Vec2, RenderError> {
        Ok(self.bound_scene_mut()?.camera_mut().world_to_pixel(world))
    }

    /// Resizes the bound scene's render targets and viewport.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidViewport(width, height));
        }
        let id = self.binding.current().ok_or(RenderError::NoSceneBound)?;
        let scene = self
            .scenes
            .get_mut(&id)
            .ok_or(RenderError::SceneNotFound(id))?;
        scene.resize(&self.device, width, height)
    }

    /// The finished frame of the bound scene, ready to sample or present.
    pub fn display_texture(&self) -> Result<&wgpu::Texture, RenderError> {
        let id = self.binding.current().ok_or(RenderError::NoSceneBound)?;
        Ok(self.scene(id)?.target().display_texture())
    }

    pub fn display_view(&self) -> Result<&wgpu::TextureView, RenderError> {
        let id = self.binding.current().ok_or(RenderError::NoSceneBound)?;
        Ok(self.scene(id)?.target().display_view())
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

/// Guard for a temporarily bound scene; restores the previous binding on
/// drop. Dereferences to the renderer so the full API is available inside
/// the scope.
pub struct SceneScope<'a> {
    renderer: &'a mut SceneRenderer,
}

impl Deref for SceneScope<'_> {
    type Target = SceneRenderer;

    fn deref(&self) -> &SceneRenderer {
        self.renderer
    }
}

impl DerefMut for SceneScope<'_> {
    fn deref_mut(&mut self) -> &mut SceneRenderer {
        self.renderer
    }
}

impl Drop for SceneScope<'_> {
    fn drop(&mut self) {
        self.renderer.binding.restore_and_unbind();
    }
}
