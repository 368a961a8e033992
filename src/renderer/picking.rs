use super::*;

impl SceneRenderer {
    /// Returns the entity id of the topmost primitive under a pixel of the
    /// bound scene's last rendered frame.
    ///
    /// Pixels with no primitive, out-of-bounds pixels and queries against a
    /// scene that has never rendered all yield [`EntityId::INVALID`]. The
    /// result describes the *previous* frame; convert the pixel with
    /// [`pixel_to_world`](Self::pixel_to_world) (`updated = false`) when the
    /// camera has moved since.
    pub fn query_entity_at(&self, x: u32, y: u32) -> Result<EntityId, RenderError> {
        let id = self.binding.current().ok_or(RenderError::NoSceneBound)?;
        let scene = self.scene(id)?;
        if !scene.has_rendered() {
            log::warn!("picking query against scene {id} before its first frame");
            return Ok(EntityId::INVALID);
        }
        Ok(scene.target().read_entity_id(&self.device, &self.queue, x, y))
    }

    /// Reads the bound scene's last rendered frame as tightly packed RGBA8
    /// rows. Blocking; meant for tests and screenshots.
    pub fn read_display_rgba(&self) -> Result<Vec<u8>, RenderError> {
        let id = self.binding.current().ok_or(RenderError::NoSceneBound)?;
        self.scene(id)?
            .target()
            .read_display_rgba(&self.device, &self.queue)
    }
}
