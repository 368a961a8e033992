use glam::{Mat4, Vec2, Vec3, Vec4};

/// Default multiplier applied per scroll step when zooming.
const DEFAULT_SCALE_RATE: f32 = 0.15;

/// 2D orthographic camera over the scene's world plane.
///
/// The view matrix is composed as `scaling * rotation * translation`, and the
/// projection maps the world to a viewport-aspect-corrected box: x spans
/// `[-aspect, aspect]`, y spans `[-1, 1]`. Matrices are recomputed lazily;
/// mutators only set a dirty flag.
///
/// The camera keeps a snapshot of the matrices the last presented frame was
/// drawn with. Picking readbacks describe that frame, not the current
/// matrices, so pixel-to-world conversions for pick results must use the
/// snapshot (`updated = false`) to stay consistent with what was on screen.
pub struct Camera {
    position: Vec2,
    scale: Vec2,
    /// View rotation in radians, counter-clockwise.
    rotation: f32,
    scale_rate: f32,

    viewport: Vec2,
    aspect: f32,

    view: Mat4,
    projection: Mat4,
    view_proj: Mat4,
    inverse_view_proj: Mat4,
    dirty: bool,

    /// Inverse view-projection the last presented frame was drawn with.
    prev_inverse_view_proj: Mat4,
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        let mut camera = Self {
            position: Vec2::ZERO,
            scale: Vec2::ONE,
            rotation: 0.0,
            scale_rate: DEFAULT_SCALE_RATE,
            viewport: Vec2::new(width as f32, height as f32),
            aspect: width as f32 / height as f32,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            view_proj: Mat4::IDENTITY,
            inverse_view_proj: Mat4::IDENTITY,
            dirty: true,
            prev_inverse_view_proj: Mat4::IDENTITY,
        };
        camera.refresh();
        // Before the first frame the snapshot is the initial matrices.
        camera.snapshot_frame_state();
        camera
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = Vec2::new(width as f32, height as f32);
        self.aspect = width as f32 / height as f32;
        self.dirty = true;
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.viewport.x as u32, self.viewport.y as u32)
    }

    /// Moves the camera by a delta in world units.
    pub fn translate(&mut self, delta: Vec2) {
        self.position += delta;
        self.dirty = true;
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
        self.dirty = true;
    }

    /// Sets the absolute zoom. Scale factors must stay strictly positive;
    /// non-positive components are ignored with a warning.
    pub fn set_scale(&mut self, scale: Vec2) {
        if scale.x <= 0.0 || scale.y <= 0.0 {
            log::warn!("ignoring non-positive camera scale {scale}");
            return;
        }
        self.scale = scale;
        self.dirty = true;
    }

    /// Rotates the view by `angle` radians, counter-clockwise, about the
    /// world point at the viewport center.
    pub fn set_rotation(&mut self, angle: f32) {
        self.rotation = angle;
        self.dirty = true;
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    pub fn set_scale_rate(&mut self, rate: f32) {
        self.scale_rate = rate;
    }

    /// The scale multiplier for `steps` scroll increments.
    ///
    /// Positive steps zoom in by `1 + rate * steps`; negative steps zoom out
    /// by the reciprocal of the same expression, so `n` steps in followed by
    /// `n` steps out lands back on the original scale.
    pub fn zoom_scale_for(&self, steps: f32) -> f32 {
        if steps >= 0.0 {
            1.0 + self.scale_rate * steps
        } else {
            1.0 / (1.0 + self.scale_rate * steps.abs())
        }
    }

    /// Zooms by `steps` increments while keeping the world point under
    /// `cursor` (in pixels) stationary on screen.
    pub fn increment_zoom_around_cursor(&mut self, steps: f32, cursor: Vec2) {
        self.refresh();
        let before = self.pixel_to_world(cursor, true);

        let factor = self.zoom_scale_for(steps);
        self.scale *= factor;
        self.dirty = true;
        self.refresh();

        let after = self.pixel_to_world(cursor, true);
        self.translate(after - before);
    }

    /// Converts a window pixel to world coordinates.
    ///
    /// `updated` selects which matrices to invert: `true` for the current
    /// (possibly not yet rendered) matrices, `false` for the snapshot of the
    /// last presented frame. Pixel y grows downward; NDC y grows upward.
    pub fn pixel_to_world(&mut self, pixel: Vec2, updated: bool) -> Vec2 {
        if updated {
            self.refresh();
        }
        let inverse = if updated {
            self.inverse_view_proj
        } else {
            self.prev_inverse_view_proj
        };
        let ndc = Vec2::new(
            2.0 * pixel.x / self.viewport.x - 1.0,
            1.0 - 2.0 * pixel.y / self.viewport.y,
        );
        let world = inverse * Vec4::new(ndc.x, ndc.y, 0.0, 1.0);
        Vec2::new(world.x, world.y)
    }

    /// Converts a world point to window pixel coordinates using the current
    /// matrices.
    pub fn world_to_pixel(&mut self, world: Vec2) -> Vec2 {
        self.refresh();
        let clip = self.view_proj * Vec4::new(world.x, world.y, 0.0, 1.0);
        Vec2::new(
            (clip.x + 1.0) * 0.5 * self.viewport.x,
            (1.0 - clip.y) * 0.5 * self.viewport.y,
        )
    }

    pub fn view_proj(&mut self) -> Mat4 {
        self.refresh();
        self.view_proj
    }

    pub fn inverse_view_proj(&mut self) -> Mat4 {
        self.refresh();
        self.inverse_view_proj
    }

    /// Records the current matrices as "what the last frame was drawn with".
    /// Called once per rendered frame, after the matrices are uploaded.
    pub fn snapshot_frame_state(&mut self) {
        self.refresh();
        self.prev_inverse_view_proj = self.inverse_view_proj;
    }

    fn refresh(&mut self) {
        if !self.dirty {
            return;
        }
        let scaling = Mat4::from_scale(Vec3::new(self.scale.x, self.scale.y, 1.0));
        let rotation = Mat4::from_rotation_z(self.rotation);
        let translation = Mat4::from_translation(Vec3::new(self.position.x, self.position.y, 0.0));
        self.view = scaling * rotation * translation;
        self.projection =
            Mat4::orthographic_rh(-self.aspect, self.aspect, -1.0, 1.0, -1.0, 1.0);
        self.view_proj = self.projection * self.view;
        self.inverse_view_proj = self.view_proj.inverse();
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn viewport_center_maps_to_world_origin() {
        let mut camera = Camera::new(800, 600);
        let world = camera.pixel_to_world(Vec2::new(400.0, 300.0), true);
        assert_relative_eq!(world.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(world.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn projection_is_aspect_corrected() {
        let mut camera = Camera::new(800, 600);
        // The right edge of an 800x600 viewport sits at x = aspect = 4/3.
        let world = camera.pixel_to_world(Vec2::new(800.0, 300.0), true);
        assert_relative_eq!(world.x, 800.0 / 600.0, epsilon = 1e-5);

        // Pixel y grows downward, world y upward: the top edge is +1.
        let top = camera.pixel_to_world(Vec2::new(400.0, 0.0), true);
        assert_relative_eq!(top.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn pixel_world_round_trip() {
        let mut camera = Camera::new(1024, 768);
        camera.translate(Vec2::new(3.5, -1.25));
        camera.increment_zoom_around_cursor(2.0, Vec2::new(100.0, 200.0));

        let pixel = Vec2::new(617.0, 431.0);
        let world = camera.pixel_to_world(pixel, true);
        let back = camera.world_to_pixel(world);
        assert_relative_eq!(back.x, pixel.x, epsilon = 1e-3);
        assert_relative_eq!(back.y, pixel.y, epsilon = 1e-3);
    }

    #[test]
    fn zoom_keeps_cursor_point_stationary() {
        let mut camera = Camera::new(800, 600);
        camera.translate(Vec2::new(0.7, -0.3));
        let cursor = Vec2::new(150.0, 450.0);
        let anchor = camera.pixel_to_world(cursor, true);

        camera.increment_zoom_around_cursor(3.0, cursor);
        let after_in = camera.pixel_to_world(cursor, true);
        assert_relative_eq!(after_in.x, anchor.x, epsilon = 1e-4);
        assert_relative_eq!(after_in.y, anchor.y, epsilon = 1e-4);

        camera.increment_zoom_around_cursor(-3.0, cursor);
        let after_out = camera.pixel_to_world(cursor, true);
        assert_relative_eq!(after_out.x, anchor.x, epsilon = 1e-4);
        assert_relative_eq!(after_out.y, anchor.y, epsilon = 1e-4);
        // Symmetric steps also restore the original zoom level.
        assert_relative_eq!(camera.scale().x, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn rotation_spins_the_world_about_the_view_center() {
        let mut camera = Camera::new(600, 600);
        camera.set_rotation(std::f32::consts::FRAC_PI_2);

        // A quarter turn carries the +x axis onto the +y axis.
        let rotated = camera.world_to_pixel(Vec2::new(0.5, 0.0));
        let mut reference = Camera::new(600, 600);
        let expected = reference.world_to_pixel(Vec2::new(0.0, 0.5));
        assert_relative_eq!(rotated.x, expected.x, epsilon = 1e-3);
        assert_relative_eq!(rotated.y, expected.y, epsilon = 1e-3);

        // The point under the viewport center is the pivot and stays put.
        let mut panned = Camera::new(600, 600);
        panned.set_position(Vec2::new(2.0, 1.0));
        let center = Vec2::new(300.0, 300.0);
        let pivot = panned.pixel_to_world(center, true);
        panned.set_rotation(1.0);
        let pivot_after = panned.pixel_to_world(center, true);
        assert_relative_eq!(pivot_after.x, pivot.x, epsilon = 1e-4);
        assert_relative_eq!(pivot_after.y, pivot.y, epsilon = 1e-4);
    }

    #[test]
    fn non_positive_scale_is_ignored() {
        let mut camera = Camera::new(800, 600);
        camera.set_scale(Vec2::new(2.0, 2.0));
        camera.set_scale(Vec2::new(0.0, 1.0));
        camera.set_scale(Vec2::new(1.0, -3.0));
        assert_eq!(camera.scale(), Vec2::new(2.0, 2.0));
    }

    #[test]
    fn stale_conversion_uses_last_frame_matrices() {
        let mut camera = Camera::new(800, 600);
        camera.snapshot_frame_state();
        let pixel = Vec2::new(200.0, 100.0);
        let presented = camera.pixel_to_world(pixel, true);

        // Camera moves, but no frame has been rendered since.
        camera.translate(Vec2::new(5.0, 5.0));

        let stale = camera.pixel_to_world(pixel, false);
        assert_relative_eq!(stale.x, presented.x, epsilon = 1e-5);
        assert_relative_eq!(stale.y, presented.y, epsilon = 1e-5);

        let fresh = camera.pixel_to_world(pixel, true);
        assert!((fresh.x - presented.x).abs() > 1.0);
    }
}
