//! A batched 2D scene renderer with GPU entity picking.
//!
//! Geometry is registered per entity into shared, packed buffers and drawn
//! with one indexed call per primitive kind. Every frame also renders an
//! integer image of entity ids, so "what is under the cursor" is a single
//! texel readback instead of CPU-side hit testing. Scenes own their camera
//! and offscreen targets; a [`SceneRenderer`] owns the device, the scenes
//! and the shared pipelines.
//!
//! ```no_run
//! use veduta::{FlatVertex, OwnerTag, SceneRenderer};
//!
//! # async fn run() {
//! let mut renderer = SceneRenderer::new_headless().await.unwrap();
//! renderer.create_scene(800, 600, 4).unwrap();
//!
//! let id = renderer.create_entity(OwnerTag(1));
//! let color = [0.9, 0.2, 0.2, 1.0];
//! let vertices = [
//!     FlatVertex::new([-0.5, -0.5, 0.0], color, id),
//!     FlatVertex::new([0.5, -0.5, 0.0], color, id),
//!     FlatVertex::new([0.0, 0.5, 0.0], color, id),
//! ];
//! renderer.register_triangles(id, &vertices, &[0, 1, 2]).unwrap();
//! renderer.render_frame().unwrap();
//!
//! let picked = renderer.query_entity_at(400, 300).unwrap();
//! assert_eq!(picked, id);
//! # }
//! ```

pub use wgpu;

mod arena;
mod binding;
mod camera;
mod entity;
mod error;
mod framebuffer;
mod renderer;
mod scene;
mod vertex;

pub use arena::GeometryArena;
pub use binding::SceneBindingStack;
pub use camera::Camera;
pub use entity::{EntityAllocator, EntityId, OwnerTag};
pub use error::{GeometryError, IdentityError, RenderError};
pub use framebuffer::PickingTarget;
pub use renderer::{SceneId, SceneRenderer, SceneScope};
pub use scene::{GridSettings, PassConfig, Scene};
pub use vertex::{CircleVertex, FlatVertex, PrimitiveKind, TexturedVertex};
