use crate::entity::EntityId;
use crate::renderer::SceneId;

/// Errors raised by the renderer's orchestration layer.
///
/// Ordering errors (`NoSceneBound`, `SceneNotFound`) are recoverable: the
/// offending call is skipped and the session keeps running. Device errors are
/// hard failures — rendering cannot proceed without the GPU resources.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no scene is currently bound")]
    NoSceneBound,
    #[error("scene {0} does not exist")]
    SceneNotFound(SceneId),
    #[error("viewport dimensions must be non-zero, got {0}x{1}")]
    InvalidViewport(u32, u32),
    #[error("no compatible GPU adapter is available")]
    AdapterUnavailable,
    #[error("failed to acquire a GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
    #[error("mapping a readback buffer failed")]
    ReadbackMap(#[from] wgpu::BufferAsyncError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Errors raised by a geometry arena.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("entity {0} already has geometry registered in this arena")]
    AlreadyRegistered(EntityId),
    #[error("entity {0} has no geometry in this arena")]
    UnknownEntity(EntityId),
    #[error("entity {id} was registered with {expected} vertices, update supplied {provided}")]
    VertexCountMismatch {
        id: EntityId,
        expected: u32,
        provided: u32,
    },
    #[error("entity {0} supplied an index referencing a vertex outside its own run")]
    IndexOutOfRange(EntityId),
    #[error("entity {0} was registered as a different primitive kind")]
    KindMismatch(EntityId),
}

/// Errors raised by the identity allocator.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("entity id {0} is not live (double release or never allocated)")]
    NotLive(EntityId),
}
