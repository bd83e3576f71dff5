/// GPU composition using wgpu
///
/// Renders the scene of the composited backend offscreen and reads it back
/// for the output surface.
///
/// Architecture:
/// - `context`: wgpu device/queue management
/// - `compositor`: the composited render backend
/// - `plane_pipeline`: bind group layouts and the plane render pipeline
/// - `texture`: texture upload and readback
mod compositor;
mod context;
mod plane_pipeline;
mod texture;

pub use compositor::CompositedBackend;
