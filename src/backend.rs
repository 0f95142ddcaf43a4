//! The rendering-backend seam.
//!
//! All scene-lifecycle logic depends only on this capability set, never on a
//! concrete graphics type. The crate ships a wgpu implementation
//! ([`WgpuBackend`](crate::wgpu_backend::WgpuBackend)); tests drive the core
//! against a recording double.

use glam::Vec3;

use crate::camera::CameraState;
use crate::loader::LoadedImage;

/// Type-safe handle to a backend mesh.
///
/// The newtype prevents passing texture handles where mesh handles are
/// expected. Handles are allocated by the backend and owned by the viewer,
/// which disposes them explicitly when superseded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u64);

/// Type-safe handle to a backend texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// One environment: a sphere mesh plus the texture mapped onto it.
#[derive(Clone, Copy, Debug)]
pub struct Environment {
    pub mesh: MeshHandle,
    pub texture: TextureHandle,
}

/// Operations the scene lifecycle needs from a renderer.
pub trait RenderBackend {
    /// Upload decoded RGBA8 pixels; the returned handle is owned by the
    /// caller and must eventually be disposed.
    fn upload_texture(&mut self, image: &LoadedImage, label: &str) -> TextureHandle;

    /// Create an inward-facing sphere for environment mapping.
    fn create_sphere(&mut self, radius: f32) -> MeshHandle;

    /// Create a flat plane, used for overlay markers.
    fn create_plane(&mut self, width: f32, height: f32) -> MeshHandle;

    fn set_texture(&mut self, mesh: MeshHandle, texture: TextureHandle);

    fn set_opacity(&mut self, mesh: MeshHandle, opacity: f32);

    fn set_position(&mut self, mesh: MeshHandle, position: Vec3);

    /// Add the mesh to the scene graph. Attaching twice is a no-op.
    fn attach(&mut self, mesh: MeshHandle);

    /// Remove the mesh from the scene graph without disposing it.
    fn detach(&mut self, mesh: MeshHandle);

    /// Render one frame of all attached meshes.
    fn render(&mut self, camera: &CameraState);

    fn dispose_texture(&mut self, texture: TextureHandle);

    fn dispose_mesh(&mut self, mesh: MeshHandle);

    fn resize(&mut self, width: u32, height: u32);
}
