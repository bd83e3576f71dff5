//! CPU-side scene description for the composited backend
//!
//! The scene holds one plane centred at the origin and an orthographic camera
//! whose frustum matches the plane exactly, so the textured plane fills the
//! viewport. Matrices use wgpu clip space (depth in `0..=1`).

use bytemuck::{Pod, Zeroable};

/// Orthographic camera looking down -Z
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthographicCamera {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    pub near: f32,
    pub far: f32,
}

impl OrthographicCamera {
    pub fn new(left: f32, right: f32, top: f32, bottom: f32, near: f32, far: f32) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
            near,
            far,
        }
    }

    /// Column-major projection matrix
    pub fn projection(&self) -> [[f32; 4]; 4] {
        let w = self.right - self.left;
        let h = self.top - self.bottom;
        let p = self.far - self.near;

        let x = (self.right + self.left) / w;
        let y = (self.top + self.bottom) / h;

        [
            [2.0 / w, 0.0, 0.0, 0.0],
            [0.0, 2.0 / h, 0.0, 0.0],
            [0.0, 0.0, -1.0 / p, 0.0],
            [-x, -y, -self.near / p, 1.0],
        ]
    }

    /// Project a point into normalized device coordinates
    pub fn project(&self, point: [f32; 3]) -> [f32; 3] {
        let m = self.projection();
        let v = [point[0], point[1], point[2], 1.0];
        let mut out = [0.0f32; 4];
        for (col, value) in m.iter().zip(v) {
            for (acc, coeff) in out.iter_mut().zip(col) {
                *acc += coeff * value;
            }
        }
        [out[0] / out[3], out[1] / out[3], out[2] / out[3]]
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
}

impl From<&OrthographicCamera> for CameraUniform {
    fn from(camera: &OrthographicCamera) -> Self {
        Self {
            view_proj: camera.projection(),
        }
    }
}

/// Rectangle mesh in the XY plane, centred at the origin
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub vertices: [Vertex; 4],
    pub indices: [u16; 6],
}

impl Plane {
    pub fn new(width: f32, height: f32) -> Self {
        let (hw, hh) = (width / 2.0, height / 2.0);
        // uv (0,0) is the first row of the frame, i.e. the top edge
        let vertices = [
            Vertex {
                position: [-hw, hh, 0.0],
                uv: [0.0, 0.0],
            },
            Vertex {
                position: [hw, hh, 0.0],
                uv: [1.0, 0.0],
            },
            Vertex {
                position: [-hw, -hh, 0.0],
                uv: [0.0, 1.0],
            },
            Vertex {
                position: [hw, -hh, 0.0],
                uv: [1.0, 1.0],
            },
        ];

        Self {
            vertices,
            indices: [0, 2, 1, 2, 3, 1],
        }
    }
}

/// One plane and the camera framing it
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub camera: OrthographicCamera,
    pub plane: Plane,
}

impl Scene {
    pub fn framed_plane() -> Self {
        Self {
            camera: OrthographicCamera::new(-1.0, 1.0, 1.0, -1.0, -1.0, 1.0),
            plane: Plane::new(2.0, 2.0),
        }
    }
}
