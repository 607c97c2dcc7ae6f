//! Scene graph seam.
//!
//! The scene is loaded and rendered elsewhere; this crate only addresses
//! nodes by name, reads bounding volumes, flips visibility and materials, and
//! hangs its own labels and heatmap overlays off the graph.

use crate::colormap::Color;
use image::RgbaImage;
use nalgebra::Point3;
use std::sync::Arc;
use thiserror::Error;

pub mod asset;

pub use asset::Scene;

pub type NodeId = usize;
pub type AttachmentId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId(pub u64);

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    pub fn from_arrays(min: [f64; 3], max: [f64; 3]) -> Self {
        Self::new(Point3::from(min), Point3::from(max))
    }

    pub fn is_valid(&self) -> bool {
        self.min.iter().zip(self.max.iter()).all(|(lo, hi)| lo <= hi)
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }
}

/// Handle to a texture image owned by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureRef(pub Arc<str>);

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub color: Color,
    pub opacity: f32,
    pub transparent: bool,
    pub metalness: f32,
    pub roughness: f32,
    pub wireframe: bool,
    pub texture: Option<TextureRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    /// Name carried over from the asset's extras; GLTF loaders keep the
    /// unsanitized node name here.
    pub associated_name: Option<String>,
    pub is_mesh: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub bounds: Option<Aabb>,
    pub visible: bool,
    pub material: Option<Material>,
}

impl SceneNode {
    pub fn associated_name(&self) -> &str {
        self.associated_name.as_deref().unwrap_or(&self.name)
    }
}

/// Box geometry size for a heatmap overlay, before rotation onto the floor.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Footprint {
    pub width: f64,
    pub height: f64,
    pub depth: f64,
}

impl Default for Footprint {
    fn default() -> Self {
        Self {
            width: 5.2,
            height: 5.0,
            depth: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelStyle {
    pub font_size: f32,
    pub color: Color,
    pub font_weight: u16,
}

impl Default for LabelStyle {
    fn default() -> Self {
        Self {
            font_size: 0.7,
            color: Color::from_rgb8(0x0f, 0x32, 0x57),
            font_weight: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub room_id: String,
    pub node_name: String,
    pub text: String,
    pub position: Point3<f64>,
    pub style: LabelStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapOverlay {
    pub room_id: String,
    pub node_name: String,
    pub value: f64,
    pub position: Point3<f64>,
    /// Rotation about X that lays the box flat on the floor.
    pub rotation_x: f64,
    pub size: Footprint,
    pub opacity: f32,
    pub double_sided: bool,
    pub texture: Arc<RgbaImage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Attachment {
    Label(Label),
    Overlay(HeatmapOverlay),
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("failed to read scene asset: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse scene asset: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("node {0} has inverted bounds")]
    InvalidBounds(String),
    #[error("scene asset has no nodes")]
    Empty,
}

/// Operations the engine needs from the externally owned scene graph.
pub trait SceneGraph {
    /// Identity of the loaded graph; changes whenever a new graph is loaded.
    fn scene_id(&self) -> SceneId;

    /// Every node, parents before children.
    fn node_ids(&self) -> Vec<NodeId>;

    fn node(&self, id: NodeId) -> Option<&SceneNode>;

    /// First node in traversal order with exactly this name.
    fn find_by_name(&self, name: &str) -> Option<NodeId>;

    /// World-space bounds of the node and all of its descendants.
    fn bounding_box(&self, id: NodeId) -> Option<Aabb>;

    fn set_visible(&mut self, id: NodeId, visible: bool);

    fn set_material(&mut self, id: NodeId, material: Material);

    fn attach(&mut self, attachment: Attachment) -> AttachmentId;

    fn detach(&mut self, id: AttachmentId) -> Option<Attachment>;

    fn attachments(&self) -> Vec<(AttachmentId, &Attachment)>;

    fn parent_associated_name(&self, id: NodeId) -> Option<&str> {
        let parent = self.node(id)?.parent?;
        self.node(parent).map(SceneNode::associated_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aabb_center_and_union() {
        let a = Aabb::from_arrays([0.0, 0.0, 0.0], [2.0, 2.0, 2.0]);
        let b = Aabb::from_arrays([-2.0, 1.0, 0.0], [0.0, 6.0, 1.0]);

        let merged = a.union(&b);

        assert_eq!(merged, Aabb::from_arrays([-2.0, 0.0, 0.0], [2.0, 6.0, 2.0]));
        assert_eq!(merged.center(), Point3::new(0.0, 3.0, 1.0));
        assert!(merged.is_valid());
        assert!(!Aabb::from_arrays([1.0, 0.0, 0.0], [0.0, 1.0, 1.0]).is_valid());
    }
}
