use crate::scene::{
    Aabb, Attachment, AttachmentId, Material, NodeId, SceneError, SceneGraph, SceneId, SceneNode,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SCENE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Deserialize)]
pub struct SceneAsset {
    pub nodes: Vec<NodeAsset>,
}

#[derive(Debug, Deserialize)]
pub struct NodeAsset {
    pub name: String,
    #[serde(default, alias = "user_data_name")]
    pub associated_name: Option<String>,
    #[serde(default)]
    pub mesh: bool,
    #[serde(default)]
    pub bounds: Option<BoundsAsset>,
    #[serde(default)]
    pub children: Vec<NodeAsset>,
}

#[derive(Debug, Deserialize)]
pub struct BoundsAsset {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

/// In-memory scene graph built from a JSON description of the building model.
#[derive(Debug, Clone)]
pub struct Scene {
    id: SceneId,
    nodes: Vec<SceneNode>,
    roots: Vec<NodeId>,
    by_name: HashMap<String, NodeId>,
    attachments: BTreeMap<AttachmentId, Attachment>,
    next_attachment: AttachmentId,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            id: SceneId(NEXT_SCENE_ID.fetch_add(1, Ordering::Relaxed)),
            nodes: Vec::new(),
            roots: Vec::new(),
            by_name: HashMap::new(),
            attachments: BTreeMap::new(),
            next_attachment: 1,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let contents = std::fs::read_to_string(path)?;
        let asset: SceneAsset = serde_json::from_str(&contents)?;
        Self::from_asset(asset)
    }

    pub fn from_asset(asset: SceneAsset) -> Result<Self, SceneError> {
        if asset.nodes.is_empty() {
            return Err(SceneError::Empty);
        }
        let mut scene = Scene::new();
        for node in asset.nodes {
            scene.insert_asset(None, node)?;
        }
        Ok(scene)
    }

    fn insert_asset(&mut self, parent: Option<NodeId>, asset: NodeAsset) -> Result<(), SceneError> {
        let bounds = match asset.bounds {
            Some(bounds) => {
                let aabb = Aabb::from_arrays(bounds.min, bounds.max);
                if !aabb.is_valid() {
                    return Err(SceneError::InvalidBounds(asset.name));
                }
                Some(aabb)
            }
            None => None,
        };
        let id = self.add_node(parent, &asset.name, asset.mesh, bounds);
        self.nodes[id].associated_name = asset.associated_name;
        for child in asset.children {
            self.insert_asset(Some(id), child)?;
        }
        Ok(())
    }

    /// Append a node. The first node registered under a name wins lookups.
    pub fn add_node(
        &mut self,
        parent: Option<NodeId>,
        name: &str,
        is_mesh: bool,
        bounds: Option<Aabb>,
    ) -> NodeId {
        let id = self.nodes.len();
        let parent = parent.filter(|parent| *parent < id);
        self.nodes.push(SceneNode {
            name: name.to_string(),
            associated_name: None,
            is_mesh,
            parent,
            children: Vec::new(),
            bounds,
            visible: true,
            material: None,
        });
        match parent {
            Some(parent) => self.nodes[parent].children.push(id),
            None => self.roots.push(id),
        }
        self.by_name.entry(name.to_string()).or_insert(id);
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph for Scene {
    fn scene_id(&self) -> SceneId {
        self.id
    }

    fn node_ids(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev().copied());
        }
        order
    }

    fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    fn bounding_box(&self, id: NodeId) -> Option<Aabb> {
        self.nodes.get(id)?;
        let mut merged: Option<Aabb> = None;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            if let Some(bounds) = node.bounds {
                merged = Some(match merged {
                    Some(existing) => existing.union(&bounds),
                    None => bounds,
                });
            }
            stack.extend(node.children.iter().copied());
        }
        merged
    }

    fn set_visible(&mut self, id: NodeId, visible: bool) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.visible = visible;
        }
    }

    fn set_material(&mut self, id: NodeId, material: Material) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.material = Some(material);
        }
    }

    fn attach(&mut self, attachment: Attachment) -> AttachmentId {
        let id = self.next_attachment;
        self.next_attachment += 1;
        self.attachments.insert(id, attachment);
        id
    }

    fn detach(&mut self, id: AttachmentId) -> Option<Attachment> {
        self.attachments.remove(&id)
    }

    fn attachments(&self) -> Vec<(AttachmentId, &Attachment)> {
        self.attachments.iter().map(|(id, attachment)| (*id, attachment)).collect()
    }
}
