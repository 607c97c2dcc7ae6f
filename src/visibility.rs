//! Floor visibility and material assignment for every mesh in the scene.
//!
//! Floor membership is decided by case-insensitive keyword match on the
//! node's own name or its parent's associated name. Only one ancestor level
//! is consulted: a mesh nested two levels under a floor container is not
//! matched.

use crate::colormap::Color;
use crate::scene::{Material, NodeId, SceneGraph, TextureRef};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FloorSelector {
    #[default]
    #[serde(rename = "all")]
    All,
    #[serde(rename = "1st")]
    First,
    #[serde(rename = "2nd")]
    Second,
}

impl FromStr for FloorSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(FloorSelector::All),
            "1st" => Ok(FloorSelector::First),
            "2nd" => Ok(FloorSelector::Second),
            _ => Err(format!("unknown floor: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FloorKeywords {
    #[serde(default = "default_first")]
    pub first: String,
    #[serde(default = "default_second")]
    pub second: String,
}

fn default_first() -> String {
    "first".to_string()
}

fn default_second() -> String {
    "second".to_string()
}

impl Default for FloorKeywords {
    fn default() -> Self {
        Self {
            first: default_first(),
            second: default_second(),
        }
    }
}

impl FloorKeywords {
    fn keyword(&self, floor: FloorSelector) -> Option<String> {
        match floor {
            FloorSelector::All => None,
            FloorSelector::First => Some(self.first.to_lowercase()),
            FloorSelector::Second => Some(self.second.to_lowercase()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialStyle {
    pub base_color: Color,
    pub neutral_color: Color,
    pub opacity: f32,
    pub metalness: f32,
    pub roughness: f32,
    /// Meshes whose name contains this get the KPI color.
    pub highlight_keyword: String,
    /// Meshes whose name contains any of these skip the decorative texture.
    pub plain_keywords: Vec<String>,
    pub decorative_texture: Option<TextureRef>,
}

impl Default for MaterialStyle {
    fn default() -> Self {
        Self {
            base_color: Color::LIGHT_GRAY,
            neutral_color: Color::WHITE,
            opacity: 0.7,
            metalness: 0.6,
            roughness: 0.5,
            highlight_keyword: "ball".to_string(),
            plain_keywords: vec!["furniture".to_string(), "room".to_string()],
            decorative_texture: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub meshes: usize,
    pub visible: usize,
    /// Meshes whose visibility or material actually changed.
    pub changed: usize,
}

pub fn is_node_visible<S: SceneGraph + ?Sized>(
    scene: &S,
    id: NodeId,
    floor: FloorSelector,
    keywords: &FloorKeywords,
) -> bool {
    let Some(keyword) = keywords.keyword(floor) else {
        return true;
    };
    let Some(node) = scene.node(id) else {
        return false;
    };
    node.name.to_lowercase().contains(&keyword)
        || scene
            .parent_associated_name(id)
            .is_some_and(|parent| parent.to_lowercase().contains(&keyword))
}

pub fn material_for(name: &str, kpi_color: Color, style: &MaterialStyle) -> Material {
    let lowered = name.to_lowercase();
    let plain = style
        .plain_keywords
        .iter()
        .any(|keyword| lowered.contains(&keyword.to_lowercase()));
    let color = if plain {
        style.neutral_color
    } else if lowered.contains(&style.highlight_keyword.to_lowercase()) {
        kpi_color
    } else {
        style.base_color
    };

    Material {
        color,
        opacity: style.opacity,
        transparent: true,
        metalness: style.metalness,
        roughness: style.roughness,
        wireframe: false,
        texture: if plain {
            None
        } else {
            style.decorative_texture.clone()
        },
    }
}

/// Set visibility and a freshly derived material on every mesh. Nodes that
/// already match are left untouched, so repeated calls settle immediately.
pub fn apply_floor_filter<S: SceneGraph + ?Sized>(
    scene: &mut S,
    floor: FloorSelector,
    keywords: &FloorKeywords,
    kpi_color: Color,
    style: &MaterialStyle,
) -> FilterReport {
    let mut report = FilterReport::default();
    for id in scene.node_ids() {
        let Some(node) = scene.node(id) else {
            continue;
        };
        if !node.is_mesh {
            continue;
        }
        let visible = is_node_visible(&*scene, id, floor, keywords);
        let material = material_for(&node.name, kpi_color, style);
        let visibility_changed = node.visible != visible;
        let material_changed = node.material.as_ref() != Some(&material);

        report.meshes += 1;
        if visible {
            report.visible += 1;
        }
        if visibility_changed {
            scene.set_visible(id, visible);
        }
        if material_changed {
            scene.set_material(id, material);
        }
        if visibility_changed || material_changed {
            report.changed += 1;
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Scene, SceneNode};
    use std::sync::Arc;

    fn scene() -> Scene {
        let mut scene = Scene::new();
        let building = scene.add_node(None, "Building", false, None);
        let first = scene.add_node(Some(building), "FirstFloor", false, None);
        scene.add_node(Some(first), "Wall_A", true, None);
        let nested = scene.add_node(Some(first), "Group", false, None);
        scene.add_node(Some(nested), "Desk", true, None);
        scene.add_node(Some(building), "SecondFloorRoom1", true, None);
        scene.add_node(Some(building), "SensorBall", true, None);
        scene.add_node(Some(building), "Furniture_Chair", true, None);
        scene
    }

    fn node<'a>(scene: &'a Scene, name: &str) -> &'a SceneNode {
        scene
            .find_by_name(name)
            .and_then(|id| scene.node(id))
            .expect("node exists")
    }

    fn style() -> MaterialStyle {
        MaterialStyle {
            decorative_texture: Some(TextureRef(Arc::from("Texture7.jpg"))),
            ..MaterialStyle::default()
        }
    }

    #[test]
    fn all_floors_shows_every_mesh() {
        let mut scene = scene();

        let report = apply_floor_filter(
            &mut scene,
            FloorSelector::All,
            &FloorKeywords::default(),
            Color::RED,
            &style(),
        );

        assert_eq!(report.meshes, 5);
        assert_eq!(report.visible, 5);
    }

    #[test]
    fn floor_match_uses_own_name_or_parent_only() {
        let mut scene = scene();

        apply_floor_filter(
            &mut scene,
            FloorSelector::First,
            &FloorKeywords::default(),
            Color::RED,
            &style(),
        );

        assert!(node(&scene, "Wall_A").visible);
        // Two levels below FirstFloor: not matched.
        assert!(!node(&scene, "Desk").visible);
        assert!(!node(&scene, "SecondFloorRoom1").visible);

        apply_floor_filter(
            &mut scene,
            FloorSelector::Second,
            &FloorKeywords::default(),
            Color::RED,
            &style(),
        );

        assert!(node(&scene, "SecondFloorRoom1").visible);
        assert!(!node(&scene, "Wall_A").visible);
    }

    #[test]
    fn keyword_match_is_case_insensitive_and_configurable() {
        let mut scene = Scene::new();
        let level = scene.add_node(None, "LEVEL_UPPER", false, None);
        scene.add_node(Some(level), "Slab", true, None);
        let keywords = FloorKeywords {
            first: "lower".to_string(),
            second: "upper".to_string(),
        };

        apply_floor_filter(&mut scene, FloorSelector::Second, &keywords, Color::RED, &style());

        assert!(node(&scene, "Slab").visible);
    }

    #[test]
    fn materials_follow_name_rules() {
        let style = style();

        let ball = material_for("SensorBall", Color::RED, &style);
        let wall = material_for("Wall_A", Color::RED, &style);
        let room = material_for("SecondFloorRoom1", Color::RED, &style);
        let chair = material_for("FURNITURE_chair", Color::RED, &style);

        assert_eq!(ball.color, Color::RED);
        assert!(ball.texture.is_some());
        assert_eq!(wall.color, Color::LIGHT_GRAY);
        assert!(wall.texture.is_some());
        assert_eq!(room.color, Color::WHITE);
        assert!(room.texture.is_none());
        assert_eq!(chair.color, Color::WHITE);
        assert!(chair.texture.is_none());
        assert_eq!(wall.opacity, 0.7);
        assert_eq!(wall.metalness, 0.6);
        assert_eq!(wall.roughness, 0.5);
        assert!(!wall.wireframe);
    }

    #[test]
    fn repeated_application_is_idempotent() {
        let mut scene = scene();
        let keywords = FloorKeywords::default();

        let first = apply_floor_filter(&mut scene, FloorSelector::First, &keywords, Color::GREEN, &style());
        let snapshot: Vec<SceneNode> = scene
            .node_ids()
            .into_iter()
            .filter_map(|id| scene.node(id).cloned())
            .collect();
        let second = apply_floor_filter(&mut scene, FloorSelector::First, &keywords, Color::GREEN, &style());
        let after: Vec<SceneNode> = scene
            .node_ids()
            .into_iter()
            .filter_map(|id| scene.node(id).cloned())
            .collect();

        assert_eq!(first.changed, 5);
        assert_eq!(second.changed, 0);
        assert_eq!(snapshot, after);
    }

    #[test]
    fn kpi_color_change_touches_only_highlighted_meshes() {
        let mut scene = scene();
        let keywords = FloorKeywords::default();

        apply_floor_filter(&mut scene, FloorSelector::All, &keywords, Color::GREEN, &style());
        let report = apply_floor_filter(&mut scene, FloorSelector::All, &keywords, Color::RED, &style());

        assert_eq!(report.changed, 1);
        assert_eq!(
            node(&scene, "SensorBall").material.as_ref().map(|material| material.color),
            Some(Color::RED)
        );
    }

    #[test]
    fn floor_selector_uses_dashboard_wire_names() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::from_str::<FloorSelector>("\"1st\"")?, FloorSelector::First);
        assert_eq!(serde_json::to_string(&FloorSelector::All)?, "\"all\"");
        Ok(())
    }
}
