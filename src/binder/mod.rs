//! Spatial binding of per-room values onto the building scene.
//!
//! Rooms are bound through an explicit table (room id -> label node, floor
//! node). Anchors come from bounding-box centers and are cached per
//! (scene, room set); labels and heatmap overlays are regenerated only when
//! the anchors, the KPI, or the per-room values change.

use crate::colormap::{DomainTable, HeatmapPolicy, heatmap_texture};
use crate::feed::{Kpi, RoomId};
use crate::scene::{
    Attachment, AttachmentId, Footprint, HeatmapOverlay, Label, LabelStyle, SceneGraph, SceneId,
};
use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_LABEL_OFFSET: f64 = 1.0;
pub const DEFAULT_OVERLAY_OFFSET: f64 = -2.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub struct RoomBinding {
    pub room_id: RoomId,
    /// Node whose bounds place the label and the overlay.
    pub label_node: String,
    /// Floor-area node; the overlay is only drawn when it exists.
    pub floor_node: String,
}

/// Reference bindings for the sample building's second floor.
pub fn default_bindings() -> Vec<RoomBinding> {
    (1..=5)
        .map(|index| RoomBinding {
            room_id: format!("Room {index}"),
            label_node: format!("SecondFloorRoom{index}"),
            floor_node: format!("SecondFloorR{index}Floor"),
        })
        .collect()
}

/// Room 4 is the narrow corner room of the sample building.
pub fn default_footprint_overrides() -> HashMap<RoomId, Footprint> {
    HashMap::from([(
        "Room 4".to_string(),
        Footprint {
            depth: 1.4,
            ..Footprint::default()
        },
    )])
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AnchorOffsets {
    #[serde(default = "default_label_offset")]
    pub label: f64,
    #[serde(default = "default_overlay_offset")]
    pub overlay: f64,
}

fn default_label_offset() -> f64 {
    DEFAULT_LABEL_OFFSET
}

fn default_overlay_offset() -> f64 {
    DEFAULT_OVERLAY_OFFSET
}

impl Default for AnchorOffsets {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL_OFFSET,
            overlay: DEFAULT_OVERLAY_OFFSET,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub opacity: f32,
    pub texture_width: u32,
    pub texture_height: u32,
    pub policy: HeatmapPolicy,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            opacity: 0.3,
            texture_width: 512,
            texture_height: 512,
            policy: HeatmapPolicy::default(),
        }
    }
}

/// Bounding-box center of a named node shifted vertically by `offset`.
pub fn resolve_anchor<S: SceneGraph + ?Sized>(
    scene: &S,
    node_name: &str,
    offset: f64,
) -> Option<Point3<f64>> {
    let id = scene.find_by_name(node_name)?;
    let bounds = scene.bounding_box(id)?;
    Some(bounds.center() + Vector3::y() * offset)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomAnchor {
    pub label: Point3<f64>,
    pub overlay: Point3<f64>,
    pub has_floor: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AnchorKey {
    scene: SceneId,
    rooms: BTreeSet<RoomBinding>,
}

/// Anchor positions, recomputed only when the scene or the room set changes.
#[derive(Debug, Default)]
pub struct AnchorCache {
    key: Option<AnchorKey>,
    anchors: BTreeMap<RoomId, RoomAnchor>,
    generation: u64,
}

impl AnchorCache {
    pub fn anchors<S: SceneGraph + ?Sized>(
        &mut self,
        scene: &S,
        bindings: &[RoomBinding],
        offsets: AnchorOffsets,
    ) -> &BTreeMap<RoomId, RoomAnchor> {
        let key = AnchorKey {
            scene: scene.scene_id(),
            rooms: bindings.iter().cloned().collect(),
        };
        if self.key.as_ref() != Some(&key) {
            self.anchors = compute_anchors(scene, bindings, offsets);
            self.generation += 1;
            debug!(
                rooms = self.anchors.len(),
                generation = self.generation,
                "Room anchors recomputed"
            );
            self.key = Some(key);
        }
        &self.anchors
    }

    /// Bumped every time the anchors are recomputed.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

fn compute_anchors<S: SceneGraph + ?Sized>(
    scene: &S,
    bindings: &[RoomBinding],
    offsets: AnchorOffsets,
) -> BTreeMap<RoomId, RoomAnchor> {
    let mut anchors = BTreeMap::new();
    for binding in bindings {
        let Some(center) = resolve_anchor(scene, &binding.label_node, 0.0) else {
            debug!(
                room_id = %binding.room_id,
                node = %binding.label_node,
                "Room node not found in scene, skipping"
            );
            continue;
        };
        anchors.insert(
            binding.room_id.clone(),
            RoomAnchor {
                label: center + Vector3::y() * offsets.label,
                overlay: center + Vector3::y() * offsets.overlay,
                has_floor: scene.find_by_name(&binding.floor_node).is_some(),
            },
        );
    }
    anchors
}

/// Engine-owned attachments of one kind. A new generation replaces the old
/// one in a single call: fresh items are attached before stale ones go.
#[derive(Debug, Default)]
pub struct AttachmentSet {
    ids: Vec<AttachmentId>,
}

impl AttachmentSet {
    pub fn replace<S: SceneGraph + ?Sized>(&mut self, scene: &mut S, fresh: Vec<Attachment>) {
        let fresh_ids: Vec<AttachmentId> = fresh.into_iter().map(|item| scene.attach(item)).collect();
        for stale in std::mem::replace(&mut self.ids, fresh_ids) {
            scene.detach(stale);
        }
    }

    /// Drop the ids without touching a scene; used when the scene itself was replaced.
    pub fn forget(&mut self) {
        self.ids.clear();
    }

    pub fn ids(&self) -> &[AttachmentId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RenderKey {
    scene: SceneId,
    anchor_generation: u64,
    kpi: Kpi,
    values: BTreeMap<RoomId, f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindReport {
    pub labels: usize,
    pub overlays: usize,
    pub regenerated: bool,
}

#[derive(Debug)]
pub struct Binder {
    bindings: Vec<RoomBinding>,
    offsets: AnchorOffsets,
    label_style: LabelStyle,
    overlay_style: OverlayStyle,
    default_footprint: Footprint,
    footprint_overrides: HashMap<RoomId, Footprint>,
    anchors: AnchorCache,
    labels: AttachmentSet,
    overlays: AttachmentSet,
    bound_scene: Option<SceneId>,
    rendered: Option<RenderKey>,
}

impl Binder {
    pub fn new(bindings: Vec<RoomBinding>, offsets: AnchorOffsets, overlay_style: OverlayStyle) -> Self {
        Self {
            bindings,
            offsets,
            label_style: LabelStyle::default(),
            overlay_style,
            default_footprint: Footprint::default(),
            footprint_overrides: HashMap::new(),
            anchors: AnchorCache::default(),
            labels: AttachmentSet::default(),
            overlays: AttachmentSet::default(),
            bound_scene: None,
            rendered: None,
        }
    }

    pub fn with_footprints(
        mut self,
        default_footprint: Footprint,
        overrides: HashMap<RoomId, Footprint>,
    ) -> Self {
        self.default_footprint = default_footprint;
        self.footprint_overrides = overrides;
        self
    }

    pub fn set_footprint_override(&mut self, room_id: impl Into<RoomId>, footprint: Footprint) {
        self.footprint_overrides.insert(room_id.into(), footprint);
        self.rendered = None;
    }

    pub fn footprint_for(&self, room_id: &str) -> Footprint {
        self.footprint_overrides
            .get(room_id)
            .copied()
            .unwrap_or(self.default_footprint)
    }

    pub fn anchor_generation(&self) -> u64 {
        self.anchors.generation()
    }

    /// Bring labels and overlays on `scene` in line with `values`.
    pub fn refresh<S: SceneGraph + ?Sized>(
        &mut self,
        scene: &mut S,
        kpi: Kpi,
        values: &BTreeMap<RoomId, f64>,
        heatmap_domains: &DomainTable,
    ) -> BindReport {
        let scene_id = scene.scene_id();
        if self.bound_scene != Some(scene_id) {
            self.labels.forget();
            self.overlays.forget();
            self.rendered = None;
            self.bound_scene = Some(scene_id);
        }

        let anchors = self
            .anchors
            .anchors(&*scene, &self.bindings, self.offsets)
            .clone();
        let key = RenderKey {
            scene: scene_id,
            anchor_generation: self.anchors.generation(),
            kpi,
            values: values.clone(),
        };
        if self.rendered.as_ref() == Some(&key) {
            return BindReport {
                labels: self.labels.len(),
                overlays: self.overlays.len(),
                regenerated: false,
            };
        }

        let domain = heatmap_domains.get(kpi);
        let mut labels = Vec::new();
        let mut overlays = Vec::new();
        for binding in &self.bindings {
            let (Some(anchor), Some(value)) = (anchors.get(&binding.room_id), values.get(&binding.room_id))
            else {
                continue;
            };
            labels.push(Attachment::Label(Label {
                room_id: binding.room_id.clone(),
                node_name: binding.label_node.clone(),
                text: format!("{value:.2}"),
                position: anchor.label,
                style: self.label_style.clone(),
            }));
            if !anchor.has_floor {
                debug!(
                    room_id = %binding.room_id,
                    node = %binding.floor_node,
                    "Floor node not found in scene, skipping overlay"
                );
                continue;
            }
            let texture = heatmap_texture(
                *value,
                domain,
                self.overlay_style.texture_width,
                self.overlay_style.texture_height,
                self.overlay_style.policy,
            );
            overlays.push(Attachment::Overlay(HeatmapOverlay {
                room_id: binding.room_id.clone(),
                node_name: binding.floor_node.clone(),
                value: *value,
                position: anchor.overlay,
                rotation_x: -FRAC_PI_2,
                size: self.footprint_for(&binding.room_id),
                opacity: self.overlay_style.opacity,
                double_sided: true,
                texture: Arc::new(texture),
            }));
        }

        let report = BindReport {
            labels: labels.len(),
            overlays: overlays.len(),
            regenerated: true,
        };
        self.labels.replace(scene, labels);
        self.overlays.replace(scene, overlays);
        self.rendered = Some(key);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Aabb, Scene};

    fn building() -> Scene {
        let mut scene = Scene::new();
        let floor = scene.add_node(None, "SecondFloor", false, None);
        for index in 1..=4 {
            let x = f64::from(index) * 10.0;
            scene.add_node(
                Some(floor),
                &format!("SecondFloorRoom{index}"),
                true,
                Some(Aabb::from_arrays([x, 4.0, 0.0], [x + 2.0, 6.0, 2.0])),
            );
            if index != 3 {
                scene.add_node(
                    Some(floor),
                    &format!("SecondFloorR{index}Floor"),
                    true,
                    Some(Aabb::from_arrays([x - 2.0, 3.0, -2.0], [x + 4.0, 3.1, 4.0])),
                );
            }
        }
        scene
    }

    fn values(pairs: &[(&str, f64)]) -> BTreeMap<RoomId, f64> {
        pairs.iter().map(|(room, value)| (room.to_string(), *value)).collect()
    }

    fn binder() -> Binder {
        Binder::new(default_bindings(), AnchorOffsets::default(), OverlayStyle {
            texture_width: 4,
            texture_height: 4,
            ..OverlayStyle::default()
        })
        .with_footprints(Footprint::default(), default_footprint_overrides())
    }

    #[test]
    fn anchors_use_independent_offsets() {
        let scene = building();

        let label = resolve_anchor(&scene, "SecondFloorRoom1", DEFAULT_LABEL_OFFSET);
        let overlay = resolve_anchor(&scene, "SecondFloorRoom1", DEFAULT_OVERLAY_OFFSET);

        assert_eq!(label, Some(Point3::new(11.0, 6.0, 1.0)));
        assert_eq!(overlay, Some(Point3::new(11.0, 3.0, 1.0)));
    }

    #[test]
    fn missing_node_has_no_anchor() {
        assert_eq!(resolve_anchor(&building(), "SecondFloorRoom5", 1.0), None);
    }

    #[test]
    fn refresh_skips_rooms_without_bindings_in_scene() {
        let mut scene = building();
        let mut binder = binder();
        let table = values(&[
            ("Room 1", 900.0),
            ("Room 2", 400.0),
            ("Room 3", 650.0),
            ("Room 4", 1000.0),
            ("Room 5", 500.0),
        ]);

        let report = binder.refresh(&mut scene, Kpi::Co2, &table, &DomainTable::heatmap_defaults());

        // Room 5 has no node at all; Room 3 has no floor node.
        assert_eq!(report.labels, 4);
        assert_eq!(report.overlays, 3);
        assert_eq!(scene.attachments().len(), 7);
    }

    #[test]
    fn labels_carry_two_decimal_text_and_overlay_uses_room_footprint() {
        let mut scene = building();
        let mut binder = binder();

        binder.refresh(
            &mut scene,
            Kpi::Co2,
            &values(&[("Room 4", 812.5), ("Room 1", 400.0)]),
            &DomainTable::heatmap_defaults(),
        );

        let attachments = scene.attachments();
        let label = attachments.iter().find_map(|(_, item)| match item {
            Attachment::Label(label) if label.room_id == "Room 4" => Some(label),
            _ => None,
        });
        let overlay = attachments.iter().find_map(|(_, item)| match item {
            Attachment::Overlay(overlay) if overlay.room_id == "Room 4" => Some(overlay),
            _ => None,
        });
        assert_eq!(label.map(|label| label.text.as_str()), Some("812.50"));
        let overlay = overlay.expect("room 4 overlay");
        assert_eq!(overlay.size.depth, 1.4);
        assert_eq!(overlay.position, Point3::new(41.0, 3.0, 1.0));
        assert_eq!(binder.footprint_for("Room 1").depth, 2.0);
    }

    #[test]
    fn value_updates_reuse_anchors_and_replace_overlays() {
        let mut scene = building();
        let mut binder = binder();
        let domains = DomainTable::heatmap_defaults();

        binder.refresh(&mut scene, Kpi::Co2, &values(&[("Room 1", 500.0)]), &domains);
        let generation = binder.anchor_generation();
        let first_ids: Vec<AttachmentId> = scene.attachments().iter().map(|(id, _)| *id).collect();

        let report = binder.refresh(&mut scene, Kpi::Co2, &values(&[("Room 1", 950.0)]), &domains);

        assert!(report.regenerated);
        assert_eq!(binder.anchor_generation(), generation);
        let ids: Vec<AttachmentId> = scene.attachments().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.iter().all(|id| !first_ids.contains(id)));
    }

    #[test]
    fn unchanged_inputs_do_not_regenerate() {
        let mut scene = building();
        let mut binder = binder();
        let domains = DomainTable::heatmap_defaults();
        let table = values(&[("Room 2", 700.0)]);

        binder.refresh(&mut scene, Kpi::Co2, &table, &domains);
        let before: Vec<AttachmentId> = scene.attachments().iter().map(|(id, _)| *id).collect();
        let report = binder.refresh(&mut scene, Kpi::Co2, &table, &domains);

        assert!(!report.regenerated);
        let after: Vec<AttachmentId> = scene.attachments().iter().map(|(id, _)| *id).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn footprint_override_regenerates_overlay_with_new_size() {
        let mut scene = building();
        let mut binder = binder();
        let domains = DomainTable::heatmap_defaults();
        let table = values(&[("Room 2", 700.0)]);
        binder.refresh(&mut scene, Kpi::Co2, &table, &domains);
        let generation = binder.anchor_generation();

        let wide = Footprint {
            width: 7.5,
            depth: 3.0,
            height: 2.0,
        };
        binder.set_footprint_override("Room 2", wide);
        let report = binder.refresh(&mut scene, Kpi::Co2, &table, &domains);

        assert!(report.regenerated);
        assert_eq!(report.overlays, 1);
        assert_eq!(binder.anchor_generation(), generation);
        let sizes: Vec<Footprint> = scene
            .attachments()
            .iter()
            .filter_map(|(_, item)| match item {
                Attachment::Overlay(overlay) => Some(overlay.size),
                Attachment::Label(_) => None,
            })
            .collect();
        assert_eq!(sizes, vec![wide]);
    }

    #[test]
    fn new_scene_recomputes_anchors() {
        let mut binder = binder();
        let domains = DomainTable::heatmap_defaults();
        let table = values(&[("Room 1", 700.0)]);

        binder.refresh(&mut building(), Kpi::Co2, &table, &domains);
        let generation = binder.anchor_generation();
        let mut replacement = building();
        binder.refresh(&mut replacement, Kpi::Co2, &table, &domains);

        assert_eq!(binder.anchor_generation(), generation + 1);
        assert_eq!(replacement.attachments().len(), 2);
    }

    #[test]
    fn attachment_set_replace_leaves_only_fresh_generation() {
        let mut scene = building();
        let mut set = AttachmentSet::default();
        let label = |text: &str| {
            Attachment::Label(Label {
                room_id: "Room 1".to_string(),
                node_name: "SecondFloorRoom1".to_string(),
                text: text.to_string(),
                position: Point3::origin(),
                style: LabelStyle::default(),
            })
        };

        set.replace(&mut scene, vec![label("1"), label("2")]);
        set.replace(&mut scene, vec![label("3")]);

        let remaining = scene.attachments();
        assert_eq!(remaining.len(), 1);
        assert!(matches!(remaining[0].1, Attachment::Label(label) if label.text == "3"));
        assert_eq!(set.ids(), &[remaining[0].0]);
    }
}
