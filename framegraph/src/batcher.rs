//! Per-frame draw lists.
//!
//! The [`Batcher`] turns a scene query and a camera into two sorted lists:
//! opaques front-to-back, for early depth rejection, and transparents
//! back-to-front, for correct blending. It owns no GPU resources.

use std::sync::Arc;

use glam::Mat4;
use redlilium_core::profile_scope;

use crate::scene::{Camera, Drawable, DrawableScene, Material, Primitive};

/// One entry of a draw list.
#[derive(Debug, Clone)]
pub struct DrawItem {
    /// World transform.
    pub transform: Mat4,
    /// Geometry to draw.
    pub primitive: Primitive,
    /// Material of the primitive.
    pub material: Arc<Material>,
    /// Distance from the camera to the primitive's world-space center.
    pub distance: f32,
}

/// Scratch state holding the sorted opaque and transparent draw lists.
#[derive(Debug, Default)]
pub struct Batcher {
    opaques: Vec<DrawItem>,
    transparents: Vec<DrawItem>,
}

impl Batcher {
    /// Create an empty batcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every drawable of `scene` and re-sort both lists.
    pub fn build_batches<S: DrawableScene + ?Sized>(&mut self, scene: &S, camera: &Camera) {
        profile_scope!("build_batches");

        scene.for_each_drawable(&mut |drawable: Drawable<'_>| {
            let center = drawable
                .transform
                .transform_point3(drawable.primitive.center);
            let item = DrawItem {
                transform: drawable.transform,
                primitive: *drawable.primitive,
                material: Arc::clone(drawable.material),
                distance: center.distance(camera.position),
            };

            if drawable.material.alpha_mode.is_transparent() {
                self.transparents.push(item);
            } else {
                self.opaques.push(item);
            }
        });

        self.opaques
            .sort_by(|a, b| a.distance.total_cmp(&b.distance));
        self.transparents
            .sort_by(|a, b| b.distance.total_cmp(&a.distance));

        log::trace!(
            "Batched {} opaque and {} transparent draws",
            self.opaques.len(),
            self.transparents.len()
        );
    }

    /// Opaque draws, nearest first.
    pub fn opaques(&self) -> &[DrawItem] {
        &self.opaques
    }

    /// Transparent draws, farthest first.
    pub fn transparents(&self) -> &[DrawItem] {
        &self.transparents
    }

    /// Total number of draws.
    pub fn len(&self) -> usize {
        self.opaques.len() + self.transparents.len()
    }

    /// Returns true if both lists are empty.
    pub fn is_empty(&self) -> bool {
        self.opaques.is_empty() && self.transparents.is_empty()
    }

    /// Clear both lists for the next frame.
    pub fn reset(&mut self) {
        self.opaques.clear();
        self.transparents.clear();
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::scene::{AlphaMode, FlatScene, MeshId};

    fn camera_at_origin() -> Camera {
        Camera::look_at(Vec3::ZERO, Vec3::NEG_Z, 1.0, 1.0, 0.1, 100.0)
    }

    fn scene_at_distances(distances: &[f32], alpha_mode: AlphaMode) -> FlatScene {
        let material = Arc::new(Material::new("pbr").with_alpha_mode(alpha_mode));
        let mut scene = FlatScene::new();
        for (i, distance) in distances.iter().enumerate() {
            scene.push(
                Mat4::from_translation(Vec3::new(0.0, 0.0, -distance)),
                Primitive::new(MeshId(i as u64)),
                material.clone(),
            );
        }
        scene
    }

    fn distances(items: &[DrawItem]) -> Vec<f32> {
        items.iter().map(|item| item.distance).collect()
    }

    #[test]
    fn test_opaques_sorted_front_to_back() {
        let mut batcher = Batcher::new();
        batcher.build_batches(&scene_at_distances(&[5.0, 1.0, 3.0], AlphaMode::Opaque), &camera_at_origin());
        assert_eq!(distances(batcher.opaques()), vec![1.0, 3.0, 5.0]);
        assert!(batcher.transparents().is_empty());
    }

    #[test]
    fn test_transparents_sorted_back_to_front() {
        let mut batcher = Batcher::new();
        batcher.build_batches(&scene_at_distances(&[5.0, 1.0, 3.0], AlphaMode::Blend), &camera_at_origin());
        assert_eq!(distances(batcher.transparents()), vec![5.0, 3.0, 1.0]);
        assert!(batcher.opaques().is_empty());
    }

    #[test]
    fn test_masked_geometry_is_opaque() {
        let mut batcher = Batcher::new();
        batcher.build_batches(&scene_at_distances(&[2.0], AlphaMode::Mask), &camera_at_origin());
        assert_eq!(batcher.opaques().len(), 1);
    }

    #[test]
    fn test_primitive_center_is_transformed() {
        let material = Arc::new(Material::new("pbr"));
        let mut scene = FlatScene::new();
        scene.push(
            Mat4::from_translation(Vec3::new(0.0, 0.0, -2.0)),
            Primitive::new(MeshId(0)).with_center(Vec3::new(0.0, 0.0, -2.0)),
            material,
        );
        let mut batcher = Batcher::new();
        batcher.build_batches(&scene, &camera_at_origin());
        assert!((batcher.opaques()[0].distance - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_reset_clears_both_lists() {
        let mut batcher = Batcher::new();
        let camera = camera_at_origin();
        batcher.build_batches(&scene_at_distances(&[1.0], AlphaMode::Opaque), &camera);
        batcher.build_batches(&scene_at_distances(&[2.0], AlphaMode::Blend), &camera);
        assert_eq!(batcher.len(), 2);

        batcher.reset();
        assert!(batcher.is_empty());
    }
}
