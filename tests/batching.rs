mod common;

use common::{harness, settings};
use forward_renderer::renderer::{FrameBatches, Material, MAX_BATCH_SIZE};
use forward_renderer::scene::{RenderScene, StaticMesh};
use glam::{Vec3, Vec4};

fn assert_consistent(batches: &FrameBatches) {
    let sizes: u32 = batches.batches.iter().map(|batch| batch.size()).sum();
    assert_eq!(batches.instances.len() as u32, sizes);
    for instance in &batches.instances {
        assert!((instance.actor_index as usize) < batches.actors.len());
    }
    for batch in &batches.batches {
        assert!(batch.size() as usize <= MAX_BATCH_SIZE);
    }
}

#[test]
fn sixty_five_meshes_split_into_two_batches() {
    let h = harness(settings());
    let mut scene = RenderScene::new();
    for id in 1..=65 {
        scene.add_mesh(h.mesh(id, id as f32));
    }

    let frame = FrameBatches::build(&scene, &h.assets, h.renderer.registry());

    assert_eq!(frame.batches.len(), 2);
    assert_eq!(frame.batches[0].size(), 64);
    assert_eq!(frame.batches[1].size(), 1);
    assert_eq!(frame.batches[1].batched_so_far, 64);
    assert_eq!(frame.instance_count(), 65);
    assert_consistent(&frame);
}

#[test]
fn repeated_actor_ids_share_actor_data() {
    let mut h = harness(settings());
    let second = h
        .assets
        .materials
        .insert(Material::blinn_phong(Vec3::ONE, Vec3::ONE, 8.0));
    let mut scene = RenderScene::new();
    scene.add_mesh(h.mesh(7, 0.0));
    scene.add_mesh(StaticMesh::new(7, h.cube, second));
    scene.add_mesh(h.mesh(7, 1.0));
    scene.add_mesh(h.mesh(8, 2.0));

    let frame = FrameBatches::build(&scene, &h.assets, h.renderer.registry());

    assert_eq!(frame.actors.len(), 2);
    assert_eq!(frame.instances.len(), 4);
    let ids: Vec<u32> = frame.actors.iter().map(|actor| actor.actor_id).collect();
    assert_eq!(ids, vec![7, 8]);
    assert_consistent(&frame);
}

#[test]
fn renderer_stats_match_the_batches() {
    let mut h = harness(settings());
    let tinted = h
        .assets
        .materials
        .insert(Material::flat(Vec4::new(1.0, 0.0, 0.0, 1.0)));
    let mut scene = RenderScene::new();
    for id in 1..=70 {
        let material = if id % 2 == 0 { h.material } else { tinted };
        scene.add_mesh(StaticMesh::new(id, h.cube, material));
    }

    let stats = h.renderer.render(&mut h.ctx, &h.assets, &mut scene, &h.view);

    // Both materials are flat, so they share one key and split only on size.
    assert_eq!(stats.batch_count, 2);
    assert_eq!(stats.instance_count, 70);
    assert_eq!(stats.actor_count, 70);
    assert_eq!(stats.prepass_draw_calls, 2);
}

#[test]
fn empty_scene_builds_nothing() {
    let h = harness(settings());
    let frame = FrameBatches::build(&RenderScene::new(), &h.assets, h.renderer.registry());
    assert!(frame.is_empty());
    assert!(frame.material_data.is_empty());
    assert_consistent(&frame);
}
