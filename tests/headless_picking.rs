use futures::executor::block_on;
use veduta::{CircleVertex, EntityId, FlatVertex, OwnerTag, PassConfig, SceneRenderer};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Acquires a headless renderer, or skips the test on machines without any
/// GPU or software rasterizer.
macro_rules! renderer_or_skip {
    () => {
        match block_on(SceneRenderer::try_new_headless()) {
            Some(renderer) => renderer,
            None => {
                eprintln!("no adapter available, skipping");
                return;
            }
        }
    };
}

const SIZE: u32 = 256;
const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

fn triangle(id: EntityId, points: [[f32; 2]; 3], color: [f32; 4]) -> Vec<FlatVertex> {
    points
        .iter()
        .map(|p| FlatVertex::new([p[0], p[1], 0.0], color, id))
        .collect()
}

/// Maps world coordinates to a pixel in a SIZE x SIZE viewport with the
/// default camera (world x and y both span [-1, 1]).
fn pixel_at(world_x: f32, world_y: f32) -> (u32, u32) {
    let px = (world_x + 1.0) * 0.5 * SIZE as f32;
    let py = (1.0 - world_y) * 0.5 * SIZE as f32;
    (px as u32, py as u32)
}

#[test]
fn picks_the_right_triangle_of_two_adjacent_ones() {
    init_logger();
    let mut renderer = renderer_or_skip!();
    renderer.create_scene(SIZE, SIZE, 1).unwrap();

    let left = renderer.create_entity(OwnerTag(1));
    let right = renderer.create_entity(OwnerTag(2));
    renderer
        .register_triangles(
            left,
            &triangle(left, [[-0.9, -0.9], [-0.1, -0.9], [-0.5, 0.9]], RED),
            &[0, 1, 2],
        )
        .unwrap();
    renderer
        .register_triangles(
            right,
            &triangle(right, [[0.1, -0.9], [0.9, -0.9], [0.5, 0.9]], BLUE),
            &[0, 1, 2],
        )
        .unwrap();
    renderer.render_frame().unwrap();

    let (x, y) = pixel_at(-0.5, -0.3);
    assert_eq!(renderer.query_entity_at(x, y).unwrap(), left);
    let (x, y) = pixel_at(0.5, -0.3);
    assert_eq!(renderer.query_entity_at(x, y).unwrap(), right);

    // The gap between them belongs to nobody.
    let (x, y) = pixel_at(0.0, 0.8);
    assert_eq!(renderer.query_entity_at(x, y).unwrap(), EntityId::INVALID);
}

#[test]
fn antialiased_shared_edge_resolves_to_exactly_one_entity() {
    init_logger();
    let mut renderer = renderer_or_skip!();
    renderer.create_scene(SIZE, SIZE, 4).unwrap();

    // Two triangles sharing the vertical edge from (0, -0.8) to (0, 0.8).
    let left = renderer.create_entity(OwnerTag(1));
    let right = renderer.create_entity(OwnerTag(2));
    renderer
        .register_triangles(
            left,
            &triangle(left, [[-0.8, -0.8], [0.0, -0.8], [0.0, 0.8]], RED),
            &[0, 1, 2],
        )
        .unwrap();
    renderer
        .register_triangles(
            right,
            &triangle(right, [[0.0, -0.8], [0.8, -0.8], [0.0, 0.8]], BLUE),
            &[0, 1, 2],
        )
        .unwrap();
    renderer.render_frame().unwrap();

    // Strictly inside each triangle the pick is unambiguous, even though the
    // displayed image blends colors across the multisampled edge.
    let (x, y) = pixel_at(-0.3, -0.2);
    assert_eq!(renderer.query_entity_at(x, y).unwrap(), left);
    let (x, y) = pixel_at(0.3, -0.5);
    assert_eq!(renderer.query_entity_at(x, y).unwrap(), right);

    // On the shared edge the pick still resolves to exactly one of the two
    // owners, never a blend and never nothing.
    let (x, y) = pixel_at(0.0, 0.0);
    let on_edge = renderer.query_entity_at(x, y).unwrap();
    assert!(
        on_edge == left || on_edge == right,
        "shared-edge pixel resolved to {on_edge}"
    );
}

#[test]
fn disabling_the_geometry_pass_clears_the_pick_image() {
    init_logger();
    let mut renderer = renderer_or_skip!();
    let scene_id = renderer.create_scene(SIZE, SIZE, 1).unwrap();

    let id = renderer.create_entity(OwnerTag(5));
    renderer
        .register_triangles(
            id,
            &triangle(id, [[-0.5, -0.5], [0.5, -0.5], [0.0, 0.5]], RED),
            &[0, 1, 2],
        )
        .unwrap();
    renderer.render_frame().unwrap();

    let (x, y) = pixel_at(0.0, -0.1);
    assert_eq!(renderer.query_entity_at(x, y).unwrap(), id);

    // Hiding the geometry must also hide it from picking.
    renderer
        .scene_mut(scene_id)
        .unwrap()
        .set_passes(PassConfig {
            geometry: false,
            ..PassConfig::default()
        });
    renderer.render_frame().unwrap();
    assert_eq!(renderer.query_entity_at(x, y).unwrap(), EntityId::INVALID);
}

#[test]
fn query_before_first_frame_is_invalid() {
    init_logger();
    let mut renderer = renderer_or_skip!();
    renderer.create_scene(SIZE, SIZE, 1).unwrap();

    let id = renderer.create_entity(OwnerTag(1));
    renderer
        .register_triangles(
            id,
            &triangle(id, [[-0.5, -0.5], [0.5, -0.5], [0.0, 0.5]], RED),
            &[0, 1, 2],
        )
        .unwrap();

    // Geometry is registered but nothing has been drawn yet.
    assert_eq!(
        renderer.query_entity_at(SIZE / 2, SIZE / 2).unwrap(),
        EntityId::INVALID
    );
}

#[test]
fn out_of_bounds_query_is_invalid() {
    init_logger();
    let mut renderer = renderer_or_skip!();
    renderer.create_scene(SIZE, SIZE, 1).unwrap();
    renderer.render_frame().unwrap();

    assert_eq!(
        renderer.query_entity_at(SIZE, SIZE / 2).unwrap(),
        EntityId::INVALID
    );
    assert_eq!(
        renderer.query_entity_at(0, 99_999).unwrap(),
        EntityId::INVALID
    );
}

#[test]
fn destroyed_entity_stops_picking_after_the_next_frame() {
    init_logger();
    let mut renderer = renderer_or_skip!();
    renderer.create_scene(SIZE, SIZE, 1).unwrap();

    let id = renderer.create_entity(OwnerTag(7));
    renderer
        .register_triangles(
            id,
            &triangle(id, [[-0.5, -0.5], [0.5, -0.5], [0.0, 0.5]], RED),
            &[0, 1, 2],
        )
        .unwrap();
    renderer.render_frame().unwrap();

    let (x, y) = pixel_at(0.0, -0.1);
    assert_eq!(renderer.query_entity_at(x, y).unwrap(), id);

    let owner = renderer.destroy_entity(id).unwrap();
    assert_eq!(owner, OwnerTag(7));

    // The stale frame still shows the entity; the next one must not.
    renderer.render_frame().unwrap();
    assert_eq!(renderer.query_entity_at(x, y).unwrap(), EntityId::INVALID);
}

#[test]
fn circle_picking_cuts_hard_at_the_rim() {
    init_logger();
    let mut renderer = renderer_or_skip!();
    renderer.create_scene(SIZE, SIZE, 1).unwrap();

    let id = renderer.create_entity(OwnerTag(3));
    let (vertices, indices) = CircleVertex::quad([0.0, 0.0, 0.0], 0.5, RED, -1.0, 0.01, id);
    renderer.register_circles(id, &vertices, &indices).unwrap();
    renderer.render_frame().unwrap();

    let (x, y) = pixel_at(0.0, 0.0);
    assert_eq!(renderer.query_entity_at(x, y).unwrap(), id);

    // Inside the quad but outside the disc.
    let (x, y) = pixel_at(0.45, 0.45);
    assert_eq!(renderer.query_entity_at(x, y).unwrap(), EntityId::INVALID);
}

#[test]
fn updated_geometry_moves_the_pick_footprint() {
    init_logger();
    let mut renderer = renderer_or_skip!();
    renderer.create_scene(SIZE, SIZE, 1).unwrap();

    let id = renderer.create_entity(OwnerTag(4));
    renderer
        .register_triangles(
            id,
            &triangle(id, [[-0.9, -0.4], [-0.1, -0.4], [-0.5, 0.4]], RED),
            &[0, 1, 2],
        )
        .unwrap();
    renderer.render_frame().unwrap();
    let (left_x, left_y) = pixel_at(-0.5, 0.0);
    assert_eq!(renderer.query_entity_at(left_x, left_y).unwrap(), id);

    // Drag the triangle to the right half.
    renderer
        .update_triangles(
            id,
            &triangle(id, [[0.1, -0.4], [0.9, -0.4], [0.5, 0.4]], RED),
        )
        .unwrap();
    renderer.render_frame().unwrap();

    assert_eq!(
        renderer.query_entity_at(left_x, left_y).unwrap(),
        EntityId::INVALID
    );
    let (right_x, right_y) = pixel_at(0.5, 0.0);
    assert_eq!(renderer.query_entity_at(right_x, right_y).unwrap(), id);
}

#[test]
fn rendered_frame_readback_has_expected_dimensions() {
    init_logger();
    let mut renderer = renderer_or_skip!();
    let samples = renderer.default_sample_count();
    renderer.create_scene(100, 64, samples).unwrap();
    renderer.render_frame().unwrap();

    let pixels = renderer.read_display_rgba().unwrap();
    assert_eq!(pixels.len(), 100 * 64 * 4);
    // The cleared background is opaque.
    assert_eq!(pixels[3], 255);
}
