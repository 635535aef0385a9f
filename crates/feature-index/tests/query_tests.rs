//! Index queries checked against a linear scan of the same bounds.

use feature_common::bbox::constrain_longitude_180;
use feature_common::FeatureBounds;
use feature_index::{QueryWindow, SpatialIndex};
use test_utils::bbox::{GLOBAL, NORTH_ATLANTIC};
use test_utils::time::{hours, t0};
use test_utils::variables::{PSAL, TEMP};
use test_utils::{create_bounds_grid, create_scattered_bounds};

/// Whether `bounds` lies in a window whose box does not cross the antimeridian.
fn brute_force_matches(bounds: &FeatureBounds, window: &QueryWindow) -> bool {
    let x = constrain_longitude_180(bounds.horizontal_position.x);
    let y = bounds.horizontal_position.y;
    let horizontal = window.bbox.map_or(true, |b| {
        x >= b.min_x && x <= b.max_x && y >= b.min_y && y <= b.max_y
    });
    let vertical = match (&window.vertical, &bounds.vertical_extent) {
        (Some(w), Some(v)) => w.intersects(v),
        _ => true,
    };
    let time = window
        .time
        .as_ref()
        .map_or(true, |w| w.intersects(&bounds.time_extent));
    let variables = window.variables.is_subset(&bounds.variable_ids);
    horizontal && vertical && time && variables
}

fn brute_force(all: &[FeatureBounds], window: &QueryWindow) -> Vec<String> {
    all.iter()
        .filter(|b| brute_force_matches(b, window))
        .map(|b| b.id.clone())
        .collect()
}

fn build(bounds: &[FeatureBounds], node_capacity: usize) -> SpatialIndex {
    let mut index = SpatialIndex::new(node_capacity);
    index.add_features(bounds.to_vec()).unwrap();
    index
}

#[test]
fn test_matches_linear_scan() {
    let bounds = create_scattered_bounds(2_000, 11);
    let index = build(&bounds, 8);
    index.check_integrity().unwrap();

    let (min_x, min_y, max_x, max_y) = NORTH_ATLANTIC;
    let (g_min_x, g_min_y, g_max_x, g_max_y) = GLOBAL;
    let windows = vec![
        QueryWindow::unbounded(),
        QueryWindow::unbounded()
            .with_bbox(g_min_x, g_min_y, g_max_x, g_max_y)
            .unwrap(),
        QueryWindow::unbounded().with_bbox(min_x, min_y, max_x, max_y).unwrap(),
        QueryWindow::unbounded()
            .with_bbox(-10.0, -10.0, 10.0, 10.0)
            .unwrap()
            .with_vertical(100.0, 400.0)
            .unwrap(),
        QueryWindow::unbounded()
            .with_time(hours(-48), hours(48))
            .unwrap()
            .with_variables([PSAL]),
        QueryWindow::unbounded()
            .with_bbox(0.0, -90.0, 180.0, 0.0)
            .unwrap()
            .with_vertical(0.0, 10.0)
            .unwrap()
            .with_time(hours(-100), hours(0))
            .unwrap()
            .with_variables([TEMP]),
    ];

    for window in &windows {
        let expected = brute_force(&bounds, window);
        let actual = index.query(window).unwrap();
        assert_eq!(actual, expected, "window {:?}", window);
    }
}

#[test]
fn test_node_capacity_does_not_change_results() {
    let bounds = create_scattered_bounds(500, 3);
    let window = QueryWindow::unbounded()
        .with_bbox(-90.0, -45.0, 90.0, 45.0)
        .unwrap()
        .with_time(hours(-72), hours(72))
        .unwrap();

    let expected = brute_force(&bounds, &window);
    for capacity in [2, 4, 16, 64] {
        let index = build(&bounds, capacity);
        assert_eq!(index.query(&window).unwrap(), expected, "capacity {}", capacity);
    }
}

#[test]
fn test_grid_box_is_inclusive() {
    let bounds = create_bounds_grid(10, 10, 1.0, t0());
    let index = build(&bounds, 4);

    let window = QueryWindow::unbounded().with_bbox(2.0, 2.0, 4.0, 3.0).unwrap();
    let result = index.query(&window).unwrap();
    // Columns 2..=4 of rows 2..=3
    assert_eq!(result.len(), 6);
    assert_eq!(result, brute_force(&bounds, &window));
}

#[test]
fn test_result_has_no_duplicates_across_split_box() {
    let bounds = create_scattered_bounds(1_000, 5);
    let index = build(&bounds, 8);

    // Whole-world box written past the antimeridian
    let window = QueryWindow::unbounded().with_bbox(0.0, -90.0, 360.0, 90.0).unwrap();
    let result = index.query(&window).unwrap();
    assert_eq!(result.len(), bounds.len());

    let window = QueryWindow::unbounded().with_bbox(170.0, -90.0, 190.0, 90.0).unwrap();
    let result = index.query(&window).unwrap();
    let mut deduped = result.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), result.len());

    let expected: Vec<String> = bounds
        .iter()
        .filter(|b| {
            let x = constrain_longitude_180(b.horizontal_position.x);
            x >= 170.0 || x <= -170.0
        })
        .map(|b| b.id.clone())
        .collect();
    assert_eq!(result, expected);
}

#[test]
fn test_index_survives_serialisation() {
    let bounds = create_scattered_bounds(300, 9);
    let index = build(&bounds, 6);

    let bytes = bincode::serialize(&index).unwrap();
    let restored: SpatialIndex = bincode::deserialize(&bytes).unwrap();
    restored.check_integrity().unwrap();

    let window = QueryWindow::unbounded().with_bbox(-45.0, -45.0, 45.0, 45.0).unwrap();
    assert_eq!(restored.query(&window).unwrap(), index.query(&window).unwrap());
    assert_eq!(restored.variable_ids(), index.variable_ids());
}
