use std::hint::black_box;
use std::time::Instant;

use glam::Vec3;
use trellis_common::{IdGenerator, NodeId};
use trellis_spatial::{Camera, TransformTree};

/// Build a tree `depth` levels deep where every node has `fanout` children.
fn make_tree(depth: usize, fanout: usize) -> (TransformTree, NodeId, usize) {
    let mut tree = TransformTree::new(IdGenerator::new());
    let root = tree.create("root");
    let mut frontier = vec![root];
    for level in 0..depth {
        let mut next = Vec::with_capacity(frontier.len() * fanout);
        for parent in &frontier {
            for i in 0..fanout {
                let child = tree.create(format!("n{level}_{i}"));
                tree.add(*parent, child).expect("fresh nodes never cycle");
                tree.set_position(child, Vec3::new(i as f32, 1.0, 0.0))
                    .expect("node exists");
                next.push(child);
            }
        }
        frontier = next;
    }
    let count = tree.len();
    (tree, root, count)
}

fn bench_update(depth: usize, fanout: usize, iterations: usize) {
    let (mut tree, root, count) = make_tree(depth, fanout);

    let start = Instant::now();
    for _ in 0..iterations {
        tree.update(black_box(root)).expect("root exists");
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!("  update ({count} nodes, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}");
}

fn bench_camera(depth: usize, fanout: usize, iterations: usize) {
    let (mut tree, root, count) = make_tree(depth, fanout);
    let cam = tree.create("camera");
    tree.add(root, cam).expect("fresh node");
    tree.update(root).expect("root exists");
    let mut camera = Camera::perspective(cam);

    let start = Instant::now();
    for _ in 0..iterations {
        black_box(camera.run(&mut tree).expect("camera node exists"));
        camera.flush();
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  camera run ({count} nodes, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn main() {
    println!("transform update");
    bench_update(4, 4, 200);
    bench_update(6, 4, 20);
    println!("projection distribution");
    bench_camera(4, 4, 200);
    bench_camera(6, 4, 20);
}
