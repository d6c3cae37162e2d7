//! Synthetic end-to-end run: projects a bright shell through a four-view rig,
//! fuses the views and writes every buffer to disk.
//!
//! Usage:
//! ```text
//! cargo run --example synthetic                 # writes to $TMPDIR/spimsphere-synthetic
//! cargo run --example synthetic -- out/dir      # custom output directory
//! RUST_LOG=spimsphere=debug cargo run --example synthetic
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use spimsphere::error::{IoError, QueueError};
use spimsphere::fusion::{rig_views, Fusion, FusionParams};
use spimsphere::io::{fused_file_name, projection_file_name, write_mesh, write_vertex_buffer};
use spimsphere::math::{Point3, Vector3};
use spimsphere::mesh::MakeSphere;
use spimsphere::projection::{
    consume_frames, frame_queue, BuildCorrespondenceTable, Frame, MaxProjector, ProjectionParams,
    VolumeGeometry,
};
use spimsphere::weight::{camera_views, view_angle, WeightParams};
use spimsphere::SpimsphereError;

const SIZE: usize = 128;
const DEPTH: usize = 64;
const RADIUS: f64 = 40.0;

/// One plane of a hollow shell whose brightness varies with longitude.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn shell_plane(z: usize, view: usize) -> Vec<u16> {
    let c = SIZE as f64 / 2.0;
    let pz = z as f64 * 2.0;
    let mut plane = vec![100u16; SIZE * SIZE];
    for y in 0..SIZE {
        for x in 0..SIZE {
            let d = Vector3::new(x as f64 - c, y as f64 - c, pz - c);
            if (d.norm() - RADIUS).abs() < 2.0 {
                let stripe = (d.y.atan2(d.x).to_degrees() + 180.0) / 360.0;
                plane[y * SIZE + x] = 1000 + (stripe * 2000.0) as u16 + 50 * view as u16;
            }
        }
    }
    plane
}

fn main() -> Result<(), SpimsphereError> {
    // Default: WARN for everything, INFO for spimsphere.
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into())
        .add_directive("synthetic=info".parse().unwrap_or_default())
        .add_directive("spimsphere=info".parse().unwrap_or_default());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let out = std::env::args()
        .nth(1)
        .map_or_else(|| std::env::temp_dir().join("spimsphere-synthetic"), PathBuf::from);
    std::fs::create_dir_all(&out).map_err(|e| IoError::access(&out, "create", e))?;

    let center = Point3::new(64.0, 64.0, 64.0);
    let calibration = Vector3::new(1.0, 1.0, 2.0);
    let sphere = MakeSphere::for_calibration(center, RADIUS, &calibration).execute()?;
    write_mesh(&out.join("sphere.mesh"), sphere.mesh())?;
    let volume = VolumeGeometry::new(SIZE, SIZE, DEPTH, calibration)?;

    let views = rig_views(center, &[None], WeightParams::default())?;
    let angles: Vec<u32> = camera_views(center, 1, WeightParams::default())?
        .into_iter()
        .map(|(camera, illumination, _)| view_angle(camera, illumination, 0, 90))
        .collect();

    let mut projectors = Vec::with_capacity(views.len());
    for view in &views {
        let table = BuildCorrespondenceTable::new(&sphere, volume, ProjectionParams::default())
            .with_weight(&*view.weight)
            .execute()?;
        projectors.push(MaxProjector::<u16>::new(Arc::new(table)));
    }

    let (producer, consumer) = frame_queue(16);
    let view_count = views.len();
    let camera = thread::spawn(move || -> Result<(), SpimsphereError> {
        for view in 0..view_count {
            for z in 0..DEPTH {
                producer.push(Frame {
                    timepoint: 0,
                    view,
                    z,
                    data: shell_plane(z, view),
                })?;
            }
        }
        Ok(())
    });

    let mut projected = vec![Vec::new(); view_count];
    consume_frames(&consumer, &mut projectors, SIZE, SIZE, |tp, view, projector| {
        let path = out.join(projection_file_name(tp, angles[view], 0));
        write_vertex_buffer(&path, projector.buffer())?;
        projected[view] = projector.buffer().to_vec();
        Ok(())
    })?;
    camera.join().map_err(|_| QueueError::Disconnected)??;

    let fusion = Fusion::new(&sphere, &views, FusionParams::default())?;
    let buffers: Vec<&[u16]> = projected.iter().map(Vec::as_slice).collect();
    let fused: Vec<u16> = fusion.fuse_as(&buffers)?;
    write_vertex_buffer(&out.join(fused_file_name(0, 0)), &fused)?;

    tracing::info!(
        vertices = sphere.vertex_count(),
        output = %out.display(),
        "synthetic run finished"
    );
    Ok(())
}
