use spimsphere::math::{Point3, Vector3};
use spimsphere::mesh::{MakeSphere, Sphere};
use spimsphere::projection::VolumeGeometry;

/// Routes library events to the test output; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A radius-20 sphere in a 64×64×32 volume with 2× axial voxels.
#[allow(clippy::unwrap_used, dead_code)]
pub fn small_rig() -> (Sphere, VolumeGeometry) {
    let sphere = MakeSphere::new(Point3::new(32.0, 32.0, 32.0), 20.0, 8)
        .execute()
        .unwrap();
    let volume = VolumeGeometry::new(64, 64, 32, Vector3::new(1.0, 1.0, 2.0)).unwrap();
    (sphere, volume)
}
