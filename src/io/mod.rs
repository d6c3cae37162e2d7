mod mesh_file;
mod transform_file;
mod vertex_buffer;

pub use mesh_file::{read_mesh, read_sphere, write_mesh};
pub use transform_file::{read_transforms, write_transforms};
pub use vertex_buffer::{load_vertex_buffer, read_vertex_buffer, write_vertex_buffer, VertexScalar};

/// File name of one projected stack: timepoint, view angle in degrees and layer.
#[must_use]
pub fn projection_file_name(timepoint: usize, angle: u32, layer: usize) -> String {
    format!("tp{timepoint:04}_a{angle:04}_l{layer:02}.vertices")
}

/// File name of one fused timepoint layer.
#[must_use]
pub fn fused_file_name(timepoint: usize, layer: usize) -> String {
    format!("tp{timepoint:04}_{layer:02}.vertices")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names() {
        assert_eq!(projection_file_name(7, 135, 0), "tp0007_a0135_l00.vertices");
        assert_eq!(fused_file_name(12, 1), "tp0012_01.vertices");
    }
}
