/// Scalar type of image planes and vertex buffers.
///
/// Projection keeps the image's own type; fusion and interpolation go
/// through `f64`. Conversions back into integer types round and saturate.
pub trait Sample: Copy + Default + PartialOrd + Send + Sync + 'static {
    fn to_f64(self) -> f64;

    fn from_f64(value: f64) -> Self;
}

impl Sample for u8 {
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_f64(value: f64) -> Self {
        value.round().clamp(0.0, f64::from(u8::MAX)) as u8
    }
}

impl Sample for u16 {
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_f64(value: f64) -> Self {
        value.round().clamp(0.0, f64::from(u16::MAX)) as u16
    }
}

impl Sample for f32 {
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Sample for f64 {
    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }
}
