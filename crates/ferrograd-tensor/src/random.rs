use std::time::{SystemTime, UNIX_EPOCH};

use rand::{
    distr::{Distribution, StandardUniform},
    rngs::StdRng,
    Rng, SeedableRng,
};

use crate::{element::Element, error::TensorError, shape::validate_shape, tensor::Tensor};

/// Seed for [`Tensor::rand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seed {
    /// Deterministic stream for a given value.
    Fixed(u64),
    /// Seeded from the current wall-clock time.
    WallClock,
}

impl From<i64> for Seed {
    /// `-1` selects [`Seed::WallClock`], any other value is reinterpreted as a fixed seed.
    fn from(value: i64) -> Self {
        match value {
            -1 => Seed::WallClock,
            v => Seed::Fixed(v as u64),
        }
    }
}

impl Seed {
    fn rng(self) -> StdRng {
        let seed = match self {
            Seed::Fixed(v) => v,
            Seed::WallClock => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64,
        };
        StdRng::seed_from_u64(seed)
    }
}

impl<T: Element> Tensor<T>
where
    StandardUniform: Distribution<T>,
{
    /// Creates a tensor of random values.
    ///
    /// Floats are uniform in `[0, 1)`, integers uniform over the whole type.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ferrograd_tensor::{Seed, Tensor};
    ///
    /// let a = Tensor::<f32>::rand(&[2, 3], Seed::Fixed(7)).unwrap();
    /// let b = Tensor::<f32>::rand(&[2, 3], 7.into()).unwrap();
    /// assert!(a.is_equal(&b));
    /// ```
    pub fn rand(shape: &[usize], seed: Seed) -> Result<Self, TensorError> {
        validate_shape(shape)?;
        let mut rng = seed.rng();
        let n = shape.iter().product();
        let data: Vec<T> = (0..n).map(|_| rng.random()).collect();
        Tensor::from_vec(data, shape)
    }
}
