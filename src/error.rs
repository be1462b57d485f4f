/// Possible precomputation errors.
///
/// Everything here is raised before any pass runs, while reading or
/// validating a configuration or setting up workers. The numerical passes
/// themselves cannot fail.
#[derive(Debug)]
pub enum PrecomputeError {
    /// A table axis has too few texels
    InvalidResolution {
        /// Which table axis was rejected
        axis: &'static str,
        /// The requested number of texels
        value: usize,
        /// The smallest accepted number of texels
        minimum: usize,
    },
    /// Planet radius, atmosphere height or height margin are unusable
    InvalidGeometry(&'static str),
    /// A scale height is not strictly positive
    InvalidScaleHeight {
        /// Which medium the scale height belongs to
        medium: &'static str,
        /// The rejected value in km
        value: f32,
    },
    /// The Mie absorption factor is not strictly positive
    InvalidMieAbsorption(f32),
    /// A scattering coefficient is negative or not finite
    InvalidScatteringCoefficient(&'static str),
    /// The number of scattering orders is zero
    InvalidScatteringOrder(u32),
    /// An integration step count is zero
    InvalidStepCount(&'static str),
    /// The Mie asymmetry is outside of `[0, 1)`
    InvalidMieAsymmetry(f32),
    /// The configuration document couldn't be parsed
    Parse(ron::error::SpannedError),
    /// The worker thread pool couldn't be created
    ThreadPool(rayon::ThreadPoolBuildError),
}

impl std::fmt::Display for PrecomputeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrecomputeError::InvalidResolution {
                axis,
                value,
                minimum,
            } => write!(
                f,
                "resolution of the {axis} axis is {value}, but must be at least {minimum}"
            ),
            PrecomputeError::InvalidGeometry(what) => {
                write!(f, "invalid planet geometry: {what}")
            }
            PrecomputeError::InvalidScaleHeight { medium, value } => {
                write!(f, "{medium} scale height must be positive, got {value} km")
            }
            PrecomputeError::InvalidMieAbsorption(value) => {
                write!(f, "Mie absorption must be positive, got {value}")
            }
            PrecomputeError::InvalidScatteringCoefficient(medium) => {
                write!(f, "{medium} scattering coefficients must be finite and non-negative")
            }
            PrecomputeError::InvalidScatteringOrder(order) => {
                write!(f, "number of scattering orders must be at least 1, got {order}")
            }
            PrecomputeError::InvalidStepCount(what) => {
                write!(f, "{what} step count must be at least 1")
            }
            PrecomputeError::InvalidMieAsymmetry(g) => {
                write!(f, "Mie asymmetry must be in [0, 1), got {g}")
            }
            PrecomputeError::Parse(e) => write!(f, "couldn't parse configuration: {e}"),
            PrecomputeError::ThreadPool(e) => write!(f, "couldn't build thread pool: {e}"),
        }
    }
}

impl std::error::Error for PrecomputeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PrecomputeError::Parse(e) => Some(e),
            PrecomputeError::ThreadPool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ron::error::SpannedError> for PrecomputeError {
    fn from(e: ron::error::SpannedError) -> Self {
        PrecomputeError::Parse(e)
    }
}

impl From<rayon::ThreadPoolBuildError> for PrecomputeError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        PrecomputeError::ThreadPool(e)
    }
}
