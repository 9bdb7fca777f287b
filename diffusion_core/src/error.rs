use std::fmt;

/// The result type used across the diffusion core.
pub type Result<T> = std::result::Result<T, CoreError>;

/// All errors the tensor-level primitives can produce.
#[derive(Debug)]
pub enum CoreError {
    /// A named parameter expected by the live model is missing from a
    /// loaded snapshot or gradient set.
    MissingParam { name: String },
    /// Two tensors that must agree in shape do not.
    ShapeMismatch {
        name: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    /// Two parameter sets that must share an ordering do not.
    OrderMismatch { got: String, expected: String },
    /// A per-example gradient set covers differing example counts.
    ExampleCountMismatch {
        name: String,
        got: usize,
        expected: usize,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::MissingParam { name } => {
                write!(f, "parameter {name} is missing from the snapshot")
            }
            CoreError::ShapeMismatch {
                name,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch for {name}: got {got:?}, expected {expected:?}"
            ),
            CoreError::OrderMismatch { got, expected } => write!(
                f,
                "parameter ordering mismatch: got {got}, expected {expected}"
            ),
            CoreError::ExampleCountMismatch {
                name,
                got,
                expected,
            } => write!(
                f,
                "per-example gradient for {name} covers {got} examples, expected {expected}"
            ),
        }
    }
}

impl std::error::Error for CoreError {}
