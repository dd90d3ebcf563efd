//! Element-wise activation functions

use std::fmt;
use std::str::FromStr;

use ndarray::{Array, ArrayD, Dimension};
use serde::{Deserialize, Serialize};

use crate::error::ChordError;

/// Activation applied to a layer's pre-activation output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Activation {
    /// Identity
    #[default]
    Linear,
    /// Hyperbolic tangent
    Tanh,
    /// Logistic sigmoid
    Sigmoid,
    /// Rectified linear unit
    Relu,
}

impl Activation {
    /// Apply the activation to every element
    pub fn apply_inplace<D: Dimension>(&self, x: &mut Array<f32, D>) {
        match self {
            Activation::Linear => {}
            Activation::Tanh => x.mapv_inplace(f32::tanh),
            Activation::Sigmoid => x.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Relu => x.mapv_inplace(|v| v.max(0.0)),
        }
    }

    /// Apply the activation, returning a new tensor
    pub fn apply(&self, x: &ArrayD<f32>) -> ArrayD<f32> {
        let mut out = x.clone();
        self.apply_inplace(&mut out);
        out
    }
}

impl FromStr for Activation {
    type Err = ChordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(Activation::Linear),
            "tanh" => Ok(Activation::Tanh),
            "sigmoid" => Ok(Activation::Sigmoid),
            "relu" => Ok(Activation::Relu),
            other => Err(ChordError::InvalidParameter(format!(
                "Given activation '{}' is undefined",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Activation {
    type Error = ChordError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Activation> for String {
    fn from(activation: Activation) -> Self {
        activation.to_string()
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Activation::Linear => "linear",
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
            Activation::Relu => "relu",
        };
        f.write_str(name)
    }
}
