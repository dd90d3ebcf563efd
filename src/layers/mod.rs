//! Network layers
//!
//! Each layer type carries its own argument struct with shape inference,
//! parameter initialization and a numeric forward pass behind the
//! [`LayerKind`] trait. [`LayerSpec`] is the closed set of layer types,
//! tagged by `"type"` in JSON:
//!
//! ```json
//! {"type": "Conv3D", "name": "conv0", "input_shape": [1, 20, 252],
//!  "weight_shape": [16, 5, 13], "pool_shape": [2, 3]}
//! ```
//!
//! A [`Layer`] owns the parameters declared by its spec. Every layer has one
//! primary input slot (`x_input`) and one primary output slot (`z_output`).

pub mod activation;
pub mod affine;
pub mod conv;
pub mod energy;
pub mod multisoftmax;
pub mod network;
pub mod ops;
pub mod params;
pub mod rbf;

pub use activation::Activation;
pub use affine::{AffineArgs, SoftmaxArgs};
pub use conv::Conv3DArgs;
pub use energy::EnergyPdfArgs;
pub use multisoftmax::MultiSoftmaxArgs;
pub use network::{Network, NetworkDefinition};
pub use ops::BorderMode;
pub use params::{LayerKey, ParamSlot, ParamStore, ParamTable, TensorMap};
pub use rbf::{LpNorm, RbfArgs};

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2, IxDyn};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::ChordError;

/// Primary input slot name
pub const INPUT: &str = "x_input";
/// Primary output slot name
pub const OUTPUT: &str = "z_output";
/// Weight parameter name
pub const WEIGHTS: &str = "weights";
/// Bias parameter name
pub const BIAS: &str = "bias";

/// Shapes derived from a layer's arguments, excluding the batch axis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerShapes {
    /// Primary input shape
    pub input: Vec<usize>,
    /// Primary output shape
    pub output: Vec<usize>,
    /// Shape of every trainable parameter, by local name
    pub params: BTreeMap<String, Vec<usize>>,
}

/// Type-specific hyperparameters recorded in the descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerExtras {
    /// Max-pool window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<(usize, usize)>,
    /// Downsampling factors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downsample: Option<(usize, usize)>,
    /// Convolution border mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_mode: Option<BorderMode>,
    /// Distance used by RBF layers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lp_norm: Option<LpNorm>,
}

/// Serializable summary of a layer: identity, shapes and activation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    /// Layer type tag
    #[serde(rename = "type")]
    pub layer_type: String,
    /// Unique layer name
    pub name: String,
    /// Input shapes by slot
    pub input_shapes: BTreeMap<String, Vec<usize>>,
    /// Output shapes by slot
    pub output_shapes: BTreeMap<String, Vec<usize>>,
    /// Parameter shapes by local name
    pub param_shapes: BTreeMap<String, Vec<usize>>,
    /// Activation tag
    pub activation: Activation,
    /// Type-specific hyperparameters
    #[serde(flatten)]
    pub extras: LayerExtras,
}

impl LayerDescriptor {
    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String, ChordError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Behavior shared by every layer type
pub trait LayerKind {
    /// Type tag written to descriptors
    fn type_name(&self) -> &'static str;

    /// Layer name
    fn name(&self) -> &str;

    /// Activation applied by the forward pass
    fn activation(&self) -> Activation;

    /// Derive input, output and parameter shapes from the arguments
    fn infer_shapes(&self) -> Result<LayerShapes, ChordError>;

    /// Draw initial values for every declared parameter
    fn init_params(
        &self,
        shapes: &LayerShapes,
        rng: &mut StdRng,
    ) -> Result<BTreeMap<String, ArrayD<f32>>, ChordError>;

    /// Forward pass on a batch shaped `(N, input...)`
    ///
    /// `dropout` is the drop rate; `None` runs without a mask.
    fn forward(
        &self,
        x: &ArrayD<f32>,
        params: &ParamStore,
        dropout: Option<f32>,
        rng: &mut StdRng,
    ) -> Result<ArrayD<f32>, ChordError>;

    /// Whether the forward pass flattens `(N, ...)` input to `(N, n_in)`
    ///
    /// Matrix-oriented layers accept any trailing shape with the declared
    /// element count; others need the declared shape exactly.
    fn flattens_input(&self) -> bool {
        true
    }

    /// Hyperparameters recorded in the descriptor
    fn extras(&self) -> LayerExtras {
        LayerExtras::default()
    }
}

/// Layer specification, tagged by type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LayerSpec {
    /// Fully connected layer
    Affine(AffineArgs),
    /// Convolution over (maps, rows, cols) inputs with max pooling
    #[serde(alias = "Conv2D")]
    Conv3D(Conv3DArgs),
    /// Affine layer followed by a softmax
    Softmax(SoftmaxArgs),
    /// Several independent softmaxes over a shared input
    MultiSoftmax(MultiSoftmaxArgs),
    /// Distance-to-template layer
    #[serde(rename = "RBF")]
    Rbf(RbfArgs),
    /// Softmax over negated energies
    #[serde(rename = "EnergyPDF")]
    EnergyPdf(EnergyPdfArgs),
}

impl LayerSpec {
    /// Build a spec from a type tag and its argument bundle
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for an unknown type or malformed arguments
    pub fn from_type(type_name: &str, args: serde_json::Value) -> Result<Self, ChordError> {
        let serde_json::Value::Object(mut fields) = args else {
            return Err(ChordError::InvalidParameter(format!(
                "Arguments for {} must be an object",
                type_name
            )));
        };
        fields.insert("type".to_string(), serde_json::Value::String(type_name.to_string()));
        serde_json::from_value(serde_json::Value::Object(fields)).map_err(|e| {
            ChordError::InvalidParameter(format!("Layer of type '{}': {}", type_name, e))
        })
    }

    /// The type-specific behavior
    pub fn kind(&self) -> &dyn LayerKind {
        match self {
            LayerSpec::Affine(args) => args,
            LayerSpec::Conv3D(args) => args,
            LayerSpec::Softmax(args) => args,
            LayerSpec::MultiSoftmax(args) => args,
            LayerSpec::Rbf(args) => args,
            LayerSpec::EnergyPdf(args) => args,
        }
    }

    /// Layer name
    pub fn name(&self) -> &str {
        self.kind().name()
    }

    /// Shape-inferred descriptor
    pub fn descriptor(&self) -> Result<LayerDescriptor, ChordError> {
        let kind = self.kind();
        validate_name(kind.name())?;
        let shapes = kind.infer_shapes()?;
        Ok(LayerDescriptor {
            layer_type: kind.type_name().to_string(),
            name: kind.name().to_string(),
            input_shapes: BTreeMap::from([(INPUT.to_string(), shapes.input)]),
            output_shapes: BTreeMap::from([(OUTPUT.to_string(), shapes.output)]),
            param_shapes: shapes.params,
            activation: kind.activation(),
            extras: kind.extras(),
        })
    }
}

/// A layer with its parameters
#[derive(Debug, Clone)]
pub struct Layer {
    spec: LayerSpec,
    descriptor: LayerDescriptor,
    params: ParamStore,
}

impl Layer {
    /// Declare the layer's parameters without assigning them
    pub fn declare(spec: LayerSpec) -> Result<Self, ChordError> {
        let descriptor = spec.descriptor()?;
        let params = ParamStore::declare(&descriptor.name, &descriptor.param_shapes);
        Ok(Self {
            spec,
            descriptor,
            params,
        })
    }

    /// Declare and initialize the layer's parameters from `rng`
    pub fn new(spec: LayerSpec, rng: &mut StdRng) -> Result<Self, ChordError> {
        let mut layer = Self::declare(spec)?;
        let shapes = layer.spec.kind().infer_shapes()?;
        let initial: ParamTable = layer
            .spec
            .kind()
            .init_params(&shapes, rng)?
            .into_iter()
            .map(|(name, value)| (layer.key(&name), value))
            .collect();
        layer.set_param_values(&initial)?;
        log::debug!(
            "Built {} layer {}: {:?} -> {:?}",
            layer.descriptor.layer_type,
            layer.descriptor.name,
            shapes.input,
            shapes.output
        );
        Ok(layer)
    }

    /// Layer name
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Layer specification
    pub fn spec(&self) -> &LayerSpec {
        &self.spec
    }

    /// Shapes, names and activation
    pub fn descriptor(&self) -> &LayerDescriptor {
        &self.descriptor
    }

    /// Parameter store
    pub fn params(&self) -> &ParamStore {
        &self.params
    }

    /// Qualified key for a name local to this layer
    pub fn key(&self, name: &str) -> LayerKey {
        LayerKey::new(self.name(), name)
    }

    /// Primary input shape, without the batch axis
    pub fn input_shape(&self) -> &[usize] {
        self.descriptor
            .input_shapes
            .get(INPUT)
            .map_or(&[], Vec::as_slice)
    }

    /// Primary output shape, without the batch axis
    pub fn output_shape(&self) -> &[usize] {
        self.descriptor
            .output_shapes
            .get(OUTPUT)
            .map_or(&[], Vec::as_slice)
    }

    /// Values of the initialized parameters
    pub fn param_values(&self) -> ParamTable {
        self.params.param_values()
    }

    /// Assign parameter values; entries of other layers are ignored
    pub fn set_param_values(&mut self, values: &ParamTable) -> Result<(), ChordError> {
        self.params.set_param_values(values)
    }

    /// Forward pass on a batch shaped `(N, input...)`
    ///
    /// Matrix-oriented layers also take any `(N, ...)` batch holding the
    /// same number of elements per observation.
    pub fn forward(
        &self,
        x: &ArrayD<f32>,
        dropout: Option<f32>,
        rng: &mut StdRng,
    ) -> Result<ArrayD<f32>, ChordError> {
        let accepted = match x.shape().split_first() {
            None => false,
            Some((_, trailing)) if self.spec.kind().flattens_input() => {
                trailing.iter().product::<usize>() == self.input_shape().iter().product::<usize>()
            }
            Some((_, trailing)) => trailing == self.input_shape(),
        };
        if !accepted {
            return Err(ChordError::ShapeMismatch(format!(
                "{} expects inputs shaped (N, {:?}), got {:?}",
                self.name(),
                self.input_shape(),
                x.shape()
            )));
        }
        self.spec.kind().forward(x, &self.params, dropout, rng)
    }

    /// Map named inputs to named outputs
    ///
    /// Returns an empty map when this layer's input slot is absent.
    pub fn transform(
        &self,
        inputs: &TensorMap,
        dropout: Option<f32>,
        rng: &mut StdRng,
    ) -> Result<TensorMap, ChordError> {
        let mut outputs = TensorMap::new();
        let Some(x) = inputs.get(&self.key(INPUT)) else {
            return Ok(outputs);
        };
        outputs.insert(self.key(OUTPUT), self.forward(x, dropout, rng)?);
        Ok(outputs)
    }
}

/// Reject empty names and names containing the key separator
pub(crate) fn validate_name(name: &str) -> Result<(), ChordError> {
    if name.is_empty() || name.contains('/') {
        return Err(ChordError::InvalidParameter(format!(
            "Layer name '{}' must be non-empty and free of '/'",
            name
        )));
    }
    Ok(())
}

/// Reject zero-sized dimensions
pub(crate) fn validate_dims(what: &str, dims: &[usize]) -> Result<(), ChordError> {
    if dims.is_empty() || dims.contains(&0) {
        return Err(ChordError::InvalidParameter(format!(
            "{} {:?} must have positive dimensions",
            what, dims
        )));
    }
    Ok(())
}

/// Zero-mean normal tensor with standard deviation `scale`
pub(crate) fn normal_tensor(
    shape: &[usize],
    scale: f32,
    rng: &mut StdRng,
) -> Result<ArrayD<f32>, ChordError> {
    let normal = Normal::new(0.0f32, scale)
        .map_err(|e| ChordError::InvalidParameter(format!("Normal({}): {}", scale, e)))?;
    Ok(ArrayD::from_shape_fn(IxDyn(shape), |_| normal.sample(rng)))
}

/// Parameter viewed as a matrix
pub(crate) fn param_2d(params: &ParamStore, name: &str) -> Result<Array2<f32>, ChordError> {
    Ok(params.value(name)?.clone().into_dimensionality::<Ix2>()?)
}

/// Parameter viewed as a vector
pub(crate) fn param_1d(params: &ParamStore, name: &str) -> Result<Array1<f32>, ChordError> {
    Ok(params.value(name)?.clone().into_dimensionality::<Ix1>()?)
}

/// Multiply every row by a fresh dropout mask over the columns
pub(crate) fn apply_dropout(
    z: &mut Array2<f32>,
    dropout: Option<f32>,
    rng: &mut StdRng,
) -> Result<(), ChordError> {
    if let Some(rate) = dropout {
        let mask = ops::dropout_mask(z.ncols(), rate, rng)?;
        *z *= &mask;
    }
    Ok(())
}

fn default_tanh() -> Activation {
    Activation::Tanh
}
