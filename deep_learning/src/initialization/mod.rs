mod constant;
mod param_gen;
mod random;

use rand::{SeedableRng, rngs::StdRng};

pub use constant::{ConstParamGen, initial_bias};
pub use param_gen::ParamGen;
pub use random::RandParamGen;

use crate::{Result, params::InitialWeightDistribution};

/// Offset added to the model seed to derive each layer's weight seed.
const WEIGHT_SEED_OFFSET: u64 = 0xBAD5EED;

/// Describes the weights connecting two layers, used to pick their initial distribution.
#[derive(Debug, Clone, Copy)]
pub struct LayerShape {
    /// Position of the weight matrix, 0 is the one leaving the input layer.
    pub layer: usize,
    pub fan_in: usize,
    pub fan_out: usize,
    /// Whether these weights feed a softmax output layer.
    pub softmax: bool,
}

/// Builds the generator for a layer's initial weights.
///
/// # Arguments
/// * `distribution` - The user selected initial distribution.
/// * `scale` - Range (uniform) or standard deviation (normal), unused by uniform adaptive.
/// * `seed` - The model seed, mixed with the layer position.
/// * `shape` - The layer dimensions.
/// * `limit` - Amount of weights to generate.
///
/// # Returns
/// A boxed generator or an error if the distribution can't be built.
pub fn weight_gen(
    distribution: InitialWeightDistribution,
    scale: f32,
    seed: u64,
    shape: LayerShape,
    limit: usize,
) -> Result<Box<dyn ParamGen>> {
    let layer_seed = seed
        .wrapping_add(WEIGHT_SEED_OFFSET)
        .wrapping_add(shape.layer as u64 + 1);
    let rng = StdRng::seed_from_u64(layer_seed);

    let param_gen: Box<dyn ParamGen> = match distribution {
        InitialWeightDistribution::UniformAdaptive => {
            // Softmax behaves like a sigmoid and needs the extra factor.
            let factor = if shape.softmax { 4. } else { 1. };
            Box::new(RandParamGen::uniform_adaptive(
                rng,
                limit,
                shape.fan_in,
                shape.fan_out,
                factor,
            )?)
        }
        InitialWeightDistribution::Uniform => {
            Box::new(RandParamGen::uniform(rng, limit, -scale, scale)?)
        }
        InitialWeightDistribution::Normal => Box::new(RandParamGen::normal(rng, limit, scale)?),
    };

    Ok(param_gen)
}
