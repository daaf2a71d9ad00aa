pub mod registry;
pub mod sampler;
pub mod validator;

pub use self::{
    registry::{RegistryError, SensorRegistry},
    sampler::SensorSampler,
    validator::ValidationError,
};
