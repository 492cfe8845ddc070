pub(crate) mod bridge;
pub(crate) mod config;
pub(crate) mod glm;
pub(crate) mod iwls;
pub(crate) mod math;
pub(crate) mod mcmc;
pub(crate) mod prior;
pub(crate) mod sampler;
pub(crate) mod storage;

pub use config::{GlmModelConfig, McmcSettings, ModelData};
pub use glm::{BernoulliLogit, PoissonLog, ResponseFamily};
pub use iwls::{Iwls, IwlsError, ProposalInfo};
pub use mcmc::{McmcState, Sample};
pub use prior::{GPrior, MarginalZ};
pub use sampler::{GlmSampler, Progress, SamplerError};
pub use storage::Trace;
