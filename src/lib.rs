//! Stage training code into SageMaker-style Docker images and Valohai
//! executions.
//!
//! The core is a transform-aware copy: copying `report.ipynb` to `train.py`
//! runs a registered converter on the way (see [`transform`]). Everything
//! else builds on it: [`container`] stages user files from the bundled
//! template, [`image`] renders a Dockerfile and drives the helper scripts,
//! [`sagemaker`] and [`valohai`] target the two platforms.

pub mod container;
pub mod error;
pub mod fsops;
pub mod image;
pub mod manifest;
pub mod resources;
pub mod sagemaker;
pub mod shell;
pub mod transform;
pub mod valohai;

pub use container::{CodeContainer, FileMapping, notebook_container};
pub use error::{Error, Result};
pub use fsops::{FileOps, HostFs};
pub use image::Image;
pub use manifest::Manifest;
pub use resources::Resources;
pub use transform::{FileTransformer, NotebookExtractor, TransformerRegistry, TransformingFs};

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "SAGEPACK_LOG";

/// Install the stderr subscriber used by the binaries. `SAGEPACK_LOG` takes
/// an `EnvFilter` directive and defaults to `warn`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
