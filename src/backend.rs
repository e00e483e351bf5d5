//! Backend selection for training and sampling.
//!
//! The models are generic over burn backends; this module picks the concrete
//! autodiff backend at runtime and hands it to a [`BackendTask`].

use std::env;
use std::sync::OnceLock;

use burn::backend::Autodiff;
use burn::backend::ndarray::{NdArray, NdArrayDevice};
#[cfg(target_os = "macos")]
use burn::backend::wgpu::{self, WgpuDevice, graphics::Metal};
#[cfg(not(target_os = "macos"))]
use burn::backend::wgpu::{self, WgpuDevice, graphics::Vulkan};
#[cfg(feature = "cuda")]
use burn::backend::{Cuda, cuda::CudaDevice};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Environment variable that overrides the configured backend.
pub const BACKEND_ENV: &str = "ANIMEGAN_BACKEND";

pub type WgpuTrainBackend = Autodiff<wgpu::Wgpu>;
pub type CpuTrainBackend = Autodiff<NdArray>;
#[cfg(feature = "cuda")]
pub type CudaTrainBackend = Autodiff<Cuda>;

/// Compute backend used for a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Wgpu,
    Cpu,
    /// Only available when built with the `cuda` feature; falls back to WGPU otherwise.
    Cuda,
}

impl BackendKind {
    /// Parse a user-supplied backend name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "wgpu" | "vulkan" | "metal" => Some(Self::Wgpu),
            "cpu" | "ndarray" => Some(Self::Cpu),
            "cuda" => Some(Self::Cuda),
            _ => None,
        }
    }
}

/// Work that runs on whichever backend [`dispatch`] selects.
pub trait BackendTask {
    type Output;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Self::Output;
}

static WGPU_INIT: OnceLock<()> = OnceLock::new();

/// Backend requested through [`BACKEND_ENV`], if any.
pub fn backend_override() -> Option<BackendKind> {
    let requested = env::var(BACKEND_ENV).ok()?;
    if requested.trim().is_empty() {
        return None;
    }
    match BackendKind::parse(&requested) {
        Some(kind) => Some(kind),
        None => {
            warn!("Unknown backend '{requested}' in {BACKEND_ENV}, defaulting to WGPU.");
            Some(BackendKind::Wgpu)
        }
    }
}

/// Run `task` on the backend named by `kind`.
pub fn dispatch<T: BackendTask>(kind: BackendKind, task: T) -> T::Output {
    match kind {
        BackendKind::Cpu => {
            info!("Using CPU (ndarray) backend");
            task.run::<CpuTrainBackend>(NdArrayDevice::default())
        }
        #[cfg(feature = "cuda")]
        BackendKind::Cuda => {
            info!("Using CUDA backend");
            task.run::<CudaTrainBackend>(CudaDevice::default())
        }
        #[cfg(not(feature = "cuda"))]
        BackendKind::Cuda => {
            warn!("Built without the `cuda` feature; using WGPU instead.");
            run_wgpu(task)
        }
        BackendKind::Wgpu => run_wgpu(task),
    }
}

fn run_wgpu<T: BackendTask>(task: T) -> T::Output {
    info!("Using WGPU backend");
    init_cubecl_config();
    let device = WgpuDevice::default();
    init_wgpu(&device);
    task.run::<WgpuTrainBackend>(device)
}

fn init_wgpu(device: &WgpuDevice) {
    WGPU_INIT.get_or_init(|| {
        #[cfg(target_os = "macos")]
        wgpu::init_setup::<Metal>(device, Default::default());
        #[cfg(not(target_os = "macos"))]
        wgpu::init_setup::<Vulkan>(device, Default::default());
    });
}

fn init_cubecl_config() {
    static CUBECL_CONFIG: OnceLock<()> = OnceLock::new();
    CUBECL_CONFIG.get_or_init(|| {
        let mut config = cubecl_runtime::config::GlobalConfig::default();
        config.compilation.cache = Some(cubecl_runtime::config::cache::CacheConfig::Global);
        config.autotune.cache = cubecl_runtime::config::cache::CacheConfig::Global;
        let _ = std::panic::catch_unwind(|| cubecl_runtime::config::GlobalConfig::set(config));
    });
}
