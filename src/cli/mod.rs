// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line with clap, picks a backend from
// --accelerator and routes each subcommand to Layer 2.
//
//   cpu → Autodiff<NdArray>
//   gpu → Autodiff<Wgpu>   (needs the `wgpu` cargo feature)

pub mod commands;

use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;
use clap::Parser;
use commands::{Accelerator, Commands};

use crate::application::{
    run_use_case::{RunConfig, RunUseCase},
    tensor_demo,
};

#[derive(Parser, Debug)]
#[command(
    name = "mnist-trainer",
    version,
    about = "Tensor basics, an MNIST data module and a small classifier trained with Burn."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command.accelerator() {
            Accelerator::Cpu => self.run_cpu(),
            Accelerator::Gpu => self.run_gpu(),
        }
    }

    #[cfg(feature = "ndarray")]
    fn run_cpu(self) -> Result<()> {
        use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
        self.dispatch::<Autodiff<NdArray>>(NdArrayDevice::Cpu)
    }

    #[cfg(not(feature = "ndarray"))]
    fn run_cpu(self) -> Result<()> {
        anyhow::bail!("CPU support is not compiled in; rebuild with `--features ndarray`")
    }

    #[cfg(feature = "wgpu")]
    fn run_gpu(self) -> Result<()> {
        use burn::backend::{wgpu::WgpuDevice, Autodiff, Wgpu};
        self.dispatch::<Autodiff<Wgpu>>(WgpuDevice::default())
    }

    #[cfg(not(feature = "wgpu"))]
    fn run_gpu(self) -> Result<()> {
        anyhow::bail!("GPU support is not compiled in; rebuild with `--features wgpu`")
    }

    fn dispatch<B: AutodiffBackend>(self, device: B::Device) -> Result<()> {
        match self.command {
            Commands::Tensors(_) => {
                tensor_demo::run::<B>(&device)?;
            }
            Commands::Run(args) => {
                let use_case = RunUseCase::new(args.into());
                use_case.run::<B>(device)?;
            }
            Commands::Fit(args) => {
                let use_case = RunUseCase::new(args.into());
                let outcome  = use_case.fit::<B>(device)?;
                println!(
                    "Training complete. Best epoch {} saved at '{}'.",
                    outcome.best_epoch,
                    outcome.best_checkpoint.display()
                );
            }
            Commands::Validate(args) => {
                let use_case = RunUseCase::new(args.run.into());
                use_case.validate::<B>(device, &args.ckpt_path)?;
            }
            Commands::Test(args) => {
                let use_case = RunUseCase::new(args.run.into());
                use_case.test::<B>(device, &args.ckpt_path)?;
            }
            Commands::Predict(args) => {
                let use_case = RunUseCase::new(args.run.into());
                let summary  = use_case.predict::<B>(device, &args.ckpt_path)?;
                println!("Predicted {} batch(es)", summary.batches);
                println!("First batch classes: {:?}", summary.first_batch_classes());
            }
            Commands::Profile(args) => {
                let config: RunConfig = args.into();
                let trace_dir = config.trainer.default_root_dir.join("profiler");
                RunUseCase::new(config).fit::<B>(device)?;
                println!("Profiler output written to '{}'", trace_dir.display());
            }
        }
        Ok(())
    }
}
