use std::{path::PathBuf, process::exit};

use clap::{Args, Parser, Subcommand};
use eyre::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wrap_core::{
    field::{BabyBear, CurveId, InnerField, InnerFieldId, KoalaBear},
    groth16::WrapCurve,
    pipeline::DEFAULT_DATA_DIR,
    PipelineConfig, ProofPipeline,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: WrapCommand,
}

#[derive(Subcommand)]
enum WrapCommand {
    /// Build the verifier circuit from the witness and check it is satisfied
    Solve(PipelineArgs),

    /// Run the circuit-specific setup and save the keys and verifier contract
    Setup(PipelineArgs),

    /// Prove with saved keys and write proof.data
    Prove(PipelineArgs),

    /// Setup followed by prove
    SetupAndProve(PipelineArgs),

    /// Render the verifier contract for the saved verifying key
    ExportVerifier(PipelineArgs),

    /// Write the JSON arguments for the calling contract from proof.data
    ContractInputs {
        #[command(flatten)]
        pipeline: PipelineArgs,
        /// 0x-prefixed hex of the guest's public values
        #[arg(long)]
        public_values: String,
        /// Defaults to contract_inputs.json in the data directory
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args, Clone, Debug)]
struct PipelineArgs {
    /// Directory the default file names are resolved against
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,
    #[arg(long)]
    witness: Option<PathBuf>,
    #[arg(long)]
    constraints: Option<PathBuf>,
    #[arg(long)]
    proving_key: Option<PathBuf>,
    #[arg(long)]
    verifying_key: Option<PathBuf>,
    /// Keep the compiled circuit here and reuse it when proving
    #[arg(long)]
    compiled_circuit: Option<PathBuf>,
    #[arg(long)]
    proof: Option<PathBuf>,
    #[arg(long)]
    verifier_contract: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = CurveId::Bn254)]
    curve: CurveId,
    #[arg(long, value_enum, default_value_t = InnerFieldId::KoalaBear)]
    inner_field: InnerFieldId,
    /// Seed the Poseidon2 round constants are derived from
    #[arg(long, default_value_t = 0)]
    poseidon2_seed: u64,
}

impl From<PipelineArgs> for PipelineConfig {
    fn from(args: PipelineArgs) -> Self {
        let defaults = PipelineConfig::in_dir(&args.data_dir);
        PipelineConfig {
            witness: args.witness.unwrap_or(defaults.witness),
            constraints: args.constraints.unwrap_or(defaults.constraints),
            proving_key: args.proving_key.unwrap_or(defaults.proving_key),
            verifying_key: args.verifying_key.unwrap_or(defaults.verifying_key),
            compiled_circuit: args.compiled_circuit,
            proof: args.proof.unwrap_or(defaults.proof),
            verifier_contract: args.verifier_contract.unwrap_or(defaults.verifier_contract),
            curve: args.curve,
            inner_field: args.inner_field,
            poseidon2_seed: args.poseidon2_seed,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = dispatch(cli.command) {
        error!("{err:#}");
        exit(1);
    }
}

fn dispatch(command: WrapCommand) -> Result<()> {
    let (config, step) = match command {
        WrapCommand::ContractInputs {
            pipeline,
            public_values,
            out,
        } => {
            let out = out.unwrap_or_else(|| pipeline.data_dir.join("contract_inputs.json"));
            (
                PipelineConfig::from(pipeline),
                Step::ContractInputs { public_values, out },
            )
        }
        WrapCommand::Solve(args) => (args.into(), Step::Solve),
        WrapCommand::Setup(args) => (args.into(), Step::Setup),
        WrapCommand::Prove(args) => (args.into(), Step::Prove),
        WrapCommand::SetupAndProve(args) => (args.into(), Step::SetupAndProve),
        WrapCommand::ExportVerifier(args) => (args.into(), Step::ExportVerifier),
    };
    match (config.curve, config.inner_field) {
        (CurveId::Bn254, InnerFieldId::KoalaBear) => {
            run::<ark_bn254::Bn254, KoalaBear>(config, step)
        }
        (CurveId::Bn254, InnerFieldId::BabyBear) => {
            run::<ark_bn254::Bn254, BabyBear>(config, step)
        }
        (CurveId::Bls12_381, InnerFieldId::KoalaBear) => {
            run::<ark_bls12_381::Bls12_381, KoalaBear>(config, step)
        }
        (CurveId::Bls12_381, InnerFieldId::BabyBear) => {
            run::<ark_bls12_381::Bls12_381, BabyBear>(config, step)
        }
    }
}

enum Step {
    Solve,
    Setup,
    Prove,
    SetupAndProve,
    ExportVerifier,
    ContractInputs { public_values: String, out: PathBuf },
}

fn setup<E: WrapCurve, I: InnerField>(pipeline: &ProofPipeline<E, I>) -> Result<()> {
    pipeline.setup(&mut rand::thread_rng())?;
    if E::ID.has_evm_verifier() {
        pipeline.export_verifier_contract()?;
    } else {
        warn!(curve = %E::ID, "no on-chain verifier for this curve, skipping contract export");
    }
    Ok(())
}

fn run<E: WrapCurve, I: InnerField>(config: PipelineConfig, step: Step) -> Result<()> {
    let pipeline = ProofPipeline::<E, I>::from_config(config)?;
    match step {
        Step::Solve => {
            let solved = pipeline.solve()?;
            info!(public_inputs = ?solved.witness.public(), "circuit is satisfied");
        }
        Step::Setup => setup(&pipeline)?,
        Step::Prove => {
            pipeline.prove(&mut rand::thread_rng())?;
        }
        Step::SetupAndProve => {
            setup(&pipeline)?;
            pipeline.prove(&mut rand::thread_rng())?;
        }
        Step::ExportVerifier => pipeline.export_verifier_contract()?,
        Step::ContractInputs { public_values, out } => {
            pipeline.contract_inputs(&public_values, &out)?;
        }
    }
    Ok(())
}
