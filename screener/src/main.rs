use anyhow::Context;
use clap::{Parser, Subcommand};
use generator::profile::{build_session, SynthConfig};
use report_bridge::bridge::ReportBridge;
use screencore::table::{self, Table};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod report_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Magnetic cleanliness screening driver")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long, global = true)]
    workflow: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse a persisted recording and print the verdict
    Analyze {
        table: PathBuf,
        /// Append the result to this ledger file
        #[arg(long)]
        ledger: Option<PathBuf>,
        /// Classification limit, N m T^-1 unless the workflow selects the stray field
        #[arg(long)]
        limit: Option<f64>,
        /// Print the full report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Write a synthetic recording of a rotating dipole
    Synth {
        part: String,
        #[arg(long, short)]
        output: PathBuf,
        #[arg(long, default_value_t = 0.03)]
        moment: f64,
        #[arg(long, value_delimiter = ',', default_values_t = [9.0, 11.0, 15.0])]
        distances: Vec<f64>,
        #[arg(long, default_value_t = 0.0)]
        noise: f64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Keep the report bridge alive for incoming recordings
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,
        #[arg(long)]
        ledger: Option<PathBuf>,
    },
}

fn load_config(
    workflow: Option<PathBuf>,
    ledger: Option<PathBuf>,
    limit: Option<f64>,
    bind: Option<SocketAddr>,
) -> anyhow::Result<WorkflowConfig> {
    Ok(match workflow {
        Some(path) => WorkflowConfig::load(path)?.with_overrides(ledger, limit, bind),
        None => WorkflowConfig::from_args(ledger, limit, bind),
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Analyze {
            table,
            ledger,
            limit,
            json,
        } => {
            let config = load_config(args.workflow, ledger, limit, None)?;
            let runner = Runner::new(config);
            let outcome = runner.execute(&table)?;
            let fit = &outcome.report.fit;

            if json {
                let text = serde_json::to_string_pretty(&outcome.report)
                    .context("serializing report")?;
                println!("{}", text);
            } else {
                for estimate in &outcome.report.estimates {
                    println!(
                        "dataset {:>3}  r = {:.3} m  |B| = {:.4e} T  angle = {:.3} rad  m = {:.4e}",
                        estimate.dataset_id,
                        estimate.distance_m,
                        estimate.magnitude_t,
                        estimate.angle_rad,
                        estimate.moment
                    );
                }
                println!(
                    "Dipole moment {:.3e} ± {:.1e} N m/T, stray field @ 1 m {:.3e} ± {:.1e} nT -> {}",
                    fit.moment,
                    fit.moment_err,
                    fit.stray_field_t * 1e9,
                    fit.stray_field_err_t * 1e9,
                    fit.classification
                );
            }
            if outcome.ledgered {
                if let Some(path) = &runner.config().ledger {
                    println!("Ledger row appended to {}", path.display());
                }
            }
        }
        Command::Synth {
            part,
            output,
            moment,
            distances,
            noise,
            seed,
        } => {
            let config = load_config(args.workflow, None, None, None)?;
            let synth = SynthConfig {
                part,
                moment,
                distances_cm: distances,
                noise_nt: noise,
                seed,
                ..SynthConfig::default()
            };
            let session = build_session(&synth, &config.software_version, None)?;
            let recording =
                Table::from_session(&session).context("building table from synthetic session")?;
            table::write_table(&recording, &output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "Wrote {} dataset(s) for part {} to {}",
                recording.datasets().len(),
                synth.part,
                output.display()
            );
        }
        Command::Serve { bind, ledger } => {
            let config = load_config(args.workflow, ledger, None, bind)?;
            let address = config.bind_address;
            let bridge = ReportBridge::new(Arc::new(Runner::new(config)));
            let runtime = TokioBuilder::new_multi_thread()
                .enable_all()
                .build()
                .context("creating runtime for the report bridge")?;
            runtime.block_on(async move {
                let shutdown = async {
                    if let Err(err) = signal::ctrl_c().await {
                        log::warn!("awaiting Ctrl+C failed: {}", err);
                    }
                };
                println!("Report bridge running on {} (Ctrl+C to stop)...", address);
                bridge.serve(address, shutdown).await
            })?;
        }
    }

    Ok(())
}
