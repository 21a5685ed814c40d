//! txflow-bench: trigger, observe and benchmark txflow workflow runs.
//!
//! Exit codes: 0 run completed, 1 run failed or did not finish,
//! 2 invalid input, 3 store or server unavailable.

mod client;
mod stats;

use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use client::{ClientError, Endpoint, RunReply, TxflowClient, EXIT_SUCCESS};
use stats::LatencySummary;

#[derive(Parser)]
#[command(name = "txflow-bench")]
#[command(version, about = "txflow workflow trigger and latency benchmark tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// txflow server URL
    #[arg(short, long, env = "TXFLOW_URL", default_value = "http://localhost:8086")]
    url: String,

    /// Print raw JSON replies only
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger a run and wait for its result
    Run {
        /// Workflow name
        workflow: String,

        /// Run id; reusing one returns the stored result
        #[arg(long)]
        run_id: Option<String>,

        /// Workflow input as JSON
        #[arg(long, value_name = "JSON")]
        input: Option<String>,

        /// How long the server should wait before answering
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Trigger a run without waiting
    Start {
        workflow: String,

        #[arg(long)]
        run_id: Option<String>,

        #[arg(long, value_name = "JSON")]
        input: Option<String>,
    },

    /// Report a run's status, optionally waiting for it to finish
    Poll {
        run_id: String,

        #[arg(long, default_value_t = 0)]
        wait_ms: u64,
    },

    /// Trigger runs one after another and summarize their latency
    Latency {
        #[arg(short, long, default_value = "hello")]
        workflow: String,

        /// The number of executions to benchmark
        #[arg(short, long)]
        num_executions: usize,

        #[arg(long, value_name = "JSON")]
        input: Option<String>,

        /// The number of steps per run, sent as the `num` input field
        #[arg(short = 'i', long)]
        num_invocations: Option<u64>,
    },

    /// Benchmark the /bare, /txn or /wf endpoint
    Endpoint {
        #[arg(value_enum)]
        endpoint: Endpoint,

        /// The number of executions to benchmark
        #[arg(short, long)]
        num_executions: usize,

        /// Path argument passed to the endpoint
        #[arg(short = 'i', long, default_value_t = 1)]
        num: u64,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,txflow_bench=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn parse_input(input: Option<&str>) -> Result<Value, ClientError> {
    match input {
        None => Ok(Value::Object(Default::default())),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| ClientError::Argument(format!("--input is not valid JSON: {e}"))),
    }
}

/// Merge `"num": n` into an object input.
fn with_num_invocations(mut input: Value, num: Option<u64>) -> Result<Value, ClientError> {
    let Some(num) = num else {
        return Ok(input);
    };
    match input.as_object_mut() {
        Some(fields) => {
            fields.insert("num".to_string(), Value::from(num));
            Ok(input)
        }
        None => Err(ClientError::Argument(
            "--num-invocations needs an object --input".to_string(),
        )),
    }
}

fn print_run(reply: &RunReply, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(reply)?);
        return Ok(());
    }
    println!("run_id: {}", reply.run_id);
    println!("status: {}", reply.status);
    if let Some(output) = &reply.output {
        println!("output: {output}");
    }
    if let Some(error) = &reply.error {
        println!("error: {error}");
    }
    if let Some(runtime) = reply.runtime_ms {
        println!("runtime: {runtime:.2} ms");
    }
    Ok(())
}

fn print_summary(latencies: &[f64]) {
    if let Some(summary) = LatencySummary::from_samples(latencies) {
        println!();
        println!("{summary}");
    }
}

async fn execute(cli: Cli) -> anyhow::Result<i32> {
    let client = TxflowClient::new(&cli.url);

    match cli.command {
        Commands::Run {
            workflow,
            run_id,
            input,
            timeout_ms,
        } => {
            let input = parse_input(input.as_deref())?;
            let reply = client
                .trigger(
                    &workflow,
                    run_id.as_deref(),
                    &input,
                    true,
                    timeout_ms.map(Duration::from_millis),
                )
                .await?;
            print_run(&reply, cli.json)?;
            Ok(reply.exit_code())
        }

        Commands::Start {
            workflow,
            run_id,
            input,
        } => {
            let input = parse_input(input.as_deref())?;
            let reply = client
                .trigger(&workflow, run_id.as_deref(), &input, false, None)
                .await?;
            print_run(&reply, cli.json)?;
            Ok(EXIT_SUCCESS)
        }

        Commands::Poll { run_id, wait_ms } => {
            let reply = client
                .get_run(&run_id, Duration::from_millis(wait_ms))
                .await?;
            print_run(&reply, cli.json)?;
            Ok(reply.exit_code())
        }

        Commands::Latency {
            workflow,
            num_executions,
            input,
            num_invocations,
        } => {
            let input = with_num_invocations(parse_input(input.as_deref())?, num_invocations)?;
            let mut latencies = Vec::with_capacity(num_executions);
            let mut exit = EXIT_SUCCESS;

            for i in 0..num_executions {
                let started = Instant::now();
                let reply = client.trigger(&workflow, None, &input, true, None).await?;
                let latency = reply
                    .runtime_ms
                    .unwrap_or_else(|| started.elapsed().as_secs_f64() * 1000.0);
                if reply.exit_code() != EXIT_SUCCESS {
                    tracing::warn!(run_id = %reply.run_id, status = %reply.status, "Run did not complete");
                    exit = reply.exit_code();
                }
                latencies.push(latency);
                println!("Execution {} latency: {:.2} milliseconds", i + 1, latency);
            }

            print_summary(&latencies);
            Ok(exit)
        }

        Commands::Endpoint {
            endpoint,
            num_executions,
            num,
        } => {
            let mut latencies = Vec::with_capacity(num_executions);
            for i in 0..num_executions {
                let reply = client.bench(endpoint, num).await?;
                let latency = endpoint.runtime_ms(&reply);
                tracing::debug!(output = %reply.output, "Endpoint replied");
                latencies.push(latency);
                println!("Execution {} latency: {:.2} milliseconds", i + 1, latency);
            }

            print_summary(&latencies);
            Ok(EXIT_SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let code = match execute(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err}");
            err.downcast_ref::<ClientError>()
                .map(ClientError::exit_code)
                .unwrap_or(client::EXIT_WORKFLOW_FAILED)
        }
    };

    ExitCode::from(code as u8)
}
