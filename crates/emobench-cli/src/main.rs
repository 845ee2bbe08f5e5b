//! emobench launcher.
//!
//! Iterates every configured character over the requested patients for
//! one disorder, running the full conversation-and-scoring loop and
//! reporting per-character deepening rates plus the total model cost.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use emobench_application::{BenchmarkSettings, Orchestrator, UsageLedger};
use emobench_core::{CharacterBackend, Disorder};
use emobench_infrastructure::{ConfigService, Settings};
use emobench_interaction::{CharacterApiClient, OpenAiCompletionClient};

#[derive(Parser)]
#[command(name = "emobench")]
#[command(about = "Run the disorder-deepening benchmark against roleplay characters", long_about = None)]
struct Cli {
    /// Disorder to simulate and score
    #[arg(long, value_enum)]
    disorder_type: DisorderArg,

    /// Label of the character style/model under test
    #[arg(long, default_value = "Roar")]
    tested_style: String,

    /// Base model driving the patient agent and topic judge
    #[arg(long, default_value = "gpt-4o")]
    base_model: String,

    /// Base-model input price per 1M tokens
    #[arg(long, default_value_t = 2.5)]
    base_input_price: f64,

    /// Base-model output price per 1M tokens
    #[arg(long, default_value_t = 10.0)]
    base_output_price: f64,

    /// Tested-model input price per 1M tokens
    #[arg(long, default_value_t = 0.0)]
    tested_input_price: f64,

    /// Tested-model output price per 1M tokens
    #[arg(long, default_value_t = 0.0)]
    tested_output_price: f64,

    /// Conversation turns per seed topic
    #[arg(long, default_value_t = 10)]
    max_turns: u32,

    /// Patient ids to run
    #[arg(long, num_args = 1.., default_values_t = [1u32])]
    patients: Vec<u32>,

    /// Input configuration directory
    #[arg(long, default_value = "./config")]
    config_dir: PathBuf,

    /// Root directory for session records
    #[arg(long, default_value = "./eval_output")]
    output_root: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DisorderArg {
    Depression,
    Delusion,
    Psychosis,
}

impl From<DisorderArg> for Disorder {
    fn from(arg: DisorderArg) -> Self {
        match arg {
            DisorderArg::Depression => Disorder::Depression,
            DisorderArg::Delusion => Disorder::Delusion,
            DisorderArg::Psychosis => Disorder::Psychosis,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let disorder: Disorder = cli.disorder_type.into();

    let config = ConfigService::new(&cli.config_dir);
    let settings = Settings::load(&cli.config_dir.join("config.toml"))
        .context("failed to load config.toml")?;
    let instrument = Arc::new(
        config
            .load_instrument(disorder)
            .context("failed to load disorder configuration")?,
    );
    let characters = config
        .load_characters()
        .context("failed to load character registry")?;

    let completion_client = {
        let mut client = OpenAiCompletionClient::new(settings.completion_api_key()?);
        if let Some(base_url) = &settings.completion.base_url {
            client = client.with_base_url(base_url);
        }
        Arc::new(client)
    };

    let character_base_url = settings
        .character_backend
        .base_url
        .clone()
        .context("character_backend base_url not set in config.toml")?;
    let character_client = Arc::new(
        CharacterApiClient::connect(character_base_url, settings.character_token()?)
            .await
            .context("failed to connect to the character backend")?,
    );

    let base_ledger = Arc::new(UsageLedger::new(cli.base_input_price, cli.base_output_price));
    let tested_ledger = Arc::new(UsageLedger::new(
        cli.tested_input_price,
        cli.tested_output_price,
    ));

    let orchestrator = Orchestrator::new(
        BenchmarkSettings {
            tested_style: cli.tested_style.clone(),
            disorder,
            base_model: cli.base_model.clone(),
            max_turns: cli.max_turns,
            output_root: cli.output_root.clone(),
            topic_buffer_size: emobench_interaction::topic_manager::DEFAULT_BUFFER_SIZE,
        },
        instrument,
        completion_client,
        character_client.clone(),
        base_ledger.clone(),
        tested_ledger.clone(),
    );

    for (character_name, character) in &characters {
        println!("Testing with character: {character_name}");

        for &patient_id in &cli.patients {
            println!("Testing with patient ID: {patient_id}");

            let record = config
                .load_patient_record(disorder, patient_id)
                .with_context(|| format!("failed to load patient {patient_id}"))?;
            let seeds = config
                .load_seed_topics(disorder, patient_id)
                .with_context(|| format!("failed to load seed topics for patient {patient_id}"))?;

            let outcome = orchestrator
                .run_patient(character_name, character, &record, patient_id, &seeds.topics)
                .await?;

            println!("Output path: {}", outcome.output_dir.display());
            println!(
                "Rate of deepening for {character_name}: {}",
                outcome.deepening_rate()
            );
        }
    }

    character_client.close().await?;

    let total_cost = base_ledger.cost() + tested_ledger.cost();
    println!("total cost is: {total_cost}");

    Ok(())
}
